use std::io::{self, Write};

use chrono::{DateTime, Utc};
use crossterm::{
    queue,
    style::{Attribute, Color, ResetColor, SetAttribute, SetForegroundColor},
};

use crate::model::{
    ContainerRecord, EngineOverview, ImageRecord, LogLine, LogStream, NetworkRecord, VolumeRecord,
};
use crate::poll::{Connectivity, Published};

/// Truncate a string to at most `max_len` characters (not bytes), appending "..."
/// if truncated. Safe for multi-byte UTF-8.
pub fn truncate_str(s: &str, max_len: usize) -> String {
    let char_count = s.chars().count();
    if char_count <= max_len {
        s.to_string()
    } else {
        let keep = max_len.saturating_sub(3);
        let truncated: String = s.chars().take(keep).collect();
        format!("{}...", truncated)
    }
}

/// Longest prefix of `s` that fits in `max_len` bytes without splitting a char.
pub fn safe_truncate(s: &str, max_len: usize) -> &str {
    if s.len() <= max_len {
        return s;
    }
    let mut end = max_len;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} B", bytes)
    } else {
        format!("{:.1} {}", value, UNITS[unit])
    }
}

/// "3 minutes ago" style age of an engine epoch timestamp.
pub fn format_age(epoch_secs: i64, now: DateTime<Utc>) -> String {
    if epoch_secs <= 0 {
        return "-".to_string();
    }
    let secs = (now.timestamp() - epoch_secs).max(0);
    let (n, unit) = match secs {
        0..=59 => return "just now".to_string(),
        60..=3599 => (secs / 60, "minute"),
        3600..=86_399 => (secs / 3600, "hour"),
        86_400..=2_591_999 => (secs / 86_400, "day"),
        _ => (secs / 2_592_000, "month"),
    };
    format!("{} {}{} ago", n, unit, if n == 1 { "" } else { "s" })
}

// --- Tables ---

pub fn containers_table(rows: &[ContainerRecord], now: DateTime<Utc>) -> Vec<String> {
    let mut out = vec![format!(
        "{:<12}  {:<24}  {:<28}  {:<9}  {:<18}  {:<14}  {}",
        "ID", "NAME", "IMAGE", "STATE", "STATUS", "CREATED", "PORTS"
    )];
    for c in rows {
        out.push(format!(
            "{:<12}  {:<24}  {:<28}  {:<9}  {:<18}  {:<14}  {}",
            c.short_id(),
            truncate_str(&c.name, 24),
            truncate_str(&c.image, 28),
            c.state.as_str(),
            truncate_str(&c.status, 18),
            format_age(c.created, now),
            c.ports,
        ));
    }
    out
}

pub fn images_table(rows: &[ImageRecord], now: DateTime<Utc>) -> Vec<String> {
    let mut out = vec![format!("{:<40}  {:<12}  {:>10}  {}", "REPOSITORY:TAG", "ID", "SIZE", "CREATED")];
    for i in rows {
        out.push(format!(
            "{:<40}  {:<12}  {:>10}  {}",
            truncate_str(i.primary_tag(), 40),
            i.short_id(),
            format_bytes(i.size),
            format_age(i.created, now),
        ));
    }
    out
}

pub fn networks_table(rows: &[NetworkRecord]) -> Vec<String> {
    let mut out = vec![format!("{:<12}  {:<24}  {:<10}  {:<8}  {}", "ID", "NAME", "DRIVER", "SCOPE", "")];
    for n in rows {
        out.push(format!(
            "{:<12}  {:<24}  {:<10}  {:<8}  {}",
            crate::model::short_id(&n.id),
            truncate_str(&n.name, 24),
            n.driver,
            n.scope,
            if n.is_builtin() { "built-in" } else { "" },
        ));
    }
    trim_rows(out)
}

pub fn volumes_table(rows: &[VolumeRecord]) -> Vec<String> {
    let mut out = vec![format!("{:<32}  {:<10}  {}", "NAME", "DRIVER", "MOUNTPOINT")];
    for v in rows {
        out.push(format!("{:<32}  {:<10}  {}", truncate_str(&v.name, 32), v.driver, v.mountpoint));
    }
    out
}

pub fn overview_lines(o: &EngineOverview) -> Vec<String> {
    vec![
        format!("Engine:      {} {} (API {})", o.platform, o.version, o.api_version),
        format!("Platform:    {}/{} {}", o.os, o.arch, o.operating_system),
        format!("Driver:      {}", o.driver),
        format!(
            "Containers:  {} ({} running, {} stopped)",
            o.containers, o.containers_running, o.containers_stopped
        ),
        format!("Images:      {}", o.images),
        format!("CPUs:        {}", o.ncpu),
        format!("Memory:      {}", format_bytes(o.mem_total)),
    ]
}

/// Status line above a live table.
pub fn status_line<P>(title: &str, published: &Published<P>) -> String {
    let fetched = published
        .snapshot
        .as_ref()
        .map(|s| format!("updated {} (#{})", s.fetched_at.format("%H:%M:%S"), s.seq))
        .unwrap_or_else(|| "waiting for first fetch".to_string());
    let state = match &published.connectivity {
        Connectivity::Online => match &published.last_error {
            Some(e) => format!("error: {}", e),
            None => "online".to_string(),
        },
        Connectivity::Offline { since, consecutive_failures } => format!(
            "ENGINE OFFLINE since {} ({} failed polls)",
            since.format("%H:%M:%S"),
            consecutive_failures
        ),
    };
    format!("{} | {} | {}", title, fetched, state)
}

// --- Terminal output ---

pub fn writeln(out: &mut impl Write, text: &str) -> io::Result<()> {
    write!(out, "{}\r\n", text)
}

pub fn write_header(out: &mut impl Write, text: &str, alert: bool) -> io::Result<()> {
    queue!(out, SetAttribute(Attribute::Bold))?;
    if alert {
        queue!(out, SetForegroundColor(Color::Red))?;
    }
    write!(out, "{}\r\n", text)?;
    queue!(out, ResetColor, SetAttribute(Attribute::Reset))?;
    Ok(())
}

/// One log line; stderr in yellow.
pub fn write_log_line(out: &mut impl Write, line: &LogLine, width: usize) -> io::Result<()> {
    let text = safe_truncate(&line.text, width.max(1));
    if line.stream == LogStream::Stderr {
        queue!(out, SetForegroundColor(Color::Yellow))?;
        write!(out, "{}\r\n", text)?;
        queue!(out, ResetColor)?;
        Ok(())
    } else {
        write!(out, "{}\r\n", text)
    }
}

fn trim_rows(rows: Vec<String>) -> Vec<String> {
    rows.into_iter().map(|r| r.trim_end().to_string()).collect()
}
