use std::io::{self, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crossterm::{
    cursor::MoveTo,
    event::{self, Event, KeyCode, KeyEvent, KeyModifiers},
    execute, queue,
    terminal::{self, disable_raw_mode, enable_raw_mode, Clear, ClearType, EnterAlternateScreen, LeaveAlternateScreen},
};

use crate::model::LogBuffer;
use crate::poll::{PollSession, Published};

use super::render::{safe_truncate, status_line, write_header, write_log_line, writeln};

/// Alternate screen + raw mode for the lifetime of the guard.
struct TerminalGuard;

impl TerminalGuard {
    fn enter() -> io::Result<Self> {
        enable_raw_mode()?;
        execute!(io::stdout(), EnterAlternateScreen, Clear(ClearType::All))?;
        Ok(Self)
    }
}

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        let _ = execute!(io::stdout(), LeaveAlternateScreen);
        let _ = disable_raw_mode();
    }
}

/// Redraw a table every time `session` publishes, until `q`, Esc, Ctrl-C or
/// `should_quit`. The session is stopped before returning.
pub async fn watch_table<P, F>(
    mut session: PollSession<P>,
    title: &str,
    should_quit: Arc<AtomicBool>,
    rows: F,
) -> io::Result<()>
where
    P: Send + Sync + 'static,
    F: Fn(&P) -> Vec<String>,
{
    let result = {
        let _term = TerminalGuard::enter()?;
        let mut rx = session.subscribe();
        let mut needs_render = true;

        loop {
            if should_quit.load(Ordering::Relaxed) || quit_pressed()? {
                break Ok(());
            }
            if needs_render {
                let published = rx.borrow_and_update().clone();
                draw_table(title, &published, &rows)?;
                needs_render = false;
            }
            needs_render = wait_for_change(&mut rx).await;
        }
    };
    session.stop();
    result
}

/// Follow a log session, newest lines at the bottom.
pub async fn follow_logs(
    mut session: PollSession<LogBuffer>,
    container: &str,
    should_quit: Arc<AtomicBool>,
) -> io::Result<()> {
    let result = {
        let _term = TerminalGuard::enter()?;
        let mut rx = session.subscribe();
        let mut needs_render = true;
        let title = format!("Logs: {}", container);

        loop {
            if should_quit.load(Ordering::Relaxed) || quit_pressed()? {
                break Ok(());
            }
            if needs_render {
                let published = rx.borrow_and_update().clone();
                draw_logs(&title, &published)?;
                needs_render = false;
            }
            needs_render = wait_for_change(&mut rx).await;
        }
    };
    session.stop();
    result
}

async fn wait_for_change<P>(rx: &mut tokio::sync::watch::Receiver<Published<P>>) -> bool {
    matches!(
        tokio::time::timeout(Duration::from_millis(100), rx.changed()).await,
        Ok(Ok(()))
    )
}

fn quit_pressed() -> io::Result<bool> {
    while event::poll(Duration::ZERO)? {
        if let Event::Key(KeyEvent { code, modifiers, .. }) = event::read()? {
            if code == KeyCode::Char('c') && modifiers.contains(KeyModifiers::CONTROL) {
                return Ok(true);
            }
            if matches!(code, KeyCode::Char('q') | KeyCode::Esc) {
                return Ok(true);
            }
        }
    }
    Ok(false)
}

fn draw_table<P>(title: &str, published: &Published<P>, rows: impl Fn(&P) -> Vec<String>) -> io::Result<()> {
    let mut out = io::stdout();
    let (width, height) = terminal::size()?;
    let (width, height) = (width as usize, height as usize);
    queue!(out, Clear(ClearType::All), MoveTo(0, 0))?;

    write_header(&mut out, &status_line(title, published), !published.connectivity.is_online())?;
    if let Some(snapshot) = &published.snapshot {
        for row in rows(&snapshot.data).iter().take(height.saturating_sub(2)) {
            writeln(&mut out, safe_truncate(row, width))?;
        }
    }
    writeln(&mut out, "")?;
    out.flush()
}

fn draw_logs(title: &str, published: &Published<LogBuffer>) -> io::Result<()> {
    let mut out = io::stdout();
    let (width, height) = terminal::size()?;
    let (width, height) = (width as usize, height as usize);
    queue!(out, Clear(ClearType::All), MoveTo(0, 0))?;

    write_header(&mut out, &status_line(title, published), !published.connectivity.is_online())?;
    if let Some(snapshot) = &published.snapshot {
        let area = height.saturating_sub(2);
        let skip = snapshot.data.len().saturating_sub(area);
        for line in snapshot.data.lines().skip(skip) {
            write_log_line(&mut out, line, width)?;
        }
    }
    out.flush()
}
