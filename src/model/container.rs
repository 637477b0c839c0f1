use std::fmt;

use bollard::models::ContainerSummary;

/// Lifecycle state as reported by the engine. Unknown values are kept verbatim.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ContainerState {
    Created,
    Running,
    Paused,
    Exited,
    Dead,
    Other(String),
}

impl ContainerState {
    pub fn parse(raw: &str) -> Self {
        match raw.to_ascii_lowercase().as_str() {
            "created" => ContainerState::Created,
            "running" => ContainerState::Running,
            "paused" => ContainerState::Paused,
            "exited" => ContainerState::Exited,
            "dead" => ContainerState::Dead,
            _ => ContainerState::Other(raw.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            ContainerState::Created => "created",
            ContainerState::Running => "running",
            ContainerState::Paused => "paused",
            ContainerState::Exited => "exited",
            ContainerState::Dead => "dead",
            ContainerState::Other(s) => s,
        }
    }

    pub fn is_running(&self) -> bool {
        *self == ContainerState::Running
    }
}

impl fmt::Display for ContainerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ContainerRecord {
    pub id: String,             // full engine id, primary key
    pub name: String,           // display name, see `display_name`
    pub image: String,
    pub state: ContainerState,
    pub status: String,         // human status, e.g. "Up 2 hours"
    pub created: i64,           // engine epoch seconds
    pub ports: String,          // e.g. "0.0.0.0:8080->80/tcp"
}

impl ContainerRecord {
    pub fn from_summary(s: &ContainerSummary) -> Self {
        let id = s.id.clone().unwrap_or_default();
        let name = display_name(s.names.as_deref(), &id);

        Self {
            name,
            image: s.image.clone().unwrap_or_default(),
            state: ContainerState::parse(s.state.as_deref().unwrap_or_default()),
            status: s.status.clone().unwrap_or_default(),
            created: s.created.unwrap_or(0),
            ports: format_ports(s),
            id,
        }
    }

    pub fn short_id(&self) -> String {
        short_id(&self.id)
    }
}

/// First name with its leading `/` stripped, or the 12-char id when the
/// engine sent no usable name.
pub fn display_name(names: Option<&[String]>, id: &str) -> String {
    names
        .and_then(|n| n.first())
        .map(|n| n.trim_start_matches('/'))
        .filter(|n| !n.is_empty())
        .map(|n| n.to_string())
        .unwrap_or_else(|| short_id(id))
}

/// First 12 characters of an id, with any `sha256:` prefix removed.
pub fn short_id(id: &str) -> String {
    id.trim_start_matches("sha256:").chars().take(12).collect()
}

fn format_ports(s: &ContainerSummary) -> String {
    let Some(ports) = &s.ports else { return String::new() };
    let mut parts = Vec::new();
    for p in ports {
        let container_port = p.private_port;
        let proto = p.typ.as_ref()
            .map(|t| t.to_string())
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| "tcp".to_string());
        match (&p.ip, p.public_port) {
            (Some(ip), Some(pub_port)) => {
                parts.push(format!("{}:{}->{}/{}", ip, pub_port, container_port, proto));
            }
            (None, Some(pub_port)) => {
                parts.push(format!("{}->{}/{}", pub_port, container_port, proto));
            }
            _ => parts.push(format!("{}/{}", container_port, proto)),
        }
    }
    parts.join(", ")
}
