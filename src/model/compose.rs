use serde::{Deserialize, Serialize};

/// One container started by a compose project.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct ServiceInstance {
    pub service_name: String,
    pub container_id: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ComposeState {
    Idle,
    Up,
    Error,
}

/// Client-side record of a compose project's lifecycle.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ComposeSession {
    pub project: String,
    pub services: Vec<ServiceInstance>,
    pub state: ComposeState,
    pub last_error: Option<String>,
}

impl ComposeSession {
    pub fn idle(project: &str) -> Self {
        Self {
            project: project.to_string(),
            services: Vec::new(),
            state: ComposeState::Idle,
            last_error: None,
        }
    }

    pub fn is_up(&self) -> bool {
        self.state == ComposeState::Up
    }
}

/// Body of `/compose/up` and `/compose/down`.
#[derive(Clone, Debug, Serialize)]
pub struct ComposeRequest<'a> {
    pub compose_yaml: &'a str,
    pub project_name: &'a str,
}
