use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use tracing::info;

use crate::error::EngineError;
use crate::model::{ComposeSession, ComposeState};

use super::{Dispatcher, COMPOSE_KINDS};

/// One `ComposeSession` per project name.
#[derive(Default)]
pub(super) struct ComposeRegistry {
    sessions: Mutex<HashMap<String, ComposeSession>>,
}

impl ComposeRegistry {
    fn guard(&self) -> MutexGuard<'_, HashMap<String, ComposeSession>> {
        match self.sessions.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn get(&self, project: &str) -> ComposeSession {
        self.guard()
            .get(project)
            .cloned()
            .unwrap_or_else(|| ComposeSession::idle(project))
    }

    fn set(&self, session: ComposeSession) {
        self.guard().insert(session.project.clone(), session);
    }
}

impl Dispatcher {
    /// Current client-side state of `project` (idle if never brought up).
    pub fn compose_session(&self, project: &str) -> ComposeSession {
        self.compose.get(project)
    }

    /// Bring a project up. Refused without any request if the project is
    /// already up.
    pub async fn compose_up(&self, compose_yaml: &str, project: &str) -> Result<String, EngineError> {
        // Check-then-act; one dispatcher owns a given project.
        if self.compose.get(project).is_up() {
            return Err(self.reject(format!("Project {} is already up", project)));
        }

        match self.client.compose_up(compose_yaml, project).await {
            Ok(services) => {
                let count = services.len();
                self.compose.set(ComposeSession {
                    project: project.to_string(),
                    services,
                    state: ComposeState::Up,
                    last_error: None,
                });
                info!(project, services = count, "compose project up");
                self.succeeded(COMPOSE_KINDS, format!("Started {} service(s) for {}", count, project))
                    .await
            }
            Err(e) => {
                let mut session = self.compose.get(project);
                session.state = ComposeState::Error;
                session.last_error = Some(e.to_string());
                self.compose.set(session);
                Err(e)
            }
        }
    }

    /// Tear a project down and forget its services.
    pub async fn compose_down(&self, compose_yaml: &str, project: &str) -> Result<String, EngineError> {
        self.client.compose_down(compose_yaml, project).await?;
        self.compose.set(ComposeSession::idle(project));
        self.succeeded(COMPOSE_KINDS, format!("Stopped project {}", project)).await
    }
}
