//! Image builds, with a local simulation when the engine cannot build.
//!
//! The simulated path does not produce an image. It walks the Dockerfile's
//! instructions and echoes them, and its output says so on every line.

use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::error::EngineError;

use super::{Dispatcher, IMAGE_KINDS};

/// Prefix of every line produced by the simulated build.
pub const SIMULATED_TAG: &str = "[simulated]";

#[derive(Clone, Debug, Default)]
pub struct BuildRequest {
    pub tag: String,
    pub dockerfile: String,        // Dockerfile text, used by the simulation
    pub context: Option<Vec<u8>>,  // tar archive containing `Dockerfile`
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BuildReport {
    pub tag: String,
    pub lines: Vec<String>,
    pub simulated: bool,
}

impl Dispatcher {
    /// Build `req.tag`. If the engine refuses the build (any non-2xx answer or
    /// an error entry in its output), fall back to the simulation and report
    /// success with `simulated` set. Transport failures are returned as is.
    ///
    /// Lines are also sent to `progress` as they are produced.
    pub async fn build(
        &self,
        req: &BuildRequest,
        progress: Option<mpsc::Sender<String>>,
    ) -> Result<BuildReport, EngineError> {
        let context = req.context.clone().unwrap_or_default();
        match self.client.build(&req.tag, "Dockerfile", context).await {
            Ok(output) => {
                let mut lines = output.messages;
                if lines.is_empty() {
                    lines.push(format!("Built {}", req.tag));
                }
                if let Some(tx) = &progress {
                    for line in &lines {
                        let _ = tx.send(line.clone()).await;
                    }
                }
                info!(tag = %req.tag, "build completed");
                self.force(IMAGE_KINDS).await;
                Ok(BuildReport { tag: req.tag.clone(), lines, simulated: false })
            }
            Err(EngineError::Engine { status, message }) => {
                warn!(tag = %req.tag, status, error = %message, "engine build unavailable, simulating");
                let lines = self.simulate(req, progress).await;
                Ok(BuildReport { tag: req.tag.clone(), lines, simulated: true })
            }
            Err(e) => Err(e),
        }
    }

    /// One line per instruction, paced by `build_step_delay`, then one
    /// completion line.
    async fn simulate(&self, req: &BuildRequest, progress: Option<mpsc::Sender<String>>) -> Vec<String> {
        let mut lines = Vec::new();
        for instruction in instructions(&req.dockerfile) {
            tokio::time::sleep(self.config.build_step_delay).await;
            let line = format!("{} {}", SIMULATED_TAG, instruction);
            if let Some(tx) = &progress {
                let _ = tx.send(line.clone()).await;
            }
            lines.push(line);
        }

        let done = format!(
            "{} Build simulation complete: {} (no image was built)",
            SIMULATED_TAG, req.tag
        );
        if let Some(tx) = &progress {
            let _ = tx.send(done.clone()).await;
        }
        lines.push(done);
        lines
    }
}

/// Non-blank, non-comment Dockerfile lines, trimmed.
fn instructions(dockerfile: &str) -> impl Iterator<Item = &str> {
    dockerfile
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
}
