//! Lifecycle actions. Every action calls the resource client once; a success
//! then forces an immediate reconciliation of the kinds it affects, a failure
//! is handed back untouched and forces nothing.
//!
//! Confirmation of destructive actions is the caller's job.

mod build;
mod compose;

use std::sync::{Arc, Mutex, MutexGuard};

use futures_util::FutureExt;
use futures_util::future::{BoxFuture, join_all};
use tracing::{debug, info, warn};

use crate::config::ClientConfig;
use crate::engine::{CreateContainer, EngineClient};
use crate::error::EngineError;
use crate::model::{is_builtin_network, ImageRef, ResourceKind};
use crate::poll::Refresher;

pub use build::{BuildReport, BuildRequest, SIMULATED_TAG};

/// Something the dispatcher can force to re-fetch.
pub trait Reconcile: Send + Sync {
    fn kind(&self) -> ResourceKind;

    /// Fetch and publish once. Resolves to false if the target is gone.
    fn reconcile(&self) -> BoxFuture<'_, bool>;

    /// False once the target is gone for good; the hook is then dropped.
    fn is_live(&self) -> bool {
        true
    }
}

impl<P: Send + Sync + 'static> Reconcile for Refresher<P> {
    fn kind(&self) -> ResourceKind {
        Refresher::kind(self)
    }

    fn is_live(&self) -> bool {
        Refresher::is_live(self)
    }

    fn reconcile(&self) -> BoxFuture<'_, bool> {
        self.refresh().boxed()
    }
}

const CONTAINER_KINDS: &[ResourceKind] = &[ResourceKind::Containers, ResourceKind::Engine];
const IMAGE_KINDS: &[ResourceKind] = &[ResourceKind::Images, ResourceKind::Engine];
const NETWORK_KINDS: &[ResourceKind] = &[ResourceKind::Networks];
const VOLUME_KINDS: &[ResourceKind] = &[ResourceKind::Volumes];
const COMPOSE_KINDS: &[ResourceKind] =
    &[ResourceKind::Containers, ResourceKind::Networks, ResourceKind::Engine];

pub struct Dispatcher {
    client: EngineClient,
    config: ClientConfig,
    hooks: Mutex<Vec<Arc<dyn Reconcile>>>,
    compose: compose::ComposeRegistry,
}

impl Dispatcher {
    pub fn new(client: EngineClient, config: ClientConfig) -> Self {
        Self {
            client,
            config,
            hooks: Mutex::new(Vec::new()),
            compose: compose::ComposeRegistry::default(),
        }
    }

    /// Have successful actions force `hook` to re-fetch when they touch its kind.
    /// Hooks whose target has gone away are dropped here and after each
    /// forced reconciliation.
    pub fn register(&self, hook: impl Reconcile + 'static) {
        let mut hooks = self.hooks_guard();
        hooks.retain(|h| h.is_live());
        hooks.push(Arc::new(hook));
    }

    pub fn client(&self) -> &EngineClient {
        &self.client
    }

    // --- Containers ---

    pub async fn start_container(&self, id: &str) -> Result<String, EngineError> {
        self.client.start_container(id).await?;
        self.succeeded(CONTAINER_KINDS, format!("Started {}", id)).await
    }

    pub async fn stop_container(&self, id: &str) -> Result<String, EngineError> {
        self.client.stop_container(id).await?;
        self.succeeded(CONTAINER_KINDS, format!("Stopped {}", id)).await
    }

    pub async fn delete_container(&self, id: &str) -> Result<String, EngineError> {
        self.client.delete_container(id).await?;
        self.succeeded(CONTAINER_KINDS, format!("Removed {}", id)).await
    }

    /// Create a container, optionally starting it straight away. A failed
    /// start after a successful create still counts as success (the container
    /// exists) and the message says what went wrong.
    pub async fn create_container(
        &self,
        req: &CreateContainer,
        auto_start: bool,
    ) -> Result<String, EngineError> {
        let id = self.client.create_container(req).await?;
        let short = crate::model::short_id(&id);

        let msg = if !auto_start {
            format!("Created {}", short)
        } else {
            match self.client.start_container(&id).await {
                Ok(()) => format!("Created and started {}", short),
                Err(e) => {
                    warn!(container = %short, error = %e, "created container failed to start");
                    format!("Container {} created but failed to start: {}", short, e)
                }
            }
        };
        self.succeeded(CONTAINER_KINDS, msg).await
    }

    // --- Images ---

    pub async fn pull_image(&self, reference: &ImageRef) -> Result<String, EngineError> {
        self.client.pull_image(reference).await?;
        self.succeeded(IMAGE_KINDS, format!("Pulled {}", reference)).await
    }

    // --- Networks ---

    pub async fn create_network(&self, name: &str, driver: &str) -> Result<String, EngineError> {
        let id = self.client.create_network(name, driver).await?;
        let short = crate::model::short_id(&id);
        self.succeeded(NETWORK_KINDS, format!("Created network {} ({})", name, short)).await
    }

    /// Built-in networks are refused without contacting the engine.
    pub async fn delete_network(&self, name_or_id: &str) -> Result<String, EngineError> {
        if is_builtin_network(name_or_id) {
            return Err(self.reject(format!("Cannot remove built-in network {}", name_or_id)));
        }
        self.client.delete_network(name_or_id).await?;
        self.succeeded(NETWORK_KINDS, format!("Removed network {}", name_or_id)).await
    }

    // --- Volumes ---

    pub async fn create_volume(&self, name: &str, driver: &str) -> Result<String, EngineError> {
        let volume = self.client.create_volume(name, driver).await?;
        self.succeeded(VOLUME_KINDS, format!("Created volume {}", volume.name)).await
    }

    pub async fn delete_volume(&self, name: &str) -> Result<String, EngineError> {
        self.client.delete_volume(name).await?;
        self.succeeded(VOLUME_KINDS, format!("Removed volume {}", name)).await
    }

    pub async fn prune_volumes(&self) -> Result<String, EngineError> {
        let report = self.client.prune_volumes().await?;
        let msg = if report.deleted.is_empty() {
            "No unused volumes".to_string()
        } else {
            format!("Pruned {} volume(s): {}", report.deleted.len(), report.deleted.join(", "))
        };
        self.succeeded(VOLUME_KINDS, msg).await
    }

    // --- Internal helpers ---

    async fn succeeded(
        &self,
        kinds: &[ResourceKind],
        msg: String,
    ) -> Result<String, EngineError> {
        info!(action = %msg, "action completed");
        self.force(kinds).await;
        Ok(msg)
    }

    /// Out-of-cycle reconciliation of every registered hook of `kinds`.
    async fn force(&self, kinds: &[ResourceKind]) {
        let targets: Vec<Arc<dyn Reconcile>> = self
            .hooks_guard()
            .iter()
            .filter(|h| kinds.contains(&h.kind()))
            .cloned()
            .collect();
        let results = join_all(targets.iter().map(|h| h.reconcile())).await;

        let gone: Vec<&Arc<dyn Reconcile>> = targets
            .iter()
            .zip(results)
            .filter_map(|(h, live)| (!live).then_some(h))
            .collect();
        let mut hooks = self.hooks_guard();
        let before = hooks.len();
        hooks.retain(|h| h.is_live() && !gone.iter().any(|g| Arc::ptr_eq(*g, h)));
        if hooks.len() < before {
            debug!(dropped = before - hooks.len(), "dropped hooks of stopped sessions");
        }
    }

    fn reject(&self, msg: String) -> EngineError {
        warn!(reason = %msg, "action rejected");
        EngineError::Rejected(msg)
    }

    fn hooks_guard(&self) -> MutexGuard<'_, Vec<Arc<dyn Reconcile>>> {
        match self.hooks.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
