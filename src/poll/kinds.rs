use std::sync::{Arc, Mutex, MutexGuard};

use futures_util::FutureExt;

use crate::config::ClientConfig;
use crate::engine::{EngineClient, LogOptions};
use crate::model::{
    ContainerRecord, EngineOverview, ImageRecord, LogBuffer, NetworkRecord, ResourceKind,
    VolumeRecord,
};

use super::{Fetcher, PollSession};

/// Polls one container's log tail into a bounded ring.
pub type LogSession = PollSession<LogBuffer>;

macro_rules! list_fetcher {
    ($client:expr, $method:ident) => {{
        let client = $client.clone();
        let fetcher: Fetcher<_> = Arc::new(move || {
            let client = client.clone();
            async move { client.$method().await }.boxed()
        });
        fetcher
    }};
}

pub fn containers(client: &EngineClient, config: &ClientConfig) -> PollSession<Vec<ContainerRecord>> {
    PollSession::spawn(
        ResourceKind::Containers,
        config.poll.containers,
        list_fetcher!(client, list_containers),
    )
}

pub fn images(client: &EngineClient, config: &ClientConfig) -> PollSession<Vec<ImageRecord>> {
    PollSession::spawn(ResourceKind::Images, config.poll.images, list_fetcher!(client, list_images))
}

pub fn networks(client: &EngineClient, config: &ClientConfig) -> PollSession<Vec<NetworkRecord>> {
    PollSession::spawn(
        ResourceKind::Networks,
        config.poll.networks,
        list_fetcher!(client, list_networks),
    )
}

pub fn volumes(client: &EngineClient, config: &ClientConfig) -> PollSession<Vec<VolumeRecord>> {
    PollSession::spawn(ResourceKind::Volumes, config.poll.volumes, list_fetcher!(client, list_volumes))
}

/// `/version` + `/info`, the dashboard's online/offline signal.
pub fn engine_overview(client: &EngineClient, config: &ClientConfig) -> PollSession<EngineOverview> {
    PollSession::spawn(ResourceKind::Engine, config.poll.engine, list_fetcher!(client, overview))
}

/// Poll the last `config.log_tail` lines of a container every `config.poll.logs`.
///
/// Lines are requested with timestamps, from the second of the newest line
/// already held onwards, and merged into the ring by write time. Identical
/// lines written at different times are all kept.
pub fn container_logs(client: &EngineClient, id: &str, config: &ClientConfig) -> LogSession {
    let client = client.clone();
    let id = id.to_string();
    let tail = config.log_tail;
    let ring = Arc::new(Mutex::new(LogBuffer::new(config.log_capacity)));

    let fetcher: Fetcher<LogBuffer> = Arc::new(move || {
        let client = client.clone();
        let id = id.clone();
        let ring = Arc::clone(&ring);
        async move {
            let since = lock(&ring).last_timestamp().map(|ts| ts.timestamp());
            let opts = LogOptions { tail, timestamps: true, since, ..LogOptions::default() };
            let window = client.container_logs(&id, opts).await?;
            let mut ring = lock(&ring);
            let added = ring.merge_window(window);
            tracing::debug!(container = %id, added, total = ring.len(), "merged log window");
            Ok(ring.clone())
        }
        .boxed()
    });

    PollSession::spawn(ResourceKind::Logs, config.poll.logs, fetcher)
}

fn lock(ring: &Mutex<LogBuffer>) -> MutexGuard<'_, LogBuffer> {
    match ring.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
