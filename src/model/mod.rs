// Record types published to collaborators, re-exported flat.

pub use compose::{ComposeRequest, ComposeSession, ComposeState, ServiceInstance};
pub use container::{display_name, short_id, ContainerRecord, ContainerState};
pub use engine::EngineOverview;
pub use image::{ImageRecord, ImageRef};
pub use logs::{LogBuffer, LogLine, LogStream};
pub use network::{is_builtin_network, NetworkRecord, BUILTIN_NETWORKS};
pub use snapshot::{ResourceKind, ResourceSnapshot, Snapshot};
pub use volume::{PruneReport, VolumeRecord};

mod compose;
mod container;
mod engine;
mod image;
mod logs;
mod network;
mod snapshot;
mod volume;
