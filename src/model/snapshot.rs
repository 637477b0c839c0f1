use std::fmt;

use chrono::{DateTime, Utc};

/// Resource collections the live state is kept for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Containers,
    Images,
    Networks,
    Volumes,
    Engine,
    Logs,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ResourceKind::Containers => "containers",
            ResourceKind::Images => "images",
            ResourceKind::Networks => "networks",
            ResourceKind::Volumes => "volumes",
            ResourceKind::Engine => "engine",
            ResourceKind::Logs => "logs",
        })
    }
}

/// A complete fetch result. Never patched in place: a newer fetch replaces it.
#[derive(Clone, Debug, PartialEq)]
pub struct Snapshot<P> {
    pub data: P,
    pub fetched_at: DateTime<Utc>,
    pub seq: u64,   // assigned when the fetch started
}

pub type ResourceSnapshot<T> = Snapshot<Vec<T>>;
