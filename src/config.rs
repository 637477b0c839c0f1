use std::time::Duration;

use crate::error::TransportError;

pub const DEFAULT_ENDPOINT: &str = "http://127.0.0.1:2375";

/// Poll interval per resource kind.
#[derive(Clone, Debug, PartialEq)]
pub struct PollIntervals {
    pub containers: Duration,
    pub images: Duration,
    pub networks: Duration,
    pub volumes: Duration,
    pub engine: Duration,
    pub logs: Duration,
}

impl Default for PollIntervals {
    fn default() -> Self {
        Self {
            containers: Duration::from_secs(3),
            images: Duration::from_secs(5),
            networks: Duration::from_secs(5),
            volumes: Duration::from_secs(5),
            engine: Duration::from_secs(5),
            logs: Duration::from_secs(2),
        }
    }
}

impl PollIntervals {
    /// Same interval for every kind.
    pub fn uniform(every: Duration) -> Self {
        Self {
            containers: every,
            images: every,
            networks: every,
            volumes: every,
            engine: every,
            logs: every,
        }
    }
}

/// Client-side configuration, passed explicitly into the transport and the
/// components built on top of it.
#[derive(Clone, Debug)]
pub struct ClientConfig {
    endpoint: String,
    pub poll: PollIntervals,
    pub log_tail: usize,
    pub log_capacity: usize,
    pub build_step_delay: Duration,
}

impl ClientConfig {
    pub fn new(endpoint: &str) -> Result<Self, TransportError> {
        Ok(Self {
            endpoint: normalize_endpoint(endpoint)?,
            poll: PollIntervals::default(),
            log_tail: 200,
            log_capacity: 5000,
            build_step_delay: Duration::from_millis(150),
        })
    }

    /// Engine base address, without a trailing slash.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn with_poll(mut self, poll: PollIntervals) -> Self {
        self.poll = poll;
        self
    }

    pub fn with_log_tail(mut self, tail: usize) -> Self {
        self.log_tail = tail;
        self
    }

    pub fn with_log_capacity(mut self, capacity: usize) -> Self {
        self.log_capacity = capacity.max(1);
        self
    }

    pub fn with_build_step_delay(mut self, delay: Duration) -> Self {
        self.build_step_delay = delay;
        self
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            poll: PollIntervals::default(),
            log_tail: 200,
            log_capacity: 5000,
            build_step_delay: Duration::from_millis(150),
        }
    }
}

fn normalize_endpoint(raw: &str) -> Result<String, TransportError> {
    let trimmed = raw.trim().trim_end_matches('/');
    let url = reqwest::Url::parse(trimmed)
        .map_err(|_| TransportError::InvalidEndpoint(raw.to_string()))?;
    if url.scheme() != "http" || url.host_str().is_none() {
        return Err(TransportError::InvalidEndpoint(raw.to_string()));
    }
    Ok(trimmed.to_string())
}
