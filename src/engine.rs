//! Typed engine operations. Each maps to exactly one transport call and one
//! response decode.

use std::collections::HashMap;
use std::sync::Arc;

use bollard::models::{ContainerSummary, Network};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use urlencoding::encode;

use crate::config::ClientConfig;
use crate::error::EngineError;
use crate::logstream::{is_multiplexed, plain_lines, LogStreamDecoder};
use crate::model::{
    ComposeRequest, ContainerRecord, EngineOverview, ImageRecord, ImageRef, LogLine,
    NetworkRecord, PruneReport, ServiceInstance, VolumeRecord,
};
use crate::transport::{HttpTransport, Method, RawResponse, RequestBody, Transport};

/// Parameters for `POST /containers/create`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CreateContainer {
    pub image: String,
    pub name: Option<String>,
    pub port: Option<PortMapping>,
}

/// A single `host:container` TCP port binding.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PortMapping {
    pub host: u16,
    pub container: u16,
}

impl PortMapping {
    /// `"8080:80"` or `"80"` (same port on both sides).
    pub fn parse(mapping: &str) -> Option<Self> {
        let mapping = mapping.trim();
        match mapping.split_once(':') {
            Some((host, container)) => Some(Self {
                host: host.trim().parse().ok()?,
                container: container.trim().parse().ok()?,
            }),
            None => {
                let port = mapping.parse().ok()?;
                Some(Self { host: port, container: port })
            }
        }
    }
}

/// Which streams to request from the log endpoint, and how many lines.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LogOptions {
    pub stdout: bool,
    pub stderr: bool,
    pub tail: usize,
    /// Ask for write times; they end up in `LogLine::timestamp`.
    pub timestamps: bool,
    /// Only lines written at or after this UNIX second.
    pub since: Option<i64>,
}

impl Default for LogOptions {
    fn default() -> Self {
        Self { stdout: true, stderr: true, tail: 200, timestamps: false, since: None }
    }
}

/// Messages streamed back by a successful build request.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BuildOutput {
    pub messages: Vec<String>,
}

// --- Wire shapes the bollard models don't cover ---

#[derive(Deserialize)]
struct IdResponse {
    #[serde(rename = "Id", alias = "ID", alias = "id")]
    id: String,
}

#[derive(Deserialize)]
struct ImageWire {
    #[serde(rename = "Id", alias = "id")]
    id: String,
    #[serde(rename = "RepoTags", alias = "repo_tags", default)]
    repo_tags: Option<Vec<String>>,
    #[serde(rename = "Size", alias = "size", default)]
    size: i64,
    #[serde(rename = "Created", alias = "created", default)]
    created: i64,
}

#[derive(Deserialize)]
struct VolumeWire {
    #[serde(rename = "Name")]
    name: String,
    #[serde(rename = "Driver", default)]
    driver: String,
    #[serde(rename = "Mountpoint", default)]
    mountpoint: String,
    #[serde(rename = "Scope", default)]
    scope: String,
    #[serde(rename = "Labels", default)]
    labels: Option<HashMap<String, String>>,
}

#[derive(Deserialize)]
struct VolumeListWire {
    #[serde(rename = "Volumes", default)]
    volumes: Option<Vec<VolumeWire>>,
}

#[derive(Deserialize)]
struct PruneWire {
    #[serde(rename = "VolumesDeleted", default)]
    volumes_deleted: Option<Vec<String>>,
    #[serde(rename = "SpaceReclaimed", default)]
    space_reclaimed: u64,
}

#[derive(Deserialize)]
struct ComposeUpWire {
    #[serde(default)]
    started: Vec<ServiceInstance>,
}

#[derive(Deserialize, Default)]
struct PlatformWire {
    #[serde(rename = "Name", default)]
    name: String,
}

#[derive(Deserialize)]
struct VersionWire {
    #[serde(rename = "Platform", default)]
    platform: PlatformWire,
    #[serde(rename = "Version", default)]
    version: String,
    #[serde(rename = "ApiVersion", default)]
    api_version: String,
    #[serde(rename = "Os", default)]
    os: String,
    #[serde(rename = "Arch", default)]
    arch: String,
}

#[derive(Deserialize)]
struct InfoWire {
    #[serde(rename = "Containers", default)]
    containers: u64,
    #[serde(rename = "ContainersRunning", default)]
    containers_running: u64,
    #[serde(rename = "ContainersStopped", default)]
    containers_stopped: u64,
    #[serde(rename = "Images", default)]
    images: u64,
    #[serde(rename = "Driver", default)]
    driver: String,
    #[serde(rename = "NCPU", default)]
    ncpu: u64,
    #[serde(rename = "MemTotal", default)]
    mem_total: u64,
    #[serde(rename = "OperatingSystem", default)]
    operating_system: String,
}

impl From<VolumeWire> for VolumeRecord {
    fn from(v: VolumeWire) -> Self {
        VolumeRecord {
            name: v.name,
            driver: v.driver,
            mountpoint: v.mountpoint,
            scope: v.scope,
            labels: v.labels.unwrap_or_default(),
        }
    }
}

/// Typed client for the engine's REST control plane.
#[derive(Clone)]
pub struct EngineClient {
    transport: Arc<dyn Transport>,
}

impl EngineClient {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    /// Client over HTTP to `config.endpoint()`.
    pub fn connect(config: &ClientConfig) -> Self {
        Self::new(Arc::new(HttpTransport::new(config)))
    }

    // --- Containers ---

    /// All containers, stopped ones included.
    pub async fn list_containers(&self) -> Result<Vec<ContainerRecord>, EngineError> {
        let resp = self.call(Method::Get, "/containers/json?all=true", None).await?;
        let summaries: Vec<ContainerSummary> = decode(&resp)?;
        Ok(summaries.iter().map(ContainerRecord::from_summary).collect())
    }

    pub async fn start_container(&self, id: &str) -> Result<(), EngineError> {
        let path = format!("/containers/{}/start", encode(id));
        self.call(Method::Post, &path, None).await.map(|_| ())
    }

    pub async fn stop_container(&self, id: &str) -> Result<(), EngineError> {
        let path = format!("/containers/{}/stop", encode(id));
        self.call(Method::Post, &path, None).await.map(|_| ())
    }

    pub async fn delete_container(&self, id: &str) -> Result<(), EngineError> {
        let path = format!("/containers/{}", encode(id));
        self.call(Method::Delete, &path, None).await.map(|_| ())
    }

    /// Create a container and return its id.
    pub async fn create_container(&self, req: &CreateContainer) -> Result<String, EngineError> {
        let mut path = "/containers/create".to_string();
        if let Some(name) = req.name.as_deref().filter(|n| !n.is_empty()) {
            path.push_str(&format!("?name={}", encode(name)));
        }

        let mut body = json!({ "Image": req.image });
        if let Some(port) = req.port {
            let key = format!("{}/tcp", port.container);
            body["ExposedPorts"] = json!({ key.clone(): {} });
            body["HostConfig"] = json!({
                "PortBindings": { key: [{ "HostPort": port.host.to_string() }] }
            });
        }

        let resp = self.call(Method::Post, &path, Some(RequestBody::json(&body)?)).await?;
        let created: IdResponse = decode(&resp)?;
        Ok(created.id)
    }

    /// Fetch and decode the tail of a container's output.
    pub async fn container_logs(
        &self,
        id: &str,
        opts: LogOptions,
    ) -> Result<Vec<LogLine>, EngineError> {
        let mut path = format!(
            "/containers/{}/logs?stdout={}&stderr={}&tail={}",
            encode(id),
            opts.stdout,
            opts.stderr,
            opts.tail
        );
        if opts.timestamps {
            path.push_str("&timestamps=true");
        }
        if let Some(since) = opts.since {
            path.push_str(&format!("&since={}", since));
        }
        let resp = self.call(Method::Get, &path, None).await?;

        let lines = if !is_multiplexed(resp.content_type.as_deref()) {
            plain_lines(&resp.body)
        } else {
            let mut decoder = LogStreamDecoder::new();
            let lines = decoder.decode(&resp.body)?;
            if decoder.pending() > 0 {
                tracing::debug!(id, pending = decoder.pending(), "log body ended inside a frame");
            }
            lines
        };
        if !opts.timestamps {
            return Ok(lines);
        }
        Ok(lines.into_iter().map(LogLine::split_timestamp).collect())
    }

    // --- Images ---

    pub async fn list_images(&self) -> Result<Vec<ImageRecord>, EngineError> {
        let resp = self.call(Method::Get, "/images/json", None).await?;
        let images: Vec<ImageWire> = decode(&resp)?;
        Ok(images
            .into_iter()
            .map(|i| ImageRecord {
                id: i.id,
                repo_tags: i.repo_tags.unwrap_or_default(),
                size: i.size.max(0) as u64,
                created: i.created,
            })
            .collect())
    }

    /// Pull `reference.repo:reference.tag`. Returns the engine's progress messages.
    pub async fn pull_image(&self, reference: &ImageRef) -> Result<Vec<String>, EngineError> {
        let path = format!(
            "/images/create?fromImage={}&tag={}",
            encode(&reference.repo),
            encode(&reference.tag)
        );
        let resp = self.call(Method::Post, &path, None).await?;
        progress_messages(&resp)
    }

    // --- Networks ---

    pub async fn list_networks(&self) -> Result<Vec<NetworkRecord>, EngineError> {
        let resp = self.call(Method::Get, "/networks", None).await?;
        let networks: Vec<Network> = decode(&resp)?;
        Ok(networks.iter().map(NetworkRecord::from_network).collect())
    }

    /// Create a network and return its id.
    pub async fn create_network(&self, name: &str, driver: &str) -> Result<String, EngineError> {
        let body = RequestBody::json(&json!({ "Name": name, "Driver": driver }))?;
        let resp = self.call(Method::Post, "/networks/create", Some(body)).await?;
        let created: IdResponse = decode(&resp)?;
        Ok(created.id)
    }

    pub async fn delete_network(&self, id: &str) -> Result<(), EngineError> {
        let path = format!("/networks/{}", encode(id));
        self.call(Method::Delete, &path, None).await.map(|_| ())
    }

    // --- Volumes ---

    pub async fn list_volumes(&self) -> Result<Vec<VolumeRecord>, EngineError> {
        let resp = self.call(Method::Get, "/volumes", None).await?;
        let list: VolumeListWire = decode(&resp)?;
        Ok(list.volumes.unwrap_or_default().into_iter().map(VolumeRecord::from).collect())
    }

    pub async fn create_volume(&self, name: &str, driver: &str) -> Result<VolumeRecord, EngineError> {
        let body = RequestBody::json(&json!({ "Name": name, "Driver": driver }))?;
        let resp = self.call(Method::Post, "/volumes/create", Some(body)).await?;
        let created: VolumeWire = decode(&resp)?;
        Ok(created.into())
    }

    pub async fn delete_volume(&self, name: &str) -> Result<(), EngineError> {
        let path = format!("/volumes/{}", encode(name));
        self.call(Method::Delete, &path, None).await.map(|_| ())
    }

    pub async fn prune_volumes(&self) -> Result<PruneReport, EngineError> {
        let resp = self.call(Method::Delete, "/volumes/prune", None).await?;
        let pruned: PruneWire = decode(&resp)?;
        Ok(PruneReport {
            deleted: pruned.volumes_deleted.unwrap_or_default(),
            space_reclaimed: pruned.space_reclaimed,
        })
    }

    // --- Compose ---

    pub async fn compose_up(
        &self,
        compose_yaml: &str,
        project: &str,
    ) -> Result<Vec<ServiceInstance>, EngineError> {
        let body = RequestBody::json(&ComposeRequest { compose_yaml, project_name: project })?;
        let resp = self.call(Method::Post, "/compose/up", Some(body)).await?;
        let up: ComposeUpWire = decode(&resp)?;
        Ok(up.started)
    }

    pub async fn compose_down(&self, compose_yaml: &str, project: &str) -> Result<(), EngineError> {
        let body = RequestBody::json(&ComposeRequest { compose_yaml, project_name: project })?;
        self.call(Method::Post, "/compose/down", Some(body)).await.map(|_| ())
    }

    // --- Build ---

    /// Send a build context (a tar archive holding `dockerfile`) to the engine.
    pub async fn build(
        &self,
        tag: &str,
        dockerfile: &str,
        context: Vec<u8>,
    ) -> Result<BuildOutput, EngineError> {
        let path = format!("/build?t={}&dockerfile={}", encode(tag), encode(dockerfile));
        let resp = self.call(Method::Post, &path, Some(RequestBody::Binary(context))).await?;
        Ok(BuildOutput { messages: progress_messages(&resp)? })
    }

    // --- Engine ---

    pub async fn overview(&self) -> Result<EngineOverview, EngineError> {
        let version: VersionWire = decode(&self.call(Method::Get, "/version", None).await?)?;
        let info: InfoWire = decode(&self.call(Method::Get, "/info", None).await?)?;
        Ok(EngineOverview {
            platform: version.platform.name,
            version: version.version,
            api_version: version.api_version,
            os: version.os,
            arch: version.arch,
            operating_system: info.operating_system,
            driver: info.driver,
            containers: info.containers,
            containers_running: info.containers_running,
            containers_stopped: info.containers_stopped,
            images: info.images,
            ncpu: info.ncpu,
            mem_total: info.mem_total,
        })
    }

    // --- Internal helpers ---

    /// One round-trip; non-2xx answers become `EngineError::Engine`.
    async fn call(
        &self,
        method: Method,
        path: &str,
        body: Option<RequestBody>,
    ) -> Result<RawResponse, EngineError> {
        let resp = self.transport.request(method, path, body).await?;
        if resp.is_success() {
            Ok(resp)
        } else {
            Err(engine_error(resp.status, &resp.body))
        }
    }
}

// --- Free helper functions ---

/// Build the error for a non-2xx response: the body's `error` or `message`
/// field, else the raw body text, else the status reason.
pub fn engine_error(status: u16, body: &[u8]) -> EngineError {
    let message = error_field(body).unwrap_or_else(|| {
        let raw = String::from_utf8_lossy(body).trim().to_string();
        if raw.is_empty() {
            reqwest::StatusCode::from_u16(status)
                .ok()
                .and_then(|s| s.canonical_reason())
                .unwrap_or("request failed")
                .to_string()
        } else {
            raw
        }
    });
    EngineError::Engine { status, message }
}

fn error_field(body: &[u8]) -> Option<String> {
    let value: serde_json::Value = serde_json::from_slice(body).ok()?;
    ["error", "message"]
        .iter()
        .find_map(|key| value.get(*key).and_then(|v| v.as_str()).map(|s| s.to_string()))
}

fn decode<T: DeserializeOwned>(resp: &RawResponse) -> Result<T, EngineError> {
    serde_json::from_slice(&resp.body).map_err(|e| {
        EngineError::Decode(format!("{} (status {}, {} bytes)", e, resp.status, resp.body.len()))
    })
}

/// Progress lines of a pull/build response. Bodies are JSON objects (one per
/// line) or plain text; an object carrying `error` turns the whole call into
/// a failure even though the status was 2xx.
fn progress_messages(resp: &RawResponse) -> Result<Vec<String>, EngineError> {
    let text = String::from_utf8_lossy(&resp.body);
    let mut messages = Vec::new();
    for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
        let Ok(value) = serde_json::from_str::<serde_json::Value>(line) else {
            messages.push(line.to_string());
            continue;
        };
        if let Some(err) = value.get("error").and_then(|e| e.as_str()) {
            return Err(EngineError::Engine { status: resp.status, message: err.to_string() });
        }
        let msg = value
            .get("stream")
            .or_else(|| value.get("status"))
            .and_then(|m| m.as_str())
            .map(|m| m.trim_end().to_string());
        if let Some(msg) = msg.filter(|m| !m.is_empty()) {
            messages.push(msg);
        }
    }
    Ok(messages)
}
