//! End-to-end tests against a mock engine.
//!
//! Covers the resource client (paths, decoding, error extraction), the
//! reconciliation loop, the dispatcher's forced refreshes and local
//! rejections, the build fallback and log sessions.

use std::time::Duration;

use enginectl::config::PollIntervals;
use enginectl::dispatcher::{BuildRequest, SIMULATED_TAG};
use enginectl::engine::{CreateContainer, LogOptions, PortMapping};
use enginectl::model::{ComposeState, ContainerState, ImageRef, LogStream};
use enginectl::poll::{self, SessionState};
use enginectl::{ClientConfig, Dispatcher, EngineClient, EngineError};
use mockito::{Matcher, Server};
use serde_json::json;
use tokio::sync::{mpsc, watch};

fn config_for(server: &Server) -> ClientConfig {
    ClientConfig::new(&server.url())
        .unwrap()
        .with_poll(PollIntervals::uniform(Duration::from_secs(60)))
        .with_build_step_delay(Duration::from_millis(1))
}

fn offline_config() -> ClientConfig {
    ClientConfig::new("http://127.0.0.1:1").unwrap()
}

fn frame(tag: u8, payload: &str) -> Vec<u8> {
    let mut out = vec![tag, 0, 0, 0];
    out.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    out.extend_from_slice(payload.as_bytes());
    out
}

fn containers_body(web_state: &str) -> String {
    json!([
        {
            "Id": "a1b2c3d4e5f6a7b8c9d0",
            "Names": ["/web-1"],
            "Image": "nginx:alpine",
            "State": web_state,
            "Status": if web_state == "running" { "Up 2 minutes" } else { "Exited (0) 1 second ago" },
            "Created": 1_700_000_000,
            "Ports": []
        },
        {
            "Id": "ffeeddccbbaa99887766",
            "Names": [],
            "Image": "redis:7",
            "State": "exited",
            "Status": "Exited (0) 3 hours ago",
            "Created": 1_700_000_100,
            "Ports": []
        }
    ])
    .to_string()
}

async fn next_publication<P: Clone>(rx: &mut watch::Receiver<P>) -> P {
    tokio::time::timeout(Duration::from_secs(5), rx.changed())
        .await
        .expect("no publication within 5s")
        .expect("session dropped");
    rx.borrow_and_update().clone()
}

// --- Resource client ---

#[tokio::test]
async fn list_containers_derives_display_names() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", "/containers/json?all=true")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(containers_body("running"))
        .create_async()
        .await;

    let client = EngineClient::connect(&config_for(&server));
    let containers = client.list_containers().await.unwrap();

    assert_eq!(containers.len(), 2);
    assert_eq!(containers[0].name, "web-1");
    assert_eq!(containers[0].state, ContainerState::Running);
    assert_eq!(containers[1].name, "ffeeddccbbaa");
    assert_eq!(containers[1].state, ContainerState::Exited);
    mock.assert_async().await;
}

#[tokio::test]
async fn engine_error_messages_are_verbatim() {
    let mut server = Server::new_async().await;
    server
        .mock("POST", "/containers/nope/start")
        .with_status(404)
        .with_header("content-type", "application/json")
        .with_body(r#"{"message":"No such container: nope"}"#)
        .create_async()
        .await;
    server
        .mock("POST", "/containers/busy/stop")
        .with_status(500)
        .with_body("driver failed to stop container\n")
        .create_async()
        .await;

    let client = EngineClient::connect(&config_for(&server));

    let err = client.start_container("nope").await.unwrap_err();
    assert_eq!(err, EngineError::Engine { status: 404, message: "No such container: nope".into() });
    assert!(!err.is_offline());

    let err = client.stop_container("busy").await.unwrap_err();
    assert_eq!(
        err,
        EngineError::Engine { status: 500, message: "driver failed to stop container".into() }
    );
}

#[tokio::test]
async fn unexpected_body_is_a_decode_error() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/images/json")
        .with_status(200)
        .with_body("<html>not an engine</html>")
        .create_async()
        .await;

    let client = EngineClient::connect(&config_for(&server));
    assert!(matches!(client.list_images().await, Err(EngineError::Decode(_))));
}

#[tokio::test]
async fn unreachable_engine_is_offline() {
    let client = EngineClient::connect(&offline_config());
    let err = client.list_volumes().await.unwrap_err();
    assert!(err.is_offline(), "{:?}", err);
}

#[tokio::test]
async fn create_container_sends_name_and_port_binding() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/containers/create?name=web")
        .match_header("content-type", "application/json")
        .match_body(Matcher::PartialJson(json!({
            "Image": "nginx:alpine",
            "ExposedPorts": { "80/tcp": {} },
            "HostConfig": { "PortBindings": { "80/tcp": [{ "HostPort": "8080" }] } }
        })))
        .with_status(201)
        .with_body(r#"{"Id":"0123456789abcdef0123","Warnings":[]}"#)
        .create_async()
        .await;

    let client = EngineClient::connect(&config_for(&server));
    let req = CreateContainer {
        image: "nginx:alpine".into(),
        name: Some("web".into()),
        port: PortMapping::parse("8080:80"),
    };
    assert_eq!(client.create_container(&req).await.unwrap(), "0123456789abcdef0123");
    mock.assert_async().await;
}

#[tokio::test]
async fn pull_uses_default_tag_and_fails_on_error_entry() {
    let mut server = Server::new_async().await;
    let ok = server
        .mock("POST", "/images/create?fromImage=nginx&tag=latest")
        .with_status(200)
        .with_body("{\"status\":\"Pulling from library/nginx\"}\n{\"status\":\"Download complete\"}\n")
        .create_async()
        .await;
    server
        .mock("POST", "/images/create?fromImage=ghost&tag=v9")
        .with_status(200)
        .with_body("{\"error\":\"manifest for ghost:v9 not found\"}\n")
        .create_async()
        .await;

    let client = EngineClient::connect(&config_for(&server));
    let progress = client.pull_image(&ImageRef::parse("nginx")).await.unwrap();
    assert_eq!(progress, vec!["Pulling from library/nginx", "Download complete"]);
    ok.assert_async().await;

    let err = client.pull_image(&ImageRef::new("ghost", Some("v9"))).await.unwrap_err();
    assert_eq!(
        err,
        EngineError::Engine { status: 200, message: "manifest for ghost:v9 not found".into() }
    );
}

#[tokio::test]
async fn volumes_list_create_and_prune() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/volumes")
        .with_status(200)
        .with_body(
            json!({
                "Volumes": [
                    { "Name": "data", "Driver": "local", "Mountpoint": "/var/lib/engine/volumes/data", "Scope": "local", "Labels": null }
                ],
                "Warnings": null
            })
            .to_string(),
        )
        .create_async()
        .await;
    server
        .mock("POST", "/volumes/create")
        .match_body(Matcher::Json(json!({ "Name": "cache", "Driver": "local" })))
        .with_status(201)
        .with_body(json!({ "Name": "cache", "Driver": "local", "Mountpoint": "/v/cache", "Scope": "local" }).to_string())
        .create_async()
        .await;
    let prune = server
        .mock("DELETE", "/volumes/prune")
        .with_status(200)
        .with_body(json!({ "VolumesDeleted": ["old", "tmp"], "SpaceReclaimed": 4096 }).to_string())
        .create_async()
        .await;

    let client = EngineClient::connect(&config_for(&server));

    let volumes = client.list_volumes().await.unwrap();
    assert_eq!(volumes.len(), 1);
    assert_eq!(volumes[0].mountpoint, "/var/lib/engine/volumes/data");
    assert!(volumes[0].labels.is_empty());

    assert_eq!(client.create_volume("cache", "local").await.unwrap().name, "cache");

    let report = client.prune_volumes().await.unwrap();
    assert_eq!(report.deleted, vec!["old", "tmp"]);
    assert_eq!(report.space_reclaimed, 4096);
    prune.assert_async().await;
}

#[tokio::test]
async fn networks_list_and_create() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/networks")
        .with_status(200)
        .with_body(
            json!([
                { "Id": "n0", "Name": "bridge", "Driver": "bridge", "Scope": "local", "Labels": {} },
                { "Id": "n1", "Name": "backend", "Driver": "bridge", "Scope": "local", "Labels": { "tier": "db" } }
            ])
            .to_string(),
        )
        .create_async()
        .await;
    server
        .mock("POST", "/networks/create")
        .match_body(Matcher::PartialJson(json!({ "Name": "frontend" })))
        .with_status(201)
        .with_body(r#"{"Id":"9f8e7d6c5b4a39281706"}"#)
        .create_async()
        .await;

    let client = EngineClient::connect(&config_for(&server));
    let networks = client.list_networks().await.unwrap();
    assert!(networks[0].is_builtin());
    assert!(!networks[1].is_builtin());
    assert_eq!(networks[1].labels.get("tier").map(String::as_str), Some("db"));

    assert_eq!(client.create_network("frontend", "bridge").await.unwrap(), "9f8e7d6c5b4a39281706");
}

#[tokio::test]
async fn overview_combines_version_and_info() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/version")
        .with_status(200)
        .with_body(
            json!({ "Platform": { "Name": "Engine" }, "Version": "0.3.0", "ApiVersion": "1.43", "Os": "linux", "Arch": "x86_64" })
                .to_string(),
        )
        .create_async()
        .await;
    server
        .mock("GET", "/info")
        .with_status(200)
        .with_body(
            json!({
                "Containers": 3, "ContainersRunning": 1, "ContainersStopped": 2, "Images": 5,
                "Driver": "overlay2", "NCPU": 8, "MemTotal": 16_777_216u64, "OperatingSystem": "Ubuntu 22.04"
            })
            .to_string(),
        )
        .create_async()
        .await;

    let client = EngineClient::connect(&config_for(&server));
    let o = client.overview().await.unwrap();
    assert_eq!(o.version, "0.3.0");
    assert_eq!(o.api_version, "1.43");
    assert_eq!(o.containers_running, 1);
    assert_eq!(o.ncpu, 8);
    assert_eq!(o.operating_system, "Ubuntu 22.04");
}

// --- Logs ---

#[tokio::test]
async fn multiplexed_logs_keep_wire_order() {
    let mut body = vec![0x01, 0, 0, 0, 0, 0, 0, 0x05];
    body.extend_from_slice(b"hello");
    body.extend_from_slice(&[0x02, 0, 0, 0, 0, 0, 0, 0x03]);
    body.extend_from_slice(b"bye");

    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", "/containers/web/logs?stdout=true&stderr=true&tail=50")
        .with_status(200)
        .with_header("content-type", "application/vnd.docker.multiplexed-stream")
        .with_body(body)
        .create_async()
        .await;

    let client = EngineClient::connect(&config_for(&server));
    let lines = client
        .container_logs("web", LogOptions { tail: 50, ..LogOptions::default() })
        .await
        .unwrap();

    let got: Vec<(LogStream, &str)> = lines.iter().map(|l| (l.stream, l.text.as_str())).collect();
    assert_eq!(got, vec![(LogStream::Stdout, "hello"), (LogStream::Stderr, "bye")]);
    mock.assert_async().await;
}

#[tokio::test]
async fn plain_text_logs_are_not_decoded_as_frames() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/containers/tty/logs?stdout=true&stderr=true&tail=200")
        .with_status(200)
        .with_header("content-type", "text/plain; charset=utf-8")
        .with_body("line one\nline two\n")
        .create_async()
        .await;

    let client = EngineClient::connect(&config_for(&server));
    let lines = client.container_logs("tty", LogOptions::default()).await.unwrap();
    assert_eq!(lines.len(), 2);
    assert!(lines.iter().all(|l| l.stream == LogStream::Stdout));
}

#[tokio::test]
async fn bad_stream_tag_is_a_protocol_error() {
    let mut body = frame(1, "fine\n");
    body.extend(frame(9, "garbage"));

    let mut server = Server::new_async().await;
    server
        .mock("GET", "/containers/web/logs?stdout=true&stderr=true&tail=200")
        .with_status(200)
        .with_header("content-type", "application/vnd.docker.multiplexed-stream")
        .with_body(body)
        .create_async()
        .await;

    let client = EngineClient::connect(&config_for(&server));
    let err = client.container_logs("web", LogOptions::default()).await.unwrap_err();
    assert!(matches!(err, EngineError::Protocol(_)), "{:?}", err);
}

fn stamped(tag: u8, secs: u32, text: &str) -> Vec<u8> {
    frame(tag, &format!("2024-05-01T10:00:{:02}.000000000Z {}\n", secs, text))
}

#[tokio::test]
async fn log_session_merges_overlapping_windows() {
    let mut first = stamped(1, 0, "boot");
    first.extend(stamped(1, 1, "ready"));
    let mut second = stamped(1, 1, "ready");
    second.extend(stamped(2, 2, "warn: slow request"));

    let mut server = Server::new_async().await;
    let m1 = server
        .mock("GET", "/containers/web/logs")
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("tail".into(), "200".into()),
            Matcher::UrlEncoded("timestamps".into(), "true".into()),
        ]))
        .with_status(200)
        .with_header("content-type", "application/vnd.docker.multiplexed-stream")
        .with_body(first)
        .create_async()
        .await;

    let config = config_for(&server);
    let client = EngineClient::connect(&config);
    let session = poll::container_logs(&client, "web", &config);
    let mut rx = session.subscribe();

    let p = next_publication(&mut rx).await;
    assert_eq!(p.snapshot.unwrap().data.len(), 2);
    m1.remove_async().await;

    // Later polls start from the second of the newest line held.
    let m2 = server
        .mock("GET", "/containers/web/logs")
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("timestamps".into(), "true".into()),
            Matcher::UrlEncoded("since".into(), "1714557601".into()),
        ]))
        .with_status(200)
        .with_header("content-type", "application/vnd.docker.multiplexed-stream")
        .with_body(second)
        .create_async()
        .await;
    assert!(session.refresh().await);
    m2.assert_async().await;

    let snapshot = session.latest().snapshot.unwrap();
    let texts: Vec<&str> = snapshot.data.lines().map(|l| l.text.as_str()).collect();
    assert_eq!(texts, vec!["boot", "ready", "warn: slow request"]);
}

#[tokio::test]
async fn log_session_keeps_repeated_heartbeat_lines() {
    let window = |from: u32| {
        let mut body = Vec::new();
        for secs in from..from + 3 {
            body.extend(stamped(1, secs, "ping"));
        }
        body
    };

    let mut server = Server::new_async().await;
    let m1 = server
        .mock("GET", "/containers/hb/logs")
        .match_query(Matcher::UrlEncoded("timestamps".into(), "true".into()))
        .with_status(200)
        .with_header("content-type", "application/vnd.docker.multiplexed-stream")
        .with_body(window(0))
        .create_async()
        .await;

    let config = config_for(&server).with_log_tail(3);
    let client = EngineClient::connect(&config);
    let session = poll::container_logs(&client, "hb", &config);
    let mut rx = session.subscribe();
    assert_eq!(next_publication(&mut rx).await.snapshot.unwrap().data.len(), 3);
    m1.remove_async().await;

    // Two more pings; the tail window is still three identical lines.
    server
        .mock("GET", "/containers/hb/logs")
        .match_query(Matcher::UrlEncoded("timestamps".into(), "true".into()))
        .with_status(200)
        .with_header("content-type", "application/vnd.docker.multiplexed-stream")
        .with_body(window(2))
        .create_async()
        .await;
    assert!(session.refresh().await);

    let snapshot = session.latest().snapshot.unwrap();
    assert_eq!(snapshot.data.len(), 5);
    assert!(snapshot.data.lines().all(|l| l.text == "ping"));
}

// --- Reconciliation loop ---

#[tokio::test]
async fn stop_forces_fresh_snapshot_of_container_state() {
    let mut server = Server::new_async().await;
    let running = server
        .mock("GET", "/containers/json?all=true")
        .with_status(200)
        .with_body(containers_body("running"))
        .create_async()
        .await;

    let config = config_for(&server);
    let client = EngineClient::connect(&config);
    let session = poll::containers(&client, &config);
    let mut rx = session.subscribe();

    let first = next_publication(&mut rx).await.snapshot.unwrap();
    let web = first.data.iter().find(|c| c.name == "web-1").unwrap();
    assert!(web.state.is_running());
    running.remove_async().await;

    server
        .mock("POST", "/containers/a1b2c3d4e5f6a7b8c9d0/stop")
        .with_status(204)
        .create_async()
        .await;
    server
        .mock("GET", "/containers/json?all=true")
        .with_status(200)
        .with_body(containers_body("exited"))
        .create_async()
        .await;

    let dispatcher = Dispatcher::new(client.clone(), config.clone());
    dispatcher.register(session.refresher());
    let msg = dispatcher.stop_container("a1b2c3d4e5f6a7b8c9d0").await.unwrap();
    assert_eq!(msg, "Stopped a1b2c3d4e5f6a7b8c9d0");

    // Published by the forced refresh; the timer is a minute away.
    let forced = session.latest().snapshot.unwrap();
    assert!(forced.seq > first.seq);
    let web = forced.data.iter().find(|c| c.name == "web-1").unwrap();
    assert!(!web.state.is_running());
    assert_eq!(forced.data.len(), 2);
}

#[tokio::test]
async fn snapshots_replace_rather_than_merge() {
    let mut server = Server::new_async().await;
    let both = server
        .mock("GET", "/containers/json?all=true")
        .with_status(200)
        .with_body(containers_body("running"))
        .create_async()
        .await;

    let config = config_for(&server);
    let client = EngineClient::connect(&config);
    let session = poll::containers(&client, &config);
    let mut rx = session.subscribe();
    assert_eq!(next_publication(&mut rx).await.snapshot.unwrap().data.len(), 2);
    both.remove_async().await;

    // A failed poll keeps the last good snapshot and reports the error.
    let failing = server
        .mock("GET", "/containers/json?all=true")
        .with_status(500)
        .with_body(r#"{"message":"database is locked"}"#)
        .create_async()
        .await;
    assert!(session.refresh().await);
    let p = session.latest();
    assert_eq!(p.snapshot.as_ref().unwrap().data.len(), 2);
    assert_eq!(p.last_error.as_ref().and_then(|e| e.status()), Some(500));
    assert!(p.connectivity.is_online());
    failing.remove_async().await;

    server
        .mock("GET", "/containers/json?all=true")
        .with_status(200)
        .with_body(json!([{ "Id": "ffeeddccbbaa99887766", "Names": ["/cache"], "State": "running" }]).to_string())
        .create_async()
        .await;
    assert!(session.refresh().await);
    let p = session.latest();
    let data = &p.snapshot.as_ref().unwrap().data;
    assert_eq!(data.len(), 1);
    assert_eq!(data[0].name, "cache");
    assert!(p.last_error.is_none());
}

#[tokio::test]
async fn stopped_session_issues_no_more_requests() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", "/networks")
        .with_status(200)
        .with_body("[]")
        .expect(1)
        .create_async()
        .await;

    let config = ClientConfig::new(&server.url())
        .unwrap()
        .with_poll(PollIntervals::uniform(Duration::from_millis(200)));
    let client = EngineClient::connect(&config);
    let mut session = poll::networks(&client, &config);
    let mut rx = session.subscribe();

    next_publication(&mut rx).await;
    session.stop();
    assert_eq!(session.state(), SessionState::Stopped);

    tokio::time::sleep(Duration::from_millis(700)).await;
    assert!(!session.refresh().await);
    assert!(!rx.has_changed().unwrap_or(false));
    mock.assert_async().await;
}

#[tokio::test]
async fn unreachable_engine_publishes_offline() {
    let config = offline_config();
    let client = EngineClient::connect(&config);
    let session = poll::engine_overview(&client, &config);
    let mut rx = session.subscribe();

    let p = next_publication(&mut rx).await;
    assert!(p.snapshot.is_none());
    assert!(!p.connectivity.is_online());
    assert!(p.last_error.unwrap().is_offline());
}

// --- Dispatcher ---

#[tokio::test]
async fn second_compose_up_is_rejected_without_a_request() {
    let mut server = Server::new_async().await;
    let up = server
        .mock("POST", "/compose/up")
        .match_body(Matcher::Json(json!({ "compose_yaml": "services: {}\n", "project_name": "shop" })))
        .with_status(200)
        .with_body(json!({ "started": [{ "service_name": "web", "container_id": "c0ffee" }] }).to_string())
        .expect(1)
        .create_async()
        .await;

    let config = config_for(&server);
    let dispatcher = Dispatcher::new(EngineClient::connect(&config), config);

    let msg = dispatcher.compose_up("services: {}\n", "shop").await.unwrap();
    assert_eq!(msg, "Started 1 service(s) for shop");
    assert_eq!(dispatcher.compose_session("shop").state, ComposeState::Up);

    let err = dispatcher.compose_up("services: {}\n", "shop").await.unwrap_err();
    assert!(matches!(err, EngineError::Rejected(_)), "{:?}", err);
    up.assert_async().await;

    server
        .mock("POST", "/compose/down")
        .with_status(200)
        .with_body("{}")
        .create_async()
        .await;
    dispatcher.compose_down("services: {}\n", "shop").await.unwrap();
    let session = dispatcher.compose_session("shop");
    assert_eq!(session.state, ComposeState::Idle);
    assert!(session.services.is_empty());
}

#[tokio::test]
async fn failed_compose_up_records_error_state() {
    let mut server = Server::new_async().await;
    server
        .mock("POST", "/compose/up")
        .with_status(400)
        .with_body(r#"{"error":"invalid compose file: services must be a mapping"}"#)
        .create_async()
        .await;

    let config = config_for(&server);
    let dispatcher = Dispatcher::new(EngineClient::connect(&config), config);

    let err = dispatcher.compose_up("services: []", "shop").await.unwrap_err();
    assert_eq!(
        err,
        EngineError::Engine { status: 400, message: "invalid compose file: services must be a mapping".into() }
    );
    let session = dispatcher.compose_session("shop");
    assert_eq!(session.state, ComposeState::Error);
    assert!(session.last_error.unwrap().contains("services must be a mapping"));
}

#[tokio::test]
async fn builtin_network_removal_never_reaches_engine() {
    let mut server = Server::new_async().await;
    let mock = server.mock("DELETE", "/networks/bridge").expect(0).create_async().await;

    let config = config_for(&server);
    let dispatcher = Dispatcher::new(EngineClient::connect(&config), config);
    assert!(matches!(dispatcher.delete_network("bridge").await, Err(EngineError::Rejected(_))));
    mock.assert_async().await;
}

#[tokio::test]
async fn create_with_failed_start_is_partial_success() {
    let mut server = Server::new_async().await;
    server
        .mock("POST", "/containers/create")
        .with_status(201)
        .with_body(r#"{"Id":"abcdef1234567890","Warnings":[]}"#)
        .create_async()
        .await;
    server
        .mock("POST", "/containers/abcdef1234567890/start")
        .with_status(500)
        .with_body(r#"{"message":"port 8080 already allocated"}"#)
        .create_async()
        .await;

    let config = config_for(&server);
    let dispatcher = Dispatcher::new(EngineClient::connect(&config), config);
    let req = CreateContainer { image: "nginx".into(), ..Default::default() };
    let msg = dispatcher.create_container(&req, true).await.unwrap();
    assert!(msg.contains("abcdef123456 created but failed to start"), "{}", msg);
    assert!(msg.contains("port 8080 already allocated"), "{}", msg);
}

#[tokio::test]
async fn build_without_archive_falls_back_to_simulation() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/build?t=demo%3Alatest&dockerfile=Dockerfile")
        .with_status(500)
        .with_body(r#"{"message":"Cannot read Dockerfile"}"#)
        .create_async()
        .await;

    let config = config_for(&server);
    let dispatcher = Dispatcher::new(EngineClient::connect(&config), config);
    let req = BuildRequest {
        tag: "demo:latest".into(),
        dockerfile: "# base image\nFROM alpine:latest\n\nWORKDIR /app\n   \nCMD [\"sh\"]\n".into(),
        context: None,
    };

    let (tx, mut rx) = mpsc::channel(16);
    let report = dispatcher.build(&req, Some(tx)).await.unwrap();

    assert!(report.simulated);
    assert_eq!(report.lines.len(), 4);
    assert!(report.lines.iter().all(|l| l.starts_with(SIMULATED_TAG)));
    assert!(report.lines[0].ends_with("FROM alpine:latest"));
    assert!(report.lines[3].contains("demo:latest"));

    let mut streamed = Vec::new();
    while let Ok(line) = rx.try_recv() {
        streamed.push(line);
    }
    assert_eq!(streamed, report.lines);
    mock.assert_async().await;
}

#[tokio::test]
async fn build_with_archive_uses_engine_output() {
    let mut server = Server::new_async().await;
    server
        .mock("POST", "/build?t=demo&dockerfile=Dockerfile")
        .match_header("content-type", "application/octet-stream")
        .with_status(200)
        .with_body("{\"stream\":\"Step 1/1 : FROM alpine\\n\"}\n{\"stream\":\"Successfully tagged demo\\n\"}\n")
        .create_async()
        .await;

    let config = config_for(&server);
    let dispatcher = Dispatcher::new(EngineClient::connect(&config), config);
    let req = BuildRequest {
        tag: "demo".into(),
        dockerfile: "FROM alpine\n".into(),
        context: Some(vec![0u8; 1024]),
    };
    let report = dispatcher.build(&req, None).await.unwrap();
    assert!(!report.simulated);
    assert_eq!(report.lines, vec!["Step 1/1 : FROM alpine", "Successfully tagged demo"]);
}

#[tokio::test]
async fn build_against_offline_engine_is_an_error() {
    let config = offline_config();
    let dispatcher = Dispatcher::new(EngineClient::connect(&config), config);
    let req = BuildRequest { tag: "demo".into(), dockerfile: "FROM alpine\n".into(), context: None };
    let err = dispatcher.build(&req, None).await.unwrap_err();
    assert!(err.is_offline());
}
