mod live;
pub mod render;

use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::time::Duration;

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use tokio::sync::mpsc;

use crate::config::{ClientConfig, PollIntervals, DEFAULT_ENDPOINT};
use crate::dispatcher::{BuildRequest, Dispatcher};
use crate::engine::{CreateContainer, EngineClient, LogOptions, PortMapping};
use crate::error::{EngineError, TransportError};
use crate::model::{ImageRef, LogStream};
use crate::poll;

#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error(transparent)]
    Config(#[from] TransportError),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Io(#[from] io::Error),

    #[error("{0}")]
    Usage(String),
}

#[derive(Parser, Debug)]
#[command(name = "enginectl", version, about = "Control client for a remote container engine")]
pub struct Cli {
    /// Engine base address.
    #[arg(long, env = "ENGINE_ENDPOINT", default_value = DEFAULT_ENDPOINT)]
    pub endpoint: String,

    /// Poll every N seconds instead of the per-kind defaults.
    #[arg(long, env = "ENGINE_POLL_SECS")]
    pub poll_secs: Option<u64>,

    /// Lines requested per log fetch.
    #[arg(long, env = "ENGINE_LOG_TAIL", default_value_t = 200)]
    pub log_tail: usize,

    /// Debug logging (RUST_LOG takes precedence).
    #[arg(short, long)]
    pub verbose: bool,

    /// Write logs to this file instead of stderr.
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List containers
    Ps,
    /// List images
    Images,
    /// List networks
    Networks,
    /// List volumes
    Volumes,
    /// Engine version and counters
    Info,
    /// Start a container
    Start { id: String },
    /// Stop a container
    Stop { id: String },
    /// Remove a container
    Rm {
        id: String,
        #[arg(short, long)]
        yes: bool,
    },
    /// Create a container
    Create {
        image: String,
        #[arg(long)]
        name: Option<String>,
        /// host:container or a single port
        #[arg(short, long)]
        publish: Option<String>,
        /// Start it after creating it
        #[arg(long)]
        start: bool,
    },
    /// Pull an image (repo[:tag])
    Pull { reference: String },
    /// Create a network
    NetworkCreate {
        name: String,
        #[arg(long, default_value = "bridge")]
        driver: String,
    },
    /// Remove a network
    NetworkRm {
        name: String,
        #[arg(short, long)]
        yes: bool,
    },
    /// Create a volume
    VolumeCreate {
        name: String,
        #[arg(long, default_value = "local")]
        driver: String,
    },
    /// Remove a volume
    VolumeRm {
        name: String,
        #[arg(short, long)]
        yes: bool,
    },
    /// Remove all unused volumes
    VolumePrune {
        #[arg(short, long)]
        yes: bool,
    },
    /// Bring a compose project up
    ComposeUp {
        #[arg(short, long, default_value = "docker-compose.yml")]
        file: PathBuf,
        #[arg(short, long)]
        project: Option<String>,
    },
    /// Tear a compose project down
    ComposeDown {
        #[arg(short, long, default_value = "docker-compose.yml")]
        file: PathBuf,
        #[arg(short, long)]
        project: Option<String>,
        #[arg(short, long)]
        yes: bool,
    },
    /// Build an image
    Build {
        #[arg(short, long)]
        tag: String,
        /// Dockerfile path (default: <context>/Dockerfile)
        #[arg(short, long)]
        file: Option<PathBuf>,
        /// Directory sent to the engine as the build context
        context: Option<PathBuf>,
    },
    /// Show a container's logs
    Logs {
        id: String,
        #[arg(short, long)]
        follow: bool,
    },
    /// Live view of one resource kind
    Watch { kind: WatchKind },
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum WatchKind {
    Containers,
    Images,
    Networks,
    Volumes,
    Engine,
}

impl Cli {
    pub fn client_config(&self) -> Result<ClientConfig, TransportError> {
        let mut config = ClientConfig::new(&self.endpoint)?.with_log_tail(self.log_tail);
        if let Some(secs) = self.poll_secs {
            config = config.with_poll(PollIntervals::uniform(Duration::from_secs(secs.max(1))));
        }
        Ok(config)
    }
}

/// Execute one command. Live views run until `should_quit` is set or the
/// user presses `q`.
pub async fn run(cli: Cli, should_quit: Arc<AtomicBool>) -> Result<(), CliError> {
    let config = cli.client_config()?;
    let client = EngineClient::connect(&config);
    let dispatcher = Dispatcher::new(client.clone(), config.clone());
    let now = Utc::now();

    match cli.command {
        Command::Ps => print_lines(render::containers_table(&client.list_containers().await?, now)),
        Command::Images => print_lines(render::images_table(&client.list_images().await?, now)),
        Command::Networks => print_lines(render::networks_table(&client.list_networks().await?)),
        Command::Volumes => print_lines(render::volumes_table(&client.list_volumes().await?)),
        Command::Info => print_lines(render::overview_lines(&client.overview().await?)),

        Command::Start { id } => report(dispatcher.start_container(&id).await?),
        Command::Stop { id } => report(dispatcher.stop_container(&id).await?),
        Command::Rm { id, yes } => {
            if confirm(&format!("Remove container {}?", id), yes).await? {
                report(dispatcher.delete_container(&id).await?);
            }
        }
        Command::Create { image, name, publish, start } => {
            let port = match publish.as_deref() {
                Some(mapping) => Some(
                    PortMapping::parse(mapping)
                        .ok_or_else(|| CliError::Usage(format!("invalid port mapping '{}'", mapping)))?,
                ),
                None => None,
            };
            let req = CreateContainer { image, name, port };
            report(dispatcher.create_container(&req, start).await?);
        }
        Command::Pull { reference } => {
            report(dispatcher.pull_image(&ImageRef::parse(&reference)).await?)
        }

        Command::NetworkCreate { name, driver } => {
            report(dispatcher.create_network(&name, &driver).await?)
        }
        Command::NetworkRm { name, yes } => {
            if confirm(&format!("Remove network {}?", name), yes).await? {
                report(dispatcher.delete_network(&name).await?);
            }
        }
        Command::VolumeCreate { name, driver } => {
            report(dispatcher.create_volume(&name, &driver).await?)
        }
        Command::VolumeRm { name, yes } => {
            if confirm(&format!("Remove volume {}?", name), yes).await? {
                report(dispatcher.delete_volume(&name).await?);
            }
        }
        Command::VolumePrune { yes } => {
            if confirm("Remove all unused volumes?", yes).await? {
                report(dispatcher.prune_volumes().await?);
            }
        }

        Command::ComposeUp { file, project } => {
            let yaml = std::fs::read_to_string(&file)?;
            let project = project.unwrap_or_else(|| project_name(&file));
            report(dispatcher.compose_up(&yaml, &project).await?);
        }
        Command::ComposeDown { file, project, yes } => {
            let yaml = std::fs::read_to_string(&file)?;
            let project = project.unwrap_or_else(|| project_name(&file));
            if confirm(&format!("Tear down project {}?", project), yes).await? {
                report(dispatcher.compose_down(&yaml, &project).await?);
            }
        }

        Command::Build { tag, file, context } => {
            build(&dispatcher, tag, file, context).await?;
        }

        Command::Logs { id, follow: false } => {
            let opts = LogOptions { tail: config.log_tail, ..LogOptions::default() };
            for line in client.container_logs(&id, opts).await? {
                match line.stream {
                    LogStream::Stdout => println!("{}", line.text),
                    LogStream::Stderr => eprintln!("{}", line.text),
                }
            }
        }
        Command::Logs { id, follow: true } => {
            let session = poll::container_logs(&client, &id, &config);
            live::follow_logs(session, &id, should_quit).await?;
        }

        Command::Watch { kind } => watch(kind, &client, &config, should_quit).await?,
    }
    Ok(())
}

async fn watch(
    kind: WatchKind,
    client: &EngineClient,
    config: &ClientConfig,
    should_quit: Arc<AtomicBool>,
) -> io::Result<()> {
    match kind {
        WatchKind::Containers => {
            let session = poll::containers(client, config);
            live::watch_table(session, "Containers", should_quit, aged(render::containers_table)).await
        }
        WatchKind::Images => {
            let session = poll::images(client, config);
            live::watch_table(session, "Images", should_quit, aged(render::images_table)).await
        }
        WatchKind::Networks => {
            let session = poll::networks(client, config);
            live::watch_table(session, "Networks", should_quit, |rows| render::networks_table(rows))
                .await
        }
        WatchKind::Volumes => {
            let session = poll::volumes(client, config);
            live::watch_table(session, "Volumes", should_quit, |rows| render::volumes_table(rows))
                .await
        }
        WatchKind::Engine => {
            let session = poll::engine_overview(client, config);
            live::watch_table(session, "Engine", should_quit, render::overview_lines).await
        }
    }
}

/// Rows whose ages are measured from the moment of each redraw.
fn aged<P>(rows: fn(&[P], DateTime<Utc>) -> Vec<String>) -> impl Fn(&Vec<P>) -> Vec<String> {
    move |records| rows(records, Utc::now())
}

async fn build(
    dispatcher: &Dispatcher,
    tag: String,
    file: Option<PathBuf>,
    context: Option<PathBuf>,
) -> Result<(), CliError> {
    let dockerfile_path = file.unwrap_or_else(|| {
        context.as_deref().unwrap_or_else(|| Path::new(".")).join("Dockerfile")
    });
    let dockerfile = std::fs::read_to_string(&dockerfile_path)?;
    let context = match context.as_deref() {
        Some(dir) => Some(pack_context(dir)?),
        None => None,
    };
    let req = BuildRequest { tag, dockerfile, context };

    let (tx, mut rx) = mpsc::channel::<String>(64);
    let printer = async move {
        while let Some(line) = rx.recv().await {
            println!("{}", line);
        }
    };
    let (result, ()) = tokio::join!(dispatcher.build(&req, Some(tx)), printer);
    let report = result?;
    if report.simulated {
        eprintln!("note: the engine could not build {}; the steps above were simulated", report.tag);
    }
    Ok(())
}

/// Tar archive of `dir`, rooted at the directory itself.
pub fn pack_context(dir: &Path) -> io::Result<Vec<u8>> {
    let mut archive = tar::Builder::new(Vec::new());
    archive.append_dir_all(".", dir)?;
    archive.into_inner()
}

/// Default compose project name: the compose file's directory name.
fn project_name(file: &Path) -> String {
    std::fs::canonicalize(file)
        .ok()
        .and_then(|p| p.parent().and_then(|d| d.file_name()).map(|n| n.to_string_lossy().to_lowercase()))
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| "default".to_string())
}

/// Ask on stdin unless `assume_yes`. The read runs on the blocking pool.
async fn confirm(prompt: &str, assume_yes: bool) -> io::Result<bool> {
    if assume_yes {
        return Ok(true);
    }
    let mut out = io::stdout();
    write!(out, "{} (y to confirm, anything else to cancel) ", prompt)?;
    out.flush()?;

    let confirmed = tokio::task::spawn_blocking(|| read_answer(io::stdin().lock()))
        .await
        .map_err(io::Error::other)??;
    if !confirmed {
        println!("Cancelled");
    }
    Ok(confirmed)
}

fn read_answer(mut input: impl BufRead) -> io::Result<bool> {
    let mut answer = String::new();
    input.read_line(&mut answer)?;
    let answer = answer.trim();
    Ok(answer.eq_ignore_ascii_case("y") || answer.eq_ignore_ascii_case("yes"))
}

fn report(msg: String) {
    println!("{}", msg);
}

fn print_lines(lines: Vec<String>) {
    for line in lines {
        println!("{}", line);
    }
}
