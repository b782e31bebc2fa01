//! Offkit host.
//!
//! Runs one worker deployment: installs and activates it, then reads one JSON
//! event per line from stdin and writes one JSON outcome per line to stdout.
//! Logs go to stderr.
//!
//! ## Usage
//!
//! ```bash
//! offkit-host --config deploy.json --log-format json <<'EOF'
//! {"event":"fetch","url":"/","navigate":true}
//! {"event":"message","data":{"action":"skipWaiting"}}
//! {"event":"push","data":{"title":"Concert Alert","data":{"uri":"/event/42"}}}
//! EOF
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use offkit_common::{init_logging, LogConfig, LogFormat};
use offkit_net::{LoaderConfig, ResourceLoader};
use offkit_sw::{
    Collaborators, MemoryCacheStorage, MemoryNotificationHost, ServiceWorker, WorkerConfig,
    WorkerEvent,
};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{info, level_filters::LevelFilter, warn};

mod protocol;

use protocol::HostEvent;

#[derive(Parser)]
#[command(name = "offkit-host")]
#[command(about = "Drive an offline caching worker over JSON lines")]
struct Cli {
    /// Deployment configuration (JSON)
    #[arg(short, long)]
    config: PathBuf,

    /// Log format: pretty, compact or json
    #[arg(long, default_value = "pretty")]
    log_format: LogFormat,

    /// Maximum log level
    #[arg(long, default_value = "info")]
    log_level: LevelFilter,

    /// Custom log filter, e.g. "offkit_sw=debug,reqwest=warn"
    #[arg(long)]
    log_filter: Option<String>,

    /// Do not install and activate before reading events
    #[arg(long)]
    no_bootstrap: bool,
}

impl Cli {
    fn log_config(&self) -> LogConfig {
        let mut config = LogConfig {
            level: self.log_level,
            ..LogConfig::default()
        }
        .with_format(self.log_format);
        if let Some(filter) = &self.log_filter {
            config = config.with_filter(filter);
        }
        config
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_config())?;

    let json = std::fs::read_to_string(&cli.config)
        .with_context(|| format!("reading {}", cli.config.display()))?;
    let config = WorkerConfig::from_json(&json)?;
    let origin = config.origin().clone();

    let host = MemoryNotificationHost::new();
    let collaborators = Collaborators {
        storage: Arc::new(MemoryCacheStorage::new()),
        fetcher: Arc::new(ResourceLoader::new(LoaderConfig::default())?),
        notifications: Arc::new(host.clone()),
    };
    let worker = ServiceWorker::standalone(config, collaborators);
    info!(
        release = worker.config().release(),
        generation = %worker.generation(),
        "Worker ready"
    );

    let mut stdout = tokio::io::stdout();

    if !cli.no_bootstrap {
        for event in [WorkerEvent::Install, WorkerEvent::Activate] {
            let outcome = worker.dispatch(event).await?;
            emit(&mut stdout, &protocol::render(&outcome)).await?;
        }
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }

        let result = async {
            let event = HostEvent::parse(&line)?
                .into_worker_event(&origin, &host)
                .await?;
            Ok::<_, anyhow::Error>(worker.dispatch(event).await?)
        }
        .await;

        let output = match result {
            Ok(outcome) => protocol::render(&outcome),
            Err(e) => {
                warn!(error = %e, "Event failed");
                protocol::render_error(&e)
            }
        };
        emit(&mut stdout, &output).await?;
    }

    worker.settle().await;
    info!("Input closed, pending work settled");
    Ok(())
}

async fn emit(stdout: &mut tokio::io::Stdout, line: &Value) -> Result<()> {
    let mut bytes = serde_json::to_vec(line)?;
    bytes.push(b'\n');
    stdout.write_all(&bytes).await?;
    stdout.flush().await?;
    Ok(())
}
