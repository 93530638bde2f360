//! apisim - mock API runtime
//!
//! Serves each active mock API on its own port, supervises the instances and
//! exposes an admin API for lifecycle control.
//!
//! Usage:
//!   apisim --data mock-apis.yaml [--config apisim.yaml] [OPTIONS]

use anyhow::Context;
use apisim_runtime::admin_api::AdminApiServer;
use apisim_runtime::backends::{FileRepository, MemoryLogSink, TracingLogSink};
use apisim_runtime::config::Config;
use apisim_runtime::repository::{FanoutLogSink, RequestLogSink};
use apisim_runtime::supervisor::Supervisor;
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

/// apisim - per-API mock HTTP servers
#[derive(Parser, Debug)]
#[command(name = "apisim")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Runtime configuration file (YAML)
    #[arg(short, long, env = "APISIM_CONFIG")]
    config: Option<PathBuf>,

    /// Mock API definitions file (YAML or JSON); created on first write
    #[arg(short, long, env = "APISIM_DATA", default_value = "apisim-data.yaml")]
    data: PathBuf,

    /// Admin API port (overrides the config file)
    #[arg(long, env = "APISIM_ADMIN_PORT")]
    admin_port: Option<u16>,

    /// Log output format
    #[arg(long, env = "APISIM_LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Do not start persisted-active mock APIs at boot
    #[arg(long)]
    no_restore: bool,
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.log_format);

    let mut config = match &args.config {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => Config::default(),
    };
    if let Some(port) = args.admin_port {
        config.admin.port = port;
    }
    config.validate()?;

    let repository = Arc::new(FileRepository::load(&args.data)?);

    let memory_sink = Arc::new(MemoryLogSink::new(config.request_log.retain));
    let mut sinks: Vec<Arc<dyn RequestLogSink>> =
        vec![memory_sink.clone() as Arc<dyn RequestLogSink>];
    if config.request_log.trace {
        sinks.push(Arc::new(TracingLogSink));
    }
    let log_sink = Arc::new(FanoutLogSink::new(sinks));

    let supervisor = Arc::new(Supervisor::from_config(&config, repository, log_sink)?);

    if args.no_restore {
        info!("Skipping restore of active mock APIs");
    } else {
        match supervisor.restore_active().await {
            Ok(report) if !report.failed.is_empty() => warn!(
                "{} mock APIs could not be restored and were marked inactive",
                report.failed.len()
            ),
            Ok(_) => {}
            Err(e) => error!("Failed to restore active mock APIs: {}", e),
        }
    }
    supervisor.start_monitoring();

    let admin_addr = config.admin.socket_addr().await?;
    let admin = AdminApiServer::new(admin_addr, Arc::clone(&supervisor), memory_sink);

    tokio::select! {
        result = admin.run() => {
            if let Err(e) = result {
                error!("Admin API stopped: {:#}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl-C, shutting down");
        }
    }

    supervisor.shutdown_all().await;
    Ok(())
}
