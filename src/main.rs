use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{fmt, EnvFilter};

use thermoor::agent::Agent;
use thermoor::bus::SerialLineSource;
use thermoor::config::{self, Config, ZabbixConfig};
use thermoor::sink::zabbix::ZabbixSender;

/// Serial thermal probe to Zabbix bridge agent.
#[derive(Parser)]
#[command(name = "thermoor", about)]
struct Cli {
    /// Read sensor lines from serial port DEVICE (required).
    #[arg(short, long, value_name = "DEVICE")]
    device: Option<String>,

    /// Serial port baud rate.
    #[arg(short, long, default_value_t = config::default_speed(), value_name = "BAUD")]
    speed: u32,

    /// Sampling interval in seconds.
    #[arg(short, long, default_value_t = config::default_interval().as_secs(), value_name = "SECONDS")]
    interval: u64,

    /// Zabbix server address (required).
    #[arg(short, long, value_name = "ADDR")]
    zabbix: Option<String>,

    /// Listening port of the Zabbix server.
    #[arg(short, long, default_value_t = config::default_port(), value_name = "PORT")]
    port: u16,

    /// Name of the host in Zabbix (required).
    #[arg(short = 'n', long, value_name = "NAME")]
    host: Option<String>,

    /// Item key base name; the device address is added as an argument,
    /// e.g. thermal_monitor[addr].
    #[arg(short, long, default_value_t = config::default_key(), value_name = "KEY")]
    key: String,

    /// Logging verbosity level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Print version information and exit.
    Version,
}

/// Build-time version info, injected via RUSTFLAGS or build.rs.
mod version {
    /// Release version string (set at build time).
    pub const RELEASE: &str = env!("CARGO_PKG_VERSION");

    /// Git commit hash (set at build time via env, or "unknown").
    pub fn git_commit() -> &'static str {
        option_env!("GIT_COMMIT").unwrap_or("unknown")
    }

    /// Full version string with platform info.
    pub fn full() -> String {
        format!(
            "{} (commit: {}, {}/{})",
            RELEASE,
            git_commit(),
            std::env::consts::OS,
            std::env::consts::ARCH,
        )
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Handle version subcommand before anything else.
    if let Some(Command::Version) = &cli.command {
        println!("thermoor {}", version::full());
        return Ok(());
    }

    // Initialize tracing.
    let filter = EnvFilter::try_new(&cli.log_level)
        .with_context(|| format!("invalid log level: {}", cli.log_level))?;

    fmt().with_env_filter(filter).with_target(true).init();

    // Required options are checked before any resource is opened.
    let cfg = Config {
        device: cli
            .device
            .context("--device is required (use --help for usage)")?,
        speed: cli.speed,
        interval: Duration::from_secs(cli.interval),
        zabbix: ZabbixConfig {
            server: cli
                .zabbix
                .context("--zabbix is required (use --help for usage)")?,
            port: cli.port,
            host: cli
                .host
                .context("--host is required (use --help for usage)")?,
            key: cli.key,
        },
    };
    cfg.validate()?;

    tracing::info!(
        version = version::RELEASE,
        commit = version::git_commit(),
        "starting thermoor",
    );

    // The sampling loop is a single logical thread of control.
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("building tokio runtime")?;

    rt.block_on(run(cfg))
}

async fn run(cfg: Config) -> Result<()> {
    // Set up signal handling.
    let cancel = CancellationToken::new();

    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        use tokio::signal::unix::{signal, SignalKind};

        let ctrl_c = tokio::signal::ctrl_c();
        let mut sigterm =
            signal(SignalKind::terminate()).expect("failed to register SIGTERM handler");
        let mut sighup = signal(SignalKind::hangup()).expect("failed to register SIGHUP handler");

        tokio::select! {
            _ = ctrl_c => {
                tracing::info!("received SIGINT, shutting down");
            }
            _ = sigterm.recv() => {
                tracing::info!("received SIGTERM, shutting down");
            }
            _ = sighup.recv() => {
                tracing::info!("received SIGHUP, shutting down");
            }
        }

        signal_cancel.cancel();
    });

    let source = SerialLineSource::open(&cfg.device, cfg.speed)
        .await
        .with_context(|| format!("opening serial device {}", cfg.device))?;
    tracing::info!(device = %cfg.device, speed = cfg.speed, "serial device opened");

    let sink = ZabbixSender::new(cfg.zabbix.clone());

    let agent = Agent::new(&cfg, source, sink);
    agent.run(cancel).await?;

    tracing::info!("thermoor stopped");

    Ok(())
}
