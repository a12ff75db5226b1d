//! Bridge Daemon
//!
//! Serves an interactive shell to a browser terminal. The shell runs on its
//! own thread and blocks on input; the browser long-polls `GET /session` for
//! output and posts each submitted line to `POST /session`.
//!
//! # Usage
//!
//! ```bash
//! # Interactive session on the default address (http://127.0.0.1:8080/)
//! bridge-daemon
//!
//! # Listen on all interfaces
//! bridge-daemon --listen http://+:8080/
//!
//! # Run a script and exit with its code
//! bridge-daemon --script setup.bridge
//!
//! # With verbose logging
//! RUST_LOG=debug bridge-daemon
//! ```
//!
//! # Environment Variables
//!
//! - `BRIDGE_CONFIG`: Configuration file path
//! - `BRIDGE_LISTEN`, `BRIDGE_POLL_TIMEOUT_MS`, `BRIDGE_IDLE_TIMEOUT_SECS`:
//!   override the configuration file
//! - `RUST_LOG`: Log level (trace, debug, info, warn, error)
//!
//! # Signals
//!
//! - SIGTERM/SIGINT: Graceful shutdown
//!
//! The process exit code is the code passed to `exit` in the shell, or 1 if
//! it does not fit in a byte.

mod content;
mod host;
mod listen;
mod server;

use std::path::PathBuf;
use std::process::ExitCode;
use std::thread::JoinHandle;
use std::time::Duration;

use anyhow::Context;
use bridge_core::{load_config_from_path, CommandBus, ConfigOverrides};
use clap::Parser;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{debug, error, info, warn};

use crate::host::{ExitSignal, HostAdapter, RunMode};
use crate::listen::ListenAddress;
use crate::server::AppState;

/// How long to wait for the interpreter thread after the bus closes
const WORKER_STOP_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Parser)]
#[command(
    name = "bridge-daemon",
    version,
    about = "Serve an interactive shell to a browser terminal over HTTP long-polling"
)]
struct Args {
    /// Address to listen on, e.g. http://127.0.0.1:8080/
    #[arg(long)]
    listen: Option<String>,

    /// Run this script instead of an interactive session, then exit
    #[arg(long)]
    script: Option<PathBuf>,

    /// Configuration file (default: ~/.config/console-bridge/bridge.toml)
    #[arg(long, env = "BRIDGE_CONFIG")]
    config: Option<PathBuf>,

    /// Long-poll bound for GET /session, in milliseconds
    #[arg(long)]
    poll_timeout_ms: Option<u64>,

    /// End the session after this many seconds without client input (0 disables)
    #[arg(long)]
    idle_timeout_secs: Option<u64>,
}

impl Args {
    fn overrides(&self) -> ConfigOverrides {
        let mut overrides = ConfigOverrides::new();
        if let Some(listen) = &self.listen {
            overrides = overrides.with_listen(listen.clone());
        }
        if let Some(ms) = self.poll_timeout_ms {
            overrides = overrides.with_poll_timeout_ms(ms);
        }
        if let Some(secs) = self.idle_timeout_secs {
            overrides = overrides.with_idle_timeout_secs(secs);
        }
        overrides
    }

    fn run_mode(&self) -> RunMode {
        self.script
            .clone()
            .map_or(RunMode::Interactive, RunMode::Script)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("bridge_daemon=info".parse()?)
                .add_directive("bridge_core=info".parse()?),
        )
        .with_target(true)
        .init();

    let args = Args::parse();

    info!("Starting bridge daemon");
    info!("PID: {}", std::process::id());

    let mut config =
        load_config_from_path(args.config.clone()).context("Failed to load configuration")?;
    args.overrides().apply(&mut config);
    config.validate().context("Invalid configuration")?;
    info!(
        source = ?config.source(),
        listen = %config.server.listen,
        poll_timeout_ms = config.bus.poll_timeout_ms,
        idle_timeout_secs = config.host.idle_timeout_secs,
        "Configuration loaded"
    );

    let address: ListenAddress = config
        .server
        .listen
        .parse()
        .with_context(|| format!("Invalid listen address {:?}", config.server.listen))?;

    let bus = CommandBus::start(config.bus.clone());
    let host = HostAdapter::new(bus.clone(), &config.host);
    let exit = host.exit_signal();

    let listener = TcpListener::bind(address.socket_target())
        .await
        .map_err(|e| {
            error!(error = %e, host = address.host(), port = address.port(), "Failed to bind listener");
            anyhow::anyhow!(
                "Failed to listen on {}: {}. Check if another process is using the port.",
                address,
                e
            )
        })?;
    info!(address = %listener.local_addr()?, "Listening for browser terminals");

    let worker = host
        .spawn(args.run_mode())
        .context("Failed to start interpreter thread")?;
    info!("Bridge ready");

    let app = server::router(AppState::new(bus.clone()));
    let served = axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal(bus.clone(), exit.clone()))
        .await;

    info!("Shutting down");
    bus.shutdown();
    stop_worker(worker).await;

    let stats = bus.stats();
    info!(
        inbound = stats.inbound_enqueued,
        delivered = stats.delivered,
        dropped = stats.dropped,
        outbound = stats.outbound_enqueued,
        consumer_failures = stats.consumer_failures,
        interceptor_failures = stats.interceptor_failures,
        "Bridge daemon stopped"
    );

    served.context("HTTP server failed")?;

    let code = exit.code().unwrap_or(0);
    Ok(ExitCode::from(u8::try_from(code).unwrap_or(1)))
}

/// Resolves when the process should stop serving
async fn shutdown_signal(bus: CommandBus, exit: ExitSignal) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("Received Ctrl+C, shutting down"),
        () = terminate => info!("Received SIGTERM, shutting down"),
        code = exit.wait() => {
            info!(code, "Interpreter exited");
            drain_outbound(&bus).await;
        }
    }
}

/// Give the client one poll window to collect queued output such as `exit`
async fn drain_outbound(bus: &CommandBus) {
    let bound = bus.config().poll_timeout() * 2;
    let drained = tokio::time::timeout(bound, bus.wait_for_outbound_drained()).await;

    if drained.is_err() {
        debug!(
            pending = bus.pending_outbound(),
            "Client did not collect remaining output"
        );
    }
}

async fn stop_worker(worker: JoinHandle<()>) {
    let joined = tokio::time::timeout(
        WORKER_STOP_TIMEOUT,
        tokio::task::spawn_blocking(move || worker.join()),
    )
    .await;

    match joined {
        Ok(Ok(Ok(()))) => debug!("Interpreter thread stopped"),
        Ok(Ok(Err(_))) => error!("Interpreter thread panicked"),
        Ok(Err(e)) => warn!(error = %e, "Failed to join interpreter thread"),
        Err(_) => warn!("Interpreter thread did not stop in time"),
    }
}
