//! Interpreter Host
//!
//! Runs the built-in shell on a dedicated worker thread and connects it to
//! the command bus. The host is the only producer of outbound commands and
//! the only registrant of consumers.
//!
//! ```text
//!                 ┌──────────────────── worker thread ───────────────────┐
//!  CommandBus ◄──►│ HostUi (verbs) ◄── Shell (REPL or script) ── exit ───┼──► ExitSignal
//!      │          └──────────────────────────────────────────────────────┘        │
//!      │ interceptors: terminal width, idle activity                              ▼
//!      └──────────────────────────── IdleWatchdog (async task) ───────────► main: stop server
//! ```

pub mod format;
pub mod idle;
pub mod shell;
pub mod ui;

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use bridge_core::{BusError, CommandBus, HostConfig, OutboundCommand};
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, info, warn};

pub use idle::IdleWatchdog;
pub use shell::{Outcome, Shell};
pub use ui::{Credential, HostUi};

/// Errors raised by host UI verbs
#[derive(Debug, Error)]
pub enum HostError {
    /// The bus shut down while waiting for input
    #[error("Input closed: the command bus was shut down")]
    InputClosed,

    /// The bus refused an outbound command
    #[error("Output rejected: {0}")]
    Bus(#[from] BusError),

    /// A choice was requested without any options
    #[error("A choice needs at least one option")]
    NoChoices,
}

impl HostError {
    /// Check if this error means the bus is gone and the host should stop
    #[must_use]
    pub fn is_closed(&self) -> bool {
        matches!(self, Self::InputClosed | Self::Bus(BusError::Closed))
    }
}

// =============================================================================
// Exit Signal
// =============================================================================

/// Process exit request shared between the host and `main`
///
/// The first request wins; later requests are ignored.
#[derive(Debug, Clone)]
pub struct ExitSignal {
    claimed: Arc<AtomicBool>,
    tx: Arc<watch::Sender<Option<i32>>>,
}

impl ExitSignal {
    /// Create a signal with no exit requested
    #[must_use]
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self {
            claimed: Arc::new(AtomicBool::new(false)),
            tx: Arc::new(tx),
        }
    }

    /// Request exit with `code`
    ///
    /// Returns false if an exit was already requested.
    pub fn request(&self, code: i32) -> bool {
        self.request_with(code, || {})
    }

    /// Request exit with `code`, running `announce` first if this request wins
    ///
    /// `announce` runs at most once per signal and always before any waiter
    /// is woken. Returns false if an exit was already requested.
    pub fn request_with<F: FnOnce()>(&self, code: i32, announce: F) -> bool {
        if self.claimed.swap(true, Ordering::SeqCst) {
            return false;
        }
        announce();
        self.tx.send_replace(Some(code));
        true
    }

    /// Get the requested exit code, if any
    #[must_use]
    pub fn code(&self) -> Option<i32> {
        *self.tx.borrow()
    }

    /// Wait until an exit is requested and return its code
    pub async fn wait(&self) -> i32 {
        let mut rx = self.tx.subscribe();
        let code = match rx.wait_for(Option::is_some).await {
            Ok(code) => (*code).unwrap_or_default(),
            Err(_) => 0,
        };
        code
    }
}

impl Default for ExitSignal {
    fn default() -> Self {
        Self::new()
    }
}

/// What the worker thread runs
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunMode {
    /// Read-execute loop until `exit` or shutdown
    Interactive,
    /// Run a script file, then exit
    Script(PathBuf),
}

// =============================================================================
// Host Adapter
// =============================================================================

/// Owns the interpreter and its worker thread
#[derive(Debug)]
pub struct HostAdapter {
    bus: CommandBus,
    ui: HostUi,
    exit: ExitSignal,
}

impl HostAdapter {
    /// Create the host, installing its interceptors on `bus`
    ///
    /// When `config` enables an idle timeout the watchdog is started on the
    /// current runtime.
    pub fn new(bus: CommandBus, config: &HostConfig) -> Self {
        let ui = HostUi::new(bus.clone());
        let exit = ExitSignal::new();

        if let Some(timeout) = config.idle_timeout() {
            let watchdog = IdleWatchdog::install(&bus, timeout);
            let bus = bus.clone();
            let exit = exit.clone();
            tokio::spawn(async move {
                if watchdog.run(exit.clone()).await {
                    info!(idle_secs = timeout.as_secs(), "Idle timeout reached");
                    request_exit(&bus, &exit, 0);
                }
            });
        }

        Self { bus, ui, exit }
    }

    /// Get the exit signal for this host
    #[must_use]
    pub fn exit_signal(&self) -> ExitSignal {
        self.exit.clone()
    }

    /// Get the UI verbs
    #[must_use]
    pub fn ui(&self) -> &HostUi {
        &self.ui
    }

    /// Start the interpreter on its own thread
    ///
    /// # Errors
    ///
    /// Returns an error if the thread cannot be spawned.
    pub fn spawn(self, mode: RunMode) -> std::io::Result<JoinHandle<()>> {
        std::thread::Builder::new()
            .name("bridge-host".to_string())
            .spawn(move || self.run(mode))
    }

    /// Run the interpreter on the current thread until it finishes
    pub fn run(self, mode: RunMode) {
        let mut shell = Shell::new(self.ui.clone());

        let code = match mode {
            RunMode::Interactive => {
                info!("Starting interactive session");
                repl(&mut shell)
            }
            RunMode::Script(path) => {
                info!(path = ?path, "Running script");
                run_script(&mut shell, &path)
            }
        };

        match code {
            Some(code) => request_exit(&self.bus, &self.exit, code),
            None => debug!("Command bus closed, interpreter stopped"),
        }
    }
}

fn repl(shell: &mut Shell) -> Option<i32> {
    loop {
        let line = match shell.ui().read_line() {
            Ok(line) => line,
            Err(e) => {
                if !e.is_closed() {
                    warn!(error = %e, "Read failed");
                }
                return None;
            }
        };

        match shell.execute_line(&line) {
            Ok(Outcome::Continue) => {}
            Ok(Outcome::Exit(code)) => return Some(code),
            Err(e) => {
                if !e.is_closed() {
                    warn!(error = %e, "Host failure while executing command");
                }
                return None;
            }
        }
    }
}

fn run_script(shell: &mut Shell, path: &std::path::Path) -> Option<i32> {
    match shell.source(path) {
        Ok(Outcome::Continue) => Some(0),
        Ok(Outcome::Exit(code)) => Some(code),
        Err(e) if e.is_closed() => None,
        Err(e) => {
            warn!(error = %e, path = ?path, "Script failed");
            if shell.ui().write_error_line(&e.to_string()).is_err() {
                debug!("Bus closed while reporting script failure");
            }
            Some(1)
        }
    }
}

/// Tell the client the session is over, then signal the process
fn request_exit(bus: &CommandBus, exit: &ExitSignal, code: i32) {
    // Queued before signalling; main stops the server once signalled
    let won = exit.request_with(code, || {
        info!(code, "Exit requested");
        if bus.enqueue_outbound(OutboundCommand::exit()).is_err() {
            debug!("Bus already closed, exit command not sent");
        }
    });

    if !won {
        debug!(code, "Exit already requested, ignoring");
    }
}
