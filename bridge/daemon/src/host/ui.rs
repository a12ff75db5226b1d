//! Host UI - Interpreter-Facing Terminal Verbs
//!
//! Every verb turns into one or more outbound commands. Input verbs block
//! the calling thread until the browser answers:
//!
//! ```text
//!  read_line()
//!     │ register one-shot consumer ──► registry (front)
//!     │ enqueue ReadLine            ──► outbound queue ──► GET /session
//!     │ blocking_recv()  ◄── consumer fires ◄── dispatch ◄── POST /session
//!     ▼
//!   String
//! ```
//!
//! Must be called from a plain OS thread, never from inside the async
//! runtime.

use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use bridge_core::{CommandBus, OutboundCommand, PromptField};
use tokio::sync::oneshot;
use tracing::debug;

use super::format::{choice_prompt, format_with_color, ConsoleColor, HotkeyLabel};
use super::HostError;

/// A user name and password collected through the terminal
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    user: String,
    target: String,
    password: String,
}

impl Credential {
    /// User the password belongs to
    #[must_use]
    pub fn user(&self) -> &str {
        &self.user
    }

    /// Target the credential is for
    #[must_use]
    pub fn target(&self) -> &str {
        &self.target
    }

    /// The password as typed
    #[must_use]
    pub fn password(&self) -> &str {
        &self.password
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("user", &self.user)
            .field("target", &self.target)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Terminal verbs available to the interpreter
#[derive(Clone)]
pub struct HostUi {
    bus: CommandBus,
    width: Arc<AtomicU32>,
}

impl HostUi {
    /// Create the UI and start tracking the terminal width
    pub fn new(bus: CommandBus) -> Self {
        let width = Arc::new(AtomicU32::new(0));

        let recorded = Arc::clone(&width);
        bus.add_interceptor(move |cmd| match u32::try_from(cmd.columns) {
            Ok(columns) if columns > 0 => recorded.store(columns, Ordering::Relaxed),
            _ => debug!(columns = cmd.columns, "Ignoring non-positive terminal width"),
        });

        Self { bus, width }
    }

    /// Last terminal width reported by the client
    pub fn width(&self) -> Option<u32> {
        match self.width.load(Ordering::Relaxed) {
            0 => None,
            columns => Some(columns),
        }
    }

    fn emit(&self, cmd: OutboundCommand) -> Result<(), HostError> {
        self.bus.enqueue_outbound(cmd)?;
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Output
    // -------------------------------------------------------------------------

    /// Write text as is
    pub fn write(&self, text: &str) -> Result<(), HostError> {
        if text.is_empty() {
            return Ok(());
        }
        debug!(len = text.len(), "Echo");
        self.emit(OutboundCommand::print(text))
    }

    /// Write text in the given colors
    pub fn write_colored(
        &self,
        foreground: Option<ConsoleColor>,
        background: Option<ConsoleColor>,
        text: &str,
    ) -> Result<(), HostError> {
        if text.is_empty() {
            return Ok(());
        }
        debug!(len = text.len(), "Echo");
        self.emit(OutboundCommand::print(format_with_color(
            text, foreground, background,
        )))
    }

    /// Write text in the given colors followed by a newline
    pub fn write_colored_line(
        &self,
        foreground: Option<ConsoleColor>,
        background: Option<ConsoleColor>,
        text: &str,
    ) -> Result<(), HostError> {
        debug!(len = text.len(), "Echo");
        let mut line = format_with_color(text, foreground, background);
        line.push('\n');
        self.emit(OutboundCommand::print(line))
    }

    /// Write text followed by a newline
    pub fn write_line(&self, text: &str) -> Result<(), HostError> {
        debug!(len = text.len(), "Echo");
        self.emit(OutboundCommand::print(format!("{text}\n")))
    }

    /// Write an error line (red on black)
    pub fn write_error_line(&self, text: &str) -> Result<(), HostError> {
        self.write_colored_line(Some(ConsoleColor::Red), Some(ConsoleColor::Black), text)
    }

    /// Write a `WARNING:` line (yellow on black)
    pub fn write_warning_line(&self, text: &str) -> Result<(), HostError> {
        self.write_colored_line(
            Some(ConsoleColor::Yellow),
            Some(ConsoleColor::Black),
            &format!("WARNING: {text}"),
        )
    }

    /// Write a `VERBOSE:` line (green on black)
    pub fn write_verbose_line(&self, text: &str) -> Result<(), HostError> {
        self.write_colored_line(
            Some(ConsoleColor::Green),
            Some(ConsoleColor::Black),
            &format!("VERBOSE: {text}"),
        )
    }

    /// Write a `DEBUG:` line (dark yellow on black)
    pub fn write_debug_line(&self, text: &str) -> Result<(), HostError> {
        self.write_colored_line(
            Some(ConsoleColor::DarkYellow),
            Some(ConsoleColor::Black),
            &format!("DEBUG: {text}"),
        )
    }

    /// Clear the terminal
    pub fn clear(&self) -> Result<(), HostError> {
        self.emit(OutboundCommand::clear())
    }

    // -------------------------------------------------------------------------
    // Input
    // -------------------------------------------------------------------------

    /// Read one line using the terminal's default prompt
    pub fn read_line(&self) -> Result<String, HostError> {
        self.read_input(false, None)
    }

    /// Read one masked line
    pub fn read_line_secure(&self) -> Result<String, HostError> {
        self.read_input(true, None)
    }

    /// Read one line with the prompt replaced by `prompt`
    pub fn read_line_with_prompt(&self, prompt: &str) -> Result<String, HostError> {
        self.read_input(false, Some(prompt))
    }

    /// Read one line, optionally masked and with a prompt override
    ///
    /// Blocks the calling thread until the client answers or the bus shuts
    /// down.
    pub fn read_input(&self, secure: bool, prompt: Option<&str>) -> Result<String, HostError> {
        let prompt = prompt.map(str::to_string);
        let (tx, rx) = oneshot::channel();
        let handle = self.bus.register_one_shot_consumer(move |cmd, scope| {
            scope.revoke();
            let _ = tx.send(cmd.text_line);
        });

        if let Err(e) = self.emit(OutboundCommand::read_line(secure, prompt)) {
            handle.revoke();
            return Err(e);
        }

        debug!(consumer_id = %handle.id(), secure, "Waiting for user input");
        rx.blocking_recv().map_err(|_| HostError::InputClosed)
    }

    /// Ask for a set of named values, one line per field
    ///
    /// Returns `(name, value)` pairs in field order.
    pub fn prompt(
        &self,
        caption: &str,
        message: &str,
        fields: &[PromptField],
    ) -> Result<Vec<(String, String)>, HostError> {
        self.emit(OutboundCommand::prompt(caption, message, fields.to_vec()))?;

        fields
            .iter()
            .map(|field| {
                let shown = if field.label.is_empty() {
                    &field.name
                } else {
                    &field.label
                };
                let label = HotkeyLabel::parse(shown).label;
                let value = self.read_input(false, Some(&format!("{label}: ")))?;
                Ok((field.name.clone(), value))
            })
            .collect()
    }

    /// Ask the user to pick one of `labels`
    ///
    /// Labels may carry an `&` hotkey marker. An empty answer picks
    /// `default` when there is one; otherwise the answer is matched against
    /// hotkeys, then against labels ignoring case. Anything else is
    /// reported and asked again.
    pub fn prompt_for_choice(
        &self,
        caption: &str,
        message: &str,
        labels: &[String],
        default: Option<usize>,
    ) -> Result<usize, HostError> {
        if labels.is_empty() {
            return Err(HostError::NoChoices);
        }

        let options: Vec<HotkeyLabel> = labels.iter().map(|l| HotkeyLabel::parse(l)).collect();
        let default = default.filter(|&index| index < options.len());
        let prompt = choice_prompt(&options, default);

        self.emit(OutboundCommand::prompt_for_choice(
            caption,
            message,
            labels.to_vec(),
        ))?;

        loop {
            let raw = self.read_input(false, Some(&prompt))?;
            let answer = raw.trim();

            if answer.is_empty() {
                match default {
                    Some(index) => return Ok(index),
                    None => continue,
                }
            }

            let upper = answer.to_uppercase();
            if let Some(index) = options
                .iter()
                .position(|option| option.has_hotkey() && option.hotkey == upper)
            {
                return Ok(index);
            }

            let lower = answer.to_lowercase();
            if let Some(index) = options
                .iter()
                .position(|option| option.label.to_lowercase() == lower)
            {
                return Ok(index);
            }

            self.write_error_line(&format!("Invalid choice: {answer}"))?;
        }
    }

    /// Ask for the password of `user` at `target`
    pub fn prompt_for_credential(
        &self,
        caption: &str,
        message: &str,
        user: &str,
        target: &str,
    ) -> Result<Credential, HostError> {
        debug!(user, target, "Prompting for credentials");
        self.emit(OutboundCommand::prompt_for_credentials(
            caption, message, user, target,
        ))?;
        let password = self.read_input(true, Some("Password: "))?;

        Ok(Credential {
            user: user.to_string(),
            target: target.to_string(),
            password,
        })
    }
}

impl fmt::Debug for HostUi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostUi")
            .field("width", &self.width())
            .finish_non_exhaustive()
    }
}
