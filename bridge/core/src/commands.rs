//! Bridge Commands
//!
//! Value types that cross the bridge. An [`InboundCommand`] is one line typed
//! into the browser terminal; an [`OutboundCommand`] is one thing the
//! interpreter wants the terminal to do.
//!
//! # Wire Format
//!
//! Both types are JSON with camelCase keys:
//!
//! ```text
//! POST /session   {"textLine": "dir", "columns": 120}
//! GET  /session   {"print": {"text": "hello\n"}}
//!                 {"readLine": {"secure": false}}
//!                 {"clear": {}}
//! ```
//!
//! An outbound command is always an object with exactly one key, the name of
//! the populated variant.

use serde::{Deserialize, Serialize};

/// One unit of client input
///
/// Immutable once constructed. The column width is passed through as
/// reported; interpreting it (and rejecting non-positive values) is up to
/// whoever intercepts it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundCommand {
    /// The submitted line, without a trailing newline
    pub text_line: String,
    /// Terminal width in columns as reported by the client (0 = not reported)
    #[serde(default)]
    pub columns: i32,
}

impl InboundCommand {
    /// Create an inbound command from client-supplied text and width
    #[must_use]
    pub fn new(text_line: impl Into<String>, columns: i32) -> Self {
        Self {
            text_line: text_line.into(),
            columns,
        }
    }

    /// Get the submitted text
    #[must_use]
    pub fn text(&self) -> &str {
        &self.text_line
    }
}

/// A named input field of a [`OutboundCommand::Prompt`]
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptField {
    /// Key the answer is stored under
    pub name: String,
    /// Label shown to the user (may carry an `&` hotkey marker)
    pub label: String,
}

impl PromptField {
    /// Create a prompt field
    #[must_use]
    pub fn new(name: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            label: label.into(),
        }
    }
}

/// One unit of interpreter output
///
/// Exactly one variant is populated per instance. Use the named
/// constructors ([`OutboundCommand::print`], [`OutboundCommand::read_line`], ...)
/// rather than building variants by hand.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OutboundCommand {
    /// Write text to the terminal (may contain color markup)
    #[serde(rename_all = "camelCase")]
    Print {
        /// Text to write
        text: String,
    },

    /// Ask for a set of named values
    #[serde(rename_all = "camelCase")]
    Prompt {
        /// Title shown above the prompt
        caption: String,
        /// Explanation of what is being asked
        message: String,
        /// Fields, in the order they will be asked
        fields: Vec<PromptField>,
    },

    /// Ask the user to pick one of several options
    #[serde(rename_all = "camelCase")]
    PromptForChoice {
        /// Title shown above the choice
        caption: String,
        /// Explanation of the choice
        message: String,
        /// Option labels, in index order
        options: Vec<String>,
    },

    /// Ask for a password for a user at a target
    #[serde(rename_all = "camelCase")]
    PromptForCredentials {
        /// Title shown above the prompt
        caption: String,
        /// Explanation of why credentials are needed
        message: String,
        /// User whose password is requested
        user: String,
        /// Target the credential is for
        target: String,
    },

    /// Request one line of input
    #[serde(rename_all = "camelCase")]
    ReadLine {
        /// Whether the input should be masked
        secure: bool,
        /// Prompt text replacing the terminal's default prompt
        #[serde(default, skip_serializing_if = "Option::is_none")]
        prompt: Option<String>,
    },

    /// Clear the terminal
    Clear {},

    /// The interpreter has exited
    Exit {},
}

impl OutboundCommand {
    /// Create a print command
    #[must_use]
    pub fn print(text: impl Into<String>) -> Self {
        Self::Print { text: text.into() }
    }

    /// Create a prompt command
    #[must_use]
    pub fn prompt(
        caption: impl Into<String>,
        message: impl Into<String>,
        fields: Vec<PromptField>,
    ) -> Self {
        Self::Prompt {
            caption: caption.into(),
            message: message.into(),
            fields,
        }
    }

    /// Create a choice command
    #[must_use]
    pub fn prompt_for_choice(
        caption: impl Into<String>,
        message: impl Into<String>,
        options: Vec<String>,
    ) -> Self {
        Self::PromptForChoice {
            caption: caption.into(),
            message: message.into(),
            options,
        }
    }

    /// Create a credentials command
    #[must_use]
    pub fn prompt_for_credentials(
        caption: impl Into<String>,
        message: impl Into<String>,
        user: impl Into<String>,
        target: impl Into<String>,
    ) -> Self {
        Self::PromptForCredentials {
            caption: caption.into(),
            message: message.into(),
            user: user.into(),
            target: target.into(),
        }
    }

    /// Create a read-line request
    #[must_use]
    pub fn read_line(secure: bool, prompt: Option<String>) -> Self {
        Self::ReadLine { secure, prompt }
    }

    /// Create a clear command
    #[must_use]
    pub fn clear() -> Self {
        Self::Clear {}
    }

    /// Create an exit command
    #[must_use]
    pub fn exit() -> Self {
        Self::Exit {}
    }

    /// Short variant name, for logging
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Print { .. } => "print",
            Self::Prompt { .. } => "prompt",
            Self::PromptForChoice { .. } => "promptForChoice",
            Self::PromptForCredentials { .. } => "promptForCredentials",
            Self::ReadLine { .. } => "readLine",
            Self::Clear {} => "clear",
            Self::Exit {} => "exit",
        }
    }

    /// Get the printed text if this is a print command
    #[must_use]
    pub fn as_print(&self) -> Option<&str> {
        match self {
            Self::Print { text } => Some(text),
            _ => None,
        }
    }
}
