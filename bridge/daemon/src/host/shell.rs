//! Built-in line interpreter
//!
//! A small shell driven one line at a time. Lines are split on whitespace;
//! quoted strings form a single token (`'...'` literally, `"..."` with
//! variable expansion) and `$name` expands to a variable's value.
//!
//! ```text
//!   echo hello $who           command, result written as a line
//!   $answer = read-host Name  assignment of a command result
//!   $greeting = "hi there"    assignment of a literal
//!   # comment                 ignored
//! ```
//!
//! Failures never escape as errors: they are written to the terminal as
//! error lines and execution continues. Only a closed bus stops the shell.

use std::collections::BTreeMap;
use std::iter::Peekable;
use std::path::{Path, PathBuf};
use std::str::Chars;

use bridge_core::PromptField;
use thiserror::Error;
use tracing::{debug, warn};

use super::format::{ConsoleColor, UnknownColor};
use super::{HostError, HostUi};

/// Deepest allowed chain of scripts sourcing scripts
pub const MAX_SOURCE_DEPTH: usize = 16;

/// Reported host name
pub const HOST_NAME: &str = "console-bridge";

/// What to do after a line has run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Read the next line
    Continue,
    /// Stop with this exit code
    Exit(i32),
}

/// Errors raised while running a line
#[derive(Debug, Error)]
pub enum ShellError {
    #[error("Unknown command: {0}. Type 'help' for a list of commands")]
    UnknownCommand(String),

    #[error("Usage: {0}")]
    Usage(&'static str),

    #[error("Unterminated {0} quote")]
    UnterminatedQuote(char),

    #[error(transparent)]
    Color(#[from] UnknownColor),

    #[error("Cannot read script {}: {source}", .path.display())]
    Script {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Scripts nested deeper than {0} levels")]
    NestingTooDeep(usize),

    #[error(transparent)]
    Host(#[from] HostError),
}

impl ShellError {
    /// Check if the bus is gone and the shell should stop
    #[must_use]
    pub fn is_closed(&self) -> bool {
        matches!(self, Self::Host(e) if e.is_closed())
    }
}

/// Result of one builtin
#[derive(Debug, Clone, PartialEq, Eq)]
enum Flow {
    Value(Option<String>),
    /// Stored in full when assigned, masked when written
    Secret(String),
    Exit(i32),
}

struct Builtin {
    name: &'static str,
    usage: &'static str,
    summary: &'static str,
}

const BUILTINS: &[Builtin] = &[
    Builtin { name: "echo", usage: "echo <args...>", summary: "Write the arguments as one line" },
    Builtin { name: "write-host", usage: "write-host [-fg C] [-bg C] [-nonewline] <args...>", summary: "Write colored text" },
    Builtin { name: "write-error", usage: "write-error <args...>", summary: "Write an error line" },
    Builtin { name: "write-warning", usage: "write-warning <args...>", summary: "Write a warning line" },
    Builtin { name: "write-verbose", usage: "write-verbose <args...>", summary: "Write a verbose line" },
    Builtin { name: "write-debug", usage: "write-debug <args...>", summary: "Write a debug line" },
    Builtin { name: "read-host", usage: "read-host [-secure] [prompt...]", summary: "Read a line of input" },
    Builtin { name: "prompt", usage: "prompt <caption> <message> <field>...", summary: "Ask for named values" },
    Builtin { name: "choose", usage: "choose <caption> <message> <default> <label>...", summary: "Pick one option (default -1 for none)" },
    Builtin { name: "get-credential", usage: "get-credential <user> <target>", summary: "Ask for a password" },
    Builtin { name: "clear", usage: "clear", summary: "Clear the terminal" },
    Builtin { name: "cls", usage: "cls", summary: "Alias for clear" },
    Builtin { name: "get-host", usage: "get-host", summary: "Show host name, version and width" },
    Builtin { name: "set", usage: "set <name> <value...>", summary: "Set a variable" },
    Builtin { name: "vars", usage: "vars", summary: "List variables" },
    Builtin { name: "source", usage: "source <path>", summary: "Run a script file" },
    Builtin { name: ".", usage: ". <path>", summary: "Alias for source" },
    Builtin { name: "help", usage: "help", summary: "List commands" },
    Builtin { name: "exit", usage: "exit [code]", summary: "Stop the session" },
];

fn is_builtin(name: &str) -> bool {
    let name = name.to_lowercase();
    BUILTINS.iter().any(|builtin| builtin.name == name)
}

fn usage(name: &str) -> &'static str {
    BUILTINS
        .iter()
        .find(|builtin| builtin.name == name)
        .map_or("help", |builtin| builtin.usage)
}

// =============================================================================
// Tokenizer
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
struct Token {
    text: String,
    quoted: bool,
}

fn tokenize(line: &str, vars: &BTreeMap<String, String>) -> Result<Vec<Token>, ShellError> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_token = false;
    let mut quoted = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            c if c.is_whitespace() => {
                if in_token {
                    tokens.push(Token {
                        text: std::mem::take(&mut current),
                        quoted,
                    });
                    in_token = false;
                    quoted = false;
                }
            }
            '\'' => {
                in_token = true;
                quoted = true;
                loop {
                    match chars.next() {
                        Some('\'') => break,
                        Some(c) => current.push(c),
                        None => return Err(ShellError::UnterminatedQuote('\'')),
                    }
                }
            }
            '"' => {
                in_token = true;
                quoted = true;
                loop {
                    match chars.next() {
                        Some('"') => break,
                        Some('$') => expand_variable(&mut chars, vars, &mut current),
                        Some(c) => current.push(c),
                        None => return Err(ShellError::UnterminatedQuote('"')),
                    }
                }
            }
            '$' => {
                in_token = true;
                expand_variable(&mut chars, vars, &mut current);
            }
            c => {
                in_token = true;
                current.push(c);
            }
        }
    }

    if in_token {
        tokens.push(Token {
            text: current,
            quoted,
        });
    }
    Ok(tokens)
}

fn is_name_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Expand the variable whose name follows a `$` (unknown names are empty)
fn expand_variable(chars: &mut Peekable<Chars<'_>>, vars: &BTreeMap<String, String>, out: &mut String) {
    let mut name = String::new();
    while let Some(&c) = chars.peek() {
        if !is_name_char(c) {
            break;
        }
        name.push(c);
        chars.next();
    }

    if name.is_empty() {
        out.push('$');
    } else if let Some(value) = vars.get(&name.to_lowercase()) {
        out.push_str(value);
    }
}

/// Split `$name = rest` into its parts
fn split_assignment(line: &str) -> Option<(&str, &str)> {
    let after_sigil = line.strip_prefix('$')?;
    let name_len = after_sigil
        .char_indices()
        .find(|&(_, c)| !is_name_char(c))
        .map_or(after_sigil.len(), |(index, _)| index);
    if name_len == 0 {
        return None;
    }

    let (name, remainder) = after_sigil.split_at(name_len);
    let rest = remainder.trim_start().strip_prefix('=')?;
    Some((name, rest.trim()))
}

// =============================================================================
// Shell
// =============================================================================

/// Line interpreter state
#[derive(Debug)]
pub struct Shell {
    ui: HostUi,
    vars: BTreeMap<String, String>,
    depth: usize,
}

impl Shell {
    /// Create a shell writing to `ui`
    #[must_use]
    pub fn new(ui: HostUi) -> Self {
        Self {
            ui,
            vars: BTreeMap::new(),
            depth: 0,
        }
    }

    /// Get the UI this shell writes to
    #[must_use]
    pub fn ui(&self) -> &HostUi {
        &self.ui
    }

    /// Get a variable's value (names are case-insensitive)
    #[must_use]
    pub fn var(&self, name: &str) -> Option<&str> {
        self.vars.get(&name.to_lowercase()).map(String::as_str)
    }

    /// Run one line, reporting any failure to the terminal
    ///
    /// # Errors
    ///
    /// Returns an error only when the terminal itself is unreachable.
    pub fn execute_line(&mut self, line: &str) -> Result<Outcome, HostError> {
        match self.run_line(line) {
            Ok(outcome) => Ok(outcome),
            Err(ShellError::Host(e)) => Err(e),
            Err(e) => {
                self.ui.write_error_line(&e.to_string())?;
                Ok(Outcome::Continue)
            }
        }
    }

    /// Run a script file line by line
    ///
    /// A failing line is reported with its location and the script goes on.
    /// `exit` stops the script and is passed up.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, scripts nest too deeply,
    /// or the terminal is unreachable.
    pub fn source(&mut self, path: &Path) -> Result<Outcome, ShellError> {
        if self.depth >= MAX_SOURCE_DEPTH {
            return Err(ShellError::NestingTooDeep(MAX_SOURCE_DEPTH));
        }
        let content = std::fs::read_to_string(path).map_err(|source| ShellError::Script {
            path: path.to_path_buf(),
            source,
        })?;

        self.depth += 1;
        let result = self.run_script_lines(path, &content);
        self.depth -= 1;
        result
    }

    fn run_script_lines(&mut self, path: &Path, content: &str) -> Result<Outcome, ShellError> {
        for (index, line) in content.lines().enumerate() {
            match self.run_line(line) {
                Ok(Outcome::Continue) => {}
                Ok(exit) => return Ok(exit),
                Err(ShellError::Host(e)) => return Err(e.into()),
                Err(e) => {
                    warn!(path = ?path, line = index + 1, error = %e, "Script line failed");
                    self.ui
                        .write_error_line(&format!("{}:{}: {e}", path.display(), index + 1))?;
                }
            }
        }
        Ok(Outcome::Continue)
    }

    fn run_line(&mut self, line: &str) -> Result<Outcome, ShellError> {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            return Ok(Outcome::Continue);
        }
        debug!(command = line, "Executing command");

        if let Some((name, rest)) = split_assignment(line) {
            let tokens = tokenize(rest, &self.vars)?;
            let value = match tokens.as_slice() {
                [] => String::new(),
                [single] if single.quoted || !is_builtin(&single.text) => single.text.clone(),
                _ => match self.run_command(&tokens)? {
                    Flow::Value(value) => value.unwrap_or_default(),
                    Flow::Secret(value) => value,
                    Flow::Exit(code) => return Ok(Outcome::Exit(code)),
                },
            };
            self.vars.insert(name.to_lowercase(), value);
            return Ok(Outcome::Continue);
        }

        let tokens = tokenize(line, &self.vars)?;
        match self.run_command(&tokens)? {
            Flow::Value(Some(value)) => self.ui.write_line(&value)?,
            Flow::Value(None) => {}
            Flow::Secret(value) => self.ui.write_line(&"*".repeat(value.chars().count()))?,
            Flow::Exit(code) => return Ok(Outcome::Exit(code)),
        }
        Ok(Outcome::Continue)
    }

    fn run_command(&mut self, tokens: &[Token]) -> Result<Flow, ShellError> {
        let Some((head, rest)) = tokens.split_first() else {
            return Ok(Flow::Value(None));
        };
        let args: Vec<&str> = rest.iter().map(|token| token.text.as_str()).collect();
        let text = args.join(" ");

        match head.text.to_lowercase().as_str() {
            "echo" => Ok(Flow::Value(Some(text))),
            "write-host" => self.write_host(&args),
            "write-error" => {
                self.ui.write_error_line(&text)?;
                Ok(Flow::Value(None))
            }
            "write-warning" => {
                self.ui.write_warning_line(&text)?;
                Ok(Flow::Value(None))
            }
            "write-verbose" => {
                self.ui.write_verbose_line(&text)?;
                Ok(Flow::Value(None))
            }
            "write-debug" => {
                self.ui.write_debug_line(&text)?;
                Ok(Flow::Value(None))
            }
            "read-host" => self.read_host(&args),
            "prompt" => self.prompt(&args),
            "choose" => self.choose(&args),
            "get-credential" => self.get_credential(&args),
            "clear" | "cls" => {
                self.ui.clear()?;
                Ok(Flow::Value(None))
            }
            "get-host" => Ok(Flow::Value(Some(self.host_info()))),
            "set" => self.set(&args),
            "vars" => Ok(Flow::Value(self.list_vars())),
            "source" | "." => match args.as_slice() {
                [path] => Ok(match self.source(Path::new(path))? {
                    Outcome::Continue => Flow::Value(None),
                    Outcome::Exit(code) => Flow::Exit(code),
                }),
                _ => Err(ShellError::Usage(usage("source"))),
            },
            "help" => Ok(Flow::Value(Some(help_text()))),
            "exit" => match args.as_slice() {
                [] => Ok(Flow::Exit(0)),
                [code] => code
                    .parse()
                    .map(Flow::Exit)
                    .map_err(|_| ShellError::Usage(usage("exit"))),
                _ => Err(ShellError::Usage(usage("exit"))),
            },
            _ => Err(ShellError::UnknownCommand(head.text.clone())),
        }
    }

    // -------------------------------------------------------------------------
    // Builtins
    // -------------------------------------------------------------------------

    fn write_host(&self, args: &[&str]) -> Result<Flow, ShellError> {
        let mut foreground = None;
        let mut background = None;
        let mut newline = true;
        let mut words = Vec::new();

        let mut iter = args.iter();
        while let Some(arg) = iter.next() {
            match arg.to_lowercase().as_str() {
                "-fg" | "-foregroundcolor" => {
                    let name = iter.next().ok_or(ShellError::Usage(usage("write-host")))?;
                    foreground = Some(name.parse::<ConsoleColor>()?);
                }
                "-bg" | "-backgroundcolor" => {
                    let name = iter.next().ok_or(ShellError::Usage(usage("write-host")))?;
                    background = Some(name.parse::<ConsoleColor>()?);
                }
                "-nonewline" => newline = false,
                _ => words.push(*arg),
            }
        }

        let text = words.join(" ");
        let colored = foreground.is_some() || background.is_some();
        match (colored, newline) {
            (false, true) => self.ui.write_line(&text)?,
            (false, false) => self.ui.write(&text)?,
            (true, true) => self.ui.write_colored_line(foreground, background, &text)?,
            (true, false) => self.ui.write_colored(foreground, background, &text)?,
        }
        Ok(Flow::Value(None))
    }

    fn read_host(&self, args: &[&str]) -> Result<Flow, ShellError> {
        let (secure, words) = match args.split_first() {
            Some((flag, words)) if flag.eq_ignore_ascii_case("-secure") => (true, words),
            _ => (false, args),
        };

        let prompt = (!words.is_empty()).then(|| format!("{}: ", words.join(" ")));
        let value = self.ui.read_input(secure, prompt.as_deref())?;

        Ok(if secure {
            Flow::Secret(value)
        } else {
            Flow::Value(Some(value))
        })
    }

    fn prompt(&self, args: &[&str]) -> Result<Flow, ShellError> {
        let [caption, message, fields @ ..] = args else {
            return Err(ShellError::Usage(usage("prompt")));
        };
        if fields.is_empty() {
            return Err(ShellError::Usage(usage("prompt")));
        }

        let fields: Vec<PromptField> = fields
            .iter()
            .map(|label| PromptField::new(label.replace('&', ""), *label))
            .collect();
        let answers = self.ui.prompt(caption, message, &fields)?;

        let lines: Vec<String> = answers
            .into_iter()
            .map(|(name, value)| format!("{name}={value}"))
            .collect();
        Ok(Flow::Value(Some(lines.join("\n"))))
    }

    fn choose(&self, args: &[&str]) -> Result<Flow, ShellError> {
        let [caption, message, default, labels @ ..] = args else {
            return Err(ShellError::Usage(usage("choose")));
        };
        if labels.is_empty() {
            return Err(ShellError::Usage(usage("choose")));
        }

        let default: i64 = default
            .parse()
            .map_err(|_| ShellError::Usage(usage("choose")))?;
        let default = match usize::try_from(default) {
            Ok(index) if index < labels.len() => Some(index),
            _ if default == -1 => None,
            _ => return Err(ShellError::Usage(usage("choose"))),
        };

        let labels: Vec<String> = labels.iter().map(|label| (*label).to_string()).collect();
        let index = self
            .ui
            .prompt_for_choice(caption, message, &labels, default)?;
        Ok(Flow::Value(Some(index.to_string())))
    }

    fn get_credential(&self, args: &[&str]) -> Result<Flow, ShellError> {
        let [user, target] = args else {
            return Err(ShellError::Usage(usage("get-credential")));
        };

        let credential = self.ui.prompt_for_credential(
            "Credential request",
            &format!("Enter password for user {user} at {target}"),
            user,
            target,
        )?;
        Ok(Flow::Value(Some(format!(
            "{}@{}",
            credential.user(),
            credential.target()
        ))))
    }

    fn host_info(&self) -> String {
        let width = self
            .ui
            .width()
            .map_or_else(|| "unknown".to_string(), |columns| columns.to_string());
        format!(
            "Name: {HOST_NAME}\nVersion: {}\nWidth: {width}",
            env!("CARGO_PKG_VERSION")
        )
    }

    fn set(&mut self, args: &[&str]) -> Result<Flow, ShellError> {
        let Some((name, value)) = args.split_first() else {
            return Err(ShellError::Usage(usage("set")));
        };
        let name = name.strip_prefix('$').unwrap_or(name);
        if name.is_empty() || !name.chars().all(is_name_char) {
            return Err(ShellError::Usage(usage("set")));
        }

        self.vars.insert(name.to_lowercase(), value.join(" "));
        Ok(Flow::Value(None))
    }

    fn list_vars(&self) -> Option<String> {
        if self.vars.is_empty() {
            return None;
        }
        let lines: Vec<String> = self
            .vars
            .iter()
            .map(|(name, value)| format!("${name} = {value}"))
            .collect();
        Some(lines.join("\n"))
    }
}

fn help_text() -> String {
    let width = BUILTINS
        .iter()
        .map(|builtin| builtin.usage.len())
        .max()
        .unwrap_or_default();
    BUILTINS
        .iter()
        .map(|builtin| format!("{:<width$}  {}", builtin.usage, builtin.summary))
        .collect::<Vec<_>>()
        .join("\n")
}
