//! Terminal text formatting
//!
//! The browser terminal understands inline color markup of the form
//! `[[;#rrggbb;#rrggbb]text]` (foreground, then background; either slot may
//! be empty). Square brackets inside the text are escaped as HTML entities so
//! they cannot close the markup early.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Unrecognized color name
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown color: {0}")]
pub struct UnknownColor(pub String);

/// The sixteen classic console colors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConsoleColor {
    Black,
    Blue,
    Cyan,
    DarkBlue,
    DarkCyan,
    DarkGray,
    DarkGreen,
    DarkMagenta,
    DarkRed,
    DarkYellow,
    Gray,
    Green,
    Magenta,
    Red,
    White,
    Yellow,
}

impl ConsoleColor {
    /// Every color, in name order
    pub const ALL: [ConsoleColor; 16] = [
        Self::Black,
        Self::Blue,
        Self::Cyan,
        Self::DarkBlue,
        Self::DarkCyan,
        Self::DarkGray,
        Self::DarkGreen,
        Self::DarkMagenta,
        Self::DarkRed,
        Self::DarkYellow,
        Self::Gray,
        Self::Green,
        Self::Magenta,
        Self::Red,
        Self::White,
        Self::Yellow,
    ];

    /// Display name, as accepted by `FromStr`
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Black => "Black",
            Self::Blue => "Blue",
            Self::Cyan => "Cyan",
            Self::DarkBlue => "DarkBlue",
            Self::DarkCyan => "DarkCyan",
            Self::DarkGray => "DarkGray",
            Self::DarkGreen => "DarkGreen",
            Self::DarkMagenta => "DarkMagenta",
            Self::DarkRed => "DarkRed",
            Self::DarkYellow => "DarkYellow",
            Self::Gray => "Gray",
            Self::Green => "Green",
            Self::Magenta => "Magenta",
            Self::Red => "Red",
            Self::White => "White",
            Self::Yellow => "Yellow",
        }
    }

    /// RGB value used by the browser terminal
    ///
    /// These are the web named colors; dark yellow has no web equivalent and
    /// renders as yellow-green.
    #[must_use]
    pub fn rgb(self) -> (u8, u8, u8) {
        match self {
            Self::Black => (0x00, 0x00, 0x00),
            Self::Blue => (0x00, 0x00, 0xff),
            Self::Cyan => (0x00, 0xff, 0xff),
            Self::DarkBlue => (0x00, 0x00, 0x8b),
            Self::DarkCyan => (0x00, 0x8b, 0x8b),
            Self::DarkGray => (0xa9, 0xa9, 0xa9),
            Self::DarkGreen => (0x00, 0x64, 0x00),
            Self::DarkMagenta => (0x8b, 0x00, 0x8b),
            Self::DarkRed => (0x8b, 0x00, 0x00),
            Self::DarkYellow => (0x9a, 0xcd, 0x32),
            Self::Gray => (0x80, 0x80, 0x80),
            Self::Green => (0x00, 0x80, 0x00),
            Self::Magenta => (0xff, 0x00, 0xff),
            Self::Red => (0xff, 0x00, 0x00),
            Self::White => (0xff, 0xff, 0xff),
            Self::Yellow => (0xff, 0xff, 0x00),
        }
    }

    /// `#rrggbb` form of [`ConsoleColor::rgb`]
    #[must_use]
    pub fn hex(self) -> String {
        let (r, g, b) = self.rgb();
        format!("#{r:02x}{g:02x}{b:02x}")
    }
}

impl fmt::Display for ConsoleColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ConsoleColor {
    type Err = UnknownColor;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Self::ALL
            .into_iter()
            .find(|color| color.name().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| UnknownColor(wanted.to_string()))
    }
}

/// Escape square brackets so text cannot break out of color markup
#[must_use]
pub fn escape_markup(text: &str) -> String {
    text.replace('[', "&#91;").replace(']', "&#93;")
}

/// Wrap text in color markup
#[must_use]
pub fn format_with_color(
    text: &str,
    foreground: Option<ConsoleColor>,
    background: Option<ConsoleColor>,
) -> String {
    let slot = |color: Option<ConsoleColor>| color.map(ConsoleColor::hex).unwrap_or_default();
    format!(
        "[[;{};{}]{}]",
        slot(foreground),
        slot(background),
        escape_markup(text)
    )
}

// =============================================================================
// Hotkeys
// =============================================================================

/// A label with its `&` accelerator split out
///
/// `"Yes to &all"` becomes hotkey `"A"` and label `"Yes to all"`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HotkeyLabel {
    /// Uppercased accelerator character, empty if the label has none
    pub hotkey: String,
    /// Label with every `&` removed
    pub label: String,
}

impl HotkeyLabel {
    /// Parse a label that may contain an `&` marker
    #[must_use]
    pub fn parse(input: &str) -> Self {
        let hotkey = input
            .find('&')
            .and_then(|index| input[index + 1..].chars().next())
            .map(|c| c.to_uppercase().collect::<String>())
            .unwrap_or_default();

        Self {
            hotkey,
            label: input.replace('&', ""),
        }
    }

    /// Check if this label has an accelerator
    #[must_use]
    pub fn has_hotkey(&self) -> bool {
        !self.hotkey.is_empty()
    }
}

/// Render the option list shown while asking for a choice
///
/// Each option appears as `<H> Label`; a valid default appends
/// `(default is "H")`.
#[must_use]
pub fn choice_prompt(options: &[HotkeyLabel], default: Option<usize>) -> String {
    let mut text = options
        .iter()
        .map(|option| format!("<{}> {}", option.hotkey, option.label))
        .collect::<Vec<_>>()
        .join("   ");

    if let Some(option) = default.and_then(|index| options.get(index)) {
        let key = if option.has_hotkey() {
            &option.hotkey
        } else {
            &option.label
        };
        text.push_str(&format!(" (default is \"{key}\")"));
    }
    text.push_str(": ");
    text
}
