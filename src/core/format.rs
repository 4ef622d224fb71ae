//! Byte display formatters
//!
//! Converts raw bytes into the short tokens shown in the
//! "Bytes sent" and "Bytes received" windows.

use serde::{Deserialize, Serialize};

/// Display format for one direction of traffic
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    /// Glyph plus hex code, e.g. `A(41) `
    #[default]
    Wide,
    /// The byte as a single character (telnet-like)
    Text,
    /// Two hex digits, e.g. `41 `
    Hex,
}

impl Format {
    /// Convert a byte into its display token. Total over 0..=255.
    pub fn token(self, byte: u8) -> String {
        match self {
            Format::Wide => {
                let glyph = if is_control(byte) { ' ' } else { byte as char };
                format!("{}({:02x}) ", glyph, byte)
            }
            Format::Text => (byte as char).to_string(),
            Format::Hex => format!("{:02x} ", byte),
        }
    }

    /// Next format in the cycle Wide -> Text -> Hex -> Wide
    pub fn toggle(self) -> Self {
        match self {
            Format::Wide => Format::Text,
            Format::Text => Format::Hex,
            Format::Hex => Format::Wide,
        }
    }

    /// Name used in mode announcements
    pub fn name(self) -> &'static str {
        match self {
            Format::Wide => "wide",
            Format::Text => "plain text",
            Format::Hex => "hex",
        }
    }
}

/// Bytes that get a blank glyph in wide mode (TAB, LF, CR, DEL)
fn is_control(byte: u8) -> bool {
    matches!(byte, 9 | 10 | 13 | 127)
}
