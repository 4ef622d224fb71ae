//! Typed-line translation
//!
//! Turns the bytes typed since the last Enter into the bytes that go on the
//! wire. In escaped mode `\xHH` sends the raw byte `0xHH`.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// How typed input is interpreted
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputMode {
    /// Send exactly what was typed
    #[default]
    Plain,
    /// Decode `\xHH` escapes
    Escaped,
}

impl InputMode {
    pub fn toggle(self) -> Self {
        match self {
            InputMode::Plain => InputMode::Escaped,
            InputMode::Escaped => InputMode::Plain,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TranslateError {
    #[error("Bad escape sequence \\{}", as_char(.0))]
    BadEscape(u8),

    #[error("Bad hex number {}{}", as_char(&.0[0]), as_char(&.0[1]))]
    BadHex([u8; 2]),

    #[error("Incomplete escape sequence at end of line")]
    Incomplete,
}

/// Escape decoder state
#[derive(Clone, Copy, PartialEq)]
enum EscapeState {
    Normal,
    SawBackslash,
    SawX,
    OneDigitRead(u8),
}

/// Translate a line for sending. Fails as a whole: no partial output.
pub fn translate(line: &[u8], mode: InputMode) -> Result<Vec<u8>, TranslateError> {
    match mode {
        InputMode::Plain => Ok(line.to_vec()),
        InputMode::Escaped => decode_escapes(line),
    }
}

fn decode_escapes(line: &[u8]) -> Result<Vec<u8>, TranslateError> {
    let mut out = Vec::with_capacity(line.len());
    let mut state = EscapeState::Normal;

    for &b in line {
        state = match state {
            EscapeState::Normal if b == b'\\' => EscapeState::SawBackslash,
            EscapeState::Normal => {
                out.push(b);
                EscapeState::Normal
            }
            EscapeState::SawBackslash if b == b'x' => EscapeState::SawX,
            EscapeState::SawBackslash => return Err(TranslateError::BadEscape(b)),
            EscapeState::SawX => EscapeState::OneDigitRead(b),
            EscapeState::OneDigitRead(first) => {
                let digits = [first, b];
                match (hex_value(first), hex_value(b)) {
                    (Some(hi), Some(lo)) => out.push((hi << 4) | lo),
                    _ => return Err(TranslateError::BadHex(digits)),
                }
                EscapeState::Normal
            }
        };
    }

    if state != EscapeState::Normal {
        return Err(TranslateError::Incomplete);
    }
    Ok(out)
}

fn as_char(b: &u8) -> char {
    char::from(*b)
}

fn hex_value(b: u8) -> Option<u8> {
    (b as char).to_digit(16).map(|d| d as u8)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_is_identity() {
        let line = b"GET / HTTP/1.0\\x41\n\r\x00\xff";
        assert_eq!(translate(line, InputMode::Plain).unwrap(), line.to_vec());
        assert_eq!(translate(b"", InputMode::Plain).unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn test_hex_escape() {
        assert_eq!(translate(b"\\x41", InputMode::Escaped).unwrap(), vec![0x41]);
        assert_eq!(
            translate(b"a\\xffb\\x0A", InputMode::Escaped).unwrap(),
            vec![b'a', 0xff, b'b', 0x0a]
        );
    }

    #[test]
    fn test_bad_hex() {
        assert_eq!(
            translate(b"\\xg1", InputMode::Escaped),
            Err(TranslateError::BadHex([b'g', b'1']))
        );
        assert_eq!(
            translate(b"ok\\x4z", InputMode::Escaped),
            Err(TranslateError::BadHex([b'4', b'z']))
        );
        assert_eq!(
            TranslateError::BadHex([b'g', b'1']).to_string(),
            "Bad hex number g1"
        );
    }

    #[test]
    fn test_bad_escape() {
        assert_eq!(
            translate(b"\\z", InputMode::Escaped),
            Err(TranslateError::BadEscape(b'z'))
        );
        assert_eq!(TranslateError::BadEscape(b'z').to_string(), "Bad escape sequence \\z");
        // a second backslash is not an escape introducer
        assert_eq!(
            translate(b"\\\\x41", InputMode::Escaped),
            Err(TranslateError::BadEscape(b'\\'))
        );
    }

    #[test]
    fn test_incomplete_escape() {
        assert_eq!(translate(b"abc\\", InputMode::Escaped), Err(TranslateError::Incomplete));
        assert_eq!(translate(b"\\x4", InputMode::Escaped), Err(TranslateError::Incomplete));
    }

    #[test]
    fn test_crlf_suffix_passes_through() {
        assert_eq!(
            translate(b"\\x41\n\r", InputMode::Escaped).unwrap(),
            vec![0x41, 0x0a, 0x0d]
        );
    }
}
