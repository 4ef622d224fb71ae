//! Traffic history for pint
//!
//! Keeps the raw bytes shown in a traffic window so the window can be
//! redrawn when the operator switches its display format.

use tracing::warn;

use crate::core::display::{Direction, DisplaySink};
use crate::core::format::Format;

/// Maximum number of bytes kept per direction
pub const HISTORY_LIMIT: usize = 10_000;

/// Append-only byte log for one traffic direction
pub struct ByteHistory {
    /// Window this history belongs to
    direction: Direction,
    /// Stored bytes, oldest first
    bytes: Vec<u8>,
    /// Maximum bytes
    capacity: usize,
    /// Set on the first dropped byte; never cleared
    overflowed: bool,
}

impl ByteHistory {
    /// Create an empty history with the default capacity
    pub fn new(direction: Direction) -> Self {
        Self::with_capacity(direction, HISTORY_LIMIT)
    }

    pub fn with_capacity(direction: Direction, capacity: usize) -> Self {
        Self {
            direction,
            bytes: Vec::with_capacity(capacity.min(HISTORY_LIMIT)),
            capacity,
            overflowed: false,
        }
    }

    /// Store a byte. Once the buffer is full the byte is dropped and, the
    /// first time only, reformatting is announced as disabled.
    pub fn record(&mut self, byte: u8, display: &mut impl DisplaySink) {
        if self.bytes.len() < self.capacity {
            self.bytes.push(byte);
            return;
        }

        if !self.overflowed {
            self.overflowed = true;
            warn!("{} history full after {} bytes", self.direction.window_name(), self.capacity);
            display.write_info(&format!(
                "{} buffer full, reformatting disabled\n",
                self.direction.window_name()
            ));
        }
    }

    /// Redraw the window from history using `format`.
    ///
    /// Returns `false` (and shows a notice instead) if bytes have been
    /// dropped, since a partial redraw would misrepresent the traffic.
    pub fn replay(&self, format: Format, display: &mut impl DisplaySink) -> bool {
        if self.overflowed {
            display.write_info("reformatting disabled.\n");
            return false;
        }

        display.clear_traffic(self.direction);
        for &byte in &self.bytes {
            display.write_traffic(self.direction, &format.token(byte));
        }
        true
    }

    /// Stored bytes, oldest first
    #[cfg(test)]
    pub fn as_slice(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Whether any byte has been dropped
    #[cfg(test)]
    pub fn is_overflowed(&self) -> bool {
        self.overflowed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::display::RecordingDisplay;

    #[test]
    fn test_record_and_replay() {
        let mut display = RecordingDisplay::default();
        let mut history = ByteHistory::new(Direction::Received);
        for &b in b"AB\n" {
            history.record(b, &mut display);
        }
        display.write_received("stale");

        assert!(history.replay(Format::Hex, &mut display));
        assert_eq!(display.received_clears, 1);
        assert_eq!(display.received, vec!["41 ", "42 ", "0a "]);
        assert!(display.sent.is_empty());
    }

    #[test]
    fn test_replay_targets_own_window() {
        let mut display = RecordingDisplay::default();
        let mut history = ByteHistory::new(Direction::Sent);
        history.record(b'z', &mut display);

        assert!(history.replay(Format::Wide, &mut display));
        assert_eq!(display.sent_clears, 1);
        assert_eq!(display.received_clears, 0);
        assert_eq!(display.sent, vec!["z(7a) "]);
    }

    #[test]
    fn test_overflow_disables_replay() {
        let mut display = RecordingDisplay::default();
        let mut history = ByteHistory::new(Direction::Received);
        for i in 0..HISTORY_LIMIT {
            history.record((i % 256) as u8, &mut display);
        }
        assert_eq!(history.len(), HISTORY_LIMIT);
        assert!(!history.is_overflowed());
        assert!(display.info.is_empty());

        history.record(0xaa, &mut display);
        assert_eq!(history.len(), HISTORY_LIMIT);
        assert!(history.is_overflowed());
        assert_eq!(display.info.len(), 1);
        assert!(display.info_contains("reformatting disabled"));

        // later drops stay silent
        history.record(0xbb, &mut display);
        history.record(0xcc, &mut display);
        assert_eq!(display.info.len(), 1);

        assert!(!history.replay(Format::Text, &mut display));
        assert_eq!(display.received_clears, 0);
        assert!(display.received.is_empty());
        assert_eq!(display.info.last().map(String::as_str), Some("reformatting disabled.\n"));
    }

    #[test]
    fn test_full_but_not_overflowed_still_replays() {
        let mut display = RecordingDisplay::default();
        let mut history = ByteHistory::with_capacity(Direction::Sent, 3);
        for &b in b"xyz" {
            history.record(b, &mut display);
        }
        assert!(history.replay(Format::Text, &mut display));
        assert_eq!(display.sent, vec!["x", "y", "z"]);
        assert_eq!(history.as_slice(), b"xyz");
    }
}
