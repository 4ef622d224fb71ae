//! Function key detection
//!
//! Keystrokes arrive as raw bytes, so F1..F4 show up as short escape
//! sequences (`ESC O P` on xterm). The matcher buffers bytes after an ESC and
//! recognises a chord only if its bytes arrive close together; a human typing
//! ESC and then letters is slower than the 250 ms window.

use std::time::{Duration, Instant};

use tracing::{debug, trace};

/// Maximum gap between two bytes of one chord
pub const CHORD_TIMEOUT: Duration = Duration::from_millis(250);

/// Gaps this long are never part of a chord, whatever the clock says
const CHORD_GAP_LIMIT: Duration = Duration::from_secs(2);

/// Maximum chord length
pub const CAPTURE_LIMIT: usize = 16;

const ESC: u8 = 0x1B;

/// Source of the current time
pub trait Clock {
    fn now(&self) -> Instant;
}

/// Monotonic system clock
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// The four bound function keys
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FunctionKey {
    /// Toggle the received-window format
    F1,
    /// Toggle the sent-window format
    F2,
    /// Toggle the Enter key behaviour
    F3,
    /// Toggle the input interpretation mode
    F4,
}

impl FunctionKey {
    pub const ALL: [FunctionKey; 4] = [FunctionKey::F1, FunctionKey::F2, FunctionKey::F3, FunctionKey::F4];
}

/// Byte sequences the terminal sends for F1..F4
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionKeys {
    sequences: [Vec<u8>; 4],
}

impl FunctionKeys {
    pub fn new(f1: Vec<u8>, f2: Vec<u8>, f3: Vec<u8>, f4: Vec<u8>) -> Self {
        Self {
            sequences: [f1, f2, f3, f4],
        }
    }

    /// Sequence bound to `key`
    pub fn sequence(&self, key: FunctionKey) -> &[u8] {
        &self.sequences[key as usize]
    }

    /// Key whose sequence equals `bytes` exactly
    pub fn lookup(&self, bytes: &[u8]) -> Option<FunctionKey> {
        FunctionKey::ALL
            .into_iter()
            .find(|&key| self.sequence(key) == bytes)
    }
}

/// What the matcher did with a byte
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyOutcome {
    /// Not part of a chord; process as normal input
    Ordinary,
    /// Swallowed into a pending chord
    Consumed,
    /// Completed a chord
    Pressed(FunctionKey),
}

/// In-progress chord
struct Capture {
    bytes: Vec<u8>,
    last_byte_at: Instant,
}

/// Chord recogniser
pub struct KeySequenceMatcher<C: Clock> {
    keys: FunctionKeys,
    clock: C,
    capture: Option<Capture>,
}

impl<C: Clock> KeySequenceMatcher<C> {
    pub fn new(keys: FunctionKeys, clock: C) -> Self {
        Self {
            keys,
            clock,
            capture: None,
        }
    }

    /// Feed one keyboard byte
    pub fn feed(&mut self, byte: u8) -> KeyOutcome {
        let now = self.clock.now();

        if byte == ESC {
            // ESC always (re)starts a chord
            let mut bytes = Vec::with_capacity(CAPTURE_LIMIT);
            bytes.push(ESC);
            self.capture = Some(Capture { bytes, last_byte_at: now });
            return KeyOutcome::Consumed;
        }

        let Some(capture) = self.capture.as_mut() else {
            return KeyOutcome::Ordinary;
        };

        // checked_duration_since is None if the clock stepped backwards
        let in_window = now
            .checked_duration_since(capture.last_byte_at)
            .map_or(false, |gap| gap < CHORD_GAP_LIMIT && gap < CHORD_TIMEOUT);

        if !in_window {
            trace!("chord capture timed out after {} bytes", capture.bytes.len());
            self.capture = None;
            return KeyOutcome::Ordinary;
        }

        if capture.bytes.len() >= CAPTURE_LIMIT {
            debug!("chord capture exceeded {} bytes, abandoned", CAPTURE_LIMIT);
            self.capture = None;
            return KeyOutcome::Ordinary;
        }

        capture.bytes.push(byte);
        capture.last_byte_at = now;

        match self.keys.lookup(&capture.bytes) {
            Some(key) => {
                debug!("function key {:?} pressed", key);
                self.capture = None;
                KeyOutcome::Pressed(key)
            }
            None => KeyOutcome::Consumed,
        }
    }

    /// Whether a chord is being captured
    #[cfg(test)]
    pub fn is_capturing(&self) -> bool {
        self.capture.is_some()
    }

    #[cfg(test)]
    pub fn clock(&self) -> &C {
        &self.clock
    }
}

/// Hand-driven clock for tests
#[cfg(test)]
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: std::rc::Rc<std::cell::Cell<Instant>>,
}

#[cfg(test)]
impl ManualClock {
    pub fn new() -> Self {
        Self {
            now: std::rc::Rc::new(std::cell::Cell::new(Instant::now())),
        }
    }

    pub fn advance(&self, by: Duration) {
        self.now.set(self.now.get() + by);
    }
}

#[cfg(test)]
impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.now.get()
    }
}

/// xterm's sequences, handy for tests
#[cfg(test)]
pub fn xterm_keys() -> FunctionKeys {
    FunctionKeys::new(
        b"\x1bOP".to_vec(),
        b"\x1bOQ".to_vec(),
        b"\x1bOR".to_vec(),
        b"\x1bOS".to_vec(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matcher() -> KeySequenceMatcher<ManualClock> {
        KeySequenceMatcher::new(xterm_keys(), ManualClock::new())
    }

    #[test]
    fn test_plain_bytes_are_ordinary() {
        let mut m = matcher();
        for &b in b"hello" {
            assert_eq!(m.feed(b), KeyOutcome::Ordinary);
        }
        assert!(!m.is_capturing());
    }

    #[test]
    fn test_chord_within_window() {
        let mut m = matcher();
        assert_eq!(m.feed(0x1b), KeyOutcome::Consumed);
        m.clock().advance(Duration::from_millis(5));
        assert_eq!(m.feed(b'O'), KeyOutcome::Consumed);
        m.clock().advance(Duration::from_millis(5));
        assert_eq!(m.feed(b'P'), KeyOutcome::Pressed(FunctionKey::F1));
        assert!(!m.is_capturing());
        // next byte is ordinary again
        assert_eq!(m.feed(b'P'), KeyOutcome::Ordinary);
    }

    #[test]
    fn test_all_keys() {
        let mut m = matcher();
        for (key, last) in FunctionKey::ALL.into_iter().zip(*b"PQRS") {
            m.feed(0x1b);
            m.feed(b'O');
            assert_eq!(m.feed(last), KeyOutcome::Pressed(key));
        }
    }

    #[test]
    fn test_window_is_per_byte() {
        let mut m = matcher();
        m.feed(0x1b);
        m.clock().advance(Duration::from_millis(200));
        assert_eq!(m.feed(b'O'), KeyOutcome::Consumed);
        // 400ms since ESC, but only 200ms since 'O'
        m.clock().advance(Duration::from_millis(200));
        assert_eq!(m.feed(b'P'), KeyOutcome::Pressed(FunctionKey::F1));
    }

    #[test]
    fn test_slow_bytes_are_ordinary() {
        let mut m = matcher();
        assert_eq!(m.feed(0x1b), KeyOutcome::Consumed);
        m.clock().advance(Duration::from_millis(400));
        assert_eq!(m.feed(b'O'), KeyOutcome::Ordinary);
        assert!(!m.is_capturing());
        assert_eq!(m.feed(b'P'), KeyOutcome::Ordinary);
    }

    #[test]
    fn test_exact_threshold_times_out() {
        let mut m = matcher();
        m.feed(0x1b);
        m.clock().advance(CHORD_TIMEOUT);
        assert_eq!(m.feed(b'O'), KeyOutcome::Ordinary);
    }

    #[test]
    fn test_esc_restarts_capture() {
        let mut m = matcher();
        m.feed(0x1b);
        m.feed(b'O');
        assert_eq!(m.feed(0x1b), KeyOutcome::Consumed);
        m.feed(b'O');
        assert_eq!(m.feed(b'Q'), KeyOutcome::Pressed(FunctionKey::F2));
    }

    #[test]
    fn test_unknown_sequence_keeps_capturing() {
        let mut m = matcher();
        m.feed(0x1b);
        assert_eq!(m.feed(b'['), KeyOutcome::Consumed);
        assert_eq!(m.feed(b'A'), KeyOutcome::Consumed);
        assert!(m.is_capturing());
    }

    #[test]
    fn test_capture_is_bounded() {
        let mut m = matcher();
        m.feed(0x1b);
        for _ in 1..CAPTURE_LIMIT {
            assert_eq!(m.feed(b'x'), KeyOutcome::Consumed);
        }
        assert_eq!(m.feed(b'x'), KeyOutcome::Ordinary);
        assert!(!m.is_capturing());
    }

    #[test]
    fn test_lookup_needs_exact_length() {
        let keys = xterm_keys();
        assert_eq!(keys.lookup(b"\x1bO"), None);
        assert_eq!(keys.lookup(b"\x1bOPP"), None);
        assert_eq!(keys.lookup(b"\x1bOS"), Some(FunctionKey::F4));
    }
}
