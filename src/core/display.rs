//! Output side of the session
//!
//! The engine never draws anything itself. Everything it wants to show goes
//! through a [`DisplaySink`], which the UI implements on top of the terminal
//! and the tests implement on top of plain vectors.

/// Which traffic window a piece of output belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Bytes written into the socket
    Sent,
    /// Bytes read from the socket
    Received,
}

impl Direction {
    /// Window title, also used in messages
    pub fn window_name(self) -> &'static str {
        match self {
            Direction::Sent => "Bytes sent",
            Direction::Received => "Bytes received",
        }
    }
}

/// Sink for everything the session displays. Return values are never consulted;
/// implementations log their own failures.
pub trait DisplaySink {
    /// Append text to the info window
    fn write_info(&mut self, text: &str);
    /// Append a formatted token to the "Bytes received" window
    fn write_received(&mut self, token: &str);
    /// Append a formatted token to the "Bytes sent" window
    fn write_sent(&mut self, token: &str);
    /// Clear the "Bytes received" window
    fn clear_received(&mut self);
    /// Clear the "Bytes sent" window
    fn clear_sent(&mut self);
    /// Echo one typed byte into the info window
    fn echo_input(&mut self, byte: u8);
    /// Remove the last echoed byte from the info window
    fn erase_input(&mut self);
    /// Terminal geometry changed
    fn relayout(&mut self) {}
    /// Push pending output to the screen
    fn present(&mut self) {}

    /// Write a token to the window for `direction`
    fn write_traffic(&mut self, direction: Direction, token: &str) {
        match direction {
            Direction::Sent => self.write_sent(token),
            Direction::Received => self.write_received(token),
        }
    }

    /// Clear the window for `direction`
    fn clear_traffic(&mut self, direction: Direction) {
        match direction {
            Direction::Sent => self.clear_sent(),
            Direction::Received => self.clear_received(),
        }
    }
}

/// In-memory sink used by the unit tests
#[cfg(test)]
#[derive(Debug, Default)]
pub struct RecordingDisplay {
    pub info: Vec<String>,
    pub received: Vec<String>,
    pub sent: Vec<String>,
    pub received_clears: usize,
    pub sent_clears: usize,
    pub echoed: Vec<u8>,
    pub erased: usize,
}

#[cfg(test)]
impl RecordingDisplay {
    /// True if any info message contains `needle`
    pub fn info_contains(&self, needle: &str) -> bool {
        self.info.iter().any(|m| m.contains(needle))
    }
}

#[cfg(test)]
impl DisplaySink for RecordingDisplay {
    fn write_info(&mut self, text: &str) {
        self.info.push(text.to_string());
    }

    fn write_received(&mut self, token: &str) {
        self.received.push(token.to_string());
    }

    fn write_sent(&mut self, token: &str) {
        self.sent.push(token.to_string());
    }

    fn clear_received(&mut self) {
        self.received.clear();
        self.received_clears += 1;
    }

    fn clear_sent(&mut self) {
        self.sent.clear();
        self.sent_clears += 1;
    }

    fn echo_input(&mut self, byte: u8) {
        self.echoed.push(byte);
    }

    fn erase_input(&mut self) {
        self.echoed.pop();
        self.erased += 1;
    }
}
