//! Interactive session
//!
//! The event loop that carries one connection. Keystrokes go through the
//! function key matcher first, then build up a line that is translated and
//! written to the socket on Enter. Socket bytes are recorded and shown in the
//! "Bytes received" window.
//!
//! Lifecycle: the socket is acquired first (see `transport::acquire`), then
//! [`Session::run`] loops until end of input, peer close, a signal or an I/O
//! error, and returns an [`Outcome`].

use std::io::{self, ErrorKind, Read};

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use super::display::{Direction, DisplaySink};
use super::format::Format;
use super::keyseq::{Clock, FunctionKey, FunctionKeys, KeyOutcome, KeySequenceMatcher};
use super::reactor::{Reactor, Ready};
use super::translate::{translate, InputMode};
use super::transport::{Protocol, Transport};
use crate::history::ByteHistory;

/// Line buffer size, including the two bytes Enter may append
pub const LINE_CAPACITY: usize = 4096;

/// Bytes a line may hold before Enter
const LINE_LIMIT: usize = LINE_CAPACITY - 2;

const READ_CHUNK: usize = 4096;

const TAB: u8 = 9;
const LF: u8 = 10;
const CR: u8 = 13;
const BACKSPACE: u8 = 127;

/// What Enter appends to the line
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum EnterMode {
    /// Append LF then CR
    #[default]
    #[serde(rename = "crlf")]
    SendCrlf,
    /// Append nothing
    #[serde(rename = "nothing")]
    SendNothing,
}

impl EnterMode {
    pub fn toggle(self) -> Self {
        match self {
            EnterMode::SendCrlf => EnterMode::SendNothing,
            EnterMode::SendNothing => EnterMode::SendCrlf,
        }
    }
}

/// Operator-controlled modes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionState {
    #[serde(rename = "enter")]
    pub enter_mode: EnterMode,
    #[serde(rename = "input")]
    pub input_mode: InputMode,
    pub sent_format: Format,
    pub received_format: Format,
}

/// How the session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// End of input, peer close or signal
    Clean,
    /// An I/O error ended the session
    Failed,
}

impl Outcome {
    pub fn exit_code(self) -> i32 {
        match self {
            Outcome::Clean => 0,
            Outcome::Failed => 1,
        }
    }
}

/// Whether the loop keeps going after a batch of input
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Stop(Outcome),
}

/// One connection's session
pub struct Session<T: Transport, D: DisplaySink, C: Clock> {
    state: SessionState,
    matcher: KeySequenceMatcher<C>,
    /// Bytes typed since the last Enter
    line: Vec<u8>,
    /// Line overflow already reported
    line_overflowed: bool,
    sent: ByteHistory,
    received: ByteHistory,
    transport: T,
    display: D,
    /// The one receive-and-learn step has happened
    peer_learned: bool,
}

impl<T: Transport, D: DisplaySink, C: Clock> Session<T, D, C> {
    pub fn new(transport: T, display: D, keys: FunctionKeys, clock: C, state: SessionState) -> Self {
        Self {
            state,
            matcher: KeySequenceMatcher::new(keys, clock),
            line: Vec::with_capacity(LINE_CAPACITY),
            line_overflowed: false,
            sent: ByteHistory::new(Direction::Sent),
            received: ByteHistory::new(Direction::Received),
            transport,
            display,
            peer_learned: false,
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// Run until the session ends
    pub fn run(&mut self, reactor: &mut impl Reactor, input: &mut impl Read) -> Outcome {
        info!("Session active: {:?}", self.state);

        // input typed while connecting raised its only readiness edge already
        let outcome = match self.handle_terminal(input) {
            Flow::Stop(outcome) => outcome,
            Flow::Continue => self.event_loop(reactor, input),
        };
        self.display.present();

        info!(
            "Session ended: {:?} ({} bytes sent, {} received)",
            outcome,
            self.sent.len(),
            self.received.len()
        );
        outcome
    }

    fn event_loop(&mut self, reactor: &mut impl Reactor, input: &mut impl Read) -> Outcome {
        loop {
            self.display.present();
            let ready = match reactor.wait_ready() {
                Ok(ready) => ready,
                Err(e) => {
                    error!("Readiness wait failed: {}", e);
                    self.display.write_info(&format!("Error waiting for input ({})\n", e));
                    break Outcome::Failed;
                }
            };

            if ready.contains(Ready::SHUTDOWN) {
                self.display.write_info("got signal, exiting\n");
                break Outcome::Clean;
            }
            if ready.contains(Ready::RESIZE) {
                self.display.relayout();
            }
            if ready.contains(Ready::TERMINAL) {
                if let Flow::Stop(outcome) = self.handle_terminal(input) {
                    break outcome;
                }
            }
            if ready.contains(Ready::SOCKET) {
                if let Flow::Stop(outcome) = self.handle_socket() {
                    break outcome;
                }
            }
        }
    }

    /// Drain the terminal
    fn handle_terminal(&mut self, input: &mut impl Read) -> Flow {
        let mut buf = [0u8; READ_CHUNK];
        loop {
            match input.read(&mut buf) {
                Ok(0) => {
                    info!("End of terminal input");
                    return Flow::Stop(Outcome::Clean);
                }
                Ok(n) => {
                    for &byte in &buf[..n] {
                        self.handle_key(byte);
                    }
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => return Flow::Continue,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    error!("stdin read failed: {}", e);
                    self.display.write_info(&format!("Error reading stdin ({})\n", e));
                    self.transport.shutdown_write();
                    return Flow::Stop(Outcome::Failed);
                }
            }
        }
    }

    fn handle_key(&mut self, byte: u8) {
        match self.matcher.feed(byte) {
            KeyOutcome::Pressed(key) => self.function_key(key),
            KeyOutcome::Consumed => {}
            KeyOutcome::Ordinary => match byte {
                TAB => {}
                BACKSPACE => {
                    if self.line.pop().is_some() {
                        self.display.erase_input();
                    }
                }
                CR => {
                    self.display.echo_input(byte);
                    self.send_line();
                }
                _ if self.line.len() < LINE_LIMIT => {
                    self.line.push(byte);
                    self.display.echo_input(byte);
                }
                _ => {
                    if !self.line_overflowed {
                        self.line_overflowed = true;
                        warn!("Input line full at {} bytes", LINE_LIMIT);
                        self.display
                            .write_info(&format!("\nLine full ({} bytes), input dropped until Enter\n", LINE_LIMIT));
                    }
                }
            },
        }
    }

    fn function_key(&mut self, key: FunctionKey) {
        match key {
            FunctionKey::F1 => {
                self.state.received_format = self.state.received_format.toggle();
                self.announce_format(Direction::Received, self.state.received_format);
                self.received.replay(self.state.received_format, &mut self.display);
            }
            FunctionKey::F2 => {
                self.state.sent_format = self.state.sent_format.toggle();
                self.announce_format(Direction::Sent, self.state.sent_format);
                self.sent.replay(self.state.sent_format, &mut self.display);
            }
            FunctionKey::F3 => {
                self.state.enter_mode = self.state.enter_mode.toggle();
                debug!("Enter mode now {:?}", self.state.enter_mode);
                self.display.write_info(match self.state.enter_mode {
                    EnterMode::SendCrlf => "Enter now sends CR LF\n",
                    EnterMode::SendNothing => "Enter now sends nothing\n",
                });
            }
            FunctionKey::F4 => {
                self.state.input_mode = self.state.input_mode.toggle();
                debug!("Input mode now {:?}", self.state.input_mode);
                self.display.write_info(match self.state.input_mode {
                    InputMode::Escaped => "Using escaped interpretation for input\n",
                    InputMode::Plain => "Using plain text interpretation for input\n",
                });
            }
        }
    }

    fn announce_format(&mut self, direction: Direction, format: Format) {
        debug!("{} format now {:?}", direction.window_name(), format);
        self.display.write_info(&format!(
            "Using {} formatting for {} window\n",
            format.name(),
            direction.window_name()
        ));
    }

    /// Translate and send the current line. The line is cleared either way.
    fn send_line(&mut self) {
        let mut line = std::mem::replace(&mut self.line, Vec::with_capacity(LINE_CAPACITY));
        self.line_overflowed = false;

        if self.state.enter_mode == EnterMode::SendCrlf {
            line.extend_from_slice(&[LF, CR]);
        }

        let bytes = match translate(&line, self.state.input_mode) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("Discarding line: {}", e);
                self.display.write_info(&format!("{}\n", e));
                return;
            }
        };
        if bytes.is_empty() {
            return;
        }

        match self.transport.write(&bytes) {
            Ok(n) => {
                for &byte in &bytes[..n] {
                    self.display.write_sent(&self.state.sent_format.token(byte));
                    self.sent.record(byte, &mut self.display);
                }
                debug!("Wrote {} of {} bytes", n, bytes.len());
                self.display.write_info(&format!("wrote {} bytes into the socket\n", n));
            }
            Err(e) => {
                error!("Socket write failed: {}", e);
                self.display
                    .write_info(&format!("Error writing to the connection ({})\n", e));
            }
        }
    }

    /// Drain the socket
    fn handle_socket(&mut self) -> Flow {
        let mut buf = [0u8; READ_CHUNK];
        loop {
            let result = if !self.peer_learned && self.transport.awaiting_peer() {
                self.receive_and_learn(&mut buf)
            } else {
                self.transport.read(&mut buf)
            };

            match result {
                Ok(0) if self.transport.protocol() == Protocol::Tcp => {
                    info!("Peer closed the connection");
                    self.display.write_info("Connection closed by peer\n");
                    self.transport.shutdown_write();
                    return Flow::Stop(Outcome::Clean);
                }
                Ok(n) => self.show_received(&buf[..n]),
                Err(e) if e.kind() == ErrorKind::WouldBlock => return Flow::Continue,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    error!("Socket read failed: {}", e);
                    self.display.write_info(&format!("Error reading socket ({})\n", e));
                    self.transport.shutdown_write();
                    return Flow::Stop(Outcome::Failed);
                }
            }
        }
    }

    /// First datagram on a listening UDP socket picks the peer
    fn receive_and_learn(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let (n, from) = self.transport.receive_from(buf)?;
        self.peer_learned = true;

        match self.transport.fix_peer(from) {
            Ok(()) => {
                self.display
                    .write_info(&format!("Using {} for udp remote host:port\n", from));
            }
            Err(e) => {
                warn!("Could not use {} as UDP peer: {}", from, e);
                self.display
                    .write_info(&format!("Error using {} as udp remote host:port ({})\n", from, e));
            }
        }
        Ok(n)
    }

    fn show_received(&mut self, bytes: &[u8]) {
        for &byte in bytes {
            self.display.write_received(&self.state.received_format.token(byte));
            self.received.record(byte, &mut self.display);
        }
    }

    #[cfg(test)]
    fn display(&self) -> &D {
        &self.display
    }

    #[cfg(test)]
    fn transport(&self) -> &T {
        &self.transport
    }
}
