//! Readiness waiting
//!
//! A single mio poll over the terminal, the session socket and the signal
//! pipe. Registration is edge-triggered: the caller drains every ready source
//! until it would block.

use std::io::{self, ErrorKind};
use std::os::fd::AsRawFd;

use bitflags::bitflags;
use mio::event::Source;
use mio::unix::SourceFd;
use mio::{Events, Interest, Poll, Token};
use signal_hook::consts::{SIGHUP, SIGINT, SIGTERM, SIGWINCH};
use signal_hook_mio::v1_0::Signals;
use tracing::{debug, trace};

const TERMINAL: Token = Token(0);
const SOCKET: Token = Token(1);
const SIGNALS: Token = Token(2);

const EVENTS_CAPACITY: usize = 16;

bitflags! {
    /// What the last wait reported
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Ready: u8 {
        /// Keyboard bytes are available
        const TERMINAL = 1 << 0;
        /// The socket (or listener) is readable
        const SOCKET = 1 << 1;
        /// SIGINT, SIGTERM or SIGHUP arrived
        const SHUTDOWN = 1 << 2;
        /// The terminal was resized
        const RESIZE = 1 << 3;
    }
}

/// Blocking wait for the next batch of events
pub trait Reactor {
    /// Block with no timeout until at least one source is ready
    fn wait_ready(&mut self) -> io::Result<Ready>;

    /// Watch the session socket. Only one socket is watched at a time.
    fn watch_socket<S: Source + ?Sized>(&mut self, source: &mut S) -> io::Result<()>;

    fn unwatch_socket<S: Source + ?Sized>(&mut self, source: &mut S) -> io::Result<()>;
}

/// mio-backed reactor
pub struct MioReactor {
    poll: Poll,
    events: Events,
    signals: Signals,
}

impl MioReactor {
    /// Register stdin and the process signals
    pub fn new() -> io::Result<Self> {
        let poll = Poll::new()?;
        let registry = poll.registry();

        let stdin_fd = io::stdin().as_raw_fd();
        registry.register(&mut SourceFd(&stdin_fd), TERMINAL, Interest::READABLE)?;

        let mut signals = Signals::new([SIGINT, SIGTERM, SIGHUP, SIGWINCH])?;
        registry.register(&mut signals, SIGNALS, Interest::READABLE)?;

        debug!("Reactor ready");
        Ok(Self {
            poll,
            events: Events::with_capacity(EVENTS_CAPACITY),
            signals,
        })
    }
}

impl Reactor for MioReactor {
    fn wait_ready(&mut self) -> io::Result<Ready> {
        loop {
            if let Err(err) = self.poll.poll(&mut self.events, None) {
                if err.kind() == ErrorKind::Interrupted {
                    continue;
                }
                return Err(err);
            }

            let mut ready = Ready::empty();
            for event in self.events.iter() {
                match event.token() {
                    TERMINAL => ready |= Ready::TERMINAL,
                    SOCKET => ready |= Ready::SOCKET,
                    SIGNALS => {
                        for signal in self.signals.pending() {
                            ready |= signal_ready(signal);
                        }
                    }
                    _ => {}
                }
            }

            trace!("ready: {:?}", ready);
            if !ready.is_empty() {
                return Ok(ready);
            }
        }
    }

    fn watch_socket<S: Source + ?Sized>(&mut self, source: &mut S) -> io::Result<()> {
        self.poll.registry().register(source, SOCKET, Interest::READABLE)
    }

    fn unwatch_socket<S: Source + ?Sized>(&mut self, source: &mut S) -> io::Result<()> {
        self.poll.registry().deregister(source)
    }
}

fn signal_ready(signal: i32) -> Ready {
    match signal {
        SIGWINCH => Ready::RESIZE,
        _ => {
            debug!("Received signal {}", signal);
            Ready::SHUTDOWN
        }
    }
}

/// Reactor replaying a fixed list of events, for tests
#[cfg(test)]
pub struct ScriptedReactor {
    script: std::collections::VecDeque<Ready>,
    /// Sockets currently watched
    pub watched: usize,
}

#[cfg(test)]
impl ScriptedReactor {
    pub fn new(script: impl IntoIterator<Item = Ready>) -> Self {
        Self {
            script: script.into_iter().collect(),
            watched: 0,
        }
    }
}

#[cfg(test)]
impl Reactor for ScriptedReactor {
    /// Ends with a shutdown once the script runs out
    fn wait_ready(&mut self) -> io::Result<Ready> {
        Ok(self.script.pop_front().unwrap_or(Ready::SHUTDOWN))
    }

    fn watch_socket<S: Source + ?Sized>(&mut self, _source: &mut S) -> io::Result<()> {
        self.watched += 1;
        Ok(())
    }

    fn unwatch_socket<S: Source + ?Sized>(&mut self, _source: &mut S) -> io::Result<()> {
        self.watched -= 1;
        Ok(())
    }
}
