//! Terminal line discipline
//!
//! Keystrokes must reach the session one byte at a time, without echo and
//! without CR to NL mapping, and reading stdin must never block. Signal keys
//! stay enabled so Ctrl-C still interrupts.

use std::io::{self, Read};

use rustix::fs::{self as rfs, OFlags};
use rustix::termios::{self, InputModes, LocalModes, OptionalActions, SpecialCodeIndex, Termios};
use tracing::{debug, warn};

/// Restores the terminal settings of stdin when dropped
pub struct TerminalGuard {
    original: Termios,
    original_flags: OFlags,
}

impl TerminalGuard {
    /// Switch stdin to byte-at-a-time, non-blocking input
    pub fn acquire() -> io::Result<Self> {
        let stdin = io::stdin();
        if !termios::isatty(&stdin) {
            return Err(io::Error::new(io::ErrorKind::Unsupported, "stdin is not a terminal"));
        }

        let original = termios::tcgetattr(&stdin)?;
        let mut settings = original.clone();
        configure(&mut settings);
        termios::tcsetattr(&stdin, OptionalActions::Now, &settings)?;

        let original_flags = match rfs::fcntl_getfl(&stdin) {
            Ok(flags) => flags,
            Err(e) => {
                // leave the terminal as we found it
                let _ = termios::tcsetattr(&stdin, OptionalActions::Now, &original);
                return Err(e.into());
            }
        };
        if let Err(e) = rfs::fcntl_setfl(&stdin, original_flags | OFlags::NONBLOCK) {
            let _ = termios::tcsetattr(&stdin, OptionalActions::Now, &original);
            return Err(e.into());
        }

        debug!("Terminal switched to byte input");
        Ok(Self {
            original,
            original_flags,
        })
    }
}

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        let stdin = io::stdin();
        if let Err(e) = rfs::fcntl_setfl(&stdin, self.original_flags) {
            warn!("Failed to restore stdin flags: {}", e);
        }
        if let Err(e) = termios::tcsetattr(&stdin, OptionalActions::Now, &self.original) {
            warn!("Failed to restore terminal settings: {}", e);
        }
        debug!("Terminal settings restored");
    }
}

/// No canonical mode, no echo, no CR to NL; one byte satisfies a read
fn configure(settings: &mut Termios) {
    settings.local_modes.remove(LocalModes::ICANON | LocalModes::ECHO);
    settings.local_modes.insert(LocalModes::ISIG);
    settings.input_modes.remove(InputModes::ICRNL);
    settings.special_codes[SpecialCodeIndex::VMIN] = 1;
    settings.special_codes[SpecialCodeIndex::VTIME] = 0;
}

/// Unbuffered reader over stdin's descriptor
#[derive(Debug, Default)]
pub struct TerminalInput;

impl Read for TerminalInput {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Ok(rustix::io::read(io::stdin(), buf)?)
    }
}
