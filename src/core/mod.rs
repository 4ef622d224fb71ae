//! Core session components.
//!
//! - **format**: byte to display token converters
//! - **keyseq**: function key chord detection
//! - **translate**: escaped input decoding
//! - **session**: the event loop tying terminal and socket together
//! - **transport** / **reactor**: non-blocking sockets and readiness waiting
//! - **tty** / **terminfo**: terminal line discipline and key capabilities
//!
//! # Architecture
//!
//! ```text
//! Session
//! ├── KeySequenceMatcher (F1..F4 from terminfo)
//! ├── ByteHistory x2 (sent, received)
//! ├── Transport (TCP stream or UDP socket)
//! └── DisplaySink (terminal windows)
//! ```

pub mod display;
pub mod format;
pub mod keyseq;
pub mod reactor;
pub mod session;
pub mod terminfo;
pub mod translate;
pub mod transport;
pub mod tty;
