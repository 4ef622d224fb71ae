//! pint - Pint Is Not Telnet
//!
//! An interactive raw TCP/UDP session tool. pint connects to (or listens
//! for) a single peer, sends what is typed at the terminal and shows the
//! bytes travelling in each direction in their own window, in a format that
//! can be switched while the session runs.
//!
//! # Quick Start
//!
//! ```text
//! pint example.com 80        # TCP session with example.com:80
//! pint -udp 10.0.0.1 53      # UDP session
//! pint -l 7000               # wait for one TCP connection on port 7000
//! pint -se -soh host 4000    # escaped input, hex display of sent bytes
//! ```
//!
//! # Keybindings
//!
//! | Key | Action |
//! |-----|--------|
//! | F1 | Cycle Bytes received format (wide, plain text, hex) |
//! | F2 | Cycle Bytes sent format |
//! | F3 | Toggle Enter sending CR LF or nothing |
//! | F4 | Toggle plain or escaped (`\xHH`) input |

mod config;
mod core;
mod history;
mod ui;

use std::env;

use anyhow::Context;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use crate::config::Config as PintConfig;
use crate::core::display::DisplaySink;
use crate::core::format::Format;
use crate::core::keyseq::{FunctionKeys, SystemClock};
use crate::core::reactor::MioReactor;
use crate::core::session::{EnterMode, Outcome, Session, SessionState};
use crate::core::translate::InputMode;
use crate::core::transport::{self, Endpoint, Protocol};
use crate::core::tty::{TerminalGuard, TerminalInput};
use crate::ui::Renderer;

/// Version string from Cargo.toml
const VERSION: &str = env!("CARGO_PKG_VERSION");

const HELP_HINT: &str = "For help, run pint with no arguments.";

/// Settings given on the command line
#[derive(Debug, Default, PartialEq, Eq)]
struct Args {
    /// Listen instead of connecting
    listen: bool,
    /// Use UDP instead of TCP
    udp: bool,
    /// Positional arguments in order
    positionals: Vec<String>,
    /// Mode overrides
    enter_mode: Option<EnterMode>,
    input_mode: Option<InputMode>,
    sent_format: Option<Format>,
    received_format: Option<Format>,
}

/// What the command line asks for
#[derive(Debug, PartialEq, Eq)]
enum Command {
    Run(Endpoint, Args),
    Help,
    Version,
}

impl Args {
    /// Write the command-line overrides into `state`
    fn apply(&self, state: &mut SessionState) {
        if let Some(mode) = self.enter_mode {
            state.enter_mode = mode;
        }
        if let Some(mode) = self.input_mode {
            state.input_mode = mode;
        }
        if let Some(format) = self.sent_format {
            state.sent_format = format;
        }
        if let Some(format) = self.received_format {
            state.received_format = format;
        }
    }

    fn protocol(&self) -> Protocol {
        if self.udp {
            Protocol::Udp
        } else {
            Protocol::Tcp
        }
    }

    /// Interpret the positional arguments, `None` if there are none
    fn endpoint(&self) -> Result<Option<Endpoint>, String> {
        let protocol = self.protocol();
        match (self.listen, self.positionals.as_slice()) {
            (_, []) => Ok(None),
            (true, [port]) => Ok(Some(Endpoint::Listen {
                port: parse_port(port, "listen_port")?,
                protocol,
            })),
            (true, [_, _, ..]) => Err("local_ip not supported yet".to_string()),
            (false, [_]) => Err("Missing remote_port".to_string()),
            (false, [host, port]) => Ok(Some(Endpoint::Connect {
                host: host.clone(),
                port: parse_port(port, "remote_port")?,
                protocol,
            })),
            (false, [_, _, extra, ..]) => Err(format!("Unexpected argument: {}", extra)),
        }
    }
}

fn parse_port(value: &str, name: &str) -> Result<u16, String> {
    match value.parse::<u16>() {
        Ok(port) if port > 0 => Ok(port),
        _ => Err(format!("Bad value for {}: {}", name, value)),
    }
}

fn print_version() {
    eprintln!("pint {}", VERSION);
}

fn print_help() {
    eprintln!("pint {} - Pint Is Not Telnet", VERSION);
    eprintln!();
    eprintln!("Usage: pint [OPTIONS] remote_host remote_port");
    eprintln!("       pint [OPTIONS] -l listen_port");
    eprintln!();
    eprintln!("Connection options:");
    eprintln!("  -l                    Listen on listen_port and wait for one peer");
    eprintln!("  -udp                  Use UDP (default: TCP)");
    eprintln!();
    eprintln!("Input options:");
    eprintln!("  -sp                   Plain text interpretation of typed input (default)");
    eprintln!("  -se                   Escaped interpretation of typed input");
    eprintln!("  -ec                   Enter sends CR LF (default)");
    eprintln!("  -en                   Enter sends nothing");
    eprintln!();
    eprintln!("Display options:");
    eprintln!("  -sow, -sop, -soh      Bytes sent window format: wide (default), plain text, hex");
    eprintln!("  -siw, -sip, -sih      Bytes received window format: wide (default), plain text, hex");
    eprintln!();
    eprintln!("Other options:");
    eprintln!("  -v, --version         Show version");
    eprintln!("  -h, --help            Show this help");
    eprintln!();
    eprintln!("Runtime keybindings:");
    eprintln!("  F1                    Cycle the Bytes received window format");
    eprintln!("  F2                    Cycle the Bytes sent window format");
    eprintln!("  F3                    Toggle what Enter sends");
    eprintln!("  F4                    Toggle plain and escaped input");
    eprintln!();
    eprintln!("Escaped input:");
    eprintln!("  In escaped mode \\xHH sends the byte with hex value HH, so \\xff sends");
    eprintln!("  a single 0xff byte. Any other backslash sequence rejects the line.");
    eprintln!();
    eprintln!("Configuration: ~/.pint/config.toml   Log: ~/.pint/pint.log (filter via PINT_LOG)");
}

/// Parse command line arguments (without the program name)
fn parse_args(args: &[String]) -> Result<Command, String> {
    let mut parsed = Args::default();

    for arg in args {
        match arg.as_str() {
            "-h" | "--help" => return Ok(Command::Help),
            "-v" | "--version" => return Ok(Command::Version),
            "-l" => parsed.listen = true,
            "-udp" => parsed.udp = true,
            // Input interpretation
            "-sp" => parsed.input_mode = Some(InputMode::Plain),
            "-se" => parsed.input_mode = Some(InputMode::Escaped),
            "-ec" => parsed.enter_mode = Some(EnterMode::SendCrlf),
            "-en" => parsed.enter_mode = Some(EnterMode::SendNothing),
            // Window formats
            "-sow" => parsed.sent_format = Some(Format::Wide),
            "-sop" => parsed.sent_format = Some(Format::Text),
            "-soh" => parsed.sent_format = Some(Format::Hex),
            "-siw" => parsed.received_format = Some(Format::Wide),
            "-sip" => parsed.received_format = Some(Format::Text),
            "-sih" => parsed.received_format = Some(Format::Hex),
            switch if switch.starts_with('-') && switch.len() > 1 => {
                return Err(format!("Unknown switch: {}", switch));
            }
            positional => parsed.positionals.push(positional.to_string()),
        }
    }

    match parsed.endpoint()? {
        Some(endpoint) => Ok(Command::Run(endpoint, parsed)),
        None => Ok(Command::Help),
    }
}

/// Log to `~/.pint/pint.log`; the terminal belongs to the UI
fn init_logging(config: &PintConfig) {
    let log_path = PintConfig::log_path();

    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .ok();

    if let Some(file) = log_file {
        let filter = EnvFilter::try_from_env("PINT_LOG")
            .unwrap_or_else(|_| EnvFilter::new(&config.log_level));
        let subscriber = FmtSubscriber::builder()
            .with_env_filter(filter)
            .with_writer(std::sync::Mutex::new(file))
            .with_ansi(false)
            .finish();
        let _ = tracing::subscriber::set_global_default(subscriber);
    }
}

fn main() -> anyhow::Result<()> {
    let argv: Vec<String> = env::args().skip(1).collect();
    let (endpoint, args) = match parse_args(&argv) {
        Ok(Command::Run(endpoint, args)) => (endpoint, args),
        Ok(Command::Help) => {
            print_help();
            return Ok(());
        }
        Ok(Command::Version) => {
            print_version();
            return Ok(());
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            eprintln!("{}", HELP_HINT);
            std::process::exit(1);
        }
    };

    let config = PintConfig::load();
    init_logging(&config);

    let mut state = config.session;
    args.apply(&mut state);
    info!("pint {} starting: {:?}, {:?}", VERSION, endpoint, state);

    let code = match run(&endpoint, state) {
        Ok(outcome) => {
            info!("Exiting: {:?}", outcome);
            outcome.exit_code()
        }
        Err(e) => {
            error!("{:#}", e);
            eprintln!("pint: {:#}", e);
            1
        }
    };

    // everything holding the terminal has been dropped by now
    std::process::exit(code);
}

/// Set up the terminal, acquire the socket and run the session
fn run(endpoint: &Endpoint, state: SessionState) -> anyhow::Result<Outcome> {
    let keys = FunctionKeys::from_terminfo().context("Failed to look up function keys")?;
    let _terminal = TerminalGuard::acquire().context("Failed to configure the terminal")?;
    let mut reactor = MioReactor::new().context("Failed to set up event polling")?;

    let mut renderer = Renderer::new().context("Failed to open the terminal for drawing")?;
    renderer.init().context("Failed to initialize the display")?;
    renderer.write_info(&format!("{}\n", HELP_HINT));

    let Some(transport) = transport::acquire(endpoint, &mut reactor, &mut renderer)? else {
        return Ok(Outcome::Clean);
    };

    let mut session = Session::new(transport, renderer, keys, SystemClock, state);
    let outcome = session.run(&mut reactor, &mut TerminalInput);
    info!("Final modes: {:?}", session.state());
    Ok(outcome)
}
