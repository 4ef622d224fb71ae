//! Socket transport
//!
//! One TCP stream or UDP socket, either connected out to a remote host or
//! obtained by listening on a local port. Sockets are non-blocking and are
//! driven by the reactor.

use std::fmt;
use std::io::{self, Read, Write};
use std::net::{self, Shutdown, SocketAddr, ToSocketAddrs};

use mio::event::Source;
use mio::net::{TcpListener, TcpStream, UdpSocket};
use mio::{Interest, Registry, Token};
use thiserror::Error;
use tracing::{debug, info, warn};

use super::display::DisplaySink;
use super::reactor::{Reactor, Ready};

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Failed to resolve {host}: {source}")]
    Resolve {
        host: String,
        #[source]
        source: io::Error,
    },

    #[error("No address found for {0}")]
    NoAddress(String),

    #[error("Failed to connect to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("Failed to bind local port {port}: {source}")]
    Bind {
        port: u16,
        #[source]
        source: io::Error,
    },

    #[error("Failed to accept connection: {0}")]
    Accept(#[source] io::Error),

    #[error("Failed to set up socket: {0}")]
    Setup(#[source] io::Error),
}

pub type Result<T> = std::result::Result<T, TransportError>;

/// Socket kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    Tcp,
    Udp,
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::Tcp => f.write_str("TCP"),
            Protocol::Udp => f.write_str("UDP"),
        }
    }
}

/// Where the session's socket comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    /// Connect out to `host:port`
    Connect {
        host: String,
        port: u16,
        protocol: Protocol,
    },
    /// Listen on a local port; TCP accepts one connection, UDP learns its
    /// peer from the first datagram
    Listen { port: u16, protocol: Protocol },
}

/// Byte stream the session talks through
pub trait Transport {
    fn protocol(&self) -> Protocol;

    /// Read available bytes. `WouldBlock` means nothing is pending.
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Write `data` with a single call
    fn write(&mut self, data: &[u8]) -> io::Result<usize>;

    /// Receive one datagram and report its sender
    fn receive_from(&mut self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)>;

    /// Fix the datagram peer
    fn fix_peer(&mut self, addr: SocketAddr) -> io::Result<()>;

    /// True for a listening UDP socket that has no peer yet
    fn awaiting_peer(&self) -> bool;

    /// Half-close the sending side. No-op for datagrams.
    fn shutdown_write(&mut self);
}

enum Link {
    Tcp(TcpStream),
    Udp {
        socket: UdpSocket,
        peer: Option<SocketAddr>,
    },
}

/// TCP or UDP socket
pub struct NetTransport {
    link: Link,
}

impl NetTransport {
    /// Connect out to `host:port`
    pub fn connect(host: &str, port: u16, protocol: Protocol) -> Result<Self> {
        let addr = resolve(host, port)?;
        debug!("Resolved {}:{} to {}", host, port, addr);

        let connect_err = |source| TransportError::Connect {
            addr: format!("{}:{}", host, port),
            source,
        };

        let link = match protocol {
            Protocol::Tcp => {
                let stream = net::TcpStream::connect(addr).map_err(connect_err)?;
                stream.set_nonblocking(true).map_err(TransportError::Setup)?;
                Link::Tcp(TcpStream::from_std(stream))
            }
            Protocol::Udp => {
                let local: SocketAddr = if addr.is_ipv4() {
                    (net::Ipv4Addr::UNSPECIFIED, 0).into()
                } else {
                    (net::Ipv6Addr::UNSPECIFIED, 0).into()
                };
                let socket = net::UdpSocket::bind(local).map_err(TransportError::Setup)?;
                socket.connect(addr).map_err(connect_err)?;
                socket.set_nonblocking(true).map_err(TransportError::Setup)?;
                Link::Udp {
                    socket: UdpSocket::from_std(socket),
                    peer: Some(addr),
                }
            }
        };

        Ok(Self { link })
    }

    /// Bind a UDP socket on a local port; the peer is learned later
    pub fn bind_udp(port: u16) -> Result<Self> {
        let socket = net::UdpSocket::bind((net::Ipv4Addr::UNSPECIFIED, port))
            .map_err(|source| TransportError::Bind { port, source })?;
        socket.set_nonblocking(true).map_err(TransportError::Setup)?;
        Ok(Self {
            link: Link::Udp {
                socket: UdpSocket::from_std(socket),
                peer: None,
            },
        })
    }

    /// Local address of the socket
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        match &self.link {
            Link::Tcp(stream) => stream.local_addr(),
            Link::Udp { socket, .. } => socket.local_addr(),
        }
    }

    fn source_mut(&mut self) -> &mut dyn Source {
        match &mut self.link {
            Link::Tcp(stream) => stream,
            Link::Udp { socket, .. } => socket,
        }
    }
}

impl Transport for NetTransport {
    fn protocol(&self) -> Protocol {
        match self.link {
            Link::Tcp(_) => Protocol::Tcp,
            Link::Udp { .. } => Protocol::Udp,
        }
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match &mut self.link {
            Link::Tcp(stream) => stream.read(buf),
            Link::Udp { socket, .. } => socket.recv(buf),
        }
    }

    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        match &mut self.link {
            Link::Tcp(stream) => stream.write(data),
            Link::Udp { socket, peer } => match peer {
                Some(_) => socket.send(data),
                None => Err(io::Error::new(io::ErrorKind::NotConnected, "udp peer not known yet")),
            },
        }
    }

    fn receive_from(&mut self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
        match &mut self.link {
            Link::Udp { socket, .. } => socket.recv_from(buf),
            Link::Tcp(stream) => {
                let n = stream.read(buf)?;
                Ok((n, stream.peer_addr()?))
            }
        }
    }

    fn fix_peer(&mut self, addr: SocketAddr) -> io::Result<()> {
        match &mut self.link {
            Link::Udp { socket, peer } => {
                socket.connect(addr)?;
                *peer = Some(addr);
                info!("UDP peer fixed to {}", addr);
                Ok(())
            }
            Link::Tcp(_) => Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "stream sockets have a fixed peer",
            )),
        }
    }

    fn awaiting_peer(&self) -> bool {
        matches!(self.link, Link::Udp { peer: None, .. })
    }

    fn shutdown_write(&mut self) {
        if let Link::Tcp(stream) = &self.link {
            match stream.shutdown(Shutdown::Write) {
                Ok(()) => debug!("Shut down write half"),
                Err(e) if e.kind() == io::ErrorKind::NotConnected => {}
                Err(e) => warn!("Failed to shut down write half: {}", e),
            }
        }
    }
}

impl Source for NetTransport {
    fn register(&mut self, registry: &Registry, token: Token, interests: Interest) -> io::Result<()> {
        self.source_mut().register(registry, token, interests)
    }

    fn reregister(&mut self, registry: &Registry, token: Token, interests: Interest) -> io::Result<()> {
        self.source_mut().reregister(registry, token, interests)
    }

    fn deregister(&mut self, registry: &Registry) -> io::Result<()> {
        self.source_mut().deregister(registry)
    }
}

/// Listening TCP socket waiting for its single connection
pub struct TcpAcceptor {
    listener: TcpListener,
}

impl TcpAcceptor {
    pub fn bind(port: u16) -> Result<Self> {
        let listener = net::TcpListener::bind((net::Ipv4Addr::UNSPECIFIED, port))
            .map_err(|source| TransportError::Bind { port, source })?;
        listener.set_nonblocking(true).map_err(TransportError::Setup)?;
        Ok(Self {
            listener: TcpListener::from_std(listener),
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept a pending connection, `None` if there is none yet
    pub fn try_accept(&mut self) -> Result<Option<(NetTransport, SocketAddr)>> {
        loop {
            match self.listener.accept() {
                Ok((stream, addr)) => {
                    let transport = NetTransport {
                        link: Link::Tcp(stream),
                    };
                    return Ok(Some((transport, addr)));
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(None),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(TransportError::Accept(e)),
            }
        }
    }

    fn source_mut(&mut self) -> &mut TcpListener {
        &mut self.listener
    }
}

/// Establish the session socket and register it with the reactor.
///
/// Returns `None` if a shutdown signal arrived while waiting for a TCP
/// connection.
pub fn acquire(
    endpoint: &Endpoint,
    reactor: &mut impl Reactor,
    display: &mut impl DisplaySink,
) -> Result<Option<NetTransport>> {
    let mut transport = match endpoint {
        Endpoint::Connect { host, port, protocol } => {
            let transport = NetTransport::connect(host, *port, *protocol)?;
            info!("Connected to {}:{} ({})", host, port, protocol);
            display.write_info(&format!("Connected to {}:{} ({})\n", host, port, protocol));
            transport
        }
        Endpoint::Listen {
            port,
            protocol: Protocol::Udp,
        } => {
            let transport = NetTransport::bind_udp(*port)?;
            let local = transport.local_addr().map_err(TransportError::Setup)?;
            info!("Bound UDP {}", local);
            display.write_info(&format!("Bound to local UDP port {}\n", local.port()));
            transport
        }
        Endpoint::Listen {
            port,
            protocol: Protocol::Tcp,
        } => {
            let mut acceptor = TcpAcceptor::bind(*port)?;
            let local = acceptor.local_addr().map_err(TransportError::Setup)?;
            info!("Listening on TCP {}", local);
            display.write_info(&format!("Bound to local TCP port {}\n", local.port()));

            match wait_for_connection(&mut acceptor, reactor, display)? {
                Some((transport, peer)) => {
                    info!("Accepted connection from {}", peer);
                    display.write_info(&format!("Got connection from {}\n", peer));
                    transport
                }
                None => return Ok(None),
            }
        }
    };

    reactor
        .watch_socket(&mut transport)
        .map_err(TransportError::Setup)?;
    Ok(Some(transport))
}

fn wait_for_connection(
    acceptor: &mut TcpAcceptor,
    reactor: &mut impl Reactor,
    display: &mut impl DisplaySink,
) -> Result<Option<(NetTransport, SocketAddr)>> {
    reactor
        .watch_socket(acceptor.source_mut())
        .map_err(TransportError::Setup)?;

    let accepted = loop {
        if let Some(accepted) = acceptor.try_accept()? {
            break Some(accepted);
        }

        display.present();
        let ready = reactor.wait_ready().map_err(TransportError::Accept)?;
        if ready.contains(Ready::SHUTDOWN) {
            display.write_info("got signal, exiting\n");
            break None;
        }
        if ready.contains(Ready::RESIZE) {
            display.relayout();
        }
        // keystrokes stay queued until the session drains the terminal
    };

    reactor
        .unwatch_socket(acceptor.source_mut())
        .map_err(TransportError::Setup)?;
    Ok(accepted)
}

fn resolve(host: &str, port: u16) -> Result<SocketAddr> {
    (host, port)
        .to_socket_addrs()
        .map_err(|source| TransportError::Resolve {
            host: host.to_string(),
            source,
        })?
        .next()
        .ok_or_else(|| TransportError::NoAddress(host.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::display::RecordingDisplay;
    use crate::core::reactor::ScriptedReactor;
    use std::thread;
    use std::time::{Duration, Instant};

    /// Retry a non-blocking call until it stops returning WouldBlock
    fn retry<T>(mut f: impl FnMut() -> io::Result<T>) -> io::Result<T> {
        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            match f() {
                Err(e) if e.kind() == io::ErrorKind::WouldBlock && Instant::now() < deadline => {
                    thread::sleep(Duration::from_millis(5));
                }
                other => return other,
            }
        }
    }

    #[test]
    fn test_protocol_names() {
        assert_eq!(Protocol::Tcp.to_string(), "TCP");
        assert_eq!(Protocol::Udp.to_string(), "UDP");
    }

    #[test]
    fn test_tcp_connect_and_half_close() {
        let listener = net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        let mut transport = NetTransport::connect("127.0.0.1", port, Protocol::Tcp).unwrap();
        let (mut peer, _) = listener.accept().unwrap();
        assert_eq!(transport.protocol(), Protocol::Tcp);
        assert!(!transport.awaiting_peer());

        peer.write_all(b"hello").unwrap();
        let mut buf = [0u8; 16];
        let n = retry(|| transport.read(&mut buf)).unwrap();
        assert_eq!(&buf[..n], b"hello");

        assert_eq!(retry(|| transport.write(b"hi\n\r")).unwrap(), 4);
        transport.shutdown_write();

        let mut got = Vec::new();
        peer.read_to_end(&mut got).unwrap();
        assert_eq!(got, b"hi\n\r");
    }

    #[test]
    fn test_tcp_peer_close_reads_zero() {
        let listener = net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let mut transport = NetTransport::connect("127.0.0.1", port, Protocol::Tcp).unwrap();
        drop(listener.accept().unwrap());

        let mut buf = [0u8; 16];
        assert_eq!(retry(|| transport.read(&mut buf)).unwrap(), 0);
        assert!(transport.fix_peer("127.0.0.1:1".parse().unwrap()).is_err());
    }

    #[test]
    fn test_udp_connect() {
        let peer = net::UdpSocket::bind("127.0.0.1:0").unwrap();
        let port = peer.local_addr().unwrap().port();

        let mut transport = NetTransport::connect("127.0.0.1", port, Protocol::Udp).unwrap();
        assert!(!transport.awaiting_peer());
        assert_eq!(transport.write(b"ping").unwrap(), 4);

        let mut buf = [0u8; 16];
        let (n, from) = peer.recv_from(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"ping");
        peer.send_to(b"pong", from).unwrap();

        let n = retry(|| transport.read(&mut buf)).unwrap();
        assert_eq!(&buf[..n], b"pong");
    }

    #[test]
    fn test_udp_listen_learns_peer() {
        let mut transport = NetTransport::bind_udp(0).unwrap();
        let port = transport.local_addr().unwrap().port();
        assert!(transport.awaiting_peer());
        assert_eq!(
            transport.write(b"early").unwrap_err().kind(),
            io::ErrorKind::NotConnected
        );

        let client = net::UdpSocket::bind("127.0.0.1:0").unwrap();
        client.send_to(b"first", ("127.0.0.1", port)).unwrap();

        let mut buf = [0u8; 16];
        let (n, from) = retry(|| transport.receive_from(&mut buf)).unwrap();
        assert_eq!(&buf[..n], b"first");
        assert_eq!(from, client.local_addr().unwrap());

        transport.fix_peer(from).unwrap();
        assert!(!transport.awaiting_peer());
        transport.write(b"reply").unwrap();
        let n = client.recv(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"reply");
    }

    #[test]
    fn test_accept_wait_ends_on_shutdown() {
        let endpoint = Endpoint::Listen {
            port: 0,
            protocol: Protocol::Tcp,
        };
        // keystrokes and resizes keep the wait going
        let mut reactor = ScriptedReactor::new([Ready::TERMINAL, Ready::RESIZE]);
        let mut display = RecordingDisplay::default();

        let acquired = acquire(&endpoint, &mut reactor, &mut display).unwrap();
        assert!(acquired.is_none());
        assert!(display.info_contains("Bound to local TCP port"));
        assert!(display.info_contains("got signal, exiting"));
        assert_eq!(reactor.watched, 0);
    }

    #[test]
    fn test_udp_listen_is_watched() {
        let endpoint = Endpoint::Listen {
            port: 0,
            protocol: Protocol::Udp,
        };
        let mut reactor = ScriptedReactor::new(Vec::<Ready>::new());
        let mut display = RecordingDisplay::default();

        let transport = acquire(&endpoint, &mut reactor, &mut display).unwrap().unwrap();
        assert!(transport.awaiting_peer());
        assert!(display.info_contains("Bound to local UDP port"));
        assert_eq!(reactor.watched, 1);
    }

    #[test]
    fn test_tcp_acceptor() {
        let mut acceptor = TcpAcceptor::bind(0).unwrap();
        let port = acceptor.local_addr().unwrap().port();
        assert!(acceptor.try_accept().unwrap().is_none());

        let client = net::TcpStream::connect(("127.0.0.1", port)).unwrap();
        let deadline = Instant::now() + Duration::from_secs(5);
        let (transport, from) = loop {
            if let Some(accepted) = acceptor.try_accept().unwrap() {
                break accepted;
            }
            assert!(Instant::now() < deadline, "no connection accepted");
            thread::sleep(Duration::from_millis(5));
        };
        assert_eq!(from, client.local_addr().unwrap());
        assert_eq!(transport.protocol(), Protocol::Tcp);
    }
}
