//! Connection Handler
//!
//! The non-blocking socket to the server, driven by the reactor.

use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::net::{Shutdown, ToSocketAddrs};

use bytes::{Buf, BytesMut};
use mio::event::Source;
use mio::net::TcpStream;
#[cfg(unix)]
use mio::net::UnixStream;
use mio::{Interest, Registry, Token};

use crate::command::CommandId;
use crate::config::{Config, Endpoint};
use crate::error::{ClientError, CommandError, Result};
use crate::protocol::{decode_reply, encode_request, Reply, Request};

/// Poll token of the server socket
pub const CONNECTION_TOKEN: Token = Token(0);

/// Poll token of the cross-thread waker
pub const WAKER_TOKEN: Token = Token(1);

/// TCP or Unix socket
enum Stream {
    Tcp(TcpStream),
    #[cfg(unix)]
    Unix(UnixStream),
}

impl Stream {
    fn take_error(&self) -> io::Result<Option<io::Error>> {
        match self {
            Stream::Tcp(s) => s.take_error(),
            #[cfg(unix)]
            Stream::Unix(s) => s.take_error(),
        }
    }

    /// Whether a non-blocking connect has completed
    fn is_established(&self) -> io::Result<bool> {
        let peer = match self {
            Stream::Tcp(s) => s.peer_addr().map(|_| ()),
            #[cfg(unix)]
            Stream::Unix(s) => s.peer_addr().map(|_| ()),
        };
        match peer {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotConnected => Ok(false),
            Err(e) => Err(e),
        }
    }

    fn shutdown(&self) -> io::Result<()> {
        match self {
            Stream::Tcp(s) => s.shutdown(Shutdown::Both),
            #[cfg(unix)]
            Stream::Unix(s) => s.shutdown(Shutdown::Both),
        }
    }
}

impl Read for Stream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Stream::Tcp(s) => s.read(buf),
            #[cfg(unix)]
            Stream::Unix(s) => s.read(buf),
        }
    }
}

impl Write for Stream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Stream::Tcp(s) => s.write(buf),
            #[cfg(unix)]
            Stream::Unix(s) => s.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Stream::Tcp(s) => s.flush(),
            #[cfg(unix)]
            Stream::Unix(s) => s.flush(),
        }
    }
}

impl Source for Stream {
    fn register(&mut self, registry: &Registry, token: Token, interests: Interest) -> io::Result<()> {
        match self {
            Stream::Tcp(s) => s.register(registry, token, interests),
            #[cfg(unix)]
            Stream::Unix(s) => s.register(registry, token, interests),
        }
    }

    fn reregister(
        &mut self,
        registry: &Registry,
        token: Token,
        interests: Interest,
    ) -> io::Result<()> {
        match self {
            Stream::Tcp(s) => s.reregister(registry, token, interests),
            #[cfg(unix)]
            Stream::Unix(s) => s.reregister(registry, token, interests),
        }
    }

    fn deregister(&mut self, registry: &Registry) -> io::Result<()> {
        match self {
            Stream::Tcp(s) => s.deregister(registry),
            #[cfg(unix)]
            Stream::Unix(s) => s.deregister(registry),
        }
    }
}

/// Replies parsed from one readable event
#[derive(Debug, Default)]
pub struct ReadOutcome {
    /// Replies paired with the command that sent the matching request
    pub replies: Vec<(CommandId, Reply)>,

    /// The peer closed its end
    pub closed: bool,
}

/// The connection to the server
///
/// Requests are framed into `write_buf` and flushed whenever the socket
/// accepts bytes. The server answers in request order, so `in_flight` is the
/// identity carried from each send to its reply.
pub struct Connection {
    stream: Stream,

    /// Endpoint description for logging
    peer: String,

    read_buf: BytesMut,
    write_buf: BytesMut,

    /// Scratch space for a single socket read
    scratch: Vec<u8>,

    /// Ids awaiting a reply, in send order
    in_flight: VecDeque<CommandId>,

    /// Ids whose request bytes are still buffered, with their end offset
    unflushed: VecDeque<(CommandId, u64)>,
    bytes_queued: u64,
    bytes_written: u64,

    established: bool,
    closing: bool,
    write_interest: bool,
    nodelay: bool,
    max_reply_size: usize,
}

impl Connection {
    /// Start a non-blocking connect and register the socket
    pub fn open(config: &Config, registry: &Registry) -> Result<Self> {
        let stream = match &config.endpoint {
            Endpoint::Tcp { host, port } => {
                let addr = (host.as_str(), *port)
                    .to_socket_addrs()
                    .map_err(|e| {
                        ClientError::Connect(format!("could not resolve {}: {}", config.endpoint, e))
                    })?
                    .next()
                    .ok_or_else(|| {
                        ClientError::Connect(format!("no address for {}", config.endpoint))
                    })?;
                let stream = TcpStream::connect(addr)
                    .map_err(|e| ClientError::Connect(e.to_string()))?;
                Stream::Tcp(stream)
            }
            #[cfg(unix)]
            Endpoint::Unix(path) => {
                let stream = UnixStream::connect(path)
                    .map_err(|e| ClientError::Connect(e.to_string()))?;
                Stream::Unix(stream)
            }
            #[cfg(not(unix))]
            Endpoint::Unix(_) => {
                return Err(ClientError::Config(
                    "unix sockets are not supported on this platform".to_string(),
                ))
            }
        };

        let mut connection = Self {
            stream,
            peer: config.endpoint.to_string(),
            read_buf: BytesMut::with_capacity(config.read_buffer_size),
            write_buf: BytesMut::with_capacity(config.read_buffer_size),
            scratch: vec![0u8; config.read_buffer_size],
            in_flight: VecDeque::new(),
            unflushed: VecDeque::new(),
            bytes_queued: 0,
            bytes_written: 0,
            established: false,
            closing: false,
            write_interest: true,
            nodelay: config.nodelay,
            max_reply_size: config.max_reply_size,
        };

        // Writable readiness signals the end of the connect handshake
        registry.register(
            &mut connection.stream,
            CONNECTION_TOKEN,
            Interest::READABLE | Interest::WRITABLE,
        )?;

        Ok(connection)
    }

    /// Check whether the handshake finished
    ///
    /// `Ok(false)` means still in progress; an error means it failed.
    pub fn poll_connect(&mut self, registry: &Registry) -> Result<bool> {
        if self.established {
            return Ok(true);
        }

        if let Some(e) = self.stream.take_error()? {
            return Err(ClientError::Connect(e.to_string()));
        }

        match self.stream.is_established() {
            Ok(true) => {}
            Ok(false) => return Ok(false),
            Err(e) => return Err(ClientError::Connect(e.to_string())),
        }

        if let Stream::Tcp(s) = &self.stream {
            if self.nodelay {
                s.set_nodelay(true)?;
            }
        }

        self.established = true;
        self.update_interest(registry)?;
        tracing::debug!("Connection established to {}", self.peer);
        Ok(true)
    }

    /// Frame a request into the write buffer
    ///
    /// Bytes go out on the next [`flush`](Self::flush).
    pub fn send(&mut self, request: &Request, id: CommandId) -> std::result::Result<(), CommandError> {
        if !self.established {
            return Err(CommandError::Send("not connected".to_string()));
        }
        if self.closing {
            return Err(CommandError::Send("connection is closing".to_string()));
        }
        if request.is_empty() {
            return Err(CommandError::Send("empty command".to_string()));
        }

        let frame = encode_request(request);
        self.write_buf.extend_from_slice(&frame);
        self.bytes_queued += frame.len() as u64;
        self.unflushed.push_back((id, self.bytes_queued));
        self.in_flight.push_back(id);

        tracing::trace!("Queued {} ({} bytes) for {}", id, frame.len(), self.peer);
        Ok(())
    }

    /// Write as much buffered data as the socket takes
    ///
    /// Returns the ids whose request bytes are now fully written.
    pub fn flush(&mut self, registry: &Registry) -> io::Result<Vec<CommandId>> {
        while !self.write_buf.is_empty() {
            match self.stream.write(&self.write_buf) {
                Ok(0) => {
                    return Err(io::Error::new(
                        io::ErrorKind::WriteZero,
                        "connection closed while writing",
                    ))
                }
                Ok(n) => {
                    self.write_buf.advance(n);
                    self.bytes_written += n as u64;
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }

        let mut flushed = Vec::new();
        while let Some(&(id, end)) = self.unflushed.front() {
            if end > self.bytes_written {
                break;
            }
            self.unflushed.pop_front();
            flushed.push(id);
        }

        self.update_interest(registry)?;
        Ok(flushed)
    }

    /// Drain the socket and parse every complete reply
    pub fn read_replies(&mut self) -> Result<ReadOutcome> {
        let mut outcome = ReadOutcome::default();

        loop {
            match self.stream.read(&mut self.scratch) {
                Ok(0) => {
                    outcome.closed = true;
                    break;
                }
                Ok(n) => self.read_buf.extend_from_slice(&self.scratch[..n]),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }

        while let Some((reply, used)) = decode_reply(&self.read_buf, self.max_reply_size)? {
            self.read_buf.advance(used);
            let id = self.in_flight.pop_front().ok_or_else(|| {
                ClientError::Protocol("Reply received with no request in flight".to_string())
            })?;
            outcome.replies.push((id, reply));
        }

        Ok(outcome)
    }

    /// Close the socket after a final best-effort flush
    pub fn disconnect(&mut self, registry: &Registry) -> Result<()> {
        self.closing = true;

        if let Err(e) = self.flush(registry) {
            tracing::debug!("Final flush to {} failed: {}", self.peer, e);
        }

        self.stream
            .deregister(registry)
            .map_err(|e| ClientError::Disconnect(e.to_string()))?;

        match self.stream.shutdown() {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotConnected => Ok(()),
            Err(e) => Err(ClientError::Disconnect(e.to_string())),
        }
    }

    /// Get the peer description
    pub fn peer(&self) -> &str {
        &self.peer
    }

    fn update_interest(&mut self, registry: &Registry) -> io::Result<()> {
        let want_write = !self.write_buf.is_empty();
        if want_write == self.write_interest {
            return Ok(());
        }

        let interest = if want_write {
            Interest::READABLE | Interest::WRITABLE
        } else {
            Interest::READABLE
        };
        registry.reregister(&mut self.stream, CONNECTION_TOKEN, interest)?;
        self.write_interest = want_write;
        Ok(())
    }
}
