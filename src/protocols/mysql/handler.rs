//! Per-connection session state machine.
//!
//! Sends the greeting, accepts whatever login comes back, then answers
//! commands from the reply table until the client quits, the stream ends,
//! or the server shuts down.

use super::command::{Command, Reply};
use super::message::{EofPacket, Handshake, HandshakeResponse, LocalInfileRequest, OkPacket};
use super::packet::{self, Packet, ParseResult, MAX_PAYLOAD_LEN};
use crate::config::Config;
use crate::error::Result;
use crate::events::{CloseReason, Event, EventSink};
use bytes::{Buf, BytesMut};
use std::net::SocketAddr;
use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

/// Read buffer size
const BUFFER_SIZE: usize = 4 * 1024;

/// Bytes of an uploaded file kept for the disclosure event.
const MAX_UPLOAD_LEN: usize = 16 * 1024 * 1024;

/// Where a session is in the exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Greeting not sent yet.
    AwaitingHandshakeAck,
    /// Greeting sent, waiting for the login packet.
    AwaitingAuthResponse,
    /// Answering commands.
    CommandLoop,
    /// Stream shut down; nothing more is read or written.
    Closed,
}

/// Per-session settings taken from the server config.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Path named in the LOCAL INFILE request.
    pub file: String,
    pub max_packet_size: usize,
    pub idle_timeout: Option<Duration>,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            file: "/etc/passwd".to_string(),
            max_packet_size: MAX_PAYLOAD_LEN,
            idle_timeout: None,
        }
    }
}

impl From<&Config> for SessionOptions {
    fn from(config: &Config) -> Self {
        Self {
            file: config.file.clone(),
            max_packet_size: config.max_packet_size,
            idle_timeout: config.idle_timeout,
        }
    }
}

/// Outcome of waiting for the next client packet.
enum Next {
    Packet(Packet),
    Closing(CloseReason),
}

/// What the command loop does with one packet.
enum Action {
    Ignore,
    Reply(u8, BytesMut),
    Close(CloseReason),
}

/// A file upload the client may be sending in answer to a request.
///
/// Data packets continue the sequence of the request and the upload ends
/// with an empty packet. A packet out of sequence is a new command.
struct Upload {
    path: String,
    next_sequence: u8,
    contents: Vec<u8>,
    received: usize,
}

impl Upload {
    fn new(path: String, request_sequence: u8) -> Self {
        Self {
            path,
            next_sequence: request_sequence.wrapping_add(1),
            contents: Vec::new(),
            received: 0,
        }
    }

    fn accepts(&self, packet: &Packet) -> bool {
        packet.sequence == self.next_sequence
    }

    fn push(&mut self, packet: &Packet) {
        let room = MAX_UPLOAD_LEN.saturating_sub(self.contents.len());
        let kept = packet.payload.len().min(room);
        self.contents.extend_from_slice(&packet.payload[..kept]);
        self.received += packet.payload.len();
        self.next_sequence = packet.sequence.wrapping_add(1);
    }
}

/// One client connection.
pub struct Session<S> {
    stream: S,
    peer: Option<SocketAddr>,
    buffer: BytesMut,
    state: SessionState,
    options: SessionOptions,
    sink: Arc<dyn EventSink>,
    shutdown: CancellationToken,
    upload: Option<Upload>,
}

impl<S> Session<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(
        stream: S,
        options: SessionOptions,
        sink: Arc<dyn EventSink>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            stream,
            peer: None,
            buffer: BytesMut::with_capacity(BUFFER_SIZE),
            state: SessionState::AwaitingHandshakeAck,
            options,
            sink,
            shutdown,
            upload: None,
        }
    }

    /// Attach the client address reported in events.
    pub fn with_peer(mut self, peer: Option<SocketAddr>) -> Self {
        self.peer = peer;
        self
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Drive the session to completion.
    ///
    /// The stream is shut down on every exit path. A client hanging up is
    /// not an error; framing and I/O failures are returned after closing.
    pub async fn run(&mut self) -> Result<()> {
        self.sink.emit(&Event::Connected { peer: self.peer });

        let (reason, result) = match self.serve().await {
            Ok(reason) => (reason, Ok(())),
            Err(e) if e.is_disconnect() => (CloseReason::Disconnected, Ok(())),
            Err(e) => (CloseReason::Error(e.to_string()), Err(e)),
        };

        self.close(reason).await;
        result
    }

    async fn serve(&mut self) -> Result<CloseReason> {
        if let ControlFlow::Break(reason) = self.send(0, &Handshake::DEFAULT.encode()).await? {
            return Ok(reason);
        }
        self.state = SessionState::AwaitingAuthResponse;

        let login = match self.next_packet().await? {
            Next::Packet(packet) => packet,
            Next::Closing(reason) => return Ok(reason),
        };

        let response = HandshakeResponse::parse(&login.payload);
        self.sink.emit(&Event::Authenticated {
            local_infile: response.local_infile(),
            username: response.username,
            capabilities: response.capabilities,
        });
        let ok = OkPacket::DEFAULT.encode();
        if let ControlFlow::Break(reason) = self.send(login.sequence.wrapping_add(1), &ok).await? {
            return Ok(reason);
        }
        self.state = SessionState::CommandLoop;

        loop {
            let packet = match self.next_packet().await? {
                Next::Packet(packet) => packet,
                Next::Closing(reason) => return Ok(reason),
            };

            match self.dispatch(packet) {
                Action::Ignore => {}
                Action::Close(reason) => return Ok(reason),
                Action::Reply(sequence, payload) => {
                    if let ControlFlow::Break(reason) = self.send(sequence, &payload).await? {
                        return Ok(reason);
                    }
                }
            }
        }
    }

    /// Decide the answer to one command-phase packet.
    fn dispatch(&mut self, packet: Packet) -> Action {
        let sequence = packet.sequence.wrapping_add(1);

        if let Some(upload) = self.upload.as_mut() {
            if upload.accepts(&packet) {
                if !packet.payload.is_empty() {
                    upload.push(&packet);
                    return Action::Ignore;
                }
                // Terminator: the client waits for a status reply.
                if let Some(upload) = self.upload.take() {
                    self.finish_upload(upload);
                }
                return Action::Reply(sequence, OkPacket::DEFAULT.encode());
            }
            // Out of sequence: the client moved on to a new command.
            if let Some(upload) = self.upload.take() {
                self.finish_upload(upload);
            }
        }

        let Some(opcode) = packet.opcode() else {
            return Action::Ignore;
        };

        let command = Command::from_opcode(opcode);
        self.sink.emit(&Event::Command {
            opcode: command.opcode(),
            name: command.name(),
            args: packet.payload[1..].to_vec(),
        });

        match command.reply() {
            Reply::None => Action::Ignore,
            Reply::Close => Action::Close(CloseReason::Quit),
            Reply::Ok => Action::Reply(sequence, OkPacket::DEFAULT.encode()),
            Reply::Eof => Action::Reply(sequence, EofPacket::DEFAULT.encode()),
            Reply::LocalInfile => {
                let path = self.options.file.clone();
                let request = LocalInfileRequest { path: &path }.encode();
                self.sink.emit(&Event::FileRequested { path: path.clone() });
                self.upload = Some(Upload::new(path, sequence));
                Action::Reply(sequence, request)
            }
        }
    }

    fn finish_upload(&self, upload: Upload) {
        if upload.received == 0 {
            trace!(path = %upload.path, "File request declined");
            return;
        }
        if upload.received > upload.contents.len() {
            debug!(
                path = %upload.path,
                received = upload.received,
                kept = upload.contents.len(),
                "Disclosed file truncated"
            );
        }
        self.sink.emit(&Event::FileDisclosed {
            path: upload.path,
            contents: upload.contents,
        });
    }

    /// Wait for one whole packet, the idle timeout, or shutdown.
    async fn next_packet(&mut self) -> Result<Next> {
        loop {
            match packet::parse(&self.buffer, self.options.max_packet_size)? {
                ParseResult::Complete(packet, consumed) => {
                    self.buffer.advance(consumed);
                    trace!(
                        sequence = packet.sequence,
                        len = packet.payload.len(),
                        "Packet received"
                    );
                    return Ok(Next::Packet(packet));
                }
                ParseResult::Incomplete(Some(total)) => {
                    self.buffer.reserve(total - self.buffer.len());
                }
                ParseResult::Incomplete(None) => {}
            }

            let idle_timeout = self.options.idle_timeout;
            let n = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => {
                    return Ok(Next::Closing(CloseReason::Shutdown));
                }
                _ = idle(idle_timeout) => {
                    return Ok(Next::Closing(CloseReason::IdleTimeout));
                }
                n = self.stream.read_buf(&mut self.buffer) => n?,
            };

            if n == 0 {
                return Err(packet::truncated(&self.buffer));
            }
        }
    }

    /// Write one packet unless shutdown or the idle timeout comes first.
    async fn send(&mut self, sequence: u8, payload: &[u8]) -> Result<ControlFlow<CloseReason>> {
        let frame = packet::encode(sequence, payload)?;
        let idle_timeout = self.options.idle_timeout;
        let stream = &mut self.stream;

        tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => Ok(ControlFlow::Break(CloseReason::Shutdown)),
            _ = idle(idle_timeout) => Ok(ControlFlow::Break(CloseReason::IdleTimeout)),
            written = async {
                stream.write_all(&frame).await?;
                stream.flush().await
            } => {
                written?;
                Ok(ControlFlow::Continue(()))
            }
        }
    }

    async fn close(&mut self, reason: CloseReason) {
        if self.state == SessionState::Closed {
            return;
        }
        self.state = SessionState::Closed;

        if let Some(upload) = self.upload.take() {
            self.finish_upload(upload);
        }
        if let Err(e) = self.stream.shutdown().await {
            trace!(error = %e, "Shutdown after close failed");
        }
        self.sink.emit(&Event::Closed { reason });
    }
}

/// Resolves after `timeout`, or never.
async fn idle(timeout: Option<Duration>) {
    match timeout {
        Some(timeout) => tokio::time::sleep(timeout).await,
        None => std::future::pending().await,
    }
}

/// Handle a single client connection
pub async fn handle_connection(
    stream: TcpStream,
    options: SessionOptions,
    sink: Arc<dyn EventSink>,
    shutdown: CancellationToken,
) -> Result<()> {
    stream.set_nodelay(true)?;
    let peer = stream.peer_addr().ok();

    let mut session = Session::new(stream, options, sink, shutdown).with_peer(peer);
    let result = session.run().await;
    trace!(peer = ?peer, state = ?session.state(), "Session finished");
    result
}
