//! Session event notifications.
//!
//! Sessions report what they see through an [`EventSink`]. The sink is the
//! only diagnostic channel a session has; the default one forwards every
//! event to `tracing`.

use std::net::SocketAddr;
use tracing::{debug, info, warn};

/// Bytes of a disclosed file shown in the log line.
const PREVIEW_LEN: usize = 256;

/// Something worth telling the operator about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// New client accepted.
    Connected { peer: Option<SocketAddr> },
    /// Client answered the handshake; always accepted.
    Authenticated {
        username: Option<String>,
        capabilities: Option<u32>,
        local_infile: bool,
    },
    /// A command packet was dispatched.
    Command { opcode: u8, name: &'static str, args: Vec<u8> },
    /// File-request sent to the client.
    FileRequested { path: String },
    /// Client sent back the contents of the requested file.
    FileDisclosed { path: String, contents: Vec<u8> },
    /// Session ended.
    Closed { reason: CloseReason },
}

/// Why a session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// Client sent the terminate command.
    Quit,
    /// Client closed the stream.
    Disconnected,
    /// No packet within the idle timeout.
    IdleTimeout,
    /// Server is shutting down.
    Shutdown,
    /// Framing or I/O failure.
    Error(String),
}

/// Receiver for session events.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: &Event);
}

/// Sink that writes events as structured `tracing` records.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, event: &Event) {
        match event {
            Event::Connected { peer } => match peer {
                Some(peer) => info!(peer = %peer, "Client connected"),
                None => info!("Client connected"),
            },
            Event::Authenticated {
                username,
                capabilities,
                local_infile,
            } => {
                info!(
                    username = username.as_deref().unwrap_or("<unknown>"),
                    capabilities = %capabilities
                        .map_or_else(|| "-".to_string(), |c| format!("{c:#010x}")),
                    local_infile,
                    "Client authenticated"
                );
            }
            Event::Command { opcode, name, args } => {
                debug!(
                    opcode = %format!("{opcode:#04x}"),
                    command = name,
                    args = %String::from_utf8_lossy(args),
                    "Command handled"
                );
            }
            Event::FileRequested { path } => info!(path = %path, "Requested local file"),
            Event::FileDisclosed { path, contents } => {
                let shown = &contents[..contents.len().min(PREVIEW_LEN)];
                warn!(
                    path = %path,
                    size = contents.len(),
                    preview = %String::from_utf8_lossy(shown),
                    "Client disclosed file"
                );
            }
            Event::Closed { reason } => match reason {
                CloseReason::Error(e) => debug!(error = %e, "Session closed"),
                other => info!(reason = ?other, "Session closed"),
            },
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Sink that keeps every event for later inspection.
    #[derive(Debug, Default)]
    pub(crate) struct RecordingSink {
        events: Mutex<Vec<Event>>,
    }

    impl RecordingSink {
        pub(crate) fn events(&self) -> Vec<Event> {
            self.events.lock().unwrap().clone()
        }
    }

    impl EventSink for RecordingSink {
        fn emit(&self, event: &Event) {
            self.events.lock().unwrap().push(event.clone());
        }
    }

    #[test]
    fn test_recording_sink_keeps_order() {
        let sink = RecordingSink::default();
        sink.emit(&Event::Connected { peer: None });
        sink.emit(&Event::Closed {
            reason: CloseReason::Quit,
        });

        assert_eq!(
            sink.events(),
            vec![
                Event::Connected { peer: None },
                Event::Closed {
                    reason: CloseReason::Quit
                },
            ]
        );
    }

    #[test]
    fn test_tracing_sink_accepts_every_event() {
        let sink = TracingSink;
        sink.emit(&Event::FileDisclosed {
            path: "/etc/passwd".into(),
            contents: vec![b'x'; PREVIEW_LEN * 2],
        });
        sink.emit(&Event::Closed {
            reason: CloseReason::Error("boom".into()),
        });
    }
}
