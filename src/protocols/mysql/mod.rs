//! MySQL-lookalike protocol implementation.
//!
//! Just enough of the MySQL client/server protocol to look like a server,
//! accept any login, and answer every query with a `LOCAL INFILE` request.
//! A client with local-infile enabled replies with the file's contents.
//!
//! ## Packet Format
//!
//! ```text
//! ┌──────────────┬─────────┬──────────────────────────┐
//! │ Length (3 LE)│ Seq (1) │     Payload (Length)     │
//! └──────────────┴─────────┴──────────────────────────┘
//! ```
//!
//! ## Exchange
//!
//! ```text
//! server  seq 0  Handshake (protocol 10, mysql_native_password)
//! client  seq 1  HandshakeResponse      (not checked)
//! server  seq 2  OK
//! client  seq n  Command [opcode, args...]
//! server  seq n+1 OK | EOF | 0xFB <path> | nothing
//! ```
//!
//! ## Commands
//! - 0x00: no-op, no reply
//! - 0x01: quit, connection closed
//! - 0x02: init db, OK
//! - 0x03: query, LOCAL INFILE request
//! - 0x1b: set option, EOF-style acknowledgment
//! - anything else: OK

pub mod command;
pub mod handler;
pub mod message;
pub mod packet;
