//! Server message templates and the client login parser.
//!
//! Every server reply is a fixed value. They are kept as named fields so the
//! exact bytes on the wire can be checked field by field.

use bytes::{BufMut, BytesMut};

/// Client advertises LOAD DATA LOCAL support.
pub const CLIENT_LOCAL_FILES: u32 = 0x0000_0080;
/// Client speaks the 4.1+ protocol.
pub const CLIENT_PROTOCOL_41: u32 = 0x0000_0200;

/// `SERVER_STATUS_AUTOCOMMIT`
pub const SERVER_STATUS_AUTOCOMMIT: u16 = 0x0002;

/// Marker byte of a LOCAL INFILE request.
pub const LOCAL_INFILE_MARKER: u8 = 0xfb;

/// Initial greeting sent by the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Handshake {
    pub protocol_version: u8,
    pub server_version: &'static str,
    pub connection_id: u32,
    pub auth_data_1: [u8; 8],
    pub capabilities_low: u16,
    pub character_set: u8,
    pub status: u16,
    pub capabilities_high: u16,
    pub auth_data_len: u8,
    /// Remainder of the scramble, NUL included.
    pub auth_data_2: [u8; 13],
    pub auth_plugin: &'static str,
}

impl Handshake {
    /// The greeting every client receives.
    pub const DEFAULT: Handshake = Handshake {
        protocol_version: 0x0a,
        server_version: "5.6.28-0ubuntu1.14.51.4_by_ppk",
        connection_id: 0x2d,
        auth_data_1: [0x40, 0x3f, 0x59, 0x26, 0x4b, 0x2b, 0x34, 0x60],
        capabilities_low: 0xf7ff,
        character_set: 0x08,
        status: SERVER_STATUS_AUTOCOMMIT,
        capabilities_high: 0x807f,
        auth_data_len: 0x15,
        auth_data_2: [
            0x68, 0x69, 0x59, 0x5f, 0x52, 0x5f, 0x63, 0x55, 0x60, 0x64, 0x53, 0x52, 0x00,
        ],
        auth_plugin: "mysql_native_password",
    };

    pub fn encode(&self) -> BytesMut {
        let mut buf = BytesMut::with_capacity(128);
        self.encode_into(&mut buf);
        buf
    }

    pub fn encode_into(&self, buf: &mut BytesMut) {
        buf.put_u8(self.protocol_version);
        buf.put_slice(self.server_version.as_bytes());
        buf.put_u8(0);
        buf.put_u32_le(self.connection_id);
        buf.put_slice(&self.auth_data_1);
        buf.put_u8(0); // filler
        buf.put_u16_le(self.capabilities_low);
        buf.put_u8(self.character_set);
        buf.put_u16_le(self.status);
        buf.put_u16_le(self.capabilities_high);
        buf.put_u8(self.auth_data_len);
        buf.put_bytes(0, 10);
        buf.put_slice(&self.auth_data_2);
        buf.put_slice(self.auth_plugin.as_bytes());
        buf.put_u8(0);
    }
}

impl Default for Handshake {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// OK packet with single-byte length-encoded counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OkPacket {
    pub affected_rows: u8,
    pub last_insert_id: u8,
    pub status: u16,
    pub warnings: u16,
}

impl OkPacket {
    /// Zero rows, zero insert id, autocommit, no warnings.
    pub const DEFAULT: OkPacket = OkPacket {
        affected_rows: 0,
        last_insert_id: 0,
        status: SERVER_STATUS_AUTOCOMMIT,
        warnings: 0,
    };

    pub fn encode(&self) -> BytesMut {
        let mut buf = BytesMut::with_capacity(7);
        buf.put_u8(0x00);
        buf.put_u8(self.affected_rows);
        buf.put_u8(self.last_insert_id);
        buf.put_u16_le(self.status);
        buf.put_u16_le(self.warnings);
        buf
    }
}

/// EOF-style acknowledgment, sent for the set-option command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EofPacket {
    pub warnings: u16,
    pub status: u16,
}

impl EofPacket {
    pub const DEFAULT: EofPacket = EofPacket {
        warnings: 0,
        status: SERVER_STATUS_AUTOCOMMIT,
    };

    pub fn encode(&self) -> BytesMut {
        let mut buf = BytesMut::with_capacity(5);
        buf.put_u8(0xfe);
        buf.put_u16_le(self.warnings);
        buf.put_u16_le(self.status);
        buf
    }
}

/// Request for the client to upload a local file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalInfileRequest<'a> {
    pub path: &'a str,
}

impl LocalInfileRequest<'_> {
    pub fn encode(&self) -> BytesMut {
        let mut buf = BytesMut::with_capacity(1 + self.path.len());
        buf.put_u8(LOCAL_INFILE_MARKER);
        buf.put_slice(self.path.as_bytes());
        buf
    }
}

/// Fields pulled out of the client's login packet.
///
/// Used for logging only; nothing here affects the exchange.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HandshakeResponse {
    pub capabilities: Option<u32>,
    pub username: Option<String>,
}

impl HandshakeResponse {
    /// Best-effort parse of a 4.1 (or older 3.20) login payload.
    pub fn parse(payload: &[u8]) -> Self {
        if payload.len() < 2 {
            return Self::default();
        }

        let low = u16::from_le_bytes([payload[0], payload[1]]);
        if u32::from(low) & CLIENT_PROTOCOL_41 == 0 {
            // 2 capability bytes, 3 max-packet bytes, then the username.
            return Self {
                capabilities: Some(u32::from(low)),
                username: payload.get(5..).and_then(read_cstr),
            };
        }

        let Some(caps) = payload.get(..4) else {
            return Self {
                capabilities: Some(u32::from(low)),
                username: None,
            };
        };
        // capabilities(4) max-packet(4) charset(1) reserved(23)
        Self {
            capabilities: Some(u32::from_le_bytes([caps[0], caps[1], caps[2], caps[3]])),
            username: payload.get(32..).and_then(read_cstr),
        }
    }

    pub fn local_infile(&self) -> bool {
        self.capabilities
            .is_some_and(|c| c & CLIENT_LOCAL_FILES != 0)
    }
}

/// Read a NUL-terminated string; `None` if unterminated or empty.
fn read_cstr(input: &[u8]) -> Option<String> {
    let end = input.iter().position(|&b| b == 0)?;
    if end == 0 {
        return None;
    }
    Some(String::from_utf8_lossy(&input[..end]).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    const GREETING: &[u8] = b"\x0a5.6.28-0ubuntu1.14.51.4_by_ppk\x00\
        \x2d\x00\x00\x00\x40\x3f\x59\x26\x4b\x2b\x34\x60\x00\xff\xf7\x08\x02\x00\x7f\x80\x15\
        \x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\
        \x68\x69\x59\x5f\x52\x5f\x63\x55\x60\x64\x53\x52\x00\
        mysql_native_password\x00";

    #[test]
    fn test_handshake_bytes() {
        assert_eq!(&Handshake::DEFAULT.encode()[..], GREETING);
    }

    #[test]
    fn test_handshake_fields() {
        let hs = Handshake::default();
        let capabilities = (u32::from(hs.capabilities_high) << 16) | u32::from(hs.capabilities_low);
        assert_eq!(capabilities, 0x807f_f7ff);
        assert_eq!(usize::from(hs.auth_data_len), 8 + hs.auth_data_2.len());
        assert_ne!(capabilities & CLIENT_LOCAL_FILES, 0);
    }

    #[test]
    fn test_ok_packet_bytes() {
        assert_eq!(&OkPacket::DEFAULT.encode()[..], b"\x00\x00\x00\x02\x00\x00\x00");
    }

    #[test]
    fn test_eof_packet_bytes() {
        assert_eq!(&EofPacket::DEFAULT.encode()[..], b"\xfe\x00\x00\x02\x00");
    }

    #[test]
    fn test_local_infile_request_bytes() {
        let req = LocalInfileRequest {
            path: "/etc/passwd",
        };
        assert_eq!(&req.encode()[..], b"\xfb/etc/passwd");
    }

    fn login_41(caps: u32, user: &str) -> Vec<u8> {
        let mut payload = Vec::new();
        payload.extend_from_slice(&caps.to_le_bytes());
        payload.extend_from_slice(&0x0100_0000u32.to_le_bytes());
        payload.push(0x21);
        payload.extend_from_slice(&[0u8; 23]);
        payload.extend_from_slice(user.as_bytes());
        payload.push(0);
        payload.push(20);
        payload.extend_from_slice(&[0xab; 20]);
        payload
    }

    #[test]
    fn test_parse_login_41() {
        let resp = HandshakeResponse::parse(&login_41(0x000f_a68d, "root"));
        assert_eq!(resp.capabilities, Some(0x000f_a68d));
        assert_eq!(resp.username.as_deref(), Some("root"));
        assert!(resp.local_infile());
    }

    #[test]
    fn test_parse_login_without_local_files() {
        let resp = HandshakeResponse::parse(&login_41(CLIENT_PROTOCOL_41, "app"));
        assert_eq!(resp.username.as_deref(), Some("app"));
        assert!(!resp.local_infile());
    }

    #[test]
    fn test_parse_login_320() {
        let mut payload = vec![0x85, 0x00, 0x00, 0x00, 0x01];
        payload.extend_from_slice(b"bob\0");
        let resp = HandshakeResponse::parse(&payload);
        assert_eq!(resp.capabilities, Some(0x85));
        assert_eq!(resp.username.as_deref(), Some("bob"));
    }

    #[test]
    fn test_parse_garbage_login() {
        assert_eq!(HandshakeResponse::parse(b""), HandshakeResponse::default());

        let resp = HandshakeResponse::parse(b"\x00\x02\x00");
        assert_eq!(resp.capabilities, Some(0x0200));
        assert_eq!(resp.username, None);

        let resp = HandshakeResponse::parse(&[0xff; 5]);
        assert_eq!(resp.capabilities, Some(0xffff_ffff));
        assert_eq!(resp.username, None);
    }
}
