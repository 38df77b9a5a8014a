//! Command opcodes and how each one is answered.

/// A client command, keyed by the first payload byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// 0x00, nothing to answer.
    Sleep,
    /// 0x01, client is leaving.
    Quit,
    /// 0x02, select a schema.
    InitDb,
    /// 0x03, any SQL text.
    Query,
    /// 0x1b
    SetOption,
    /// Anything else.
    Other(u8),
}

/// What the session sends back for a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reply {
    None,
    Close,
    Ok,
    LocalInfile,
    Eof,
}

impl Command {
    pub const SLEEP: u8 = 0x00;
    pub const QUIT: u8 = 0x01;
    pub const INIT_DB: u8 = 0x02;
    pub const QUERY: u8 = 0x03;
    pub const SET_OPTION: u8 = 0x1b;

    pub fn from_opcode(opcode: u8) -> Self {
        match opcode {
            Self::SLEEP => Command::Sleep,
            Self::QUIT => Command::Quit,
            Self::INIT_DB => Command::InitDb,
            Self::QUERY => Command::Query,
            Self::SET_OPTION => Command::SetOption,
            other => Command::Other(other),
        }
    }

    pub fn opcode(&self) -> u8 {
        match self {
            Command::Sleep => Self::SLEEP,
            Command::Quit => Self::QUIT,
            Command::InitDb => Self::INIT_DB,
            Command::Query => Self::QUERY,
            Command::SetOption => Self::SET_OPTION,
            Command::Other(op) => *op,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Command::Sleep => "sleep",
            Command::Quit => "quit",
            Command::InitDb => "init_db",
            Command::Query => "query",
            Command::SetOption => "set_option",
            Command::Other(_) => "unknown",
        }
    }

    pub fn reply(&self) -> Reply {
        match self {
            Command::Sleep => Reply::None,
            Command::Quit => Reply::Close,
            Command::InitDb => Reply::Ok,
            Command::Query => Reply::LocalInfile,
            Command::SetOption => Reply::Eof,
            Command::Other(_) => Reply::Ok,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reply_table() {
        let table = [
            (0x00, Reply::None),
            (0x01, Reply::Close),
            (0x02, Reply::Ok),
            (0x03, Reply::LocalInfile),
            (0x1b, Reply::Eof),
            (0x0e, Reply::Ok),
            (0xff, Reply::Ok),
        ];
        for (opcode, reply) in table {
            assert_eq!(Command::from_opcode(opcode).reply(), reply, "opcode {opcode:#04x}");
        }
    }

    #[test]
    fn test_opcode_roundtrip() {
        for opcode in 0..=u8::MAX {
            assert_eq!(Command::from_opcode(opcode).opcode(), opcode);
        }
    }

    #[test]
    fn test_names() {
        assert_eq!(Command::from_opcode(0x03).name(), "query");
        assert_eq!(Command::from_opcode(0x1b).name(), "set_option");
        assert_eq!(Command::from_opcode(0x16).name(), "unknown");
    }
}
