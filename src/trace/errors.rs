use crate::program;
use std::fmt;

#[derive(Debug)]
pub enum Error {
    Io(std::io::Error),

    /// File does not start with the trace magic bytes
    BadMagic,

    UnsupportedVersion(u16),

    /// Input ended in the middle of a construct
    UnexpectedEof,

    /// LEB128 value is too long or does not fit its target type
    InvalidVarint,

    /// Unknown tag byte while decoding a tagged construct
    InvalidTag { what: &'static str, tag: u8 },

    /// A sequence ran out while more values were expected (corrupted input)
    SequenceExhausted(&'static str),

    /// Instruction index in the trace outside the program
    UnknownInstruction(u32),

    /// Method index outside the program
    UnknownMethod(u32),

    /// No thread matches the selector
    UnknownThread(String),

    /// The decoded program is inconsistent
    Program(program::Error),
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Error {
        if err.kind() == std::io::ErrorKind::UnexpectedEof {
            Error::UnexpectedEof
        } else {
            Error::Io(err)
        }
    }
}

impl From<program::Error> for Error {
    fn from(err: program::Error) -> Error {
        Error::Program(err)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(err) => write!(f, "I/O error: {}", err),
            Error::BadMagic => f.write_str("not a trace file (bad magic bytes)"),
            Error::UnsupportedVersion(version) => {
                write!(f, "unsupported trace format version {}", version)
            }
            Error::UnexpectedEof => f.write_str("unexpected end of input"),
            Error::InvalidVarint => f.write_str("invalid variable length integer"),
            Error::InvalidTag { what, tag } => write!(f, "invalid {} tag {:#04x}", what, tag),
            Error::SequenceExhausted(what) => {
                write!(f, "corrupted trace: {} sequence exhausted", what)
            }
            Error::UnknownInstruction(idx) => write!(f, "unknown instruction index {}", idx),
            Error::UnknownMethod(idx) => write!(f, "unknown method index {}", idx),
            Error::UnknownThread(selector) => write!(f, "no thread matches '{}'", selector),
            Error::Program(err) => write!(f, "malformed program: {}", err),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(err) => Some(err),
            Error::Program(err) => Some(err),
            _ => None,
        }
    }
}
