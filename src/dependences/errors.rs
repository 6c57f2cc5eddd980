use crate::program::InstrId;
use crate::trace;
use std::fmt;

#[derive(Debug)]
pub enum Error {
    /// The backward iterator failed (corrupted trace)
    Trace(trace::Error),

    /// The simulator could not make sense of an instance
    Simulation { instruction: InstrId, reason: String },

    /// The run was cancelled (visitors were told through `interrupted`)
    Interrupted,

    /// The fan-out worker pool could not be started
    WorkerPool(String),
}

impl From<trace::Error> for Error {
    fn from(err: trace::Error) -> Error {
        Error::Trace(err)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Trace(err) => err.fmt(f),
            Error::Simulation {
                instruction,
                reason,
            } => write!(f, "cannot simulate @{}: {}", instruction.0, reason),
            Error::Interrupted => f.write_str("dependence extraction was interrupted"),
            Error::WorkerPool(reason) => write!(f, "cannot start worker pool: {}", reason),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Trace(err) => Some(err),
            _ => None,
        }
    }
}
