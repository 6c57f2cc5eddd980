use crate::dependences;
use crate::trace;
use std::fmt;

#[derive(Debug)]
pub enum Error {
    /// A criterion could not be parsed
    MalformedCriterion(String),

    /// A criterion names a method that is not part of the program
    UnknownMethod(String),

    /// A criterion names a variable that its method does not have
    UnknownVariable { method: String, variable: String },

    /// Extracting the dependences failed
    Dependences(dependences::Error),
}

impl From<dependences::Error> for Error {
    fn from(err: dependences::Error) -> Error {
        Error::Dependences(err)
    }
}

impl From<trace::Error> for Error {
    fn from(err: trace::Error) -> Error {
        Error::Dependences(dependences::Error::Trace(err))
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::MalformedCriterion(criterion) => write!(
                f,
                "malformed criterion `{}` (expected Class.method[:line][:(occurrence)][:{{var,...}}])",
                criterion
            ),
            Error::UnknownMethod(method) => write!(f, "unknown method {}", method),
            Error::UnknownVariable { method, variable } => {
                write!(f, "method {} has no variable named {}", method, variable)
            }
            Error::Dependences(err) => err.fmt(f),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Dependences(err) => Some(err),
            _ => None,
        }
    }
}
