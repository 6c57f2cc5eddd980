use super::{InstrId, MethodId, SynLabel};
use std::fmt;

#[derive(Debug)]
pub enum Error {
    /// A label is referred to by a jump but was never placed
    UnplacedLabel(SynLabel),

    /// Jump target outside of the method containing the jump
    DanglingTarget { instruction: InstrId, target: InstrId },

    /// Method whose instructions are not a contiguous run starting with the entry label and
    /// ending with the leave and abnormal termination labels
    MalformedMethod(MethodId),

    /// Instruction whose owning method does not list it
    OrphanInstruction(InstrId),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::UnplacedLabel(label) => write!(f, "label {:?} was never placed", label),
            Error::DanglingTarget {
                instruction,
                target,
            } => write!(
                f,
                "instruction @{} jumps outside its method (to @{})",
                instruction.0, target.0
            ),
            Error::MalformedMethod(method) => write!(f, "method #{} is malformed", method.0),
            Error::OrphanInstruction(instruction) => write!(
                f,
                "instruction @{} is not listed by its method",
                instruction.0
            ),
        }
    }
}

impl std::error::Error for Error {}
