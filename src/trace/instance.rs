use crate::program::{InstrId, MethodId};
use std::fmt;

/// Identifier of a heap object (or array) as recorded by the tracer
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub struct ObjectId(pub i64);

/// Dynamic data recorded alongside an instruction occurrence
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum Payload {
    None,

    /// Object whose field was accessed
    Object(ObjectId),

    /// Array element that was accessed
    ArrayElement { array: ObjectId, index: i64 },

    /// Freshly allocated object or array
    Created(ObjectId),
}

/// One concrete occurrence of a static instruction
///
/// Instances are produced in backward order by a
/// [`BackwardInstanceIterator`](super::BackwardInstanceIterator) and are immutable afterwards.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub struct Instance {
    pub instruction: InstrId,

    /// Method owning `instruction` (cached to avoid a program lookup)
    pub method: MethodId,

    /// Occurrence number of `instruction`, counted from 1 in backward order
    pub occurrence: u64,

    /// Call stack depth (at least 1)
    pub stack_depth: u32,

    /// Position in the thread's instruction stream
    ///
    /// This decreases strictly throughout a backward traversal, so it uniquely identifies the
    /// instance within one thread.
    pub counter: u64,

    pub payload: Payload,
}

impl fmt::Display for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "@{}.{} (#{}, depth {})",
            self.instruction.0, self.occurrence, self.counter, self.stack_depth
        )
    }
}
