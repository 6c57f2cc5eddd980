use crate::program::FieldId;
use crate::trace::ObjectId;
use std::fmt;

/// Identifier of a reconstructed execution frame
///
/// Frame identifiers are never reused within one run, so locations scoped to a destroyed frame
/// can't be confused with those of a later frame at the same depth.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub struct FrameId(pub u64);

/// Something an instruction can read or write
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub enum StorageLocation {
    /// Operand stack slot, counted from the bottom of the frame's stack
    ///
    /// Since frames are reconstructed backwards, the bottom is unknown and indices are relative
    /// to the height when the frame was first seen (so they may be negative).
    StackSlot { frame: FrameId, index: i32 },

    /// Local variable slot
    Local { frame: FrameId, slot: u16 },

    /// Instance field of an object
    Field { object: ObjectId, field: FieldId },

    /// Static field
    StaticField(FieldId),

    /// Element of an array
    ArrayElement { array: ObjectId, index: i64 },
}

impl StorageLocation {
    /// Frame the location is scoped to, if any
    pub fn frame(&self) -> Option<FrameId> {
        match self {
            StorageLocation::StackSlot { frame, .. } | StorageLocation::Local { frame, .. } => {
                Some(*frame)
            }
            _ => None,
        }
    }

    /// Heap object the location belongs to, if any
    pub fn object(&self) -> Option<ObjectId> {
        match self {
            StorageLocation::Field { object, .. } => Some(*object),
            StorageLocation::ArrayElement { array, .. } => Some(*array),
            _ => None,
        }
    }

    pub fn is_stack_slot(&self) -> bool {
        matches!(self, StorageLocation::StackSlot { .. })
    }
}

impl fmt::Display for StorageLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageLocation::StackSlot { frame, index } => {
                write!(f, "stack[{}]@frame{}", index, frame.0)
            }
            StorageLocation::Local { frame, slot } => write!(f, "local{}@frame{}", slot, frame.0),
            StorageLocation::Field { object, field } => write!(f, "obj{}.#{}", object.0, field.0),
            StorageLocation::StaticField(field) => write!(f, "static #{}", field.0),
            StorageLocation::ArrayElement { array, index } => {
                write!(f, "arr{}[{}]", array.0, index)
            }
        }
    }
}
