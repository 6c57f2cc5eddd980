use super::{FieldId, MethodId};
use std::fmt;

/// Index of a static instruction inside a [`Program`](super::Program)
///
/// Indices are dense and global (not per method). Instructions of one method occupy a contiguous
/// run of indices, in code order.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub struct InstrId(pub u32);

/// Static instruction
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct InstructionData {
    /// Global index
    pub id: InstrId,

    /// Owning method
    pub method: MethodId,

    /// What the instruction does
    pub opcode: Opcode,

    /// Source line, if the method carries line information
    pub line: Option<u32>,
}

/// Kind of administrative label
///
/// Labels do not correspond to any real bytecode. The tracer emits them to mark block boundaries
/// and the points where a method is entered or left.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum LabelKind {
    /// Jump target or block boundary
    Plain,

    /// First instruction of every method
    MethodEntry,

    /// Traced after the method returned normally
    MethodLeave,

    /// Traced after an exception propagated out of the method
    AbnormalTermination,

    /// Start of an exception handler (the caught exception is on the stack)
    CatchBlock,
}

#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    And,
    Or,
    Xor,
    Shl,
    Shr,
    UShr,
    Compare, // covers `lcmp`, `fcmp{l,g}`, and `dcmp{l,g}`
}

#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum UnaryOp {
    Neg,
    Convert, // covers all of the `x2y` conversions
}

/// Branch condition, relative to zero or to the second operand
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum Condition {
    Eq,
    Ne,
    Lt,
    Ge,
    Gt,
    Le,
    Null,
    NonNull,
}

#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum InvokeKind {
    Virtual,
    Special,
    Static,
    Interface,
}

/// Target of an invocation
///
/// This only carries what is needed to simulate the call site: whether the callee is actually
/// traced is only known at runtime (by seeing a new frame appear on top of the caller).
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CalleeRef {
    pub class_name: String,
    pub name: String,

    /// Number of operand stack slots consumed (including the receiver)
    pub argument_slots: u16,

    /// Whether a value is pushed back onto the stack
    pub returns_value: bool,
}

/// Bytecode instruction, grouped into families that behave the same during simulation
///
/// Typed variants (eg. `iload`, `aload`, `lload`) are collapsed since the simulator only cares
/// about which slots move, not about their types. Every value occupies exactly one slot.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Opcode {
    Nop,
    Label(LabelKind),
    Const(i64), // covers `aconst_null`, `{i,l,f,d}const_*`, `bipush`, `sipush`, and `ldc*`
    Load(u16),
    Store(u16),
    IInc(u16, i16),
    ArrayLoad,
    ArrayStore,
    ArrayLength,
    GetField(FieldId),
    PutField(FieldId),
    GetStatic(FieldId),
    PutStatic(FieldId),
    Binary(BinaryOp),
    Unary(UnaryOp),
    Pop,
    Dup,
    Goto(InstrId),
    If(Condition, InstrId),
    IfCmp(Condition, InstrId),
    Switch {
        targets: Vec<InstrId>,
        default: InstrId,
    },
    Invoke(InvokeKind, CalleeRef),
    Return(bool), // whether a value is returned
    Throw,
    New(String),
    NewArray,
    CheckCast(String),
    InstanceOf(String),
}

impl Opcode {
    /// Number of operand stack slots popped and then pushed
    pub fn stack_effect(&self) -> (u16, u16) {
        match self {
            Opcode::Nop | Opcode::Goto(_) | Opcode::IInc(_, _) => (0, 0),
            Opcode::Label(LabelKind::CatchBlock) => (0, 1),
            Opcode::Label(_) => (0, 0),
            Opcode::Const(_) | Opcode::Load(_) | Opcode::GetStatic(_) | Opcode::New(_) => (0, 1),
            Opcode::Store(_) | Opcode::PutStatic(_) | Opcode::Pop | Opcode::Throw => (1, 0),
            Opcode::ArrayLoad | Opcode::Binary(_) => (2, 1),
            Opcode::ArrayStore => (3, 0),
            Opcode::ArrayLength
            | Opcode::GetField(_)
            | Opcode::Unary(_)
            | Opcode::NewArray
            | Opcode::CheckCast(_)
            | Opcode::InstanceOf(_) => (1, 1),
            Opcode::PutField(_) => (2, 0),
            Opcode::Dup => (1, 2),
            Opcode::If(_, _) | Opcode::Switch { .. } => (1, 0),
            Opcode::IfCmp(_, _) => (2, 0),
            Opcode::Invoke(_, callee) => (callee.argument_slots, callee.returns_value as u16),
            Opcode::Return(value) => (*value as u16, 0),
        }
    }

    /// How many values from the trace's value sequence this instruction consumes
    ///
    /// Field accesses record the object, array accesses record the array and the index, and
    /// allocations record the identifier of the fresh object.
    pub fn traced_values(&self) -> usize {
        match self {
            Opcode::GetField(_) | Opcode::PutField(_) | Opcode::New(_) | Opcode::NewArray => 1,
            Opcode::ArrayLoad | Opcode::ArrayStore => 2,
            _ => 0,
        }
    }

    pub fn is_label(&self) -> bool {
        matches!(self, Opcode::Label(_))
    }

    pub fn is_label_of(&self, kind: LabelKind) -> bool {
        matches!(self, Opcode::Label(k) if *k == kind)
    }

    pub fn is_invoke(&self) -> bool {
        matches!(self, Opcode::Invoke(_, _))
    }

    pub fn is_unconditional_jump(&self) -> bool {
        matches!(self, Opcode::Goto(_))
    }

    /// Conditional branches (the only instructions that can be control dependence sources)
    pub fn is_conditional_branch(&self) -> bool {
        matches!(
            self,
            Opcode::If(_, _) | Opcode::IfCmp(_, _) | Opcode::Switch { .. }
        )
    }

    /// Does control never fall through to the next instruction?
    pub fn ends_flow(&self) -> bool {
        matches!(
            self,
            Opcode::Goto(_)
                | Opcode::Switch { .. }
                | Opcode::Return(_)
                | Opcode::Throw
                | Opcode::Label(LabelKind::MethodLeave)
                | Opcode::Label(LabelKind::AbnormalTermination)
        )
    }

    /// Explicit jump targets
    pub fn jump_targets(&self) -> Vec<InstrId> {
        match self {
            Opcode::Goto(target) | Opcode::If(_, target) | Opcode::IfCmp(_, target) => {
                vec![*target]
            }
            Opcode::Switch { targets, default } => {
                let mut all = targets.clone();
                all.push(*default);
                all
            }
            _ => vec![],
        }
    }

    /// Rewrite the jump targets (used when resolving labels)
    pub(crate) fn map_targets(&mut self, mut resolve: impl FnMut(InstrId) -> InstrId) {
        match self {
            Opcode::Goto(target) | Opcode::If(_, target) | Opcode::IfCmp(_, target) => {
                *target = resolve(*target);
            }
            Opcode::Switch { targets, default } => {
                for target in targets.iter_mut() {
                    *target = resolve(*target);
                }
                *default = resolve(*default);
            }
            _ => (),
        }
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Opcode::Nop => f.write_str("nop"),
            Opcode::Label(kind) => write!(f, "label {:?}", kind),
            Opcode::Const(value) => write!(f, "const {}", value),
            Opcode::Load(slot) => write!(f, "load {}", slot),
            Opcode::Store(slot) => write!(f, "store {}", slot),
            Opcode::IInc(slot, delta) => write!(f, "iinc {} {}", slot, delta),
            Opcode::ArrayLoad => f.write_str("arrayload"),
            Opcode::ArrayStore => f.write_str("arraystore"),
            Opcode::ArrayLength => f.write_str("arraylength"),
            Opcode::GetField(field) => write!(f, "getfield #{}", field.0),
            Opcode::PutField(field) => write!(f, "putfield #{}", field.0),
            Opcode::GetStatic(field) => write!(f, "getstatic #{}", field.0),
            Opcode::PutStatic(field) => write!(f, "putstatic #{}", field.0),
            Opcode::Binary(op) => write!(f, "{:?}", op),
            Opcode::Unary(op) => write!(f, "{:?}", op),
            Opcode::Pop => f.write_str("pop"),
            Opcode::Dup => f.write_str("dup"),
            Opcode::Goto(target) => write!(f, "goto @{}", target.0),
            Opcode::If(cond, target) => write!(f, "if{:?} @{}", cond, target.0),
            Opcode::IfCmp(cond, target) => write!(f, "ifcmp{:?} @{}", cond, target.0),
            Opcode::Switch { targets, default } => {
                f.write_str("switch [")?;
                for target in targets {
                    write!(f, "@{} ", target.0)?;
                }
                write!(f, "] default @{}", default.0)
            }
            Opcode::Invoke(kind, callee) => write!(
                f,
                "invoke{:?} {}.{}",
                kind, callee.class_name, callee.name
            ),
            Opcode::Return(true) => f.write_str("return value"),
            Opcode::Return(false) => f.write_str("return"),
            Opcode::Throw => f.write_str("athrow"),
            Opcode::New(class) => write!(f, "new {}", class),
            Opcode::NewArray => f.write_str("newarray"),
            Opcode::CheckCast(class) => write!(f, "checkcast {}", class),
            Opcode::InstanceOf(class) => write!(f, "instanceof {}", class),
        }
    }
}
