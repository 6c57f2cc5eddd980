use super::InstrId;

/// Index of a method inside a [`Program`](super::Program)
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub struct MethodId(pub u32);

/// Index of a field inside a [`Program`](super::Program)
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub struct FieldId(pub u32);

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FieldData {
    pub class_name: String,
    pub name: String,
}

/// Entry in the local variable table of a method
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct LocalVariable {
    pub name: String,
    pub slot: u16,

    /// First and last instruction (inclusive) for which the variable is live
    ///
    /// `None` means the whole method.
    pub scope: Option<(InstrId, InstrId)>,
}

impl LocalVariable {
    pub fn in_scope(&self, instruction: InstrId) -> bool {
        match self.scope {
            None => true,
            Some((start, end)) => start <= instruction && instruction <= end,
        }
    }
}

/// Entry in the exception table of a method
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct ExceptionHandler {
    /// First covered instruction
    pub start: InstrId,

    /// Last covered instruction (inclusive)
    pub end: InstrId,

    /// Catch block label
    pub handler: InstrId,
}

/// Static method
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct MethodData {
    pub id: MethodId,
    pub class_name: String,
    pub name: String,

    /// Number of local variable slots taken by the arguments (including `this`)
    pub argument_slots: u16,

    pub returns_value: bool,
    pub is_static: bool,

    /// Instructions, in code order
    ///
    /// The first one is always the entry label, and the last two are the leave and abnormal
    /// termination labels.
    pub instructions: Vec<InstrId>,

    pub local_variables: Vec<LocalVariable>,
    pub exception_handlers: Vec<ExceptionHandler>,
}

impl MethodData {
    /// Fully qualified name, eg. `Simple1.main`
    pub fn full_name(&self) -> String {
        format!("{}.{}", self.class_name, self.name)
    }

    pub fn entry_label(&self) -> InstrId {
        self.instructions[0]
    }

    pub fn leave_label(&self) -> InstrId {
        self.instructions[self.instructions.len() - 2]
    }

    pub fn abnormal_termination_label(&self) -> InstrId {
        self.instructions[self.instructions.len() - 1]
    }

    /// Position of an instruction inside this method
    pub fn position_of(&self, instruction: InstrId) -> Option<usize> {
        let first = self.instructions.first()?.0;
        let position = instruction.0.checked_sub(first)? as usize;
        if position < self.instructions.len() {
            Some(position)
        } else {
            None
        }
    }

    /// Resolve a named local variable at a given instruction
    ///
    /// Variables whose scope covers the instruction take precedence, but any variable with a
    /// matching name is used as a fallback (scopes recorded by compilers tend to start one
    /// instruction after the store initializing the variable).
    pub fn local_variable(&self, name: &str, at: InstrId) -> Option<&LocalVariable> {
        let mut candidates = self.local_variables.iter().filter(|var| var.name == name);
        let first = candidates.next()?;
        if first.in_scope(at) {
            return Some(first);
        }
        Some(candidates.find(|var| var.in_scope(at)).unwrap_or(first))
    }
}
