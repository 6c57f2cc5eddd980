use super::*;
use std::collections::HashMap;

/// Opaque label used while assembling a method
#[derive(Copy, Clone, Hash, Eq, PartialEq, Debug)]
pub struct SynLabel(usize);

impl SynLabel {
    /// Get the next fresh label
    pub fn next(&self) -> SynLabel {
        SynLabel(self.0 + 1)
    }
}

/// Incrementally assembles a [`Program`]
#[derive(Default)]
pub struct ProgramBuilder {
    program: Program,
}

impl ProgramBuilder {
    pub fn new() -> ProgramBuilder {
        ProgramBuilder::default()
    }

    pub fn add_field(&mut self, class_name: impl Into<String>, name: impl Into<String>) -> FieldId {
        let id = FieldId(self.program.fields.len() as u32);
        self.program.fields.push(FieldData {
            class_name: class_name.into(),
            name: name.into(),
        });
        id
    }

    /// Start a new method
    ///
    /// Methods are assembled one at a time: the returned builder borrows this one until it is
    /// finished. The entry label is emitted immediately.
    pub fn method(
        &mut self,
        class_name: impl Into<String>,
        name: impl Into<String>,
        argument_slots: u16,
        returns_value: bool,
        is_static: bool,
    ) -> MethodBuilder<'_> {
        let id = MethodId(self.program.methods.len() as u32);
        let mut method = MethodBuilder {
            method: MethodData {
                id,
                class_name: class_name.into(),
                name: name.into(),
                argument_slots,
                returns_value,
                is_static,
                instructions: vec![],
                local_variables: vec![],
                exception_handlers: vec![],
            },
            builder: self,
            line: None,
            next_label: SynLabel(0),
            placed: HashMap::new(),
            fixups: vec![],
            handlers: vec![],
        };
        method.emit(Opcode::Label(LabelKind::MethodEntry), None);
        method
    }

    pub fn finish(self) -> Program {
        self.program
    }
}

/// Assembles the code of one method
///
/// Jumps refer to [`SynLabel`]s which get resolved to instruction indices once the method is
/// finished, so forward jumps can be emitted before their target is placed.
pub struct MethodBuilder<'b> {
    builder: &'b mut ProgramBuilder,
    method: MethodData,
    line: Option<u32>,
    next_label: SynLabel,
    placed: HashMap<SynLabel, InstrId>,

    /// Instructions whose jump targets are still label placeholders
    fixups: Vec<InstrId>,

    /// Exception handlers as `(start, end, handler)` labels
    handlers: Vec<(SynLabel, SynLabel, SynLabel)>,
}

impl<'b> MethodBuilder<'b> {
    pub fn id(&self) -> MethodId {
        self.method.id
    }

    /// Set the source line of the following instructions
    pub fn line(&mut self, line: u32) -> &mut Self {
        self.line = Some(line);
        self
    }

    /// Declare a local variable live across the whole method
    pub fn local(&mut self, name: impl Into<String>, slot: u16) -> &mut Self {
        self.method.local_variables.push(LocalVariable {
            name: name.into(),
            slot,
            scope: None,
        });
        self
    }

    /// Push a straight-line instruction
    pub fn push(&mut self, opcode: Opcode) -> InstrId {
        debug_assert!(
            opcode.jump_targets().is_empty(),
            "jumps must be emitted through their dedicated builder methods"
        );
        self.emit(opcode, self.line)
    }

    pub fn fresh_label(&mut self) -> SynLabel {
        let label = self.next_label;
        self.next_label = label.next();
        label
    }

    /// Place a plain label here
    pub fn place(&mut self, label: SynLabel) -> InstrId {
        let id = self.emit(Opcode::Label(LabelKind::Plain), self.line);
        self.placed.insert(label, id);
        id
    }

    /// Place the start of a catch block here
    pub fn place_catch(&mut self, label: SynLabel) -> InstrId {
        let id = self.emit(Opcode::Label(LabelKind::CatchBlock), self.line);
        self.placed.insert(label, id);
        id
    }

    pub fn goto(&mut self, target: SynLabel) -> InstrId {
        self.emit_jump(Opcode::Goto(placeholder(target)))
    }

    pub fn branch(&mut self, condition: Condition, target: SynLabel) -> InstrId {
        self.emit_jump(Opcode::If(condition, placeholder(target)))
    }

    pub fn branch_cmp(&mut self, condition: Condition, target: SynLabel) -> InstrId {
        self.emit_jump(Opcode::IfCmp(condition, placeholder(target)))
    }

    pub fn switch(&mut self, targets: &[SynLabel], default: SynLabel) -> InstrId {
        self.emit_jump(Opcode::Switch {
            targets: targets.iter().copied().map(placeholder).collect(),
            default: placeholder(default),
        })
    }

    /// Register an exception handler covering the instructions between two placed labels
    pub fn handler(&mut self, start: SynLabel, end: SynLabel, handler: SynLabel) -> &mut Self {
        self.handlers.push((start, end, handler));
        self
    }

    /// Emit the trailing labels, resolve jumps, and add the method to the program
    pub fn finish(mut self) -> Result<MethodId, Error> {
        self.emit(Opcode::Label(LabelKind::MethodLeave), None);
        self.emit(Opcode::Label(LabelKind::AbnormalTermination), None);

        let placed = &self.placed;
        let resolve = |label: SynLabel| placed.get(&label).copied().ok_or(Error::UnplacedLabel(label));

        for (start, end, handler) in &self.handlers {
            self.method.exception_handlers.push(ExceptionHandler {
                start: resolve(*start)?,
                end: resolve(*end)?,
                handler: resolve(*handler)?,
            });
        }

        let instructions = &mut self.builder.program.instructions;
        for fixup in &self.fixups {
            let opcode = &mut instructions[fixup.0 as usize].opcode;
            for target in opcode.jump_targets() {
                resolve(SynLabel(target.0 as usize))?;
            }
            opcode.map_targets(|target| placed[&SynLabel(target.0 as usize)]);
        }

        let id = self.method.id;
        log::trace!(
            "Assembled {} ({} instructions)",
            self.method.full_name(),
            self.method.instructions.len()
        );
        self.builder.program.methods.push(self.method);
        Ok(id)
    }

    fn emit_jump(&mut self, opcode: Opcode) -> InstrId {
        let id = self.emit(opcode, self.line);
        self.fixups.push(id);
        id
    }

    fn emit(&mut self, opcode: Opcode, line: Option<u32>) -> InstrId {
        let id = InstrId(self.builder.program.instructions.len() as u32);
        self.builder.program.instructions.push(InstructionData {
            id,
            method: self.method.id,
            opcode,
            line,
        });
        self.method.instructions.push(id);
        id
    }
}

/// Jump target standing in for a label until the method is finished
fn placeholder(label: SynLabel) -> InstrId {
    InstrId(label.0 as u32)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn forward_and_backward_jumps_resolve() {
        let mut builder = ProgramBuilder::new();
        let mut method = builder.method("Loop", "run", 0, false, true);
        let top = method.fresh_label();
        let done = method.fresh_label();
        let top_id = method.place(top);
        method.push(Opcode::Load(0));
        let exit = method.branch(Condition::Eq, done);
        let back = method.goto(top);
        let done_id = method.place(done);
        method.push(Opcode::Return(false));
        let id = method.finish().unwrap();

        let program = builder.finish();
        assert_eq!(program.instruction(exit).opcode, Opcode::If(Condition::Eq, done_id));
        assert_eq!(program.instruction(back).opcode, Opcode::Goto(top_id));

        let method = program.method(id);
        assert!(program
            .instruction(method.entry_label())
            .opcode
            .is_label_of(LabelKind::MethodEntry));
        assert!(program
            .instruction(method.leave_label())
            .opcode
            .is_label_of(LabelKind::MethodLeave));
        assert!(program
            .instruction(method.abnormal_termination_label())
            .opcode
            .is_label_of(LabelKind::AbnormalTermination));
    }

    #[test]
    fn unplaced_label_is_an_error() {
        let mut builder = ProgramBuilder::new();
        let mut method = builder.method("Broken", "run", 0, false, true);
        let nowhere = method.fresh_label();
        method.goto(nowhere);
        assert!(matches!(method.finish(), Err(Error::UnplacedLabel(_))));
    }
}
