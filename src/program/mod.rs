//! Static view of the traced program
//!
//! The dependence extraction only ever needs a handful of facts about each static instruction:
//! which method owns it, what it does to the operand stack and locals, what source line it
//! came from, and where control can go next. [`Program`] keeps those facts in flat arenas
//! indexed by small copyable identifiers ([`MethodId`], [`InstrId`], [`FieldId`]) so that dynamic
//! instances can refer to them without borrowing.
//!
//! Programs are usually decoded from a trace file (see [`crate::trace::TraceFile`]), but can
//! also be assembled by hand with [`ProgramBuilder`]:
//!
//! ```
//! use dynslice::program::*;
//!
//! # fn build() -> Result<(), Error> {
//! let mut builder = ProgramBuilder::new();
//! let mut main = builder.method("Simple1", "main", 1, false, true);
//! main.local("args", 0);
//! main.line(7);
//! main.push(Opcode::Const(2));
//! main.push(Opcode::Store(1));
//! main.push(Opcode::Return(false));
//! let main = main.finish()?;
//!
//! let program = builder.finish();
//! assert_eq!(program.method(main).full_name(), "Simple1.main");
//! # Ok(())
//! # }
//! ```

mod builder;
pub mod control_flow;
mod errors;
mod instruction;
mod method;

pub use builder::*;
pub use errors::*;
pub use instruction::*;
pub use method::*;

use std::cmp::Ordering;
use std::fmt;

/// Methods, instructions, and fields of the traced program
#[derive(Debug, Default, Clone)]
pub struct Program {
    methods: Vec<MethodData>,
    instructions: Vec<InstructionData>,
    fields: Vec<FieldData>,
}

impl Program {
    /// Assemble a program from already indexed parts, checking that the indices line up
    pub(crate) fn from_parts(
        methods: Vec<MethodData>,
        instructions: Vec<InstructionData>,
        fields: Vec<FieldData>,
    ) -> Result<Program, Error> {
        for (idx, method) in methods.iter().enumerate() {
            let well_formed = method.id.0 as usize == idx
                && method.instructions.len() >= 3
                && method
                    .instructions
                    .windows(2)
                    .all(|pair| pair[1].0 == pair[0].0 + 1)
                && method
                    .instructions
                    .iter()
                    .all(|instr| (instr.0 as usize) < instructions.len());
            if !well_formed {
                return Err(Error::MalformedMethod(method.id));
            }
        }
        for (idx, instruction) in instructions.iter().enumerate() {
            let owner = methods
                .get(instruction.method.0 as usize)
                .filter(|method| method.position_of(InstrId(idx as u32)).is_some());
            let owner = match owner {
                Some(owner) if instruction.id.0 as usize == idx => owner,
                _ => return Err(Error::OrphanInstruction(InstrId(idx as u32))),
            };
            for target in instruction.opcode.jump_targets() {
                if owner.position_of(target).is_none() {
                    return Err(Error::DanglingTarget {
                        instruction: instruction.id,
                        target,
                    });
                }
            }
        }
        Ok(Program {
            methods,
            instructions,
            fields,
        })
    }

    pub fn methods(&self) -> &[MethodData] {
        &self.methods
    }

    pub fn instructions(&self) -> &[InstructionData] {
        &self.instructions
    }

    pub fn fields(&self) -> &[FieldData] {
        &self.fields
    }

    pub fn method(&self, id: MethodId) -> &MethodData {
        &self.methods[id.0 as usize]
    }

    pub fn instruction(&self, id: InstrId) -> &InstructionData {
        &self.instructions[id.0 as usize]
    }

    pub fn field(&self, id: FieldId) -> &FieldData {
        &self.fields[id.0 as usize]
    }

    pub fn get_method(&self, id: MethodId) -> Option<&MethodData> {
        self.methods.get(id.0 as usize)
    }

    pub fn get_instruction(&self, id: InstrId) -> Option<&InstructionData> {
        self.instructions.get(id.0 as usize)
    }

    /// Look up a method by class and method name
    ///
    /// If the name is overloaded, the first declared method wins.
    pub fn find_method(&self, class_name: &str, name: &str) -> Option<&MethodData> {
        self.methods
            .iter()
            .find(|method| method.class_name == class_name && method.name == name)
    }

    /// Total order on instructions: owning class, then source line, then index
    pub fn instruction_order(&self, a: InstrId, b: InstrId) -> Ordering {
        let instr_a = self.instruction(a);
        let instr_b = self.instruction(b);
        self.method(instr_a.method)
            .class_name
            .cmp(&self.method(instr_b.method).class_name)
            .then(instr_a.line.cmp(&instr_b.line))
            .then(a.cmp(&b))
    }

    /// Human readable rendering of an instruction (with its method and line)
    pub fn display(&self, id: InstrId) -> InstructionDisplay<'_> {
        InstructionDisplay { program: self, id }
    }
}

pub struct InstructionDisplay<'p> {
    program: &'p Program,
    id: InstrId,
}

impl<'p> fmt::Display for InstructionDisplay<'p> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let instruction = self.program.instruction(self.id);
        let method = self.program.method(instruction.method);
        write!(f, "{}.{}", method.class_name, method.name)?;
        if let Some(line) = instruction.line {
            write!(f, ":{}", line)?;
        }
        write!(f, " {}", instruction.opcode)
    }
}
