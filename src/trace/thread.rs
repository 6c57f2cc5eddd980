use super::{Error, Instance, ObjectId, Payload, PlainSequence, TraceSequence};
use crate::program::{InstrId, LabelKind, MethodId, Opcode, Program};

/// Recorded execution of one thread
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ThreadTrace {
    pub id: u64,
    pub name: String,

    /// Executed instruction indices, in forward order
    pub instructions: PlainSequence<i32>,

    /// Object identifiers and array indices consumed by executed instructions, in forward order
    pub values: PlainSequence<i64>,

    /// Methods already on the call stack (outermost first) when the recording ended
    ///
    /// This is only non-empty if the recording was cut off while some methods were still
    /// running.
    pub initial_stack: Vec<MethodId>,
}

impl ThreadTrace {
    /// Start reading the trace from its last instruction
    pub fn backward_iterator<'t>(&'t self, program: &'t Program) -> BackwardTraceIterator<'t> {
        BackwardTraceIterator::new(program, self)
    }
}

/// Records a thread forward, one executed instruction at a time
pub struct ThreadTraceBuilder {
    trace: ThreadTrace,
}

impl ThreadTraceBuilder {
    pub fn new(id: u64, name: impl Into<String>) -> ThreadTraceBuilder {
        ThreadTraceBuilder {
            trace: ThreadTrace {
                id,
                name: name.into(),
                ..ThreadTrace::default()
            },
        }
    }

    /// Record an instruction that consumes no traced values
    pub fn execute(&mut self, instruction: InstrId) -> &mut Self {
        self.trace.instructions.push(instruction.0 as i32);
        self
    }

    /// Record an instruction along with the values it consumes (see [`Opcode::traced_values`])
    pub fn execute_with(&mut self, instruction: InstrId, values: &[i64]) -> &mut Self {
        self.trace.instructions.push(instruction.0 as i32);
        for value in values {
            self.trace.values.push(*value);
        }
        self
    }

    /// Record several instructions that consume no traced values
    pub fn execute_all(&mut self, instructions: &[InstrId]) -> &mut Self {
        for instruction in instructions {
            self.execute(*instruction);
        }
        self
    }

    pub fn with_initial_stack(&mut self, methods: Vec<MethodId>) -> &mut Self {
        self.trace.initial_stack = methods;
        self
    }

    pub fn finish(self) -> ThreadTrace {
        self.trace
    }
}

/// Stream of dynamic instances in backward order
///
/// Iteration stops at the first error (corrupted traces are not recoverable).
pub trait BackwardInstanceIterator: Iterator<Item = Result<Instance, Error>> {
    /// Methods that were on the stack when the recording ended (outermost first)
    fn initial_stack_methods(&self) -> &[MethodId];

    /// Rough progress indicator, from `0.0` to `100.0`
    fn percentage_done(&self) -> f64;
}

/// Reads a [`ThreadTrace`] backwards, reconstructing stack depths from method labels
pub struct BackwardTraceIterator<'t> {
    program: &'t Program,
    instructions: Box<dyn Iterator<Item = i32> + Send + 't>,
    values: Box<dyn Iterator<Item = i64> + Send + 't>,
    initial_stack: &'t [MethodId],

    /// Total number of instructions in the trace
    total: u64,

    /// Number of instances produced so far
    consumed: u64,

    /// Stack depth after the previous instance
    depth: u32,

    /// Per-instruction occurrence counters
    occurrences: Vec<u64>,

    failed: bool,
}

impl<'t> BackwardTraceIterator<'t> {
    pub fn new(program: &'t Program, trace: &'t ThreadTrace) -> BackwardTraceIterator<'t> {
        BackwardTraceIterator {
            program,
            instructions: trace.instructions.backward_iterator(),
            values: trace.values.backward_iterator(),
            initial_stack: &trace.initial_stack,
            total: trace.instructions.len() as u64,
            consumed: 0,
            depth: trace.initial_stack.len() as u32,
            occurrences: vec![0; program.instructions().len()],
            failed: false,
        }
    }

    fn next_value(&mut self) -> Result<i64, Error> {
        self.values
            .next()
            .ok_or(Error::SequenceExhausted("value"))
    }

    /// Read the payload back to front
    fn read_payload(&mut self, opcode: &Opcode) -> Result<Payload, Error> {
        let payload = match opcode {
            Opcode::GetField(_) | Opcode::PutField(_) => {
                Payload::Object(ObjectId(self.next_value()?))
            }
            Opcode::ArrayLoad | Opcode::ArrayStore => {
                let index = self.next_value()?;
                let array = ObjectId(self.next_value()?);
                Payload::ArrayElement { array, index }
            }
            Opcode::New(_) | Opcode::NewArray => Payload::Created(ObjectId(self.next_value()?)),
            _ => Payload::None,
        };
        debug_assert_eq!(
            opcode.traced_values(),
            match payload {
                Payload::None => 0,
                Payload::ArrayElement { .. } => 2,
                _ => 1,
            }
        );
        Ok(payload)
    }

    fn read_instance(&mut self, raw: i32) -> Result<Instance, Error> {
        let program = self.program;
        let instruction = program
            .get_instruction(InstrId(raw as u32))
            .filter(|_| raw >= 0)
            .ok_or(Error::UnknownInstruction(raw as u32))?;
        let payload = self.read_payload(&instruction.opcode)?;

        let stack_depth = match instruction.opcode {
            Opcode::Label(LabelKind::MethodLeave)
            | Opcode::Label(LabelKind::AbnormalTermination) => {
                self.depth += 1;
                self.depth
            }
            Opcode::Label(LabelKind::MethodEntry) => {
                let depth = self.depth.max(1);
                self.depth = depth - 1;
                depth
            }
            _ => {
                if self.depth == 0 {
                    log::debug!(
                        "Instance of @{} seen outside of any frame, assuming depth 1",
                        raw
                    );
                    self.depth = 1;
                }
                self.depth
            }
        };

        let occurrence = &mut self.occurrences[instruction.id.0 as usize];
        *occurrence += 1;

        Ok(Instance {
            instruction: instruction.id,
            method: instruction.method,
            occurrence: *occurrence,
            stack_depth,
            counter: self.total - self.consumed,
            payload,
        })
    }
}

impl<'t> Iterator for BackwardTraceIterator<'t> {
    type Item = Result<Instance, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        let raw = self.instructions.next()?;
        let result = self.read_instance(raw);
        self.consumed += 1;
        if result.is_err() {
            self.failed = true;
        }
        Some(result)
    }
}

impl<'t> BackwardInstanceIterator for BackwardTraceIterator<'t> {
    fn initial_stack_methods(&self) -> &[MethodId] {
        self.initial_stack
    }

    fn percentage_done(&self) -> f64 {
        if self.total == 0 {
            100.0
        } else {
            100.0 * self.consumed as f64 / self.total as f64
        }
    }
}
