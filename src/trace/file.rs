use super::binary_format::{read_sequence, write_sequence, Deserialize, Serialize};
use super::{Error, PlainSequence, ThreadTrace};
use crate::program::*;
use byteorder::{ReadBytesExt, WriteBytesExt};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

/// Program together with the recorded threads that executed it
///
/// The on-disk layout is big-endian:
///
///   - the magic bytes `DSLT` and a `u16` format version
///   - the fields, the methods, and the instructions (opcodes are `u8` tagged)
///   - the threads, whose instruction and value sequences are zig-zag LEB128 encoded
///
#[derive(Clone, Debug, Default)]
pub struct TraceFile {
    pub program: Program,
    pub threads: Vec<ThreadTrace>,
}

impl TraceFile {
    /// Magic header bytes that go at the front of a serialized trace
    const MAGIC: [u8; 4] = *b"DSLT";

    const VERSION: u16 = 1;

    pub fn new(program: Program, threads: Vec<ThreadTrace>) -> TraceFile {
        TraceFile { program, threads }
    }

    pub fn read_from<R: ReadBytesExt>(reader: &mut R) -> Result<TraceFile, Error> {
        let mut magic = [0; 4];
        reader.read_exact(&mut magic)?;
        if magic != TraceFile::MAGIC {
            return Err(Error::BadMagic);
        }
        let version = u16::deserialize(reader)?;
        if version != TraceFile::VERSION {
            return Err(Error::UnsupportedVersion(version));
        }

        let fields = Vec::<FieldData>::deserialize(reader)?;
        let mut methods = Vec::<MethodData>::deserialize(reader)?;
        for (idx, method) in methods.iter_mut().enumerate() {
            method.id = MethodId(idx as u32);
        }
        let instruction_count = u32::deserialize(reader)?;
        let mut instructions = Vec::with_capacity((instruction_count as usize).min(1 << 16));
        for idx in 0..instruction_count {
            let method = MethodId(u32::deserialize(reader)?);
            if method.0 as usize >= methods.len() {
                return Err(Error::UnknownMethod(method.0));
            }
            instructions.push(InstructionData {
                id: InstrId(idx),
                method,
                line: Option::<u32>::deserialize(reader)?,
                opcode: Opcode::deserialize(reader)?,
            });
        }
        let program = Program::from_parts(methods, instructions, fields)?;

        let threads = Vec::<ThreadTrace>::deserialize(reader)?;
        for thread in &threads {
            if let Some(method) = thread
                .initial_stack
                .iter()
                .find(|method| program.get_method(**method).is_none())
            {
                return Err(Error::UnknownMethod(method.0));
            }
        }
        log::debug!(
            "Read trace with {} methods, {} instructions, and {} threads",
            program.methods().len(),
            program.instructions().len(),
            threads.len()
        );

        Ok(TraceFile { program, threads })
    }

    pub fn write_to<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        writer.write_all(&TraceFile::MAGIC)?;
        TraceFile::VERSION.serialize(writer)?;
        self.program.fields().to_vec().serialize(writer)?;
        self.program.methods().to_vec().serialize(writer)?;
        (self.program.instructions().len() as u32).serialize(writer)?;
        for instruction in self.program.instructions() {
            instruction.method.0.serialize(writer)?;
            instruction.line.serialize(writer)?;
            instruction.opcode.serialize(writer)?;
        }
        (self.threads.len() as u32).serialize(writer)?;
        for thread in &self.threads {
            thread.serialize(writer)?;
        }
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<TraceFile, Error> {
        let mut reader = BufReader::new(File::open(path)?);
        TraceFile::read_from(&mut reader)
    }

    pub fn save_to_path(&self, path: impl AsRef<Path>) -> std::io::Result<()> {
        let mut writer = BufWriter::new(File::create(path)?);
        self.write_to(&mut writer)?;
        writer.flush()
    }

    /// Find a thread by numeric identifier or by name
    pub fn thread(&self, selector: &str) -> Result<&ThreadTrace, Error> {
        let by_id = selector.parse::<u64>().ok();
        self.threads
            .iter()
            .find(|thread| Some(thread.id) == by_id)
            .or_else(|| self.threads.iter().find(|thread| thread.name == selector))
            .ok_or_else(|| Error::UnknownThread(selector.to_string()))
    }

    /// First recorded thread (usually the main thread)
    pub fn main_thread(&self) -> Result<&ThreadTrace, Error> {
        self.threads
            .first()
            .ok_or_else(|| Error::UnknownThread("<main>".to_string()))
    }
}

impl Serialize for ThreadTrace {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.id.serialize(writer)?;
        self.name.serialize(writer)?;
        self.initial_stack
            .iter()
            .map(|method| method.0)
            .collect::<Vec<u32>>()
            .serialize(writer)?;
        let instructions = self.instructions.as_slice();
        write_sequence(writer, instructions.iter().map(|idx| *idx as i64))?;
        write_sequence(writer, self.values.as_slice().iter().copied())?;
        Ok(())
    }
}

impl Deserialize for ThreadTrace {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> Result<Self, Error> {
        let id = u64::deserialize(reader)?;
        let name = String::deserialize(reader)?;
        let initial_stack = Vec::<u32>::deserialize(reader)?
            .into_iter()
            .map(MethodId)
            .collect();
        let instructions = read_sequence(reader)?
            .into_iter()
            .map(|idx| i32::try_from(idx).map_err(|_| Error::UnknownInstruction(idx as u32)))
            .collect::<Result<Vec<i32>, Error>>()?;
        let values = read_sequence(reader)?;
        Ok(ThreadTrace {
            id,
            name,
            instructions: PlainSequence::from(instructions),
            values: PlainSequence::from(values),
            initial_stack,
        })
    }
}

impl Serialize for FieldData {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.class_name.serialize(writer)?;
        self.name.serialize(writer)
    }
}

impl Deserialize for FieldData {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> Result<Self, Error> {
        Ok(FieldData {
            class_name: String::deserialize(reader)?,
            name: String::deserialize(reader)?,
        })
    }
}

impl Serialize for LocalVariable {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.name.serialize(writer)?;
        self.slot.serialize(writer)?;
        match self.scope {
            None => writer.write_u8(0),
            Some((start, end)) => {
                writer.write_u8(1)?;
                start.0.serialize(writer)?;
                end.0.serialize(writer)
            }
        }
    }
}

impl Deserialize for LocalVariable {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> Result<Self, Error> {
        let name = String::deserialize(reader)?;
        let slot = u16::deserialize(reader)?;
        let scope = match reader.read_u8()? {
            0 => None,
            1 => Some((read_target(reader)?, read_target(reader)?)),
            tag => return Err(Error::InvalidTag { what: "scope", tag }),
        };
        Ok(LocalVariable { name, slot, scope })
    }
}

impl Serialize for ExceptionHandler {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.start.0.serialize(writer)?;
        self.end.0.serialize(writer)?;
        self.handler.0.serialize(writer)
    }
}

impl Deserialize for ExceptionHandler {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> Result<Self, Error> {
        Ok(ExceptionHandler {
            start: read_target(reader)?,
            end: read_target(reader)?,
            handler: read_target(reader)?,
        })
    }
}

/// Instructions are stored as the first index and a count (they are contiguous)
impl Serialize for MethodData {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.class_name.serialize(writer)?;
        self.name.serialize(writer)?;
        self.argument_slots.serialize(writer)?;
        self.returns_value.serialize(writer)?;
        self.is_static.serialize(writer)?;
        self.instructions
            .first()
            .map_or(0, |first| first.0)
            .serialize(writer)?;
        (self.instructions.len() as u32).serialize(writer)?;
        self.local_variables.serialize(writer)?;
        self.exception_handlers.serialize(writer)
    }
}

impl Deserialize for MethodData {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> Result<Self, Error> {
        let class_name = String::deserialize(reader)?;
        let name = String::deserialize(reader)?;
        let argument_slots = u16::deserialize(reader)?;
        let returns_value = bool::deserialize(reader)?;
        let is_static = bool::deserialize(reader)?;
        let first = u32::deserialize(reader)?;
        let count = u32::deserialize(reader)?;
        let end = first.checked_add(count).ok_or(Error::UnknownInstruction(first))?;
        Ok(MethodData {
            // Fixed up by the caller, which knows the position of the method
            id: MethodId(0),
            class_name,
            name,
            argument_slots,
            returns_value,
            is_static,
            instructions: (first..end).map(InstrId).collect(),
            local_variables: Vec::deserialize(reader)?,
            exception_handlers: Vec::deserialize(reader)?,
        })
    }
}

fn read_target<R: ReadBytesExt>(reader: &mut R) -> Result<InstrId, Error> {
    Ok(InstrId(u32::deserialize(reader)?))
}

fn read_field<R: ReadBytesExt>(reader: &mut R) -> Result<FieldId, Error> {
    Ok(FieldId(u32::deserialize(reader)?))
}

fn label_kind_tag(kind: LabelKind) -> u8 {
    match kind {
        LabelKind::Plain => 0,
        LabelKind::MethodEntry => 1,
        LabelKind::MethodLeave => 2,
        LabelKind::AbnormalTermination => 3,
        LabelKind::CatchBlock => 4,
    }
}

fn label_kind_from_tag(tag: u8) -> Result<LabelKind, Error> {
    Ok(match tag {
        0 => LabelKind::Plain,
        1 => LabelKind::MethodEntry,
        2 => LabelKind::MethodLeave,
        3 => LabelKind::AbnormalTermination,
        4 => LabelKind::CatchBlock,
        _ => return Err(Error::InvalidTag { what: "label", tag }),
    })
}

const BINARY_OPS: [BinaryOp; 12] = [
    BinaryOp::Add,
    BinaryOp::Sub,
    BinaryOp::Mul,
    BinaryOp::Div,
    BinaryOp::Rem,
    BinaryOp::And,
    BinaryOp::Or,
    BinaryOp::Xor,
    BinaryOp::Shl,
    BinaryOp::Shr,
    BinaryOp::UShr,
    BinaryOp::Compare,
];

const UNARY_OPS: [UnaryOp; 2] = [UnaryOp::Neg, UnaryOp::Convert];

const CONDITIONS: [Condition; 8] = [
    Condition::Eq,
    Condition::Ne,
    Condition::Lt,
    Condition::Ge,
    Condition::Gt,
    Condition::Le,
    Condition::Null,
    Condition::NonNull,
];

const INVOKE_KINDS: [InvokeKind; 4] = [
    InvokeKind::Virtual,
    InvokeKind::Special,
    InvokeKind::Static,
    InvokeKind::Interface,
];

/// Tag of a fieldless enum variant is its position in the table
fn tag_of<T: PartialEq>(table: &[T], value: &T) -> u8 {
    table.iter().position(|entry| entry == value).unwrap_or(0) as u8
}

fn from_tag<T: Copy, R: ReadBytesExt>(
    table: &[T],
    what: &'static str,
    reader: &mut R,
) -> Result<T, Error> {
    let tag = reader.read_u8()?;
    table
        .get(tag as usize)
        .copied()
        .ok_or(Error::InvalidTag { what, tag })
}

impl Serialize for Opcode {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        match self {
            Opcode::Nop => writer.write_u8(0),
            Opcode::Label(kind) => {
                writer.write_u8(1)?;
                writer.write_u8(label_kind_tag(*kind))
            }
            Opcode::Const(value) => {
                writer.write_u8(2)?;
                value.serialize(writer)
            }
            Opcode::Load(slot) => {
                writer.write_u8(3)?;
                slot.serialize(writer)
            }
            Opcode::Store(slot) => {
                writer.write_u8(4)?;
                slot.serialize(writer)
            }
            Opcode::IInc(slot, delta) => {
                writer.write_u8(5)?;
                slot.serialize(writer)?;
                delta.serialize(writer)
            }
            Opcode::ArrayLoad => writer.write_u8(6),
            Opcode::ArrayStore => writer.write_u8(7),
            Opcode::ArrayLength => writer.write_u8(8),
            Opcode::GetField(field) => {
                writer.write_u8(9)?;
                field.0.serialize(writer)
            }
            Opcode::PutField(field) => {
                writer.write_u8(10)?;
                field.0.serialize(writer)
            }
            Opcode::GetStatic(field) => {
                writer.write_u8(11)?;
                field.0.serialize(writer)
            }
            Opcode::PutStatic(field) => {
                writer.write_u8(12)?;
                field.0.serialize(writer)
            }
            Opcode::Binary(op) => {
                writer.write_u8(13)?;
                writer.write_u8(tag_of(&BINARY_OPS, op))
            }
            Opcode::Unary(op) => {
                writer.write_u8(14)?;
                writer.write_u8(tag_of(&UNARY_OPS, op))
            }
            Opcode::Pop => writer.write_u8(15),
            Opcode::Dup => writer.write_u8(16),
            Opcode::Goto(target) => {
                writer.write_u8(17)?;
                target.0.serialize(writer)
            }
            Opcode::If(condition, target) => {
                writer.write_u8(18)?;
                writer.write_u8(tag_of(&CONDITIONS, condition))?;
                target.0.serialize(writer)
            }
            Opcode::IfCmp(condition, target) => {
                writer.write_u8(19)?;
                writer.write_u8(tag_of(&CONDITIONS, condition))?;
                target.0.serialize(writer)
            }
            Opcode::Switch { targets, default } => {
                writer.write_u8(20)?;
                targets
                    .iter()
                    .map(|target| target.0)
                    .collect::<Vec<u32>>()
                    .serialize(writer)?;
                default.0.serialize(writer)
            }
            Opcode::Invoke(kind, callee) => {
                writer.write_u8(21)?;
                writer.write_u8(tag_of(&INVOKE_KINDS, kind))?;
                callee.class_name.serialize(writer)?;
                callee.name.serialize(writer)?;
                callee.argument_slots.serialize(writer)?;
                callee.returns_value.serialize(writer)
            }
            Opcode::Return(value) => {
                writer.write_u8(22)?;
                value.serialize(writer)
            }
            Opcode::Throw => writer.write_u8(23),
            Opcode::New(class) => {
                writer.write_u8(24)?;
                class.serialize(writer)
            }
            Opcode::NewArray => writer.write_u8(25),
            Opcode::CheckCast(class) => {
                writer.write_u8(26)?;
                class.serialize(writer)
            }
            Opcode::InstanceOf(class) => {
                writer.write_u8(27)?;
                class.serialize(writer)
            }
        }
    }
}

impl Deserialize for Opcode {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> Result<Self, Error> {
        let opcode = match reader.read_u8()? {
            0 => Opcode::Nop,
            1 => Opcode::Label(label_kind_from_tag(reader.read_u8()?)?),
            2 => Opcode::Const(i64::deserialize(reader)?),
            3 => Opcode::Load(u16::deserialize(reader)?),
            4 => Opcode::Store(u16::deserialize(reader)?),
            5 => Opcode::IInc(u16::deserialize(reader)?, i16::deserialize(reader)?),
            6 => Opcode::ArrayLoad,
            7 => Opcode::ArrayStore,
            8 => Opcode::ArrayLength,
            9 => Opcode::GetField(read_field(reader)?),
            10 => Opcode::PutField(read_field(reader)?),
            11 => Opcode::GetStatic(read_field(reader)?),
            12 => Opcode::PutStatic(read_field(reader)?),
            13 => Opcode::Binary(from_tag(&BINARY_OPS, "binary operator", reader)?),
            14 => Opcode::Unary(from_tag(&UNARY_OPS, "unary operator", reader)?),
            15 => Opcode::Pop,
            16 => Opcode::Dup,
            17 => Opcode::Goto(read_target(reader)?),
            18 => {
                let condition = from_tag(&CONDITIONS, "condition", reader)?;
                Opcode::If(condition, read_target(reader)?)
            }
            19 => {
                let condition = from_tag(&CONDITIONS, "condition", reader)?;
                Opcode::IfCmp(condition, read_target(reader)?)
            }
            20 => Opcode::Switch {
                targets: Vec::<u32>::deserialize(reader)?
                    .into_iter()
                    .map(InstrId)
                    .collect(),
                default: read_target(reader)?,
            },
            21 => {
                let kind = from_tag(&INVOKE_KINDS, "invoke kind", reader)?;
                Opcode::Invoke(
                    kind,
                    CalleeRef {
                        class_name: String::deserialize(reader)?,
                        name: String::deserialize(reader)?,
                        argument_slots: u16::deserialize(reader)?,
                        returns_value: bool::deserialize(reader)?,
                    },
                )
            }
            22 => Opcode::Return(bool::deserialize(reader)?),
            23 => Opcode::Throw,
            24 => Opcode::New(String::deserialize(reader)?),
            25 => Opcode::NewArray,
            26 => Opcode::CheckCast(String::deserialize(reader)?),
            27 => Opcode::InstanceOf(String::deserialize(reader)?),
            tag => return Err(Error::InvalidTag { what: "opcode", tag }),
        };
        Ok(opcode)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::trace::ThreadTraceBuilder;

    fn sample() -> TraceFile {
        let mut builder = ProgramBuilder::new();
        let field = builder.add_field("Point", "x");
        let mut method = builder.method("Point", "shift", 2, false, false);
        method.local("this", 0).local("dx", 1).line(3);
        let skip = method.fresh_label();
        method.push(Opcode::Load(1));
        method.branch(Condition::Le, skip);
        method.push(Opcode::Load(0));
        method.push(Opcode::Dup);
        method.push(Opcode::GetField(field));
        method.push(Opcode::Load(1));
        method.push(Opcode::Binary(BinaryOp::Add));
        method.push(Opcode::PutField(field));
        method.place(skip);
        method.push(Opcode::Return(false));
        let id = method.finish().unwrap();
        let program = builder.finish();

        let code = program.method(id).instructions.clone();
        let mut thread = ThreadTraceBuilder::new(7, "worker");
        thread
            .with_initial_stack(vec![id])
            .execute_all(&code[0..5])
            .execute_with(code[5], &[-3])
            .execute_all(&code[6..8])
            .execute_with(code[8], &[-3])
            .execute_all(&code[9..11]);
        TraceFile::new(program, vec![thread.finish()])
    }

    #[test]
    fn write_then_read() {
        let original = sample();
        let mut bytes = vec![];
        original.write_to(&mut bytes).unwrap();
        assert_eq!(&bytes[0..4], b"DSLT");

        let decoded = TraceFile::read_from(&mut bytes.as_slice()).unwrap();
        assert_eq!(decoded.threads, original.threads);
        assert_eq!(decoded.program.methods(), original.program.methods());
        assert_eq!(decoded.program.instructions(), original.program.instructions());
        assert_eq!(decoded.program.fields(), original.program.fields());
    }

    #[test]
    fn thread_selection() {
        let file = sample();
        assert_eq!(file.thread("7").unwrap().name, "worker");
        assert_eq!(file.thread("worker").unwrap().id, 7);
        assert!(matches!(file.thread("main"), Err(Error::UnknownThread(_))));
        assert_eq!(file.main_thread().unwrap().id, 7);
    }

    #[test]
    fn rejects_foreign_files() {
        let mut bytes: &[u8] = b"\xCA\xFE\xBA\xBE\x00\x01";
        assert!(matches!(TraceFile::read_from(&mut bytes), Err(Error::BadMagic)));

        let mut bytes: &[u8] = b"DSLT\x00\x09";
        assert!(matches!(
            TraceFile::read_from(&mut bytes),
            Err(Error::UnsupportedVersion(9))
        ));

        let mut bytes: &[u8] = b"DSLT\x00";
        assert!(matches!(
            TraceFile::read_from(&mut bytes),
            Err(Error::UnexpectedEof)
        ));
    }
}
