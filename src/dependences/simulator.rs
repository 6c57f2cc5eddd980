use super::{Error, ExecutionFrame, FrameStack, StorageLocation};
use crate::program::{LabelKind, Opcode, Program};
use crate::trace::{Instance, ObjectId, Payload};

/// What one instance did to storage
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DynamicInformation {
    pub defined: Vec<StorageLocation>,
    pub used: Vec<StorageLocation>,

    /// For each entry of `defined`, the used locations whose values flowed into it
    ///
    /// `None` means every defined location depends on every used location.
    pub used_for: Option<Vec<Vec<StorageLocation>>>,

    pub created_objects: Vec<ObjectId>,

    /// The instance is the start of an exception handler
    pub is_catch_block: bool,
}

impl DynamicInformation {
    /// Used locations whose values flowed into `location`
    pub fn used_for(&self, location: &StorageLocation) -> &[StorageLocation] {
        match &self.used_for {
            None => &self.used,
            Some(used_for) => self
                .defined
                .iter()
                .position(|defined| defined == location)
                .and_then(|idx| used_for.get(idx))
                .map(|used| used.as_slice())
                .unwrap_or(&[]),
        }
    }
}

/// Works out which locations an instance reads and writes
///
/// The simulator is given the frame stack after it has been synchronized with the instance, and
/// is responsible for keeping the operand stack heights of the frames up to date.
pub trait Simulator {
    fn simulate(
        &mut self,
        program: &Program,
        instance: &Instance,
        frames: &mut FrameStack,
    ) -> Result<DynamicInformation, Error>;
}

/// Simulates the operand stack of each frame, backwards
///
/// Every frame keeps the height of its operand stack just before the last seen instance (in
/// forward time). An instruction that pops `p` slots and pushes `q` slots then reads the `p`
/// slots below `height - q + p` and writes the `q` slots starting at the same point.
#[derive(Copy, Clone, Debug, Default)]
pub struct StackSimulator;

impl StackSimulator {
    pub fn new() -> StackSimulator {
        StackSimulator
    }
}

fn stack_slot(frame: &ExecutionFrame, index: i32) -> StorageLocation {
    StorageLocation::StackSlot {
        frame: frame.id,
        index,
    }
}

fn local(frame: &ExecutionFrame, slot: u16) -> StorageLocation {
    StorageLocation::Local {
        frame: frame.id,
        slot,
    }
}

/// Apply a stack effect to the frame, returning the slots read and the slots written
fn apply_stack_effect(
    frame: &mut ExecutionFrame,
    pops: u16,
    pushes: u16,
) -> (Vec<StorageLocation>, Vec<StorageLocation>) {
    let before = frame.operand_stack - pushes as i32 + pops as i32;
    let base = before - pops as i32;
    let used = (base..before).map(|idx| stack_slot(frame, idx)).collect();
    let defined = (base..base + pushes as i32)
        .map(|idx| stack_slot(frame, idx))
        .collect();
    frame.operand_stack = before;
    (used, defined)
}

impl Simulator for StackSimulator {
    fn simulate(
        &mut self,
        program: &Program,
        instance: &Instance,
        frames: &mut FrameStack,
    ) -> Result<DynamicInformation, Error> {
        let opcode = &program.instruction(instance.instruction).opcode;
        let simulation_error = |reason: &str| Error::Simulation {
            instruction: instance.instruction,
            reason: reason.to_string(),
        };
        let (frame, caller) = frames
            .top_and_caller_mut()
            .ok_or_else(|| simulation_error("no frame on the stack"))?;
        let returned_from_traced_callee = std::mem::take(&mut frame.returned_from_traced_callee);

        let mut info = DynamicInformation::default();

        // Calls and returns move values between frames
        match opcode {
            Opcode::Invoke(_, callee) if returned_from_traced_callee => {
                // The callee's entry label already read the arguments
                frame.operand_stack += callee.argument_slots as i32 - callee.returns_value as i32;
                return Ok(info);
            }
            Opcode::Label(LabelKind::MethodEntry) => {
                let method = program.method(instance.method);
                let params: Vec<StorageLocation> =
                    (0..method.argument_slots).map(|slot| local(frame, slot)).collect();
                match caller {
                    Some(caller) => {
                        let base = caller.operand_stack - method.returns_value as i32;
                        let args: Vec<StorageLocation> = (0..method.argument_slots as i32)
                            .map(|idx| stack_slot(caller, base + idx))
                            .collect();
                        info.used_for = Some(args.iter().map(|arg| vec![*arg]).collect());
                        info.used = args;
                    }
                    None => info.used_for = Some(vec![vec![]; params.len()]),
                }
                info.defined = params;
                return Ok(info);
            }
            Opcode::Return(true) => {
                let (used, _) = apply_stack_effect(frame, 1, 0);
                info.used = used;
                if let Some(caller) = caller {
                    info.defined.push(stack_slot(caller, caller.operand_stack - 1));
                }
                return Ok(info);
            }
            _ => (),
        }

        let (pops, pushes) = opcode.stack_effect();
        let (used, defined) = apply_stack_effect(frame, pops, pushes);
        info.used = used;
        info.defined = defined;

        let wrong_payload = || simulation_error("payload does not match the instruction");
        match opcode {
            Opcode::Load(slot) => info.used.push(local(frame, *slot)),
            Opcode::Store(slot) => info.defined.push(local(frame, *slot)),
            Opcode::IInc(slot, _) => {
                info.used.push(local(frame, *slot));
                info.defined.push(local(frame, *slot));
            }
            Opcode::ArrayLoad | Opcode::ArrayStore => match instance.payload {
                Payload::ArrayElement { array, index } => {
                    let element = StorageLocation::ArrayElement { array, index };
                    if let Opcode::ArrayLoad = opcode {
                        info.used.push(element);
                    } else {
                        info.defined.push(element);
                    }
                }
                _ => return Err(wrong_payload()),
            },
            Opcode::GetField(field) | Opcode::PutField(field) => match instance.payload {
                Payload::Object(object) => {
                    let location = StorageLocation::Field {
                        object,
                        field: *field,
                    };
                    if let Opcode::GetField(_) = opcode {
                        info.used.push(location);
                    } else {
                        info.defined.push(location);
                    }
                }
                _ => return Err(wrong_payload()),
            },
            Opcode::GetStatic(field) => info.used.push(StorageLocation::StaticField(*field)),
            Opcode::PutStatic(field) => info.defined.push(StorageLocation::StaticField(*field)),
            Opcode::New(_) | Opcode::NewArray => match instance.payload {
                Payload::Created(object) => info.created_objects.push(object),
                _ => return Err(wrong_payload()),
            },
            Opcode::Label(LabelKind::CatchBlock) => info.is_catch_block = true,
            _ => (),
        }

        Ok(info)
    }
}
