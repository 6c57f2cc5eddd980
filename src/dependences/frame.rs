use super::FrameId;
use crate::program::{InstrId, LabelKind, MethodId, Opcode, Program};
use crate::trace::Instance;
use std::collections::HashMap;

/// Reconstructed state of one call on the stack
#[derive(Debug)]
pub struct ExecutionFrame {
    pub id: FrameId,

    /// Owning method (unknown for frames that were never executed in the trace)
    pub method: Option<MethodId>,

    /// The method entry label was seen, so no further instance can belong to this call
    pub finished: bool,

    /// Control did not flow normally into the last seen instance (an exception was caught, or
    /// the frame was only inferred)
    pub interrupted_control_flow: bool,

    /// The method terminated by throwing, and the throwing instruction hasn't been seen yet
    pub throws: bool,

    /// Catch block label whose throwing instruction hasn't been seen yet
    pub at_catch_block_start: Option<Instance>,

    /// Instances still waiting to find the branch they are control dependent on
    pub interesting: HashMap<InstrId, Vec<Instance>>,

    /// Operand stack height before the last seen instance, relative to when the frame appeared
    pub operand_stack: i32,

    /// A traced callee was just popped, so its entry label already consumed the arguments
    pub returned_from_traced_callee: bool,
}

impl ExecutionFrame {
    fn new(id: FrameId, method: Option<MethodId>) -> ExecutionFrame {
        ExecutionFrame {
            id,
            method,
            finished: false,
            interrupted_control_flow: false,
            throws: false,
            at_catch_block_start: None,
            interesting: HashMap::new(),
            operand_stack: 0,
            returned_from_traced_callee: false,
        }
    }

    /// Frame that appears (going backwards) at `instance`, which left the method
    fn left_through(id: FrameId, instance: &Instance, opcode: &Opcode) -> ExecutionFrame {
        let mut frame = ExecutionFrame::new(id, Some(instance.method));
        if opcode.is_label_of(LabelKind::AbnormalTermination) {
            frame.throws = true;
            frame.interrupted_control_flow = true;
        }
        frame
    }

    /// Mark an instance as waiting for its control dependence
    pub fn add_interesting(&mut self, instance: Instance) {
        self.interesting
            .entry(instance.instruction)
            .or_default()
            .push(instance);
    }

    /// Remove all waiting instances (in the order they were added, per instruction)
    pub fn take_interesting(&mut self) -> Vec<Instance> {
        let mut instances: Vec<Instance> = self.interesting.drain().flat_map(|(_, v)| v).collect();
        instances.sort_unstable_by(|a, b| b.counter.cmp(&a.counter));
        instances
    }
}

/// Method boundary crossed while going backwards
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum FrameTransition {
    /// The frame at `depth` was popped: going backwards, this is where `method` was entered
    MethodEntry { method: MethodId, depth: u32 },

    /// A frame appeared at `depth`: going backwards, this is where `method` was left
    MethodLeave { method: MethodId, depth: u32 },
}

/// Frame removed from the stack, whose state the extractor still has to clean up
#[derive(Debug)]
pub struct DrainedFrame {
    pub frame: ExecutionFrame,

    /// The frame was replaced by one of a different method at the same depth (instead of
    /// returning to its caller)
    pub replaced: bool,
}

/// Stack of frames, kept in sync with the depths of backward instances
#[derive(Debug)]
pub struct FrameStack {
    frames: Vec<ExecutionFrame>,
    next_id: u64,
}

impl FrameStack {
    /// Start from the methods on the stack when the recording ended (outermost first)
    pub fn new(initial_methods: &[MethodId]) -> FrameStack {
        let mut stack = FrameStack {
            frames: vec![],
            next_id: 0,
        };
        for method in initial_methods {
            let mut frame = ExecutionFrame::new(stack.fresh_id(), Some(*method));
            frame.interrupted_control_flow = true;
            stack.frames.push(frame);
        }
        stack
    }

    fn fresh_id(&mut self) -> FrameId {
        let id = FrameId(self.next_id);
        self.next_id += 1;
        id
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn top(&self) -> Option<&ExecutionFrame> {
        self.frames.last()
    }

    pub fn top_mut(&mut self) -> Option<&mut ExecutionFrame> {
        self.frames.last_mut()
    }

    /// Top frame and the frame right below it
    pub fn top_and_caller_mut(
        &mut self,
    ) -> Option<(&mut ExecutionFrame, Option<&mut ExecutionFrame>)> {
        let (top, rest) = self.frames.split_last_mut()?;
        Some((top, rest.last_mut()))
    }

    /// Frames from the top of the stack down
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut ExecutionFrame> {
        self.frames.iter_mut().rev()
    }

    /// Bring the stack in sync with the next instance
    ///
    /// Method boundaries crossed are pushed onto `transitions` and frames removed from the
    /// stack onto `drained`.
    pub fn enter(
        &mut self,
        instance: &Instance,
        program: &Program,
        transitions: &mut Vec<FrameTransition>,
        drained: &mut Vec<DrainedFrame>,
    ) {
        let depth = instance.stack_depth.max(1) as usize;
        let opcode = &program.instruction(instance.instruction).opcode;

        debug_assert!(
            self.frames.len() <= depth + 1,
            "stack depth dropped by more than one"
        );
        while self.frames.len() > depth {
            let popped_depth = self.frames.len() as u32;
            if let Some(frame) = self.frames.pop() {
                if let Some(method) = frame.method {
                    transitions.push(FrameTransition::MethodEntry {
                        method,
                        depth: popped_depth,
                    });
                }
                if let Some(caller) = self.frames.last_mut() {
                    caller.returned_from_traced_callee = frame.method.is_some();
                }
                drained.push(DrainedFrame {
                    frame,
                    replaced: false,
                });
            }
        }

        if self.frames.len() + 1 < depth {
            log::debug!(
                "Stack depth jumped from {} to {} at {}: inferring intermediate frames",
                self.frames.len(),
                depth,
                instance
            );
        }
        while self.frames.len() < depth {
            let id = self.fresh_id();
            if self.frames.len() + 1 < depth {
                let mut frame = ExecutionFrame::new(id, None);
                frame.interrupted_control_flow = true;
                self.frames.push(frame);
                continue;
            }

            self.frames
                .push(ExecutionFrame::left_through(id, instance, opcode));
            transitions.push(FrameTransition::MethodLeave {
                method: instance.method,
                depth: depth as u32,
            });
        }

        let stale = match self.frames.last_mut() {
            Some(top) => match top.method {
                None => {
                    top.method = Some(instance.method);
                    false
                }
                Some(method) => method != instance.method || top.finished,
            },
            None => false,
        };
        if stale {
            // Untraced code in between (eg. native methods) hid a return and a call, or the
            // same method was called again from untraced code
            let id = self.fresh_id();
            let mut frame = ExecutionFrame::left_through(id, instance, opcode);
            if !opcode.is_label_of(LabelKind::MethodLeave) {
                frame.interrupted_control_flow = true;
            }
            if let Some(old) = self.frames.pop() {
                if let Some(method) = old.method {
                    transitions.push(FrameTransition::MethodEntry {
                        method,
                        depth: depth as u32,
                    });
                }
                transitions.push(FrameTransition::MethodLeave {
                    method: instance.method,
                    depth: depth as u32,
                });
                log::debug!(
                    "Method changed at depth {} without a call boundary at {}",
                    depth,
                    instance
                );
                drained.push(DrainedFrame {
                    frame: old,
                    replaced: true,
                });
            }
            self.frames.push(frame);
        }

        if opcode.is_label_of(LabelKind::MethodEntry) {
            if let Some(top) = self.frames.last_mut() {
                top.finished = true;
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::program::{Opcode, ProgramBuilder};
    use crate::trace::Payload;

    fn instance(program: &Program, instruction: InstrId, depth: u32, counter: u64) -> Instance {
        Instance {
            instruction,
            method: program.instruction(instruction).method,
            occurrence: 1,
            stack_depth: depth,
            counter,
            payload: Payload::None,
        }
    }

    fn two_methods() -> (Program, MethodId, MethodId) {
        let mut builder = ProgramBuilder::new();
        let mut outer = builder.method("Frames", "outer", 0, false, true);
        outer.push(Opcode::Nop);
        let outer = outer.finish().unwrap();
        let mut inner = builder.method("Frames", "inner", 0, false, true);
        inner.push(Opcode::Nop);
        let inner = inner.finish().unwrap();
        (builder.finish(), outer, inner)
    }

    #[test]
    fn push_then_pop() {
        let (program, outer, inner) = two_methods();
        let mut stack = FrameStack::new(&[outer]);
        let mut transitions = vec![];
        let mut drained = vec![];

        let leave = program.method(inner).leave_label();
        stack.enter(&instance(&program, leave, 2, 10), &program, &mut transitions, &mut drained);
        assert_eq!(
            transitions,
            vec![FrameTransition::MethodLeave {
                method: inner,
                depth: 2
            }]
        );
        assert_eq!(stack.depth(), 2);

        transitions.clear();
        let nop = program.method(outer).instructions[1];
        stack.enter(&instance(&program, nop, 1, 9), &program, &mut transitions, &mut drained);
        assert_eq!(
            transitions,
            vec![FrameTransition::MethodEntry {
                method: inner,
                depth: 2
            }]
        );
        assert_eq!(drained.len(), 1);
        assert!(!drained[0].replaced);
        assert!(stack.top().unwrap().returned_from_traced_callee);
        assert!(stack.top().unwrap().interrupted_control_flow);
    }

    #[test]
    fn abnormal_termination_marks_the_frame() {
        let (program, outer, inner) = two_methods();
        let mut stack = FrameStack::new(&[outer]);
        let abnormal = program.method(inner).abnormal_termination_label();
        stack.enter(&instance(&program, abnormal, 2, 3), &program, &mut vec![], &mut vec![]);
        let top = stack.top().unwrap();
        assert!(top.throws && top.interrupted_control_flow);
    }

    #[test]
    fn method_change_replaces_the_frame() {
        let (program, outer, inner) = two_methods();
        let mut stack = FrameStack::new(&[]);
        let mut transitions = vec![];
        let mut drained = vec![];

        let inner_nop = program.method(inner).instructions[1];
        let outer_nop = program.method(outer).instructions[1];
        stack.enter(&instance(&program, inner_nop, 1, 2), &program, &mut transitions, &mut drained);
        let first_id = stack.top().unwrap().id;
        transitions.clear();

        stack.enter(&instance(&program, outer_nop, 1, 1), &program, &mut transitions, &mut drained);
        assert_eq!(
            transitions,
            vec![
                FrameTransition::MethodEntry {
                    method: inner,
                    depth: 1
                },
                FrameTransition::MethodLeave {
                    method: outer,
                    depth: 1
                },
            ]
        );
        assert_eq!(drained.len(), 1);
        assert!(drained[0].replaced);
        assert_ne!(stack.top().unwrap().id, first_id);
        assert_eq!(stack.top().unwrap().method, Some(outer));
    }

    #[test]
    fn entered_frames_are_not_reused() {
        // `outer` runs twice at the top level, with untraced code in between
        let (program, outer, _) = two_methods();
        let method = program.method(outer);
        let (entry, nop, leave) = (method.entry_label(), method.instructions[1], method.leave_label());
        let mut stack = FrameStack::new(&[]);
        let mut transitions = vec![];
        let mut drained = vec![];

        stack.enter(&instance(&program, leave, 1, 6), &program, &mut transitions, &mut drained);
        stack.enter(&instance(&program, nop, 1, 5), &program, &mut transitions, &mut drained);
        stack.enter(&instance(&program, entry, 1, 4), &program, &mut transitions, &mut drained);
        let first_id = stack.top().unwrap().id;
        assert!(stack.top().unwrap().finished);
        transitions.clear();

        stack.enter(&instance(&program, leave, 1, 3), &program, &mut transitions, &mut drained);
        assert_eq!(
            transitions,
            vec![
                FrameTransition::MethodEntry {
                    method: outer,
                    depth: 1
                },
                FrameTransition::MethodLeave {
                    method: outer,
                    depth: 1
                },
            ]
        );
        assert_eq!(drained.len(), 1);
        assert!(drained[0].replaced);
        let top = stack.top().unwrap();
        assert_ne!(top.id, first_id);
        assert!(!top.finished);
        assert!(!top.interrupted_control_flow);
    }

    #[test]
    fn unknown_intermediate_frames() {
        let (program, outer, inner) = two_methods();
        let mut stack = FrameStack::new(&[outer]);
        let mut transitions = vec![];
        let leave = program.method(inner).leave_label();
        stack.enter(&instance(&program, leave, 3, 5), &program, &mut transitions, &mut vec![]);
        assert_eq!(stack.depth(), 3);
        assert_eq!(transitions.len(), 1);

        // Popping the unknown frame emits no entry event
        let mut drained = vec![];
        transitions.clear();
        let outer_nop = program.method(outer).instructions[1];
        stack.enter(&instance(&program, outer_nop, 2, 4), &program, &mut transitions, &mut drained);
        assert_eq!(
            transitions,
            vec![FrameTransition::MethodEntry {
                method: inner,
                depth: 3
            }]
        );
        // The unknown frame takes the method of the instance
        assert_eq!(stack.top().unwrap().method, Some(outer));
    }
}
