//! Intra-procedural control dependences
//!
//! Control dependences are computed the textbook way: build the method's CFG with a virtual
//! exit node, compute the post-dominator tree, then for every edge `A -> B` where `B` does not
//! post-dominate `A`, every node on the post-dominator tree path from `B` up to (but excluding)
//! the immediate post-dominator of `A` is control dependent on `A`.
//!
//! The dependence extractor consumes the _inverse_ relation: while replaying a trace backwards,
//! the dependent instructions are seen first and the branch deciding whether they run is seen
//! later. So the table maps each branch to the instructions depending on it.

use super::{InstrId, LabelKind, MethodId, Opcode, Program};
use std::collections::HashMap;

/// Node indices in a method CFG: instructions come first (by position in the method), followed
/// by the virtual exit and the virtual entry.
struct MethodCfg {
    successors: Vec<Vec<usize>>,
    predecessors: Vec<Vec<usize>>,
    exit: usize,
}

impl MethodCfg {
    fn build(program: &Program, method: MethodId) -> MethodCfg {
        let method = program.method(method);
        let len = method.instructions.len();
        let exit = len;
        let entry = len + 1;
        let position = |id: InstrId| method.position_of(id);

        let mut successors: Vec<Vec<usize>> = vec![vec![]; len + 2];
        for (pos, id) in method.instructions.iter().enumerate() {
            let opcode = &program.instruction(*id).opcode;
            let succs = &mut successors[pos];
            match opcode {
                Opcode::Return(_)
                | Opcode::Throw
                | Opcode::Label(LabelKind::MethodLeave)
                | Opcode::Label(LabelKind::AbnormalTermination) => succs.push(exit),
                _ => {
                    for target in opcode.jump_targets() {
                        if let Some(target) = position(target) {
                            succs.push(target);
                        }
                    }
                    if !opcode.ends_flow() {
                        succs.push(if pos + 1 < len { pos + 1 } else { exit });
                    }
                }
            }
            succs.sort_unstable();
            succs.dedup();
        }

        // Handlers are entered from the virtual entry: exceptional edges would otherwise make
        // every potentially throwing instruction a branch.
        successors[entry].push(0);
        for handler in &method.exception_handlers {
            if let Some(handler) = position(handler.handler) {
                successors[entry].push(handler);
            }
        }
        successors[entry].push(exit);

        let mut predecessors: Vec<Vec<usize>> = vec![vec![]; len + 2];
        for (node, succs) in successors.iter().enumerate() {
            for succ in succs {
                predecessors[*succ].push(node);
            }
        }

        MethodCfg {
            successors,
            predecessors,
            exit,
        }
    }

    /// Immediate post-dominators (`None` for nodes that can't reach the exit)
    ///
    /// This is the Cooper-Harvey-Kennedy iterative algorithm run on the reversed CFG.
    fn immediate_post_dominators(&self) -> Vec<Option<usize>> {
        let node_count = self.successors.len();

        // Post-order of the reversed graph, starting at the exit
        let mut postorder = Vec::with_capacity(node_count);
        let mut visited = vec![false; node_count];
        let mut stack = vec![(self.exit, 0)];
        visited[self.exit] = true;
        while let Some((node, next_child)) = stack.pop() {
            if let Some(&child) = self.predecessors[node].get(next_child) {
                stack.push((node, next_child + 1));
                if !visited[child] {
                    visited[child] = true;
                    stack.push((child, 0));
                }
            } else {
                postorder.push(node);
            }
        }

        let mut order = vec![usize::MAX; node_count];
        for (idx, node) in postorder.iter().enumerate() {
            order[*node] = idx;
        }

        let mut ipdom: Vec<Option<usize>> = vec![None; node_count];
        ipdom[self.exit] = Some(self.exit);

        let intersect = |ipdom: &[Option<usize>], mut a: usize, mut b: usize| -> usize {
            while a != b {
                while order[a] < order[b] {
                    a = ipdom[a].unwrap_or(self.exit);
                }
                while order[b] < order[a] {
                    b = ipdom[b].unwrap_or(self.exit);
                }
            }
            a
        };

        let mut changed = true;
        while changed {
            changed = false;
            for &node in postorder.iter().rev() {
                if node == self.exit {
                    continue;
                }
                let mut new_ipdom: Option<usize> = None;
                for &succ in &self.successors[node] {
                    if ipdom[succ].is_none() {
                        continue;
                    }
                    new_ipdom = Some(match new_ipdom {
                        None => succ,
                        Some(current) => intersect(&ipdom, succ, current),
                    });
                }
                if new_ipdom.is_some() && ipdom[node] != new_ipdom {
                    ipdom[node] = new_ipdom;
                    changed = true;
                }
            }
        }

        ipdom[self.exit] = None;
        ipdom
    }
}

/// For every branch in the method, the (sorted) instructions control dependent on it
pub fn inverse_control_dependences(
    program: &Program,
    method: MethodId,
) -> HashMap<InstrId, Vec<InstrId>> {
    let cfg = MethodCfg::build(program, method);
    let ipdom = cfg.immediate_post_dominators();
    let instructions = &program.method(method).instructions;

    let mut dependents: HashMap<InstrId, Vec<InstrId>> = HashMap::new();
    for (node, succs) in cfg.successors.iter().enumerate().take(instructions.len()) {
        if succs.len() < 2 {
            continue;
        }
        let stop = ipdom[node];
        for &succ in succs {
            let mut runner = Some(succ);
            while let Some(current) = runner {
                if Some(current) == stop || current >= instructions.len() {
                    break;
                }
                dependents
                    .entry(instructions[node])
                    .or_default()
                    .push(instructions[current]);
                runner = ipdom[current];
            }
        }
    }

    for deps in dependents.values_mut() {
        deps.sort_unstable();
        deps.dedup();
    }
    dependents
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::program::{Condition, ProgramBuilder};

    #[test]
    fn if_then_else() {
        // if (x < 0) y = 1; else y = 2; return y;
        let mut builder = ProgramBuilder::new();
        let mut method = builder.method("Cond", "pick", 1, true, true);
        let otherwise = method.fresh_label();
        let join = method.fresh_label();
        method.push(Opcode::Load(0));
        let branch = method.branch(Condition::Ge, otherwise);
        let then_const = method.push(Opcode::Const(1));
        let then_store = method.push(Opcode::Store(1));
        let skip = method.goto(join);
        let else_label = method.place(otherwise);
        let else_const = method.push(Opcode::Const(2));
        let else_store = method.push(Opcode::Store(1));
        method.place(join);
        method.push(Opcode::Load(1));
        method.push(Opcode::Return(true));
        let id = method.finish().unwrap();
        let program = builder.finish();

        let deps = inverse_control_dependences(&program, id);
        assert_eq!(deps.len(), 1, "only the conditional is a control dependence source");
        assert_eq!(
            deps[&branch],
            vec![then_const, then_store, skip, else_label, else_const, else_store]
        );
    }

    #[test]
    fn loop_header_depends_on_itself() {
        // while (i != 0) i--;
        let mut builder = ProgramBuilder::new();
        let mut method = builder.method("Loop", "count", 1, false, true);
        let top = method.fresh_label();
        let done = method.fresh_label();
        let top_label = method.place(top);
        let load = method.push(Opcode::Load(0));
        let branch = method.branch(Condition::Eq, done);
        let dec = method.push(Opcode::IInc(0, -1));
        let back = method.goto(top);
        method.place(done);
        method.push(Opcode::Return(false));
        let id = method.finish().unwrap();
        let program = builder.finish();

        let deps = inverse_control_dependences(&program, id);
        assert_eq!(deps[&branch], vec![top_label, load, branch, dec, back]);
    }

    #[test]
    fn straight_line_code_has_no_dependences() {
        let mut builder = ProgramBuilder::new();
        let mut method = builder.method("Line", "run", 0, false, true);
        method.push(Opcode::Const(1));
        method.push(Opcode::Pop);
        method.push(Opcode::Return(false));
        let id = method.finish().unwrap();
        let program = builder.finish();

        assert!(inverse_control_dependences(&program, id).is_empty());
    }
}
