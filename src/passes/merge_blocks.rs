//! Redundant branch removal.
//!
//! Splices every pair of blocks connected by a sole edge: when a block
//! has exactly one successor and that successor has exactly one
//! predecessor, the trailing terminator is deleted, the successor's
//! instructions are reparented onto the block, its successor set is
//! transferred, and the emptied block is deleted. The walk then recurses
//! into the resulting successors.

use rustc_hash::FxHashSet;
use tracing::debug;

use crate::ir::func::{CodeId, Flow, InsnKind, IrFunction};

fn splice(func: &mut IrFunction, first: CodeId, second: CodeId) {
    // The trailing terminators of `first` all lead to `second`.
    while let Some(&last) = func.code(first).insns().last() {
        if matches!(
            func.insn(last).kind,
            InsnKind::Flow(Flow::Jump { .. } | Flow::Branch { .. })
        ) {
            func.delete_insn(last);
        } else {
            break;
        }
    }

    let moved = std::mem::take(&mut func.code_mut(second).insns);
    for &insn in &moved {
        func.insn_mut(insn).parent = first;
    }
    func.code_mut(first).insns.extend(moved);

    let succs = std::mem::take(&mut func.code_mut(second).succs);
    for &succ in &succs {
        func.code_mut(succ).preds.remove(&second);
        func.code_mut(succ).preds.insert(first);
    }
    func.code_mut(first).succs = succs;
    func.code_mut(second).preds.clear();
    func.delete_code(second);
}

fn walk(func: &mut IrFunction, code: CodeId, visited: &mut FxHashSet<CodeId>) -> bool {
    if !visited.insert(code) {
        return false;
    }
    let mut changed = false;
    loop {
        if func.code(code).succs().len() != 1 {
            break;
        }
        let succ = *func.code(code).succs().iter().next().unwrap();
        if succ == code || func.code(succ).preds().len() != 1 {
            break;
        }
        splice(func, code, succ);
        changed = true;
    }
    let succs: Vec<CodeId> = func.code(code).succs().iter().copied().collect();
    for succ in succs {
        changed |= walk(func, succ, visited);
    }
    changed
}

/// Returns whether any blocks were merged.
pub fn run(func: &mut IrFunction) -> bool {
    let mut visited = FxHashSet::default();
    let changed = walk(func, func.entry(), &mut visited);
    if changed {
        debug!(func = func.name(), "merged straight-line blocks");
    }
    changed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::func::Operand;
    use crate::ir::types::{Const, Prim, UnaryOp};

    #[test]
    fn splices_straight_line_chains() {
        let mut func = IrFunction::new("f", "entry", &[]);
        let entry = func.entry();
        let mid = func.create_code(Some("mid"));
        let tail = func.create_code(Some("tail"));
        let x = func.create_var(Prim::S32, Some("x"));
        func.add_jump(entry, mid);
        func.add_unary(mid, x, UnaryOp::Mov, Operand::Const(Const::int(Prim::S32, 3)));
        func.add_jump(mid, tail);
        func.add_return1(tail, Operand::Var(x));

        assert!(run(&mut func));
        assert!(!run(&mut func));
        assert_eq!(func.codes().count(), 1);
        assert_eq!(
            func.to_string(),
            "function %f\n\
             \x20   var s32 %x\n\
             code <entry>\n\
             \x20   mov %x, s32'0x00000003\n\
             \x20   return %x\n"
        );
    }

    #[test]
    fn keeps_blocks_with_multiple_predecessors() {
        let mut func = IrFunction::new("f", "entry", &[]);
        let entry = func.entry();
        let a = func.create_code(Some("a"));
        let b = func.create_code(Some("b"));
        let join = func.create_code(Some("join"));
        let c = func.create_var(Prim::Bool, Some("c"));
        func.add_undefined(entry, c);
        func.add_branch(entry, Operand::Var(c), a, b);
        func.add_jump(a, join);
        func.add_jump(b, join);
        func.add_return0(join);

        assert!(!run(&mut func));
        assert_eq!(func.codes().count(), 4);
    }

    #[test]
    fn does_not_splice_self_loops() {
        let mut func = IrFunction::new("f", "entry", &[]);
        let entry = func.entry();
        let spin = func.create_code(Some("spin"));
        func.add_jump(entry, spin);
        func.add_jump(spin, spin);

        // spin has two predecessors (entry and itself), so nothing
        // merges; the self edge must not splice spin into itself.
        assert!(!run(&mut func));
        assert_eq!(func.codes().count(), 2);
    }
}
