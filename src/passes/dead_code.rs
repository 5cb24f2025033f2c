//! Dead code elimination.
//!
//! Walks the CFG from the entry. Within a block, everything after the
//! first completed transfer (a jump, a return, or any branch) is dead and
//! deleted. A branch whose condition is a known constant is rewritten to
//! a jump to the surviving target, which cuts the other edge. Blocks the
//! walk never reaches are deleted afterwards, and the edge sets are
//! rebuilt. One round of cutting can expose more unreachable code, so the
//! pass repeats until nothing changes.

use rustc_hash::FxHashSet;
use tracing::debug;

use crate::ir::func::{CodeId, Flow, InsnKind, IrFunction, Operand};

fn walk(func: &mut IrFunction, code: CodeId, visited: &mut FxHashSet<CodeId>) -> bool {
    if !visited.insert(code) {
        return false;
    }
    let mut changed = false;
    let mut dead = false;
    let insns = func.code(code).insns().to_vec();
    for insn in insns {
        if !func.is_live_insn(insn) {
            continue;
        }
        if dead {
            func.delete_insn(insn);
            changed = true;
            continue;
        }
        match func.insn(insn).kind.clone() {
            InsnKind::Flow(Flow::Jump { target }) => {
                dead = true;
                changed |= walk(func, target, visited);
            }
            InsnKind::Flow(Flow::Return { .. }) => dead = true,
            InsnKind::Flow(Flow::Branch {
                cond: Operand::Const(c),
                then_target,
                else_target,
            }) => {
                // Bit 0 decides; the branch collapses to a jump.
                let target = if c.lo & 1 != 0 { then_target } else { else_target };
                func.rewrite_branch_to_jump(insn, target);
                changed = true;
                dead = true;
                changed |= walk(func, target, visited);
            }
            InsnKind::Flow(Flow::Branch {
                then_target,
                else_target,
                ..
            }) => {
                dead = true;
                changed |= walk(func, then_target, visited);
                changed |= walk(func, else_target, visited);
            }
            _ => {}
        }
    }
    changed
}

/// Returns whether any code was changed or removed.
pub fn run(func: &mut IrFunction) -> bool {
    let mut changed_any = false;
    loop {
        let mut visited = FxHashSet::default();
        let mut changed = walk(func, func.entry(), &mut visited);

        let codes: Vec<CodeId> = func.codes().map(|(id, _)| id).collect();
        let mut removed = 0usize;
        for code in codes {
            if !visited.contains(&code) {
                func.delete_code(code);
                removed += 1;
            }
        }
        func.recalc_flow();
        if removed > 0 {
            debug!(func = func.name(), removed, "deleted unreachable blocks");
            changed = true;
        }
        changed_any |= changed;
        if !changed {
            break;
        }
    }
    changed_any
}
