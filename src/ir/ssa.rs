//! Conversion to static single assignment form.
//!
//! For each variable that existed before the pass: place combinators on
//! the iterated dominance frontier of its assignments (pruned by a
//! liveness sweep), then walk the CFG once renaming every assignment to a
//! fresh variable and rewriting reads and combinator binds to the name
//! that reaches them. Afterwards the function enforces the
//! single-assignment rule in its builders.

use rustc_hash::FxHashSet;
use smallvec::SmallVec;
use tracing::debug;

use super::dominance::DomTree;
use super::func::{
    CodeId, CombinatorEntry, Expr, ExprKind, Flow, InsnId, InsnKind, IrFunction, Operand, VarId,
};
use super::types::Const;

/// Convert `func` to SSA form. No-op if the function is already SSA.
pub fn to_ssa(func: &mut IrFunction) {
    if func.enforce_ssa {
        return;
    }
    let dom = DomTree::compute(func);
    let vars: Vec<VarId> = func.vars().map(|(id, _)| id).collect();
    for var in vars {
        insert_combinators(func, &dom, var);
        rename(func, var);
    }
    func.enforce_ssa = true;
    debug!(func = func.name(), "converted to ssa form");
}

// Propagate "some reachable block reads the variable" backwards by
// searching forward from `i` and folding the result into every node on
// the way.
fn usage_dfs(
    func: &IrFunction,
    dom: &DomTree,
    i: usize,
    visited: &mut [bool],
    uses_var: &mut [bool],
) -> bool {
    if visited[i] {
        return uses_var[i];
    }
    visited[i] = true;
    let mut used = uses_var[i];
    for &succ in func.code(dom.order[i]).succs() {
        if let Some(&j) = dom.index.get(&succ) {
            used |= usage_dfs(func, dom, j, visited, uses_var);
        }
    }
    uses_var[i] = used;
    used
}

// Insert a combinator for `dest` at the front of `code`, one entry per
// predecessor with a zero placeholder bind. The renaming walk fills the
// binds in afterwards.
fn create_combinator(func: &mut IrFunction, code: CodeId, dest: VarId) {
    let prim = func.var(dest).prim();
    let entries: SmallVec<[CombinatorEntry; 2]> = func
        .code(code)
        .preds()
        .iter()
        .map(|&prev| CombinatorEntry {
            prev,
            bind: Operand::Const(Const::zero(prim)),
        })
        .collect();
    let insn = func.alloc_insn(
        code,
        InsnKind::Expr(Expr {
            dest,
            kind: ExprKind::Combinator(entries),
        }),
    );
    func.var_mut(dest).assignments.push(insn);
    func.code_mut(code).insns.insert(0, insn);
}

// Place combinators for `var` on the iterated dominance frontier of its
// assignments, skipping blocks where no reachable instruction reads it.
fn insert_combinators(func: &mut IrFunction, dom: &DomTree, var: VarId) {
    let n = dom.order.len();
    let mut uses_var = vec![false; n];
    for &insn in func.var(var).uses() {
        if let Some(&i) = dom.index.get(&func.insn(insn).parent) {
            uses_var[i] = true;
        }
    }
    let mut def_blocks: Vec<usize> = Vec::new();
    for &insn in func.var(var).assignments() {
        if let Some(&i) = dom.index.get(&func.insn(insn).parent) {
            uses_var[i] = true;
            def_blocks.push(i);
        }
    }
    let mut visited = vec![false; n];
    for &d in &def_blocks {
        usage_dfs(func, dom, d, &mut visited, &mut uses_var);
    }

    let mut work: Vec<usize> = Vec::new();
    let mut queued = vec![false; n];
    for &d in &def_blocks {
        for &i in &dom.frontier[d] {
            if !queued[i] {
                queued[i] = true;
                work.push(i);
            }
        }
    }
    let mut placed = 0usize;
    let mut has_phi = vec![false; n];
    while let Some(i) = work.pop() {
        if has_phi[i] || !uses_var[i] {
            continue;
        }
        has_phi[i] = true;
        placed += 1;
        create_combinator(func, dom.order[i], var);
        for &j in &dom.frontier[i] {
            if !queued[j] {
                queued[j] = true;
                work.push(j);
            }
        }
    }
    if placed > 0 {
        debug!(
            func = func.name(),
            var = func.var(var).name(),
            placed,
            "inserted combinators"
        );
    }
}

// Rewrite reads of `from` to `to` in one instruction. Combinator binds
// are left alone; those are rewritten edge-by-edge in replace_phi_vars.
fn replace_insn_var(func: &mut IrFunction, insn: InsnId, from: VarId, to: VarId) {
    let mut replaced = false;
    let mut rewrite = |operand: &mut Operand| {
        if *operand == Operand::Var(from) {
            *operand = Operand::Var(to);
            replaced = true;
        }
    };
    match &mut func.insn_mut(insn).kind {
        InsnKind::Expr(expr) => match &mut expr.kind {
            ExprKind::Combinator(_) => {}
            ExprKind::Unary { value, .. } => rewrite(value),
            ExprKind::Binary { lhs, rhs, .. } => {
                rewrite(lhs);
                rewrite(rhs);
            }
            ExprKind::Undefined => {}
        },
        InsnKind::Flow(flow) => match flow {
            Flow::Jump { .. } => {}
            Flow::Branch { cond, .. } => rewrite(cond),
            Flow::CallDirect { args, .. } => {
                for arg in args {
                    rewrite(arg);
                }
            }
            Flow::CallPtr { addr, args } => {
                rewrite(addr);
                for arg in args {
                    rewrite(arg);
                }
            }
            Flow::Return { value } => {
                if let Some(value) = value {
                    rewrite(value);
                }
            }
        },
    }
    if replaced {
        func.var_mut(from).uses.remove(&insn);
        func.var_mut(to).uses.insert(insn);
    }
}

// In `code`, rewrite the combinator entries arriving over the edge
// `pred -> code` to `to`, for the combinator belonging to the variable
// being renamed (its destination is in `phi_from`).
fn replace_phi_vars(
    func: &mut IrFunction,
    pred: CodeId,
    code: CodeId,
    phi_from: &FxHashSet<VarId>,
    to: VarId,
) {
    let insns = func.code(code).insns.clone();
    for insn in insns {
        let dest = match &func.insn(insn).kind {
            InsnKind::Expr(Expr {
                dest,
                kind: ExprKind::Combinator(_),
            }) => *dest,
            // Combinators only appear at the head of a block.
            _ => return,
        };
        if !phi_from.contains(&dest) {
            continue;
        }
        let mut matched = false;
        let mut old_binds: SmallVec<[VarId; 2]> = SmallVec::new();
        if let InsnKind::Expr(Expr {
            kind: ExprKind::Combinator(entries),
            ..
        }) = &mut func.insn_mut(insn).kind
        {
            for entry in entries.iter_mut() {
                if entry.prev == pred {
                    if let Operand::Var(v) = entry.bind {
                        if v != to {
                            old_binds.push(v);
                        }
                    }
                    entry.bind = Operand::Var(to);
                    matched = true;
                }
            }
        }
        for v in old_binds {
            func.remove_use_if_unreferenced(insn, v);
        }
        if matched {
            func.var_mut(to).uses.insert(insn);
        }
        return;
    }
}

fn rename_walk(
    func: &mut IrFunction,
    code: CodeId,
    from: VarId,
    mut to: Option<VarId>,
    phi_from: &mut FxHashSet<VarId>,
    visited: &mut FxHashSet<CodeId>,
) {
    if !visited.insert(code) {
        return;
    }
    let insns = func.code(code).insns.clone();
    for insn in insns {
        if let Some(to) = to {
            replace_insn_var(func, insn, from, to);
        }
        let assigns = matches!(&func.insn(insn).kind, InsnKind::Expr(expr) if expr.dest == from);
        if assigns {
            let fresh = func.create_var(func.var(from).prim(), None);
            func.var_mut(from).assignments.retain(|&e| e != insn);
            let is_phi = match &mut func.insn_mut(insn).kind {
                InsnKind::Expr(expr) => {
                    expr.dest = fresh;
                    matches!(expr.kind, ExprKind::Combinator(_))
                }
                InsnKind::Flow(_) => false,
            };
            func.var_mut(fresh).assignments.push(insn);
            if is_phi {
                phi_from.insert(fresh);
            }
            to = Some(fresh);
        }
    }
    if let Some(to) = to {
        let succs: Vec<CodeId> = func.code(code).succs().iter().copied().collect();
        for succ in succs {
            replace_phi_vars(func, code, succ, phi_from, to);
        }
    }
    let succs: Vec<CodeId> = func.code(code).succs().iter().copied().collect();
    for succ in succs {
        rename_walk(func, succ, from, to, phi_from, visited);
    }
}

// One renaming walk from the entry for a single original variable.
fn rename(func: &mut IrFunction, var: VarId) {
    let mut phi_from = FxHashSet::default();
    phi_from.insert(var);
    let mut visited = FxHashSet::default();
    rename_walk(func, func.entry(), var, None, &mut phi_from, &mut visited);
}
