//! Constant propagation.
//!
//! A variable with exactly one assignment whose operands are all
//! constants is itself a constant: evaluate the expression, rewrite every
//! read to the result, and delete the variable. Folding one variable can
//! make another foldable, so the scan repeats until nothing changes.

use tracing::debug;

use crate::ir::const_eval::{calc1, calc2, cast};
use crate::ir::func::{Expr, ExprKind, InsnKind, IrFunction, Operand, VarId};
use crate::ir::types::{Const, UnaryOp};

// The constant value of a variable's sole assignment, if it has one.
fn fold_assignment(func: &IrFunction, var: VarId) -> Option<Const> {
    let assignments = func.var(var).assignments();
    if assignments.len() != 1 {
        return None;
    }
    match &func.insn(assignments[0]).kind {
        InsnKind::Expr(Expr {
            kind: ExprKind::Unary {
                op: UnaryOp::Mov,
                value: Operand::Const(k),
            },
            ..
        }) => Some(cast(func.var(var).prim(), *k)),
        InsnKind::Expr(Expr {
            kind: ExprKind::Unary {
                op,
                value: Operand::Const(k),
            },
            ..
        }) => Some(calc1(*op, *k)),
        InsnKind::Expr(Expr {
            kind: ExprKind::Binary {
                op,
                lhs: Operand::Const(a),
                rhs: Operand::Const(b),
            },
            ..
        }) => calc2(*op, *a, *b),
        _ => None,
    }
}

/// Returns whether any constants were propagated.
pub fn run(func: &mut IrFunction) -> bool {
    let mut propagated = 0usize;
    loop {
        let mut round = 0usize;
        let vars: Vec<_> = func.vars().map(|(id, _)| id).collect();
        for var in vars {
            let Some(value) = fold_assignment(func, var) else {
                continue;
            };
            func.replace_var(var, Operand::Const(value));
            func.delete_var(var);
            round += 1;
        }
        if round == 0 {
            break;
        }
        propagated += round;
    }
    if propagated > 0 {
        debug!(func = func.name(), propagated, "propagated constants");
    }
    propagated > 0
}
