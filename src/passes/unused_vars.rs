//! Unused-variable elimination.
//!
//! Deletes every variable whose value is never read, together with its
//! assignments. Removing an assignment can strip the last read of another
//! variable, so the scan repeats until a full pass deletes nothing.
//! Function parameters are part of the signature and are never deleted.

use tracing::debug;

use crate::ir::func::IrFunction;

/// Returns whether any variables were deleted.
pub fn run(func: &mut IrFunction) -> bool {
    let mut deleted = 0usize;
    loop {
        let mut round = 0usize;
        let vars: Vec<_> = func.vars().map(|(id, _)| id).collect();
        for var in vars {
            if func.args().contains(&var) {
                continue;
            }
            if func.var(var).uses().is_empty() {
                func.delete_var(var);
                round += 1;
            }
        }
        if round == 0 {
            break;
        }
        deleted += round;
    }
    if deleted > 0 {
        debug!(func = func.name(), deleted, "deleted unused variables");
    }
    deleted > 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::func::Operand;
    use crate::ir::types::{Const, Prim, UnaryOp};

    #[test]
    fn deletes_unused_chains() {
        let mut func = IrFunction::new("f", "entry", &[]);
        let entry = func.entry();
        let a = func.create_var(Prim::S32, Some("a"));
        let b = func.create_var(Prim::S32, Some("b"));
        func.add_unary(entry, a, UnaryOp::Mov, Operand::Const(Const::int(Prim::S32, 1)));
        // b reads a, but nothing reads b: deleting b must cascade to a.
        func.add_unary(entry, b, UnaryOp::Mov, Operand::Var(a));
        func.add_return0(entry);

        assert!(run(&mut func));
        assert_eq!(func.vars().count(), 0);
        assert_eq!(func.code(entry).insns().len(), 1);
        assert!(!run(&mut func));
    }

    #[test]
    fn keeps_parameters_and_read_variables() {
        let mut func = IrFunction::new("f", "entry", &["p"]);
        let entry = func.entry();
        let x = func.create_var(Prim::S32, Some("x"));
        func.add_unary(entry, x, UnaryOp::Mov, Operand::Const(Const::int(Prim::S32, 3)));
        func.add_return1(entry, Operand::Var(x));

        // p is unused but survives as a parameter; x is read by the return.
        assert!(!run(&mut func));
        assert_eq!(func.vars().count(), 2);
    }
}
