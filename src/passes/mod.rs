//! The optimization pipeline.
//!
//! Four passes run over a function until none of them changes anything:
//! unused-variable elimination, constant propagation, dead code
//! elimination, and redundant branch removal. Each pass is idempotent on
//! its own; the driver exists because the passes feed each other
//! (folding a constant exposes a dead branch, cutting the branch strands
//! a variable, and so on).

pub mod const_prop;
pub mod dead_code;
pub mod merge_blocks;
pub mod unused_vars;

use tracing::debug;

use crate::ir::func::IrFunction;

/// Run the optimization pipeline to a fixed point. Returns whether any
/// code was changed.
pub fn optimize(func: &mut IrFunction) -> bool {
    let mut changed = false;
    loop {
        let mut round = false;
        round |= unused_vars::run(func);
        round |= const_prop::run(func);
        round |= dead_code::run(func);
        round |= merge_blocks::run(func);
        changed |= round;
        if !round {
            break;
        }
    }
    if changed {
        debug!(func = func.name(), "optimization reached a fixed point");
    }
    changed
}
