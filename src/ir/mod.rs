pub mod const_eval;
pub mod dominance;
pub mod func;
pub mod serialize;
pub mod ssa;
pub mod types;

pub use func::{
    CodeBlock, CodeId, CombinatorEntry, Expr, ExprKind, Flow, Insn, InsnId, InsnKind, IrFunction,
    Operand, Var, VarId,
};
pub use ssa::to_ssa;
pub use types::{BinaryOp, Const, Prim, UnaryOp};
