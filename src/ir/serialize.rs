//! Textual serialization of IR functions.
//!
//! The text form is write-only: it is the ground truth for golden tests
//! and debugging dumps, and nothing parses it back. Variables print as
//! `%name`, block references as `<name>`, and constants as
//! `<prim>'0x<hex>` with one hex digit pair per byte of the type.

use std::fmt;
use std::io;

use super::func::{ExprKind, Flow, InsnKind, IrFunction, Operand};
use super::types::Prim;

impl IrFunction {
    fn write_operand(&self, f: &mut fmt::Formatter<'_>, operand: &Operand) -> fmt::Result {
        match operand {
            Operand::Var(v) => write!(f, "%{}", self.var(*v).name()),
            Operand::Const(c) => {
                if c.prim == Prim::Bool {
                    return write!(f, "{}", if c.lo != 0 { "true" } else { "false" });
                }
                write!(f, "{}'0x", c.prim.name())?;
                if c.prim.size() == 16 {
                    write!(f, "{:016X}{:016X}", c.hi, c.lo)?;
                } else {
                    write!(f, "{:0width$X}", c.lo, width = c.prim.size() as usize * 2)?;
                }
                match c.prim {
                    Prim::F32 => write!(f, " /* {:.6} */", c.as_f32()),
                    Prim::F64 => write!(f, " /* {:.6} */", c.as_f64()),
                    _ => Ok(()),
                }
            }
        }
    }

    fn write_insn(&self, f: &mut fmt::Formatter<'_>, kind: &InsnKind) -> fmt::Result {
        match kind {
            InsnKind::Expr(expr) => {
                let dest = self.var(expr.dest).name();
                match &expr.kind {
                    ExprKind::Combinator(entries) => {
                        write!(f, "phi %{dest}")?;
                        for entry in entries {
                            write!(f, ", <{}> ", self.code(entry.prev).name())?;
                            self.write_operand(f, &entry.bind)?;
                        }
                        Ok(())
                    }
                    ExprKind::Unary { op, value } => {
                        write!(f, "{} %{dest}, ", op.name())?;
                        self.write_operand(f, value)
                    }
                    ExprKind::Binary { op, lhs, rhs } => {
                        write!(f, "{} %{dest}, ", op.name())?;
                        self.write_operand(f, lhs)?;
                        write!(f, ", ")?;
                        self.write_operand(f, rhs)
                    }
                    ExprKind::Undefined => write!(f, "undef %{dest}"),
                }
            }
            InsnKind::Flow(flow) => match flow {
                Flow::Jump { target } => write!(f, "jump <{}>", self.code(*target).name()),
                Flow::Branch {
                    cond,
                    then_target,
                    else_target,
                } => {
                    write!(f, "branch ")?;
                    self.write_operand(f, cond)?;
                    write!(
                        f,
                        ", <{}>, <{}>",
                        self.code(*then_target).name(),
                        self.code(*else_target).name()
                    )
                }
                Flow::CallDirect { label, args } => {
                    write!(f, "call.direct <{label}>")?;
                    for arg in args {
                        write!(f, ", ")?;
                        self.write_operand(f, arg)?;
                    }
                    Ok(())
                }
                Flow::CallPtr { addr, args } => {
                    write!(f, "call.ptr ")?;
                    self.write_operand(f, addr)?;
                    for arg in args {
                        write!(f, ", ")?;
                        self.write_operand(f, arg)?;
                    }
                    Ok(())
                }
                Flow::Return { value } => {
                    write!(f, "return")?;
                    if let Some(value) = value {
                        write!(f, " ")?;
                        self.write_operand(f, value)?;
                    }
                    Ok(())
                }
            },
        }
    }

    /// Write the serialized form to an I/O sink.
    pub fn serialize<W: io::Write>(&self, out: &mut W) -> io::Result<()> {
        write!(out, "{self}")
    }
}

impl fmt::Display for IrFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.enforce_ssa() {
            write!(f, "ssa ")?;
        }
        writeln!(f, "function %{}", self.name())?;
        for (_, var) in self.vars() {
            writeln!(f, "    var {} %{}", var.prim().name(), var.name())?;
        }
        for &arg in self.args() {
            writeln!(f, "    arg %{}", self.var(arg).name())?;
        }
        for (_, code) in self.codes() {
            writeln!(f, "code <{}>", code.name())?;
            for &insn in code.insns() {
                write!(f, "    ")?;
                self.write_insn(f, &self.insn(insn).kind)?;
                writeln!(f)?;
            }
        }
        Ok(())
    }
}
