//! Compile-time evaluation of constant expressions.
//!
//! These are the pure helpers behind the constant-propagation pass:
//! width-aware two's-complement arithmetic for the integer types and
//! IEEE 754 arithmetic for `F32`/`F64`. Nothing here touches the IR graph.

use super::types::{BinaryOp, Const, Prim, UnaryOp};

fn from_bits(prim: Prim, bits: u128) -> Const {
    let bits = bits & prim.payload_mask();
    Const {
        prim,
        lo: bits as u64,
        hi: (bits >> 64) as u64,
    }
}

fn is_zero(c: Const) -> bool {
    match c.prim {
        Prim::F32 => c.as_f32() == 0.0,
        Prim::F64 => c.as_f64() == 0.0,
        _ => c.as_u128() == 0,
    }
}

/// Convert a constant to another primitive type, C cast style: integers
/// wrap modulo the destination width, float-to-integer saturates, and a
/// boolean destination tests for nonzero.
pub fn cast(to: Prim, value: Const) -> Const {
    if value.prim.is_float() {
        let f = match value.prim {
            Prim::F32 => value.as_f32() as f64,
            _ => value.as_f64(),
        };
        return match to {
            Prim::F32 => Const::f32(f as f32),
            Prim::F64 => Const::f64(f),
            Prim::Bool => Const::bool_(f != 0.0),
            _ => Const::int(to, f as i128),
        };
    }
    if value.prim == Prim::Bool {
        let b = value.lo != 0;
        return match to {
            Prim::F32 => Const::f32(b as u8 as f32),
            Prim::F64 => Const::f64(b as u8 as f64),
            Prim::Bool => Const::bool_(b),
            _ => Const::int(to, b as i128),
        };
    }
    match to {
        Prim::F32 => {
            if value.prim.is_signed() {
                Const::f32(value.as_i128() as f32)
            } else {
                Const::f32(value.as_u128() as f32)
            }
        }
        Prim::F64 => {
            if value.prim.is_signed() {
                Const::f64(value.as_i128() as f64)
            } else {
                Const::f64(value.as_u128() as f64)
            }
        }
        Prim::Bool => Const::bool_(value.as_u128() != 0),
        _ => {
            if value.prim.is_signed() {
                Const::int(to, value.as_i128())
            } else {
                from_bits(to, value.as_u128())
            }
        }
    }
}

/// Evaluate a unary operator on a constant.
///
/// `Seqz`/`Snez` produce a `Bool`; every other operator produces the
/// operand's type. `Mov` is the identity here (the caller folds casts
/// through [`cast`]).
pub fn calc1(op: UnaryOp, value: Const) -> Const {
    let prim = value.prim;
    match op {
        UnaryOp::Mov => value,
        UnaryOp::Seqz => Const::bool_(is_zero(value)),
        UnaryOp::Snez => Const::bool_(!is_zero(value)),
        UnaryOp::Neg => match prim {
            Prim::F32 => Const::f32(-value.as_f32()),
            Prim::F64 => Const::f64(-value.as_f64()),
            _ => Const::int(prim, value.as_i128().wrapping_neg()),
        },
        UnaryOp::BitNot => from_bits(prim, !value.as_u128()),
        UnaryOp::LogicalNot => match prim {
            Prim::F32 => Const::f32(if value.as_f32() == 0.0 { 1.0 } else { 0.0 }),
            Prim::F64 => Const::f64(if value.as_f64() == 0.0 { 1.0 } else { 0.0 }),
            _ => Const::int(prim, is_zero(value) as i128),
        },
    }
}

// Float-domain cases of calc2. Returns None for the operators that have no
// floating-point meaning (carries, shifts, bitwise); those fall through to
// the bit-domain path in calc2.
fn calc2_float(op: BinaryOp, lhs: Const, rhs: Const) -> Option<Const> {
    macro_rules! eval {
        ($a:expr, $b:expr, $mk:expr) => {{
            let (a, b) = ($a, $b);
            match op {
                BinaryOp::Sgt => $mk(if a > b { 1.0 } else { 0.0 }),
                BinaryOp::Sle => $mk(if a <= b { 1.0 } else { 0.0 }),
                BinaryOp::Slt => $mk(if a < b { 1.0 } else { 0.0 }),
                BinaryOp::Sge => $mk(if a >= b { 1.0 } else { 0.0 }),
                BinaryOp::Seq => $mk(if a == b { 1.0 } else { 0.0 }),
                BinaryOp::Sne => $mk(if a != b { 1.0 } else { 0.0 }),
                BinaryOp::Add => $mk(a + b),
                BinaryOp::Sub => $mk(a - b),
                BinaryOp::Mul => $mk(a * b),
                BinaryOp::Div => $mk(a / b),
                BinaryOp::Mod => $mk(a % b),
                BinaryOp::LAnd => $mk(if a != 0.0 && b != 0.0 { 1.0 } else { 0.0 }),
                BinaryOp::LOr => $mk(if a != 0.0 || b != 0.0 { 1.0 } else { 0.0 }),
                _ => return None,
            }
        }};
    }
    Some(match lhs.prim {
        Prim::F32 => eval!(lhs.as_f32(), rhs.as_f32(), Const::f32),
        _ => eval!(lhs.as_f64(), rhs.as_f64(), Const::f64),
    })
}

/// Evaluate a binary operator on two constants of the same type.
///
/// The result carries the operand type; comparisons and the logical
/// operators produce 0 or 1 in that type. Returns `None` for integer
/// division or remainder by zero, which the optimizer must leave unfolded.
pub fn calc2(op: BinaryOp, lhs: Const, rhs: Const) -> Option<Const> {
    let prim = lhs.prim;
    if prim.is_float() {
        if let Some(c) = calc2_float(op, lhs, rhs) {
            return Some(c);
        }
    }

    let au = lhs.as_u128();
    let bu = rhs.as_u128();
    let ai = lhs.as_i128();
    let bi = rhs.as_i128();
    let signed = prim.is_signed();
    let flag = |v: bool| Const::int(prim, v as i128);

    Some(match op {
        BinaryOp::Sgt => flag(if signed { ai > bi } else { au > bu }),
        BinaryOp::Sle => flag(if signed { ai <= bi } else { au <= bu }),
        BinaryOp::Slt => flag(if signed { ai < bi } else { au < bu }),
        BinaryOp::Sge => flag(if signed { ai >= bi } else { au >= bu }),
        BinaryOp::Seq => flag(au == bu),
        BinaryOp::Sne => flag(au != bu),
        BinaryOp::Scs => flag(au.checked_add(bu).map_or(true, |s| s > prim.payload_mask())),
        BinaryOp::Scc => flag(au.checked_add(bu).is_some_and(|s| s <= prim.payload_mask())),
        BinaryOp::Add => Const::int(prim, ai.wrapping_add(bi)),
        BinaryOp::Sub => Const::int(prim, ai.wrapping_sub(bi)),
        BinaryOp::Mul => Const::int(prim, ai.wrapping_mul(bi)),
        BinaryOp::Div => {
            if bu == 0 {
                return None;
            }
            if signed {
                Const::int(prim, ai.wrapping_div(bi))
            } else {
                from_bits(prim, au / bu)
            }
        }
        BinaryOp::Mod => {
            if bu == 0 {
                return None;
            }
            if signed {
                Const::int(prim, ai.wrapping_rem(bi))
            } else {
                from_bits(prim, au % bu)
            }
        }
        BinaryOp::Shl => from_bits(prim, au << (bu as u32 % prim.bits())),
        BinaryOp::Shr => {
            let sh = bu as u32 % prim.bits();
            if signed {
                Const::int(prim, ai >> sh)
            } else {
                from_bits(prim, au >> sh)
            }
        }
        BinaryOp::BAnd => from_bits(prim, au & bu),
        BinaryOp::BOr => from_bits(prim, au | bu),
        BinaryOp::BXor => from_bits(prim, au ^ bu),
        BinaryOp::LAnd => flag(au != 0 && bu != 0),
        BinaryOp::LOr => flag(au != 0 || bu != 0),
    })
}
