//! Host floating point rules shared by the executor and the reference interpreter.
//!
//! NEON `vmin`/`vmax` differ from `f32::min`/`f32::max`: a NaN operand wins (quieted) and
//! `-0.0` is smaller than `+0.0`.
//!
//! Rust leaves the sign and payload of a NaN produced by arithmetic unspecified, and the
//! optimizer may pick either. Every operation here fixes the NaN bits explicitly so compiled
//! and interpreted code store the same words to guest memory.

const QUIET_BIT: u32 = 0x0040_0000;
const SIGN_BIT: u32 = 0x8000_0000;

/// What NEON returns for an invalid operation on non-NaN inputs
pub const DEFAULT_NAN: u32 = 0x7fc0_0000;

fn is_signaling(v: f32) -> bool {
    v.is_nan() && v.to_bits() & QUIET_BIT == 0
}

pub fn quiet(v: f32) -> f32 {
    f32::from_bits(v.to_bits() | QUIET_BIT)
}

fn propagate_nan(a: f32, b: f32) -> f32 {
    if is_signaling(a) {
        quiet(a)
    } else if is_signaling(b) {
        quiet(b)
    } else if a.is_nan() {
        a
    } else {
        quiet(b)
    }
}

/// Fix the NaN bits of `result`, computed from `a` and `b`
fn arith(a: f32, b: f32, result: f32) -> f32 {
    if a.is_nan() || b.is_nan() {
        propagate_nan(a, b)
    } else if result.is_nan() {
        f32::from_bits(DEFAULT_NAN)
    } else {
        result
    }
}

pub fn add(a: f32, b: f32) -> f32 {
    arith(a, b, a + b)
}

pub fn sub(a: f32, b: f32) -> f32 {
    arith(a, b, a - b)
}

pub fn mul(a: f32, b: f32) -> f32 {
    arith(a, b, a * b)
}

pub fn div(a: f32, b: f32) -> f32 {
    arith(a, b, a / b)
}

pub fn sqrt(v: f32) -> f32 {
    if v.is_nan() {
        quiet(v)
    } else {
        let root = v.sqrt();
        if root.is_nan() {
            f32::from_bits(DEFAULT_NAN)
        } else {
            root
        }
    }
}

pub fn abs(v: f32) -> f32 {
    f32::from_bits(v.to_bits() & !SIGN_BIT)
}

pub fn neg(v: f32) -> f32 {
    f32::from_bits(v.to_bits() ^ SIGN_BIT)
}

pub fn arm_min(a: f32, b: f32) -> f32 {
    if a.is_nan() || b.is_nan() {
        return propagate_nan(a, b);
    }
    if a == b {
        // Only differs for zeros of opposite sign
        return f32::from_bits(a.to_bits() | b.to_bits());
    }
    if a < b {
        a
    } else {
        b
    }
}

pub fn arm_max(a: f32, b: f32) -> f32 {
    if a.is_nan() || b.is_nan() {
        return propagate_nan(a, b);
    }
    if a == b {
        return f32::from_bits(a.to_bits() & b.to_bits());
    }
    if a > b {
        a
    } else {
        b
    }
}

/// Clamp the way the generated code does: min against the upper bound, then max against the
/// lower one
pub fn clamp(v: f32, lo: f32, hi: f32) -> f32 {
    arm_max(arm_min(v, hi), lo)
}
