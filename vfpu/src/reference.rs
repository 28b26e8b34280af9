//! Lane by lane interpreter for the VFPU instructions the compiler knows about.
//!
//! It is the target of `CallInterpreter` in the executor and the oracle the tests compare
//! compiled code against. Prefixes are applied exactly as the hardware does, including
//! combinations the compiler refuses to handle.

use thiserror::Error;

use crate::float::{self, arm_max, arm_min, clamp};
use crate::instructions::{ls_offset, InstructionInfo, OpClass, VfpuOp};
use crate::prefix::{DestPrefixBits, PrefixKind, SourcePrefixBits, CONSTANTS};
use crate::regs::{VecReg, VectorSize};
use crate::state::{GuestRam, GuestState, ADDRESS_MASK};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InterpError {
    #[error("{0} is not supported by the interpreter")]
    Unsupported(&'static str),
    #[error("misaligned quad access at {0:#010x}")]
    Misaligned(u32),
}

/// Execute one instruction
pub fn step(state: &mut GuestState, ram: &mut GuestRam, word: u32) -> Result<(), InterpError> {
    let op = VfpuOp(word);
    let (name, class) = match op.info() {
        InstructionInfo::Op(name, class) => (*name, *class),
        info => return Err(InterpError::Unsupported(info.name())),
    };

    match class {
        OpClass::Nop => return Ok(()),
        OpClass::Vpfx => {
            let pfx = op.pfx();
            let kind = PrefixKind::from_subop(pfx.subop());
            state.vpfx[kind.index()] = pfx.value() & kind.value_mask();
            return Ok(());
        }
        OpClass::Svq => return load_store_quad(state, ram, op, name),
        OpClass::Sv => return load_store_single(state, ram, op),
        OpClass::VecDo3 => vec_do3(state, op, name)?,
        OpClass::VV2Op => vv2op(state, op, name)?,
        OpClass::VScl => {
            let v = op.v();
            let sz = op.vector_size();
            let s = read_source(state, PrefixKind::S, v.vs(), sz);
            let t = read_source(state, PrefixKind::T, v.vt(), VectorSize::Single);
            write_dest(state, v.vd(), sz, s.map(|x| float::mul(x, t[0])));
        }
        OpClass::VDot => {
            let v = op.v();
            let sz = op.vector_size();
            let s = read_source(state, PrefixKind::S, v.vs(), sz);
            let t = read_source(state, PrefixKind::T, v.vt(), sz);
            let mut sum = float::mul(s[0], t[0]);
            for lane in 1..sz.lanes() {
                sum = float::add(sum, float::mul(s[lane], t[lane]));
            }
            write_dest(state, v.vd(), VectorSize::Single, [sum; 4]);
        }
        OpClass::VVectorInit => {
            let u = op.unary();
            let value = if u.subop() == 6 { 0.0 } else { 1.0 };
            write_dest(state, u.vd(), op.vector_size(), [value; 4]);
        }
        OpClass::VIdt => {
            let vd = op.unary().vd();
            let sz = op.vector_size();
            let one = match sz {
                VectorSize::Pair => vd & 1,
                VectorSize::Quad => vd & 3,
                _ => return Err(InterpError::Unsupported(name)),
            };
            let mut result = [0.0; 4];
            result[one as usize] = 1.0;
            write_dest(state, vd, sz, result);
        }
        OpClass::Viim => {
            let imm = op.imm();
            write_dest(state, imm.vt(), VectorSize::Single, [imm.imm() as i16 as f32; 4]);
        }
        OpClass::Vfim => {
            let imm = op.imm();
            let value = half::f16::from_bits(imm.imm()).to_f32();
            write_dest(state, imm.vt(), VectorSize::Single, [value; 4]);
        }
        _ => return Err(InterpError::Unsupported(name)),
    }

    state.vpfx = PrefixKind::ALL.map(PrefixKind::default_value);
    Ok(())
}

fn vec_do3(state: &mut GuestState, op: VfpuOp, name: &'static str) -> Result<(), InterpError> {
    let v = op.v();
    let f: fn(f32, f32) -> f32 = match (op.primary(), v.subop()) {
        (24, 0) => float::add,
        (24, 1) => float::sub,
        (24, 7) => float::div,
        (25, 0) => float::mul,
        (27, 2) => arm_min,
        (27, 3) => arm_max,
        (27, 6) => |s, t| if s >= t { 1.0 } else { 0.0 },
        (27, 7) => |s, t| if s < t { 1.0 } else { 0.0 },
        _ => return Err(InterpError::Unsupported(name)),
    };

    let sz = op.vector_size();
    let s = read_source(state, PrefixKind::S, v.vs(), sz);
    let t = read_source(state, PrefixKind::T, v.vt(), sz);
    let mut d = [0.0; 4];
    for lane in 0..4 {
        d[lane] = f(s[lane], t[lane]);
    }
    write_dest(state, v.vd(), sz, d);
    Ok(())
}

fn vv2op(state: &mut GuestState, op: VfpuOp, name: &'static str) -> Result<(), InterpError> {
    let u = op.unary();
    let f: fn(f32) -> f32 = match u.subop() {
        0 => |x| x,
        1 => float::abs,
        2 => float::neg,
        4 => |x| clamp(x, 0.0, 1.0),
        5 => |x| clamp(x, -1.0, 1.0),
        16 => |x| float::div(1.0, x),
        22 => |x| float::abs(float::sqrt(x)),
        24 => |x| float::div(-1.0, x),
        _ => return Err(InterpError::Unsupported(name)),
    };

    let sz = op.vector_size();
    let s = read_source(state, PrefixKind::S, u.vs(), sz);
    write_dest(state, u.vd(), sz, s.map(f));
    Ok(())
}

/// Operand value after the S or T prefix. Lanes past the operand size read as 0.
fn read_source(state: &GuestState, kind: PrefixKind, index: u8, size: VectorSize) -> [f32; 4] {
    let reg = VecReg::new(index, size);
    let n = size.lanes();
    let bits = SourcePrefixBits::from(state.prefix(kind));

    let mut raw = [0.0; 4];
    for (lane, slot) in reg.slots().enumerate() {
        raw[lane] = state.vfpr[slot];
    }

    let mut out = [0.0; 4];
    for lane in 0..n {
        let selector = ((bits.swizzle() >> (lane * 2)) & 3) as usize;
        let abs = (bits.abs() >> lane) & 1 != 0;
        let negate = (bits.negate() >> lane) & 1 != 0;

        let mut value = if (bits.constant() >> lane) & 1 != 0 {
            CONSTANTS[selector + 4 * abs as usize]
        } else {
            let value = if selector < n { raw[selector] } else { 0.0 };
            if abs {
                float::abs(value)
            } else {
                value
            }
        };
        if negate {
            value = float::neg(value);
        }
        out[lane] = value;
    }
    out
}

/// Store a result through the D prefix
fn write_dest(state: &mut GuestState, index: u8, size: VectorSize, result: [f32; 4]) {
    let reg = VecReg::new(index, size);
    let bits = DestPrefixBits::from(state.prefix(PrefixKind::D));

    for (lane, slot) in reg.slots().enumerate() {
        if (bits.mask() >> lane) & 1 != 0 {
            continue;
        }
        let value = match (bits.sat() >> (lane * 2)) & 3 {
            1 => clamp(result[lane], 0.0, 1.0),
            3 => clamp(result[lane], -1.0, 1.0),
            _ => result[lane],
        };
        state.vfpr[slot] = value;
    }
}

fn effective_address(state: &GuestState, op: VfpuOp) -> u32 {
    let ls = op.ls();
    let base = match ls.rs() {
        0 => 0,
        rs => state.gpr[rs as usize],
    };
    base.wrapping_add(ls_offset(ls) as u32) & ADDRESS_MASK
}

fn load_store_quad(state: &mut GuestState, ram: &mut GuestRam, op: VfpuOp, name: &'static str) -> Result<(), InterpError> {
    let load = match op.primary() {
        54 => true,
        62 => false,
        _ => return Err(InterpError::Unsupported(name)),
    };
    let ls = op.ls();
    let reg = VecReg::new(ls.vt() | ((ls.vt_hi() & 1) << 5), VectorSize::Quad);
    let addr = effective_address(state, op);
    if addr % 16 != 0 {
        return Err(InterpError::Misaligned(addr));
    }
    // Accesses outside RAM are dropped
    if !ram.contains(addr, 16) {
        return Ok(());
    }

    for (lane, slot) in reg.slots().enumerate() {
        let lane_addr = addr + lane as u32 * 4;
        if load {
            if let Some(value) = ram.read_f32(lane_addr) {
                state.vfpr[slot] = value;
            }
        } else {
            ram.write_f32(lane_addr, state.vfpr[slot]);
        }
    }
    Ok(())
}

fn load_store_single(state: &mut GuestState, ram: &mut GuestRam, op: VfpuOp) -> Result<(), InterpError> {
    let ls = op.ls();
    let slot = VecReg::new(ls.vt() | (ls.vt_hi() << 5), VectorSize::Single).slot(0);
    let addr = effective_address(state, op);
    if op.primary() == 50 {
        if let Some(value) = ram.read_f32(addr) {
            state.vfpr[slot] = value;
        }
    } else {
        ram.write_f32(addr, state.vfpr[slot]);
    }
    Ok(())
}
