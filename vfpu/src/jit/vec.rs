use crate::addressing::GprMapper;
use crate::emitter::{QReg, VecBinOp, VecUnOp};
use crate::fallback::Fallback;
use crate::instructions::VfpuOp;
use crate::prefix::PrefixKind;
use crate::regcache::MapFlags;
use crate::regs::VectorSize;

use super::Jit;

enum Do3 {
    Bin(VecBinOp),
    /// 1.0 where `s >= t`
    Sge,
    /// 1.0 where `s < t`
    Slt,
}

enum V2 {
    Mov,
    Abs,
    Neg,
    Sat(f32, f32),
    /// `numerator / s`
    Rcp(f32),
    Sqrt,
}

/// The destination can skip its load if no source reads it
fn dest_flags(vd: u8, sources: &[u8]) -> MapFlags {
    if sources.contains(&vd) {
        MapFlags::DIRTY
    } else {
        MapFlags::DIRTY | MapFlags::NO_INIT
    }
}

impl<G: GprMapper> Jit<G> {
    pub fn comp_vec_do3(&mut self, op: VfpuOp) -> Result<(), Fallback> {
        self.require_known_prefix()?;

        let v = op.v();
        let lowering = match (op.primary(), v.subop()) {
            (24, 0) => Do3::Bin(VecBinOp::Add),
            (24, 1) => Do3::Bin(VecBinOp::Sub),
            (24, 7) => {
                if !self.config.features.simd_divide {
                    return Err(Fallback::NoSimdDivide);
                }
                Do3::Bin(VecBinOp::Div)
            }
            (25, 0) => Do3::Bin(VecBinOp::Mul),
            (27, 2) => Do3::Bin(VecBinOp::Min),
            (27, 3) => Do3::Bin(VecBinOp::Max),
            (27, 6) => Do3::Sge,
            (27, 7) => Do3::Slt,
            _ => return Err(Fallback::Unimplemented(op.name())),
        };

        let sz = op.vector_size();
        let vs = self.map_prefix_s(v.vs(), sz, MapFlags::empty())?;
        let vt = self.map_prefix_t(v.vt(), sz, MapFlags::empty())?;
        let dest = self.map_prefix_d(v.vd(), sz, dest_flags(v.vd(), &[v.vs(), v.vt()]))?;
        let rd = dest.rd;

        match lowering {
            Do3::Bin(bin) => self.code.vbin(bin, rd, vs, vt),
            Do3::Sge => {
                self.code.vbin(VecBinOp::Cge, rd, vs, vt);
                self.code.load_const(QReg::SCRATCH, 1.0);
                self.code.vbin(VecBinOp::And, rd, rd, QReg::SCRATCH);
            }
            Do3::Slt => {
                self.code.vbin(VecBinOp::Cgt, rd, vt, vs);
                self.code.load_const(QReg::SCRATCH, 1.0);
                self.code.vbin(VecBinOp::And, rd, rd, QReg::SCRATCH);
            }
        }

        self.apply_prefix_d(dest)
    }

    pub fn comp_vv2op(&mut self, op: VfpuOp) -> Result<(), Fallback> {
        self.require_known_prefix()?;

        let u = op.unary();
        // Moves onto themselves are common in real code, don't even touch the register
        if u.subop() == 0 && u.vs() == u.vd() && self.js.has_no_prefix() {
            return Ok(());
        }

        let lowering = match u.subop() {
            0 => V2::Mov,
            1 => V2::Abs,
            2 => V2::Neg,
            4 => V2::Sat(0.0, 1.0),
            5 => V2::Sat(-1.0, 1.0),
            16 | 24 if !self.config.features.simd_divide => return Err(Fallback::NoSimdDivide),
            16 => V2::Rcp(1.0),
            24 => V2::Rcp(-1.0),
            22 => V2::Sqrt,
            _ => return Err(Fallback::Unimplemented(op.name())),
        };

        let sz = op.vector_size();
        let vs = self.map_prefix_s(u.vs(), sz, MapFlags::empty())?;
        let dest = self.map_prefix_d(u.vd(), sz, dest_flags(u.vd(), &[u.vs()]))?;
        let rd = dest.rd;

        match lowering {
            V2::Mov => {
                if rd != vs {
                    self.code.vmov(rd, vs);
                }
            }
            V2::Abs => self.code.vun(VecUnOp::Abs, rd, vs),
            V2::Neg => self.code.vun(VecUnOp::Neg, rd, vs),
            V2::Sat(lo, hi) => {
                self.code.load_const(QReg::SCRATCH, hi);
                self.code.vbin(VecBinOp::Min, rd, vs, QReg::SCRATCH);
                self.code.load_const(QReg::SCRATCH, lo);
                self.code.vbin(VecBinOp::Max, rd, rd, QReg::SCRATCH);
            }
            V2::Rcp(numerator) => {
                self.code.load_const(QReg::SCRATCH, numerator);
                self.code.vbin(VecBinOp::Div, rd, QReg::SCRATCH, vs);
            }
            V2::Sqrt => {
                // abs turns sqrt(-0) = -0 into +0
                self.code.vun(VecUnOp::Sqrt, rd, vs);
                self.code.vun(VecUnOp::Abs, rd, rd);
            }
        }

        self.apply_prefix_d(dest)
    }

    pub fn comp_vscl(&mut self, op: VfpuOp) -> Result<(), Fallback> {
        self.require_known_prefix()?;

        let v = op.v();
        let sz = op.vector_size();
        let vs = self.map_prefix_s(v.vs(), sz, MapFlags::empty())?;
        let vt = self.map_prefix_t(v.vt(), VectorSize::Single, MapFlags::empty())?;
        let dest = self.map_prefix_d(v.vd(), sz, dest_flags(v.vd(), &[v.vs(), v.vt()]))?;

        self.code.vdup(QReg::SCRATCH, vt, 0);
        self.code.vbin(VecBinOp::Mul, dest.rd, vs, QReg::SCRATCH);

        self.apply_prefix_d(dest)
    }

    pub fn comp_vvector_init(&mut self, op: VfpuOp) -> Result<(), Fallback> {
        self.require_known_prefix()?;

        let u = op.unary();
        let dest = self.map_prefix_d(u.vd(), op.vector_size(), MapFlags::DIRTY | MapFlags::NO_INIT)?;
        match u.subop() {
            6 => self.code.vbin(VecBinOp::Eor, dest.rd, dest.rd, dest.rd),
            7 => self.code.load_const(dest.rd, 1.0),
            _ => return Err(Fallback::Unimplemented(op.name())),
        }

        self.apply_prefix_d(dest)
    }

    pub fn comp_vidt(&mut self, op: VfpuOp) -> Result<(), Fallback> {
        self.require_known_prefix()?;

        let u = op.unary();
        let sz = op.vector_size();
        // The 1.0 goes to the lane matching the register's position in its matrix
        let one = match sz {
            VectorSize::Pair => u.vd() & 1,
            VectorSize::Quad => u.vd() & 3,
            _ => return Err(Fallback::Unimplemented("vidt")),
        };

        let mut words = [0u32; 4];
        words[one as usize] = 1.0f32.to_bits();

        let dest = self.map_prefix_d(u.vd(), sz, MapFlags::DIRTY | MapFlags::NO_INIT)?;
        self.code.load_vector(dest.rd, words);
        self.apply_prefix_d(dest)
    }

    pub fn comp_viim(&mut self, op: VfpuOp) -> Result<(), Fallback> {
        let imm = op.imm();
        self.load_immediate(imm.vt(), imm.imm() as i16 as f32)
    }

    pub fn comp_vfim(&mut self, op: VfpuOp) -> Result<(), Fallback> {
        let imm = op.imm();
        self.load_immediate(imm.vt(), half::f16::from_bits(imm.imm()).to_f32())
    }

    fn load_immediate(&mut self, vt: u8, value: f32) -> Result<(), Fallback> {
        self.require_known_prefix()?;

        let dest = self.map_prefix_d(vt, VectorSize::Single, MapFlags::DIRTY | MapFlags::NO_INIT)?;
        self.code.load_const(dest.rd, value);
        self.apply_prefix_d(dest)
    }

    /// Prefixes are tracked at compile time, no code
    pub fn comp_vpfx(&mut self, op: VfpuOp) -> Result<(), Fallback> {
        let pfx = op.pfx();
        self.js.set(PrefixKind::from_subop(pfx.subop()), pfx.value());
        Ok(())
    }
}

macro_rules! declined {
    ($($name:ident),* $(,)?) => {
        impl<G: GprMapper> Jit<G> {
            $(
                pub fn $name(&mut self, op: VfpuOp) -> Result<(), Fallback> {
                    Err(Fallback::Unimplemented(op.name()))
                }
            )*
        }
    };
}

// No native lowering yet, always interpreted
declined!(
    comp_vdot,
    comp_vhdp,
    comp_vcrs,
    comp_vdet,
    comp_vcmp,
    comp_vcmov,
    comp_vcst,
    comp_vhoriz,
    comp_vrot,
    comp_vcross_quat,
    comp_vmmov,
    comp_vmmul,
    comp_vmscl,
    comp_vtfm,
    comp_vmatrix_init,
    comp_vi2f,
    comp_vf2i,
    comp_vi2x,
    comp_vx2i,
    comp_vh2f,
    comp_vsgn,
    comp_vocp,
    comp_mftv,
    comp_vmtvc,
);
