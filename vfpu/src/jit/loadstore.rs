use crate::addressing::{emit_address, GprMapper};
use crate::emitter::{Align, Gpr};
use crate::fallback::Fallback;
use crate::instructions::{ls_offset, VfpuOp};
use crate::regcache::MapFlags;
use crate::regs::{VecReg, VectorSize};

use super::Jit;

impl<G: GprMapper> Jit<G> {
    /// Flags for the register a load writes. With a bounds check the access may be skipped, so
    /// the old value has to be there.
    fn load_flags(&self, rs: u8) -> MapFlags {
        if self.config.fast_memory || self.gpr.imm(rs).is_some() {
            MapFlags::DIRTY | MapFlags::NO_INIT
        } else {
            MapFlags::DIRTY
        }
    }

    /// lv.q / sv.q
    pub fn comp_svq(&mut self, op: VfpuOp) -> Result<(), Fallback> {
        let load = match op.primary() {
            54 => true,
            62 => false,
            // lvl.q, lvr.q, svl.q, svr.q
            _ => return Err(Fallback::Unimplemented(op.name())),
        };

        let ls = op.ls();
        let vt = VecReg::new(ls.vt() | ((ls.vt_hi() & 1) << 5), VectorSize::Quad);
        let flags = if load { self.load_flags(ls.rs()) } else { MapFlags::empty() };

        // Map first: a load here may not sit behind the bounds check branch
        let ar = self.fpr.map_reg(&mut self.code, vt, flags)?;
        let skip = emit_address(&mut self.code, &mut self.gpr, ls.rs(), ls_offset(ls), 16, &self.config)?;

        if load {
            self.code.vld1(ar, Gpr::R0, 0, Align::Bits128);
        } else {
            self.code.vst1(ar, Gpr::R0, 0, Align::Bits128);
        }

        if let Some(skip) = skip {
            self.code.set_jump_target(skip);
        }
        Ok(())
    }

    /// lv.s / sv.s
    pub fn comp_sv(&mut self, op: VfpuOp) -> Result<(), Fallback> {
        let load = op.primary() == 50;

        let ls = op.ls();
        let vt = VecReg::new(ls.vt() | (ls.vt_hi() << 5), VectorSize::Single);
        let flags = if load { self.load_flags(ls.rs()) } else { MapFlags::empty() };

        let ar = self.fpr.map_reg(&mut self.code, vt, flags)?;
        let skip = emit_address(&mut self.code, &mut self.gpr, ls.rs(), ls_offset(ls), 4, &self.config)?;

        if load {
            self.code.vld1_lane(ar, 0, Gpr::R0, 0);
        } else {
            self.code.vst1_lane(ar, 0, Gpr::R0, 0);
        }

        if let Some(skip) = skip {
            self.code.set_jump_target(skip);
        }
        Ok(())
    }
}
