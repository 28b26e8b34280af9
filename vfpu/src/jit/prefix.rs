//! Materializing prefixes as host operations.
//!
//! Source operands are transformed into a temporary so the guest register itself stays intact.
//! Destinations with a partial write mask compute into a temporary and merge lane by lane into
//! the backing register.

use tracing::trace;

use crate::addressing::GprMapper;
use crate::emitter::{Gpr, QReg, VecBinOp, VecUnOp};
use crate::fallback::Fallback;
use crate::prefix::{DestPrefix, PrefixKind, SatMode, SourcePrefix, SOURCE_IDENTITY};
use crate::regcache::MapFlags;
use crate::regs::{VecReg, VectorSize};

use super::Jit;

const SIGN_BIT: u32 = 0x8000_0000;

/// Result register of one instruction. `rd` and `backing` are the same unless the write mask
/// is partial.
#[derive(Debug, Copy, Clone)]
pub struct DestReg {
    pub rd: QReg,
    pub backing: QReg,
    pub prefix: DestPrefix,
}

impl<G: GprMapper> Jit<G> {
    pub(super) fn map_prefix_s(&mut self, vs: u8, size: VectorSize, flags: MapFlags) -> Result<QReg, Fallback> {
        self.map_prefix_st(PrefixKind::S, vs, size, flags)
    }

    pub(super) fn map_prefix_t(&mut self, vt: u8, size: VectorSize, flags: MapFlags) -> Result<QReg, Fallback> {
        self.map_prefix_st(PrefixKind::T, vt, size, flags)
    }

    fn map_prefix_st(
        &mut self,
        kind: PrefixKind,
        index: u8,
        size: VectorSize,
        flags: MapFlags,
    ) -> Result<QReg, Fallback> {
        let reg = VecReg::new(index, size);
        let value = self.js.value(kind);
        if value == SOURCE_IDENTITY {
            return self.fpr.map_reg(&mut self.code, reg, flags);
        }

        let prefix = SourcePrefix::decode(kind, value, size)?;
        trace!("{:?} prefix {:#x} on {}", kind, value, reg);

        if prefix.all_constant() {
            // No need to touch the register at all
            let ar = self.fpr.alloc_temp(&mut self.code)?;
            let mut words = [0u32; 4];
            for lane in 0..size.lanes() {
                words[lane] = prefix.constants[lane].to_bits();
            }
            self.code.load_vector(ar, words);
            return Ok(ar);
        }

        let input = self.fpr.map_reg(&mut self.code, reg, flags)?;
        let ar = self.fpr.alloc_temp(&mut self.code)?;

        // 1. Permute
        if !prefix.is_permuted() {
            self.code.vmov(ar, input);
        } else if let Some(lane) = prefix.broadcast_lane() {
            self.code.vdup(ar, input, lane);
        } else {
            for lane in prefix.register_lanes().iter() {
                self.code.vins(ar, lane as u8, input, prefix.select[lane]);
            }
        }

        let register_lanes = prefix.register_lanes();

        // 2. Abs, a sign bit clear
        if !prefix.abs.is_empty() {
            if prefix.abs.covers(register_lanes) {
                self.code.vun(VecUnOp::Abs, ar, ar);
            } else {
                let mut words = [u32::MAX; 4];
                for lane in prefix.abs.iter() {
                    words[lane] = !SIGN_BIT;
                }
                self.code.load_vector(QReg::SCRATCH, words);
                self.code.vbin(VecBinOp::And, ar, ar, QReg::SCRATCH);
            }
        }

        // 3. Negate, a sign bit flip
        if !prefix.negate.is_empty() {
            if prefix.negate.covers(register_lanes) {
                self.code.vun(VecUnOp::Neg, ar, ar);
            } else {
                let mut words = [0u32; 4];
                for lane in prefix.negate.iter() {
                    words[lane] = SIGN_BIT;
                }
                self.code.load_vector(QReg::SCRATCH, words);
                self.code.vbin(VecBinOp::Eor, ar, ar, QReg::SCRATCH);
            }
        }

        // 4. Constants, already negated where requested
        for lane in prefix.constant.iter() {
            let literal = self.code.literal_f32([prefix.constants[lane]; 4]);
            self.code.mov_p2r(Gpr::R0, literal);
            self.code.vld1_lane(ar, lane as u8, Gpr::R0, 0);
        }

        Ok(ar)
    }

    pub(super) fn map_prefix_d(&mut self, vd: u8, size: VectorSize, flags: MapFlags) -> Result<DestReg, Fallback> {
        let prefix = DestPrefix::decode(self.js.value(PrefixKind::D), size)?;
        let reg = VecReg::new(vd, size);

        if prefix.writes_all() {
            let rd = self.fpr.map_reg(&mut self.code, reg, flags)?;
            return Ok(DestReg { rd, backing: rd, prefix });
        }

        let rd = self.fpr.alloc_temp(&mut self.code)?;
        // The unwritten lanes have to survive, so the backing register must be loaded
        let backing = self.fpr.map_reg(&mut self.code, reg, flags - MapFlags::NO_INIT)?;
        Ok(DestReg { rd, backing, prefix })
    }

    /// Saturate and merge the result computed into `dest.rd`
    pub(super) fn apply_prefix_d(&mut self, dest: DestReg) -> Result<(), Fallback> {
        if let Some((mode, lanes)) = dest.prefix.saturation() {
            if lanes == dest.prefix.write {
                self.emit_clamp(dest.rd, mode);
            } else {
                // Clamp a copy and take only the saturated lanes, NaNs elsewhere stay untouched
                let temp = self.fpr.alloc_temp(&mut self.code)?;
                self.code.vmov(temp, dest.rd);
                self.emit_clamp(temp, mode);
                for lane in lanes.iter() {
                    self.code.vins(dest.rd, lane as u8, temp, lane as u8);
                }
            }
        }

        if dest.backing != dest.rd {
            for lane in dest.prefix.write.iter() {
                self.code.vins(dest.backing, lane as u8, dest.rd, lane as u8);
            }
        }
        Ok(())
    }

    fn emit_clamp(&mut self, reg: QReg, mode: SatMode) {
        if let Some((lo, hi)) = mode.bounds() {
            self.code.load_const(QReg::SCRATCH, hi);
            self.code.vbin(VecBinOp::Min, reg, reg, QReg::SCRATCH);
            self.code.load_const(QReg::SCRATCH, lo);
            self.code.vbin(VecBinOp::Max, reg, reg, QReg::SCRATCH);
        }
    }
}
