//! Host vector register cache.
//!
//! Guest vectors are kept in host Q registers across instructions of a block. A binding is keyed
//! by the guest `VecReg` (index and size), so `C000` and `R000` are different keys even though
//! they share a float; mapping one evicts the other first.

use bitflags::bitflags;
use tracing::{debug, trace};

use crate::emitter::{Align, CodeBuffer, Gpr, QReg};
use crate::fallback::Fallback;
use crate::regs::{VecReg, VectorSize};
use crate::state::ctx_vfpr_offset;

bitflags! {
    #[derive(Debug, Copy, Clone, PartialEq, Eq)]
    pub struct MapFlags: u8 {
        /// The caller will modify the register
        const DIRTY = 1;
        /// The caller overwrites every lane, skip the load
        const NO_INIT = 2;
    }
}

/// Smallest usable host register file: Q0 is scratch and one instruction locks at most 7
pub const MIN_HOST_REGS: u8 = 9;

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub loads: u32,
    pub writebacks: u32,
    pub spills: u32,
}

#[derive(Debug, Clone, Default)]
struct HostSlot {
    binding: Option<VecReg>,
    dirty: bool,
    spill_lock: bool,
    temp: bool,
    last_use: u64,
}

impl HostSlot {
    fn is_free(&self) -> bool {
        self.binding.is_none() && !self.temp && !self.spill_lock
    }
}

#[derive(Debug, Clone)]
pub struct VfpuRegCache {
    /// Indexed by host register number, entry 0 is the scratch register and stays unused
    slots: Vec<HostSlot>,
    clock: u64,
    stats: CacheStats,
}

impl VfpuRegCache {
    pub fn new(host_regs: u8) -> VfpuRegCache {
        assert!(host_regs >= MIN_HOST_REGS, "need at least {} host vector registers", MIN_HOST_REGS);
        VfpuRegCache {
            slots: vec![HostSlot::default(); host_regs as usize],
            clock: 0,
            stats: CacheStats::default(),
        }
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
    }

    /// Number of registers the allocator hands out
    pub fn capacity(&self) -> usize {
        self.slots.len() - 1
    }

    pub fn resident(&self, reg: VecReg) -> Option<QReg> {
        self.find(reg)
    }

    pub fn is_dirty(&self, reg: VecReg) -> bool {
        self.find(reg).map_or(false, |q| self.slots[q.0 as usize].dirty)
    }

    fn find(&self, reg: VecReg) -> Option<QReg> {
        self.slots
            .iter()
            .position(|slot| !slot.temp && slot.binding == Some(reg))
            .map(|i| QReg(i as u8))
    }

    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    /// Host register holding `reg`, locked until the end of the current instruction
    pub fn map_reg(&mut self, code: &mut CodeBuffer, reg: VecReg, flags: MapFlags) -> Result<QReg, Fallback> {
        let now = self.tick();

        if let Some(q) = self.find(reg) {
            let slot = &mut self.slots[q.0 as usize];
            slot.spill_lock = true;
            slot.last_use = now;
            slot.dirty |= flags.contains(MapFlags::DIRTY);
            return Ok(q);
        }

        self.unbind_overlapping(code, reg);

        let q = self.grab(code)?;
        if !flags.contains(MapFlags::NO_INIT) {
            self.load(code, q, reg);
        }
        trace!("mapped {} to {}", reg, q);

        let slot = &mut self.slots[q.0 as usize];
        *slot = HostSlot {
            binding: Some(reg),
            dirty: flags.contains(MapFlags::DIRTY),
            spill_lock: true,
            temp: false,
            last_use: now,
        };
        Ok(q)
    }

    /// Scratch register without a guest binding, discarded at the end of the instruction
    pub fn alloc_temp(&mut self, code: &mut CodeBuffer) -> Result<QReg, Fallback> {
        let now = self.tick();
        let q = self.grab(code)?;
        self.slots[q.0 as usize] = HostSlot {
            binding: None,
            dirty: false,
            spill_lock: true,
            temp: true,
            last_use: now,
        };
        Ok(q)
    }

    pub fn release_spill_locks_and_discard_temps(&mut self) {
        for slot in self.slots.iter_mut() {
            slot.spill_lock = false;
            if slot.temp {
                *slot = HostSlot::default();
            }
        }
    }

    /// Write back every dirty binding and forget them all
    pub fn flush_all(&mut self, code: &mut CodeBuffer) {
        for i in 1..self.slots.len() {
            let q = QReg(i as u8);
            if let Some(reg) = self.slots[i].binding {
                if self.slots[i].dirty {
                    self.store(code, q, reg);
                }
            }
            self.slots[i] = HostSlot::default();
        }
    }

    pub fn checkpoint(&self) -> VfpuRegCache {
        self.clone()
    }

    pub fn rollback(&mut self, checkpoint: VfpuRegCache) {
        *self = checkpoint;
    }

    /// A free register, spilling the least recently used unlocked binding if there is none
    fn grab(&mut self, code: &mut CodeBuffer) -> Result<QReg, Fallback> {
        if let Some(i) = (1..self.slots.len()).find(|&i| self.slots[i].is_free()) {
            return Ok(QReg(i as u8));
        }

        let victim = (1..self.slots.len())
            .filter(|&i| !self.slots[i].spill_lock && !self.slots[i].temp)
            .min_by_key(|&i| self.slots[i].last_use);

        let i = match victim {
            Some(i) => i,
            None => {
                if cfg!(debug_assertions) {
                    panic!("all {} host vector registers are locked", self.capacity());
                }
                return Err(Fallback::RegistersExhausted);
            }
        };

        let q = QReg(i as u8);
        if let Some(reg) = self.slots[i].binding {
            debug!("spilling {} from {}", reg, q);
            if self.slots[i].dirty {
                self.store(code, q, reg);
            }
            self.stats.spills += 1;
        }
        self.slots[i] = HostSlot::default();
        Ok(q)
    }

    fn unbind_overlapping(&mut self, code: &mut CodeBuffer, reg: VecReg) {
        for i in 1..self.slots.len() {
            let other = match self.slots[i].binding {
                Some(other) if !self.slots[i].temp && other.overlaps(&reg) => other,
                _ => continue,
            };
            let q = QReg(i as u8);
            trace!("{} overlaps {}, unbinding {}", other, reg, q);
            if self.slots[i].dirty {
                self.store(code, q, other);
            }
            let slot = &mut self.slots[i];
            slot.binding = None;
            slot.dirty = false;
            if slot.spill_lock {
                // Still in use by the current instruction, keep the value around
                slot.temp = true;
            }
        }
    }

    fn whole_vector(reg: VecReg) -> bool {
        reg.size == VectorSize::Quad && reg.is_contiguous() && reg.slot(0) % 4 == 0
    }

    fn load(&mut self, code: &mut CodeBuffer, q: QReg, reg: VecReg) {
        self.stats.loads += 1;
        if Self::whole_vector(reg) {
            code.vld1(q, Gpr::Ctx, ctx_vfpr_offset(reg.slot(0)), Align::Bits128);
        } else {
            for (lane, slot) in reg.slots().enumerate() {
                code.vld1_lane(q, lane as u8, Gpr::Ctx, ctx_vfpr_offset(slot));
            }
        }
    }

    fn store(&mut self, code: &mut CodeBuffer, q: QReg, reg: VecReg) {
        self.stats.writebacks += 1;
        if Self::whole_vector(reg) {
            code.vst1(q, Gpr::Ctx, ctx_vfpr_offset(reg.slot(0)), Align::Bits128);
        } else {
            for (lane, slot) in reg.slots().enumerate() {
                code.vst1_lane(q, lane as u8, Gpr::Ctx, ctx_vfpr_offset(slot));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emitter::HostOp;

    fn quad(index: u8) -> VecReg {
        VecReg::new(index, VectorSize::Quad)
    }

    #[test]
    fn mapping_twice_reuses_the_binding() {
        let mut code = CodeBuffer::new();
        let mut cache = VfpuRegCache::new(16);
        let a = cache.map_reg(&mut code, quad(0x20), MapFlags::empty()).unwrap();
        let b = cache.map_reg(&mut code, quad(0x20), MapFlags::DIRTY).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, QReg::SCRATCH);
        assert_eq!(code.ops(), &[HostOp::Vld1 { vd: a, rn: Gpr::Ctx, offset: 0, align: Align::Bits128 }]);
        assert!(cache.is_dirty(quad(0x20)));
    }

    #[test]
    fn column_loads_lane_by_lane() {
        let mut code = CodeBuffer::new();
        let mut cache = VfpuRegCache::new(16);
        cache.map_reg(&mut code, quad(0), MapFlags::empty()).unwrap();
        assert_eq!(code.len(), 4);
        assert_eq!(cache.stats().loads, 1);
    }

    #[test]
    fn no_init_skips_the_load() {
        let mut code = CodeBuffer::new();
        let mut cache = VfpuRegCache::new(16);
        cache.map_reg(&mut code, quad(0), MapFlags::DIRTY | MapFlags::NO_INIT).unwrap();
        assert!(code.is_empty());
        cache.flush_all(&mut code);
        assert_eq!(code.len(), 4);
        assert_eq!(cache.resident(quad(0)), None);
    }

    #[test]
    fn lru_spill_writes_back_dirty_registers() {
        let mut code = CodeBuffer::new();
        let mut cache = VfpuRegCache::new(MIN_HOST_REGS);
        for i in 0..8u8 {
            cache.map_reg(&mut code, quad(0x20 | (i << 2)), MapFlags::DIRTY | MapFlags::NO_INIT).unwrap();
            cache.release_spill_locks_and_discard_temps();
        }
        assert!(code.is_empty());
        // Everything is taken, the first mapping is the oldest
        cache.map_reg(&mut code, quad(0x22), MapFlags::DIRTY | MapFlags::NO_INIT).unwrap();
        assert_eq!(cache.stats().spills, 1);
        assert_eq!(cache.resident(quad(0x20)), None);
        assert_eq!(code.ops()[0], HostOp::Vst1 { vd: QReg(1), rn: Gpr::Ctx, offset: 0, align: Align::Bits128 });
    }

    #[test]
    fn overlapping_keys_are_written_back_first() {
        let mut code = CodeBuffer::new();
        let mut cache = VfpuRegCache::new(16);
        let column = cache.map_reg(&mut code, quad(0), MapFlags::DIRTY | MapFlags::NO_INIT).unwrap();
        cache.release_spill_locks_and_discard_temps();
        let row = cache.map_reg(&mut code, quad(0x20), MapFlags::empty()).unwrap();
        // four lane stores of the column, then the row load
        assert_eq!(code.len(), 5);
        assert_eq!(cache.resident(quad(0)), None);
        assert_eq!(cache.resident(quad(0x20)), Some(row));
        assert_ne!(column, QReg(0));
    }

    #[test]
    fn locked_overlap_becomes_a_temp() {
        let mut code = CodeBuffer::new();
        let mut cache = VfpuRegCache::new(16);
        let column = cache.map_reg(&mut code, quad(0), MapFlags::empty()).unwrap();
        let row = cache.map_reg(&mut code, quad(0x20), MapFlags::empty()).unwrap();
        assert_ne!(column, row);
        // the column value is still reserved until release
        let temp = cache.alloc_temp(&mut code).unwrap();
        assert_ne!(temp, column);
        cache.release_spill_locks_and_discard_temps();
        assert_eq!(cache.resident(quad(0)), None);
    }

    #[test]
    fn rollback_restores_bindings() {
        let mut code = CodeBuffer::new();
        let mut cache = VfpuRegCache::new(16);
        let checkpoint = cache.checkpoint();
        cache.map_reg(&mut code, quad(0), MapFlags::DIRTY).unwrap();
        cache.rollback(checkpoint);
        assert_eq!(cache.resident(quad(0)), None);
        assert_eq!(cache.stats(), CacheStats::default());
    }

    #[test]
    #[should_panic]
    #[cfg(debug_assertions)]
    fn exhaustion_is_fatal_in_debug_builds() {
        let mut code = CodeBuffer::new();
        let mut cache = VfpuRegCache::new(MIN_HOST_REGS);
        for _ in 0..9 {
            cache.alloc_temp(&mut code).unwrap();
        }
    }
}
