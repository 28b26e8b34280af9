//! Guest effective addresses for vector loads and stores.
//!
//! The result is a host address in R0. With safe memory the caller gets a pending branch that
//! skips the access when the address is outside RAM.

use crate::emitter::{CodeBuffer, Cond, FixupBranch, Gpr};
use crate::fallback::Fallback;
use crate::jit::JitConfig;
use crate::state::{ADDRESS_MASK, RAM_BASE};

/// Access to the general purpose register allocator
pub trait GprMapper {
    /// Value of guest register `reg` if it is known at compile time
    fn imm(&self, reg: u8) -> Option<u32>;

    /// Host register currently holding guest register `reg`
    fn map(&mut self, code: &mut CodeBuffer, reg: u8) -> Gpr;
}

/// Guest registers pinned to host registers, with optional known values
#[derive(Debug, Clone, Default)]
pub struct StaticGprMap {
    known: [Option<u32>; 32],
}

impl StaticGprMap {
    pub fn new() -> StaticGprMap {
        StaticGprMap::default()
    }

    pub fn with_imm(mut self, reg: u8, value: u32) -> StaticGprMap {
        self.known[reg as usize & 31] = Some(value);
        self
    }
}

impl GprMapper for StaticGprMap {
    fn imm(&self, reg: u8) -> Option<u32> {
        match reg {
            0 => Some(0),
            _ => self.known[reg as usize & 31],
        }
    }

    fn map(&mut self, _code: &mut CodeBuffer, reg: u8) -> Gpr {
        Gpr::Guest(reg & 31)
    }
}

fn in_ram(addr: u32, size: u32, ram_size: u32) -> bool {
    addr.checked_sub(RAM_BASE)
        .map_or(false, |offset| offset.checked_add(size).map_or(false, |end| end <= ram_size))
}

/// Emit `R0 = host address of (rs + imm)` for an access of `size` bytes
pub fn emit_address<G: GprMapper>(
    code: &mut CodeBuffer,
    gpr: &mut G,
    rs: u8,
    imm: i32,
    size: u32,
    config: &JitConfig,
) -> Result<Option<FixupBranch>, Fallback> {
    if let Some(base) = gpr.imm(rs) {
        let addr = base.wrapping_add(imm as u32) & ADDRESS_MASK;
        if !in_ram(addr, size, config.ram_size) {
            return Err(Fallback::InvalidAddress(addr));
        }
        code.mov_imm(Gpr::R0, addr);
        code.add(Gpr::R0, Gpr::R0, Gpr::MemBase);
        return Ok(None);
    }

    // Offsets at or past this fail the bounds check
    let limit = match config.ram_size.checked_sub(size) {
        Some(last) => last + 1,
        None if config.fast_memory => 0,
        None => return Err(Fallback::AccessLargerThanRam(size)),
    };

    let base = gpr.map(code, rs);
    code.add_imm(Gpr::R0, base, imm);
    code.and_imm(Gpr::R0, Gpr::R0, ADDRESS_MASK);

    let skip = if config.fast_memory {
        None
    } else {
        // Unsigned compare catches addresses below RAM too
        code.add_imm(Gpr::R1, Gpr::R0, (RAM_BASE as i32).wrapping_neg());
        code.cmp_imm(Gpr::R1, limit);
        Some(code.b_cc(Cond::Hs))
    };

    code.add(Gpr::R0, Gpr::R0, Gpr::MemBase);
    Ok(skip)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emitter::HostOp;

    #[test]
    fn known_base_folds_to_a_constant() {
        let mut code = CodeBuffer::new();
        let mut gpr = StaticGprMap::new().with_imm(4, RAM_BASE + 0x100);
        let skip = emit_address(&mut code, &mut gpr, 4, 0x10, 16, &JitConfig::default()).unwrap();
        assert!(skip.is_none());
        assert_eq!(code.ops()[0], HostOp::MovImm { rd: Gpr::R0, imm: RAM_BASE + 0x110 });
    }

    #[test]
    fn known_bad_address_falls_back() {
        let mut code = CodeBuffer::new();
        let mut gpr = StaticGprMap::new();
        let result = emit_address(&mut code, &mut gpr, 0, 0x40, 16, &JitConfig::default());
        assert_eq!(result.unwrap_err(), Fallback::InvalidAddress(0x40));
    }

    #[test]
    fn safe_memory_checks_bounds() {
        let mut code = CodeBuffer::new();
        let mut gpr = StaticGprMap::new();
        let config = JitConfig { fast_memory: false, ..JitConfig::default() };
        let skip = emit_address(&mut code, &mut gpr, 5, -16, 16, &config).unwrap();
        assert!(skip.is_some());
        assert!(code.ops().iter().any(|op| matches!(op, HostOp::CmpImm { .. })));
        code.set_jump_target(skip.unwrap());
    }

    #[test]
    fn ram_smaller_than_the_access_falls_back() {
        let mut code = CodeBuffer::new();
        let mut gpr = StaticGprMap::new();
        let config = JitConfig { fast_memory: false, ram_size: 8, ..JitConfig::default() };
        let result = emit_address(&mut code, &mut gpr, 5, 0, 16, &config);
        assert_eq!(result.unwrap_err(), Fallback::AccessLargerThanRam(16));
        assert_eq!(code.len(), 0);

        // single words still fit
        let skip = emit_address(&mut code, &mut gpr, 5, 0, 4, &config).unwrap();
        assert!(code.ops().contains(&HostOp::CmpImm { rn: Gpr::R1, imm: 5 }));
        code.set_jump_target(skip.unwrap());
    }

    #[test]
    fn fast_memory_masks_only() {
        let mut code = CodeBuffer::new();
        let mut gpr = StaticGprMap::new();
        let config = JitConfig { fast_memory: true, ..JitConfig::default() };
        assert!(emit_address(&mut code, &mut gpr, 5, 0, 4, &config).unwrap().is_none());
        assert_eq!(code.len(), 3);
    }
}
