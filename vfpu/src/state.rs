//! Guest state the generated code works against: the context block and guest RAM.

use crate::prefix::PrefixKind;
use crate::regs::NUM_SLOTS;

/// Byte offsets into the context block
pub const CTX_VFPR: u32 = 0;
pub const CTX_VPFX: u32 = 512;
pub const CTX_VCC: u32 = 524;
pub const CTX_SIZE: u32 = 528;

pub const RAM_BASE: u32 = 0x0800_0000;
pub const ADDRESS_MASK: u32 = 0x3fff_ffff;
pub const DEFAULT_RAM_SIZE: u32 = 32 * 1024 * 1024;

pub fn ctx_vfpr_offset(slot: usize) -> u32 {
    CTX_VFPR + (slot as u32) * 4
}

pub fn ctx_prefix_offset(kind: PrefixKind) -> u32 {
    CTX_VPFX + (kind.index() as u32) * 4
}

#[derive(Debug, Clone)]
pub struct GuestState {
    /// Indexed by state slot
    pub vfpr: [f32; NUM_SLOTS],
    /// S, T, D
    pub vpfx: [u32; 3],
    pub vcc: u32,
    pub gpr: [u32; 32],
}

impl GuestState {
    pub fn new() -> GuestState {
        GuestState {
            vfpr: [0.0; NUM_SLOTS],
            vpfx: PrefixKind::ALL.map(PrefixKind::default_value),
            vcc: 0,
            gpr: [0; 32],
        }
    }

    pub fn vfpr_bits(&self) -> [u32; NUM_SLOTS] {
        self.vfpr.map(f32::to_bits)
    }

    pub fn prefix(&self, kind: PrefixKind) -> u32 {
        self.vpfx[kind.index()]
    }

    pub fn read_ctx(&self, offset: u32) -> Option<u32> {
        if offset % 4 != 0 {
            return None;
        }
        match offset {
            o if o < CTX_VPFX => Some(self.vfpr[(o / 4) as usize].to_bits()),
            o if o < CTX_VCC => Some(self.vpfx[((o - CTX_VPFX) / 4) as usize]),
            CTX_VCC => Some(self.vcc),
            _ => None,
        }
    }

    pub fn write_ctx(&mut self, offset: u32, value: u32) -> Option<()> {
        if offset % 4 != 0 {
            return None;
        }
        match offset {
            o if o < CTX_VPFX => self.vfpr[(o / 4) as usize] = f32::from_bits(value),
            o if o < CTX_VCC => self.vpfx[((o - CTX_VPFX) / 4) as usize] = value,
            CTX_VCC => self.vcc = value,
            _ => return None,
        }
        Some(())
    }
}

impl Default for GuestState {
    fn default() -> Self {
        GuestState::new()
    }
}

/// Main RAM, mapped at `RAM_BASE`
#[derive(Debug, Clone)]
pub struct GuestRam {
    data: Vec<u8>,
}

impl GuestRam {
    pub fn new(size: u32) -> GuestRam {
        GuestRam {
            data: vec![0; size as usize],
        }
    }

    pub fn size(&self) -> u32 {
        self.data.len() as u32
    }

    /// Offset into RAM of `len` bytes at guest address `addr`
    fn offset(&self, addr: u32, len: u32) -> Option<usize> {
        let offset = (addr & ADDRESS_MASK).checked_sub(RAM_BASE)?;
        (offset.checked_add(len)? <= self.size()).then_some(offset as usize)
    }

    pub fn contains(&self, addr: u32, len: u32) -> bool {
        self.offset(addr, len).is_some()
    }

    pub fn read_u32(&self, addr: u32) -> Option<u32> {
        let offset = self.offset(addr, 4)?;
        let bytes = self.data.get(offset..offset + 4)?;
        Some(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    pub fn write_u32(&mut self, addr: u32, value: u32) -> Option<()> {
        let offset = self.offset(addr, 4)?;
        self.data
            .get_mut(offset..offset + 4)?
            .copy_from_slice(&value.to_le_bytes());
        Some(())
    }

    pub fn read_f32(&self, addr: u32) -> Option<f32> {
        self.read_u32(addr).map(f32::from_bits)
    }

    pub fn write_f32(&mut self, addr: u32, value: f32) -> Option<()> {
        self.write_u32(addr, value.to_bits())
    }
}
