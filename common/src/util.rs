use core::fmt;
use std::ops::{BitAnd, BitOr};

/// One bit per vector lane, lane 0 in bit 0.
///
/// Vector operands have at most four lanes, so only the low nibble is ever set.
#[derive(Copy, Clone, PartialEq, Eq, Hash)]
pub struct LaneMask {
    mask: u8,
}

impl LaneMask {
    pub const EMPTY: LaneMask = LaneMask { mask: 0 };

    /// Mask covering the first `lanes` lanes
    #[inline(always)]
    pub fn full(lanes: usize) -> Self {
        debug_assert!(lanes <= 4);
        LaneMask { mask: ((1u16 << lanes) - 1) as u8 }
    }

    #[inline(always)]
    pub fn from_bits(bits: u8) -> Self {
        LaneMask { mask: bits & 0xf }
    }

    #[inline(always)]
    pub fn lane(lane: usize) -> Self {
        debug_assert!(lane < 4);
        LaneMask { mask: 1 << lane }
    }

    #[inline(always)]
    pub fn contains(&self, lane: usize) -> bool {
        lane < 4 && (self.mask >> lane) & 1 != 0
    }

    #[inline(always)]
    pub fn insert(&mut self, lane: usize) {
        self.mask |= LaneMask::lane(lane).mask;
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.mask == 0
    }

    /// True if every lane of `other` is also set here
    #[inline(always)]
    pub fn covers(&self, other: LaneMask) -> bool {
        other.mask & !self.mask == 0
    }

    /// Lanes below `lanes` that are not set
    #[inline(always)]
    pub fn complement(&self, lanes: usize) -> Self {
        LaneMask { mask: !self.mask & LaneMask::full(lanes).mask }
    }

    #[inline(always)]
    pub fn bits(&self) -> u8 {
        self.mask
    }

    pub fn count(&self) -> u32 {
        self.mask.count_ones()
    }

    pub fn iter(self) -> impl Iterator<Item = usize> {
        (0..4).filter(move |&lane| self.contains(lane))
    }
}

impl BitAnd for LaneMask {
    type Output = Self;

    #[inline(always)]
    fn bitand(self, rhs: Self) -> Self::Output {
        LaneMask { mask: self.mask & rhs.mask }
    }
}

impl BitOr for LaneMask {
    type Output = Self;

    #[inline(always)]
    fn bitor(self, rhs: Self) -> Self::Output {
        LaneMask { mask: self.mask | rhs.mask }
    }
}

impl Default for LaneMask {
    #[inline(always)]
    fn default() -> Self {
        LaneMask::EMPTY
    }
}

impl fmt::Debug for LaneMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LaneMask({:04b})", self.mask)
    }
}
