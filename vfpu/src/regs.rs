//! Geometry of the VFPU register file.
//!
//! The 128 floats are arranged as eight 4x4 matrices. A 7 bit register index picks a matrix, a
//! column, a starting row and whether the vector runs along a row or a column. Which floats a
//! vector touches also depends on its size, so a register reference is always `(index, size)`.

use std::fmt;

use common::util::LaneMask;

/// Number of floats in the guest register file
pub const NUM_SLOTS: usize = 128;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum VectorSize {
    Single,
    Pair,
    Triple,
    Quad,
}

impl VectorSize {
    /// Size from the two scattered size bits (7 and 15) of a vector instruction
    pub fn from_op(op: u32) -> VectorSize {
        match ((op >> 7) & 1) | ((op >> 14) & 2) {
            0 => VectorSize::Single,
            1 => VectorSize::Pair,
            2 => VectorSize::Triple,
            _ => VectorSize::Quad,
        }
    }

    pub fn lanes(self) -> usize {
        match self {
            VectorSize::Single => 1,
            VectorSize::Pair => 2,
            VectorSize::Triple => 3,
            VectorSize::Quad => 4,
        }
    }

    pub fn full_mask(self) -> LaneMask {
        LaneMask::full(self.lanes())
    }

    pub fn suffix(self) -> &'static str {
        match self {
            VectorSize::Single => ".s",
            VectorSize::Pair => ".p",
            VectorSize::Triple => ".t",
            VectorSize::Quad => ".q",
        }
    }

    /// The size bits, ready to be or-ed into an instruction word
    pub fn encode(self) -> u32 {
        match self {
            VectorSize::Single => 0,
            VectorSize::Pair => 1 << 7,
            VectorSize::Triple => 1 << 15,
            VectorSize::Quad => (1 << 15) | (1 << 7),
        }
    }
}

/// A guest vector register: index plus shape. Immutable once decoded.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct VecReg {
    pub index: u8,
    pub size: VectorSize,
}

impl VecReg {
    pub fn new(index: u8, size: VectorSize) -> VecReg {
        VecReg { index: index & 0x7f, size }
    }

    fn matrix(&self) -> usize {
        ((self.index >> 2) & 7) as usize
    }

    fn column(&self) -> usize {
        (self.index & 3) as usize
    }

    fn transposed(&self) -> bool {
        // Singles reuse the transpose bit as a row bit
        self.size != VectorSize::Single && (self.index >> 5) & 1 != 0
    }

    fn row(&self) -> usize {
        let index = self.index as usize;
        match self.size {
            VectorSize::Single => (index >> 5) & 3,
            VectorSize::Pair | VectorSize::Quad => (index >> 5) & 2,
            VectorSize::Triple => (index >> 6) & 1,
        }
    }

    /// State slot of lane `lane`
    pub fn slot(&self, lane: usize) -> usize {
        debug_assert!(lane < self.size.lanes());
        let row = (self.row() + lane) & 3;
        if self.transposed() {
            self.matrix() * 4 + row + self.column() * 32
        } else {
            self.matrix() * 4 + self.column() + row * 32
        }
    }

    /// State slots of all lanes, in lane order
    pub fn slots(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.size.lanes()).map(move |lane| self.slot(lane))
    }

    /// True if the lanes occupy consecutive state slots
    pub fn is_contiguous(&self) -> bool {
        (1..self.size.lanes()).all(|lane| self.slot(lane) == self.slot(0) + lane)
    }

    pub fn overlaps(&self, other: &VecReg) -> bool {
        self.slots().any(|a| other.slots().any(|b| a == b))
    }
}

impl fmt::Display for VecReg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prefix = match (self.size, self.transposed()) {
            (VectorSize::Single, _) => 'S',
            (_, true) => 'R',
            (_, false) => 'C',
        };
        if self.transposed() {
            write!(f, "{}{}{}{}", prefix, self.matrix(), self.row(), self.column())
        } else {
            write!(f, "{}{}{}{}", prefix, self.matrix(), self.column(), self.row())
        }
    }
}
