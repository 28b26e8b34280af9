//! Operand prefixes.
//!
//! `vpfxs`/`vpfxt` set up a transform for the next instruction's source operands, `vpfxd` a
//! saturation and write mask for its destination. The words are decoded here into per lane
//! descriptors; the jit turns those into host operations and the reference interpreter applies
//! them directly.

use modular_bitfield::{bitfield, specifiers::*};
use thiserror::Error;

use common::util::LaneMask;

use crate::regs::VectorSize;

/// Source prefix with no transform (x, y, z, w)
pub const SOURCE_IDENTITY: u32 = 0xe4;
/// Destination prefix with no saturation and all lanes written
pub const DEST_IDENTITY: u32 = 0;

/// Indexed by `selector + 4 * abs`
pub const CONSTANTS: [f32; 8] = [0.0, 1.0, 2.0, 0.5, 3.0, 1.0 / 3.0, 0.25, 1.0 / 6.0];

#[bitfield(bits = 32)]
#[derive(Debug, Copy, Clone)]
pub struct SourcePrefixBits {
    pub swizzle: B8,
    pub abs: B4,
    pub constant: B4,
    pub negate: B4,
    #[skip]
    __: B12,
}

#[bitfield(bits = 32)]
#[derive(Debug, Copy, Clone)]
pub struct DestPrefixBits {
    pub sat: B8,
    pub mask: B4,
    #[skip]
    __: B20,
}

impl From<u32> for SourcePrefixBits {
    fn from(word: u32) -> Self {
        SourcePrefixBits::from_bytes(word.to_le_bytes())
    }
}

impl From<u32> for DestPrefixBits {
    fn from(word: u32) -> Self {
        DestPrefixBits::from_bytes(word.to_le_bytes())
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum PrefixKind {
    S,
    T,
    D,
}

impl PrefixKind {
    pub const ALL: [PrefixKind; 3] = [PrefixKind::S, PrefixKind::T, PrefixKind::D];

    /// From the 3 bit sub-opcode of `vpfx*`
    pub fn from_subop(subop: u8) -> PrefixKind {
        match subop >> 1 {
            0 => PrefixKind::S,
            1 => PrefixKind::T,
            _ => PrefixKind::D,
        }
    }

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn default_value(self) -> u32 {
        match self {
            PrefixKind::S | PrefixKind::T => SOURCE_IDENTITY,
            PrefixKind::D => DEST_IDENTITY,
        }
    }

    /// Only the low bits are stored by the hardware
    pub fn value_mask(self) -> u32 {
        match self {
            PrefixKind::S | PrefixKind::T => 0xf_ffff,
            PrefixKind::D => 0xfff,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Error)]
pub enum PrefixError {
    #[error("destination prefix mixes [0,1] and [-1,1] saturation")]
    MixedSaturation,
    #[error("{kind:?} prefix {value:#x} does not fit a {lanes} lane operand")]
    LaneMismatch { kind: PrefixKind, value: u32, lanes: usize },
}

/// Decoded source prefix for an `n` lane operand.
///
/// Lanes in `constant` take their value from `constants`, the others read lane `select[i]` of
/// the register and then apply `abs` and `negate` (both only ever set for non-constant lanes).
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct SourcePrefix {
    pub size: VectorSize,
    pub select: [u8; 4],
    pub constant: LaneMask,
    pub abs: LaneMask,
    pub negate: LaneMask,
    pub constants: [f32; 4],
}

impl SourcePrefix {
    pub fn decode(kind: PrefixKind, value: u32, size: VectorSize) -> Result<SourcePrefix, PrefixError> {
        let bits = SourcePrefixBits::from(value);
        let n = size.lanes();
        let mismatch = PrefixError::LaneMismatch { kind, value, lanes: n };

        let mut prefix = SourcePrefix {
            size,
            select: [0, 1, 2, 3],
            constant: LaneMask::EMPTY,
            abs: LaneMask::EMPTY,
            negate: LaneMask::EMPTY,
            constants: [0.0; 4],
        };

        for lane in 0..4 {
            let selector = (bits.swizzle() >> (lane * 2)) & 3;
            let abs = (bits.abs() >> lane) & 1 != 0;
            let constant = (bits.constant() >> lane) & 1 != 0;
            let negate = (bits.negate() >> lane) & 1 != 0;

            if lane >= n {
                if selector as usize != lane || abs || constant || negate {
                    return Err(mismatch);
                }
                continue;
            }

            if constant {
                let value = CONSTANTS[selector as usize + 4 * abs as usize];
                prefix.constant.insert(lane);
                prefix.constants[lane] = if negate { -value } else { value };
                continue;
            }

            if selector as usize >= n {
                return Err(mismatch);
            }
            prefix.select[lane] = selector;
            if abs {
                prefix.abs.insert(lane);
            }
            if negate {
                prefix.negate.insert(lane);
            }
        }

        Ok(prefix)
    }

    pub fn lanes(&self) -> usize {
        self.size.lanes()
    }

    pub fn all_constant(&self) -> bool {
        self.constant == self.size.full_mask()
    }

    /// Lanes that read from the register
    pub fn register_lanes(&self) -> LaneMask {
        self.constant.complement(self.lanes())
    }

    /// True if some register lane reads a lane other than its own
    pub fn is_permuted(&self) -> bool {
        self.register_lanes().iter().any(|lane| self.select[lane] as usize != lane)
    }

    /// The lane every register lane reads, if they all read the same one and there is more
    /// than one of them
    pub fn broadcast_lane(&self) -> Option<u8> {
        let mut lanes = self.register_lanes().iter();
        let first = self.select[lanes.next()?];
        let mut count = 1;
        for lane in lanes {
            if self.select[lane] != first {
                return None;
            }
            count += 1;
        }
        (count > 1).then_some(first)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum SatMode {
    None,
    /// Clamp to [0, 1]
    ZeroOne,
    /// Clamp to [-1, 1]
    MinusOneOne,
}

impl SatMode {
    fn from_bits(bits: u8) -> SatMode {
        match bits & 3 {
            1 => SatMode::ZeroOne,
            3 => SatMode::MinusOneOne,
            // 2 has no documented meaning and behaves like no saturation
            _ => SatMode::None,
        }
    }

    pub fn bounds(self) -> Option<(f32, f32)> {
        match self {
            SatMode::None => None,
            SatMode::ZeroOne => Some((0.0, 1.0)),
            SatMode::MinusOneOne => Some((-1.0, 1.0)),
        }
    }
}

/// Decoded destination prefix for an `n` lane operand
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct DestPrefix {
    pub size: VectorSize,
    /// Lanes that are written. The encoding stores the inverse.
    pub write: LaneMask,
    pub sat: [SatMode; 4],
}

impl DestPrefix {
    pub fn decode(value: u32, size: VectorSize) -> Result<DestPrefix, PrefixError> {
        let bits = DestPrefixBits::from(value);
        let n = size.lanes();

        let mut prefix = DestPrefix {
            size,
            write: LaneMask::EMPTY,
            sat: [SatMode::None; 4],
        };

        for lane in 0..4 {
            let sat_bits = (bits.sat() >> (lane * 2)) & 3;
            let masked = (bits.mask() >> lane) & 1 != 0;
            if lane >= n {
                if sat_bits != 0 || masked {
                    return Err(PrefixError::LaneMismatch {
                        kind: PrefixKind::D,
                        value,
                        lanes: n,
                    });
                }
                continue;
            }
            if !masked {
                prefix.write.insert(lane);
            }
            prefix.sat[lane] = SatMode::from_bits(sat_bits);
        }

        if !prefix.saturation_mask(SatMode::ZeroOne).is_empty()
            && !prefix.saturation_mask(SatMode::MinusOneOne).is_empty()
        {
            return Err(PrefixError::MixedSaturation);
        }

        Ok(prefix)
    }

    pub fn writes_all(&self) -> bool {
        self.write == self.size.full_mask()
    }

    /// Written lanes saturated with `mode`
    pub fn saturation_mask(&self, mode: SatMode) -> LaneMask {
        let mut mask = LaneMask::EMPTY;
        for lane in self.write.iter() {
            if self.sat[lane] == mode {
                mask.insert(lane);
            }
        }
        mask
    }

    /// The one saturation mode in use, with the lanes it applies to
    pub fn saturation(&self) -> Option<(SatMode, LaneMask)> {
        [SatMode::ZeroOne, SatMode::MinusOneOne]
            .into_iter()
            .map(|mode| (mode, self.saturation_mask(mode)))
            .find(|(_, mask)| !mask.is_empty())
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum PrefixFlag {
    /// Value unknown at compile time, only the context has it
    Unknown,
    /// Value known and already in the context
    Known,
    /// Value known, the context is stale
    KnownDirty,
}

/// Compile time view of the three prefix control registers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrefixState {
    values: [u32; 3],
    flags: [PrefixFlag; 3],
}

impl PrefixState {
    pub fn known_default() -> PrefixState {
        PrefixState {
            values: PrefixKind::ALL.map(PrefixKind::default_value),
            flags: [PrefixFlag::Known; 3],
        }
    }

    pub fn unknown() -> PrefixState {
        PrefixState {
            values: PrefixKind::ALL.map(PrefixKind::default_value),
            flags: [PrefixFlag::Unknown; 3],
        }
    }

    pub fn value(&self, kind: PrefixKind) -> u32 {
        self.values[kind.index()]
    }

    pub fn flag(&self, kind: PrefixKind) -> PrefixFlag {
        self.flags[kind.index()]
    }

    pub fn has_unknown_prefix(&self) -> bool {
        self.flags.contains(&PrefixFlag::Unknown)
    }

    /// All prefixes known to hold their defaults
    pub fn has_no_prefix(&self) -> bool {
        PrefixKind::ALL
            .iter()
            .all(|&kind| self.flag(kind) != PrefixFlag::Unknown && self.value(kind) == kind.default_value())
    }

    pub fn set(&mut self, kind: PrefixKind, value: u32) {
        self.values[kind.index()] = value & kind.value_mask();
        self.flags[kind.index()] = PrefixFlag::KnownDirty;
    }

    /// An instruction consumed the prefixes; they revert to the defaults
    pub fn eat_prefix(&mut self) {
        for kind in PrefixKind::ALL {
            let i = kind.index();
            if self.flags[i] == PrefixFlag::Unknown || self.values[i] != kind.default_value() {
                self.values[i] = kind.default_value();
                self.flags[i] = PrefixFlag::KnownDirty;
            }
        }
    }

    pub fn mark_unknown(&mut self) {
        self.flags = [PrefixFlag::Unknown; 3];
    }

    /// The interpreter consumed the prefixes itself, so the context already holds the defaults
    pub fn mark_known_default(&mut self) {
        *self = PrefixState::known_default();
    }

    pub fn dirty(&self) -> impl Iterator<Item = (PrefixKind, u32)> + '_ {
        PrefixKind::ALL
            .into_iter()
            .filter(|&kind| self.flag(kind) == PrefixFlag::KnownDirty)
            .map(|kind| (kind, self.value(kind)))
    }

    pub fn mark_clean(&mut self) {
        for flag in self.flags.iter_mut() {
            if *flag == PrefixFlag::KnownDirty {
                *flag = PrefixFlag::Known;
            }
        }
    }
}

impl Default for PrefixState {
    fn default() -> Self {
        PrefixState::known_default()
    }
}

fn fmt_constant(index: usize, negate: bool) -> String {
    const NAMES: [&str; 8] = ["0", "1", "2", "1/2", "3", "1/3", "1/4", "1/6"];
    format!("{}{}", if negate { "-" } else { "" }, NAMES[index])
}

/// Text form of a source prefix, e.g. `[x, -|y|, 1/2, w]`
pub fn fmt_source_prefix(value: u32) -> String {
    let bits = SourcePrefixBits::from(value);
    let lanes: Vec<String> = (0..4)
        .map(|lane| {
            let selector = ((bits.swizzle() >> (lane * 2)) & 3) as usize;
            let abs = (bits.abs() >> lane) & 1 != 0;
            let negate = (bits.negate() >> lane) & 1 != 0;
            if (bits.constant() >> lane) & 1 != 0 {
                return fmt_constant(selector + 4 * abs as usize, negate);
            }
            let name = ["x", "y", "z", "w"][selector];
            let name = if abs { format!("|{}|", name) } else { name.to_string() };
            if negate {
                format!("-{}", name)
            } else {
                name
            }
        })
        .collect();
    format!("[{}]", lanes.join(", "))
}

/// Text form of a destination prefix, e.g. `[0:1, m, , -1:1]`
pub fn fmt_dest_prefix(value: u32) -> String {
    let bits = DestPrefixBits::from(value);
    let lanes: Vec<&str> = (0..4)
        .map(|lane| {
            if (bits.mask() >> lane) & 1 != 0 {
                return "m";
            }
            match SatMode::from_bits(bits.sat() >> (lane * 2)) {
                SatMode::None => "",
                SatMode::ZeroOne => "0:1",
                SatMode::MinusOneOne => "-1:1",
            }
        })
        .collect();
    format!("[{}]", lanes.join(", "))
}
