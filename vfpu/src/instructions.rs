use modular_bitfield::{bitfield, specifiers::*};

use crate::prefix::{fmt_dest_prefix, fmt_source_prefix, PrefixKind};
use crate::regs::{VecReg, VectorSize};

/// Three register vector form: `vd`, `vs`, `vt` with the size bits scattered in between
#[bitfield(bits = 32)]
#[derive(Debug, Copy, Clone)]
pub struct VType {
    pub vd: B7,
    #[skip]
    size_lo: B1,
    pub vs: B7,
    #[skip]
    size_hi: B1,
    pub vt: B7,
    pub subop: B3,
    pub op: B6,
}

/// Unary form. The `vt` field of `VType` holds a sub-opcode and a group selector.
#[bitfield(bits = 32)]
#[derive(Debug, Copy, Clone)]
pub struct VUnaryType {
    pub vd: B7,
    #[skip]
    size_lo: B1,
    pub vs: B7,
    #[skip]
    size_hi: B1,
    pub subop: B5,
    pub group: B5,
    pub op: B6,
}

/// lv.s/sv.s/lv.q/sv.q. The low bits extend `vt` and the offset is in words.
#[bitfield(bits = 32)]
#[derive(Debug, Copy, Clone)]
pub struct VLsType {
    pub vt_hi: B2,
    pub offset: B14,
    pub vt: B5,
    pub rs: B5,
    pub op: B6,
}

/// viim/vfim
#[bitfield(bits = 32)]
#[derive(Debug, Copy, Clone)]
pub struct VImmType {
    pub imm: B16,
    pub vt: B7,
    pub subop: B3,
    pub op: B6,
}

/// vpfxs/vpfxt/vpfxd
#[bitfield(bits = 32)]
#[derive(Debug, Copy, Clone)]
pub struct VpfxType {
    pub value: B20,
    #[skip]
    __: B3,
    pub subop: B3,
    pub op: B6,
}

macro_rules! word_conversions {
    ($($ty:ident),*) => {
        $(
            impl From<u32> for $ty {
                fn from(word: u32) -> $ty {
                    $ty::from_bytes(word.to_le_bytes())
                }
            }
            impl From<$ty> for u32 {
                fn from(inst: $ty) -> u32 {
                    u32::from_le_bytes(inst.into_bytes())
                }
            }
        )*
    };
}

word_conversions!(VType, VUnaryType, VLsType, VImmType, VpfxType);

/// Opcode classes. Each class has one compiler entry point.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum OpClass {
    VecDo3,
    VV2Op,
    VScl,
    VDot,
    VHdp,
    VCrs,
    VDet,
    Vcmp,
    Vcmov,
    Vcst,
    Vhoriz,
    VRot,
    VCrossQuat,
    Vmmov,
    Vmmul,
    Vmscl,
    Vtfm,
    VMatrixInit,
    VVectorInit,
    VIdt,
    Viim,
    Vfim,
    Vpfx,
    Svq,
    Sv,
    Vi2f,
    Vf2i,
    Vi2x,
    Vx2i,
    Vh2f,
    Vsgn,
    Vocp,
    Mftv,
    Vmtvc,
    Nop,
    /// Everything else in the VFPU encoding space, always interpreted
    Other,
}

impl OpClass {
    /// Classes that consume the pending prefixes and reset them to the defaults
    pub fn eats_prefix(self) -> bool {
        use OpClass::*;
        !matches!(self, Vpfx | Svq | Sv | Mftv | Vmtvc | Nop)
    }

    /// Classes that may write the prefix control registers behind the compiler's back
    pub fn writes_control(self) -> bool {
        matches!(self, OpClass::Mftv | OpClass::Vmtvc)
    }
}

#[derive(Debug, Clone, Copy)]
pub enum InstructionInfo {
    Reserved,
    NotVfpu,
    Cop2,
    Vfpu0,
    Vfpu1,
    Vfpu3,
    Vfpu4Jump,
    Vfpu4,
    Vfpu7,
    Vfpu9,
    Vfpu5,
    Vfpu6,
    VfpuMatrix1,
    LvLr,
    SvLr,
    Sync,
    Op(&'static str, OpClass),
}

impl InstructionInfo {
    pub fn name(&self) -> &'static str {
        match self {
            InstructionInfo::Op(name, _) => name,
            InstructionInfo::NotVfpu => "(not vfpu)",
            _ => "Reserved",
        }
    }

    pub fn class(&self) -> Option<OpClass> {
        match self {
            InstructionInfo::Op(_, class) => Some(*class),
            _ => None,
        }
    }
}

/// A fetched instruction word
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct VfpuOp(pub u32);

impl VfpuOp {
    pub fn primary(self) -> u32 {
        self.0 >> 26
    }

    pub fn v(self) -> VType {
        self.0.into()
    }

    pub fn unary(self) -> VUnaryType {
        self.0.into()
    }

    pub fn ls(self) -> VLsType {
        self.0.into()
    }

    pub fn imm(self) -> VImmType {
        self.0.into()
    }

    pub fn pfx(self) -> VpfxType {
        self.0.into()
    }

    pub fn vector_size(self) -> VectorSize {
        VectorSize::from_op(self.0)
    }

    pub fn info(self) -> &'static InstructionInfo {
        decode(self.0)
    }

    pub fn name(self) -> &'static str {
        self.info().name()
    }

    /// Provides a string representation of the instruction (as disassembly)
    pub fn disassemble(self) -> String {
        let info = self.info();
        let class = match info.class() {
            Some(class) => class,
            None => return format!("{:<10} {:#010x}", info.name(), self.0),
        };

        let sz = self.vector_size();
        let v = self.v();
        let vd = VecReg::new(v.vd(), sz);
        let vs = VecReg::new(v.vs(), sz);
        let vt = VecReg::new(v.vt(), sz);
        let single = |index: u8| VecReg::new(index, VectorSize::Single);

        use OpClass::*;
        let (suffix, args): (&str, Vec<String>) = match class {
            VecDo3 | VCrs | Vcmp => (sz.suffix(), vec![vd.to_string(), vs.to_string(), vt.to_string()]),
            VDot | VHdp | VDet => (
                sz.suffix(),
                vec![single(v.vd()).to_string(), vs.to_string(), vt.to_string()],
            ),
            VScl => (
                sz.suffix(),
                vec![vd.to_string(), vs.to_string(), single(v.vt()).to_string()],
            ),
            VV2Op | Vsgn | Vocp | Vi2f | Vf2i | Vi2x | Vx2i | Vh2f | Vhoriz | Vcmov => {
                (sz.suffix(), vec![vd.to_string(), vs.to_string()])
            }
            VVectorInit | VIdt | Vcst => (sz.suffix(), vec![vd.to_string()]),
            Vmmov | Vmmul | Vmscl | Vtfm | VMatrixInit | VRot | VCrossQuat => {
                // no 1x1 matrices
                let suffix = match sz {
                    VectorSize::Single => "",
                    _ => sz.suffix(),
                };
                (suffix, vec![format!("M{:03}", v.vd()), format!("M{:03}", v.vs())])
            }
            Viim | Vfim => {
                let imm = self.imm();
                let value = if class == Viim {
                    format!("{}", imm.imm() as i16)
                } else {
                    format!("{}", half::f16::from_bits(imm.imm()).to_f32())
                };
                ("", vec![single(imm.vt()).to_string(), value])
            }
            Vpfx => {
                let p = self.pfx();
                let text = match PrefixKind::from_subop(p.subop()) {
                    PrefixKind::D => fmt_dest_prefix(p.value() & 0xfff),
                    _ => fmt_source_prefix(p.value()),
                };
                ("", vec![text])
            }
            Svq | Sv => {
                let ls = self.ls();
                let reg = if class == Svq {
                    VecReg::new(ls.vt() | ((ls.vt_hi() & 1) << 5), VectorSize::Quad)
                } else {
                    VecReg::new(ls.vt() | (ls.vt_hi() << 5), VectorSize::Single)
                };
                let offset = ls_offset(ls);
                let sign = if offset < 0 { "-" } else { "" };
                (
                    "",
                    vec![
                        reg.to_string(),
                        format!("{}{:#x}({})", sign, offset.unsigned_abs(), MIPS_REG_NAMES[ls.rs() as usize]),
                    ],
                )
            }
            Mftv | Vmtvc | Nop | Other => ("", vec![]),
        };

        let mnemonic = format!("{}{}", info.name(), suffix);
        if args.is_empty() {
            mnemonic
        } else {
            format!("{:<10} {}", mnemonic, args.join(", "))
        }
    }
}

/// Byte offset of a vector load/store, sign extended
pub fn ls_offset(ls: VLsType) -> i32 {
    ((ls.offset() << 2) as u16 as i16) as i32
}

pub const MIPS_REG_NAMES: [&'static str; 32] = [
    "$zero", "$at", "$v0", "$v1", "$a0", "$a1", "$a2", "$a3",
    "$t0", "$t1", "$t2", "$t3", "$t4", "$t5", "$t6", "$t7",
    "$s0", "$s1", "$s2", "$s3", "$s4", "$s5", "$s6", "$s7",
    "$t8", "$t9", "$k0", "$k1", "$gp", "$sp", "$fp", "$ra",
];

pub fn decode(word: u32) -> &'static InstructionInfo {
    let v = VType::from(word);
    let u = VUnaryType::from(word);

    let mut info = &PRIMARY_TABLE[(word >> 26) as usize];
    loop {
        info = match info {
            InstructionInfo::Cop2 => &COP2_TABLE[((word >> 21) & 0x1f) as usize],
            InstructionInfo::Vfpu0 => &VFPU0_TABLE[v.subop() as usize],
            InstructionInfo::Vfpu1 => &VFPU1_TABLE[v.subop() as usize],
            InstructionInfo::Vfpu3 => &VFPU3_TABLE[v.subop() as usize],
            InstructionInfo::Vfpu5 => &VFPU5_TABLE[v.subop() as usize],
            InstructionInfo::Vfpu4Jump => &VFPU4_JUMP_TABLE[u.group() as usize],
            InstructionInfo::Vfpu4 => &VFPU4_TABLE[u.subop() as usize],
            InstructionInfo::Vfpu7 => &VFPU7_TABLE[u.subop() as usize],
            InstructionInfo::Vfpu9 => &VFPU9_TABLE[u.subop() as usize],
            InstructionInfo::Vfpu6 => &VFPU6_TABLE[u.group() as usize],
            InstructionInfo::VfpuMatrix1 => &VFPU_MATRIX1_TABLE[u.subop() as usize],
            InstructionInfo::LvLr => &LVLR_TABLE[((word >> 1) & 1) as usize],
            InstructionInfo::SvLr => &SVLR_TABLE[((word >> 1) & 1) as usize],
            InstructionInfo::Sync => match word {
                0xffff_0000 => &VNOP,
                0xffff_0320 => &VSYNC,
                0xffff_040d => &VFLUSH,
                _ => &InstructionInfo::Reserved,
            },
            InstructionInfo::Op(..) | InstructionInfo::Reserved | InstructionInfo::NotVfpu => {
                return info;
            }
        };
    }
}

const VNOP: InstructionInfo = InstructionInfo::Op("vnop", OpClass::Nop);
const VSYNC: InstructionInfo = InstructionInfo::Op("vsync", OpClass::Nop);
const VFLUSH: InstructionInfo = InstructionInfo::Op("vflush", OpClass::Nop);

const fn build_primary_table() -> [InstructionInfo; 64] {
    use InstructionInfo::*;

    let mut table = [NotVfpu; 64];
    table[18] = Cop2;
    table[24] = Vfpu0;
    table[25] = Vfpu1;
    table[26] = Reserved;
    table[27] = Vfpu3;
    table[50] = Op("lv.s", OpClass::Sv);
    table[52] = Vfpu4Jump;
    table[53] = LvLr;
    table[54] = Op("lv.q", OpClass::Svq);
    table[55] = Vfpu5;
    table[58] = Op("sv.s", OpClass::Sv);
    table[60] = Vfpu6;
    table[61] = SvLr;
    table[62] = Op("sv.q", OpClass::Svq);
    table[63] = Sync;
    table
}

const fn build_cop2_table() -> [InstructionInfo; 32] {
    use InstructionInfo::*;

    // Only the VFPU transfer ops live here. bc2 and friends belong to the branch compiler.
    let mut table = [NotVfpu; 32];
    table[3] = Op("mfv", OpClass::Mftv);
    table[7] = Op("mtv", OpClass::Mftv);
    table
}

const fn build_vfpu0_table() -> [InstructionInfo; 8] {
    use InstructionInfo::*;
    use OpClass::*;
    [
        Op("vadd", VecDo3),
        Op("vsub", VecDo3),
        Op("vsbn", VecDo3),
        Reserved,
        Reserved,
        Reserved,
        Reserved,
        Op("vdiv", VecDo3),
    ]
}

const fn build_vfpu1_table() -> [InstructionInfo; 8] {
    use InstructionInfo::*;
    use OpClass::*;
    [
        Op("vmul", VecDo3),
        Op("vdot", VDot),
        Op("vscl", VScl),
        Reserved,
        Op("vhdp", VHdp),
        Op("vcrs", VCrs),
        Op("vdet", VDet),
        Reserved,
    ]
}

const fn build_vfpu3_table() -> [InstructionInfo; 8] {
    use InstructionInfo::*;
    use OpClass::*;
    [
        Op("vcmp", Vcmp),
        Reserved,
        Op("vmin", VecDo3),
        Op("vmax", VecDo3),
        Reserved,
        Op("vscmp", VecDo3),
        Op("vsge", VecDo3),
        Op("vslt", VecDo3),
    ]
}

const fn build_vfpu5_table() -> [InstructionInfo; 8] {
    use InstructionInfo::*;
    use OpClass::*;
    [
        Op("vpfxs", Vpfx),
        Op("vpfxs", Vpfx),
        Op("vpfxt", Vpfx),
        Op("vpfxt", Vpfx),
        Op("vpfxd", Vpfx),
        Op("vpfxd", Vpfx),
        Op("viim", Viim),
        Op("vfim", Vfim),
    ]
}

const fn build_vfpu4_jump_table() -> [InstructionInfo; 32] {
    use InstructionInfo::*;
    use OpClass::*;

    let mut table = [Reserved; 32];
    table[0] = Vfpu4;
    table[1] = Vfpu7;
    table[2] = Vfpu9;
    table[3] = Op("vcst", Vcst);
    table[16] = Op("vf2in", Vf2i);
    table[17] = Op("vf2iz", Vf2i);
    table[18] = Op("vf2iu", Vf2i);
    table[19] = Op("vf2id", Vf2i);
    table[20] = Op("vi2f", Vi2f);
    table[21] = Op("vcmov", Vcmov);
    table[24] = Op("vwbn", Other);
    table
}

const fn build_vfpu4_table() -> [InstructionInfo; 32] {
    use InstructionInfo::*;
    use OpClass::*;

    let mut table = [Reserved; 32];
    table[0] = Op("vmov", VV2Op);
    table[1] = Op("vabs", VV2Op);
    table[2] = Op("vneg", VV2Op);
    table[3] = Op("vidt", VIdt);
    table[4] = Op("vsat0", VV2Op);
    table[5] = Op("vsat1", VV2Op);
    table[6] = Op("vzero", VVectorInit);
    table[7] = Op("vone", VVectorInit);
    // 8..15 reserved
    table[16] = Op("vrcp", VV2Op);
    table[17] = Op("vrsq", VV2Op);
    table[18] = Op("vsin", VV2Op);
    table[19] = Op("vcos", VV2Op);
    table[20] = Op("vexp2", VV2Op);
    table[21] = Op("vlog2", VV2Op);
    table[22] = Op("vsqrt", VV2Op);
    table[23] = Op("vasin", VV2Op);
    table[24] = Op("vnrcp", VV2Op);
    table[26] = Op("vnsin", VV2Op);
    table[28] = Op("vrexp2", VV2Op);
    table
}

const fn build_vfpu7_table() -> [InstructionInfo; 32] {
    use InstructionInfo::*;
    use OpClass::*;

    let mut table = [Reserved; 32];
    table[0] = Op("vrnds", Other);
    table[1] = Op("vrndi", Other);
    table[2] = Op("vrndf1", Other);
    table[3] = Op("vrndf2", Other);
    table[18] = Op("vf2h", Other);
    table[19] = Op("vh2f", Vh2f);
    table[22] = Op("vsbz", Other);
    table[23] = Op("vlgb", Other);
    table[24] = Op("vuc2i", Vx2i);
    table[25] = Op("vc2i", Vx2i);
    table[26] = Op("vus2i", Vx2i);
    table[27] = Op("vs2i", Vx2i);
    table[28] = Op("vi2uc", Vi2x);
    table[29] = Op("vi2c", Vi2x);
    table[30] = Op("vi2us", Vi2x);
    table[31] = Op("vi2s", Vi2x);
    table
}

const fn build_vfpu9_table() -> [InstructionInfo; 32] {
    use InstructionInfo::*;
    use OpClass::*;

    let mut table = [Reserved; 32];
    table[0] = Op("vsrt1", Other);
    table[1] = Op("vsrt2", Other);
    table[2] = Op("vbfy1", Other);
    table[3] = Op("vbfy2", Other);
    table[4] = Op("vocp", Vocp);
    table[5] = Op("vsocp", Other);
    table[6] = Op("vfad", Vhoriz);
    table[7] = Op("vavg", Vhoriz);
    table[8] = Op("vsrt3", Other);
    table[9] = Op("vsrt4", Other);
    table[10] = Op("vsgn", Vsgn);
    table[16] = Op("vmfvc", Mftv);
    table[17] = Op("vmtvc", Vmtvc);
    table[25] = Op("vt4444", Other);
    table[26] = Op("vt5551", Other);
    table[27] = Op("vt5650", Other);
    table
}

const fn build_vfpu6_table() -> [InstructionInfo; 32] {
    use InstructionInfo::*;
    use OpClass::*;

    let mut table = [Reserved; 32];
    let mut i = 0;
    while i < 4 {
        table[i] = Op("vmmul", Vmmul);
        table[4 + i] = Op("vtfm2", Vtfm);
        table[8 + i] = Op("vtfm3", Vtfm);
        table[12 + i] = Op("vtfm4", Vtfm);
        table[16 + i] = Op("vmscl", Vmscl);
        i += 1;
    }
    table[20] = Op("vcrsp", VCrossQuat);
    table[21] = Op("vqmul", VCrossQuat);
    table[28] = VfpuMatrix1;
    table[29] = Op("vrot", VRot);
    table[30] = Op("vrot", VRot);
    table[31] = Op("vrot", VRot);
    table
}

const fn build_vfpu_matrix1_table() -> [InstructionInfo; 32] {
    use InstructionInfo::*;
    use OpClass::*;

    let mut table = [Reserved; 32];
    table[0] = Op("vmmov", Vmmov);
    table[3] = Op("vmidt", VMatrixInit);
    table[6] = Op("vmzero", VMatrixInit);
    table[7] = Op("vmone", VMatrixInit);
    table
}

const PRIMARY_TABLE: [InstructionInfo; 64] = build_primary_table();
const COP2_TABLE: [InstructionInfo; 32] = build_cop2_table();
const VFPU0_TABLE: [InstructionInfo; 8] = build_vfpu0_table();
const VFPU1_TABLE: [InstructionInfo; 8] = build_vfpu1_table();
const VFPU3_TABLE: [InstructionInfo; 8] = build_vfpu3_table();
const VFPU5_TABLE: [InstructionInfo; 8] = build_vfpu5_table();
const VFPU4_JUMP_TABLE: [InstructionInfo; 32] = build_vfpu4_jump_table();
const VFPU4_TABLE: [InstructionInfo; 32] = build_vfpu4_table();
const VFPU7_TABLE: [InstructionInfo; 32] = build_vfpu7_table();
const VFPU9_TABLE: [InstructionInfo; 32] = build_vfpu9_table();
const VFPU6_TABLE: [InstructionInfo; 32] = build_vfpu6_table();
const VFPU_MATRIX1_TABLE: [InstructionInfo; 32] = build_vfpu_matrix1_table();
const LVLR_TABLE: [InstructionInfo; 2] = [
    InstructionInfo::Op("lvl.q", OpClass::Svq),
    InstructionInfo::Op("lvr.q", OpClass::Svq),
];
const SVLR_TABLE: [InstructionInfo; 2] = [
    InstructionInfo::Op("svl.q", OpClass::Svq),
    InstructionInfo::Op("svr.q", OpClass::Svq),
];

/// Builders for instruction words, used by tests and tooling
pub mod encode {
    use super::*;

    pub fn vec3(op: u8, subop: u8, size: VectorSize, vd: u8, vs: u8, vt: u8) -> u32 {
        let word: u32 = VType::new()
            .with_op(op)
            .with_subop(subop)
            .with_vd(vd & 0x7f)
            .with_vs(vs & 0x7f)
            .with_vt(vt & 0x7f)
            .into();
        word | size.encode()
    }

    pub fn unary(group: u8, subop: u8, size: VectorSize, vd: u8, vs: u8) -> u32 {
        let word: u32 = VUnaryType::new()
            .with_op(52)
            .with_group(group)
            .with_subop(subop)
            .with_vd(vd & 0x7f)
            .with_vs(vs & 0x7f)
            .into();
        word | size.encode()
    }

    pub fn vadd(size: VectorSize, vd: u8, vs: u8, vt: u8) -> u32 {
        vec3(24, 0, size, vd, vs, vt)
    }

    pub fn vsub(size: VectorSize, vd: u8, vs: u8, vt: u8) -> u32 {
        vec3(24, 1, size, vd, vs, vt)
    }

    pub fn vdiv(size: VectorSize, vd: u8, vs: u8, vt: u8) -> u32 {
        vec3(24, 7, size, vd, vs, vt)
    }

    pub fn vmul(size: VectorSize, vd: u8, vs: u8, vt: u8) -> u32 {
        vec3(25, 0, size, vd, vs, vt)
    }

    pub fn vdot(size: VectorSize, vd: u8, vs: u8, vt: u8) -> u32 {
        vec3(25, 1, size, vd, vs, vt)
    }

    pub fn vscl(size: VectorSize, vd: u8, vs: u8, vt: u8) -> u32 {
        vec3(25, 2, size, vd, vs, vt)
    }

    pub fn vmin(size: VectorSize, vd: u8, vs: u8, vt: u8) -> u32 {
        vec3(27, 2, size, vd, vs, vt)
    }

    pub fn vmax(size: VectorSize, vd: u8, vs: u8, vt: u8) -> u32 {
        vec3(27, 3, size, vd, vs, vt)
    }

    pub fn vsge(size: VectorSize, vd: u8, vs: u8, vt: u8) -> u32 {
        vec3(27, 6, size, vd, vs, vt)
    }

    pub fn vslt(size: VectorSize, vd: u8, vs: u8, vt: u8) -> u32 {
        vec3(27, 7, size, vd, vs, vt)
    }

    pub fn vmov(size: VectorSize, vd: u8, vs: u8) -> u32 {
        unary(0, 0, size, vd, vs)
    }

    pub fn vabs(size: VectorSize, vd: u8, vs: u8) -> u32 {
        unary(0, 1, size, vd, vs)
    }

    pub fn vneg(size: VectorSize, vd: u8, vs: u8) -> u32 {
        unary(0, 2, size, vd, vs)
    }

    pub fn vidt(size: VectorSize, vd: u8) -> u32 {
        unary(0, 3, size, vd, 0)
    }

    pub fn vsat0(size: VectorSize, vd: u8, vs: u8) -> u32 {
        unary(0, 4, size, vd, vs)
    }

    pub fn vsat1(size: VectorSize, vd: u8, vs: u8) -> u32 {
        unary(0, 5, size, vd, vs)
    }

    pub fn vzero(size: VectorSize, vd: u8) -> u32 {
        unary(0, 6, size, vd, 0)
    }

    pub fn vone(size: VectorSize, vd: u8) -> u32 {
        unary(0, 7, size, vd, 0)
    }

    pub fn vrcp(size: VectorSize, vd: u8, vs: u8) -> u32 {
        unary(0, 16, size, vd, vs)
    }

    pub fn vsin(size: VectorSize, vd: u8, vs: u8) -> u32 {
        unary(0, 18, size, vd, vs)
    }

    pub fn vsqrt(size: VectorSize, vd: u8, vs: u8) -> u32 {
        unary(0, 22, size, vd, vs)
    }

    pub fn vnrcp(size: VectorSize, vd: u8, vs: u8) -> u32 {
        unary(0, 24, size, vd, vs)
    }

    fn pfx(subop: u8, value: u32) -> u32 {
        VpfxType::new()
            .with_op(55)
            .with_subop(subop)
            .with_value(value & 0xf_ffff)
            .into()
    }

    pub fn vpfxs(value: u32) -> u32 {
        pfx(0, value)
    }

    pub fn vpfxt(value: u32) -> u32 {
        pfx(2, value)
    }

    pub fn vpfxd(value: u32) -> u32 {
        pfx(4, value & 0xfff)
    }

    pub fn viim(vt: u8, imm: i16) -> u32 {
        VImmType::new()
            .with_op(55)
            .with_subop(6)
            .with_vt(vt & 0x7f)
            .with_imm(imm as u16)
            .into()
    }

    pub fn vfim(vt: u8, half_bits: u16) -> u32 {
        VImmType::new()
            .with_op(55)
            .with_subop(7)
            .with_vt(vt & 0x7f)
            .with_imm(half_bits)
            .into()
    }

    fn ls(op: u8, vt: u8, vt_hi: u8, rs: u8, offset: i16) -> u32 {
        debug_assert!(offset & 3 == 0);
        VLsType::new()
            .with_op(op)
            .with_rs(rs & 0x1f)
            .with_vt(vt & 0x1f)
            .with_vt_hi(vt_hi)
            .with_offset(((offset as u16) >> 2) & 0x3fff)
            .into()
    }

    pub fn lv_q(vt: u8, rs: u8, offset: i16) -> u32 {
        ls(54, vt, (vt >> 5) & 1, rs, offset)
    }

    pub fn sv_q(vt: u8, rs: u8, offset: i16) -> u32 {
        ls(62, vt, (vt >> 5) & 1, rs, offset)
    }

    pub fn lv_s(vt: u8, rs: u8, offset: i16) -> u32 {
        ls(50, vt, (vt >> 5) & 3, rs, offset)
    }

    pub fn sv_s(vt: u8, rs: u8, offset: i16) -> u32 {
        ls(58, vt, (vt >> 5) & 3, rs, offset)
    }

    pub fn vnop() -> u32 {
        0xffff_0000
    }
}
