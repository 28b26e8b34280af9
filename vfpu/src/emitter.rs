//! Recording host assembler.
//!
//! Instructions are appended as `HostOp` values rather than machine code, which keeps the code
//! generator testable on any machine. `exec::Executor` runs the listing, `Display` prints it in
//! NEON assembly syntax.

use std::fmt;

use crate::instructions::MIPS_REG_NAMES;

/// A host 128-bit vector register
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QReg(pub u8);

impl QReg {
    /// Constant scratch, never handed out by the allocator
    pub const SCRATCH: QReg = QReg(0);
}

impl fmt::Display for QReg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "q{}", self.0)
    }
}

/// Host general purpose registers visible to the vector code generator
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Gpr {
    R0,
    R1,
    /// Points at the guest context
    Ctx,
    /// Host address of guest address 0
    MemBase,
    /// Host register statically holding a guest GPR
    Guest(u8),
}

impl fmt::Display for Gpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Gpr::R0 => write!(f, "r0"),
            Gpr::R1 => write!(f, "r1"),
            Gpr::Ctx => write!(f, "ctx"),
            Gpr::MemBase => write!(f, "membase"),
            Gpr::Guest(reg) => write!(f, "{}", MIPS_REG_NAMES[*reg as usize & 31]),
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Cond {
    Eq,
    Ne,
    /// Unsigned higher or same
    Hs,
    /// Unsigned lower
    Lo,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Align {
    None,
    Bits128,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum VecBinOp {
    Add,
    Sub,
    Mul,
    Div,
    Min,
    Max,
    /// All ones where `a >= b`
    Cge,
    /// All ones where `a > b`
    Cgt,
    And,
    Eor,
}

impl VecBinOp {
    fn mnemonic(self) -> &'static str {
        match self {
            VecBinOp::Add => "vadd.f32",
            VecBinOp::Sub => "vsub.f32",
            VecBinOp::Mul => "vmul.f32",
            VecBinOp::Div => "vdiv.f32",
            VecBinOp::Min => "vmin.f32",
            VecBinOp::Max => "vmax.f32",
            VecBinOp::Cge => "vcge.f32",
            VecBinOp::Cgt => "vcgt.f32",
            VecBinOp::And => "vand",
            VecBinOp::Eor => "veor",
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum VecUnOp {
    Abs,
    Neg,
    Sqrt,
}

impl VecUnOp {
    fn mnemonic(self) -> &'static str {
        match self {
            VecUnOp::Abs => "vabs.f32",
            VecUnOp::Neg => "vneg.f32",
            VecUnOp::Sqrt => "vsqrt.f32",
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum HostOp {
    MovImm { rd: Gpr, imm: u32 },
    /// Load the address of a literal pool entry (byte offset into the pool)
    MovP2R { rd: Gpr, literal: u32 },
    Add { rd: Gpr, rn: Gpr, rm: Gpr },
    AddImm { rd: Gpr, rn: Gpr, imm: i32 },
    AndImm { rd: Gpr, rn: Gpr, imm: u32 },
    /// Sets the flags from `rn - imm`
    CmpImm { rn: Gpr, imm: u32 },
    Str { rt: Gpr, base: Gpr, offset: u32 },
    /// Branch to op index `target` when `cond` holds
    B { cond: Cond, target: usize },

    Vld1 { vd: QReg, rn: Gpr, offset: u32, align: Align },
    Vst1 { vd: QReg, rn: Gpr, offset: u32, align: Align },
    Vld1Lane { vd: QReg, lane: u8, rn: Gpr, offset: u32 },
    Vst1Lane { vd: QReg, lane: u8, rn: Gpr, offset: u32 },
    /// Load one float into every lane
    Vld1AllLanes { vd: QReg, rn: Gpr, offset: u32 },
    Vmov { vd: QReg, vm: QReg },
    Vdup { vd: QReg, vm: QReg, lane: u8 },
    /// `vd[lane] = vm[src_lane]`, the other lanes untouched
    Vins { vd: QReg, lane: u8, vm: QReg, src_lane: u8 },
    Vbin { op: VecBinOp, vd: QReg, vn: QReg, vm: QReg },
    Vun { op: VecUnOp, vd: QReg, vm: QReg },

    /// Run one guest instruction through the interpreter. The context must be up to date.
    CallInterpreter { word: u32 },
    ExitBlock,
}

fn mem(rn: Gpr, offset: u32) -> String {
    if offset == 0 {
        format!("[{}]", rn)
    } else {
        format!("[{}, #{}]", rn, offset)
    }
}

impl fmt::Display for HostOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use HostOp::*;
        match *self {
            MovImm { rd, imm } => write!(f, "mov {}, #{:#x}", rd, imm),
            MovP2R { rd, literal } => write!(f, "adr {}, literal+{}", rd, literal),
            Add { rd, rn, rm } => write!(f, "add {}, {}, {}", rd, rn, rm),
            AddImm { rd, rn, imm } => write!(f, "add {}, {}, #{}", rd, rn, imm),
            AndImm { rd, rn, imm } => write!(f, "and {}, {}, #{:#x}", rd, rn, imm),
            CmpImm { rn, imm } => write!(f, "cmp {}, #{:#x}", rn, imm),
            Str { rt, base, offset } => write!(f, "str {}, {}", rt, mem(base, offset)),
            B { cond, target } => {
                let cond = match cond {
                    Cond::Eq => "eq",
                    Cond::Ne => "ne",
                    Cond::Hs => "hs",
                    Cond::Lo => "lo",
                };
                write!(f, "b{} @{}", cond, target)
            }
            Vld1 { vd, rn, offset, align } | Vst1 { vd, rn, offset, align } => {
                let name = if matches!(self, Vld1 { .. }) { "vld1.32" } else { "vst1.32" };
                let align = if align == Align::Bits128 { ":128" } else { "" };
                write!(f, "{} {{{}}}, {}{}", name, vd, mem(rn, offset), align)
            }
            Vld1Lane { vd, lane, rn, offset } => {
                write!(f, "vld1.32 {{{}[{}]}}, {}", vd, lane, mem(rn, offset))
            }
            Vst1Lane { vd, lane, rn, offset } => {
                write!(f, "vst1.32 {{{}[{}]}}, {}", vd, lane, mem(rn, offset))
            }
            Vld1AllLanes { vd, rn, offset } => {
                write!(f, "vld1.32 {{{}[]}}, {}", vd, mem(rn, offset))
            }
            Vmov { vd, vm } => write!(f, "vmov {}, {}", vd, vm),
            Vdup { vd, vm, lane } => write!(f, "vdup.32 {}, {}[{}]", vd, vm, lane),
            Vins { vd, lane, vm, src_lane } => {
                write!(f, "vmov.32 {}[{}], {}[{}]", vd, lane, vm, src_lane)
            }
            Vbin { op, vd, vn, vm } => write!(f, "{} {}, {}, {}", op.mnemonic(), vd, vn, vm),
            Vun { op, vd, vm } => write!(f, "{} {}, {}", op.mnemonic(), vd, vm),
            CallInterpreter { word } => write!(f, "bl interpret ; {:#010x}", word),
            ExitBlock => write!(f, "b exit"),
        }
    }
}

/// Pending forward branch, resolved with `CodeBuffer::set_jump_target`
#[derive(Debug)]
#[must_use]
pub struct FixupBranch {
    index: usize,
}

/// Position in a `CodeBuffer` to roll back to
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Mark {
    ops: usize,
    literals: usize,
}

#[derive(Debug, Clone, Default)]
pub struct CodeBuffer {
    ops: Vec<HostOp>,
    /// 16 byte aligned vectors, deduplicated
    literals: Vec<[u32; 4]>,
}

impl CodeBuffer {
    pub fn new() -> CodeBuffer {
        CodeBuffer::default()
    }

    pub fn ops(&self) -> &[HostOp] {
        &self.ops
    }

    pub fn literals(&self) -> &[[u32; 4]] {
        &self.literals
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn mark(&self) -> Mark {
        Mark {
            ops: self.ops.len(),
            literals: self.literals.len(),
        }
    }

    /// Drop everything emitted after `mark`
    pub fn truncate(&mut self, mark: Mark) {
        self.ops.truncate(mark.ops);
        self.literals.truncate(mark.literals);
    }

    pub fn into_parts(self) -> (Vec<HostOp>, Vec<[u32; 4]>) {
        (self.ops, self.literals)
    }

    pub fn push(&mut self, op: HostOp) {
        self.ops.push(op);
    }

    /// Byte offset of a pool entry holding `words`
    pub fn literal(&mut self, words: [u32; 4]) -> u32 {
        let index = match self.literals.iter().position(|lit| *lit == words) {
            Some(index) => index,
            None => {
                self.literals.push(words);
                self.literals.len() - 1
            }
        };
        (index * 16) as u32
    }

    pub fn literal_f32(&mut self, values: [f32; 4]) -> u32 {
        self.literal(values.map(f32::to_bits))
    }

    pub fn b_cc(&mut self, cond: Cond) -> FixupBranch {
        self.ops.push(HostOp::B { cond, target: usize::MAX });
        FixupBranch { index: self.ops.len() - 1 }
    }

    /// Point `fixup` at the next emitted instruction
    pub fn set_jump_target(&mut self, fixup: FixupBranch) {
        let here = self.ops.len();
        if let Some(HostOp::B { target, .. }) = self.ops.get_mut(fixup.index) {
            *target = here;
        }
    }

    pub fn mov_imm(&mut self, rd: Gpr, imm: u32) {
        self.push(HostOp::MovImm { rd, imm });
    }

    pub fn mov_p2r(&mut self, rd: Gpr, literal: u32) {
        self.push(HostOp::MovP2R { rd, literal });
    }

    pub fn add(&mut self, rd: Gpr, rn: Gpr, rm: Gpr) {
        self.push(HostOp::Add { rd, rn, rm });
    }

    pub fn add_imm(&mut self, rd: Gpr, rn: Gpr, imm: i32) {
        self.push(HostOp::AddImm { rd, rn, imm });
    }

    pub fn and_imm(&mut self, rd: Gpr, rn: Gpr, imm: u32) {
        self.push(HostOp::AndImm { rd, rn, imm });
    }

    pub fn cmp_imm(&mut self, rn: Gpr, imm: u32) {
        self.push(HostOp::CmpImm { rn, imm });
    }

    pub fn str(&mut self, rt: Gpr, base: Gpr, offset: u32) {
        self.push(HostOp::Str { rt, base, offset });
    }

    pub fn vld1(&mut self, vd: QReg, rn: Gpr, offset: u32, align: Align) {
        self.push(HostOp::Vld1 { vd, rn, offset, align });
    }

    pub fn vst1(&mut self, vd: QReg, rn: Gpr, offset: u32, align: Align) {
        self.push(HostOp::Vst1 { vd, rn, offset, align });
    }

    pub fn vld1_lane(&mut self, vd: QReg, lane: u8, rn: Gpr, offset: u32) {
        self.push(HostOp::Vld1Lane { vd, lane, rn, offset });
    }

    pub fn vst1_lane(&mut self, vd: QReg, lane: u8, rn: Gpr, offset: u32) {
        self.push(HostOp::Vst1Lane { vd, lane, rn, offset });
    }

    pub fn vld1_all_lanes(&mut self, vd: QReg, rn: Gpr, offset: u32) {
        self.push(HostOp::Vld1AllLanes { vd, rn, offset });
    }

    pub fn vmov(&mut self, vd: QReg, vm: QReg) {
        self.push(HostOp::Vmov { vd, vm });
    }

    pub fn vdup(&mut self, vd: QReg, vm: QReg, lane: u8) {
        self.push(HostOp::Vdup { vd, vm, lane });
    }

    pub fn vins(&mut self, vd: QReg, lane: u8, vm: QReg, src_lane: u8) {
        self.push(HostOp::Vins { vd, lane, vm, src_lane });
    }

    pub fn vbin(&mut self, op: VecBinOp, vd: QReg, vn: QReg, vm: QReg) {
        self.push(HostOp::Vbin { op, vd, vn, vm });
    }

    pub fn vun(&mut self, op: VecUnOp, vd: QReg, vm: QReg) {
        self.push(HostOp::Vun { op, vd, vm });
    }

    /// Broadcast a constant into every lane of `vd` through the literal pool. Clobbers R0.
    pub fn load_const(&mut self, vd: QReg, value: f32) {
        let literal = self.literal_f32([value; 4]);
        self.mov_p2r(Gpr::R0, literal);
        self.vld1_all_lanes(vd, Gpr::R0, 0);
    }

    /// Load a whole literal vector into `vd`. Clobbers R0.
    pub fn load_vector(&mut self, vd: QReg, words: [u32; 4]) {
        let literal = self.literal(words);
        self.mov_p2r(Gpr::R0, literal);
        self.vld1(vd, Gpr::R0, 0, Align::Bits128);
    }

    pub fn call_interpreter(&mut self, word: u32) {
        self.push(HostOp::CallInterpreter { word });
    }

    pub fn exit_block(&mut self) {
        self.push(HostOp::ExitBlock);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literals_are_shared() {
        let mut code = CodeBuffer::new();
        let one = code.literal_f32([1.0; 4]);
        let two = code.literal_f32([2.0; 4]);
        assert_eq!(code.literal_f32([1.0; 4]), one);
        assert_eq!(two, 16);
        assert_eq!(code.literals().len(), 2);
    }

    #[test]
    fn truncate_drops_ops_and_literals() {
        let mut code = CodeBuffer::new();
        code.load_const(QReg(1), 1.0);
        let mark = code.mark();
        code.load_const(QReg(2), 3.0);
        code.vmov(QReg(3), QReg(2));
        code.truncate(mark);
        assert_eq!(code.len(), 2);
        assert_eq!(code.literals().len(), 1);
    }

    #[test]
    fn branch_fixup() {
        let mut code = CodeBuffer::new();
        let skip = code.b_cc(Cond::Hs);
        code.vst1(QReg(1), Gpr::R0, 0, Align::Bits128);
        code.set_jump_target(skip);
        assert_eq!(code.ops()[0], HostOp::B { cond: Cond::Hs, target: 2 });
    }

    #[test]
    fn listing() {
        let op = HostOp::Vld1 { vd: QReg(4), rn: Gpr::Ctx, offset: 16, align: Align::Bits128 };
        assert_eq!(op.to_string(), "vld1.32 {q4}, [ctx, #16]:128");
        let op = HostOp::Vins { vd: QReg(1), lane: 2, vm: QReg(3), src_lane: 0 };
        assert_eq!(op.to_string(), "vmov.32 q1[2], q3[0]");
        let op = HostOp::AddImm { rd: Gpr::R0, rn: Gpr::Guest(4), imm: -16 };
        assert_eq!(op.to_string(), "add r0, $a0, #-16");
    }
}
