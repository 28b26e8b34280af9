//! Runs a compiled `Block` the way the host CPU would.
//!
//! Host memory is modelled as three windows: the guest context, the literal pool and guest
//! memory at `HOST_MEM_BASE`. Anything else faults, as do misaligned `:128` accesses.

use thiserror::Error;

use crate::emitter::{Align, Cond, Gpr, HostOp, QReg, VecBinOp, VecUnOp};
use crate::float::{self, arm_max, arm_min};
use crate::jit::Block;
use crate::reference::{self, InterpError};
use crate::state::{GuestRam, GuestState, CTX_SIZE};

pub const HOST_CTX: u64 = 0x1000_0000;
pub const HOST_LITERALS: u64 = 0x2000_0000;
/// Host address of guest address 0
pub const HOST_MEM_BASE: u64 = 0x1_0000_0000;

/// Register contents nobody wrote yet; a quiet NaN so stray reads show up in results
const POISON: u32 = 0x7fc0_0bad;

/// Upper bound on executed ops, blocks never loop
const MAX_STEPS: usize = 1 << 20;

#[derive(Debug, Error)]
pub enum ExecError {
    #[error("access to unmapped host address {0:#x}")]
    Unmapped(u64),
    #[error("misaligned 128-bit access at {0:#x}")]
    Alignment(u64),
    #[error("write to read-only register {0}")]
    ReadOnly(Gpr),
    #[error("branch target {0} is outside the block")]
    BadBranch(usize),
    #[error("block does not end in an exit")]
    NoExit,
    #[error("interpreter failed on {word:#010x}")]
    Interpreter {
        word: u32,
        #[source]
        source: InterpError,
    },
}

enum Region {
    Ctx(u32),
    Literal(usize),
    Ram(u32),
}

#[derive(Debug, Clone)]
pub struct Executor {
    q: [[u32; 4]; 32],
    r0: u64,
    r1: u64,
    zero: bool,
    carry: bool,
    pub interpreter_calls: u32,
    pub steps: usize,
}

impl Executor {
    pub fn new() -> Executor {
        Executor {
            q: [[POISON; 4]; 32],
            r0: 0,
            r1: 0,
            zero: false,
            carry: false,
            interpreter_calls: 0,
            steps: 0,
        }
    }

    pub fn q(&self, reg: QReg) -> [u32; 4] {
        self.q[reg.0 as usize]
    }

    pub fn run(&mut self, block: &Block, state: &mut GuestState, ram: &mut GuestRam) -> Result<(), ExecError> {
        let mut pc = 0;
        loop {
            let op = block.ops.get(pc).ok_or(ExecError::NoExit)?;
            self.steps += 1;
            if self.steps > MAX_STEPS {
                return Err(ExecError::NoExit);
            }
            pc += 1;

            match *op {
                HostOp::MovImm { rd, imm } => self.set(rd, imm as u64)?,
                HostOp::MovP2R { rd, literal } => self.set(rd, HOST_LITERALS + literal as u64)?,
                HostOp::Add { rd, rn, rm } => {
                    let value = self.get(state, rn).wrapping_add(self.get(state, rm));
                    self.set(rd, value)?;
                }
                HostOp::AddImm { rd, rn, imm } => {
                    let value = self.get(state, rn).wrapping_add(imm as i64 as u64);
                    self.set(rd, value)?;
                }
                HostOp::AndImm { rd, rn, imm } => {
                    let value = self.get(state, rn) & imm as u64;
                    self.set(rd, value)?;
                }
                HostOp::CmpImm { rn, imm } => {
                    let value = self.get(state, rn);
                    self.zero = value == imm as u64;
                    self.carry = value >= imm as u64;
                }
                HostOp::Str { rt, base, offset } => {
                    let addr = self.get(state, base) + offset as u64;
                    let value = self.get(state, rt) as u32;
                    self.write(block, state, ram, addr, value)?;
                }
                HostOp::B { cond, target } => {
                    let taken = match cond {
                        Cond::Eq => self.zero,
                        Cond::Ne => !self.zero,
                        Cond::Hs => self.carry,
                        Cond::Lo => !self.carry,
                    };
                    if taken {
                        if target > block.ops.len() {
                            return Err(ExecError::BadBranch(target));
                        }
                        pc = target;
                    }
                }

                HostOp::Vld1 { vd, rn, offset, align } => {
                    let addr = self.vector_address(state, rn, offset, align)?;
                    let mut value = [0; 4];
                    for lane in 0..4 {
                        value[lane] = self.read(block, state, ram, addr + lane as u64 * 4)?;
                    }
                    self.q[vd.0 as usize] = value;
                }
                HostOp::Vst1 { vd, rn, offset, align } => {
                    let addr = self.vector_address(state, rn, offset, align)?;
                    for lane in 0..4 {
                        let value = self.q[vd.0 as usize][lane];
                        self.write(block, state, ram, addr + lane as u64 * 4, value)?;
                    }
                }
                HostOp::Vld1Lane { vd, lane, rn, offset } => {
                    let addr = self.get(state, rn) + offset as u64;
                    let value = self.read(block, state, ram, addr)?;
                    self.q[vd.0 as usize][lane as usize] = value;
                }
                HostOp::Vst1Lane { vd, lane, rn, offset } => {
                    let addr = self.get(state, rn) + offset as u64;
                    let value = self.q[vd.0 as usize][lane as usize];
                    self.write(block, state, ram, addr, value)?;
                }
                HostOp::Vld1AllLanes { vd, rn, offset } => {
                    let addr = self.get(state, rn) + offset as u64;
                    let value = self.read(block, state, ram, addr)?;
                    self.q[vd.0 as usize] = [value; 4];
                }
                HostOp::Vmov { vd, vm } => self.q[vd.0 as usize] = self.q[vm.0 as usize],
                HostOp::Vdup { vd, vm, lane } => {
                    self.q[vd.0 as usize] = [self.q[vm.0 as usize][lane as usize]; 4];
                }
                HostOp::Vins { vd, lane, vm, src_lane } => {
                    self.q[vd.0 as usize][lane as usize] = self.q[vm.0 as usize][src_lane as usize];
                }
                HostOp::Vbin { op, vd, vn, vm } => {
                    let (a, b) = (self.q[vn.0 as usize], self.q[vm.0 as usize]);
                    let mut out = [0; 4];
                    for lane in 0..4 {
                        out[lane] = vbin(op, a[lane], b[lane]);
                    }
                    self.q[vd.0 as usize] = out;
                }
                HostOp::Vun { op, vd, vm } => {
                    let a = self.q[vm.0 as usize];
                    self.q[vd.0 as usize] = a.map(|x| vun(op, x));
                }

                HostOp::CallInterpreter { word } => {
                    self.interpreter_calls += 1;
                    reference::step(state, ram, word)
                        .map_err(|source| ExecError::Interpreter { word, source })?;
                }
                HostOp::ExitBlock => return Ok(()),
            }
        }
    }

    fn get(&self, state: &GuestState, reg: Gpr) -> u64 {
        match reg {
            Gpr::R0 => self.r0,
            Gpr::R1 => self.r1,
            Gpr::Ctx => HOST_CTX,
            Gpr::MemBase => HOST_MEM_BASE,
            Gpr::Guest(0) => 0,
            Gpr::Guest(n) => state.gpr[n as usize & 31] as u64,
        }
    }

    fn set(&mut self, reg: Gpr, value: u64) -> Result<(), ExecError> {
        match reg {
            Gpr::R0 => self.r0 = value,
            Gpr::R1 => self.r1 = value,
            _ => return Err(ExecError::ReadOnly(reg)),
        }
        Ok(())
    }

    fn vector_address(&self, state: &GuestState, rn: Gpr, offset: u32, align: Align) -> Result<u64, ExecError> {
        let addr = self.get(state, rn) + offset as u64;
        if align == Align::Bits128 && addr % 16 != 0 {
            return Err(ExecError::Alignment(addr));
        }
        Ok(addr)
    }

    fn region(block: &Block, ram: &GuestRam, addr: u64) -> Result<Region, ExecError> {
        if addr % 4 != 0 {
            return Err(ExecError::Alignment(addr));
        }
        if (HOST_CTX..HOST_CTX + CTX_SIZE as u64).contains(&addr) {
            return Ok(Region::Ctx((addr - HOST_CTX) as u32));
        }
        let pool = block.literals.len() as u64 * 16;
        if (HOST_LITERALS..HOST_LITERALS + pool).contains(&addr) {
            return Ok(Region::Literal((addr - HOST_LITERALS) as usize / 4));
        }
        if let Some(guest) = addr.checked_sub(HOST_MEM_BASE) {
            if guest <= u32::MAX as u64 && ram.contains(guest as u32, 4) {
                return Ok(Region::Ram(guest as u32));
            }
        }
        Err(ExecError::Unmapped(addr))
    }

    fn read(&self, block: &Block, state: &GuestState, ram: &GuestRam, addr: u64) -> Result<u32, ExecError> {
        let value = match Self::region(block, ram, addr)? {
            Region::Ctx(offset) => state.read_ctx(offset),
            Region::Literal(word) => Some(block.literals[word / 4][word % 4]),
            Region::Ram(guest) => ram.read_u32(guest),
        };
        value.ok_or(ExecError::Unmapped(addr))
    }

    fn write(
        &self,
        block: &Block,
        state: &mut GuestState,
        ram: &mut GuestRam,
        addr: u64,
        value: u32,
    ) -> Result<(), ExecError> {
        let done = match Self::region(block, ram, addr)? {
            Region::Ctx(offset) => state.write_ctx(offset, value),
            Region::Literal(_) => None,
            Region::Ram(guest) => ram.write_u32(guest, value),
        };
        done.ok_or(ExecError::Unmapped(addr))
    }
}

impl Default for Executor {
    fn default() -> Self {
        Executor::new()
    }
}

fn vbin(op: VecBinOp, a: u32, b: u32) -> u32 {
    let (x, y) = (f32::from_bits(a), f32::from_bits(b));
    let mask = |cond: bool| if cond { u32::MAX } else { 0 };
    match op {
        VecBinOp::Add => float::add(x, y).to_bits(),
        VecBinOp::Sub => float::sub(x, y).to_bits(),
        VecBinOp::Mul => float::mul(x, y).to_bits(),
        VecBinOp::Div => float::div(x, y).to_bits(),
        VecBinOp::Min => arm_min(x, y).to_bits(),
        VecBinOp::Max => arm_max(x, y).to_bits(),
        VecBinOp::Cge => mask(x >= y),
        VecBinOp::Cgt => mask(x > y),
        VecBinOp::And => a & b,
        VecBinOp::Eor => a ^ b,
    }
}

fn vun(op: VecUnOp, a: u32) -> u32 {
    match op {
        VecUnOp::Abs => a & 0x7fff_ffff,
        VecUnOp::Neg => a ^ 0x8000_0000,
        VecUnOp::Sqrt => float::sqrt(f32::from_bits(a)).to_bits(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emitter::CodeBuffer;
    use crate::fallback::CompileOutcome;
    use crate::regcache::CacheStats;
    use crate::state::RAM_BASE;

    fn block(code: CodeBuffer) -> Block {
        let (ops, literals) = code.into_parts();
        Block {
            ops,
            literals,
            outcomes: Vec::<(u32, CompileOutcome)>::new(),
            stats: CacheStats::default(),
        }
    }

    #[test]
    fn literal_broadcast_and_store_to_context() {
        let mut code = CodeBuffer::new();
        code.load_const(QReg(1), 2.5);
        code.vst1(QReg(1), Gpr::Ctx, 16, Align::Bits128);
        code.exit_block();

        let mut state = GuestState::new();
        let mut ram = GuestRam::new(64);
        Executor::new().run(&block(code), &mut state, &mut ram).unwrap();
        assert_eq!(&state.vfpr[4..8], &[2.5; 4]);
    }

    #[test]
    fn misaligned_quad_faults() {
        let mut code = CodeBuffer::new();
        code.vld1(QReg(1), Gpr::Ctx, 4, Align::Bits128);
        code.exit_block();

        let mut state = GuestState::new();
        let mut ram = GuestRam::new(64);
        let err = Executor::new().run(&block(code), &mut state, &mut ram).unwrap_err();
        assert!(matches!(err, ExecError::Alignment(_)));
    }

    #[test]
    fn guest_memory_window() {
        let mut code = CodeBuffer::new();
        code.mov_imm(Gpr::R0, RAM_BASE + 8);
        code.add(Gpr::R0, Gpr::R0, Gpr::MemBase);
        code.mov_imm(Gpr::R1, 0x1234);
        code.str(Gpr::R1, Gpr::R0, 0);
        code.exit_block();

        let mut state = GuestState::new();
        let mut ram = GuestRam::new(64);
        Executor::new().run(&block(code), &mut state, &mut ram).unwrap();
        assert_eq!(ram.read_u32(RAM_BASE + 8), Some(0x1234));
    }

    #[test]
    fn skipped_branch_target() {
        let mut code = CodeBuffer::new();
        code.mov_imm(Gpr::R1, 5);
        code.cmp_imm(Gpr::R1, 4);
        let skip = code.b_cc(Cond::Hs);
        code.vld1(QReg(1), Gpr::R1, 0, Align::None);
        code.set_jump_target(skip);
        code.exit_block();

        let mut state = GuestState::new();
        let mut ram = GuestRam::new(64);
        Executor::new().run(&block(code), &mut state, &mut ram).unwrap();
    }

    #[test]
    fn missing_exit() {
        let mut state = GuestState::new();
        let mut ram = GuestRam::new(64);
        let err = Executor::new().run(&block(CodeBuffer::new()), &mut state, &mut ram).unwrap_err();
        assert!(matches!(err, ExecError::NoExit));
    }
}
