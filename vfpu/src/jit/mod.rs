//! The VFPU block compiler.
//!
//! `Jit` owns all state of one block being compiled: the code buffer, the vector register cache,
//! the general purpose register collaborator and the compile time prefix state. Instructions are
//! compiled one at a time by `compile_op`; an instruction without a native lowering (or one
//! whose lowering gives up half way) is rolled back and replaced by an interpreter call.

mod loadstore;
mod prefix;
mod vec;

use std::fmt::Write;

use tracing::{debug, error};

use crate::addressing::{GprMapper, StaticGprMap};
use crate::emitter::{CodeBuffer, Gpr, HostOp};
use crate::fallback::{CompileOutcome, Fallback};
use crate::instructions::{InstructionInfo, OpClass, VfpuOp};
use crate::prefix::PrefixState;
use crate::regcache::{CacheStats, VfpuRegCache, MIN_HOST_REGS};
use crate::state::{ctx_prefix_offset, DEFAULT_RAM_SIZE};

pub use prefix::DestReg;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct HostFeatures {
    /// `vdiv.f32` on Q registers. ARMv7 NEON only has reciprocal estimates.
    pub simd_divide: bool,
    pub q_registers: u8,
}

impl HostFeatures {
    pub fn armv7() -> HostFeatures {
        HostFeatures {
            simd_divide: false,
            q_registers: 16,
        }
    }

    pub fn aarch64() -> HostFeatures {
        HostFeatures {
            simd_divide: true,
            q_registers: 32,
        }
    }
}

#[derive(Debug, Clone)]
pub struct JitConfig {
    pub features: HostFeatures,
    /// Mask guest addresses and access memory without a bounds check
    pub fast_memory: bool,
    /// Compile assuming the prefixes hold their defaults at block entry
    pub start_default_prefix: bool,
    pub ram_size: u32,
    /// Use fewer host vector registers than the host has
    pub register_limit: Option<u8>,
}

impl JitConfig {
    /// Host vector registers in use, including the scratch register
    pub fn host_regs(&self) -> u8 {
        let available = self.features.q_registers;
        self.register_limit
            .map_or(available, |limit| limit.clamp(MIN_HOST_REGS, available))
    }
}

impl Default for JitConfig {
    fn default() -> Self {
        JitConfig {
            features: HostFeatures::aarch64(),
            fast_memory: true,
            start_default_prefix: true,
            ram_size: DEFAULT_RAM_SIZE,
            register_limit: None,
        }
    }
}

/// A compiled block
#[derive(Debug, Clone)]
pub struct Block {
    pub ops: Vec<HostOp>,
    pub literals: Vec<[u32; 4]>,
    /// One entry per guest instruction
    pub outcomes: Vec<(u32, CompileOutcome)>,
    pub stats: CacheStats,
}

impl Block {
    pub fn native_count(&self) -> usize {
        self.outcomes.iter().filter(|(_, outcome)| outcome.is_generated()).count()
    }

    pub fn fallback_count(&self) -> usize {
        self.outcomes.len() - self.native_count()
    }

    pub fn disassemble(&self) -> String {
        let mut out = String::new();
        for (i, op) in self.ops.iter().enumerate() {
            let _ = writeln!(out, "{:4}: {}", i, op);
        }
        if !self.literals.is_empty() {
            let _ = writeln!(out, "literal:");
            for (i, words) in self.literals.iter().enumerate() {
                let floats = words.map(f32::from_bits);
                let _ = writeln!(out, "{:4}: {:?}", i * 16, floats);
            }
        }
        out
    }
}

pub struct Jit<G: GprMapper = StaticGprMap> {
    code: CodeBuffer,
    fpr: VfpuRegCache,
    gpr: G,
    js: PrefixState,
    config: JitConfig,
    outcomes: Vec<(u32, CompileOutcome)>,
}

impl<G: GprMapper> Jit<G> {
    pub fn new(config: JitConfig, gpr: G) -> Jit<G> {
        let js = if config.start_default_prefix {
            PrefixState::known_default()
        } else {
            PrefixState::unknown()
        };
        Jit {
            code: CodeBuffer::new(),
            fpr: VfpuRegCache::new(config.host_regs()),
            gpr,
            js,
            config,
            outcomes: Vec::new(),
        }
    }

    pub fn code(&self) -> &CodeBuffer {
        &self.code
    }

    pub fn regcache(&self) -> &VfpuRegCache {
        &self.fpr
    }

    pub fn prefix_state(&self) -> &PrefixState {
        &self.js
    }

    pub fn config(&self) -> &JitConfig {
        &self.config
    }

    /// Compile one guest instruction, natively if possible
    pub fn compile_op(&mut self, word: u32) -> CompileOutcome {
        let op = VfpuOp(word);

        let fpr_checkpoint = self.fpr.checkpoint();
        let js_checkpoint = self.js.clone();
        let mark = self.code.mark();

        let class = op.info().class();
        let result = match op.info() {
            InstructionInfo::Op(name, class) => self.dispatch(op, *class, *name),
            InstructionInfo::NotVfpu => Err(Fallback::NotVfpu),
            _ => Err(Fallback::Reserved),
        };

        let outcome = match result {
            Ok(()) => {
                self.fpr.release_spill_locks_and_discard_temps();
                if class.map_or(false, OpClass::eats_prefix) {
                    self.js.eat_prefix();
                }
                CompileOutcome::Generated
            }
            Err(reason) => {
                if reason.is_invalid_encoding() {
                    error!("{:#010x} ({}): {}", word, op.name(), reason);
                } else {
                    debug!("{:#010x} ({}) falls back: {}", word, op.name(), reason);
                }
                self.code.truncate(mark);
                self.fpr.rollback(fpr_checkpoint);
                self.js = js_checkpoint;
                self.comp_generic(op, class);
                CompileOutcome::Fallback(reason)
            }
        };

        self.outcomes.push((word, outcome.clone()));
        outcome
    }

    /// Hand `op` to the interpreter. Everything it may read is written back first.
    fn comp_generic(&mut self, op: VfpuOp, class: Option<OpClass>) {
        self.fpr.flush_all(&mut self.code);
        self.flush_prefixes();
        self.code.call_interpreter(op.0);

        match class {
            Some(class) if class.eats_prefix() => self.js.mark_known_default(),
            Some(class) if class.writes_control() => self.js.mark_unknown(),
            _ => {}
        }
    }

    fn flush_prefixes(&mut self) {
        for (kind, value) in self.js.dirty().collect::<Vec<_>>() {
            self.code.mov_imm(Gpr::R0, value);
            self.code.str(Gpr::R0, Gpr::Ctx, ctx_prefix_offset(kind));
        }
        self.js.mark_clean();
    }

    fn dispatch(&mut self, op: VfpuOp, class: OpClass, name: &'static str) -> Result<(), Fallback> {
        use OpClass::*;
        match class {
            VecDo3 => self.comp_vec_do3(op),
            VV2Op => self.comp_vv2op(op),
            VScl => self.comp_vscl(op),
            VDot => self.comp_vdot(op),
            VHdp => self.comp_vhdp(op),
            VCrs => self.comp_vcrs(op),
            VDet => self.comp_vdet(op),
            Vcmp => self.comp_vcmp(op),
            Vcmov => self.comp_vcmov(op),
            Vcst => self.comp_vcst(op),
            Vhoriz => self.comp_vhoriz(op),
            VRot => self.comp_vrot(op),
            VCrossQuat => self.comp_vcross_quat(op),
            Vmmov => self.comp_vmmov(op),
            Vmmul => self.comp_vmmul(op),
            Vmscl => self.comp_vmscl(op),
            Vtfm => self.comp_vtfm(op),
            VMatrixInit => self.comp_vmatrix_init(op),
            VVectorInit => self.comp_vvector_init(op),
            VIdt => self.comp_vidt(op),
            Viim => self.comp_viim(op),
            Vfim => self.comp_vfim(op),
            Vpfx => self.comp_vpfx(op),
            Svq => self.comp_svq(op),
            Sv => self.comp_sv(op),
            Vi2f => self.comp_vi2f(op),
            Vf2i => self.comp_vf2i(op),
            Vi2x => self.comp_vi2x(op),
            Vx2i => self.comp_vx2i(op),
            Vh2f => self.comp_vh2f(op),
            Vsgn => self.comp_vsgn(op),
            Vocp => self.comp_vocp(op),
            Mftv => self.comp_mftv(op),
            Vmtvc => self.comp_vmtvc(op),
            Nop => Ok(()),
            Other => Err(Fallback::Unimplemented(name)),
        }
    }

    fn require_known_prefix(&self) -> Result<(), Fallback> {
        if self.js.has_unknown_prefix() {
            return Err(Fallback::UnknownPrefix);
        }
        Ok(())
    }

    /// Write everything back and end the block
    pub fn finish(mut self) -> Block {
        self.fpr.flush_all(&mut self.code);
        self.flush_prefixes();
        self.code.exit_block();

        let stats = self.fpr.stats();
        let (ops, literals) = self.code.into_parts();
        Block {
            ops,
            literals,
            outcomes: self.outcomes,
            stats,
        }
    }
}

pub fn compile_block<G: GprMapper>(config: JitConfig, gpr: G, words: &[u32]) -> Block {
    let mut jit = Jit::new(config, gpr);
    for &word in words {
        jit.compile_op(word);
    }
    jit.finish()
}
