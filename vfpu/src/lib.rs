//! Block compiler for the PSP vector unit (VFPU), targeting NEON style 128-bit SIMD hosts.
//!
//! Guest instructions are decoded by [`instructions`], their operand prefixes by [`prefix`].
//! [`jit::Jit`] lowers one instruction at a time into a [`emitter::CodeBuffer`], keeping guest
//! vectors cached in host registers through [`regcache::VfpuRegCache`]. Anything without a native
//! lowering becomes a call into the interpreter.
//!
//! The listing a block compiles to can be run with [`exec::Executor`]; [`reference`] is the
//! interpreter it calls and the oracle for tests.

pub mod addressing;
pub mod emitter;
pub mod exec;
pub mod fallback;
pub mod float;
pub mod instructions;
pub mod jit;
pub mod prefix;
pub mod reference;
pub mod regcache;
pub mod regs;
pub mod state;

pub use fallback::{CompileOutcome, Fallback};
pub use jit::{compile_block, Block, HostFeatures, Jit, JitConfig};
pub use regs::{VecReg, VectorSize};
