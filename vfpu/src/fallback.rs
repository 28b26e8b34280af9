use thiserror::Error;

use crate::prefix::PrefixError;

/// Why an instruction was handed to the interpreter instead of being compiled.
///
/// This is not a failure. Partial coverage of the instruction set is expected and every
/// fallback still produces correct code, just slower.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Fallback {
    #[error("no native lowering for {0}")]
    Unimplemented(&'static str),
    #[error("prefix state is unknown at compile time")]
    UnknownPrefix,
    #[error("invalid prefix: {0}")]
    InvalidPrefix(#[from] PrefixError),
    #[error("host has no SIMD divide")]
    NoSimdDivide,
    #[error("out of host vector registers")]
    RegistersExhausted,
    #[error("address {0:#010x} is outside guest memory")]
    InvalidAddress(u32),
    #[error("guest memory is smaller than a {0} byte access")]
    AccessLargerThanRam(u32),
    #[error("reserved encoding")]
    Reserved,
    #[error("not a VFPU instruction")]
    NotVfpu,
}

impl Fallback {
    /// Encodings that should never appear in well formed guest code
    pub fn is_invalid_encoding(&self) -> bool {
        matches!(self, Fallback::InvalidPrefix(PrefixError::MixedSaturation) | Fallback::Reserved)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompileOutcome {
    Generated,
    Fallback(Fallback),
}

impl CompileOutcome {
    pub fn is_generated(&self) -> bool {
        matches!(self, CompileOutcome::Generated)
    }

    pub fn fallback(&self) -> Option<&Fallback> {
        match self {
            CompileOutcome::Generated => None,
            CompileOutcome::Fallback(reason) => Some(reason),
        }
    }
}

impl From<Result<(), Fallback>> for CompileOutcome {
    fn from(result: Result<(), Fallback>) -> Self {
        match result {
            Ok(()) => CompileOutcome::Generated,
            Err(reason) => CompileOutcome::Fallback(reason),
        }
    }
}
