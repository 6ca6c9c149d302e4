//! error.rs — fatal error taxonomy (spec §7).
//!
//! Every variant here is fatal to the VM: it halts execution and is
//! surfaced unchanged through `VmSnapshot::error`. The controller never
//! retries a failing step.

use thiserror::Error;

use crate::opcodes::Opcode;

/// Failures raised while decoding a chunk's payload factorization back into
/// an `(Opcode, operands)` pair (spec §4.2 "Decode").
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("checksum mismatch: expected exponent {expected}, found {found}")]
    Checksum { expected: u32, found: u32 },

    #[error("no recognizable opcode prime in chunk factorization")]
    NoOpcode,

    #[error("{0} distinct opcode-identifying primes present (ambiguous)")]
    Ambiguous(usize),

    #[error("foreign prime factor (exponent {exponent}) not used by opcode {opcode}")]
    Foreign { opcode: Opcode, exponent: u32 },

    #[error("operand prime for opcode {opcode} missing or has exponent 0")]
    BadOperand { opcode: Opcode },
}

/// Failures raised while building a chunk from an `(Opcode, operands)` pair
/// or from a raw `BUILD_CHUNK` factor frame (spec §4.2 "Encode", §4.3
/// "BUILD_CHUNK wire format").
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EncodingError {
    #[error("opcode {opcode} expects {expected} operand(s), got {found}")]
    ArityMismatch { opcode: Opcode, expected: usize, found: usize },

    #[error("operand {index} for opcode {opcode} is negative ({value})")]
    NegativeOperand { opcode: Opcode, index: usize, value: i64 },

    #[error("BUILD_CHUNK requires at least one factor pair, got num_factor_pairs={0}")]
    EmptyFactorFrame(i64),
}

/// Fatal VM errors (spec §7).
#[derive(Debug, Clone, Error)]
pub enum VmError {
    #[error("stack underflow")]
    StackUnderflow,

    #[error("stack overflow (cap {cap})")]
    StackOverflow { cap: usize },

    #[error("arithmetic overflow")]
    ArithmeticOverflow,

    #[error("division by zero")]
    DivisionByZero,

    #[error("OP_RANDOM bound must be positive, got {0}")]
    NegativeRandomBound(i64),

    #[error("address {addr} out of range [0, {len})")]
    AddressOutOfRange { addr: i64, len: usize },

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Encoding(#[from] EncodingError),

    #[error("stack frame depth {found} at loop head does not match expected {expected}")]
    FrameCorruption { expected: usize, found: usize },

    #[error("program memory length {len} exceeds the configured cap {cap}")]
    ProgramTooLarge { len: usize, cap: usize },
}
