//! primeos-core — the PrimeOS virtual machine core.
//!
//! Program memory is a sequence of large integers ("chunks") whose prime
//! factorization encodes an opcode and its operands (the UOR codec,
//! `codec`). A single-threaded stack machine (`vm`) executes them; a
//! `Controller` mediates the canonical goal-seeker program's interaction
//! with a pluggable `Teacher`.
//!
//! ## Modules
//! - `primes`     : the growable prime table shared by every chunk.
//! - `opcodes`    : the fixed opcode enumeration and its prime assignment.
//! - `codec`      : chunk encode/decode (the UOR codec) and its decode cache.
//! - `config`     : `VmConfig`, every tunable constant in one place.
//! - `error`      : the fatal `DecodeError`/`EncodingError`/`VmError` taxonomy.
//! - `vm`         : the stack-machine core.
//! - `teacher`    : the `Teacher` trait and its default policy.
//! - `program`    : the canonical self-modifying goal-seeker chunk stream.
//! - `controller` : the interaction controller and its `VmSnapshot`.

#![forbid(unsafe_code)]
#![deny(rust_2018_idioms, unused_must_use)]
#![cfg_attr(not(debug_assertions), warn(missing_docs))]

pub mod codec;
pub mod config;
pub mod controller;
pub mod error;
pub mod opcodes;
pub mod primes;
pub mod program;
pub mod teacher;
pub mod vm;

pub use codec::{Chunk, DecodeCache};
pub use config::VmConfig;
pub use controller::{Controller, ControllerError, ProgramCell, VmSnapshot};
pub use error::{DecodeError, EncodingError, VmError};
pub use opcodes::{Opcode, OpcodeTable};
pub use primes::PrimeTable;
pub use teacher::{DefaultTeacher, Teacher};
pub use vm::Vm;

/// The crate's version, as reported by Cargo.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Convenience re-exports for hosts embedding `primeos-core` (mirrors the
/// teacher's `vitte-core::prelude`).
pub mod prelude {
    pub use crate::{
        codec, Chunk, Controller, ControllerError, DecodeCache, DecodeError, DefaultTeacher, EncodingError, Opcode, OpcodeTable, PrimeTable,
        ProgramCell, Teacher, Vm, VmConfig, VmError, VmSnapshot,
    };
}
