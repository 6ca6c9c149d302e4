//! config.rs — canonical constants as a tunable, serde-friendly config
//! (spec §6 "Canonical constants", §9 "Stack-carried state frame").
//!
//! `primeos-core` never hard-codes a constant where a `VmConfig` field
//! exists; a host (e.g. `primeos-cli`, reading an optional TOML file the way
//! the teacher's CLI reads `vitte.toml`) can retune the game without
//! touching this crate.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VmConfig {
    /// Safe cap on stack depth; exceeding it is `VmError::StackOverflow`.
    pub stack_cap: usize,
    /// Safe cap on program memory length.
    pub program_memory_cap: usize,
    /// `CHECKSUM_MOD` — modulus for the checksum exponent.
    pub checksum_mod: u32,
    /// `ATTEMPT_MODULUS` — range of target/attempt values, `[0, N)`.
    pub attempt_modulus: i64,
    /// `MAX_FAILURES_BEFORE_STUCK` — consecutive failures before the stuck
    /// signal is printed.
    pub max_failures_before_stuck: u32,
    /// `STUCK_SIGNAL` — value printed once when failures reach the max.
    pub stuck_signal: i64,
    /// Debug mode (spec §9): assert stack depth at the top of the
    /// goal-seeker's main loop (every time IP returns to 0).
    pub assert_frame_depth: bool,
    /// Seed for the VM's per-instance PRNG (`OP_RANDOM`, and the Teacher's
    /// own source unless a host supplies a different one).
    pub rng_seed: u64,
}

impl Default for VmConfig {
    fn default() -> Self {
        Self {
            stack_cap: 4096,
            program_memory_cap: 65536,
            checksum_mod: 256,
            attempt_modulus: 10,
            max_failures_before_stuck: 3,
            stuck_signal: 99,
            assert_frame_depth: false,
            rng_seed: 42,
        }
    }
}
