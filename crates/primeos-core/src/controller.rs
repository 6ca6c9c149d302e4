//! controller.rs — the interaction controller (component D), spec §4.4,
//! §6.
//!
//! The controller owns one `Vm` instance and one `Teacher` and mediates
//! between them. It never inspects opcodes to figure out what kind of
//! input is expected next; the goal-seeker's protocol alternates
//! deterministically (spec §4.4), so the controller tracks its own phase
//! purely from the answers it has already given.

use std::sync::Arc;

use num_bigint::BigInt;
use num_traits::ToPrimitive;

use crate::codec;
use crate::config::VmConfig;
use crate::error::VmError;
use crate::opcodes::{Opcode, OpcodeTable};
use crate::primes::PrimeTable;
use crate::program;
use crate::teacher::Teacher;
use crate::vm::Vm;

/// Errors the controller itself can raise, distinct from a VM-halting
/// `VmError` (spec §7: "Teacher errors are surfaced as a non-halting
/// error only when they block a required `provide_input`").
#[derive(Debug, Clone, thiserror::Error)]
pub enum ControllerError {
    #[error("controller has not been initialized")]
    NotInitialized,
    #[error("the VM is not currently suspended awaiting input")]
    NoInputPending,
    #[error("no attempt has been printed yet")]
    NoPrintedAttempt,
    #[error("the last printed attempt does not fit in an i64")]
    AttemptOutOfRange,
    #[error(transparent)]
    Vm(#[from] VmError),
}

/// The controller's own bookkeeping of which kind of value the next
/// `provide_input` call must supply (spec §4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    AwaitingAttemptResult,
    SendTarget,
}

impl Phase {
    fn as_str(self) -> &'static str {
        match self {
            Phase::Idle => "IDLE",
            Phase::AwaitingAttemptResult => "AWAITING_ATTEMPT_RESULT",
            Phase::SendTarget => "SEND_TARGET",
        }
    }
}

/// One program-memory cell as rendered for `VmSnapshot::program_memory`
/// (spec §6). `raw_chunk` is the chunk's decimal string (chunks routinely
/// exceed any machine integer type); `decoded` is the human-readable
/// `OPCODE(operands...)` form.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ProgramCell {
    pub address: usize,
    pub raw_chunk: String,
    pub decoded: String,
}

/// The external control-surface snapshot (spec §6 "VM snapshot").
///
/// `stack` and `output_log` are rendered as decimal strings rather than a
/// machine integer type: every VM-internal arithmetic result is checked to
/// fit an `i64` before it is pushed (`Vm::binop`), but `PEEK_CHUNK` pushes a
/// chunk's raw value unchecked, and chunks are routinely far larger than
/// `i64::MAX`. Strings keep the snapshot uniformly lossless.
#[derive(Debug, Clone, serde::Serialize)]
pub struct VmSnapshot {
    pub instruction_pointer: i64,
    pub stack: Vec<String>,
    pub output_log: Vec<String>,
    pub halted: bool,
    pub error: Option<String>,
    pub program_memory: Vec<ProgramCell>,
    pub needs_input: bool,
    pub interaction_phase: &'static str,
    pub current_target: Option<i64>,
    pub difficulty_level: String,
    pub attempts_on_target: u32,
}

fn format_decoded(op: Opcode, operands: &[i64]) -> String {
    if operands.is_empty() {
        op.mnemonic().to_string()
    } else {
        let joined = operands.iter().map(i64::to_string).collect::<Vec<_>>().join(", ");
        format!("{}({joined})", op.mnemonic())
    }
}

/// Drives one goal-seeker `Vm` through its Teacher interaction (spec §4.4).
pub struct Controller {
    primes: Arc<PrimeTable>,
    opcodes: Arc<OpcodeTable>,
    config: VmConfig,
    teacher: Box<dyn Teacher>,
    vm: Option<Vm>,
    phase: Phase,
    current_target: Option<i64>,
    attempts_on_target: u32,
}

impl Controller {
    pub fn new(primes: Arc<PrimeTable>, opcodes: Arc<OpcodeTable>, config: VmConfig, teacher: Box<dyn Teacher>) -> Self {
        Self {
            primes,
            opcodes,
            config,
            teacher,
            vm: None,
            phase: Phase::Idle,
            current_target: None,
            attempts_on_target: 0,
        }
    }

    /// Load the canonical goal-seeker program, seed the carried `carry`
    /// value, choose an initial target, and pre-`POKE` it into address 0
    /// (spec §4.4 "init").
    pub fn init(&mut self) -> VmSnapshot {
        let program = program::goal_seeker(&self.primes, &self.opcodes, &self.config);
        let mut vm = Vm::new(self.primes.clone(), self.opcodes.clone(), self.config.clone(), program);
        vm.seed_stack(&[0]).expect("a fresh VM always accepts the initial carry");

        let target = self.teacher.choose_initial_target();
        let chunk =
            codec::build(&self.primes, &self.opcodes, &self.config, Opcode::Push, &[target]).expect("PUSH(target) is always well-formed");
        vm.poke(program::ADDR_ATTEMPT, chunk).expect("address 0 always exists in the goal-seeker program");

        self.current_target = Some(target);
        self.attempts_on_target = 0;
        self.phase = Phase::AwaitingAttemptResult;
        self.vm = Some(vm);
        self.snapshot()
    }

    /// Execute exactly one VM instruction (a no-op if not yet initialized,
    /// halted, or suspended).
    pub fn step(&mut self) -> VmSnapshot {
        if let Some(vm) = self.vm.as_mut() {
            let _ = vm.step();
        }
        self.snapshot()
    }

    /// Resume a suspended `OP_INPUT`. `value = None` asks the Teacher to
    /// decide the value for the current phase; `Some(v)` supplies it
    /// directly (e.g. a human operator overriding the Teacher).
    pub fn provide_input(&mut self, value: Option<i64>) -> Result<VmSnapshot, ControllerError> {
        let resolved = self.resolve_input(value)?;
        self.advance_phase(resolved);

        let vm = self.vm.as_mut().ok_or(ControllerError::NotInitialized)?;
        vm.provide_input(resolved)?;
        Ok(self.snapshot())
    }

    fn resolve_input(&mut self, value: Option<i64>) -> Result<i64, ControllerError> {
        if let Some(v) = value {
            let vm = self.vm.as_ref().ok_or(ControllerError::NotInitialized)?;
            if !vm.pending_input() {
                return Err(ControllerError::NoInputPending);
            }
            return Ok(v);
        }

        match self.phase {
            Phase::Idle => Err(ControllerError::NotInitialized),
            Phase::AwaitingAttemptResult => {
                let target = self.current_target.ok_or(ControllerError::NotInitialized)?;
                let attempt = self.read_last_printed_attempt()?;
                self.attempts_on_target += 1;
                Ok(self.teacher.evaluate(target, attempt) as i64)
            }
            Phase::SendTarget => {
                let previous = self.current_target.unwrap_or(0);
                Ok(self.teacher.next_target(previous, true))
            }
        }
    }

    /// Phase transitions happen only here, in response to the value just
    /// about to be fed back — never by inspecting opcodes (spec §4.4).
    fn advance_phase(&mut self, resolved: i64) {
        match self.phase {
            Phase::AwaitingAttemptResult if resolved == 1 => self.phase = Phase::SendTarget,
            Phase::AwaitingAttemptResult => {} // failure: stays AWAITING_ATTEMPT_RESULT
            Phase::SendTarget => {
                self.current_target = Some(resolved);
                self.attempts_on_target = 0;
                self.phase = Phase::AwaitingAttemptResult;
            }
            Phase::Idle => {}
        }
    }

    /// The value actually printed by the last loop iteration — the result
    /// *after* the modification slot (address 1) ran, not address 0's raw
    /// stored operand. The two diverge the moment the failure path rewrites
    /// address 1 away from `NOP`, so this must read the VM's output log
    /// rather than re-decoding program memory.
    fn read_last_printed_attempt(&self) -> Result<i64, ControllerError> {
        let vm = self.vm.as_ref().ok_or(ControllerError::NotInitialized)?;
        let value = vm.output_log().last().ok_or(ControllerError::NoPrintedAttempt)?;
        value.to_i64().ok_or(ControllerError::AttemptOutOfRange)
    }

    pub fn snapshot(&mut self) -> VmSnapshot {
        let difficulty_level = self.teacher.difficulty_label().to_string();
        let phase = self.phase.as_str();
        let current_target = self.current_target;
        let attempts_on_target = self.attempts_on_target;

        let Some(vm) = self.vm.as_mut() else {
            return VmSnapshot {
                instruction_pointer: -1,
                stack: Vec::new(),
                output_log: Vec::new(),
                halted: false,
                error: None,
                program_memory: Vec::new(),
                needs_input: false,
                interaction_phase: phase,
                current_target,
                difficulty_level,
                attempts_on_target,
            };
        };

        let program = vm.program().to_vec();
        let program_memory = program
            .iter()
            .enumerate()
            .map(|(address, chunk)| {
                let decoded = match vm.decode_for_display(chunk) {
                    Some((op, operands)) => format_decoded(op, &operands),
                    None => "<undecodable>".to_string(),
                };
                ProgramCell { address, raw_chunk: chunk.to_string(), decoded }
            })
            .collect();

        VmSnapshot {
            instruction_pointer: vm.ip() as i64,
            stack: vm.stack().iter().map(BigInt::to_string).collect(),
            output_log: vm.output_log().iter().map(BigInt::to_string).collect(),
            halted: vm.halted(),
            error: vm.error().map(ToString::to_string),
            program_memory,
            needs_input: vm.pending_input(),
            interaction_phase: phase,
            current_target,
            difficulty_level,
            attempts_on_target,
        }
    }
}
