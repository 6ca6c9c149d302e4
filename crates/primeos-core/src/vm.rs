//! vm.rs — the stack-machine core (component C), spec §4.3.

use std::sync::Arc;

use num_bigint::{BigInt, Sign};
use num_traits::ToPrimitive;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::codec::{self, Chunk, DecodeCache};
use crate::config::VmConfig;
use crate::error::{EncodingError, VmError};
use crate::opcodes::{Opcode, OpcodeTable};
use crate::primes::PrimeTable;

/// Outcome of dispatching one instruction, before `step` applies the IP
/// update (spec §8: "either IP increased by exactly one, or the
/// last-executed opcode was one of {JUMP, JUMP_IF_ZERO (taken), OP_INPUT
/// (unchanged), HALT}").
enum Flow {
    Advance,
    JumpTo(usize),
    Suspend,
    Halt,
}

/// The VM (component C): program memory, stack, instruction pointer, output
/// log, and the halted/error/pending-input flags (spec §3 "VM state").
pub struct Vm {
    primes: Arc<PrimeTable>,
    opcodes: Arc<OpcodeTable>,
    config: VmConfig,
    program: Vec<Chunk>,
    stack: Vec<BigInt>,
    ip: usize,
    output_log: Vec<BigInt>,
    halted: bool,
    error: Option<VmError>,
    pending_input: bool,
    cache: DecodeCache,
    rng: StdRng,
}

impl Vm {
    /// Builds a VM over `program`. A program longer than
    /// `config.program_memory_cap` (guarding against a runaway
    /// self-modifying program that somehow grew unbounded before reaching
    /// this point) produces a VM that is already halted with
    /// `VmError::ProgramTooLarge`, rather than a construction failure — the
    /// same "halt with an error, don't refuse to exist" shape every other
    /// fatal condition in this VM uses.
    pub fn new(primes: Arc<PrimeTable>, opcodes: Arc<OpcodeTable>, config: VmConfig, program: Vec<Chunk>) -> Self {
        let rng = StdRng::seed_from_u64(config.rng_seed);
        let len = program.len();
        let cap = config.program_memory_cap;
        let mut vm = Self {
            primes,
            opcodes,
            config,
            program,
            stack: Vec::new(),
            ip: 0,
            output_log: Vec::new(),
            halted: false,
            error: None,
            pending_input: false,
            cache: DecodeCache::new(),
            rng,
        };
        if len > cap {
            vm.fail(VmError::ProgramTooLarge { len, cap });
        }
        vm
    }

    pub fn program(&self) -> &[Chunk] {
        &self.program
    }

    pub fn stack(&self) -> &[BigInt] {
        &self.stack
    }

    pub fn output_log(&self) -> &[BigInt] {
        &self.output_log
    }

    pub fn ip(&self) -> usize {
        self.ip
    }

    pub fn halted(&self) -> bool {
        self.halted
    }

    pub fn error(&self) -> Option<&VmError> {
        self.error.as_ref()
    }

    pub fn pending_input(&self) -> bool {
        self.pending_input
    }

    pub fn config(&self) -> &VmConfig {
        &self.config
    }

    pub fn decode_for_display(&mut self, chunk: &Chunk) -> Option<(Opcode, Vec<i64>)> {
        self.cache.get_or_decode(&self.primes, &self.opcodes, &self.config, chunk).ok()
    }

    fn fail(&mut self, err: VmError) {
        self.halted = true;
        self.error = Some(err);
    }

    fn push(&mut self, v: BigInt) -> Result<(), VmError> {
        if self.stack.len() >= self.config.stack_cap {
            return Err(VmError::StackOverflow { cap: self.config.stack_cap });
        }
        self.stack.push(v);
        Ok(())
    }

    fn pop(&mut self) -> Result<BigInt, VmError> {
        self.stack.pop().ok_or(VmError::StackUnderflow)
    }

    fn pop_i64(&mut self) -> Result<i64, VmError> {
        let v = self.pop()?;
        v.to_i64().ok_or(VmError::ArithmeticOverflow)
    }

    fn pop_usize_addr(&mut self) -> Result<usize, VmError> {
        let v = self.pop()?;
        let as_i64 = v.to_i64().ok_or(VmError::AddressOutOfRange { addr: i64::MAX, len: self.program.len() })?;
        self.check_addr(as_i64)
    }

    fn check_addr(&self, addr: i64) -> Result<usize, VmError> {
        if addr < 0 || addr as usize >= self.program.len() {
            return Err(VmError::AddressOutOfRange { addr, len: self.program.len() });
        }
        Ok(addr as usize)
    }

    /// Execute exactly one instruction unless halted or suspended (spec
    /// §4.3, §5 "Suspension points"). A no-op while halted or suspended.
    pub fn step(&mut self) -> Result<(), &VmError> {
        if self.halted || self.pending_input {
            return Ok(());
        }

        let addr = self.ip;
        let chunk = match self.program.get(addr) {
            Some(c) => c.clone(),
            None => {
                self.fail(VmError::AddressOutOfRange { addr: addr as i64, len: self.program.len() });
                return Err(self.error.as_ref().unwrap());
            }
        };

        let decoded = self.cache.get_or_decode(&self.primes, &self.opcodes, &self.config, &chunk);
        let (opcode, operands) = match decoded {
            Ok(v) => v,
            Err(e) => {
                self.fail(VmError::Decode(e));
                return Err(self.error.as_ref().unwrap());
            }
        };

        #[cfg(feature = "tracing")]
        tracing::debug!(ip = addr, opcode = opcode.mnemonic(), stack_depth = self.stack.len(), "step");

        let flow = self.dispatch(opcode, &operands);
        match flow {
            Ok(Flow::Advance) => self.ip += 1,
            Ok(Flow::JumpTo(dest)) => self.ip = dest,
            Ok(Flow::Suspend) => self.pending_input = true,
            Ok(Flow::Halt) => self.halted = true,
            Err(e) => {
                self.fail(e);
                return Err(self.error.as_ref().unwrap());
            }
        }

        if self.config.assert_frame_depth && self.ip == 0 {
            // Spec §9 debug mode: assert the stack is back to its steady
            // loop-top shape — a single carried `carry` value, the state
            // frame's only piece that stays on the runtime stack rather than
            // in a memory cell. A mismatch here is exactly the "fragile"
            // corruption the design notes warn ADD/PUSH(0) can cause.
            if self.stack.len() != 1 {
                self.fail(VmError::FrameCorruption { expected: 1, found: self.stack.len() });
                return Err(self.error.as_ref().unwrap());
            }
        }

        Ok(())
    }

    /// Resume a suspended `OP_INPUT`: push `value`, clear `pending_input`,
    /// advance IP by one (spec §4.3 "OP_INPUT", §5 "Suspension points").
    pub fn provide_input(&mut self, value: i64) -> Result<(), VmError> {
        if !self.pending_input {
            return Ok(());
        }
        self.push(BigInt::from(value))?;
        self.pending_input = false;
        self.ip += 1;
        Ok(())
    }

    /// Seed the stack before the first `step`, bottom-first (spec §4.4
    /// "init": the controller seeds the carried state before the goal-seeker's
    /// first iteration runs). Only meaningful prior to any `step()` call.
    pub fn seed_stack(&mut self, values: &[i64]) -> Result<(), VmError> {
        for &v in values {
            self.push(BigInt::from(v))?;
        }
        Ok(())
    }

    /// Overwrite program memory at `addr` with a chunk built by
    /// `BUILD_CHUNK`/`codec::build`. Used by the controller to pre-poke the
    /// initial `PUSH(initial_target)` at address 0 (spec §4.4 "init").
    pub fn poke(&mut self, addr: usize, chunk: Chunk) -> Result<(), VmError> {
        codec::decode(&self.primes, &self.opcodes, &self.config, &chunk).map_err(VmError::Decode)?;
        *self.program.get_mut(addr).ok_or(VmError::AddressOutOfRange { addr: addr as i64, len: self.program.len() })? = chunk;
        Ok(())
    }

    fn dispatch(&mut self, opcode: Opcode, operands: &[i64]) -> Result<Flow, VmError> {
        match opcode {
            Opcode::Nop => Ok(Flow::Advance),

            Opcode::Push => {
                self.push(BigInt::from(operands[0]))?;
                Ok(Flow::Advance)
            }

            Opcode::Add => self.binop(|a, b| a + b),
            Opcode::Sub => self.binop(|a, b| a - b),
            Opcode::Mul => self.binop(|a, b| a * b),

            Opcode::Mod => {
                let b = self.pop()?;
                let a = self.pop()?;
                if b.sign() == Sign::NoSign {
                    return Err(VmError::DivisionByZero);
                }
                // Truncated remainder (spec §4.3 "MOD", §9 Open Question (ii)).
                self.push(&a % &b)?;
                Ok(Flow::Advance)
            }

            Opcode::Dup => {
                let a = self.pop()?;
                self.push(a.clone())?;
                self.push(a)?;
                Ok(Flow::Advance)
            }

            Opcode::Drop => {
                self.pop()?;
                Ok(Flow::Advance)
            }

            Opcode::Swap => {
                let b = self.pop()?;
                let a = self.pop()?;
                self.push(b)?;
                self.push(a)?;
                Ok(Flow::Advance)
            }

            Opcode::CompareEq => {
                let b = self.pop()?;
                let a = self.pop()?;
                self.push(BigInt::from((a == b) as i64))?;
                Ok(Flow::Advance)
            }

            Opcode::Print => {
                let a = self.pop()?;
                self.output_log.push(a);
                Ok(Flow::Advance)
            }

            Opcode::Jump => {
                let addr = self.pop_usize_addr()?;
                Ok(Flow::JumpTo(addr))
            }

            Opcode::JumpIfZero => {
                let addr = self.pop_usize_addr()?;
                let cond = self.pop()?;
                if cond.sign() == Sign::NoSign {
                    Ok(Flow::JumpTo(addr))
                } else {
                    Ok(Flow::Advance)
                }
            }

            Opcode::OpRandom => {
                let n = self.pop_i64()?;
                if n <= 0 {
                    return Err(VmError::NegativeRandomBound(n));
                }
                let r = self.rng.gen_range(0..n);
                self.push(BigInt::from(r))?;
                Ok(Flow::Advance)
            }

            Opcode::OpInput => Ok(Flow::Suspend),

            Opcode::PeekChunk => {
                let addr = self.pop_usize_addr()?;
                let raw = self.program[addr].value().clone();
                self.push(BigInt::from_biguint(Sign::Plus, raw))?;
                Ok(Flow::Advance)
            }

            Opcode::BuildChunk => {
                let num_pairs = self.pop_i64()?;
                if num_pairs < 1 {
                    return Err(EncodingError::EmptyFactorFrame(num_pairs).into());
                }
                let mut factors = Vec::with_capacity(num_pairs as usize);
                for _ in 0..num_pairs {
                    let exp = self.pop_i64()?;
                    let prime_idx = self.pop_i64()?;
                    if exp < 0 {
                        return Err(EncodingError::NegativeOperand {
                            opcode: Opcode::BuildChunk,
                            index: factors.len(),
                            value: exp,
                        }
                        .into());
                    }
                    if prime_idx < 0 {
                        return Err(EncodingError::NegativeOperand {
                            opcode: Opcode::BuildChunk,
                            index: factors.len(),
                            value: prime_idx,
                        }
                        .into());
                    }
                    factors.push((prime_idx as usize, exp as u32));
                }
                let chunk = codec::build_from_factors(&self.primes, &self.opcodes, &self.config, &factors);
                self.push(BigInt::from_biguint(Sign::Plus, chunk.into_value()))?;
                Ok(Flow::Advance)
            }

            Opcode::PokeChunk => {
                let addr = self.pop_usize_addr()?;
                let raw = self.pop()?;
                if raw.sign() == Sign::Minus {
                    return Err(VmError::AddressOutOfRange { addr: addr as i64, len: self.program.len() });
                }
                let chunk = Chunk::from_biguint(raw.into_parts().1);
                codec::decode(&self.primes, &self.opcodes, &self.config, &chunk).map_err(VmError::Decode)?;
                self.program[addr] = chunk;
                Ok(Flow::Advance)
            }

            Opcode::Factorize => {
                let raw = self.pop()?;
                if raw.sign() == Sign::Minus {
                    return Err(VmError::Decode(crate::error::DecodeError::NoOpcode));
                }
                let chunk = Chunk::from_biguint(raw.into_parts().1);
                let (decoded_op, decoded_operands) =
                    self.cache.get_or_decode(&self.primes, &self.opcodes, &self.config, &chunk).map_err(VmError::Decode)?;
                self.push(BigInt::from(decoded_op.index()))?;
                for v in decoded_operands {
                    self.push(BigInt::from(v))?;
                }
                Ok(Flow::Advance)
            }

            Opcode::Halt => Ok(Flow::Halt),
        }
    }

    fn binop(&mut self, f: impl FnOnce(&BigInt, &BigInt) -> BigInt) -> Result<Flow, VmError> {
        let b = self.pop()?;
        let a = self.pop()?;
        let result = f(&a, &b);
        if result.to_i64().is_none() {
            return Err(VmError::ArithmeticOverflow);
        }
        self.push(result)?;
        Ok(Flow::Advance)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::build;

    fn fresh() -> (Arc<PrimeTable>, Arc<OpcodeTable>, VmConfig) {
        let primes = Arc::new(PrimeTable::new());
        let opcodes = Arc::new(OpcodeTable::build(&primes));
        (primes, opcodes, VmConfig::default())
    }

    fn asm(primes: &PrimeTable, opcodes: &OpcodeTable, cfg: &VmConfig, op: Opcode, operands: &[i64]) -> Chunk {
        build(primes, opcodes, cfg, op, operands).unwrap()
    }

    #[test]
    fn push_print_halt_appends_to_output_log() {
        let (primes, opcodes, cfg) = fresh();
        let program = vec![
            asm(&primes, &opcodes, &cfg, Opcode::Push, &[7]),
            asm(&primes, &opcodes, &cfg, Opcode::Print, &[]),
            asm(&primes, &opcodes, &cfg, Opcode::Halt, &[]),
        ];
        let mut vm = Vm::new(primes, opcodes, cfg, program);
        vm.step().unwrap();
        vm.step().unwrap();
        vm.step().unwrap();
        assert!(vm.halted());
        assert_eq!(vm.output_log(), &[BigInt::from(7)]);
    }

    #[test]
    fn mod_by_zero_halts() {
        let (primes, opcodes, cfg) = fresh();
        let program = vec![
            asm(&primes, &opcodes, &cfg, Opcode::Push, &[5]),
            asm(&primes, &opcodes, &cfg, Opcode::Push, &[0]),
            asm(&primes, &opcodes, &cfg, Opcode::Mod, &[]),
        ];
        let mut vm = Vm::new(primes, opcodes, cfg, program);
        vm.step().unwrap();
        vm.step().unwrap();
        assert!(vm.step().is_err());
        assert!(vm.halted());
        assert!(matches!(vm.error(), Some(VmError::DivisionByZero)));
    }

    #[test]
    fn jump_to_len_is_out_of_range_len_minus_one_succeeds() {
        let (primes, opcodes, cfg) = fresh();
        let program = vec![
            asm(&primes, &opcodes, &cfg, Opcode::Push, &[1]),
            asm(&primes, &opcodes, &cfg, Opcode::Jump, &[]),
            asm(&primes, &opcodes, &cfg, Opcode::Nop, &[]),
        ];
        let mut vm = Vm::new(primes.clone(), opcodes.clone(), cfg.clone(), program.clone());
        vm.step().unwrap();
        vm.step().unwrap();
        assert_eq!(vm.ip(), 2);
        assert!(!vm.halted());

        let program_oob = vec![
            asm(&primes, &opcodes, &cfg, Opcode::Push, &[3]),
            asm(&primes, &opcodes, &cfg, Opcode::Jump, &[]),
            asm(&primes, &opcodes, &cfg, Opcode::Nop, &[]),
        ];
        let mut vm2 = Vm::new(primes, opcodes, cfg, program_oob);
        vm2.step().unwrap();
        assert!(vm2.step().is_err());
        assert!(matches!(vm2.error(), Some(VmError::AddressOutOfRange { .. })));
    }

    #[test]
    fn op_input_suspends_then_provide_input_resumes() {
        let (primes, opcodes, cfg) = fresh();
        let program = vec![
            asm(&primes, &opcodes, &cfg, Opcode::OpInput, &[]),
            asm(&primes, &opcodes, &cfg, Opcode::Print, &[]),
        ];
        let mut vm = Vm::new(primes, opcodes, cfg, program);
        vm.step().unwrap();
        assert!(vm.pending_input());
        assert_eq!(vm.ip(), 0);
        // step() is a no-op while suspended.
        vm.step().unwrap();
        assert_eq!(vm.ip(), 0);

        vm.provide_input(9).unwrap();
        assert!(!vm.pending_input());
        assert_eq!(vm.ip(), 1);
        vm.step().unwrap();
        assert_eq!(vm.output_log(), &[BigInt::from(9)]);
    }

    #[test]
    fn build_chunk_then_poke_self_modifies_program_memory() {
        let (primes, opcodes, cfg) = fresh();
        let opcode_idx = opcodes.opcode_prime_index(Opcode::Push);
        let operand_idx = opcodes.operand_prime_indices(Opcode::Push)[0];
        let program = vec![
            asm(&primes, &opcodes, &cfg, Opcode::Push, &[operand_idx as i64]), // prime_idx for pair 1
            asm(&primes, &opcodes, &cfg, Opcode::Push, &[6]),                  // exp for pair 1 (value 5)
            asm(&primes, &opcodes, &cfg, Opcode::Push, &[opcode_idx as i64]),  // prime_idx for pair 2
            asm(&primes, &opcodes, &cfg, Opcode::Push, &[1]),                  // exp for pair 2 (opcode prime^1)
            asm(&primes, &opcodes, &cfg, Opcode::Push, &[2]),                  // num_factor_pairs
            asm(&primes, &opcodes, &cfg, Opcode::BuildChunk, &[]),
            asm(&primes, &opcodes, &cfg, Opcode::Push, &[1]),                  // addr
            asm(&primes, &opcodes, &cfg, Opcode::PokeChunk, &[]),
            asm(&primes, &opcodes, &cfg, Opcode::Halt, &[]),
        ];
        let mut vm = Vm::new(primes, opcodes, cfg, program);
        for _ in 0..9 {
            vm.step().unwrap();
        }
        assert!(vm.halted());
        assert!(vm.error().is_none());
        let (op, operands) = vm.decode_for_display(&vm.program()[1].clone()).unwrap();
        assert_eq!(op, Opcode::Push);
        assert_eq!(operands, vec![5]);
    }

    #[test]
    fn poke_chunk_without_checksum_factor_halts() {
        let (primes, opcodes, cfg) = fresh();
        let program = vec![asm(&primes, &opcodes, &cfg, Opcode::Nop, &[])];
        let mut vm = Vm::new(primes.clone(), opcodes.clone(), cfg.clone(), program);
        // A bare opcode prime with no checksum factor at all.
        let bare = primes.nth_prime(opcodes.opcode_prime_index(Opcode::Nop));
        vm.push(BigInt::from_biguint(Sign::Plus, bare)).unwrap();
        vm.push(BigInt::from(0)).unwrap();
        let flow = vm.dispatch(Opcode::PokeChunk, &[]);
        assert!(flow.is_err());
    }

    #[test]
    fn factorize_round_trips_through_build_chunk_ordering() {
        let (primes, opcodes, cfg) = fresh();
        let chunk = asm(&primes, &opcodes, &cfg, Opcode::Push, &[11]);
        let program = vec![Opcode::Halt]
            .into_iter()
            .map(|op| asm(&primes, &opcodes, &cfg, op, &[]))
            .collect::<Vec<_>>();
        let mut vm = Vm::new(primes, opcodes, cfg, program);
        vm.push(BigInt::from_biguint(Sign::Plus, chunk.into_value())).unwrap();
        vm.dispatch(Opcode::Factorize, &[]).unwrap();
        assert_eq!(vm.pop().unwrap(), BigInt::from(11));
        assert_eq!(vm.pop().unwrap(), BigInt::from(Opcode::Push.index()));
    }

    #[test]
    fn program_longer_than_cap_is_born_halted() {
        let (primes, opcodes, mut cfg) = fresh();
        cfg.program_memory_cap = 2;
        let program = vec![
            asm(&primes, &opcodes, &cfg, Opcode::Nop, &[]),
            asm(&primes, &opcodes, &cfg, Opcode::Nop, &[]),
            asm(&primes, &opcodes, &cfg, Opcode::Halt, &[]),
        ];
        let vm = Vm::new(primes, opcodes, cfg, program);
        assert!(vm.halted());
        assert!(matches!(vm.error(), Some(VmError::ProgramTooLarge { len: 3, cap: 2 })));
    }

    #[test]
    fn program_within_cap_starts_normally() {
        let (primes, opcodes, cfg) = fresh();
        let program = vec![asm(&primes, &opcodes, &cfg, Opcode::Halt, &[])];
        let vm = Vm::new(primes, opcodes, cfg, program);
        assert!(!vm.halted());
    }
}
