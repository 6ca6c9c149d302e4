//! opcodes.rs — the fixed opcode enumeration and its prime assignment.
//!
//! Spec §6 fixes the opcode *names*; exact prime assignments are
//! implementation-defined but fixed at build time (spec §9, Open Question
//! (i)). This implementation registers primes in declaration order: each
//! opcode's own identifying prime, immediately followed by its operand
//! primes (if any), then the checksum prime last of all. `FACTORIZE`'s
//! output order follows the same `OPERAND_PRIMES` order, which resolves the
//! spec's open question about its ordering.

use std::collections::HashMap;

use num_bigint::BigUint;

use crate::primes::PrimeTable;

/// The fixed opcode enumeration (spec §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    Nop,
    Push,
    Add,
    Sub,
    Mul,
    Mod,
    Dup,
    Drop,
    Swap,
    CompareEq,
    Print,
    Jump,
    JumpIfZero,
    OpRandom,
    OpInput,
    PeekChunk,
    BuildChunk,
    PokeChunk,
    Factorize,
    Halt,
}

impl Opcode {
    /// Declaration order — also the order primes are registered in.
    pub const ALL: [Opcode; 20] = [
        Opcode::Nop,
        Opcode::Push,
        Opcode::Add,
        Opcode::Sub,
        Opcode::Mul,
        Opcode::Mod,
        Opcode::Dup,
        Opcode::Drop,
        Opcode::Swap,
        Opcode::CompareEq,
        Opcode::Print,
        Opcode::Jump,
        Opcode::JumpIfZero,
        Opcode::OpRandom,
        Opcode::OpInput,
        Opcode::PeekChunk,
        Opcode::BuildChunk,
        Opcode::PokeChunk,
        Opcode::Factorize,
        Opcode::Halt,
    ];

    /// Number of chunk-encoded operands this opcode carries. Every opcode
    /// except `PUSH` takes its operands off the stack instead (spec §4.3).
    pub fn operand_arity(self) -> usize {
        match self {
            Opcode::Push => 1,
            _ => 0,
        }
    }

    /// Stable small identifier, used as the value `FACTORIZE` pushes for the
    /// opcode itself (spec §4.3, `FACTORIZE` stack effect).
    pub fn index(self) -> u8 {
        Self::ALL.iter().position(|&o| o == self).expect("Opcode::ALL is exhaustive") as u8
    }

    pub fn from_index(idx: u8) -> Option<Opcode> {
        Self::ALL.get(idx as usize).copied()
    }

    pub fn mnemonic(self) -> &'static str {
        match self {
            Opcode::Nop => "NOP",
            Opcode::Push => "PUSH",
            Opcode::Add => "ADD",
            Opcode::Sub => "SUB",
            Opcode::Mul => "MUL",
            Opcode::Mod => "MOD",
            Opcode::Dup => "DUP",
            Opcode::Drop => "DROP",
            Opcode::Swap => "SWAP",
            Opcode::CompareEq => "COMPARE_EQ",
            Opcode::Print => "PRINT",
            Opcode::Jump => "JUMP",
            Opcode::JumpIfZero => "JUMP_IF_ZERO",
            Opcode::OpRandom => "OP_RANDOM",
            Opcode::OpInput => "OP_INPUT",
            Opcode::PeekChunk => "PEEK_CHUNK",
            Opcode::BuildChunk => "BUILD_CHUNK",
            Opcode::PokeChunk => "POKE_CHUNK",
            Opcode::Factorize => "FACTORIZE",
            Opcode::Halt => "HALT",
        }
    }
}

impl std::fmt::Display for Opcode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.mnemonic())
    }
}

/// `OPCODE_PRIME`/`OPERAND_PRIMES` (spec §3), materialized once against a
/// `PrimeTable`.
pub struct OpcodeTable {
    opcode_prime_index: HashMap<Opcode, usize>,
    operand_prime_indices: HashMap<Opcode, Vec<usize>>,
    prime_index_to_opcode: HashMap<usize, Opcode>,
    checksum_prime_index: usize,
}

impl OpcodeTable {
    pub fn build(primes: &PrimeTable) -> Self {
        let mut opcode_prime_index = HashMap::new();
        let mut operand_prime_indices = HashMap::new();
        let mut prime_index_to_opcode = HashMap::new();
        let mut next = 0usize;

        for op in Opcode::ALL {
            opcode_prime_index.insert(op, next);
            prime_index_to_opcode.insert(next, op);
            next += 1;

            let mut operands = Vec::with_capacity(op.operand_arity());
            for _ in 0..op.operand_arity() {
                operands.push(next);
                next += 1;
            }
            operand_prime_indices.insert(op, operands);
        }

        let checksum_prime_index = next;
        primes.nth_prime(checksum_prime_index); // materialize eagerly

        Self {
            opcode_prime_index,
            operand_prime_indices,
            prime_index_to_opcode,
            checksum_prime_index,
        }
    }

    pub fn opcode_prime_index(&self, op: Opcode) -> usize {
        self.opcode_prime_index[&op]
    }

    pub fn operand_prime_indices(&self, op: Opcode) -> &[usize] {
        &self.operand_prime_indices[&op]
    }

    pub fn checksum_prime_index(&self) -> usize {
        self.checksum_prime_index
    }

    pub fn opcode_for_prime_index(&self, idx: usize) -> Option<Opcode> {
        self.prime_index_to_opcode.get(&idx).copied()
    }

    pub fn opcode_prime(&self, primes: &PrimeTable, op: Opcode) -> BigUint {
        primes.nth_prime(self.opcode_prime_index(op))
    }

    pub fn operand_primes(&self, primes: &PrimeTable, op: Opcode) -> Vec<BigUint> {
        self.operand_prime_indices(op).iter().map(|&i| primes.nth_prime(i)).collect()
    }

    pub fn checksum_prime(&self, primes: &PrimeTable) -> BigUint {
        primes.nth_prime(self.checksum_prime_index)
    }
}
