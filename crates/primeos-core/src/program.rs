//! program.rs — the canonical goal-seeker chunk stream (component F,
//! spec §4.6).
//!
//! The goal-seeker is a fixed program: there is no runtime text source and
//! no parser. It is assembled once, in Rust, by a small two-pass
//! label-resolving builder (the same shape as a conventional assembler's
//! label-fixup pass, just emitting chunks instead of parsing source text).
//!
//! **State frame as memory cells, plus one stack-resident carry.** The
//! protocol's four-element state frame (`last_pushed_addr0_value`,
//! `session_failure_count`, `last_slot_choice`, `last_instr_type_choice`)
//! is realized here mostly as dedicated, self-modifying `PUSH`-carrying
//! memory cells rather than as values permanently resident deep on the
//! runtime stack. The instruction set has no multi-element stack rotation
//! primitive (only `DUP`/`SWAP`/`DROP`, each reaching at most the top two
//! slots), so keeping a 4-deep frame *in place* across arbitrary branches
//! would need machinery this ISA doesn't have. Memory cells, read with
//! `PEEK_CHUNK`+`FACTORIZE` and written with `BUILD_CHUNK`+`POKE_CHUNK`,
//! are the VM's native idiom for persistent mutable state — address 0 and
//! 1 already work this way. `last_pushed_addr0_value` doesn't even need
//! its own cell: address 0 already holds it. `last_slot_choice` stays a
//! constant-0 cell (the generator never wires the slot-0/slot-1 choice
//! described in the source comments; spec resolves this as effectively
//! hard-coded to slot 0).
//!
//! One element *does* stay on the runtime stack across iterations: a
//! `carry` value, seeded once by the controller beneath the attempt, so
//! the modification slot's `ADD`/`PUSH(0)`/`NOP` choices each have a
//! well-defined operand when they execute right after the attempt is
//! pushed. `NOP` leaves `carry` untouched; `ADD` and `PUSH(0)` both throw
//! the stack out of its steady one-element shape — this is the literal
//! "fragile...corrupts all future iterations" behavior the design notes
//! call out, not a bug to engineer away. A sustained run of those
//! mutations can eventually starve a later `ADD` of an operand and halt
//! the VM with a stack error, which is itself a defined, fatal outcome.

use crate::codec::{self, Chunk};
use crate::config::VmConfig;
use crate::opcodes::{Opcode, OpcodeTable};
use crate::primes::PrimeTable;

/// Address of the attempt cell (spec's "slot 0").
pub const ADDR_ATTEMPT: usize = 0;
/// Address of the modification slot (spec's "slot 1"), initially `NOP`.
pub const ADDR_MOD_SLOT: usize = 1;

enum Operand {
    None,
    Imm(i64),
    Label(&'static str),
}

enum Emit {
    Instr(Opcode, Operand),
    Label(&'static str),
}

/// A tiny two-pass assembler: labels are resolved to addresses once every
/// instruction has been emitted, then every chunk is built.
struct Builder {
    lines: Vec<Emit>,
}

impl Builder {
    fn new() -> Self {
        Self { lines: Vec::new() }
    }

    fn op(&mut self, op: Opcode) -> &mut Self {
        self.lines.push(Emit::Instr(op, Operand::None));
        self
    }

    fn push_imm(&mut self, value: i64) -> &mut Self {
        self.lines.push(Emit::Instr(Opcode::Push, Operand::Imm(value)));
        self
    }

    fn push_label(&mut self, label: &'static str) -> &mut Self {
        self.lines.push(Emit::Instr(Opcode::Push, Operand::Label(label)));
        self
    }

    fn label(&mut self, name: &'static str) -> &mut Self {
        self.lines.push(Emit::Label(name));
        self
    }

    /// Emit the 8-instruction subroutine that consumes a value `v` sitting
    /// on top of the stack and replaces it with a chunk encoding `PUSH(v)`
    /// (spec §4.3 "BUILD_CHUNK wire format").
    fn build_push_chunk_from_top(&mut self, table: &OpcodeTable) -> &mut Self {
        let opcode_idx = table.opcode_prime_index(Opcode::Push) as i64;
        let operand_idx = table.operand_prime_indices(Opcode::Push)[0] as i64;
        self.push_imm(1)
            .op(Opcode::Add) // v -> v+1 (operand exponent)
            .push_imm(operand_idx)
            .op(Opcode::Swap) // -> (operand_idx, v+1)
            .push_imm(opcode_idx)
            .push_imm(1) // opcode-identifying exponent
            .push_imm(2) // num_factor_pairs
            .op(Opcode::BuildChunk)
    }

    /// Emit the 5-instruction sequence that reads memory cell `addr`
    /// (assumed to hold a single-operand `PUSH` chunk) and leaves its
    /// operand value on top of the stack.
    fn read_cell(&mut self, addr: usize) -> &mut Self {
        self.push_imm(addr as i64)
            .op(Opcode::PeekChunk)
            .op(Opcode::Factorize) // -> [..., opcode_idx, value]
            .op(Opcode::Swap)
            .op(Opcode::Drop) // -> [..., value]
    }

    /// As `read_cell`, but the cell's address is a label resolved in the
    /// assembly pass rather than a literal known up front.
    fn read_cell_label(&mut self, label: &'static str) -> &mut Self {
        self.push_label(label)
            .op(Opcode::PeekChunk)
            .op(Opcode::Factorize)
            .op(Opcode::Swap)
            .op(Opcode::Drop)
    }

    /// Resolve labels and assemble every line into a chunk stream.
    fn assemble(self, primes: &PrimeTable, table: &OpcodeTable, cfg: &VmConfig) -> Vec<Chunk> {
        let mut addresses = std::collections::HashMap::new();
        let mut addr = 0usize;
        for line in &self.lines {
            match line {
                Emit::Instr(..) => addr += 1,
                Emit::Label(name) => {
                    addresses.insert(*name, addr as i64);
                }
            }
        }

        let mut program = Vec::with_capacity(addr);
        for line in self.lines {
            if let Emit::Instr(op, operand) = line {
                let resolved = match operand {
                    Operand::None => vec![],
                    Operand::Imm(v) => vec![v],
                    Operand::Label(name) => {
                        vec![*addresses.get(name).expect("undefined label")]
                    }
                };
                program.push(codec::build(primes, table, cfg, op, &resolved).expect("well-formed goal-seeker instruction"));
            }
        }
        program
    }
}

/// Build the canonical self-modifying goal-seeker chunk stream
/// (spec §4.6). Address 0 starts as `PUSH(0)`; the controller overwrites
/// it with `PUSH(initial_target)` immediately after load (spec §4.4
/// "init").
pub fn goal_seeker(primes: &PrimeTable, table: &OpcodeTable, cfg: &VmConfig) -> Vec<Chunk> {
    let mut b = Builder::new();
    let nop_idx = table.opcode_prime_index(Opcode::Nop) as i64;
    let add_idx = table.opcode_prime_index(Opcode::Add) as i64;
    let push_idx = table.opcode_prime_index(Opcode::Push) as i64;
    let push_operand_idx = table.operand_prime_indices(Opcode::Push)[0] as i64;

    // addr 0: attempt cell; addr 1: modification slot, initially NOP.
    b.push_imm(0); // placeholder; controller pokes the real initial target
    b.op(Opcode::Nop);

    // addr 2-3: main loop body.
    b.op(Opcode::Print);
    b.op(Opcode::OpInput); // feedback

    b.push_label("FAIL");
    b.op(Opcode::JumpIfZero); // feedback == 0 -> FAIL; else fall through (success)

    // --- success path: feedback == 1 ---
    b.op(Opcode::OpInput); // new_target
    b.op(Opcode::Dup);
    b.build_push_chunk_from_top(table);
    b.push_imm(ADDR_ATTEMPT as i64);
    b.op(Opcode::PokeChunk); // addr0 := PUSH(new_target)
    b.op(Opcode::Drop);
    b.push_imm(0);
    b.build_push_chunk_from_top(table);
    b.push_label("CELL_FAIL");
    b.op(Opcode::PokeChunk); // reset failure count
    b.push_imm(0);
    b.op(Opcode::Jump); // back to the top of the loop

    // --- failure path: feedback == 0 ---
    b.label("FAIL");
    b.read_cell_label("CELL_FAIL");
    b.push_imm(1);
    b.op(Opcode::Add); // new_failure_count
    b.op(Opcode::Dup);
    b.push_imm(cfg.max_failures_before_stuck as i64);
    b.op(Opcode::CompareEq);
    b.push_label("NOT_STUCK");
    b.op(Opcode::JumpIfZero); // not yet stuck -> skip the signal print

    b.push_imm(cfg.stuck_signal);
    b.op(Opcode::Print);

    b.label("NOT_STUCK");
    b.op(Opcode::Dup);
    b.build_push_chunk_from_top(table);
    b.push_label("CELL_FAIL");
    b.op(Opcode::PokeChunk); // persist the new failure count
    b.op(Opcode::Drop);

    b.read_cell(ADDR_ATTEMPT); // last_attempt, consumed directly below
    b.push_imm(3);
    b.op(Opcode::OpRandom);
    b.op(Opcode::Add);
    b.push_imm(1);
    b.op(Opcode::Add);
    b.push_imm(cfg.attempt_modulus);
    b.op(Opcode::Mod); // candidate = (last_attempt + random(0,3) + 1) mod ATTEMPT_MODULUS
    b.op(Opcode::Dup);
    b.read_cell(ADDR_ATTEMPT); // fresh copy of last_attempt for the distinctness compare
    b.op(Opcode::CompareEq);
    b.push_label("DISTINCT_OK");
    b.op(Opcode::JumpIfZero); // candidate != last_attempt -> distinct already
    b.push_imm(1);
    b.op(Opcode::Add);
    b.push_imm(cfg.attempt_modulus);
    b.op(Opcode::Mod); // candidate == last_attempt -> retry once, guaranteed distinct
    b.label("DISTINCT_OK");

    // randomly choose the modification-slot instruction type.
    b.push_imm(3);
    b.op(Opcode::OpRandom);
    b.op(Opcode::Dup);
    b.push_label("INSTR_PUSH0");
    b.op(Opcode::JumpIfZero);
    b.push_imm(1);
    b.op(Opcode::Sub);
    b.push_label("INSTR_ADD");
    b.op(Opcode::JumpIfZero);

    // instr_choice == 2: NOP
    b.push_imm(nop_idx);
    b.push_imm(1);
    b.push_imm(1);
    b.op(Opcode::BuildChunk);
    b.push_imm(ADDR_MOD_SLOT as i64);
    b.op(Opcode::PokeChunk);
    b.push_imm(2);
    b.push_label("AFTER_SLOT1");
    b.op(Opcode::Jump);

    b.label("INSTR_ADD");
    b.push_imm(add_idx);
    b.push_imm(1);
    b.push_imm(1);
    b.op(Opcode::BuildChunk);
    b.push_imm(ADDR_MOD_SLOT as i64);
    b.op(Opcode::PokeChunk);
    b.push_imm(1);
    b.push_label("AFTER_SLOT1");
    b.op(Opcode::Jump);

    b.label("INSTR_PUSH0");
    b.push_imm(push_idx);
    b.push_imm(1);
    b.push_imm(push_operand_idx);
    b.push_imm(1); // exponent for operand value 0
    b.push_imm(2);
    b.op(Opcode::BuildChunk);
    b.push_imm(ADDR_MOD_SLOT as i64);
    b.op(Opcode::PokeChunk);
    b.push_imm(0);
    // falls through to AFTER_SLOT1

    b.label("AFTER_SLOT1");
    b.build_push_chunk_from_top(table);
    b.push_label("CELL_INSTR");
    b.op(Opcode::PokeChunk); // persist which instruction type was chosen

    b.op(Opcode::Dup);
    b.build_push_chunk_from_top(table);
    b.push_imm(ADDR_ATTEMPT as i64);
    b.op(Opcode::PokeChunk); // addr0 := PUSH(new_attempt)
    b.op(Opcode::Drop);
    b.push_imm(0);
    b.op(Opcode::Jump); // back to the top of the loop

    // Scratch data cells, never reached by control flow: each holds
    // `PUSH(value)` and is read via `PEEK_CHUNK`+`FACTORIZE`.
    b.label("CELL_FAIL");
    b.push_imm(0);
    b.label("CELL_SLOT");
    b.push_imm(0); // slot choice is a constant 0 (spec §9, Open Question iii)
    b.label("CELL_INSTR");
    b.push_imm(0);

    b.assemble(primes, table, cfg)
}
