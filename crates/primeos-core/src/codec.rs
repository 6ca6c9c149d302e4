//! codec.rs — the UOR codec (component B): the bijection between chunk
//! integers and decoded `(Opcode, operands)` instructions, spec §4.2.

use std::collections::HashMap;
use std::fmt;

use num_bigint::BigUint;
use num_traits::{One, Zero};

use crate::config::VmConfig;
use crate::error::{DecodeError, EncodingError};
use crate::opcodes::{Opcode, OpcodeTable};
use crate::primes::PrimeTable;

/// A chunk: a non-negative integer whose prime factorization encodes one
/// instruction plus a checksum factor (spec §3 "Chunk"). Chunks routinely
/// exceed `u128` once an operand's exponent runs into the hundreds (e.g. an
/// address operand near the top of program memory), so they are backed by
/// `BigUint` rather than a fixed-width integer (spec §1 Non-goals: the one
/// arithmetic-precision exception is the encoding itself).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Chunk(BigUint);

impl Chunk {
    pub fn from_biguint(value: BigUint) -> Self {
        Self(value)
    }

    pub fn value(&self) -> &BigUint {
        &self.0
    }

    pub fn into_value(self) -> BigUint {
        self.0
    }
}

impl fmt::Display for Chunk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl serde::Serialize for Chunk {
    fn serialize<S: serde::Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&self.0.to_str_radix(10))
    }
}

/// Encode `(opcode, operands)` into a chunk (spec §4.2 "Encode", steps 1-4).
pub fn build(
    primes: &PrimeTable,
    table: &OpcodeTable,
    cfg: &VmConfig,
    opcode: Opcode,
    operands: &[i64],
) -> Result<Chunk, EncodingError> {
    let arity = opcode.operand_arity();
    if operands.len() != arity {
        return Err(EncodingError::ArityMismatch { opcode, expected: arity, found: operands.len() });
    }
    for (index, &value) in operands.iter().enumerate() {
        if value < 0 {
            return Err(EncodingError::NegativeOperand { opcode, index, value });
        }
    }

    let mut payload = table.opcode_prime(primes, opcode);
    let mut exp_sum: u64 = 1;
    for (q, &value) in table.operand_primes(primes, opcode).iter().zip(operands) {
        let exp = (value as u64) + 1;
        payload *= q.pow(exp as u32);
        exp_sum += exp;
    }

    let cksum_exp = (exp_sum % cfg.checksum_mod as u64) as u32;
    let chunk = payload * table.checksum_prime(primes).pow(cksum_exp);
    Ok(Chunk(chunk))
}

/// Build a chunk directly from a `(prime_idx, exp)` factor list, bypassing
/// opcode/operand semantics entirely. This is the primitive `BUILD_CHUNK`
/// uses (spec §4.3 "BUILD_CHUNK wire format"): `payload = prod(nth_prime(i)^e)`,
/// `cksum_exp = (sum e) mod CHECKSUM_MOD`, result `payload * CHECKSUM_PRIME^cksum_exp`.
/// The result decodes successfully only if `factors` happens to describe a
/// legal opcode/operand shape; it need not (spec: "not required to be
/// decodable at build time — becomes required only when POKE_CHUNK'd").
pub fn build_from_factors(
    primes: &PrimeTable,
    table: &OpcodeTable,
    cfg: &VmConfig,
    factors: &[(usize, u32)],
) -> Chunk {
    let mut payload = BigUint::one();
    let mut exp_sum: u64 = 0;
    for &(prime_idx, exp) in factors {
        payload *= primes.nth_prime(prime_idx).pow(exp);
        exp_sum += exp as u64;
    }
    let cksum_exp = (exp_sum % cfg.checksum_mod as u64) as u32;
    payload *= table.checksum_prime(primes).pow(cksum_exp);
    Chunk(payload)
}

/// Decode a chunk's payload factorization back into `(opcode, operands)`
/// (spec §4.2 "Decode", steps 1-6).
pub fn decode(
    primes: &PrimeTable,
    table: &OpcodeTable,
    cfg: &VmConfig,
    chunk: &Chunk,
) -> Result<(Opcode, Vec<i64>), DecodeError> {
    let mut remaining = chunk.0.clone();
    let mut factor_exps: HashMap<usize, u32> = HashMap::new();
    let mut foreign_unregistered: Option<u32> = None;

    let mut idx = 0usize;
    while remaining != BigUint::one() {
        let p = primes.nth_prime(idx);
        let mut exp = 0u32;
        while (&remaining % &p).is_zero() {
            remaining /= &p;
            exp += 1;
        }
        if exp > 0 {
            factor_exps.insert(idx, exp);
        }
        if &p * &p > remaining && remaining > BigUint::one() {
            // `remaining` is now provably prime (trial division has cleared
            // every prime up to its own square root). That prime may still
            // be a registered one sitting at an index past wherever `idx`
            // has walked to so far — most commonly the checksum prime,
            // registered last in `OpcodeTable::build` — so check the table's
            // reverse index before concluding it's foreign.
            match primes.index_of_prime(&remaining) {
                Some(found_idx) => {
                    *factor_exps.entry(found_idx).or_insert(0) += 1;
                }
                None => foreign_unregistered = Some(1),
            }
            remaining = BigUint::one();
            break;
        }
        idx += 1;
    }

    // Step 2: extract the checksum exponent.
    let actual_cksum_exp = factor_exps.remove(&table.checksum_prime_index()).unwrap_or(0);

    // Step 3: identify the opcode.
    let mut opcode_matches: Vec<Opcode> = factor_exps
        .iter()
        .filter(|&(_, &exp)| exp == 1)
        .filter_map(|(&idx, _)| table.opcode_for_prime_index(idx))
        .collect();
    opcode_matches.sort_by_key(|o| o.index());
    let opcode = match opcode_matches.len() {
        0 => return Err(DecodeError::NoOpcode),
        1 => opcode_matches[0],
        n => return Err(DecodeError::Ambiguous(n)),
    };
    factor_exps.remove(&table.opcode_prime_index(opcode));

    // Step 4: read operand exponents in the fixed `OPERAND_PRIMES` order.
    let mut operands = Vec::with_capacity(table.operand_prime_indices(opcode).len());
    for &prime_idx in table.operand_prime_indices(opcode) {
        let exp = factor_exps.remove(&prime_idx).ok_or(DecodeError::BadOperand { opcode })?;
        if exp == 0 {
            return Err(DecodeError::BadOperand { opcode });
        }
        operands.push((exp - 1) as i64);
    }

    // Step 5: anything left over (including an unregistered prime factor)
    // is foreign to this opcode.
    if let Some(exponent) = foreign_unregistered {
        return Err(DecodeError::Foreign { opcode, exponent });
    }
    if let Some((_, &exponent)) = factor_exps.iter().next() {
        return Err(DecodeError::Foreign { opcode, exponent });
    }

    // Step 6: recompute and verify the checksum.
    let expected_cksum_exp = {
        let mut sum: u64 = 1;
        for &v in &operands {
            sum += (v as u64) + 1;
        }
        (sum % cfg.checksum_mod as u64) as u32
    };
    if expected_cksum_exp != actual_cksum_exp {
        return Err(DecodeError::Checksum { expected: expected_cksum_exp, found: actual_cksum_exp });
    }

    Ok((opcode, operands))
}

/// Decoded-instruction cache keyed by chunk *value*, not program address —
/// per spec §9's design note, this makes the cache automatically valid
/// across `POKE_CHUNK` (a new value is simply a new key; no invalidation
/// logic is needed).
#[derive(Default)]
pub struct DecodeCache {
    map: HashMap<Chunk, (Opcode, Vec<i64>)>,
}

impl DecodeCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_decode(
        &mut self,
        primes: &PrimeTable,
        table: &OpcodeTable,
        cfg: &VmConfig,
        chunk: &Chunk,
    ) -> Result<(Opcode, Vec<i64>), DecodeError> {
        if let Some(v) = self.map.get(chunk) {
            return Ok(v.clone());
        }
        let decoded = decode(primes, table, cfg, chunk)?;
        self.map.insert(chunk.clone(), decoded.clone());
        Ok(decoded)
    }
}
