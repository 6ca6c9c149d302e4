//! primes.rs — incrementally-grown prime table (component A).
//!
//! `nth_prime`/`index_of_prime` are the only contract the rest of the crate
//! needs; growth is amortized across the process lifetime and guarded by a
//! `parking_lot::RwLock` so a server hosting several controllers can share
//! one table (see spec §5, "Prime growth under concurrent access").

use std::collections::HashMap;

use num_bigint::BigUint;
use num_integer::Integer;
use num_traits::{One, Zero};
use parking_lot::RwLock;

struct Table {
    primes: Vec<BigUint>,
    index_of: HashMap<BigUint, usize>,
}

impl Table {
    fn new() -> Self {
        let two = BigUint::from(2u32);
        let mut index_of = HashMap::new();
        index_of.insert(two.clone(), 0);
        Self { primes: vec![two], index_of }
    }

    fn grow_to(&mut self, n: usize) {
        while self.primes.len() <= n {
            let next = next_prime_after(self.primes.last().expect("primes never empty"));
            let idx = self.primes.len();
            self.index_of.insert(next.clone(), idx);
            self.primes.push(next);
        }
    }
}

/// Process-wide (or per-controller) cache of primes, indexed from 0.
pub struct PrimeTable {
    inner: RwLock<Table>,
}

impl PrimeTable {
    pub fn new() -> Self {
        Self { inner: RwLock::new(Table::new()) }
    }

    /// Returns the `n`-th prime (0-indexed: `nth_prime(0) == 2`), growing the
    /// table on demand.
    pub fn nth_prime(&self, n: usize) -> BigUint {
        {
            let r = self.inner.read();
            if let Some(p) = r.primes.get(n) {
                return p.clone();
            }
        }
        let mut w = self.inner.write();
        w.grow_to(n);
        w.primes[n].clone()
    }

    /// Inverse of `nth_prime`: the index of `p`, if it is already known to
    /// this table. Does not grow the table — callers that need the index of
    /// an arbitrary value should have obtained `p` via `nth_prime` first.
    pub fn index_of_prime(&self, p: &BigUint) -> Option<usize> {
        self.inner.read().index_of.get(p).copied()
    }
}

impl Default for PrimeTable {
    fn default() -> Self {
        Self::new()
    }
}

fn next_prime_after(p: &BigUint) -> BigUint {
    let mut candidate = p + BigUint::one();
    if candidate.is_even() && candidate != BigUint::from(2u32) {
        candidate += BigUint::one();
    }
    loop {
        if is_prime(&candidate) {
            return candidate;
        }
        candidate += BigUint::from(2u32);
    }
}

fn is_prime(n: &BigUint) -> bool {
    let two = BigUint::from(2u32);
    if *n < two {
        return false;
    }
    if *n == two {
        return true;
    }
    if n.is_even() {
        return false;
    }
    let mut i = BigUint::from(3u32);
    while &i * &i <= *n {
        if (n % &i).is_zero() {
            return false;
        }
        i += &two;
    }
    true
}
