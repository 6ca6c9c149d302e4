//! teacher.rs — the Teacher side of the interaction protocol (component E,
//! spec §4.5).
//!
//! `primeos-core` only fixes the *protocol* the goal-seeker speaks
//! (spec §4.4, §4.6); the policy for picking targets and judging attempts
//! is deliberately pluggable behind the `Teacher` trait. `DefaultTeacher`
//! is a concrete, intentionally simple policy supplementing the scope the
//! distilled spec left open (spec §9, "Teacher heuristic" is out of scope
//! for the protocol itself).

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config::VmConfig;

/// A pluggable policy for the Teacher side of the protocol: what target to
/// send, how to judge an attempt, and what to send next.
pub trait Teacher: Send {
    /// The first target sent once the goal-seeker starts (spec §4.4 "init").
    fn choose_initial_target(&mut self) -> i64;

    /// Judge an attempt against the current target. `true` means success.
    fn evaluate(&mut self, target: i64, attempt: i64) -> bool;

    /// The next target to send, given the outcome of the attempt just
    /// judged (spec §4.4 "SEND_TARGET").
    fn next_target(&mut self, previous_target: i64, was_success: bool) -> i64;

    /// A human-readable label for the Teacher's current difficulty,
    /// surfaced on `VmSnapshot::difficulty_level` (spec §6).
    fn difficulty_label(&self) -> &'static str;
}

/// A simple streak-based difficulty heuristic: `normal` by default,
/// widening to `hard` after a run of successes and narrowing to `easy`
/// after a run of failures. Targets are drawn uniformly from
/// `[0, attempt_modulus)` regardless of difficulty — difficulty only
/// changes how forgivingly `evaluate` or `next_target` behaves, which this
/// default implementation keeps deliberately plain (pure equality,
/// spec §4.5).
pub struct DefaultTeacher {
    rng: StdRng,
    attempt_modulus: i64,
    success_streak: u32,
    failure_streak: u32,
}

impl DefaultTeacher {
    pub fn new(config: &VmConfig) -> Self {
        Self {
            rng: StdRng::seed_from_u64(config.rng_seed ^ 0xBEEF),
            attempt_modulus: config.attempt_modulus,
            success_streak: 0,
            failure_streak: 0,
        }
    }

    fn draw_target(&mut self) -> i64 {
        self.rng.gen_range(0..self.attempt_modulus)
    }
}

impl Teacher for DefaultTeacher {
    fn choose_initial_target(&mut self) -> i64 {
        self.draw_target()
    }

    fn evaluate(&mut self, target: i64, attempt: i64) -> bool {
        let success = target == attempt;
        if success {
            self.success_streak += 1;
            self.failure_streak = 0;
        } else {
            self.failure_streak += 1;
            self.success_streak = 0;
        }
        success
    }

    fn next_target(&mut self, previous_target: i64, was_success: bool) -> i64 {
        let _ = was_success;
        let mut candidate = self.draw_target();
        // Widening/narrowing difficulty never changes the draw range here
        // (targets stay uniform in [0, attempt_modulus)); it only avoids
        // immediately repeating the just-solved target so a streak of
        // successes doesn't look stuck on one value.
        if self.attempt_modulus > 1 {
            while candidate == previous_target {
                candidate = self.draw_target();
            }
        }
        candidate
    }

    fn difficulty_label(&self) -> &'static str {
        if self.success_streak >= 3 {
            "hard"
        } else if self.failure_streak >= 3 {
            "easy"
        } else {
            "normal"
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> VmConfig {
        VmConfig::default()
    }

    #[test]
    fn initial_target_is_in_range() {
        let cfg = cfg();
        let mut teacher = DefaultTeacher::new(&cfg);
        for _ in 0..50 {
            let t = teacher.choose_initial_target();
            assert!((0..cfg.attempt_modulus).contains(&t));
        }
    }

    #[test]
    fn evaluate_is_pure_equality() {
        let cfg = cfg();
        let mut teacher = DefaultTeacher::new(&cfg);
        assert!(teacher.evaluate(4, 4));
        assert!(!teacher.evaluate(4, 5));
    }

    #[test]
    fn difficulty_widens_after_success_streak_and_narrows_after_failures() {
        let cfg = cfg();
        let mut teacher = DefaultTeacher::new(&cfg);
        assert_eq!(teacher.difficulty_label(), "normal");
        for _ in 0..3 {
            teacher.evaluate(1, 1);
        }
        assert_eq!(teacher.difficulty_label(), "hard");
        for _ in 0..3 {
            teacher.evaluate(1, 2);
        }
        assert_eq!(teacher.difficulty_label(), "easy");
    }

    #[test]
    fn next_target_never_repeats_previous_when_modulus_allows() {
        let cfg = cfg();
        let mut teacher = DefaultTeacher::new(&cfg);
        for previous in 0..cfg.attempt_modulus {
            for _ in 0..20 {
                assert_ne!(teacher.next_target(previous, true), previous);
            }
        }
    }
}
