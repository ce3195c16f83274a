//! Adaptive build-configuration selection.
//!
//! Each build arm is one combination of optimization knobs. Arm
//! statistics accumulate across invocations through a fixed update rule;
//! selection is epsilon-greedy over an upper-confidence score with a
//! small deterministic per-arm prior so ties break reproducibly.
//!
//! The update rule is a pure function of `(statistic, reward)` and is
//! testable without running any build.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::{CompileOptions, OptLevel};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Probability of picking a uniformly random arm.
pub const EXPLORATION_EPSILON: f64 = 0.12;
/// Upper-confidence exploration constant.
pub const EXPLORATION_CONSTANT: f64 = 1.2;
/// EMA smoothing factor: `ema = (1 - ALPHA) * ema_prev + ALPHA * reward`.
pub const EMA_ALPHA: f64 = 0.2;
/// Weight of the bounded time penalty applied to successful builds.
pub const TIME_PENALTY_WEIGHT: f64 = 0.2;
/// Duration scale of the time penalty, in milliseconds.
pub const TIME_PENALTY_SCALE_MS: f64 = 8000.0;

/// Exploration bonus granted to arms with no trials yet; large enough to
/// dominate any attainable confidence term while keeping priors decisive
/// between untried arms.
const UNTRIED_BONUS: f64 = 1.0e6;
/// Per-arm prior span; priors live in `[0, PRIOR_SPAN)`.
const PRIOR_SPAN: f64 = 1.0e-3;

// ---------------------------------------------------------------------------
// BuildArm
// ---------------------------------------------------------------------------

/// One discrete build-configuration choice.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct BuildArm {
    pub opt: OptLevel,
    pub lto: bool,
    pub fast_math: bool,
}

impl BuildArm {
    pub fn new(opt: OptLevel, lto: bool, fast_math: bool) -> Self {
        Self {
            opt,
            lto,
            fast_math,
        }
    }

    /// The fixed arm when adaptive selection is off: the configured
    /// level and LTO knob, fast-math never implied.
    pub fn from_options(options: &CompileOptions) -> Self {
        Self::new(options.opt, options.lto, false)
    }

    /// Deterministic store key, e.g. `O2+lto-ffm`.
    pub fn key(&self) -> String {
        format!(
            "{}{}{}",
            self.opt.as_str(),
            if self.lto { "+lto" } else { "-lto" },
            if self.fast_math { "+ffm" } else { "-ffm" },
        )
    }

    /// The full arm space explored by the selector.
    pub fn catalog() -> Vec<BuildArm> {
        let mut arms = Vec::with_capacity(16);
        for opt in [OptLevel::O1, OptLevel::O2, OptLevel::O3, OptLevel::Max] {
            for lto in [false, true] {
                for fast_math in [false, true] {
                    arms.push(BuildArm::new(opt, lto, fast_math));
                }
            }
        }
        arms
    }
}

impl fmt::Display for BuildArm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key())
    }
}

// ---------------------------------------------------------------------------
// ArmStatistic & the update rule
// ---------------------------------------------------------------------------

/// Accumulated outcome statistics for one arm.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ArmStatistic {
    pub trials: u64,
    pub cumulative_reward: f64,
    pub ema: f64,
    pub last_reward: f64,
}

/// Reward for one completed build: `+1` on success minus a bounded time
/// penalty so slower successful builds are mildly disfavored, `-1` on
/// failure.
pub fn reward_for_outcome(success: bool, duration_ms: u64) -> f64 {
    if success {
        1.0 - TIME_PENALTY_WEIGHT * (duration_ms as f64 / TIME_PENALTY_SCALE_MS).tanh()
    } else {
        -1.0
    }
}

/// The fixed update recurrence. Pure; the caller persists the result.
pub fn apply_reward(stat: &ArmStatistic, reward: f64) -> ArmStatistic {
    let ema = if stat.trials == 0 {
        reward
    } else {
        (1.0 - EMA_ALPHA) * stat.ema + EMA_ALPHA * reward
    };
    ArmStatistic {
        trials: stat.trials + 1,
        cumulative_reward: stat.cumulative_reward + reward,
        ema,
        last_reward: reward,
    }
}

// ---------------------------------------------------------------------------
// DeterministicRng
// ---------------------------------------------------------------------------

/// Seeded xorshift64 generator; zero seeds fall back to a fixed non-zero
/// state so the stream never degenerates.
#[derive(Debug, Clone)]
pub struct DeterministicRng {
    state: u64,
}

impl DeterministicRng {
    pub fn seeded(seed: u64) -> Self {
        let state = if seed == 0 {
            0x9E37_79B9_7F4A_7C15
        } else {
            seed
        };
        Self { state }
    }

    pub fn next_u64(&mut self) -> u64 {
        let mut x = self.state;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.state = x;
        x
    }

    /// Uniform in `[0, 1)`.
    pub fn next_f64(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 / (1u64 << 53) as f64
    }
}

// ---------------------------------------------------------------------------
// AdaptiveSelector
// ---------------------------------------------------------------------------

/// Selection knobs; the defaults are the production policy.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SelectorPolicy {
    pub epsilon: f64,
    pub exploration: f64,
}

impl Default for SelectorPolicy {
    fn default() -> Self {
        Self {
            epsilon: EXPLORATION_EPSILON,
            exploration: EXPLORATION_CONSTANT,
        }
    }
}

/// Epsilon-greedy arm chooser over persisted statistics.
#[derive(Debug, Clone)]
pub struct AdaptiveSelector {
    policy: SelectorPolicy,
    rng: DeterministicRng,
}

impl AdaptiveSelector {
    pub fn new(seed: u64) -> Self {
        Self::with_policy(SelectorPolicy::default(), seed)
    }

    pub fn with_policy(policy: SelectorPolicy, seed: u64) -> Self {
        Self {
            policy,
            rng: DeterministicRng::seeded(seed),
        }
    }

    /// Choose an arm. `None` only when `arms` is empty.
    pub fn select(
        &mut self,
        arms: &[BuildArm],
        stats: &BTreeMap<String, ArmStatistic>,
    ) -> Option<BuildArm> {
        if arms.is_empty() {
            return None;
        }
        if self.rng.next_f64() < self.policy.epsilon {
            let index = (self.rng.next_u64() % arms.len() as u64) as usize;
            return Some(arms[index]);
        }

        let total_trials: u64 = arms
            .iter()
            .filter_map(|arm| stats.get(&arm.key()))
            .map(|stat| stat.trials)
            .sum();

        let mut best: Option<(f64, BuildArm)> = None;
        for arm in arms {
            let score = self.score(arm, stats, total_trials);
            let replace = match best {
                None => true,
                Some((best_score, _)) => score > best_score,
            };
            if replace {
                best = Some((score, *arm));
            }
        }
        best.map(|(_, arm)| arm)
    }

    fn score(
        &self,
        arm: &BuildArm,
        stats: &BTreeMap<String, ArmStatistic>,
        total_trials: u64,
    ) -> f64 {
        let key = arm.key();
        let stat = stats.get(&key).copied().unwrap_or_default();
        let bonus = if stat.trials == 0 {
            UNTRIED_BONUS
        } else {
            let numerator = (total_trials.max(1) as f64).ln();
            self.policy.exploration * (numerator / stat.trials as f64).sqrt()
        };
        arm_prior(&key) + stat.ema + bonus
    }
}

/// Deterministic per-arm bias in `[0, PRIOR_SPAN)`.
fn arm_prior(key: &str) -> f64 {
    (fnv1a64(key.as_bytes()) % 1_000_000) as f64 / 1.0e6 * PRIOR_SPAN
}

fn fnv1a64(bytes: &[u8]) -> u64 {
    let mut hash = 0xcbf2_9ce4_8422_2325u64;
    for &b in bytes {
        hash ^= u64::from(b);
        hash = hash.wrapping_mul(0x0100_0000_01b3);
    }
    hash
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() < 1.0e-12,
            "expected {expected}, got {actual}"
        );
    }

    // -----------------------------------------------------------------------
    // Update rule
    // -----------------------------------------------------------------------

    #[test]
    fn reward_sequence_matches_recurrence() {
        let mut stat = ArmStatistic::default();
        let mut emas = Vec::new();
        for reward in [1.0, -1.0, 1.0] {
            stat = apply_reward(&stat, reward);
            emas.push(stat.ema);
        }
        assert_eq!(stat.trials, 3);
        assert_close(emas[0], 1.0);
        assert_close(emas[1], 0.6);
        assert_close(emas[2], 0.68);
        assert_close(stat.cumulative_reward, 1.0);
        assert_close(stat.last_reward, 1.0);
    }

    #[test]
    fn update_is_pure() {
        let stat = apply_reward(&ArmStatistic::default(), 1.0);
        let a = apply_reward(&stat, -1.0);
        let b = apply_reward(&stat, -1.0);
        assert_eq!(a, b);
        assert_eq!(stat.trials, 1);
    }

    #[test]
    fn success_reward_is_penalized_but_bounded() {
        let instant = reward_for_outcome(true, 0);
        assert_close(instant, 1.0);
        let slow = reward_for_outcome(true, 8000);
        assert!(slow < 1.0 && slow > 0.8);
        let glacial = reward_for_outcome(true, u64::MAX / 2);
        // tanh saturates; the penalty never exceeds the weight.
        assert!(glacial >= 1.0 - TIME_PENALTY_WEIGHT - 1.0e-9);
    }

    #[test]
    fn failure_reward_is_flat() {
        assert_close(reward_for_outcome(false, 0), -1.0);
        assert_close(reward_for_outcome(false, 60_000), -1.0);
    }

    // -----------------------------------------------------------------------
    // Arm catalog & keys
    // -----------------------------------------------------------------------

    #[test]
    fn catalog_has_sixteen_unique_keys() {
        let arms = BuildArm::catalog();
        assert_eq!(arms.len(), 16);
        let keys: std::collections::BTreeSet<String> =
            arms.iter().map(BuildArm::key).collect();
        assert_eq!(keys.len(), 16);
    }

    #[test]
    fn key_encodes_every_knob() {
        let arm = BuildArm::new(OptLevel::O3, true, false);
        assert_eq!(arm.key(), "O3+lto-ffm");
        let arm = BuildArm::new(OptLevel::Max, false, true);
        assert_eq!(arm.key(), "max-lto+ffm");
    }

    #[test]
    fn arm_serde_roundtrip() {
        let arm = BuildArm::new(OptLevel::O2, true, true);
        let json = serde_json::to_string(&arm).unwrap();
        let restored: BuildArm = serde_json::from_str(&json).unwrap();
        assert_eq!(arm, restored);
    }

    // -----------------------------------------------------------------------
    // Selection policy
    // -----------------------------------------------------------------------

    fn greedy() -> AdaptiveSelector {
        AdaptiveSelector::with_policy(
            SelectorPolicy {
                epsilon: 0.0,
                exploration: EXPLORATION_CONSTANT,
            },
            7,
        )
    }

    #[test]
    fn untried_arms_are_preferred() {
        let arms = BuildArm::catalog();
        let mut stats = BTreeMap::new();
        // One arm well-tried with a perfect record; the rest untried.
        let tried = arms[0];
        let mut stat = ArmStatistic::default();
        for _ in 0..10 {
            stat = apply_reward(&stat, 1.0);
        }
        stats.insert(tried.key(), stat);

        let chosen = greedy().select(&arms, &stats).expect("non-empty catalog");
        assert_ne!(chosen, tried, "an untried arm must win the bonus");
        assert!(stats.get(&chosen.key()).is_none());
    }

    #[test]
    fn best_ema_wins_when_all_tried() {
        let arms = vec![
            BuildArm::new(OptLevel::O1, false, false),
            BuildArm::new(OptLevel::O2, false, false),
            BuildArm::new(OptLevel::O3, false, false),
        ];
        let mut stats = BTreeMap::new();
        for (arm, ema) in arms.iter().zip([-0.5, 0.9, 0.1]) {
            let mut stat = ArmStatistic::default();
            for _ in 0..50 {
                stat = apply_reward(&stat, ema);
            }
            stats.insert(arm.key(), stat);
        }
        let chosen = greedy().select(&arms, &stats).unwrap();
        assert_eq!(chosen, arms[1]);
    }

    #[test]
    fn selection_is_reproducible_for_a_seed() {
        let arms = BuildArm::catalog();
        let stats = BTreeMap::new();
        let a = AdaptiveSelector::new(42).select(&arms, &stats);
        let b = AdaptiveSelector::new(42).select(&arms, &stats);
        assert_eq!(a, b);
    }

    #[test]
    fn full_exploration_still_lands_in_catalog() {
        let arms = BuildArm::catalog();
        let stats = BTreeMap::new();
        let mut selector = AdaptiveSelector::with_policy(
            SelectorPolicy {
                epsilon: 1.0,
                exploration: EXPLORATION_CONSTANT,
            },
            99,
        );
        for _ in 0..32 {
            let chosen = selector.select(&arms, &stats).unwrap();
            assert!(arms.contains(&chosen));
        }
    }

    #[test]
    fn empty_arm_set_selects_nothing() {
        let mut selector = AdaptiveSelector::new(1);
        assert!(selector.select(&[], &BTreeMap::new()).is_none());
    }

    #[test]
    fn priors_are_deterministic_and_small() {
        let arms = BuildArm::catalog();
        for arm in &arms {
            let p = arm_prior(&arm.key());
            assert!(p >= 0.0 && p < PRIOR_SPAN);
            assert_close(p, arm_prior(&arm.key()));
        }
    }
}
