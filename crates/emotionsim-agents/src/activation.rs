//! Per-tick response probability for human agents.
//!
//! Before the engine invokes the oracle for a human agent, it draws against
//! a probability derived from personality and recent behavior:
//!
//! ```text
//! p = 0.2 + 0.6 * extraversion
//!         - 0.25 * neuroticism * (stress / 10)
//!         + 0.15 * (1 - recent_activity)
//! ```
//!
//! clamped to `[0.05, 0.95]`. Extraversion raises `p` monotonically;
//! neuroticism lowers `p` only as stress rises; agents that have been quiet
//! recently get a boost so nobody starves. Environment and designer agents
//! always act; the evaluator acts only at the terminal step, so none of
//! them draw.

use std::collections::VecDeque;

use rand::Rng;
use rand::rngs::SmallRng;
use rust_decimal::prelude::ToPrimitive;

use emotionsim_types::BigFive;

/// Base probability independent of personality.
const BASE: f64 = 0.2;

/// Weight of extraversion.
const EXTRAVERSION_WEIGHT: f64 = 0.6;

/// Weight of the neuroticism-under-stress penalty.
const NEUROTICISM_WEIGHT: f64 = 0.25;

/// Weight of the inactivity boost.
const INACTIVITY_WEIGHT: f64 = 0.15;

/// Probability floor.
const FLOOR: f64 = 0.05;

/// Probability ceiling.
const CEILING: f64 = 0.95;

/// Number of ticks in the recent-activity window.
pub const ACTIVITY_WINDOW: usize = 5;

/// Compute the probability that a human agent responds this tick.
///
/// `stress` is the agent's current stress (0..=10); `recent_activity` is
/// the fraction of the last [`ACTIVITY_WINDOW`] ticks in which the agent
/// acted, in 0.0..=1.0.
pub fn response_probability(traits: &BigFive, stress: u8, recent_activity: f64) -> f64 {
    let extraversion = traits.extraversion.to_f64().unwrap_or(0.5);
    let neuroticism = traits.neuroticism.to_f64().unwrap_or(0.5);
    let stress_fraction = f64::from(stress.min(10)) / 10.0;

    let p = BASE + EXTRAVERSION_WEIGHT * extraversion
        - NEUROTICISM_WEIGHT * neuroticism * stress_fraction
        + INACTIVITY_WEIGHT * (1.0 - recent_activity.clamp(0.0, 1.0));

    p.clamp(FLOOR, CEILING)
}

/// Draw against the response probability with the run's seeded RNG.
pub fn should_respond(
    rng: &mut SmallRng,
    traits: &BigFive,
    stress: u8,
    recent_activity: f64,
) -> bool {
    let p = response_probability(traits, stress, recent_activity);
    rng.random_bool(p)
}

/// The acted-fraction of a recent-activity window (1.0 for an empty window
/// so fresh agents are not boosted spuriously).
pub fn activity_fraction(window: &VecDeque<bool>) -> f64 {
    if window.is_empty() {
        return 1.0;
    }
    let acted = window.iter().filter(|&&acted| acted).count();
    let acted_u32 = u32::try_from(acted).unwrap_or(u32::MAX);
    let len_u32 = u32::try_from(window.len()).unwrap_or(u32::MAX);
    f64::from(acted_u32) / f64::from(len_u32.max(1))
}

/// Push an acted/skipped flag into a recent-activity window, evicting past
/// [`ACTIVITY_WINDOW`].
pub fn push_activity(window: &mut VecDeque<bool>, acted: bool) {
    if window.len() >= ACTIVITY_WINDOW {
        window.pop_front();
    }
    window.push_back(acted);
}
