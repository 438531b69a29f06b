//! Ranking — pluggable, trait-based re-ranker consulted when the user rejects
//! the confirmation question for a stage winner.
//!
//! Default: `NoiseRanker` (explicit placeholder, no trained model behind it).
//! A real classifier only needs to implement `Ranker`; the engine's control
//! flow does not change.

use rand::{Rng, RngCore};

use crate::quiz::answer::Answer;

// ────────────────────────────────────────────────────────────────────────────
// Trait definition
// ────────────────────────────────────────────────────────────────────────────

/// Ranks every label of a stage from the flattened answer vector.
///
/// `input` always has length `label_count * max_rounds`. Implementations must
/// return exactly `label_count` scores, higher = more confident. `rng` is the
/// engine's randomness source; deterministic rankers ignore it.
pub trait Ranker: Send + Sync {
    fn rank(&self, input: &[u32], label_count: usize, rng: &mut dyn RngCore) -> Vec<f64>;

    /// Backend name, reported in logs.
    fn name(&self) -> &'static str;
}

// ────────────────────────────────────────────────────────────────────────────
// NoiseRanker — placeholder backend
// ────────────────────────────────────────────────────────────────────────────

/// Placeholder ranker: uniform noise in `[0, 1.1)` per label.
pub struct NoiseRanker;

impl Ranker for NoiseRanker {
    fn rank(&self, _input: &[u32], label_count: usize, rng: &mut dyn RngCore) -> Vec<f64> {
        let jitter: f64 = rng.gen::<f64>() * 0.1;
        (0..label_count).map(|_| rng.gen::<f64>() + jitter).collect()
    }

    fn name(&self) -> &'static str {
        "noise"
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Input vector
// ────────────────────────────────────────────────────────────────────────────

/// Concatenates the encoded ledgers in label order and fits the result to
/// exactly `width` entries (zero padding on the right, truncation if
/// synthetic tie-break answers pushed it past the width).
pub fn build_input<'a, I>(ledgers: I, width: usize) -> Vec<u32>
where
    I: IntoIterator<Item = &'a [Answer]>,
{
    let mut input: Vec<u32> = ledgers
        .into_iter()
        .flat_map(|ledger| ledger.iter().map(|a| a.encode()))
        .collect();
    input.resize(width, 0);
    input
}

/// Index of the best-scoring label other than `excluded`.
///
/// Returns `None` when the scores are degenerate (wrong length, a NaN or
/// infinite score, or every label scoring the same) or no other label
/// exists. Ties between alternatives go to the earlier label.
pub fn best_alternative(scores: &[f64], label_count: usize, excluded: usize) -> Option<usize> {
    if scores.len() != label_count || label_count < 2 {
        return None;
    }
    if !scores.iter().all(|s| s.is_finite()) {
        return None;
    }
    let first = scores[0];
    if scores.iter().all(|s| s.total_cmp(&first).is_eq()) {
        return None;
    }

    let mut ranked: Vec<usize> = (0..label_count).collect();
    // stable sort keeps label order among equal scores
    ranked.sort_by(|&a, &b| scores[b].total_cmp(&scores[a]));
    ranked.into_iter().find(|&i| i != excluded)
}
