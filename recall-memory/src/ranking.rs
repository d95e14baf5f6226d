//! Relevance policy for semantic retrieval.
//!
//! Candidates arrive from the index sorted by cosine distance. A candidate is
//! admitted when its distance is within the effective threshold and its
//! content has not been admitted already in the same call.
//!
//! The effective threshold starts at `base_threshold`. If fewer than `k / 2`
//! candidates pass it within the first half of the candidate pool, the
//! threshold is widened once: up to the distance of the `ceil(k / 2)`-th
//! distinct content, but never past `base_threshold * relax_factor` or
//! `max_threshold`. The widening is computed before the walk, so raising
//! `base_threshold` never admits fewer candidates.

use recall_common::config::RetrievalConfig;
use std::collections::HashSet;

/// Outcome of ranking one candidate list.
#[derive(Debug, Clone, PartialEq)]
pub struct Ranking {
    /// Admitted ids, best first
    pub ids: Vec<u64>,
    /// Threshold actually applied
    pub threshold: f32,
    /// Whether the threshold was widened
    pub relaxed: bool,
    /// Distance of the closest known candidate
    pub best_distance: Option<f32>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RelevancePolicy {
    pub base_threshold: f32,
    pub relax_factor: f32,
    pub max_threshold: f32,
    pub oversample_factor: usize,
}

impl RelevancePolicy {
    pub fn from_config(config: &RetrievalConfig) -> Self {
        Self {
            base_threshold: config.base_threshold,
            relax_factor: config.relax_factor,
            max_threshold: config.max_threshold,
            oversample_factor: config.oversample_factor.max(1),
        }
    }

    /// Number of neighbours to request from the index for `k` results.
    pub fn pool_size(&self, k: usize) -> usize {
        k.saturating_mul(self.oversample_factor)
    }

    /// Rank `candidates` (ascending distance) into at most `k` ids.
    ///
    /// `content_of` resolves an id to its content; ids it cannot resolve are
    /// skipped.
    pub fn rank<'a, F>(&self, candidates: &[(u64, f32)], k: usize, content_of: F) -> Ranking
    where
        F: Fn(u64) -> Option<&'a str>,
    {
        let known: Vec<(usize, u64, f32, &'a str)> = candidates
            .iter()
            .enumerate()
            .filter_map(|(pos, &(id, dist))| content_of(id).map(|c| (pos, id, dist, c)))
            .collect();

        let best_distance = known.first().map(|c| c.2);
        let base = self.base_threshold;

        if k == 0 || known.is_empty() {
            return Ranking {
                ids: Vec::new(),
                threshold: base,
                relaxed: false,
                best_distance,
            };
        }

        let wanted = k.div_ceil(2);
        let half = self.pool_size(k).div_ceil(2);

        let mut seen = HashSet::new();
        let early = known
            .iter()
            .take_while(|c| c.0 < half)
            .filter(|c| c.2 <= base && seen.insert(c.3))
            .take(k)
            .count();

        let mut threshold = base;
        if early < wanted {
            let mut distinct = HashSet::new();
            let anchor = known
                .iter()
                .filter(|c| distinct.insert(c.3))
                .nth(wanted - 1)
                .map_or(self.max_threshold, |c| c.2);
            let ceiling = (base * self.relax_factor).min(self.max_threshold);
            threshold = base.max(anchor.min(ceiling));
        }

        let mut seen = HashSet::new();
        let ids: Vec<u64> = known
            .iter()
            .filter(|c| c.2 <= threshold && seen.insert(c.3))
            .take(k)
            .map(|c| c.1)
            .collect();

        Ranking {
            ids,
            threshold,
            relaxed: threshold > base,
            best_distance,
        }
    }
}
