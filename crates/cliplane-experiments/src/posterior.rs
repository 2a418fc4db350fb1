//! Beta-Bernoulli posterior math.
//!
//! Each variant's conversion rate for the experiment's target metric is
//! modeled as a Beta distribution over observed successes and failures.

use std::collections::BTreeMap;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use cliplane_models::{TargetMetric, VariantId, VariantStat};

/// Default floor on any variant's traffic share, preserving exploration.
pub const DEFAULT_MIN_SHARE: f64 = 0.10;

/// Keeps a variant with zero observed conversions from being locked out.
const MEAN_FLOOR: f64 = 1e-6;

/// Posterior belief over one variant's conversion rate.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct VariantPosterior {
    pub variant_id: VariantId,
    pub impressions: u64,
    pub successes: u64,
    pub alpha: f64,
    pub beta: f64,
}

impl VariantPosterior {
    /// Recompute the posterior from raw counters and the experiment priors.
    pub fn from_stat(
        stat: &VariantStat,
        metric: TargetMetric,
        prior_alpha: f64,
        prior_beta: f64,
    ) -> Self {
        let successes = stat.successes(metric);
        let failures = stat.impressions.saturating_sub(successes);
        Self {
            variant_id: stat.variant_id.clone(),
            impressions: stat.impressions,
            successes,
            alpha: prior_alpha + successes as f64,
            beta: prior_beta + failures as f64,
        }
    }

    /// Posterior mean conversion rate.
    pub fn mean(&self) -> f64 {
        self.alpha / (self.alpha + self.beta)
    }
}

/// Recommend traffic shares proportional to posterior means, floored at
/// `min_share` so losing variants keep exploring.
///
/// Below-floor variants are pinned at exactly `min_share` and the remaining
/// mass is split proportionally among the rest, so compression lands on the
/// strong variants, never below the floor of the weak ones. The output sums
/// to 1; when `n × min_share > 1` the floor is infeasible and the split
/// collapses to even shares.
pub fn recommend_allocations(
    posteriors: &[VariantPosterior],
    min_share: f64,
) -> BTreeMap<VariantId, f64> {
    let n = posteriors.len();
    if n == 0 {
        return BTreeMap::new();
    }

    if (n as f64) * min_share > 1.0 {
        let share = 1.0 / n as f64;
        return posteriors
            .iter()
            .map(|p| (p.variant_id.clone(), share))
            .collect();
    }

    let weights: Vec<f64> = posteriors.iter().map(|p| p.mean().max(MEAN_FLOOR)).collect();
    let mut shares = vec![0.0; n];
    let mut pinned = vec![false; n];
    loop {
        let pinned_count = pinned.iter().filter(|p| **p).count();
        let remaining = 1.0 - min_share * pinned_count as f64;
        let free_weight: f64 = weights
            .iter()
            .zip(&pinned)
            .filter(|(_, pin)| !**pin)
            .map(|(w, _)| *w)
            .sum();

        for i in 0..n {
            shares[i] = if pinned[i] {
                min_share
            } else {
                weights[i] / free_weight * remaining
            };
        }

        // Pin one violator per round; with a feasible floor the remaining
        // mass always covers the unpinned variants, so this terminates.
        match (0..n).find(|&i| !pinned[i] && shares[i] < min_share) {
            Some(i) => pinned[i] = true,
            None => break,
        }
    }

    posteriors
        .iter()
        .zip(shares)
        .map(|(p, share)| (p.variant_id.clone(), share))
        .collect()
}

/// A winning variant and the belief that crowned it.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Promotion {
    pub variant_id: VariantId,
    pub posterior_mean: f64,
}

/// Decide whether a variant has won.
///
/// Promotion requires the accumulated evidence (total impressions) and the
/// runtime gate; the winner is the highest posterior mean, first in
/// snapshot order on ties.
pub fn should_promote(
    posteriors: &[VariantPosterior],
    min_impressions: u64,
    runtime_ok: bool,
) -> Option<Promotion> {
    let total_impressions: u64 = posteriors.iter().map(|p| p.impressions).sum();
    if total_impressions < min_impressions || !runtime_ok {
        return None;
    }

    let mut winner = posteriors.first()?;
    for candidate in &posteriors[1..] {
        if candidate.mean() > winner.mean() {
            winner = candidate;
        }
    }
    Some(Promotion {
        variant_id: winner.variant_id.clone(),
        posterior_mean: winner.mean(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn posterior(id: &str, impressions: u64, successes: u64) -> VariantPosterior {
        VariantPosterior {
            variant_id: VariantId::from_string(id),
            impressions,
            successes,
            alpha: 1.0 + successes as f64,
            beta: 1.0 + (impressions - successes) as f64,
        }
    }

    #[test]
    fn uniform_prior_mean_is_half() {
        let p = posterior("v1", 0, 0);
        assert!((p.mean() - 0.5).abs() < 1e-12);
    }

    #[test]
    fn from_stat_matches_the_invariant() {
        let mut stat = VariantStat::zeroed(VariantId::from_string("v1"), 1.0, 1.0);
        stat.apply_delta(
            &cliplane_models::MetricsDelta {
                impressions: 100,
                clicks: 10,
                ..Default::default()
            },
            TargetMetric::Ctr,
            1.0,
            1.0,
        );
        let p = VariantPosterior::from_stat(&stat, TargetMetric::Ctr, 1.0, 1.0);
        assert!((p.alpha - 11.0).abs() < f64::EPSILON);
        assert!((p.beta - 91.0).abs() < f64::EPSILON);
        assert!((p.alpha - stat.alpha).abs() < f64::EPSILON);
        assert!((p.beta - stat.beta).abs() < f64::EPSILON);
    }

    #[test]
    fn allocations_sum_to_one() {
        let posteriors = vec![
            posterior("a", 100, 10),
            posterior("b", 100, 20),
            posterior("c", 100, 2),
        ];
        let alloc = recommend_allocations(&posteriors, DEFAULT_MIN_SHARE);
        let sum: f64 = alloc.values().sum();
        assert!((sum - 1.0).abs() < 1e-9);
    }

    #[test]
    fn every_share_meets_the_floor_when_feasible() {
        let posteriors = vec![posterior("a", 1000, 500), posterior("b", 1000, 1)];
        let alloc = recommend_allocations(&posteriors, DEFAULT_MIN_SHARE);
        for share in alloc.values() {
            assert!(*share >= DEFAULT_MIN_SHARE - 1e-9);
        }
        let strong = alloc[&VariantId::from_string("a")];
        let weak = alloc[&VariantId::from_string("b")];
        assert!(strong > weak);
    }

    #[test]
    fn weak_variant_is_pinned_at_exactly_the_floor() {
        // The strong variant dominates; the weak one must sit at the floor
        // itself, not below it after renormalization.
        let posteriors = vec![posterior("strong", 10_000, 9_000), posterior("weak", 10_000, 1)];
        let alloc = recommend_allocations(&posteriors, DEFAULT_MIN_SHARE);
        let weak = alloc[&VariantId::from_string("weak")];
        let strong = alloc[&VariantId::from_string("strong")];
        assert!((weak - DEFAULT_MIN_SHARE).abs() < 1e-9);
        assert!((strong - (1.0 - DEFAULT_MIN_SHARE)).abs() < 1e-9);
    }

    #[test]
    fn infeasible_floor_collapses_to_even_shares() {
        // 5 variants x 0.25 floor cannot all hold; the split degrades to
        // 0.2 each and the sum stays exact.
        let posteriors: Vec<VariantPosterior> = (0..5)
            .map(|i| posterior(&format!("v{i}"), 100, 10))
            .collect();
        let alloc = recommend_allocations(&posteriors, 0.25);
        let sum: f64 = alloc.values().sum();
        assert!((sum - 1.0).abs() < 1e-9);
        for share in alloc.values() {
            assert!((share - 0.2).abs() < 1e-9);
        }
    }

    #[test]
    fn zero_conversion_variant_is_not_locked_out() {
        let posteriors = vec![
            VariantPosterior {
                variant_id: VariantId::from_string("dead"),
                impressions: 1000,
                successes: 0,
                alpha: 0.0,
                beta: 1000.0,
            },
            posterior("alive", 1000, 300),
        ];
        let alloc = recommend_allocations(&posteriors, DEFAULT_MIN_SHARE);
        assert!(alloc[&VariantId::from_string("dead")] >= DEFAULT_MIN_SHARE - 1e-9);
    }

    #[test]
    fn promotion_needs_enough_impressions() {
        let posteriors = vec![posterior("a", 100, 10), posterior("b", 100, 20)];
        assert!(should_promote(&posteriors, 500, true).is_none());
        let won = should_promote(&posteriors, 150, true).expect("promote");
        assert_eq!(won.variant_id.as_str(), "b");
    }

    #[test]
    fn promotion_needs_the_runtime_gate() {
        let posteriors = vec![posterior("a", 1000, 100), posterior("b", 1000, 200)];
        assert!(should_promote(&posteriors, 150, false).is_none());
        assert!(should_promote(&posteriors, 150, true).is_some());
    }

    #[test]
    fn ties_go_to_the_first_variant_in_snapshot_order() {
        let posteriors = vec![posterior("first", 100, 10), posterior("second", 100, 10)];
        let won = should_promote(&posteriors, 0, true).expect("promote");
        assert_eq!(won.variant_id.as_str(), "first");
    }

    #[test]
    fn empty_posteriors_never_promote() {
        assert!(should_promote(&[], 0, true).is_none());
        assert!(recommend_allocations(&[], DEFAULT_MIN_SHARE).is_empty());
    }
}
