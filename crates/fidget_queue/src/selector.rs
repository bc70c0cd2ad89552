//! Winner selection over the eligible set of one target.

use fidget_core::SelectionPolicy;
use rand::distributions::{Distribution, WeightedIndex};
use rand::Rng;

#[derive(Debug, Clone, Copy, Default)]
pub struct Selector {
    policy: SelectionPolicy,
}

impl Selector {
    pub fn new(policy: SelectionPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> SelectionPolicy {
        self.policy
    }

    /// Pick the index of at most one winner.
    ///
    /// `weights` are in queue order. Returns `None` for an empty slice.
    pub fn select<R: Rng + ?Sized>(&self, weights: &[u32], rng: &mut R) -> Option<usize> {
        if weights.is_empty() {
            return None;
        }
        match self.policy {
            SelectionPolicy::Weighted => {
                // u64 so the running total cannot overflow
                let sampler =
                    WeightedIndex::new(weights.iter().map(|&w| u64::from(w))).ok()?;
                Some(sampler.sample(rng))
            }
            SelectionPolicy::Ordered => {
                let mut best = 0;
                for (i, &w) in weights.iter().enumerate().skip(1) {
                    if w > weights[best] {
                        best = i;
                    }
                }
                Some(best)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_empty_has_no_winner() {
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(Selector::default().select(&[], &mut rng), None);
        assert_eq!(Selector::new(SelectionPolicy::Ordered).select(&[], &mut rng), None);
    }

    #[test]
    fn test_single_candidate_always_wins() {
        let mut rng = StdRng::seed_from_u64(1);
        for _ in 0..100 {
            assert_eq!(Selector::default().select(&[3], &mut rng), Some(0));
        }
    }

    #[test]
    fn test_weighted_is_reproducible_with_seed() {
        let selector = Selector::default();
        let weights = [50, 30, 20];
        let draw = |seed| {
            let mut rng = StdRng::seed_from_u64(seed);
            (0..50)
                .map(|_| selector.select(&weights, &mut rng).unwrap())
                .collect::<Vec<_>>()
        };
        assert_eq!(draw(42), draw(42));
    }

    #[test]
    fn test_weighted_frequencies() {
        let selector = Selector::default();
        let weights = [1, 3];
        let mut rng = StdRng::seed_from_u64(7);
        let mut counts = [0usize; 2];
        for _ in 0..20_000 {
            counts[selector.select(&weights, &mut rng).unwrap()] += 1;
        }
        let ratio = counts[1] as f64 / 20_000.0;
        assert!((ratio - 0.75).abs() < 0.02, "Expected ~0.75, got {}", ratio);
    }

    #[test]
    fn test_large_weights_do_not_overflow() {
        let mut rng = StdRng::seed_from_u64(3);
        let weights = [u32::MAX, u32::MAX, u32::MAX];
        assert!(Selector::default().select(&weights, &mut rng).is_some());
    }

    #[test]
    fn test_ordered_prefers_heaviest_then_earliest() {
        let selector = Selector::new(SelectionPolicy::Ordered);
        let mut rng = StdRng::seed_from_u64(0);
        assert_eq!(selector.select(&[50, 100, 1], &mut rng), Some(1));
        assert_eq!(selector.select(&[50, 100, 100], &mut rng), Some(1));
        assert_eq!(selector.select(&[1, 1], &mut rng), Some(0));
    }
}
