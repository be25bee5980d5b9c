//! Weighted value sampling.
//!
//! [`WeightedDraw`] is the only randomness the estimator needs. Every
//! [`rand::Rng`] gets it through `WeightedIndex` (cumulative weights +
//! binary search), so seeded generators for tests and OS-seeded ones for
//! production plug in the same way.

use rand::distr::weighted::WeightedIndex;
use rand::distr::Distribution;
use rand::Rng;

use crate::dataset::ValueId;
use crate::distribution::ConditionalDistribution;

/// Masses within this distance of 1.0 are used without renormalizing.
pub const MASS_TOLERANCE: f64 = 1e-9;

/// Pick an index with probability proportional to its weight.
pub trait WeightedDraw {
    /// `None` if no weight is positive or a weight is invalid.
    fn weighted_draw(&mut self, weights: &[f64]) -> Option<usize>;
}

impl<R: Rng + ?Sized> WeightedDraw for R {
    fn weighted_draw(&mut self, weights: &[f64]) -> Option<usize> {
        let dist = WeightedIndex::new(weights).ok()?;
        Some(dist.sample(self))
    }
}

/// Draw one value from `restricted`, whose masses sum to `mass`.
///
/// Returns `None` for a non-positive `mass` or when the drawer cannot pick;
/// the trial driver folds both into a zero outcome.
pub fn sample_value<D: WeightedDraw + ?Sized>(
    restricted: &ConditionalDistribution,
    mass: f64,
    draw: &mut D,
) -> Option<ValueId> {
    if mass <= 0.0 || restricted.is_empty() {
        return None;
    }
    let weights: Vec<f64> = if (mass - 1.0).abs() <= MASS_TOLERANCE {
        restricted.masses().collect()
    } else {
        restricted.masses().map(|p| p / mass).collect()
    };
    let pick = draw.weighted_draw(&weights)?;
    restricted.ids().nth(pick)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::SmallRng;
    use rand::SeedableRng;

    /// Always picks the last index and remembers the weights it saw.
    struct LastPick {
        seen: Vec<Vec<f64>>,
    }

    impl WeightedDraw for LastPick {
        fn weighted_draw(&mut self, weights: &[f64]) -> Option<usize> {
            self.seen.push(weights.to_vec());
            weights.len().checked_sub(1)
        }
    }

    #[test]
    fn test_renormalizes_partial_mass() {
        let restricted = ConditionalDistribution::from_entries([(2, 0.1), (5, 0.3)]);
        let mut draw = LastPick { seen: Vec::new() };
        let v = sample_value(&restricted, 0.4, &mut draw);
        assert_eq!(v, Some(5));
        let w = &draw.seen[0];
        assert!((w[0] - 0.25).abs() < 1e-12);
        assert!((w[1] - 0.75).abs() < 1e-12);
    }

    #[test]
    fn test_full_mass_used_as_is() {
        let restricted = ConditionalDistribution::from_entries([(0, 0.5), (1, 0.5)]);
        let mut draw = LastPick { seen: Vec::new() };
        sample_value(&restricted, 1.0 - 1e-12, &mut draw);
        assert_eq!(draw.seen[0], vec![0.5, 0.5]);
    }

    #[test]
    fn test_zero_mass_never_draws() {
        let restricted = ConditionalDistribution::from_entries([(0, 0.5)]);
        let mut draw = LastPick { seen: Vec::new() };
        assert_eq!(sample_value(&restricted, 0.0, &mut draw), None);
        assert!(draw.seen.is_empty());
        assert_eq!(
            sample_value(&ConditionalDistribution::default(), 0.5, &mut draw),
            None
        );
    }

    #[test]
    fn test_rng_draw_stays_in_support() {
        let restricted = ConditionalDistribution::from_entries([(3, 0.2), (8, 0.1), (9, 0.1)]);
        let mut rng = SmallRng::seed_from_u64(7);
        for _ in 0..1000 {
            let v = sample_value(&restricted, 0.4, &mut rng).unwrap();
            assert!(matches!(v, 3 | 8 | 9), "drew {v}");
        }
    }

    #[test]
    fn test_rng_draw_frequencies() {
        let restricted = ConditionalDistribution::from_entries([(0, 0.3), (1, 0.1)]);
        let mut rng = SmallRng::seed_from_u64(42);
        let n = 40_000;
        let zeros = (0..n)
            .filter(|_| sample_value(&restricted, 0.4, &mut rng) == Some(0))
            .count();
        let freq = zeros as f64 / n as f64;
        assert!((freq - 0.75).abs() < 0.02, "freq={freq}");
    }

    #[test]
    fn test_rng_rejects_all_zero_weights() {
        let mut rng = SmallRng::seed_from_u64(1);
        assert_eq!(rng.weighted_draw(&[0.0, 0.0]), None);
        assert_eq!(rng.weighted_draw(&[]), None);
    }
}
