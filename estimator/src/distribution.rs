//! Conditional distributions and range mass.
//!
//! | Step | Function | Output |
//! |------|----------|--------|
//! | Resolve | [`resolve`] | P(target = v \| population) for every observed v |
//! | Accumulate | [`accumulate_mass`] | Σ P(v) over the allowed set, plus the restricted entries |
//!
//! Distributions are sparse: only values with non-zero count in the
//! population appear, sorted by [`ValueId`].

use crate::dataset::{Column, ValueId};
use crate::index::{DatasetIndex, Population};
use crate::query::AllowedSet;

/// Probability mass per value of one column, over some sub-population.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConditionalDistribution {
    entries: Vec<(ValueId, f64)>,
}

impl ConditionalDistribution {
    /// Normalize raw counts indexed by value id. All-zero counts give an
    /// empty distribution.
    pub fn from_counts(counts: &[u32]) -> Self {
        let total: u64 = counts.iter().map(|&c| c as u64).sum();
        if total == 0 {
            return Self::default();
        }
        let total = total as f64;
        let entries = counts
            .iter()
            .enumerate()
            .filter(|(_, &c)| c > 0)
            .map(|(id, &c)| (id as ValueId, c as f64 / total))
            .collect();
        Self { entries }
    }

    /// Normalize a sorted list of value ids by run length. Same result as
    /// [`from_counts`](Self::from_counts) over the equivalent dense counts.
    pub fn from_sorted_codes(codes: &[ValueId]) -> Self {
        if codes.is_empty() {
            return Self::default();
        }
        let total = codes.len() as f64;
        let entries = codes
            .chunk_by(|a, b| a == b)
            .map(|run| (run[0], run.len() as f64 / total))
            .collect();
        Self { entries }
    }

    /// Build from `(id, mass)` pairs. Entries are sorted by id and
    /// non-positive masses dropped.
    pub fn from_entries(entries: impl IntoIterator<Item = (ValueId, f64)>) -> Self {
        let mut entries: Vec<(ValueId, f64)> =
            entries.into_iter().filter(|&(_, p)| p > 0.0).collect();
        entries.sort_unstable_by_key(|&(id, _)| id);
        Self { entries }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Mass of `id`, 0.0 when outside the support.
    pub fn get(&self, id: ValueId) -> f64 {
        match self.entries.binary_search_by_key(&id, |&(v, _)| v) {
            Ok(i) => self.entries[i].1,
            Err(_) => 0.0,
        }
    }

    pub fn contains(&self, id: ValueId) -> bool {
        self.get(id) > 0.0
    }

    pub fn iter(&self) -> impl Iterator<Item = (ValueId, f64)> + '_ {
        self.entries.iter().copied()
    }

    pub fn ids(&self) -> impl Iterator<Item = ValueId> + '_ {
        self.entries.iter().map(|&(id, _)| id)
    }

    pub fn masses(&self) -> impl Iterator<Item = f64> + '_ {
        self.entries.iter().map(|&(_, p)| p)
    }

    pub fn total_mass(&self) -> f64 {
        self.masses().sum()
    }

    /// Entries with cell text, for display and diagnostics.
    pub fn named<'c>(&self, column: &'c Column) -> Vec<(&'c str, f64)> {
        self.entries
            .iter()
            .map(|&(id, p)| (column.value(id), p))
            .collect()
    }
}

/// Populations at most `1 / SPARSE_RATIO` of the column's domain are counted
/// by sorting their codes instead of filling a dense counter.
const SPARSE_RATIO: usize = 4;

/// Normalized frequency of `column` over `population`.
///
/// The whole-dataset case reads precomputed marginals. Explicit populations
/// are counted row by row, densely or sparsely depending on how their size
/// compares to the column's cardinality.
pub fn resolve(
    index: &DatasetIndex<'_>,
    column: usize,
    population: &Population<'_>,
) -> ConditionalDistribution {
    match population {
        Population::All => ConditionalDistribution::from_counts(&index.marginal(column)),
        Population::Rows(rows) => {
            let col = index.dataset().column_at(column);
            if rows.len().saturating_mul(SPARSE_RATIO) <= col.cardinality() {
                let mut codes: Vec<ValueId> =
                    rows.iter().map(|&row| col.code(row as usize)).collect();
                codes.sort_unstable();
                return ConditionalDistribution::from_sorted_codes(&codes);
            }
            let mut counts = vec![0u32; col.cardinality()];
            for &row in rows.iter() {
                counts[col.code(row as usize) as usize] += 1;
            }
            ConditionalDistribution::from_counts(&counts)
        }
    }
}

/// Range mass of an allowed set under a distribution.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RangeMass {
    /// Σ P(v) for v in allowed ∩ support.
    pub mass: f64,
    /// The distribution cut down to allowed ∩ support, not renormalized.
    pub restricted: ConditionalDistribution,
}

impl RangeMass {
    /// Zero when no allowed value carries mass. Checked before any division.
    #[inline]
    pub fn is_zero(&self) -> bool {
        self.mass <= 0.0 || self.restricted.is_empty()
    }
}

/// Sum the mass of `allowed` under `distribution`.
///
/// Allowed values outside the support contribute nothing. The allowed set is
/// deduplicated, so no value is counted twice.
pub fn accumulate_mass(distribution: &ConditionalDistribution, allowed: &AllowedSet) -> RangeMass {
    let restricted: Vec<(ValueId, f64)> = distribution
        .iter()
        .filter(|&(id, _)| allowed.contains(id))
        .collect();
    let mass = restricted.iter().map(|&(_, p)| p).sum();
    RangeMass {
        mass,
        restricted: ConditionalDistribution {
            entries: restricted,
        },
    }
}
