//! Grouped views over the dataset, built once per compiled query.
//!
//! For each indexed column we keep:
//! - `postings[v]`: sorted row ids whose cell is `v`
//! - `marginal[v]`: number of rows whose cell is `v`
//!
//! The first restriction of a trial is then a borrowed posting list instead of
//! a full scan; later restrictions only walk the already-narrowed rows.

use std::borrow::Cow;

use crate::dataset::{Dataset, ValueId};

/// Row id within a [`Dataset`].
pub type RowId = u32;

#[derive(Debug, Clone)]
struct ColumnView {
    postings: Vec<Vec<RowId>>,
    marginal: Vec<u32>,
}

impl ColumnView {
    fn build(dataset: &Dataset, column: usize) -> Self {
        let col = dataset.column_at(column);
        let mut postings = vec![Vec::new(); col.cardinality()];
        for (row, &code) in col.codes().iter().enumerate() {
            postings[code as usize].push(row as RowId);
        }
        let marginal = postings.iter().map(|p| p.len() as u32).collect();
        Self { postings, marginal }
    }
}

/// Value → rows lookup for a subset of columns.
#[derive(Debug, Clone)]
pub struct DatasetIndex<'a> {
    dataset: &'a Dataset,
    views: Vec<Option<ColumnView>>,
}

impl<'a> DatasetIndex<'a> {
    /// Index the given column positions. Duplicates are ignored.
    pub fn build(dataset: &'a Dataset, columns: &[usize]) -> Self {
        let mut views = vec![None; dataset.num_columns()];
        for &c in columns {
            if views[c].is_none() {
                views[c] = Some(ColumnView::build(dataset, c));
            }
        }
        Self { dataset, views }
    }

    pub fn dataset(&self) -> &'a Dataset {
        self.dataset
    }

    pub fn is_indexed(&self, column: usize) -> bool {
        self.views.get(column).is_some_and(|v| v.is_some())
    }

    /// Whole-dataset value counts for `column`, computed on the fly when the
    /// column was not indexed.
    pub fn marginal(&self, column: usize) -> Cow<'_, [u32]> {
        match &self.views[column] {
            Some(view) => Cow::Borrowed(&view.marginal),
            None => {
                let col = self.dataset.column_at(column);
                let mut counts = vec![0u32; col.cardinality()];
                for &code in col.codes() {
                    counts[code as usize] += 1;
                }
                Cow::Owned(counts)
            }
        }
    }

    /// Rows whose `column` cell equals `value`, if the column is indexed.
    pub fn postings(&self, column: usize, value: ValueId) -> Option<&[RowId]> {
        let view = self.views[column].as_ref()?;
        Some(view.postings.get(value as usize).map_or(&[][..], Vec::as_slice))
    }
}

/// The sub-population a trial is currently conditioned on.
///
/// Each restriction applies to the current population, so a trial's filters
/// compound: after `k` steps the rows satisfy all `k` sampled values.
#[derive(Debug, Clone)]
pub enum Population<'a> {
    /// Every row of the dataset.
    All,
    /// Sorted explicit row ids.
    Rows(Cow<'a, [RowId]>),
}

impl<'a> Population<'a> {
    pub fn len(&self, dataset: &Dataset) -> usize {
        match self {
            Population::All => dataset.num_rows(),
            Population::Rows(rows) => rows.len(),
        }
    }

    pub fn is_empty(&self, dataset: &Dataset) -> bool {
        self.len(dataset) == 0
    }

    /// Keep only rows whose `column` cell equals `value`.
    pub fn restrict(
        &self,
        index: &'a DatasetIndex<'_>,
        column: usize,
        value: ValueId,
    ) -> Population<'a> {
        let col = index.dataset().column_at(column);
        match self {
            Population::All => match index.postings(column, value) {
                Some(rows) => Population::Rows(Cow::Borrowed(rows)),
                None => Population::Rows(Cow::Owned(
                    col.codes()
                        .iter()
                        .enumerate()
                        .filter(|(_, &code)| code == value)
                        .map(|(row, _)| row as RowId)
                        .collect(),
                )),
            },
            Population::Rows(rows) => Population::Rows(Cow::Owned(
                rows.iter()
                    .copied()
                    .filter(|&row| col.code(row as usize) == value)
                    .collect(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn three_cols() -> Dataset {
        Dataset::from_rows(
            &["A", "B", "C"],
            [
                ["a1", "b1", "c1"],
                ["a1", "b2", "c1"],
                ["a2", "b1", "c2"],
                ["a1", "b1", "c2"],
                ["a2", "b2", "c1"],
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_postings_and_marginals() {
        let ds = three_cols();
        let idx = DatasetIndex::build(&ds, &[0, 1]);
        assert!(idx.is_indexed(0));
        assert!(!idx.is_indexed(2));
        assert_eq!(idx.postings(0, 0), Some(&[0u32, 1, 3][..]));
        assert_eq!(idx.postings(0, 1), Some(&[2u32, 4][..]));
        assert_eq!(idx.postings(2, 0), None);
        assert_eq!(&*idx.marginal(1), &[3, 2]);
        // Unindexed column falls back to a scan.
        assert_eq!(&*idx.marginal(2), &[3, 2]);
    }

    #[test]
    fn test_restrict_compounds() {
        let ds = three_cols();
        let idx = DatasetIndex::build(&ds, &[0, 1, 2]);
        let a1 = Population::All.restrict(&idx, 0, 0);
        assert_eq!(a1.len(&ds), 3);
        let a1_b1 = a1.restrict(&idx, 1, 0);
        match &a1_b1 {
            Population::Rows(rows) => assert_eq!(&rows[..], &[0, 3]),
            Population::All => panic!("expected explicit rows"),
        }
        let empty = a1_b1.restrict(&idx, 2, 5);
        assert!(empty.is_empty(&ds));
    }

    #[test]
    fn test_restrict_unindexed_column() {
        let ds = three_cols();
        let idx = DatasetIndex::build(&ds, &[]);
        let c2 = Population::All.restrict(&idx, 2, 1);
        assert_eq!(c2.len(&ds), 2);
    }
}
