//! In-memory, column-major table consumed by the estimator.
//!
//! Every column interns its cells: the distinct values live once in a
//! dictionary (first-seen order) and each row stores a compact [`ValueId`].
//! All sampling works on ids; strings only appear at the API boundary.

use std::borrow::Cow;
use std::collections::HashMap;

use crate::distribution::{self, ConditionalDistribution};
use crate::error::{DatasetError, EstimateError};
use crate::index::{DatasetIndex, Population};

/// Dense per-column code of a distinct cell value.
pub type ValueId = u32;

/// One named column: dictionary plus per-row codes.
#[derive(Debug, Clone)]
pub struct Column {
    name: String,
    dictionary: Vec<String>,
    lookup: HashMap<String, ValueId>,
    codes: Vec<ValueId>,
}

impl Column {
    fn new(name: String) -> Self {
        Self {
            name,
            dictionary: Vec::new(),
            lookup: HashMap::new(),
            codes: Vec::new(),
        }
    }

    fn push(&mut self, cell: &str) {
        let id = match self.lookup.get(cell) {
            Some(&id) => id,
            None => {
                let id = self.dictionary.len() as ValueId;
                self.dictionary.push(cell.to_string());
                self.lookup.insert(cell.to_string(), id);
                id
            }
        };
        self.codes.push(id);
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Cell text for a value id.
    #[inline]
    pub fn value(&self, id: ValueId) -> &str {
        &self.dictionary[id as usize]
    }

    /// Id of a cell value, or `None` if it never occurs in this column.
    pub fn id_of(&self, value: &str) -> Option<ValueId> {
        self.lookup.get(value).copied()
    }

    /// Value id stored at `row`.
    #[inline]
    pub fn code(&self, row: usize) -> ValueId {
        self.codes[row]
    }

    pub fn codes(&self) -> &[ValueId] {
        &self.codes
    }

    /// Number of distinct values observed.
    pub fn cardinality(&self) -> usize {
        self.dictionary.len()
    }

    /// Distinct values in id order.
    pub fn values(&self) -> impl Iterator<Item = (ValueId, &str)> {
        self.dictionary
            .iter()
            .enumerate()
            .map(|(i, v)| (i as ValueId, v.as_str()))
    }
}

/// Immutable table of rows by named columns.
#[derive(Debug, Clone)]
pub struct Dataset {
    columns: Vec<Column>,
    by_name: HashMap<String, usize>,
    num_rows: usize,
}

impl Dataset {
    /// Build a dataset from column names and string rows.
    pub fn from_rows<I, R, S>(names: &[&str], rows: I) -> Result<Self, DatasetError>
    where
        I: IntoIterator<Item = R>,
        R: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut builder = DatasetBuilder::new(names.iter().map(|n| n.to_string()))?;
        for row in rows {
            builder.push_row(row)?;
        }
        Ok(builder.finish())
    }

    pub fn num_rows(&self) -> usize {
        self.num_rows
    }

    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name())
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.by_name.get(name).copied()
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.column_index(name).map(|i| &self.columns[i])
    }

    #[inline]
    pub fn column_at(&self, index: usize) -> &Column {
        &self.columns[index]
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Normalized frequency of `target` over the rows matching an optional
    /// equality predicate `(column, value)`.
    ///
    /// Name-based entry point over the same [`DatasetIndex`] and
    /// [`distribution::resolve`] path the trial driver uses. Empty when the
    /// predicate matches no rows. Unknown columns fail with
    /// [`EstimateError::InvalidAttribute`].
    pub fn resolve(
        &self,
        target: &str,
        restrict: Option<(&str, &str)>,
    ) -> Result<ConditionalDistribution, EstimateError> {
        let target_idx = self
            .column_index(target)
            .ok_or_else(|| EstimateError::InvalidAttribute(target.to_string()))?;

        let Some((attr, value)) = restrict else {
            let index = DatasetIndex::build(self, &[]);
            return Ok(distribution::resolve(&index, target_idx, &Population::All));
        };

        let attr_idx = self
            .column_index(attr)
            .ok_or_else(|| EstimateError::InvalidAttribute(attr.to_string()))?;
        let index = DatasetIndex::build(self, &[attr_idx]);
        // A value absent from the dictionary matches nothing.
        let population = match self.columns[attr_idx].id_of(value) {
            Some(wanted) => Population::All.restrict(&index, attr_idx, wanted),
            None => Population::Rows(Cow::Owned(Vec::new())),
        };
        Ok(distribution::resolve(&index, target_idx, &population))
    }
}

/// Row-by-row builder for [`Dataset`].
pub struct DatasetBuilder {
    columns: Vec<Column>,
    by_name: HashMap<String, usize>,
    num_rows: usize,
}

impl DatasetBuilder {
    pub fn new<I, S>(names: I) -> Result<Self, DatasetError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut columns = Vec::new();
        let mut by_name = HashMap::new();
        for name in names {
            let name = name.into();
            if by_name.insert(name.clone(), columns.len()).is_some() {
                return Err(DatasetError::DuplicateColumn(name));
            }
            columns.push(Column::new(name));
        }
        Ok(Self {
            columns,
            by_name,
            num_rows: 0,
        })
    }

    /// Append one row; the cell count must match the column count.
    pub fn push_row<R, S>(&mut self, row: R) -> Result<(), DatasetError>
    where
        R: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let cells: Vec<S> = row.into_iter().collect();
        if cells.len() != self.columns.len() {
            return Err(DatasetError::RowWidth {
                row: self.num_rows,
                expected: self.columns.len(),
                found: cells.len(),
            });
        }
        for (column, cell) in self.columns.iter_mut().zip(&cells) {
            column.push(cell.as_ref());
        }
        self.num_rows += 1;
        Ok(())
    }

    pub fn finish(self) -> Dataset {
        Dataset {
            columns: self.columns,
            by_name: self.by_name,
            num_rows: self.num_rows,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn class_city() -> Dataset {
        Dataset::from_rows(
            &["Class", "City"],
            [["X", "P"], ["X", "Q"], ["Y", "P"], ["Y", "Q"]],
        )
        .unwrap()
    }

    #[test]
    fn test_interning() {
        let ds = class_city();
        assert_eq!(ds.num_rows(), 4);
        assert_eq!(ds.num_columns(), 2);
        let class = ds.column("Class").unwrap();
        assert_eq!(class.cardinality(), 2);
        assert_eq!(class.id_of("X"), Some(0));
        assert_eq!(class.id_of("Y"), Some(1));
        assert_eq!(class.id_of("Z"), None);
        assert_eq!(class.codes(), &[0, 0, 1, 1]);
        assert_eq!(class.value(1), "Y");
    }

    #[test]
    fn test_duplicate_column_rejected() {
        let err = DatasetBuilder::new(["A", "A"]).err().unwrap();
        assert!(matches!(err, DatasetError::DuplicateColumn(ref n) if n == "A"));
    }

    #[test]
    fn test_row_width_checked() {
        let err = Dataset::from_rows(&["A", "B"], [vec!["1", "2"], vec!["3"]]).unwrap_err();
        assert!(matches!(
            err,
            DatasetError::RowWidth {
                row: 1,
                expected: 2,
                found: 1
            }
        ));
    }

    #[test]
    fn test_resolve_marginal() {
        let ds = class_city();
        let dist = ds.resolve("City", None).unwrap();
        let city = ds.column("City").unwrap();
        assert_eq!(dist.get(city.id_of("P").unwrap()), 0.5);
        assert_eq!(dist.get(city.id_of("Q").unwrap()), 0.5);
    }

    #[test]
    fn test_resolve_conditional() {
        let ds = Dataset::from_rows(
            &["Class", "City"],
            [["X", "P"], ["X", "P"], ["X", "Q"], ["Y", "Q"]],
        )
        .unwrap();
        let dist = ds.resolve("City", Some(("Class", "X"))).unwrap();
        let city = ds.column("City").unwrap();
        assert!((dist.get(city.id_of("P").unwrap()) - 2.0 / 3.0).abs() < 1e-12);
        assert!((dist.get(city.id_of("Q").unwrap()) - 1.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_resolve_empty_population() {
        let ds = class_city();
        let dist = ds.resolve("City", Some(("Class", "Z"))).unwrap();
        assert!(dist.is_empty());
    }

    #[test]
    fn test_resolve_matches_index_path() {
        let ds = Dataset::from_rows(
            &["A", "B"],
            [["1", "x"], ["1", "y"], ["2", "x"], ["1", "x"]],
        )
        .unwrap();
        let a = ds.column_index("A").unwrap();
        let b = ds.column_index("B").unwrap();
        let index = DatasetIndex::build(&ds, &[a, b]);
        let one = ds.column("A").unwrap().id_of("1").unwrap();

        let conditioned = Population::All.restrict(&index, a, one);
        assert_eq!(
            ds.resolve("B", Some(("A", "1"))).unwrap(),
            distribution::resolve(&index, b, &conditioned)
        );
        assert_eq!(
            ds.resolve("B", None).unwrap(),
            distribution::resolve(&index, b, &Population::All)
        );
    }

    #[test]
    fn test_resolve_unknown_column() {
        let ds = class_city();
        let err = ds.resolve("Color", None).unwrap_err();
        assert!(matches!(err, EstimateError::InvalidAttribute(ref a) if a == "Color"));
        let err = ds.resolve("City", Some(("Color", "red"))).unwrap_err();
        assert!(matches!(err, EstimateError::InvalidAttribute(ref a) if a == "Color"));
    }
}
