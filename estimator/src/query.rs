//! Query range specifications and plan compilation.
//!
//! A query is an ordered attribute list plus, per attribute, the values that
//! count as a match. [`QueryPlan::compile`] validates the whole query once,
//! resolves every allowed value to a [`ValueId`], and builds the grouped
//! index the trials read from.
//!
//! Validation order:
//! 1. every attribute names a column ([`EstimateError::InvalidAttribute`])
//! 2. no attribute repeats ([`EstimateError::DuplicateAttribute`])
//! 3. every attribute has a range ([`EstimateError::MissingQueryRange`])

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::dataset::{Column, Dataset, ValueId};
use crate::distribution::{accumulate_mass, resolve, RangeMass};
use crate::error::{EstimateError, Result};
use crate::index::{DatasetIndex, Population};

// ── Range specifications ───────────────────────────────────────────────

/// Which cells of one attribute count as matching.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged, from = "RawRangeSpec")]
pub enum RangeSpec {
    /// Explicit enumeration of cell values.
    Values(Vec<String>),
    /// Inclusive numeric interval; cells that do not parse as numbers never
    /// match.
    Between { min: f64, max: f64 },
}

impl RangeSpec {
    pub fn values<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Values(values.into_iter().map(Into::into).collect())
    }

    pub fn between(min: f64, max: f64) -> Self {
        Self::Between { min, max }
    }

    /// Resolve against a column's dictionary. Values the column never
    /// contains are dropped, since they carry no mass.
    pub fn resolve(&self, column: &Column) -> AllowedSet {
        match self {
            RangeSpec::Values(values) => {
                AllowedSet::from_ids(values.iter().filter_map(|v| column.id_of(v)))
            }
            RangeSpec::Between { min, max } => AllowedSet::from_ids(
                column
                    .values()
                    .filter(|(_, cell)| {
                        cell.trim()
                            .parse::<f64>()
                            .is_ok_and(|x| x >= *min && x <= *max)
                    })
                    .map(|(id, _)| id),
            ),
        }
    }
}

/// JSON scalar accepted inside a value list.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawCell {
    Text(String),
    Number(serde_json::Number),
    Bool(bool),
}

impl From<RawCell> for String {
    fn from(cell: RawCell) -> Self {
        match cell {
            RawCell::Text(s) => s,
            RawCell::Number(n) => number_text(&n),
            RawCell::Bool(b) => b.to_string(),
        }
    }
}

/// Cell text for a JSON number. Whole floats print as integers, so `2016.0`
/// matches a `2016` cell; other numbers keep their JSON spelling.
fn number_text(n: &serde_json::Number) -> String {
    // 2^53: larger floats are no longer exact integers.
    const EXACT: f64 = 9_007_199_254_740_992.0;
    match n.as_f64() {
        Some(f) if n.is_f64() && f.fract() == 0.0 && f.abs() <= EXACT => {
            format!("{}", f as i64)
        }
        _ => n.to_string(),
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawRangeSpec {
    Values(Vec<RawCell>),
    Between { min: f64, max: f64 },
}

impl From<RawRangeSpec> for RangeSpec {
    fn from(raw: RawRangeSpec) -> Self {
        match raw {
            RawRangeSpec::Values(cells) => {
                RangeSpec::Values(cells.into_iter().map(String::from).collect())
            }
            RawRangeSpec::Between { min, max } => RangeSpec::Between { min, max },
        }
    }
}

/// Attribute name → allowed values.
pub type QueryRanges = BTreeMap<String, RangeSpec>;

/// A complete query as read from JSON.
///
/// ```json
/// { "order": ["Class", "City"],
///   "ranges": { "Class": ["X"], "City": ["P", "Q"] } }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QuerySpec {
    pub order: Vec<String>,
    pub ranges: QueryRanges,
}

impl QuerySpec {
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}

// ── Allowed sets ───────────────────────────────────────────────────────

/// Deduplicated, sorted value ids permitted for one attribute.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AllowedSet {
    ids: Vec<ValueId>,
}

impl AllowedSet {
    pub fn from_ids(ids: impl IntoIterator<Item = ValueId>) -> Self {
        let mut ids: Vec<ValueId> = ids.into_iter().collect();
        ids.sort_unstable();
        ids.dedup();
        Self { ids }
    }

    #[inline]
    pub fn contains(&self, id: ValueId) -> bool {
        self.ids.binary_search(&id).is_ok()
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn ids(&self) -> &[ValueId] {
        &self.ids
    }
}

// ── Plan ───────────────────────────────────────────────────────────────

/// One attribute of the plan.
#[derive(Debug, Clone)]
pub struct PlanStep {
    pub attribute: String,
    pub column: usize,
    pub allowed: AllowedSet,
}

/// Validated, indexed query ready for repeated trials.
///
/// Holds only shared reads of the dataset, so it can be used from many
/// threads at once.
#[derive(Debug, Clone)]
pub struct QueryPlan<'a> {
    dataset: &'a Dataset,
    steps: Vec<PlanStep>,
    index: DatasetIndex<'a>,
    root: RangeMass,
}

impl<'a> QueryPlan<'a> {
    /// Validate `order` against the dataset and `ranges`, then index.
    pub fn compile<S: AsRef<str>>(
        dataset: &'a Dataset,
        order: &[S],
        ranges: &QueryRanges,
    ) -> Result<Self> {
        let mut columns = Vec::with_capacity(order.len());
        for attribute in order {
            let attribute = attribute.as_ref();
            let column = dataset
                .column_index(attribute)
                .ok_or_else(|| EstimateError::InvalidAttribute(attribute.to_string()))?;
            columns.push(column);
        }

        let mut seen = HashSet::with_capacity(order.len());
        for attribute in order {
            if !seen.insert(attribute.as_ref()) {
                return Err(EstimateError::DuplicateAttribute(
                    attribute.as_ref().to_string(),
                ));
            }
        }

        let mut steps = Vec::with_capacity(order.len());
        for (attribute, &column) in order.iter().zip(&columns) {
            let attribute = attribute.as_ref();
            let range = ranges
                .get(attribute)
                .ok_or_else(|| EstimateError::MissingQueryRange(attribute.to_string()))?;
            let allowed = range.resolve(dataset.column_at(column));
            debug!(
                attribute,
                allowed = allowed.len(),
                domain = dataset.column_at(column).cardinality(),
                "resolved query range"
            );
            steps.push(PlanStep {
                attribute: attribute.to_string(),
                column,
                allowed,
            });
        }

        let index = DatasetIndex::build(dataset, &columns);
        let root = match steps.first() {
            Some(first) => accumulate_mass(
                &resolve(&index, first.column, &Population::All),
                &first.allowed,
            ),
            None => RangeMass::default(),
        };

        Ok(Self {
            dataset,
            steps,
            index,
            root,
        })
    }

    pub fn dataset(&self) -> &'a Dataset {
        self.dataset
    }

    pub fn steps(&self) -> &[PlanStep] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn index(&self) -> &DatasetIndex<'a> {
        &self.index
    }

    /// Range mass of the first attribute over the whole dataset. Identical
    /// for every trial, so computed once.
    pub fn root_mass(&self) -> &RangeMass {
        &self.root
    }
}
