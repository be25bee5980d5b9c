//! One chain-rule trial.
//!
//! Walks the plan attribute by attribute:
//!
//! ```text
//! p = 1, population = all rows
//! for each attribute i:
//!     dist  = P(attr_i | population)
//!     m_i   = Σ dist[v] for v in allowed_i
//!     m_i == 0  → Zero
//!     v_i   ~ dist restricted to allowed_i, renormalized by m_i
//!     p    *= m_i
//!     population = rows of population with attr_i == v_i
//! → Complete { p, (v_1 .. v_n) }
//! ```
//!
//! The population only ever shrinks, so step `i` is conditioned on all
//! earlier sampled values. E[p] over trials is the joint query probability.

use serde::Serialize;

use crate::dataset::ValueId;
use crate::distribution::{accumulate_mass, resolve, RangeMass};
use crate::index::Population;
use crate::query::QueryPlan;
use crate::sampler::{sample_value, WeightedDraw};

/// Sampled value per planned attribute, in plan order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SampleAssignment {
    values: Vec<ValueId>,
}

impl SampleAssignment {
    pub fn values(&self) -> &[ValueId] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// `(attribute, cell)` pairs for display.
    pub fn named(&self, plan: &QueryPlan<'_>) -> Vec<(String, String)> {
        plan.steps()
            .iter()
            .zip(&self.values)
            .map(|(step, &id)| {
                let column = plan.dataset().column_at(step.column);
                (step.attribute.clone(), column.value(id).to_string())
            })
            .collect()
    }
}

/// Result of one trial.
#[derive(Debug, Clone, PartialEq)]
pub enum TrialOutcome {
    /// Some attribute had no allowed mass; `depth` is its plan position.
    Zero { depth: usize },
    /// Every attribute sampled.
    Complete {
        probability: f64,
        assignment: SampleAssignment,
    },
}

impl TrialOutcome {
    pub fn probability(&self) -> f64 {
        match self {
            TrialOutcome::Zero { .. } => 0.0,
            TrialOutcome::Complete { probability, .. } => *probability,
        }
    }

    pub fn is_zero(&self) -> bool {
        matches!(self, TrialOutcome::Zero { .. })
    }

    pub fn assignment(&self) -> Option<&SampleAssignment> {
        match self {
            TrialOutcome::Zero { .. } => None,
            TrialOutcome::Complete { assignment, .. } => Some(assignment),
        }
    }
}

/// Serializable per-trial record for diagnostics.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrialRecord {
    pub probability: f64,
    /// Empty for zero outcomes.
    pub assignment: Vec<(String, String)>,
}

impl TrialRecord {
    pub fn from_outcome(outcome: &TrialOutcome, plan: &QueryPlan<'_>) -> Self {
        Self {
            probability: outcome.probability(),
            assignment: outcome
                .assignment()
                .map(|a| a.named(plan))
                .unwrap_or_default(),
        }
    }
}

/// Run one trial of `plan`, drawing values with `draw`.
pub fn run_trial<D: WeightedDraw + ?Sized>(plan: &QueryPlan<'_>, draw: &mut D) -> TrialOutcome {
    let steps = plan.steps();
    let mut probability = 1.0f64;
    let mut values = Vec::with_capacity(steps.len());
    let mut population = Population::All;

    for (depth, step) in steps.iter().enumerate() {
        let computed: RangeMass;
        let range = if depth == 0 {
            plan.root_mass()
        } else {
            let dist = resolve(plan.index(), step.column, &population);
            computed = accumulate_mass(&dist, &step.allowed);
            &computed
        };

        if range.is_zero() {
            return TrialOutcome::Zero { depth };
        }
        let Some(value) = sample_value(&range.restricted, range.mass, draw) else {
            return TrialOutcome::Zero { depth };
        };

        values.push(value);
        probability *= range.mass;
        if depth + 1 < steps.len() {
            population = population.restrict(plan.index(), step.column, value);
        }
    }

    TrialOutcome::Complete {
        probability,
        assignment: SampleAssignment { values },
    }
}
