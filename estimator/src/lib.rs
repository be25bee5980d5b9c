//! # Selectivity: chain-rule sampling estimator
//!
//! Estimates the probability that a row of a table matches a conjunctive
//! multi-attribute query, without enumerating the matching rows.
//!
//! ## Algorithm overview
//!
//! A query is an ordered attribute list A₁..Aₙ and an allowed-value set Rᵢ
//! per attribute. One **trial** walks the order once:
//!
//! | Stage | Rust module | Description |
//! |-------|-------------|-------------|
//! | Resolve | [`distribution::resolve`] | P(Aᵢ \| current sub-population) |
//! | Accumulate | [`distribution::accumulate_mass`] | mᵢ = Σ P(v), v ∈ Rᵢ; zero ends the trial |
//! | Sample | [`sampler::sample_value`] | draw vᵢ from the distribution cut to Rᵢ, renormalized by mᵢ |
//! | Drive | [`trial::run_trial`] | p = Π mᵢ, narrowing the population by Aᵢ = vᵢ |
//! | Average | [`estimator::Estimator`] | mean p over S independent trials |
//!
//! Because each step conditions on every earlier sampled value, E[p] is the
//! joint probability P(A₁∈R₁, …, Aₙ∈Rₙ) for any attribute order.
//!
//! ## Data representation
//!
//! [`dataset::Dataset`] is column-major with per-column dictionaries: each
//! distinct cell gets a dense [`dataset::ValueId`]. A [`query::QueryPlan`]
//! resolves allowed values to ids and builds an [`index::DatasetIndex`]
//! (value → row postings) once, so trials never rescan the full table.
//!
//! ## Randomness
//!
//! All draws go through [`sampler::WeightedDraw`], implemented for every
//! `rand::Rng`. Seeded runs use one `SmallRng` per trial, so results are
//! reproducible and independent of the rayon thread count.

pub mod config;
pub mod dataset;
pub mod distribution;
pub mod error;
pub mod estimator;
pub mod index;
pub mod loader;
pub mod query;
pub mod sampler;
pub mod server;
pub mod trial;

pub use config::EstimatorConfig;
pub use dataset::{Dataset, DatasetBuilder, ValueId};
pub use error::{DatasetError, EstimateError, Result};
pub use estimator::{estimate, Estimate, Estimator};
pub use loader::{load_csv, read_csv, LoadOptions};
pub use query::{QueryPlan, QueryRanges, QuerySpec, RangeSpec};
pub use sampler::WeightedDraw;
pub use trial::{SampleAssignment, TrialOutcome};
