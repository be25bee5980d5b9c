//! Monte Carlo averaging over independent trials.
//!
//! The final estimate is the mean trial probability. Trials share only the
//! read-only [`QueryPlan`], so they parallelize with rayon.
//!
//! ## Seeding
//!
//! Seeded runs give trial `i` its own `SmallRng::seed_from_u64(seed + i)`.
//! Results therefore do not depend on thread count, and sequential and
//! parallel runs with the same seed are identical.

use std::time::{Duration, Instant};

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Serialize, Serializer};
use tracing::{debug, trace};

use crate::config::EstimatorConfig;
use crate::dataset::Dataset;
use crate::error::{EstimateError, Result};
use crate::query::{QueryPlan, QueryRanges, QuerySpec};
use crate::sampler::WeightedDraw;
use crate::trial::{run_trial, TrialOutcome, TrialRecord};

/// Summary of a Monte Carlo run.
#[derive(Debug, Clone, Serialize)]
pub struct Estimate {
    /// Mean trial probability, in [0, 1].
    pub estimate: f64,
    pub trials: usize,
    /// Trials that hit a zero-mass branch.
    pub zero_trials: usize,
    pub std_dev: f64,
    /// `std_dev / sqrt(trials)`.
    pub std_error: f64,
    pub min: f64,
    pub max: f64,
    /// Seed of a seeded run.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
    #[serde(rename = "elapsed_ms", serialize_with = "serialize_millis")]
    pub elapsed: Duration,
    /// Per-trial records, only when recording was requested.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub samples: Option<Vec<TrialRecord>>,
}

fn serialize_millis<S: Serializer>(d: &Duration, s: S) -> std::result::Result<S::Ok, S::Error> {
    s.serialize_f64(d.as_secs_f64() * 1000.0)
}

/// Trials summarized per chunk before merging. Chunk boundaries are fixed
/// multiples of this from trial 0, so every execution mode merges the same
/// partial summaries in the same order.
const CHUNK_TRIALS: usize = 1024;

/// Chunks evaluated per parallel batch. Bounds the memory held for partial
/// summaries regardless of the trial count.
const BATCH_CHUNKS: usize = 256;

/// Running mean/variance (Welford) with min, max and zero count.
#[derive(Debug, Clone, Copy, PartialEq)]
struct TrialStats {
    count: usize,
    mean: f64,
    m2: f64,
    min: f64,
    max: f64,
    zeros: usize,
}

impl Default for TrialStats {
    fn default() -> Self {
        Self {
            count: 0,
            mean: 0.0,
            m2: 0.0,
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
            zeros: 0,
        }
    }
}

impl TrialStats {
    fn push(&mut self, p: f64) {
        self.count += 1;
        let delta = p - self.mean;
        self.mean += delta / self.count as f64;
        self.m2 += delta * (p - self.mean);
        self.min = self.min.min(p);
        self.max = self.max.max(p);
        if p == 0.0 {
            self.zeros += 1;
        }
    }

    /// Combine two disjoint summaries (Chan et al. parallel variance).
    fn merge(self, other: Self) -> Self {
        if other.count == 0 {
            return self;
        }
        if self.count == 0 {
            return other;
        }
        let count = self.count + other.count;
        let (na, nb) = (self.count as f64, other.count as f64);
        let delta = other.mean - self.mean;
        Self {
            count,
            mean: self.mean + delta * nb / count as f64,
            m2: self.m2 + other.m2 + delta * delta * na * nb / count as f64,
            min: self.min.min(other.min),
            max: self.max.max(other.max),
            zeros: self.zeros + other.zeros,
        }
    }

    fn into_estimate(self, elapsed: Duration) -> Estimate {
        let n = self.count.max(1) as f64;
        let std_dev = (self.m2.max(0.0) / n).sqrt();
        Estimate {
            estimate: self.mean.clamp(0.0, 1.0),
            trials: self.count,
            zero_trials: self.zeros,
            std_dev,
            std_error: std_dev / n.sqrt(),
            min: self.min,
            max: self.max,
            seed: None,
            elapsed,
            samples: None,
        }
    }
}

/// Trial-ordered summary: full chunks are merged left to right, the open
/// chunk last.
#[derive(Debug, Default)]
struct OrderedStats {
    done: TrialStats,
    open: TrialStats,
}

impl OrderedStats {
    fn push(&mut self, p: f64) {
        self.open.push(p);
        if self.open.count == CHUNK_TRIALS {
            self.done = self.done.merge(std::mem::take(&mut self.open));
        }
    }

    /// Append one complete chunk. Only valid on a chunk boundary.
    fn push_chunk(&mut self, chunk: TrialStats) {
        debug_assert_eq!(self.open.count, 0);
        self.done = self.done.merge(chunk);
    }

    fn finish(self) -> TrialStats {
        self.done.merge(self.open)
    }
}

/// Compiled query plus the averaging driver.
#[derive(Debug, Clone)]
pub struct Estimator<'a> {
    plan: QueryPlan<'a>,
}

impl<'a> Estimator<'a> {
    /// Validate and index the query. Fails before any sampling.
    pub fn new<S: AsRef<str>>(
        dataset: &'a Dataset,
        order: &[S],
        ranges: &QueryRanges,
    ) -> Result<Self> {
        Ok(Self {
            plan: QueryPlan::compile(dataset, order, ranges)?,
        })
    }

    pub fn from_spec(dataset: &'a Dataset, spec: &QuerySpec) -> Result<Self> {
        Self::new(dataset, spec.order.as_slice(), &spec.ranges)
    }

    pub fn plan(&self) -> &QueryPlan<'a> {
        &self.plan
    }

    pub fn run_trial<D: WeightedDraw + ?Sized>(&self, draw: &mut D) -> TrialOutcome {
        run_trial(&self.plan, draw)
    }

    /// Run `trials` trials sequentially with one injected drawer.
    pub fn estimate_with<D: WeightedDraw + ?Sized>(
        &self,
        trials: usize,
        draw: &mut D,
        record: bool,
    ) -> Result<Estimate> {
        check_trials(trials)?;
        let start = Instant::now();
        let mut stats = OrderedStats::default();
        let mut samples = record.then(|| Vec::with_capacity(trials));

        for i in 0..trials {
            let outcome = run_trial(&self.plan, draw);
            trace!(trial = i, probability = outcome.probability(), "trial finished");
            stats.push(outcome.probability());
            if let Some(samples) = samples.as_mut() {
                samples.push(TrialRecord::from_outcome(&outcome, &self.plan));
            }
        }

        let mut est = stats.finish().into_estimate(start.elapsed());
        est.samples = samples;
        self.log_summary(&est);
        Ok(est)
    }

    /// Run `trials` trials with per-trial seeds derived from `seed`.
    ///
    /// Without `record`, memory stays bounded whatever the trial count:
    /// trials are summarized per chunk and chunks merged in trial order.
    pub fn estimate_seeded(
        &self,
        trials: usize,
        seed: u64,
        parallel: bool,
        record: bool,
    ) -> Result<Estimate> {
        check_trials(trials)?;
        let start = Instant::now();

        let trial = |i: usize| {
            let mut rng = SmallRng::seed_from_u64(seed.wrapping_add(i as u64));
            run_trial(&self.plan, &mut rng)
        };

        let mut stats = OrderedStats::default();
        let mut samples = None;

        if record {
            let records: Vec<TrialRecord> = if parallel {
                (0..trials)
                    .into_par_iter()
                    .map(|i| TrialRecord::from_outcome(&trial(i), &self.plan))
                    .collect()
            } else {
                (0..trials)
                    .map(|i| TrialRecord::from_outcome(&trial(i), &self.plan))
                    .collect()
            };
            for r in &records {
                stats.push(r.probability);
            }
            samples = Some(records);
        } else if parallel {
            let chunk = |c: usize| {
                let lo = c * CHUNK_TRIALS;
                let hi = (lo + CHUNK_TRIALS).min(trials);
                let mut s = TrialStats::default();
                for i in lo..hi {
                    s.push(trial(i).probability());
                }
                s
            };
            let chunks = trials.div_ceil(CHUNK_TRIALS);
            for batch in (0..chunks).step_by(BATCH_CHUNKS) {
                let end = (batch + BATCH_CHUNKS).min(chunks);
                let partial: Vec<TrialStats> = (batch..end).into_par_iter().map(&chunk).collect();
                for s in partial {
                    stats.push_chunk(s);
                }
            }
        } else {
            for i in 0..trials {
                stats.push(trial(i).probability());
            }
        }

        let mut est = stats.finish().into_estimate(start.elapsed());
        est.seed = Some(seed);
        est.samples = samples;
        self.log_summary(&est);
        Ok(est)
    }

    /// Run according to `config`; an unset seed is drawn from OS entropy.
    pub fn run(&self, config: &EstimatorConfig) -> Result<Estimate> {
        let seed = config.seed.unwrap_or_else(|| rand::rng().random());
        self.estimate_seeded(config.trials, seed, config.parallel, config.record_samples)
    }

    fn log_summary(&self, est: &Estimate) {
        debug!(
            attributes = self.plan.len(),
            trials = est.trials,
            zero_trials = est.zero_trials,
            estimate = est.estimate,
            std_error = est.std_error,
            elapsed_ms = est.elapsed.as_secs_f64() * 1000.0,
            "estimate complete"
        );
    }
}

fn check_trials(trials: usize) -> Result<()> {
    if trials == 0 {
        return Err(EstimateError::InvalidTrialCount(trials));
    }
    Ok(())
}

/// Reject trial counts above `max`. Callers serving untrusted requests check
/// this before running anything.
pub fn check_trial_limit(trials: usize, max: usize) -> Result<()> {
    if trials > max {
        return Err(EstimateError::TrialLimitExceeded {
            requested: trials,
            max,
        });
    }
    Ok(())
}

/// Estimate the probability that a row matches `ranges` on every attribute
/// of `order`, averaging `trials` chain-rule trials drawn with `rng`.
pub fn estimate<S, R>(
    dataset: &Dataset,
    order: &[S],
    ranges: &QueryRanges,
    trials: usize,
    rng: &mut R,
) -> Result<f64>
where
    S: AsRef<str>,
    R: Rng + ?Sized,
{
    let estimator = Estimator::new(dataset, order, ranges)?;
    Ok(estimator.estimate_with(trials, rng, false)?.estimate)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::RangeSpec;

    fn correlated() -> Dataset {
        Dataset::from_rows(
            &["A", "B"],
            [
                ["1", "x"],
                ["1", "x"],
                ["1", "y"],
                ["2", "y"],
                ["2", "y"],
                ["3", "x"],
            ],
        )
        .unwrap()
    }

    fn ranges(pairs: &[(&str, &[&str])]) -> QueryRanges {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), RangeSpec::values(v.iter().copied())))
            .collect()
    }

    #[test]
    fn test_zero_trials_rejected() {
        let ds = correlated();
        let est = Estimator::new(&ds, &["A"], &ranges(&[("A", &["1"])])).unwrap();
        let err = est.estimate_seeded(0, 1, false, false).unwrap_err();
        assert!(matches!(err, EstimateError::InvalidTrialCount(0)));
    }

    #[test]
    fn test_single_attribute_exact() {
        // With one attribute every trial returns the exact marginal mass.
        let ds = correlated();
        let est = Estimator::new(&ds, &["A"], &ranges(&[("A", &["1", "3"])])).unwrap();
        let r = est.estimate_seeded(50, 5, false, false).unwrap();
        assert!((r.estimate - 4.0 / 6.0).abs() < 1e-12);
        assert!(r.std_dev < 1e-12);
        assert_eq!(r.zero_trials, 0);
    }

    #[test]
    fn test_converges_to_joint_probability() {
        // P(A in {1,2}, B = y) = 3/6
        let ds = correlated();
        let r = ranges(&[("A", &["1", "2"]), ("B", &["y"])]);
        let est = Estimator::new(&ds, &["A", "B"], &r).unwrap();
        let out = est.estimate_seeded(20_000, 11, true, false).unwrap();
        assert!((out.estimate - 0.5).abs() < 0.02, "estimate={}", out.estimate);
        assert!(out.min >= 0.0 && out.max <= 1.0);
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let ds = correlated();
        let r = ranges(&[("A", &["1", "2", "3"]), ("B", &["x"])]);
        let est = Estimator::new(&ds, &["A", "B"], &r).unwrap();
        let seq = est.estimate_seeded(2_000, 77, false, true).unwrap();
        let par = est.estimate_seeded(2_000, 77, true, true).unwrap();
        assert_eq!(seq.estimate, par.estimate);
        assert_eq!(seq.samples, par.samples);
        assert_eq!(seq.samples.as_ref().map(Vec::len), Some(2_000));
    }

    #[test]
    fn test_zero_trials_counted() {
        // A=1 then B=y has mass 1/3; A=3 then B=y has none.
        let ds = correlated();
        let r = ranges(&[("A", &["1", "3"]), ("B", &["y"])]);
        let est = Estimator::new(&ds, &["A", "B"], &r).unwrap();
        let out = est.estimate_seeded(4_000, 3, true, false).unwrap();
        assert!(out.zero_trials > 0);
        assert!(out.zero_trials < out.trials);
        // P = 1/6
        assert!((out.estimate - 1.0 / 6.0).abs() < 0.02);
    }

    #[test]
    fn test_run_uses_config() {
        let ds = correlated();
        let est = Estimator::new(&ds, &["B"], &ranges(&[("B", &["x"])])).unwrap();
        let config = EstimatorConfig {
            trials: 10,
            seed: Some(9),
            parallel: false,
            record_samples: true,
        };
        let out = est.run(&config).unwrap();
        assert_eq!(out.trials, 10);
        assert_eq!(out.seed, Some(9));
        assert_eq!(out.samples.map(|s| s.len()), Some(10));
    }

    #[test]
    fn test_free_function() {
        let ds = correlated();
        let mut rng = SmallRng::seed_from_u64(1);
        let p = estimate(&ds, &["B"], &ranges(&[("B", &["x", "y"])]), 10, &mut rng).unwrap();
        assert!((p - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_chunked_stats_match_two_pass() {
        let ps: Vec<f64> = (0..3_000).map(|i| ((i * 37) % 101) as f64 / 100.0).collect();
        let mut stats = OrderedStats::default();
        for &p in &ps {
            stats.push(p);
        }
        let est = stats.finish().into_estimate(Duration::ZERO);

        let n = ps.len() as f64;
        let mean = ps.iter().sum::<f64>() / n;
        let var = ps.iter().map(|p| (p - mean).powi(2)).sum::<f64>() / n;
        assert_eq!(est.trials, ps.len());
        assert!((est.estimate - mean).abs() < 1e-12);
        assert!((est.std_dev - var.sqrt()).abs() < 1e-12);
        assert_eq!(est.min, 0.0);
        assert_eq!(est.max, 1.0);
        assert_eq!(est.zero_trials, ps.iter().filter(|&&p| p == 0.0).count());
    }

    #[test]
    fn test_unrecorded_parallel_spans_partial_chunks() {
        // Not a multiple of the chunk size, and more than one batch.
        let ds = correlated();
        let r = ranges(&[("A", &["1", "2"]), ("B", &["y"])]);
        let est = Estimator::new(&ds, &["A", "B"], &r).unwrap();
        let trials = CHUNK_TRIALS * BATCH_CHUNKS + 777;
        let seq = est.estimate_seeded(trials, 21, false, false).unwrap();
        let par = est.estimate_seeded(trials, 21, true, false).unwrap();
        assert_eq!(seq.estimate, par.estimate);
        assert_eq!(seq.std_dev, par.std_dev);
        assert_eq!(seq.zero_trials, par.zero_trials);
        assert_eq!(par.trials, trials);
    }

    #[test]
    fn test_recording_does_not_change_summary() {
        let ds = correlated();
        let r = ranges(&[("A", &["1", "3"]), ("B", &["x"])]);
        let est = Estimator::new(&ds, &["A", "B"], &r).unwrap();
        let plain = est.estimate_seeded(2_500, 8, true, false).unwrap();
        let recorded = est.estimate_seeded(2_500, 8, true, true).unwrap();
        assert_eq!(plain.estimate, recorded.estimate);
        assert_eq!(plain.std_dev, recorded.std_dev);
    }

    #[test]
    fn test_trial_limit() {
        assert!(check_trial_limit(10, 10).is_ok());
        let err = check_trial_limit(11, 10).unwrap_err();
        assert!(matches!(
            err,
            EstimateError::TrialLimitExceeded {
                requested: 11,
                max: 10
            }
        ));
    }

    #[test]
    fn test_estimate_serializes() {
        let ds = correlated();
        let est = Estimator::new(&ds, &["A"], &ranges(&[("A", &["2"])])).unwrap();
        let out = est.estimate_seeded(3, 0, false, false).unwrap();
        let json = serde_json::to_value(&out).unwrap();
        assert!(json["elapsed_ms"].is_f64());
        assert!(json.get("samples").is_none());
        assert_eq!(json["trials"], 3);
    }
}
