//! Run configuration and shared environment reads for the binaries.
//!
//! | Variable | Default | Used by |
//! |----------|---------|---------|
//! | `SELECTIVITY_TRIALS` | 1000 | [`EstimatorConfig::from_env`] |
//! | `SELECTIVITY_SEED` | unset (OS entropy) | [`EstimatorConfig::from_env`] |
//! | `SELECTIVITY_MAX_TRIALS` | 10000000 | [`max_trials`] |
//! | `RAYON_NUM_THREADS` / `OMP_NUM_THREADS` | rayon default | [`init_rayon_threads`] |
//! | `SELECTIVITY_PORT` | 9000 | [`server_port`] |
//! | `RUST_LOG` | `info` | [`init_tracing`] |

use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

pub const DEFAULT_TRIALS: usize = 1000;
pub const DEFAULT_PORT: u16 = 9000;
pub const DEFAULT_MAX_TRIALS: usize = 10_000_000;

/// How many trials to run and how to seed them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EstimatorConfig {
    /// Trial count S, at least 1.
    #[serde(default = "default_trials")]
    pub trials: usize,

    /// Fixed base seed for reproducible runs. `None` draws one per run.
    #[serde(default)]
    pub seed: Option<u64>,

    /// Spread trials over the rayon pool.
    #[serde(default = "default_parallel")]
    pub parallel: bool,

    /// Keep per-trial sample assignments in the result.
    #[serde(default)]
    pub record_samples: bool,
}

fn default_trials() -> usize {
    DEFAULT_TRIALS
}

fn default_parallel() -> bool {
    true
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self {
            trials: DEFAULT_TRIALS,
            seed: None,
            parallel: true,
            record_samples: false,
        }
    }
}

impl EstimatorConfig {
    /// Defaults overridden by `SELECTIVITY_TRIALS` and `SELECTIVITY_SEED`.
    /// Unparseable values are ignored.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(trials) = env_parse::<usize>("SELECTIVITY_TRIALS") {
            config.trials = trials;
        }
        if let Some(seed) = env_parse::<u64>("SELECTIVITY_SEED") {
            config.seed = Some(seed);
        }
        config
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.trim().parse().ok())
}

/// Read `RAYON_NUM_THREADS` (fallback `OMP_NUM_THREADS`) and size the global
/// pool. Tolerates an already-initialized pool. Returns the thread count.
pub fn init_rayon_threads() -> usize {
    let requested = env_parse::<usize>("RAYON_NUM_THREADS")
        .or_else(|| env_parse::<usize>("OMP_NUM_THREADS"));
    if let Some(n) = requested {
        if rayon::ThreadPoolBuilder::new()
            .num_threads(n)
            .build_global()
            .is_err()
        {
            tracing::debug!("rayon pool already initialized");
        }
    }
    rayon::current_num_threads()
}

/// Read `SELECTIVITY_PORT` (default 9000).
pub fn server_port() -> u16 {
    env_parse("SELECTIVITY_PORT").unwrap_or(DEFAULT_PORT)
}

/// Read `SELECTIVITY_MAX_TRIALS`, the largest trial count the server accepts
/// per request (default 10 000 000).
pub fn max_trials() -> usize {
    env_parse("SELECTIVITY_MAX_TRIALS").unwrap_or(DEFAULT_MAX_TRIALS)
}

/// Install the global fmt subscriber. `RUST_LOG` wins when set; otherwise
/// `debug` with `verbose`, else `info`.
pub fn init_tracing(verbose: bool) {
    let fallback = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));
    // A second init (tests, embedding) keeps the first subscriber.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let c = EstimatorConfig::default();
        assert_eq!(c.trials, 1000);
        assert_eq!(c.seed, None);
        assert!(c.parallel);
        assert!(!c.record_samples);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let c: EstimatorConfig = serde_json::from_str(r#"{"seed": 5}"#).unwrap();
        assert_eq!(c.trials, DEFAULT_TRIALS);
        assert_eq!(c.seed, Some(5));
        assert!(c.parallel);
    }
}
