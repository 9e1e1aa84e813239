//! Tracing setup and error-log sampling.
//!
//! High-volume failure paths (per-rule evaluation errors under load) would
//! otherwise emit thousands of identical warnings per second. Those sites
//! increment their metrics counter for every occurrence, then consult a
//! [`LogSampler`] and only emit 1 in N log lines.

use crate::config::LoggingConfig;
use once_cell::sync::OnceCell;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

static SAMPLER: OnceCell<LogSampler> = OnceCell::new();

/// Counter-based 1-in-N sampler. Thread-safe and allocation-free.
#[derive(Debug)]
pub struct LogSampler {
    rate: u64,
    counter: AtomicU64,
}

impl LogSampler {
    pub fn new(rate: u64) -> Self {
        Self {
            // rate 0 would never log anything; treat it as unsampled
            rate: rate.max(1),
            counter: AtomicU64::new(0),
        }
    }

    /// True for the first occurrence and every Nth one after it.
    pub fn should_log(&self) -> bool {
        self.counter.fetch_add(1, Ordering::Relaxed) % self.rate == 0
    }

    pub fn rate(&self) -> u64 {
        self.rate
    }

    /// Number of occurrences seen so far, logged or not.
    pub fn seen(&self) -> u64 {
        self.counter.load(Ordering::Relaxed)
    }
}

/// Initialize the tracing subscriber and the process-wide sampler.
///
/// Called once at startup; later calls keep the first subscriber and
/// sampler (relevant for tests that race to initialize).
pub fn init(config: &LoggingConfig) {
    let _ = SAMPLER.set(LogSampler::new(config.sample_rate));

    let default_filter = format!(
        "verdict_api={level},verdict_engine={level},verdict_core={level},tower_http={level}",
        level = config.level.as_filter()
    );

    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}

/// Process-wide sampler. Defaults to 1-in-100 when [`init`] was never run.
pub fn sampler() -> &'static LogSampler {
    SAMPLER.get_or_init(|| LogSampler::new(100))
}
