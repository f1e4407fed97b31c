//! Run-wide statistics aggregator.
//!
//! Workers share one [`RunStats`] through an `Arc` and record into it without
//! any coordination of their own. The orchestrator sets the run boundaries and
//! asks for a [`Report`] once every worker has finished.
//!
//! The median and percentile functions use fixed, nonstandard formulas so
//! numbers stay comparable with reports from earlier versions of this tool:
//!
//! * even sample count: median is the upper-middle element, not averaged;
//! * odd sample count: median is the middle element plus half of its successor;
//! * percentile `p`: element at `floor(p × n)`, no interpolation.
//!
//! Out-of-range indices are clamped to the last sample. Every statistic over
//! zero samples is `None` and renders as "no data".

use hdrhistogram::Histogram;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, OnceLock, PoisonError};
use std::time::Instant;
use tracing::{info, warn};

use crate::error::{RunError, RunResult};
use crate::phase::Phase;

/// Histogram ceiling: one hour, in microseconds.
const HISTOGRAM_MAX_MICROS: u64 = 3_600_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PhaseTiming {
    pub phase: Phase,
    pub workers: usize,
    pub duration_secs: f64,
}

pub struct RunStats {
    total_requests: AtomicU64,
    successes: AtomicU64,
    failures: AtomicU64,
    latencies: Mutex<Vec<f64>>,
    histogram: Mutex<Histogram<u64>>,
    all_start: OnceLock<Instant>,
    all_finish: OnceLock<Instant>,
    wall_time: OnceLock<f64>,
    phases: Mutex<Vec<PhaseTiming>>,
}

impl Default for RunStats {
    fn default() -> Self {
        Self::new()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl RunStats {
    pub fn new() -> Self {
        Self {
            total_requests: AtomicU64::new(0),
            successes: AtomicU64::new(0),
            failures: AtomicU64::new(0),
            latencies: Mutex::new(Vec::new()),
            histogram: Mutex::new(
                Histogram::<u64>::new_with_bounds(1, HISTOGRAM_MAX_MICROS, 3)
                    .expect("constant histogram bounds are valid"),
            ),
            all_start: OnceLock::new(),
            all_finish: OnceLock::new(),
            wall_time: OnceLock::new(),
            phases: Mutex::new(Vec::new()),
        }
    }

    pub fn record_request(&self) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_outcome(&self, success: bool) {
        if success {
            self.successes.fetch_add(1, Ordering::Relaxed);
        } else {
            self.failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_latency(&self, seconds: f64) {
        lock(&self.latencies).push(seconds);
        let micros = (seconds * 1_000_000.0).round().max(0.0) as u64;
        lock(&self.histogram).saturating_record(micros);
    }

    /// Records the instant the first phase's start barrier released.
    /// Returns `false` and keeps the earlier value if already set.
    pub fn set_all_start(&self, at: Instant) -> bool {
        let accepted = self.all_start.set(at).is_ok();
        if !accepted {
            warn!("Run start time already recorded, keeping the first value");
        }
        accepted
    }

    /// Records the instant the last phase's finish barrier released.
    /// Returns `false` and keeps the earlier value if already set.
    pub fn set_all_finish(&self, at: Instant) -> bool {
        let accepted = self.all_finish.set(at).is_ok();
        if !accepted {
            warn!("Run finish time already recorded, keeping the first value");
        }
        accepted
    }

    pub fn set_wall_time(&self, seconds: f64) -> bool {
        let accepted = self.wall_time.set(seconds).is_ok();
        if !accepted {
            warn!("Wall time already recorded, keeping the first value");
        }
        accepted
    }

    pub fn all_start(&self) -> RunResult<Instant> {
        self.all_start
            .get()
            .copied()
            .ok_or(RunError::MissingTimestamp("all workers started"))
    }

    pub fn all_finish(&self) -> RunResult<Instant> {
        self.all_finish
            .get()
            .copied()
            .ok_or(RunError::MissingTimestamp("all workers finished"))
    }

    /// Seconds between the two run boundaries.
    pub fn wall_time_from_bounds(&self) -> RunResult<f64> {
        let start = self.all_start()?;
        let finish = self.all_finish()?;
        Ok(finish.saturating_duration_since(start).as_secs_f64())
    }

    pub fn wall_time(&self) -> Option<f64> {
        self.wall_time.get().copied()
    }

    pub fn record_phase(&self, timing: PhaseTiming) {
        lock(&self.phases).push(timing);
    }

    pub fn total_requests(&self) -> u64 {
        self.total_requests.load(Ordering::Relaxed)
    }

    pub fn successes(&self) -> u64 {
        self.successes.load(Ordering::Relaxed)
    }

    pub fn failures(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }

    /// Copy of the recorded samples in insertion order.
    pub fn latencies(&self) -> Vec<f64> {
        lock(&self.latencies).clone()
    }

    /// Computes the end-of-run report. Call after all recording has stopped.
    pub fn report(&self) -> Report {
        let mut sorted = self.latencies();
        sorted.sort_by(f64::total_cmp);

        let total_requests = self.total_requests();
        let wall_time_secs = self.wall_time();
        let throughput = wall_time_secs
            .filter(|secs| *secs > 0.0)
            .map(|secs| total_requests as f64 / secs);

        let distribution = {
            let hist = lock(&self.histogram);
            (hist.len() > 0).then(|| LatencyDistribution {
                min_ms: hist.min() as f64 / 1000.0,
                p50_ms: hist.value_at_quantile(0.50) as f64 / 1000.0,
                p90_ms: hist.value_at_quantile(0.90) as f64 / 1000.0,
                p999_ms: hist.value_at_quantile(0.999) as f64 / 1000.0,
                max_ms: hist.max() as f64 / 1000.0,
            })
        };

        Report {
            total_requests,
            successes: self.successes(),
            failures: self.failures(),
            wall_time_secs,
            throughput,
            latency_samples: sorted.len(),
            mean_latency: mean(&sorted),
            median_latency: median(&sorted),
            p99_latency: percentile(&sorted, 0.99),
            p95_latency: percentile(&sorted, 0.95),
            distribution,
            phases: lock(&self.phases).clone(),
        }
    }
}

// =============================================================================
// Calculations
// =============================================================================

pub fn mean(samples: &[f64]) -> Option<f64> {
    if samples.is_empty() {
        return None;
    }
    Some(samples.iter().sum::<f64>() / samples.len() as f64)
}

/// Median over samples sorted ascending, using the compatibility formula
/// described in the module docs. With a single sample the successor index is
/// clamped, giving `x + x / 2`.
pub fn median(sorted: &[f64]) -> Option<f64> {
    let len = sorted.len();
    if len == 0 {
        return None;
    }

    if len % 2 == 0 {
        Some(sorted[len / 2])
    } else {
        let middle = sorted[len / 2];
        let successor = sorted[(len / 2 + 1).min(len - 1)];
        Some(middle + successor / 2.0)
    }
}

/// Nearest-rank percentile over samples sorted ascending: the element at
/// `floor(p × n)`, clamped to the last index.
pub fn percentile(sorted: &[f64], p: f64) -> Option<f64> {
    let len = sorted.len();
    if len == 0 {
        return None;
    }
    let index = ((p * len as f64).floor() as usize).min(len - 1);
    Some(sorted[index])
}

// =============================================================================
// Report
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LatencyDistribution {
    pub min_ms: f64,
    pub p50_ms: f64,
    pub p90_ms: f64,
    pub p999_ms: f64,
    pub max_ms: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Report {
    pub total_requests: u64,
    pub successes: u64,
    pub failures: u64,
    pub wall_time_secs: Option<f64>,
    pub throughput: Option<f64>,
    pub latency_samples: usize,
    pub mean_latency: Option<f64>,
    pub median_latency: Option<f64>,
    pub p99_latency: Option<f64>,
    pub p95_latency: Option<f64>,
    pub distribution: Option<LatencyDistribution>,
    pub phases: Vec<PhaseTiming>,
}

fn or_no_data(value: Option<f64>, unit: &str) -> String {
    match value {
        Some(v) => format!("{:.6}{}", v, unit),
        None => "no data".to_string(),
    }
}

impl Report {
    pub fn to_json(&self) -> Result<String, sonic_rs::Error> {
        sonic_rs::to_string(self)
    }

    pub fn render(&self) {
        info!("╔════════════════════════════════════════════════════════════╗");
        info!("║                      LOAD TEST SUMMARY                     ║");
        info!("╚════════════════════════════════════════════════════════════╝");

        info!("");
        info!("Requests:");
        info!("  Total sent:          {}", self.total_requests);
        info!("  Successful:          {}", self.successes);
        info!("  Unsuccessful:        {}", self.failures);

        info!("");
        info!("Timing:");
        info!("  Wall time:           {}", or_no_data(self.wall_time_secs, " s"));
        info!("  Throughput:          {}", or_no_data(self.throughput, " req/s"));
        for timing in &self.phases {
            info!(
                "  {:<9} {:>5} workers  {:.6} s",
                timing.phase.name(),
                timing.workers,
                timing.duration_secs
            );
        }

        info!("");
        info!("Latency (s, {} samples):", self.latency_samples);
        info!("  Median:              {}", or_no_data(self.median_latency, ""));
        info!("  Mean:                {}", or_no_data(self.mean_latency, ""));
        info!("  p99:                 {}", or_no_data(self.p99_latency, ""));
        info!("  p95:                 {}", or_no_data(self.p95_latency, ""));

        info!("");
        info!("Latency Distribution (ms):");
        match &self.distribution {
            Some(d) => {
                info!("  Min:    {:.3}", d.min_ms);
                info!("  p50:    {:.3}", d.p50_ms);
                info!("  p90:    {:.3}", d.p90_ms);
                info!("  p99.9:  {:.3}", d.p999_ms);
                info!("  Max:    {:.3}", d.max_ms);
            }
            None => info!("  No data"),
        }

        info!("");
        info!("═══════════════════════════════════════════════════════════");
    }
}
