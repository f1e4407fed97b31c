//! Phase orchestrator.
//!
//! Runs the phases of [`Phase::ALL`] strictly one after another. Each phase
//! launches its workers, waits on a start barrier and then on a finish
//! barrier, and timestamps both releases. The start barrier separates "tasks
//! spawned" from "tasks executing", so the recorded start reflects load onset
//! rather than spawn overhead.

use futures_util::future::join_all;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::time::interval;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::RunConfig;
use crate::error::{RunError, RunResult};
use crate::latch::{BarrierKind, Latch};
use crate::phase::Phase;
use crate::sink::RequestSink;
use crate::stats::{PhaseTiming, Report, RunStats};
use crate::worker::Worker;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseState {
    NotStarted,
    Launching,
    AwaitingStart,
    Running,
    AwaitingFinish,
    Complete,
}

pub struct Orchestrator {
    config: Arc<RunConfig>,
    sink: Arc<dyn RequestSink>,
    stats: Arc<RunStats>,
    state_tx: watch::Sender<(Phase, PhaseState)>,
}

impl Orchestrator {
    pub fn new(config: Arc<RunConfig>, sink: Arc<dyn RequestSink>, stats: Arc<RunStats>) -> Self {
        let (state_tx, _) = watch::channel((Phase::first(), PhaseState::NotStarted));
        Self {
            config,
            sink,
            stats,
            state_tx,
        }
    }

    pub fn state_rx(&self) -> watch::Receiver<(Phase, PhaseState)> {
        self.state_tx.subscribe()
    }

    /// Runs every phase in order and returns the final report. A broken
    /// barrier aborts the run; no timestamp is recorded for that phase.
    pub async fn run(&self) -> RunResult<Report> {
        for phase in Phase::ALL {
            let timing = self.run_phase(phase).await?;
            self.stats.record_phase(timing);
        }
        Ok(self.stats.report())
    }

    fn transition(&self, phase: Phase, state: PhaseState) {
        debug!(%phase, ?state, "Phase state");
        self.state_tx.send_replace((phase, state));
    }

    async fn run_phase(&self, phase: Phase) -> RunResult<PhaseTiming> {
        self.transition(phase, PhaseState::Launching);

        let workers = phase.worker_count(self.config.max_concurrency);
        let start = Latch::new(BarrierKind::Start, workers);
        let finish = Latch::new(BarrierKind::Finish, workers);

        info!("{} phase: launching {} workers", phase, workers);
        let handles: Vec<JoinHandle<()>> = (0..workers)
            .map(|id| {
                let worker = Worker::new(
                    id,
                    phase,
                    Arc::clone(&self.config),
                    Arc::clone(&self.sink),
                    Arc::clone(&self.stats),
                    start.arm(),
                    finish.arm(),
                );
                tokio::spawn(worker.run())
            })
            .collect();
        debug!(%phase, pending = start.remaining(), "Workers spawned");

        self.transition(phase, PhaseState::AwaitingStart);
        if let Err(broken) = start.wait().await {
            abort_all(&handles);
            return Err(RunError::BarrierInterrupted {
                phase,
                barrier: broken.0,
            });
        }
        let started_at = Instant::now();
        if phase.is_first() {
            self.stats.set_all_start(started_at);
        }
        info!("{} phase: all {} workers are running", phase, workers);
        self.transition(phase, PhaseState::Running);

        self.transition(phase, PhaseState::AwaitingFinish);
        if let Err(broken) = finish.wait().await {
            abort_all(&handles);
            return Err(RunError::BarrierInterrupted {
                phase,
                barrier: broken.0,
            });
        }
        let finished_at = Instant::now();
        let duration_secs = finished_at
            .saturating_duration_since(started_at)
            .as_secs_f64();

        if phase.is_last() {
            self.stats.set_all_finish(finished_at);
            let wall_time = self.stats.wall_time_from_bounds()?;
            self.stats.set_wall_time(wall_time);
            info!(
                "{} phase complete: {:.6} seconds (run wall time {:.6} seconds)",
                phase, duration_secs, wall_time
            );
        } else {
            info!("{} phase complete: {:.6} seconds", phase, duration_secs);
        }

        // Every worker already released its finish guard, so these resolve promptly.
        for result in join_all(handles).await {
            if let Err(e) = result {
                warn!("{} phase: worker task ended abnormally after finishing: {}", phase, e);
            }
        }

        self.transition(phase, PhaseState::Complete);
        Ok(PhaseTiming {
            phase,
            workers,
            duration_secs,
        })
    }
}

/// Logs the current phase and request counters every `every` until the last
/// phase completes. Meant to be spawned next to [`Orchestrator::run`].
pub async fn report_progress(
    state: watch::Receiver<(Phase, PhaseState)>,
    stats: Arc<RunStats>,
    every: Duration,
) {
    let mut ticker = interval(every);
    ticker.tick().await;
    loop {
        ticker.tick().await;
        let (phase, phase_state) = *state.borrow();
        if phase.is_last() && phase_state == PhaseState::Complete {
            break;
        }
        info!(
            "{} phase ({:?}): requests={}, successes={}, failures={}",
            phase,
            phase_state,
            stats.total_requests(),
            stats.successes(),
            stats.failures()
        );
    }
}

fn abort_all(handles: &[JoinHandle<()>]) {
    for handle in handles {
        handle.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{test_config, PanickingSink, StubReply, StubSink};
    use std::time::Duration;
    use tokio::time::timeout;

    fn orchestrator(max_concurrency: usize, iterations: usize, sink: Arc<dyn RequestSink>) -> Orchestrator {
        Orchestrator::new(
            Arc::new(test_config(max_concurrency, iterations)),
            sink,
            Arc::new(RunStats::new()),
        )
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn single_phase_round_trip() {
        let orch = orchestrator(5, 2, Arc::new(StubSink::ok(Duration::from_millis(10))));

        let timing = orch.run_phase(Phase::Peak).await.unwrap();
        let stats = &orch.stats;

        // 5 workers × 2 iterations × (GET + POST)
        assert_eq!(timing.workers, 5);
        assert_eq!(stats.total_requests(), 20);
        assert_eq!(stats.successes(), 20);
        assert_eq!(stats.failures(), 0);
        assert_eq!(stats.latencies().len(), 20);
        for latency in stats.latencies() {
            assert!((0.010..0.250).contains(&latency), "latency {latency}");
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn full_run_keeps_counts_and_bounds_consistent() {
        let orch = orchestrator(20, 2, Arc::new(StubSink::ok(Duration::from_millis(1))));
        let report = orch.run().await.unwrap();
        let stats = &orch.stats;

        let workers: Vec<usize> = report.phases.iter().map(|t| t.workers).collect();
        assert_eq!(workers, vec![2, 10, 20, 5]);

        assert_eq!(report.total_requests, 37 * 2 * 2);
        assert_eq!(report.successes + report.failures, report.total_requests);
        assert_eq!(report.latency_samples as u64, report.total_requests);

        let start = stats.all_start().unwrap();
        let finish = stats.all_finish().unwrap();
        assert!(finish >= start);
        let wall = report.wall_time_secs.unwrap();
        assert_eq!(wall, finish.duration_since(start).as_secs_f64());
        let longest_phase = report
            .phases
            .iter()
            .map(|t| t.duration_secs)
            .fold(0.0, f64::max);
        assert!(wall >= longest_phase);
        assert!(report.throughput.unwrap() > 0.0);
    }

    #[tokio::test]
    async fn empty_phases_complete_without_blocking() {
        let orch = orchestrator(1, 3, Arc::new(StubSink::ok(Duration::ZERO)));
        let report = timeout(Duration::from_secs(5), orch.run())
            .await
            .expect("run must not block on empty phases")
            .unwrap();

        let workers: Vec<usize> = report.phases.iter().map(|t| t.workers).collect();
        assert_eq!(workers, vec![0, 0, 1, 0]);
        assert_eq!(report.total_requests, 6);
        assert!(report.wall_time_secs.is_some());
    }

    #[tokio::test]
    async fn zero_concurrency_reports_no_latency_data() {
        let orch = orchestrator(0, 10, Arc::new(StubSink::ok(Duration::ZERO)));
        let report = orch.run().await.unwrap();

        assert_eq!(report.total_requests, 0);
        assert_eq!(report.median_latency, None);
        assert_eq!(report.p99_latency, None);
        assert!(report.distribution.is_none());
    }

    #[tokio::test]
    async fn failed_requests_are_reported_not_fatal() {
        let sink = StubSink::with_replies(
            Duration::ZERO,
            StubReply::Status(404),
            StubReply::Transport,
        );
        let orch = orchestrator(4, 5, Arc::new(sink));
        let report = orch.run().await.unwrap();

        // Warmup 0, Loading 2, Peak 4, Cooldown 1.
        assert_eq!(report.total_requests, 7 * 5 * 2);
        assert_eq!(report.failures, report.total_requests);
        assert_eq!(report.successes, 0);
    }

    #[tokio::test]
    async fn dead_worker_aborts_the_run() {
        let orch = orchestrator(10, 1, Arc::new(PanickingSink));
        let err = timeout(Duration::from_secs(5), orch.run())
            .await
            .expect("broken barrier must not hang the run")
            .unwrap_err();

        assert!(matches!(
            err,
            RunError::BarrierInterrupted {
                phase: Phase::Warmup,
                barrier: BarrierKind::Finish,
            }
        ));
        assert!(orch.stats.all_finish().is_err());
        assert_eq!(orch.stats.wall_time(), None);
    }

    #[tokio::test]
    async fn progress_reporter_stops_after_last_phase() {
        let orch = orchestrator(4, 1, Arc::new(StubSink::ok(Duration::ZERO)));
        let progress = tokio::spawn(report_progress(
            orch.state_rx(),
            Arc::clone(&orch.stats),
            Duration::from_millis(5),
        ));

        orch.run().await.unwrap();
        timeout(Duration::from_secs(1), progress)
            .await
            .expect("reporter should exit once the run is complete")
            .unwrap();
    }

    #[tokio::test]
    async fn state_ends_complete_after_last_phase() {
        let orch = orchestrator(4, 1, Arc::new(StubSink::ok(Duration::ZERO)));
        let rx = orch.state_rx();
        assert_eq!(*rx.borrow(), (Phase::Warmup, PhaseState::NotStarted));

        orch.run().await.unwrap();
        assert_eq!(*rx.borrow(), (Phase::Cooldown, PhaseState::Complete));
    }
}
