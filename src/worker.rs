use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

use crate::config::RunConfig;
use crate::latch::LatchGuard;
use crate::phase::Phase;
use crate::sink::{RequestSink, STATUS_OK};
use crate::stats::RunStats;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RequestKind {
    Get,
    Post,
}

/// One simulated client: `iterations` rounds of one GET then one POST.
///
/// The worker releases its start guard before the first request and its
/// finish guard after the last one. Request failures never stop the loop.
pub struct Worker {
    id: usize,
    phase: Phase,
    config: Arc<RunConfig>,
    sink: Arc<dyn RequestSink>,
    stats: Arc<RunStats>,
    start: LatchGuard,
    finish: LatchGuard,
}

impl Worker {
    pub fn new(
        id: usize,
        phase: Phase,
        config: Arc<RunConfig>,
        sink: Arc<dyn RequestSink>,
        stats: Arc<RunStats>,
        start: LatchGuard,
        finish: LatchGuard,
    ) -> Self {
        Self {
            id,
            phase,
            config,
            sink,
            stats,
            start,
            finish,
        }
    }

    pub async fn run(self) {
        let Worker {
            id,
            phase,
            config,
            sink,
            stats,
            start,
            finish,
        } = self;

        start.release();
        debug!(worker_id = id, %phase, "Worker started");

        let requester = Requester {
            id,
            config: &config,
            sink: sink.as_ref(),
            stats: &stats,
        };
        for _ in 0..config.iterations {
            requester.issue(RequestKind::Get).await;
            requester.issue(RequestKind::Post).await;
        }

        debug!(worker_id = id, %phase, iterations = config.iterations, "Worker finished");
        finish.release();
    }
}

struct Requester<'a> {
    id: usize,
    config: &'a RunConfig,
    sink: &'a dyn RequestSink,
    stats: &'a RunStats,
}

impl Requester<'_> {
    /// Sends one request and records exactly one request, one outcome and
    /// one latency sample, whether it succeeded or not.
    async fn issue(&self, kind: RequestKind) {
        let started = Instant::now();
        let result = match kind {
            RequestKind::Get => self.sink.get(&self.config.get_url).await,
            RequestKind::Post => {
                self.sink
                    .post(&self.config.post_url, &self.config.payload)
                    .await
            }
        };
        let elapsed = started.elapsed().as_secs_f64();

        self.stats.record_latency(elapsed);
        self.stats.record_request();

        let success = match result {
            Ok(STATUS_OK) => true,
            Ok(status) => {
                debug!(worker_id = self.id, ?kind, status, "Unsuccessful response");
                false
            }
            Err(e) => {
                debug!(worker_id = self.id, ?kind, error = %e, "Request failed");
                false
            }
        };
        self.stats.record_outcome(success);
    }
}
