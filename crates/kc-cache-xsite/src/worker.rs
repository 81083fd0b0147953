//! Remove workers driving one site's share of a validation run.

use std::sync::Arc;
use std::time::Duration;

use kc_cache::{CacheEntity, RemoteCache, SiteId};
use tokio::time::Instant;

use crate::checker::ConsistencyChecker;
use crate::error::XSiteResult;

/// Outcome of a completed [`RemoveWorker::run`].
#[derive(Debug, Clone)]
pub struct WorkerReport {
    /// Worker name.
    pub worker: String,
    /// Site the removes were issued on.
    pub site: SiteId,
    /// Keys removed and verified.
    pub removed: usize,
    /// Wall time of the whole run.
    pub elapsed: Duration,
    /// Remove plus verification time, per key in run order.
    pub latencies: Vec<Duration>,
}

impl WorkerReport {
    /// Slowest remove and verify cycle.
    #[must_use]
    pub fn max_latency(&self) -> Option<Duration> {
        self.latencies.iter().max().copied()
    }

    /// Removes per second over the whole run.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn throughput(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.removed as f64 / secs
        } else {
            0.0
        }
    }
}

/// Removes keys through its own site and checks both sites right away.
pub struct RemoveWorker<V: CacheEntity> {
    own: Arc<dyn RemoteCache<V>>,
    peer: Arc<dyn RemoteCache<V>>,
    checker: ConsistencyChecker,
}

impl<V: CacheEntity> RemoveWorker<V> {
    /// Creates a worker removing through `own` and verifying through `peer`.
    ///
    /// The worker is named after its site, e.g. `dc1-worker`.
    #[must_use]
    pub fn new(own: Arc<dyn RemoteCache<V>>, peer: Arc<dyn RemoteCache<V>>) -> Self {
        let checker = ConsistencyChecker::new(format!("{}-worker", own.site()));
        Self { own, peer, checker }
    }

    /// Name used in reports and violations.
    #[must_use]
    pub fn name(&self) -> &str {
        self.checker.worker()
    }

    /// Removes each key in order and verifies it is gone from both sites.
    ///
    /// ## Errors
    ///
    /// Stops at the first consistency violation or transport error.
    pub async fn run(&self, keys: &[String]) -> XSiteResult<WorkerReport> {
        let origin = self.own.site().clone();
        tracing::info!(worker = %self.name(), site = %origin, keys = keys.len(), "remove worker started");

        let started = Instant::now();
        let mut latencies = Vec::with_capacity(keys.len());
        for key in keys {
            let cycle = Instant::now();
            self.own.remove(key).await?;
            self.checker
                .expect_remote_absent(self.peer.as_ref(), &origin, key)
                .await?;
            self.checker
                .expect_remote_absent(self.own.as_ref(), &origin, key)
                .await?;
            latencies.push(cycle.elapsed());
        }

        let report = WorkerReport {
            worker: self.name().to_string(),
            site: origin,
            removed: keys.len(),
            elapsed: started.elapsed(),
            latencies,
        };
        tracing::info!(
            worker = %report.worker,
            removed = report.removed,
            elapsed = ?report.elapsed,
            "remove worker finished"
        );
        Ok(report)
    }
}
