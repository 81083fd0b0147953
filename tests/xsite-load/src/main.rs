//! Cross-site consistency check for Keycloak Rust
//!
//! Runs two sites against one remote tier and verifies that:
//! - sessions written on one site are readable from the other
//! - a removed session is never served by the tier again, from any site
//! - local caches drop removed sessions within the grace period

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use clap::{Parser, ValueEnum};
use hdrhistogram::Histogram;
use indicatif::{ProgressBar, ProgressStyle};
use kc_cache::{InMemoryTierRegistry, RemoteConnector};
use kc_cache_redis::{RedisConfig, RedisConnector};
use kc_cache_xsite::fixture::{sample_session, session_ids};
use kc_cache_xsite::{
    CacheManager, ConsistencyChecker, RemoveWorker, SiteCoordinator, WorkerReport, XSiteConfig,
    XSiteError,
};
use kc_session::UserSessionWrapper;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Remote tier used by both sites
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Backend {
    /// In-process tier with simulated event delay
    Memory,
    /// Shared Redis server
    Redis,
}

/// Cross-site session cache consistency check
#[derive(Parser, Debug)]
#[command(name = "xsite-check")]
#[command(about = "Checks cross-site session removal consistency")]
struct Args {
    /// Remote tier backend
    #[arg(short, long, value_enum, default_value = "memory")]
    backend: Backend,

    /// Redis URL (redis backend only)
    #[arg(long, default_value = "redis://127.0.0.1:6379")]
    redis_url: String,

    /// Number of sessions to create and remove
    #[arg(short, long)]
    iterations: Option<usize>,

    /// Event delivery delay of the memory backend
    #[arg(long)]
    propagation_delay_ms: Option<u64>,

    /// How long local caches get to converge
    #[arg(long)]
    grace_ms: Option<u64>,

    /// Remove from both sites at once, on disjoint key sets
    #[arg(short, long)]
    concurrent: bool,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    fn apply(&self, mut config: XSiteConfig) -> anyhow::Result<XSiteConfig> {
        if let Some(iterations) = self.iterations {
            config = config.with_iterations(iterations);
        }
        if let Some(delay) = self.propagation_delay_ms {
            config = config.with_propagation_delay_ms(delay);
        }
        if let Some(grace) = self.grace_ms {
            config = config.with_grace_period_ms(grace);
        }
        config.validate()?;
        Ok(config)
    }
}

struct Sites {
    dc1: CacheManager<UserSessionWrapper>,
    dc2: CacheManager<UserSessionWrapper>,
    site1: Arc<SiteCoordinator<UserSessionWrapper>>,
    site2: Arc<SiteCoordinator<UserSessionWrapper>>,
}

impl Sites {
    async fn start(
        connector: Arc<dyn RemoteConnector<UserSessionWrapper>>,
        cache_name: &str,
    ) -> anyhow::Result<Self> {
        let dc1 = CacheManager::create("dc1", Arc::clone(&connector));
        let dc2 = CacheManager::create("dc2", connector);
        let site1 = dc1.coordinator(cache_name).await?;
        let site2 = dc2.coordinator(cache_name).await?;
        Ok(Self {
            dc1,
            dc2,
            site1,
            site2,
        })
    }

    async fn stop(&self) -> anyhow::Result<()> {
        self.dc1.stop().await?;
        self.dc2.stop().await?;
        Ok(())
    }

    /// Reports `err`, stops both sites and hands `err` back. A shutdown
    /// error is only logged so the failure that ended the run is the one
    /// returned.
    async fn fail(&self, err: anyhow::Error) -> anyhow::Error {
        if let Some(xsite) = err.downcast_ref::<XSiteError>() {
            report_violation(xsite);
        }
        if let Err(stop_err) = self.stop().await {
            tracing::warn!(error = %stop_err, "shutdown after failed run did not complete");
        }
        err
    }
}

fn connector(
    args: &Args,
    config: &XSiteConfig,
) -> anyhow::Result<Arc<dyn RemoteConnector<UserSessionWrapper>>> {
    match args.backend {
        Backend::Memory => Ok(Arc::new(InMemoryTierRegistry::<UserSessionWrapper>::new(
            config.tier_options(),
        ))),
        Backend::Redis => {
            let redis = RedisConfig::from_url(&args.redis_url)
                .with_context(|| format!("invalid Redis URL: {}", args.redis_url))?
                .drain_timeout_ms(config.drain_timeout_ms);
            Ok(Arc::new(RedisConnector::new(redis)))
        }
    }
}

fn progress(len: u64, label: &'static str) -> anyhow::Result<ProgressBar> {
    let pb = ProgressBar::new(len);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} {msg:10} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({per_sec})")?
            .progress_chars("#>-"),
    );
    pb.set_message(label);
    Ok(pb)
}

/// Scenario 1: write every session on dc1 and read it back through dc2.
async fn create_sessions(sites: &Sites, keys: &[String]) -> anyhow::Result<()> {
    let steps = u64::try_from(keys.len() * 2).unwrap_or(u64::MAX);
    let pb = progress(steps, "create")?;
    for key in keys {
        sites.site1.local().put(key, sample_session(key)).await?;
        pb.inc(1);
    }
    tracing::info!(sessions = keys.len(), "sessions created");

    let checker = ConsistencyChecker::new("loader");
    for key in keys {
        checker
            .expect_remote_present(sites.site2.remote().as_ref(), key)
            .await?;
        pb.inc(1);
    }
    pb.finish_with_message("created");
    tracing::info!(site = %sites.site2.site(), "sessions available");
    Ok(())
}

/// Scenarios 2 and 4: remove and verify, from one site or from both.
async fn remove_sessions(
    sites: &Sites,
    keys: &[String],
    concurrent: bool,
) -> anyhow::Result<Vec<WorkerReport>> {
    let remote1 = Arc::clone(sites.site1.remote());
    let remote2 = Arc::clone(sites.site2.remote());

    if !concurrent {
        let worker = RemoveWorker::new(remote1, remote2);
        return Ok(vec![worker.run(keys).await?]);
    }

    let (even, odd) = split_alternating(keys);
    let worker1 = RemoveWorker::new(Arc::clone(&remote1), Arc::clone(&remote2));
    let worker2 = RemoveWorker::new(remote2, remote1);
    let first = tokio::spawn(async move { worker1.run(&even).await });
    let second = tokio::spawn(async move { worker2.run(&odd).await });

    let report1 = first.await.context("dc1 remove worker panicked")??;
    let report2 = second.await.context("dc2 remove worker panicked")??;
    Ok(vec![report1, report2])
}

/// Splits keys into those at even and at odd positions.
fn split_alternating(keys: &[String]) -> (Vec<String>, Vec<String>) {
    let mut even = Vec::with_capacity(keys.len() / 2 + 1);
    let mut odd = Vec::with_capacity(keys.len() / 2);
    for (i, key) in keys.iter().enumerate() {
        if i % 2 == 0 {
            even.push(key.clone());
        } else {
            odd.push(key.clone());
        }
    }
    (even, odd)
}

/// Scenario 3: every local cache drops the removed sessions in time.
async fn await_convergence(
    sites: &Sites,
    keys: &[String],
    config: &XSiteConfig,
) -> Result<(), XSiteError> {
    let checker = ConsistencyChecker::new("convergence");
    for site in [&sites.site1, &sites.site2] {
        checker
            .await_local_convergence(site.local(), keys, config.grace_period(), config.poll_interval())
            .await?;
    }
    Ok(())
}

#[allow(clippy::cast_precision_loss)]
fn print_report(reports: &[WorkerReport], sites: &Sites) -> anyhow::Result<()> {
    let mut histogram = Histogram::<u64>::new(3)?;
    for report in reports {
        for latency in &report.latencies {
            histogram.record(u64::try_from(latency.as_micros()).unwrap_or(u64::MAX))?;
        }
    }

    println!("\n═══════════════════════════════════════════════════════════════");
    println!("                  CROSS-SITE CHECK RESULTS");
    println!("═══════════════════════════════════════════════════════════════\n");

    for report in reports {
        println!(
            "  {:<12} removed {} in {:.2}s ({:.0}/s)",
            report.worker,
            report.removed,
            report.elapsed.as_secs_f64(),
            report.throughput()
        );
    }

    println!("\nRemove + verify latency (milliseconds):");
    println!("  Min:                 {:.2}ms", histogram.min() as f64 / 1000.0);
    println!("  Mean:                {:.2}ms", histogram.mean() / 1000.0);
    println!("  p50 (median):        {:.2}ms", histogram.value_at_quantile(0.50) as f64 / 1000.0);
    println!("  p99:                 {:.2}ms", histogram.value_at_quantile(0.99) as f64 / 1000.0);
    println!("  Max:                 {:.2}ms", histogram.max() as f64 / 1000.0);

    println!("\nListener events:");
    for site in [&sites.site1, &sites.site2] {
        let stats = site.stats().snapshot();
        println!(
            "  {:<4} created {} modified {} removed {} (local removals {}, evictions {})",
            site.site(),
            stats.created,
            stats.modified,
            stats.removed,
            stats.local_removals,
            stats.local_evictions
        );
    }
    println!("\n═══════════════════════════════════════════════════════════════\n");
    Ok(())
}

fn report_violation(err: &XSiteError) {
    tracing::error!(error = %err, "cross-site check failed");
    eprintln!("\n✗ FAIL: {err}");
    if let XSiteError::ConvergenceTimeout { remaining, .. } = err {
        let sample: Vec<&str> = remaining.iter().take(10).map(String::as_str).collect();
        eprintln!("  first stragglers: {}", sample.join(", "));
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let default_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| default_level.into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = args.apply(XSiteConfig::from_env()?)?;

    println!("Keycloak Rust Cross-Site Check");
    println!("═══════════════════════════════════════════════════════════════");
    println!("  Backend:         {:?}", args.backend);
    println!("  Cache:           {}", config.cache_name);
    println!("  Sessions:        {}", config.iterations);
    println!("  Concurrent:      {}", args.concurrent);
    println!("  Grace period:    {}ms", config.grace_period_ms);
    println!("═══════════════════════════════════════════════════════════════\n");

    let sites = Sites::start(connector(&args, &config)?, &config.cache_name).await?;
    let keys = session_ids(config.iterations);

    if let Err(err) = create_sessions(&sites, &keys).await {
        return Err(sites.fail(err).await);
    }

    let spinner = ProgressBar::new_spinner();
    spinner.set_message("removing sessions");
    spinner.enable_steady_tick(Duration::from_millis(100));
    let removed = remove_sessions(&sites, &keys, args.concurrent).await;
    spinner.finish_and_clear();

    let outcome = match removed {
        Ok(reports) => await_convergence(&sites, &keys, &config)
            .await
            .map(|()| reports)
            .map_err(anyhow::Error::from),
        Err(err) => Err(err),
    };

    let reports = match outcome {
        Ok(reports) => reports,
        Err(err) => {
            let err = sites.fail(err).await;
            bail!("cross-site check failed: {err}");
        }
    };

    print_report(&reports, &sites)?;
    sites.stop().await?;
    println!("✓ PASS: {} sessions removed consistently", keys.len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use kc_cache::{
        CacheEntryListener, CacheError, CacheResult, ListenerId, RemoteCache, SiteId, TierOptions,
    };
    use uuid::Uuid;

    use super::*;

    /// Handle whose close always fails.
    struct StuckOnClose(Arc<dyn RemoteCache<UserSessionWrapper>>);

    #[async_trait]
    impl RemoteCache<UserSessionWrapper> for StuckOnClose {
        fn name(&self) -> &str {
            self.0.name()
        }

        fn site(&self) -> &SiteId {
            self.0.site()
        }

        async fn put(&self, key: &str, value: UserSessionWrapper) -> CacheResult<()> {
            self.0.put(key, value).await
        }

        async fn get(&self, key: &str) -> CacheResult<Option<UserSessionWrapper>> {
            self.0.get(key).await
        }

        async fn remove(&self, key: &str) -> CacheResult<()> {
            self.0.remove(key).await
        }

        async fn replace_if_version(
            &self,
            key: &str,
            expected: Uuid,
            value: UserSessionWrapper,
        ) -> CacheResult<bool> {
            self.0.replace_if_version(key, expected, value).await
        }

        async fn add_listener(&self, listener: Arc<dyn CacheEntryListener>) -> CacheResult<ListenerId> {
            self.0.add_listener(listener).await
        }

        async fn remove_listener(&self, id: ListenerId) -> CacheResult<()> {
            self.0.remove_listener(id).await
        }

        async fn close(&self) -> CacheResult<()> {
            self.0.close().await?;
            Err(CacheError::Connection("connection reset during close".to_string()))
        }
    }

    struct StuckConnector(InMemoryTierRegistry<UserSessionWrapper>);

    #[async_trait]
    impl RemoteConnector<UserSessionWrapper> for StuckConnector {
        async fn connect(
            &self,
            site: &SiteId,
            cache_name: &str,
        ) -> CacheResult<Arc<dyn RemoteCache<UserSessionWrapper>>> {
            let inner = self.0.connect(site, cache_name).await?;
            Ok(Arc::new(StuckOnClose(inner)))
        }
    }

    #[tokio::test]
    async fn failed_run_returns_its_own_error_when_shutdown_fails_too() {
        let connector = Arc::new(StuckConnector(InMemoryTierRegistry::new(TierOptions::default())));
        let sites = Sites::start(connector, "sessions").await.unwrap();
        assert!(sites.stop().await.is_err());

        let sites = Sites::start(
            Arc::new(StuckConnector(InMemoryTierRegistry::new(TierOptions::default()))),
            "sessions",
        )
        .await
        .unwrap();
        let err = sites.fail(anyhow::anyhow!("session 7 missing on dc2")).await;

        assert_eq!(err.to_string(), "session 7 missing on dc2");
    }

    #[test]
    fn alternating_split_is_disjoint_and_complete() {
        let keys = session_ids(5);
        let (even, odd) = split_alternating(&keys);
        assert_eq!(even, vec!["0", "2", "4"]);
        assert_eq!(odd, vec!["1", "3"]);
    }

    #[test]
    fn flags_override_configuration() {
        let args = Args::parse_from([
            "xsite-check",
            "--iterations",
            "100",
            "--grace-ms",
            "250",
            "--concurrent",
        ]);
        let config = args.apply(XSiteConfig::default()).unwrap();

        assert_eq!(args.backend, Backend::Memory);
        assert!(args.concurrent);
        assert_eq!(config.iterations, 100);
        assert_eq!(config.grace_period_ms, 250);
        assert_eq!(config.propagation_delay_ms, 5);
    }

    #[test]
    fn zero_iterations_are_rejected() {
        let args = Args::parse_from(["xsite-check", "--iterations", "0"]);
        assert!(args.apply(XSiteConfig::default()).is_err());
    }
}
