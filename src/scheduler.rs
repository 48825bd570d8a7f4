//! Background jobs: intraday quote refresh, the closing portfolio snapshot
//! and the evening NAV reconciliation.
//!
//! Each job lives on its own task and awaits its run before waiting for the
//! next one, so runs of the same job never overlap.

use crate::core::config::SchedulerConfig;
use crate::core::error::Result;
use crate::core::market::{is_trading_hours, next_daily_run};
use crate::monitor::Monitor;
use chrono::NaiveTime;
use std::fmt::Debug;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::{JoinError, JoinHandle};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

pub struct Scheduler {
    shutdown: watch::Sender<bool>,
    handles: Vec<JoinHandle<()>>,
}

impl Scheduler {
    pub fn start(monitor: Arc<Monitor>, config: &SchedulerConfig) -> Self {
        let (shutdown, _) = watch::channel(false);

        let handles = vec![
            tokio::spawn(quote_loop(
                monitor.clone(),
                config.quote_refresh_interval(),
                shutdown.subscribe(),
            )),
            tokio::spawn(daily_loop(
                "portfolio snapshot",
                monitor.clone(),
                config.snapshot_time,
                shutdown.subscribe(),
                |monitor: Arc<Monitor>| async move {
                    let now = monitor.now();
                    monitor.snapshot_portfolios_at(now).await
                },
            )),
            tokio::spawn(daily_loop(
                "NAV reconciliation",
                monitor,
                config.nav_reconcile_time,
                shutdown.subscribe(),
                |monitor: Arc<Monitor>| async move { monitor.reconcile_navs().await },
            )),
        ];

        info!(
            "Scheduler started: quotes every {}s, snapshot at {}, NAV reconciliation at {}",
            config.quote_refresh_interval().as_secs(),
            config.snapshot_time.format("%H:%M"),
            config.nav_reconcile_time.format("%H:%M")
        );
        Scheduler { shutdown, handles }
    }

    /// Signals every loop to stop and waits for them. A job run in progress
    /// is aborted at its next await point and has finished by the time this
    /// returns, so it writes nothing afterwards.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        for handle in self.handles {
            if let Err(e) = handle.await {
                error!("Scheduler task ended abnormally: {e}");
            }
        }
        info!("Scheduler stopped");
    }
}

async fn quote_loop(monitor: Arc<Monitor>, period: Duration, mut shutdown: watch::Receiver<bool>) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = interval.tick() => {
                if !is_trading_hours(&monitor.now(), monitor.sessions()) {
                    continue;
                }
                let job_monitor = monitor.clone();
                let job = async move {
                    let now = job_monitor.now();
                    job_monitor.refresh_quotes_at(now).await
                };
                if !run_job("quote refresh", job, &mut shutdown).await {
                    break;
                }
            }
        }
    }
    debug!("Quote refresh loop stopped");
}

async fn daily_loop<F, Fut, T>(
    name: &'static str,
    monitor: Arc<Monitor>,
    at: NaiveTime,
    mut shutdown: watch::Receiver<bool>,
    job: F,
) where
    F: Fn(Arc<Monitor>) -> Fut,
    Fut: Future<Output = Result<T>> + Send + 'static,
    T: Debug + Send + 'static,
{
    loop {
        let now = monitor.now();
        let next = next_daily_run(now, at);
        let wait = (next - now).to_std().unwrap_or(Duration::ZERO);
        debug!("Next {name} at {next}");

        tokio::select! {
            _ = shutdown.changed() => break,
            _ = tokio::time::sleep(wait) => {
                if !run_job(name, job(monitor.clone()), &mut shutdown).await {
                    break;
                }
            }
        }
    }
    debug!("{name} loop stopped");
}

/// Runs one job on its own task so a panic stays contained to that run.
///
/// Returns `false` when shutdown was signalled before the run finished. The
/// run is then aborted and awaited before returning.
async fn run_job<Fut, T>(
    name: &'static str,
    job: Fut,
    shutdown: &mut watch::Receiver<bool>,
) -> bool
where
    Fut: Future<Output = Result<T>> + Send + 'static,
    T: Debug + Send + 'static,
{
    let mut run = tokio::spawn(job);
    tokio::select! {
        outcome = &mut run => {
            log_outcome(name, outcome);
            true
        }
        _ = shutdown.changed() => {
            run.abort();
            log_outcome(name, run.await);
            false
        }
    }
}

fn log_outcome<T: Debug>(name: &str, outcome: std::result::Result<Result<T>, JoinError>) {
    match outcome {
        Ok(Ok(report)) => debug!("{name} finished: {report:?}"),
        Ok(Err(e)) => error!("{name} failed: {e:#}"),
        Err(e) if e.is_panic() => error!("{name} panicked: {e}"),
        Err(_) => info!("{name} aborted by shutdown"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitor::testing::*;

    fn fast_config() -> SchedulerConfig {
        SchedulerConfig {
            quote_refresh_secs: 30,
            ..Default::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_refreshes_quotes_during_session() {
        let env = TestEnv::new();
        env.track_fund("161725", Some(1.0), vec![holding("600519", 0.5)]);
        env.market.set_quote("600519", 1800.0, 2.0);

        let scheduler = Scheduler::start(env.monitor.clone(), &fast_config());
        tokio::time::sleep(Duration::from_secs(65)).await;
        scheduler.shutdown().await;

        assert!(env.market.quote_calls() >= 2);
        let series = env.monitor.intraday("161725").unwrap();
        assert!(!series.points.is_empty());
        assert_eq!(series.points[0].est_nav, 1.01);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_quote_refresh_outside_session() {
        let env = TestEnv::at(2026, 2, 18, 12, 0);
        env.track_fund("161725", Some(1.0), vec![holding("600519", 0.5)]);

        let scheduler = Scheduler::start(env.monitor.clone(), &fast_config());
        tokio::time::sleep(Duration::from_secs(120)).await;
        scheduler.shutdown().await;

        assert_eq!(env.market.quote_calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_snapshot_runs_at_configured_time() {
        // 15:20, ten minutes before the snapshot
        let env = TestEnv::at(2026, 2, 18, 15, 20);
        env.track_fund("161725", Some(1.0), vec![holding("600519", 0.5)]);
        let portfolio = env.monitor.create_portfolio("Core").unwrap();
        env.monitor
            .add_position(portfolio.id, "161725", 100.0, 1.0)
            .unwrap();

        let scheduler = Scheduler::start(env.monitor.clone(), &SchedulerConfig::default());
        tokio::time::sleep(Duration::from_secs(11 * 60)).await;
        scheduler.shutdown().await;

        let snapshots = env
            .store
            .portfolio_snapshots_since(portfolio.id, date(2026, 2, 18))
            .unwrap();
        assert_eq!(snapshots.len(), 1);
        assert_eq!(snapshots[0].total_value, 100.0);
        assert_eq!(snapshots[0].total_cost, 100.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_job_panic_does_not_stop_caller() {
        let (_tx, mut shutdown) = watch::channel(false);
        let finished = run_job(
            "boom",
            async {
                if true {
                    panic!("job exploded");
                }
                Ok::<_, crate::core::MonitorError>(())
            },
            &mut shutdown,
        )
        .await;
        assert!(finished);

        let finished = run_job(
            "failing",
            async { Err::<(), _>(crate::core::MonitorError::Unavailable("eastmoney".into())) },
            &mut shutdown,
        )
        .await;
        assert!(finished);
    }

    #[tokio::test(start_paused = true)]
    async fn test_quote_loop_continues_after_failed_run() {
        let env = TestEnv::new();
        env.track_fund("161725", Some(1.0), vec![holding("600519", 0.5)]);
        env.market.set_quote("600519", 1800.0, 2.0);
        env.market.fail_next_quote_fetch();

        let scheduler = Scheduler::start(env.monitor.clone(), &fast_config());
        tokio::time::sleep(Duration::from_secs(45)).await;
        scheduler.shutdown().await;

        // The first tick panicked inside the provider, the second one recorded
        assert_eq!(env.market.quote_calls(), 2);
        let series = env.monitor.intraday("161725").unwrap();
        assert_eq!(series.points.len(), 1);
        assert_eq!(series.points[0].est_nav, 1.01);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_aborts_run_in_progress() {
        let env = TestEnv::new();
        env.track_fund("161725", Some(1.0), vec![holding("600519", 0.5)]);
        env.market.set_quote("600519", 1800.0, 2.0);
        env.market.set_quote_delay(Duration::from_secs(20));

        let scheduler = Scheduler::start(env.monitor.clone(), &fast_config());
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(env.market.quote_calls(), 1);
        scheduler.shutdown().await;

        // Long after the slow fetch would have answered
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert!(env.monitor.intraday("161725").unwrap().points.is_empty());
        assert_eq!(env.market.quote_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_is_prompt() {
        let env = TestEnv::new();
        let scheduler = Scheduler::start(env.monitor.clone(), &fast_config());
        scheduler.shutdown().await;
        assert!(env.market.quote_calls() <= 1);
    }
}
