//! Poll Scheduler
//!
//! Owns named poll tasks, each refreshing its own sources on its own
//! cadence into the aggregator's merge point. Every source keeps its own due
//! time, so a failing source backs off alone while the rest of its task
//! stays on cadence. All timers die with the handle.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info};

use super::FeedAggregator;
use crate::model::SourceKind;

#[derive(Debug, Clone, PartialEq)]
pub struct PollTask {
    pub name: String,
    pub sources: Vec<SourceKind>,
    pub interval: Duration,
}

impl PollTask {
    pub fn new(name: impl Into<String>, sources: &[SourceKind], interval: Duration) -> Self {
        Self { name: name.into(), sources: sources.to_vec(), interval }
    }
}

pub struct PollScheduler {
    tasks: Vec<PollTask>,
}

impl PollScheduler {
    pub fn new(tasks: Vec<PollTask>) -> Self {
        Self { tasks }
    }

    /// Default dashboard cadence: positions and aggregates every 30s, the
    /// incident feed every 10s.
    pub fn with_intervals(positions: Duration, incident_feed: Duration) -> Self {
        Self::new(vec![
            PollTask::new(
                "positions",
                &[
                    SourceKind::Patrols,
                    SourceKind::RiskZones,
                    SourceKind::CheckIns,
                    SourceKind::IncidentStats,
                ],
                positions,
            ),
            PollTask::new("incident_feed", &[SourceKind::Incidents], incident_feed),
        ])
    }

    pub fn tasks(&self) -> &[PollTask] {
        &self.tasks
    }

    /// Spawn one loop per task. The first refresh of every task runs
    /// immediately.
    pub fn start(&self, aggregator: Arc<FeedAggregator>) -> SchedulerHandle {
        let (shutdown, shutdown_rx) = watch::channel(false);
        let tasks = self
            .tasks
            .iter()
            .cloned()
            .map(|task| tokio::spawn(run_task(task, aggregator.clone(), shutdown_rx.clone())))
            .collect();
        SchedulerHandle { shutdown, tasks }
    }
}

impl Default for PollScheduler {
    fn default() -> Self {
        Self::with_intervals(Duration::from_secs(30), Duration::from_secs(10))
    }
}

async fn run_task(task: PollTask, aggregator: Arc<FeedAggregator>, mut shutdown: watch::Receiver<bool>) {
    info!(task = %task.name, interval_ms = task.interval.as_millis() as u64, "Poll task started");
    let start = Instant::now();
    let mut next_due: HashMap<SourceKind, Instant> = task.sources.iter().map(|s| (*s, start)).collect();
    loop {
        if *shutdown.borrow() {
            break;
        }
        let now = Instant::now();
        let due: Vec<SourceKind> = task
            .sources
            .iter()
            .copied()
            .filter(|s| next_due.get(s).map_or(true, |at| *at <= now))
            .collect();

        if !due.is_empty() {
            tokio::select! {
                _ = shutdown.changed() => break,
                snapshot = aggregator.refresh_sources(&due) => {
                    debug!(task = %task.name, sources = due.len(), version = snapshot.version, "Poll cycle merged");
                }
            }
            let finished = Instant::now();
            for source in due {
                let delay = aggregator.next_interval(source, task.interval).await;
                if delay > task.interval {
                    debug!(task = %task.name, source = %source, delay_ms = delay.as_millis() as u64, "Source polling degraded by backoff");
                }
                next_due.insert(source, finished + delay);
            }
        }

        let wake = next_due.values().min().copied().unwrap_or_else(|| Instant::now() + task.interval);
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = sleep_until(wake) => {}
        }
    }
    info!(task = %task.name, "Poll task stopped");
}

/// Running poll tasks. `stop` ends them cooperatively; dropping the handle
/// aborts whatever is still running.
pub struct SchedulerHandle {
    shutdown: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl SchedulerHandle {
    pub async fn stop(mut self) {
        let _ = self.shutdown.send(true);
        for task in self.tasks.drain(..) {
            let _ = task.await;
        }
    }

    pub fn is_running(&self) -> bool {
        self.tasks.iter().any(|t| !t.is_finished())
    }
}

impl Drop for SchedulerHandle {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{SyncError, SyncResult};
    use crate::feeds::{AggregatorConfig, DashboardApi};
    use crate::state::ViewStateStore;
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::sync::Mutex;
    use tokio::time::sleep;

    #[derive(Default)]
    struct CountingApi {
        calls: Mutex<HashMap<SourceKind, usize>>,
        failing: Vec<SourceKind>,
    }

    impl CountingApi {
        fn calls(&self, source: SourceKind) -> usize {
            self.calls.lock().unwrap().get(&source).copied().unwrap_or(0)
        }
    }

    #[async_trait]
    impl DashboardApi for CountingApi {
        async fn fetch(&self, source: SourceKind) -> SyncResult<Value> {
            *self.calls.lock().unwrap().entry(source).or_insert(0) += 1;
            if self.failing.contains(&source) {
                return Err(SyncError::Transport("connection refused".into()));
            }
            Ok(match source {
                SourceKind::IncidentStats => json!({ "total": 0 }),
                _ => json!([]),
            })
        }
    }

    fn aggregator(api: Arc<CountingApi>) -> Arc<FeedAggregator> {
        Arc::new(FeedAggregator::new(
            api,
            Arc::new(ViewStateStore::default()),
            AggregatorConfig::default(),
        ))
    }

    #[tokio::test(start_paused = true)]
    async fn tasks_poll_on_their_own_cadence() {
        let api = Arc::new(CountingApi::default());
        let scheduler = PollScheduler::with_intervals(Duration::from_secs(30), Duration::from_secs(10));
        let handle = scheduler.start(aggregator(api.clone()));

        // t = 0, 10, 20, 30, 40, 50 for the feed; t = 0, 30 for positions.
        sleep(Duration::from_secs(55)).await;
        handle.stop().await;

        assert_eq!(api.calls(SourceKind::Incidents), 6);
        assert_eq!(api.calls(SourceKind::Patrols), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn failing_task_slows_down_while_healthy_task_does_not() {
        let api = Arc::new(CountingApi { failing: vec![SourceKind::Patrols], ..Default::default() });
        let scheduler = PollScheduler::new(vec![
            PollTask::new("patrols", &[SourceKind::Patrols], Duration::from_secs(10)),
            PollTask::new("incidents", &[SourceKind::Incidents], Duration::from_secs(10)),
        ]);
        let handle = scheduler.start(aggregator(api.clone()));

        // Failing: t = 0, 20, 60 (delays 20s, 40s, 80s). Healthy: every 10s.
        sleep(Duration::from_secs(75)).await;
        handle.stop().await;

        assert_eq!(api.calls(SourceKind::Patrols), 3);
        assert_eq!(api.calls(SourceKind::Incidents), 8);
    }

    #[tokio::test(start_paused = true)]
    async fn failing_source_does_not_slow_its_task_siblings() {
        let api = Arc::new(CountingApi { failing: vec![SourceKind::RiskZones], ..Default::default() });
        let handle = PollScheduler::default().start(aggregator(api.clone()));

        // Risk zones: t = 0, 60, 180, 420 (delays 60s, 120s, 240s, capped 300s).
        // Patrols share the task and stay on the 30s cadence: t = 0..=570.
        sleep(Duration::from_secs(595)).await;
        handle.stop().await;

        assert_eq!(api.calls(SourceKind::RiskZones), 4);
        assert_eq!(api.calls(SourceKind::Patrols), 20);
        assert_eq!(api.calls(SourceKind::CheckIns), 20);
        assert_eq!(api.calls(SourceKind::IncidentStats), 20);
    }

    #[tokio::test(start_paused = true)]
    async fn stopped_scheduler_leaves_no_timers() {
        let api = Arc::new(CountingApi::default());
        let handle = PollScheduler::default().start(aggregator(api.clone()));
        sleep(Duration::from_secs(1)).await;
        assert!(handle.is_running());
        handle.stop().await;

        let before = api.calls(SourceKind::Incidents);
        sleep(Duration::from_secs(120)).await;
        assert_eq!(api.calls(SourceKind::Incidents), before);
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_the_handle_aborts_polling() {
        let api = Arc::new(CountingApi::default());
        let handle = PollScheduler::default().start(aggregator(api.clone()));
        sleep(Duration::from_secs(1)).await;
        drop(handle);
        tokio::task::yield_now().await;

        let before = api.calls(SourceKind::Incidents);
        sleep(Duration::from_secs(120)).await;
        assert_eq!(api.calls(SourceKind::Incidents), before);
    }
}
