//! Delivery Loop
//!
//! Background task that owns the reporting cadence:
//!
//! ```text
//! AwaitingCollector --probe ok--> Ready --sleep--> Sending --201--> Ready
//!                                                     |
//!                                                     +--fail--> RetryWait --> Ready
//! ```
//!
//! Counters are only cleared for what the collector confirmed. A failed
//! send leaves them in place and the next window reports the cumulative
//! counts. The availability wait happens once, at startup.

use super::client::{CloudError, Collector};
use crate::constants;
use crate::logic::counters::{CounterSnapshot, CounterStore};
use crate::logic::subject::SubjectSource;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::sleep;
use watchpost_risk::{level, score, ActivityAck, ActivityReport};

/// Sync configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Identity reported as `sourceId`
    pub source_id: String,
    /// Event type tag
    pub event_type: String,
    /// Seconds between reports
    pub send_interval_secs: u64,
    /// Seconds between availability probes
    pub retry_interval_secs: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            source_id: constants::get_source_id(),
            event_type: constants::get_event_type(),
            send_interval_secs: constants::get_send_interval(),
            retry_interval_secs: constants::get_retry_interval(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryState {
    #[default]
    AwaitingCollector,
    Ready,
    Sending,
    RetryWait,
    Stopped,
}

/// Sync status
#[derive(Debug, Clone, Default, Serialize)]
pub struct SyncStatus {
    pub state: DeliveryState,
    pub is_connected: bool,
    pub last_success: Option<DateTime<Utc>>,
    pub last_failure: Option<DateTime<Utc>>,
    pub reports_sent: u64,
    pub consecutive_failures: u32,
    pub last_error: Option<String>,
}

pub type StatusHandle = Arc<RwLock<SyncStatus>>;

pub struct DeliveryAgent {
    config: SyncConfig,
    collector: Arc<dyn Collector>,
    store: Arc<CounterStore>,
    subject: Arc<dyn SubjectSource>,
    status: StatusHandle,
}

/// Sleep unless shutdown is signalled first. Returns false on shutdown.
async fn wait(duration: Duration, shutdown: &mut watch::Receiver<bool>) -> bool {
    if *shutdown.borrow() {
        return false;
    }
    tokio::select! {
        _ = sleep(duration) => true,
        // A dropped sender also ends the loop
        _ = shutdown.changed() => false,
    }
}

impl DeliveryAgent {
    pub fn new(
        config: SyncConfig,
        collector: Arc<dyn Collector>,
        store: Arc<CounterStore>,
        subject: Arc<dyn SubjectSource>,
    ) -> Self {
        Self {
            config,
            collector,
            store,
            subject,
            status: Arc::new(RwLock::new(SyncStatus::default())),
        }
    }

    /// Shared view of the loop's status, readable while it runs
    pub fn status_handle(&self) -> StatusHandle {
        Arc::clone(&self.status)
    }

    fn set_state(&self, state: DeliveryState) {
        self.status.write().state = state;
    }

    /// Run until `shutdown` flips to true (or its sender is dropped)
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        log::info!("Starting delivery loop...");
        log::info!("  Source: {}", self.config.source_id);
        log::info!("  Send interval: {}s", self.config.send_interval_secs);

        if self.await_collector(&mut shutdown).await {
            let interval = Duration::from_secs(self.config.send_interval_secs);

            loop {
                self.set_state(DeliveryState::Ready);
                if !wait(interval, &mut shutdown).await {
                    break;
                }

                self.set_state(DeliveryState::Sending);
                if self.deliver_once().await.is_err() {
                    self.set_state(DeliveryState::RetryWait);
                }
            }
        }

        self.set_state(DeliveryState::Stopped);
        log::info!("Delivery loop stopped");
    }

    /// Probe until the collector answers. Returns false if shut down first.
    async fn await_collector(&self, shutdown: &mut watch::Receiver<bool>) -> bool {
        self.set_state(DeliveryState::AwaitingCollector);
        let retry = Duration::from_secs(self.config.retry_interval_secs);

        loop {
            match self.collector.probe().await {
                Ok(()) => {
                    log::info!("Collector reachable");
                    self.status.write().is_connected = true;
                    return true;
                }
                Err(e) => {
                    log::info!("Collector not reachable ({}), retrying in {}s", e, retry.as_secs());
                }
            }

            if !wait(retry, shutdown).await {
                return false;
            }
        }
    }

    /// Process table scans block, so the subject is sampled off the runtime
    async fn sample_subject(&self) -> String {
        let subject = Arc::clone(&self.subject);
        match tokio::task::spawn_blocking(move || subject.current()).await {
            Ok(label) => label,
            Err(e) => {
                log::debug!("Subject sample failed: {}", e);
                constants::UNKNOWN_SUBJECT.to_string()
            }
        }
    }

    async fn build_report(&self, snapshot: CounterSnapshot) -> ActivityReport {
        ActivityReport {
            source_id: self.config.source_id.clone(),
            subject: Some(self.sample_subject().await),
            event_type: self.config.event_type.clone(),
            risk_score: score(snapshot.flagged, snapshot.total),
        }
    }

    /// Snapshot, send, and on confirmed success remove what was sent
    pub async fn deliver_once(&self) -> Result<ActivityAck, CloudError> {
        let snapshot = self.store.snapshot_and_hold();
        let report = self.build_report(snapshot).await;

        match self.collector.send_report(&report).await {
            Ok(ack) => {
                self.store.subtract(snapshot);

                log::info!(
                    "Report delivered: {} events, {} flagged, score {} ({}); collector level {}",
                    snapshot.total,
                    snapshot.flagged,
                    report.risk_score,
                    level(report.risk_score),
                    ack.risk_level
                );

                let mut status = self.status.write();
                status.is_connected = true;
                status.last_success = Some(Utc::now());
                status.reports_sent += 1;
                status.consecutive_failures = 0;
                status.last_error = None;
                Ok(ack)
            }
            Err(e) => {
                log::warn!("Report delivery failed: {}", e);

                let mut status = self.status.write();
                status.is_connected = !matches!(e, CloudError::NetworkError(_) | CloudError::Timeout);
                status.last_failure = Some(Utc::now());
                status.consecutive_failures += 1;
                status.last_error = Some(e.to_string());
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use watchpost_risk::RiskLevel;

    /// Scripted collector: fails the first `probe_failures` probes, then
    /// answers sends from `outcomes` (success once exhausted).
    #[derive(Default)]
    struct FakeCollector {
        probe_failures: AtomicUsize,
        probes: AtomicUsize,
        outcomes: Mutex<VecDeque<Result<(), CloudError>>>,
        reports: Mutex<Vec<ActivityReport>>,
    }

    impl FakeCollector {
        fn failing_probes(n: usize) -> Self {
            let fake = Self::default();
            fake.probe_failures.store(n, Ordering::SeqCst);
            fake
        }

        fn with_outcomes(outcomes: Vec<Result<(), CloudError>>) -> Self {
            let fake = Self::default();
            *fake.outcomes.lock() = outcomes.into();
            fake
        }

        fn reports(&self) -> Vec<ActivityReport> {
            self.reports.lock().clone()
        }
    }

    #[async_trait]
    impl Collector for FakeCollector {
        async fn probe(&self) -> Result<(), CloudError> {
            self.probes.fetch_add(1, Ordering::SeqCst);
            let remaining = self.probe_failures.load(Ordering::SeqCst);
            if remaining > 0 {
                self.probe_failures.store(remaining - 1, Ordering::SeqCst);
                return Err(CloudError::NetworkError("connection refused".into()));
            }
            Ok(())
        }

        async fn send_report(&self, report: &ActivityReport) -> Result<ActivityAck, CloudError> {
            self.reports.lock().push(report.clone());
            let outcome = self.outcomes.lock().pop_front().unwrap_or(Ok(()));
            outcome.map(|()| ActivityAck {
                message: "Activity logged successfully".to_string(),
                activity_id: "a-1".to_string(),
                risk_level: level(report.risk_score),
                alert_id: None,
            })
        }
    }

    struct StaticSubject(String);

    impl SubjectSource for StaticSubject {
        fn current(&self) -> String {
            self.0.clone()
        }
    }

    fn config() -> SyncConfig {
        SyncConfig {
            source_id: "ws-7".to_string(),
            event_type: "KEYWORD".to_string(),
            send_interval_secs: 30,
            retry_interval_secs: 5,
        }
    }

    fn agent(collector: Arc<FakeCollector>, store: Arc<CounterStore>) -> DeliveryAgent {
        DeliveryAgent::new(
            config(),
            collector,
            store,
            Arc::new(StaticSubject("editor".to_string())),
        )
    }

    fn record(store: &CounterStore, total: u64, flagged: u64) {
        for i in 0..total {
            store.record_event(i < flagged);
        }
    }

    #[tokio::test]
    async fn test_successful_delivery_clears_sent_counts() {
        let collector = Arc::new(FakeCollector::default());
        let store = Arc::new(CounterStore::new());
        record(&store, 10, 5);

        let agent = agent(Arc::clone(&collector), Arc::clone(&store));
        let ack = agent.deliver_once().await.unwrap();

        assert_eq!(ack.risk_level, RiskLevel::Medium);
        let reports = collector.reports();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].risk_score, 5.0);
        assert_eq!(reports[0].source_id, "ws-7");
        assert_eq!(reports[0].subject.as_deref(), Some("editor"));
        assert!(store.snapshot_and_hold().is_empty());

        let status = agent.status_handle().read().clone();
        assert_eq!(status.reports_sent, 1);
        assert!(status.last_success.is_some());
    }

    struct BrokenSubject;

    impl SubjectSource for BrokenSubject {
        fn current(&self) -> String {
            panic!("process table unavailable")
        }
    }

    #[tokio::test]
    async fn test_subject_failure_still_delivers() {
        let collector = Arc::new(FakeCollector::default());
        let store = Arc::new(CounterStore::new());
        record(&store, 2, 0);

        let agent = DeliveryAgent::new(
            config(),
            Arc::clone(&collector) as Arc<dyn Collector>,
            Arc::clone(&store),
            Arc::new(BrokenSubject),
        );
        agent.deliver_once().await.unwrap();

        let reports = collector.reports();
        assert_eq!(reports[0].subject.as_deref(), Some(constants::UNKNOWN_SUBJECT));
        assert!(store.snapshot_and_hold().is_empty());
    }

    #[tokio::test]
    async fn test_failure_keeps_counts_and_next_report_is_cumulative() {
        let collector = Arc::new(FakeCollector::with_outcomes(vec![
            Err(CloudError::ServerError(503)),
        ]));
        let store = Arc::new(CounterStore::new());
        let agent = agent(Arc::clone(&collector), Arc::clone(&store));

        record(&store, 4, 2);
        assert!(agent.deliver_once().await.is_err());
        assert_eq!(store.snapshot_and_hold(), CounterSnapshot { total: 4, flagged: 2 });

        let status = agent.status_handle().read().clone();
        assert_eq!(status.consecutive_failures, 1);
        assert_eq!(status.last_error.as_deref(), Some("Server error: 503"));

        record(&store, 4, 0);
        agent.deliver_once().await.unwrap();

        let reports = collector.reports();
        assert_eq!(reports[0].risk_score, 5.0);
        assert_eq!(reports[1].risk_score, 2.5);
        assert!(store.snapshot_and_hold().is_empty());
        assert_eq!(agent.status_handle().read().consecutive_failures, 0);
    }

    #[tokio::test]
    async fn test_empty_window_reports_zero() {
        let collector = Arc::new(FakeCollector::default());
        let store = Arc::new(CounterStore::new());

        agent(Arc::clone(&collector), store).deliver_once().await.unwrap();
        assert_eq!(collector.reports()[0].risk_score, 0.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_waits_for_collector_then_reports_on_interval() {
        let collector = Arc::new(FakeCollector::failing_probes(2));
        let store = Arc::new(CounterStore::new());
        let agent = agent(Arc::clone(&collector), Arc::clone(&store));
        let status = agent.status_handle();

        let (tx, rx) = watch::channel(false);
        let task = tokio::spawn(agent.run(rx));

        // Probes at t=0, 5, 10; first report due at t=40
        sleep(Duration::from_secs(12)).await;
        assert_eq!(collector.probes.load(Ordering::SeqCst), 3);
        assert_eq!(status.read().state, DeliveryState::Ready);
        assert!(collector.reports().is_empty());

        record(&store, 10, 10);
        sleep(Duration::from_secs(30)).await;
        assert_eq!(collector.reports().len(), 1);
        assert_eq!(collector.reports()[0].risk_score, 10.0);

        sleep(Duration::from_secs(30)).await;
        assert_eq!(collector.reports().len(), 2);
        assert_eq!(collector.reports()[1].risk_score, 0.0);

        tx.send(true).unwrap();
        task.await.unwrap();
        assert_eq!(status.read().state, DeliveryState::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_send_does_not_reprobe() {
        let collector = Arc::new(FakeCollector::with_outcomes(vec![
            Err(CloudError::NetworkError("reset".into())),
        ]));
        let store = Arc::new(CounterStore::new());
        record(&store, 2, 1);

        let (tx, rx) = watch::channel(false);
        let task = tokio::spawn(agent(Arc::clone(&collector), Arc::clone(&store)).run(rx));

        sleep(Duration::from_secs(65)).await;
        assert_eq!(collector.probes.load(Ordering::SeqCst), 1);
        assert_eq!(collector.reports().len(), 2);
        assert_eq!(collector.reports()[1].risk_score, 5.0);
        assert!(store.snapshot_and_hold().is_empty());

        tx.send(true).unwrap();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_interrupts_wait() {
        let collector = Arc::new(FakeCollector::failing_probes(usize::MAX));
        let store = Arc::new(CounterStore::new());

        let (tx, rx) = watch::channel(false);
        let start = tokio::time::Instant::now();
        let task = tokio::spawn(agent(Arc::clone(&collector), store).run(rx));

        tokio::task::yield_now().await;
        tx.send(true).unwrap();
        task.await.unwrap();

        assert!(start.elapsed() < Duration::from_secs(5));
        assert!(collector.reports().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_sender_stops_loop() {
        let collector = Arc::new(FakeCollector::default());
        let store = Arc::new(CounterStore::new());

        let (tx, rx) = watch::channel(false);
        let task = tokio::spawn(agent(collector, store).run(rx));
        drop(tx);

        task.await.unwrap();
    }
}
