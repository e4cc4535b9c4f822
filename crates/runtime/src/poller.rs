use std::{fmt, sync::Arc, time::Duration};

use async_trait::async_trait;
use model::{
    BackendStatus, MarketHours, Performance, Position, PositionTotals, RiskReading, StatusSnapshot,
};
use serde::Deserialize;
use thiserror::Error;
use time::OffsetDateTime;
use tokio::{
    sync::mpsc,
    task::JoinHandle,
    time::{Instant, Interval, MissedTickBehavior},
};
use tracing::debug;

/// The five backend reads that make up one poll cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    Status,
    Positions,
    Metrics,
    Risk,
    MarketStatus,
}

impl Endpoint {
    pub const ALL: [Endpoint; 5] = [
        Self::Status,
        Self::Positions,
        Self::Metrics,
        Self::Risk,
        Self::MarketStatus,
    ];

    /// Path relative to the REST base.
    pub fn path(self) -> &'static str {
        match self {
            Self::Status => "live-trading/status",
            Self::Positions => "live-trading/positions",
            Self::Metrics => "live-trading/metrics",
            Self::Risk => "live-trading/risk",
            Self::MarketStatus => "market/market-status",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Status => "status",
            Self::Positions => "positions",
            Self::Metrics => "metrics",
            Self::Risk => "risk",
            Self::MarketStatus => "market-status",
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{endpoint} read failed: {reason}")]
pub struct ReadError {
    pub endpoint: Endpoint,
    pub status: Option<u16>,
    pub reason: String,
}

impl ReadError {
    /// Non-2xx answer; the backend's `detail` is preferred over the bare status.
    pub fn http(endpoint: Endpoint, status: u16, detail: Option<String>) -> Self {
        Self {
            endpoint,
            status: Some(status),
            reason: detail.unwrap_or_else(|| format!("Server error: {status}")),
        }
    }

    pub fn network(endpoint: Endpoint, cause: impl fmt::Display) -> Self {
        Self {
            endpoint,
            status: None,
            reason: format!("Network error: Unable to connect to server ({cause})"),
        }
    }

    pub fn decode(endpoint: Endpoint, cause: impl fmt::Display) -> Self {
        Self {
            endpoint,
            status: None,
            reason: format!("unreadable response: {cause}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PollFailure {
    #[error(transparent)]
    Read(#[from] ReadError),
    #[error("status poll timed out after {0:?}")]
    TimedOut(Duration),
}

/// Body of the metrics read.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct MetricsReading {
    pub performance: Performance,
    #[serde(default)]
    pub positions: PositionTotals,
}

#[async_trait]
pub trait StatusSource: Send + Sync + 'static {
    async fn status(&self) -> Result<BackendStatus, ReadError>;
    async fn positions(&self) -> Result<Vec<Position>, ReadError>;
    async fn metrics(&self) -> Result<MetricsReading, ReadError>;
    async fn risk(&self) -> Result<RiskReading, ReadError>;
    async fn market_hours(&self) -> Result<MarketHours, ReadError>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct PollReport {
    pub seq: u64,
    pub elapsed: Duration,
    pub result: Result<StatusSnapshot, PollFailure>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSettings {
    pub interval: Duration,
    pub timeout: Duration,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            timeout: Duration::from_secs(5),
        }
    }
}

/// Issues sequenced poll cycles and filters their reports.
///
/// Every cycle carries the sequence number it was issued with. Only the
/// report of the most recently issued cycle is accepted; starting a new
/// cycle aborts the one still in flight.
pub struct StatusPoller<S> {
    source: Arc<S>,
    settings: PollSettings,
    reports: mpsc::UnboundedSender<PollReport>,
    issued: u64,
    in_flight: Option<JoinHandle<()>>,
    ticker: Option<Interval>,
}

impl<S: StatusSource> StatusPoller<S> {
    pub fn new(
        source: Arc<S>,
        settings: PollSettings,
        reports: mpsc::UnboundedSender<PollReport>,
    ) -> Self {
        Self {
            source,
            settings,
            reports,
            issued: 0,
            in_flight: None,
            ticker: None,
        }
    }

    /// Starts a cycle immediately and returns its sequence number.
    pub fn refresh_now(&mut self) -> u64 {
        if let Some(previous) = self.in_flight.take() {
            debug!(seq = self.issued, "superseding in-flight poll cycle");
            previous.abort();
        }

        self.issued += 1;
        let seq = self.issued;
        let source = Arc::clone(&self.source);
        let reports = self.reports.clone();
        let limit = self.settings.timeout;

        self.in_flight = Some(tokio::spawn(async move {
            let started = Instant::now();
            let result = run_cycle(source.as_ref(), limit).await;
            let _ = reports.send(PollReport {
                seq,
                elapsed: started.elapsed(),
                result,
            });
        }));
        seq
    }

    /// Returns the report if it belongs to the latest issued cycle.
    pub fn accept(&mut self, report: PollReport) -> Option<PollReport> {
        if report.seq != self.issued {
            debug!(
                seq = report.seq,
                latest = self.issued,
                "discarding stale poll report"
            );
            return None;
        }
        self.in_flight = None;
        Some(report)
    }

    pub fn latest_issued(&self) -> u64 {
        self.issued
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight.is_some()
    }

    pub fn is_background_enabled(&self) -> bool {
        self.ticker.is_some()
    }

    /// Background polling runs on a fixed interval; the first tick lands one
    /// interval after enabling.
    pub fn set_background(&mut self, enabled: bool) {
        match (enabled, self.ticker.is_some()) {
            (true, false) => {
                let interval = self.settings.interval;
                let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                self.ticker = Some(ticker);
                debug!(?interval, "background polling enabled");
            }
            (false, true) => {
                self.ticker = None;
                debug!("background polling disabled");
            }
            _ => {}
        }
    }

    /// Resolves on the next background tick; pending forever while disabled.
    pub async fn next_tick(&mut self) {
        match self.ticker.as_mut() {
            Some(ticker) => {
                ticker.tick().await;
            }
            None => std::future::pending().await,
        }
    }

    /// A tick that lands while a cycle is still in flight is skipped.
    pub fn on_tick(&mut self) -> Option<u64> {
        if self.is_in_flight() {
            debug!(seq = self.issued, "poll cycle still in flight, skipping tick");
            return None;
        }
        Some(self.refresh_now())
    }

    /// Disables background polling and invalidates any outstanding cycle.
    pub fn stop(&mut self) {
        self.ticker = None;
        if let Some(in_flight) = self.in_flight.take() {
            in_flight.abort();
        }
        self.issued += 1;
    }
}

impl<S> Drop for StatusPoller<S> {
    fn drop(&mut self) {
        if let Some(in_flight) = self.in_flight.take() {
            in_flight.abort();
        }
    }
}

async fn run_cycle<S: StatusSource + ?Sized>(
    source: &S,
    limit: Duration,
) -> Result<StatusSnapshot, PollFailure> {
    let reads = async {
        tokio::try_join!(
            source.status(),
            source.positions(),
            source.metrics(),
            source.risk(),
            source.market_hours(),
        )
    };

    let (status, positions, metrics, risk, market_hours) = tokio::time::timeout(limit, reads)
        .await
        .map_err(|_| PollFailure::TimedOut(limit))??;

    Ok(StatusSnapshot {
        status,
        positions,
        performance: metrics.performance,
        position_totals: metrics.positions,
        risk,
        market_hours,
        fetched_at: OffsetDateTime::now_utc(),
    })
}

#[cfg(test)]
mod tests {
    use std::{
        collections::VecDeque,
        sync::{Arc, Mutex},
        time::Duration,
    };

    use async_trait::async_trait;
    use model::{
        BackendStatus, MarketHours, Position, ReportedState, RiskReading, RunState,
    };
    use tokio::sync::mpsc;

    use super::{
        Endpoint, MetricsReading, PollFailure, PollReport, PollSettings, ReadError, StatusPoller,
        StatusSource,
    };
    use crate::testing::ScriptedBackend;

    fn poller<S: StatusSource>(
        source: Arc<S>,
    ) -> (StatusPoller<S>, mpsc::UnboundedReceiver<PollReport>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (StatusPoller::new(source, PollSettings::default(), tx), rx)
    }

    /// Each status read pops the next (delay, state) pair.
    struct SlowStatus {
        script: Mutex<VecDeque<(Duration, ReportedState)>>,
        inner: ScriptedBackend,
    }

    #[async_trait]
    impl StatusSource for SlowStatus {
        async fn status(&self) -> Result<BackendStatus, ReadError> {
            let next = self.script.lock().unwrap().pop_front();
            let (delay, reported) = next.unwrap_or((Duration::ZERO, ReportedState::Stopped));
            tokio::time::sleep(delay).await;
            let mut status = self.inner.status().await?;
            status.reported = reported;
            Ok(status)
        }

        async fn positions(&self) -> Result<Vec<Position>, ReadError> {
            self.inner.positions().await
        }

        async fn metrics(&self) -> Result<MetricsReading, ReadError> {
            self.inner.metrics().await
        }

        async fn risk(&self) -> Result<RiskReading, ReadError> {
            self.inner.risk().await
        }

        async fn market_hours(&self) -> Result<MarketHours, ReadError> {
            self.inner.market_hours().await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn successful_cycle_bundles_every_read() {
        let backend = Arc::new(ScriptedBackend::new(ReportedState::Running));
        let (mut poller, mut reports) = poller(Arc::clone(&backend));

        let seq = poller.refresh_now();
        let report = poller
            .accept(reports.recv().await.expect("report"))
            .expect("latest report is accepted");

        assert_eq!(report.seq, seq);
        let snapshot = report.result.expect("cycle succeeds");
        assert_eq!(snapshot.run_state(), RunState::Running);
        assert_eq!(snapshot.positions, backend.positions_fixture());
        assert!(!poller.is_in_flight());
    }

    #[tokio::test(start_paused = true)]
    async fn one_failing_read_fails_the_cycle() {
        let backend = Arc::new(ScriptedBackend::new(ReportedState::Running));
        backend.fail_read(ReadError::http(Endpoint::Risk, 500, None));
        let (mut poller, mut reports) = poller(backend);

        poller.refresh_now();
        let report = poller.accept(reports.recv().await.expect("report")).expect("accepted");

        let failure = report.result.expect_err("risk read fails the cycle");
        assert_eq!(failure.to_string(), "risk read failed: Server error: 500");
    }

    #[tokio::test(start_paused = true)]
    async fn slow_cycle_times_out() {
        let source = Arc::new(SlowStatus {
            script: Mutex::new(VecDeque::from([(
                Duration::from_secs(30),
                ReportedState::Running,
            )])),
            inner: ScriptedBackend::new(ReportedState::Running),
        });
        let (mut poller, mut reports) = poller(source);

        poller.refresh_now();
        let report = poller.accept(reports.recv().await.expect("report")).expect("accepted");

        assert_eq!(
            report.result.expect_err("cycle exceeds the limit"),
            PollFailure::TimedOut(Duration::from_secs(5))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn latest_issued_cycle_wins_over_slower_predecessor() {
        let source = Arc::new(SlowStatus {
            script: Mutex::new(VecDeque::from([
                (Duration::from_secs(3), ReportedState::Running),
                (Duration::from_millis(10), ReportedState::Paused),
            ])),
            inner: ScriptedBackend::new(ReportedState::Stopped),
        });
        let (mut poller, mut reports) = poller(source);

        let first = poller.refresh_now();
        tokio::time::sleep(Duration::from_millis(1)).await;
        let second = poller.refresh_now();
        assert!(second > first);

        tokio::time::sleep(Duration::from_secs(4)).await;
        let mut accepted = Vec::new();
        while let Ok(report) = reports.try_recv() {
            accepted.extend(poller.accept(report));
        }

        assert_eq!(accepted.len(), 1);
        assert_eq!(accepted[0].seq, second);
        let snapshot = accepted[0].result.as_ref().expect("second cycle succeeds");
        assert_eq!(snapshot.run_state(), RunState::Paused);
    }

    #[tokio::test(start_paused = true)]
    async fn stale_reports_are_discarded() {
        let backend = Arc::new(ScriptedBackend::new(ReportedState::Stopped));
        let (mut poller, mut reports) = poller(backend);

        let first = poller.refresh_now();
        let report = reports.recv().await.expect("report");
        poller.refresh_now();

        assert_eq!(report.seq, first);
        assert!(poller.accept(report).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn tick_is_skipped_while_cycle_in_flight() {
        let source = Arc::new(SlowStatus {
            script: Mutex::new(VecDeque::from([(
                Duration::from_secs(2),
                ReportedState::Running,
            )])),
            inner: ScriptedBackend::new(ReportedState::Running),
        });
        let (mut poller, mut reports) = poller(source);

        let seq = poller.refresh_now();

        assert_eq!(poller.on_tick(), None);
        assert_eq!(poller.latest_issued(), seq);

        let report = reports.recv().await.expect("report");
        assert!(poller.accept(report).is_some());
        assert_eq!(poller.on_tick(), Some(seq + 1));
    }

    #[tokio::test(start_paused = true)]
    async fn background_ticks_follow_the_interval() {
        let backend = Arc::new(ScriptedBackend::new(ReportedState::Running));
        let (mut poller, _reports) = poller(backend);

        poller.set_background(true);
        let started = tokio::time::Instant::now();
        poller.next_tick().await;

        assert_eq!(started.elapsed(), Duration::from_secs(5));
        assert!(poller.is_background_enabled());

        poller.set_background(false);
        assert!(!poller.is_background_enabled());
    }

    #[tokio::test(start_paused = true)]
    async fn stop_invalidates_outstanding_cycle() {
        let backend = Arc::new(ScriptedBackend::new(ReportedState::Running));
        let (mut poller, mut reports) = poller(backend);

        poller.refresh_now();
        let report = reports.recv().await.expect("report");
        poller.stop();

        assert!(poller.accept(report).is_none());
        assert!(!poller.is_background_enabled());
    }
}
