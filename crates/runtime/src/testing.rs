//! In-memory backend and feed transport for exercising the desk without a network.

use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc, Mutex, MutexGuard,
    },
    time::Duration,
};

use async_trait::async_trait;
use model::{
    BackendStatus, Countdown, ControlCommand, MarketHours, Performance, Position, PositionTotals,
    ReportedState, RiskReading, StatusSnapshot,
};
use time::OffsetDateTime;
use tokio::sync::{mpsc, oneshot};

use crate::{
    commands::{CommandAck, CommandError, ControlApi},
    poller::{Endpoint, MetricsReading, ReadError, StatusSource},
    supervisor::{StreamEnvelope, StreamEvent, StreamHandle, StreamTransport},
};

type CommandProbe = Box<dyn Fn(ControlCommand) + Send + Sync>;

struct Script {
    reported: ReportedState,
    error_message: Option<String>,
    failures: Vec<ReadError>,
    command_results: VecDeque<Result<CommandAck, CommandError>>,
    command_delay: Duration,
    sent: Vec<ControlCommand>,
    probe: Option<CommandProbe>,
}

/// Backend double that answers every read from a fixed fixture set and
/// follows successful commands the way the real backend does.
#[derive(Clone)]
pub struct ScriptedBackend {
    script: Arc<Mutex<Script>>,
    status_reads: Arc<AtomicUsize>,
}

impl ScriptedBackend {
    pub fn new(reported: ReportedState) -> Self {
        Self {
            script: Arc::new(Mutex::new(Script {
                reported,
                error_message: None,
                failures: Vec::new(),
                command_results: VecDeque::new(),
                command_delay: Duration::ZERO,
                sent: Vec::new(),
                probe: None,
            })),
            status_reads: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn script(&self) -> MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn set_reported(&self, reported: ReportedState) {
        self.script().reported = reported;
    }

    pub fn set_error_message(&self, message: Option<&str>) {
        self.script().error_message = message.map(str::to_string);
    }

    /// Makes every read of `error.endpoint` fail until cleared.
    pub fn fail_read(&self, error: ReadError) {
        let mut script = self.script();
        script.failures.retain(|existing| existing.endpoint != error.endpoint);
        script.failures.push(error);
    }

    pub fn clear_failures(&self) {
        self.script().failures.clear();
    }

    /// Queues the answer for the next control request; unscripted requests succeed.
    pub fn push_command_result(&self, result: Result<CommandAck, CommandError>) {
        self.script().command_results.push_back(result);
    }

    pub fn delay_commands(&self, delay: Duration) {
        self.script().command_delay = delay;
    }

    /// Runs `probe` as each control request arrives.
    pub fn on_command(&self, probe: impl Fn(ControlCommand) + Send + Sync + 'static) {
        self.script().probe = Some(Box::new(probe));
    }

    pub fn sent(&self) -> Vec<ControlCommand> {
        self.script().sent.clone()
    }

    pub fn status_reads(&self) -> usize {
        self.status_reads.load(Ordering::SeqCst)
    }

    pub fn positions_fixture(&self) -> Vec<Position> {
        positions_fixture()
    }

    fn check(&self, endpoint: Endpoint) -> Result<(), ReadError> {
        match self.script().failures.iter().find(|f| f.endpoint == endpoint) {
            Some(failure) => Err(failure.clone()),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl StatusSource for ScriptedBackend {
    async fn status(&self) -> Result<BackendStatus, ReadError> {
        self.status_reads.fetch_add(1, Ordering::SeqCst);
        self.check(Endpoint::Status)?;
        let script = self.script();
        Ok(status_fixture(script.reported, script.error_message.as_deref()))
    }

    async fn positions(&self) -> Result<Vec<Position>, ReadError> {
        self.check(Endpoint::Positions)?;
        Ok(positions_fixture())
    }

    async fn metrics(&self) -> Result<MetricsReading, ReadError> {
        self.check(Endpoint::Metrics)?;
        Ok(MetricsReading {
            performance: performance_fixture(),
            positions: totals_fixture(),
        })
    }

    async fn risk(&self) -> Result<RiskReading, ReadError> {
        self.check(Endpoint::Risk)?;
        Ok(risk_fixture())
    }

    async fn market_hours(&self) -> Result<MarketHours, ReadError> {
        self.check(Endpoint::MarketStatus)?;
        Ok(market_fixture())
    }
}

#[async_trait]
impl ControlApi for ScriptedBackend {
    async fn send(&self, command: ControlCommand) -> Result<CommandAck, CommandError> {
        let (delay, result) = {
            let mut script = self.script();
            script.sent.push(command);
            if let Some(probe) = script.probe.as_ref() {
                probe(command);
            }
            let result = script
                .command_results
                .pop_front()
                .unwrap_or_else(|| Ok(CommandAck::default()));
            (script.command_delay, result)
        };

        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        if let Ok(ack) = &result {
            if ack.warning.is_none() {
                let mut script = self.script();
                script.reported = match command {
                    ControlCommand::Start { .. } | ControlCommand::Resume => ReportedState::Running,
                    ControlCommand::Pause => ReportedState::Paused,
                    ControlCommand::Stop => ReportedState::Stopped,
                };
            }
        }
        result
    }
}

/// A snapshot built from the fixtures.
pub fn snapshot_with(reported: ReportedState, error_message: Option<&str>) -> StatusSnapshot {
    StatusSnapshot {
        status: status_fixture(reported, error_message),
        positions: positions_fixture(),
        performance: performance_fixture(),
        position_totals: totals_fixture(),
        risk: risk_fixture(),
        market_hours: market_fixture(),
        fetched_at: OffsetDateTime::UNIX_EPOCH,
    }
}

fn status_fixture(reported: ReportedState, error_message: Option<&str>) -> BackendStatus {
    BackendStatus {
        reported,
        active_strategies: vec!["momentum".to_string()],
        last_update: Some("2024-05-01T14:30:00".to_string()),
        error_message: error_message.map(str::to_string),
        paper_trading: true,
    }
}

fn positions_fixture() -> Vec<Position> {
    vec![Position {
        symbol: "AAPL".to_string(),
        quantity: 10.0,
        entry_price: 180.0,
        current_price: 185.5,
        market_value: 1_855.0,
        unrealized_pnl: 55.0,
        pnl_percentage: 3.06,
        strategy_id: Some("momentum".to_string()),
        strategy_name: "Momentum".to_string(),
        entry_time: "2024-05-01T13:00:00".to_string(),
    }]
}

fn performance_fixture() -> Performance {
    Performance {
        total_pnl: 15_420.5,
        daily_pnl: -3_240.75,
        total_trades: 42,
        win_rate: 68.4,
    }
}

fn totals_fixture() -> PositionTotals {
    PositionTotals {
        total_positions: 1,
        total_market_value: 1_855.0,
        total_unrealized_pnl: 55.0,
    }
}

fn risk_fixture() -> RiskReading {
    RiskReading {
        level: "low".to_string(),
        score: 12.5,
    }
}

fn market_fixture() -> MarketHours {
    MarketHours {
        is_open: true,
        reason: None,
        time_until_open: None,
        time_until_close: Some(Countdown {
            days: 0,
            hours: 2,
            minutes: 15,
        }),
        next_open: None,
        next_close: None,
    }
}

/// Test side of one fake feed connection.
#[derive(Clone)]
pub struct FakeConnection {
    pub generation: u64,
    events: mpsc::UnboundedSender<StreamEnvelope>,
    closed: Arc<AtomicBool>,
}

impl FakeConnection {
    fn emit(&self, event: StreamEvent) {
        let _ = self.events.send(StreamEnvelope {
            generation: self.generation,
            event,
        });
    }

    pub fn open(&self) {
        self.emit(StreamEvent::Opened);
    }

    pub fn send_text(&self, text: &str) {
        self.emit(StreamEvent::Frame(text.to_string()));
    }

    /// Simulates an abnormal closure from the server side.
    pub fn drop_connection(&self, reason: &str) {
        self.closed.store(true, Ordering::SeqCst);
        self.emit(StreamEvent::Closed {
            clean: false,
            reason: reason.to_string(),
        });
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// Feed transport that records every connection it opens.
#[derive(Clone)]
pub struct FakeTransport {
    connections: Arc<Mutex<Vec<FakeConnection>>>,
    auto_open: bool,
}

impl Default for FakeTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeTransport {
    /// Connections report `Opened` as soon as they are created.
    pub fn new() -> Self {
        Self {
            connections: Arc::new(Mutex::new(Vec::new())),
            auto_open: true,
        }
    }

    /// Connections stay connecting until the test opens them.
    pub fn manual() -> Self {
        Self {
            auto_open: false,
            ..Self::new()
        }
    }

    fn guard(&self) -> MutexGuard<'_, Vec<FakeConnection>> {
        self.connections
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn connections(&self) -> Vec<FakeConnection> {
        self.guard().clone()
    }

    pub fn latest(&self) -> Option<FakeConnection> {
        self.guard().last().cloned()
    }

    pub fn open_connections(&self) -> usize {
        self.guard().iter().filter(|c| !c.is_closed()).count()
    }
}

impl StreamTransport for FakeTransport {
    fn connect(
        &self,
        generation: u64,
        events: mpsc::UnboundedSender<StreamEnvelope>,
    ) -> StreamHandle {
        let connection = FakeConnection {
            generation,
            events: events.clone(),
            closed: Arc::new(AtomicBool::new(false)),
        };
        if self.auto_open {
            connection.open();
        }
        self.guard().push(connection.clone());

        let (close_tx, close_rx) = oneshot::channel::<()>();
        let task = tokio::spawn(async move {
            let _ = close_rx.await;
            connection.closed.store(true, Ordering::SeqCst);
            connection.emit(StreamEvent::Closed {
                clean: true,
                reason: "closed by client".to_string(),
            });
        });
        StreamHandle::new(close_tx, task)
    }
}
