use std::{sync::Arc, time::Duration};

use model::{CommandKind, ConnectionState, ControlCommand, RunState, StatusSnapshot};
use quotes::ProcessedQuote;
use thiserror::Error;
use tokio::{
    sync::{mpsc, oneshot, watch},
    task::JoinHandle,
    time::Instant,
};
use tracing::{debug, error, info, warn};

use crate::{
    commands::{self, CommandOutcome, CommandSettings, ControlApi},
    control::{ControlStateMachine, Rejection},
    metrics::{LatencyPercentiles, PollLatencyMetrics},
    poller::{PollReport, PollSettings, StatusPoller, StatusSource},
    supervisor::{self, ConnectionSupervisor, StreamEnvelope, StreamTransport},
};

const REQUEST_BUFFER: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeskSettings {
    pub poll_interval: Duration,
    pub poll_timeout: Duration,
    pub command_timeout: Duration,
    pub stop_retry_delay: Duration,
    pub close_grace: Duration,
}

impl Default for DeskSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            poll_timeout: Duration::from_secs(5),
            command_timeout: Duration::from_secs(10),
            stop_retry_delay: Duration::from_secs(2),
            close_grace: Duration::from_secs(2),
        }
    }
}

impl DeskSettings {
    fn poll(&self) -> PollSettings {
        PollSettings {
            interval: self.poll_interval,
            timeout: self.poll_timeout,
        }
    }

    fn commands(&self) -> CommandSettings {
        CommandSettings {
            timeout: self.command_timeout,
            stop_retry_delay: self.stop_retry_delay,
        }
    }
}

/// Everything a renderer needs, published after every change.
#[derive(Debug, Clone, PartialEq)]
pub struct DeskState {
    pub run_state: RunState,
    pub busy: bool,
    pub in_flight: Option<CommandKind>,
    pub last_error: Option<String>,
    pub snapshot: Option<Arc<StatusSnapshot>>,
    pub quote: Option<ProcessedQuote>,
    pub connection: ConnectionState,
    pub last_quote_at: Option<Instant>,
    pub transport_error: Option<String>,
    pub feed_error: Option<String>,
    pub poll_latency: Option<LatencyPercentiles>,
    pub disposed: bool,
}

impl DeskState {
    pub fn is_fresh(&self, now: Instant) -> bool {
        supervisor::is_fresh(self.connection, self.last_quote_at, now)
    }

    /// Control and poll errors take precedence over stream errors.
    pub fn banner(&self) -> Option<&str> {
        self.last_error
            .as_deref()
            .or(self.transport_error.as_deref())
    }

    /// Message shown next to the quote feed.
    pub fn feed_message(&self) -> Option<&str> {
        self.feed_error
            .as_deref()
            .or(self.transport_error.as_deref())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IssueError {
    #[error(transparent)]
    Rejected(#[from] Rejection),
    #[error("{0}")]
    Failed(String),
    #[error("{0}")]
    Degraded(String),
    #[error("live desk has shut down")]
    Closed,
}

type IssueReply = oneshot::Sender<Result<(), IssueError>>;

enum DeskRequest {
    Issue {
        command: ControlCommand,
        reply: IssueReply,
    },
    Refresh,
    Dispose {
        reply: oneshot::Sender<()>,
    },
}

struct CommandReport {
    command: CommandKind,
    outcome: CommandOutcome,
}

/// Cloneable front door to a running [`LiveDesk`].
#[derive(Clone)]
pub struct DeskHandle {
    requests: mpsc::Sender<DeskRequest>,
    state: watch::Receiver<DeskState>,
}

impl DeskHandle {
    /// Resolves once the command has settled or been rejected.
    pub async fn issue(&self, command: ControlCommand) -> Result<(), IssueError> {
        let (reply, outcome) = oneshot::channel();
        self.requests
            .send(DeskRequest::Issue { command, reply })
            .await
            .map_err(|_| IssueError::Closed)?;
        outcome.await.map_err(|_| IssueError::Closed)?
    }

    pub async fn refresh_now(&self) -> Result<(), IssueError> {
        self.requests
            .send(DeskRequest::Refresh)
            .await
            .map_err(|_| IssueError::Closed)
    }

    /// Closes the feed, stops polling and waits for the desk to finish.
    /// Calling it again, or after the desk is gone, is a no-op.
    pub async fn dispose(&self) {
        let (reply, done) = oneshot::channel();
        if self
            .requests
            .send(DeskRequest::Dispose { reply })
            .await
            .is_ok()
        {
            let _ = done.await;
        }
    }

    pub fn state(&self) -> DeskState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<DeskState> {
        self.state.clone()
    }
}

/// Single task that owns the control state, the poller and the feed.
///
/// All inputs arrive as messages, so state transitions never race each
/// other: user requests, poll reports, stream events and command outcomes
/// are applied one at a time in arrival order.
pub struct LiveDesk<S, C, T> {
    settings: DeskSettings,
    control: Arc<C>,
    machine: ControlStateMachine,
    poller: StatusPoller<S>,
    supervisor: ConnectionSupervisor<T>,
    snapshot: Option<Arc<StatusSnapshot>>,
    latency: PollLatencyMetrics,
    pending_reply: Option<IssueReply>,
    connection_wanted: bool,
    disposed: bool,
    requests: mpsc::Receiver<DeskRequest>,
    poll_reports: mpsc::UnboundedReceiver<PollReport>,
    stream_events: mpsc::UnboundedReceiver<StreamEnvelope>,
    command_tx: mpsc::UnboundedSender<CommandReport>,
    command_rx: mpsc::UnboundedReceiver<CommandReport>,
    published: watch::Sender<DeskState>,
}

impl<S, C, T> LiveDesk<S, C, T>
where
    S: StatusSource,
    C: ControlApi,
    T: StreamTransport,
{
    pub fn new(
        source: Arc<S>,
        control: Arc<C>,
        transport: Arc<T>,
        settings: DeskSettings,
    ) -> (Self, DeskHandle) {
        let (request_tx, requests) = mpsc::channel(REQUEST_BUFFER);
        let (report_tx, poll_reports) = mpsc::unbounded_channel();
        let (event_tx, stream_events) = mpsc::unbounded_channel();
        let (command_tx, command_rx) = mpsc::unbounded_channel();

        let desk = Self {
            settings,
            control,
            machine: ControlStateMachine::new(),
            poller: StatusPoller::new(source, settings.poll(), report_tx),
            supervisor: ConnectionSupervisor::new(transport, event_tx, settings.close_grace),
            snapshot: None,
            latency: PollLatencyMetrics::new(),
            pending_reply: None,
            connection_wanted: false,
            disposed: false,
            requests,
            poll_reports,
            stream_events,
            command_tx,
            command_rx,
            published: watch::channel(initial_state()).0,
        };
        let state = desk.published.subscribe();
        desk.publish();

        (
            desk,
            DeskHandle {
                requests: request_tx,
                state,
            },
        )
    }

    /// Builds the desk and runs it on its own task.
    pub fn spawn(
        source: Arc<S>,
        control: Arc<C>,
        transport: Arc<T>,
        settings: DeskSettings,
    ) -> (DeskHandle, JoinHandle<()>) {
        let (desk, handle) = Self::new(source, control, transport, settings);
        (handle, tokio::spawn(desk.run()))
    }

    pub async fn run(mut self) {
        info!("live desk started");
        self.poller.refresh_now();

        loop {
            tokio::select! {
                request = self.requests.recv() => match request {
                    Some(DeskRequest::Issue { command, reply }) => self.issue(command, reply).await,
                    Some(DeskRequest::Refresh) => {
                        let seq = self.poller.refresh_now();
                        debug!(seq, "manual refresh");
                    }
                    Some(DeskRequest::Dispose { reply }) => {
                        self.teardown().await;
                        let _ = reply.send(());
                        return;
                    }
                    None => {
                        self.teardown().await;
                        return;
                    }
                },
                Some(report) = self.poll_reports.recv() => self.on_poll_report(report).await,
                Some(envelope) = self.stream_events.recv() => {
                    self.supervisor.handle_event(envelope, Instant::now());
                }
                Some(report) = self.command_rx.recv() => self.on_command_report(report).await,
                _ = self.poller.next_tick() => {
                    if let Some(seq) = self.poller.on_tick() {
                        debug!(seq, "background poll");
                    }
                }
            }
            self.publish();
        }
    }

    async fn issue(&mut self, command: ControlCommand, reply: IssueReply) {
        let kind = command.kind();
        if let Err(rejection) = self.machine.begin(&command) {
            warn!(command = %kind, error = %rejection, "command rejected");
            let _ = reply.send(Err(rejection.into()));
            return;
        }

        info!(command = %kind, "issuing command");
        self.pending_reply = Some(reply);
        // Leaving running closes the feed before the request goes out.
        self.sync_lifecycle().await;
        self.publish();

        let control = Arc::clone(&self.control);
        let reports = self.command_tx.clone();
        let settings = self.settings.commands();
        tokio::spawn(async move {
            let outcome = commands::execute(control.as_ref(), command, settings).await;
            let _ = reports.send(CommandReport {
                command: kind,
                outcome,
            });
        });
    }

    async fn on_command_report(&mut self, report: CommandReport) {
        let CommandReport { command, outcome } = report;
        let confirming = self.poller.refresh_now();
        self.machine.complete(&outcome, confirming);

        let result = match &outcome {
            CommandOutcome::Completed(ack) => {
                info!(%command, message = ?ack.message, "command completed");
                self.supervisor.acknowledge_errors();
                Ok(())
            }
            CommandOutcome::Degraded(reason) => {
                warn!(%command, %reason, "command degraded");
                Err(IssueError::Degraded(reason.clone()))
            }
            CommandOutcome::TransientFailure(err) => {
                warn!(%command, error = %err, "command failed transiently");
                Err(IssueError::Failed(err.to_string()))
            }
            CommandOutcome::Failed(err) => {
                error!(%command, error = %err, "command failed");
                Err(IssueError::Failed(err.to_string()))
            }
        };
        if let Some(reply) = self.pending_reply.take() {
            let _ = reply.send(result);
        }

        self.sync_lifecycle().await;
    }

    async fn on_poll_report(&mut self, report: PollReport) {
        let Some(report) = self.poller.accept(report) else {
            return;
        };

        match report.result {
            Ok(snapshot) => {
                self.latency.record(report.elapsed);
                self.machine.apply_snapshot(&snapshot, report.seq);
                self.supervisor.acknowledge_errors();
                debug!(
                    seq = report.seq,
                    run_state = %self.machine.run_state(),
                    elapsed = ?report.elapsed,
                    "snapshot published"
                );
                self.snapshot = Some(Arc::new(snapshot));
            }
            Err(failure) => {
                warn!(seq = report.seq, error = %failure, "poll cycle failed");
                self.machine.apply_poll_failure(&failure);
            }
        }

        self.sync_lifecycle().await;
    }

    /// Background polling and the feed both follow the running state; the
    /// feed only changes on an edge so a lost stream stays lost.
    async fn sync_lifecycle(&mut self) {
        let running = !self.disposed && self.machine.run_state() == RunState::Running;
        self.poller.set_background(running);

        if running != self.connection_wanted {
            self.connection_wanted = running;
            self.supervisor.set_desired_connected(running).await;
        }
    }

    async fn teardown(&mut self) {
        self.disposed = true;
        self.poller.stop();
        self.connection_wanted = false;
        self.supervisor.set_desired_connected(false).await;
        if let Some(reply) = self.pending_reply.take() {
            let _ = reply.send(Err(IssueError::Closed));
        }
        self.publish();
        info!("live desk disposed");
    }

    fn state(&self) -> DeskState {
        DeskState {
            run_state: self.machine.run_state(),
            busy: self.machine.is_busy(),
            in_flight: self.machine.in_flight(),
            last_error: self.machine.last_error().map(str::to_string),
            snapshot: self.snapshot.clone(),
            quote: self.supervisor.latest_quote().cloned(),
            connection: self.supervisor.state(),
            last_quote_at: self.supervisor.last_quote_at(),
            transport_error: self.supervisor.transport_error().map(str::to_string),
            feed_error: self.supervisor.feed_error().map(str::to_string),
            poll_latency: self.latency.percentiles(),
            disposed: self.disposed,
        }
    }

    fn publish(&self) {
        let next = self.state();
        self.published.send_if_modified(|current| {
            if *current == next {
                return false;
            }
            *current = next;
            true
        });
    }
}

fn initial_state() -> DeskState {
    DeskState {
        run_state: RunState::Offline,
        busy: false,
        in_flight: None,
        last_error: None,
        snapshot: None,
        quote: None,
        connection: ConnectionState::Disconnected,
        last_quote_at: None,
        transport_error: None,
        feed_error: None,
        poll_latency: None,
        disposed: false,
    }
}
