use std::{sync::Arc, time::Duration};

use model::{ConnectionState, FRESHNESS_WINDOW_MS};
use quotes::{decode_frame, FeedFrame, ProcessedQuote, QuoteProcessor};
use tokio::{
    sync::{mpsc, oneshot},
    task::JoinHandle,
    time::Instant,
};
use tracing::{debug, info, warn};

pub const FRESHNESS_WINDOW: Duration = Duration::from_millis(FRESHNESS_WINDOW_MS);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    Opened,
    Frame(String),
    /// `clean` is true only for a normal (1000) closure.
    Closed { clean: bool, reason: String },
}

/// A stream event tagged with the generation of the connection that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamEnvelope {
    pub generation: u64,
    pub event: StreamEvent,
}

/// Opens one feed connection per call.
///
/// Implementations report `Opened`, every text frame, and exactly one
/// `Closed` on `events`, and stop once the close signal on the returned
/// handle fires.
pub trait StreamTransport: Send + Sync + 'static {
    fn connect(
        &self,
        generation: u64,
        events: mpsc::UnboundedSender<StreamEnvelope>,
    ) -> StreamHandle;
}

/// Owner side of a running connection task.
#[derive(Debug)]
pub struct StreamHandle {
    close_tx: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl StreamHandle {
    pub fn new(close_tx: oneshot::Sender<()>, task: JoinHandle<()>) -> Self {
        Self {
            close_tx: Some(close_tx),
            task: Some(task),
        }
    }

    /// Asks for a normal closure and waits up to `grace` before aborting.
    pub async fn close(mut self, grace: Duration) {
        if let Some(close_tx) = self.close_tx.take() {
            let _ = close_tx.send(());
        }
        if let Some(mut task) = self.task.take() {
            if tokio::time::timeout(grace, &mut task).await.is_err() {
                warn!(?grace, "feed connection did not close in time, aborting");
                task.abort();
            }
        }
    }
}

impl Drop for StreamHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// Live only while connected and a quote arrived within the freshness window.
pub fn is_fresh(state: ConnectionState, last_quote_at: Option<Instant>, now: Instant) -> bool {
    state == ConnectionState::Connected
        && last_quote_at.is_some_and(|at| now.saturating_duration_since(at) < FRESHNESS_WINDOW)
}

/// Keeps the quote stream open exactly while it is wanted.
pub struct ConnectionSupervisor<T> {
    transport: Arc<T>,
    events: mpsc::UnboundedSender<StreamEnvelope>,
    close_grace: Duration,
    desired: bool,
    state: ConnectionState,
    generation: u64,
    handle: Option<StreamHandle>,
    quotes: QuoteProcessor,
    latest_quote: Option<ProcessedQuote>,
    last_quote_at: Option<Instant>,
    transport_error: Option<String>,
    feed_error: Option<String>,
}

impl<T: StreamTransport> ConnectionSupervisor<T> {
    pub fn new(
        transport: Arc<T>,
        events: mpsc::UnboundedSender<StreamEnvelope>,
        close_grace: Duration,
    ) -> Self {
        Self {
            transport,
            events,
            close_grace,
            desired: false,
            state: ConnectionState::Disconnected,
            generation: 0,
            handle: None,
            quotes: QuoteProcessor::new(),
            latest_quote: None,
            last_quote_at: None,
            transport_error: None,
            feed_error: None,
        }
    }

    /// Opens a connection when wanted and none is active; otherwise closes
    /// the current one and forgets every quote it delivered.
    pub async fn set_desired_connected(&mut self, desired: bool) {
        self.desired = desired;

        if desired {
            if self.state.is_active() {
                return;
            }
            self.generation += 1;
            self.state = ConnectionState::Connecting;
            info!(generation = self.generation, "opening live feed");
            self.handle = Some(self.transport.connect(self.generation, self.events.clone()));
            return;
        }

        // Late events from the closing connection carry the old generation.
        self.generation += 1;
        if let Some(handle) = self.handle.take() {
            handle.close(self.close_grace).await;
            info!("live feed closed");
        }
        self.state = ConnectionState::Disconnected;
        self.quotes.reset();
        self.latest_quote = None;
        self.last_quote_at = None;
        self.transport_error = None;
        self.feed_error = None;
    }

    pub fn handle_event(&mut self, envelope: StreamEnvelope, now: Instant) {
        if envelope.generation != self.generation || !self.desired {
            debug!(
                generation = envelope.generation,
                current = self.generation,
                "ignoring event from a retired connection"
            );
            return;
        }

        match envelope.event {
            StreamEvent::Opened => {
                info!(generation = self.generation, "live feed connected");
                self.state = ConnectionState::Connected;
                self.transport_error = None;
                self.feed_error = None;
            }
            StreamEvent::Frame(text) => self.on_frame(&text, now),
            StreamEvent::Closed { clean, reason } => {
                self.handle = None;
                if clean {
                    info!(%reason, "live feed closed by server");
                    self.state = ConnectionState::Disconnected;
                } else {
                    warn!(%reason, "live feed lost");
                    self.state = ConnectionState::Lost;
                    self.transport_error = Some(if reason.is_empty() {
                        "WebSocket connection lost".to_string()
                    } else {
                        format!("WebSocket connection lost: {reason}")
                    });
                }
            }
        }
    }

    fn on_frame(&mut self, text: &str, now: Instant) {
        match decode_frame(text) {
            Ok(FeedFrame::Quote(raw)) => {
                let processed = self.quotes.process(&raw);
                self.last_quote_at = Some(now);
                self.feed_error = None;
                self.latest_quote = Some(processed);
            }
            Ok(FeedFrame::Error(message)) => {
                warn!(%message, "live feed reported an error");
                self.feed_error = Some(message);
            }
            Ok(FeedFrame::Other(kind)) => debug!(%kind, "ignoring feed frame"),
            Err(err) => warn!(error = %err, "dropping malformed feed frame"),
        }
    }

    /// Clears stream-level errors after the backend answered a full poll.
    pub fn acknowledge_errors(&mut self) {
        self.transport_error = None;
        self.feed_error = None;
    }

    pub fn is_fresh(&self, now: Instant) -> bool {
        is_fresh(self.state, self.last_quote_at, now)
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_desired(&self) -> bool {
        self.desired
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn latest_quote(&self) -> Option<&ProcessedQuote> {
        self.latest_quote.as_ref()
    }

    pub fn last_quote_at(&self) -> Option<Instant> {
        self.last_quote_at
    }

    pub fn transport_error(&self) -> Option<&str> {
        self.transport_error.as_deref()
    }

    pub fn feed_error(&self) -> Option<&str> {
        self.feed_error.as_deref()
    }
}
