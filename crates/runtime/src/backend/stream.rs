use futures_util::{SinkExt, StreamExt};
use reqwest::Url;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::{
    connect_async,
    tungstenite::protocol::{frame::coding::CloseCode, CloseFrame, Message},
};
use tracing::{debug, warn};

use crate::supervisor::{StreamEnvelope, StreamEvent, StreamHandle, StreamTransport};

/// Quote feed over a WebSocket; one task per connection.
#[derive(Debug, Clone)]
pub struct WsTransport {
    url: Url,
}

impl WsTransport {
    pub fn new(url: Url) -> Self {
        Self { url }
    }
}

impl StreamTransport for WsTransport {
    fn connect(
        &self,
        generation: u64,
        events: mpsc::UnboundedSender<StreamEnvelope>,
    ) -> StreamHandle {
        let (close_tx, close_rx) = oneshot::channel();
        let task = tokio::spawn(run_connection(
            self.url.clone(),
            generation,
            events,
            close_rx,
        ));
        StreamHandle::new(close_tx, task)
    }
}

async fn run_connection(
    url: Url,
    generation: u64,
    events: mpsc::UnboundedSender<StreamEnvelope>,
    mut close_rx: oneshot::Receiver<()>,
) {
    let emit = |event: StreamEvent| {
        let _ = events.send(StreamEnvelope { generation, event });
    };

    let mut ws = match connect_async(url.as_str()).await {
        Ok((ws, _)) => ws,
        Err(err) => {
            warn!(%url, error = %err, "live feed connection failed");
            emit(StreamEvent::Closed {
                clean: false,
                reason: err.to_string(),
            });
            return;
        }
    };
    emit(StreamEvent::Opened);

    loop {
        tokio::select! {
            _ = &mut close_rx => {
                let frame = CloseFrame {
                    code: CloseCode::Normal,
                    reason: "client closing".into(),
                };
                if let Err(err) = ws.close(Some(frame)).await {
                    debug!(error = %err, "close handshake failed");
                }
                // Drain until the server echoes the close.
                while let Some(Ok(_)) = ws.next().await {}
                emit(StreamEvent::Closed {
                    clean: true,
                    reason: "closed by client".to_string(),
                });
                return;
            }
            message = ws.next() => match message {
                Some(Ok(Message::Text(text))) => emit(StreamEvent::Frame(text)),
                Some(Ok(Message::Binary(bytes))) => match String::from_utf8(bytes) {
                    Ok(text) => emit(StreamEvent::Frame(text)),
                    Err(_) => debug!("ignoring non-utf8 binary frame"),
                },
                Some(Ok(Message::Ping(payload))) => {
                    if let Err(err) = ws.send(Message::Pong(payload)).await {
                        debug!(error = %err, "failed to answer ping");
                    }
                }
                Some(Ok(Message::Close(frame))) => {
                    let (clean, reason) = match frame {
                        Some(frame) => (
                            frame.code == CloseCode::Normal,
                            format!("{} {}", u16::from(frame.code), frame.reason),
                        ),
                        None => (false, "closed without status".to_string()),
                    };
                    emit(StreamEvent::Closed { clean, reason });
                    return;
                }
                Some(Ok(_)) => {}
                Some(Err(err)) => {
                    emit(StreamEvent::Closed {
                        clean: false,
                        reason: err.to_string(),
                    });
                    return;
                }
                None => {
                    emit(StreamEvent::Closed {
                        clean: false,
                        reason: "stream ended".to_string(),
                    });
                    return;
                }
            },
        }
    }
}
