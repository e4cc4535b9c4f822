use std::time::Duration;

use async_trait::async_trait;
use model::{BackendStatus, CommandKind, ControlCommand, MarketHours, Position, RiskReading};
use reqwest::{Client, Response};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use tracing::debug;

use super::endpoints::BackendEndpoints;
use crate::{
    commands::{CommandAck, CommandError, ControlApi},
    poller::{Endpoint, MetricsReading, ReadError, StatusSource},
};

#[derive(Debug, Serialize)]
struct StartBody {
    risk_per_trade: f64,
}

/// REST client for the status reads and the control requests.
#[derive(Debug, Clone)]
pub struct HttpBackend {
    http: Client,
    endpoints: BackendEndpoints,
    request_timeout: Duration,
}

impl HttpBackend {
    pub fn new(endpoints: BackendEndpoints, request_timeout: Duration) -> Result<Self, reqwest::Error> {
        let http = Client::builder().timeout(request_timeout).build()?;
        Ok(Self {
            http,
            endpoints,
            request_timeout,
        })
    }

    async fn read<T: DeserializeOwned>(&self, endpoint: Endpoint) -> Result<T, ReadError> {
        let url = self
            .endpoints
            .rest_url(endpoint.path())
            .map_err(|err| ReadError::network(endpoint, err))?;
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|err| ReadError::network(endpoint, err))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ReadError::http(
                endpoint,
                status.as_u16(),
                error_detail(response).await,
            ));
        }
        response
            .json::<T>()
            .await
            .map_err(|err| ReadError::decode(endpoint, err))
    }
}

/// FastAPI-style `{"detail": "..."}` bodies carry the human-readable reason.
async fn error_detail(response: Response) -> Option<String> {
    let body: Value = response.json().await.ok()?;
    match body.get("detail")? {
        Value::String(detail) if !detail.is_empty() => Some(detail.clone()),
        Value::Null => None,
        other => Some(other.to_string()),
    }
}

fn command_path(kind: CommandKind) -> &'static str {
    match kind {
        CommandKind::Start => "live-trading/start",
        CommandKind::Stop => "live-trading/stop",
        CommandKind::Pause => "live-trading/pause",
        CommandKind::Resume => "live-trading/resume",
    }
}

#[async_trait]
impl StatusSource for HttpBackend {
    async fn status(&self) -> Result<BackendStatus, ReadError> {
        self.read(Endpoint::Status).await
    }

    async fn positions(&self) -> Result<Vec<Position>, ReadError> {
        self.read(Endpoint::Positions).await
    }

    async fn metrics(&self) -> Result<MetricsReading, ReadError> {
        self.read(Endpoint::Metrics).await
    }

    async fn risk(&self) -> Result<RiskReading, ReadError> {
        self.read(Endpoint::Risk).await
    }

    async fn market_hours(&self) -> Result<MarketHours, ReadError> {
        self.read(Endpoint::MarketStatus).await
    }
}

#[async_trait]
impl ControlApi for HttpBackend {
    async fn send(&self, command: ControlCommand) -> Result<CommandAck, CommandError> {
        let kind = command.kind();
        let url = self
            .endpoints
            .rest_url(command_path(kind))
            .map_err(|err| CommandError::Network(err.to_string()))?;

        let request = match command {
            ControlCommand::Start { risk_per_trade } => {
                self.http.post(url).json(&StartBody { risk_per_trade })
            }
            _ => self.http.post(url),
        };
        debug!(command = %kind, "sending control request");

        let response = request.send().await.map_err(|err| {
            if err.is_timeout() {
                CommandError::TimedOut(self.request_timeout)
            } else {
                CommandError::Network(err.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(CommandError::http(
                status.as_u16(),
                error_detail(response).await,
            ));
        }

        let body = response
            .bytes()
            .await
            .map_err(|err| CommandError::Network(err.to_string()))?;
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(CommandAck::default());
        }
        serde_json::from_slice(&body).map_err(|err| CommandError::Decode(err.to_string()))
    }
}
