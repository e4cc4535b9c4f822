use std::sync::Arc;

use axum::{routing::get, Router};
use runtime::{
    backend::{BackendEndpoints, EndpointError, HttpBackend, WsTransport},
    DeskHandle, LiveDesk,
};
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::info;

use crate::config::Config;

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("backend endpoints: {0}")]
    Endpoints(#[from] EndpointError),
    #[error("http client: {0}")]
    HttpClient(#[from] reqwest::Error),
}

pub fn build_app(desk: DeskHandle) -> Router {
    api::app(desk).route("/health", get(healthcheck))
}

/// Connects the desk to the configured backend and starts it.
pub fn start_desk(config: &Config) -> Result<(DeskHandle, JoinHandle<()>), StartupError> {
    let endpoints = BackendEndpoints::from_origin(
        &config.backend_origin,
        &config.api_base_path,
        config.feed_port,
    )?;
    info!(
        rest = %endpoints.rest_base(),
        feed = %endpoints.feed_url(),
        "resolved backend endpoints"
    );

    let transport = WsTransport::new(endpoints.feed_url().clone());
    let backend = Arc::new(HttpBackend::new(endpoints, config.command_timeout)?);

    Ok(LiveDesk::spawn(
        Arc::clone(&backend),
        backend,
        Arc::new(transport),
        config.desk_settings(),
    ))
}

async fn healthcheck() -> &'static str {
    "ok"
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::Duration};

    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
    };
    use model::ReportedState;
    use runtime::{
        testing::{FakeTransport, ScriptedBackend},
        DeskSettings, LiveDesk,
    };
    use tower::ServiceExt;

    use super::{build_app, start_desk};
    use crate::config::Config;

    fn config(origin: &str) -> Config {
        Config {
            listen_addr: "127.0.0.1:0".parse().unwrap(),
            backend_origin: origin.parse().unwrap(),
            api_base_path: "/api".to_string(),
            feed_port: 8000,
            poll_interval: Duration::from_secs(5),
            poll_timeout: Duration::from_secs(5),
            command_timeout: Duration::from_secs(10),
            stop_retry_delay: Duration::from_secs(2),
            log_filter: "info".to_string(),
        }
    }

    #[tokio::test]
    async fn server_healthcheck_responds_ok() {
        let backend = ScriptedBackend::new(ReportedState::Stopped);
        let (desk, _task) = LiveDesk::spawn(
            Arc::new(backend.clone()),
            Arc::new(backend),
            Arc::new(FakeTransport::new()),
            DeskSettings::default(),
        );
        let app = build_app(desk.clone());

        let response = app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"ok");
        desk.dispose().await;
    }

    #[tokio::test]
    async fn start_desk_runs_until_disposed() {
        // Nothing listens on port 9; the desk reports offline but keeps running.
        let (desk, task) = start_desk(&config("http://127.0.0.1:9")).unwrap();

        desk.dispose().await;
        tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .expect("desk task exits after dispose")
            .unwrap();
        assert!(desk.state().disposed);
    }
}
