use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use model::{ControlCommand, RunState};
use runtime::IssueError;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{state::AppState, ws};

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/view", get(current_view))
        .route("/control/start", post(start))
        .route("/control/stop", post(stop))
        .route("/control/pause", post(pause))
        .route("/control/resume", post(resume))
        .route("/refresh", post(refresh))
        .route("/metrics/poll-latency", get(poll_latency))
        .route("/ws/view", get(ws::view_socket))
        .with_state(state)
}

#[derive(Debug, Deserialize)]
struct StartRequest {
    risk_per_trade: f64,
}

#[derive(Debug, Serialize)]
struct ControlResponse {
    run_state: RunState,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

async fn current_view(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.view())
}

async fn start(State(state): State<AppState>, Json(body): Json<StartRequest>) -> Response {
    match ControlCommand::start(body.risk_per_trade) {
        Ok(command) => issue(&state, command).await,
        Err(err) => error_response(StatusCode::UNPROCESSABLE_ENTITY, err.to_string()),
    }
}

async fn stop(State(state): State<AppState>) -> Response {
    issue(&state, ControlCommand::Stop).await
}

async fn pause(State(state): State<AppState>) -> Response {
    issue(&state, ControlCommand::Pause).await
}

async fn resume(State(state): State<AppState>) -> Response {
    issue(&state, ControlCommand::Resume).await
}

async fn issue(state: &AppState, command: ControlCommand) -> Response {
    match state.desk().issue(command).await {
        Ok(()) => {
            let run_state = state.desk().state().run_state;
            (StatusCode::OK, Json(ControlResponse { run_state })).into_response()
        }
        Err(err) => {
            debug!(command = %command.kind(), error = %err, "control request not completed");
            error_response(issue_status(&err), err.to_string())
        }
    }
}

fn issue_status(err: &IssueError) -> StatusCode {
    match err {
        IssueError::Rejected(_) => StatusCode::CONFLICT,
        IssueError::Failed(_) | IssueError::Degraded(_) => StatusCode::BAD_GATEWAY,
        IssueError::Closed => StatusCode::SERVICE_UNAVAILABLE,
    }
}

fn error_response(status: StatusCode, error: String) -> Response {
    (status, Json(ErrorResponse { error })).into_response()
}

async fn refresh(State(state): State<AppState>) -> Response {
    match state.desk().refresh_now().await {
        Ok(()) => StatusCode::ACCEPTED.into_response(),
        Err(err) => error_response(issue_status(&err), err.to_string()),
    }
}

async fn poll_latency(State(state): State<AppState>) -> Response {
    match state.desk().state().poll_latency {
        Some(percentiles) => Json(percentiles).into_response(),
        None => StatusCode::NO_CONTENT.into_response(),
    }
}
