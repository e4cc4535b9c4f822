use std::{
    net::SocketAddr,
    sync::{Arc, Mutex},
    time::Duration,
};

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use model::{ConnectionState, ControlCommand, QuoteDirection, RunState};
use reqwest::Url;
use runtime::{
    backend::{BackendEndpoints, HttpBackend, WsTransport},
    DeskHandle, DeskSettings, DeskState, LiveDesk,
};
use serde_json::{json, Value};
use tokio::net::TcpListener;

const UP: &str = r#"{"type":"quote","data":{"S":"AAPL","bp":100,"ap":101}}"#;
const DOWN: &str = r#"{"type":"quote","data":{"symbol":"AAPL","bid_price":99,"ask_price":100}}"#;

#[derive(Default)]
struct MockState {
    status: &'static str,
    risk_down: bool,
    start_bodies: Vec<Value>,
    close_codes: Vec<u16>,
}

#[derive(Clone, Default)]
struct MockBackend {
    state: Arc<Mutex<MockState>>,
}

impl MockBackend {
    fn new(status: &'static str) -> Self {
        let mock = Self::default();
        mock.state.lock().unwrap().status = status;
        mock
    }
}

async fn status(State(mock): State<MockBackend>) -> Json<Value> {
    let status = mock.state.lock().unwrap().status;
    Json(json!({
        "status": status,
        "active_strategies": ["momentum"],
        "last_update": "2024-05-01T14:30:00.123456",
        "paper_trading": true
    }))
}

async fn positions() -> Json<Value> {
    Json(json!([{
        "symbol": "AAPL",
        "quantity": -5,
        "entry_price": 190.0,
        "current_price": 185.0,
        "market_value": -925.0,
        "unrealized_pnl": 25.0,
        "pnl_percentage": 2.7,
        "strategy_name": "Mean Reversion",
        "entry_time": "2024-05-01T13:00:00"
    }]))
}

async fn metrics() -> Json<Value> {
    Json(json!({
        "performance": {"total_pnl": 1200.5, "daily_pnl": -40.0, "total_trades": 12, "win_rate": 58.3},
        "positions": {"total_positions": 1, "total_market_value": -925.0, "total_unrealized_pnl": 25.0}
    }))
}

async fn risk(State(mock): State<MockBackend>) -> Response {
    if mock.state.lock().unwrap().risk_down {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"detail": "risk engine down"})),
        )
            .into_response();
    }
    Json(json!({"level": "medium", "score": 41.0})).into_response()
}

async fn market_status() -> Json<Value> {
    Json(json!({
        "is_open": true,
        "time_until_close": {"days": 0, "hours": 1, "minutes": 5}
    }))
}

async fn start(State(mock): State<MockBackend>, Json(body): Json<Value>) -> Json<Value> {
    let mut state = mock.state.lock().unwrap();
    state.start_bodies.push(body);
    state.status = "running";
    Json(json!({"message": "Live trading started", "status": "running"}))
}

async fn stop(State(mock): State<MockBackend>) -> Json<Value> {
    mock.state.lock().unwrap().status = "stopped";
    Json(json!({"message": "Live trading stopped", "status": "stopped"}))
}

async fn feed(ws: WebSocketUpgrade, State(mock): State<MockBackend>) -> Response {
    ws.on_upgrade(move |socket| serve_feed(socket, mock))
}

async fn serve_feed(mut socket: WebSocket, mock: MockBackend) {
    for frame in [UP, DOWN] {
        if socket.send(Message::Text(frame.to_string())).await.is_err() {
            return;
        }
    }
    while let Some(Ok(message)) = socket.recv().await {
        if let Message::Close(frame) = message {
            let code = frame.map(|frame| frame.code).unwrap_or_default();
            mock.state.lock().unwrap().close_codes.push(code);
            return;
        }
    }
}

async fn serve(mock: MockBackend) -> SocketAddr {
    let app = Router::new()
        .route("/api/live-trading/status", get(status))
        .route("/api/live-trading/positions", get(positions))
        .route("/api/live-trading/metrics", get(metrics))
        .route("/api/live-trading/risk", get(risk))
        .route("/api/market/market-status", get(market_status))
        .route("/api/live-trading/start", post(start))
        .route("/api/live-trading/stop", post(stop))
        .route("/live-trading/ws/live-feed", get(feed))
        .with_state(mock);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

fn desk_for(addr: SocketAddr) -> DeskHandle {
    let origin = Url::parse(&format!("http://{addr}")).unwrap();
    let endpoints = BackendEndpoints::from_origin(&origin, "/api", addr.port()).unwrap();
    let http = HttpBackend::new(endpoints.clone(), Duration::from_secs(2)).unwrap();
    let feed = WsTransport::new(endpoints.feed_url().clone());
    let settings = DeskSettings {
        poll_interval: Duration::from_millis(200),
        ..DeskSettings::default()
    };

    let (desk, _task) = LiveDesk::spawn(Arc::new(http.clone()), Arc::new(http), Arc::new(feed), settings);
    desk
}

async fn wait_for(desk: &DeskHandle, what: &str, check: impl Fn(&DeskState) -> bool) -> DeskState {
    let mut updates = desk.subscribe();
    let waited = tokio::time::timeout(Duration::from_secs(10), updates.wait_for(|s| check(s))).await;
    let state = match waited {
        Ok(Ok(state)) => state.clone(),
        _ => panic!("desk never reached: {what}; last state {:?}", desk.state()),
    };
    state
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn start_stream_and_stop_against_http_backend() {
    let mock = MockBackend::new("stopped");
    let addr = serve(mock.clone()).await;
    let desk = desk_for(addr);

    let state = wait_for(&desk, "stopped", |s| s.run_state == RunState::Stopped).await;
    let snapshot = state.snapshot.expect("snapshot");
    assert!(snapshot.positions[0].is_short());
    assert_eq!(snapshot.performance.total_trades, 12);

    desk.issue(ControlCommand::start(12.5).unwrap())
        .await
        .expect("start succeeds");
    let state = wait_for(&desk, "falling quote", |s| {
        s.quote.as_ref().is_some_and(|q| q.direction == QuoteDirection::Down)
    })
    .await;
    assert_eq!(state.run_state, RunState::Running);
    assert_eq!(state.connection, ConnectionState::Connected);
    assert_eq!(
        mock.state.lock().unwrap().start_bodies,
        vec![json!({"risk_per_trade": 12.5})]
    );

    desk.issue(ControlCommand::Stop).await.expect("stop succeeds");
    let state = wait_for(&desk, "stopped", |s| s.run_state == RunState::Stopped && !s.busy).await;
    assert_eq!(state.connection, ConnectionState::Disconnected);
    assert!(state.quote.is_none());
    assert_eq!(mock.state.lock().unwrap().close_codes, vec![1000]);

    desk.dispose().await;
}

#[tokio::test]
async fn error_detail_from_failing_read_is_surfaced() {
    let mock = MockBackend::new("running");
    mock.state.lock().unwrap().risk_down = true;
    let addr = serve(mock).await;
    let desk = desk_for(addr);

    let state = wait_for(&desk, "offline", |s| s.last_error.is_some()).await;

    assert_eq!(state.run_state, RunState::Offline);
    assert_eq!(
        state.last_error.as_deref(),
        Some("risk read failed: risk engine down")
    );
    desk.dispose().await;
}

#[tokio::test]
async fn unreachable_backend_reads_as_offline() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    let desk = desk_for(addr);

    let state = wait_for(&desk, "offline", |s| s.last_error.is_some()).await;

    assert_eq!(state.run_state, RunState::Offline);
    assert!(state
        .last_error
        .as_deref()
        .is_some_and(|e| e.contains("Network error: Unable to connect to server")));
    desk.dispose().await;
}
