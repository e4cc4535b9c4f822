use std::time::Duration;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use tokio::time::{Instant, MissedTickBehavior};
use view::DisplayModel;

use crate::state::{project_desk, AppState};

/// Freshness decays with time alone, so the view is re-rendered at least this often.
const VIEW_RECHECK: Duration = Duration::from_secs(1);

pub async fn view_socket(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| stream_view(socket, state))
}

async fn stream_view(mut socket: WebSocket, state: AppState) {
    let mut updates = state.desk().subscribe();
    let mut recheck = tokio::time::interval(VIEW_RECHECK);
    recheck.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut last_sent: Option<String> = None;

    loop {
        let model = {
            let desk_state = updates.borrow_and_update();
            project_desk(&desk_state, Instant::now())
        };
        let Ok(payload) = view_json(&model) else {
            return;
        };
        if last_sent.as_deref() != Some(payload.as_str()) {
            if socket.send(Message::Text(payload.clone())).await.is_err() {
                return;
            }
            last_sent = Some(payload);
        }

        tokio::select! {
            inbound = socket.recv() => {
                match inbound {
                    Some(Ok(Message::Close(_))) | None => return,
                    Some(Ok(_)) => {}
                    Some(Err(_)) => return,
                }
            }
            changed = updates.changed() => {
                if changed.is_err() {
                    return;
                }
            }
            _ = recheck.tick() => {}
        }
    }
}

fn view_json(model: &DisplayModel) -> Result<String, serde_json::Error> {
    serde_json::to_string(model)
}
