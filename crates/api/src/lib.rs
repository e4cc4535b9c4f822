pub mod routes;
pub mod state;
mod ws;

use axum::Router;
use runtime::DeskHandle;

pub fn app(desk: DeskHandle) -> Router {
    routes::router(state::AppState::new(desk))
}
