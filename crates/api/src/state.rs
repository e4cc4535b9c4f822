use runtime::{DeskHandle, DeskState};
use tokio::time::Instant;
use view::{project, DisplayModel, ProjectionInput};

#[derive(Clone)]
pub struct AppState {
    desk: DeskHandle,
}

impl AppState {
    pub fn new(desk: DeskHandle) -> Self {
        Self { desk }
    }

    pub fn desk(&self) -> &DeskHandle {
        &self.desk
    }

    pub fn view(&self) -> DisplayModel {
        project_desk(&self.desk.state(), Instant::now())
    }
}

/// Renders a published desk state; freshness is judged against `now`.
pub fn project_desk(state: &DeskState, now: Instant) -> DisplayModel {
    project(&ProjectionInput {
        run_state: state.run_state,
        busy: state.busy,
        snapshot: state.snapshot.as_deref(),
        quote: state.quote.as_ref(),
        connection: state.connection,
        fresh: state.is_fresh(now),
        alert: state.banner(),
        feed_error: state.feed_message(),
    })
}
