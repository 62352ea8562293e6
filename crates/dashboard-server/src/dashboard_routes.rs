//! Dashboard Page Routes

use axum::{
    extract::{Query, State},
    response::Html,
    routing::get,
    Router,
};

use crate::{page, AppState, SelectionQuery};

pub fn dashboard_routes() -> Router<AppState> {
    Router::new().route("/", get(dashboard))
}

/// Render the dashboard. Unknown selector values fall back to the defaults
/// rather than failing the page.
async fn dashboard(State(state): State<AppState>, Query(query): Query<SelectionQuery>) -> Html<String> {
    let (length, mode) = query.resolve().unwrap_or_else(|e| {
        tracing::debug!("Ignoring invalid selection {:?}: {}", query, e);
        Default::default()
    });

    let report = state.report(length, mode).await;
    Html(page::render_dashboard(&report))
}
