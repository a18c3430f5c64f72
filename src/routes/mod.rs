//! Route gateway (EMBP): merges every subrouter and attaches shared state,
//! so `main.rs` never needs to know individual endpoints.

use axum::Router;
use tower_http::trace::TraceLayer;

use crate::AggregateStore;

mod info;
mod ingest;
mod records;

// ---

pub fn router(store: AggregateStore) -> Router {
    // ---
    Router::new()
        .merge(info::router())
        .merge(ingest::router())
        .merge(records::router())
        .with_state(store)
        .layer(TraceLayer::new_for_http())
}
