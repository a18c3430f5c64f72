// src/routes/info.rs
//! Static usage text and storage diagnostics.
//!
//! - `GET /` returns a status plus a short list of the available endpoints.
//! - `GET /debug` reports whether the SQLite file backing the store exists
//!   and how large it is. An in-memory store reports `exists: false`.

use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;
use tracing::debug;

use crate::{AggregateStore, BackingFile};

/// JSON response body for `GET /`.
#[derive(Serialize)]
struct RootResponse {
    status: &'static str,
    instructions: [&'static str; 5],
}

async fn root() -> Json<RootResponse> {
    Json(RootResponse {
        status: "successful",
        instructions: [
            "For daily aggregates use: GET /records?device_id=&day=&limit=",
            "For last known positions use: GET /locations?device_id=&day=&limit=",
            "To report a position use: POST /user_location",
            "To report band vitals use: POST /user_wrist",
            "To report band and/or room readings use: POST /user_data",
        ],
    })
}

async fn debug_info(State(store): State<AggregateStore>) -> Json<BackingFile> {
    // ---
    let info = store.backing_file().await;
    debug!("GET /debug - {:?}", info);
    Json(info)
}

pub fn router() -> Router<AggregateStore> {
    // ---
    Router::new()
        .route("/", get(root))
        .route("/debug", get(debug_info))
}
