//! Ingestion endpoints, one per channel family.
//!
//! Each handler resolves its payload into a [`Sample`] (defaulting `day` to
//! today), folds it into the (device, day) row through the store's atomic
//! upsert and echoes the accepted sample back. Storage failures propagate as
//! server errors; nothing is retried.

use axum::{extract::State, routing::post, Json, Router};
use serde::Serialize;
use tracing::info;

use crate::{
    aggregator, AggregateRow, AggregateStore, DataPayload, LocationPayload, Result, Sample,
    WristPayload,
};

// ---

pub fn router() -> Router<AggregateStore> {
    // ---
    Router::new()
        .route("/user_location", post(user_location))
        .route("/user_wrist", post(user_wrist))
        .route("/user_data", post(user_data))
}

/// Acknowledgement returned for every accepted sample.
#[derive(Debug, Serialize)]
pub struct IngestAck {
    status: &'static str,
    data: Sample,
}

async fn user_location(
    State(store): State<AggregateStore>,
    Json(payload): Json<LocationPayload>,
) -> Result<Json<IngestAck>> {
    // ---
    accept(&store, payload.into_sample()?, "/user_location").await
}

async fn user_wrist(
    State(store): State<AggregateStore>,
    Json(payload): Json<WristPayload>,
) -> Result<Json<IngestAck>> {
    // ---
    accept(&store, payload.into_sample()?, "/user_wrist").await
}

async fn user_data(
    State(store): State<AggregateStore>,
    Json(payload): Json<DataPayload>,
) -> Result<Json<IngestAck>> {
    // ---
    accept(&store, payload.into_sample()?, "/user_data").await
}

async fn accept(store: &AggregateStore, sample: Sample, route: &str) -> Result<Json<IngestAck>> {
    // ---
    let key = sample.key();
    let row = store
        .upsert(&key, |old| {
            aggregator::merge(old.unwrap_or_else(|| AggregateRow::empty(&key)), &sample)
        })
        .await?;

    info!(
        "POST {} - {} band={} room={}",
        route, key, row.band_records_inserted, row.room_records_inserted
    );

    Ok(Json(IngestAck {
        status: "successful",
        data: sample,
    }))
}
