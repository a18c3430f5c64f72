//! Read endpoints over the aggregate table. `device_id`, `day` and `limit`
//! filters are applied in SQL; results are ordered by (device, day).

use axum::{extract::Query, extract::State, routing::get, Json, Router};
use tracing::info;

use crate::{AggregateRow, AggregateStore, LocationRow, RecordsQuery, Result};

// ---

pub fn router() -> Router<AggregateStore> {
    // ---
    Router::new()
        .route("/records", get(records))
        .route("/locations", get(locations))
}

async fn records(
    Query(params): Query<RecordsQuery>,
    State(store): State<AggregateStore>,
) -> Result<Json<Vec<AggregateRow>>> {
    // ---
    info!("GET /records - filter: {:?}", params);
    let rows = store.query(&params).await?;
    info!("GET /records - returning {} rows", rows.len());
    Ok(Json(rows))
}

async fn locations(
    Query(params): Query<RecordsQuery>,
    State(store): State<AggregateStore>,
) -> Result<Json<Vec<LocationRow>>> {
    // ---
    info!("GET /locations - filter: {:?}", params);
    let rows = store.locations(&params).await?;
    info!("GET /locations - returning {} rows", rows.len());
    Ok(Json(rows))
}
