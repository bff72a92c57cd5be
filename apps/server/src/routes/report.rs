use actix_web::web::{Bytes, Data};
use actix_web::{HttpRequest, HttpResponse, post};
use tracing::info;
use tunnelwatch::report::{IngestAck, RegionReport, ingest_report};

use crate::error::ApiError;
use crate::state::AppState;

macros_utils::routes! {
    route report_route,
}

/// Merge a batch of regional results
#[post("/report")]
pub async fn report_route(
    req: HttpRequest,
    state: Data<AppState>,
    body: Bytes,
) -> Result<HttpResponse, ApiError> {
    // Token is checked before the body is parsed
    state.authorize(&req)?;
    let report: RegionReport =
        serde_json::from_slice(&body).map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let summary = ingest_report(state.store.as_ref(), &report).await?;
    info!(
        region = %report.region,
        accepted = summary.accepted,
        skipped = summary.skipped,
        "Regional report received"
    );

    Ok(HttpResponse::Ok().json(IngestAck::from(summary)))
}
