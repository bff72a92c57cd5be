use actix_web::web::Data;
use actix_web::{HttpResponse, get};
use serde::Serialize;
use tunnelwatch::models::{ProtocolOverview, StatusCounts};
use tunnelwatch::store::overview;

use crate::error::ApiError;
use crate::state::AppState;

macros_utils::routes! {
    route status_route,
}

#[derive(Serialize)]
struct StatusBody {
    counts: StatusCounts,
    protocols: Vec<ProtocolOverview>,
}

/// Every protocol with its local and regional results
#[get("/status")]
pub async fn status_route(state: Data<AppState>) -> Result<HttpResponse, ApiError> {
    let protocols = overview(state.store.as_ref()).await?;
    let counts = StatusCounts::tally(&protocols);
    Ok(HttpResponse::Ok().json(StatusBody { counts, protocols }))
}
