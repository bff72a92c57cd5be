use actix_web::{HttpResponse, Responder, get};
use serde_json::json;

macros_utils::routes! {
    route health_route,
}

/// Liveness probe for the central server
#[get("/health")]
pub async fn health_route() -> impl Responder {
    HttpResponse::Ok().json(json!({ "status": "ok" }))
}
