use actix_web::web::Data;
use actix_web::{HttpRequest, HttpResponse, get};

use crate::error::ApiError;
use crate::state::AppState;

macros_utils::routes! {
    route protocols_route,
}

/// Protocol list for regional agents
#[get("/protocols")]
pub async fn protocols_route(req: HttpRequest, state: Data<AppState>) -> Result<HttpResponse, ApiError> {
    state.authorize(&req)?;
    let protocols = state.store.list_protocols().await?;
    Ok(HttpResponse::Ok().json(protocols))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routes::test_support::state;
    use actix_web::http::StatusCode;
    use actix_web::{App, test};
    use tunnelwatch::{ProtocolConfig, ProtocolKind, StatusStore};

    #[actix_web::test]
    async fn test_protocols_listing() {
        let (store, state) = state(Some("s3cret"));
        store
            .add_or_replace_protocol(ProtocolConfig::new("ss-1", ProtocolKind::Shadowsocks, "ss.example", 8388))
            .await
            .unwrap();
        let app = test::init_service(App::new().app_data(state).configure(routes)).await;

        let req = test::TestRequest::get().uri("/protocols").to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::UNAUTHORIZED);

        let req = test::TestRequest::get()
            .uri("/protocols")
            .insert_header(("Authorization", "Bearer s3cret"))
            .to_request();
        let protocols: Vec<ProtocolConfig> = test::call_and_read_body_json(&app, req).await;
        assert_eq!(protocols.len(), 1);
        assert_eq!(protocols[0].id, "ss-1");
        assert_eq!(protocols[0].kind, ProtocolKind::Shadowsocks);
    }
}
