use std::sync::Arc;

use actix_web::HttpRequest;
use actix_web::http::header::AUTHORIZATION;
use tunnelwatch::StatusStore;

use crate::error::ApiError;

/// Shared by every handler
pub struct AppState {
    pub store: Arc<dyn StatusStore>,
    /// Bearer token agents must present; `None` leaves the agent routes open
    pub agent_token: Option<String>,
}

impl AppState {
    pub fn new(store: Arc<dyn StatusStore>, agent_token: Option<String>) -> Self {
        Self { store, agent_token: agent_token.filter(|t| !t.is_empty()) }
    }

    /// Check the `Authorization: Bearer` header when a token is configured
    pub fn authorize(&self, req: &HttpRequest) -> Result<(), ApiError> {
        let Some(expected) = &self.agent_token else {
            return Ok(());
        };

        let presented = req
            .headers()
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .map(str::trim);

        match presented {
            Some(token) if token == expected => Ok(()),
            _ => Err(ApiError::Unauthorized),
        }
    }
}
