use actix_web::web::ServiceConfig;

mod health;
mod protocols;
mod report;
mod status;

pub fn routes(cfg: &mut ServiceConfig) {
    cfg.configure(health::routes)
        .configure(report::routes)
        .configure(protocols::routes)
        .configure(status::routes);
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Arc;

    use actix_web::web::Data;
    use tunnelwatch::MemoryStore;

    use crate::state::AppState;

    pub fn state(token: Option<&str>) -> (Arc<MemoryStore>, Data<AppState>) {
        let store = Arc::new(MemoryStore::new());
        let state = AppState::new(store.clone(), token.map(str::to_string));
        (store, Data::new(state))
    }
}
