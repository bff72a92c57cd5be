#![warn(clippy::all, clippy::pedantic)]

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use actix_web::web::Data;
use actix_web::{App, HttpServer};
use tracing::{info, warn};
use tunnelwatch::coordinator::{LogSink, NotificationSink, SubscriberNotifier, WebhookSink};
use tunnelwatch::{Config, JsonStore, ProbeExecutor, ProbeSettings, RunCoordinator, StatusStore};

mod error;
mod routes;
mod state;

use error::AppError;
use logger::init_tracing;
use state::AppState;

const WEBHOOK_TIMEOUT: Duration = Duration::from_secs(10);

#[actix_web::main]
async fn main() -> Result<(), AppError> {
    init_tracing();

    // Optional config path as the only argument
    let config_path = std::env::args_os().nth(1).map(PathBuf::from);
    let config = Config::load(config_path)?;

    let addr: SocketAddr = format!("{}:{}", config.server.bind, config.server.port).parse()?;
    run_server(addr, &config).await
}

fn notification_sink(config: &Config) -> Result<Arc<dyn NotificationSink>, AppError> {
    match &config.notify.webhook_url {
        Some(url) => {
            let sink = WebhookSink::new(url.clone(), WEBHOOK_TIMEOUT).map_err(AppError::Notifier)?;
            info!(url = %url, "Delivering notifications to webhook");
            Ok(Arc::new(sink))
        }
        None => {
            warn!("No notify.webhook_url configured, notifications are only logged");
            Ok(Arc::new(LogSink))
        }
    }
}

async fn run_server(addr: SocketAddr, config: &Config) -> Result<(), AppError> {
    let store: Arc<dyn StatusStore> = Arc::new(JsonStore::open(&config.storage.dir).await?);

    let executor = ProbeExecutor::new(&ProbeSettings::from(&config.checks));
    let coordinator = Arc::new(RunCoordinator::new(store.clone(), Arc::new(executor)));
    coordinator.register(Arc::new(SubscriberNotifier::new(store.clone(), notification_sink(config)?)));

    let interval = Duration::from_secs(config.checks.interval_seconds);
    let scheduler = {
        let coordinator = coordinator.clone();
        tokio::spawn(async move { coordinator.run_forever(interval).await })
    };

    if config.server.agent_token.is_none() {
        warn!("No agent token configured, /report and /protocols accept any caller");
    }
    let state = Data::new(AppState::new(store, config.server.agent_token.clone()));

    info!(%addr, "Starting HTTP server");
    let served = HttpServer::new(move || App::new().app_data(state.clone()).configure(routes::routes))
        .bind(addr)?
        .run()
        .await;

    coordinator.stop();
    if let Err(e) = scheduler.await {
        warn!("Scheduler task ended abnormally: {}", e);
    }

    served?;
    Ok(())
}
