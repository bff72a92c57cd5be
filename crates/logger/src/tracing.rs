use std::env::var;

use tracing::{level_filters::LevelFilter, warn};
use tracing_subscriber::{Layer, filter::EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// HTTP plumbing logs at `info` drown out probe results
const QUIET_DEPENDENCIES: [&str; 3] = ["hyper_util=warn", "reqwest=warn", "actix_server=warn"];

pub fn init_tracing() {
    init_tracing_with_level(LevelFilter::INFO);
}

/// Install the global subscriber
///
/// `RUST_LOG` overrides `level`; `RUST_LOG_FORMAT=json` switches to JSON lines.
/// Calling this twice keeps the first subscriber.
pub fn init_tracing_with_level(level: LevelFilter) {
    let mut env_filter = EnvFilter::builder().with_default_directive(level.into()).from_env_lossy();
    if var("RUST_LOG").is_err() {
        for directive in QUIET_DEPENDENCIES {
            if let Ok(directive) = directive.parse() {
                env_filter = env_filter.add_directive(directive);
            }
        }
    }

    let log_format = var("RUST_LOG_FORMAT").unwrap_or_default();

    let log_layer = match log_format.as_str() {
        "json" => tracing_subscriber::fmt::layer().json().with_filter(env_filter).boxed(),
        _ => tracing_subscriber::fmt::layer()
            .compact()
            .without_time()
            .with_filter(env_filter)
            .boxed(),
    };

    if tracing_subscriber::registry().with(log_layer).try_init().is_err() {
        return;
    }

    if !matches!(log_format.as_str(), "" | "json" | "compact") {
        warn!("Unknown RUST_LOG_FORMAT {log_format:?}, using compact output");
    }
}
