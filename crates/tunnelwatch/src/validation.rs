//! Validation of operator input.
//!
//! Protocol descriptors are checked before they reach the store, and
//! configuration values before anything starts.

use anyhow::{Result, anyhow};
use regex::Regex;
use url::Url;

use crate::models::ProtocolConfig;

/// Validate a protocol descriptor before it is stored
pub fn validate_protocol(config: &ProtocolConfig) -> Result<()> {
    if config.id.trim().is_empty() {
        return Err(anyhow!("Protocol id must not be empty"));
    }

    if config.host.trim().is_empty() {
        return Err(anyhow!("Protocol {} has an empty host", config.id));
    }

    validate_port(config.port)?;

    if let Some(client) = &config.client {
        if client.start_command.trim().is_empty() {
            return Err(anyhow!("Protocol {} has an empty client start_command", config.id));
        }

        if let Some(port) = client.socks_port {
            validate_port(port).map_err(|e| anyhow!("Invalid SOCKS port: {}", e))?;
        }

        if let Some(pattern) = &client.ready_regex {
            Regex::new(pattern).map_err(|e| anyhow!("Invalid ready_regex: {}", e))?;
        }

        validate_timeout(client.startup_timeout_sec)?;
    }

    Ok(())
}

/// Validate port is in valid range
fn validate_port(port: u16) -> Result<()> {
    if port == 0 {
        return Err(anyhow!("Port 0 is not valid"));
    }
    Ok(())
}

/// Validate check interval
pub fn validate_check_interval(interval_seconds: u64) -> Result<()> {
    const MIN_INTERVAL: u64 = 10; // 10 seconds
    const MAX_INTERVAL: u64 = 86400; // 24 hours

    if interval_seconds < MIN_INTERVAL {
        return Err(anyhow!(
            "Check interval too short: {} seconds (minimum: {})",
            interval_seconds,
            MIN_INTERVAL
        ));
    }

    if interval_seconds > MAX_INTERVAL {
        return Err(anyhow!(
            "Check interval too long: {} seconds (maximum: {})",
            interval_seconds,
            MAX_INTERVAL
        ));
    }

    Ok(())
}

/// Validate timeout is reasonable
pub fn validate_timeout(timeout_seconds: u64) -> Result<()> {
    const MIN_TIMEOUT: u64 = 1;
    const MAX_TIMEOUT: u64 = 300; // 5 minutes

    if timeout_seconds < MIN_TIMEOUT {
        return Err(anyhow!(
            "Timeout too short: {} seconds (minimum: {})",
            timeout_seconds,
            MIN_TIMEOUT
        ));
    }

    if timeout_seconds > MAX_TIMEOUT {
        return Err(anyhow!(
            "Timeout too long: {} seconds (maximum: {})",
            timeout_seconds,
            MAX_TIMEOUT
        ));
    }

    Ok(())
}

/// Validate an http(s) URL such as the proxied probe target
pub fn validate_http_url(target: &str) -> Result<()> {
    let url = Url::parse(target).map_err(|e| anyhow!("Invalid URL {}: {}", target, e))?;

    match url.scheme() {
        "http" | "https" => Ok(()),
        other => Err(anyhow!("Invalid scheme for URL {}: {}", target, other)),
    }
}
