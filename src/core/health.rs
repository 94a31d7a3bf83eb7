//! Origin server liveness checks.

use log::{debug, warn};
use serde::Deserialize;

use super::transport::{endpoint, Transport};
use crate::constants::{HEALTHY_STATUS, HEALTH_PATH};
use crate::state::ServerHealth;

/// Body of `GET /health`.
#[derive(Debug, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    #[serde(default)]
    pub version: Option<String>,
}

/// Performs one liveness request against the portal.
///
/// Any well-formed response makes the server reachable; it is operational
/// only when it reports `"healthy"`. Every failure, including a malformed
/// body, yields an unreachable result and is logged rather than returned.
pub fn check_server_health(transport: &dyn Transport, base_url: &str) -> ServerHealth {
    let url = endpoint(base_url, HEALTH_PATH);

    let body = match transport.get_text(&url) {
        Ok(body) => body,
        Err(e) => {
            warn!("HEALTH: {url} unreachable: {e}");
            return ServerHealth::unreachable();
        }
    };

    match serde_json::from_str::<HealthResponse>(&body) {
        Ok(health) => {
            debug!(
                "HEALTH: status={} version={}",
                health.status,
                health.version.as_deref().unwrap_or("?")
            );
            ServerHealth::reachable(health.status == HEALTHY_STATUS)
        }
        Err(e) => {
            warn!("HEALTH: malformed response from {url}: {e}");
            ServerHealth::unreachable()
        }
    }
}
