//! Egress telemetry.
//!
//! Looks up where traffic leaves the network (location, ISP) and grades the
//! round trip of that lookup. Also asks the portal which address it sees the
//! client connecting from, as a second opinion next to the local candidate
//! heuristic.

use log::{debug, warn};

use super::transport::{endpoint, timed, Transport};
use crate::constants;
use crate::state::{ConnectionQuality, Location, NetworkMetrics, ServerObservedStatus};

/// Fetches egress location and grades the lookup latency.
///
/// Failures, error statuses and payloads without any location field yield
/// an unknown-quality snapshot with no location.
pub fn fetch_network_metrics(transport: &dyn Transport) -> NetworkMetrics {
    let (outcome, latency_ms) = timed(|| transport.get_success_text(constants::GEO_API_URL));

    let parsed = outcome
        .map_err(|e| e.to_string())
        .and_then(|body| serde_json::from_str::<Location>(&body).map_err(|e| e.to_string()))
        .and_then(|location| {
            if location.is_empty() {
                Err("payload carries no location".to_string())
            } else {
                Ok(location)
            }
        });

    match parsed {
        Ok(location) => {
            let quality = ConnectionQuality::from_latency(Some(latency_ms));
            debug!(
                "NET: egress {location} via {} ({latency_ms}ms, {})",
                location.isp.as_deref().unwrap_or("unknown ISP"),
                quality.label()
            );
            NetworkMetrics {
                location: Some(location),
                latency_ms: Some(latency_ms),
                quality,
                loading: false,
            }
        }
        Err(e) => {
            warn!("NET: egress lookup failed: {e}");
            NetworkMetrics {
                location: None,
                latency_ms: None,
                quality: ConnectionQuality::Unknown,
                loading: false,
            }
        }
    }
}

/// The portal's verdict on whether the request arrived through the tunnel.
///
/// `None` when the portal is unreachable or does not expose the endpoint.
pub fn fetch_server_observed(
    transport: &dyn Transport,
    base_url: &str,
) -> Option<ServerObservedStatus> {
    let url = endpoint(base_url, constants::VPN_STATUS_PATH);
    let body = transport
        .get_text(&url)
        .map_err(|e| debug!("NET: {url} unavailable: {e}"))
        .ok()?;
    serde_json::from_str(&body)
        .map_err(|e| debug!("NET: unexpected {url} payload: {e}"))
        .ok()
}
