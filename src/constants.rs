//! Application-wide constants and configuration values.
//!
//! This module defines all static configuration values used throughout vpnscope,
//! including polling intervals, probe endpoints, classification thresholds, and
//! CLI messages.

use std::time::Duration;

// === Application Metadata ===

/// Application name (from Cargo.toml).
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
/// Current application version (from Cargo.toml).
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

// === Timing Configuration ===

/// Interval between VPN status probe cycles.
pub const VPN_POLL_RATE: Duration = Duration::from_secs(10);
/// Default interval between server health polls.
pub const HEALTH_POLL_RATE: Duration = Duration::from_secs(10);
/// Interval between automatic diagnostics runs.
pub const DIAGNOSTICS_POLL_RATE: Duration = Duration::from_secs(60);
/// Interval between session refreshes against the portal.
pub const SESSION_POLL_RATE: Duration = Duration::from_secs(10);
/// Interval between egress metrics lookups.
pub const METRICS_POLL_RATE: Duration = Duration::from_secs(10);
/// Upper bound on a single candidate gathering session.
pub const CANDIDATE_GATHER_TIMEOUT: Duration = Duration::from_millis(1000);
/// How often the watch loop drains pending poller updates.
pub const WATCH_TICK_RATE: Duration = Duration::from_millis(250);

// === Path Configuration ===

/// Name of the configuration file inside the app config directory.
pub const CONFIG_FILE_NAME: &str = "config.toml";

// === Portal API ===

/// Default portal base URL when nothing is configured.
pub const DEFAULT_PORTAL_URL: &str = "http://localhost:5000";
/// Liveness endpoint.
pub const HEALTH_PATH: &str = "/health";
/// Session status endpoint.
pub const AUTH_STATUS_PATH: &str = "/auth/status";
/// Credential exchange endpoint (form POST).
pub const SIGN_IN_PATH: &str = "/";
/// Authenticated configuration download endpoint.
pub const DOWNLOAD_CONFIG_PATH: &str = "/vpn/download-config";
/// Server-side view of the client address.
pub const VPN_STATUS_PATH: &str = "/vpn/status";
/// Body value of `status` that marks the server operational.
pub const HEALTHY_STATUS: &str = "healthy";

// === VPN Classification ===

/// VPN network used when none is configured.
pub const DEFAULT_VPN_NETWORK: &str = "10.8.0.0/24";
/// Prefix used when the configured network yields nothing usable.
pub const DEFAULT_VPN_PREFIX: &str = "10.8";
/// Client address reported when no candidate was discovered.
pub const UNKNOWN_ADDRESS: &str = "unknown";
/// Rendezvous server the candidate session is pointed at.
pub const DEFAULT_RENDEZVOUS_SERVER: &str = "stun.l.google.com:19302";

// === Diagnostics Probes ===

/// Domains reached by the resolution probe.
pub const DNS_PROBE_DOMAINS: [&str; 3] = ["google.com", "amazon.com", "microsoft.com"];
/// Minimum successful domains for a healthy resolution probe.
pub const DNS_HEALTHY_THRESHOLD: usize = 2;
/// Connectivity check names, in report order.
pub const CHECK_VPN_ENDPOINT: &str = "VPN Endpoint";
pub const CHECK_DNS_RESOLUTION: &str = "DNS Resolution";
pub const CHECK_EXTERNAL_ACCESS: &str = "External Access";
/// External resolver endpoint for the connectivity probe.
pub const RESOLVER_PROBE_URL: &str = "https://1.1.1.1/favicon.ico";
/// Generic external endpoint for the connectivity probe.
pub const EXTERNAL_PROBE_URL: &str = "https://www.google.com/favicon.ico";
/// Number of sequential stability samples.
pub const STABILITY_SAMPLE_COUNT: usize = 5;
/// Fixed gap between consecutive stability samples; none follows the last one.
pub const STABILITY_SAMPLE_DELAY: Duration = Duration::from_millis(200);
/// Highest drop count still classified as stable.
pub const STABLE_MAX_DROPS: usize = 1;
/// Highest drop count still classified as unstable.
pub const UNSTABLE_MAX_DROPS: usize = 2;

// === Egress Metrics ===

/// Geolocation lookup for the egress address.
pub const GEO_API_URL: &str = "https://get.geojs.io/v1/ip/geo.json";
/// Latency bounds (exclusive, ms) for the quality grades.
pub const QUALITY_EXCELLENT_MS: u64 = 50;
pub const QUALITY_GOOD_MS: u64 = 100;
pub const QUALITY_FAIR_MS: u64 = 200;

// === Network ===

/// Timeout for portal and probe requests in seconds.
pub const HTTP_TIMEOUT_SECS: u64 = 5;
/// Timeout for configuration downloads in seconds.
pub const DOWNLOAD_TIMEOUT_SECS: u64 = 10;

// === Config Download ===

/// Filename used when the portal does not provide one.
pub const DEFAULT_CONFIG_FILENAME: &str = "client.ovpn";
/// Extension enforced on downloaded configs.
pub const EXT_OVPN: &str = ".ovpn";

// === Display Placeholders ===

/// Shown while a value is being probed.
pub const MSG_CHECKING: &str = "Checking...";
/// No data available placeholder.
pub const MSG_NO_DATA: &str = "---";

// === Messages: CLI Output ===

pub const CLI_MSG_NOT_SIGNED_IN: &str = "Not signed in. Run 'vpnscope login --credential <token>' first.";
pub const CLI_MSG_SIGNED_IN_AS: &str = "Signed in as ";
pub const CLI_MSG_DOWNLOADING: &str = "Downloading VPN configuration...";
pub const CLI_MSG_DOWNLOAD_SAVED: &str = "Saved configuration to: ";
pub const CLI_MSG_WATCH_HINT: &str =
    "Watching portal status. Press Enter to re-run diagnostics, Ctrl+C to exit.";
pub const CLI_MSG_DIAGNOSTICS_RUNNING: &str = "Diagnostics already running";

// === Error Messages ===

pub const ERR_EMPTY_CONTENT: &str = "Downloaded configuration is empty";
pub const ERR_HTML_CONTENT: &str =
    "Portal returned an HTML page instead of a configuration. Is the session still valid?";
pub const ERR_DOWNLOAD_FAILED: &str = "Download failed";
pub const ERR_AUTH_FAILED: &str = "Authentication failed";
