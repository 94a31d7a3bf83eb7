//! Plain-text rendering of status snapshots.
//!
//! Each renderer returns a `String` so the CLI can print it and tests can
//! inspect it. `--json` output bypasses this module entirely.

use std::fmt::Write as _;

use crate::constants;
use crate::state::{
    CheckStatus, DiagnosticsReport, NetworkMetrics, ProbeResult, ProbeStatus,
    ServerHealth, ServerObservedStatus, SessionState, StabilityStatus, VpnStatus,
};

// ── Labels ──────────────────────────────────────────────────────────────────

fn probe_label(status: ProbeStatus) -> &'static str {
    match status {
        ProbeStatus::Pending => "Pending",
        ProbeStatus::Checking => constants::MSG_CHECKING,
        ProbeStatus::Healthy => "Healthy",
        ProbeStatus::Issue => "Issue Detected",
    }
}

fn stability_label(status: StabilityStatus) -> &'static str {
    match status {
        StabilityStatus::Pending => "Pending",
        StabilityStatus::Checking => constants::MSG_CHECKING,
        StabilityStatus::Stable => "Stable",
        StabilityStatus::Unstable => "Unstable",
        StabilityStatus::Poor => "Poor",
    }
}

fn latency(ms: Option<u64>) -> String {
    ms.map_or_else(|| constants::MSG_NO_DATA.to_string(), |ms| format!("{ms}ms"))
}

// ── Status ──────────────────────────────────────────────────────────────────

/// VPN membership and portal health.
#[must_use]
pub fn render_status(
    vpn: &VpnStatus,
    health: &ServerHealth,
    observed: Option<&ServerObservedStatus>,
) -> String {
    let mut out = String::with_capacity(512);

    let _ = writeln!(out, "VPN Status");
    let _ = writeln!(out, "==========\n");
    if vpn.loading {
        let _ = writeln!(out, "  Connection:   {}", constants::MSG_CHECKING);
    } else if vpn.connected {
        let _ = writeln!(out, "  Connection:   Connected");
    } else {
        let _ = writeln!(out, "  Connection:   Not connected");
    }
    let _ = writeln!(
        out,
        "  Client IP:    {}",
        vpn.client_address.as_deref().unwrap_or(constants::MSG_NO_DATA)
    );
    if vpn.all_addresses.len() > 1 {
        let all: Vec<&str> = vpn.all_addresses.iter().collect();
        let _ = writeln!(out, "  Addresses:    {}", all.join(", "));
    }
    if let Some(observed) = observed {
        let _ = writeln!(
            out,
            "  Portal sees:  {} ({})",
            observed.client_ip,
            if observed.connected {
                "via VPN"
            } else {
                "outside VPN"
            }
        );
    }

    let _ = writeln!(out, "\n  Server:");
    let server = match (health.loading, health.reachable, health.operational) {
        (true, _, _) => constants::MSG_CHECKING,
        (false, true, true) => "Online (operational)",
        (false, true, false) => "Online (degraded)",
        (false, false, _) => "Offline",
    };
    let _ = writeln!(out, "    Origin:     {server}");
    out
}

// ── Diagnostics ─────────────────────────────────────────────────────────────

fn write_probe(out: &mut String, title: &str, result: &ProbeResult) {
    let _ = writeln!(
        out,
        "  {title:<14}{} ({})",
        probe_label(result.status),
        latency(result.latency_ms)
    );
    for check in &result.details {
        match check.status {
            CheckStatus::Success => {
                let _ = writeln!(out, "    ok    {:<16}{}", check.name, latency(check.latency_ms));
            }
            CheckStatus::Failed => {
                let _ = writeln!(
                    out,
                    "    fail  {:<16}{}",
                    check.name,
                    check.error.as_deref().unwrap_or("failed")
                );
            }
        }
    }
}

/// Three-section diagnostics report.
#[must_use]
pub fn render_diagnostics(report: &DiagnosticsReport) -> String {
    let mut out = String::with_capacity(512);

    let _ = writeln!(out, "Connection Diagnostics");
    let _ = writeln!(out, "======================\n");
    write_probe(&mut out, "DNS:", &report.dns);
    write_probe(&mut out, "Connectivity:", &report.connectivity);

    let stability = &report.stability;
    let _ = writeln!(
        out,
        "  {:<14}{} (avg {}, {} of {} dropped)",
        "Stability:",
        stability_label(stability.status),
        latency(stability.average_latency_ms),
        stability.drop_count,
        stability.samples.len()
    );
    out
}

// ── Metrics & session ───────────────────────────────────────────────────────

/// Egress location and connection quality.
#[must_use]
pub fn render_metrics(metrics: &NetworkMetrics) -> String {
    let mut out = String::with_capacity(256);
    if metrics.loading {
        let _ = writeln!(out, "  Location:     {}", constants::MSG_CHECKING);
        return out;
    }
    let location = metrics
        .location
        .as_ref()
        .map_or_else(|| "Unknown".to_string(), ToString::to_string);
    let isp = metrics
        .location
        .as_ref()
        .and_then(|l| l.isp.as_deref())
        .unwrap_or("Unknown");

    let _ = writeln!(out, "  Location:     {location}");
    let _ = writeln!(out, "  ISP:          {isp}");
    let _ = writeln!(
        out,
        "  Latency:      {} ({})",
        latency(metrics.latency_ms),
        metrics.quality.label()
    );
    out
}

/// One line describing who is signed in.
#[must_use]
pub fn render_session(session: &SessionState) -> String {
    if session.authenticated {
        format!(
            "{}{}",
            constants::CLI_MSG_SIGNED_IN_AS,
            session.identity.as_deref().unwrap_or("unknown user")
        )
    } else {
        constants::CLI_MSG_NOT_SIGNED_IN.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::classifier::to_status;
    use crate::state::{
        AddressSet, CheckDetail, ConnectionQuality, Credential, Location, StabilityResult,
    };

    #[test]
    fn test_status_connected() {
        let addresses: AddressSet = ["10.8.0.5", "192.168.1.2"].into_iter().collect();
        let vpn = to_status(addresses, "10.8");
        let text = render_status(&vpn, &ServerHealth::reachable(true), None);
        assert!(text.contains("Connected"));
        assert!(text.contains("10.8.0.5"));
        assert!(text.contains("10.8.0.5, 192.168.1.2"));
        assert!(text.contains("Online (operational)"));
    }

    #[test]
    fn test_status_loading_and_offline() {
        let text = render_status(&VpnStatus::default(), &ServerHealth::unreachable(), None);
        assert!(text.contains(constants::MSG_CHECKING));
        assert!(text.contains("Offline"));
        assert!(text.contains(constants::MSG_NO_DATA));
    }

    #[test]
    fn test_status_reports_server_view() {
        let vpn = to_status(AddressSet::new(), "10.8");
        let observed = ServerObservedStatus {
            connected: true,
            client_ip: "10.8.0.6".into(),
        };
        let text = render_status(&vpn, &ServerHealth::reachable(false), Some(&observed));
        assert!(text.contains("Not connected"));
        assert!(text.contains("Portal sees:  10.8.0.6 (via VPN)"));
        assert!(text.contains("degraded"));
    }

    #[test]
    fn test_diagnostics_lists_failed_checks() {
        let report = DiagnosticsReport {
            dns: ProbeResult {
                status: ProbeStatus::Healthy,
                latency_ms: Some(31),
                details: Vec::new(),
            },
            connectivity: ProbeResult::from_checks(vec![
                CheckDetail::success("VPN Endpoint", 12),
                CheckDetail::failed("External Access", "connection refused".into()),
            ]),
            stability: StabilityResult::from_samples(vec![Some(20), None, Some(25), None, None]),
        };
        let text = render_diagnostics(&report);
        assert!(text.contains("Healthy (31ms)"));
        assert!(text.contains("Issue Detected"));
        assert!(text.contains("connection refused"));
        assert!(text.contains("Poor (avg 23ms, 3 of 5 dropped)"));
    }

    #[test]
    fn test_metrics_rendering() {
        let metrics = NetworkMetrics {
            location: Some(Location {
                city: Some("Amsterdam".into()),
                region: None,
                country: Some("NL".into()),
                isp: Some("M247".into()),
            }),
            latency_ms: Some(42),
            quality: ConnectionQuality::Excellent,
            loading: false,
        };
        let text = render_metrics(&metrics);
        assert!(text.contains("Amsterdam"));
        assert!(text.contains("M247"));
        assert!(text.contains("42ms (Excellent)"));
    }

    #[test]
    fn test_session_line() {
        let signed_in = SessionState::signed_in("a@example.com", Credential::new("t"));
        assert_eq!(render_session(&signed_in), "Signed in as a@example.com");
        assert_eq!(
            render_session(&SessionState::default()),
            constants::CLI_MSG_NOT_SIGNED_IN
        );
    }
}
