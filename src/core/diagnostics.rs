//! Connection diagnostics engine.
//!
//! One run dispatches three independent probes together and joins them
//! before building the report:
//!
//! - **resolution**: opaque requests to well-known domains,
//! - **connectivity**: named checks against the portal and two external hosts,
//! - **stability**: sequential health samples with a fixed gap between them.
//!
//! A probe that fails (or panics) degrades its own section; the run itself
//! always completes. Only one run may be in flight per engine.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use log::{debug, info, warn};

use super::transport::{endpoint, timed, Transport};
use crate::constants;
use crate::error::DiagnosticsError;
use crate::state::diagnostics::rounded_mean;
use crate::state::{
    CheckDetail, DiagnosticsReport, ProbeResult, ProbeStatus, StabilityResult, StabilityStatus,
};

/// How a connectivity check is issued.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum RequestMode {
    /// Same-origin request; the response is read.
    Readable,
    /// Cross-origin request; only completion is observable.
    Opaque,
}

/// Releases the in-flight flag when a run ends, however it ends.
struct RunGuard<'a>(&'a AtomicBool);

impl<'a> RunGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Runs diagnostics against one portal.
pub struct DiagnosticsEngine {
    transport: Arc<dyn Transport>,
    base_url: String,
    sample_delay: Duration,
    running: AtomicBool,
}

impl DiagnosticsEngine {
    pub fn new(transport: Arc<dyn Transport>, base_url: impl Into<String>) -> Self {
        Self {
            transport,
            base_url: base_url.into(),
            sample_delay: constants::STABILITY_SAMPLE_DELAY,
            running: AtomicBool::new(false),
        }
    }

    /// Overrides the gap between stability samples.
    #[must_use]
    pub fn with_sample_delay(mut self, delay: Duration) -> Self {
        self.sample_delay = delay;
        self
    }

    /// A run is currently in flight; manual re-runs should be disabled.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Runs all three probes and returns the joined report.
    ///
    /// # Errors
    ///
    /// [`DiagnosticsError::AlreadyRunning`] if another run has not finished.
    pub fn run_diagnostics(&self) -> Result<DiagnosticsReport, DiagnosticsError> {
        let _guard = RunGuard::acquire(&self.running).ok_or(DiagnosticsError::AlreadyRunning)?;
        info!("DIAG: running diagnostics against {}", self.base_url);

        let report = thread::scope(|s| {
            let dns = s.spawn(|| self.check_dns());
            let connectivity = s.spawn(|| self.check_connectivity());
            let stability = s.spawn(|| self.monitor_stability());

            DiagnosticsReport {
                dns: dns.join().unwrap_or_else(|_| {
                    warn!("DIAG: resolution probe panicked");
                    ProbeResult {
                        status: ProbeStatus::Issue,
                        latency_ms: Some(0),
                        details: Vec::new(),
                    }
                }),
                connectivity: connectivity.join().unwrap_or_else(|_| {
                    warn!("DIAG: connectivity probe panicked");
                    ProbeResult {
                        status: ProbeStatus::Issue,
                        ..ProbeResult::default()
                    }
                }),
                stability: stability.join().unwrap_or_else(|_| {
                    warn!("DIAG: stability probe panicked");
                    StabilityResult::from_samples(vec![None; constants::STABILITY_SAMPLE_COUNT])
                }),
            }
        });

        info!(
            "DIAG: dns={:?} connectivity={:?} stability={:?}",
            report.dns.status, report.connectivity.status, report.stability.status
        );
        Ok(report)
    }

    /// Reaches each well-known domain; healthy when at least two answer.
    fn check_dns(&self) -> ProbeResult {
        let mut latencies = Vec::new();

        for domain in constants::DNS_PROBE_DOMAINS {
            let url = format!("https://{domain}/favicon.ico");
            match timed(|| self.transport.reach(&url)) {
                (Ok(()), ms) => {
                    debug!("DIAG: {domain} answered in {ms}ms");
                    latencies.push(ms);
                }
                (Err(e), _) => debug!("DIAG: {domain} failed: {e}"),
            }
        }

        let status = if latencies.len() >= constants::DNS_HEALTHY_THRESHOLD {
            ProbeStatus::Healthy
        } else {
            ProbeStatus::Issue
        };

        ProbeResult {
            status,
            latency_ms: Some(rounded_mean(&latencies).unwrap_or(0)),
            details: Vec::new(),
        }
    }

    /// Runs the named checks; healthy only when every one succeeds.
    fn check_connectivity(&self) -> ProbeResult {
        let health_url = endpoint(&self.base_url, constants::HEALTH_PATH);
        let checks = [
            (constants::CHECK_VPN_ENDPOINT, health_url.as_str(), RequestMode::Readable),
            (
                constants::CHECK_DNS_RESOLUTION,
                constants::RESOLVER_PROBE_URL,
                RequestMode::Opaque,
            ),
            (
                constants::CHECK_EXTERNAL_ACCESS,
                constants::EXTERNAL_PROBE_URL,
                RequestMode::Opaque,
            ),
        ];

        let details = checks
            .iter()
            .map(|(name, url, mode)| {
                let (outcome, ms) = timed(|| match mode {
                    RequestMode::Readable => self.transport.get_text(url).map(|_| ()),
                    RequestMode::Opaque => self.transport.reach(url),
                });
                match outcome {
                    Ok(()) => CheckDetail::success(name, ms),
                    Err(e) => {
                        debug!("DIAG: check '{name}' failed: {e}");
                        CheckDetail::failed(name, e.to_string())
                    }
                }
            })
            .collect();

        ProbeResult::from_checks(details)
    }

    /// Takes sequential health samples, recording a drop for each failure.
    fn monitor_stability(&self) -> StabilityResult {
        let url = endpoint(&self.base_url, constants::HEALTH_PATH);
        let mut samples = Vec::with_capacity(constants::STABILITY_SAMPLE_COUNT);

        for i in 0..constants::STABILITY_SAMPLE_COUNT {
            let sample = match timed(|| self.transport.get_text(&url)) {
                (Ok(_), ms) => Some(ms),
                (Err(e), _) => {
                    debug!("DIAG: sample #{} dropped: {e}", i + 1);
                    None
                }
            };
            samples.push(sample);

            if i + 1 < constants::STABILITY_SAMPLE_COUNT {
                thread::sleep(self.sample_delay);
            }
        }

        let result = StabilityResult::from_samples(samples);
        if result.status != StabilityStatus::Stable {
            warn!(
                "DIAG: {} of {} stability samples dropped",
                result.drop_count,
                result.samples.len()
            );
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::transport::fake::FakeTransport;
    use crate::error::ProbeError;
    use crate::state::CheckStatus;
    use std::time::Instant;

    const BASE: &str = "http://portal.test";
    const HEALTH: &str = "http://portal.test/health";

    fn all_up() -> FakeTransport {
        FakeTransport::new()
            .ok("https://google.com/favicon.ico", "")
            .ok("https://amazon.com/favicon.ico", "")
            .ok("https://microsoft.com/favicon.ico", "")
            .ok(constants::RESOLVER_PROBE_URL, "")
            .ok(constants::EXTERNAL_PROBE_URL, "")
            .ok(HEALTH, r#"{"status":"healthy"}"#)
    }

    fn engine(transport: FakeTransport) -> DiagnosticsEngine {
        DiagnosticsEngine::new(Arc::new(transport), BASE).with_sample_delay(Duration::from_millis(1))
    }

    #[test]
    fn test_all_healthy() {
        let report = engine(all_up()).run_diagnostics().unwrap();
        assert_eq!(report.dns.status, ProbeStatus::Healthy);
        assert_eq!(report.connectivity.status, ProbeStatus::Healthy);
        assert_eq!(report.connectivity.details.len(), 3);
        assert_eq!(report.stability.status, StabilityStatus::Stable);
        assert_eq!(report.stability.drop_count, 0);
        assert_eq!(report.stability.samples.len(), 5);
    }

    #[test]
    fn test_dns_two_of_three_is_healthy() {
        let transport = all_up().fail("https://amazon.com/favicon.ico");
        let report = engine(transport).run_diagnostics().unwrap();
        assert_eq!(report.dns.status, ProbeStatus::Healthy);
        assert!(report.dns.latency_ms.is_some());
    }

    #[test]
    fn test_dns_one_of_three_is_issue() {
        let transport = all_up()
            .fail("https://amazon.com/favicon.ico")
            .fail("https://google.com/favicon.ico");
        let report = engine(transport).run_diagnostics().unwrap();
        assert_eq!(report.dns.status, ProbeStatus::Issue);
    }

    #[test]
    fn test_dns_none_answering_reports_zero_latency() {
        let transport = all_up()
            .fail("https://amazon.com/favicon.ico")
            .fail("https://google.com/favicon.ico")
            .fail("https://microsoft.com/favicon.ico");
        let report = engine(transport).run_diagnostics().unwrap();
        assert_eq!(report.dns.status, ProbeStatus::Issue);
        assert_eq!(report.dns.latency_ms, Some(0));
    }

    #[test]
    fn test_single_failed_check_is_issue_and_itemised() {
        let transport = all_up().fail(constants::EXTERNAL_PROBE_URL);
        let report = engine(transport).run_diagnostics().unwrap();

        assert_eq!(report.connectivity.status, ProbeStatus::Issue);
        let failed: Vec<_> = report
            .connectivity
            .details
            .iter()
            .filter(|d| d.status == CheckStatus::Failed)
            .collect();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].name, constants::CHECK_EXTERNAL_ACCESS);
        assert!(failed[0].latency_ms.is_none());
    }

    #[test]
    fn test_stability_counts_drops() {
        let transport = all_up().script(
            HEALTH,
            vec![
                // The connectivity check takes one of these answers too.
                Some(r#"{"status":"healthy"}"#),
                None,
                Some(r#"{"status":"healthy"}"#),
                None,
                None,
                Some(r#"{"status":"healthy"}"#),
            ],
        );
        let report = engine(transport).run_diagnostics().unwrap();
        let stability = &report.stability;
        assert_eq!(
            stability.drop_count,
            stability.samples.iter().filter(|s| s.is_none()).count()
        );
        assert!((2..=3).contains(&stability.drop_count));
        assert_ne!(stability.status, StabilityStatus::Stable);
    }

    #[test]
    fn test_portal_down_degrades_every_section_that_uses_it() {
        let transport = all_up().fail(HEALTH);
        let report = engine(transport).run_diagnostics().unwrap();
        assert_eq!(report.connectivity.status, ProbeStatus::Issue);
        assert_eq!(report.stability.status, StabilityStatus::Poor);
        assert_eq!(report.stability.drop_count, 5);
        assert_eq!(report.stability.average_latency_ms, None);
        assert_eq!(report.dns.status, ProbeStatus::Healthy);
    }

    #[test]
    fn test_repeat_runs_classify_identically() {
        let engine = engine(all_up().fail("https://microsoft.com/favicon.ico"));
        let first = engine.run_diagnostics().unwrap();
        let second = engine.run_diagnostics().unwrap();
        assert_eq!(first.classification(), second.classification());
    }

    #[test]
    fn test_stability_gaps_only_between_samples() {
        let engine = DiagnosticsEngine::new(Arc::new(all_up()), BASE)
            .with_sample_delay(Duration::from_millis(100));

        let start = Instant::now();
        let stability = engine.monitor_stability();
        let elapsed = start.elapsed();

        assert_eq!(stability.samples.len(), constants::STABILITY_SAMPLE_COUNT);
        assert!(elapsed >= Duration::from_millis(400));
        assert!(elapsed < Duration::from_millis(500));
    }

    struct SlowTransport(Duration);

    impl Transport for SlowTransport {
        fn get_text(&self, _url: &str) -> Result<String, ProbeError> {
            thread::sleep(self.0);
            Ok(r#"{"status":"healthy"}"#.to_string())
        }

        fn get_success_text(&self, url: &str) -> Result<String, ProbeError> {
            self.get_text(url)
        }

        fn reach(&self, _url: &str) -> Result<(), ProbeError> {
            thread::sleep(self.0);
            Ok(())
        }
    }

    #[test]
    fn test_second_run_refused_while_in_flight() {
        let engine = Arc::new(
            DiagnosticsEngine::new(Arc::new(SlowTransport(Duration::from_millis(40))), BASE)
                .with_sample_delay(Duration::from_millis(1)),
        );

        let background = Arc::clone(&engine);
        let first = thread::spawn(move || background.run_diagnostics());

        let deadline = Instant::now() + Duration::from_secs(2);
        while !engine.is_running() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(1));
        }
        assert!(engine.is_running());
        assert_eq!(
            engine.run_diagnostics(),
            Err(DiagnosticsError::AlreadyRunning)
        );

        assert!(first.join().unwrap().is_ok());
        assert!(!engine.is_running());
        assert!(engine.run_diagnostics().is_ok());
    }

    #[test]
    fn test_probes_run_concurrently() {
        let engine = DiagnosticsEngine::new(Arc::new(SlowTransport(Duration::from_millis(50))), BASE)
            .with_sample_delay(Duration::ZERO);

        let start = Instant::now();
        engine.run_diagnostics().unwrap();

        // Sequential execution would take 11 requests * 50ms.
        assert!(start.elapsed() < Duration::from_millis(500));
    }
}
