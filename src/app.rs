//! Monitor application state.
//!
//! [`App`] owns every background poller and is the only writer of the
//! status snapshots the front end reads. Workers send results over channels;
//! [`App::process_external`] drains them on the caller's thread.
//!
//! Privileged polling (VPN status, server health, egress metrics and the
//! diagnostics timer) only runs while the session is authenticated.

use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use log::{debug, info, warn};

use crate::auth::SessionManager;
use crate::config::Config;
use crate::constants;
use crate::core::classifier::to_status;
use crate::core::health::check_server_health;
use crate::core::interfaces::AddressDiscovery;
use crate::core::scheduler::{PollEvent, Poller};
use crate::core::telemetry::fetch_network_metrics;
use crate::core::transport::Transport;
use crate::core::DiagnosticsEngine;
use crate::error::DiagnosticsError;
use crate::state::{
    AddressSet, DiagnosticsReport, NetworkMetrics, ServerHealth, SessionState, SessionStore,
    VpnStatus,
};

/// Result of one background diagnostics run, tagged with the polling
/// generation it was started in.
type DiagnosticsUpdate = (u64, Result<DiagnosticsReport, DiagnosticsError>);

/// Pollers that only exist while signed in.
struct PrivilegedPollers {
    vpn: Poller<VpnStatus>,
    health: Poller<ServerHealth>,
    metrics: Poller<NetworkMetrics>,
    diagnostics_timer: Poller<()>,
}

/// Main application state.
pub struct App {
    config: Config,
    vpn_prefix: String,
    session: SessionStore,
    session_events: Receiver<SessionState>,
    session_manager: Option<Arc<SessionManager>>,
    transport: Arc<dyn Transport>,
    discovery: Arc<dyn AddressDiscovery>,
    engine: Arc<DiagnosticsEngine>,
    sample_delay: Duration,

    /// Latest VPN status snapshot.
    pub vpn: VpnStatus,
    /// Latest origin server health.
    pub health: ServerHealth,
    /// Latest egress metrics.
    pub metrics: NetworkMetrics,
    /// Latest diagnostics report.
    pub diagnostics: DiagnosticsReport,
    /// Whether privileged polling is active.
    pub authenticated: bool,

    pollers: Option<PrivilegedPollers>,
    session_poller: Option<Poller<()>>,
    last_connected: Option<bool>,

    diagnostics_tx: Sender<DiagnosticsUpdate>,
    diagnostics_rx: Receiver<DiagnosticsUpdate>,
    diagnostics_in_flight: bool,
    /// A scheduled run was requested while another was in flight.
    diagnostics_pending: bool,
    diagnostics_runs: u64,
    generation: u64,
}

impl App {
    pub fn new(
        config: Config,
        session: SessionStore,
        transport: Arc<dyn Transport>,
        discovery: Arc<dyn AddressDiscovery>,
    ) -> Self {
        let engine = Arc::new(DiagnosticsEngine::new(
            Arc::clone(&transport),
            config.portal_url.clone(),
        ));
        let (diagnostics_tx, diagnostics_rx) = mpsc::channel();
        let session_events = session.subscribe();

        Self {
            vpn_prefix: config.vpn_prefix(),
            config,
            session,
            session_events,
            session_manager: None,
            transport,
            discovery,
            engine,
            sample_delay: constants::STABILITY_SAMPLE_DELAY,
            vpn: VpnStatus::default(),
            health: ServerHealth::default(),
            metrics: NetworkMetrics::default(),
            diagnostics: DiagnosticsReport::default(),
            authenticated: false,
            pollers: None,
            session_poller: None,
            last_connected: None,
            diagnostics_tx,
            diagnostics_rx,
            diagnostics_in_flight: false,
            diagnostics_pending: false,
            diagnostics_runs: 0,
            generation: 0,
        }
    }

    /// Periodically refreshes the session through `manager`.
    #[must_use]
    pub fn with_session_manager(mut self, manager: Arc<SessionManager>) -> Self {
        self.session_manager = Some(manager);
        self
    }

    /// Overrides the gap between stability samples.
    #[must_use]
    pub fn with_sample_delay(mut self, delay: Duration) -> Self {
        self.sample_delay = delay;
        self.engine = self.fresh_engine();
        self
    }

    /// Starts session refresh and, if already signed in, privileged polling.
    pub fn start(&mut self) {
        if let Some(manager) = &self.session_manager {
            let manager = Arc::clone(manager);
            self.session_poller = Some(Poller::spawn(
                "session",
                constants::SESSION_POLL_RATE,
                move || {
                    manager.refresh();
                },
            ));
        }
        self.on_session_change(self.session.is_authenticated());
    }

    /// Stops every poller.
    pub fn shutdown(&mut self) {
        self.session_poller = None;
        self.stop_polling();
    }

    #[must_use]
    pub fn is_polling(&self) -> bool {
        self.pollers.is_some()
    }

    /// A diagnostics run has been started and has not reported back.
    #[must_use]
    pub fn diagnostics_in_flight(&self) -> bool {
        self.diagnostics_in_flight
    }

    /// A scheduled run is queued behind the one in flight.
    #[must_use]
    pub fn diagnostics_pending(&self) -> bool {
        self.diagnostics_pending
    }

    /// Completed diagnostics runs applied so far.
    #[must_use]
    pub fn diagnostics_runs(&self) -> u64 {
        self.diagnostics_runs
    }

    /// Manual diagnostics re-run.
    ///
    /// # Errors
    ///
    /// [`DiagnosticsError::AlreadyRunning`] while a run is in flight and
    /// [`DiagnosticsError::NotAuthenticated`] when signed out.
    pub fn request_diagnostics(&mut self) -> Result<(), DiagnosticsError> {
        if !self.authenticated {
            return Err(DiagnosticsError::NotAuthenticated);
        }
        self.spawn_diagnostics()
    }

    /// Applies every pending background update.
    ///
    /// Returns `true` if any snapshot changed.
    pub fn process_external(&mut self) -> bool {
        let mut changed = false;

        if self.session_events.try_iter().last().is_some() {
            changed |= self.on_session_change(self.session.is_authenticated());
        }

        let (vpn, health, metrics, ticks) = match &self.pollers {
            Some(p) => (
                p.vpn.drain(),
                p.health.drain(),
                p.metrics.drain(),
                p.diagnostics_timer.drain(),
            ),
            None => Default::default(),
        };

        for event in vpn {
            changed = true;
            match event {
                PollEvent::Started => self.vpn = self.vpn.reloading(),
                PollEvent::Finished(status) => self.apply_vpn_status(status),
            }
        }
        for event in health {
            changed = true;
            match event {
                PollEvent::Started => {}
                PollEvent::Finished(health) => self.health = health,
            }
        }
        for event in metrics {
            if let PollEvent::Finished(metrics) = event {
                changed = true;
                self.metrics = metrics;
            }
        }
        for event in ticks {
            if let PollEvent::Finished(()) = event {
                changed |= self.schedule_diagnostics();
            }
        }

        for (generation, result) in self.diagnostics_rx.try_iter().collect::<Vec<_>>() {
            if generation != self.generation {
                debug!("APP: discarding diagnostics from a stopped session");
                continue;
            }
            self.diagnostics_in_flight = false;
            match result {
                Ok(report) => {
                    self.diagnostics = report;
                    self.diagnostics_runs += 1;
                    changed = true;
                }
                Err(e) => warn!("APP: diagnostics run refused: {e}"),
            }
            if std::mem::take(&mut self.diagnostics_pending) {
                changed |= self.schedule_diagnostics();
            }
        }

        changed
    }

    fn on_session_change(&mut self, authenticated: bool) -> bool {
        if authenticated == self.authenticated && (self.pollers.is_some() == authenticated) {
            return false;
        }
        self.authenticated = authenticated;
        if authenticated {
            info!("APP: session active, starting monitors");
            self.start_polling();
        } else {
            info!("APP: signed out, stopping monitors");
            self.stop_polling();
        }
        true
    }

    fn start_polling(&mut self) {
        let discovery = Arc::clone(&self.discovery);
        let prefix = self.vpn_prefix.clone();
        let vpn = Poller::spawn("vpn", self.config.vpn_interval(), move || {
            probe_vpn_status(discovery.as_ref(), &prefix)
        });

        let transport = Arc::clone(&self.transport);
        let base_url = self.config.portal_url.clone();
        let health = Poller::spawn("health", self.config.health_interval(), move || {
            check_server_health(transport.as_ref(), &base_url)
        });

        // A run left over from a previous session must not block this one.
        self.engine = self.fresh_engine();
        self.pollers = Some(PrivilegedPollers {
            vpn,
            health,
            metrics: self.spawn_metrics_poller(),
            diagnostics_timer: self.spawn_diagnostics_timer(),
        });
    }

    fn stop_polling(&mut self) {
        // Dropping the handles stops the workers and discards in-flight cycles.
        self.pollers = None;
        self.generation += 1;
        self.diagnostics_in_flight = false;
        self.diagnostics_pending = false;
        self.last_connected = None;
        self.vpn = VpnStatus::default();
        self.health = ServerHealth::default();
        self.metrics = NetworkMetrics::default();
        self.diagnostics = DiagnosticsReport::default();
    }

    fn fresh_engine(&self) -> Arc<DiagnosticsEngine> {
        Arc::new(
            DiagnosticsEngine::new(Arc::clone(&self.transport), self.config.portal_url.clone())
                .with_sample_delay(self.sample_delay),
        )
    }

    fn spawn_metrics_poller(&self) -> Poller<NetworkMetrics> {
        let transport = Arc::clone(&self.transport);
        Poller::spawn("metrics", constants::METRICS_POLL_RATE, move || {
            fetch_network_metrics(transport.as_ref())
        })
    }

    /// Ticks immediately, then on every diagnostics interval.
    fn spawn_diagnostics_timer(&self) -> Poller<()> {
        Poller::spawn("diagnostics", self.config.diagnostics_interval(), || ())
    }

    fn apply_vpn_status(&mut self, status: VpnStatus) {
        let connected = status.connected;
        self.vpn = status;

        let previous = self.last_connected.replace(connected);
        if previous.is_some_and(|was| was != connected) {
            info!(
                "APP: VPN {}",
                if connected { "connected" } else { "disconnected" }
            );
            // Restarting both timers re-runs them now and resets their period.
            let metrics = self.spawn_metrics_poller();
            let timer = self.spawn_diagnostics_timer();
            if let Some(pollers) = self.pollers.as_mut() {
                pollers.metrics = metrics;
                pollers.diagnostics_timer = timer;
            }
        }
    }

    /// Timer, start and transition trigger. A trigger that lands during a
    /// run is coalesced into one follow-up run.
    fn schedule_diagnostics(&mut self) -> bool {
        match self.spawn_diagnostics() {
            Ok(()) => true,
            Err(_) => {
                debug!("APP: diagnostics queued behind the current run");
                self.diagnostics_pending = true;
                false
            }
        }
    }

    fn spawn_diagnostics(&mut self) -> Result<(), DiagnosticsError> {
        if self.diagnostics_in_flight {
            return Err(DiagnosticsError::AlreadyRunning);
        }
        self.diagnostics_in_flight = true;
        self.diagnostics = self.diagnostics.checking();

        let engine = Arc::clone(&self.engine);
        let tx = self.diagnostics_tx.clone();
        let generation = self.generation;
        thread::spawn(move || {
            let _ = tx.send((generation, engine.run_diagnostics()));
        });
        Ok(())
    }
}

impl Drop for App {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// One VPN status cycle: discover, then classify.
///
/// A failed discovery counts as "nothing found".
pub fn probe_vpn_status(discovery: &dyn AddressDiscovery, vpn_prefix: &str) -> VpnStatus {
    let addresses = discovery.discover().unwrap_or_else(|e| {
        warn!("NET: address discovery failed: {e}");
        AddressSet::new()
    });
    to_status(addresses, vpn_prefix)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::transport::fake::FakeTransport;
    use crate::error::ProbeError;
    use crate::state::{Credential, ProbeStatus};
    use std::time::Instant;

    const PORTAL: &str = "http://portal.test";

    fn quiet_config() -> Config {
        Config {
            portal_url: PORTAL.to_string(),
            vpn_interval_secs: 3600,
            health_interval_secs: 3600,
            diagnostics_interval_secs: 3600,
            ..Config::default()
        }
    }

    fn healthy_transport() -> Arc<dyn Transport> {
        Arc::new(
            FakeTransport::new()
                .ok("http://portal.test/health", r#"{"status":"healthy"}"#)
                .ok("https://google.com/favicon.ico", "")
                .ok("https://amazon.com/favicon.ico", "")
                .ok("https://microsoft.com/favicon.ico", "")
                .ok(constants::RESOLVER_PROBE_URL, "")
                .ok(constants::EXTERNAL_PROBE_URL, ""),
        )
    }

    /// Delays every request so a run stays in flight long enough to overlap.
    struct SlowTransport {
        inner: Arc<dyn Transport>,
        delay: Duration,
    }

    impl Transport for SlowTransport {
        fn get_text(&self, url: &str) -> Result<String, ProbeError> {
            thread::sleep(self.delay);
            self.inner.get_text(url)
        }

        fn get_success_text(&self, url: &str) -> Result<String, ProbeError> {
            thread::sleep(self.delay);
            self.inner.get_success_text(url)
        }

        fn reach(&self, url: &str) -> Result<(), ProbeError> {
            thread::sleep(self.delay);
            self.inner.reach(url)
        }
    }

    fn slow_transport() -> Arc<dyn Transport> {
        Arc::new(SlowTransport {
            inner: healthy_transport(),
            delay: Duration::from_millis(100),
        })
    }

    fn addresses(list: &'static [&'static str]) -> Arc<dyn AddressDiscovery> {
        Arc::new(move || Ok::<_, ProbeError>(list.iter().copied().collect::<AddressSet>()))
    }

    fn signed_in_store() -> SessionStore {
        let store = SessionStore::new();
        store.replace(SessionState::signed_in("user@example.com", Credential::new("t")));
        store
    }

    fn pump_until(app: &mut App, done: impl Fn(&App) -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            app.process_external();
            if done(app) {
                return true;
            }
            thread::sleep(Duration::from_millis(10));
        }
        false
    }

    #[test]
    fn test_probe_vpn_status_failure_is_unknown() {
        let failing = || Err::<AddressSet, _>(ProbeError::Unsupported("no sockets".into()));
        let status = probe_vpn_status(&failing, "10.8");
        assert!(!status.connected);
        assert!(!status.loading);
        assert_eq!(status.client_address.as_deref(), Some("unknown"));
    }

    #[test]
    fn test_signed_out_app_does_not_poll() {
        let mut app = App::new(
            quiet_config(),
            SessionStore::new(),
            healthy_transport(),
            addresses(&["10.8.0.5"]),
        );
        app.start();
        assert!(!app.is_polling());
        assert!(app.vpn.loading);
        assert_eq!(
            app.request_diagnostics(),
            Err(DiagnosticsError::NotAuthenticated)
        );
    }

    #[test]
    fn test_signed_in_app_populates_snapshots() {
        let mut app = App::new(
            quiet_config(),
            signed_in_store(),
            healthy_transport(),
            addresses(&["10.8.0.5", "192.168.1.2"]),
        )
        .with_sample_delay(Duration::ZERO);
        app.start();
        assert!(app.is_polling());

        assert!(pump_until(&mut app, |a| !a.vpn.loading
            && !a.health.loading
            && a.diagnostics_runs() >= 1));

        assert!(app.vpn.connected);
        assert_eq!(app.vpn.client_address.as_deref(), Some("10.8.0.5"));
        assert!(app.health.reachable && app.health.operational);
        assert_eq!(app.diagnostics.dns.status, ProbeStatus::Healthy);
    }

    #[test]
    fn test_manual_request_refused_while_in_flight() {
        let mut app = App::new(
            quiet_config(),
            signed_in_store(),
            healthy_transport(),
            addresses(&["192.168.1.2"]),
        )
        .with_sample_delay(Duration::ZERO);
        app.start();

        assert_eq!(app.request_diagnostics(), Ok(()));
        assert!(app.diagnostics.is_checking());
        assert_eq!(
            app.request_diagnostics(),
            Err(DiagnosticsError::AlreadyRunning)
        );

        assert!(pump_until(&mut app, |a| !a.diagnostics_in_flight()));
        assert!(!app.diagnostics.is_checking());
    }

    #[test]
    fn test_vpn_transition_triggers_diagnostics() {
        let mut app = App::new(
            quiet_config(),
            signed_in_store(),
            healthy_transport(),
            addresses(&["192.168.1.2"]),
        )
        .with_sample_delay(Duration::ZERO);
        app.start();

        assert!(pump_until(&mut app, |a| !a.vpn.loading
            && a.diagnostics_runs() == 1
            && !a.diagnostics_in_flight()));
        assert!(!app.vpn.connected);

        let tunneled: AddressSet = ["10.8.0.9"].into_iter().collect();
        app.apply_vpn_status(to_status(tunneled, "10.8"));

        assert!(pump_until(&mut app, |a| a.diagnostics_runs() == 2));
    }

    #[test]
    fn test_vpn_transition_during_run_queues_another() {
        let mut app = App::new(
            quiet_config(),
            signed_in_store(),
            slow_transport(),
            addresses(&["192.168.1.2"]),
        )
        .with_sample_delay(Duration::ZERO);
        app.start();

        assert!(pump_until(&mut app, |a| !a.vpn.loading
            && a.diagnostics_in_flight()
            && a.diagnostics_runs() == 0));

        let tunneled: AddressSet = ["10.8.0.9"].into_iter().collect();
        app.apply_vpn_status(to_status(tunneled, "10.8"));
        assert!(pump_until(&mut app, |a| a.diagnostics_pending()));
        assert_eq!(app.diagnostics_runs(), 0);

        assert!(pump_until(&mut app, |a| a.diagnostics_runs() >= 2
            && !a.diagnostics_in_flight()));
        assert!(!app.diagnostics_pending());
    }

    #[test]
    fn test_manual_request_does_not_queue() {
        let mut app = App::new(
            quiet_config(),
            signed_in_store(),
            slow_transport(),
            addresses(&["192.168.1.2"]),
        )
        .with_sample_delay(Duration::ZERO);
        app.start();

        assert!(pump_until(&mut app, |a| a.diagnostics_in_flight()));
        assert_eq!(
            app.request_diagnostics(),
            Err(DiagnosticsError::AlreadyRunning)
        );
        assert!(!app.diagnostics_pending());
    }

    #[test]
    fn test_sign_in_during_stale_run_starts_fresh() {
        let store = signed_in_store();
        let mut app = App::new(
            quiet_config(),
            store.clone(),
            slow_transport(),
            addresses(&["192.168.1.2"]),
        )
        .with_sample_delay(Duration::ZERO);
        app.start();
        assert!(pump_until(&mut app, |a| a.diagnostics_in_flight()));

        store.replace(SessionState::default());
        app.process_external();
        assert!(!app.diagnostics_in_flight());

        store.replace(SessionState::signed_in("user@example.com", Credential::new("t")));
        assert!(pump_until(&mut app, |a| a.diagnostics_in_flight()));
        assert_eq!(app.request_diagnostics(), Err(DiagnosticsError::AlreadyRunning));

        assert!(pump_until(&mut app, |a| a.diagnostics_runs() >= 1
            && !a.diagnostics_in_flight()));
        assert_eq!(app.diagnostics.dns.status, ProbeStatus::Healthy);
    }

    #[test]
    fn test_sign_out_stops_polling_and_resets() {
        let store = signed_in_store();
        let mut app = App::new(
            quiet_config(),
            store.clone(),
            healthy_transport(),
            addresses(&["10.8.0.5"]),
        )
        .with_sample_delay(Duration::ZERO);
        app.start();
        assert!(pump_until(&mut app, |a| !a.vpn.loading));

        store.replace(SessionState::default());
        assert!(app.process_external());
        assert!(!app.is_polling());
        assert!(!app.authenticated);
        assert!(app.vpn.loading);
        assert!(app.health.loading);

        store.replace(SessionState::signed_in("user@example.com", Credential::new("t")));
        app.process_external();
        assert!(app.is_polling());
    }
}
