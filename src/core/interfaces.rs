//! Local network address discovery.
//!
//! Addresses are learned from a candidate-gathering session: a
//! [`CandidateSource`] opens a session pointed at one rendezvous server and
//! streams candidate lines over a channel until it runs out. The probe pulls
//! address literals out of each candidate and stops at end-of-candidates or
//! when its time budget runs out, whichever comes first. The session is
//! always closed before the probe returns.
//!
//! This is a heuristic view of the device's interfaces. A sandboxed or
//! blocked source yields fewer (or no) addresses.

use std::io::{BufRead, BufReader};
use std::net::{IpAddr, ToSocketAddrs, UdpSocket};
use std::process::{Command, Stdio};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use log::{debug, warn};
use regex::Regex;

use crate::constants;
use crate::error::ProbeError;
use crate::state::AddressSet;

/// Dotted IPv4 or full eight-group IPv6 literal.
const ADDRESS_PATTERN: &str = r"(?i)([0-9]{1,3}(\.[0-9]{1,3}){3}|[a-f0-9]{1,4}(:[a-f0-9]{1,4}){7})";

fn address_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| {
            Regex::new(ADDRESS_PATTERN)
                .inspect_err(|e| warn!("NET: address pattern rejected: {e}"))
                .ok()
        })
        .as_ref()
}

/// Pulls every address literal out of a candidate's address field.
///
/// Candidate lines follow the `candidate:<foundation> <component> <proto>
/// <priority> <address> <port> typ <type>` layout; lines that don't are
/// scanned whole.
pub fn extract_addresses(candidate: &str, into: &mut AddressSet) {
    let Some(pattern) = address_pattern() else {
        return;
    };
    let field = candidate
        .split_whitespace()
        .nth(4)
        .filter(|_| candidate.starts_with("candidate:"))
        .unwrap_or(candidate);

    for found in pattern.find_iter(field) {
        if into.insert(found.as_str()) {
            debug!("NET: candidate address {}", found.as_str());
        }
    }
}

/// An open candidate-gathering session.
///
/// Closing is idempotent and also happens on drop, so every exit path of the
/// probe releases the underlying resources.
pub struct CandidateSession {
    candidates: Receiver<String>,
    closer: Option<Box<dyn FnOnce() + Send>>,
}

impl CandidateSession {
    pub fn new(candidates: Receiver<String>, closer: impl FnOnce() + Send + 'static) -> Self {
        Self {
            candidates,
            closer: Some(Box::new(closer)),
        }
    }

    pub fn close(&mut self) {
        if let Some(close) = self.closer.take() {
            close();
        }
    }
}

impl Drop for CandidateSession {
    fn drop(&mut self) {
        self.close();
    }
}

/// Something that can open a candidate-gathering session.
pub trait CandidateSource: Send + Sync {
    /// Opens a session using `rendezvous` (`host:port`) as its single server.
    ///
    /// # Errors
    ///
    /// [`ProbeError::Unsupported`] if the primitive is missing,
    /// [`ProbeError::Negotiation`] if the session could not be started.
    fn open(&self, rendezvous: &str) -> Result<CandidateSession, ProbeError>;
}

/// Anything that yields the device's current candidate addresses.
pub trait AddressDiscovery: Send + Sync {
    /// # Errors
    ///
    /// Returns the underlying source failure; callers treat it as "nothing found".
    fn discover(&self) -> Result<AddressSet, ProbeError>;
}

impl<F> AddressDiscovery for F
where
    F: Fn() -> Result<AddressSet, ProbeError> + Send + Sync,
{
    fn discover(&self) -> Result<AddressSet, ProbeError> {
        self()
    }
}

/// Bounded-time address discovery over a [`CandidateSource`].
pub struct InterfaceProbe<S> {
    source: S,
    rendezvous: String,
    timeout: Duration,
}

impl<S: CandidateSource> InterfaceProbe<S> {
    pub fn new(source: S, rendezvous: impl Into<String>) -> Self {
        Self {
            source,
            rendezvous: rendezvous.into(),
            timeout: constants::CANDIDATE_GATHER_TIMEOUT,
        }
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Gathers candidate addresses, returning within the time budget.
    ///
    /// Hitting the deadline is not an error: whatever was gathered so far is
    /// returned.
    ///
    /// # Errors
    ///
    /// Propagates [`CandidateSource::open`] failures.
    pub fn discover_local_addresses(&self) -> Result<AddressSet, ProbeError> {
        let deadline = Instant::now() + self.timeout;
        let mut session = self.source.open(&self.rendezvous)?;
        let mut addresses = AddressSet::new();

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match session.candidates.recv_timeout(remaining) {
                Ok(candidate) => extract_addresses(&candidate, &mut addresses),
                Err(RecvTimeoutError::Disconnected) => {
                    debug!("NET: candidate gathering complete");
                    break;
                }
                Err(RecvTimeoutError::Timeout) => {
                    debug!(
                        "NET: candidate gathering cut off after {}ms",
                        self.timeout.as_millis()
                    );
                    break;
                }
            }
        }

        session.close();
        Ok(addresses)
    }
}

impl<S: CandidateSource> AddressDiscovery for InterfaceProbe<S> {
    fn discover(&self) -> Result<AddressSet, ProbeError> {
        self.discover_local_addresses()
    }
}

/// Candidate source backed by the host's own networking.
///
/// Emits a host candidate for the local address routed toward the
/// rendezvous server and one per address in the platform interface listing
/// (`ip -o addr show` on Linux, `ifconfig` elsewhere). The two run side by
/// side, so a slow rendezvous lookup never holds back the listing. Closing
/// the session kills the listing process.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemCandidateSource;

impl SystemCandidateSource {
    fn listing_command() -> Command {
        if cfg!(target_os = "linux") {
            let mut cmd = Command::new("ip");
            cmd.args(["-o", "addr", "show"]);
            cmd
        } else {
            Command::new("ifconfig")
        }
    }
}

impl CandidateSource for SystemCandidateSource {
    fn open(&self, rendezvous: &str) -> Result<CandidateSession, ProbeError> {
        let socket = UdpSocket::bind("0.0.0.0:0")
            .map_err(|e| ProbeError::Unsupported(format!("cannot open UDP socket: {e}")))?;

        let mut child = Self::listing_command()
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => {
                    ProbeError::Unsupported(format!("interface listing unavailable: {e}"))
                }
                _ => ProbeError::Negotiation(format!("failed to start interface listing: {e}")),
            })?;

        let Some(stdout) = child.stdout.take() else {
            let _ = child.kill();
            return Err(ProbeError::Negotiation("interface listing has no output".into()));
        };

        let (tx, rx) = mpsc::channel();
        let closed = Arc::new(AtomicBool::new(false));
        let child = Arc::new(Mutex::new(child));
        let rendezvous = rendezvous.to_string();
        let worker_child = Arc::clone(&child);

        gather_candidates(
            BufReader::new(stdout),
            move || routed_address(&socket, &rendezvous),
            CandidateEmitter::new(tx, Arc::clone(&closed)),
            move || {
                let _ = worker_child
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .wait();
            },
        );

        Ok(CandidateSession::new(rx, move || {
            closed.store(true, Ordering::SeqCst);
            let mut child = child.lock().unwrap_or_else(PoisonError::into_inner);
            let _ = child.kill();
            let _ = child.wait();
        }))
    }
}

/// Numbers and sends host candidates until the session is closed.
#[derive(Clone)]
struct CandidateEmitter {
    tx: Sender<String>,
    closed: Arc<AtomicBool>,
    foundation: Arc<AtomicU32>,
}

impl CandidateEmitter {
    fn new(tx: Sender<String>, closed: Arc<AtomicBool>) -> Self {
        Self {
            tx,
            closed,
            foundation: Arc::new(AtomicU32::new(0)),
        }
    }

    /// Returns `false` once nobody is listening any more.
    fn emit(&self, address: &str) -> bool {
        if self.closed.load(Ordering::SeqCst) {
            return false;
        }
        let foundation = self.foundation.fetch_add(1, Ordering::SeqCst) + 1;
        self.tx
            .send(format!(
                "candidate:{foundation} 1 udp 2122260223 {address} 9 typ host"
            ))
            .is_ok()
    }
}

/// Runs the routed lookup and the interface listing on separate threads.
///
/// End-of-candidates is signalled once both threads have dropped their
/// senders. `finished` runs after the listing is exhausted.
fn gather_candidates(
    listing: impl BufRead + Send + 'static,
    routed: impl FnOnce() -> Option<String> + Send + 'static,
    emitter: CandidateEmitter,
    finished: impl FnOnce() + Send + 'static,
) {
    let routed_emitter = emitter.clone();
    thread::spawn(move || {
        if let Some(address) = routed() {
            routed_emitter.emit(&address);
        }
    });

    thread::spawn(move || {
        for line in listing.lines().map_while(Result::ok) {
            if let Some(address) = parse_listing_line(&line) {
                if !emitter.emit(&address) {
                    return;
                }
            }
        }
        finished();
    });
}

/// Local address the OS picks when routing toward the rendezvous server.
fn routed_address(socket: &UdpSocket, rendezvous: &str) -> Option<String> {
    let target = match rendezvous.to_socket_addrs() {
        Ok(mut addrs) => addrs.find(std::net::SocketAddr::is_ipv4)?,
        Err(e) => {
            warn!("NET: rendezvous {rendezvous} unresolved: {e}");
            return None;
        }
    };
    socket.connect(target).ok()?;
    let local = socket.local_addr().ok()?.ip();
    (!local.is_unspecified() && !local.is_loopback()).then(|| local.to_string())
}

/// Address in one line of `ip -o addr` or `ifconfig` output, skipping loopback.
fn parse_listing_line(line: &str) -> Option<String> {
    let mut tokens = line.split_whitespace();
    tokens.find(|t| *t == "inet" || *t == "inet6")?;
    let raw = tokens.next()?;
    let raw = raw.strip_prefix("addr:").unwrap_or(raw);
    let raw = raw.split(['/', '%']).next()?;

    let ip: IpAddr = raw.parse().ok()?;
    (!ip.is_loopback()).then(|| ip.to_string())
}
