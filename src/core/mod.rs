//! Probes and portal clients.
//!
//! Everything here is UI-agnostic: probes return status values, and the
//! [`scheduler`] runs them periodically on background threads.

pub mod classifier;
pub mod diagnostics;
pub mod downloader;
pub mod health;
pub mod interfaces;
pub mod scheduler;
pub mod telemetry;
pub mod transport;

pub use classifier::{classify, to_status, Classification};
pub use diagnostics::DiagnosticsEngine;
pub use health::check_server_health;
pub use interfaces::{AddressDiscovery, InterfaceProbe, SystemCandidateSource};
pub use scheduler::{PollEvent, Poller};
pub use transport::{HttpTransport, Transport};
