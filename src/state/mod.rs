//! Status snapshot types shared between the probes and the front end.

pub mod connection;
pub mod diagnostics;
pub mod health;
pub mod session;

pub use connection::{AddressSet, ServerObservedStatus, VpnStatus};
pub use diagnostics::{
    CheckDetail, CheckStatus, DiagnosticsReport, ProbeResult, ProbeStatus, StabilityResult,
    StabilityStatus,
};
pub use health::{ConnectionQuality, Location, NetworkMetrics, ServerHealth};
pub use session::{Credential, SessionState, SessionStore};
