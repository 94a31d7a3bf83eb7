//! Error types shared by the probes and portal collaborators.
//!
//! None of the probe errors travel past their component: pollers fold them
//! into a degraded status value and log them. Only the config download and
//! sign-in surface errors to the user.

use thiserror::Error;

/// Failure of a single probe operation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProbeError {
    /// The negotiation primitive is not available in this environment.
    #[error("candidate negotiation unsupported: {0}")]
    Unsupported(String),
    /// Opening the negotiation session failed.
    #[error("candidate negotiation failed: {0}")]
    Negotiation(String),
    /// A request failed before a response arrived.
    #[error("network unreachable: {0}")]
    Network(String),
    /// A response arrived with a non-success status.
    #[error("server answered HTTP {0}")]
    Status(u16),
    /// The bounded wait was exceeded.
    #[error("timed out after {0} ms")]
    Timeout(u64),
}

impl From<reqwest::Error> for ProbeError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Network(format!("request timed out: {err}"))
        } else {
            Self::Network(err.to_string())
        }
    }
}

/// Refusal to start a diagnostics run.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticsError {
    #[error("a diagnostics run is already in progress")]
    AlreadyRunning,
    #[error("sign in to run diagnostics")]
    NotAuthenticated,
}

/// Errors from the identity collaborator.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("{}: {0}", crate::constants::ERR_AUTH_FAILED)]
    Rejected(String),
    #[error("portal unreachable: {0}")]
    Network(#[from] reqwest::Error),
}

/// Errors from the configuration download.
#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("{}", crate::constants::CLI_MSG_NOT_SIGNED_IN)]
    NotAuthenticated,
    #[error("{}: {0}", crate::constants::ERR_DOWNLOAD_FAILED)]
    Server(String),
    #[error("{}", crate::constants::ERR_HTML_CONTENT)]
    HtmlContent,
    #[error("{}", crate::constants::ERR_EMPTY_CONTENT)]
    Empty,
    #[error("network request failed: {0}")]
    Network(#[from] reqwest::Error),
    #[error("failed to write configuration: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors while loading the configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid configuration in {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid portal URL '{0}'")]
    InvalidUrl(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_probe_error_messages() {
        assert_eq!(
            ProbeError::Unsupported("no sockets".into()).to_string(),
            "candidate negotiation unsupported: no sockets"
        );
        assert_eq!(ProbeError::Timeout(1000).to_string(), "timed out after 1000 ms");
    }

    #[test]
    fn test_download_error_not_authenticated_mentions_login() {
        assert!(DownloadError::NotAuthenticated.to_string().contains("login"));
    }
}
