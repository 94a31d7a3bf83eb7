//! Server liveness and egress metrics state types.

use serde::{Deserialize, Serialize};

/// Availability of the portal's origin server.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct ServerHealth {
    /// The liveness request completed with a well-formed response.
    pub reachable: bool,
    /// The response reported the server as healthy.
    pub operational: bool,
    /// A poll is in progress and no result has arrived yet.
    pub loading: bool,
}

impl Default for ServerHealth {
    fn default() -> Self {
        Self {
            reachable: false,
            operational: false,
            loading: true,
        }
    }
}

impl ServerHealth {
    /// Result of a poll whose request failed.
    #[must_use]
    pub const fn unreachable() -> Self {
        Self {
            reachable: false,
            operational: false,
            loading: false,
        }
    }

    /// Result of a poll that received a well-formed response.
    #[must_use]
    pub const fn reachable(operational: bool) -> Self {
        Self {
            reachable: true,
            operational,
            loading: false,
        }
    }
}

/// Egress geolocation, as reported by the lookup service.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default, rename(deserialize = "organization_name"))]
    pub isp: Option<String>,
}

impl Location {
    /// No field was reported, as with a rate-limit or error payload.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.city.is_none() && self.region.is_none() && self.country.is_none() && self.isp.is_none()
    }
}

impl std::fmt::Display for Location {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (&self.city, &self.country) {
            (Some(city), Some(country)) => write!(f, "{city}, {country}"),
            (Some(city), None) => write!(f, "{city}"),
            (None, Some(country)) => write!(f, "{country}"),
            (None, None) => write!(f, "Unknown"),
        }
    }
}

/// Latency grade of the egress path.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub enum ConnectionQuality {
    Excellent,
    Good,
    Fair,
    Poor,
    #[default]
    Unknown,
}

impl ConnectionQuality {
    /// Grades a round-trip latency; `None` means the lookup failed.
    #[must_use]
    pub fn from_latency(latency_ms: Option<u64>) -> Self {
        use crate::constants::{QUALITY_EXCELLENT_MS, QUALITY_FAIR_MS, QUALITY_GOOD_MS};

        match latency_ms {
            None | Some(0) => Self::Unknown,
            Some(ms) if ms < QUALITY_EXCELLENT_MS => Self::Excellent,
            Some(ms) if ms < QUALITY_GOOD_MS => Self::Good,
            Some(ms) if ms < QUALITY_FAIR_MS => Self::Fair,
            Some(_) => Self::Poor,
        }
    }

    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Excellent => "Excellent",
            Self::Good => "Good",
            Self::Fair => "Fair",
            Self::Poor => "Poor",
            Self::Unknown => "Unknown",
        }
    }
}

/// Egress metrics snapshot.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct NetworkMetrics {
    pub location: Option<Location>,
    pub latency_ms: Option<u64>,
    pub quality: ConnectionQuality,
    pub loading: bool,
}

impl Default for NetworkMetrics {
    fn default() -> Self {
        Self {
            location: None,
            latency_ms: None,
            quality: ConnectionQuality::Unknown,
            loading: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_health_flags_consistent() {
        let down = ServerHealth::unreachable();
        assert!(!down.reachable && !down.operational && !down.loading);

        let degraded = ServerHealth::reachable(false);
        assert!(degraded.reachable && !degraded.operational);
    }

    #[test]
    fn test_quality_thresholds() {
        assert_eq!(ConnectionQuality::from_latency(Some(30)), ConnectionQuality::Excellent);
        assert_eq!(ConnectionQuality::from_latency(Some(50)), ConnectionQuality::Good);
        assert_eq!(ConnectionQuality::from_latency(Some(150)), ConnectionQuality::Fair);
        assert_eq!(ConnectionQuality::from_latency(Some(200)), ConnectionQuality::Poor);
        assert_eq!(ConnectionQuality::from_latency(None), ConnectionQuality::Unknown);
    }

    #[test]
    fn test_location_display() {
        let loc = Location {
            city: Some("Amsterdam".into()),
            country: Some("NL".into()),
            ..Default::default()
        };
        assert_eq!(loc.to_string(), "Amsterdam, NL");
        assert_eq!(Location::default().to_string(), "Unknown");
    }

    #[test]
    fn test_location_emptiness() {
        assert!(Location::default().is_empty());
        let isp_only = Location {
            isp: Some("AS9009 M247".into()),
            ..Default::default()
        };
        assert!(!isp_only.is_empty());
    }

    #[test]
    fn test_location_parses_geo_payload() {
        let json = r#"{"city":"Berlin","region":"Berlin","country":"DE","organization_name":"AS1 Example"}"#;
        let loc: Location = serde_json::from_str(json).unwrap();
        assert_eq!(loc.isp.as_deref(), Some("AS1 Example"));
        assert_eq!(loc.country.as_deref(), Some("DE"));
    }
}
