//! VPN connection state types.

use serde::Serialize;

/// Set of discovered network addresses.
///
/// Duplicates are discarded on insert. Discovery order is kept so that
/// "first discovered address" has a stable meaning for the classifier.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct AddressSet(Vec<String>);

impl AddressSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts an address, returning `false` if it was already present.
    pub fn insert(&mut self, address: impl Into<String>) -> bool {
        let address = address.into();
        if self.0.contains(&address) {
            return false;
        }
        self.0.push(address);
        true
    }

    #[must_use]
    pub fn contains(&self, address: &str) -> bool {
        self.0.iter().any(|a| a == address)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

impl<S: Into<String>> FromIterator<S> for AddressSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut set = Self::new();
        for address in iter {
            set.insert(address);
        }
        set
    }
}

/// Snapshot of the device's tunnel membership.
///
/// Produced by the VPN status monitor once per probe cycle and replaced
/// wholesale; consumers only ever see complete snapshots.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct VpnStatus {
    /// Whether any discovered address lies inside the VPN prefix.
    pub connected: bool,
    /// Address presented as the client's; `None` until the first cycle completes.
    pub client_address: Option<String>,
    /// Every address discovered in the last cycle.
    pub all_addresses: AddressSet,
    /// A probe cycle is in progress.
    pub loading: bool,
}

impl Default for VpnStatus {
    fn default() -> Self {
        Self {
            connected: false,
            client_address: None,
            all_addresses: AddressSet::new(),
            loading: true,
        }
    }
}

impl VpnStatus {
    /// Copy of this snapshot flagged as loading.
    #[must_use]
    pub fn reloading(&self) -> Self {
        Self {
            loading: true,
            ..self.clone()
        }
    }
}

/// Portal's own view of where the client connects from.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, serde::Deserialize)]
pub struct ServerObservedStatus {
    pub connected: bool,
    pub client_ip: String,
}
