//! Node identity derived from the local network address
//!
//! The node id namespaces every topic and discovery `unique_id`, so several
//! bridges on one network never collide. It is resolved once at startup and
//! never changes for the life of the process.

use std::fmt;
use std::net::{IpAddr, Ipv4Addr};
use tracing::{debug, warn};

/// One address reported by interface enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InterfaceAddress {
    pub ip: IpAddr,
    /// Loopback or otherwise host-internal
    pub internal: bool,
}

impl From<&if_addrs::Interface> for InterfaceAddress {
    fn from(interface: &if_addrs::Interface) -> Self {
        Self {
            ip: interface.ip(),
            internal: interface.is_loopback(),
        }
    }
}

/// Resolved address plus the topic-safe node id derived from it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeIdentity {
    address: Ipv4Addr,
    node_id: String,
}

impl NodeIdentity {
    /// Enumerate host interfaces and pick an address
    ///
    /// Never fails: enumeration errors and hosts without a usable address
    /// degrade to the loopback address.
    pub fn resolve(preferred_prefix: &str) -> Self {
        let candidates = match if_addrs::get_if_addrs() {
            Ok(interfaces) => interfaces.iter().map(InterfaceAddress::from).collect(),
            Err(e) => {
                warn!(error = %e, "Failed to enumerate network interfaces, using loopback");
                Vec::new()
            }
        };
        let identity = Self::from_candidates(preferred_prefix, candidates);
        debug!(address = %identity.address, node_id = %identity.node_id, "Resolved node identity");
        identity
    }

    /// Pick an address from already-enumerated candidates
    ///
    /// First non-internal IPv4 address whose text starts with
    /// `preferred_prefix`, else the first non-internal IPv4 address, else
    /// loopback.
    pub fn from_candidates<I>(preferred_prefix: &str, candidates: I) -> Self
    where
        I: IntoIterator<Item = InterfaceAddress>,
    {
        let external: Vec<Ipv4Addr> = candidates
            .into_iter()
            .filter(|candidate| !candidate.internal)
            .filter_map(|candidate| match candidate.ip {
                IpAddr::V4(v4) if !v4.is_loopback() => Some(v4),
                _ => None,
            })
            .collect();

        let address = external
            .iter()
            .find(|ip| !preferred_prefix.is_empty() && ip.to_string().starts_with(preferred_prefix))
            .or_else(|| external.first())
            .copied()
            .unwrap_or(Ipv4Addr::LOCALHOST);

        Self::from_address(address)
    }

    pub fn from_address(address: Ipv4Addr) -> Self {
        Self {
            address,
            node_id: node_id_for(address),
        }
    }

    pub fn address(&self) -> Ipv4Addr {
        self.address
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    pub fn is_loopback(&self) -> bool {
        self.address.is_loopback()
    }
}

impl fmt::Display for NodeIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.node_id, self.address)
    }
}

/// `192.168.1.20` -> `192_168_1_20`
pub fn node_id_for(address: Ipv4Addr) -> String {
    address.to_string().replace('.', "_")
}
