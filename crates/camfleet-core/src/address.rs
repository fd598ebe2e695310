//! Server addresses, network ranges and the working address set.

use std::fmt;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::DEFAULT_PORT;
use crate::error::{Error, Result};

/// Network endpoint of one camera server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ServerAddress(SocketAddr);

impl ServerAddress {
    pub fn new(addr: SocketAddr) -> Self {
        Self(addr)
    }

    pub fn socket_addr(&self) -> SocketAddr {
        self.0
    }

    pub fn ip(&self) -> IpAddr {
        self.0.ip()
    }

    pub fn port(&self) -> u16 {
        self.0.port()
    }

    /// Parse `ip` or `ip:port`, filling in `default_port` when absent.
    pub fn parse_with_port(s: &str, default_port: u16) -> Result<Self> {
        let s = s.trim();
        if let Ok(addr) = s.parse::<SocketAddr>() {
            return Ok(Self(addr));
        }
        s.parse::<IpAddr>()
            .map(|ip| Self(SocketAddr::new(ip, default_port)))
            .map_err(|_| Error::Validation(format!("invalid server address: {s:?}")))
    }
}

impl From<SocketAddr> for ServerAddress {
    fn from(addr: SocketAddr) -> Self {
        Self(addr)
    }
}

impl FromStr for ServerAddress {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse_with_port(s, DEFAULT_PORT)
    }
}

impl fmt::Display for ServerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// IPv4 CIDR range that discovery is confined to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct NetworkRange {
    network: Ipv4Addr,
    prefix: u8,
}

impl NetworkRange {
    pub fn new(addr: Ipv4Addr, prefix: u8) -> Result<Self> {
        if prefix > 32 {
            return Err(Error::Validation(format!(
                "network prefix must be 0..=32, got {prefix}"
            )));
        }
        let network = Ipv4Addr::from(u32::from(addr) & mask(prefix));
        Ok(Self { network, prefix })
    }

    pub fn network(&self) -> Ipv4Addr {
        self.network
    }

    pub fn prefix(&self) -> u8 {
        self.prefix
    }

    /// Directed broadcast address of the range (the host itself for /32).
    pub fn broadcast(&self) -> Ipv4Addr {
        Ipv4Addr::from(u32::from(self.network) | !mask(self.prefix))
    }

    pub fn contains(&self, ip: IpAddr) -> bool {
        match ip {
            IpAddr::V4(v4) => u32::from(v4) & mask(self.prefix) == u32::from(self.network),
            IpAddr::V6(_) => false,
        }
    }
}

fn mask(prefix: u8) -> u32 {
    if prefix == 0 {
        0
    } else {
        u32::MAX << (32 - u32::from(prefix))
    }
}

impl FromStr for NetworkRange {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let (addr, prefix) = match s.split_once('/') {
            Some((addr, prefix)) => {
                let prefix = prefix
                    .parse::<u8>()
                    .map_err(|_| Error::Validation(format!("invalid network prefix in {s:?}")))?;
                (addr, prefix)
            }
            None => (s, 32),
        };
        let addr = addr
            .parse::<Ipv4Addr>()
            .map_err(|_| Error::Validation(format!("invalid network address in {s:?}")))?;
        Self::new(addr, prefix)
    }
}

impl TryFrom<String> for NetworkRange {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl From<NetworkRange> for String {
    fn from(range: NetworkRange) -> Self {
        range.to_string()
    }
}

impl fmt::Display for NetworkRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.network, self.prefix)
    }
}

/// Working set of server addresses.
///
/// Manually added entries and discovered entries are kept apart so that a new
/// discovery round replaces only what the previous round found.
#[derive(Debug, Clone, Default)]
pub struct AddressSet {
    network: Option<NetworkRange>,
    manual: Vec<ServerAddress>,
    discovered: Vec<ServerAddress>,
}

impl AddressSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_network(network: NetworkRange) -> Self {
        Self {
            network: Some(network),
            ..Self::default()
        }
    }

    pub fn network(&self) -> Option<NetworkRange> {
        self.network
    }

    /// Constrain subsequent discovery. Membership is left untouched.
    pub fn set_network(&mut self, network: NetworkRange) {
        self.network = Some(network);
    }

    /// Insert an address; returns false if it was already a member.
    ///
    /// A discovered entry added manually becomes manual so it survives the
    /// next discovery round.
    pub fn add(&mut self, address: ServerAddress) -> bool {
        if self.manual.contains(&address) {
            return false;
        }
        let was_discovered = self.discovered.contains(&address);
        self.discovered.retain(|a| *a != address);
        self.manual.push(address);
        !was_discovered
    }

    /// Remove an address; returns false if it was not a member.
    pub fn remove(&mut self, address: &ServerAddress) -> bool {
        let before = self.len();
        self.manual.retain(|a| a != address);
        self.discovered.retain(|a| a != address);
        self.len() < before
    }

    pub fn contains(&self, address: &ServerAddress) -> bool {
        self.manual.contains(address) || self.discovered.contains(address)
    }

    pub fn len(&self) -> usize {
        self.manual.len() + self.discovered.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = &ServerAddress> {
        self.manual.iter().chain(self.discovered.iter())
    }

    /// Copy of the current membership, for one dispatch round.
    pub fn snapshot(&self) -> Vec<ServerAddress> {
        self.iter().copied().collect()
    }

    /// Replace the discovered subset with the result of a discovery round.
    /// Returns the resulting membership count.
    pub fn replace_discovered(&mut self, found: impl IntoIterator<Item = ServerAddress>) -> usize {
        let mut discovered: Vec<ServerAddress> = Vec::new();
        for address in found {
            if !self.manual.contains(&address) && !discovered.contains(&address) {
                discovered.push(address);
            }
        }
        debug!(
            "Address set: {} manual, {} discovered",
            self.manual.len(),
            discovered.len()
        );
        self.discovered = discovered;
        self.len()
    }

    /// Drop every entry, manual and discovered.
    pub fn clear(&mut self) {
        self.manual.clear();
        self.discovered.clear();
    }
}

impl<'a> IntoIterator for &'a AddressSet {
    type Item = &'a ServerAddress;
    type IntoIter = std::iter::Chain<
        std::slice::Iter<'a, ServerAddress>,
        std::slice::Iter<'a, ServerAddress>,
    >;

    fn into_iter(self) -> Self::IntoIter {
        self.manual.iter().chain(self.discovered.iter())
    }
}
