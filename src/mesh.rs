//! Mesh network inventory: device type, the provider trait, and the
//! mesh address-space predicate.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

use crate::error::SyncError;

/// One address of one active mesh participant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MeshDevice {
    /// Hostname as reported by the provider; may contain dots.
    pub hostname: String,
    /// Mesh IP address.
    pub address: IpAddr,
}

impl MeshDevice {
    /// Create a device entry.
    pub fn new(hostname: impl Into<String>, address: IpAddr) -> Self {
        Self {
            hostname: hostname.into(),
            address,
        }
    }
}

/// Source of the current mesh membership.
#[async_trait]
pub trait MeshInventory: Send + Sync {
    /// Short provider name for logs ("tailscale", "headscale").
    fn name(&self) -> &'static str;

    /// Fetch every device address currently in the mesh.
    async fn devices(&self) -> Result<Vec<MeshDevice>, SyncError>;
}

/// Parse a provider-reported address string.
pub(crate) fn parse_address(raw: &str) -> Result<IpAddr, SyncError> {
    raw.parse()
        .map_err(|_| SyncError::InvalidAddress(raw.to_string()))
}

/// Error body shared by the Tailscale and Headscale APIs.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: Option<String>,
}

/// Read a mesh API response body, mapping non-2xx statuses to
/// [`SyncError::Api`] with the provider's `message` when present.
pub(crate) async fn read_body(
    service: &'static str,
    response: reqwest::Response,
) -> Result<String, SyncError> {
    let status = response.status();
    let body = response.text().await?;
    if status.is_success() {
        return Ok(body);
    }

    let message = serde_json::from_str::<ErrorBody>(&body)
        .ok()
        .and_then(|b| b.message)
        .unwrap_or(body);
    Err(SyncError::Api {
        service,
        status: status.as_u16(),
        message,
    })
}

/// Decode a successful mesh API response body.
pub(crate) fn decode<T: DeserializeOwned>(service: &'static str, body: &str) -> Result<T, SyncError> {
    serde_json::from_str(body).map_err(|source| SyncError::Decode { service, source })
}

/// An IPv4 or IPv6 CIDR prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IpPrefix {
    network: IpAddr,
    len: u8,
}

impl IpPrefix {
    /// Create a prefix. Returns `None` if `len` exceeds the address width.
    pub fn new(network: IpAddr, len: u8) -> Option<Self> {
        let max = match network {
            IpAddr::V4(_) => 32,
            IpAddr::V6(_) => 128,
        };
        (len <= max).then_some(Self { network, len })
    }

    /// Whether `addr` lies inside this prefix. Families never match each other.
    pub fn contains(&self, addr: &IpAddr) -> bool {
        match (self.network, addr) {
            (IpAddr::V4(net), IpAddr::V4(ip)) => {
                let mask = mask_u32(self.len);
                u32::from(net) & mask == u32::from(*ip) & mask
            }
            (IpAddr::V6(net), IpAddr::V6(ip)) => {
                let mask = mask_u128(self.len);
                u128::from(net) & mask == u128::from(*ip) & mask
            }
            _ => false,
        }
    }
}

fn mask_u32(len: u8) -> u32 {
    if len == 0 {
        0
    } else {
        u32::MAX << (32 - u32::from(len))
    }
}

fn mask_u128(len: u8) -> u128 {
    if len == 0 {
        0
    } else {
        u128::MAX << (128 - u32::from(len))
    }
}

impl FromStr for IpPrefix {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || SyncError::Config(format!("invalid CIDR prefix: {s}"));
        let (addr, len) = s.split_once('/').ok_or_else(invalid)?;
        let network: IpAddr = addr.trim().parse().map_err(|_| invalid())?;
        let len: u8 = len.trim().parse().map_err(|_| invalid())?;
        Self::new(network, len).ok_or_else(invalid)
    }
}

impl fmt::Display for IpPrefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.network, self.len)
    }
}

/// Tailscale's CGNAT range, also Headscale's default IPv4 prefix.
pub const TAILSCALE_V4: IpPrefix = IpPrefix {
    network: IpAddr::V4(Ipv4Addr::new(100, 64, 0, 0)),
    len: 10,
};

/// Tailscale's ULA range, also Headscale's default IPv6 prefix.
pub const TAILSCALE_V6: IpPrefix = IpPrefix {
    network: IpAddr::V6(Ipv6Addr::new(0xfd7a, 0x115c, 0xa1e0, 0, 0, 0, 0, 0)),
    len: 48,
};

/// The set of prefixes that count as mesh addresses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MeshAddressSpace {
    prefixes: Vec<IpPrefix>,
}

impl Default for MeshAddressSpace {
    fn default() -> Self {
        Self {
            prefixes: vec![TAILSCALE_V4, TAILSCALE_V6],
        }
    }
}

impl MeshAddressSpace {
    /// Address space made of the given prefixes.
    pub fn new(prefixes: Vec<IpPrefix>) -> Self {
        Self { prefixes }
    }

    /// Parse a list of CIDR strings; an empty list gives the default ranges.
    pub fn from_cidrs<S: AsRef<str>>(cidrs: &[S]) -> Result<Self, SyncError> {
        if cidrs.is_empty() {
            return Ok(Self::default());
        }
        let prefixes = cidrs
            .iter()
            .map(|c| c.as_ref().parse())
            .collect::<Result<Vec<IpPrefix>, _>>()?;
        Ok(Self::new(prefixes))
    }

    /// Whether an address is inside the mesh address space.
    pub fn contains(&self, addr: &IpAddr) -> bool {
        self.prefixes.iter().any(|p| p.contains(addr))
    }

    /// Same as [`contains`](Self::contains) for raw record content. Content
    /// that is not an IP address is never a mesh address.
    pub fn contains_str(&self, content: &str) -> bool {
        content
            .parse::<IpAddr>()
            .map(|ip| self.contains(&ip))
            .unwrap_or(false)
    }
}
