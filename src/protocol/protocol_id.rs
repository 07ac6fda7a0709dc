//! Protocol identifiers negotiated between peers.
//!
//! ```text
//! /eth2/beacon_chain/req/<method>/<version>/<encoding>[_<compression>]
//! ```

use std::fmt;
use std::sync::Arc;

use crate::compression::Compression;

/// Prefix shared by all beacon-chain request/response protocols.
pub const PROTOCOL_PREFIX: &str = "/eth2/beacon_chain/req";

/// Static description of a request/response method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MethodDescriptor {
    /// Method name, e.g. `beacon_blocks_by_range`.
    pub name: &'static str,
    /// Method version.
    pub version: u32,
    /// Wire encoding of request and response objects.
    pub encoding: &'static str,
}

impl MethodDescriptor {
    /// Create an SSZ-encoded method descriptor.
    pub const fn ssz(name: &'static str, version: u32) -> Self {
        Self {
            name,
            version,
            encoding: "ssz",
        }
    }

    /// Protocol string without compression suffix.
    pub fn protocol(&self) -> String {
        format!(
            "{}/{}/{}/{}",
            PROTOCOL_PREFIX, self.name, self.version, self.encoding
        )
    }
}

/// Identifier of one method at one version, encoding and compression.
///
/// Two peers can only talk if both support the identical string.
///
/// # Example
///
/// ```
/// use beacon_reqresp::compression::SnappyCompression;
/// use beacon_reqresp::protocol::{MethodDescriptor, ProtocolId};
///
/// let method = MethodDescriptor::ssz("status", 1);
/// let id = ProtocolId::new(&method, &SnappyCompression);
/// assert_eq!(id.as_str(), "/eth2/beacon_chain/req/status/1/ssz_snappy");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProtocolId(Arc<str>);

impl ProtocolId {
    /// Build from a method and the compression in use.
    pub fn new(method: &MethodDescriptor, compression: &dyn Compression) -> Self {
        let mut id = method.protocol();
        if let Some(suffix) = compression.protocol_suffix() {
            id.push('_');
            id.push_str(suffix);
        }
        Self(id.into())
    }

    /// Wrap an identifier received from a peer or transport.
    pub fn from_raw(id: impl Into<Arc<str>>) -> Self {
        Self(id.into())
    }

    /// Identifier as a string.
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProtocolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compression::{NoCompression, SnappyCompression};

    #[test]
    fn test_protocol_without_compression_has_no_suffix() {
        let method = MethodDescriptor::ssz("beacon_blocks_by_range", 1);
        let id = ProtocolId::new(&method, &NoCompression);
        assert_eq!(id.as_str(), "/eth2/beacon_chain/req/beacon_blocks_by_range/1/ssz");
    }

    #[test]
    fn test_compression_changes_identity() {
        let method = MethodDescriptor::ssz("status", 1);
        let plain = ProtocolId::new(&method, &NoCompression);
        let snappy = ProtocolId::new(&method, &SnappyCompression);
        assert_ne!(plain, snappy);
        assert_eq!(snappy, ProtocolId::from_raw(snappy.to_string()));
    }
}
