// P4Topo: Topology Modelling and Address Assignment for P4 Network Emulation
// Copyright (C) 2021  Edgar Costa Molero
//
// This program is free software; you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation; either version 2 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along
// with this program; if not, write to the Free Software Foundation, Inc.,
// 51 Franklin Street, Fifth Floor, Boston, MA 02110-1301 USA.

//! Module containing all type definitions

use petgraph::prelude::*;
use petgraph::stable_graph::StableGraph;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;
use thiserror::Error;

type IndexType = u32;
/// Node identification (and index into the graph)
pub type NodeId = NodeIndex<IndexType>;
/// Link weight, used for shortest path computations
pub type LinkWeight = f64;
/// Physical topology graph. The node weight is the node name, the edge weight is the index of the
/// corresponding link in the link table.
pub(crate) type PhysicalGraph = StableGraph<String, usize, Undirected, IndexType>;

/// The kind of an emulated network device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    /// End host, attached to exactly one switch under the automatic strategies.
    Host,
    /// (P4) switch, forwarding device of the emulated network.
    Switch,
    /// Router, addressed by the caller (the automatic strategies leave routers alone).
    Router,
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Host => write!(f, "host"),
            Self::Switch => write!(f, "switch"),
            Self::Router => write!(f, "router"),
        }
    }
}

/// 48-bit MAC address.
///
/// All automatically generated addresses have the locally-administered bit set (first octet
/// `0x02`), so they can never collide with burned-in hardware addresses. Addresses derived from an
/// IPv4 address ([`Mac::from_ip`]) carry the endpoint side in the second octet and the four IP
/// octets in the lower four bytes, so that an engineer reading a packet capture can map the MAC
/// back to the IP at a glance.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Mac(pub [u8; 6]);

impl Mac {
    /// Derive a MAC address from an IPv4 address. The `side` is `0` for the host end of a link and
    /// `1` for the switch (or gateway) end, keeping the two ends of a link distinct.
    pub fn from_ip(ip: Ipv4Addr, side: u8) -> Self {
        let o = ip.octets();
        Mac([0x02, side, o[0], o[1], o[2], o[3]])
    }
}

impl fmt::Display for Mac {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            self.0[0], self.0[1], self.0[2], self.0[3], self.0[4], self.0[5]
        )
    }
}

impl fmt::Debug for Mac {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Mac({})", self)
    }
}

impl FromStr for Mac {
    type Err = InvalidAddress;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut bytes = [0u8; 6];
        let mut parts = s.split(':');
        for byte in bytes.iter_mut() {
            let part = parts.next().ok_or_else(|| InvalidAddress(s.to_string()))?;
            *byte = u8::from_str_radix(part, 16).map_err(|_| InvalidAddress(s.to_string()))?;
        }
        if parts.next().is_some() {
            return Err(InvalidAddress(s.to_string()));
        }
        Ok(Mac(bytes))
    }
}

impl Serialize for Mac {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Mac {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(D::Error::custom)
    }
}

/// IPv4 interface address: host address plus prefix length (e.g. `10.0.0.1/16`).
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct IpNet {
    /// Host address
    pub addr: Ipv4Addr,
    /// Prefix length in bits
    pub prefix: u8,
}

impl IpNet {
    /// Create a new interface address.
    pub fn new(addr: Ipv4Addr, prefix: u8) -> Self {
        Self { addr, prefix }
    }

    /// Bitmask corresponding to the prefix length.
    fn mask(&self) -> u32 {
        if self.prefix == 0 {
            0
        } else {
            u32::max_value() << (32 - self.prefix as u32)
        }
    }

    /// The network address (host bits cleared).
    pub fn network(&self) -> Ipv4Addr {
        Ipv4Addr::from(u32::from(self.addr) & self.mask())
    }

    /// The subnet in network form (`10.1.1.0/24` for `10.1.1.2/24`).
    pub fn subnet(&self) -> IpNet {
        IpNet::new(self.network(), self.prefix)
    }

    /// Check if the given address lies inside this subnet.
    pub fn contains(&self, addr: Ipv4Addr) -> bool {
        u32::from(addr) & self.mask() == u32::from(self.network())
    }

    /// Check if two interface addresses share the same subnet.
    pub fn same_subnet(&self, other: &IpNet) -> bool {
        self.prefix == other.prefix && self.network() == other.network()
    }
}

impl fmt::Display for IpNet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.addr, self.prefix)
    }
}

impl fmt::Debug for IpNet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "IpNet({})", self)
    }
}

impl FromStr for IpNet {
    type Err = InvalidAddress;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.splitn(2, '/');
        let addr = parts
            .next()
            .and_then(|a| a.parse::<Ipv4Addr>().ok())
            .ok_or_else(|| InvalidAddress(s.to_string()))?;
        let prefix = match parts.next() {
            Some(p) => p.parse::<u8>().map_err(|_| InvalidAddress(s.to_string()))?,
            None => 32,
        };
        if prefix > 32 {
            return Err(InvalidAddress(s.to_string()));
        }
        Ok(IpNet::new(addr, prefix))
    }
}

impl Serialize for IpNet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for IpNet {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(D::Error::custom)
    }
}

/// Error raised when parsing a malformed MAC or IP literal.
#[derive(Error, Debug, PartialEq)]
#[error("Invalid address literal: {0}")]
pub struct InvalidAddress(pub String);

/// Topology construction and query errors. All of these represent caller-provided topology
/// mistakes; none of them is retried internally.
#[derive(Error, Debug, PartialEq)]
pub enum GraphError {
    /// A node with the same name was already declared
    #[error("Node {0} was already declared")]
    DuplicateNode(String),
    /// The referenced node does not exist in the topology
    #[error("Node {0} does not exist in the topology")]
    UnknownNode(String),
    /// A second link between the same node pair (rejected under the automatic strategies)
    #[error("A link between {0} and {1} was already declared")]
    ParallelLink(String, String),
    /// The topology violates a structural assumption of the selected strategy
    #[error("Invalid topology shape: {0}")]
    TopologyShape(String),
    /// The strategy's address or identifier space cannot fit all required devices
    #[error("Address space exhausted: {0}")]
    AddressExhaustion(String),
    /// Query for two nodes which are not directly linked
    #[error("Nodes {0} and {1} are not directly connected")]
    NotConnected(String, String),
    /// A manual-only attribute was supplied under an automatic strategy, or vice versa
    #[error("Strategy mismatch: {0}")]
    StrategyMismatch(String),
}

/// Persistence errors. These are kept separate from [`GraphError`], so that callers can
/// distinguish a bad topology declaration from bad storage.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Reading or writing the snapshot file failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// The snapshot file is not valid JSON, or does not match the expected schema
    #[error("Invalid snapshot format: {0}")]
    Format(#[from] serde_json::Error),
    /// The snapshot was written by an incompatible version of this library
    #[error("Unsupported snapshot version {found} (expected {expected})")]
    Version {
        /// Version found in the snapshot file
        found: u32,
        /// Version this library expects
        expected: u32,
    },
}
