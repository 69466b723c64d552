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

//! # Identifier Allocators
//!
//! Deterministic, stateful generators for port indices, MAC addresses and IP addresses. The
//! allocators carry no global lookup tables; uniqueness is guaranteed by construction (monotonic
//! counters, disjoint prefixes), which is what makes the assignment reproducible across runs of
//! the identical topology declaration.

use crate::types::{GraphError, IpNet, Mac};
use std::collections::BTreeSet;
use std::net::Ipv4Addr;

/// First port index handed out by the [`PortAllocator`]. Ports are 1-based; index 0 is reserved
/// for a CPU/control-plane attachment and is never allocated.
pub const FIRST_PORT: u32 = 1;

/// Per-node port index allocator.
///
/// Yields `1, 2, 3, ...`, skipping indices which were explicitly claimed by the caller. The
/// cursor only ever moves forward, so an index is never handed out twice, even if a later
/// explicit claim would logically free one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PortAllocator {
    next: u32,
    claimed: BTreeSet<u32>,
}

impl PortAllocator {
    /// Create a new allocator, starting at [`FIRST_PORT`].
    pub fn new() -> Self {
        Self { next: FIRST_PORT, claimed: BTreeSet::new() }
    }

    /// Claim an explicit port index. Returns `false` if the index was already claimed or
    /// allocated before.
    pub fn claim(&mut self, port: u32) -> bool {
        port >= self.next && self.claimed.insert(port)
    }

    /// Allocate the next unused port index.
    pub fn allocate(&mut self) -> u32 {
        while self.claimed.contains(&self.next) {
            self.next += 1;
        }
        let port = self.next;
        self.next += 1;
        port
    }
}

/// Fixed prefix of all counter-allocated MAC addresses: locally administered, unicast. The second
/// octet is outside the `0`/`1` side range used by [`Mac::from_ip`], so counter addresses can
/// never collide with IP-derived ones.
const MAC_PREFIX: [u8; 2] = [0x02, 0xaa];

/// Global MAC address allocator.
///
/// Encodes a monotonically increasing counter into the low-order four bytes behind a fixed
/// locally-administered prefix. Used for interfaces which carry no IP address (e.g. the two ends
/// of a switch-to-switch link under the `l2` strategy).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MacAllocator {
    counter: u32,
}

impl MacAllocator {
    /// Create a new allocator, starting at counter value 1.
    pub fn new() -> Self {
        Self { counter: 0 }
    }

    /// Allocate the next MAC address.
    pub fn allocate(&mut self) -> Mac {
        self.counter += 1;
        let c = self.counter.to_be_bytes();
        Mac([MAC_PREFIX[0], MAC_PREFIX[1], c[0], c[1], c[2], c[3]])
    }
}

/// IP address allocator over a single subnet.
///
/// Walks the usable host addresses of the subnet in increasing order (network and broadcast
/// addresses are never handed out), skipping any address contained in the caller-maintained
/// `blocked` set. Fails with [`GraphError::AddressExhaustion`] once the subnet is full. This is
/// the Rust rendition of iterating `IPv4Network(net).hosts()`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IpAllocator {
    net: IpNet,
    cursor: u32,
}

impl IpAllocator {
    /// Create a new allocator over the given subnet.
    pub fn new(net: IpNet) -> Self {
        Self { net: net.subnet(), cursor: 0 }
    }

    /// The subnet this allocator carves addresses out of.
    pub fn subnet(&self) -> IpNet {
        self.net
    }

    /// Allocate the next host address which is not in `blocked`.
    pub fn allocate(&mut self, blocked: &BTreeSet<Ipv4Addr>) -> Result<Ipv4Addr, GraphError> {
        let size = 1u64 << (32 - self.net.prefix as u32);
        loop {
            self.cursor += 1;
            if u64::from(self.cursor) >= size - 1 {
                return Err(GraphError::AddressExhaustion(format!(
                    "subnet {} cannot fit any further host",
                    self.net
                )));
            }
            let addr = Ipv4Addr::from(u32::from(self.net.network()) + self.cursor);
            if !blocked.contains(&addr) {
                return Ok(addr);
            }
        }
    }
}
