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

//! The `l2` assignment strategy: all hosts share a single subnet.

use super::{assign_switch_ids, host_link, numeric_suffix, validate_automatic, AssignmentStrategy};
use crate::allocators::IpAllocator;
use crate::graph::NetworkGraph;
use crate::types::{GraphError, IpNet, Mac, NodeKind};
use log::*;
use std::collections::{BTreeMap, BTreeSet};
use std::net::Ipv4Addr;

/// # L2 Assignment Strategy
///
/// All hosts live in one shared broadcast domain (default `10.0.0.0/16`). A host whose name
/// carries a numeric suffix gets the base address plus that suffix (`h7 -> 10.0.0.7`,
/// `h300 -> 10.0.1.44`); hosts without a parseable suffix draw the next free address in link
/// declaration order. The MAC addresses of both link ends are derived from the host IP, so the
/// numbering scheme is visible in packet captures. Switch-to-switch interfaces carry no IP.
#[derive(Debug, Clone, PartialEq)]
pub struct L2Strategy {
    subnet: IpNet,
}

impl Default for L2Strategy {
    fn default() -> Self {
        Self { subnet: IpNet::new(Ipv4Addr::new(10, 0, 0, 0), 16) }
    }
}

impl L2Strategy {
    /// Create the strategy with a non-default shared subnet.
    pub fn new(subnet: IpNet) -> Self {
        Self { subnet: subnet.subnet() }
    }
}

impl AssignmentStrategy for L2Strategy {
    fn name(&self) -> &str {
        "l2"
    }

    fn assign(&self, graph: &mut NetworkGraph) -> Result<(), GraphError> {
        validate_automatic(graph)?;
        // device ids are not used for addressing here, but the control plane still wants them
        assign_switch_ids(graph)?;

        info!("l2 assignment over {}", self.subnet);
        let base = u32::from(self.subnet.network());
        let size = 1u64 << (32 - self.subnet.prefix as u32);

        // reserve addresses for suffix-named hosts, first declaration wins
        let mut reserved: BTreeMap<_, Ipv4Addr> = BTreeMap::new();
        for host in graph.nodes_of_kind(NodeKind::Host) {
            if let Some(n) = numeric_suffix(graph.name(host)) {
                if n >= 1 && u64::from(n) < size - 1 {
                    reserved.insert(host, Ipv4Addr::from(base + n));
                }
            }
        }

        let mut blocked: BTreeSet<Ipv4Addr> = reserved.values().copied().collect();
        let mut consumed: BTreeSet<Ipv4Addr> = BTreeSet::new();
        let mut alloc = IpAllocator::new(self.subnet);

        for index in 0..graph.links().len() {
            let (host, _) = match host_link(graph, index) {
                Some(ends) => ends,
                None => continue,
            };
            // a reserved address can be taken at most once; duplicated suffixes fall back
            let ip = match reserved.get(&host) {
                Some(&ip) if consumed.insert(ip) => ip,
                _ => alloc.allocate(&blocked)?,
            };
            blocked.insert(ip);

            let host_mac = Mac::from_ip(ip, 0);
            let switch_mac = Mac::from_ip(ip, 1);
            debug!("assign {} to {} ({})", ip, graph.name(host), host_mac);

            let prefix = self.subnet.prefix;
            let link = &mut graph.links_mut()[index];
            let host_iface = link.endpoint_mut(host).expect("endpoint of its own link");
            host_iface.ip.get_or_insert(IpNet::new(ip, prefix));
            host_iface.mac.get_or_insert(host_mac);
            let peer = link.peer_of(host).expect("endpoint of its own link");
            let switch_iface = link.endpoint_mut(peer).expect("endpoint of its own link");
            switch_iface.mac.get_or_insert(switch_mac);
        }
        Ok(())
    }
}
