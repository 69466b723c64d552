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

//! The `mixed` assignment strategy: one subnet per switch.

use super::{assign_switch_ids, host_link, numeric_suffix, validate_automatic, AssignmentStrategy};
use crate::allocators::IpAllocator;
use crate::graph::NetworkGraph;
use crate::types::{GraphError, IpNet, Mac, NodeId};
use log::*;
use std::collections::{BTreeMap, BTreeSet};
use std::net::Ipv4Addr;

/// Host part of the virtual gateway address within each per-switch `/24`.
const GATEWAY_HOST: u32 = 254;

/// # Mixed Assignment Strategy
///
/// Every switch owns the `/24` keyed by its device id (`10.<id/256>.<id%256>.0/24`), and all its
/// hosts live inside it: the host with numeric suffix `n` gets the `.n` address, suffix-less
/// hosts draw from the subnet's allocator. The switch acts as the logical L3 gateway at `.254`,
/// recorded as a *virtual* address (and as each host's default gateway) without being bound to
/// any real interface. Switch-to-switch interfaces carry no IP.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MixedStrategy;

impl MixedStrategy {
    fn switch_subnet(id: u32) -> Result<IpNet, GraphError> {
        if id > 0xffff {
            return Err(GraphError::AddressExhaustion(format!(
                "switch id {} does not fit the 10.x.y.0/24 carving",
                id
            )));
        }
        Ok(IpNet::new(Ipv4Addr::new(10, (id >> 8) as u8, (id & 0xff) as u8, 0), 24))
    }
}

impl AssignmentStrategy for MixedStrategy {
    fn name(&self) -> &str {
        "mixed"
    }

    fn assign(&self, graph: &mut NetworkGraph) -> Result<(), GraphError> {
        validate_automatic(graph)?;
        let ids = assign_switch_ids(graph)?;

        let mut subnets: BTreeMap<NodeId, IpNet> = BTreeMap::new();
        let mut allocs: BTreeMap<NodeId, IpAllocator> = BTreeMap::new();
        let mut blocked: BTreeSet<Ipv4Addr> = BTreeSet::new();
        for (&sw, &id) in &ids {
            let net = Self::switch_subnet(id)?;
            info!("mixed assignment: switch {} owns {}", graph.name(sw), net);
            blocked.insert(Ipv4Addr::from(u32::from(net.network()) + GATEWAY_HOST));
            subnets.insert(sw, net);
            allocs.insert(sw, IpAllocator::new(net));
        }

        // reserve addresses for suffix-named hosts, first declaration wins
        let mut reserved: BTreeMap<NodeId, Ipv4Addr> = BTreeMap::new();
        for index in 0..graph.links().len() {
            let (host, sw) = match host_link(graph, index) {
                Some(ends) => ends,
                None => continue,
            };
            if let Some(n) = numeric_suffix(graph.name(host)) {
                if n >= GATEWAY_HOST {
                    return Err(GraphError::AddressExhaustion(format!(
                        "host id {} of {} does not fit the /24 of switch {}",
                        n,
                        graph.name(host),
                        graph.name(sw)
                    )));
                }
                if n >= 1 {
                    let ip = Ipv4Addr::from(u32::from(subnets[&sw].network()) + n);
                    if blocked.insert(ip) {
                        reserved.insert(host, ip);
                    }
                }
            }
        }

        let mut consumed: BTreeSet<Ipv4Addr> = BTreeSet::new();
        for index in 0..graph.links().len() {
            let (host, sw) = match host_link(graph, index) {
                Some(ends) => ends,
                None => continue,
            };
            let ip = match reserved.get(&host) {
                Some(&ip) if consumed.insert(ip) => ip,
                _ => allocs.get_mut(&sw).expect("switch registered above").allocate(&blocked)?,
            };
            blocked.insert(ip);

            let gateway = Ipv4Addr::from(u32::from(subnets[&sw].network()) + GATEWAY_HOST);
            let host_mac = Mac::from_ip(ip, 0);
            let switch_mac = Mac::from_ip(ip, 1);
            debug!("assign {}/24 to {} (gw {})", ip, graph.name(host), gateway);

            let link = &mut graph.links_mut()[index];
            let host_iface = link.endpoint_mut(host).expect("endpoint of its own link");
            host_iface.ip.get_or_insert(IpNet::new(ip, 24));
            host_iface.mac.get_or_insert(host_mac);
            let switch_iface = link.endpoint_mut(sw).expect("endpoint of its own link");
            switch_iface.mac.get_or_insert(switch_mac);

            let host_node = graph.node_mut(host);
            host_node.gateway = Some(gateway);
            host_node.gateway_mac = Some(Mac::from_ip(gateway, 1));
            graph.node_mut(sw).virtual_gateway = Some(IpNet::new(gateway, 24));
        }
        Ok(())
    }
}
