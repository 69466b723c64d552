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

//! The `l3` assignment strategy: every link is its own subnet.

use super::{assign_switch_ids, host_link, numeric_suffix, validate_automatic, AssignmentStrategy};
use crate::graph::NetworkGraph;
use crate::types::{GraphError, IpNet, Mac, NodeId, NodeKind};
use log::*;
use std::collections::{BTreeMap, BTreeSet};
use std::net::Ipv4Addr;

/// Largest usable switch or host id: both end up in one octet of a `/24`, and `254` is the
/// highest host address.
const MAX_ID: u32 = 253;

/// # L3 Assignment Strategy
///
/// Every interface sits in its own `/24`, so no two links share a subnet. A host link uses
/// `10.<switch-id>.<host-id>.0/24`: the switch-facing port takes the `.1` address (a *virtual*
/// address recorded on the switch interface, and the host's default gateway) and the host takes
/// `.2`. A switch-to-switch link uses `20.<lower-id>.<higher-id>.0/24`, with the lower-id switch
/// taking `.1` and the higher-id switch taking `.2`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct L3Strategy;

impl AssignmentStrategy for L3Strategy {
    fn name(&self) -> &str {
        "l3"
    }

    fn assign(&self, graph: &mut NetworkGraph) -> Result<(), GraphError> {
        validate_automatic(graph)?;
        let ids = assign_switch_ids(graph)?;
        for (&sw, &id) in &ids {
            if id > MAX_ID {
                return Err(GraphError::AddressExhaustion(format!(
                    "switch id {} of {} does not fit the 10.<switch>.<host>.0/24 carving",
                    id,
                    graph.name(sw)
                )));
            }
        }

        // reserve host ids per switch for suffix-named hosts, first declaration wins
        let mut reserved: BTreeMap<NodeId, u32> = BTreeMap::new();
        let mut taken: BTreeSet<(NodeId, u32)> = BTreeSet::new();
        for index in 0..graph.links().len() {
            let (host, sw) = match host_link(graph, index) {
                Some(ends) => ends,
                None => continue,
            };
            if let Some(n) = numeric_suffix(graph.name(host)) {
                if n > MAX_ID {
                    return Err(GraphError::AddressExhaustion(format!(
                        "host id {} of {} does not fit the /24 carving",
                        n,
                        graph.name(host)
                    )));
                }
                if n >= 1 && taken.insert((sw, n)) {
                    reserved.insert(host, n);
                }
            }
        }

        let mut next_host: BTreeMap<NodeId, u32> = BTreeMap::new();
        for index in 0..graph.links().len() {
            let link = &graph.links()[index];
            let (a, b) = link.ends();
            if let Some((host, sw)) = host_link(graph, index) {
                let sw_id = ids[&sw];
                let host_id = match reserved.get(&host) {
                    Some(&n) => n,
                    None => {
                        let cursor = next_host.entry(sw).or_insert(1);
                        while taken.contains(&(sw, *cursor)) {
                            *cursor += 1;
                        }
                        if *cursor > MAX_ID {
                            return Err(GraphError::AddressExhaustion(format!(
                                "switch {} cannot fit any further host",
                                graph.name(sw)
                            )));
                        }
                        taken.insert((sw, *cursor));
                        *cursor
                    }
                };

                let host_ip = Ipv4Addr::new(10, sw_id as u8, host_id as u8, 2);
                let gateway = Ipv4Addr::new(10, sw_id as u8, host_id as u8, 1);
                let switch_mac = Mac::from_ip(host_ip, 1);
                debug!("assign {}/24 to {} (gw {})", host_ip, graph.name(host), gateway);

                let link = &mut graph.links_mut()[index];
                let host_iface = link.endpoint_mut(host).expect("endpoint of its own link");
                host_iface.ip.get_or_insert(IpNet::new(host_ip, 24));
                host_iface.mac.get_or_insert(Mac::from_ip(host_ip, 0));
                let switch_iface = link.endpoint_mut(sw).expect("endpoint of its own link");
                switch_iface.ip.get_or_insert(IpNet::new(gateway, 24));
                switch_iface.mac.get_or_insert(switch_mac);

                let host_node = graph.node_mut(host);
                host_node.gateway = Some(gateway);
                host_node.gateway_mac = Some(switch_mac);
            } else if graph.node(a).kind() == NodeKind::Switch
                && graph.node(b).kind() == NodeKind::Switch
            {
                let (lo, hi) = if ids[&a] <= ids[&b] { (a, b) } else { (b, a) };
                let lo_ip = Ipv4Addr::new(20, ids[&lo] as u8, ids[&hi] as u8, 1);
                let hi_ip = Ipv4Addr::new(20, ids[&lo] as u8, ids[&hi] as u8, 2);
                debug!(
                    "assign {} -- {} to link {} -- {}",
                    lo_ip,
                    hi_ip,
                    graph.name(lo),
                    graph.name(hi)
                );

                let link = &mut graph.links_mut()[index];
                let lo_iface = link.endpoint_mut(lo).expect("endpoint of its own link");
                lo_iface.ip.get_or_insert(IpNet::new(lo_ip, 24));
                lo_iface.mac.get_or_insert(Mac::from_ip(lo_ip, 1));
                let hi_iface = link.endpoint_mut(hi).expect("endpoint of its own link");
                hi_iface.ip.get_or_insert(IpNet::new(hi_ip, 24));
                hi_iface.mac.get_or_insert(Mac::from_ip(hi_ip, 1));
            }
            // links involving routers are left to the caller
        }
        Ok(())
    }
}
