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

//! # ARP Pre-population
//!
//! Derived step running after addressing completes: computes, for each host, the static
//! (IP -> MAC) neighbor entries the orchestrator should install. Two independent toggles control
//! the contributions: `auto_arp_tables` adds an entry for every other host interface in the same
//! subnet, and `auto_gw_arp` adds a synthetic entry resolving the host's gateway IP to the
//! strategy- or caller-supplied gateway MAC (needed when the gateway device does not itself
//! answer ARP). Disabled toggles simply yield empty contributions, leaving resolution to runtime
//! traffic.

use crate::graph::NetworkGraph;
use crate::types::{IpNet, Mac, NodeId, NodeKind};
use log::*;
use std::collections::BTreeMap;
use std::net::Ipv4Addr;

/// Static ARP entries per host name.
pub(crate) type ArpTables = BTreeMap<String, BTreeMap<Ipv4Addr, Mac>>;

/// Compute the static ARP tables of all hosts. Must run on a fully-assigned graph (all MACs
/// populated).
pub(crate) fn compute_arp_tables(
    graph: &NetworkGraph,
    auto_arp_tables: bool,
    auto_gw_arp: bool,
) -> ArpTables {
    let hosts = graph.nodes_of_kind(NodeKind::Host);
    let mut ifaces: BTreeMap<NodeId, Vec<(IpNet, Mac)>> = BTreeMap::new();
    for &host in &hosts {
        let mut list = Vec::new();
        for index in graph.links_of(host) {
            let iface = graph.links()[index].endpoint(host).expect("endpoint of its own link");
            if let (Some(ip), Some(mac)) = (iface.ip, iface.mac) {
                list.push((ip, mac));
            }
        }
        ifaces.insert(host, list);
    }

    let mut tables = ArpTables::new();
    for &host in &hosts {
        let mut table = BTreeMap::new();
        if auto_arp_tables {
            for &peer in &hosts {
                if peer == host {
                    continue;
                }
                for (ip, _) in &ifaces[&host] {
                    for (peer_ip, peer_mac) in &ifaces[&peer] {
                        if ip.same_subnet(peer_ip) {
                            table.insert(peer_ip.addr, *peer_mac);
                        }
                    }
                }
            }
        }
        if auto_gw_arp {
            let node = graph.node(host);
            if let (Some(gw), Some(mac)) = (node.gateway, node.gateway_mac) {
                table.insert(gw, mac);
            }
        }
        debug!("arp table of {}: {} entries", graph.name(host), table.len());
        tables.insert(graph.name(host).to_string(), table);
    }
    tables
}
