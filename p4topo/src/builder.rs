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

//! # Network Builder
//!
//! The programmatic interface for declaring a topology. The builder owns the mutable
//! [`NetworkGraph`] during construction; [`build`](NetworkBuilder::build) consumes the builder,
//! runs the selected [`Strategy`], completes port and MAC allocation, verifies the global
//! uniqueness invariants, pre-populates the ARP tables and freezes everything into an immutable
//! [`Topology`]. After `build()`, no alias of the mutable graph survives.

use crate::allocators::MacAllocator;
use crate::arp::compute_arp_tables;
use crate::graph::{LinkParams, NetworkGraph};
use crate::store::Topology;
use crate::strategies::Strategy;
use crate::types::{GraphError, IpNet, Mac, NodeId, NodeKind};
use crate::Error;
use log::*;
use std::collections::BTreeMap;
use std::net::Ipv4Addr;

/// # Network Builder
///
/// Declares nodes and links, applies explicit overrides, selects the assignment strategy and
/// finally builds the frozen [`Topology`]. All validation errors are raised eagerly, either on
/// the declaring call or in `build()`; no partial topology is ever handed to the store.
#[derive(Debug)]
pub struct NetworkBuilder {
    graph: NetworkGraph,
    strategy: Strategy,
    subnet: Option<IpNet>,
    auto_arp_tables: bool,
    auto_gw_arp: bool,
    default_params: LinkParams,
}

impl Default for NetworkBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl NetworkBuilder {
    /// Generate an empty builder with the `l2` strategy and both ARP toggles enabled.
    pub fn new() -> Self {
        Self {
            graph: NetworkGraph::new(),
            strategy: Strategy::default(),
            subnet: None,
            auto_arp_tables: true,
            auto_gw_arp: true,
            default_params: LinkParams::default(),
        }
    }

    /// Add a host without attributes.
    pub fn add_host(&mut self, name: impl Into<String>) -> Result<NodeId, GraphError> {
        self.graph.add_node(name, NodeKind::Host, BTreeMap::new())
    }

    /// Add a host with an attribute map.
    pub fn add_host_with(
        &mut self,
        name: impl Into<String>,
        attrs: BTreeMap<String, String>,
    ) -> Result<NodeId, GraphError> {
        self.graph.add_node(name, NodeKind::Host, attrs)
    }

    /// Add a switch without attributes.
    pub fn add_switch(&mut self, name: impl Into<String>) -> Result<NodeId, GraphError> {
        self.graph.add_node(name, NodeKind::Switch, BTreeMap::new())
    }

    /// Add a switch with an attribute map (e.g. P4 program path, thrift port).
    pub fn add_switch_with(
        &mut self,
        name: impl Into<String>,
        attrs: BTreeMap<String, String>,
    ) -> Result<NodeId, GraphError> {
        self.graph.add_node(name, NodeKind::Switch, attrs)
    }

    /// Add a router without attributes.
    pub fn add_router(&mut self, name: impl Into<String>) -> Result<NodeId, GraphError> {
        self.graph.add_node(name, NodeKind::Router, BTreeMap::new())
    }

    /// Add a router with an attribute map.
    pub fn add_router_with(
        &mut self,
        name: impl Into<String>,
        attrs: BTreeMap<String, String>,
    ) -> Result<NodeId, GraphError> {
        self.graph.add_node(name, NodeKind::Router, attrs)
    }

    /// Add a link with the builder's default parameters.
    pub fn add_link(&mut self, a: &str, b: &str) -> Result<(), GraphError> {
        let params = self.default_params.clone();
        self.add_link_with(a, b, params)
    }

    /// Add a link with explicit parameters. Under the automatic strategies this fails with
    /// [`GraphError::ParallelLink`] if the pair is already linked, so select the strategy before
    /// declaring links if parallel links are needed.
    pub fn add_link_with(
        &mut self,
        a: &str,
        b: &str,
        params: LinkParams,
    ) -> Result<(), GraphError> {
        self.graph.add_link(a, b, params, self.strategy.allows_parallel_links())?;
        Ok(())
    }

    /// Explicitly set the port index of `node`'s interface facing `peer` (allowed prior to the
    /// assignment pass; the allocator will never reuse it).
    pub fn set_interface_port(
        &mut self,
        node: &str,
        peer: &str,
        port: u32,
    ) -> Result<(), GraphError> {
        self.graph.set_interface_port(node, peer, port)
    }

    /// Explicitly set the MAC address of `node`'s interface facing `peer`.
    pub fn set_interface_mac(
        &mut self,
        node: &str,
        peer: &str,
        mac: Mac,
    ) -> Result<(), GraphError> {
        self.graph.set_interface_mac(node, peer, mac)
    }

    /// Explicitly set the IP address of `node`'s interface facing `peer` (manual strategy, or
    /// router interfaces under any strategy).
    pub fn set_interface_ip(&mut self, node: &str, peer: &str, ip: IpNet) -> Result<(), GraphError> {
        self.graph.set_interface_ip(node, peer, ip)
    }

    /// Set the default gateway of a host (manual strategy; the automatic strategies derive
    /// gateways themselves).
    pub fn set_gateway(
        &mut self,
        host: &str,
        gateway: Ipv4Addr,
        gateway_mac: Option<Mac>,
    ) -> Result<(), GraphError> {
        self.graph.set_gateway(host, gateway, gateway_mac)
    }

    /// Select the assignment strategy (single enumerated choice per topology).
    pub fn select_strategy(&mut self, strategy: Strategy) {
        self.strategy = strategy;
    }

    /// Override the shared subnet of the `l2` strategy (default `10.0.0.0/16`). The other
    /// strategies derive their subnets themselves, so `build()` rejects the override with
    /// [`GraphError::StrategyMismatch`] under any strategy but `l2`.
    pub fn set_subnet(&mut self, subnet: IpNet) {
        self.subnet = Some(subnet);
    }

    /// Override the default link parameters used by [`add_link`](Self::add_link).
    pub fn set_default_params(&mut self, params: LinkParams) {
        self.default_params = params;
    }

    /// Enable the static host-to-host ARP entries (enabled by default).
    pub fn enable_arp_tables(&mut self) {
        self.auto_arp_tables = true;
    }

    /// Disable the static host-to-host ARP entries; resolution is left to runtime traffic.
    pub fn disable_arp_tables(&mut self) {
        self.auto_arp_tables = false;
    }

    /// Enable the synthetic gateway ARP entries (enabled by default).
    pub fn enable_gw_arp(&mut self) {
        self.auto_gw_arp = true;
    }

    /// Disable the synthetic gateway ARP entries.
    pub fn disable_gw_arp(&mut self) {
        self.auto_gw_arp = false;
    }

    /// Run the assignment pipeline and freeze the result.
    ///
    /// The pipeline is single-threaded and synchronous by design: structural validation, the
    /// strategy pass, port and MAC completion, invariant verification and ARP pre-population each
    /// depend on the fully-settled state of the previous step.
    pub fn build(mut self) -> Result<Topology, Error> {
        info!(
            "building topology with strategy {} ({} links)",
            self.strategy.name(),
            self.graph.links().len()
        );
        if let Some(net) = self.subnet {
            if !matches!(self.strategy, Strategy::L2) {
                return Err(GraphError::StrategyMismatch(format!(
                    "subnet override {} only applies to the l2 strategy, not to {}",
                    net,
                    self.strategy.name()
                ))
                .into());
            }
        }
        self.strategy.run(&mut self.graph, self.subnet)?;
        assign_ports(&mut self.graph);
        assign_missing_macs(&mut self.graph);
        verify_invariants(&self.graph)?;
        self.graph.mark_assigned();
        let arp = compute_arp_tables(&self.graph, self.auto_arp_tables, self.auto_gw_arp);
        let topology = Topology::freeze(self.graph, self.strategy.name(), arp)?;
        Ok(topology)
    }
}

/// Assign the remaining port indices: per node in declaration order, walking the node's links in
/// declaration order. Explicitly claimed indices were already reserved in the allocator.
fn assign_ports(graph: &mut NetworkGraph) {
    let order: Vec<NodeId> = graph.nodes_in_order().map(|n| n.id).collect();
    for node in order {
        for index in graph.links_of(node) {
            let unset = graph.links()[index]
                .endpoint(node)
                .map(|iface| iface.port.is_none())
                .unwrap_or(false);
            if unset {
                let port = graph.node_mut(node).ports.allocate();
                graph.links_mut()[index]
                    .endpoint_mut(node)
                    .expect("endpoint of its own link")
                    .port = Some(port);
            }
        }
    }
}

/// Hand counter MACs to every interface the strategy left without one (e.g. switch-to-switch
/// interfaces under `l2`/`mixed`, or router interfaces).
fn assign_missing_macs(graph: &mut NetworkGraph) {
    let mut alloc = MacAllocator::new();
    for link in graph.links_mut() {
        if link.a.mac.is_none() {
            link.a.mac = Some(alloc.allocate());
        }
        if link.b.mac.is_none() {
            link.b.mac = Some(alloc.allocate());
        }
    }
}

/// Verify the global invariants before freezing: unique IPs, unique MACs, sane link weights.
fn verify_invariants(graph: &NetworkGraph) -> Result<(), GraphError> {
    let mut ips = std::collections::BTreeSet::new();
    let mut macs = std::collections::BTreeSet::new();
    for link in graph.links() {
        if !(link.params.weight >= 0.0 && link.params.weight.is_finite()) {
            let (a, b) = link.ends();
            return Err(GraphError::TopologyShape(format!(
                "link {} -- {} has a negative or non-finite weight",
                graph.name(a),
                graph.name(b)
            )));
        }
        for iface in [&link.a, &link.b].iter() {
            if let Some(ip) = iface.ip {
                if !ips.insert(ip.addr) {
                    return Err(GraphError::TopologyShape(format!(
                        "duplicate IP address {}",
                        ip.addr
                    )));
                }
            }
            if let Some(mac) = iface.mac {
                if !macs.insert(mac) {
                    return Err(GraphError::TopologyShape(format!("duplicate MAC address {}", mac)));
                }
            }
        }
    }
    Ok(())
}
