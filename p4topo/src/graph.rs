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

//! # Graph Model
//!
//! Typed node/link container representing the topology while it is being built. The model is a
//! pure data structure with eager validation; the assignment strategies mutate it, and
//! [`Topology`](crate::store::Topology) freezes it.
//!
//! Traversal order is load-bearing: nodes iterate in declaration order (their [`NodeId`]s are
//! handed out monotonically), and links iterate in declaration order. All downstream algorithms
//! rely on this to produce byte-identical assignments for identical declarations.

use crate::allocators::PortAllocator;
use crate::types::{GraphError, IpNet, LinkWeight, Mac, NodeId, NodeKind, PhysicalGraph};
use log::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::net::Ipv4Addr;

/// Shared link parameters (both interfaces of a link see the same values).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkParams {
    /// Propagation delay (free-form, e.g. `"5ms"`), `None` for no added delay
    pub delay: Option<String>,
    /// Bandwidth in Mbps, `None` for unlimited
    pub bw: Option<f64>,
    /// Loss percentage in `[0, 100]`
    pub loss: f64,
    /// Maximum queue length in packets, `None` for the emulator default
    pub queue_length: Option<usize>,
    /// Routing weight, used by [`shortest_paths`](crate::store::Topology::shortest_paths)
    pub weight: LinkWeight,
}

impl Default for LinkParams {
    fn default() -> Self {
        Self { delay: None, bw: None, loss: 0.0, queue_length: None, weight: 1.0 }
    }
}

/// One end of a link, owned by exactly one node.
///
/// Port, MAC and IP start out unset (unless explicitly overridden before the assignment pass) and
/// are populated by the selected strategy and the final allocation pass in
/// [`build`](crate::builder::NetworkBuilder::build).
#[derive(Debug, Clone, PartialEq)]
pub struct Interface {
    pub(crate) node: NodeId,
    /// Local port index, unique within the owning node
    pub port: Option<u32>,
    /// MAC address, unique in the whole topology
    pub mac: Option<Mac>,
    /// Optional IP address with prefix. On switch interfaces this may be a *virtual* address
    /// (recorded for control-plane reasoning without being bound to the device).
    pub ip: Option<IpNet>,
    pub(crate) explicit_ip: bool,
}

impl Interface {
    fn new(node: NodeId) -> Self {
        Self { node, port: None, mac: None, ip: None, explicit_ip: false }
    }

    /// The node owning this interface.
    pub fn node(&self) -> NodeId {
        self.node
    }
}

/// An unordered pair of interfaces plus the shared link parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct Link {
    pub(crate) a: Interface,
    pub(crate) b: Interface,
    /// Shared link parameters
    pub params: LinkParams,
}

impl Link {
    /// The two endpoint node ids, in declaration order.
    pub fn ends(&self) -> (NodeId, NodeId) {
        (self.a.node, self.b.node)
    }

    /// The interface owned by `node`, if `node` is one of the two endpoints.
    pub fn endpoint(&self, node: NodeId) -> Option<&Interface> {
        if self.a.node == node {
            Some(&self.a)
        } else if self.b.node == node {
            Some(&self.b)
        } else {
            None
        }
    }

    pub(crate) fn endpoint_mut(&mut self, node: NodeId) -> Option<&mut Interface> {
        if self.a.node == node {
            Some(&mut self.a)
        } else if self.b.node == node {
            Some(&mut self.b)
        } else {
            None
        }
    }

    /// The node on the other end of the link, if `node` is one of the two endpoints.
    pub fn peer_of(&self, node: NodeId) -> Option<NodeId> {
        if self.a.node == node {
            Some(self.b.node)
        } else if self.b.node == node {
            Some(self.a.node)
        } else {
            None
        }
    }

    /// Check whether this link connects the given (unordered) node pair.
    pub fn is_between(&self, x: NodeId, y: NodeId) -> bool {
        (self.a.node == x && self.b.node == y) || (self.a.node == y && self.b.node == x)
    }
}

/// A declared network device.
#[derive(Debug, Clone)]
pub struct Node {
    pub(crate) id: NodeId,
    name: String,
    kind: NodeKind,
    /// Free-form attribute map (P4 program path, CLI input file, thrift/gRPC port, ...). These
    /// values are owned by the orchestrator; the topology core only stores and serves them.
    pub attrs: BTreeMap<String, String>,
    /// Numeric device id (switches only), set during the assignment pass
    pub(crate) device_id: Option<u32>,
    /// Default gateway address (hosts only)
    pub(crate) gateway: Option<Ipv4Addr>,
    /// MAC answering for the gateway address (hosts only, used for ARP pre-population)
    pub(crate) gateway_mac: Option<Mac>,
    /// Virtual gateway address of this switch (`mixed` strategy), not bound to any interface
    pub(crate) virtual_gateway: Option<IpNet>,
    pub(crate) ports: PortAllocator,
}

impl Node {
    /// The node name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The node kind.
    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    /// Numeric device id (switches only; `None` before the assignment pass).
    pub fn device_id(&self) -> Option<u32> {
        self.device_id
    }
}

/// # Network Graph
///
/// The mutable topology under construction: nodes keyed by name, links in declaration order, and
/// an undirected [`petgraph`] graph mirroring the structure for adjacency checks. All validation
/// errors are raised eagerly, so no partial, inconsistent topology ever reaches the store.
#[derive(Debug, Clone, Default)]
pub struct NetworkGraph {
    pub(crate) net: PhysicalGraph,
    nodes: HashMap<NodeId, Node>,
    names: HashMap<String, NodeId>,
    links: Vec<Link>,
    assigned: bool,
}

impl NetworkGraph {
    /// Generate an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a new node to the topology. Fails with [`GraphError::DuplicateNode`] if a node of the
    /// same name exists (names are unique and immutable once created).
    pub fn add_node(
        &mut self,
        name: impl Into<String>,
        kind: NodeKind,
        attrs: BTreeMap<String, String>,
    ) -> Result<NodeId, GraphError> {
        let name = name.into();
        if self.names.contains_key(&name) {
            return Err(GraphError::DuplicateNode(name));
        }
        let id = self.net.add_node(name.clone());
        debug!("add {} {} as {:?}", kind, name, id);
        self.names.insert(name.clone(), id);
        self.nodes.insert(
            id,
            Node {
                id,
                name,
                kind,
                attrs,
                device_id: None,
                gateway: None,
                gateway_mac: None,
                virtual_gateway: None,
                ports: PortAllocator::new(),
            },
        );
        Ok(id)
    }

    /// Add a link between two declared nodes. Fails with [`GraphError::UnknownNode`] if either
    /// endpoint is undeclared, with [`GraphError::TopologyShape`] for self-loops, and with
    /// [`GraphError::ParallelLink`] if `allow_parallel` is false and the pair is already linked.
    pub fn add_link(
        &mut self,
        a: &str,
        b: &str,
        params: LinkParams,
        allow_parallel: bool,
    ) -> Result<usize, GraphError> {
        let a_id = self.node_id(a)?;
        let b_id = self.node_id(b)?;
        if a_id == b_id {
            return Err(GraphError::TopologyShape(format!("self-loop on node {}", a)));
        }
        if !allow_parallel && self.net.find_edge(a_id, b_id).is_some() {
            return Err(GraphError::ParallelLink(a.to_string(), b.to_string()));
        }
        let index = self.links.len();
        self.links.push(Link {
            a: Interface::new(a_id),
            b: Interface::new(b_id),
            params,
        });
        self.net.add_edge(a_id, b_id, index);
        debug!("add link {} -- {}", a, b);
        Ok(index)
    }

    /// Lookup a node id by name.
    pub fn node_id(&self, name: &str) -> Result<NodeId, GraphError> {
        self.names.get(name).copied().ok_or_else(|| GraphError::UnknownNode(name.to_string()))
    }

    /// Get a node by id. Panics for an id not obtained from this graph.
    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[&id]
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> &mut Node {
        self.nodes.get_mut(&id).expect("node id obtained from this graph")
    }

    /// The name of a node.
    pub fn name(&self, id: NodeId) -> &str {
        self.node(id).name()
    }

    /// All nodes in declaration order.
    pub fn nodes_in_order(&self) -> impl Iterator<Item = &Node> + '_ {
        self.net.node_indices().map(move |id| self.node(id))
    }

    /// All nodes of the given kind, in declaration order.
    pub fn nodes_of_kind(&self, kind: NodeKind) -> Vec<NodeId> {
        self.nodes_in_order().filter(|n| n.kind() == kind).map(|n| n.id).collect()
    }

    /// All links in declaration order.
    pub fn links(&self) -> &[Link] {
        &self.links
    }

    pub(crate) fn links_mut(&mut self) -> &mut [Link] {
        &mut self.links
    }

    /// Indices (into [`links`](Self::links)) of the links incident to `node`, in declaration
    /// order.
    pub fn links_of(&self, node: NodeId) -> Vec<usize> {
        self.links
            .iter()
            .enumerate()
            .filter(|(_, l)| l.endpoint(node).is_some())
            .map(|(i, _)| i)
            .collect()
    }

    /// The number of links incident to `node`.
    pub fn degree(&self, node: NodeId) -> usize {
        self.links.iter().filter(|l| l.endpoint(node).is_some()).count()
    }

    /// The first link between the (unordered) pair, if any.
    pub fn link_between(&self, a: NodeId, b: NodeId) -> Option<&Link> {
        self.net.find_edge(a, b).map(|e| &self.links[*self.net.edge_weight(e).expect("edge")])
    }

    fn link_between_mut(&mut self, a: &str, b: &str) -> Result<&mut Link, GraphError> {
        if self.assigned {
            return Err(GraphError::StrategyMismatch(
                "interface overrides are only allowed before the assignment pass".to_string(),
            ));
        }
        let a_id = self.node_id(a)?;
        let b_id = self.node_id(b)?;
        match self.net.find_edge(a_id, b_id) {
            Some(e) => {
                let index = *self.net.edge_weight(e).expect("edge");
                Ok(&mut self.links[index])
            }
            None => Err(GraphError::NotConnected(a.to_string(), b.to_string())),
        }
    }

    /// Explicitly set the port index of `node`'s interface facing `peer`. The index is claimed in
    /// the node's port allocator, so the automatic pass will never reuse it.
    pub fn set_interface_port(
        &mut self,
        node: &str,
        peer: &str,
        port: u32,
    ) -> Result<(), GraphError> {
        let node_id = self.node_id(node)?;
        if self
            .link_between_mut(node, peer)?
            .endpoint(node_id)
            .expect("endpoint of its own link")
            .port
            .is_some()
        {
            return Err(GraphError::TopologyShape(format!(
                "port of {} facing {} was already set",
                node, peer
            )));
        }
        if !self.nodes.get_mut(&node_id).expect("node").ports.claim(port) {
            return Err(GraphError::TopologyShape(format!(
                "port {} on node {} is reserved or already in use",
                port, node
            )));
        }
        let link = self.link_between_mut(node, peer)?;
        link.endpoint_mut(node_id).expect("endpoint of its own link").port = Some(port);
        Ok(())
    }

    /// Explicitly set the MAC address of `node`'s interface facing `peer`.
    pub fn set_interface_mac(
        &mut self,
        node: &str,
        peer: &str,
        mac: Mac,
    ) -> Result<(), GraphError> {
        let node_id = self.node_id(node)?;
        let link = self.link_between_mut(node, peer)?;
        let iface = link.endpoint_mut(node_id).expect("endpoint of its own link");
        iface.mac = Some(mac);
        Ok(())
    }

    /// Explicitly set the IP address of `node`'s interface facing `peer`. Only meaningful under
    /// the `manual` strategy (and for router interfaces); the automatic strategies reject
    /// explicit host or switch addresses with [`GraphError::StrategyMismatch`] at build time.
    pub fn set_interface_ip(
        &mut self,
        node: &str,
        peer: &str,
        ip: IpNet,
    ) -> Result<(), GraphError> {
        let node_id = self.node_id(node)?;
        let link = self.link_between_mut(node, peer)?;
        let iface = link.endpoint_mut(node_id).expect("endpoint of its own link");
        iface.ip = Some(ip);
        iface.explicit_ip = true;
        Ok(())
    }

    /// Set the default gateway of a host (used by the `manual` strategy; the automatic strategies
    /// derive gateways themselves).
    pub fn set_gateway(
        &mut self,
        host: &str,
        gateway: Ipv4Addr,
        gateway_mac: Option<Mac>,
    ) -> Result<(), GraphError> {
        let id = self.node_id(host)?;
        let node = self.nodes.get_mut(&id).expect("node");
        if node.kind() != NodeKind::Host {
            return Err(GraphError::TopologyShape(format!(
                "gateways can only be set on hosts, {} is a {}",
                host,
                node.kind()
            )));
        }
        node.gateway = Some(gateway);
        node.gateway_mac = gateway_mac;
        Ok(())
    }

    /// Whether the assignment pass has completed. Once set, all previously-unset ports and MACs
    /// are guaranteed non-null and the graph accepts no further interface overrides.
    pub fn is_assigned(&self) -> bool {
        self.assigned
    }

    pub(crate) fn mark_assigned(&mut self) {
        self.assigned = true;
    }
}
