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

//! # Topology Store
//!
//! The frozen, fully-assigned topology: an immutable snapshot of all nodes, links, addresses and
//! ARP tables, plus the read-only query interface the orchestrator and the control-plane tools
//! consume. A [`Topology`] is obtained from [`NetworkBuilder::build`] or from
//! [`Topology::load`]; it can never be mutated, only queried and [saved](Topology::save).
//!
//! Snapshots are versioned JSON documents. [`Topology::load`] checks the embedded version number
//! before interpreting anything else, so an incompatible file fails with
//! [`StoreError::Version`] instead of a confusing schema error.
//!
//! [`NetworkBuilder::build`]: crate::builder::NetworkBuilder::build

use crate::arp::ArpTables;
use crate::graph::{LinkParams, NetworkGraph};
use crate::types::{GraphError, IpNet, LinkWeight, Mac, NodeId, NodeKind, PhysicalGraph, StoreError};
use itertools::Itertools;
use log::*;
use petgraph::visit::EdgeRef;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, BinaryHeap, HashMap};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::net::Ipv4Addr;
use std::path::Path;

/// Version number written into every snapshot. Bump on any breaking schema change.
pub const SNAPSHOT_VERSION: u32 = 1;

/// Tolerance when comparing path costs for equality.
const EPS: LinkWeight = 1e-9;

/// A node as recorded in the snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeRecord {
    /// Node name (unique)
    pub name: String,
    /// Node kind
    pub kind: NodeKind,
    /// Free-form attribute map
    pub attrs: BTreeMap<String, String>,
    /// Numeric device id (switches only)
    pub device_id: Option<u32>,
    /// Default gateway address (hosts only)
    pub gateway: Option<Ipv4Addr>,
    /// MAC answering for the gateway address (hosts only)
    pub gateway_mac: Option<Mac>,
    /// Virtual gateway address (switches under the `mixed` strategy only)
    pub virtual_gateway: Option<IpNet>,
}

/// One end of a link as recorded in the snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndpointRecord {
    /// Owning node name
    pub node: String,
    /// Interface name (`<node>-eth<port>`)
    pub intf: String,
    /// Local port index
    pub port: u32,
    /// MAC address
    pub mac: Mac,
    /// IP address, if the strategy assigned one (virtual on some switch interfaces)
    pub ip: Option<IpNet>,
}

/// A link as recorded in the snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkRecord {
    /// First endpoint, in declaration order
    pub a: EndpointRecord,
    /// Second endpoint
    pub b: EndpointRecord,
    /// Shared link parameters
    pub params: LinkParams,
}

/// The serialized form of a frozen topology.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct Snapshot {
    version: u32,
    strategy: String,
    nodes: Vec<NodeRecord>,
    links: Vec<LinkRecord>,
    arp: ArpTables,
}

/// A neighbor of a node, as returned by [`Topology::neighbors`].
#[derive(Debug, Clone, PartialEq)]
pub struct NeighborInfo {
    /// Name of the neighboring node
    pub peer: String,
    /// Local interface name facing the neighbor
    pub intf: String,
    /// Local port index facing the neighbor
    pub port: u32,
    /// Local MAC address facing the neighbor
    pub mac: Mac,
    /// Local IP address facing the neighbor, if any
    pub ip: Option<IpNet>,
}

/// # Frozen Topology
///
/// Immutable, fully-assigned topology with the query interface. All name-based lookups resolve
/// through pre-built indices; the petgraph structure is only consulted for path computations.
#[derive(Debug, Clone)]
pub struct Topology {
    data: Snapshot,
    net: PhysicalGraph,
    ids: HashMap<String, NodeId>,
    node_index: HashMap<String, usize>,
    /// Per node: (link index, node is endpoint `a`), sorted by local port
    adjacency: HashMap<String, Vec<(usize, bool)>>,
    /// Per ordered name pair: (link index, first name is endpoint `a`); first declared link wins
    pair_index: HashMap<(String, String), (usize, bool)>,
    host_by_ip: HashMap<Ipv4Addr, String>,
}

impl Topology {
    /// Freeze a fully-assigned graph into an immutable topology.
    pub(crate) fn freeze(
        graph: NetworkGraph,
        strategy: &str,
        arp: ArpTables,
    ) -> Result<Self, StoreError> {
        let nodes = graph
            .nodes_in_order()
            .map(|n| NodeRecord {
                name: n.name().to_string(),
                kind: n.kind(),
                attrs: n.attrs.clone(),
                device_id: n.device_id(),
                gateway: n.gateway,
                gateway_mac: n.gateway_mac,
                virtual_gateway: n.virtual_gateway,
            })
            .collect();
        let links = graph
            .links()
            .iter()
            .map(|l| {
                let record = |iface: &crate::graph::Interface| {
                    let node = graph.name(iface.node()).to_string();
                    let port = iface.port.expect("assignment pass populates all ports");
                    EndpointRecord {
                        intf: format!("{}-eth{}", node, port),
                        node,
                        port,
                        mac: iface.mac.expect("assignment pass populates all MACs"),
                        ip: iface.ip,
                    }
                };
                LinkRecord { a: record(&l.a), b: record(&l.b), params: l.params.clone() }
            })
            .collect();
        let data = Snapshot {
            version: SNAPSHOT_VERSION,
            strategy: strategy.to_string(),
            nodes,
            links,
            arp,
        };
        Self::from_snapshot(data)
    }

    /// Rebuild the indices and the petgraph structure from a snapshot.
    fn from_snapshot(data: Snapshot) -> Result<Self, StoreError> {
        let mut net = PhysicalGraph::default();
        let mut ids: HashMap<String, NodeId> = HashMap::new();
        let mut node_index: HashMap<String, usize> = HashMap::new();
        for (i, node) in data.nodes.iter().enumerate() {
            if node_index.contains_key(&node.name) {
                return Err(bad_snapshot(format!("duplicate node {}", node.name)));
            }
            let id = net.add_node(node.name.clone());
            ids.insert(node.name.clone(), id);
            node_index.insert(node.name.clone(), i);
        }

        // the query layer relies on the assignment invariants, so a snapshot which breaks them
        // must be refused here rather than panic later
        {
            let mut ports: BTreeSet<(&str, u32)> = BTreeSet::new();
            let mut macs: BTreeSet<Mac> = BTreeSet::new();
            let mut ips: BTreeSet<Ipv4Addr> = BTreeSet::new();
            for link in &data.links {
                for end in [&link.a, &link.b].iter() {
                    let kind = node_index
                        .get(&end.node)
                        .map(|&i| data.nodes[i].kind)
                        .ok_or_else(|| {
                            bad_snapshot(format!("unknown link endpoint {}", end.node))
                        })?;
                    if kind == NodeKind::Host && end.ip.is_none() {
                        return Err(bad_snapshot(format!(
                            "host interface {} has no address",
                            end.intf
                        )));
                    }
                    if !ports.insert((end.node.as_str(), end.port)) {
                        return Err(bad_snapshot(format!(
                            "port {} of {} is used twice",
                            end.port, end.node
                        )));
                    }
                    if !macs.insert(end.mac) {
                        return Err(bad_snapshot(format!("duplicate MAC address {}", end.mac)));
                    }
                    if let Some(ip) = end.ip {
                        if !ips.insert(ip.addr) {
                            return Err(bad_snapshot(format!("duplicate IP address {}", ip.addr)));
                        }
                    }
                }
            }
        }

        let mut adjacency: HashMap<String, Vec<(usize, bool)>> = HashMap::new();
        let mut pair_index: HashMap<(String, String), (usize, bool)> = HashMap::new();
        for (index, link) in data.links.iter().enumerate() {
            let a = *ids
                .get(&link.a.node)
                .ok_or_else(|| bad_snapshot(format!("unknown link endpoint {}", link.a.node)))?;
            let b = *ids
                .get(&link.b.node)
                .ok_or_else(|| bad_snapshot(format!("unknown link endpoint {}", link.b.node)))?;
            net.add_edge(a, b, index);
            adjacency.entry(link.a.node.clone()).or_default().push((index, true));
            adjacency.entry(link.b.node.clone()).or_default().push((index, false));
            pair_index
                .entry((link.a.node.clone(), link.b.node.clone()))
                .or_insert((index, true));
            pair_index
                .entry((link.b.node.clone(), link.a.node.clone()))
                .or_insert((index, false));
        }
        for (node, list) in adjacency.iter_mut() {
            list.sort_by_key(|&(index, is_a)| {
                let link = &data.links[index];
                if is_a {
                    link.a.port
                } else {
                    link.b.port
                }
            });
            trace!("{} has {} interfaces", node, list.len());
        }

        let mut host_by_ip = HashMap::new();
        for node in data.nodes.iter().filter(|n| n.kind == NodeKind::Host) {
            for &(index, is_a) in adjacency.get(&node.name).map(|v| v.as_slice()).unwrap_or(&[]) {
                let link = &data.links[index];
                let local = if is_a { &link.a } else { &link.b };
                if let Some(ip) = local.ip {
                    host_by_ip.insert(ip.addr, node.name.clone());
                }
            }
        }

        info!(
            "topology frozen: {} nodes, {} links, strategy {}",
            data.nodes.len(),
            data.links.len(),
            data.strategy
        );
        Ok(Self { data, net, ids, node_index, adjacency, pair_index, host_by_ip })
    }

    fn id(&self, name: &str) -> Result<NodeId, GraphError> {
        self.ids.get(name).copied().ok_or_else(|| GraphError::UnknownNode(name.to_string()))
    }

    fn record(&self, name: &str) -> Result<&NodeRecord, GraphError> {
        self.node_index
            .get(name)
            .map(|&i| &self.data.nodes[i])
            .ok_or_else(|| GraphError::UnknownNode(name.to_string()))
    }

    /// The local and remote endpoints of the first link between `node` and `peer`.
    fn endpoints(
        &self,
        node: &str,
        peer: &str,
    ) -> Result<(&EndpointRecord, &EndpointRecord, &LinkRecord), GraphError> {
        self.record(node)?;
        self.record(peer)?;
        let &(index, is_a) = self
            .pair_index
            .get(&(node.to_string(), peer.to_string()))
            .ok_or_else(|| GraphError::NotConnected(node.to_string(), peer.to_string()))?;
        let link = &self.data.links[index];
        if is_a {
            Ok((&link.a, &link.b, link))
        } else {
            Ok((&link.b, &link.a, link))
        }
    }

    /// Name of the strategy that produced this topology.
    pub fn strategy(&self) -> &str {
        &self.data.strategy
    }

    /// Check whether a node of the given name exists.
    pub fn contains(&self, name: &str) -> bool {
        self.node_index.contains_key(name)
    }

    /// The kind of a node.
    pub fn node_kind(&self, name: &str) -> Result<NodeKind, GraphError> {
        Ok(self.record(name)?.kind)
    }

    /// All nodes of the given kind with their attribute maps, keyed by name.
    pub fn nodes_of_kind(&self, kind: NodeKind) -> BTreeMap<&str, &BTreeMap<String, String>> {
        self.data
            .nodes
            .iter()
            .filter(|n| n.kind == kind)
            .map(|n| (n.name.as_str(), &n.attrs))
            .collect()
    }

    /// All host names, sorted.
    pub fn hosts(&self) -> Vec<&str> {
        self.nodes_of_kind(NodeKind::Host).into_iter().map(|(name, _)| name).collect()
    }

    /// All switch names, sorted.
    pub fn switches(&self) -> Vec<&str> {
        self.nodes_of_kind(NodeKind::Switch).into_iter().map(|(name, _)| name).collect()
    }

    /// All router names, sorted.
    pub fn routers(&self) -> Vec<&str> {
        self.nodes_of_kind(NodeKind::Router).into_iter().map(|(name, _)| name).collect()
    }

    /// Lookup an attribute of a node (`None` if the key was never set).
    pub fn attribute(&self, name: &str, key: &str) -> Result<Option<&str>, GraphError> {
        Ok(self.record(name)?.attrs.get(key).map(|v| v.as_str()))
    }

    /// All neighbors of a node, ordered by local port.
    pub fn neighbors(&self, name: &str) -> Result<Vec<NeighborInfo>, GraphError> {
        self.record(name)?;
        let mut out = Vec::new();
        for &(index, is_a) in self.adjacency.get(name).map(|v| v.as_slice()).unwrap_or(&[]) {
            let link = &self.data.links[index];
            let (local, remote) = if is_a { (&link.a, &link.b) } else { (&link.b, &link.a) };
            out.push(NeighborInfo {
                peer: remote.node.clone(),
                intf: local.intf.clone(),
                port: local.port,
                mac: local.mac,
                ip: local.ip,
            });
        }
        Ok(out)
    }

    /// The interface names of a node, ordered by local port.
    pub fn interfaces(&self, name: &str) -> Result<Vec<&str>, GraphError> {
        self.record(name)?;
        Ok(self
            .adjacency
            .get(name)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
            .iter()
            .map(|&(index, is_a)| {
                let link = &self.data.links[index];
                if is_a {
                    link.a.intf.as_str()
                } else {
                    link.b.intf.as_str()
                }
            })
            .collect())
    }

    /// Check whether two nodes are directly linked.
    pub fn are_neighbors(&self, a: &str, b: &str) -> Result<bool, GraphError> {
        self.record(a)?;
        self.record(b)?;
        Ok(self.pair_index.contains_key(&(a.to_string(), b.to_string())))
    }

    /// The port index of `node`'s interface facing `peer`.
    pub fn port_of(&self, node: &str, peer: &str) -> Result<u32, GraphError> {
        Ok(self.endpoints(node, peer)?.0.port)
    }

    /// The MAC address of `node`'s interface facing `peer`.
    pub fn mac_of(&self, node: &str, peer: &str) -> Result<Mac, GraphError> {
        Ok(self.endpoints(node, peer)?.0.mac)
    }

    /// The IP address of `node`'s interface facing `peer`, if any.
    pub fn ip_of(&self, node: &str, peer: &str) -> Result<Option<IpNet>, GraphError> {
        Ok(self.endpoints(node, peer)?.0.ip)
    }

    /// The interface name of `node`'s interface facing `peer`.
    pub fn intf_of(&self, node: &str, peer: &str) -> Result<&str, GraphError> {
        Ok(self.endpoints(node, peer)?.0.intf.as_str())
    }

    /// The subnet of the link between two nodes, taken from whichever endpoint carries an address.
    pub fn subnet(&self, node: &str, peer: &str) -> Result<Option<IpNet>, GraphError> {
        let (local, remote, _) = self.endpoints(node, peer)?;
        Ok(local.ip.or(remote.ip).map(|ip| ip.subnet()))
    }

    /// The parameters of the link between two nodes.
    pub fn link_params(&self, node: &str, peer: &str) -> Result<&LinkParams, GraphError> {
        Ok(&self.endpoints(node, peer)?.2.params)
    }

    /// The primary IP address of a host (its lowest-port interface address).
    pub fn get_host_ip(&self, host: &str) -> Result<IpNet, GraphError> {
        self.host_endpoint(host).map(|e| e.ip.expect("host interfaces carry addresses"))
    }

    /// The primary MAC address of a host (its lowest-port interface MAC).
    pub fn get_host_mac(&self, host: &str) -> Result<Mac, GraphError> {
        self.host_endpoint(host).map(|e| e.mac)
    }

    /// Reverse lookup: the host owning the given IP address, if any.
    pub fn get_host_name(&self, ip: Ipv4Addr) -> Option<&str> {
        self.host_by_ip.get(&ip).map(|s| s.as_str())
    }

    fn host_endpoint(&self, host: &str) -> Result<&EndpointRecord, GraphError> {
        let record = self.record(host)?;
        if record.kind != NodeKind::Host {
            return Err(GraphError::TopologyShape(format!(
                "{} is a {}, not a host",
                host, record.kind
            )));
        }
        let &(index, is_a) = self
            .adjacency
            .get(host)
            .and_then(|v| v.first())
            .ok_or_else(|| GraphError::TopologyShape(format!("host {} has no link", host)))?;
        let link = &self.data.links[index];
        Ok(if is_a { &link.a } else { &link.b })
    }

    /// The default gateway address of a host, if one was assigned or declared.
    pub fn gateway(&self, host: &str) -> Result<Option<Ipv4Addr>, GraphError> {
        let record = self.record(host)?;
        if record.kind != NodeKind::Host {
            return Err(GraphError::TopologyShape(format!(
                "{} is a {}, not a host",
                host, record.kind
            )));
        }
        Ok(record.gateway)
    }

    /// The virtual gateway address of a switch (`mixed` strategy only).
    pub fn virtual_gateway(&self, switch: &str) -> Result<Option<IpNet>, GraphError> {
        let record = self.switch_record(switch)?;
        Ok(record.virtual_gateway)
    }

    /// The numeric device id of a switch.
    pub fn device_id(&self, switch: &str) -> Result<Option<u32>, GraphError> {
        let record = self.switch_record(switch)?;
        Ok(record.device_id)
    }

    fn switch_record(&self, switch: &str) -> Result<&NodeRecord, GraphError> {
        let record = self.record(switch)?;
        if record.kind != NodeKind::Switch {
            return Err(GraphError::TopologyShape(format!(
                "{} is a {}, not a switch",
                switch, record.kind
            )));
        }
        Ok(record)
    }

    /// The static ARP table of a host (possibly empty if the toggles were disabled).
    pub fn arp_table(&self, host: &str) -> Result<&BTreeMap<Ipv4Addr, Mac>, GraphError> {
        let record = self.record(host)?;
        if record.kind != NodeKind::Host {
            return Err(GraphError::TopologyShape(format!(
                "{} is a {}, not a host",
                host, record.kind
            )));
        }
        self.data
            .arp
            .get(host)
            .ok_or_else(|| GraphError::TopologyShape(format!("host {} has no ARP table", host)))
    }

    /// All hosts directly attached to the given node, sorted.
    pub fn hosts_connected_to(&self, name: &str) -> Result<Vec<String>, GraphError> {
        self.neighbors_of_kind(name, NodeKind::Host)
    }

    /// All switches directly attached to the given node, sorted.
    pub fn switches_connected_to(&self, name: &str) -> Result<Vec<String>, GraphError> {
        self.neighbors_of_kind(name, NodeKind::Switch)
    }

    fn neighbors_of_kind(&self, name: &str, kind: NodeKind) -> Result<Vec<String>, GraphError> {
        Ok(self
            .neighbors(name)?
            .into_iter()
            .filter(|n| self.data.nodes[self.node_index[&n.peer]].kind == kind)
            .map(|n| n.peer)
            .sorted()
            .dedup()
            .collect())
    }

    /// All node records, in declaration order.
    pub fn node_records(&self) -> &[NodeRecord] {
        &self.data.nodes
    }

    /// All link records, in declaration order.
    pub fn link_records(&self) -> &[LinkRecord] {
        &self.data.links
    }

    /// All equal-cost shortest paths between two nodes, as node name sequences.
    ///
    /// Path cost is the sum of the link [`weight`](LinkParams::weight)s; ties within a relative
    /// tolerance all count as shortest. Returns `{[src]}` when `src == dst` and the empty set
    /// when no path exists.
    pub fn shortest_paths(
        &self,
        src: &str,
        dst: &str,
    ) -> Result<BTreeSet<Vec<String>>, GraphError> {
        let src_id = self.id(src)?;
        let dst_id = self.id(dst)?;
        let mut paths = BTreeSet::new();
        if src_id == dst_id {
            paths.insert(vec![src.to_string()]);
            return Ok(paths);
        }

        // Dijkstra keeping all tied predecessors
        let mut dist: HashMap<NodeId, LinkWeight> = HashMap::new();
        let mut preds: HashMap<NodeId, Vec<NodeId>> = HashMap::new();
        let mut queue = BinaryHeap::new();
        dist.insert(src_id, 0.0);
        queue.push(QueueEntry(0.0, src_id));
        while let Some(QueueEntry(d, u)) = queue.pop() {
            if d > dist[&u] + EPS {
                continue; // stale entry
            }
            for edge in self.net.edges(u) {
                let v = if edge.source() == u { edge.target() } else { edge.source() };
                let next = d + self.data.links[*edge.weight()].params.weight;
                match dist.get(&v) {
                    Some(&best) if next > best + EPS => {}
                    Some(&best) if next >= best - EPS => {
                        let p = preds.get_mut(&v).expect("visited nodes have predecessors");
                        if !p.contains(&u) {
                            p.push(u);
                        }
                    }
                    _ => {
                        dist.insert(v, next);
                        preds.insert(v, vec![u]);
                        queue.push(QueueEntry(next, v));
                    }
                }
            }
        }

        if dist.contains_key(&dst_id) {
            let mut stack = vec![dst_id];
            self.backtrack(src_id, dst_id, &preds, &mut stack, &mut paths);
            debug!("{} tied shortest paths {} -> {}", paths.len(), src, dst);
        } else {
            debug!("no path {} -> {}", src, dst);
        }
        Ok(paths)
    }

    /// Expand the predecessor DAG into full paths. `stack` holds the partial path from `dst` back
    /// to the current node.
    fn backtrack(
        &self,
        src: NodeId,
        current: NodeId,
        preds: &HashMap<NodeId, Vec<NodeId>>,
        stack: &mut Vec<NodeId>,
        paths: &mut BTreeSet<Vec<String>>,
    ) {
        if current == src {
            paths.insert(
                stack
                    .iter()
                    .rev()
                    .map(|&id| self.net[id].clone())
                    .collect(),
            );
            return;
        }
        if let Some(parents) = preds.get(&current) {
            for &p in parents {
                stack.push(p);
                self.backtrack(src, p, preds, stack, paths);
                stack.pop();
            }
        }
    }

    /// Write the topology to a JSON snapshot file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), StoreError> {
        let file = File::create(path.as_ref())?;
        serde_json::to_writer_pretty(BufWriter::new(file), &self.data)?;
        info!("topology saved to {:?}", path.as_ref());
        Ok(())
    }

    /// Load a topology from a JSON snapshot file, checking the snapshot version first.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let file = File::open(path.as_ref())?;
        let value: serde_json::Value = serde_json::from_reader(BufReader::new(file))?;
        let found = value.get("version").and_then(|v| v.as_u64()).unwrap_or(0) as u32;
        if found != SNAPSHOT_VERSION {
            return Err(StoreError::Version { found, expected: SNAPSHOT_VERSION });
        }
        let data: Snapshot = serde_json::from_value(value)?;
        Self::from_snapshot(data)
    }
}

fn bad_snapshot(message: String) -> StoreError {
    use serde::de::Error as _;
    StoreError::Format(serde_json::Error::custom(message))
}

/// Min-heap entry for the path computation; total order by cost, node id breaking exact ties.
struct QueueEntry(LinkWeight, NodeId);

impl PartialEq for QueueEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for QueueEntry {}

impl PartialOrd for QueueEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueueEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // reversed, so that the BinaryHeap pops the smallest cost first
        other
            .0
            .partial_cmp(&self.0)
            .unwrap_or(Ordering::Equal)
            .then_with(|| other.1.cmp(&self.1))
    }
}
