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

//! # Assignment Strategies
//!
//! This module contains the trait definition for [`AssignmentStrategy`], along with the four
//! built-in strategies which walk the [`NetworkGraph`](crate::graph::NetworkGraph) and populate
//! the missing addressing via the [allocators](crate::allocators):
//!
//! - **[`L2Strategy`]** (`l2`): one shared subnet (default `10.0.0.0/16`) for all hosts. The host
//!   index is derived from the numeric suffix of the host name, falling back to declaration
//!   order, and reappears in the MAC low bytes for human readability.
//!
//! - **[`MixedStrategy`]** (`mixed`): one `/24` per switch, keyed by the switch's numeric device
//!   id. The switch acts as the logical L3 gateway (`.254`) for its hosts, recorded as a
//!   *virtual* address for control-plane use without being bound to any interface.
//!
//! - **[`L3Strategy`]** (`l3`): every link is its own `/24`. Host links use
//!   `10.<switch-id>.<host-id>.{1,2}` with the switch side taking `.1`; switch-to-switch links
//!   use `20.<lower-id>.<higher-id>.{1,2}` with the lower-id switch taking `.1`.
//!
//! - **[`ManualStrategy`]** (`manual`): no automatic addressing; only structural validation.
//!   Parallel links are permitted, and the caller must supply every host address.
//!
//! Strategy selection is a single enumerated choice per topology ([`Strategy`]); strategies are
//! never combined. Users can plug their own algorithm through [`Strategy::Custom`].

mod l2;
mod l3;
mod manual;
mod mixed;

pub use l2::L2Strategy;
pub use l3::L3Strategy;
pub use manual::ManualStrategy;
pub use mixed::MixedStrategy;

use crate::graph::NetworkGraph;
use crate::types::{GraphError, IpNet, NodeId, NodeKind};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// An algorithm which walks the settled graph structure and fills in the missing addressing.
///
/// A strategy must only touch previously-unset fields (explicit port/MAC overrides are kept), and
/// must be deterministic: running it twice on the identical declaration must yield identical
/// assignments.
pub trait AssignmentStrategy {
    /// Short name of the strategy (e.g. `"l2"`), recorded in the frozen topology.
    fn name(&self) -> &str;

    /// Whether parallel links between the same node pair are permitted. Defaults to `false`;
    /// only the manual strategy (or a custom one) may allow them.
    fn allows_parallel_links(&self) -> bool {
        false
    }

    /// Walk the graph and populate the addressing.
    fn assign(&self, graph: &mut NetworkGraph) -> Result<(), GraphError>;
}

/// The strategy selected for a topology.
pub enum Strategy {
    /// Single shared subnet ([`L2Strategy`])
    L2,
    /// One subnet per link ([`L3Strategy`])
    L3,
    /// One subnet per switch ([`MixedStrategy`])
    Mixed,
    /// Caller-supplied addressing ([`ManualStrategy`])
    Manual,
    /// A user-supplied strategy
    Custom(Box<dyn AssignmentStrategy>),
}

impl Default for Strategy {
    fn default() -> Self {
        Self::L2
    }
}

impl fmt::Debug for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Strategy({})", self.name())
    }
}

impl Strategy {
    /// Short name of the selected strategy.
    pub fn name(&self) -> &str {
        match self {
            Self::L2 => "l2",
            Self::L3 => "l3",
            Self::Mixed => "mixed",
            Self::Manual => "manual",
            Self::Custom(s) => s.name(),
        }
    }

    /// Whether parallel links between the same node pair are permitted.
    pub fn allows_parallel_links(&self) -> bool {
        match self {
            Self::Manual => ManualStrategy.allows_parallel_links(),
            Self::Custom(s) => s.allows_parallel_links(),
            _ => false,
        }
    }

    /// Run the selected strategy. The `l2_subnet` override only applies to [`Strategy::L2`].
    pub(crate) fn run(
        &self,
        graph: &mut NetworkGraph,
        l2_subnet: Option<IpNet>,
    ) -> Result<(), GraphError> {
        match self {
            Self::L2 => match l2_subnet {
                Some(net) => L2Strategy::new(net).assign(graph),
                None => L2Strategy::default().assign(graph),
            },
            Self::L3 => L3Strategy.assign(graph),
            Self::Mixed => MixedStrategy.assign(graph),
            Self::Manual => ManualStrategy.assign(graph),
            Self::Custom(s) => s.assign(graph),
        }
    }
}

/// Parse the numeric suffix of a node name.
///
/// This is a documented contract, since addressing reproducibility depends on it: the suffix is
/// the maximal run of trailing ASCII digits (`"h12" -> 12`, `"sw2x3" -> 3`, `"core" -> None`),
/// parsed greedily from the end of the name. Values which overflow a `u32` are treated as no
/// suffix.
pub fn numeric_suffix(name: &str) -> Option<u32> {
    let len = name.chars().rev().take_while(|c| c.is_ascii_digit()).count();
    if len == 0 {
        None
    } else {
        name[name.len() - len..].parse().ok()
    }
}

/// Structural validation shared by all automatic strategies: no parallel links, every host has
/// exactly one link and attaches to a switch, and no explicit interface IPs (except on routers,
/// which are always caller-addressed).
pub(crate) fn validate_automatic(graph: &NetworkGraph) -> Result<(), GraphError> {
    // parallel links can slip in when the strategy is switched after link declaration
    let mut seen: BTreeSet<(NodeId, NodeId)> = BTreeSet::new();
    for link in graph.links() {
        let (a, b) = link.ends();
        let key = if a < b { (a, b) } else { (b, a) };
        if !seen.insert(key) {
            return Err(GraphError::ParallelLink(
                graph.name(a).to_string(),
                graph.name(b).to_string(),
            ));
        }
    }

    for host in graph.nodes_of_kind(NodeKind::Host) {
        let degree = graph.degree(host);
        if degree != 1 {
            return Err(GraphError::TopologyShape(format!(
                "host {} must have exactly one link, found {}",
                graph.name(host),
                degree
            )));
        }
        let link = &graph.links()[graph.links_of(host)[0]];
        let peer = link.peer_of(host).expect("endpoint of its own link");
        if graph.node(peer).kind() != NodeKind::Switch {
            return Err(GraphError::TopologyShape(format!(
                "host {} must attach to a switch, not to {} {}",
                graph.name(host),
                graph.node(peer).kind(),
                graph.name(peer)
            )));
        }
    }

    for link in graph.links() {
        for iface in [&link.a, &link.b].iter() {
            let node = graph.node(iface.node());
            if iface.explicit_ip && node.kind() != NodeKind::Router {
                return Err(GraphError::StrategyMismatch(format!(
                    "interface IP of {} was set explicitly, which only the manual strategy allows",
                    node.name()
                )));
            }
        }
    }
    Ok(())
}

/// Assign numeric device ids to all switches and record them in the graph.
///
/// Switches with a numeric name suffix `>= 1` keep it as their id (first declaration wins on
/// duplicates); the remaining switches receive the smallest unused id `>= 1` in declaration
/// order.
pub(crate) fn assign_switch_ids(
    graph: &mut NetworkGraph,
) -> Result<BTreeMap<NodeId, u32>, GraphError> {
    let switches = graph.nodes_of_kind(NodeKind::Switch);
    let mut ids: BTreeMap<NodeId, u32> = BTreeMap::new();
    let mut used: BTreeSet<u32> = BTreeSet::new();
    for &sw in &switches {
        if let Some(id) = numeric_suffix(graph.name(sw)) {
            if id >= 1 && used.insert(id) {
                ids.insert(sw, id);
            }
        }
    }
    let mut next = 1;
    for &sw in &switches {
        if !ids.contains_key(&sw) {
            while used.contains(&next) {
                next += 1;
            }
            used.insert(next);
            ids.insert(sw, next);
        }
    }
    for (&sw, &id) in &ids {
        graph.node_mut(sw).device_id = Some(id);
    }
    Ok(ids)
}

/// Classify the link at `index` as a host link, returning `(host, switch)`. Assumes the shape was
/// validated (a host's only peer is a switch).
pub(crate) fn host_link(graph: &NetworkGraph, index: usize) -> Option<(NodeId, NodeId)> {
    let link = &graph.links()[index];
    let (a, b) = link.ends();
    if graph.node(a).kind() == NodeKind::Host {
        Some((a, b))
    } else if graph.node(b).kind() == NodeKind::Host {
        Some((b, a))
    } else {
        None
    }
}
