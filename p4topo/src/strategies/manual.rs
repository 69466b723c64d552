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

//! The `manual` assignment strategy: caller-supplied addressing.

use super::{assign_switch_ids, AssignmentStrategy};
use crate::graph::NetworkGraph;
use crate::types::{GraphError, Mac, NodeKind};
use log::*;

/// # Manual Assignment Strategy
///
/// No automatic IP assignment; the caller supplies addresses and gateways per interface/host
/// before `build()`. Only structural validation is performed: every host interface must carry an
/// explicit IP (else [`GraphError::StrategyMismatch`]), while switch and router interfaces may
/// legitimately stay unaddressed. MACs are derived from the explicit IPs where unset; the
/// remaining interfaces receive counter MACs in the final allocation pass. This is the only
/// strategy permitting parallel links and multihomed hosts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ManualStrategy;

impl AssignmentStrategy for ManualStrategy {
    fn name(&self) -> &str {
        "manual"
    }

    fn allows_parallel_links(&self) -> bool {
        true
    }

    fn assign(&self, graph: &mut NetworkGraph) -> Result<(), GraphError> {
        assign_switch_ids(graph)?;
        info!("manual assignment: validating caller-supplied addresses");

        for index in 0..graph.links().len() {
            let (a, b) = graph.links()[index].ends();
            for &node in [a, b].iter() {
                let kind = graph.node(node).kind();
                let side = if kind == NodeKind::Host { 0 } else { 1 };
                let name = graph.name(node).to_string();
                let link = &mut graph.links_mut()[index];
                let iface = link.endpoint_mut(node).expect("endpoint of its own link");
                if kind == NodeKind::Host && iface.ip.is_none() {
                    return Err(GraphError::StrategyMismatch(format!(
                        "host {} has no explicit IP, which the manual strategy requires",
                        name
                    )));
                }
                if let (Some(ip), None) = (iface.ip, iface.mac) {
                    iface.mac = Some(Mac::from_ip(ip.addr, side));
                }
            }
        }
        Ok(())
    }
}
