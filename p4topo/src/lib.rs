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

//! # P4Topo
//!
//! `p4topo` models the topology of an emulated P4 network: hosts, switches, routers and the links
//! between them, together with the deterministic assignment of port indices, MAC addresses, IP
//! addresses, default gateways and static ARP tables. It is the data-model core an emulation
//! orchestrator builds on; it does not itself start any virtual interface or switch process.
//!
//! A topology goes through two phases:
//!
//! 1. **Declaration** ([`NetworkBuilder`]): nodes and links are added, explicit overrides applied,
//!    and one of the [assignment strategies](strategies) selected. All structural validation is
//!    eager, so mistakes surface on the declaring call.
//! 2. **Frozen** ([`Topology`]): `build()` runs the strategy, completes port and MAC allocation,
//!    pre-populates the ARP tables and freezes the result. The frozen topology is immutable and
//!    serves the whole query interface, including equal-cost shortest-path enumeration, and can
//!    be [saved](Topology::save) to and [loaded](Topology::load) from a versioned JSON snapshot.
//!
//! Everything is reproducible: building the identical declaration twice yields byte-identical
//! assignments, so switch ids, addresses and snapshots can be relied upon across runs.
//!
//! # Example
//!
//! ```
//! use p4topo::{NetworkBuilder, Strategy};
//!
//! fn main() -> Result<(), p4topo::Error> {
//!     let mut builder = NetworkBuilder::new();
//!     builder.add_host("h1")?;
//!     builder.add_host("h2")?;
//!     builder.add_switch("s1")?;
//!     builder.add_link("h1", "s1")?;
//!     builder.add_link("h2", "s1")?;
//!     builder.select_strategy(Strategy::L2);
//!
//!     let topo = builder.build()?;
//!     assert_eq!(topo.get_host_ip("h1")?.to_string(), "10.0.0.1/16");
//!     assert_eq!(topo.port_of("s1", "h1")?, 1);
//!     assert_eq!(topo.shortest_paths("h1", "h2")?.len(), 1);
//!     Ok(())
//! }
//! ```

#![deny(missing_docs)]

pub mod allocators;
mod arp;
pub mod builder;
mod error;
pub mod graph;
pub mod store;
pub mod strategies;
pub mod types;

mod test;

pub use crate::builder::NetworkBuilder;
pub use crate::error::Error;
pub use crate::store::Topology;
pub use crate::strategies::Strategy;
