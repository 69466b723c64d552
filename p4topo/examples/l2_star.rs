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

//! Declare a small star topology, build it with the `l2` strategy and print the resulting
//! addressing. Run with `RUST_LOG=debug` to see the assignment decisions.

use p4topo::{NetworkBuilder, Strategy};

fn main() -> Result<(), p4topo::Error> {
    pretty_env_logger::init();

    let mut builder = NetworkBuilder::new();
    builder.add_switch("s1")?;
    for host in &["h1", "h2", "h3", "web"] {
        builder.add_host(*host)?;
        builder.add_link(host, "s1")?;
    }
    builder.select_strategy(Strategy::L2);

    let topo = builder.build()?;
    for host in topo.hosts() {
        println!(
            "{:4}  ip {:15}  mac {}  port {} on s1",
            host,
            topo.get_host_ip(host)?.to_string(),
            topo.get_host_mac(host)?,
            topo.port_of("s1", host)?,
        );
    }
    for path in topo.shortest_paths("h1", "h2")? {
        println!("h1 -> h2 via {}", path.join(" -> "));
    }

    topo.save("topology.json")?;
    println!("snapshot written to topology.json");
    Ok(())
}
