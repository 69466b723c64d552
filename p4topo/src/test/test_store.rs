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

//! Test the frozen topology: query interface, shortest paths and snapshot persistence.

use crate::graph::LinkParams;
use crate::store::{Topology, SNAPSHOT_VERSION};
use crate::types::{GraphError, NodeKind, StoreError};
use crate::NetworkBuilder;
use maplit::btreemap;
use std::collections::BTreeSet;
use std::path::Path;

/// # Diamond topology
///
/// ```text
///       .---- s4 ----.
///      /              \
///    s1 -------------- s2      (direct link weight 3)
///      \              /
///       '---- s5 ----'
/// ```
///
/// Both two-hop paths cost 2, the direct link costs 3. `s9` stays isolated.
fn get_diamond() -> Topology {
    let mut b = NetworkBuilder::new();
    b.add_switch("s1").unwrap();
    b.add_switch("s2").unwrap();
    b.add_switch("s4").unwrap();
    b.add_switch("s5").unwrap();
    b.add_switch("s9").unwrap();
    b.add_link("s1", "s4").unwrap();
    b.add_link("s4", "s2").unwrap();
    b.add_link("s1", "s5").unwrap();
    b.add_link("s5", "s2").unwrap();
    b.add_link_with("s1", "s2", LinkParams { weight: 3.0, ..Default::default() }).unwrap();
    b.build().unwrap()
}

/// # Star topology
///
/// ```text
/// h1 ---- s1 ---- h2
/// ```
fn get_star() -> Topology {
    let mut b = NetworkBuilder::new();
    b.add_host("h1").unwrap();
    b.add_host("h2").unwrap();
    b.add_switch("s1").unwrap();
    b.add_link("h1", "s1").unwrap();
    b.add_link("h2", "s1").unwrap();
    b.build().unwrap()
}

fn names(path: &[&str]) -> Vec<String> {
    path.iter().map(|s| s.to_string()).collect()
}

#[test]
fn tied_shortest_paths_are_all_returned() {
    let topo = get_diamond();
    let paths = topo.shortest_paths("s1", "s2").unwrap();
    let expected: BTreeSet<Vec<String>> =
        vec![names(&["s1", "s4", "s2"]), names(&["s1", "s5", "s2"])].into_iter().collect();
    assert_eq!(paths, expected);
}

#[test]
fn lower_weight_wins_over_fewer_hops() {
    let mut b = NetworkBuilder::new();
    b.add_switch("s1").unwrap();
    b.add_switch("s2").unwrap();
    b.add_switch("s4").unwrap();
    b.add_link("s1", "s4").unwrap();
    b.add_link("s4", "s2").unwrap();
    b.add_link_with("s1", "s2", LinkParams { weight: 1.5, ..Default::default() }).unwrap();
    let topo = b.build().unwrap();
    let paths = topo.shortest_paths("s1", "s2").unwrap();
    let expected: BTreeSet<Vec<String>> = vec![names(&["s1", "s2"])].into_iter().collect();
    assert_eq!(paths, expected);
}

#[test]
fn path_to_self_is_trivial() {
    let topo = get_diamond();
    let paths = topo.shortest_paths("s1", "s1").unwrap();
    let expected: BTreeSet<Vec<String>> = vec![names(&["s1"])].into_iter().collect();
    assert_eq!(paths, expected);
}

#[test]
fn unreachable_nodes_yield_no_path() {
    let topo = get_diamond();
    assert!(topo.shortest_paths("s1", "s9").unwrap().is_empty());
    assert_eq!(
        topo.shortest_paths("s1", "s99"),
        Err(GraphError::UnknownNode("s99".to_string()))
    );
}

#[test]
fn nodes_of_kind_serves_attributes() {
    let mut b = NetworkBuilder::new();
    b.add_switch_with("s1", btreemap! {"p4_src".to_string() => "l2fwd.p4".to_string()}).unwrap();
    b.add_host("h1").unwrap();
    b.add_link("h1", "s1").unwrap();
    let topo = b.build().unwrap();
    let switches = topo.nodes_of_kind(NodeKind::Switch);
    assert_eq!(switches["s1"].get("p4_src").map(String::as_str), Some("l2fwd.p4"));
    assert!(topo.nodes_of_kind(NodeKind::Host)["h1"].is_empty());
    assert_eq!(topo.attribute("s1", "p4_src").unwrap(), Some("l2fwd.p4"));
}

#[test]
fn queries_resolve_names_and_kinds() {
    let topo = get_star();
    assert!(topo.contains("h1"));
    assert!(!topo.contains("h9"));
    assert_eq!(topo.node_kind("s1").unwrap(), NodeKind::Switch);
    assert_eq!(topo.hosts(), vec!["h1", "h2"]);
    assert_eq!(topo.switches(), vec!["s1"]);
    assert!(topo.routers().is_empty());
    assert!(topo.are_neighbors("h1", "s1").unwrap());
    assert!(!topo.are_neighbors("h1", "h2").unwrap());
    assert_eq!(topo.hosts_connected_to("s1").unwrap(), vec!["h1", "h2"]);
    assert_eq!(topo.switches_connected_to("h1").unwrap(), vec!["s1"]);
}

#[test]
fn neighbors_are_ordered_by_port() {
    let topo = get_star();
    let neighbors = topo.neighbors("s1").unwrap();
    assert_eq!(neighbors.len(), 2);
    assert_eq!(neighbors[0].peer, "h1");
    assert_eq!(neighbors[0].port, 1);
    assert_eq!(neighbors[0].intf, "s1-eth1");
    assert_eq!(neighbors[1].peer, "h2");
    assert_eq!(topo.interfaces("s1").unwrap(), vec!["s1-eth1", "s1-eth2"]);
}

#[test]
fn link_queries_report_both_sides() {
    let topo = get_star();
    assert_eq!(topo.subnet("h1", "s1").unwrap().unwrap().to_string(), "10.0.0.0/16");
    assert_eq!(topo.link_params("h1", "s1").unwrap().weight, 1.0);
    assert_eq!(
        topo.port_of("h1", "h2"),
        Err(GraphError::NotConnected("h1".to_string(), "h2".to_string()))
    );
    assert_eq!(topo.port_of("h1", "nope"), Err(GraphError::UnknownNode("nope".to_string())));
}

#[test]
fn kind_mismatches_are_reported() {
    let topo = get_star();
    assert!(matches!(topo.arp_table("s1"), Err(GraphError::TopologyShape(_))));
    assert!(matches!(topo.device_id("h1"), Err(GraphError::TopologyShape(_))));
    assert!(matches!(topo.gateway("s1"), Err(GraphError::TopologyShape(_))));
    assert!(matches!(topo.get_host_ip("s1"), Err(GraphError::TopologyShape(_))));
}

#[test]
fn snapshots_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("topology.json");
    let topo = get_star();
    topo.save(&path).unwrap();
    let loaded = Topology::load(&path).unwrap();
    assert_eq!(loaded.strategy(), topo.strategy());
    assert_eq!(loaded.node_records(), topo.node_records());
    assert_eq!(loaded.link_records(), topo.link_records());
    assert_eq!(loaded.arp_table("h1").unwrap(), topo.arp_table("h1").unwrap());
    assert_eq!(loaded.shortest_paths("h1", "h2").unwrap().len(), 1);
}

#[test]
fn version_is_checked_before_the_schema() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("topology.json");
    std::fs::write(&path, r#"{"version": 99}"#).unwrap();
    match Topology::load(&path) {
        Err(StoreError::Version { found, expected }) => {
            assert_eq!(found, 99);
            assert_eq!(expected, SNAPSHOT_VERSION);
        }
        other => panic!("expected a version error, got {:?}", other.map(|_| ())),
    }
}

/// Save the star topology, apply `tamper` to the parsed JSON document and write it back.
fn tampered_snapshot(path: &Path, tamper: impl Fn(&mut serde_json::Value)) {
    get_star().save(path).unwrap();
    let mut value: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
    tamper(&mut value);
    std::fs::write(path, value.to_string()).unwrap();
}

#[test]
fn snapshots_with_unaddressed_hosts_are_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("topology.json");
    tampered_snapshot(&path, |value| {
        for link in value["links"].as_array_mut().unwrap() {
            if link["a"]["node"] == "h1" {
                link["a"]["ip"] = serde_json::Value::Null;
            }
        }
    });
    assert!(matches!(Topology::load(&path), Err(StoreError::Format(_))));
}

#[test]
fn snapshots_with_duplicate_addresses_are_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("topology.json");
    // both host interfaces claim the same MAC
    tampered_snapshot(&path, |value| {
        let mac = value["links"][0]["a"]["mac"].clone();
        value["links"][1]["a"]["mac"] = mac;
    });
    assert!(matches!(Topology::load(&path), Err(StoreError::Format(_))));

    // two interfaces of the switch claim the same port
    tampered_snapshot(&path, |value| {
        value["links"][1]["b"]["port"] = serde_json::json!(1);
    });
    assert!(matches!(Topology::load(&path), Err(StoreError::Format(_))));
}

#[test]
fn malformed_snapshots_are_format_errors() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("topology.json");
    std::fs::write(&path, "not json at all").unwrap();
    assert!(matches!(Topology::load(&path), Err(StoreError::Format(_))));
    assert!(matches!(
        Topology::load(dir.path().join("missing.json")),
        Err(StoreError::Io(_))
    ));
}
