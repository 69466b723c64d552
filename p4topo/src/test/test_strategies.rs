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

//! Test the four assignment strategies end to end, from declaration to frozen topology.

use crate::strategies::{numeric_suffix, Strategy};
use crate::types::{GraphError, Mac};
use crate::{Error, NetworkBuilder};
use lazy_static::lazy_static;
use std::net::Ipv4Addr;

lazy_static! {
    static ref H1_MAC: Mac = "02:00:0a:00:00:01".parse().unwrap();
    static ref H2_MAC: Mac = "02:00:0a:00:00:02".parse().unwrap();
}

/// # Star topology
///
/// ```text
/// h1 ---.      .--- h7
///        \    /
///         s1
///        /    \
/// h2 ---'      '--- web
/// ```
fn get_star_builder() -> NetworkBuilder {
    let mut b = NetworkBuilder::new();
    b.add_host("h1").unwrap();
    b.add_host("h2").unwrap();
    b.add_host("h7").unwrap();
    b.add_host("web").unwrap();
    b.add_switch("s1").unwrap();
    b.add_link("h1", "s1").unwrap();
    b.add_link("h2", "s1").unwrap();
    b.add_link("h7", "s1").unwrap();
    b.add_link("web", "s1").unwrap();
    b
}

/// # Two-switch topology
///
/// ```text
/// h1 ---- s1 ---- s2 ---- h2
/// ```
fn get_line_builder(strategy: Strategy) -> NetworkBuilder {
    let mut b = NetworkBuilder::new();
    b.select_strategy(strategy);
    b.add_switch("s1").unwrap();
    b.add_switch("s2").unwrap();
    b.add_host("h1").unwrap();
    b.add_host("h2").unwrap();
    b.add_link("h1", "s1").unwrap();
    b.add_link("h2", "s2").unwrap();
    b.add_link("s1", "s2").unwrap();
    b
}

#[test]
fn l2_assigns_suffix_addresses() {
    let topo = get_star_builder().build().unwrap();
    assert_eq!(topo.strategy(), "l2");
    assert_eq!(topo.get_host_ip("h1").unwrap().to_string(), "10.0.0.1/16");
    assert_eq!(topo.get_host_ip("h2").unwrap().to_string(), "10.0.0.2/16");
    assert_eq!(topo.get_host_ip("h7").unwrap().to_string(), "10.0.0.7/16");
    // suffix-less hosts draw the next free address
    assert_eq!(topo.get_host_ip("web").unwrap().to_string(), "10.0.0.3/16");
}

#[test]
fn l2_derives_macs_from_ips() {
    let topo = get_star_builder().build().unwrap();
    assert_eq!(topo.get_host_mac("h1").unwrap(), *H1_MAC);
    assert_eq!(topo.mac_of("h1", "s1").unwrap(), *H1_MAC);
    assert_eq!(topo.mac_of("s1", "h1").unwrap(), "02:01:0a:00:00:01".parse().unwrap());
    assert_eq!(topo.get_host_name(Ipv4Addr::new(10, 0, 0, 2)), Some("h2"));
}

#[test]
fn l2_ports_follow_link_declaration_order() {
    let topo = get_star_builder().build().unwrap();
    assert_eq!(topo.port_of("s1", "h1").unwrap(), 1);
    assert_eq!(topo.port_of("s1", "h2").unwrap(), 2);
    assert_eq!(topo.port_of("s1", "h7").unwrap(), 3);
    assert_eq!(topo.port_of("s1", "web").unwrap(), 4);
    assert_eq!(topo.port_of("h1", "s1").unwrap(), 1);
    assert_eq!(topo.intf_of("s1", "h2").unwrap(), "s1-eth2");
    assert_eq!(topo.device_id("s1").unwrap(), Some(1));
}

#[test]
fn l2_populates_full_arp_tables() {
    let topo = get_star_builder().build().unwrap();
    let arp = topo.arp_table("h1").unwrap();
    assert_eq!(arp.len(), 3);
    assert_eq!(arp.get(&Ipv4Addr::new(10, 0, 0, 2)), Some(&*H2_MAC));
    assert_eq!(topo.gateway("h1").unwrap(), None);
}

#[test]
fn l2_wide_suffix_wraps_into_higher_octets() {
    let mut b = NetworkBuilder::new();
    b.add_host("h300").unwrap();
    b.add_switch("s1").unwrap();
    b.add_link("h300", "s1").unwrap();
    let topo = b.build().unwrap();
    // 300 = 1 * 256 + 44
    assert_eq!(topo.get_host_ip("h300").unwrap().to_string(), "10.0.1.44/16");
}

#[test]
fn l2_duplicate_suffixes_fall_back_to_the_allocator() {
    let mut b = NetworkBuilder::new();
    b.add_host("h1").unwrap();
    b.add_host("host1").unwrap();
    b.add_switch("s1").unwrap();
    b.add_link("h1", "s1").unwrap();
    b.add_link("host1", "s1").unwrap();
    let topo = b.build().unwrap();
    assert_eq!(topo.get_host_ip("h1").unwrap().to_string(), "10.0.0.1/16");
    assert_eq!(topo.get_host_ip("host1").unwrap().to_string(), "10.0.0.2/16");
}

#[test]
fn l2_honors_a_custom_subnet() {
    let mut b = NetworkBuilder::new();
    b.set_subnet("172.16.0.0/24".parse().unwrap());
    b.add_host("h1").unwrap();
    b.add_switch("s1").unwrap();
    b.add_link("h1", "s1").unwrap();
    let topo = b.build().unwrap();
    assert_eq!(topo.get_host_ip("h1").unwrap().to_string(), "172.16.0.1/24");
}

#[test]
fn subnet_override_is_l2_only() {
    let mut b = get_line_builder(Strategy::L3);
    b.set_subnet("172.16.0.0/24".parse().unwrap());
    assert!(matches!(b.build(), Err(Error::Graph(GraphError::StrategyMismatch(_)))));
}

#[test]
fn builds_are_deterministic() {
    let a = get_star_builder().build().unwrap();
    let b = get_star_builder().build().unwrap();
    assert_eq!(a.node_records(), b.node_records());
    assert_eq!(a.link_records(), b.link_records());
    assert_eq!(a.arp_table("h2").unwrap(), b.arp_table("h2").unwrap());
}

#[test]
fn mixed_gives_each_switch_a_subnet() {
    let topo = get_line_builder(Strategy::Mixed).build().unwrap();
    assert_eq!(topo.strategy(), "mixed");
    assert_eq!(topo.get_host_ip("h1").unwrap().to_string(), "10.0.1.1/24");
    assert_eq!(topo.get_host_ip("h2").unwrap().to_string(), "10.0.2.2/24");
    assert_eq!(topo.gateway("h1").unwrap(), Some(Ipv4Addr::new(10, 0, 1, 254)));
    assert_eq!(topo.virtual_gateway("s1").unwrap().unwrap().to_string(), "10.0.1.254/24");
    // the virtual gateway is not bound to any interface
    assert_eq!(topo.ip_of("s1", "h1").unwrap(), None);
    assert_eq!(topo.ip_of("s1", "s2").unwrap(), None);
}

#[test]
fn mixed_gateway_shows_up_in_arp() {
    let topo = get_line_builder(Strategy::Mixed).build().unwrap();
    let arp = topo.arp_table("h1").unwrap();
    // h1 and h2 sit in different subnets, so only the gateway entry remains
    assert_eq!(arp.len(), 1);
    assert_eq!(
        arp.get(&Ipv4Addr::new(10, 0, 1, 254)),
        Some(&Mac::from_ip(Ipv4Addr::new(10, 0, 1, 254), 1))
    );
}

#[test]
fn arp_toggles_disable_prepopulation() {
    let mut b = get_line_builder(Strategy::Mixed);
    b.disable_arp_tables();
    b.disable_gw_arp();
    let topo = b.build().unwrap();
    assert!(topo.arp_table("h1").unwrap().is_empty());
}

#[test]
fn l3_gives_each_link_a_subnet() {
    let topo = get_line_builder(Strategy::L3).build().unwrap();
    assert_eq!(topo.strategy(), "l3");
    assert_eq!(topo.get_host_ip("h1").unwrap().to_string(), "10.1.1.2/24");
    assert_eq!(topo.ip_of("s1", "h1").unwrap().unwrap().to_string(), "10.1.1.1/24");
    assert_eq!(topo.gateway("h1").unwrap(), Some(Ipv4Addr::new(10, 1, 1, 1)));
    // switch-to-switch: the lower device id takes .1
    assert_eq!(topo.ip_of("s1", "s2").unwrap().unwrap().to_string(), "20.1.2.1/24");
    assert_eq!(topo.ip_of("s2", "s1").unwrap().unwrap().to_string(), "20.1.2.2/24");
    assert_eq!(topo.subnet("s1", "s2").unwrap().unwrap().to_string(), "20.1.2.0/24");
}

#[test]
fn l3_gateway_resolves_to_the_switch_interface() {
    let topo = get_line_builder(Strategy::L3).build().unwrap();
    let arp = topo.arp_table("h1").unwrap();
    assert_eq!(arp.len(), 1);
    assert_eq!(
        arp.get(&Ipv4Addr::new(10, 1, 1, 1)),
        Some(&Mac::from_ip(Ipv4Addr::new(10, 1, 1, 2), 1))
    );
}

#[test]
fn l3_rejects_oversized_switch_ids() {
    let mut b = NetworkBuilder::new();
    b.select_strategy(Strategy::L3);
    b.add_switch("s300").unwrap();
    b.add_host("h1").unwrap();
    b.add_link("h1", "s300").unwrap();
    assert!(matches!(
        b.build(),
        Err(Error::Graph(GraphError::AddressExhaustion(_)))
    ));
}

#[test]
fn mixed_rejects_oversized_switch_ids() {
    let mut b = NetworkBuilder::new();
    b.select_strategy(Strategy::Mixed);
    b.add_switch("s70000").unwrap();
    b.add_host("h1").unwrap();
    b.add_link("h1", "s70000").unwrap();
    assert!(matches!(
        b.build(),
        Err(Error::Graph(GraphError::AddressExhaustion(_)))
    ));
}

#[test]
fn manual_requires_explicit_host_addresses() {
    let mut b = NetworkBuilder::new();
    b.select_strategy(Strategy::Manual);
    b.add_host("h1").unwrap();
    b.add_switch("s1").unwrap();
    b.add_link("h1", "s1").unwrap();
    assert!(matches!(
        b.build(),
        Err(Error::Graph(GraphError::StrategyMismatch(_)))
    ));
}

#[test]
fn manual_derives_macs_from_explicit_ips() {
    let mut b = NetworkBuilder::new();
    b.select_strategy(Strategy::Manual);
    b.add_host("h1").unwrap();
    b.add_switch("s1").unwrap();
    b.add_link("h1", "s1").unwrap();
    let gw_mac: Mac = "02:01:c0:a8:01:01".parse().unwrap();
    b.set_interface_ip("h1", "s1", "192.168.1.10/24".parse().unwrap()).unwrap();
    b.set_gateway("h1", Ipv4Addr::new(192, 168, 1, 1), Some(gw_mac)).unwrap();
    let topo = b.build().unwrap();
    assert_eq!(topo.get_host_ip("h1").unwrap().to_string(), "192.168.1.10/24");
    assert_eq!(topo.get_host_mac("h1").unwrap().to_string(), "02:00:c0:a8:01:0a");
    assert_eq!(topo.gateway("h1").unwrap(), Some(Ipv4Addr::new(192, 168, 1, 1)));
    let arp = topo.arp_table("h1").unwrap();
    assert_eq!(arp.get(&Ipv4Addr::new(192, 168, 1, 1)), Some(&gw_mac));
}

#[test]
fn manual_allows_parallel_links() {
    let mut b = NetworkBuilder::new();
    b.select_strategy(Strategy::Manual);
    b.add_switch("s1").unwrap();
    b.add_switch("s2").unwrap();
    b.add_link("s1", "s2").unwrap();
    b.add_link("s1", "s2").unwrap();
    let topo = b.build().unwrap();
    // the query interface resolves the pair to the first declared link
    assert_eq!(topo.port_of("s1", "s2").unwrap(), 1);
    assert_eq!(topo.interfaces("s1").unwrap(), vec!["s1-eth1", "s1-eth2"]);
}

#[test]
fn automatic_strategies_reject_multihomed_hosts() {
    let mut b = NetworkBuilder::new();
    b.add_host("h1").unwrap();
    b.add_switch("s1").unwrap();
    b.add_switch("s2").unwrap();
    b.add_link("h1", "s1").unwrap();
    b.add_link("h1", "s2").unwrap();
    assert!(matches!(b.build(), Err(Error::Graph(GraphError::TopologyShape(_)))));
}

#[test]
fn automatic_strategies_reject_host_to_host_links() {
    let mut b = NetworkBuilder::new();
    b.add_host("h1").unwrap();
    b.add_host("h2").unwrap();
    b.add_link("h1", "h2").unwrap();
    assert!(matches!(b.build(), Err(Error::Graph(GraphError::TopologyShape(_)))));
}

#[test]
fn automatic_strategies_reject_explicit_host_ips() {
    let mut b = NetworkBuilder::new();
    b.add_host("h1").unwrap();
    b.add_switch("s1").unwrap();
    b.add_link("h1", "s1").unwrap();
    b.set_interface_ip("h1", "s1", "10.0.0.99/16".parse().unwrap()).unwrap();
    assert!(matches!(b.build(), Err(Error::Graph(GraphError::StrategyMismatch(_)))));
}

#[test]
fn explicit_ports_survive_the_automatic_pass() {
    let mut b = get_star_builder();
    b.set_interface_port("s1", "h2", 7).unwrap();
    let topo = b.build().unwrap();
    assert_eq!(topo.port_of("s1", "h2").unwrap(), 7);
    // the remaining interfaces keep filling the low indices
    assert_eq!(topo.port_of("s1", "h1").unwrap(), 1);
    assert_eq!(topo.port_of("s1", "h7").unwrap(), 2);
    assert_eq!(topo.port_of("s1", "web").unwrap(), 3);
}

#[test]
fn suffix_parsing_contract() {
    assert_eq!(numeric_suffix("h12"), Some(12));
    assert_eq!(numeric_suffix("sw2x3"), Some(3));
    assert_eq!(numeric_suffix("core"), None);
    assert_eq!(numeric_suffix("h0"), Some(0));
    assert_eq!(numeric_suffix("h99999999999999999999"), None);
}
