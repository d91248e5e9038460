//! Proxy tests over in-memory links
//!
//! Run with: cargo test --test proxy

mod link;
mod neighbor;
mod router_discovery;

use link::{proxy, settle, Proxy};
use ndproxy::port::{solicited_node, ALL_ROUTERS};
use ndproxy::protocol::icmpv6::{NeighborAdvertisement, NeighborSolicitation};
use ndproxy::protocol::{LinkAddr, MacAddr, NdMessage};
use std::net::Ipv6Addr;

pub const HOST_A: MacAddr = MacAddr([0x00, 0x11, 0x22, 0x33, 0x44, 0x55]);
pub const HOST_B: MacAddr = MacAddr([0x00, 0xaa, 0xbb, 0xcc, 0xdd, 0xee]);

pub fn addr(s: &str) -> Ipv6Addr {
    s.parse().unwrap()
}

pub fn solicit(target: &str, sll: Option<MacAddr>) -> NdMessage {
    NdMessage::NeighborSolicit(NeighborSolicitation::new(
        addr(target),
        sll.map(LinkAddr::from),
    ))
}

pub fn advert(target: &str, tll: Option<MacAddr>, router: bool, solicited: bool) -> NdMessage {
    NdMessage::NeighborAdvert(NeighborAdvertisement::new(
        addr(target),
        tll.map(LinkAddr::from),
        router,
        solicited,
        true,
    ))
}

/// Shutdown leaves exactly the groups that were joined
#[tokio::test(start_paused = true)]
async fn test_shutdown_leaves_every_group() {
    let Proxy {
        mut dispatcher,
        lan,
        wan,
        lifecycle,
        ..
    } = proxy(300);

    let scenario = async {
        lan.inject(
            &solicit("2001:db8::5", Some(HOST_A)),
            "2001:db8::10",
            "ff02::1:ff00:5",
        );
        wan.inject(
            &advert("2001:db8::6", Some(HOST_B), false, false),
            "2001:db8::6",
            "ff02::1",
        );
        settle().await;
        assert!(lifecycle.is_running());
        lifecycle.request_shutdown();
    };

    let (result, ()) = tokio::join!(dispatcher.run(&lifecycle), scenario);
    result.unwrap();
    assert!(!lifecycle.is_running());

    assert!(lan.joined().contains(&ALL_ROUTERS));
    assert!(lan.joined().contains(&solicited_node(addr("2001:db8::6"))));
    assert!(wan.joined().contains(&ALL_ROUTERS));
    assert!(wan.joined().contains(&solicited_node(addr("2001:db8::10"))));

    assert!(lan.held().is_empty(), "lan still holds {:?}", lan.held());
    assert!(wan.held().is_empty(), "wan still holds {:?}", wan.held());

    let mut joined = lan.joined();
    let mut left = lan.left();
    joined.sort();
    left.sort();
    assert_eq!(joined, left);
}

/// A port that goes away ends the run with a fatal error
#[tokio::test(start_paused = true)]
async fn test_closed_port_is_fatal() {
    let Proxy {
        mut dispatcher,
        mut lan,
        wan,
        lifecycle,
        ..
    } = proxy(300);

    let scenario = async {
        settle().await;
        lan.close();
    };

    let (result, ()) = tokio::join!(dispatcher.run(&lifecycle), scenario);
    let err = result.unwrap_err();
    assert!(err.is_fatal(), "unexpected error: {err}");
    assert!(!lifecycle.is_running());
    assert!(wan.held().is_empty());
}

/// Packets that fail hop-limit or decode checks change nothing
#[tokio::test(start_paused = true)]
async fn test_invalid_packets_dropped() {
    let Proxy {
        mut dispatcher,
        mut lan,
        mut wan,
        stats,
        lifecycle,
        ..
    } = proxy(300);

    let scenario = async {
        // Forwarded by a router: hop limit below 255
        let ns = solicit("2001:db8::5", Some(HOST_A)).encode().unwrap();
        lan.inject_raw(&ns, "2001:db8::10", "ff02::1:ff00:5", 254);

        // Source link-layer option with length 0
        let mut malformed = ns.clone();
        malformed[25] = 0;
        lan.inject_raw(&malformed, "2001:db8::10", "ff02::1:ff00:5", 255);

        // Too short for an NA
        wan.inject_raw(&[136, 0, 0, 0, 0, 0], "2001:db8::5", "ff02::1", 255);

        settle().await;
        assert!(lan.is_quiet());
        assert!(wan.is_quiet());
        lifecycle.request_shutdown();
    };

    let (result, ()) = tokio::join!(dispatcher.run(&lifecycle), scenario);
    result.unwrap();

    assert!(dispatcher.relay().fdb().is_empty());
    assert_eq!(stats.hop_limit_drops.get(), 1);
    assert_eq!(stats.decode_errors.get(), 2);
    assert_eq!(stats.ports.lan.rx_packets.get(), 2);
    assert_eq!(stats.ports.lan.rx_drops.get(), 2);
}
