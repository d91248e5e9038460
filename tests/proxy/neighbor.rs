//! Neighbor Solicitation / Advertisement proxying
//!
//! Topology:
//! ```text
//!  host 2001:db8::10 ── lan0 ── ndproxy ── wan0 ── host 2001:db8::5
//! ```

use super::link::{proxy, settle, Proxy, LAN_MAC, WAN_MAC};
use super::{addr, advert, solicit, HOST_A, HOST_B};
use ndproxy::port::{solicited_node, ALL_NODES};
use ndproxy::protocol::{LinkAddr, NdMessage};
use std::time::Duration;

fn expect_ns(message: &NdMessage) -> &ndproxy::protocol::icmpv6::NeighborSolicitation {
    match message {
        NdMessage::NeighborSolicit(ns) => ns,
        other => panic!("expected NS, got {other}"),
    }
}

fn expect_na(message: &NdMessage) -> &ndproxy::protocol::icmpv6::NeighborAdvertisement {
    match message {
        NdMessage::NeighborAdvert(na) => na,
        other => panic!("expected NA, got {other}"),
    }
}

/// LAN asks, WAN answers, the proxy learns; the answer is forgotten once
/// the aging time has passed.
#[tokio::test(start_paused = true)]
async fn test_ns_relayed_answer_learned_then_aged_out() {
    let Proxy {
        mut dispatcher,
        mut lan,
        mut wan,
        clock,
        stats,
        lifecycle,
    } = proxy(3);

    let scenario = async {
        lan.inject(
            &solicit("2001:db8::5", Some(HOST_A)),
            "2001:db8::10",
            "ff02::1:ff00:5",
        );

        let (message, dst) = wan.next_sent().await;
        let ns = expect_ns(&message);
        assert_eq!(dst, addr("ff02::1:ff00:5"));
        assert_eq!(ns.target_addr, addr("2001:db8::5"));
        assert_eq!(ns.source_link_addr(), Some(&LinkAddr::from(WAN_MAC)));

        wan.inject(
            &advert("2001:db8::5", Some(HOST_B), false, true),
            "2001:db8::5",
            "fe80::1",
        );

        let (message, dst) = lan.next_sent().await;
        let na = expect_na(&message);
        assert_eq!(dst, addr("2001:db8::10"));
        assert_eq!(na.target_addr, addr("2001:db8::5"));
        assert_eq!(na.target_link_addr(), Some(&LinkAddr::from(LAN_MAC)));
        assert!(na.solicited_flag);
        assert!(!na.override_flag);
        assert!(wan.is_quiet(), "the raw NA must not cross over");

        // Known now: answered without bothering the WAN side
        lan.inject(
            &solicit("2001:db8::5", Some(HOST_A)),
            "2001:db8::10",
            "ff02::1:ff00:5",
        );
        let (message, dst) = lan.next_sent().await;
        assert_eq!(dst, addr("2001:db8::10"));
        assert_eq!(expect_na(&message).target_addr, addr("2001:db8::5"));
        settle().await;
        assert!(wan.is_quiet());

        // Past the 3 s aging time the target is unknown again
        clock.advance(Duration::from_secs(5));
        lan.inject(
            &solicit("2001:db8::5", Some(HOST_A)),
            "2001:db8::10",
            "ff02::1:ff00:5",
        );
        let (message, _) = wan.next_sent().await;
        assert_eq!(expect_ns(&message).target_addr, addr("2001:db8::5"));

        lifecycle.request_shutdown();
    };

    let (result, ()) = tokio::join!(dispatcher.run(&lifecycle), scenario);
    result.unwrap();

    assert_eq!(stats.relayed_solicitations.get(), 2);
    assert_eq!(stats.synthesized_adverts.get(), 1);
    assert_eq!(stats.proxied_answers.get(), 1);
    assert!(wan.joined().contains(&solicited_node(addr("2001:db8::10"))));
    assert!(lan.joined().contains(&solicited_node(addr("2001:db8::5"))));
}

/// A target that lives on the asking side is never answered or relayed
#[tokio::test(start_paused = true)]
async fn test_same_side_target_not_echoed() {
    let Proxy {
        mut dispatcher,
        mut lan,
        mut wan,
        lifecycle,
        ..
    } = proxy(300);

    let scenario = async {
        lan.inject(
            &advert("2001:db8::7", Some(HOST_B), false, false),
            "2001:db8::7",
            "ff02::1",
        );
        lan.inject(
            &solicit("2001:db8::7", Some(HOST_A)),
            "2001:db8::10",
            "ff02::1:ff00:7",
        );
        settle().await;

        assert!(lan.is_quiet());
        assert!(wan.is_quiet());
        lifecycle.request_shutdown();
    };

    let (result, ()) = tokio::join!(dispatcher.run(&lifecycle), scenario);
    result.unwrap();
}

/// After a target moves from LAN to WAN, a LAN solicitation for it is
/// answered by the proxy from the WAN-side entry.
#[tokio::test(start_paused = true)]
async fn test_rehomed_target_answered_from_new_side() {
    let Proxy {
        mut dispatcher,
        mut lan,
        mut wan,
        stats,
        lifecycle,
        ..
    } = proxy(300);

    let scenario = async {
        lan.inject(
            &advert("2001:db8::5", Some(HOST_B), false, false),
            "2001:db8::5",
            "ff02::1",
        );
        wan.inject(
            &advert("2001:db8::5", Some(HOST_B), false, false),
            "2001:db8::5",
            "ff02::1",
        );
        settle().await;

        lan.inject(
            &solicit("2001:db8::5", Some(HOST_A)),
            "2001:db8::10",
            "ff02::1:ff00:5",
        );
        let (message, dst) = lan.next_sent().await;
        let na = expect_na(&message);
        assert_eq!(dst, addr("2001:db8::10"));
        assert_eq!(na.target_addr, addr("2001:db8::5"));
        assert_eq!(na.target_link_addr(), Some(&LinkAddr::from(LAN_MAC)));
        assert!(na.solicited_flag);

        settle().await;
        assert!(lan.is_quiet());
        assert!(wan.is_quiet());
        lifecycle.request_shutdown();
    };

    let (result, ()) = tokio::join!(dispatcher.run(&lifecycle), scenario);
    result.unwrap();

    assert_eq!(stats.fdb_rehomes.get(), 1);
    assert_eq!(stats.proxied_answers.get(), 1);
    assert_eq!(stats.relayed_solicitations.get(), 0);
}

/// Duplicate address detection from the LAN is answered to all-nodes
#[tokio::test(start_paused = true)]
async fn test_dad_for_wan_address_defended() {
    let Proxy {
        mut dispatcher,
        mut lan,
        wan,
        lifecycle,
        ..
    } = proxy(300);

    let scenario = async {
        wan.inject(
            &advert("2001:db8::5", Some(HOST_B), true, false),
            "2001:db8::5",
            "ff02::1",
        );
        lan.inject(&solicit("2001:db8::5", None), "::", "ff02::1:ff00:5");

        let (message, dst) = lan.next_sent().await;
        let na = expect_na(&message);
        assert_eq!(dst, ALL_NODES);
        assert!(!na.solicited_flag);
        assert!(na.router_flag);
        assert_eq!(na.target_link_addr(), Some(&LinkAddr::from(LAN_MAC)));

        lifecycle.request_shutdown();
    };

    let (result, ()) = tokio::join!(dispatcher.run(&lifecycle), scenario);
    result.unwrap();
}

/// Two hosts waiting on the same target get one unsolicited answer
#[tokio::test(start_paused = true)]
async fn test_several_requesters_answered_once() {
    let Proxy {
        mut dispatcher,
        mut lan,
        mut wan,
        lifecycle,
        ..
    } = proxy(300);

    let scenario = async {
        for host in ["2001:db8::10", "2001:db8::11"] {
            lan.inject(&solicit("2001:db8::5", Some(HOST_A)), host, "ff02::1:ff00:5");
            wan.next_sent().await;
        }

        wan.inject(
            &advert("2001:db8::5", Some(HOST_B), false, true),
            "2001:db8::5",
            "fe80::1",
        );

        let (message, dst) = lan.next_sent().await;
        assert_eq!(dst, ALL_NODES);
        assert!(!expect_na(&message).solicited_flag);
        settle().await;
        assert!(lan.is_quiet());

        lifecycle.request_shutdown();
    };

    let (result, ()) = tokio::join!(dispatcher.run(&lifecycle), scenario);
    result.unwrap();
}

/// A host that moves sides takes its solicited-node group with it
#[tokio::test(start_paused = true)]
async fn test_rehome_moves_solicited_node_group() {
    let Proxy {
        mut dispatcher,
        lan,
        wan,
        stats,
        lifecycle,
        ..
    } = proxy(300);
    let group = solicited_node(addr("2001:db8::5"));

    let scenario = async {
        wan.inject(
            &advert("2001:db8::5", Some(HOST_B), false, false),
            "2001:db8::5",
            "ff02::1",
        );
        settle().await;
        assert!(lan.held().contains(&group));
        assert!(!wan.held().contains(&group));

        lan.inject(
            &advert("2001:db8::5", Some(HOST_B), false, false),
            "2001:db8::5",
            "ff02::1",
        );
        settle().await;
        assert!(!lan.held().contains(&group));
        assert!(wan.held().contains(&group));

        lifecycle.request_shutdown();
    };

    let (result, ()) = tokio::join!(dispatcher.run(&lifecycle), scenario);
    result.unwrap();

    assert_eq!(stats.fdb_rehomes.get(), 1);
    let entry = dispatcher.relay().fdb().lookup(&addr("2001:db8::5")).unwrap();
    assert_eq!(entry.origin, ndproxy::port::PortId::Lan);
}
