//! Router Solicitation / Advertisement relaying

use super::link::{proxy, settle, Proxy, LAN_MAC, WAN_MAC};
use super::{addr, HOST_A};
use ndproxy::port::{ALL_NODES, ALL_ROUTERS};
use ndproxy::protocol::icmpv6::{
    RouterAdvertisement, RouterSolicitation, RA_FLAG_OTHER, RA_FLAG_PROXY,
};
use ndproxy::protocol::{LinkAddr, NdMessage, NdOption};

fn router_advert() -> NdMessage {
    NdMessage::RouterAdvert(RouterAdvertisement {
        cur_hop_limit: 64,
        flags: RA_FLAG_OTHER,
        router_lifetime: 1800,
        reachable_time: 0,
        retrans_timer: 0,
        options: vec![
            NdOption::SourceLinkAddr(HOST_A.into()),
            // MTU option, carried through untouched
            NdOption::Unknown {
                kind: 5,
                data: vec![0, 0, 0, 0, 0x05, 0xdc],
            },
        ],
    })
}

fn router_solicit() -> NdMessage {
    NdMessage::RouterSolicit(RouterSolicitation {
        options: vec![NdOption::SourceLinkAddr(HOST_A.into())],
    })
}

#[tokio::test(start_paused = true)]
async fn test_ra_relayed_to_lan_with_proxy_flag() {
    let Proxy {
        mut dispatcher,
        mut lan,
        wan,
        stats,
        lifecycle,
        ..
    } = proxy(300);

    let scenario = async {
        wan.inject(&router_advert(), "fe80::1", "ff02::1");

        let (message, dst) = lan.next_sent().await;
        assert_eq!(dst, ALL_NODES);
        let NdMessage::RouterAdvert(ra) = message else {
            panic!("expected RA, got {message}");
        };
        assert_eq!(ra.flags, RA_FLAG_OTHER | RA_FLAG_PROXY);
        assert_eq!(ra.router_lifetime, 1800);
        assert_eq!(ra.source_link_addr(), Some(&LinkAddr::from(LAN_MAC)));
        assert!(ra.options.iter().any(|o| o.kind() == 5));

        lifecycle.request_shutdown();
    };

    let (result, ()) = tokio::join!(dispatcher.run(&lifecycle), scenario);
    result.unwrap();
    assert_eq!(stats.router_discovery_relays.get(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_rs_relayed_to_wan_only() {
    let Proxy {
        mut dispatcher,
        mut lan,
        mut wan,
        lifecycle,
        ..
    } = proxy(300);

    let scenario = async {
        lan.inject(&router_solicit(), "fe80::10", "ff02::2");

        let (message, dst) = wan.next_sent().await;
        assert_eq!(dst, ALL_ROUTERS);
        let NdMessage::RouterSolicit(rs) = message else {
            panic!("expected RS, got {message}");
        };
        assert_eq!(rs.source_link_addr(), Some(&LinkAddr::from(WAN_MAC)));

        // Solicitations from the WAN side and advertisements from the LAN
        // side stay where they are
        wan.inject(&router_solicit(), "fe80::20", "ff02::2");
        lan.inject(&router_advert(), "fe80::30", "ff02::1");
        settle().await;
        assert!(lan.is_quiet());
        assert!(wan.is_quiet());

        lifecycle.request_shutdown();
    };

    let (result, ()) = tokio::join!(dispatcher.run(&lifecycle), scenario);
    result.unwrap();

    // Router discovery never teaches the table anything
    assert!(dispatcher.relay().fdb().lookup(&addr("fe80::10")).is_none());
}
