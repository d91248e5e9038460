//! Multicast addresses and reference-counted group membership

use super::Port;
use crate::Result;
use std::collections::HashMap;
use std::net::Ipv6Addr;
use tracing::{debug, warn};

/// All-nodes link-local multicast (ff02::1)
pub const ALL_NODES: Ipv6Addr = Ipv6Addr::new(0xff02, 0, 0, 0, 0, 0, 0, 1);

/// All-routers link-local multicast (ff02::2)
pub const ALL_ROUTERS: Ipv6Addr = Ipv6Addr::new(0xff02, 0, 0, 0, 0, 0, 0, 2);

/// Solicited-node multicast address for `addr` (RFC 4291 Section 2.7.1)
pub fn solicited_node(addr: Ipv6Addr) -> Ipv6Addr {
    let o = addr.octets();
    Ipv6Addr::new(
        0xff02,
        0,
        0,
        0,
        0,
        1,
        0xff00 | o[13] as u16,
        u16::from_be_bytes([o[14], o[15]]),
    )
}

/// Groups joined on one port, counted so that addresses sharing a
/// solicited-node group only join and leave it once.
#[derive(Debug, Default)]
pub struct GroupMembership {
    groups: HashMap<Ipv6Addr, usize>,
}

impl GroupMembership {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take a reference on `group`, joining it on first use
    pub fn join<P: Port>(&mut self, port: &mut P, group: Ipv6Addr) -> Result<()> {
        if let Some(count) = self.groups.get_mut(&group) {
            *count += 1;
            return Ok(());
        }

        port.join_group(group)?;
        debug!("{}: joined {}", port.name(), group);
        self.groups.insert(group, 1);
        Ok(())
    }

    /// Drop a reference on `group`, leaving it when the last one goes
    pub fn leave<P: Port>(&mut self, port: &mut P, group: Ipv6Addr) -> Result<()> {
        let Some(count) = self.groups.get_mut(&group) else {
            return Ok(());
        };

        *count -= 1;
        if *count == 0 {
            self.groups.remove(&group);
            port.leave_group(group)?;
            debug!("{}: left {}", port.name(), group);
        }
        Ok(())
    }

    /// Leave every group still held. Failures are logged and skipped.
    pub fn leave_all<P: Port>(&mut self, port: &mut P) {
        for (group, _) in self.groups.drain() {
            if let Err(e) = port.leave_group(group) {
                warn!("{}: failed to leave {}: {}", port.name(), group, e);
            }
        }
    }

    pub fn contains(&self, group: &Ipv6Addr) -> bool {
        self.groups.contains_key(group)
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::port::RxInfo;
    use crate::Error;

    #[derive(Default)]
    struct RecordingPort {
        joined: Vec<Ipv6Addr>,
        left: Vec<Ipv6Addr>,
        fail_join: bool,
    }

    impl Port for RecordingPort {
        fn name(&self) -> &str {
            "test0"
        }

        async fn recv(&mut self, _buf: &mut [u8]) -> Result<RxInfo> {
            std::future::pending().await
        }

        async fn send(&mut self, buf: &[u8], _dst: Ipv6Addr) -> Result<usize> {
            Ok(buf.len())
        }

        fn join_group(&mut self, group: Ipv6Addr) -> Result<()> {
            if self.fail_join {
                return Err(Error::Io(std::io::Error::from_raw_os_error(libc::ENOBUFS)));
            }
            self.joined.push(group);
            Ok(())
        }

        fn leave_group(&mut self, group: Ipv6Addr) -> Result<()> {
            self.left.push(group);
            Ok(())
        }
    }

    #[test]
    fn test_solicited_node() {
        let addr: Ipv6Addr = "2001:db8::1:2345:6789".parse().unwrap();
        assert_eq!(
            solicited_node(addr),
            "ff02::1:ff45:6789".parse::<Ipv6Addr>().unwrap()
        );
        assert_eq!(
            solicited_node("fe80::5".parse().unwrap()),
            "ff02::1:ff00:5".parse::<Ipv6Addr>().unwrap()
        );
    }

    #[test]
    fn test_join_is_reference_counted() {
        let mut port = RecordingPort::default();
        let mut membership = GroupMembership::new();
        let group = solicited_node("2001:db8::5".parse().unwrap());

        membership.join(&mut port, group).unwrap();
        membership.join(&mut port, group).unwrap();
        assert_eq!(port.joined, vec![group]);

        membership.leave(&mut port, group).unwrap();
        assert!(port.left.is_empty());
        assert!(membership.contains(&group));

        membership.leave(&mut port, group).unwrap();
        assert_eq!(port.left, vec![group]);
        assert!(membership.is_empty());

        // Leaving a group never joined is a no-op
        membership.leave(&mut port, ALL_ROUTERS).unwrap();
        assert_eq!(port.left.len(), 1);
    }

    #[test]
    fn test_failed_join_not_recorded() {
        let mut port = RecordingPort {
            fail_join: true,
            ..Default::default()
        };
        let mut membership = GroupMembership::new();

        assert!(membership.join(&mut port, ALL_ROUTERS).is_err());
        assert!(!membership.contains(&ALL_ROUTERS));
    }

    #[test]
    fn test_leave_all_matches_joins() {
        let mut port = RecordingPort::default();
        let mut membership = GroupMembership::new();

        membership.join(&mut port, ALL_ROUTERS).unwrap();
        membership.join(&mut port, ALL_ROUTERS).unwrap();
        membership.join(&mut port, ALL_NODES).unwrap();
        membership.leave_all(&mut port);

        let mut left = port.left.clone();
        left.sort();
        let mut joined = port.joined.clone();
        joined.sort();
        assert_eq!(left, joined);
        assert!(membership.is_empty());
    }
}
