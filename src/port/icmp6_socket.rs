//! Raw ICMPv6 socket bound to one interface
//!
//! Used for sending and for multicast group membership. Reception goes
//! through [`super::PacketCapture`], so this socket filters out every
//! ICMPv6 type and never queues anything.

use crate::protocol::MacAddr;
use crate::{Error, Result};
use std::ffi::CString;
use std::io;
use std::mem;
use std::net::Ipv6Addr;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use tokio::io::unix::AsyncFd;

/// `ICMP6_FILTER` socket option (linux/icmpv6.h)
const ICMP6_FILTER: libc::c_int = 1;

/// Hop limit required on every ND message (RFC 4861 Section 6.1)
const ND_HOP_LIMIT: libc::c_int = 255;

/// Raw ICMPv6 socket wrapper
pub struct Icmp6Socket {
    async_fd: AsyncFd<OwnedFd>,
    name: String,
    ifindex: u32,
}

impl Icmp6Socket {
    /// Open a raw ICMPv6 socket bound to `ifname` for sending ND messages
    pub fn bind(ifname: &str) -> Result<Self> {
        let ifname_c = CString::new(ifname).map_err(|_| Error::InterfaceNotFound {
            name: ifname.to_string(),
        })?;

        let ifindex = unsafe { libc::if_nametoindex(ifname_c.as_ptr()) };
        if ifindex == 0 {
            return Err(Error::InterfaceNotFound {
                name: ifname.to_string(),
            });
        }

        let raw = unsafe {
            libc::socket(
                libc::AF_INET6,
                libc::SOCK_RAW | libc::SOCK_NONBLOCK | libc::SOCK_CLOEXEC,
                libc::IPPROTO_ICMPV6,
            )
        };
        if raw < 0 {
            return Err(Error::Io(io::Error::last_os_error()));
        }
        // From here on the descriptor is closed on every early return
        let fd = unsafe { OwnedFd::from_raw_fd(raw) };

        let name_bytes = ifname_c.as_bytes_with_nul();
        setsockopt_bytes(fd.as_raw_fd(), libc::SOL_SOCKET, libc::SO_BINDTODEVICE, name_bytes)?;

        setsockopt(fd.as_raw_fd(), libc::IPPROTO_IPV6, libc::IPV6_UNICAST_HOPS, &ND_HOP_LIMIT)?;
        setsockopt(fd.as_raw_fd(), libc::IPPROTO_IPV6, libc::IPV6_MULTICAST_HOPS, &ND_HOP_LIMIT)?;

        let off: libc::c_int = 0;
        setsockopt(fd.as_raw_fd(), libc::IPPROTO_IPV6, libc::IPV6_MULTICAST_LOOP, &off)?;

        let mcast_if = ifindex as libc::c_int;
        setsockopt(fd.as_raw_fd(), libc::IPPROTO_IPV6, libc::IPV6_MULTICAST_IF, &mcast_if)?;

        let filter = [u32::MAX; 8];
        setsockopt(fd.as_raw_fd(), libc::IPPROTO_ICMPV6, ICMP6_FILTER, &filter)?;

        let async_fd = AsyncFd::new(fd).map_err(Error::Io)?;

        Ok(Self {
            async_fd,
            name: ifname.to_string(),
            ifindex,
        })
    }

    pub fn ifindex(&self) -> u32 {
        self.ifindex
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn membership(&self, group: Ipv6Addr, optname: libc::c_int) -> Result<()> {
        let mreq = libc::ipv6_mreq {
            ipv6mr_multiaddr: libc::in6_addr {
                s6_addr: group.octets(),
            },
            ipv6mr_interface: self.ifindex as _,
        };
        setsockopt(self.async_fd.get_ref().as_raw_fd(), libc::IPPROTO_IPV6, optname, &mreq)
    }

    pub fn join_group(&self, group: Ipv6Addr) -> Result<()> {
        self.membership(group, libc::IPV6_ADD_MEMBERSHIP)
    }

    pub fn leave_group(&self, group: Ipv6Addr) -> Result<()> {
        self.membership(group, libc::IPV6_DROP_MEMBERSHIP)
    }

    /// Send a packet (async)
    pub async fn send(&mut self, buf: &[u8], dst: Ipv6Addr) -> Result<usize> {
        let addr = sockaddr_in6(dst, self.ifindex);
        loop {
            let mut guard = self.async_fd.writable().await.map_err(Error::Io)?;

            match guard.try_io(|inner| {
                let n = unsafe {
                    libc::sendto(
                        inner.get_ref().as_raw_fd(),
                        buf.as_ptr() as *const libc::c_void,
                        buf.len(),
                        0,
                        &addr as *const libc::sockaddr_in6 as *const libc::sockaddr,
                        mem::size_of::<libc::sockaddr_in6>() as libc::socklen_t,
                    )
                };
                if n < 0 {
                    Err(io::Error::last_os_error())
                } else {
                    Ok(n as usize)
                }
            }) {
                Ok(Ok(len)) => return Ok(len),
                Ok(Err(e)) => return Err(Error::Io(e)),
                Err(_would_block) => continue,
            }
        }
    }
}

impl AsRawFd for Icmp6Socket {
    fn as_raw_fd(&self) -> RawFd {
        self.async_fd.get_ref().as_raw_fd()
    }
}

/// Read the interface's MAC address from sysfs
pub fn interface_mac(ifname: &str) -> Result<MacAddr> {
    let path = format!("/sys/class/net/{}/address", ifname);
    let content = std::fs::read_to_string(&path).map_err(|_| Error::InterfaceNotFound {
        name: ifname.to_string(),
    })?;
    content
        .trim()
        .parse()
        .map_err(|e| Error::Config(format!("{}: bad link address {:?}: {}", ifname, content.trim(), e)))
}

fn sockaddr_in6(addr: Ipv6Addr, ifindex: u32) -> libc::sockaddr_in6 {
    let mut sa: libc::sockaddr_in6 = unsafe { mem::zeroed() };
    sa.sin6_family = libc::AF_INET6 as libc::sa_family_t;
    sa.sin6_addr = libc::in6_addr {
        s6_addr: addr.octets(),
    };
    sa.sin6_scope_id = ifindex;
    sa
}

fn setsockopt<T>(fd: RawFd, level: libc::c_int, name: libc::c_int, value: &T) -> Result<()> {
    let ret = unsafe {
        libc::setsockopt(
            fd,
            level,
            name,
            value as *const T as *const libc::c_void,
            mem::size_of::<T>() as libc::socklen_t,
        )
    };
    if ret < 0 {
        return Err(Error::Io(io::Error::last_os_error()));
    }
    Ok(())
}

fn setsockopt_bytes(fd: RawFd, level: libc::c_int, name: libc::c_int, value: &[u8]) -> Result<()> {
    let ret = unsafe {
        libc::setsockopt(
            fd,
            level,
            name,
            value.as_ptr() as *const libc::c_void,
            value.len() as libc::socklen_t,
        )
    };
    if ret < 0 {
        return Err(Error::Io(io::Error::last_os_error()));
    }
    Ok(())
}
