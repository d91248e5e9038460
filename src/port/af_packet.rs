//! AF_PACKET capture of inbound Neighbor Discovery
//!
//! The kernel only hands multicast to IPv6 sockets for groups joined on
//! the device, and solicitations for hosts on the other side go to
//! solicited-node groups nobody here has joined yet. Capturing at the
//! link layer with all-multicast reception sees them regardless.

use super::RxInfo;
use crate::{Error, Result};
use std::io;
use std::mem;
use std::net::Ipv6Addr;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use tokio::io::unix::AsyncFd;

/// Fixed IPv6 header
pub const IPV6_HEADER_SIZE: usize = 40;

const IPPROTO_ICMPV6: u8 = 58;

/// Packet sent by this host (linux/if_packet.h)
const PACKET_OUTGOING: u8 = 4;

// Classic BPF opcodes (linux/filter.h)
const BPF_LD_B_ABS: u16 = 0x30;
const BPF_JEQ_K: u16 = 0x15;
const BPF_JGE_K: u16 = 0x35;
const BPF_JGT_K: u16 = 0x25;
const BPF_RET_K: u16 = 0x06;

/// Accept IPv6 packets whose next header is ICMPv6 and whose ICMPv6
/// type is RS, RA, NS or NA. Offsets are from the network header since
/// the socket is SOCK_DGRAM.
fn nd_filter() -> [libc::sock_filter; 7] {
    let op = |code, jt, jf, k| libc::sock_filter { code, jt, jf, k };
    [
        op(BPF_LD_B_ABS, 0, 0, 6),
        op(BPF_JEQ_K, 0, 4, IPPROTO_ICMPV6 as u32),
        op(BPF_LD_B_ABS, 0, 0, IPV6_HEADER_SIZE as u32),
        op(BPF_JGE_K, 0, 2, 133),
        op(BPF_JGT_K, 1, 0, 136),
        op(BPF_RET_K, 0, 0, 0xffff),
        op(BPF_RET_K, 0, 0, 0),
    ]
}

/// Link-layer capture of ND messages arriving on one interface
pub struct PacketCapture {
    async_fd: AsyncFd<OwnedFd>,
    ifindex: i32,
}

impl PacketCapture {
    /// Open a cooked AF_PACKET socket for IPv6 on `ifindex` with
    /// all-multicast reception enabled
    pub fn bind(ifindex: u32) -> Result<Self> {
        let protocol = (libc::ETH_P_IPV6 as u16).to_be();
        let raw = unsafe {
            libc::socket(
                libc::AF_PACKET,
                libc::SOCK_DGRAM | libc::SOCK_NONBLOCK | libc::SOCK_CLOEXEC,
                protocol as i32,
            )
        };
        if raw < 0 {
            return Err(Error::Io(io::Error::last_os_error()));
        }
        let fd = unsafe { OwnedFd::from_raw_fd(raw) };
        let ifindex = ifindex as i32;

        // Filter before bind so nothing else is queued
        let mut filter = nd_filter();
        let prog = libc::sock_fprog {
            len: filter.len() as u16,
            filter: filter.as_mut_ptr(),
        };
        setsockopt(fd.as_raw_fd(), libc::SOL_SOCKET, libc::SO_ATTACH_FILTER, &prog)?;

        let sockaddr = libc::sockaddr_ll {
            sll_family: libc::AF_PACKET as u16,
            sll_protocol: protocol,
            sll_ifindex: ifindex,
            sll_hatype: 0,
            sll_pkttype: 0,
            sll_halen: 0,
            sll_addr: [0; 8],
        };
        let ret = unsafe {
            libc::bind(
                fd.as_raw_fd(),
                &sockaddr as *const _ as *const libc::sockaddr,
                mem::size_of::<libc::sockaddr_ll>() as libc::socklen_t,
            )
        };
        if ret < 0 {
            return Err(Error::Io(io::Error::last_os_error()));
        }

        set_allmulti(fd.as_raw_fd(), ifindex, true)?;

        let async_fd = AsyncFd::new(fd).map_err(Error::Io)?;
        Ok(Self { async_fd, ifindex })
    }

    /// Receive one ND message. The IPv6 header is stripped from `buf`
    /// and its addresses and hop limit returned.
    pub async fn recv(&mut self, buf: &mut [u8]) -> Result<RxInfo> {
        loop {
            let mut guard = self.async_fd.readable_mut().await.map_err(Error::Io)?;

            let received = guard.try_io(|inner| recv_from(inner.get_ref().as_raw_fd(), buf));
            let (len, pkttype) = match received {
                Ok(Ok(frame)) => frame,
                Ok(Err(e)) if e.kind() == io::ErrorKind::Interrupted => continue,
                Ok(Err(e)) => return Err(Error::Io(e)),
                Err(_would_block) => continue,
            };

            // Our own transmissions are looped back to packet sockets
            if pkttype == PACKET_OUTGOING {
                continue;
            }
            match strip_ipv6_header(buf, len) {
                Some(info) => return Ok(info),
                None => continue,
            }
        }
    }
}

impl AsRawFd for PacketCapture {
    fn as_raw_fd(&self) -> RawFd {
        self.async_fd.get_ref().as_raw_fd()
    }
}

impl Drop for PacketCapture {
    fn drop(&mut self) {
        let _ = set_allmulti(self.as_raw_fd(), self.ifindex, false);
    }
}

fn set_allmulti(fd: RawFd, ifindex: i32, enable: bool) -> Result<()> {
    let mreq = libc::packet_mreq {
        mr_ifindex: ifindex,
        mr_type: libc::PACKET_MR_ALLMULTI as u16,
        mr_alen: 0,
        mr_address: [0; 8],
    };
    let optname = if enable {
        libc::PACKET_ADD_MEMBERSHIP
    } else {
        libc::PACKET_DROP_MEMBERSHIP
    };
    setsockopt(fd, libc::SOL_PACKET, optname, &mreq)
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

/// recvfrom(2) returning the length and the packet type of the frame
fn recv_from(fd: RawFd, buf: &mut [u8]) -> io::Result<(usize, u8)> {
    let mut from: libc::sockaddr_ll = unsafe { mem::zeroed() };
    let mut from_len = mem::size_of::<libc::sockaddr_ll>() as libc::socklen_t;
    let n = unsafe {
        libc::recvfrom(
            fd,
            buf.as_mut_ptr() as *mut libc::c_void,
            buf.len(),
            0,
            &mut from as *mut libc::sockaddr_ll as *mut libc::sockaddr,
            &mut from_len,
        )
    };
    if n < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok((n as usize, from.sll_pkttype))
}

/// Parse the IPv6 header at the start of `buf[..len]` and move the
/// ICMPv6 payload to the front.
///
/// Returns `None` for anything that is not an IPv6 packet carrying
/// ICMPv6 directly. Link-layer padding past the payload length is cut.
pub fn strip_ipv6_header(buf: &mut [u8], len: usize) -> Option<RxInfo> {
    let len = len.min(buf.len());
    if len < IPV6_HEADER_SIZE || buf[0] >> 4 != 6 || buf[6] != IPPROTO_ICMPV6 {
        return None;
    }

    let payload_len = u16::from_be_bytes([buf[4], buf[5]]) as usize;
    let payload_len = payload_len.min(len - IPV6_HEADER_SIZE);
    let hop_limit = buf[7];

    let mut src = [0u8; 16];
    let mut dst = [0u8; 16];
    src.copy_from_slice(&buf[8..24]);
    dst.copy_from_slice(&buf[24..40]);

    buf.copy_within(IPV6_HEADER_SIZE..IPV6_HEADER_SIZE + payload_len, 0);

    Some(RxInfo {
        len: payload_len,
        src: Ipv6Addr::from(src),
        dst: Ipv6Addr::from(dst),
        hop_limit: Some(hop_limit),
    })
}
