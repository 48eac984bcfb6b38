//! UDP media transport.
//!
//! NAL-sized payloads are fragmented into headered datagrams on the
//! sending side and reassembled on the receiving side. Video and audio
//! run as independent flows on separate ports; audio payloads always
//! fit a single fragment and use a packet counter in the timestamp
//! field instead of the 90 kHz clock.
//!
//! There is no retransmission, no acknowledgement and no back-pressure
//! in the hot path: losses on the LAN are absorbed by the receiver-side
//! keyframe-request policy.

mod reassembly;
mod receiver;
mod sender;

pub use reassembly::Reassembler;
pub use receiver::MediaReceiver;
pub use sender::MediaSender;

use std::io;
use std::net::{Ipv6Addr, SocketAddr};

use socket2::{Domain, Protocol, Socket, Type};

// ── NalUnit ──────────────────────────────────────────────────────

/// One transport unit: an encoded NAL (or one AAC packet) with its
/// keyframe flag and timestamp.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NalUnit {
    /// Opaque payload bytes (no framing, no start codes).
    pub data: Vec<u8>,
    /// True for SPS, PPS and IDR slices; always false for audio.
    pub is_keyframe: bool,
    /// 90 kHz presentation clock for video, monotonic counter for audio.
    pub timestamp: u32,
}

impl NalUnit {
    pub fn new(data: Vec<u8>, is_keyframe: bool, timestamp: u32) -> Self {
        Self {
            data,
            is_keyframe,
            timestamp,
        }
    }
}

// ── Socket construction ──────────────────────────────────────────

/// Bind a dual-stack, non-blocking UDP socket on `port` (0 for a
/// system-chosen port). Accepts both IPv4 and IPv6 datagrams.
pub fn bind_media_socket(port: u16) -> io::Result<std::net::UdpSocket> {
    let socket = Socket::new(Domain::IPV6, Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_only_v6(false)?;
    #[cfg(unix)]
    socket.set_reuse_port(true)?;
    socket.set_nonblocking(true)?;
    let addr: SocketAddr = (Ipv6Addr::UNSPECIFIED, port).into();
    socket.bind(&addr.into())?;
    Ok(socket.into())
}

/// Map an IPv4 destination into the IPv6 space so it can be reached
/// through the dual-stack socket.
pub(crate) fn dual_stack_dest(dest: SocketAddr) -> SocketAddr {
    match dest {
        SocketAddr::V4(v4) => SocketAddr::new(v4.ip().to_ipv6_mapped().into(), v4.port()),
        v6 => v6,
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn media_socket_binds_ephemeral() {
        let socket = bind_media_socket(0).unwrap();
        assert_ne!(socket.local_addr().unwrap().port(), 0);
    }

    #[test]
    fn v4_destinations_are_mapped() {
        let dest: SocketAddr = "192.168.1.9:5000".parse().unwrap();
        let mapped = dual_stack_dest(dest);
        assert!(mapped.is_ipv6());
        assert_eq!(mapped.port(), 5000);

        let v6: SocketAddr = "[fe80::1]:5000".parse().unwrap();
        assert_eq!(dual_stack_dest(v6), v6);
    }
}
