//! Fragmenting UDP sender.
//!
//! Splits each NAL into `MAX_PAYLOAD`-sized slices and emits one
//! headered datagram per slice, in fragment-index order. Sending is
//! best-effort and never blocks the encoder: a failed datagram is
//! dropped and the failure is logged once per sender.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU16, AtomicU64, Ordering};
use std::sync::Arc;

use tokio::net::UdpSocket;
use tracing::{debug, warn};

use crate::packet::{PacketHeader, FLAG_END, FLAG_KEYFRAME, FLAG_START, MAX_PAYLOAD};
use crate::transport::{dual_stack_dest, NalUnit};

// ── MediaSender ──────────────────────────────────────────────────

/// Per-peer fragmenting sender for one media flow.
pub struct MediaSender {
    socket: Arc<UdpSocket>,
    dest: SocketAddr,
    sequence: AtomicU16,
    datagrams_sent: AtomicU64,
    send_failure_logged: AtomicBool,
}

impl MediaSender {
    /// Wrap an already-bound socket targeting `dest`.
    pub fn new(socket: Arc<UdpSocket>, dest: SocketAddr) -> Self {
        Self {
            socket,
            dest: dual_stack_dest(dest),
            sequence: AtomicU16::new(0),
            datagrams_sent: AtomicU64::new(0),
            send_failure_logged: AtomicBool::new(false),
        }
    }

    /// Fragment and send one NAL.
    ///
    /// Produces `ceil(len / MAX_PAYLOAD)` datagrams (at least one, so a
    /// zero-length NAL still travels). The keyframe flag is replicated
    /// on every fragment; the first fragment carries `start`, the last
    /// carries `end`.
    pub fn send(&self, nal: &NalUnit) {
        let fragment_count = nal.data.len().div_ceil(MAX_PAYLOAD).max(1);
        debug_assert!(fragment_count <= u16::MAX as usize);

        let mut buf = Vec::with_capacity(PacketHeader::SIZE + MAX_PAYLOAD);
        for index in 0..fragment_count {
            let lo = index * MAX_PAYLOAD;
            let hi = (lo + MAX_PAYLOAD).min(nal.data.len());

            let mut flags = 0u8;
            if nal.is_keyframe {
                flags |= FLAG_KEYFRAME;
            }
            if index == 0 {
                flags |= FLAG_START;
            }
            if index == fragment_count - 1 {
                flags |= FLAG_END;
            }

            let header = PacketHeader {
                sequence: self.sequence.fetch_add(1, Ordering::Relaxed),
                timestamp: nal.timestamp,
                flags,
                fragment_index: index as u16,
                fragment_count: fragment_count as u16,
            };

            buf.clear();
            buf.extend_from_slice(&header.encode());
            buf.extend_from_slice(&nal.data[lo..hi]);

            match self.socket.try_send_to(&buf, self.dest) {
                Ok(_) => {
                    self.datagrams_sent.fetch_add(1, Ordering::Relaxed);
                }
                Err(e) => {
                    // Best effort: drop the datagram, keep the session.
                    if !self.send_failure_logged.swap(true, Ordering::Relaxed) {
                        warn!("udp send to {} failed: {e}", self.dest);
                    } else {
                        debug!("udp send to {} failed: {e}", self.dest);
                    }
                }
            }
        }
    }

    /// Total datagrams put on the wire.
    pub fn datagrams_sent(&self) -> u64 {
        self.datagrams_sent.load(Ordering::Relaxed)
    }

    /// The destination this sender targets.
    pub fn dest(&self) -> SocketAddr {
        self.dest
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::bind_media_socket;

    async fn sender_to(dest: SocketAddr) -> MediaSender {
        let socket = UdpSocket::from_std(bind_media_socket(0).unwrap()).unwrap();
        MediaSender::new(Arc::new(socket), dest)
    }

    async fn recv_datagram(socket: &UdpSocket) -> Vec<u8> {
        let mut buf = vec![0u8; 2048];
        let (n, _) = tokio::time::timeout(std::time::Duration::from_secs(5), socket.recv_from(&mut buf))
            .await
            .expect("timeout")
            .expect("recv failed");
        buf.truncate(n);
        buf
    }

    #[tokio::test]
    async fn single_fragment_sets_start_and_end() {
        let receiver = UdpSocket::from_std(bind_media_socket(0).unwrap()).unwrap();
        let dest = ("127.0.0.1".parse::<std::net::IpAddr>().unwrap(), receiver.local_addr().unwrap().port()).into();
        let sender = sender_to(dest).await;

        sender.send(&NalUnit::new(vec![0xAA; 100], true, 42));

        let datagram = recv_datagram(&receiver).await;
        let header = PacketHeader::decode(&datagram).unwrap();
        assert_eq!(header.flags, FLAG_KEYFRAME | FLAG_START | FLAG_END);
        assert_eq!(header.flags, 0x07);
        assert_eq!(header.fragment_index, 0);
        assert_eq!(header.fragment_count, 1);
        assert_eq!(header.timestamp, 42);
        assert_eq!(&datagram[PacketHeader::SIZE..], &[0xAA; 100][..]);
    }

    #[tokio::test]
    async fn three_kilobyte_nal_fragments_into_three() {
        let receiver = UdpSocket::from_std(bind_media_socket(0).unwrap()).unwrap();
        let dest = ("127.0.0.1".parse::<std::net::IpAddr>().unwrap(), receiver.local_addr().unwrap().port()).into();
        let sender = sender_to(dest).await;

        let payload: Vec<u8> = (0..3000u32).map(|i| i as u8).collect();
        sender.send(&NalUnit::new(payload.clone(), false, 7));

        let mut flags = Vec::new();
        let mut rebuilt = Vec::new();
        for i in 0..3u16 {
            let datagram = recv_datagram(&receiver).await;
            let header = PacketHeader::decode(&datagram).unwrap();
            assert_eq!(header.fragment_index, i);
            assert_eq!(header.fragment_count, 3);
            flags.push(header.flags);
            rebuilt.extend_from_slice(&datagram[PacketHeader::SIZE..]);
        }
        assert_eq!(flags, vec![FLAG_START, 0, FLAG_END]);
        assert_eq!(rebuilt, payload);
        assert_eq!(sender.datagrams_sent(), 3);
    }

    #[tokio::test]
    async fn keyframe_flag_replicated_on_every_fragment() {
        let receiver = UdpSocket::from_std(bind_media_socket(0).unwrap()).unwrap();
        let dest = ("127.0.0.1".parse::<std::net::IpAddr>().unwrap(), receiver.local_addr().unwrap().port()).into();
        let sender = sender_to(dest).await;

        sender.send(&NalUnit::new(vec![1u8; MAX_PAYLOAD * 2 + 1], true, 9));

        let expected = [
            FLAG_KEYFRAME | FLAG_START,
            FLAG_KEYFRAME,
            FLAG_KEYFRAME | FLAG_END,
        ];
        for want in expected {
            let datagram = recv_datagram(&receiver).await;
            assert_eq!(PacketHeader::decode(&datagram).unwrap().flags, want);
        }
    }

    #[tokio::test]
    async fn sequence_wraps() {
        let receiver = UdpSocket::from_std(bind_media_socket(0).unwrap()).unwrap();
        let dest = ("127.0.0.1".parse::<std::net::IpAddr>().unwrap(), receiver.local_addr().unwrap().port()).into();
        let sender = sender_to(dest).await;
        sender.sequence.store(u16::MAX, Ordering::Relaxed);

        sender.send(&NalUnit::new(vec![1], false, 1));
        sender.send(&NalUnit::new(vec![2], false, 2));

        let first = PacketHeader::decode(&recv_datagram(&receiver).await).unwrap();
        let second = PacketHeader::decode(&recv_datagram(&receiver).await).unwrap();
        assert_eq!(first.sequence, u16::MAX);
        assert_eq!(second.sequence, 0);
    }
}
