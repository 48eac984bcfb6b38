//! UDP receive loop.
//!
//! Each media flow gets its own socket and its own loop on a dedicated
//! task; the reassembler is owned by that task, so no locking. `stop`
//! cancels the loop and joins it, guaranteeing no further NALs are
//! emitted afterwards.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::BeamError;
use crate::transport::{bind_media_socket, NalUnit, Reassembler};

// ── MediaReceiver ────────────────────────────────────────────────

/// Background receiver for one media flow.
pub struct MediaReceiver {
    local_port: u16,
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
    packets_received: Arc<AtomicU64>,
}

impl MediaReceiver {
    /// Bind `port` (0 for system-chosen) and start the receive loop.
    /// Complete NALs are pushed into `sink` in completion order.
    pub fn bind(
        port: u16,
        gc_window: u32,
        sink: mpsc::Sender<NalUnit>,
    ) -> Result<Self, BeamError> {
        let socket = UdpSocket::from_std(bind_media_socket(port)?)?;
        let local_port = socket.local_addr()?.port();

        let cancel = CancellationToken::new();
        let packets_received = Arc::new(AtomicU64::new(0));

        let loop_cancel = cancel.clone();
        let loop_packets = Arc::clone(&packets_received);
        let handle = tokio::spawn(async move {
            let mut reassembler = Reassembler::new(gc_window);
            let mut buf = vec![0u8; 2048];
            loop {
                let received = tokio::select! {
                    _ = loop_cancel.cancelled() => break,
                    r = socket.recv_from(&mut buf) => r,
                };
                let n = match received {
                    Ok((n, _)) => n,
                    Err(e) => {
                        debug!("udp recv error on port {local_port}: {e}");
                        continue;
                    }
                };
                loop_packets.fetch_add(1, Ordering::Relaxed);
                if let Some(nal) = reassembler.ingest(&buf[..n]) {
                    if sink.send(nal).await.is_err() {
                        break; // consumer gone
                    }
                }
            }
        });

        Ok(Self {
            local_port,
            cancel,
            handle: Some(handle),
            packets_received,
        })
    }

    /// The port the socket actually bound.
    pub fn local_port(&self) -> u16 {
        self.local_port
    }

    /// Total datagrams received (including drops and duplicates).
    pub fn packets_received(&self) -> u64 {
        self.packets_received.load(Ordering::Relaxed)
    }

    /// Stop the loop and wait for it to exit. Idempotent.
    pub async fn stop(&mut self) {
        self.cancel.cancel();
        if let Some(handle) = self.handle.take() {
            handle.await.ok();
        }
    }
}

impl Drop for MediaReceiver {
    fn drop(&mut self) {
        // Last-resort cancellation if the owner forgot to stop().
        self.cancel.cancel();
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MediaSender;
    use std::time::Duration;

    #[tokio::test]
    async fn loopback_nal_roundtrip() {
        let (tx, mut rx) = mpsc::channel(16);
        let mut receiver = MediaReceiver::bind(0, 90_000, tx).unwrap();

        let socket = UdpSocket::from_std(bind_media_socket(0).unwrap()).unwrap();
        let dest = ("127.0.0.1".parse::<std::net::IpAddr>().unwrap(), receiver.local_port()).into();
        let sender = MediaSender::new(Arc::new(socket), dest);

        let payload: Vec<u8> = (0..3000u32).map(|i| (i % 256) as u8).collect();
        sender.send(&NalUnit::new(payload.clone(), true, 123));

        let nal = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timeout")
            .expect("channel closed");
        assert_eq!(nal.data, payload);
        assert!(nal.is_keyframe);
        assert_eq!(nal.timestamp, 123);

        receiver.stop().await;
    }

    #[tokio::test]
    async fn stop_immediately_after_bind() {
        let (tx, _rx) = mpsc::channel(1);
        let mut receiver = MediaReceiver::bind(0, 90_000, tx).unwrap();
        receiver.stop().await;
        receiver.stop().await; // idempotent
    }

    #[tokio::test]
    async fn nothing_emitted_after_stop() {
        let (tx, mut rx) = mpsc::channel(16);
        let mut receiver = MediaReceiver::bind(0, 90_000, tx).unwrap();
        let port = receiver.local_port();
        receiver.stop().await;

        let socket = UdpSocket::from_std(bind_media_socket(0).unwrap()).unwrap();
        let dest = ("127.0.0.1".parse::<std::net::IpAddr>().unwrap(), port).into();
        let sender = MediaSender::new(Arc::new(socket), dest);
        sender.send(&NalUnit::new(vec![1, 2, 3], false, 1));

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(rx.try_recv().is_err());
    }
}
