//! Peer discovery over DNS-SD.
//!
//! Each instance advertises one `_beam._tcp.` service whose port is the
//! control-channel TCP listener, and browses for peers of the same
//! type. Browse results are resolved to fetch TXT records; results
//! without a `deviceID`, and our own advertisement, are filtered out.
//!
//! # TXT record keys
//!
//! | Key        | Value                                   |
//! |------------|-----------------------------------------|
//! | `version`  | protocol major, decimal string (`"1"`)  |
//! | `platform` | `"mac"`, `"android"`, ... (extensible)  |
//! | `deviceID` | stable UUID string                      |
//! | `name`     | human label                             |
//!
//! Unknown TXT keys are ignored on receive; protocol evolution adds
//! keys rather than repurposing them.

use std::collections::HashMap;
use std::net::IpAddr;

use mdns_sd::{ServiceDaemon, ServiceEvent, ServiceInfo};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::BeamError;
use crate::identity::DeviceIdentity;
use crate::peer::Peer;

/// DNS-SD service type for beam peers.
pub const SERVICE_TYPE: &str = "_beam._tcp.local.";

/// Protocol major version carried in TXT.
pub const PROTOCOL_VERSION: &str = "1";

// ── Advertiser ───────────────────────────────────────────────────

/// Active service advertisement. Unregister by calling
/// [`shutdown`](Self::shutdown) (or dropping, best effort).
pub struct Advertiser {
    daemon: ServiceDaemon,
    fullname: String,
}

impl Advertiser {
    /// Register this device on the local mDNS domain, advertising
    /// `port` as the control-channel TCP port.
    pub fn register(identity: &DeviceIdentity, port: u16) -> Result<Self, BeamError> {
        let daemon =
            ServiceDaemon::new().map_err(|e| BeamError::Discovery(format!("daemon: {e}")))?;

        let hostname = format!(
            "{}.local.",
            identity.name.replace(' ', "-").to_lowercase()
        );

        let mut properties = HashMap::new();
        properties.insert("version".to_string(), PROTOCOL_VERSION.to_string());
        properties.insert("platform".to_string(), identity.platform.clone());
        properties.insert("deviceID".to_string(), identity.device_id.clone());
        properties.insert("name".to_string(), identity.name.clone());

        let service = ServiceInfo::new(
            SERVICE_TYPE,
            &identity.name,
            &hostname,
            "", // addresses auto-detected
            port,
            properties,
        )
        .map_err(|e| BeamError::Discovery(format!("service info: {e}")))?
        .enable_addr_auto();

        let fullname = service.get_fullname().to_string();
        daemon
            .register(service)
            .map_err(|e| BeamError::Discovery(format!("register: {e}")))?;

        info!("advertising '{}' on port {port}", identity.name);
        Ok(Self { daemon, fullname })
    }

    /// Remove the advertisement and stop the daemon.
    pub fn shutdown(self) {
        if let Err(e) = self.daemon.unregister(&self.fullname) {
            warn!("failed to unregister '{}': {e}", self.fullname);
        }
        let _ = self.daemon.shutdown();
    }
}

// ── PeerBrowser ──────────────────────────────────────────────────

/// Continuous browse of beam peers.
///
/// The current peer list (sorted by name for stable presentation) is
/// published through a `watch` channel whenever it changes.
pub struct PeerBrowser {
    daemon: ServiceDaemon,
    peers_rx: watch::Receiver<Vec<Peer>>,
    handle: Option<JoinHandle<()>>,
}

impl PeerBrowser {
    /// Start browsing. `local_device_id` filters out our own
    /// advertisement.
    pub fn browse(local_device_id: &str) -> Result<Self, BeamError> {
        let daemon =
            ServiceDaemon::new().map_err(|e| BeamError::Discovery(format!("daemon: {e}")))?;
        let events = daemon
            .browse(SERVICE_TYPE)
            .map_err(|e| BeamError::Discovery(format!("browse: {e}")))?;

        let (peers_tx, peers_rx) = watch::channel(Vec::new());
        let local_id = local_device_id.to_string();

        let handle = tokio::spawn(async move {
            // Peers keyed by device id; advertisement fullnames map back
            // to ids so removals find their peer.
            let mut by_id: HashMap<String, Peer> = HashMap::new();
            let mut fullname_to_id: HashMap<String, String> = HashMap::new();

            while let Ok(event) = events.recv_async().await {
                match event {
                    ServiceEvent::ServiceResolved(service) => {
                        match peer_from_service(&service, &local_id) {
                            Some(peer) => {
                                debug!("resolved peer {peer}");
                                fullname_to_id
                                    .insert(service.get_fullname().to_string(), peer.id.clone());
                                by_id.insert(peer.id.clone(), peer);
                                let _ = peers_tx.send(sorted_peers(&by_id));
                            }
                            None => {
                                debug!("ignoring advertisement {}", service.get_fullname());
                            }
                        }
                    }
                    ServiceEvent::ServiceRemoved(_, fullname) => {
                        if let Some(id) = fullname_to_id.remove(&fullname) {
                            by_id.remove(&id);
                            let _ = peers_tx.send(sorted_peers(&by_id));
                        }
                    }
                    _ => {}
                }
            }
        });

        Ok(Self {
            daemon,
            peers_rx,
            handle: Some(handle),
        })
    }

    /// Snapshot of the current peer list, sorted by name.
    pub fn peers(&self) -> Vec<Peer> {
        self.peers_rx.borrow().clone()
    }

    /// Subscribe to peer-list changes.
    pub fn subscribe(&self) -> watch::Receiver<Vec<Peer>> {
        self.peers_rx.clone()
    }

    /// Stop browsing and the daemon.
    pub fn shutdown(mut self) {
        let _ = self.daemon.stop_browse(SERVICE_TYPE);
        let _ = self.daemon.shutdown();
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

/// Build a [`Peer`] from a resolved advertisement, applying the filter
/// rules: no `deviceID` or our own id means the result is discarded.
fn peer_from_service(service: &ServiceInfo, local_device_id: &str) -> Option<Peer> {
    let txt: HashMap<String, String> = service
        .get_properties()
        .iter()
        .map(|prop| (prop.key().to_string(), prop.val_str().to_string()))
        .collect();

    let device_id = txt.get("deviceID")?.clone();
    if device_id.is_empty() || device_id == local_device_id {
        return None;
    }

    // Prefer an IPv4 address when the host advertises both families.
    let addresses = service.get_addresses();
    let address: IpAddr = addresses
        .iter()
        .find(|a| a.is_ipv4())
        .or_else(|| addresses.iter().next())
        .copied()?;

    let name = txt
        .get("name")
        .cloned()
        .unwrap_or_else(|| service.get_fullname().split('.').next().unwrap_or("").to_string());
    let platform = txt.get("platform").cloned().unwrap_or_default();

    Some(Peer {
        id: device_id,
        name,
        platform,
        endpoint: (address, service.get_port()).into(),
    })
}

fn sorted_peers(by_id: &HashMap<String, Peer>) -> Vec<Peer> {
    let mut peers: Vec<Peer> = by_id.values().cloned().collect();
    peers.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
    peers
}

// ── ControlListener ──────────────────────────────────────────────

/// TCP listener on the advertised control port.
///
/// Inbound connections are handed raw to the session layer, which
/// decides whether to adopt them (idle) or drop them (already beaming;
/// first established connection wins).
pub struct ControlListener {
    local_port: u16,
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl ControlListener {
    /// Bind `port` (0 for system-chosen) and start accepting. Streams
    /// are pushed into the returned receiver.
    pub async fn bind(port: u16) -> Result<(Self, mpsc::Receiver<TcpStream>), BeamError> {
        let listener = TcpListener::bind(("0.0.0.0", port)).await?;
        let local_port = listener.local_addr()?.port();
        let (tx, rx) = mpsc::channel(4);
        let cancel = CancellationToken::new();

        let loop_cancel = cancel.clone();
        let handle = tokio::spawn(async move {
            loop {
                let accepted = tokio::select! {
                    _ = loop_cancel.cancelled() => break,
                    a = listener.accept() => a,
                };
                match accepted {
                    Ok((stream, peer)) => {
                        debug!("inbound control connection from {peer}");
                        if tx.send(stream).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        warn!("accept error: {e}");
                    }
                }
            }
        });

        Ok((
            Self {
                local_port,
                cancel,
                handle: Some(handle),
            },
            rx,
        ))
    }

    /// The port that should be advertised.
    pub fn local_port(&self) -> u16 {
        self.local_port
    }

    /// Stop accepting. Idempotent.
    pub async fn stop(&mut self) {
        self.cancel.cancel();
        if let Some(handle) = self.handle.take() {
            handle.await.ok();
        }
    }
}

impl Drop for ControlListener {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn service(
        instance: &str,
        device_id: Option<&str>,
        name: Option<&str>,
        platform: &str,
    ) -> ServiceInfo {
        let mut txt = HashMap::new();
        txt.insert("version".to_string(), "1".to_string());
        txt.insert("platform".to_string(), platform.to_string());
        if let Some(id) = device_id {
            txt.insert("deviceID".to_string(), id.to_string());
        }
        if let Some(n) = name {
            txt.insert("name".to_string(), n.to_string());
        }
        ServiceInfo::new(
            SERVICE_TYPE,
            instance,
            "host.local.",
            "192.168.1.20",
            4410,
            txt,
        )
        .unwrap()
    }

    #[test]
    fn resolves_peer_from_txt() {
        let info = service("Studio", Some("id-b"), Some("Studio"), "mac");
        let peer = peer_from_service(&info, "id-a").unwrap();
        assert_eq!(peer.id, "id-b");
        assert_eq!(peer.name, "Studio");
        assert_eq!(peer.platform, "mac");
        assert_eq!(peer.endpoint.port(), 4410);
    }

    #[test]
    fn filters_missing_device_id() {
        let info = service("NoId", None, Some("NoId"), "mac");
        assert!(peer_from_service(&info, "id-a").is_none());
    }

    #[test]
    fn filters_self() {
        let info = service("Me", Some("id-a"), Some("Me"), "mac");
        assert!(peer_from_service(&info, "id-a").is_none());
    }

    #[test]
    fn unknown_txt_keys_are_ignored() {
        let mut txt = HashMap::new();
        txt.insert("version".to_string(), "1".to_string());
        txt.insert("platform".to_string(), "mac".to_string());
        txt.insert("deviceID".to_string(), "id-z".to_string());
        txt.insert("name".to_string(), "Z".to_string());
        txt.insert("futureKey".to_string(), "whatever".to_string());
        let info = ServiceInfo::new(
            SERVICE_TYPE,
            "Z",
            "host.local.",
            "192.168.1.21",
            4410,
            txt,
        )
        .unwrap();
        assert!(peer_from_service(&info, "id-a").is_some());
    }

    #[test]
    fn peer_list_sorted_by_name() {
        let mut by_id = HashMap::new();
        for (id, name) in [("1", "zulu"), ("2", "alpha"), ("3", "mike")] {
            by_id.insert(
                id.to_string(),
                Peer {
                    id: id.to_string(),
                    name: name.to_string(),
                    platform: "mac".to_string(),
                    endpoint: "10.0.0.1:1".parse().unwrap(),
                },
            );
        }
        let names: Vec<String> = sorted_peers(&by_id).into_iter().map(|p| p.name).collect();
        assert_eq!(names, vec!["alpha", "mike", "zulu"]);
    }

    #[tokio::test]
    async fn control_listener_hands_over_streams() {
        let (mut listener, mut streams) = ControlListener::bind(0).await.unwrap();
        let port = listener.local_port();
        assert_ne!(port, 0);

        let client = tokio::net::TcpStream::connect(("127.0.0.1", port))
            .await
            .unwrap();
        let accepted =
            tokio::time::timeout(std::time::Duration::from_secs(5), streams.recv())
                .await
                .expect("timeout")
                .expect("listener gone");
        assert_eq!(
            accepted.peer_addr().unwrap().ip(),
            client.local_addr().unwrap().ip()
        );

        listener.stop().await;
        listener.stop().await; // idempotent
    }
}
