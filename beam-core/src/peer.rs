//! Peer model built from discovery observations.

use std::net::SocketAddr;

/// A device observed on the local network.
///
/// Identity is the `id` (a stable UUID string from the peer's TXT
/// record); two advertisements with the same id are the same peer, and
/// re-observation only overwrites `name` and `endpoint`.
#[derive(Debug, Clone, PartialEq)]
pub struct Peer {
    /// Stable UUID string from the `deviceID` TXT key.
    pub id: String,
    /// Human label from the `name` TXT key.
    pub name: String,
    /// Platform tag from the `platform` TXT key.
    pub platform: String,
    /// Control-channel endpoint (resolved address + advertised port).
    pub endpoint: SocketAddr,
}

impl std::fmt::Display for Peer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} [{}] at {}", self.name, self.platform, self.endpoint)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_format() {
        let peer = Peer {
            id: "abc".into(),
            name: "Studio".into(),
            platform: "mac".into(),
            endpoint: "192.168.1.7:4410".parse().unwrap(),
        };
        let s = peer.to_string();
        assert!(s.contains("Studio"));
        assert!(s.contains("192.168.1.7:4410"));
    }
}
