//! A member of the ring as seen by other members.

use serde::Deserialize;
use serde::Serialize;

use crate::dht::Did;

/// A remote or local ring member: its position and the address it can be reached at.
/// The Did of a peer is always the hash of its address.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Peer {
    /// Position of the peer on the ring.
    pub did: Did,
    /// Advertised `host:port` of the peer.
    pub addr: String,
}

impl Peer {
    /// Build a peer from its advertised address.
    pub fn from_addr(addr: impl Into<String>) -> Self {
        let addr = addr.into();
        Self {
            did: Did::hash(&addr),
            addr,
        }
    }
}

impl From<Peer> for Did {
    fn from(peer: Peer) -> Did {
        peer.did
    }
}

impl From<&Peer> for Did {
    fn from(peer: &Peer) -> Did {
        peer.did
    }
}

impl std::fmt::Display for Peer {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}@{}", self.addr, self.did)
    }
}
