//! The seam between a node and the rest of the ring.

use async_trait::async_trait;
use serde::Deserialize;
use serde::Serialize;

use crate::dht::Did;
use crate::dht::LeaveNotice;
use crate::dht::Peer;
use crate::dht::PeerRingAction;
use crate::dht::PeerRingRemoteAction;
use crate::dht::TopoInfo;
use crate::error::Error;
use crate::error::Result;
use crate::storage::Entry;

/// Answer of one remote `find_successor` step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FindSuccessorStep {
    /// The successor is known.
    Found(Peer),
    /// Ask this peer next.
    Forward(Peer),
}

impl TryFrom<PeerRingAction> for FindSuccessorStep {
    type Error = Error;
    fn try_from(act: PeerRingAction) -> Result<Self> {
        match act {
            PeerRingAction::Some(peer) => Ok(Self::Found(peer)),
            PeerRingAction::RemoteAction(next, PeerRingRemoteAction::FindSuccessor(_)) => {
                Ok(Self::Forward(next))
            }
            a => Err(Error::PeerRingUnexpectedAction(format!("{a:?}"))),
        }
    }
}

/// Calls a node makes on other nodes.
///
/// Every method addresses a remote node by its [Peer] and must fail with
/// [Error::NodeCrashed] when that node is crashed, unreachable or too slow, so callers can
/// run failure handling on [Error::is_peer_failure].
#[async_trait]
pub trait RingTransport: Send + Sync {
    /// One `find_successor` step executed by `peer`.
    async fn find_successor(&self, peer: &Peer, did: Did) -> Result<FindSuccessorStep>;

    /// Successor list and predecessor of `peer`.
    async fn topo_info(&self, peer: &Peer) -> Result<TopoInfo>;

    /// Tell `peer` that `me` may be its predecessor, receiving the entries it hands over.
    /// `peer` keeps its copies until they are released.
    async fn notify(&self, peer: &Peer, me: &Peer) -> Result<Vec<Entry>>;

    /// Confirm to `peer` that handed over `keys` are stored, so it can drop them.
    async fn release(&self, peer: &Peer, keys: Vec<String>) -> Result<()>;

    /// Liveness check.
    async fn ping(&self, peer: &Peer) -> Result<()>;

    /// Push entries into the store of `peer`.
    async fn transfer(&self, peer: &Peer, entries: Vec<Entry>) -> Result<()>;

    /// Deliver a graceful departure notice.
    async fn leave_notice(&self, peer: &Peer, notice: LeaveNotice) -> Result<()>;

    /// Read `key` on `peer`, which must serve it from its local store.
    async fn storage_get(&self, peer: &Peer, key: &str) -> Result<Vec<u8>>;

    /// Write `key` on `peer`, which must store it locally.
    async fn storage_put(&self, peer: &Peer, key: &str, value: Vec<u8>) -> Result<()>;
}
