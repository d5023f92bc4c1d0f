//! Error of ringkv_core

/// A wrap `Result` contains custom errors.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors collections in ringkv-core.
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
    #[error("Contact node {0} is unreachable")]
    ContactUnreachable(String),

    #[error("Lookup of {0} exceeded its hop or time budget")]
    RoutingTimeout(String),

    #[error("Node {0} is crashed or unreachable")]
    NodeCrashed(String),

    #[error("Key not found: {0}")]
    KeyNotFound(String),

    #[error("Node is not responsible for key {0}")]
    NotOwner(String),

    #[error("Node has left the ring")]
    AlreadyLeft,

    #[error("Node is already crashed")]
    AlreadyCrashed,

    #[error("Invalid hexadecimal did")]
    BadHexDid,

    #[error("Successor list size must be at least 1")]
    InvalidSuccessorListSize,

    #[error("Failed on sync lock of DHT")]
    DHTSyncLockError,

    #[error("PeerRing got an unexpected action: {0}")]
    PeerRingUnexpectedAction(String),

    #[error("Remote rpc to {0} failed: {1}")]
    RemoteRpcError(String, String),

    #[error("Invalid peer address: {0}")]
    InvalidAddress(String),
}

impl Error {
    /// Returns `true` if the error means the remote peer cannot serve requests right now.
    /// Timeouts, refused connections and observed crashes are all reported this way.
    pub fn is_peer_failure(&self) -> bool {
        matches!(self, Error::NodeCrashed(_))
    }
}
