#![warn(missing_docs)]
//! Implementation of ringkv's DHT
//! which is based on CHORD, ref: <https://pdos.csail.mit.edu/papers/ton:chord/paper-ton.pdf>
//! With high probability, the number of nodes that must be contacted to find a successor in an N-node network is O(log N).

mod chord;
pub mod did;
/// Finger table for ringkv
pub mod finger;
/// Ring members
pub mod peer;
mod stabilization;
/// Liveness state machine
pub mod status;
/// Successor list
pub mod successor;
pub mod types;

pub use chord::LeaveNotice;
pub use chord::LeaveRole;
pub use chord::NotifyOutcome;
pub use chord::PeerRing;
pub use chord::PeerRingAction;
pub use chord::RemoteAction as PeerRingRemoteAction;
pub use chord::RingState;
pub use chord::TopoInfo;
pub use did::Did;
pub use finger::FingerTable;
pub use peer::Peer;
pub use stabilization::Stabilizer;
pub use status::NodeStatus;
pub use successor::SuccessorSeq;
pub use types::Chord;
pub use types::CorrectChord;
