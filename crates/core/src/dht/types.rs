//! DHT traits implemented by `PeerRing`.
#![warn(missing_docs)]

use super::chord::NotifyOutcome;
use super::chord::TopoInfo;
use super::did::Did;
use super::peer::Peer;
use crate::error::Result;

/// Chord is a distributed hash table (DHT) algorithm that is designed to efficiently
/// distribute data across peer-to-peer network nodes. You may want to browse its
/// [wiki](https://en.wikipedia.org/wiki/Chord_(peer-to-peer)) before you read this.
///
/// In ringkv every node and every key is hashed onto the same ring of [Did]s. A key is
/// stored by its successor, the first node met walking clockwise from the key. To find
/// that node, `find_successor` is applied hop by hop: each node either knows the answer
/// or forwards the question to the closest node preceding the target in its finger table,
/// halving the remaining distance with high probability.
///
/// Some methods return an `Action` which is used to tell outer the extra action to take
/// after handling data inside the struct. The ring state never talks to the network by
/// itself, the caller executes remote actions and feeds the results back.
pub trait Chord<Action> {
    /// Join a ring through `successor`, the node found responsible for our own Did.
    fn join(&self, successor: Peer) -> Result<Action>;

    /// One local step of finding the successor of Did.
    /// May return a remote action for the successor is recorded in another node.
    fn find_successor(&self, did: Did) -> Result<Action>;

    /// Notify the DHT that a node believes it is our predecessor.
    /// The notifier is adopted if we have no predecessor or it is closer than the current one.
    fn notify(&self, peer: Peer) -> Result<NotifyOutcome>;

    /// Fix one finger per call, round robin over the table.
    fn fix_fingers(&self) -> Result<Action>;
}

/// Ring maintenance in the style of Pamela Zave's correct Chord.
/// Ref: [How to Make Chord Correct](https://arxiv.org/pdf/1502.06461.pdf)
///
/// Finger tables are an optimization built from successors and predecessors, correctness
/// only depends on the successor list. This trait covers the stabilization round which
/// keeps that list right.
pub trait CorrectChord<Action>: Chord<Action> {
    /// Steps before Stabilize Operation.
    ///
    /// The node queries its successor for its successor's predecessor and successor list.
    fn pre_stabilize(&self) -> Result<Action>;

    /// Stabilize operation in the paper.
    ///
    /// Given the topology reported by `successor`, adopt its predecessor when that one sits
    /// between us and `successor`, rebuild the successor list and notify the head of it.
    fn stabilize(&self, successor: &Peer, info: TopoInfo) -> Result<Action>;

    /// A helper function to get the topological
    /// info about the chord.
    fn topo_info(&self) -> Result<TopoInfo>;
}
