//! Chord algorithm implement.
#![warn(missing_docs)]
use std::sync::Mutex;
use std::sync::MutexGuard;

use serde::Deserialize;
use serde::Serialize;

use super::finger::FingerTable;
use super::status::NodeStatus;
use super::successor::SuccessorSeq;
use super::types::Chord;
use super::types::CorrectChord;
use crate::consts::DID_BITS;
use crate::dht::Did;
use crate::dht::Peer;
use crate::error::Error;
use crate::error::Result;

/// Mutable ring state of one node. Every field is guarded by the single lock of [PeerRing].
#[derive(Debug, Clone)]
pub struct RingState {
    /// [FingerTable] help node to find successor quickly.
    pub finger: FingerTable,
    /// The next nodes on the ring, nearest first.
    pub successors: SuccessorSeq,
    /// The previous node on the ring.
    pub predecessor: Option<Peer>,
    /// Liveness of the node.
    pub status: NodeStatus,
}

/// PeerRing is used to help a node interact with other nodes.
/// All nodes form a clockwise ring in the order of Did.
/// This struct takes its name from that.
/// PeerRing implemented [Chord] algorithm.
pub struct PeerRing {
    /// The did of current node.
    pub did: Did,
    /// Current node as a peer.
    pub peer: Peer,
    state: Mutex<RingState>,
}

/// `PeerRing` use this to describe the result of [Chord] algorithm. Sometimes it's a
/// direct result, sometimes it's an action that is continued externally.
#[derive(Clone, Debug, PartialEq)]
pub enum PeerRingAction {
    /// No result, the whole manipulation is done internally.
    None,
    /// Found some node.
    Some(Peer),
    /// Trigger a remote action.
    RemoteAction(Peer, RemoteAction),
    /// Trigger multiple remote actions.
    MultiActions(Vec<PeerRingAction>),
}

/// Some of the process needs to be done remotely. This enum is used to describe that.
/// The caller executes it against the peer declared in [PeerRingAction::RemoteAction]
/// and feeds the result back into `PeerRing`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RemoteAction {
    /// Ask the peer to find the successor of did.
    FindSuccessor(Did),
    /// Same as `FindSuccessor`, the answer goes to the finger being fixed.
    FindSuccessorForFix(Did),
    /// Tell the peer that the carried node may be its predecessor.
    Notify(Peer),
    /// Fetch successor list and predecessor of the peer.
    QueryForTopoInfo,
}

/// Result of [Chord::notify].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NotifyOutcome {
    /// The notifier was not adopted, carries the current predecessor.
    Kept(Option<Peer>),
    /// The notifier became predecessor, carries the replaced one.
    Adopted {
        /// Predecessor before the notification.
        previous: Option<Peer>,
    },
}

/// Information about successor and predecessor
#[derive(Debug, PartialEq, Eq, Deserialize, Serialize, Clone)]
pub struct TopoInfo {
    /// Successor list
    pub successors: Vec<Peer>,
    /// Predecessor
    pub predecessor: Option<Peer>,
}

/// Which neighbour of a leaving node receives a [LeaveNotice].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LeaveRole {
    /// Receiver was the successor of the leaving node.
    Successor,
    /// Receiver was the predecessor of the leaving node.
    Predecessor,
}

/// Sent by a node leaving gracefully to its neighbours.
/// To the successor `replacement` is the new predecessor, to the predecessor it is the new
/// successor.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct LeaveNotice {
    /// The node leaving the ring.
    pub leaving: Peer,
    /// The pointer that should replace `leaving`.
    pub replacement: Option<Peer>,
    /// Position of the receiver relative to `leaving`.
    pub role: LeaveRole,
}

impl RingState {
    fn new(did: Did, succ_max: u8) -> Self {
        Self {
            finger: FingerTable::new(did, DID_BITS),
            successors: SuccessorSeq::new(did, succ_max),
            predecessor: None,
            status: NodeStatus::Active,
        }
    }
}

impl PeerRing {
    /// Create a singleton ring: successor is self, predecessor is unknown.
    pub fn new(peer: Peer, succ_max: u8) -> Self {
        Self {
            did: peer.did,
            state: Mutex::new(RingState::new(peer.did, succ_max)),
            peer,
        }
    }

    /// Lock and return MutexGuard of ring state.
    pub fn lock(&self) -> Result<MutexGuard<RingState>> {
        self.state.lock().map_err(|_| Error::DHTSyncLockError)
    }

    /// Current status.
    pub fn status(&self) -> Result<NodeStatus> {
        Ok(self.lock()?.status)
    }

    /// Fails unless the node is active.
    pub fn check_serving(&self) -> Result<()> {
        self.lock()?.status.check_serving(&self.peer.addr)
    }

    /// Simulate a crash.
    pub fn crash(&self) -> Result<()> {
        self.lock()?.status.crash()
    }

    /// Recover from a simulated crash. Ring state is kept as it was.
    pub fn recover(&self) -> Result<bool> {
        self.lock()?.status.recover()
    }

    /// Mark the node as left and forget every pointer.
    pub fn leave(&self) -> Result<()> {
        let mut state = self.lock()?;
        state.status.leave()?;
        Self::reset_pointers(&mut state);
        Ok(())
    }

    /// Nearest successor, self when alone.
    pub fn successor(&self) -> Result<Peer> {
        let state = self.lock()?;
        Ok(self.successor_of(&state))
    }

    fn successor_of(&self, state: &RingState) -> Peer {
        state
            .successors
            .min()
            .cloned()
            .unwrap_or_else(|| self.peer.clone())
    }

    /// Successor list, nearest first.
    pub fn successors(&self) -> Result<Vec<Peer>> {
        Ok(self.lock()?.successors.list())
    }

    /// Current predecessor.
    pub fn predecessor(&self) -> Result<Option<Peer>> {
        Ok(self.lock()?.predecessor.clone())
    }

    /// Snapshot of the finger table.
    pub fn fingers(&self) -> Result<Vec<Option<Peer>>> {
        Ok(self.lock()?.finger.list().clone())
    }

    /// Whether this node is responsible for `did`.
    pub fn owns(&self, did: Did) -> Result<bool> {
        let state = self.lock()?;
        if did == self.did {
            return Ok(true);
        }
        match &state.predecessor {
            Some(pred) => Ok(did.in_closed_right(pred.did, self.did)),
            None => Ok(state.successors.is_empty()),
        }
    }

    /// Whether a request for `did` may be served from the local store.
    /// Unlike [PeerRing::owns], an unknown predecessor does not refuse: the node cannot tell
    /// where its range starts, and callers reach it only after a lookup named it.
    pub fn accepts(&self, did: Did) -> Result<bool> {
        let state = self.lock()?;
        match &state.predecessor {
            Some(pred) => Ok(did == self.did || did.in_closed_right(pred.did, self.did)),
            None => Ok(true),
        }
    }

    /// Remove a node from finger table, successor sequence and predecessor.
    /// If successor_seq become empty, try setting the closest finger to it.
    pub fn remove(&self, did: Did) -> Result<()> {
        let mut state = self.lock()?;
        if state.predecessor.as_ref().map(|p| p.did) == Some(did) {
            state.predecessor = None;
        }
        state.finger.remove(did);
        state.successors.remove(did);
        if state.successors.is_empty() {
            if let Some(x) = state.finger.first() {
                state.successors.update(x);
            }
        }
        tracing::debug!("removed {} from ring state of {}", did, self.peer);
        Ok(())
    }

    /// Clear predecessor if it is still `did`.
    pub fn clear_predecessor(&self, did: Did) -> Result<bool> {
        let mut state = self.lock()?;
        if state.predecessor.as_ref().map(|p| p.did) == Some(did) {
            state.predecessor = None;
            return Ok(true);
        }
        Ok(false)
    }

    /// Set the finger currently being fixed.
    pub fn set_fix(&self, peer: Peer) -> Result<()> {
        self.lock()?.finger.set_fix(peer);
        Ok(())
    }

    fn reset_pointers(state: &mut RingState) {
        state.finger.reset_finger();
        state.successors.clear();
        state.predecessor = None;
    }

    /// Distinct finger peers in finger order.
    pub fn finger_peers(&self) -> Result<Vec<Peer>> {
        let state = self.lock()?;
        let mut ret: Vec<Peer> = vec![];
        for p in state.finger.list().iter().flatten() {
            if !ret.contains(p) {
                ret.push(p.clone());
            }
        }
        Ok(ret)
    }

    /// Scan fingers from the farthest down, then the successor list farthest first.
    fn closest_preceding_node(&self, state: &RingState, did: Did) -> Peer {
        if let Some(p) = state.finger.closest_predecessor(did) {
            return p;
        }
        state
            .successors
            .list()
            .into_iter()
            .rev()
            .find(|p| p.did.in_open(self.did, did))
            .unwrap_or_else(|| self.peer.clone())
    }

    /// Build every pointer locally from a complete member list.
    pub fn init_from_members(&self, members: &[Peer]) -> Result<()> {
        let mut members: Vec<Peer> = members.to_vec();
        if !members.iter().any(|p| p.did == self.did) {
            members.push(self.peer.clone());
        }
        members.sort_by_key(|p| p.did);
        members.dedup_by_key(|p| p.did);

        let mut state = self.lock()?;
        Self::reset_pointers(&mut state);

        let n = members.len();
        if n == 1 {
            return Ok(());
        }
        let idx = members
            .iter()
            .position(|p| p.did == self.did)
            .ok_or_else(|| Error::InvalidAddress(self.peer.addr.clone()))?;

        state.predecessor = Some(members[(idx + n - 1) % n].clone());
        for k in 1..n {
            if state.successors.update(members[(idx + k) % n].clone()).is_none() {
                break;
            }
        }
        for i in 0..DID_BITS {
            let start = self.did.finger_start(i);
            if let Some(owner) = members.iter().min_by_key(|p| p.did.bias(start)) {
                state.finger.set(i, owner.clone());
            }
        }
        Ok(())
    }

    /// Apply a [LeaveNotice] if we still point at the leaving node.
    pub fn apply_leave_notice(&self, notice: &LeaveNotice) -> Result<()> {
        let mut state = self.lock()?;
        let leaving = notice.leaving.did;
        let replacement = notice
            .replacement
            .clone()
            .filter(|p| p.did != self.did && p.did != leaving);

        match notice.role {
            LeaveRole::Successor => {
                if state.predecessor.as_ref().map(|p| p.did) == Some(leaving) {
                    state.predecessor = replacement;
                }
            }
            LeaveRole::Predecessor => {
                if let Some(r) = replacement {
                    state.finger.join(&r);
                    state.successors.update(r);
                }
            }
        }
        state.finger.remove(leaving);
        state.successors.remove(leaving);
        if state.predecessor.as_ref().map(|p| p.did) == Some(leaving) {
            state.predecessor = None;
        }
        Ok(())
    }
}

impl Chord<PeerRingAction> for PeerRing {
    /// Join a ring through the node found to be our successor.
    /// Returns the remote actions that complete the join: notify the successor, then fetch
    /// its topology to build the successor list.
    fn join(&self, successor: Peer) -> Result<PeerRingAction> {
        if successor.did == self.did {
            return Ok(PeerRingAction::None);
        }

        let mut state = self.lock()?;
        if state.successors.is_empty() {
            state.predecessor = None;
        }
        state.finger.join(&successor);
        state.successors.update(successor.clone());

        Ok(PeerRingAction::MultiActions(vec![
            PeerRingAction::RemoteAction(
                successor.clone(),
                RemoteAction::Notify(self.peer.clone()),
            ),
            PeerRingAction::RemoteAction(successor, RemoteAction::QueryForTopoInfo),
        ]))
    }

    /// Find the successor of a Did.
    /// May return a remote action for the successor is recorded in another node.
    fn find_successor(&self, did: Did) -> Result<PeerRingAction> {
        let state = self.lock()?;
        // Alone but notified: the predecessor is the only other node, hence the successor.
        let succ = state
            .successors
            .min()
            .or(state.predecessor.as_ref())
            .cloned()
            .unwrap_or_else(|| self.peer.clone());

        let owned_here = did == self.did
            || state
                .predecessor
                .as_ref()
                .map(|p| did.in_closed_right(p.did, self.did))
                .unwrap_or(false);

        let ret = if owned_here {
            PeerRingAction::Some(self.peer.clone())
        } else if did.in_closed_right(self.did, succ.did) {
            PeerRingAction::Some(succ)
        } else {
            let cp = self.closest_preceding_node(&state, did);
            let next = if cp.did == self.did { succ } else { cp };
            PeerRingAction::RemoteAction(next, RemoteAction::FindSuccessor(did))
        };

        tracing::debug!(
            "find_successor: self: {}, did: {}, result: {:?}",
            self.did,
            did,
            ret
        );
        Ok(ret)
    }

    /// Handle notification from a node that thinks it is the predecessor of current node.
    /// If that node is closer to current node or current node has no predecessor, adopt it.
    fn notify(&self, peer: Peer) -> Result<NotifyOutcome> {
        let mut state = self.lock()?;
        if peer.did == self.did {
            return Ok(NotifyOutcome::Kept(state.predecessor.clone()));
        }

        let adopt = match &state.predecessor {
            Some(pre) => peer.did.in_open(pre.did, self.did),
            None => true,
        };

        if adopt {
            let previous = state.predecessor.replace(peer);
            Ok(NotifyOutcome::Adopted { previous })
        } else {
            Ok(NotifyOutcome::Kept(state.predecessor.clone()))
        }
    }

    /// Fix finger table by finding the successor for each finger.
    /// Only one finger is fixed at a time.
    fn fix_fingers(&self) -> Result<PeerRingAction> {
        let start = {
            let mut state = self.lock()?;
            let index = state.finger.next_fix_index();
            state.finger.start(index)
        };

        // find_successor takes the lock as well.
        match self.find_successor(start)? {
            PeerRingAction::Some(v) => {
                self.set_fix(v)?;
                Ok(PeerRingAction::None)
            }
            PeerRingAction::RemoteAction(next, RemoteAction::FindSuccessor(did)) => Ok(
                PeerRingAction::RemoteAction(next, RemoteAction::FindSuccessorForFix(did)),
            ),
            a => Err(Error::PeerRingUnexpectedAction(format!("{a:?}"))),
        }
    }
}

impl CorrectChord<PeerRingAction> for PeerRing {
    /// Before stabilizing, the node should query its first successor for TopoInfo.
    /// A node alone with a known predecessor takes it as successor first.
    fn pre_stabilize(&self) -> Result<PeerRingAction> {
        let mut state = self.lock()?;
        if state.successors.is_empty() {
            match state.predecessor.clone() {
                Some(pred) if pred.did != self.did => {
                    state.finger.join(&pred);
                    state.successors.update(pred);
                }
                _ => return Ok(PeerRingAction::None),
            }
        }
        let head = self.successor_of(&state);
        Ok(PeerRingAction::RemoteAction(
            head,
            RemoteAction::QueryForTopoInfo,
        ))
    }

    /// Perform stabilization for the successor list and return the notify action.
    fn stabilize(&self, successor: &Peer, info: TopoInfo) -> Result<PeerRingAction> {
        let mut state = self.lock()?;

        let mut tail = info.successors;
        let head = match info.predecessor {
            Some(x) if x.did.in_open(self.did, successor.did) => {
                tail.insert(0, successor.clone());
                x
            }
            _ => successor.clone(),
        };

        state.successors.rebuild(head.clone(), &tail);
        state.finger.join(&head);

        Ok(PeerRingAction::RemoteAction(
            head,
            RemoteAction::Notify(self.peer.clone()),
        ))
    }

    /// A function to provide topological information about the chord.
    fn topo_info(&self) -> Result<TopoInfo> {
        let state = self.lock()?;
        Ok(TopoInfo {
            successors: state.successors.list(),
            predecessor: state.predecessor.clone(),
        })
    }
}
