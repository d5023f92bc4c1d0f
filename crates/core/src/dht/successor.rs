//! Successor for PeerRing
use crate::dht::did::BiasId;
use crate::dht::Did;
use crate::dht::Peer;

/// A sequence of successors for a node on the ring.
/// It's necessary to have multiple successors to prevent a single point of failure.
/// Note the successors are in order of a clockwise distance from the node.
/// See also [super::did::BiasId].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuccessorSeq {
    /// Node did
    did: Did,
    /// Max successor num
    max: u8,
    /// Successors
    successors: Vec<Peer>,
}

impl SuccessorSeq {
    pub fn new(did: Did, max: u8) -> Self {
        Self {
            did,
            max,
            successors: vec![],
        }
    }

    /// Calculate bias of the Did on the ring.
    pub fn bias(&self, did: Did) -> BiasId {
        BiasId::new(self.did, did)
    }

    pub fn contains(&self, did: Did) -> bool {
        self.successors.iter().any(|p| p.did == did)
    }

    pub fn is_empty(&self) -> bool {
        self.successors.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.successors.len() as u8 >= self.max
    }

    pub fn get(&self, index: usize) -> Option<&Peer> {
        self.successors.get(index)
    }

    pub fn len(&self) -> usize {
        self.successors.len()
    }

    /// The nearest successor, or None if the node is alone.
    pub fn min(&self) -> Option<&Peer> {
        self.successors.first()
    }

    /// The farthest successor, or None if the node is alone.
    pub fn max(&self) -> Option<&Peer> {
        self.successors.last()
    }

    pub fn list(&self) -> Vec<Peer> {
        self.successors.clone()
    }

    /// Insert a successor keeping clockwise order and the length limit.
    /// Returns the peer if it ends up in the sequence.
    pub fn update(&mut self, successor: Peer) -> Option<Peer> {
        if self.contains(successor.did) || successor.did == self.did {
            return None;
        }

        if let Some(max) = self.max() {
            if self.bias(successor.did) >= self.bias(max.did) && self.is_full() {
                return None;
            }
        }

        let did = self.did;
        self.successors.push(successor.clone());
        self.successors.sort_by_key(|p| p.did.bias(did));
        self.successors.truncate(self.max.into());
        if self.contains(successor.did) {
            Some(successor)
        } else {
            None
        }
    }

    pub fn extend(&mut self, succ_list: &[Peer]) -> Vec<Peer> {
        succ_list
            .iter()
            .filter_map(|s| self.update(s.clone()))
            .collect()
    }

    /// Replace the whole sequence with `head` followed by `tail`.
    pub fn rebuild(&mut self, head: Peer, tail: &[Peer]) {
        self.successors.clear();
        self.update(head);
        self.extend(tail);
    }

    pub fn remove(&mut self, did: Did) {
        self.successors.retain(|v| v.did != did);
    }

    pub fn clear(&mut self) {
        self.successors.clear();
    }
}
