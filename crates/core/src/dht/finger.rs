#![warn(missing_docs)]
use std::ops::Index;

use derivative::Derivative;
use serde::Deserialize;
use serde::Serialize;

use crate::dht::Did;
use crate::dht::Peer;

/// Finger table of Chord DHT.
/// Entry `k` points to the first known node at or after `did + 2^k`.
#[derive(Derivative, Clone, Debug, Serialize, Deserialize)]
#[derivative(PartialEq)]
pub struct FingerTable {
    did: Did,
    size: usize,
    finger: Vec<Option<Peer>>,
    #[derivative(PartialEq = "ignore")]
    pub(super) fix_finger_index: u8,
}

impl FingerTable {
    /// builder
    pub fn new(did: Did, size: usize) -> Self {
        Self {
            did,
            size,
            finger: vec![None; size],
            fix_finger_index: 0,
        }
    }

    /// is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Get first element from Finger Table
    pub fn first(&self) -> Option<Peer> {
        self.finger.iter().flatten().next().cloned()
    }

    /// getter
    pub fn get(&self, index: usize) -> Option<Peer> {
        self.get_ref(index).clone()
    }

    /// ref getter
    pub fn get_ref(&self, index: usize) -> &Option<Peer> {
        if index >= self.finger.len() {
            return &None;
        }
        &self.finger[index]
    }

    /// Start of entry `index`, that is `did + 2^index`.
    pub fn start(&self, index: usize) -> Did {
        self.did.finger_start(index)
    }

    /// setter, setting an entry to self clears it.
    pub fn set(&mut self, index: usize, peer: Peer) {
        tracing::debug!("set finger table index: {} peer: {}", index, peer);
        if index >= self.finger.len() {
            tracing::error!("set finger index out of range, index: {}", index);
            return;
        }
        if peer.did == self.did {
            self.finger[index] = None;
            return;
        }
        self.finger[index] = Some(peer);
    }

    /// setter for fix_finger_index
    pub fn set_fix(&mut self, peer: Peer) {
        let index = self.fix_finger_index as usize;
        self.set(index, peer)
    }

    /// Move the fix cursor to the next entry, round robin, and return it.
    pub fn next_fix_index(&mut self) -> usize {
        self.fix_finger_index = ((self.fix_finger_index as usize + 1) % self.size) as u8;
        self.fix_finger_index as usize
    }

    /// remove a node from dht finger table
    pub fn remove(&mut self, did: Did) {
        let indexes: Vec<usize> = self
            .finger
            .iter()
            .enumerate()
            .filter(|(_, x)| x.as_ref().map(|p| p.did) == Some(did))
            .map(|(id, _)| id)
            .collect();

        if let (Some(first_idx), Some(last_idx)) = (indexes.first(), indexes.last()) {
            let (first_idx, end_idx) = (*first_idx, *last_idx + 1);

            // Update to the next peer of last equaled peer in finger table.
            // If cannot get that, use None.
            let fix_peer = self.finger.get(end_idx).cloned().flatten();

            for idx in first_idx..end_idx {
                self.finger[idx] = fix_peer.clone()
            }
        }
    }

    /// Join FingerTable
    pub fn join(&mut self, peer: &Peer) {
        if peer.did == self.did {
            return;
        }
        let bias = peer.did.bias(self.did);

        for k in 0..self.size {
            let pos = self.start(k) - self.did;

            if bias.pos() < pos {
                continue;
            }

            if let Some(v) = &self.finger[k] {
                if bias > v.did.bias(self.did) {
                    continue;
                }
            }

            self.finger[k] = Some(peer.clone());
        }
    }

    /// Check finger is contains some node
    pub fn contains(&self, did: Did) -> bool {
        self.finger.iter().flatten().any(|p| p.did == did)
    }

    /// Get closest predecessor: scan from the farthest entry down, return the first one
    /// strictly inside `(self, did)`.
    pub fn closest_predecessor(&self, did: Did) -> Option<Peer> {
        for i in (0..self.size).rev() {
            if let Some(v) = &self.finger[i] {
                if v.did.in_open(self.did, did) {
                    return Some(v.clone());
                }
            }
        }
        None
    }

    /// get length of finger
    pub fn len(&self) -> usize {
        self.finger.iter().flatten().count()
    }

    /// get finger list
    pub fn list(&self) -> &Vec<Option<Peer>> {
        &self.finger
    }

    /// Drop every entry.
    pub fn reset_finger(&mut self) {
        self.finger = vec![None; self.size];
        self.fix_finger_index = 0;
    }
}

impl Index<usize> for FingerTable {
    type Output = Option<Peer>;
    fn index(&self, index: usize) -> &Self::Output {
        self.get_ref(index)
    }
}
