#![warn(missing_docs)]
//! Node management: ring state, local store and the calls that tie them to other nodes.

mod builder;
/// Transport trait used to reach other nodes
pub mod transport;

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

pub use builder::SwarmBuilder;
use serde::Deserialize;
use serde::Serialize;
use tokio::sync::RwLock;
use tokio::time::sleep;
pub use transport::FindSuccessorStep;
pub use transport::RingTransport;

use crate::consts::DEFAULT_CHECK_PREDECESSOR_INTERVAL_MS;
use crate::consts::DEFAULT_FIX_FINGERS_INTERVAL_MS;
use crate::consts::DEFAULT_LOOKUP_TIMEOUT_MS;
use crate::consts::DEFAULT_MAX_LOOKUP_HOPS;
use crate::consts::DEFAULT_STABILIZE_INTERVAL_MS;
use crate::consts::DEFAULT_SUCCESSOR_LIST_SIZE;
use crate::consts::MAX_RING_WALK;
use crate::consts::MAX_STORAGE_ATTEMPTS;
use crate::dht::Chord;
use crate::dht::CorrectChord;
use crate::dht::Did;
use crate::dht::LeaveNotice;
use crate::dht::LeaveRole;
use crate::dht::NodeStatus;
use crate::dht::NotifyOutcome;
use crate::dht::Peer;
use crate::dht::PeerRing;
use crate::dht::PeerRingAction;
use crate::dht::PeerRingRemoteAction;
use crate::dht::TopoInfo;
use crate::error::Error;
use crate::error::Result;
use crate::storage::Entry;
use crate::storage::NodeStorage;

/// Tunables of a node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwarmConfig {
    /// Address other nodes reach this node at. Its hash is the node Did.
    pub advertise: String,
    /// Length of the successor list, at least 1.
    pub successor_list_size: u8,
    /// Hop budget of a lookup.
    pub max_lookup_hops: usize,
    /// Wall clock budget of a lookup.
    pub lookup_timeout: Duration,
    /// Period of stabilize.
    pub stabilize_interval: Duration,
    /// Period of fix_fingers.
    pub fix_fingers_interval: Duration,
    /// Period of check_predecessor.
    pub check_predecessor_interval: Duration,
}

impl SwarmConfig {
    /// Defaults for a node advertised at `advertise`.
    pub fn new(advertise: impl Into<String>) -> Self {
        Self {
            advertise: advertise.into(),
            successor_list_size: DEFAULT_SUCCESSOR_LIST_SIZE,
            max_lookup_hops: DEFAULT_MAX_LOOKUP_HOPS,
            lookup_timeout: Duration::from_millis(DEFAULT_LOOKUP_TIMEOUT_MS),
            stabilize_interval: Duration::from_millis(DEFAULT_STABILIZE_INTERVAL_MS),
            fix_fingers_interval: Duration::from_millis(DEFAULT_FIX_FINGERS_INTERVAL_MS),
            check_predecessor_interval: Duration::from_millis(
                DEFAULT_CHECK_PREDECESSOR_INTERVAL_MS,
            ),
        }
    }

    /// Reject settings the ring cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.successor_list_size < 1 {
            return Err(Error::InvalidSuccessorListSize);
        }
        if self.advertise.is_empty() {
            return Err(Error::InvalidAddress(self.advertise.clone()));
        }
        Ok(())
    }
}

/// Body of `/node-info`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeInfo {
    /// Did of the node.
    pub node_hash: String,
    /// Address of the successor.
    pub successor: String,
    /// Address of the predecessor, empty when unknown.
    pub predecessor: String,
    /// Distinct finger addresses in finger order.
    pub others: Vec<String>,
}

/// One ring node.
pub struct Swarm {
    /// Reference of DHT.
    pub(crate) dht: Arc<PeerRing>,
    storage: NodeStorage,
    /// Held for write while keys move between nodes, for read by local get/put.
    migration: RwLock<()>,
    pub(crate) transport: Arc<dyn RingTransport>,
    config: SwarmConfig,
}

impl Swarm {
    /// Get did of self.
    pub fn did(&self) -> Did {
        self.dht.did
    }

    /// Self as a peer.
    pub fn peer(&self) -> &Peer {
        &self.dht.peer
    }

    /// Get DHT(Distributed Hash Table) of self.
    pub fn dht(&self) -> Arc<PeerRing> {
        self.dht.clone()
    }

    /// Settings the node runs with.
    pub fn config(&self) -> &SwarmConfig {
        &self.config
    }

    /// Fails unless the node is active.
    pub fn check_serving(&self) -> Result<()> {
        self.dht.check_serving()
    }

    /// Find the node responsible for `did`.
    pub async fn lookup(&self, did: Did) -> Result<Peer> {
        self.route(did, None, None).await
    }

    /// Iterative lookup. Starts at `first` (or the local step), stops on an answer, on the
    /// hop budget or on the time budget. A failed hop drops the peer from local routing
    /// state and goes back to the hop that pointed at it, or to `contact`, or to the local
    /// step. A hop that keeps pointing at a failed peer is passed through its successor list.
    pub(crate) async fn route(
        &self,
        did: Did,
        first: Option<Peer>,
        contact: Option<&Peer>,
    ) -> Result<Peer> {
        let walk = async {
            let mut failed = HashSet::new();
            // Hop whose answer is being followed, `None` for the local step.
            let mut asked: Option<Peer> = None;
            let mut next = first;
            for _ in 0..self.config.max_lookup_hops {
                let step = match next.take() {
                    Some(peer) if peer.did != self.did() => {
                        match self.transport.find_successor(&peer, did).await {
                            Ok(step) => {
                                asked = Some(peer);
                                step
                            }
                            Err(e) if e.is_peer_failure() => {
                                tracing::warn!("lookup of {} failed at {}: {}", did, peer, e);
                                if contact.map(|c| c.did) == Some(peer.did) {
                                    return Err(Error::ContactUnreachable(peer.addr));
                                }
                                self.dht.remove(peer.did)?;
                                failed.insert(peer.did);
                                next = asked.clone().or_else(|| contact.cloned());
                                continue;
                            }
                            Err(e) => return Err(e),
                        }
                    }
                    _ => {
                        asked = None;
                        FindSuccessorStep::try_from(self.dht.find_successor(did)?)?
                    }
                };

                let dead_end = match (&step, &asked) {
                    (
                        FindSuccessorStep::Found(p) | FindSuccessorStep::Forward(p),
                        Some(hop),
                    ) if failed.contains(&p.did) => Some(hop.clone()),
                    _ => None,
                };
                let step = match dead_end {
                    Some(hop) => match self.step_past_failed(&hop, did, &failed).await {
                        Ok(step) => step,
                        Err(e) => {
                            tracing::warn!("lookup of {} stuck at {}: {}", did, hop, e);
                            asked = None;
                            continue;
                        }
                    },
                    None => step,
                };
                match step {
                    FindSuccessorStep::Found(peer) => return Ok(peer),
                    FindSuccessorStep::Forward(peer) => next = Some(peer),
                }
            }
            Err(Error::RoutingTimeout(did.to_string()))
        };

        match tokio::time::timeout(self.config.lookup_timeout, walk).await {
            Ok(ret) => ret,
            Err(_) => Err(Error::RoutingTimeout(did.to_string())),
        }
    }

    /// Answer for `hop` from its successor list, skipping `failed` peers.
    async fn step_past_failed(
        &self,
        hop: &Peer,
        did: Did,
        failed: &HashSet<Did>,
    ) -> Result<FindSuccessorStep> {
        let info = self.transport.topo_info(hop).await?;
        let succ = info
            .successors
            .into_iter()
            .find(|p| !failed.contains(&p.did))
            .ok_or_else(|| Error::RoutingTimeout(did.to_string()))?;
        if did.in_closed_right(hop.did, succ.did) {
            Ok(FindSuccessorStep::Found(succ))
        } else {
            Ok(FindSuccessorStep::Forward(succ))
        }
    }

    /// Join the ring `nprime` belongs to.
    pub async fn join(&self, nprime: &str) -> Result<()> {
        self.check_serving()?;
        let contact = Peer::from_addr(nprime);
        if contact.did == self.did() {
            tracing::info!("join through self, nothing to do");
            return Ok(());
        }

        let successor = self
            .route(self.did(), Some(contact.clone()), Some(&contact))
            .await?;
        if successor.did == self.did() {
            tracing::warn!("{} already answers for its own did", self.peer());
            return Ok(());
        }
        tracing::info!("join through {}, successor is {}", contact, successor);

        let act = {
            let _guard = self.migration.write().await;
            let act = self.dht.join(successor.clone())?;
            self.run_join_notify(&act).await?;
            act
        };
        self.run_join_topo(&act).await
    }

    async fn run_join_notify(&self, act: &PeerRingAction) -> Result<()> {
        let PeerRingAction::MultiActions(acts) = act else {
            return Ok(());
        };
        for act in acts {
            if let PeerRingAction::RemoteAction(peer, PeerRingRemoteAction::Notify(me)) = act {
                match self.transport.notify(peer, me).await {
                    Ok(entries) => {
                        let keys = self.ingest(entries).await?;
                        self.release_handover(peer, keys).await;
                    }
                    Err(e) => {
                        if e.is_peer_failure() {
                            self.dht.remove(peer.did)?;
                        }
                        return Err(e);
                    }
                }
            }
        }
        Ok(())
    }

    async fn run_join_topo(&self, act: &PeerRingAction) -> Result<()> {
        let PeerRingAction::MultiActions(acts) = act else {
            return Ok(());
        };
        for act in acts {
            if let PeerRingAction::RemoteAction(peer, PeerRingRemoteAction::QueryForTopoInfo) = act
            {
                match self.transport.topo_info(peer).await {
                    // Already notified, the stabilizer takes it from here.
                    Ok(info) => {
                        self.dht.stabilize(peer, info)?;
                    }
                    Err(e) => tracing::warn!("failed to fetch topology of {}: {}", peer, e),
                }
            }
        }
        Ok(())
    }

    /// Leave gracefully: hand the store to the first reachable successor, tell both
    /// neighbours, then forget everything.
    pub async fn leave(&self) -> Result<()> {
        let _guard = self.migration.write().await;
        if self.dht.status()? == NodeStatus::Left {
            tracing::info!("{} has already left", self.peer());
            return Ok(());
        }

        let me = self.peer().clone();
        let successors = self.dht.successors()?;
        let predecessor = self.dht.predecessor()?;
        let mut entries = vec![];
        for (key, value) in self.storage.get_all().await? {
            // copies already handed to the predecessor stay behind
            if self.dht.accepts(Did::hash(&key))? {
                entries.push(Entry { key, value });
            }
        }

        let mut heir = None;
        for succ in successors.iter() {
            match self.transport.transfer(succ, entries.clone()).await {
                Ok(()) => {
                    heir = Some(succ.clone());
                    break;
                }
                Err(e) => tracing::warn!("transfer to {} failed: {}", succ, e),
            }
        }
        match &heir {
            Some(h) => tracing::info!("handed {} entries over to {}", entries.len(), h),
            None if !entries.is_empty() => {
                tracing::warn!("no reachable successor, {} entries dropped", entries.len())
            }
            None => {}
        }

        if let Some(h) = &heir {
            let notice = LeaveNotice {
                leaving: me.clone(),
                replacement: predecessor.clone(),
                role: LeaveRole::Successor,
            };
            if let Err(e) = self.transport.leave_notice(h, notice).await {
                tracing::warn!("failed to notify successor {} of leave: {}", h, e);
            }
        }
        if let Some(p) = predecessor.as_ref().filter(|p| p.did != me.did) {
            let notice = LeaveNotice {
                leaving: me.clone(),
                replacement: heir.clone().or_else(|| successors.first().cloned()),
                role: LeaveRole::Predecessor,
            };
            if let Err(e) = self.transport.leave_notice(p, notice).await {
                tracing::warn!("failed to notify predecessor {} of leave: {}", p, e);
            }
        }

        self.dht.leave()?;
        self.storage.clear().await?;
        tracing::info!("{} left the ring", me);
        Ok(())
    }

    /// Simulate a crash. Crashing a crashed node is a no-op.
    pub fn crash(&self) -> Result<()> {
        match self.dht.crash() {
            Ok(()) => {
                tracing::info!("{} crashed", self.peer());
                Ok(())
            }
            Err(Error::AlreadyCrashed) => {
                tracing::info!("{}", Error::AlreadyCrashed);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Recover from a simulated crash. Recovering an active node is a no-op.
    pub fn recover(&self) -> Result<()> {
        if self.dht.recover()? {
            tracing::info!("{} recovered", self.peer());
        }
        Ok(())
    }

    /// Resolve where `key` lives. `None` means here.
    async fn owner_of(&self, key: &str) -> Result<Option<Peer>> {
        let did = Did::hash(key);
        if self.dht.owns(did)? {
            return Ok(None);
        }
        let owner = self.lookup(did).await?;
        Ok(Some(owner).filter(|o| o.did != self.did()))
    }

    /// Whether a failed storage call is worth another lookup. A failed owner is dropped from
    /// routing state first, a refusing one is given time to learn its predecessor.
    async fn reroute(&self, key: &str, owner: Option<&Peer>, e: &Error) -> Result<bool> {
        match (e, owner) {
            (Error::NotOwner(_), None) => Ok(true),
            (Error::NotOwner(_), Some(owner)) => {
                tracing::debug!("{} refused {}, looking up again", owner, key);
                sleep(self.config.stabilize_interval).await;
                Ok(true)
            }
            (e, Some(owner)) if e.is_peer_failure() => {
                tracing::warn!("owner {} of {} failed: {}, retrying", owner, key, e);
                self.dht.remove(owner.did)?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// Read `key` from its owner. A `direct` request is answered by this node only, and
    /// refused with [Error::NotOwner] when the key is not in its range.
    pub async fn get(&self, key: &str, direct: bool) -> Result<Vec<u8>> {
        self.check_serving()?;
        if direct {
            return self.local_get(key).await;
        }
        let mut attempt = 0;
        loop {
            attempt += 1;
            let owner = self.owner_of(key).await?;
            let ret = match &owner {
                None => self.local_get(key).await,
                Some(owner) => self.transport.storage_get(owner, key).await,
            };
            let e = match ret {
                Err(e) => e,
                ok => return ok,
            };
            if attempt >= MAX_STORAGE_ATTEMPTS || !self.reroute(key, owner.as_ref(), &e).await? {
                return Err(e);
            }
        }
    }

    /// Write `key` on its owner. `direct` works as in [Swarm::get].
    pub async fn put(&self, key: &str, value: Vec<u8>, direct: bool) -> Result<()> {
        self.check_serving()?;
        if direct {
            return self.local_put(key, value).await;
        }
        let mut attempt = 0;
        loop {
            attempt += 1;
            let owner = self.owner_of(key).await?;
            let ret = match &owner {
                None => self.local_put(key, value.clone()).await,
                Some(owner) => self.transport.storage_put(owner, key, value.clone()).await,
            };
            let e = match ret {
                Err(e) => e,
                ok => return ok,
            };
            if attempt >= MAX_STORAGE_ATTEMPTS || !self.reroute(key, owner.as_ref(), &e).await? {
                return Err(e);
            }
        }
    }

    /// Gate of the local store, checked under the migration lock so a range handed over
    /// in the meantime is refused.
    fn check_local(&self, key: &str) -> Result<()> {
        self.check_serving()?;
        if !self.dht.accepts(Did::hash(key))? {
            return Err(Error::NotOwner(key.to_string()));
        }
        Ok(())
    }

    async fn local_get(&self, key: &str) -> Result<Vec<u8>> {
        let _guard = self.migration.read().await;
        self.check_local(key)?;
        self.storage
            .get(key)
            .await?
            .ok_or_else(|| Error::KeyNotFound(key.to_string()))
    }

    async fn local_put(&self, key: &str, value: Vec<u8>) -> Result<()> {
        let _guard = self.migration.read().await;
        self.check_local(key)?;
        tracing::debug!("store {} on {}", key, self.peer());
        self.storage.put(key, &value).await
    }

    /// Store migrated entries, returning their keys. The caller holds the migration lock.
    async fn ingest(&self, entries: Vec<Entry>) -> Result<Vec<String>> {
        if !entries.is_empty() {
            tracing::info!("{} received {} entries", self.peer(), entries.len());
        }
        let mut keys = Vec::with_capacity(entries.len());
        for e in entries {
            self.storage.put(&e.key, &e.value).await?;
            keys.push(e.key);
        }
        Ok(keys)
    }

    /// Let `from` drop the copies of `keys`. On failure `from` offers them again on the next
    /// notify.
    async fn release_handover(&self, from: &Peer, keys: Vec<String>) {
        if keys.is_empty() {
            return;
        }
        if let Err(e) = self.transport.release(from, keys).await {
            tracing::warn!("failed to release handover of {}: {}", from, e);
        }
    }

    /// Store entries handed over by a notified successor, then release them.
    pub(crate) async fn ingest_migrated(&self, from: &Peer, entries: Vec<Entry>) -> Result<()> {
        if entries.is_empty() {
            return Ok(());
        }
        let keys = {
            let _guard = self.migration.write().await;
            self.ingest(entries).await?
        };
        self.release_handover(from, keys).await;
        Ok(())
    }

    /// Number of locally stored keys.
    pub async fn local_count(&self) -> Result<u32> {
        self.storage.count().await
    }

    /// Build every pointer from a complete member list.
    pub fn set_network(&self, members: &[String]) -> Result<()> {
        self.check_serving()?;
        let peers = members
            .iter()
            .map(|m| m.trim())
            .filter(|m| !m.is_empty())
            .map(Peer::from_addr)
            .collect::<Vec<_>>();
        self.dht.init_from_members(&peers)?;
        tracing::info!("{} initialized from {} members", self.peer(), peers.len());
        Ok(())
    }

    /// Addresses met walking successors from this node, until the walk comes back.
    pub async fn walk_network(&self) -> Result<Vec<String>> {
        self.check_serving()?;
        let mut ret = vec![self.peer().addr.clone()];
        let mut visited = HashSet::from([self.did()]);
        let mut current = self.dht.successor()?;

        for _ in 0..MAX_RING_WALK {
            if !visited.insert(current.did) {
                break;
            }
            ret.push(current.addr.clone());
            match self.transport.topo_info(&current).await {
                Ok(info) => match info.successors.first() {
                    Some(next) => current = next.clone(),
                    None => break,
                },
                Err(e) => {
                    tracing::warn!("ring walk stopped at {}: {}", current, e);
                    break;
                }
            }
        }
        Ok(ret)
    }

    /// Summary of local pointers.
    pub fn node_info(&self) -> Result<NodeInfo> {
        self.check_serving()?;
        Ok(NodeInfo {
            node_hash: self.did().to_string(),
            successor: self.dht.successor()?.addr,
            predecessor: self
                .dht
                .predecessor()?
                .map(|p| p.addr)
                .unwrap_or_default(),
            others: self
                .dht
                .finger_peers()?
                .into_iter()
                .map(|p| p.addr)
                .collect(),
        })
    }

    /// Inbound: one local `find_successor` step.
    pub fn handle_find_successor(&self, did: Did) -> Result<FindSuccessorStep> {
        self.check_serving()?;
        FindSuccessorStep::try_from(self.dht.find_successor(did)?)
    }

    /// Inbound: successor list and predecessor.
    pub fn handle_topo_info(&self) -> Result<TopoInfo> {
        self.check_serving()?;
        self.dht.topo_info()
    }

    /// Inbound: liveness check.
    pub fn handle_ping(&self) -> Result<()> {
        self.check_serving()
    }

    /// Inbound: `peer` may be our predecessor. Once adopted, it is offered every key we
    /// no longer own. The keys stay here until `peer` releases them, and are offered again
    /// on each notify until then.
    pub async fn handle_notify(&self, peer: Peer) -> Result<Vec<Entry>> {
        self.check_serving()?;
        let _guard = self.migration.write().await;
        match self.dht.notify(peer.clone())? {
            NotifyOutcome::Adopted { previous } => tracing::info!(
                "{} adopted predecessor {} (was {:?})",
                self.peer(),
                peer,
                previous.map(|p| p.addr)
            ),
            NotifyOutcome::Kept(Some(pred)) if pred.did == peer.did => {}
            NotifyOutcome::Kept(_) => return Ok(vec![]),
        }

        let handover = self
            .storage
            .get_all()
            .await?
            .into_iter()
            .filter(|(key, _)| !Did::hash(key).in_closed_right(peer.did, self.did()))
            .map(Entry::from)
            .collect::<Vec<_>>();
        if !handover.is_empty() {
            tracing::info!("handing {} entries over to {}", handover.len(), peer);
        }
        Ok(handover)
    }

    /// Inbound: the predecessor stored the entries it was handed, drop our copies.
    pub async fn handle_release(&self, keys: Vec<String>) -> Result<()> {
        self.check_serving()?;
        let _guard = self.migration.write().await;
        let mut dropped = 0;
        for key in keys {
            // back in range by now
            if self.dht.accepts(Did::hash(&key))? {
                continue;
            }
            self.storage.remove(&key).await?;
            dropped += 1;
        }
        tracing::debug!("{} dropped {} handed over entries", self.peer(), dropped);
        Ok(())
    }

    /// Inbound: entries pushed by a leaving predecessor.
    pub async fn handle_transfer(&self, entries: Vec<Entry>) -> Result<()> {
        self.check_serving()?;
        let _guard = self.migration.write().await;
        self.ingest(entries).await.map(|_| ())
    }

    /// Inbound: a neighbour is leaving.
    pub fn handle_leave_notice(&self, notice: LeaveNotice) -> Result<()> {
        self.check_serving()?;
        tracing::info!(
            "{} got leave notice from {} as its {:?}",
            self.peer(),
            notice.leaving,
            notice.role
        );
        self.dht.apply_leave_notice(&notice)
    }
}
