//! Stabilization run daemons to maintain dht.

use std::sync::Arc;

use crate::dht::Chord;
use crate::dht::CorrectChord;
use crate::dht::PeerRing;
use crate::dht::PeerRingAction;
use crate::dht::PeerRingRemoteAction;
use crate::error::Error;
use crate::error::Result;
use crate::swarm::Swarm;

/// The stabilization runner.
/// Three protocols run on their own timers: stabilize, fix_fingers and check_predecessor.
/// None of them does anything unless the node is active.
#[derive(Clone)]
pub struct Stabilizer {
    swarm: Arc<Swarm>,
    dht: Arc<PeerRing>,
}

impl Stabilizer {
    /// Create a new stabilization runner.
    pub fn new(swarm: Arc<Swarm>) -> Self {
        let dht = swarm.dht();
        Self { swarm, dht }
    }

    fn is_active(&self) -> bool {
        self.dht.status().map(|s| s.is_active()).unwrap_or(false)
    }

    /// Run stabilize once: learn the successor's topology, rebuild the successor list,
    /// notify the successor. Unreachable successors are dropped one after another.
    pub async fn stabilize(&self) -> Result<()> {
        if !self.is_active() {
            return Ok(());
        }
        let attempts = self.swarm.config().successor_list_size as usize + 1;
        for _ in 0..attempts {
            let successor = match self.dht.pre_stabilize()? {
                PeerRingAction::None => return Ok(()),
                PeerRingAction::RemoteAction(
                    successor,
                    PeerRingRemoteAction::QueryForTopoInfo,
                ) => successor,
                a => return Err(Error::PeerRingUnexpectedAction(format!("{a:?}"))),
            };

            tracing::debug!("STABILIZATION query topo of {}", successor);
            match self.swarm.transport.topo_info(&successor).await {
                Ok(info) => {
                    let act = self.dht.stabilize(&successor, info)?;
                    return self.notify_successor(act).await;
                }
                Err(e) if e.is_peer_failure() => {
                    tracing::info!("STABILIZATION successor {} is gone: {}", successor, e);
                    self.dht.remove(successor.did)?;
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    /// Notify successor, this is a DHT operation.
    /// The successor answers with the entries we now own, released once stored.
    async fn notify_successor(&self, act: PeerRingAction) -> Result<()> {
        match act {
            PeerRingAction::RemoteAction(successor, PeerRingRemoteAction::Notify(me)) => {
                tracing::debug!("STABILIZATION notify {}", successor);
                match self.swarm.transport.notify(&successor, &me).await {
                    Ok(entries) => self.swarm.ingest_migrated(&successor, entries).await,
                    Err(e) if e.is_peer_failure() => {
                        tracing::info!("STABILIZATION successor {} is gone: {}", successor, e);
                        self.dht.remove(successor.did)
                    }
                    Err(e) => Err(e),
                }
            }
            PeerRingAction::None => Ok(()),
            a => Err(Error::PeerRingUnexpectedAction(format!("{a:?}"))),
        }
    }

    /// Fix fingers from finger table, this is a DHT operation.
    pub async fn fix_fingers(&self) -> Result<()> {
        if !self.is_active() {
            return Ok(());
        }
        match self.dht.fix_fingers()? {
            PeerRingAction::None => Ok(()),
            PeerRingAction::RemoteAction(next, PeerRingRemoteAction::FindSuccessorForFix(did)) => {
                tracing::debug!("STABILIZATION fix_fingers: {}", did);
                let peer = self.swarm.route(did, Some(next), None).await?;
                self.dht.set_fix(peer)
            }
            a => Err(Error::PeerRingUnexpectedAction(format!("{a:?}"))),
        }
    }

    /// Ping predecessor, forget it if it does not answer.
    pub async fn check_predecessor(&self) -> Result<()> {
        if !self.is_active() {
            return Ok(());
        }
        let Some(pred) = self.dht.predecessor()? else {
            return Ok(());
        };
        match self.swarm.transport.ping(&pred).await {
            Ok(()) => Ok(()),
            Err(e) if e.is_peer_failure() => {
                if self.dht.clear_predecessor(pred.did)? {
                    tracing::info!("STABILIZATION predecessor {} is gone: {}", pred, e);
                }
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}

mod stabilizer {
    use std::future::Future;
    use std::sync::Arc;
    use std::time::Duration;

    use futures::future::FutureExt;
    use futures::pin_mut;
    use futures::select;
    use futures_timer::Delay;

    use super::*;

    async fn every<F, Fut>(name: &str, interval: Duration, f: F)
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        loop {
            let timeout = Delay::new(interval).fuse();
            pin_mut!(timeout);
            select! {
                _ = timeout => f()
                    .await
                    .unwrap_or_else(|e| tracing::error!("failed to {} {:?}", name, e)),
            }
        }
    }

    impl Stabilizer {
        /// Run the three protocols forever, each re-armed after it completes.
        pub async fn wait(self: Arc<Self>) {
            let config = self.swarm.config().clone();
            futures::join!(
                every("stabilize", config.stabilize_interval, || self.stabilize()),
                every("fix fingers", config.fix_fingers_interval, || self
                    .fix_fingers()),
                every(
                    "check predecessor",
                    config.check_predecessor_interval,
                    || self.check_predecessor()
                ),
            );
        }
    }
}
