use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::time::sleep;

use crate::dht::Did;
use crate::dht::LeaveNotice;
use crate::dht::Peer;
use crate::dht::Stabilizer;
use crate::dht::TopoInfo;
use crate::error::Error;
use crate::error::Result;
use crate::storage::Entry;
use crate::swarm::FindSuccessorStep;
use crate::swarm::RingTransport;
use crate::swarm::Swarm;
use crate::swarm::SwarmBuilder;
use crate::swarm::SwarmConfig;

mod test_storage;

/// Every node of a test, reachable by address.
#[derive(Default)]
pub struct MemNetwork {
    nodes: DashMap<String, Arc<Swarm>>,
}

/// [RingTransport] calling into other swarms of the same [MemNetwork].
pub struct MemTransport {
    net: Arc<MemNetwork>,
}

impl MemTransport {
    fn swarm(&self, peer: &Peer) -> Result<Arc<Swarm>> {
        self.net
            .nodes
            .get(&peer.addr)
            .map(|s| s.value().clone())
            .ok_or_else(|| Error::NodeCrashed(peer.addr.clone()))
    }
}

/// A node that refuses to serve looks crashed from outside, whatever the reason.
fn remote<T>(peer: &Peer, ret: Result<T>) -> Result<T> {
    ret.map_err(|e| match e {
        Error::NodeCrashed(_) | Error::AlreadyLeft => Error::NodeCrashed(peer.addr.clone()),
        e => e,
    })
}

#[async_trait]
impl RingTransport for MemTransport {
    async fn find_successor(&self, peer: &Peer, did: Did) -> Result<FindSuccessorStep> {
        remote(peer, self.swarm(peer)?.handle_find_successor(did))
    }

    async fn topo_info(&self, peer: &Peer) -> Result<TopoInfo> {
        remote(peer, self.swarm(peer)?.handle_topo_info())
    }

    async fn notify(&self, peer: &Peer, me: &Peer) -> Result<Vec<Entry>> {
        remote(peer, self.swarm(peer)?.handle_notify(me.clone()).await)
    }

    async fn release(&self, peer: &Peer, keys: Vec<String>) -> Result<()> {
        remote(peer, self.swarm(peer)?.handle_release(keys).await)
    }

    async fn ping(&self, peer: &Peer) -> Result<()> {
        remote(peer, self.swarm(peer)?.handle_ping())
    }

    async fn transfer(&self, peer: &Peer, entries: Vec<Entry>) -> Result<()> {
        remote(peer, self.swarm(peer)?.handle_transfer(entries).await)
    }

    async fn leave_notice(&self, peer: &Peer, notice: LeaveNotice) -> Result<()> {
        remote(peer, self.swarm(peer)?.handle_leave_notice(notice))
    }

    async fn storage_get(&self, peer: &Peer, key: &str) -> Result<Vec<u8>> {
        remote(peer, self.swarm(peer)?.get(key, true).await)
    }

    async fn storage_put(&self, peer: &Peer, key: &str, value: Vec<u8>) -> Result<()> {
        remote(peer, self.swarm(peer)?.put(key, value, true).await)
    }
}

pub fn test_config(addr: &str) -> SwarmConfig {
    let mut config = SwarmConfig::new(addr);
    config.stabilize_interval = Duration::from_millis(20);
    config.fix_fingers_interval = Duration::from_millis(5);
    config.check_predecessor_interval = Duration::from_millis(30);
    config.lookup_timeout = Duration::from_millis(1000);
    config
}

/// Build a swarm on `net` without background stabilization.
pub fn prepare_swarm(net: &Arc<MemNetwork>, config: SwarmConfig) -> Arc<Swarm> {
    let transport = Arc::new(MemTransport { net: net.clone() });
    let swarm = Arc::new(SwarmBuilder::new(config, transport).build().unwrap());
    net.nodes
        .insert(swarm.peer().addr.clone(), swarm.clone());
    println!("addr: {}, did: {}", swarm.peer().addr, swarm.did());
    swarm
}

/// Build a swarm on `net` and run its stabilizer in the background.
pub fn prepare_node(net: &Arc<MemNetwork>, addr: &str) -> Arc<Swarm> {
    let swarm = prepare_swarm(net, test_config(addr));
    let stabilizer = Arc::new(Stabilizer::new(swarm.clone()));
    tokio::spawn(stabilizer.wait());
    swarm
}

/// `n` stabilizing nodes, each joined through the first one.
pub async fn prepare_ring(net: &Arc<MemNetwork>, n: usize) -> Vec<Arc<Swarm>> {
    let mut nodes: Vec<Arc<Swarm>> = vec![];
    for i in 0..n {
        let node = prepare_node(net, &format!("127.0.0.1:{}", 30000 + i));
        if let Some(first) = nodes.first() {
            node.join(&first.peer().addr).await.unwrap();
        }
        nodes.push(node);
    }
    nodes
}

/// Nodes sorted clockwise.
pub fn sorted(nodes: &[Arc<Swarm>]) -> Vec<Arc<Swarm>> {
    let mut nodes = nodes.to_vec();
    nodes.sort_by_key(|n| n.did());
    nodes
}

/// Successor and predecessor of every node point at its neighbours.
pub fn is_ring_closed(nodes: &[Arc<Swarm>]) -> bool {
    let nodes = sorted(nodes);
    let n = nodes.len();
    (0..n).all(|i| {
        let next = &nodes[(i + 1) % n];
        let prev = &nodes[(i + n - 1) % n];
        let dht = nodes[i].dht();
        dht.successor().ok().map(|p| p.did) == Some(next.did())
            && dht.predecessor().ok().flatten().map(|p| p.did) == Some(prev.did())
    })
}

/// Poll `cond` until it holds or `timeout` elapses.
pub async fn wait_until<F, Fut>(timeout: Duration, mut cond: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if cond().await {
            return true;
        }
        sleep(Duration::from_millis(20)).await;
    }
    cond().await
}

pub async fn wait_ring_closed(nodes: &[Arc<Swarm>]) {
    let closed = wait_until(Duration::from_secs(10), || async { is_ring_closed(nodes) }).await;
    assert!(closed, "ring did not close");
}
