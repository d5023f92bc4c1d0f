use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

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
use crate::tests::default::prepare_node;
use crate::tests::default::prepare_ring;
use crate::tests::default::prepare_swarm;
use crate::tests::default::sorted;
use crate::tests::default::test_config;
use crate::tests::default::wait_ring_closed;
use crate::tests::default::wait_until;
use crate::tests::default::MemNetwork;
use crate::tests::default::MemTransport;

fn owner_of<'a>(nodes: &'a [Arc<Swarm>], key: &str) -> &'a Arc<Swarm> {
    let did = Did::hash(key);
    nodes.iter().min_by_key(|n| n.did().bias(did)).unwrap()
}

#[tokio::test]
async fn test_put_get_from_any_node() -> Result<()> {
    let net = Arc::new(MemNetwork::default());
    let nodes = prepare_ring(&net, 4).await;
    wait_ring_closed(&nodes).await;

    for i in 0..20 {
        let key = format!("key-{i}");
        nodes[i % 4].put(&key, key.as_bytes().to_vec(), false).await?;
    }
    for i in 0..20 {
        let key = format!("key-{i}");
        for node in nodes.iter() {
            assert_eq!(node.get(&key, false).await?, key.as_bytes().to_vec());
        }
        // served directly by its owner only
        let owner = owner_of(&nodes, &key);
        for node in nodes.iter() {
            let local = node.get(&key, true).await;
            if Arc::ptr_eq(node, owner) {
                assert!(local.is_ok());
            } else {
                assert!(matches!(local, Err(Error::NotOwner(_))));
            }
        }
    }
    let mut stored = 0;
    for node in nodes.iter() {
        stored += node.local_count().await?;
    }
    assert_eq!(stored, 20);

    assert!(matches!(
        nodes[1].get("missing", false).await,
        Err(Error::KeyNotFound(_))
    ));
    Ok(())
}

#[tokio::test]
async fn test_join_migrates_owned_keys() -> Result<()> {
    let net = Arc::new(MemNetwork::default());
    let a = prepare_swarm(&net, test_config("127.0.0.1:33001"));
    let b = prepare_swarm(&net, test_config("127.0.0.1:33002"));

    for i in 0..30 {
        a.put(&format!("k{i}"), vec![i as u8], false).await?;
    }
    assert_eq!(a.local_count().await?, 30);

    b.join(&a.peer().addr).await?;

    // b now holds exactly the keys in (a, b]
    let expect_b = (0..30)
        .filter(|i| Did::hash(format!("k{i}")).in_closed_right(a.did(), b.did()))
        .count() as u32;
    assert_eq!(b.local_count().await?, expect_b);
    assert_eq!(a.local_count().await?, 30 - expect_b);
    for i in 0..30 {
        let key = format!("k{i}");
        let holder = if Did::hash(&key).in_closed_right(a.did(), b.did()) {
            &b
        } else {
            &a
        };
        assert_eq!(holder.get(&key, true).await?, vec![i as u8]);
    }
    Ok(())
}

#[tokio::test]
async fn test_leave_hands_over_store() -> Result<()> {
    let net = Arc::new(MemNetwork::default());
    let nodes = prepare_ring(&net, 4).await;
    wait_ring_closed(&nodes).await;

    for i in 0..20 {
        nodes[0].put(&format!("v{i}"), vec![i], false).await?;
    }

    let ring = sorted(&nodes);
    let leaving = ring[1].clone();
    let held = leaving.local_count().await?;
    let successor_before = ring[2].local_count().await?;
    leaving.leave().await?;

    assert_eq!(ring[2].local_count().await?, successor_before + held);
    assert_eq!(leaving.local_count().await?, 0);
    assert!(matches!(leaving.get("v0", false).await, Err(Error::AlreadyLeft)));
    // leaving twice is fine
    leaving.leave().await?;

    let rest = ring
        .iter()
        .filter(|n| !Arc::ptr_eq(n, &leaving))
        .cloned()
        .collect::<Vec<_>>();
    wait_ring_closed(&rest).await;
    for i in 0..20 {
        for node in rest.iter() {
            assert_eq!(node.get(&format!("v{i}"), false).await?, vec![i]);
        }
    }
    Ok(())
}

#[tokio::test]
async fn test_crash_owner_then_recover() -> Result<()> {
    let net = Arc::new(MemNetwork::default());
    let nodes = prepare_ring(&net, 4).await;
    wait_ring_closed(&nodes).await;

    // put on A, get on C
    let key = "apple";
    nodes[0].put(key, b"red".to_vec(), false).await?;
    assert_eq!(nodes[2].get(key, false).await?, b"red".to_vec());

    let owner = owner_of(&nodes, key).clone();
    let other = nodes
        .iter()
        .find(|n| !Arc::ptr_eq(n, &owner))
        .unwrap()
        .clone();

    owner.crash()?;
    // crashing twice is a no-op
    owner.crash()?;
    assert!(matches!(owner.get(key, false).await, Err(Error::NodeCrashed(_))));

    let missing = wait_until(Duration::from_secs(10), || async {
        matches!(other.get(key, false).await, Err(Error::KeyNotFound(_)))
    })
    .await;
    assert!(missing, "key still visible with its owner crashed");

    owner.recover()?;
    let back = wait_until(Duration::from_secs(10), || async {
        matches!(other.get(key, false).await, Ok(v) if v == b"red".to_vec())
    })
    .await;
    assert!(back, "value did not come back after recovery");
    wait_ring_closed(&nodes).await;
    Ok(())
}

#[tokio::test]
async fn test_keys_written_during_crash_move_back() -> Result<()> {
    let net = Arc::new(MemNetwork::default());
    let nodes = prepare_ring(&net, 3).await;
    wait_ring_closed(&nodes).await;

    let ring = sorted(&nodes);
    let owner = ring[1].clone();
    // a key owned by ring[1]
    let key = (0..)
        .map(|i| format!("late-{i}"))
        .find(|k| Arc::ptr_eq(owner_of(&ring, k), &owner))
        .unwrap();

    owner.crash()?;
    let stored = wait_until(Duration::from_secs(10), || async {
        ring[0].put(&key, b"v2".to_vec(), false).await.is_ok()
    })
    .await;
    assert!(stored);
    // the successor took the write
    assert_eq!(ring[2].get(&key, true).await?, b"v2".to_vec());

    owner.recover()?;
    let moved = wait_until(Duration::from_secs(10), || async {
        owner.get(&key, true).await.ok() == Some(b"v2".to_vec())
    })
    .await;
    assert!(moved, "recovered owner did not reclaim its range");
    let released = wait_until(Duration::from_secs(10), || async {
        ring[2].local_count().await.ok() == Some(0)
    })
    .await;
    assert!(released, "successor kept the handed over key");
    assert!(matches!(ring[2].get(&key, true).await, Err(Error::NotOwner(_))));
    Ok(())
}

#[tokio::test]
async fn test_direct_requests_outside_range_are_refused() -> Result<()> {
    let net = Arc::new(MemNetwork::default());
    let nodes = prepare_ring(&net, 3).await;
    wait_ring_closed(&nodes).await;

    let ring = sorted(&nodes);
    let key = (0..)
        .map(|i| format!("misrouted-{i}"))
        .find(|k| Arc::ptr_eq(owner_of(&ring, k), &ring[0]))
        .unwrap();

    assert!(matches!(
        ring[1].put(&key, b"v".to_vec(), true).await,
        Err(Error::NotOwner(_))
    ));
    assert_eq!(ring[1].local_count().await?, 0);
    // an ordinary put from the same node reaches the owner
    ring[1].put(&key, b"v".to_vec(), false).await?;
    assert_eq!(ring[0].get(&key, true).await?, b"v".to_vec());
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_puts_racing_a_join_stay_reachable() -> Result<()> {
    let net = Arc::new(MemNetwork::default());
    let a = prepare_node(&net, "127.0.0.1:33101");
    let b = prepare_node(&net, "127.0.0.1:33102");

    let writers = (0..4)
        .map(|w| {
            let a = a.clone();
            tokio::spawn(async move {
                let mut written = vec![];
                for i in 0..500 {
                    let key = format!("race-{w}-{i}");
                    if a.put(&key, key.as_bytes().to_vec(), false).await.is_ok() {
                        written.push(key);
                    }
                }
                written
            })
        })
        .collect::<Vec<_>>();
    tokio::task::yield_now().await;
    b.join(&a.peer().addr).await?;

    let mut written = vec![];
    for w in writers {
        written.extend(w.await.unwrap());
    }
    assert!(!written.is_empty());
    wait_ring_closed(&[a.clone(), b.clone()]).await;

    let mut lost = vec![];
    for key in written.iter() {
        if b.get(key, false).await.ok() != Some(key.as_bytes().to_vec()) {
            lost.push(key.clone());
        }
    }
    assert!(lost.is_empty(), "lost {} of {} keys: {:?}", lost.len(), written.len(), lost);
    Ok(())
}

/// Delivers the first notify to the remote node but loses its answer.
struct LoseFirstNotifyAnswer {
    inner: MemTransport,
    lost: AtomicBool,
}

#[async_trait]
impl RingTransport for LoseFirstNotifyAnswer {
    async fn find_successor(&self, peer: &Peer, did: Did) -> Result<FindSuccessorStep> {
        self.inner.find_successor(peer, did).await
    }

    async fn topo_info(&self, peer: &Peer) -> Result<TopoInfo> {
        self.inner.topo_info(peer).await
    }

    async fn notify(&self, peer: &Peer, me: &Peer) -> Result<Vec<Entry>> {
        let entries = self.inner.notify(peer, me).await?;
        if self.lost.swap(true, Ordering::SeqCst) {
            Ok(entries)
        } else {
            Err(Error::NodeCrashed(peer.addr.clone()))
        }
    }

    async fn release(&self, peer: &Peer, keys: Vec<String>) -> Result<()> {
        self.inner.release(peer, keys).await
    }

    async fn ping(&self, peer: &Peer) -> Result<()> {
        self.inner.ping(peer).await
    }

    async fn transfer(&self, peer: &Peer, entries: Vec<Entry>) -> Result<()> {
        self.inner.transfer(peer, entries).await
    }

    async fn leave_notice(&self, peer: &Peer, notice: LeaveNotice) -> Result<()> {
        self.inner.leave_notice(peer, notice).await
    }

    async fn storage_get(&self, peer: &Peer, key: &str) -> Result<Vec<u8>> {
        self.inner.storage_get(peer, key).await
    }

    async fn storage_put(&self, peer: &Peer, key: &str, value: Vec<u8>) -> Result<()> {
        self.inner.storage_put(peer, key, value).await
    }
}

#[tokio::test]
async fn test_lost_notify_answer_keeps_keys() -> Result<()> {
    let net = Arc::new(MemNetwork::default());
    let a = prepare_swarm(&net, test_config("127.0.0.1:33201"));
    for i in 0..50 {
        a.put(&format!("n{i}"), vec![i as u8], false).await?;
    }

    let addr = "127.0.0.1:33202";
    let transport = Arc::new(LoseFirstNotifyAnswer {
        inner: MemTransport { net: net.clone() },
        lost: AtomicBool::new(false),
    });
    let b = Arc::new(SwarmBuilder::new(test_config(addr), transport).build()?);
    net.nodes.insert(addr.to_string(), b.clone());

    assert!(b.join(&a.peer().addr).await.is_err());
    // a adopted b and handed keys over, b never got them
    assert_eq!(a.dht().predecessor()?, Some(b.peer().clone()));
    assert_eq!(b.local_count().await?, 0);
    assert_eq!(a.local_count().await?, 50);

    // the next round of stabilization offers the keys again
    Stabilizer::new(a.clone()).stabilize().await?;
    Stabilizer::new(b.clone()).stabilize().await?;

    let expect_b = (0..50)
        .filter(|i| Did::hash(format!("n{i}")).in_closed_right(a.did(), b.did()))
        .count() as u32;
    assert_eq!(b.local_count().await?, expect_b);
    assert_eq!(a.local_count().await?, 50 - expect_b);
    for i in 0..50 {
        assert_eq!(b.get(&format!("n{i}"), false).await?, vec![i as u8]);
    }
    Ok(())
}

#[tokio::test]
async fn test_crash_of_another_node_keeps_keys_available() -> Result<()> {
    let net = Arc::new(MemNetwork::default());
    let nodes = prepare_ring(&net, 4).await;
    wait_ring_closed(&nodes).await;

    let ring = sorted(&nodes);
    let crashed = ring[1].clone();
    let keys = (0..40)
        .map(|i| format!("safe-{i}"))
        .filter(|k| !Arc::ptr_eq(owner_of(&ring, k), &crashed))
        .collect::<Vec<_>>();
    for key in keys.iter() {
        ring[0].put(key, key.as_bytes().to_vec(), false).await?;
    }

    crashed.crash()?;
    // no waiting for the ring to heal
    for node in ring.iter().filter(|n| !Arc::ptr_eq(n, &crashed)) {
        for key in keys.iter() {
            assert_eq!(node.get(key, false).await?, key.as_bytes().to_vec());
        }
        let fresh = (0..)
            .map(|i| format!("{}-fresh-{i}", node.peer().addr))
            .find(|k| !Arc::ptr_eq(owner_of(&ring, k), &crashed))
            .unwrap();
        node.put(&fresh, b"new".to_vec(), false).await?;
        assert_eq!(ring[3].get(&fresh, false).await?, b"new".to_vec());
    }
    Ok(())
}
