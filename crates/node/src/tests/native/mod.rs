use std::future::Future;
use std::net::TcpListener;
use std::sync::Arc;
use std::time::Duration;

use reqwest::StatusCode;

use crate::config::Config;
use crate::endpoint::serve;
use crate::prelude::ringkv_core::swarm::NodeInfo;
use crate::prelude::Stabilizer;
use crate::prelude::Swarm;
use crate::prelude::SwarmBuilder;
use crate::prelude::SwarmConfig;
use crate::transport::HttpTransport;
use crate::transport::DIRECT_HEADER;

/// A node served on an ephemeral port.
pub struct TestNode {
    pub addr: String,
    pub swarm: Arc<Swarm>,
}

impl TestNode {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

fn test_config(addr: &str) -> Config {
    Config {
        bind: addr.to_string(),
        stabilize_interval_ms: 30,
        fix_fingers_interval_ms: 10,
        check_predecessor_interval_ms: 50,
        rpc_timeout_ms: 500,
        forward_timeout_ms: 2000,
        lookup_timeout_ms: 2000,
        ..Default::default()
    }
}

pub async fn prepare_node() -> TestNode {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    let config = test_config(&addr);

    let transport = Arc::new(HttpTransport::from_config(&config).unwrap());
    let swarm_config = SwarmConfig::try_from(&config).unwrap();
    let swarm = Arc::new(SwarmBuilder::new(swarm_config, transport).build().unwrap());

    tokio::spawn(serve(listener, swarm.clone()));
    tokio::spawn(Arc::new(Stabilizer::new(swarm.clone())).wait());
    TestNode { addr, swarm }
}

/// An address nobody listens on.
pub fn dead_addr() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().to_string()
}

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
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    cond().await
}

async fn node_info(client: &reqwest::Client, node: &TestNode) -> Option<NodeInfo> {
    client
        .get(node.url("/node-info"))
        .send()
        .await
        .ok()?
        .json()
        .await
        .ok()
}

/// Successor and predecessor of every node, read over HTTP, point at its neighbours.
async fn ring_closed(client: &reqwest::Client, nodes: &[&TestNode]) -> bool {
    let mut ring = nodes.to_vec();
    ring.sort_by_key(|n| n.swarm.did());
    let n = ring.len();
    for i in 0..n {
        let Some(info) = node_info(client, ring[i]).await else {
            return false;
        };
        if info.successor != ring[(i + 1) % n].addr
            || info.predecessor != ring[(i + n - 1) % n].addr
        {
            return false;
        }
    }
    true
}

#[tokio::test]
async fn test_singleton_node() {
    let client = reqwest::Client::new();
    let node = prepare_node().await;

    let info = node_info(&client, &node).await.unwrap();
    assert_eq!(info.node_hash, node.swarm.did().to_string());
    assert_eq!(info.successor, node.addr);
    assert_eq!(info.predecessor, "");
    assert!(info.others.is_empty());

    let resp = client.get(node.url("/ping")).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(resp.headers().contains_key("x-node-version"));

    let resp = client
        .put(node.url("/storage/hello"))
        .body("world")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let resp = client.get(node.url("/storage/hello")).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.bytes().await.unwrap().as_ref(), b"world");

    let resp = client.get(node.url("/storage/nothing")).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    let walk: Vec<String> = client
        .get(node.url("/network"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(walk, vec![node.addr.clone()]);
}

#[tokio::test]
async fn test_join_put_get_crash_recover() {
    let client = reqwest::Client::new();
    let a = prepare_node().await;
    let b = prepare_node().await;
    let c = prepare_node().await;
    let d = prepare_node().await;
    for n in [&b, &c, &d] {
        let resp = client
            .post(n.url("/join"))
            .query(&[("nprime", a.addr.as_str())])
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }
    let nodes = [&a, &b, &c, &d];
    let closed = wait_until(Duration::from_secs(15), || ring_closed(&client, &nodes)).await;
    assert!(closed, "ring did not close");

    let resp = client
        .put(a.url("/storage/some%20key"))
        .body(vec![0u8, 1, 2, 255])
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let resp = client.get(c.url("/storage/some%20key")).send().await.unwrap();
    assert_eq!(resp.bytes().await.unwrap().as_ref(), &[0u8, 1, 2, 255]);

    // exactly one node serves it, the others refuse direct requests for it
    let mut holders = vec![];
    for n in nodes.iter() {
        let resp = client
            .get(n.url("/storage/some%20key"))
            .header(DIRECT_HEADER, "1")
            .send()
            .await
            .unwrap();
        match resp.status() {
            StatusCode::OK => holders.push(n.addr.clone()),
            s => assert_eq!(s, StatusCode::MISDIRECTED_REQUEST),
        }
    }
    assert_eq!(holders.len(), 1);
    let owner = nodes.iter().find(|n| n.addr == holders[0]).unwrap();
    let other = nodes.iter().find(|n| n.addr != holders[0]).unwrap();

    for _ in 0..2 {
        let resp = client.post(owner.url("/sim-crash")).send().await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }
    let resp = client.get(owner.url("/node-info")).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);

    let missing = wait_until(Duration::from_secs(15), || async {
        matches!(
            client.get(other.url("/storage/some%20key")).send().await,
            Ok(r) if r.status() == StatusCode::NOT_FOUND
        )
    })
    .await;
    assert!(missing, "key still served with its owner crashed");

    let resp = client.post(owner.url("/sim-recover")).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let back = wait_until(Duration::from_secs(15), || async {
        match client.get(other.url("/storage/some%20key")).send().await {
            Ok(r) if r.status() == StatusCode::OK => {
                r.bytes().await.map(|b| b.to_vec()).ok() == Some(vec![0u8, 1, 2, 255])
            }
            _ => false,
        }
    })
    .await;
    assert!(back, "value did not come back after recovery");
}

#[tokio::test]
async fn test_leave_over_http() {
    let client = reqwest::Client::new();
    let a = prepare_node().await;
    let b = prepare_node().await;
    let c = prepare_node().await;
    for n in [&b, &c] {
        client
            .post(n.url("/join"))
            .query(&[("nprime", a.addr.as_str())])
            .send()
            .await
            .unwrap();
    }
    let nodes = [&a, &b, &c];
    assert!(wait_until(Duration::from_secs(15), || ring_closed(&client, &nodes)).await);

    for i in 0..10 {
        let resp = client
            .put(a.url(&format!("/storage/k{i}")))
            .body(format!("v{i}"))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    for _ in 0..2 {
        let resp = client.post(b.url("/leave")).send().await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }
    let resp = client.get(b.url("/storage/k0")).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);

    let rest = [&a, &c];
    assert!(wait_until(Duration::from_secs(15), || ring_closed(&client, &rest)).await);
    for i in 0..10 {
        let resp = client
            .get(c.url(&format!("/storage/k{i}")))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.text().await.unwrap(), format!("v{i}"));
    }
}

#[tokio::test]
async fn test_join_errors() {
    let client = reqwest::Client::new();
    let node = prepare_node().await;

    let resp = client
        .post(node.url("/join"))
        .query(&[("nprime", dead_addr().as_str())])
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);

    let resp = client.post(node.url("/join")).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    // joining through itself changes nothing
    let resp = client
        .post(node.url("/join"))
        .query(&[("nprime", node.addr.as_str())])
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let info = node_info(&client, &node).await.unwrap();
    assert_eq!(info.successor, node.addr);
}

#[tokio::test]
async fn test_set_network() {
    let client = reqwest::Client::new();
    let nodes = [
        prepare_node().await,
        prepare_node().await,
        prepare_node().await,
    ];
    let members = nodes
        .iter()
        .map(|n| n.addr.clone())
        .collect::<Vec<_>>()
        .join(",");
    for n in nodes.iter() {
        let resp = client
            .put(n.url("/network"))
            .query(&[("network", members.as_str())])
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }
    let refs = nodes.iter().collect::<Vec<_>>();
    assert!(wait_until(Duration::from_secs(5), || ring_closed(&client, &refs)).await);

    let walk: Vec<String> = client
        .get(nodes[0].url("/network"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(walk.len(), 3);

    let resp = client
        .put(nodes[0].url("/network"))
        .query(&[("network", " , ")])
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}
