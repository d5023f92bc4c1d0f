//! ringkv-node service run with `Swarm` and chord stabilization.
#![warn(missing_docs)]
mod http_error;

use std::net::TcpListener;
use std::sync::Arc;

use axum::extract::Path;
use axum::extract::Query;
use axum::extract::State;
use axum::http::header::CONTENT_TYPE;
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::routing::post;
use axum::Json;
use axum::Router;
use bytes::Bytes;
use serde::Deserialize;

pub use self::http_error::HttpError;
use crate::prelude::ringkv_core::dht::LeaveNotice;
use crate::prelude::ringkv_core::dht::TopoInfo;
use crate::prelude::ringkv_core::storage::Entry;
use crate::prelude::ringkv_core::swarm::FindSuccessorStep;
use crate::prelude::ringkv_core::swarm::NodeInfo;
use crate::prelude::Peer;
use crate::prelude::Swarm;
use crate::transport::FindSuccessorRequest;
use crate::transport::DIRECT_HEADER;
use crate::util::split_members;

type NodeState = State<Arc<Swarm>>;

/// Query of `POST /join`.
#[derive(Debug, Deserialize)]
pub struct JoinParams {
    /// Contact address.
    pub nprime: String,
}

/// Query of `PUT /network`.
#[derive(Debug, Deserialize)]
pub struct NetworkParams {
    /// Comma separated member addresses.
    pub network: String,
}

/// Every route of a node, public and node-to-node.
pub fn router(swarm: Arc<Swarm>) -> Router {
    Router::new()
        .route("/storage/:key", get(storage_get_handler).put(storage_put_handler))
        .route("/node-info", get(node_info_handler))
        .route("/join", post(join_handler))
        .route("/leave", post(leave_handler))
        .route("/sim-crash", post(crash_handler))
        .route("/sim-recover", post(recover_handler))
        .route("/network", get(network_handler).put(set_network_handler))
        .route("/ping", get(ping_handler))
        .route("/chord/find-successor", post(find_successor_handler))
        .route("/chord/topo", get(topo_handler))
        .route("/chord/notify", post(notify_handler))
        .route("/chord/release", post(release_handler))
        .route("/chord/transfer", post(transfer_handler))
        .route("/chord/leave-notice", post(leave_notice_handler))
        .layer(axum::middleware::from_fn(node_info_header))
        .with_state(swarm)
}

/// Serve the node on an already bound listener.
pub async fn serve(listener: TcpListener, swarm: Arc<Swarm>) -> anyhow::Result<()> {
    listener.set_nonblocking(true)?;
    tracing::info!(
        "ringkv node {} listening on http://{}",
        swarm.peer(),
        listener.local_addr()?
    );
    axum::Server::from_tcp(listener)?
        .serve(router(swarm).into_make_service())
        .await?;
    Ok(())
}

async fn node_info_header<B>(
    req: axum::http::Request<B>,
    next: axum::middleware::Next<B>,
) -> axum::response::Response {
    let mut res = next.run(req).await;
    let headers = res.headers_mut();

    if let Ok(version) = http::HeaderValue::from_str(crate::util::build_version().as_str()) {
        headers.insert("x-node-version", version);
    }
    res
}

fn is_direct(headers: &HeaderMap) -> bool {
    headers
        .get(DIRECT_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim() == "1")
        .unwrap_or(false)
}

async fn storage_get_handler(
    State(swarm): NodeState,
    Path(key): Path<String>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, HttpError> {
    let value = swarm.get(&key, is_direct(&headers)).await?;
    Ok(([(CONTENT_TYPE, "application/octet-stream")], value))
}

async fn storage_put_handler(
    State(swarm): NodeState,
    Path(key): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(), HttpError> {
    swarm.put(&key, body.to_vec(), is_direct(&headers)).await?;
    Ok(())
}

async fn node_info_handler(State(swarm): NodeState) -> Result<Json<NodeInfo>, HttpError> {
    Ok(Json(swarm.node_info()?))
}

async fn join_handler(
    State(swarm): NodeState,
    Query(params): Query<JoinParams>,
) -> Result<(), HttpError> {
    if params.nprime.trim().is_empty() {
        return Err(HttpError::BadRequest("empty nprime".to_string()));
    }
    swarm.join(params.nprime.trim()).await?;
    Ok(())
}

async fn leave_handler(State(swarm): NodeState) -> Result<(), HttpError> {
    Ok(swarm.leave().await?)
}

async fn crash_handler(State(swarm): NodeState) -> Result<(), HttpError> {
    Ok(swarm.crash()?)
}

async fn recover_handler(State(swarm): NodeState) -> Result<(), HttpError> {
    Ok(swarm.recover()?)
}

async fn network_handler(State(swarm): NodeState) -> Result<Json<Vec<String>>, HttpError> {
    Ok(Json(swarm.walk_network().await?))
}

async fn set_network_handler(
    State(swarm): NodeState,
    Query(params): Query<NetworkParams>,
) -> Result<(), HttpError> {
    let members = split_members(&params.network);
    if members.is_empty() {
        return Err(HttpError::BadRequest("empty network".to_string()));
    }
    Ok(swarm.set_network(&members)?)
}

async fn ping_handler(State(swarm): NodeState) -> Result<&'static str, HttpError> {
    swarm.handle_ping()?;
    Ok("pong")
}

async fn find_successor_handler(
    State(swarm): NodeState,
    Json(req): Json<FindSuccessorRequest>,
) -> Result<Json<FindSuccessorStep>, HttpError> {
    Ok(Json(swarm.handle_find_successor(req.did)?))
}

async fn topo_handler(State(swarm): NodeState) -> Result<Json<TopoInfo>, HttpError> {
    Ok(Json(swarm.handle_topo_info()?))
}

async fn notify_handler(
    State(swarm): NodeState,
    Json(peer): Json<Peer>,
) -> Result<Json<Vec<Entry>>, HttpError> {
    Ok(Json(swarm.handle_notify(peer).await?))
}

async fn release_handler(
    State(swarm): NodeState,
    Json(keys): Json<Vec<String>>,
) -> Result<(), HttpError> {
    Ok(swarm.handle_release(keys).await?)
}

async fn transfer_handler(
    State(swarm): NodeState,
    Json(entries): Json<Vec<Entry>>,
) -> Result<(), HttpError> {
    Ok(swarm.handle_transfer(entries).await?)
}

async fn leave_notice_handler(
    State(swarm): NodeState,
    Json(notice): Json<LeaveNotice>,
) -> Result<(), HttpError> {
    Ok(swarm.handle_leave_notice(notice)?)
}
