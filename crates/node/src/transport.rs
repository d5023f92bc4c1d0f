//! [RingTransport] over HTTP.
//!
//! Maintenance calls (`/chord/...`, `/ping`) use a client with a short timeout, forwarded
//! storage requests one with a longer timeout. Whatever keeps an answer from arriving,
//! a refused connection, a timeout or a node answering 503, is reported as
//! [CoreError::NodeCrashed] so the caller runs its failure handling. A storage request
//! refused with 421 becomes [CoreError::NotOwner].
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use reqwest::RequestBuilder;
use reqwest::Response;
use reqwest::StatusCode;
use reqwest::Url;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde::Serialize;

use crate::config::Config;
use crate::error::Error;
use crate::error::Result;
use crate::prelude::ringkv_core::dht::LeaveNotice;
use crate::prelude::ringkv_core::dht::TopoInfo;
use crate::prelude::ringkv_core::error::Error as CoreError;
use crate::prelude::ringkv_core::error::Result as CoreResult;
use crate::prelude::ringkv_core::storage::Entry;
use crate::prelude::ringkv_core::swarm::FindSuccessorStep;
use crate::prelude::ringkv_core::swarm::RingTransport;
use crate::prelude::Did;
use crate::prelude::Peer;

/// Header marking a request already routed to its owner.
pub const DIRECT_HEADER: &str = "x-ringkv-direct";

/// Body of `/chord/find-successor`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FindSuccessorRequest {
    pub did: Did,
}

pub struct HttpTransport {
    rpc: Client,
    forward: Client,
}

impl HttpTransport {
    pub fn new(rpc_timeout: Duration, forward_timeout: Duration) -> Result<Self> {
        Ok(Self {
            rpc: Client::builder().timeout(rpc_timeout).build()?,
            forward: Client::builder().timeout(forward_timeout).build()?,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(config.rpc_timeout(), config.forward_timeout())
    }

    fn url(peer: &Peer, path: &[&str]) -> CoreResult<Url> {
        let mut url = Url::parse(&format!("http://{}/", peer.addr))
            .map_err(|_| CoreError::InvalidAddress(peer.addr.clone()))?;
        url.path_segments_mut()
            .map_err(|_| CoreError::InvalidAddress(peer.addr.clone()))?
            .clear()
            .extend(path);
        Ok(url)
    }

    async fn send(peer: &Peer, req: RequestBuilder) -> CoreResult<Response> {
        let resp = Self::send_unchecked(peer, req).await?;
        Self::check(peer, resp).await
    }

    async fn send_unchecked(peer: &Peer, req: RequestBuilder) -> CoreResult<Response> {
        req.send().await.map_err(|e| {
            tracing::debug!("request to {} failed: {}", peer, e);
            CoreError::NodeCrashed(peer.addr.clone())
        })
    }

    /// Like [Self::check], knowing the answer is about `key`.
    async fn check_storage(peer: &Peer, key: &str, resp: Response) -> CoreResult<Response> {
        match resp.status() {
            StatusCode::NOT_FOUND => Err(CoreError::KeyNotFound(key.to_string())),
            StatusCode::MISDIRECTED_REQUEST => Err(CoreError::NotOwner(key.to_string())),
            _ => Self::check(peer, resp).await,
        }
    }

    async fn check(peer: &Peer, resp: Response) -> CoreResult<Response> {
        match resp.status() {
            s if s.is_success() => Ok(resp),
            StatusCode::SERVICE_UNAVAILABLE => Err(CoreError::NodeCrashed(peer.addr.clone())),
            s => {
                let body = resp.text().await.unwrap_or_default();
                Err(CoreError::RemoteRpcError(
                    peer.addr.clone(),
                    Error::RemoteStatus(peer.addr.clone(), s.as_u16(), body).to_string(),
                ))
            }
        }
    }

    async fn json<T: DeserializeOwned>(peer: &Peer, req: RequestBuilder) -> CoreResult<T> {
        Self::send(peer, req)
            .await?
            .json()
            .await
            .map_err(|e| CoreError::RemoteRpcError(peer.addr.clone(), e.to_string()))
    }
}

#[async_trait]
impl RingTransport for HttpTransport {
    async fn find_successor(&self, peer: &Peer, did: Did) -> CoreResult<FindSuccessorStep> {
        let url = Self::url(peer, &["chord", "find-successor"])?;
        let req = self.rpc.post(url).json(&FindSuccessorRequest { did });
        Self::json(peer, req).await
    }

    async fn topo_info(&self, peer: &Peer) -> CoreResult<TopoInfo> {
        let url = Self::url(peer, &["chord", "topo"])?;
        Self::json(peer, self.rpc.get(url)).await
    }

    async fn notify(&self, peer: &Peer, me: &Peer) -> CoreResult<Vec<Entry>> {
        let url = Self::url(peer, &["chord", "notify"])?;
        // carries entries
        Self::json(peer, self.forward.post(url).json(me)).await
    }

    async fn release(&self, peer: &Peer, keys: Vec<String>) -> CoreResult<()> {
        let url = Self::url(peer, &["chord", "release"])?;
        Self::send(peer, self.rpc.post(url).json(&keys))
            .await
            .map(|_| ())
    }

    async fn ping(&self, peer: &Peer) -> CoreResult<()> {
        let url = Self::url(peer, &["ping"])?;
        Self::send(peer, self.rpc.get(url)).await.map(|_| ())
    }

    async fn transfer(&self, peer: &Peer, entries: Vec<Entry>) -> CoreResult<()> {
        let url = Self::url(peer, &["chord", "transfer"])?;
        Self::send(peer, self.forward.post(url).json(&entries))
            .await
            .map(|_| ())
    }

    async fn leave_notice(&self, peer: &Peer, notice: LeaveNotice) -> CoreResult<()> {
        let url = Self::url(peer, &["chord", "leave-notice"])?;
        Self::send(peer, self.rpc.post(url).json(&notice))
            .await
            .map(|_| ())
    }

    async fn storage_get(&self, peer: &Peer, key: &str) -> CoreResult<Vec<u8>> {
        let url = Self::url(peer, &["storage", key])?;
        let req = self.forward.get(url).header(DIRECT_HEADER, "1");
        let resp = Self::send_unchecked(peer, req).await?;
        Self::check_storage(peer, key, resp)
            .await?
            .bytes()
            .await
            .map(|b| b.to_vec())
            .map_err(|_| CoreError::NodeCrashed(peer.addr.clone()))
    }

    async fn storage_put(&self, peer: &Peer, key: &str, value: Vec<u8>) -> CoreResult<()> {
        let url = Self::url(peer, &["storage", key])?;
        let req = self
            .forward
            .put(url)
            .header(DIRECT_HEADER, "1")
            .header(CONTENT_TYPE, "application/octet-stream")
            .body(value);
        let resp = Self::send_unchecked(peer, req).await?;
        Self::check_storage(peer, key, resp).await.map(|_| ())
    }
}
