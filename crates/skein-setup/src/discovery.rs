//! Discovery client for the messaging layer.
//!
//! Maps public keys to reachable socket addresses and lists the messaging
//! servers the setup node may pre-connect to at startup.

use std::net::SocketAddr;

use serde::{Deserialize, Serialize};
use skein_routing::PublicKey;

use crate::error::SetupError;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct AddrEntry {
    addr: SocketAddr,
}

#[derive(Debug, Clone, Deserialize)]
struct ServerList {
    servers: Vec<SocketAddr>,
}

#[derive(Clone)]
pub struct Discovery {
    base: String,
    client: reqwest::Client,
}

impl Discovery {
    pub fn new(base: impl Into<String>) -> Self {
        let mut base = base.into();
        while base.ends_with('/') {
            base.pop();
        }
        Self { base, client: reqwest::Client::new() }
    }

    /// Advertise where this node can be dialled.
    pub async fn register(&self, pk: PublicKey, addr: SocketAddr) -> Result<(), SetupError> {
        let url = format!("{}/addrs/{}", self.base, pk);
        let resp = self
            .client
            .put(&url)
            .json(&AddrEntry { addr })
            .send()
            .await
            .map_err(|e| SetupError::Transport(format!("discovery: {e}")))?;
        if !resp.status().is_success() {
            return Err(SetupError::Transport(format!(
                "discovery: register returned {}",
                resp.status()
            )));
        }
        Ok(())
    }

    /// Resolve the socket address a visor is reachable at.
    pub async fn resolve(&self, pk: PublicKey) -> Result<SocketAddr, SetupError> {
        let url = format!("{}/addrs/{}", self.base, pk);
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| SetupError::Transport(format!("discovery: {e}")))?;
        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(SetupError::Transport(format!("no address registered for {pk}")));
        }
        if !resp.status().is_success() {
            return Err(SetupError::Transport(format!(
                "discovery: resolve returned {}",
                resp.status()
            )));
        }
        let entry: AddrEntry = resp
            .json()
            .await
            .map_err(|e| SetupError::Transport(format!("discovery: {e}")))?;
        Ok(entry.addr)
    }

    /// Messaging servers available for upstream connections.
    pub async fn servers(&self) -> Result<Vec<SocketAddr>, SetupError> {
        let url = format!("{}/servers", self.base);
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| SetupError::Transport(format!("discovery: {e}")))?;
        if !resp.status().is_success() {
            return Err(SetupError::Transport(format!(
                "discovery: servers returned {}",
                resp.status()
            )));
        }
        let list: ServerList = resp
            .json()
            .await
            .map_err(|e| SetupError::Transport(format!("discovery: {e}")))?;
        Ok(list.servers)
    }
}
