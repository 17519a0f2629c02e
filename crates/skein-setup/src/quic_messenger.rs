//! QUIC messenger adapter -- setup channels by public key.
//!
//! One QUIC connection per peer, one bidirectional stream per setup channel.
//! The dialer writes its 32-byte public key as a stream preamble so the
//! acceptor learns the remote edge. Cryptographic peer authentication belongs
//! to the messaging system proper, not this adapter.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::pin::Pin;
use std::task::{Context, Poll};

use async_trait::async_trait;
use skein_routing::PublicKey;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::sync::{mpsc, Mutex};

use crate::discovery::Discovery;
use crate::error::SetupError;
use crate::identity::NodeIdentity;
use crate::messenger::{Messenger, SetupChannel};
use crate::tls;

/// Inbound channels queued between the accept tasks and `accept()` callers.
const INCOMING_BACKLOG: usize = 64;

pub struct QuicMessenger {
    local: PublicKey,
    endpoint: quinn::Endpoint,
    client_config: quinn::ClientConfig,
    discovery: Discovery,
    conns: Mutex<HashMap<PublicKey, quinn::Connection>>,
    server_conns: Mutex<Vec<quinn::Connection>>,
    incoming: Mutex<mpsc::Receiver<QuicChannel>>,
}

impl QuicMessenger {
    /// Bind the endpoint, register the node with discovery, and start the
    /// accept loop feeding `accept()`.
    pub async fn new(
        identity: &NodeIdentity,
        listen_addr: SocketAddr,
        discovery: Discovery,
    ) -> Result<Self, SetupError> {
        let server_config = tls::server_config(identity.pkcs8_der())?;
        let client_config = tls::client_config()?;
        let endpoint = quinn::Endpoint::server(server_config, listen_addr)
            .map_err(|e| SetupError::Transport(format!("bind {listen_addr}: {e}")))?;

        let local = identity.public_key();
        let local_addr = endpoint
            .local_addr()
            .map_err(|e| SetupError::Transport(e.to_string()))?;
        discovery.register(local, local_addr).await?;
        tracing::info!(%local, addr = %local_addr, "registered with discovery");

        let (tx, rx) = mpsc::channel(INCOMING_BACKLOG);
        tokio::spawn(accept_loop(endpoint.clone(), local, tx));

        Ok(Self {
            local,
            endpoint,
            client_config,
            discovery,
            conns: Mutex::new(HashMap::new()),
            server_conns: Mutex::new(Vec::new()),
            incoming: Mutex::new(rx),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, SetupError> {
        self.endpoint
            .local_addr()
            .map_err(|e| SetupError::Transport(e.to_string()))
    }

    async fn connect(&self, addr: SocketAddr) -> Result<quinn::Connection, SetupError> {
        let connecting = self
            .endpoint
            .connect_with(self.client_config.clone(), addr, tls::SERVER_NAME)
            .map_err(|e| SetupError::Transport(format!("connect {addr}: {e}")))?;
        connecting
            .await
            .map_err(|e| SetupError::Transport(format!("connect {addr}: {e}")))
    }

    /// Reuse the live connection to `remote` or dial a fresh one via discovery.
    async fn connection(&self, remote: PublicKey) -> Result<quinn::Connection, SetupError> {
        if let Some(conn) = self.conns.lock().await.get(&remote) {
            if conn.close_reason().is_none() {
                return Ok(conn.clone());
            }
        }

        let addr = self.discovery.resolve(remote).await?;
        let conn = self.connect(addr).await?;
        self.conns.lock().await.insert(remote, conn.clone());
        tracing::debug!(%remote, %addr, "peer connection established");
        Ok(conn)
    }
}

#[async_trait]
impl Messenger for QuicMessenger {
    type Channel = QuicChannel;

    async fn dial(&self, remote: PublicKey) -> Result<Self::Channel, SetupError> {
        let conn = self.connection(remote).await?;
        let (mut send, recv) = conn
            .open_bi()
            .await
            .map_err(|e| SetupError::Transport(format!("open channel: {e}")))?;
        send.write_all(self.local.as_bytes())
            .await
            .map_err(|e| SetupError::Transport(format!("channel preamble: {e}")))?;
        Ok(QuicChannel { send, recv, edges: [self.local, remote] })
    }

    async fn accept(&self) -> Result<Self::Channel, SetupError> {
        self.incoming
            .lock()
            .await
            .recv()
            .await
            .ok_or_else(|| SetupError::Transport("endpoint closed".into()))
    }

    async fn init_server_connections(&self, count: u16) -> Result<(), SetupError> {
        let servers = self.discovery.servers().await?;
        if servers.len() < count as usize {
            return Err(SetupError::Transport(format!(
                "discovery lists {} messaging servers, need {count}",
                servers.len()
            )));
        }

        let mut established = Vec::with_capacity(count as usize);
        for addr in servers.into_iter().take(count as usize) {
            established.push(self.connect(addr).await?);
            tracing::debug!(%addr, "messaging server connection established");
        }
        self.server_conns.lock().await.extend(established);
        Ok(())
    }

    fn local_pk(&self) -> PublicKey {
        self.local
    }

    async fn close(&self) -> Result<(), SetupError> {
        self.endpoint.close(quinn::VarInt::from_u32(0), b"shutdown");
        Ok(())
    }
}

/// Accept QUIC connections and spawn a stream acceptor per connection.
async fn accept_loop(
    endpoint: quinn::Endpoint,
    local: PublicKey,
    tx: mpsc::Sender<QuicChannel>,
) {
    while let Some(incoming) = endpoint.accept().await {
        let tx = tx.clone();
        tokio::spawn(async move {
            match incoming.await {
                Ok(conn) => {
                    tracing::debug!(remote = %conn.remote_address(), "accepted inbound connection");
                    serve_connection(conn, local, tx).await;
                }
                Err(e) => {
                    tracing::warn!("failed to accept connection: {e}");
                }
            }
        });
    }
    tracing::info!("endpoint closed, stopping accept loop");
}

/// Accept bidirectional streams on one connection; each stream becomes a
/// setup channel once its public-key preamble arrives.
async fn serve_connection(conn: quinn::Connection, local: PublicKey, tx: mpsc::Sender<QuicChannel>) {
    let remote_addr = conn.remote_address();
    loop {
        match conn.accept_bi().await {
            Ok((send, mut recv)) => {
                let tx = tx.clone();
                tokio::spawn(async move {
                    let mut pk_buf = [0u8; 32];
                    if let Err(e) = recv.read_exact(&mut pk_buf).await {
                        tracing::debug!("failed to read channel preamble: {e}");
                        return;
                    }
                    let remote = PublicKey::from_bytes(pk_buf);
                    let channel = QuicChannel { send, recv, edges: [local, remote] };
                    let _ = tx.send(channel).await;
                });
            }
            Err(quinn::ConnectionError::ApplicationClosed(_)) => {
                tracing::debug!(remote = %remote_addr, "connection closed by peer");
                break;
            }
            Err(e) => {
                tracing::debug!(remote = %remote_addr, "connection error: {e}");
                break;
            }
        }
    }
}

/// One bidirectional QUIC stream carrying a single setup request/response.
pub struct QuicChannel {
    send: quinn::SendStream,
    recv: quinn::RecvStream,
    edges: [PublicKey; 2],
}

impl SetupChannel for QuicChannel {
    fn edges(&self) -> [PublicKey; 2] {
        self.edges
    }
}

impl AsyncRead for QuicChannel {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.get_mut().recv).poll_read(cx, buf)
    }
}

impl AsyncWrite for QuicChannel {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        AsyncWrite::poll_write(Pin::new(&mut self.get_mut().send), cx, buf)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        AsyncWrite::poll_flush(Pin::new(&mut self.get_mut().send), cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        AsyncWrite::poll_shutdown(Pin::new(&mut self.get_mut().send), cx)
    }
}
