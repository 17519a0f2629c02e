//! Setup node -- accept loop, request dispatch, and loop lifecycle.
//!
//! Every inbound channel carries exactly one framed request and receives
//! exactly one response frame. Loop creation builds the reverse route, then
//! the forward route, then cross-confirms both endpoints; a failed initiator
//! confirmation rolls the responder back with a best-effort LoopClosed. The
//! node keeps no per-loop state once the response is written.

use std::sync::Arc;
use std::time::Instant;

use skein_routing::{Addr, Loop, LoopData, LoopDescriptor, PublicKey};
use tokio_util::sync::CancellationToken;

use crate::error::SetupError;
use crate::hop_client::HopClient;
use crate::messenger::{Messenger, SetupChannel};
use crate::metrics::Recorder;
use crate::proto::{Frame, PacketType, SetupProtocol};
use crate::route_builder::build_route;

pub struct SetupNode<M: Messenger, R: Recorder> {
    messenger: Arc<M>,
    metrics: Arc<R>,
    server_count: u16,
}

impl<M: Messenger, R: Recorder> Clone for SetupNode<M, R> {
    fn clone(&self) -> Self {
        Self {
            messenger: self.messenger.clone(),
            metrics: self.metrics.clone(),
            server_count: self.server_count,
        }
    }
}

impl<M: Messenger, R: Recorder> SetupNode<M, R> {
    pub fn new(messenger: Arc<M>, metrics: Arc<R>, server_count: u16) -> Self {
        Self { messenger, metrics, server_count }
    }

    pub fn local_pk(&self) -> PublicKey {
        self.messenger.local_pk()
    }

    /// Accept-and-dispatch loop. Returns when `shutdown` fires or the
    /// messenger fails to accept; accept failures are terminal.
    pub async fn serve(&self, shutdown: CancellationToken) -> Result<(), SetupError> {
        if self.server_count > 0 {
            self.messenger
                .init_server_connections(self.server_count)
                .await
                .map_err(|e| SetupError::Messaging(Box::new(e)))?;
            tracing::info!(count = self.server_count, "connected to messaging servers");
        }

        tracing::info!(local = %self.local_pk(), "setup node accepting requests");
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    tracing::info!("shutdown signal, stopping accept loop");
                    return Ok(());
                }
                accepted = self.messenger.accept() => {
                    let channel = accepted?;
                    let node = self.clone();
                    tokio::spawn(async move {
                        if let Err(e) = node.serve_channel(channel).await {
                            tracing::warn!("failed to serve channel: {e}");
                        }
                    });
                }
            }
        }
    }

    /// Shut the underlying messenger down.
    pub async fn close(&self) -> Result<(), SetupError> {
        self.messenger.close().await
    }

    /// Handle one inbound channel: one request frame in, one response frame
    /// out, one metrics record.
    async fn serve_channel(&self, channel: M::Channel) -> Result<(), SetupError> {
        let edges = channel.edges();
        let mut proto = SetupProtocol::new(channel);

        let frame = proto.read_frame().await?;
        tracing::info!(packet_type = frame.packet_type, "got new setup request");

        let started = Instant::now();
        let outcome = self.dispatch(&frame, edges).await;
        self.metrics.record(started.elapsed(), outcome.is_err());

        match &outcome {
            Ok(()) => {
                tracing::info!(packet_type = frame.packet_type, "completed setup request");
                proto.write_success(&serde_json::Value::Null).await?;
            }
            Err(e) => {
                tracing::warn!(packet_type = frame.packet_type, error = %e, "setup request failed");
                proto.write_failure(&e.to_string()).await?;
            }
        }

        if let Err(e) = tokio::io::AsyncWriteExt::shutdown(proto.get_mut()).await {
            tracing::warn!("failed to close channel: {e}");
        }
        Ok(())
    }

    async fn dispatch(&self, frame: &Frame, edges: [PublicKey; 2]) -> Result<(), SetupError> {
        match PacketType::from_code(frame.packet_type) {
            Some(PacketType::CreateLoop) => {
                let ld: LoopDescriptor = serde_json::from_slice(&frame.payload)?;
                self.create_loop(ld).await
            }
            Some(PacketType::CloseLoop) => {
                let ld: LoopData = serde_json::from_slice(&frame.payload)?;
                self.serve_close(ld, edges).await
            }
            _ => Err(SetupError::Policy("unknown foundation packet".into())),
        }
    }

    /// Provision both directions of a loop and cross-confirm its endpoints.
    pub async fn create_loop(&self, ld: LoopDescriptor) -> Result<(), SetupError> {
        tracing::info!(descriptor = %ld, "creating loop");

        // Reverse first: if the forward build fails, only reverse-side rules
        // are left to age out.
        let reverse_route_id = build_route(
            self.messenger.clone(),
            ld.expiry,
            &ld.reverse,
            ld.endpoints.local.port,
            ld.endpoints.remote.port,
        )
        .await?;
        let forward_route_id = build_route(
            self.messenger.clone(),
            ld.expiry,
            &ld.forward,
            ld.endpoints.remote.port,
            ld.endpoints.local.port,
        )
        .await?;

        let (Some(initiator), Some(responder)) = (ld.initiator(), ld.responder()) else {
            // Direct loop between colocated endpoints: nothing to confirm.
            return Ok(());
        };

        let client = HopClient::new(&*self.messenger);

        let ld_responder = LoopData {
            endpoints: Loop {
                remote: Addr { pk: initiator, port: ld.endpoints.local.port },
                local: Addr { pk: responder, port: ld.endpoints.remote.port },
            },
            route_id: reverse_route_id,
        };
        if let Err(e) = client.confirm_loop(responder, &ld_responder).await {
            tracing::warn!(%responder, error = %e, "failed to confirm loop with responder");
            return Err(SetupError::LoopConnect(Box::new(e)));
        }

        let ld_initiator = LoopData {
            endpoints: Loop {
                remote: Addr { pk: responder, port: ld.endpoints.remote.port },
                local: Addr { pk: initiator, port: ld.endpoints.local.port },
            },
            route_id: forward_route_id,
        };
        if let Err(e) = client.confirm_loop(initiator, &ld_initiator).await {
            tracing::warn!(%initiator, error = %e, "failed to confirm loop with initiator");
            if let Err(close_err) = self.close_loop(responder, &ld_responder).await {
                tracing::warn!(%responder, error = %close_err, "failed to roll back responder confirmation");
            }
            return Err(SetupError::LoopConnect(Box::new(e)));
        }

        tracing::info!(descriptor = %ld, "loop created");
        Ok(())
    }

    /// Notify `on` that a loop it participates in is closed.
    pub async fn close_loop(&self, on: PublicKey, ld: &LoopData) -> Result<(), SetupError> {
        let client = HopClient::new(&*self.messenger);
        client.loop_closed(on, ld).await?;
        tracing::info!(%on, local_port = ld.endpoints.local.port, "loop closed");
        Ok(())
    }

    /// Dispatch an inbound CloseLoop: the recipient is the other channel
    /// edge, and it sees the loop from its own perspective.
    async fn serve_close(&self, ld: LoopData, edges: [PublicKey; 2]) -> Result<(), SetupError> {
        let Some(recipient) = self.remote_edge(edges) else {
            return Err(SetupError::Policy("configured PubKey not found in edges".into()));
        };

        let forwarded = LoopData {
            endpoints: Loop { local: ld.endpoints.remote, remote: ld.endpoints.local },
            route_id: ld.route_id,
        };
        self.close_loop(recipient, &forwarded).await
    }

    fn remote_edge(&self, edges: [PublicKey; 2]) -> Option<PublicKey> {
        let local = self.messenger.local_pk();
        if edges[0] == local {
            Some(edges[1])
        } else if edges[1] == local {
            Some(edges[0])
        } else {
            None
        }
    }
}
