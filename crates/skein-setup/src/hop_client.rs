//! Hop client -- drives one remote visor's rule engine.
//!
//! Each operation opens a fresh channel, exchanges exactly one
//! request/response frame pair, and releases the channel on every exit path.
//! Channel close failures are logged and never alter the outcome.

use serde::de::DeserializeOwned;
use serde::Serialize;
use skein_routing::{LoopData, PublicKey, RouteID, Rule};
use tokio::io::AsyncWriteExt;

use crate::error::SetupError;
use crate::messenger::Messenger;
use crate::proto::{PacketType, SetupProtocol};

pub struct HopClient<'a, M: Messenger> {
    messenger: &'a M,
}

impl<'a, M: Messenger> HopClient<'a, M> {
    pub fn new(messenger: &'a M) -> Self {
        Self { messenger }
    }

    /// Ask `on` to issue a fresh route id.
    pub async fn request_route_id(&self, on: PublicKey) -> Result<RouteID, SetupError> {
        tracing::debug!(%on, "requesting route id");
        let route_id: RouteID = self.round_trip(on, PacketType::RequestRouteId, &()).await?;
        tracing::info!(%on, route_id, "received route id");
        Ok(route_id)
    }

    /// Install a forwarding or delivery rule on `on`.
    pub async fn add_rule(&self, on: PublicKey, rule: &Rule) -> Result<(), SetupError> {
        tracing::debug!(%on, kind = rule.kind(), route_id = rule.route_id(), "installing rule");
        self.round_trip::<(), _>(on, PacketType::AddRule, rule).await?;
        tracing::info!(%on, kind = rule.kind(), "rule installed");
        Ok(())
    }

    /// Tell endpoint `on` to bind the loop locally.
    pub async fn confirm_loop(&self, on: PublicKey, ld: &LoopData) -> Result<(), SetupError> {
        self.round_trip::<(), _>(on, PacketType::ConfirmLoop, ld).await?;
        tracing::info!(
            %on,
            remote = %ld.endpoints.remote,
            local_port = ld.endpoints.local.port,
            "loop confirmed"
        );
        Ok(())
    }

    /// Tell endpoint `on` the loop is gone.
    pub async fn loop_closed(&self, on: PublicKey, ld: &LoopData) -> Result<(), SetupError> {
        self.round_trip::<(), _>(on, PacketType::LoopClosed, ld).await?;
        Ok(())
    }

    async fn round_trip<T: DeserializeOwned, B: Serialize>(
        &self,
        on: PublicKey,
        packet_type: PacketType,
        body: &B,
    ) -> Result<T, SetupError> {
        let channel = self.messenger.dial(on).await?;
        let mut proto = SetupProtocol::new(channel);

        let result = async {
            proto.write_request(packet_type, body).await?;
            proto.read_response::<T>().await
        }
        .await;

        if let Err(e) = proto.get_mut().shutdown().await {
            tracing::warn!(%on, "failed to close channel: {e}");
        }
        result
    }
}
