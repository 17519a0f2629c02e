//! Messenger seam -- dial/accept of peer channels addressed by public key.
//!
//! The encrypted messaging system itself is an external collaborator; the
//! setup node only needs this surface. `QuicMessenger` is the bundled
//! adapter; tests supply an in-memory implementation.

use async_trait::async_trait;
use skein_routing::PublicKey;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::error::SetupError;

/// One logical channel to a remote visor. Single-request/single-response:
/// callers write one frame, read one frame, then release the channel.
pub trait SetupChannel: AsyncRead + AsyncWrite + Unpin + Send + 'static {
    /// The two visors on this channel, ordered `[local, remote]`.
    fn edges(&self) -> [PublicKey; 2];
}

#[async_trait]
pub trait Messenger: Send + Sync + 'static {
    type Channel: SetupChannel;

    /// Open a fresh channel to `remote`.
    async fn dial(&self, remote: PublicKey) -> Result<Self::Channel, SetupError>;

    /// Wait for the next inbound channel. Errors are terminal for the caller's
    /// accept loop.
    async fn accept(&self) -> Result<Self::Channel, SetupError>;

    /// Pre-establish `count` upstream messaging-server connections before
    /// accepting traffic.
    async fn init_server_connections(&self, count: u16) -> Result<(), SetupError>;

    /// Identity this messenger speaks as.
    fn local_pk(&self) -> PublicKey;

    /// Shut the messenger down. Idempotent.
    async fn close(&self) -> Result<(), SetupError> {
        Ok(())
    }
}
