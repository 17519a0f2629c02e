//! Skein Setup Node -- trusted coordinator that installs loop forwarding rules.
//!
//! An initiating visor asks the setup node to create or tear down a loop. The
//! node acquires a route id from every hop, installs chained forwarding rules
//! concurrently, confirms both endpoints, and writes exactly one response per
//! inbound request. All authoritative loop state lives on the endpoint
//! visors; the node itself is stateless between requests.

pub mod config;
pub mod discovery;
pub mod error;
pub mod hop_client;
pub mod identity;
pub mod messenger;
pub mod metrics;
pub mod node;
pub mod proto;
pub mod quic_messenger;
pub mod route_builder;
pub mod tls;

pub use config::SetupConfig;
pub use error::SetupError;
pub use messenger::{Messenger, SetupChannel};
pub use metrics::{NoopRecorder, Recorder};
pub use node::SetupNode;
