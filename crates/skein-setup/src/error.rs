//! Setup node error kinds.
//!
//! Five base kinds (transport, protocol, remote, policy, cancelled) plus
//! context wrappers whose rendered prefixes are part of the observable
//! failure messages sent back to requesters.

#[derive(Debug, thiserror::Error)]
pub enum SetupError {
    /// Dial, send, receive, or close of a peer channel failed.
    #[error("transport: {0}")]
    Transport(String),

    /// Frame decode, JSON decode, or an unexpected packet code.
    #[error("protocol: {0}")]
    Protocol(String),

    /// The peer answered with a failure response; carries its message verbatim.
    #[error("{0}")]
    Remote(String),

    /// The request violates a precondition.
    #[error("{0}")]
    Policy(String),

    /// The surrounding scope was cancelled. Never surfaced as the primary
    /// error of a route build.
    #[error("cancelled")]
    Cancelled,

    /// A per-hop provisioning step failed.
    #[error("rule setup: {0}")]
    RuleSetup(#[source] Box<SetupError>),

    /// The initiator-side route id request failed.
    #[error("request route id: {0}")]
    RouteIdRequest(#[source] Box<SetupError>),

    /// Confirming a loop endpoint failed.
    #[error("loop connect: {0}")]
    LoopConnect(#[source] Box<SetupError>),

    /// Messaging-server initialization failed at startup.
    #[error("messaging: {0}")]
    Messaging(#[source] Box<SetupError>),

    /// A spawned task failed outside its own error channel.
    #[error("internal: {0}")]
    Internal(String),
}

impl SetupError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, SetupError::Cancelled)
    }

    /// Wrap a per-hop failure, leaving cancellation untouched so the
    /// collector can keep suppressing it.
    pub fn rule_setup(self) -> Self {
        if self.is_cancelled() {
            self
        } else {
            SetupError::RuleSetup(Box::new(self))
        }
    }
}

impl From<std::io::Error> for SetupError {
    fn from(err: std::io::Error) -> Self {
        SetupError::Transport(err.to_string())
    }
}

impl From<serde_json::Error> for SetupError {
    fn from(err: serde_json::Error) -> Self {
        SetupError::Protocol(err.to_string())
    }
}
