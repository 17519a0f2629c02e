//! Forwarding rules installed on visors by the setup node.
//!
//! A rule either relays packets over the next transport with a rewritten tag
//! (`forward`) or terminates the route and delivers to a local application
//! (`app`). The `type` tag is part of the wire contract -- peers must not be
//! expected to discriminate structurally.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::keys::PublicKey;
use crate::route::TransportID;
use crate::{Port, RouteID};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Rule {
    /// Relay packets tagged `route_id` over `next_transport`, rewriting the
    /// tag to `next_route_id`.
    Forward {
        expiry: DateTime<Utc>,
        next_route_id: RouteID,
        next_transport: TransportID,
        route_id: RouteID,
    },
    /// Terminate the route and deliver packets tagged `route_id` to the
    /// application bound at `local_port`.
    App {
        expiry: DateTime<Utc>,
        responding_route_id: RouteID,
        remote_pk: PublicKey,
        remote_port: Port,
        local_port: Port,
        route_id: RouteID,
    },
}

impl Rule {
    pub fn forward(
        expiry: DateTime<Utc>,
        next_route_id: RouteID,
        next_transport: TransportID,
        route_id: RouteID,
    ) -> Self {
        Rule::Forward { expiry, next_route_id, next_transport, route_id }
    }

    pub fn app(
        expiry: DateTime<Utc>,
        responding_route_id: RouteID,
        remote_pk: PublicKey,
        remote_port: Port,
        local_port: Port,
        route_id: RouteID,
    ) -> Self {
        Rule::App {
            expiry,
            responding_route_id,
            remote_pk,
            remote_port,
            local_port,
            route_id,
        }
    }

    /// Tag incoming packets must carry for this rule to apply.
    pub fn route_id(&self) -> RouteID {
        match *self {
            Rule::Forward { route_id, .. } | Rule::App { route_id, .. } => route_id,
        }
    }

    pub fn expiry(&self) -> DateTime<Utc> {
        match *self {
            Rule::Forward { expiry, .. } | Rule::App { expiry, .. } => expiry,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Rule::Forward { .. } => "forward",
            Rule::App { .. } => "app",
        }
    }
}
