//! Loop descriptors -- the request and confirmation payloads of loop setup.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::keys::PublicKey;
use crate::route::Route;
use crate::{Port, RouteID};

/// One end of a loop: a visor plus a logical port on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Addr {
    pub pk: PublicKey,
    pub port: Port,
}

impl fmt::Display for Addr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.pk, self.port)
    }
}

/// The two endpoints of a loop, as seen from one of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Loop {
    pub local: Addr,
    pub remote: Addr,
}

impl fmt::Display for Loop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} <-> {}", self.local, self.remote)
    }
}

/// Input to loop creation: endpoints, both directed routes, and the expiry
/// carried into every installed rule. Ephemeral -- the setup node keeps no
/// trace of it after responding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoopDescriptor {
    #[serde(rename = "loop")]
    pub endpoints: Loop,
    pub forward: Route,
    pub reverse: Route,
    pub expiry: DateTime<Utc>,
}

impl LoopDescriptor {
    /// Owner of the `local` side: the first visor of the forward route.
    pub fn initiator(&self) -> Option<PublicKey> {
        self.forward.first().map(|hop| hop.from)
    }

    /// Owner of the `remote` side: the first visor of the reverse route.
    pub fn responder(&self) -> Option<PublicKey> {
        self.reverse.first().map(|hop| hop.from)
    }
}

impl fmt::Display for LoopDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (forward {} hops, reverse {} hops)",
            self.endpoints,
            self.forward.len(),
            self.reverse.len()
        )
    }
}

/// Input to loop close and payload of endpoint confirmations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoopData {
    #[serde(rename = "loop")]
    pub endpoints: Loop,
    pub route_id: RouteID,
}
