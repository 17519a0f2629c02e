//! Hops and routes -- the ordered chain a loop is provisioned over.

use std::fmt;
use std::ops::Deref;

use serde::{Deserialize, Serialize};

use crate::keys::PublicKey;

/// Identifier of an established transport between two adjacent visors.
/// Issued by the transport layer on link establishment; the setup node only
/// relays it so the rule engine can look the link up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransportID(pub uuid::Uuid);

impl fmt::Display for TransportID {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// One directed link of a route.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hop {
    pub from: PublicKey,
    pub to: PublicKey,
    pub tp: TransportID,
}

impl fmt::Display for Hop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.from, self.to)
    }
}

/// Ordered hop chain from the initiator outward to the terminal visor.
/// Adjacent hops must connect: `hops[i].to == hops[i+1].from`. May be empty
/// for a direct loop between colocated endpoints.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Route(pub Vec<Hop>);

impl Route {
    pub fn hops(&self) -> &[Hop] {
        &self.0
    }
}

impl Deref for Route {
    type Target = [Hop];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl FromIterator<Hop> for Route {
    fn from_iter<I: IntoIterator<Item = Hop>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Some(first) = self.0.first() else {
            return f.write_str("(empty)");
        };
        write!(f, "{}", first.from)?;
        for hop in &self.0 {
            write!(f, " -> {}", hop.to)?;
        }
        Ok(())
    }
}
