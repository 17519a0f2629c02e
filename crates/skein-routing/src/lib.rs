//! Skein Routing -- wire-level data model for overlay loops.
//!
//! Shared vocabulary between the setup node and the visor-side rule engine:
//! keys, addresses, hops, routes, loop descriptors, and forwarding rules.
//! Pure types plus serde; no IO. JSON field names are part of the wire
//! contract and must not change.

pub mod descriptor;
pub mod keys;
pub mod route;
pub mod rule;

pub use descriptor::{Addr, Loop, LoopData, LoopDescriptor};
pub use keys::{KeyError, PublicKey, SecretKey};
pub use route::{Hop, Route, TransportID};
pub use rule::Rule;

/// Logical application port on a visor.
pub type Port = u16;

/// Per-visor tag the data plane uses to select a forwarding rule.
/// Issued on demand; unique only on the visor that issued it.
pub type RouteID = u32;
