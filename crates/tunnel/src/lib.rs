//! The reverse tunnel: the hub side that runs on the Proxy and the agent
//! side that runs on the Node, plus the in-memory routing table that ties a
//! session's requested host to a live tunnel or a DNS fallback.

pub mod agent;
pub mod error;
pub mod hub;
pub mod routing;

pub use error::TunnelError;
pub use hub::{Hub, TunnelServer};
pub use routing::{resolve_route, AuthLabelLookup, Route, RoutedNode, RoutingTable};
