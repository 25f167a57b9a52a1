//! Cross-cutting utilities with no domain knowledge of certificates, the
//! backend, or the tunnel.

pub mod config;
pub mod duration;
pub mod error;
pub mod logging;
pub mod role;

pub use config::Config;
pub use error::{ErrorKind, HasKind, TeleportError};
pub use role::Role;
