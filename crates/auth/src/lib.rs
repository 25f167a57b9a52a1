//! The Auth server and everything that issues or checks trust material on
//! its behalf: first-start bootstrap, per-host identity bootstrap, the join
//! protocol, interactive user login with 2FA, session recording and node
//! presence, and the control API all of that is exposed through.

pub mod api;
pub mod bootstrap;
pub mod error;
pub mod identity;
pub mod join;
pub mod presence;
pub mod server;
pub mod session;
pub mod token;
pub mod userauth;
pub mod wire;

pub use api::AuthApi;
pub use error::AuthError;
pub use identity::Identity;
pub use server::AuthServer;
