use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The roles a host can present as. `Admin` is never a deployable daemon
/// role; it only ever appears as a certificate principal on the Auth
/// control channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
	Auth,
	Proxy,
	Node,
	Admin,
}

impl Role {
	pub fn as_str(&self) -> &'static str {
		match self {
			Role::Auth => "auth",
			Role::Proxy => "proxy",
			Role::Node => "node",
			Role::Admin => "admin",
		}
	}
}

impl fmt::Display for Role {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

impl FromStr for Role {
	type Err = UnknownRole;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"auth" => Ok(Role::Auth),
			"proxy" => Ok(Role::Proxy),
			"node" => Ok(Role::Node),
			"admin" => Ok(Role::Admin),
			other => Err(UnknownRole(other.to_string())),
		}
	}
}

#[derive(Debug, thiserror::Error)]
#[error("unrecognized role {0:?}")]
pub struct UnknownRole(pub String);
