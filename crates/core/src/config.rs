//! Operator-facing configuration: the shape operators write into a YAML
//! file. CLI flag wiring and asset discovery live in the daemon binaries,
//! not here.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::duration::parse_human;
use crate::role::Role;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
	pub roles: Vec<Role>,
	#[serde(default = "Defaults::data_dir")]
	pub data_dir: PathBuf,
	pub cluster_domain: String,
	pub host_uuid: String,
	#[serde(default)]
	pub auth_server: Option<String>,
	/// Where a Node dials its tunnel; distinct from `listen.proxy_tunnel`,
	/// which is where a Proxy process binds one.
	#[serde(default)]
	pub proxy_tunnel_addr: Option<SocketAddr>,
	#[serde(default)]
	pub backend: BackendConfig,
	#[serde(default)]
	pub listen: ListenConfig,
	#[serde(default)]
	pub labels: HashMap<String, String>,
	#[serde(default)]
	pub command_labels: Vec<CommandLabel>,
	#[serde(default)]
	pub logging: LoggingConfig,
	#[serde(default)]
	pub bootstrap: BootstrapConfig,
	#[serde(default)]
	pub static_tokens: Vec<StaticTokenConfig>,
	#[serde(default)]
	pub issuance: IssuanceConfig,
}

/// Tuning for the Auth server's first-start critical section.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BootstrapConfig {
	#[serde(with = "crate::duration::serde_dur", default = "Defaults3::lock_ttl")]
	pub lock_ttl: Duration,
	#[serde(with = "crate::duration::serde_dur", default = "Defaults3::lock_wait")]
	pub lock_wait: Duration,
	#[serde(with = "crate::duration::serde_dur", default = "Defaults3::token_ttl")]
	pub token_ttl: Duration,
}

struct Defaults3;
impl Defaults3 {
	fn lock_ttl() -> Duration {
		Duration::from_secs(60)
	}
	fn lock_wait() -> Duration {
		Duration::from_secs(15)
	}
	fn token_ttl() -> Duration {
		Duration::from_secs(10 * 60)
	}
}

impl Default for BootstrapConfig {
	fn default() -> Self {
		BootstrapConfig {
			lock_ttl: Defaults3::lock_ttl(),
			lock_wait: Defaults3::lock_wait(),
			token_ttl: Defaults3::token_ttl(),
		}
	}
}

/// An operator-supplied provisioning token installed on Auth first-start,
/// e.g. baked into a provisioning image so a node can join without an
/// interactive `tctl tokens add` step.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StaticTokenConfig {
	pub token: String,
	pub roles: Vec<Role>,
}

/// User certificate TTL bounds.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct IssuanceConfig {
	#[serde(with = "crate::duration::serde_dur", default = "Defaults4::min")]
	pub min_cert_duration: Duration,
	#[serde(with = "crate::duration::serde_dur", default = "Defaults4::max")]
	pub max_cert_duration: Duration,
	#[serde(with = "crate::duration::serde_dur", default = "Defaults4::nominal")]
	pub nominal_cert_duration: Duration,
}

struct Defaults4;
impl Defaults4 {
	fn min() -> Duration {
		Duration::from_secs(60)
	}
	fn max() -> Duration {
		Duration::from_secs(30 * 3600)
	}
	fn nominal() -> Duration {
		Duration::from_secs(12 * 3600)
	}
}

impl Default for IssuanceConfig {
	fn default() -> Self {
		IssuanceConfig {
			min_cert_duration: Defaults4::min(),
			max_cert_duration: Defaults4::max(),
			nominal_cert_duration: Defaults4::nominal(),
		}
	}
}

struct Defaults;
impl Defaults {
	fn data_dir() -> PathBuf {
		PathBuf::from("/var/lib/teleport")
	}
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum BackendConfig {
	Bolt { path: PathBuf },
	Etcd { nodes: Vec<String>, key: Option<PathBuf> },
}

impl Default for BackendConfig {
	fn default() -> Self {
		BackendConfig::Bolt {
			path: PathBuf::from("/var/lib/teleport/keys.db"),
		}
	}
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ListenConfig {
	pub node_ssh: SocketAddr,
	pub proxy_ssh: SocketAddr,
	pub proxy_tunnel: SocketAddr,
	pub auth: SocketAddr,
	pub web: SocketAddr,
}

impl Default for ListenConfig {
	fn default() -> Self {
		ListenConfig {
			node_ssh: "0.0.0.0:3022".parse().unwrap(),
			proxy_ssh: "0.0.0.0:3023".parse().unwrap(),
			proxy_tunnel: "0.0.0.0:3024".parse().unwrap(),
			auth: "0.0.0.0:3025".parse().unwrap(),
			web: "0.0.0.0:3080".parse().unwrap(),
		}
	}
}

/// `[<duration>:<shell-tokens>]` dynamic labels, e.g. refreshing `uname -m`
/// every `1h30m` and publishing the result as the `arch` label.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CommandLabel {
	pub name: String,
	#[serde(with = "crate::duration::serde_dur")]
	pub period: Duration,
	pub command: Vec<String>,
}

impl CommandLabel {
	pub fn period_from_human(name: String, period: &str, command: Vec<String>) -> anyhow::Result<Self> {
		Ok(CommandLabel {
			name,
			period: parse_human(period)?,
			command,
		})
	}
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LoggingConfig {
	#[serde(default = "Defaults2::level")]
	pub level: String,
	#[serde(default)]
	pub format: LogFormat,
}

struct Defaults2;
impl Defaults2 {
	fn level() -> String {
		"info".to_string()
	}
}

impl Default for LoggingConfig {
	fn default() -> Self {
		LoggingConfig {
			level: Defaults2::level(),
			format: LogFormat::default(),
		}
	}
}

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
	#[default]
	Text,
	Json,
}

impl Config {
	pub fn from_yaml(s: &str) -> anyhow::Result<Config> {
		Ok(serde_yaml::from_str(s)?)
	}

	pub fn has_role(&self, role: Role) -> bool {
		self.roles.contains(&role)
	}
}
