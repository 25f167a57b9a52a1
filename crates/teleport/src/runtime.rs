//! Wires one process's configured roles together: Auth bootstrap, the
//! control API (local or remote), the Node tunnel agent, and the Proxy
//! tunnel hub. One task per long-running concern: one per tunnel, one per
//! heartbeat, one per accepted connection.

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use teleport_auth::api::AuthApi;
use teleport_auth::AuthServer;
use teleport_ca::CaService;
use teleport_core::{Config, Role};
use teleport_tunnel::agent::{self, AgentConfig};
use teleport_tunnel::hub::{Hub, TunnelServer};
use tracing::info;

use crate::backend::build_backend;
use crate::join::{bootstrap_joined_identity, dial_remote_auth_api};

pub fn init_logging(config: &Config) {
	teleport_core::logging::init(&config.logging.level, config.logging.format.clone());
}

/// Extra join-time parameters that don't belong in the persisted YAML
/// config, supplied instead as CLI flags on first start.
#[derive(Default)]
pub struct JoinParams {
	pub provisioning_token: Option<String>,
}

/// Boots every configured role and runs until `shutdown` is set or a fatal
/// error occurs. Returns the first fatal error from any role task.
pub async fn run(config: Config, join: JoinParams, shutdown: Arc<AtomicBool>) -> anyhow::Result<()> {
	let backend = build_backend(&config.backend);
	let mut tasks = tokio::task::JoinSet::new();

	let auth_api: Arc<dyn AuthApi> = if config.has_role(Role::Auth) {
		let auth_server = AuthServer::bootstrap(&config, backend.clone()).await?;
		info!(uuid = %auth_server.identity.host_uuid, "auth role bootstrapped");
		Arc::new(auth_server.api)
	} else {
		let addr = config
			.auth_server
			.clone()
			.ok_or_else(|| anyhow::anyhow!("non-auth roles require auth_server to be configured"))?;
		dial_remote_auth_api(&addr).await?
	};

	if config.has_role(Role::Node) {
		let identity = bootstrap_joined_identity(&config, Role::Node, auth_api.as_ref(), join.provisioning_token.clone())
			.await?;
		info!(uuid = %identity.host_uuid, "node identity ready");

		let proxy_addr = config
			.proxy_tunnel_addr
			.ok_or_else(|| anyhow::anyhow!("node role requires proxy_tunnel_addr to be configured"))?;
		let agent_config = AgentConfig {
			proxy_addr,
			identity,
			labels: config.labels.clone(),
			cluster_domain: config.cluster_domain.clone(),
			max_attempts: None,
		};
		let agent_shutdown = shutdown.clone();
		tasks.spawn(async move {
			agent::run_agent(&agent_config, agent_shutdown).await.map_err(anyhow::Error::from)
		});

		let principal = format!("{}.{}", config.host_uuid, config.cluster_domain);
		let presence_auth_api = auth_api.clone();
		let presence_labels = config.labels.clone();
		let presence_shutdown = shutdown.clone();
		tasks.spawn(async move {
			agent::run_presence_heartbeat(presence_auth_api, principal, presence_labels, presence_shutdown).await;
			Ok(())
		});
	}

	if config.has_role(Role::Proxy) {
		let identity =
			bootstrap_joined_identity(&config, Role::Proxy, auth_api.as_ref(), join.provisioning_token.clone()).await?;
		info!(uuid = %identity.host_uuid, "proxy identity ready");

		let ca_service = Arc::new(CaService::new(backend.clone()));
		let hub = Arc::new(Hub::new(ca_service, config.cluster_domain.clone()));
		let server = TunnelServer::new(hub);
		let listen_addr = config.listen.proxy_tunnel;
		tasks.spawn(async move { run_tunnel_hub(server, identity, listen_addr).await });
	}

	while let Some(result) = tasks.join_next().await {
		result??;
	}
	Ok(())
}

/// The tunnel listener's own host key must be a certificate signed by the
/// cluster host-CA, the same trust a node checks in
/// `agent::AgentHandler::check_server_key` — a raw, self-signed key would
/// fail that check on every node and the reverse tunnel could never form.
async fn run_tunnel_hub(
	mut server: TunnelServer,
	identity: teleport_auth::identity::Identity,
	addr: std::net::SocketAddr,
) -> anyhow::Result<()> {
	let mut host_key = identity.private_key.clone();
	host_key.set_certificate(identity.certificate.clone());

	let ssh_config = Arc::new(russh::server::Config {
		keys: vec![host_key],
		..Default::default()
	});
	info!(%addr, "tunnel hub listening");
	server.run_on_address(ssh_config, addr).await?;
	Ok(())
}

