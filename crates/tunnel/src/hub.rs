//! Hub side of the reverse tunnel, run by the Proxy role: accepts long-lived
//! SSH connections from nodes, authenticates the peer against the host-CA,
//! and keeps the in-memory routing table in `routing.rs` current.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use russh::keys::ssh_key::{Certificate, PublicKey};
use russh::server::{Auth, Handle, Handler, Msg, Server, Session};
use russh::{Channel, ChannelId};
use teleport_ca::{CaId, CaService, CaType};
use teleport_core::Role;
use tracing::{info, warn};

use crate::error::TunnelError;
use crate::routing::{RoutedNode, RoutingTable};

/// Shared state behind every accepted hub connection.
pub struct Hub {
	pub ca_service: Arc<CaService>,
	pub cluster_domain: String,
	pub table: Arc<RoutingTable<Handle>>,
}

impl Hub {
	pub fn new(ca_service: Arc<CaService>, cluster_domain: String) -> Self {
		Self {
			ca_service,
			cluster_domain,
			table: Arc::new(RoutingTable::new()),
		}
	}

	/// Verifies `candidate` was signed by the active cluster host-CA and
	/// carries a `Host` certificate, returning the embedded principal
	/// (`<uuid>.<domain>`). Raw (non-certificate) keys are never accepted
	/// here — the same "no trust on first use" rule the client side
	/// enforces in `teleport-client::trust`.
	async fn authenticate_host_cert(&self, candidate: &Certificate) -> Result<String, TunnelError> {
		if !matches!(
			candidate.cert_type(),
			russh::keys::ssh_key::certificate::CertType::Host
		) {
			return Err(TunnelError::AccessDenied("certificate is not a host certificate".into()));
		}

		let host_ca = self
			.ca_service
			.get_cert_authority(&CaId::new(&self.cluster_domain, CaType::Host), false)
			.await
			.map_err(|e| TunnelError::Internal(e.into()))?
			.ok_or_else(|| TunnelError::UnknownAuthority("no host certificate authority configured".into()))?;

		if !host_ca.checkers().contains(candidate.signature_key()) {
			return Err(TunnelError::UnknownAuthority(
				"host certificate was not signed by a trusted authority".into(),
			));
		}

		candidate
			.valid_principals()
			.first()
			.cloned()
			.ok_or_else(|| TunnelError::BadParameter("host certificate carries no principal".into()))
	}
}

#[derive(Clone)]
pub struct TunnelServer {
	hub: Arc<Hub>,
}

impl TunnelServer {
	pub fn new(hub: Arc<Hub>) -> Self {
		Self { hub }
	}
}

impl Server for TunnelServer {
	type Handler = HubHandler;

	fn new_client(&mut self, peer_addr: Option<SocketAddr>) -> Self::Handler {
		HubHandler {
			hub: self.hub.clone(),
			peer_addr,
			principal: None,
		}
	}

	fn handle_session_error(&mut self, error: <Self::Handler as Handler>::Error) {
		warn!(?error, "tunnel hub session error");
	}
}

pub struct HubHandler {
	hub: Arc<Hub>,
	peer_addr: Option<SocketAddr>,
	principal: Option<String>,
}

#[async_trait]
impl Handler for HubHandler {
	type Error = TunnelError;

	/// Raw public keys are never accepted for the tunnel listener; only
	/// the certificate path (`auth_openssh_certificate`) admits a node.
	async fn auth_publickey(&mut self, _user: &str, _public_key: &PublicKey) -> Result<Auth, Self::Error> {
		Ok(Auth::Reject { proceed_with_methods: None, partial_success: false })
	}

	async fn auth_openssh_certificate(&mut self, _user: &str, certificate: &Certificate) -> Result<Auth, Self::Error> {
		match self.hub.authenticate_host_cert(certificate).await {
			Ok(principal) => {
				self.principal = Some(principal);
				Ok(Auth::Accept)
			},
			Err(e) => {
				warn!(peer = ?self.peer_addr, error = %e, "rejected tunnel dial");
				Ok(Auth::Reject { proceed_with_methods: None, partial_success: false })
			},
		}
	}

	/// The node's labels piggyback on a `tcpip_forward` virtual bind,
	/// `address` carrying the JSON-encoded label map and `port` always 0
	/// (there is no real port to bind; the hub never listens on behalf of
	/// a node, only routes session channels to it).
	async fn tcpip_forward(&mut self, address: &str, port: &mut u32, session: &mut Session) -> Result<bool, Self::Error> {
		let Some(principal) = self.principal.clone() else {
			return Ok(false);
		};
		if *port != 0 {
			return Ok(false);
		}
		let labels: HashMap<String, String> = serde_json::from_str(address).unwrap_or_default();
		self
			.hub
			.table
			.register(RoutedNode {
				principal: principal.clone(),
				labels,
				handle: session.handle(),
			})
			.await;
		info!(%principal, "node registered in tunnel routing table");
		Ok(true)
	}

	async fn cancel_tcpip_forward(&mut self, _address: &str, _port: u32, _session: &mut Session) -> Result<bool, Self::Error> {
		if let Some(principal) = &self.principal {
			self.hub.table.deregister(principal).await;
		}
		Ok(true)
	}

	/// The last channel closing is this handler's disconnect signal — the
	/// hub deregisters immediately rather than waiting on a keepalive
	/// timeout to confirm the node is gone.
	async fn channel_close(&mut self, _channel: ChannelId, _session: &mut Session) -> Result<(), Self::Error> {
		if let Some(principal) = self.principal.take() {
			self.hub.table.deregister(&principal).await;
			info!(%principal, "node deregistered from tunnel routing table");
		}
		Ok(())
	}

	/// The hub never needs its own interactive session on the tunnel
	/// connection; channels opened here only exist so the transport has a
	/// well-defined close event to key deregistration off of.
	async fn channel_open_session(&mut self, _channel: Channel<Msg>, _session: &mut Session) -> Result<bool, Self::Error> {
		Ok(true)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use teleport_backend::memory::MemoryBackend;
	use teleport_ca::CertAuthority;

	#[tokio::test]
	async fn authenticate_host_cert_accepts_trusted_signer() {
		let backend = Arc::new(MemoryBackend::new());
		let ca_service = Arc::new(CaService::new(backend));
		let ca = CertAuthority::generate(CaId::new("example.com", CaType::Host)).unwrap();
		ca_service.upsert_cert_authority(&ca, None).await.unwrap();

		let hub = Hub::new(ca_service.clone(), "example.com".into());
		let subject = russh::keys::ssh_key::PrivateKey::random(
			&mut russh::keys::ssh_key::rand_core::OsRng,
			russh::keys::ssh_key::Algorithm::Ed25519,
		)
		.unwrap();
		let cert = teleport_ca::issuance::generate_host_cert(
			&ca,
			subject.public_key(),
			"11111111-1111-1111-1111-111111111111",
			"example.com",
			Role::Node,
			std::time::Duration::ZERO,
		)
		.unwrap();

		let principal = hub.authenticate_host_cert(&cert).await.unwrap();
		assert_eq!(principal, "11111111-1111-1111-1111-111111111111.example.com");
	}

	#[tokio::test]
	async fn authenticate_host_cert_rejects_untrusted_signer() {
		let backend = Arc::new(MemoryBackend::new());
		let ca_service = Arc::new(CaService::new(backend));
		let trusted = CertAuthority::generate(CaId::new("example.com", CaType::Host)).unwrap();
		ca_service.upsert_cert_authority(&trusted, None).await.unwrap();

		let rogue_ca = CertAuthority::generate(CaId::new("rogue.example.com", CaType::Host)).unwrap();
		let hub = Hub::new(ca_service, "example.com".into());
		let subject = russh::keys::ssh_key::PrivateKey::random(
			&mut russh::keys::ssh_key::rand_core::OsRng,
			russh::keys::ssh_key::Algorithm::Ed25519,
		)
		.unwrap();
		let cert = teleport_ca::issuance::generate_host_cert(
			&rogue_ca,
			subject.public_key(),
			"11111111-1111-1111-1111-111111111111",
			"example.com",
			Role::Node,
			std::time::Duration::ZERO,
		)
		.unwrap();

		let err = hub.authenticate_host_cert(&cert).await.unwrap_err();
		assert!(matches!(err, TunnelError::UnknownAuthority(_)));
	}
}
