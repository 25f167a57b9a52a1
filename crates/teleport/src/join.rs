//! Drives the join protocol for a role that isn't Auth itself: generate a
//! fresh key pair, redeem a provisioning token against Auth's
//! control API, and persist the resulting identity the same way
//! `teleport_auth::bootstrap` persists Auth's own.

use std::sync::Arc;

use russh::keys::ssh_key::rand_core::OsRng;
use russh::keys::ssh_key::{Algorithm, PrivateKey};
use teleport_auth::api::{AuthApi, GenerateHostCertRequest};
use teleport_auth::identity::{self, Identity};
use teleport_auth::join::RegisterUsingTokenRequest;
use teleport_auth::AuthError;
use teleport_core::{Config, Role};

/// Loads the identity from disk if it's already there; otherwise redeems
/// `token` for a fresh one and writes it. Mirrors
/// `teleport_auth::bootstrap::bootstrap_own_identity`'s "idempotent on
/// every start" shape, but over the control API instead of the local CA.
pub async fn bootstrap_joined_identity(
	config: &Config,
	role: Role,
	auth_api: &dyn AuthApi,
	token: Option<String>,
) -> Result<Identity, AuthError> {
	if let Some(identity) = identity::load_from_disk(&config.data_dir, &config.host_uuid, role)? {
		return Ok(identity);
	}

	let token = token.ok_or_else(|| AuthError::BadParameter("no provisioning token and no existing identity on disk".into()))?;

	let private_key =
		PrivateKey::random(&mut OsRng, Algorithm::Ed25519).map_err(|e| AuthError::Internal(e.into()))?;
	let public_key = private_key.public_key().to_openssh().map_err(|e| AuthError::Internal(e.into()))?;

	let resp = auth_api
		.register_using_token(RegisterUsingTokenRequest {
			token,
			uuid: config.host_uuid.clone(),
			role,
			public_key,
		})
		.await?;

	let certificate = russh::keys::ssh_key::Certificate::from_openssh(resp.host_cert.trim())
		.map_err(|e| AuthError::Internal(e.into()))?;

	identity::write_to_disk(&config.data_dir, &config.host_uuid, role, &private_key, &certificate)?;
	identity::load_from_disk(&config.data_dir, &config.host_uuid, role)?
		.ok_or_else(|| AuthError::Internal(anyhow::anyhow!("identity vanished immediately after writing it")))
}

/// Refreshes a host certificate against the current host-CA, used when a
/// running role's certificate is close to expiry. Unused until a renewal
/// scheduler calls it, which `teleportd` does not yet implement.
#[allow(dead_code)]
pub async fn refresh_host_cert(
	config: &Config,
	role: Role,
	auth_api: &dyn AuthApi,
	identity: &Identity,
) -> Result<Identity, AuthError> {
	let public_key = identity.private_key.public_key().to_openssh().map_err(|e| AuthError::Internal(e.into()))?;
	let resp = auth_api
		.generate_host_cert(GenerateHostCertRequest {
			public_key,
			host_uuid: config.host_uuid.clone(),
			cluster_domain: config.cluster_domain.clone(),
			role,
			ttl: std::time::Duration::ZERO,
		})
		.await?;
	let certificate = russh::keys::ssh_key::Certificate::from_openssh(resp.certificate.trim())
		.map_err(|e| AuthError::Internal(e.into()))?;
	identity::write_to_disk(&config.data_dir, &config.host_uuid, role, &identity.private_key, &certificate)?;
	Ok(Identity {
		host_uuid: config.host_uuid.clone(),
		role,
		private_key: identity.private_key.clone(),
		certificate,
	})
}

/// `Arc<dyn AuthApi>` is the shape every runner wires against; this wraps a
/// `RemoteAuthApi<FramedStream<TcpStream>>` behind it for roles that aren't
/// colocated with Auth.
pub async fn dial_remote_auth_api(addr: &str) -> anyhow::Result<Arc<dyn AuthApi>> {
	let stream = tokio::net::TcpStream::connect(addr).await?;
	let channel = teleport_auth::wire::FramedStream::new(stream);
	Ok(Arc::new(teleport_auth::wire::RemoteAuthApi::new(channel)))
}
