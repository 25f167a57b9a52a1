//! Auth server first-start: the algorithm that gets a brand-new cluster
//! from "empty backend" to "host-CA, user-CA, and the Auth server's own
//! identity all exist", serialized across replicas by a cluster-wide
//! advisory lock.

use std::sync::Arc;
use std::time::Duration;

use russh::keys::ssh_key::rand_core::OsRng;
use russh::keys::ssh_key::{Algorithm, PrivateKey};
use teleport_backend::{Backend, BackendError};
use teleport_ca::{CaId, CaService, CaType};
use teleport_core::{Config, Role};
use tracing::{info, warn};

use crate::error::AuthError;
use crate::identity::{self, Identity};
use crate::token::TokenService;

/// Runs the full first-start algorithm and returns the Auth server's own
/// runtime `Identity`. Safe to call on every Auth start: when the CAs and
/// identity already exist this is a fast, read-only confirmation.
pub async fn bootstrap_auth_server(
	config: &Config,
	backend: Arc<dyn Backend>,
	ca_service: &CaService,
	token_service: &TokenService,
) -> Result<Identity, AuthError> {
	if config.data_dir.as_os_str().is_empty() {
		return Err(AuthError::BadParameter("data_dir must not be empty".into()));
	}
	if config.host_uuid.is_empty() {
		return Err(AuthError::BadParameter("host_uuid must not be empty".into()));
	}

	let lock = backend
		.acquire_lock(&config.cluster_domain, config.bootstrap.lock_ttl, config.bootstrap.lock_wait)
		.await
		.map_err(|e| match e {
			BackendError::LockHeld(_) => AuthError::BootstrapContention,
			other => other.into(),
		})?;

	let result = run_critical_section(config, ca_service, token_service).await;

	if let Err(e) = backend.release_lock(lock).await {
		warn!(error = %e, "failed to release bootstrap lock");
	}

	result
}

async fn run_critical_section(
	config: &Config,
	ca_service: &CaService,
	token_service: &TokenService,
) -> Result<Identity, AuthError> {
	let host_ca_id = CaId::new(&config.cluster_domain, CaType::Host);
	let user_ca_id = CaId::new(&config.cluster_domain, CaType::User);

	let (host_ca, host_ca_is_new) = get_or_generate_ca(ca_service, &host_ca_id).await?;
	let (_user_ca, user_ca_is_new) = get_or_generate_ca(ca_service, &user_ca_id).await?;
	let first_start = host_ca_is_new || user_ca_is_new;

	if first_start {
		info!(domain = %config.cluster_domain, "first Auth start for this cluster, installing static tokens");
		for t in &config.static_tokens {
			token_service
				.add_named_token(t.token.clone(), t.roles.clone(), config.bootstrap.token_ttl)
				.await?;
		}
	}

	bootstrap_own_identity(config, ca_service, &host_ca).await
}

async fn get_or_generate_ca(
	ca_service: &CaService,
	id: &CaId,
) -> Result<(teleport_ca::CertAuthority, bool), AuthError> {
	if let Some(existing) = ca_service.get_cert_authority(id, true).await? {
		return Ok((existing, false));
	}
	let ca = teleport_ca::CertAuthority::generate(id.clone())?;
	ca_service.upsert_cert_authority(&ca, None).await?;
	info!(ca = %id.storage_key(), "generated new certificate authority");
	Ok((ca, true))
}

/// Mints the Auth server's own host identity directly against its local
/// host-CA rather than calling out over the control channel — there is no
/// one else to call yet during first start.
async fn bootstrap_own_identity(
	config: &Config,
	ca_service: &CaService,
	host_ca: &teleport_ca::CertAuthority,
) -> Result<Identity, AuthError> {
	if let Some(identity) = identity::load_from_disk(&config.data_dir, &config.host_uuid, Role::Auth)? {
		return Ok(identity);
	}

	let private_key =
		PrivateKey::random(&mut OsRng, Algorithm::Ed25519).map_err(|e| AuthError::Internal(e.into()))?;
	let host_ca = ca_service
		.get_cert_authority(&host_ca.id, true)
		.await?
		.ok_or_else(|| AuthError::Internal(anyhow::anyhow!("host CA vanished during bootstrap")))?;

	let certificate = teleport_ca::issuance::generate_host_cert(
		&host_ca,
		private_key.public_key(),
		&config.host_uuid,
		&config.cluster_domain,
		Role::Auth,
		Duration::ZERO,
	)?;

	identity::write_to_disk(&config.data_dir, &config.host_uuid, Role::Auth, &private_key, &certificate)?;

	identity::load_from_disk(&config.data_dir, &config.host_uuid, Role::Auth)?
		.ok_or_else(|| AuthError::Internal(anyhow::anyhow!("identity vanished immediately after writing it")))
}
