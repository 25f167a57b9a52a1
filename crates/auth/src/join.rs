//! The join protocol: an unjoined node or proxy redeems a provisioning
//! token for a host certificate. Every failure path — missing token,
//! expired token, role mismatch — collapses to the same `AccessDenied`, so
//! the response never tells a caller which of those three happened.

use std::time::Duration;

use russh::keys::ssh_key::PublicKey;
use serde::{Deserialize, Serialize};
use teleport_ca::{CaId, CaService, CaType};
use teleport_core::Role;
use tracing::info;

use crate::error::AuthError;
use crate::identity::encode_certificate_line;
use crate::token::TokenService;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RegisterUsingTokenRequest {
	pub token: String,
	pub uuid: String,
	pub role: Role,
	/// The joiner's freshly generated public key, OpenSSH text form.
	pub public_key: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RegisterUsingTokenResponse {
	pub host_cert: String,
	pub host_ca_checking_keys: Vec<String>,
}

pub async fn register_using_token(
	token_service: &TokenService,
	ca_service: &CaService,
	cluster_domain: &str,
	req: RegisterUsingTokenRequest,
) -> Result<RegisterUsingTokenResponse, AuthError> {
	if req.uuid.is_empty() {
		return Err(AuthError::BadParameter("uuid must not be empty".into()));
	}

	let granted = token_service
		.consume_token(&req.token)
		.await
		.map_err(|_| AuthError::AccessDenied)?;
	if !granted.roles.contains(&req.role) {
		return Err(AuthError::AccessDenied);
	}

	let public_key =
		PublicKey::from_openssh(&req.public_key).map_err(|e| AuthError::BadParameter(e.to_string()))?;

	let host_ca_id = CaId::new(cluster_domain, CaType::Host);
	let host_ca = ca_service
		.get_cert_authority(&host_ca_id, true)
		.await?
		.ok_or(AuthError::NotFound)?;

	let certificate = teleport_ca::issuance::generate_host_cert(
		&host_ca,
		&public_key,
		&req.uuid,
		cluster_domain,
		req.role,
		Duration::ZERO,
	)?;

	info!(uuid = %req.uuid, role = %req.role, "joined host to cluster");

	Ok(RegisterUsingTokenResponse {
		host_cert: encode_certificate_line(&certificate).map_err(AuthError::Internal)?,
		host_ca_checking_keys: host_ca
			.checkers()
			.iter()
			.map(|k| k.to_openssh())
			.collect::<Result<Vec<_>, _>>()
			.map_err(|e| AuthError::Internal(e.into()))?,
	})
}

#[cfg(test)]
mod tests {
	use super::*;
	use russh::keys::ssh_key::rand_core::OsRng;
	use russh::keys::ssh_key::{Algorithm, PrivateKey};
	use std::sync::Arc;
	use teleport_backend::memory::MemoryBackend;
	use teleport_backend::Backend;

	fn fresh_public_key() -> String {
		PrivateKey::random(&mut OsRng, Algorithm::Ed25519)
			.unwrap()
			.public_key()
			.to_openssh()
			.unwrap()
	}

	async fn setup() -> (CaService, TokenService, &'static str) {
		let backend: Arc<dyn Backend> = Arc::new(MemoryBackend::new());
		let ca_service = CaService::new(backend.clone());
		let token_service = TokenService::new(backend);
		let host_ca_id = CaId::new("example.com", CaType::Host);
		let ca = teleport_ca::CertAuthority::generate(host_ca_id).unwrap();
		ca_service.upsert_cert_authority(&ca, None).await.unwrap();
		(ca_service, token_service, "example.com")
	}

	#[tokio::test]
	async fn valid_token_and_role_yields_certificate() {
		let (ca_service, token_service, domain) = setup().await;
		let issued = token_service
			.add_token(vec![Role::Node], Duration::from_secs(60))
			.await
			.unwrap();

		let resp = register_using_token(
			&token_service,
			&ca_service,
			domain,
			RegisterUsingTokenRequest {
				token: issued.token,
				uuid: "11111111-1111-1111-1111-111111111111".into(),
				role: Role::Node,
				public_key: fresh_public_key(),
			},
		)
		.await
		.unwrap();

		assert!(resp.host_cert.starts_with("ssh-ed25519-cert"));
		assert_eq!(resp.host_ca_checking_keys.len(), 1);
	}

	#[tokio::test]
	async fn wrong_role_is_access_denied_not_bad_parameter() {
		let (ca_service, token_service, domain) = setup().await;
		let issued = token_service
			.add_token(vec![Role::Proxy], Duration::from_secs(60))
			.await
			.unwrap();

		let err = register_using_token(
			&token_service,
			&ca_service,
			domain,
			RegisterUsingTokenRequest {
				token: issued.token,
				uuid: "u".into(),
				role: Role::Node,
				public_key: fresh_public_key(),
			},
		)
		.await
		.unwrap_err();
		assert!(matches!(err, AuthError::AccessDenied));
	}

	#[tokio::test]
	async fn unknown_token_is_access_denied() {
		let (ca_service, token_service, domain) = setup().await;
		let err = register_using_token(
			&token_service,
			&ca_service,
			domain,
			RegisterUsingTokenRequest {
				token: "does-not-exist".into(),
				uuid: "u".into(),
				role: Role::Node,
				public_key: fresh_public_key(),
			},
		)
		.await
		.unwrap_err();
		assert!(matches!(err, AuthError::AccessDenied));
	}

	#[tokio::test]
	async fn token_cannot_be_redeemed_twice() {
		let (ca_service, token_service, domain) = setup().await;
		let issued = token_service
			.add_token(vec![Role::Node], Duration::from_secs(60))
			.await
			.unwrap();
		let req = RegisterUsingTokenRequest {
			token: issued.token,
			uuid: "u".into(),
			role: Role::Node,
			public_key: fresh_public_key(),
		};
		register_using_token(&token_service, &ca_service, domain, req.clone())
			.await
			.unwrap();
		let err = register_using_token(&token_service, &ca_service, domain, req)
			.await
			.unwrap_err();
		assert!(matches!(err, AuthError::AccessDenied));
	}
}
