//! The Auth control API: every RPC the rest of the cluster calls against
//! Auth, tunneled inside an SSH channel authenticated by a
//! host certificate of role `admin`. `AuthApi` is transport-agnostic —
//! [`LocalAuthApi`] dispatches in-process (used when a role colocates with
//! Auth during bootstrap); [`crate::wire::RemoteAuthApi`] dials the SSH
//! control channel. Proxy/Node code only ever depends on the trait.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use russh::keys::ssh_key::PublicKey;
use serde::{Deserialize, Serialize};
use teleport_ca::{CaId, CaService, CaType};
use teleport_core::config::IssuanceConfig;
use teleport_core::Role;

use crate::error::AuthError;
use crate::identity::encode_certificate_line;
use crate::join::{self, RegisterUsingTokenRequest, RegisterUsingTokenResponse};
use crate::presence::PresenceRecord;
use crate::presence::PresenceService;
use crate::session::{SessionEvent, SessionRecorder};
use crate::token::TokenService;
use crate::userauth::{self, LocalUserStore, SignInRequest, SignInResponse, UserStore};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CaSummary {
	pub domain: String,
	pub ca_type: CaType,
	pub checking_keys: Vec<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UpsertCaRequest {
	pub domain: String,
	pub ca_type: CaType,
	/// Seeds the CA from operator-supplied key material instead of
	/// generating a fresh pair.
	pub signing_key_openssh: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GenerateHostCertRequest {
	pub public_key: String,
	pub host_uuid: String,
	pub cluster_domain: String,
	pub role: Role,
	pub ttl: Duration,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GenerateHostCertResponse {
	pub certificate: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AddProvisioningTokenRequest {
	pub roles: Vec<Role>,
	pub ttl: Duration,
	pub token: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AddProvisioningTokenResponse {
	pub token: String,
}

#[async_trait]
pub trait AuthApi: Send + Sync {
	async fn upsert_ca(&self, req: UpsertCaRequest) -> Result<(), AuthError>;
	async fn get_ca(&self, domain: &str, ca_type: CaType) -> Result<Option<CaSummary>, AuthError>;
	async fn get_cas(&self, ca_type: CaType) -> Result<Vec<CaSummary>, AuthError>;
	async fn delete_ca(&self, domain: &str, ca_type: CaType) -> Result<(), AuthError>;
	async fn generate_host_cert(&self, req: GenerateHostCertRequest) -> Result<GenerateHostCertResponse, AuthError>;

	async fn register_using_token(
		&self,
		req: RegisterUsingTokenRequest,
	) -> Result<RegisterUsingTokenResponse, AuthError>;

	async fn sign_in(&self, req: SignInRequest) -> Result<SignInResponse, AuthError>;
	async fn check_password(&self, login: &str, password: &str) -> Result<(), AuthError>;
	async fn check_otp(&self, login: &str, code: &str) -> Result<(), AuthError>;

	async fn add_provisioning_token(
		&self,
		req: AddProvisioningTokenRequest,
	) -> Result<AddProvisioningTokenResponse, AuthError>;

	async fn record_session(&self, event: SessionEvent) -> Result<(), AuthError>;
	async fn list_sessions(&self) -> Result<Vec<SessionEvent>, AuthError>;

	async fn heartbeat_presence(
		&self,
		principal: String,
		labels: HashMap<String, String>,
		ttl: Duration,
	) -> Result<(), AuthError>;
	async fn list_presence(&self) -> Result<Vec<PresenceRecord>, AuthError>;
}

/// The in-process implementation: every role that runs colocated with Auth
/// (or Auth itself) calls straight into the service layer, no serialization
/// round trip.
pub struct LocalAuthApi {
	pub ca_service: Arc<CaService>,
	pub token_service: Arc<TokenService>,
	pub user_store: Arc<LocalUserStore>,
	pub session_recorder: Arc<SessionRecorder>,
	pub presence_service: Arc<PresenceService>,
	pub cluster_domain: String,
	pub issuance: IssuanceConfig,
}

#[async_trait]
impl AuthApi for LocalAuthApi {
	async fn upsert_ca(&self, req: UpsertCaRequest) -> Result<(), AuthError> {
		let id = CaId::new(req.domain, req.ca_type);
		let ca = match req.signing_key_openssh {
			Some(openssh) => {
				let signing_key =
					russh::keys::ssh_key::PrivateKey::from_openssh(&openssh).map_err(|e| AuthError::BadParameter(e.to_string()))?;
				let checking_key = signing_key.public_key().clone();
				teleport_ca::CertAuthority {
					id,
					signing_keys: vec![signing_key],
					checking_keys: vec![checking_key],
				}
			},
			None => teleport_ca::CertAuthority::generate(id)?,
		};
		self.ca_service.upsert_cert_authority(&ca, None).await?;
		Ok(())
	}

	async fn get_ca(&self, domain: &str, ca_type: CaType) -> Result<Option<CaSummary>, AuthError> {
		let Some(ca) = self
			.ca_service
			.get_cert_authority(&CaId::new(domain, ca_type), false)
			.await?
		else {
			return Ok(None);
		};
		Ok(Some(to_summary(ca)?))
	}

	async fn get_cas(&self, ca_type: CaType) -> Result<Vec<CaSummary>, AuthError> {
		self
			.ca_service
			.get_cert_authorities(ca_type)
			.await?
			.into_iter()
			.map(to_summary)
			.collect()
	}

	async fn delete_ca(&self, domain: &str, ca_type: CaType) -> Result<(), AuthError> {
		self.ca_service.delete_cert_authority(&CaId::new(domain, ca_type)).await?;
		Ok(())
	}

	async fn generate_host_cert(&self, req: GenerateHostCertRequest) -> Result<GenerateHostCertResponse, AuthError> {
		let public_key =
			PublicKey::from_openssh(&req.public_key).map_err(|e| AuthError::BadParameter(e.to_string()))?;
		let host_ca = self
			.ca_service
			.get_cert_authority(&CaId::new(&req.cluster_domain, CaType::Host), true)
			.await?
			.ok_or(AuthError::NotFound)?;
		let certificate = teleport_ca::issuance::generate_host_cert(
			&host_ca,
			&public_key,
			&req.host_uuid,
			&req.cluster_domain,
			req.role,
			req.ttl,
		)?;
		Ok(GenerateHostCertResponse {
			certificate: encode_certificate_line(&certificate).map_err(AuthError::Internal)?,
		})
	}

	async fn register_using_token(
		&self,
		req: RegisterUsingTokenRequest,
	) -> Result<RegisterUsingTokenResponse, AuthError> {
		join::register_using_token(&self.token_service, &self.ca_service, &self.cluster_domain, req).await
	}

	async fn sign_in(&self, req: SignInRequest) -> Result<SignInResponse, AuthError> {
		userauth::sign_in(
			self.user_store.as_ref(),
			&self.ca_service,
			&self.cluster_domain,
			&self.issuance,
			req,
		)
		.await
	}

	async fn check_password(&self, login: &str, password: &str) -> Result<(), AuthError> {
		userauth::check_password(self.user_store.as_ref(), login, password).await
	}

	async fn check_otp(&self, login: &str, code: &str) -> Result<(), AuthError> {
		userauth::check_otp(self.user_store.as_ref(), login, code).await
	}

	async fn add_provisioning_token(
		&self,
		req: AddProvisioningTokenRequest,
	) -> Result<AddProvisioningTokenResponse, AuthError> {
		let issued = match req.token {
			Some(value) => self.token_service.add_named_token(value, req.roles, req.ttl).await?,
			None => self.token_service.add_token(req.roles, req.ttl).await?,
		};
		Ok(AddProvisioningTokenResponse { token: issued.token })
	}

	async fn record_session(&self, event: SessionEvent) -> Result<(), AuthError> {
		self.session_recorder.record_session(&event).await
	}

	async fn list_sessions(&self) -> Result<Vec<SessionEvent>, AuthError> {
		self.session_recorder.list_sessions().await
	}

	async fn heartbeat_presence(
		&self,
		principal: String,
		labels: HashMap<String, String>,
		ttl: Duration,
	) -> Result<(), AuthError> {
		self.presence_service.heartbeat_presence(principal, labels, ttl).await
	}

	async fn list_presence(&self) -> Result<Vec<PresenceRecord>, AuthError> {
		self.presence_service.list_presence().await
	}
}

fn to_summary(ca: teleport_ca::CertAuthority) -> Result<CaSummary, AuthError> {
	Ok(CaSummary {
		domain: ca.id.domain.clone(),
		ca_type: ca.id.ca_type,
		checking_keys: ca
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
	use teleport_backend::memory::MemoryBackend;
	use teleport_backend::Backend;

	fn local_api() -> LocalAuthApi {
		let backend: Arc<dyn Backend> = Arc::new(MemoryBackend::new());
		LocalAuthApi {
			ca_service: Arc::new(CaService::new(backend.clone())),
			token_service: Arc::new(TokenService::new(backend.clone())),
			user_store: Arc::new(LocalUserStore::new(backend.clone())),
			session_recorder: Arc::new(SessionRecorder::new(backend.clone())),
			presence_service: Arc::new(PresenceService::new(backend)),
			cluster_domain: "example.com".into(),
			issuance: IssuanceConfig::default(),
		}
	}

	#[tokio::test]
	async fn upsert_then_get_ca_round_trips() {
		let api = local_api();
		api
			.upsert_ca(UpsertCaRequest {
				domain: "example.com".into(),
				ca_type: CaType::Host,
				signing_key_openssh: None,
			})
			.await
			.unwrap();

		let ca = api.get_ca("example.com", CaType::Host).await.unwrap().unwrap();
		assert_eq!(ca.checking_keys.len(), 1);
	}

	#[tokio::test]
	async fn add_provisioning_token_then_register_using_token() {
		let api = local_api();
		api
			.upsert_ca(UpsertCaRequest {
				domain: "example.com".into(),
				ca_type: CaType::Host,
				signing_key_openssh: None,
			})
			.await
			.unwrap();

		let issued = api
			.add_provisioning_token(AddProvisioningTokenRequest {
				roles: vec![Role::Node],
				ttl: Duration::from_secs(60),
				token: None,
			})
			.await
			.unwrap();

		let public_key = russh::keys::ssh_key::PrivateKey::random(
			&mut russh::keys::ssh_key::rand_core::OsRng,
			russh::keys::ssh_key::Algorithm::Ed25519,
		)
		.unwrap()
		.public_key()
		.to_openssh()
		.unwrap();

		let resp = api
			.register_using_token(RegisterUsingTokenRequest {
				token: issued.token,
				uuid: "11111111-1111-1111-1111-111111111111".into(),
				role: Role::Node,
				public_key,
			})
			.await
			.unwrap();
		assert!(!resp.host_cert.is_empty());
	}
}
