//! The Auth server: wires bootstrap, the CA/token/user/session/presence
//! services, and the [`AuthApi`] dispatch table together. This is the
//! object a control-channel listener (built in `teleport-tunnel`/
//! `teleport`) hands each accepted frame to.

use std::sync::Arc;

use teleport_backend::Backend;
use teleport_ca::CaService;
use teleport_core::Config;

use crate::api::{AuthApi, LocalAuthApi};
use crate::bootstrap::bootstrap_auth_server;
use crate::error::AuthError;
use crate::identity::Identity;
use crate::presence::PresenceService;
use crate::session::SessionRecorder;
use crate::token::TokenService;
use crate::userauth::{LocalUserStore, SignupTokenService};
use crate::wire::{decode_request, encode_response};

pub struct AuthServer {
	pub identity: Identity,
	pub api: LocalAuthApi,
	pub signup_tokens: SignupTokenService,
}

impl AuthServer {
	/// Runs first-start bootstrap (idempotent on every subsequent start) and
	/// returns a server ready to accept control-channel frames.
	pub async fn bootstrap(config: &Config, backend: Arc<dyn Backend>) -> Result<Self, AuthError> {
		let ca_service = Arc::new(CaService::new(backend.clone()));
		let token_service = Arc::new(TokenService::new(backend.clone()));
		let user_store = Arc::new(LocalUserStore::new(backend.clone()));
		let signup_tokens = SignupTokenService::new(backend.clone());
		let session_recorder = Arc::new(SessionRecorder::new(backend.clone()));
		let presence_service = Arc::new(PresenceService::new(backend.clone()));

		let identity = bootstrap_auth_server(config, backend, &ca_service, &token_service).await?;

		let api = LocalAuthApi {
			ca_service,
			token_service,
			user_store,
			session_recorder,
			presence_service,
			cluster_domain: config.cluster_domain.clone(),
			issuance: config.issuance.clone(),
		};

		Ok(AuthServer { identity, api, signup_tokens })
	}

	/// Dispatches one decoded control-channel frame to the matching
	/// `AuthApi` method and re-encodes the result as a response frame. Every
	/// branch mirrors one RPC named in the control API; an unrecognized
	/// method name is a caller bug, not a trust-boundary violation, so it
	/// is reported as `BadParameter` rather than collapsed to
	/// `AccessDenied`.
	pub async fn dispatch(&self, frame: &[u8]) -> Vec<u8> {
		let result = self.dispatch_inner(frame).await;
		match result {
			Ok(bytes) => bytes,
			Err(e) => encode_response::<()>(&Err(e)).unwrap_or_else(|_| Vec::new()),
		}
	}

	async fn dispatch_inner(&self, frame: &[u8]) -> Result<Vec<u8>, AuthError> {
		let (method, payload) = decode_request(frame)?;
		macro_rules! handle {
			($ty:ty, $call:expr) => {{
				let req: $ty = serde_json::from_value(payload).map_err(|e| AuthError::BadParameter(e.to_string()))?;
				encode_response(&$call(req).await)
			}};
		}

		match method.as_str() {
			"upsert_ca" => handle!(crate::api::UpsertCaRequest, |r| self.api.upsert_ca(r)),
			"generate_host_cert" => {
				handle!(crate::api::GenerateHostCertRequest, |r| self.api.generate_host_cert(r))
			},
			"register_using_token" => {
				handle!(crate::join::RegisterUsingTokenRequest, |r| self
					.api
					.register_using_token(r))
			},
			"sign_in" => handle!(crate::userauth::SignInRequest, |r| self.api.sign_in(r)),
			"add_provisioning_token" => {
				handle!(crate::api::AddProvisioningTokenRequest, |r| self
					.api
					.add_provisioning_token(r))
			},
			"record_session" => handle!(crate::session::SessionEvent, |r| self.api.record_session(r)),
			"get_ca" => {
				#[derive(serde::Deserialize)]
				struct Req {
					domain: String,
					ca_type: teleport_ca::CaType,
				}
				handle!(Req, |r: Req| self.api.get_ca(&r.domain, r.ca_type))
			},
			"get_cas" => handle!(teleport_ca::CaType, |r| self.api.get_cas(r)),
			"delete_ca" => {
				#[derive(serde::Deserialize)]
				struct Req {
					domain: String,
					ca_type: teleport_ca::CaType,
				}
				handle!(Req, |r: Req| self.api.delete_ca(&r.domain, r.ca_type))
			},
			"check_password" => {
				#[derive(serde::Deserialize)]
				struct Req {
					login: String,
					password: String,
				}
				handle!(Req, |r: Req| self.api.check_password(&r.login, &r.password))
			},
			"check_otp" => {
				#[derive(serde::Deserialize)]
				struct Req {
					login: String,
					code: String,
				}
				handle!(Req, |r: Req| self.api.check_otp(&r.login, &r.code))
			},
			"list_sessions" => handle!((), |_: ()| self.api.list_sessions()),
			"heartbeat_presence" => {
				#[derive(serde::Deserialize)]
				struct Req {
					principal: String,
					labels: std::collections::HashMap<String, String>,
					ttl: std::time::Duration,
				}
				handle!(Req, |r: Req| self
					.api
					.heartbeat_presence(r.principal, r.labels, r.ttl))
			},
			"list_presence" => handle!((), |_: ()| self.api.list_presence()),
			other => Err(AuthError::BadParameter(format!("unknown control method {other:?}"))),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::collections::HashMap;
	use std::time::Duration;
	use teleport_backend::memory::MemoryBackend;
	use teleport_core::config::{BackendConfig, BootstrapConfig, IssuanceConfig, ListenConfig, LoggingConfig};
	use teleport_core::Role;

	fn test_config() -> (Config, tempfile::TempDir) {
		let dir = tempfile::tempdir().unwrap();
		let config = Config {
			roles: vec![Role::Auth],
			data_dir: dir.path().to_path_buf(),
			cluster_domain: "example.com".into(),
			host_uuid: "11111111-1111-1111-1111-111111111111".into(),
			auth_server: None,
			backend: BackendConfig::default(),
			listen: ListenConfig::default(),
			labels: HashMap::new(),
			command_labels: Vec::new(),
			logging: LoggingConfig::default(),
			bootstrap: BootstrapConfig {
				lock_ttl: Duration::from_secs(5),
				lock_wait: Duration::from_millis(200),
				token_ttl: Duration::from_secs(60),
			},
			static_tokens: Vec::new(),
			issuance: IssuanceConfig::default(),
		};
		(config, dir)
	}

	#[tokio::test]
	async fn bootstrap_then_dispatch_add_provisioning_token() {
		let backend: Arc<dyn Backend> = Arc::new(MemoryBackend::new());
		let (config, _dir) = test_config();
		let server = AuthServer::bootstrap(&config, backend).await.unwrap();

		let req = crate::api::AddProvisioningTokenRequest {
			roles: vec![Role::Node],
			ttl: Duration::from_secs(60),
			token: None,
		};
		let frame = serde_json::to_vec(&serde_json::json!({
			"method": "add_provisioning_token",
			"payload": req,
		}))
		.unwrap();

		let response_bytes = server.dispatch(&frame).await;
		let response: serde_json::Value = serde_json::from_slice(&response_bytes).unwrap();
		assert_eq!(response["ok"], true);
	}

	#[tokio::test]
	async fn unknown_method_is_bad_parameter() {
		let backend: Arc<dyn Backend> = Arc::new(MemoryBackend::new());
		let (config, _dir) = test_config();
		let server = AuthServer::bootstrap(&config, backend).await.unwrap();

		let frame = serde_json::to_vec(&serde_json::json!({
			"method": "not_a_real_method",
			"payload": {},
		}))
		.unwrap();
		let response_bytes = server.dispatch(&frame).await;
		let response: serde_json::Value = serde_json::from_slice(&response_bytes).unwrap();
		assert_eq!(response["ok"], false);
	}
}
