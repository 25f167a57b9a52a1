//! Interactive user login: `SignIn` → `CheckPassword` → `CheckOTP`, both
//! checks mandatory, both collapsing to the same `AccessDenied` so a caller
//! cannot tell which factor failed. User accounts themselves are behind a
//! pluggable [`UserStore`] since managing long-lived user passwords at
//! scale is assumed to be an external store's job; [`LocalUserStore`] is
//! the one bundled implementation, sufficient for a single-cluster setup.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bcrypt::{DEFAULT_COST, hash, verify};
use russh::keys::ssh_key::PublicKey;
use serde::{Deserialize, Serialize};
use teleport_backend::{Backend, BackendError};
use teleport_ca::{CaId, CaService, CaType};
use teleport_core::config::IssuanceConfig;
use totp_rs::{Algorithm as TotpAlgorithm, Secret, TOTP};
use tracing::info;

use crate::error::AuthError;
use crate::identity::encode_certificate_line;

#[async_trait]
pub trait UserStore: Send + Sync {
	async fn get_password_hash(&self, login: &str) -> Result<Option<String>, AuthError>;
	async fn get_totp_secret(&self, login: &str) -> Result<Option<String>, AuthError>;
	async fn set_password_hash(&self, login: &str, hash: String) -> Result<(), AuthError>;
}

#[derive(Clone, Serialize, Deserialize)]
struct UserRecord {
	login: String,
	password_hash: Option<String>,
	totp_secret: String,
}

const USERS_BUCKET: [&str; 1] = ["users"];

pub struct LocalUserStore {
	backend: Arc<dyn Backend>,
}

impl LocalUserStore {
	pub fn new(backend: Arc<dyn Backend>) -> Self {
		Self { backend }
	}

	async fn get_record(&self, login: &str) -> Result<Option<UserRecord>, AuthError> {
		let Some(bytes) = self.backend.get(&USERS_BUCKET, login).await? else {
			return Ok(None);
		};
		Ok(Some(
			serde_json::from_slice(&bytes).map_err(|e| AuthError::Internal(e.into()))?,
		))
	}

	async fn put_record(&self, record: &UserRecord) -> Result<(), AuthError> {
		let bytes = serde_json::to_vec(record).map_err(|e| AuthError::Internal(e.into()))?;
		self.backend.put(&USERS_BUCKET, &record.login, bytes, None).await?;
		Ok(())
	}

	/// Creates a pending account with no password yet — a signup token is
	/// required to set one.
	pub async fn create_pending(&self, login: String, totp_secret: String) -> Result<(), AuthError> {
		if self.get_record(&login).await?.is_some() {
			return Err(AuthError::AlreadyExists);
		}
		self
			.put_record(&UserRecord {
				login,
				password_hash: None,
				totp_secret,
			})
			.await
	}
}

#[async_trait]
impl UserStore for LocalUserStore {
	async fn get_password_hash(&self, login: &str) -> Result<Option<String>, AuthError> {
		Ok(self.get_record(login).await?.and_then(|r| r.password_hash))
	}

	async fn get_totp_secret(&self, login: &str) -> Result<Option<String>, AuthError> {
		Ok(self.get_record(login).await?.map(|r| r.totp_secret))
	}

	async fn set_password_hash(&self, login: &str, password_hash: String) -> Result<(), AuthError> {
		let mut record = self.get_record(login).await?.ok_or(AuthError::NotFound)?;
		record.password_hash = Some(password_hash);
		self.put_record(&record).await
	}
}

/// A one-time token binding a login to the right to set its first
/// password. Stored in a bucket distinct from
/// [`crate::token::ProvisioningToken`] so a signup token can never be
/// redeemed by `RegisterUsingToken`.
#[derive(Clone, Serialize, Deserialize)]
pub struct SignupToken {
	pub token: String,
	pub login: String,
}

const SIGNUP_BUCKET: [&str; 1] = ["signup_tokens"];

pub struct SignupTokenService {
	backend: Arc<dyn Backend>,
}

impl SignupTokenService {
	pub fn new(backend: Arc<dyn Backend>) -> Self {
		Self { backend }
	}

	pub async fn issue(&self, login: String, ttl: Duration) -> Result<SignupToken, AuthError> {
		let token = generate_signup_token();
		let record = SignupToken { token, login };
		let bytes = serde_json::to_vec(&record).map_err(|e| AuthError::Internal(e.into()))?;
		self.backend.put(&SIGNUP_BUCKET, &record.token, bytes, Some(ttl)).await?;
		Ok(record)
	}

	pub async fn consume(&self, token: &str) -> Result<SignupToken, AuthError> {
		let Some(bytes) = self.backend.get(&SIGNUP_BUCKET, token).await? else {
			return Err(AuthError::NotFound);
		};
		match self
			.backend
			.compare_and_swap(&SIGNUP_BUCKET, token, &bytes, Vec::new(), None)
			.await
		{
			Ok(()) => {
				let _ = self.backend.delete(&SIGNUP_BUCKET, token).await;
				serde_json::from_slice(&bytes).map_err(|e| AuthError::Internal(e.into()))
			},
			Err(BackendError::CompareFailed) => Err(AuthError::NotFound),
			Err(e) => Err(e.into()),
		}
	}
}

fn generate_signup_token() -> String {
	use rand::Rng;
	let mut rng = rand::thread_rng();
	(0..32).map(|_| rng.gen_range(b'a'..=b'z') as char).collect()
}

/// Provisions a new, passwordless user plus a signup token. Returns the
/// signup token and the TOTP secret so the operator can render a QR code.
pub async fn add_user(
	signup_tokens: &SignupTokenService,
	user_store: &LocalUserStore,
	login: String,
	signup_ttl: Duration,
) -> Result<(SignupToken, String), AuthError> {
	let totp_secret = match Secret::generate_secret().to_encoded() {
		Secret::Encoded(s) => s,
		Secret::Raw(bytes) => hex::encode(bytes),
	};
	user_store.create_pending(login.clone(), totp_secret.clone()).await?;
	let token = signup_tokens.issue(login, signup_ttl).await?;
	Ok((token, totp_secret))
}

/// Redeems a signup token and sets the account's first password.
pub async fn complete_signup(
	signup_tokens: &SignupTokenService,
	user_store: &LocalUserStore,
	token: &str,
	password: &str,
) -> Result<(), AuthError> {
	let signup = signup_tokens.consume(token).await?;
	let password_hash = hash(password, DEFAULT_COST).map_err(|e| AuthError::Internal(e.into()))?;
	user_store.set_password_hash(&signup.login, password_hash).await
}

pub async fn check_password(store: &dyn UserStore, login: &str, password: &str) -> Result<(), AuthError> {
	let Some(stored_hash) = store.get_password_hash(login).await? else {
		return Err(AuthError::AccessDenied);
	};
	match verify(password, &stored_hash) {
		Ok(true) => Ok(()),
		_ => Err(AuthError::AccessDenied),
	}
}

fn build_totp(secret_b32: &str) -> Result<TOTP, AuthError> {
	let secret_bytes = Secret::Encoded(secret_b32.to_string())
		.to_bytes()
		.map_err(|e| AuthError::Internal(anyhow::anyhow!("invalid TOTP secret: {e:?}")))?;
	TOTP::new(TotpAlgorithm::SHA1, 6, 1, 30, secret_bytes).map_err(|e| AuthError::Internal(e.into()))
}

/// Checks a 6-digit code with a ±1 step (±30s) window, per RFC 6238.
pub async fn check_otp(store: &dyn UserStore, login: &str, code: &str) -> Result<(), AuthError> {
	let Some(secret) = store.get_totp_secret(login).await? else {
		return Err(AuthError::AccessDenied);
	};
	let totp = build_totp(&secret)?;
	match totp.check_current(code) {
		Ok(true) => Ok(()),
		_ => Err(AuthError::AccessDenied),
	}
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SignInRequest {
	pub login: String,
	pub password: String,
	pub otp_code: String,
	pub public_key: String,
	pub ttl: Duration,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SignInResponse {
	pub user_cert: String,
	pub host_ca_checking_keys: Vec<String>,
}

/// The full interactive login flow: both factors must pass before a
/// certificate is ever considered, and any failure collapses to
/// `AccessDenied` before reaching the caller.
pub async fn sign_in(
	store: &dyn UserStore,
	ca_service: &CaService,
	cluster_domain: &str,
	issuance: &IssuanceConfig,
	req: SignInRequest,
) -> Result<SignInResponse, AuthError> {
	check_password(store, &req.login, &req.password).await?;
	check_otp(store, &req.login, &req.otp_code).await?;

	let public_key =
		PublicKey::from_openssh(&req.public_key).map_err(|_| AuthError::BadParameter("malformed public key".into()))?;

	let user_ca_id = CaId::new(cluster_domain, CaType::User);
	let user_ca = ca_service
		.get_cert_authority(&user_ca_id, true)
		.await?
		.ok_or(AuthError::NotFound)?;
	let host_ca = ca_service
		.get_cert_authority(&CaId::new(cluster_domain, CaType::Host), false)
		.await?
		.ok_or(AuthError::NotFound)?;

	let ttl = teleport_ca::issuance::clamp_ttl(
		req.ttl,
		issuance.min_cert_duration,
		issuance.max_cert_duration,
		issuance.nominal_cert_duration,
	);
	let certificate = teleport_ca::issuance::generate_user_cert(&user_ca, &public_key, &req.login, ttl)?;

	info!(login = %req.login, "issued user certificate");

	Ok(SignInResponse {
		user_cert: encode_certificate_line(&certificate).map_err(AuthError::Internal)?,
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
	use totp_rs::Secret as TotpSecret;

	fn fresh_public_key() -> String {
		PrivateKey::random(&mut OsRng, Algorithm::Ed25519)
			.unwrap()
			.public_key()
			.to_openssh()
			.unwrap()
	}

	async fn setup() -> (LocalUserStore, SignupTokenService, CaService) {
		let backend: Arc<dyn Backend> = Arc::new(teleport_backend::memory::MemoryBackend::new());
		let user_store = LocalUserStore::new(backend.clone());
		let signup_tokens = SignupTokenService::new(backend.clone());
		let ca_service = CaService::new(backend);
		for ca_type in [CaType::Host, CaType::User] {
			let ca = teleport_ca::CertAuthority::generate(CaId::new("example.com", ca_type)).unwrap();
			ca_service.upsert_cert_authority(&ca, None).await.unwrap();
		}
		(user_store, signup_tokens, ca_service)
	}

	#[tokio::test]
	async fn full_signup_then_sign_in_round_trip() {
		let (user_store, signup_tokens, ca_service) = setup().await;
		let (token, totp_secret) = add_user(&signup_tokens, &user_store, "alice".into(), Duration::from_secs(600))
			.await
			.unwrap();
		complete_signup(&signup_tokens, &user_store, &token.token, "hunter22")
			.await
			.unwrap();

		let totp = build_totp(&totp_secret).unwrap();
		let code = totp.generate_current().unwrap();

		let resp = sign_in(
			&user_store,
			&ca_service,
			"example.com",
			&IssuanceConfig::default(),
			SignInRequest {
				login: "alice".into(),
				password: "hunter22".into(),
				otp_code: code,
				public_key: fresh_public_key(),
				ttl: Duration::ZERO,
			},
		)
		.await
		.unwrap();

		assert!(resp.user_cert.contains("ssh-ed25519-cert"));
		assert_eq!(resp.host_ca_checking_keys.len(), 1);
	}

	#[tokio::test]
	async fn wrong_otp_is_rejected_without_leaking_which_factor_failed() {
		let (user_store, signup_tokens, ca_service) = setup().await;
		let (token, _secret) = add_user(&signup_tokens, &user_store, "bob".into(), Duration::from_secs(600))
			.await
			.unwrap();
		complete_signup(&signup_tokens, &user_store, &token.token, "correcthorse")
			.await
			.unwrap();

		let err = sign_in(
			&user_store,
			&ca_service,
			"example.com",
			&IssuanceConfig::default(),
			SignInRequest {
				login: "bob".into(),
				password: "correcthorse".into(),
				otp_code: "000000".into(),
				public_key: fresh_public_key(),
				ttl: Duration::ZERO,
			},
		)
		.await
		.unwrap_err();
		assert!(matches!(err, AuthError::AccessDenied));
	}

	#[tokio::test]
	async fn unknown_login_is_access_denied() {
		let (user_store, _signup_tokens, _ca_service) = setup().await;
		let err = check_password(&user_store, "nobody", "whatever").await.unwrap_err();
		assert!(matches!(err, AuthError::AccessDenied));
	}

	#[tokio::test]
	async fn signup_token_is_single_use() {
		let (user_store, signup_tokens, _ca_service) = setup().await;
		let (token, _secret) = add_user(&signup_tokens, &user_store, "carol".into(), Duration::from_secs(600))
			.await
			.unwrap();
		complete_signup(&signup_tokens, &user_store, &token.token, "password1")
			.await
			.unwrap();
		let err = complete_signup(&signup_tokens, &user_store, &token.token, "password2")
			.await
			.unwrap_err();
		assert!(matches!(err, AuthError::NotFound));
	}

	#[test]
	fn generated_secret_round_trips_through_totp() {
		let secret = match TotpSecret::generate_secret().to_encoded() {
			TotpSecret::Encoded(s) => s,
			TotpSecret::Raw(b) => hex::encode(b),
		};
		let totp = build_totp(&secret).unwrap();
		let code = totp.generate_current().unwrap();
		assert!(totp.check_current(&code).unwrap());
	}
}
