//! Provisioning tokens: short-lived, single-use bearer secrets that let an
//! unjoined host or `tctl` itself register into the
//! cluster. Single use is enforced with a compare-and-swap against the
//! backend rather than a separate "consumed" flag, so two racing joins
//! using the same token can never both win.

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};
use teleport_backend::{Backend, BackendError};
use teleport_core::Role;
use tracing::info;

use crate::error::AuthError;

const BUCKET: [&str; 1] = ["tokens"];

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProvisioningToken {
	pub token: String,
	pub roles: Vec<Role>,
}

pub struct TokenService {
	backend: Arc<dyn Backend>,
}

impl TokenService {
	pub fn new(backend: Arc<dyn Backend>) -> Self {
		Self { backend }
	}

	/// Mints a random token good for the given roles, expiring after `ttl`
	/// (`tctl tokens add --role=<role>`, default TTL 30 minutes).
	pub async fn add_token(&self, roles: Vec<Role>, ttl: Duration) -> Result<ProvisioningToken, AuthError> {
		self.add_named_token(generate_token(), roles, ttl).await
	}

	/// Same as [`Self::add_token`] but with an operator-supplied value
	/// (`tctl tokens add --token=<value>`), used for pre-shared tokens
	/// baked into provisioning images.
	pub async fn add_named_token(
		&self,
		token: String,
		roles: Vec<Role>,
		ttl: Duration,
	) -> Result<ProvisioningToken, AuthError> {
		if roles.is_empty() {
			return Err(AuthError::BadParameter("a token must grant at least one role".into()));
		}
		let record = ProvisioningToken { token, roles };
		let bytes = serde_json::to_vec(&record).map_err(|e| AuthError::Internal(e.into()))?;
		self.backend.put(&BUCKET, &record.token, bytes, Some(ttl)).await?;
		info!(roles = ?record.roles, "issued provisioning token");
		Ok(record)
	}

	/// Atomically redeems `token`, returning the roles it granted. A second
	/// call with the same value — whether racing or after a prior
	/// successful redemption — observes `NotFound`, matching an expired or
	/// never-issued token; redemption and expiry are indistinguishable to
	/// the caller.
	pub async fn consume_token(&self, token: &str) -> Result<ProvisioningToken, AuthError> {
		let Some(bytes) = self.backend.get(&BUCKET, token).await? else {
			return Err(AuthError::NotFound);
		};

		match self
			.backend
			.compare_and_swap(&BUCKET, token, &bytes, Vec::new(), None)
			.await
		{
			Ok(()) => {
				let _ = self.backend.delete(&BUCKET, token).await;
				let record: ProvisioningToken =
					serde_json::from_slice(&bytes).map_err(|e| AuthError::Internal(e.into()))?;
				info!(roles = ?record.roles, "redeemed provisioning token");
				Ok(record)
			},
			Err(BackendError::CompareFailed) => Err(AuthError::NotFound),
			Err(e) => Err(e.into()),
		}
	}
}

fn generate_token() -> String {
	let mut rng = rand::thread_rng();
	(0..32).map(|_| rng.gen_range(b'a'..=b'z') as char).collect()
}

#[cfg(test)]
mod tests {
	use super::*;
	use teleport_backend::memory::MemoryBackend;

	fn service() -> TokenService {
		TokenService::new(Arc::new(MemoryBackend::new()))
	}

	#[tokio::test]
	async fn add_then_consume_once() {
		let svc = service();
		let issued = svc
			.add_token(vec![Role::Node], Duration::from_secs(60))
			.await
			.unwrap();

		let consumed = svc.consume_token(&issued.token).await.unwrap();
		assert_eq!(consumed.roles, vec![Role::Node]);

		let err = svc.consume_token(&issued.token).await.unwrap_err();
		assert!(matches!(err, AuthError::NotFound));
	}

	#[tokio::test]
	async fn concurrent_consume_only_one_winner() {
		let svc = Arc::new(service());
		let issued = svc
			.add_token(vec![Role::Proxy], Duration::from_secs(60))
			.await
			.unwrap();

		let mut handles = Vec::new();
		for _ in 0..8 {
			let svc = svc.clone();
			let token = issued.token.clone();
			handles.push(tokio::spawn(async move { svc.consume_token(&token).await }));
		}
		let mut successes = 0;
		for h in handles {
			if h.await.unwrap().is_ok() {
				successes += 1;
			}
		}
		assert_eq!(successes, 1);
	}

	#[tokio::test]
	async fn expired_token_is_not_found() {
		let svc = service();
		let issued = svc
			.add_token(vec![Role::Node], Duration::from_millis(10))
			.await
			.unwrap();
		tokio::time::sleep(Duration::from_millis(40)).await;
		let err = svc.consume_token(&issued.token).await.unwrap_err();
		assert!(matches!(err, AuthError::NotFound));
	}

	#[tokio::test]
	async fn rejects_role_less_token() {
		let svc = service();
		let err = svc.add_token(vec![], Duration::from_secs(60)).await.unwrap_err();
		assert!(matches!(err, AuthError::BadParameter(_)));
	}
}
