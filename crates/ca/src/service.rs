//! CRUD over certificate authorities, backed by the `Backend` abstraction.
//! `get_cert_authority`'s `with_secrets` flag is the single
//! authorization gate for signing-key material: every call site outside
//! the Auth server itself must pass `false`.

use std::sync::Arc;
use std::time::Duration;

use teleport_backend::Backend;
use tracing::info;

use crate::cert_authority::{CaId, CaType, CertAuthority};
use crate::error::CaError;

const BUCKET: [&str; 1] = ["cas"];

pub struct CaService {
	backend: Arc<dyn Backend>,
}

impl CaService {
	pub fn new(backend: Arc<dyn Backend>) -> Self {
		Self { backend }
	}

	pub async fn upsert_cert_authority(&self, ca: &CertAuthority, ttl: Option<Duration>) -> Result<(), CaError> {
		let bytes = ca.to_bytes(true)?;
		self
			.backend
			.put(&BUCKET, &ca.id.storage_key(), bytes, ttl)
			.await?;
		info!(ca = %ca.id.storage_key(), "upserted certificate authority");
		Ok(())
	}

	pub async fn get_cert_authority(
		&self,
		id: &CaId,
		with_secrets: bool,
	) -> Result<Option<CertAuthority>, CaError> {
		let Some(bytes) = self.backend.get(&BUCKET, &id.storage_key()).await? else {
			return Ok(None);
		};
		let mut ca = CertAuthority::from_bytes(&bytes)?;
		if !with_secrets {
			ca.signing_keys.clear();
		}
		Ok(Some(ca))
	}

	pub async fn get_cert_authorities(&self, ca_type: CaType) -> Result<Vec<CertAuthority>, CaError> {
		let all = self.backend.list(&BUCKET).await?;
		let mut out = Vec::new();
		for (_, bytes) in all {
			let mut ca = CertAuthority::from_bytes(&bytes)?;
			if ca.id.ca_type == ca_type {
				ca.signing_keys.clear();
				out.push(ca);
			}
		}
		Ok(out)
	}

	pub async fn delete_cert_authority(&self, id: &CaId) -> Result<(), CaError> {
		self.backend.delete(&BUCKET, &id.storage_key()).await?;
		Ok(())
	}

	/// Rotates a CA in place: prepends a new signing/checking pair and
	/// re-persists it, keeping the previous pair for the caller-supplied
	/// grace window. Operator-only by construction — there is no RPC
	/// exposing it.
	pub async fn rotate(&self, id: &CaId) -> Result<CertAuthority, CaError> {
		let mut ca = self
			.get_cert_authority(id, true)
			.await?
			.ok_or_else(|| CaError::NotFound(id.storage_key()))?;
		ca.rotate()?;
		self.upsert_cert_authority(&ca, None).await?;
		Ok(ca)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use teleport_backend::memory::MemoryBackend;

	fn service() -> CaService {
		CaService::new(Arc::new(MemoryBackend::new()))
	}

	#[tokio::test]
	async fn upsert_then_get_round_trips() {
		let svc = service();
		let id = CaId::new("example.com", CaType::Host);
		let ca = CertAuthority::generate(id.clone()).unwrap();
		svc.upsert_cert_authority(&ca, None).await.unwrap();

		let without_secrets = svc.get_cert_authority(&id, false).await.unwrap().unwrap();
		assert!(without_secrets.signing_keys.is_empty());
		assert_eq!(without_secrets.checking_keys, ca.checking_keys);

		let with_secrets = svc.get_cert_authority(&id, true).await.unwrap().unwrap();
		assert_eq!(with_secrets.signing_keys.len(), 1);
	}

	#[tokio::test]
	async fn missing_ca_is_none() {
		let svc = service();
		let id = CaId::new("example.com", CaType::User);
		assert!(svc.get_cert_authority(&id, false).await.unwrap().is_none());
	}

	#[tokio::test]
	async fn rotate_keeps_both_checking_keys() {
		let svc = service();
		let id = CaId::new("example.com", CaType::Host);
		let ca = CertAuthority::generate(id.clone()).unwrap();
		let original_checker = ca.checking_keys[0].clone();
		svc.upsert_cert_authority(&ca, None).await.unwrap();

		let rotated = svc.rotate(&id).await.unwrap();
		assert_eq!(rotated.checking_keys.len(), 2);
		assert!(rotated.checking_keys.contains(&original_checker));

		let reloaded = svc.get_cert_authority(&id, false).await.unwrap().unwrap();
		assert_eq!(reloaded.checking_keys.len(), 2);
	}

	#[tokio::test]
	async fn get_cert_authorities_filters_by_type() {
		let svc = service();
		svc
			.upsert_cert_authority(&CertAuthority::generate(CaId::new("example.com", CaType::Host)).unwrap(), None)
			.await
			.unwrap();
		svc
			.upsert_cert_authority(&CertAuthority::generate(CaId::new("example.com", CaType::User)).unwrap(), None)
			.await
			.unwrap();

		let hosts = svc.get_cert_authorities(CaType::Host).await.unwrap();
		assert_eq!(hosts.len(), 1);
		assert_eq!(hosts[0].id.ca_type, CaType::Host);
	}
}
