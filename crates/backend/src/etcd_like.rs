//! A thin adapter demonstrating how a replicated backend plugs into the
//! `Backend` trait without the workspace taking a hard dependency on any
//! one etcd client crate. `KvTransport` is the narrow capability set a real
//! client (e.g. `etcd-client`) would be wired into at startup via the
//! `backend: { type: etcd, nodes: [...] }` config; `StubKvTransport` is an
//! in-memory transport used only by this crate's own tests.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::{Backend, BackendError, BucketPath, Lock};

#[async_trait]
pub trait KvTransport: Send + Sync + 'static {
	async fn put(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> Result<(), BackendError>;
	async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, BackendError>;
	async fn get_prefix(&self, prefix: &str) -> Result<Vec<(String, Vec<u8>)>, BackendError>;
	async fn delete(&self, key: &str) -> Result<(), BackendError>;
	async fn delete_prefix(&self, prefix: &str) -> Result<(), BackendError>;
	/// Returns `Ok(())` if `key`'s stored value equals `old` (or is absent
	/// and `old` is empty) and the swap to `new` was applied atomically;
	/// `Err(BackendError::CompareFailed)` otherwise.
	async fn compare_and_swap(
		&self,
		key: &str,
		old: &[u8],
		new: Vec<u8>,
		ttl: Option<Duration>,
	) -> Result<(), BackendError>;
	async fn acquire_lock(&self, name: &str, ttl: Duration, wait: Duration) -> Result<Lock, BackendError>;
	async fn release_lock(&self, lock: Lock) -> Result<(), BackendError>;
}

pub struct EtcdLikeBackend<T: KvTransport> {
	transport: T,
}

impl<T: KvTransport> EtcdLikeBackend<T> {
	pub fn new(transport: T) -> Self {
		Self { transport }
	}
}

fn key_with_bucket(bucket: BucketPath<'_>, key: &str) -> String {
	format!("{}/{}", bucket.join("/"), key)
}

fn prefix(bucket: BucketPath<'_>) -> String {
	format!("{}/", bucket.join("/"))
}

#[async_trait]
impl<T: KvTransport> Backend for EtcdLikeBackend<T> {
	async fn put(
		&self,
		bucket: BucketPath<'_>,
		key: &str,
		value: Vec<u8>,
		ttl: Option<Duration>,
	) -> Result<(), BackendError> {
		self.transport.put(&key_with_bucket(bucket, key), value, ttl).await
	}

	async fn get(&self, bucket: BucketPath<'_>, key: &str) -> Result<Option<Vec<u8>>, BackendError> {
		self.transport.get(&key_with_bucket(bucket, key)).await
	}

	async fn list(&self, bucket: BucketPath<'_>) -> Result<Vec<(String, Vec<u8>)>, BackendError> {
		let p = prefix(bucket);
		let entries = self.transport.get_prefix(&p).await?;
		Ok(
			entries
				.into_iter()
				.map(|(k, v)| (k.trim_start_matches(&p).to_string(), v))
				.collect(),
		)
	}

	async fn delete(&self, bucket: BucketPath<'_>, key: &str) -> Result<(), BackendError> {
		self.transport.delete(&key_with_bucket(bucket, key)).await
	}

	async fn delete_bucket(&self, bucket: BucketPath<'_>) -> Result<(), BackendError> {
		self.transport.delete_prefix(&prefix(bucket)).await
	}

	async fn compare_and_swap(
		&self,
		bucket: BucketPath<'_>,
		key: &str,
		old: &[u8],
		new: Vec<u8>,
		ttl: Option<Duration>,
	) -> Result<(), BackendError> {
		self
			.transport
			.compare_and_swap(&key_with_bucket(bucket, key), old, new, ttl)
			.await
	}

	async fn acquire_lock(&self, name: &str, ttl: Duration, wait: Duration) -> Result<Lock, BackendError> {
		self.transport.acquire_lock(name, ttl, wait).await
	}

	async fn release_lock(&self, lock: Lock) -> Result<(), BackendError> {
		self.transport.release_lock(lock).await
	}
}

/// An in-memory `KvTransport` used only to exercise `EtcdLikeBackend`'s
/// wiring in tests; it deliberately reimplements nothing from
/// `memory::MemoryBackend` beyond what's needed to prove the adapter layer
/// is transport-agnostic.
pub struct StubKvTransport {
	data: Mutex<HashMap<String, Vec<u8>>>,
}

impl StubKvTransport {
	pub fn new() -> Self {
		Self {
			data: Mutex::new(HashMap::new()),
		}
	}
}

impl Default for StubKvTransport {
	fn default() -> Self {
		Self::new()
	}
}

#[async_trait]
impl KvTransport for StubKvTransport {
	async fn put(&self, key: &str, value: Vec<u8>, _ttl: Option<Duration>) -> Result<(), BackendError> {
		self.data.lock().await.insert(key.to_string(), value);
		Ok(())
	}

	async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, BackendError> {
		Ok(self.data.lock().await.get(key).cloned())
	}

	async fn get_prefix(&self, prefix: &str) -> Result<Vec<(String, Vec<u8>)>, BackendError> {
		Ok(
			self
				.data
				.lock()
				.await
				.iter()
				.filter(|(k, _)| k.starts_with(prefix))
				.map(|(k, v)| (k.clone(), v.clone()))
				.collect(),
		)
	}

	async fn delete(&self, key: &str) -> Result<(), BackendError> {
		self.data.lock().await.remove(key);
		Ok(())
	}

	async fn delete_prefix(&self, prefix: &str) -> Result<(), BackendError> {
		self.data.lock().await.retain(|k, _| !k.starts_with(prefix));
		Ok(())
	}

	async fn compare_and_swap(
		&self,
		key: &str,
		old: &[u8],
		new: Vec<u8>,
		_ttl: Option<Duration>,
	) -> Result<(), BackendError> {
		let mut data = self.data.lock().await;
		let matches = match data.get(key) {
			Some(v) => v.as_slice() == old,
			None => old.is_empty(),
		};
		if !matches {
			return Err(BackendError::CompareFailed);
		}
		data.insert(key.to_string(), new);
		Ok(())
	}

	async fn acquire_lock(&self, name: &str, _ttl: Duration, _wait: Duration) -> Result<Lock, BackendError> {
		Ok(Lock {
			name: name.to_string(),
			token: "stub".to_string(),
		})
	}

	async fn release_lock(&self, _lock: Lock) -> Result<(), BackendError> {
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn adapter_round_trips_through_bucket_paths() {
		let backend = EtcdLikeBackend::new(StubKvTransport::new());
		backend
			.put(&["cas", "host"], "active", b"v1".to_vec(), None)
			.await
			.unwrap();
		assert_eq!(
			backend.get(&["cas", "host"], "active").await.unwrap(),
			Some(b"v1".to_vec())
		);
		let listed = backend.list(&["cas", "host"]).await.unwrap();
		assert_eq!(listed, vec![("active".to_string(), b"v1".to_vec())]);
	}
}
