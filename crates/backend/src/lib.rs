//! The pluggable key/value abstraction the rest of the trust plane programs
//! against. Concrete bindings (`memory`, `etcd_like`) are collaborators —
//! the core crates never see past the `Backend` trait.

pub mod error;
pub mod etcd_like;
pub mod memory;

use std::time::Duration;

use async_trait::async_trait;

pub use error::BackendError;

/// A path of bucket segments, e.g. `&["cas", "host"]` for the host CA record.
pub type BucketPath<'a> = &'a [&'a str];

/// An advisory lock handle. Released with the same token it was acquired
/// with, so a stale holder cannot release a lock someone else has since
/// reacquired after TTL expiry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Lock {
	pub name: String,
	pub token: String,
}

#[async_trait]
pub trait Backend: Send + Sync + 'static {
	/// `ttl = None` means forever.
	async fn put(
		&self,
		bucket: BucketPath<'_>,
		key: &str,
		value: Vec<u8>,
		ttl: Option<Duration>,
	) -> Result<(), BackendError>;

	async fn get(&self, bucket: BucketPath<'_>, key: &str) -> Result<Option<Vec<u8>>, BackendError>;

	async fn list(&self, bucket: BucketPath<'_>) -> Result<Vec<(String, Vec<u8>)>, BackendError>;

	async fn delete(&self, bucket: BucketPath<'_>, key: &str) -> Result<(), BackendError>;

	async fn delete_bucket(&self, bucket: BucketPath<'_>) -> Result<(), BackendError>;

	/// Atomically replaces `key`'s value with `new` iff its current value
	/// equals `old` (an absent key matches an empty `old`). Fails with
	/// `BackendError::CompareFailed` otherwise — distinct from `NotFound`.
	async fn compare_and_swap(
		&self,
		bucket: BucketPath<'_>,
		key: &str,
		old: &[u8],
		new: Vec<u8>,
		ttl: Option<Duration>,
	) -> Result<(), BackendError>;

	/// Acquires an advisory lock, used to serialize concurrent first-start
	/// initialization. Blocks (internally retrying) until acquired or
	/// `wait` elapses.
	async fn acquire_lock(&self, name: &str, ttl: Duration, wait: Duration) -> Result<Lock, BackendError>;

	async fn release_lock(&self, lock: Lock) -> Result<(), BackendError>;
}

#[cfg(test)]
mod conformance {
	//! A shared conformance suite run against every `Backend` impl, so a new
	//! binding (e.g. a future file-backed store) is exercised the same way.
	use super::*;
	use crate::memory::MemoryBackend;
	use std::sync::Arc;

	async fn run_put_get_delete(b: Arc<dyn Backend>) {
		b.put(&["bucket"], "k", b"v".to_vec(), None).await.unwrap();
		assert_eq!(
			b.get(&["bucket"], "k").await.unwrap(),
			Some(b"v".to_vec())
		);
		b.delete(&["bucket"], "k").await.unwrap();
		assert_eq!(b.get(&["bucket"], "k").await.unwrap(), None);
	}

	async fn run_expired_keys_are_absent(b: Arc<dyn Backend>) {
		b.put(&["bucket"], "k", b"v".to_vec(), Some(Duration::from_millis(10)))
			.await
			.unwrap();
		tokio::time::sleep(Duration::from_millis(40)).await;
		assert_eq!(b.get(&["bucket"], "k").await.unwrap(), None);
		assert!(b.list(&["bucket"]).await.unwrap().is_empty());
	}

	async fn run_cas(b: Arc<dyn Backend>) {
		b.compare_and_swap(&["bucket"], "k", b"", b"v1".to_vec(), None)
			.await
			.unwrap();
		b.compare_and_swap(&["bucket"], "k", b"v1", b"v2".to_vec(), None)
			.await
			.unwrap();
		let err = b
			.compare_and_swap(&["bucket"], "k", b"v1", b"v3".to_vec(), None)
			.await
			.unwrap_err();
		assert!(matches!(err, BackendError::CompareFailed));
	}

	#[tokio::test]
	async fn memory_backend_conformance() {
		let b: Arc<dyn Backend> = Arc::new(MemoryBackend::new());
		run_put_get_delete(b.clone()).await;
		run_expired_keys_are_absent(b.clone()).await;
		run_cas(b).await;
	}
}
