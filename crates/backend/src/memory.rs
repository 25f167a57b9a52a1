//! A single-process, embedded store — the stand-in for a file-backed
//! single-process binding. Held entirely in memory here; the same
//! `HashMap<bucket, HashMap<key, Entry>>` shape is what a durable on-disk
//! encoding (e.g. a small append-only log) would sit behind, a swappable
//! detail rather than something this backend builds.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;
use rand::Rng;
use tracing::debug;

use crate::{Backend, BackendError, BucketPath, Lock};

#[derive(Clone)]
struct Entry {
	value: Vec<u8>,
	expires_at: Option<Instant>,
}

impl Entry {
	fn is_expired(&self, now: Instant) -> bool {
		self.expires_at.is_some_and(|at| now >= at)
	}
}

struct LockEntry {
	token: String,
	expires_at: Instant,
}

#[derive(Default)]
pub struct MemoryBackend {
	buckets: Mutex<HashMap<String, HashMap<String, Entry>>>,
	locks: Mutex<HashMap<String, LockEntry>>,
}

fn bucket_key(bucket: BucketPath<'_>) -> String {
	bucket.join("/")
}

impl MemoryBackend {
	pub fn new() -> Self {
		Self::default()
	}

	fn reap_bucket(&self, bucket: &str, now: Instant) {
		let mut buckets = self.buckets.lock();
		if let Some(b) = buckets.get_mut(bucket) {
			b.retain(|_, e| !e.is_expired(now));
		}
	}
}

#[async_trait]
impl Backend for MemoryBackend {
	async fn put(
		&self,
		bucket: BucketPath<'_>,
		key: &str,
		value: Vec<u8>,
		ttl: Option<Duration>,
	) -> Result<(), BackendError> {
		let bucket = bucket_key(bucket);
		let expires_at = ttl.map(|d| Instant::now() + d);
		self
			.buckets
			.lock()
			.entry(bucket)
			.or_default()
			.insert(key.to_string(), Entry { value, expires_at });
		Ok(())
	}

	async fn get(&self, bucket: BucketPath<'_>, key: &str) -> Result<Option<Vec<u8>>, BackendError> {
		let bucket = bucket_key(bucket);
		self.reap_bucket(&bucket, Instant::now());
		Ok(
			self
				.buckets
				.lock()
				.get(&bucket)
				.and_then(|b| b.get(key))
				.map(|e| e.value.clone()),
		)
	}

	async fn list(&self, bucket: BucketPath<'_>) -> Result<Vec<(String, Vec<u8>)>, BackendError> {
		let bucket = bucket_key(bucket);
		self.reap_bucket(&bucket, Instant::now());
		Ok(
			self
				.buckets
				.lock()
				.get(&bucket)
				.map(|b| b.iter().map(|(k, e)| (k.clone(), e.value.clone())).collect())
				.unwrap_or_default(),
		)
	}

	async fn delete(&self, bucket: BucketPath<'_>, key: &str) -> Result<(), BackendError> {
		let bucket = bucket_key(bucket);
		if let Some(b) = self.buckets.lock().get_mut(&bucket) {
			b.remove(key);
		}
		Ok(())
	}

	async fn delete_bucket(&self, bucket: BucketPath<'_>) -> Result<(), BackendError> {
		let bucket = bucket_key(bucket);
		self.buckets.lock().remove(&bucket);
		Ok(())
	}

	async fn compare_and_swap(
		&self,
		bucket: BucketPath<'_>,
		key: &str,
		old: &[u8],
		new: Vec<u8>,
		ttl: Option<Duration>,
	) -> Result<(), BackendError> {
		let bucket = bucket_key(bucket);
		self.reap_bucket(&bucket, Instant::now());
		let mut buckets = self.buckets.lock();
		let b = buckets.entry(bucket).or_default();
		let current = b.get(key).map(|e| e.value.as_slice());
		let matches = match current {
			Some(v) => v == old,
			None => old.is_empty(),
		};
		if !matches {
			return Err(BackendError::CompareFailed);
		}
		let expires_at = ttl.map(|d| Instant::now() + d);
		b.insert(key.to_string(), Entry { value: new, expires_at });
		Ok(())
	}

	async fn acquire_lock(&self, name: &str, ttl: Duration, wait: Duration) -> Result<Lock, BackendError> {
		let deadline = Instant::now() + wait;
		loop {
			let now = Instant::now();
			{
				let mut locks = self.locks.lock();
				let held = locks.get(name).is_some_and(|l| now < l.expires_at);
				if !held {
					let token: String = {
						let mut rng = rand::thread_rng();
						(0..16).map(|_| rng.gen_range(b'a'..=b'z') as char).collect()
					};
					locks.insert(
						name.to_string(),
						LockEntry {
							token: token.clone(),
							expires_at: now + ttl,
						},
					);
					debug!(lock = name, "acquired advisory lock");
					return Ok(Lock {
						name: name.to_string(),
						token,
					});
				}
			}
			if Instant::now() >= deadline {
				return Err(BackendError::LockHeld(name.to_string()));
			}
			tokio::time::sleep(Duration::from_millis(25)).await;
		}
	}

	async fn release_lock(&self, lock: Lock) -> Result<(), BackendError> {
		let mut locks = self.locks.lock();
		match locks.get(&lock.name) {
			Some(l) if l.token == lock.token => {
				locks.remove(&lock.name);
				Ok(())
			},
			Some(_) => Err(BackendError::LockTokenMismatch),
			None => Ok(()),
		}
	}
}
