//! Node presence: independent of the live tunnel connection, each node
//! heartbeats its principal and labels to Auth on a TTL-backed
//! record (`ServerHeartbeatTTL` ≈ 6s) so label-based routing lookups (the
//! second step of the tunnel's principal → label → DNS fallback order) can
//! be served without the Proxy needing to ask every node directly.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use serde::{Deserialize, Serialize};
use teleport_backend::Backend;

use crate::error::AuthError;

const BUCKET: [&str; 1] = ["presence"];

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PresenceRecord {
	pub principal: String,
	pub labels: HashMap<String, String>,
	pub advertised_at: SystemTime,
}

pub struct PresenceService {
	backend: Arc<dyn Backend>,
}

impl PresenceService {
	pub fn new(backend: Arc<dyn Backend>) -> Self {
		Self { backend }
	}

	pub async fn heartbeat_presence(
		&self,
		principal: String,
		labels: HashMap<String, String>,
		ttl: Duration,
	) -> Result<(), AuthError> {
		let record = PresenceRecord {
			principal,
			labels,
			advertised_at: SystemTime::now(),
		};
		let bytes = serde_json::to_vec(&record).map_err(|e| AuthError::Internal(e.into()))?;
		self
			.backend
			.put(&BUCKET, &record.principal, bytes, Some(ttl))
			.await?;
		Ok(())
	}

	pub async fn list_presence(&self) -> Result<Vec<PresenceRecord>, AuthError> {
		let entries = self.backend.list(&BUCKET).await?;
		entries
			.into_iter()
			.map(|(_, bytes)| serde_json::from_slice(&bytes).map_err(|e| AuthError::Internal(e.into())))
			.collect()
	}

	/// Finds the principals advertising `label=value`, the Auth-mediated
	/// fallback used when a tunnel hub has no exact-principal match.
	pub async fn find_by_label(&self, label: &str, value: &str) -> Result<Vec<String>, AuthError> {
		Ok(
			self
				.list_presence()
				.await?
				.into_iter()
				.filter(|r| r.labels.get(label).map(String::as_str) == Some(value))
				.map(|r| r.principal)
				.collect(),
		)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use teleport_backend::memory::MemoryBackend;

	#[tokio::test]
	async fn heartbeat_then_list_round_trips() {
		let svc = PresenceService::new(Arc::new(MemoryBackend::new()));
		let mut labels = HashMap::new();
		labels.insert("env".to_string(), "prod".to_string());
		svc
			.heartbeat_presence("node-a.example.com".into(), labels, Duration::from_secs(6))
			.await
			.unwrap();

		let all = svc.list_presence().await.unwrap();
		assert_eq!(all.len(), 1);
		assert_eq!(all[0].principal, "node-a.example.com");
	}

	#[tokio::test]
	async fn find_by_label_matches_only_advertised_value() {
		let svc = PresenceService::new(Arc::new(MemoryBackend::new()));
		let mut prod = HashMap::new();
		prod.insert("env".to_string(), "prod".to_string());
		let mut staging = HashMap::new();
		staging.insert("env".to_string(), "staging".to_string());
		svc
			.heartbeat_presence("node-a.example.com".into(), prod, Duration::from_secs(6))
			.await
			.unwrap();
		svc
			.heartbeat_presence("node-b.example.com".into(), staging, Duration::from_secs(6))
			.await
			.unwrap();

		let matches = svc.find_by_label("env", "prod").await.unwrap();
		assert_eq!(matches, vec!["node-a.example.com".to_string()]);
	}

	#[tokio::test]
	async fn presence_expires_with_ttl() {
		let svc = PresenceService::new(Arc::new(MemoryBackend::new()));
		svc
			.heartbeat_presence("node-a.example.com".into(), HashMap::new(), Duration::from_millis(10))
			.await
			.unwrap();
		tokio::time::sleep(Duration::from_millis(40)).await;
		assert!(svc.list_presence().await.unwrap().is_empty());
	}
}
