//! Session event recording: each routed session is wrapped by the session
//! recorder and forwarded to Auth's record backend. This is deliberately
//! not a full audit schema or replay format, just an append-and-list
//! record of who connected to what, when.

use std::sync::Arc;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use teleport_backend::Backend;
use uuid::Uuid;

use crate::error::AuthError;

const BUCKET: [&str; 1] = ["records"];

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SessionEvent {
	pub id: Uuid,
	/// The principal (`<uuid>.<domain>`) of the Proxy that routed this
	/// session.
	pub proxy_principal: String,
	/// The principal of the node or target the session reached.
	pub principal: String,
	pub started_at: SystemTime,
	pub ended_at: Option<SystemTime>,
	pub bytes_tx: u64,
	pub bytes_rx: u64,
}

pub struct SessionRecorder {
	backend: Arc<dyn Backend>,
}

impl SessionRecorder {
	pub fn new(backend: Arc<dyn Backend>) -> Self {
		Self { backend }
	}

	pub async fn record_session(&self, event: &SessionEvent) -> Result<(), AuthError> {
		let bytes = serde_json::to_vec(event).map_err(|e| AuthError::Internal(e.into()))?;
		self.backend.put(&BUCKET, &event.id.to_string(), bytes, None).await?;
		Ok(())
	}

	pub async fn list_sessions(&self) -> Result<Vec<SessionEvent>, AuthError> {
		let entries = self.backend.list(&BUCKET).await?;
		entries
			.into_iter()
			.map(|(_, bytes)| serde_json::from_slice(&bytes).map_err(|e| AuthError::Internal(e.into())))
			.collect()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use teleport_backend::memory::MemoryBackend;

	fn event(principal: &str) -> SessionEvent {
		SessionEvent {
			id: Uuid::new_v4(),
			proxy_principal: "proxy.example.com".into(),
			principal: principal.into(),
			started_at: SystemTime::UNIX_EPOCH,
			ended_at: None,
			bytes_tx: 0,
			bytes_rx: 0,
		}
	}

	#[tokio::test]
	async fn record_then_list_round_trips() {
		let recorder = SessionRecorder::new(Arc::new(MemoryBackend::new()));
		recorder.record_session(&event("node-a.example.com")).await.unwrap();
		recorder.record_session(&event("node-b.example.com")).await.unwrap();

		let sessions = recorder.list_sessions().await.unwrap();
		assert_eq!(sessions.len(), 2);
	}
}
