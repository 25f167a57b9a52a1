//! Turns the operator's `backend:` config stanza into a `Backend` trait
//! object. Neither a bbolt-equivalent on-disk engine nor a real etcd client
//! is wired in yet, so both config variants resolve to the in-process
//! `MemoryBackend` today; the config schema is forward-compatible with a
//! real binding slotting in behind either arm without call sites changing.

use std::sync::Arc;

use teleport_backend::memory::MemoryBackend;
use teleport_backend::Backend;
use teleport_core::config::BackendConfig;
use tracing::warn;

pub fn build_backend(config: &BackendConfig) -> Arc<dyn Backend> {
	match config {
		BackendConfig::Bolt { .. } => Arc::new(MemoryBackend::new()),
		BackendConfig::Etcd { nodes, .. } => {
			warn!(?nodes, "etcd backend configured but no etcd client crate is wired in; using in-process memory backend");
			Arc::new(MemoryBackend::new())
		},
	}
}
