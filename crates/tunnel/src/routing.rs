//! The hub-side routing table: which reverse-tunneled node answers for a
//! given principal, keyed both by principal and by the labels it
//! advertised on connect. Generic over the handle type so it can be
//! exercised without a live SSH connection in tests; `hub.rs` instantiates
//! it with `russh::server::Handle`.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

#[derive(Clone)]
pub struct RoutedNode<H> {
	pub principal: String,
	pub labels: HashMap<String, String>,
	pub handle: H,
}

/// One entry per live reverse tunnel. Registration/deregistration is
/// serialized by the `RwLock`; routing lookups only need read access.
pub struct RoutingTable<H> {
	nodes: RwLock<HashMap<String, RoutedNode<H>>>,
}

impl<H: Clone + Send + Sync> Default for RoutingTable<H> {
	fn default() -> Self {
		Self { nodes: RwLock::new(HashMap::new()) }
	}
}

impl<H: Clone + Send + Sync> RoutingTable<H> {
	pub fn new() -> Self {
		Self::default()
	}

	pub async fn register(&self, node: RoutedNode<H>) {
		self.nodes.write().await.insert(node.principal.clone(), node);
	}

	pub async fn deregister(&self, principal: &str) {
		self.nodes.write().await.remove(principal);
	}

	/// Step (a) of the routing order: exact principal match.
	pub async fn by_principal(&self, principal: &str) -> Option<RoutedNode<H>> {
		self.nodes.read().await.get(principal).cloned()
	}

	/// Step (b): any connected node that advertised `label=value`. Used
	/// when the lookup is restricted to nodes reachable through this hub;
	/// the cluster-wide label lookup goes through Auth's presence records
	/// instead (`teleport_auth::presence::PresenceService::find_by_label`).
	pub async fn by_label(&self, label: &str, value: &str) -> Option<RoutedNode<H>> {
		self
			.nodes
			.read()
			.await
			.values()
			.find(|n| n.labels.get(label).map(String::as_str) == Some(value))
			.cloned()
	}

	pub async fn len(&self) -> usize {
		self.nodes.read().await.len()
	}

	pub async fn contains(&self, principal: &str) -> bool {
		self.nodes.read().await.contains_key(principal)
	}
}

/// Where a session resolver, after the hub's own table misses, can ask for
/// label matches that live on a different proxy. Kept as a trait so
/// `resolve_route` doesn't need to depend on `teleport-auth` directly for
/// the DNS-only or unit-test case.
#[async_trait::async_trait]
pub trait AuthLabelLookup: Send + Sync {
	async fn find_by_label(&self, label: &str, value: &str) -> anyhow::Result<Vec<String>>;
}

/// A resolved destination for a routed session: either a reverse-tunneled
/// node reachable through this hub, or a direct-dial hint for the caller
/// to fall through to DNS with.
pub enum Route<H> {
	Tunneled(RoutedNode<H>),
	Direct(String),
}

/// Resolves a requested host in order: principal exact match, then label
/// match via Auth, then DNS. `target` is interpreted as `label=value` when
/// it contains `=`, otherwise as a bare principal/hostname.
pub async fn resolve_route<H: Clone + Send + Sync>(
	table: &RoutingTable<H>,
	auth: &dyn AuthLabelLookup,
	target: &str,
) -> anyhow::Result<Route<H>> {
	if let Some(node) = table.by_principal(target).await {
		return Ok(Route::Tunneled(node));
	}

	if let Some((label, value)) = target.split_once('=') {
		for principal in auth.find_by_label(label, value).await? {
			if let Some(node) = table.by_principal(&principal).await {
				return Ok(Route::Tunneled(node));
			}
		}
	}

	Ok(Route::Direct(target.to_string()))
}
