//! The `tsh`-side trust plane: the host-key trust cache and the local
//! short-lived-key cache, both rooted at `$HOME/.tsh`.

use std::path::PathBuf;

pub mod error;
pub mod localkey;
pub mod trust;

pub use error::ClientError;
pub use localkey::{LocalAgentKeyring, LocalKey};
pub use trust::TrustStore;

/// `$HOME/.tsh`, the client trust cache root.
pub fn default_tsh_dir() -> Result<PathBuf, ClientError> {
	dirs::home_dir()
		.map(|home| home.join(".tsh"))
		.ok_or_else(|| ClientError::BadParameter("no home directory for the current user".into()))
}
