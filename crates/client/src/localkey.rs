//! The client's local key cache: short-lived user certificates issued by
//! sign-in, stored as `teleport_<name>.tkey` files under `$HOME/.tsh`.
//! Reads prune past-deadline files first — "prune on read" is the one
//! hygiene rule this cache enforces.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::{DateTime, Utc};
use russh::keys::ssh_key::{Certificate, PrivateKey};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::ClientError;

#[derive(Serialize, Deserialize)]
struct LocalKeyRecord {
	priv_openssh: String,
	cert_openssh: String,
	deadline: DateTime<Utc>,
}

/// One parsed `(priv, cert)` pair plus the name it was issued under.
pub struct LocalKey {
	pub name: String,
	pub private_key: PrivateKey,
	pub certificate: Certificate,
	pub deadline: DateTime<Utc>,
}

fn key_path(tsh_dir: &Path, name: &str) -> PathBuf {
	tsh_dir.join(format!("teleport_{name}.tkey"))
}

impl LocalKey {
	pub fn write(tsh_dir: &Path, name: &str, private_key: &PrivateKey, certificate: &Certificate, deadline: DateTime<Utc>) -> Result<(), ClientError> {
		std::fs::create_dir_all(tsh_dir)?;
		let record = LocalKeyRecord {
			priv_openssh: private_key
				.to_openssh(russh::keys::ssh_key::LineEnding::LF)
				.map_err(|e| ClientError::Internal(e.into()))?
				.to_string(),
			cert_openssh: certificate.to_openssh().map_err(|e| ClientError::Internal(e.into()))?,
			deadline,
		};
		let bytes = serde_json::to_vec(&record).map_err(|e| ClientError::Internal(e.into()))?;
		let path = key_path(tsh_dir, name);
		let tmp_path = path.with_extension("tmp");
		std::fs::write(&tmp_path, bytes)?;
		std::fs::rename(&tmp_path, &path)?;
		Ok(())
	}

	fn load(path: &Path, name: &str) -> Result<Self, ClientError> {
		let bytes = std::fs::read(path)?;
		let record: LocalKeyRecord = serde_json::from_slice(&bytes).map_err(|e| ClientError::Internal(e.into()))?;
		let private_key =
			PrivateKey::from_openssh(&record.priv_openssh).map_err(|e| ClientError::Internal(e.into()))?;
		let certificate =
			Certificate::from_openssh(&record.cert_openssh).map_err(|e| ClientError::Internal(e.into()))?;
		Ok(LocalKey {
			name: name.to_string(),
			private_key,
			certificate,
			deadline: record.deadline,
		})
	}

	pub fn is_expired(&self, now: SystemTime) -> bool {
		self.deadline < DateTime::<Utc>::from(now)
	}
}

/// An in-memory keyring built from every non-expired `teleport_<name>.tkey`
/// file in `tsh_dir`. Construction deletes anything past its deadline
/// before loading the rest, matching "prune on read".
pub struct LocalAgentKeyring {
	pub keys: Vec<LocalKey>,
}

impl LocalAgentKeyring {
	pub fn load_all(tsh_dir: &Path) -> Result<Self, ClientError> {
		let mut keys = Vec::new();
		if !tsh_dir.exists() {
			return Ok(Self { keys });
		}

		let now = SystemTime::now();
		for entry in std::fs::read_dir(tsh_dir)? {
			let entry = entry?;
			let path = entry.path();
			let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
				continue;
			};
			let Some(name) = file_name.strip_prefix("teleport_").and_then(|n| n.strip_suffix(".tkey")) else {
				continue;
			};

			match LocalKey::load(&path, name) {
				Ok(key) if key.is_expired(now) => {
					if let Err(e) = std::fs::remove_file(&path) {
						warn!(error = %e, file = %path.display(), "failed to prune expired local key");
					} else {
						debug!(file = %path.display(), "pruned expired local key");
					}
				},
				Ok(key) => keys.push(key),
				Err(e) => warn!(error = %e, file = %path.display(), "skipping unreadable local key"),
			}
		}

		Ok(Self { keys })
	}

	pub fn find(&self, name: &str) -> Option<&LocalKey> {
		self.keys.iter().find(|k| k.name == name)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use chrono::Duration as ChronoDuration;
	use russh::keys::ssh_key::certificate::{Builder, CertType};
	use russh::keys::ssh_key::rand_core::OsRng;
	use russh::keys::ssh_key::{Algorithm, PrivateKey as Key};

	fn tempdir() -> tempfile::TempDir {
		tempfile::tempdir().unwrap()
	}

	fn throwaway_cert(subject: &Key, signer: &Key) -> Certificate {
		let mut builder = Builder::new_with_random_nonce(&mut OsRng, subject.public_key(), 0, u64::MAX).unwrap();
		builder.cert_type(CertType::User).unwrap();
		builder.valid_principal("alice").unwrap();
		builder.sign(signer).unwrap()
	}

	#[test]
	fn load_all_finds_unexpired_key() {
		let dir = tempdir();
		let subject = Key::random(&mut OsRng, Algorithm::Ed25519).unwrap();
		let signer = Key::random(&mut OsRng, Algorithm::Ed25519).unwrap();
		let cert = throwaway_cert(&subject, &signer);
		let deadline = Utc::now() + ChronoDuration::hours(1);
		LocalKey::write(dir.path(), "alice", &subject, &cert, deadline).unwrap();

		let keyring = LocalAgentKeyring::load_all(dir.path()).unwrap();
		assert_eq!(keyring.keys.len(), 1);
		assert!(keyring.find("alice").is_some());
	}

	#[test]
	fn load_all_prunes_expired_key_file() {
		let dir = tempdir();
		let subject = Key::random(&mut OsRng, Algorithm::Ed25519).unwrap();
		let signer = Key::random(&mut OsRng, Algorithm::Ed25519).unwrap();
		let cert = throwaway_cert(&subject, &signer);
		let deadline = Utc::now() - ChronoDuration::hours(1);
		LocalKey::write(dir.path(), "alice", &subject, &cert, deadline).unwrap();
		assert!(dir.path().join("teleport_alice.tkey").exists());

		let keyring = LocalAgentKeyring::load_all(dir.path()).unwrap();
		assert!(keyring.keys.is_empty());
		assert!(!dir.path().join("teleport_alice.tkey").exists());
	}
}
