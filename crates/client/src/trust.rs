//! The client-side host-key trust cache: a small JSON-backed store of
//! host-CA checking keys the user has explicitly trusted, keyed by cluster
//! domain, persisted at `$HOME/.tsh/hostsigners.db`.
//! Trust-on-first-use is explicitly forbidden — a host key is only ever
//! accepted if it is a certificate signed by one of these authorities.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use russh::keys::ssh_key::{Certificate, PublicKey};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::ClientError;

#[derive(Default, Serialize, Deserialize)]
struct TrustDb {
	/// domain -> checking keys trusted for that domain's host-CA.
	domains: HashMap<String, Vec<String>>,
}

/// Loaded, parsed trusted host-CAs for one user. Construction reads
/// `hostsigners.db` if present; an absent file means no CA is trusted yet.
pub struct TrustStore {
	path: PathBuf,
	db: TrustDb,
}

impl TrustStore {
	pub fn open(tsh_dir: &Path) -> Result<Self, ClientError> {
		std::fs::create_dir_all(tsh_dir)?;
		let path = tsh_dir.join("hostsigners.db");
		let db = if path.exists() {
			let bytes = fs_err::read(&path)?;
			serde_json::from_slice(&bytes).map_err(|e| ClientError::Internal(e.into()))?
		} else {
			TrustDb::default()
		};
		Ok(Self { path, db })
	}

	/// `AddHostSignersToCache`: merges `checking_keys` into the trusted set
	/// for `domain`. Serialized with a sibling lockfile so two concurrent
	/// `tsh` invocations writing to the same `$HOME/.tsh` never race.
	pub fn add_host_signers(&mut self, domain: &str, checking_keys: &[PublicKey]) -> Result<(), ClientError> {
		let _guard = FileLock::acquire(&self.path, Duration::from_secs(5))?;

		// Re-read under the lock: another writer may have updated the file
		// since `open` ran.
		if self.path.exists() {
			let bytes = fs_err::read(&self.path)?;
			self.db = serde_json::from_slice(&bytes).map_err(|e| ClientError::Internal(e.into()))?;
		}

		let entry = self.db.domains.entry(domain.to_string()).or_default();
		for key in checking_keys {
			let encoded = key.to_openssh().map_err(|e| ClientError::Internal(e.into()))?;
			if !entry.contains(&encoded) {
				entry.push(encoded);
			}
		}

		let bytes = serde_json::to_vec_pretty(&self.db).map_err(|e| ClientError::Internal(e.into()))?;
		let tmp_path = self.path.with_extension("tmp");
		fs_err::write(&tmp_path, bytes)?;
		fs_err::rename(&tmp_path, &self.path)?;
		debug!(domain, "added host signers to trust cache");
		Ok(())
	}

	/// Entry point for a raw host key presented during an SSH handshake:
	/// rejects it outright unless it is a certificate, regardless of
	/// whether its bytes happen to match a trusted checking key. Trust on
	/// first use is not supported.
	pub fn check_host_key(&self, candidate: &PublicKey) -> Result<(), ClientError> {
		let certificate = Certificate::try_from(candidate.clone()).map_err(|_| ClientError::NotACertificate)?;
		self.check_host_signature(&certificate)
	}

	/// `CheckHostSignature`: requires the certificate's signer key to match
	/// a trusted checking key for some domain.
	pub fn check_host_signature(&self, candidate: &Certificate) -> Result<(), ClientError> {
		let signer = candidate.signature_key();
		for keys in self.db.domains.values() {
			for encoded in keys {
				let trusted = PublicKey::from_openssh(encoded).map_err(|e| ClientError::Internal(e.into()))?;
				if &trusted == signer {
					return Ok(());
				}
			}
		}
		Err(ClientError::UnknownAuthority(
			"host certificate was not signed by any trusted authority".into(),
		))
	}
}

/// A best-effort advisory lock implemented with an exclusively-created
/// sibling file, removed on drop. Good enough for serializing the handful
/// of local `tsh`/`teleport` processes that ever touch one user's trust
/// cache concurrently.
struct FileLock {
	lock_path: PathBuf,
}

impl FileLock {
	fn acquire(target: &Path, timeout: Duration) -> Result<Self, ClientError> {
		let lock_path = target.with_extension("lock");
		let deadline = std::time::Instant::now() + timeout;
		loop {
			match std::fs::OpenOptions::new().write(true).create_new(true).open(&lock_path) {
				Ok(_) => return Ok(Self { lock_path }),
				Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
					if std::time::Instant::now() >= deadline {
						return Err(ClientError::Locked(format!("{}", lock_path.display())));
					}
					std::thread::sleep(Duration::from_millis(20));
				},
				Err(e) => return Err(e.into()),
			}
		}
	}
}

impl Drop for FileLock {
	fn drop(&mut self) {
		if let Err(e) = std::fs::remove_file(&self.lock_path) {
			warn!(error = %e, "failed to release trust cache file lock");
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use russh::keys::ssh_key::certificate::{Builder, CertType};
	use russh::keys::ssh_key::rand_core::OsRng;
	use russh::keys::ssh_key::{Algorithm, PrivateKey};

	fn tempdir() -> tempfile::TempDir {
		tempfile::tempdir().unwrap()
	}

	fn signed_cert(signer: &PrivateKey) -> Certificate {
		let subject = PrivateKey::random(&mut OsRng, Algorithm::Ed25519).unwrap();
		let mut builder = Builder::new_with_random_nonce(&mut OsRng, subject.public_key(), 0, u64::MAX).unwrap();
		builder.cert_type(CertType::Host).unwrap();
		builder.valid_principal("node.example.com").unwrap();
		builder.sign(signer).unwrap()
	}

	#[test]
	fn accepts_cert_from_trusted_domain() {
		let dir = tempdir();
		let ca_signer = PrivateKey::random(&mut OsRng, Algorithm::Ed25519).unwrap();
		let mut store = TrustStore::open(dir.path()).unwrap();
		store.add_host_signers("example.com", &[ca_signer.public_key().clone()]).unwrap();

		let cert = signed_cert(&ca_signer);
		store.check_host_signature(&cert).unwrap();
	}

	#[test]
	fn rejects_cert_from_untrusted_domain() {
		let dir = tempdir();
		let trusted_signer = PrivateKey::random(&mut OsRng, Algorithm::Ed25519).unwrap();
		let rogue_signer = PrivateKey::random(&mut OsRng, Algorithm::Ed25519).unwrap();
		let mut store = TrustStore::open(dir.path()).unwrap();
		store.add_host_signers("example.com", &[trusted_signer.public_key().clone()]).unwrap();

		let cert = signed_cert(&rogue_signer);
		let err = store.check_host_signature(&cert).unwrap_err();
		assert!(matches!(err, ClientError::UnknownAuthority(_)));
	}

	#[test]
	fn rejects_raw_non_certificate_key_even_if_bytes_match() {
		let dir = tempdir();
		let ca_signer = PrivateKey::random(&mut OsRng, Algorithm::Ed25519).unwrap();
		let mut store = TrustStore::open(dir.path()).unwrap();
		store.add_host_signers("example.com", &[ca_signer.public_key().clone()]).unwrap();

		let err = store.check_host_key(ca_signer.public_key()).unwrap_err();
		assert!(matches!(err, ClientError::NotACertificate));
	}

	#[test]
	fn trust_survives_reopen() {
		let dir = tempdir();
		let ca_signer = PrivateKey::random(&mut OsRng, Algorithm::Ed25519).unwrap();
		{
			let mut store = TrustStore::open(dir.path()).unwrap();
			store.add_host_signers("example.com", &[ca_signer.public_key().clone()]).unwrap();
		}
		let store = TrustStore::open(dir.path()).unwrap();
		let cert = signed_cert(&ca_signer);
		store.check_host_signature(&cert).unwrap();
	}
}
