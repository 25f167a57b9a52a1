//! The `CertAuthority` data model — one per `(cluster-domain, type)`,
//! holding an ordered list of signing/checking key pairs so
//! rotation can prepend a new pair while old certificates still validate
//! against the retired checking key for the grace window.

use std::fmt;

use russh::keys::ssh_key::rand_core::OsRng;
use russh::keys::ssh_key::{Algorithm, PrivateKey, PublicKey};
use serde::{Deserialize, Serialize};

use crate::error::CaError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaType {
	Host,
	User,
}

impl fmt::Display for CaType {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(match self {
			CaType::Host => "host",
			CaType::User => "user",
		})
	}
}

/// Identifies one CA: `(cluster-domain, type)`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CaId {
	pub domain: String,
	pub ca_type: CaType,
}

impl CaId {
	pub fn new(domain: impl Into<String>, ca_type: CaType) -> Self {
		Self {
			domain: domain.into(),
			ca_type,
		}
	}

	pub fn storage_key(&self) -> String {
		format!("{}.{}", self.ca_type, self.domain)
	}
}

/// On-disk encoding of one signing/checking pair. Stored as OpenSSH text so
/// the backend's opaque `Vec<u8>` values stay human-inspectable rather than
/// an undifferentiated blob of raw DER.
#[derive(Clone, Serialize, Deserialize)]
struct KeyPairRecord {
	signing_key_openssh: String,
	checking_key_openssh: String,
}

#[derive(Clone, Serialize, Deserialize)]
struct CertAuthorityRecord {
	id: CaId,
	keys: Vec<KeyPairRecord>,
}

/// The runtime, parsed form of a `CertAuthority`. `signing_keys` is empty
/// unless it was loaded `with_secrets = true` — that flag is the single
/// authorization gate for secret material.
#[derive(Clone)]
pub struct CertAuthority {
	pub id: CaId,
	pub signing_keys: Vec<PrivateKey>,
	pub checking_keys: Vec<PublicKey>,
}

impl CertAuthority {
	/// Generates a fresh CA with one ed25519 signing/checking pair.
	pub fn generate(id: CaId) -> Result<Self, CaError> {
		let signing_key =
			PrivateKey::random(&mut OsRng, Algorithm::Ed25519).map_err(|e| CaError::KeyGen(e.into()))?;
		let checking_key = signing_key.public_key().clone();
		Ok(CertAuthority {
			id,
			signing_keys: vec![signing_key],
			checking_keys: vec![checking_key],
		})
	}

	/// The active signer: new issuance always uses the head of the list.
	pub fn active_signing_key(&self) -> Result<&PrivateKey, CaError> {
		self
			.signing_keys
			.first()
			.ok_or_else(|| CaError::BadParameter("certificate authority has no signing keys".into()))
	}

	/// Prepends a new signing/checking pair, keeping the old one for the
	/// rotation grace window. Operator-only by construction — there is no
	/// RPC exposing it; a rotation is applied directly to the stored record.
	pub fn rotate(&mut self) -> Result<(), CaError> {
		let signing_key =
			PrivateKey::random(&mut OsRng, Algorithm::Ed25519).map_err(|e| CaError::KeyGen(e.into()))?;
		let checking_key = signing_key.public_key().clone();
		self.signing_keys.insert(0, signing_key);
		self.checking_keys.insert(0, checking_key);
		Ok(())
	}

	/// Every checking public key, in order, for comparison against a
	/// candidate certificate's signer key.
	pub fn checkers(&self) -> &[PublicKey] {
		&self.checking_keys
	}

	pub fn to_bytes(&self, with_secrets: bool) -> Result<Vec<u8>, CaError> {
		let mut keys = Vec::with_capacity(self.signing_keys.len());
		for (signing, checking) in self.signing_keys.iter().zip(self.checking_keys.iter()) {
			let signing_key_openssh = if with_secrets {
				signing
					.to_openssh(russh::keys::ssh_key::LineEnding::LF)
					.map_err(|e| CaError::Encoding(e.into()))?
					.to_string()
			} else {
				String::new()
			};
			let checking_key_openssh = checking
				.to_openssh()
				.map_err(|e| CaError::Encoding(e.into()))?;
			keys.push(KeyPairRecord {
				signing_key_openssh,
				checking_key_openssh,
			});
		}
		let record = CertAuthorityRecord {
			id: self.id.clone(),
			keys,
		};
		serde_json::to_vec(&record).map_err(|e| CaError::Encoding(e.into()))
	}

	pub fn from_bytes(bytes: &[u8]) -> Result<Self, CaError> {
		let record: CertAuthorityRecord =
			serde_json::from_slice(bytes).map_err(|e| CaError::Encoding(e.into()))?;
		let mut signing_keys = Vec::with_capacity(record.keys.len());
		let mut checking_keys = Vec::with_capacity(record.keys.len());
		for k in &record.keys {
			if !k.signing_key_openssh.is_empty() {
				signing_keys.push(
					PrivateKey::from_openssh(&k.signing_key_openssh).map_err(|e| CaError::Encoding(e.into()))?,
				);
			}
			checking_keys.push(
				PublicKey::from_openssh(&k.checking_key_openssh).map_err(|e| CaError::Encoding(e.into()))?,
			);
		}
		Ok(CertAuthority {
			id: record.id,
			signing_keys,
			checking_keys,
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn generate_produces_matching_checking_key() {
		let ca = CertAuthority::generate(CaId::new("example.com", CaType::Host)).unwrap();
		assert_eq!(ca.checking_keys.len(), 1);
		assert_eq!(&ca.checking_keys[0], ca.signing_keys[0].public_key());
	}

	#[test]
	fn round_trips_with_and_without_secrets() {
		let ca = CertAuthority::generate(CaId::new("example.com", CaType::User)).unwrap();

		let public_bytes = ca.to_bytes(false).unwrap();
		let public_only = CertAuthority::from_bytes(&public_bytes).unwrap();
		assert!(public_only.signing_keys.is_empty());
		assert_eq!(public_only.checking_keys, ca.checking_keys);

		let secret_bytes = ca.to_bytes(true).unwrap();
		let with_secrets = CertAuthority::from_bytes(&secret_bytes).unwrap();
		assert_eq!(with_secrets.signing_keys.len(), 1);
		assert_eq!(with_secrets.checking_keys, ca.checking_keys);
	}

	#[test]
	fn rotate_prepends_and_keeps_old_pair() {
		let mut ca = CertAuthority::generate(CaId::new("example.com", CaType::Host)).unwrap();
		let original_checker = ca.checking_keys[0].clone();
		ca.rotate().unwrap();
		assert_eq!(ca.checking_keys.len(), 2);
		assert_ne!(ca.checking_keys[0], original_checker);
		assert_eq!(ca.checking_keys[1], original_checker);
	}
}
