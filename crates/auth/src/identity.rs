//! The on-disk trust envelope of one host in the cluster. Files are named
//! deterministically from `(HostUUID, Role)` so a host can hold a separate
//! identity per role it plays: `host.<uuid>.<role>.{key,cert}`.

use std::path::{Path, PathBuf};

use russh::keys::ssh_key::{Certificate, PrivateKey};
use teleport_core::Role;
use tracing::debug;

use crate::error::AuthError;

/// The runtime triple `(private key, certificate, signer)` of one local
/// role on one host. The "signer" half is implicit: `private_key` paired
/// with `certificate` is exactly what an outbound SSH handshake needs to
/// present the certificate and prove possession of its key in one step.
#[derive(Clone)]
pub struct Identity {
	pub host_uuid: String,
	pub role: Role,
	pub private_key: PrivateKey,
	pub certificate: Certificate,
}

impl Identity {
	/// `<uuid>.<cluster-domain>` — the principal this identity's
	/// certificate must carry.
	pub fn expected_principal(&self, cluster_domain: &str) -> String {
		format!("{}.{}", self.host_uuid, cluster_domain)
	}
}

fn key_path(data_dir: &Path, host_uuid: &str, role: Role) -> PathBuf {
	data_dir.join(format!("host.{host_uuid}.{role}.key"))
}

fn cert_path(data_dir: &Path, host_uuid: &str, role: Role) -> PathBuf {
	data_dir.join(format!("host.{host_uuid}.{role}.cert"))
}

/// Re-reads an identity from disk. Returns `Ok(None)` if either file is
/// missing (the host is simply unbootstrapped yet); returns an error naming
/// which file failed to parse if the files exist but are corrupt — a host
/// in that state must abort rather than silently regenerate.
pub fn load_from_disk(data_dir: &Path, host_uuid: &str, role: Role) -> Result<Option<Identity>, AuthError> {
	let key_path = key_path(data_dir, host_uuid, role);
	let cert_path = cert_path(data_dir, host_uuid, role);

	if !key_path.exists() || !cert_path.exists() {
		return Ok(None);
	}

	let key_text = fs_err::read_to_string(&key_path)?;
	let private_key = PrivateKey::from_openssh(&key_text).map_err(|e| AuthError::UnbootstrappedIdentity {
		path: key_path.clone(),
		source: e.into(),
	})?;

	let cert_text = fs_err::read_to_string(&cert_path)?;
	let certificate = parse_openssh_certificate(&cert_text).map_err(|e| AuthError::UnbootstrappedIdentity {
		path: cert_path.clone(),
		source: e,
	})?;

	Ok(Some(Identity {
		host_uuid: host_uuid.to_string(),
		role,
		private_key,
		certificate,
	}))
}

/// OpenSSH certificate files are a single `<type> <base64> <comment>` line,
/// the same shape as an `authorized_keys` entry.
fn parse_openssh_certificate(text: &str) -> anyhow::Result<Certificate> {
	let line = text.trim();
	Ok(Certificate::from_openssh(line)?)
}

/// Encodes a certificate as the single-line OpenSSH text form, shared by
/// disk persistence and the wire responses that hand a certificate back to
/// a joining host or signed-in user.
pub fn encode_certificate_line(certificate: &Certificate) -> anyhow::Result<String> {
	Ok(format!(
		"{} {}\n",
		certificate.algorithm().as_certificate_str(),
		certificate.to_openssh()?
	))
}

/// Writes `(private_key, certificate)` atomically: write-to-temp, then
/// rename, with mode 0600 on both files.
pub fn write_to_disk(
	data_dir: &Path,
	host_uuid: &str,
	role: Role,
	private_key: &PrivateKey,
	certificate: &Certificate,
) -> Result<(), AuthError> {
	fs_err::create_dir_all(data_dir)?;

	let key_path = key_path(data_dir, host_uuid, role);
	let cert_path = cert_path(data_dir, host_uuid, role);

	let key_text = private_key.to_openssh(russh::keys::ssh_key::LineEnding::LF)?;
	atomic_write(&key_path, key_text.as_bytes())?;

	let cert_line = encode_certificate_line(certificate)?;
	atomic_write(&cert_path, cert_line.as_bytes())?;

	debug!(host_uuid, %role, "wrote identity to disk");
	Ok(())
}

#[cfg(unix)]
fn atomic_write(path: &Path, contents: &[u8]) -> std::io::Result<()> {
	use std::fs::Permissions;
	use std::io::Write;
	use std::os::unix::fs::PermissionsExt;

	let tmp_path = path.with_extension("tmp");
	{
		let mut f = fs_err::File::create(&tmp_path)?;
		f.set_permissions(Permissions::from_mode(0o600))?;
		f.write_all(contents)?;
		f.sync_all()?;
	}
	fs_err::rename(&tmp_path, path)
}

#[cfg(not(unix))]
fn atomic_write(path: &Path, contents: &[u8]) -> std::io::Result<()> {
	let tmp_path = path.with_extension("tmp");
	fs_err::write(&tmp_path, contents)?;
	fs_err::rename(&tmp_path, path)
}

#[cfg(test)]
mod tests {
	use super::*;
	use russh::keys::ssh_key::certificate::{Builder, CertType};
	use russh::keys::ssh_key::rand_core::OsRng;
	use russh::keys::ssh_key::{Algorithm, PrivateKey as Key};

	fn throwaway_identity(host_uuid: &str) -> (Key, Certificate) {
		let subject = Key::random(&mut OsRng, Algorithm::Ed25519).unwrap();
		let ca_signer = Key::random(&mut OsRng, Algorithm::Ed25519).unwrap();
		let mut builder =
			Builder::new_with_random_nonce(&mut OsRng, subject.public_key(), 0, u64::MAX).unwrap();
		builder.cert_type(CertType::Host).unwrap();
		builder
			.valid_principal(&format!("{host_uuid}.example.com"))
			.unwrap();
		let cert = builder.sign(&ca_signer).unwrap();
		(subject, cert)
	}

	#[test]
	fn missing_files_is_none() {
		let dir = tempfile::tempdir().unwrap();
		let result = load_from_disk(dir.path(), "u1", Role::Node).unwrap();
		assert!(result.is_none());
	}

	#[test]
	fn write_then_read_round_trips() {
		let dir = tempfile::tempdir().unwrap();
		let (key, cert) = throwaway_identity("u1");
		write_to_disk(dir.path(), "u1", Role::Node, &key, &cert).unwrap();

		let identity = load_from_disk(dir.path(), "u1", Role::Node).unwrap().unwrap();
		assert_eq!(identity.host_uuid, "u1");
		assert_eq!(identity.certificate.valid_principals(), cert.valid_principals());
		assert_eq!(identity.expected_principal("example.com"), "u1.example.com");
	}

	#[test]
	fn corrupt_cert_file_is_a_diagnostic_error_not_a_silent_regeneration() {
		let dir = tempfile::tempdir().unwrap();
		let (key, cert) = throwaway_identity("u1");
		write_to_disk(dir.path(), "u1", Role::Node, &key, &cert).unwrap();
		std::fs::write(dir.path().join("host.u1.node.cert"), "not a certificate").unwrap();

		let err = load_from_disk(dir.path(), "u1", Role::Node).unwrap_err();
		match err {
			AuthError::UnbootstrappedIdentity { path, .. } => {
				assert!(path.ends_with("host.u1.node.cert"));
			},
			other => panic!("expected UnbootstrappedIdentity, got {other:?}"),
		}
	}
}
