//! Certificate issuance: turns a public key plus a principal/TTL into a
//! signed SSH certificate. Host issuance is §4.2/§4.4's `GenerateHostCert`;
//! user issuance is §4.6's sign-in flow.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use russh::keys::ssh_key::certificate::{Builder, CertType};
use russh::keys::ssh_key::rand_core::OsRng;
use russh::keys::ssh_key::{Certificate, PublicKey};
use teleport_core::Role;

use crate::cert_authority::CertAuthority;
use crate::error::CaError;

/// `TTL = 0` means "forever" in the sense the host-CA issuance flow needs:
/// host certs from bootstrap/join carry no expiry. We represent "no
/// expiry" as `u64::MAX` seconds, the OpenSSH convention for an unbounded
/// `valid_before`.
const FOREVER: u64 = u64::MAX;

fn unix_secs(t: SystemTime) -> u64 {
	t.duration_since(UNIX_EPOCH).unwrap_or_default().as_secs()
}

pub fn host_principal(host_uuid: &str, cluster_domain: &str) -> String {
	format!("{host_uuid}.{cluster_domain}")
}

/// Signs a host certificate binding `public_key` to `<uuid>.<domain>`.
pub fn generate_host_cert(
	ca: &CertAuthority,
	public_key: &PublicKey,
	host_uuid: &str,
	cluster_domain: &str,
	role: Role,
	ttl: Duration,
) -> Result<Certificate, CaError> {
	let signer = ca.active_signing_key()?;
	let principal = host_principal(host_uuid, cluster_domain);
	let valid_after = unix_secs(SystemTime::now());
	let valid_before = if ttl.is_zero() {
		FOREVER
	} else {
		valid_after + ttl.as_secs()
	};

	let mut builder = Builder::new_with_random_nonce(&mut OsRng, public_key, valid_after, valid_before)
		.map_err(|e| CaError::Sign(e.into()))?;
	builder
		.cert_type(CertType::Host)
		.map_err(|e| CaError::Sign(e.into()))?;
	builder
		.key_id(format!("{role}:{principal}"))
		.map_err(|e| CaError::Sign(e.into()))?;
	builder
		.valid_principal(&principal)
		.map_err(|e| CaError::Sign(e.into()))?;

	builder.sign(signer).map_err(|e| CaError::Sign(e.into()))
}

/// Signs a user certificate: principals include the OS login;
/// expiry is `now + ttl`, where `ttl` has already been clamped by the
/// caller to `[MinCertDuration, MaxCertDuration]`.
pub fn generate_user_cert(
	ca: &CertAuthority,
	public_key: &PublicKey,
	login: &str,
	ttl: Duration,
) -> Result<Certificate, CaError> {
	let signer = ca.active_signing_key()?;
	let valid_after = unix_secs(SystemTime::now());
	let valid_before = valid_after + ttl.as_secs();

	let mut builder = Builder::new_with_random_nonce(&mut OsRng, public_key, valid_after, valid_before)
		.map_err(|e| CaError::Sign(e.into()))?;
	builder
		.cert_type(CertType::User)
		.map_err(|e| CaError::Sign(e.into()))?;
	builder
		.key_id(format!("teleport-user:{login}"))
		.map_err(|e| CaError::Sign(e.into()))?;
	builder
		.valid_principal(login)
		.map_err(|e| CaError::Sign(e.into()))?;

	builder.sign(signer).map_err(|e| CaError::Sign(e.into()))
}

/// Clamps a requested TTL into `[min, max]`, defaulting to `nominal` when
/// the caller asked for zero.
pub fn clamp_ttl(requested: Duration, min: Duration, max: Duration, nominal: Duration) -> Duration {
	let requested = if requested.is_zero() { nominal } else { requested };
	requested.clamp(min, max)
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::cert_authority::{CaId, CaType};
	use russh::keys::ssh_key::{Algorithm, PrivateKey};

	fn fresh_subject_key() -> PublicKey {
		PrivateKey::random(&mut OsRng, Algorithm::Ed25519)
			.unwrap()
			.public_key()
			.clone()
	}

	#[test]
	fn host_cert_has_expected_principal_and_signer() {
		let ca = CertAuthority::generate(CaId::new("example.com", CaType::Host)).unwrap();
		let subject = fresh_subject_key();
		let cert = generate_host_cert(
			&ca,
			&subject,
			"11111111-1111-1111-1111-111111111111",
			"example.com",
			Role::Node,
			Duration::ZERO,
		)
		.unwrap();

		assert_eq!(
			cert.valid_principals(),
			&["11111111-1111-1111-1111-111111111111.example.com".to_string()]
		);
		assert_eq!(cert.signature_key(), &ca.checking_keys[0]);
		assert_eq!(cert.valid_before(), FOREVER);
	}

	#[test]
	fn user_cert_expiry_tracks_ttl() {
		let ca = CertAuthority::generate(CaId::new("example.com", CaType::User)).unwrap();
		let subject = fresh_subject_key();
		let ttl = Duration::from_secs(3600);
		let before = unix_secs(SystemTime::now());
		let cert = generate_user_cert(&ca, &subject, "alice", ttl).unwrap();
		assert_eq!(cert.valid_principals(), &["alice".to_string()]);
		assert!(cert.valid_before() >= before + 3600);
		assert!(cert.valid_before() <= before + 3660);
	}

	#[test]
	fn clamp_ttl_respects_bounds() {
		let min = Duration::from_secs(60);
		let max = Duration::from_secs(30 * 3600);
		let nominal = Duration::from_secs(12 * 3600);

		assert_eq!(clamp_ttl(Duration::ZERO, min, max, nominal), nominal);
		assert_eq!(clamp_ttl(Duration::from_secs(1), min, max, nominal), min);
		assert_eq!(clamp_ttl(Duration::from_secs(u64::MAX / 2), min, max, nominal), max);
		assert_eq!(
			clamp_ttl(Duration::from_secs(3600), min, max, nominal),
			Duration::from_secs(3600)
		);
	}
}
