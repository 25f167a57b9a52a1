//! Certificate-authority lifecycle and issuance: the `CertAuthority` data
//! model, the CRUD service over it, and the SSH certificate signing
//! operations built on top.

pub mod cert_authority;
pub mod error;
pub mod issuance;
pub mod service;

pub use cert_authority::{CaId, CaType, CertAuthority};
pub use error::CaError;
pub use service::CaService;
