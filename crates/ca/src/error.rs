use teleport_core::ErrorKind;

#[derive(Debug, thiserror::Error)]
pub enum CaError {
	#[error("certificate authority {0:?} not found")]
	NotFound(String),
	#[error("invalid parameter: {0}")]
	BadParameter(String),
	#[error("key generation failed: {0}")]
	KeyGen(#[source] anyhow::Error),
	#[error("certificate signing failed: {0}")]
	Sign(#[source] anyhow::Error),
	#[error("key encoding error: {0}")]
	Encoding(#[source] anyhow::Error),
	#[error("backend error: {0}")]
	Backend(#[from] teleport_backend::BackendError),
}

impl teleport_core::HasKind for CaError {
	fn kind(&self) -> ErrorKind {
		match self {
			CaError::NotFound(_) => ErrorKind::NotFound,
			CaError::BadParameter(_) => ErrorKind::BadParameter,
			CaError::KeyGen(_) | CaError::Sign(_) | CaError::Encoding(_) => ErrorKind::Internal,
			CaError::Backend(e) => teleport_core::HasKind::kind(e),
		}
	}
}
