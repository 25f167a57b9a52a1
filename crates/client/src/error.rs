use teleport_core::ErrorKind;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
	#[error("unknown authority: {0}")]
	UnknownAuthority(String),
	#[error("host key is not a certificate: trust on first use is not supported")]
	NotACertificate,
	#[error("invalid parameter: {0}")]
	BadParameter(String),
	#[error("trust cache is locked by another process: {0}")]
	Locked(String),
	#[error("i/o error: {0}")]
	Io(#[from] std::io::Error),
	#[error("internal error: {0}")]
	Internal(#[from] anyhow::Error),
}

impl teleport_core::HasKind for ClientError {
	fn kind(&self) -> ErrorKind {
		match self {
			ClientError::UnknownAuthority(_) => ErrorKind::UnknownAuthority,
			ClientError::NotACertificate => ErrorKind::UnknownAuthority,
			ClientError::BadParameter(_) => ErrorKind::BadParameter,
			ClientError::Locked(_) => ErrorKind::AccessDenied,
			ClientError::Io(_) | ClientError::Internal(_) => ErrorKind::Internal,
		}
	}
}
