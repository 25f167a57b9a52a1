use teleport_core::ErrorKind;

#[derive(Debug, thiserror::Error)]
pub enum TunnelError {
	#[error("unknown authority: {0}")]
	UnknownAuthority(String),
	#[error("access denied: {0}")]
	AccessDenied(String),
	#[error("invalid parameter: {0}")]
	BadParameter(String),
	#[error("node {0} is not reachable through any proxy")]
	HostUnreachable(String),
	#[error("reconnect budget exhausted after {0} attempts")]
	ReconnectExhausted(u32),
	#[error("ssh protocol error: {0}")]
	Ssh(#[from] russh::Error),
	#[error("i/o error: {0}")]
	Io(#[from] std::io::Error),
	#[error("auth control call failed: {0}")]
	Auth(#[from] teleport_auth::AuthError),
	#[error("internal error: {0}")]
	Internal(#[from] anyhow::Error),
}

impl teleport_core::HasKind for TunnelError {
	fn kind(&self) -> ErrorKind {
		match self {
			TunnelError::UnknownAuthority(_) => ErrorKind::UnknownAuthority,
			TunnelError::AccessDenied(_) => ErrorKind::AccessDenied,
			TunnelError::BadParameter(_) => ErrorKind::BadParameter,
			TunnelError::HostUnreachable(_) => ErrorKind::NotFound,
			TunnelError::ReconnectExhausted(_) => ErrorKind::Internal,
			TunnelError::Ssh(_) | TunnelError::Io(_) | TunnelError::Internal(_) => ErrorKind::Internal,
			TunnelError::Auth(e) => teleport_core::HasKind::kind(e),
		}
	}
}
