use teleport_core::ErrorKind;

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
	#[error("{0}")]
	BadParameter(String),
	#[error("access denied")]
	AccessDenied,
	#[error("not found")]
	NotFound,
	#[error("already exists")]
	AlreadyExists,
	#[error("another process is initializing this cluster")]
	BootstrapContention,
	#[error("identity file {path:?} failed to parse: {source}")]
	UnbootstrappedIdentity {
		path: std::path::PathBuf,
		#[source]
		source: anyhow::Error,
	},
	#[error("remote auth error ({kind}): {message}")]
	Remote { kind: ErrorKind, message: String },
	#[error("certificate authority error: {0}")]
	Ca(#[from] teleport_ca::CaError),
	#[error("backend error: {0}")]
	Backend(#[from] teleport_backend::BackendError),
	#[error("io error: {0}")]
	Io(#[from] std::io::Error),
	#[error("internal error: {0}")]
	Internal(#[from] anyhow::Error),
}

impl teleport_core::HasKind for AuthError {
	fn kind(&self) -> ErrorKind {
		match self {
			AuthError::BadParameter(_) => ErrorKind::BadParameter,
			AuthError::AccessDenied => ErrorKind::AccessDenied,
			AuthError::NotFound => ErrorKind::NotFound,
			AuthError::AlreadyExists => ErrorKind::AlreadyExists,
			AuthError::BootstrapContention => ErrorKind::Internal,
			AuthError::UnbootstrappedIdentity { .. } => ErrorKind::Internal,
			AuthError::Remote { kind, .. } => *kind,
			AuthError::Ca(e) => teleport_core::HasKind::kind(e),
			AuthError::Backend(e) => teleport_core::HasKind::kind(e),
			AuthError::Io(_) | AuthError::Internal(_) => ErrorKind::Internal,
		}
	}
}

/// Collapses to the uniform external-facing form: not-found and
/// access-denied are indistinguishable to an external caller, so probing
/// a cluster for the existence of a resource gains nothing.
pub fn external_error(err: &AuthError) -> (ErrorKind, &'static str) {
	let kind = teleport_core::error::collapse_for_external_caller(teleport_core::HasKind::kind(err));
	(kind, teleport_core::error::uniform_message(kind))
}
