use teleport_core::ErrorKind;

#[derive(Debug, thiserror::Error)]
pub enum BackendError {
	#[error("key not found")]
	NotFound,
	#[error("CAS comparison failed: value did not match expected")]
	CompareFailed,
	#[error("lock {0:?} is held by another owner")]
	LockHeld(String),
	#[error("lock token did not match current holder")]
	LockTokenMismatch,
	#[error("backend I/O error: {0}")]
	Io(#[from] std::io::Error),
	#[error("backend error: {0}")]
	Internal(#[from] anyhow::Error),
}

impl teleport_core::HasKind for BackendError {
	fn kind(&self) -> ErrorKind {
		match self {
			BackendError::NotFound => ErrorKind::NotFound,
			BackendError::CompareFailed => ErrorKind::CompareFailed,
			BackendError::LockHeld(_) => ErrorKind::AccessDenied,
			BackendError::LockTokenMismatch => ErrorKind::AccessDenied,
			BackendError::Io(_) | BackendError::Internal(_) => ErrorKind::Internal,
		}
	}
}
