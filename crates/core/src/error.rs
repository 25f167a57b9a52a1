use std::fmt;

/// A small set of abstract error kinds shared across crates. Every
/// crate-local error enum implements `HasKind` so a kind survives crate
/// boundaries without forcing a single global error type on every `match`
/// site.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
	BadParameter,
	NotFound,
	AlreadyExists,
	AccessDenied,
	CompareFailed,
	UnknownAuthority,
	Internal,
}

impl fmt::Display for ErrorKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let s = match self {
			ErrorKind::BadParameter => "bad-parameter",
			ErrorKind::NotFound => "not-found",
			ErrorKind::AlreadyExists => "already-exists",
			ErrorKind::AccessDenied => "access-denied",
			ErrorKind::CompareFailed => "compare-failed",
			ErrorKind::UnknownAuthority => "unknown-authority",
			ErrorKind::Internal => "internal",
		};
		f.write_str(s)
	}
}

pub trait HasKind {
	fn kind(&self) -> ErrorKind;
}

/// Collapses `NotFound` into `AccessDenied` at an external API edge: a
/// caller must never be able to distinguish "no such record" from "you're
/// not allowed to see it" by probing, so both collapse to access-denied.
pub fn collapse_for_external_caller(kind: ErrorKind) -> ErrorKind {
	match kind {
		ErrorKind::NotFound => ErrorKind::AccessDenied,
		other => other,
	}
}

/// A uniform, non-leaking message for a collapsed external-facing error.
pub fn uniform_message(kind: ErrorKind) -> &'static str {
	match kind {
		ErrorKind::AccessDenied => "invalid credentials",
		ErrorKind::UnknownAuthority => "no matching authority",
		ErrorKind::NotFound => "invalid credentials",
		_ => "request failed",
	}
}

#[derive(Debug, thiserror::Error)]
#[error("{kind}: {source}")]
pub struct TeleportError {
	pub kind: ErrorKind,
	#[source]
	pub source: anyhow::Error,
}

impl TeleportError {
	pub fn new(kind: ErrorKind, source: impl Into<anyhow::Error>) -> Self {
		Self {
			kind,
			source: source.into(),
		}
	}
}

impl HasKind for TeleportError {
	fn kind(&self) -> ErrorKind {
		self.kind
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn collapses_not_found_only() {
		assert_eq!(
			collapse_for_external_caller(ErrorKind::NotFound),
			ErrorKind::AccessDenied
		);
		assert_eq!(
			collapse_for_external_caller(ErrorKind::BadParameter),
			ErrorKind::BadParameter
		);
	}
}
