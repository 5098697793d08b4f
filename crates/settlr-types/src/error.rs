//! Error type shared by every Settlr crate

use std::fmt;

pub type ClResult<T> = std::result::Result<T, Error>;

#[derive(Debug)]
pub enum Error {
	NotFound,
	/// The authority refused the request (HTTP 401)
	Unauthorized,
	PermissionDenied,
	Parse,
	Timeout,
	/// The operation was interrupted by shutdown
	Cancelled,
	/// No secret could be resolved for the named client
	NoSecretAvailable(String),
	ValidationError(String),
	ConfigError(String),
	NetworkError(String),
	/// Non-success HTTP status other than 401
	Http(u16),
	Decryption(String),
	ApplyError(String),
	Internal(String),

	// externals
	Io(std::io::Error),
}

impl Error {
	/// Transient failures are worth retrying: network errors, timeouts, 408 and 5xx.
	pub fn is_transient(&self) -> bool {
		match self {
			Error::Timeout | Error::NetworkError(_) => true,
			Error::Http(status) => *status == 408 || *status >= 500,
			_ => false,
		}
	}
}

impl fmt::Display for Error {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Error::NotFound => write!(f, "not found"),
			Error::Unauthorized => write!(f, "unauthorized"),
			Error::PermissionDenied => write!(f, "permission denied"),
			Error::Parse => write!(f, "parse error"),
			Error::Timeout => write!(f, "timeout"),
			Error::Cancelled => write!(f, "cancelled"),
			Error::NoSecretAvailable(client) => write!(f, "no secret available for client {}", client),
			Error::ValidationError(msg) => write!(f, "validation error: {}", msg),
			Error::ConfigError(msg) => write!(f, "configuration error: {}", msg),
			Error::NetworkError(msg) => write!(f, "network error: {}", msg),
			Error::Http(status) => write!(f, "HTTP status {}", status),
			Error::Decryption(msg) => write!(f, "decryption failed: {}", msg),
			Error::ApplyError(msg) => write!(f, "failed to apply change: {}", msg),
			Error::Internal(msg) => write!(f, "internal error: {}", msg),
			Error::Io(err) => write!(f, "I/O error: {}", err),
		}
	}
}

impl std::error::Error for Error {
	fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
		match self {
			Error::Io(err) => Some(err),
			_ => None,
		}
	}
}

impl From<std::io::Error> for Error {
	fn from(err: std::io::Error) -> Self {
		Self::Io(err)
	}
}

impl From<serde_json::Error> for Error {
	fn from(err: serde_json::Error) -> Self {
		tracing::debug!("JSON error: {}", err);
		Self::Parse
	}
}


// vim: ts=4
