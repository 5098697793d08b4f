//! Client secret resolution
//!
//! The secret both authenticates a client against the authority and keys the
//! encryption of its offline settings.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::prelude::*;

/// Minimum secret length accepted by the resolvers
pub const MIN_SECRET_LENGTH: usize = 32;

pub trait SecretResolver: Send + Sync {
	fn get_secret(&self, client_name: &str) -> ClResult<String>;
}

fn check_secret(client_name: &str, secret: &str) -> ClResult<String> {
	let secret = secret.trim();
	if secret.len() < MIN_SECRET_LENGTH {
		warn!(client = %client_name, "Client secret is shorter than {} characters", MIN_SECRET_LENGTH);
		return Err(Error::NoSecretAvailable(client_name.to_string()));
	}
	Ok(secret.to_string())
}

/// Secrets supplied in code (tests, embedded hosts)
#[derive(Default)]
pub struct StaticSecretResolver {
	secrets: HashMap<String, String>,
}

impl StaticSecretResolver {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn with(mut self, client_name: impl Into<String>, secret: impl Into<String>) -> Self {
		self.secrets.insert(client_name.into(), secret.into());
		self
	}
}

impl SecretResolver for StaticSecretResolver {
	fn get_secret(&self, client_name: &str) -> ClResult<String> {
		let secret = self
			.secrets
			.get(client_name)
			.ok_or_else(|| Error::NoSecretAvailable(client_name.to_string()))?;
		check_secret(client_name, secret)
	}
}

/// Reads `SETTLR_SECRET_<NAME>` (name upper-cased, non-alphanumerics as `_`),
/// falling back to `SETTLR_CLIENT_SECRET`
pub struct EnvSecretResolver;

impl EnvSecretResolver {
	pub fn variable_name(client_name: &str) -> String {
		let suffix: String = client_name
			.chars()
			.map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_uppercase() } else { '_' })
			.collect();
		format!("SETTLR_SECRET_{}", suffix)
	}
}

impl SecretResolver for EnvSecretResolver {
	fn get_secret(&self, client_name: &str) -> ClResult<String> {
		let secret = std::env::var(Self::variable_name(client_name))
			.or_else(|_| std::env::var("SETTLR_CLIENT_SECRET"))
			.map_err(|_| Error::NoSecretAvailable(client_name.to_string()))?;
		check_secret(client_name, &secret)
	}
}

/// One file per client in a directory (e.g. container secrets mounted at `/run/secrets`)
pub struct FileSecretResolver {
	dir: Box<Path>,
}

impl FileSecretResolver {
	pub fn new(dir: impl Into<PathBuf>) -> Self {
		Self { dir: dir.into().into_boxed_path() }
	}
}

impl SecretResolver for FileSecretResolver {
	fn get_secret(&self, client_name: &str) -> ClResult<String> {
		let path = self.dir.join(client_name);
		let secret = std::fs::read_to_string(&path).map_err(|e| {
			debug!("Secret file {:?} not readable: {}", path, e);
			Error::NoSecretAvailable(client_name.to_string())
		})?;
		check_secret(client_name, &secret)
	}
}


// vim: ts=4
