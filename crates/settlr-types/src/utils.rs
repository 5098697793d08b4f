//! Utility functions

use sha2::{Digest, Sha256};

use crate::types::ClientKey;

/// Lowercase hex of a SHA-256 digest
pub fn sha256_hex(data: &[u8]) -> String {
	hex::encode(Sha256::digest(data))
}

/// Stable, filesystem-safe identifier of a client (same across processes and platforms)
pub fn stable_client_hash(key: &ClientKey) -> String {
	let mut input = key.name.to_string();
	if let Some(instance) = &key.instance {
		input.push('\u{1f}');
		input.push_str(instance);
	}
	sha256_hex(input.as_bytes())
}

/// Join strings with `sep`, dropping empty entries and duplicates, keeping first-seen order
pub fn dedup_join<'a, I>(items: I, sep: &str) -> String
where
	I: IntoIterator<Item = &'a str>,
{
	let mut seen: Vec<&str> = Vec::new();
	for item in items {
		let item = item.trim();
		if !item.is_empty() && !seen.contains(&item) {
			seen.push(item);
		}
	}
	seen.join(sep)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_sha256_hex() {
		assert_eq!(
			sha256_hex(b"abc"),
			"ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
		);
	}

	#[test]
	fn test_stable_client_hash() {
		let a = stable_client_hash(&ClientKey::new("Orders", None));
		let b = stable_client_hash(&ClientKey::new("Orders", None));
		let c = stable_client_hash(&ClientKey::new("Orders", Some("eu")));
		assert_eq!(a, b);
		assert_ne!(a, c);
		assert_eq!(a.len(), 64);
		assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
	}

	#[test]
	fn test_dedup_join() {
		assert_eq!(dedup_join(["a", "b", "a", "", "c", " b "], ", "), "a, b, c");
		assert_eq!(dedup_join(Vec::<&str>::new(), ", "), "");
	}
}

// vim: ts=4
