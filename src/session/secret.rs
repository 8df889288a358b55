//! Redacting wrapper for credential material.

// self
use crate::_prelude::*;

/// Credential value kept out of logs; both formatters render `<redacted>`.
///
/// Serialization is transparent so a secret persists as a bare string under the store's
/// documented keys.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Secret(String);
impl Secret {
	/// Wraps a new secret string.
	pub fn new(value: impl Into<String>) -> Self {
		Self(value.into())
	}

	/// Returns the inner value. Callers must avoid logging this string.
	pub fn expose(&self) -> &str {
		&self.0
	}
}
impl AsRef<str> for Secret {
	fn as_ref(&self) -> &str {
		self.expose()
	}
}
impl Debug for Secret {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_tuple("Secret").field(&"<redacted>").finish()
	}
}
impl Display for Secret {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("<redacted>")
	}
}
