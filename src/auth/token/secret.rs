//! Redacting wrappers for the signing key and for issued token strings.

// self
use crate::_prelude::*;

/// Shared HMAC key used to sign and verify tokens.
#[derive(Clone, PartialEq, Eq)]
pub struct SigningSecret(Vec<u8>);
impl SigningSecret {
	/// Wraps raw key bytes.
	pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
		Self(bytes.into())
	}

	/// Returns the key bytes. Never log them.
	pub fn expose(&self) -> &[u8] {
		&self.0
	}
}
impl From<&str> for SigningSecret {
	fn from(value: &str) -> Self {
		Self::new(value.as_bytes())
	}
}
impl From<String> for SigningSecret {
	fn from(value: String) -> Self {
		Self::new(value.into_bytes())
	}
}
impl From<Vec<u8>> for SigningSecret {
	fn from(value: Vec<u8>) -> Self {
		Self::new(value)
	}
}
impl Debug for SigningSecret {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_tuple("SigningSecret").field(&"<redacted>").finish()
	}
}

/// A signed compact token; formatting never prints the token itself.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TokenSecret(String);
impl TokenSecret {
	/// Wraps a compact token string.
	pub fn new(value: impl Into<String>) -> Self {
		Self(value.into())
	}

	/// Returns the compact token. Callers must avoid logging this string.
	pub fn expose(&self) -> &str {
		&self.0
	}
}
impl AsRef<str> for TokenSecret {
	fn as_ref(&self) -> &str {
		self.expose()
	}
}
impl Debug for TokenSecret {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_tuple("TokenSecret").field(&"<redacted>").finish()
	}
}
impl Display for TokenSecret {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("<redacted>")
	}
}
