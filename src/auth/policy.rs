//! Expected-claim authorization rules applied to bearer credentials.

// self
use crate::{
	_prelude::*,
	auth::{TokenError, TokenService, VerifiedIdentity, bearer},
};

/// Authorization failures. Never retryable.
#[derive(Debug, ThisError)]
pub enum AuthError {
	/// The bearer credential could not be parsed, verified, or read.
	#[error("Bearer token rejected: {0}")]
	Token(#[from] TokenError),
	/// A verified claim differs from the value the policy expects.
	#[error("Claim `{key}` is not allowed for this endpoint.")]
	ClaimMismatch {
		/// Claim that failed the comparison.
		key: String,
	},
}

/// Exact-match expectations for a fixed set of claims.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ClaimPolicy {
	expected: BTreeMap<String, String>,
}
impl ClaimPolicy {
	/// Creates a policy from `(claim, expected value)` pairs.
	pub fn new<I, K, V>(expected: I) -> Self
	where
		I: IntoIterator<Item = (K, V)>,
		K: Into<String>,
		V: Into<String>,
	{
		Self { expected: expected.into_iter().map(|(k, v)| (k.into(), v.into())).collect() }
	}

	/// Adds or replaces one expectation.
	pub fn require(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
		self.expected.insert(key.into(), value.into());

		self
	}

	/// Claim keys checked by this policy.
	pub fn keys(&self) -> impl Iterator<Item = &str> {
		self.expected.keys().map(String::as_str)
	}

	/// Verifies the bearer header and checks every expected claim.
	///
	/// The returned identity carries all string claims of the token, not only the checked ones.
	pub fn authorize(
		&self,
		tokens: &TokenService,
		header: Option<&str>,
	) -> Result<VerifiedIdentity, AuthError> {
		let parsed = tokens.verify(bearer::bearer_token(header)?)?;

		for (key, expected) in &self.expected {
			if parsed.claim(key)? != expected.as_str() {
				return Err(AuthError::ClaimMismatch { key: key.clone() });
			}
		}

		Ok(VerifiedIdentity::new(parsed.string_claims()?))
	}
}
