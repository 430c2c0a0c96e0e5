//! Application claim sets and the identity extracted from verified tokens.

// self
use crate::_prelude::*;

/// Claim keys owned by the token service; callers can never set them directly.
pub const RESERVED_CLAIMS: &[&str] = &["exp"];

/// Errors emitted when validating application claims.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum ClaimError {
	/// Claim keys must not be empty.
	#[error("Claim keys cannot be empty.")]
	EmptyKey,
	/// The key collides with a claim the token service sets itself.
	#[error("Claim `{key}` is reserved.")]
	ReservedKey {
		/// The offending key.
		key: String,
	},
}

/// Ordered, validated set of caller-supplied string claims.
///
/// Reserved keys (see [`RESERVED_CLAIMS`]) are rejected at construction so a signed payload can
/// always carry its own `exp` without ambiguity.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ClaimSet(BTreeMap<String, String>);
impl ClaimSet {
	/// Builds a claim set from key/value pairs.
	pub fn new<I, K, V>(pairs: I) -> Result<Self, ClaimError>
	where
		I: IntoIterator<Item = (K, V)>,
		K: Into<String>,
		V: Into<String>,
	{
		let mut set = Self::default();

		for (key, value) in pairs {
			set.insert(key, value)?;
		}

		Ok(set)
	}

	/// Inserts a claim, returning the previous value for the key.
	pub fn insert(
		&mut self,
		key: impl Into<String>,
		value: impl Into<String>,
	) -> Result<Option<String>, ClaimError> {
		let key = key.into();

		validate_key(&key)?;

		Ok(self.0.insert(key, value.into()))
	}

	/// Returns the value for `key`, if present.
	pub fn get(&self, key: &str) -> Option<&str> {
		self.0.get(key).map(String::as_str)
	}

	/// Number of application claims.
	pub fn len(&self) -> usize {
		self.0.len()
	}

	/// Returns true when no application claims are set.
	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}

	/// Iterates claims in key order.
	pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
		self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
	}

	pub(crate) fn as_map(&self) -> &BTreeMap<String, String> {
		&self.0
	}
}

fn validate_key(key: &str) -> Result<(), ClaimError> {
	if key.trim().is_empty() {
		return Err(ClaimError::EmptyKey);
	}
	if RESERVED_CLAIMS.contains(&key) {
		return Err(ClaimError::ReservedKey { key: key.to_owned() });
	}

	Ok(())
}

/// Claims pulled from a verified token and attached to the call context.
///
/// The identity is read-only: it can only be produced from a successful verification.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VerifiedIdentity {
	claims: BTreeMap<String, String>,
}
impl VerifiedIdentity {
	pub(crate) fn new(claims: BTreeMap<String, String>) -> Self {
		Self { claims }
	}

	/// Returns the verified value for `key`.
	pub fn claim(&self, key: &str) -> Option<&str> {
		self.claims.get(key).map(String::as_str)
	}

	/// All verified claims, in key order.
	pub fn claims(&self) -> &BTreeMap<String, String> {
		&self.claims
	}
}
