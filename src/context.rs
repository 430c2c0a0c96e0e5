//! Request-scoped metadata and the call context threaded through endpoints.

// self
use crate::{
	_prelude::*,
	auth::{VerifiedIdentity, bearer::AUTHORIZATION},
};

/// Metadata key carrying the caller-supplied request id.
pub const REQUEST_ID: &str = "x-request-id";

/// Case-insensitive, multi-valued request metadata.
///
/// Keys are stored lowercased; values keep insertion order.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Metadata(BTreeMap<String, Vec<String>>);
impl Metadata {
	/// Creates empty metadata.
	pub fn new() -> Self {
		Self::default()
	}

	/// Returns the first value stored for `key`.
	pub fn get(&self, key: &str) -> Option<&str> {
		self.get_all(key).first().map(String::as_str)
	}

	/// Returns every value stored for `key`.
	pub fn get_all(&self, key: &str) -> &[String] {
		self.0.get(&key.to_ascii_lowercase()).map(Vec::as_slice).unwrap_or_default()
	}

	/// Returns true when at least one value is stored for `key`.
	pub fn contains_key(&self, key: &str) -> bool {
		!self.get_all(key).is_empty()
	}

	/// Replaces all values of `key` with `value`.
	pub fn insert(&mut self, key: impl AsRef<str>, value: impl Into<String>) {
		self.0.insert(key.as_ref().to_ascii_lowercase(), vec![value.into()]);
	}

	/// Adds `value` after any existing values of `key`.
	pub fn append(&mut self, key: impl AsRef<str>, value: impl Into<String>) {
		self.0.entry(key.as_ref().to_ascii_lowercase()).or_default().push(value.into());
	}

	/// Removes and returns every value of `key`.
	pub fn remove(&mut self, key: &str) -> Vec<String> {
		self.0.remove(&key.to_ascii_lowercase()).unwrap_or_default()
	}

	/// Number of distinct keys.
	pub fn len(&self) -> usize {
		self.0.len()
	}

	/// Returns true when no keys are stored.
	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}

	/// Iterates over `(key, value)` pairs, repeating keys with several values.
	pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
		self.0
			.iter()
			.flat_map(|(key, values)| values.iter().map(move |value| (key.as_str(), value.as_str())))
	}
}
impl<K, V> FromIterator<(K, V)> for Metadata
where
	K: AsRef<str>,
	V: Into<String>,
{
	fn from_iter<I>(iter: I) -> Self
	where
		I: IntoIterator<Item = (K, V)>,
	{
		let mut metadata = Self::new();

		for (key, value) in iter {
			metadata.append(key, value);
		}

		metadata
	}
}
impl Debug for Metadata {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		let mut map = f.debug_map();

		for (key, value) in self.iter() {
			if key == AUTHORIZATION {
				map.entry(&key, &"<redacted>");
			} else {
				map.entry(&key, &value);
			}
		}

		map.finish()
	}
}

/// Request-scoped context handed to every [`Endpoint`](crate::endpoint::Endpoint) call.
#[derive(Clone, Debug, Default)]
pub struct CallContext {
	metadata: Metadata,
	request_id: Option<String>,
	identity: Option<VerifiedIdentity>,
	cancel: CancellationToken,
}
impl CallContext {
	/// Creates an empty context with a fresh cancellation token.
	pub fn new() -> Self {
		Self::default()
	}

	/// Builds the server-side context for an inbound call.
	///
	/// The request id is taken from the [`REQUEST_ID`] entry when present.
	pub fn from_metadata(metadata: Metadata) -> Self {
		let request_id = metadata.get(REQUEST_ID).map(str::to_owned);

		Self { metadata, request_id, ..Default::default() }
	}

	/// Sets the request id used in call logs.
	pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
		self.request_id = Some(request_id.into());

		self
	}

	/// Ties the call to an existing cancellation token.
	pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
		self.cancel = cancel;

		self
	}

	pub(crate) fn with_identity(mut self, identity: VerifiedIdentity) -> Self {
		self.identity = Some(identity);

		self
	}

	/// Inbound metadata.
	pub fn metadata(&self) -> &Metadata {
		&self.metadata
	}

	/// The inbound `authorization` value, if any.
	pub fn authorization(&self) -> Option<&str> {
		self.metadata.get(AUTHORIZATION)
	}

	/// Request id, if the caller supplied one.
	pub fn request_id(&self) -> Option<&str> {
		self.request_id.as_deref()
	}

	/// Identity attached by the auth middleware.
	pub fn identity(&self) -> Option<&VerifiedIdentity> {
		self.identity.as_ref()
	}

	/// Token canceled when the caller gives up on the call.
	pub fn cancellation(&self) -> &CancellationToken {
		&self.cancel
	}

	/// Copies the inbound `authorization` value into `outgoing`.
	///
	/// Returns false and leaves `outgoing` untouched when there is nothing to forward.
	pub fn forward_authorization(&self, outgoing: &mut Metadata) -> bool {
		match self.authorization() {
			Some(value) => {
				outgoing.insert(AUTHORIZATION, value);

				true
			},
			None => false,
		}
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn metadata_keys_are_case_insensitive_and_multi_valued() {
		let mut metadata = Metadata::new();

		metadata.append("X-Trace", "a");
		metadata.append("x-trace", "b");
		metadata.insert("Authorization", "Bearer t");

		assert_eq!(metadata.get("X-TRACE"), Some("a"));
		assert_eq!(metadata.get_all("x-trace"), ["a", "b"]);
		assert_eq!(metadata.get("authorization"), Some("Bearer t"));
		assert_eq!(metadata.len(), 2);
		assert_eq!(metadata.remove("X-Trace"), vec!["a".to_owned(), "b".to_owned()]);
		assert!(!metadata.contains_key("x-trace"));
		assert!(metadata.get_all("missing").is_empty());
	}

	#[test]
	fn debug_output_redacts_authorization() {
		let metadata = Metadata::from_iter([("authorization", "Bearer secret"), ("x-tenant", "acme")]);
		let rendered = format!("{metadata:?}");

		assert!(!rendered.contains("secret"));
		assert!(rendered.contains("acme"));
	}

	#[test]
	fn from_metadata_picks_up_request_id_and_forwards_authorization() {
		let inbound =
			Metadata::from_iter([("Authorization", "Bearer a.b.c"), ("X-Request-Id", "req-7")]);
		let context = CallContext::from_metadata(inbound);
		let mut outgoing = Metadata::new();

		assert_eq!(context.request_id(), Some("req-7"));
		assert!(context.identity().is_none());
		assert!(context.forward_authorization(&mut outgoing));
		assert_eq!(outgoing.get("authorization"), Some("Bearer a.b.c"));

		let mut untouched = Metadata::new();

		assert!(!CallContext::new().forward_authorization(&mut untouched));
		assert!(untouched.is_empty());
	}

	#[test]
	fn cancellation_is_shared_with_the_caller() {
		let cancel = CancellationToken::new();
		let context = CallContext::new().with_cancellation(cancel.clone()).with_request_id("r");

		cancel.cancel();

		assert!(context.cancellation().is_cancelled());
		assert_eq!(context.request_id(), Some("r"));
	}
}
