//! Secret-store contract, reference parsing, and the per-collection secret cache.

pub mod cache;
pub mod memory;
#[cfg(feature = "reqwest")] pub mod vault;

pub use cache::*;
pub use memory::MemorySecretStore;
#[cfg(feature = "reqwest")] pub use vault::VaultHttpStore;

// crates.io
use serde_json::Value;
// self
use crate::_prelude::*;

/// Boxed future returned by [`SecretStore::read`].
pub type SecretStoreFuture<'a, T> =
	Pin<Box<dyn Future<Output = Result<T, SecretError>> + 'a + Send>>;

/// Remote secret store capability consumed by [`SecretCache`].
pub trait SecretStore
where
	Self: Send + Sync,
{
	/// Reads the document stored at the resolved `path`.
	///
	/// Returns `Ok(None)` when nothing is stored there. Documents follow the KV-v2 layout, with
	/// the secrets under `data.data`.
	fn read<'a>(&'a self, path: &'a str) -> SecretStoreFuture<'a, Option<Value>>;
}

/// Error type produced while resolving secrets.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum SecretError {
	/// The reference is not `<collection>:<key>`.
	#[error("Secret reference `{reference}` is not of the form <collection>:<key>.")]
	InvalidReference {
		/// The rejected reference.
		reference: String,
	},
	/// The remote store could not be reached or refused the read.
	#[error("Secret store unavailable: {message}.")]
	StoreUnavailable {
		/// Human-readable error payload.
		message: String,
	},
	/// The store holds nothing at the collection's path.
	#[error("Secret collection `{collection}` was not found.")]
	CollectionNotFound {
		/// Collection path.
		collection: String,
	},
	/// The collection exists but lacks the key.
	#[error("Secret `{key}` was not found in collection `{collection}`.")]
	KeyNotFound {
		/// Collection path.
		collection: String,
		/// Missing key.
		key: String,
	},
	/// A value in the collection is not a string.
	#[error("Secret `{key}` in collection `{collection}` is not a string.")]
	TypeMismatch {
		/// Collection path.
		collection: String,
		/// Offending key.
		key: String,
	},
	/// The stored document does not follow the `data.data` layout.
	#[error("Secret collection `{collection}` is malformed: {message}.")]
	MalformedPayload {
		/// Collection path.
		collection: String,
		/// Human-readable error payload.
		message: String,
	},
}

/// A parsed `<collection>:<key>` reference.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SecretReference<'a> {
	/// Collection path.
	pub collection: &'a str,
	/// Key within the collection.
	pub key: &'a str,
}
impl<'a> SecretReference<'a> {
	/// Separator between collection path and key.
	pub const SEPARATOR: char = ':';

	/// Parses `<collection>:<key>`; both halves must be non-empty.
	pub fn parse(reference: &'a str) -> Result<Self, SecretError> {
		match reference.split_once(Self::SEPARATOR) {
			Some((collection, key)) if !collection.is_empty() && !key.is_empty() =>
				Ok(Self { collection, key }),
			_ => Err(SecretError::InvalidReference { reference: reference.to_owned() }),
		}
	}
}

/// Returns true when any segment of `path` is `.` or `..`, percent-encoded or not.
///
/// URL resolution collapses such segments, which would let a collection escape its mount.
pub(crate) fn has_dot_segment(path: &str) -> bool {
	path.split(['/', '\\']).any(|segment| {
		let segment = segment.to_ascii_lowercase().replace("%2e", ".");

		segment == "." || segment == ".."
	})
}
