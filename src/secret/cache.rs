//! Lazy per-collection cache in front of a [`SecretStore`].
//!
//! A collection is fetched with one remote read the first time any of its keys is requested,
//! decoded as a whole, and swapped into the map atomically. Cached collections are never
//! refreshed key by key; only [`SecretCache::evict`] followed by a miss replaces one. Concurrent
//! misses on the same path share a single remote read.

// crates.io
use serde_json::{Map, Value};
// self
use crate::{
	_prelude::*,
	obs::{self, OpKind, OpOutcome, OpSpan},
	secret::{self, SecretError, SecretReference, SecretStore},
};

/// Decoded secrets of one collection.
#[derive(Clone, PartialEq, Eq)]
pub struct SecretCollection {
	collection: String,
	secrets: BTreeMap<String, String>,
}
impl SecretCollection {
	/// Decodes a KV-v2 document, rejecting it whole if any value is not a string.
	pub fn decode(collection: &str, document: Value) -> Result<Self, SecretError> {
		#[derive(Deserialize)]
		struct Envelope {
			data: Inner,
		}
		#[derive(Deserialize)]
		struct Inner {
			data: Map<String, Value>,
		}

		let envelope: Envelope = serde_path_to_error::deserialize(document).map_err(|err| {
			SecretError::MalformedPayload {
				collection: collection.to_owned(),
				message: format!("{} at `{}`", err.inner(), err.path()),
			}
		})?;
		let secrets = envelope
			.data
			.data
			.into_iter()
			.map(|(key, value)| match value {
				Value::String(secret) => Ok((key, secret)),
				_ => Err(SecretError::TypeMismatch { collection: collection.to_owned(), key }),
			})
			.collect::<Result<_, _>>()?;

		Ok(Self { collection: collection.to_owned(), secrets })
	}

	/// Collection path.
	pub fn collection(&self) -> &str {
		&self.collection
	}

	/// Returns the secret for `key`.
	pub fn get(&self, key: &str) -> Option<&str> {
		self.secrets.get(key).map(String::as_str)
	}

	/// Keys present in the collection.
	pub fn keys(&self) -> impl Iterator<Item = &str> {
		self.secrets.keys().map(String::as_str)
	}

	fn require(&self, key: &str) -> Result<String, SecretError> {
		self.get(key).map(str::to_owned).ok_or_else(|| SecretError::KeyNotFound {
			collection: self.collection.clone(),
			key: key.to_owned(),
		})
	}
}
impl Debug for SecretCollection {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("SecretCollection")
			.field("collection", &self.collection)
			.field("keys", &self.secrets.keys().collect::<Vec<_>>())
			.finish()
	}
}

/// Resolves secret references through an in-memory, per-collection cache.
pub struct SecretCache {
	store: Arc<dyn SecretStore>,
	mount: String,
	collections: RwLock<HashMap<String, Arc<SecretCollection>>>,
	fetch_guards: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}
impl SecretCache {
	/// Creates a cache reading collections from `<mount>/data/<collection>` in `store`.
	pub fn new(store: Arc<dyn SecretStore>, mount: impl Into<String>) -> Self {
		Self {
			store,
			mount: mount.into(),
			collections: Default::default(),
			fetch_guards: Default::default(),
		}
	}

	/// Resolves `<collection>:<key>`, collapsing every failure to an empty string.
	///
	/// Prefer [`resolve`](Self::resolve) when the caller needs to tell a missing secret from an
	/// unreachable store.
	pub async fn get(&self, reference: &str) -> String {
		self.resolve(reference).await.unwrap_or_else(|err| {
			obs::trace_secret_fallback(&err);

			String::new()
		})
	}

	/// Resolves `collection`/`key`, collapsing every failure to an empty string.
	pub async fn get_in(&self, collection: &str, key: &str) -> String {
		self.resolve_in(collection, key).await.unwrap_or_else(|err| {
			obs::trace_secret_fallback(&err);

			String::new()
		})
	}

	/// Resolves `<collection>:<key>`.
	pub async fn resolve(&self, reference: &str) -> Result<String, SecretError> {
		let reference = SecretReference::parse(reference)?;

		self.resolve_in(reference.collection, reference.key).await
	}

	/// Resolves `key` within `collection`.
	pub async fn resolve_in(&self, collection: &str, key: &str) -> Result<String, SecretError> {
		const KIND: OpKind = OpKind::ResolveSecret;

		let span = OpSpan::new(KIND, "resolve_in");
		let result =
			span.instrument(async { self.collection(collection).await?.require(key) }).await;

		obs::record_op_outcome(KIND, OpOutcome::from_result(&result));

		result
	}

	/// Returns the cached collection, fetching it with one remote read on a miss.
	pub async fn collection(&self, collection: &str) -> Result<Arc<SecretCollection>, SecretError> {
		if secret::has_dot_segment(collection) {
			return Err(SecretError::InvalidReference { reference: collection.to_owned() });
		}
		if let Some(hit) = self.cached(collection) {
			return Ok(hit);
		}

		let slot = self.fetch_slot(collection);
		let _singleflight = slot.lock.lock().await;

		// A concurrent miss may have filled the entry while this one waited.
		if let Some(hit) = self.cached(collection) {
			return Ok(hit);
		}

		let document = self
			.store
			.read(&self.remote_path(collection))
			.await?
			.ok_or_else(|| SecretError::CollectionNotFound { collection: collection.to_owned() })?;
		let decoded = Arc::new(SecretCollection::decode(collection, document)?);

		self.collections.write().insert(collection.to_owned(), decoded.clone());

		Ok(decoded)
	}

	/// Returns the collection if it is already cached.
	pub fn cached(&self, collection: &str) -> Option<Arc<SecretCollection>> {
		self.collections.read().get(collection).cloned()
	}

	/// Drops a cached collection so the next lookup re-reads it whole.
	pub fn evict(&self, collection: &str) -> bool {
		self.collections.write().remove(collection).is_some()
	}

	fn remote_path(&self, collection: &str) -> String {
		format!("{}/data/{}", self.mount.trim_end_matches('/'), collection.trim_start_matches('/'))
	}

	fn fetch_slot<'a>(&'a self, collection: &'a str) -> FetchSlot<'a> {
		let mut guards = self.fetch_guards.lock();
		let lock = guards
			.entry(collection.to_owned())
			.or_insert_with(|| Arc::new(AsyncMutex::new(())))
			.clone();

		FetchSlot { cache: self, collection, lock }
	}
}
/// Share of one collection's singleflight lock; the last holder removes it from the map.
struct FetchSlot<'a> {
	cache: &'a SecretCache,
	collection: &'a str,
	lock: Arc<AsyncMutex<()>>,
}
impl Drop for FetchSlot<'_> {
	fn drop(&mut self) {
		let mut guards = self.cache.fetch_guards.lock();
		let last = guards.get(self.collection).is_some_and(|held| Arc::ptr_eq(held, &self.lock))
			&& Arc::strong_count(&self.lock) == 2;

		if last {
			guards.remove(self.collection);
		}
	}
}
impl Debug for SecretCache {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("SecretCache")
			.field("mount", &self.mount)
			.field("cached", &self.collections.read().keys().collect::<Vec<_>>())
			.finish()
	}
}
