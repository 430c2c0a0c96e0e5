//! In-memory [`SecretStore`] implementation for local development and tests.

// std
use std::{
	sync::atomic::{AtomicBool, AtomicUsize, Ordering},
	time::Duration as StdDuration,
};
// crates.io
use serde_json::{Map, Value, json};
// self
use crate::{
	_prelude::*,
	secret::{SecretError, SecretStore, SecretStoreFuture},
};

/// Secret store that keeps KV-v2 documents in-process and counts remote reads.
#[derive(Debug, Default)]
pub struct MemorySecretStore {
	documents: RwLock<HashMap<String, Value>>,
	reads: AtomicUsize,
	unavailable: AtomicBool,
	latency: Option<StdDuration>,
}
impl MemorySecretStore {
	/// Delays every read by `latency` so concurrent lookups overlap.
	pub fn with_latency(mut self, latency: StdDuration) -> Self {
		self.latency = Some(latency);

		self
	}

	/// Stores `secrets` at the resolved `path`, wrapped in the `data.data` envelope.
	pub fn insert_collection<I, K, V>(&self, path: impl Into<String>, secrets: I)
	where
		I: IntoIterator<Item = (K, V)>,
		K: Into<String>,
		V: Into<String>,
	{
		let data = secrets
			.into_iter()
			.map(|(key, value)| (key.into(), Value::String(value.into())))
			.collect::<Map<_, _>>();

		self.insert_document(path, json!({ "data": { "data": data } }));
	}

	/// Stores a raw document at the resolved `path`.
	pub fn insert_document(&self, path: impl Into<String>, document: Value) {
		self.documents.write().insert(path.into(), document);
	}

	/// Removes the document at `path`.
	pub fn remove(&self, path: &str) -> Option<Value> {
		self.documents.write().remove(path)
	}

	/// Makes every subsequent read fail with [`SecretError::StoreUnavailable`].
	pub fn set_unavailable(&self, unavailable: bool) {
		self.unavailable.store(unavailable, Ordering::SeqCst);
	}

	/// Number of reads served so far, including failed ones.
	pub fn reads(&self) -> usize {
		self.reads.load(Ordering::SeqCst)
	}
}
impl SecretStore for MemorySecretStore {
	fn read<'a>(&'a self, path: &'a str) -> SecretStoreFuture<'a, Option<Value>> {
		Box::pin(async move {
			self.reads.fetch_add(1, Ordering::SeqCst);

			if let Some(latency) = self.latency {
				tokio::time::sleep(latency).await;
			}
			if self.unavailable.load(Ordering::SeqCst) {
				return Err(SecretError::StoreUnavailable {
					message: "memory store is marked unavailable".into(),
				});
			}

			Ok(self.documents.read().get(path).cloned())
		})
	}
}
