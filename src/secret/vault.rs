//! HashiCorp Vault KV-v2 [`SecretStore`] backed by reqwest.

// crates.io
use reqwest::{StatusCode, redirect::Policy};
use serde_json::Value;
// self
use crate::{
	_prelude::*,
	auth::TokenSecret,
	error::ConfigError,
	secret::{self, SecretError, SecretStore, SecretStoreFuture},
};

/// Header carrying the Vault client token.
pub const VAULT_TOKEN_HEADER: &str = "X-Vault-Token";

/// Reads KV-v2 documents with `GET {address}/v1/{path}`.
#[derive(Clone)]
pub struct VaultHttpStore {
	client: ReqwestClient,
	address: Url,
	token: TokenSecret,
}
impl VaultHttpStore {
	/// Creates a store for `address` with a client that never follows redirects.
	pub fn new(address: &str, token: impl Into<String>) -> Result<Self, ConfigError> {
		let client = ReqwestClient::builder().redirect(Policy::none()).build()?;

		Self::with_client(client, address, token)
	}

	/// Creates a store that reuses an existing reqwest client.
	pub fn with_client(
		client: ReqwestClient,
		address: &str,
		token: impl Into<String>,
	) -> Result<Self, ConfigError> {
		let mut address = Url::parse(address)?;

		if !matches!(address.scheme(), "http" | "https") {
			return Err(ConfigError::UnsupportedScheme { scheme: address.scheme().to_owned() });
		}

		// `Url::join` replaces the last segment unless the base ends with a slash.
		let base_path = format!("{}/", address.path().trim_end_matches('/'));

		address.set_path(&base_path);

		Ok(Self { client, address, token: TokenSecret::new(token) })
	}

	/// Base address requests are resolved against.
	pub fn address(&self) -> &Url {
		&self.address
	}

	fn endpoint(&self, path: &str) -> Result<Url, SecretError> {
		if secret::has_dot_segment(path) {
			return Err(SecretError::StoreUnavailable {
				message: format!("secret path `{path}` contains dot segments"),
			});
		}

		self.address.join(&format!("v1/{}", path.trim_start_matches('/'))).map_err(|err| {
			SecretError::StoreUnavailable { message: format!("invalid secret path `{path}`: {err}") }
		})
	}
}
impl Debug for VaultHttpStore {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("VaultHttpStore")
			.field("address", &self.address.as_str())
			.field("token", &self.token)
			.finish()
	}
}
impl SecretStore for VaultHttpStore {
	fn read<'a>(&'a self, path: &'a str) -> SecretStoreFuture<'a, Option<Value>> {
		Box::pin(async move {
			let url = self.endpoint(path)?;
			let response = self
				.client
				.get(url)
				.header(VAULT_TOKEN_HEADER, self.token.expose())
				.send()
				.await
				.map_err(unavailable)?;
			let status = response.status();

			if status == StatusCode::NOT_FOUND {
				return Ok(None);
			}
			if !status.is_success() {
				return Err(SecretError::StoreUnavailable {
					message: format!("secret store answered {status} for `{path}`"),
				});
			}

			response.json::<Value>().await.map(Some).map_err(|err| SecretError::MalformedPayload {
				collection: path.to_owned(),
				message: err.to_string(),
			})
		})
	}
}

fn unavailable(err: ReqwestError) -> SecretError {
	SecretError::StoreUnavailable { message: err.to_string() }
}
