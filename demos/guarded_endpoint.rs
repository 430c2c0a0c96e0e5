//! Demonstrates a guarded endpoint stack: the signing secret comes from the secret cache,
//! callers present a bearer token pair, and every call runs through a circuit breaker whose
//! log lines are printed to stdout.

// std
use std::{sync::Arc, time::Duration as StdDuration};
// crates.io
use color_eyre::{Result, eyre::eyre};
use time::Duration;
// self
use rpc_shield::{
	auth::{ClaimPolicy, ClaimSet, TokenService, bearer},
	context::{CallContext, Metadata},
	endpoint::{
		AuthMiddleware, CallError, CallLog, CallLogEntry, Endpoint, ResilientInvoker, endpoint_fn,
	},
	resilience::{BreakerRegistry, BreakerSettings},
	secret::{MemorySecretStore, SecretCache},
};

struct StdoutLog;
impl CallLog for StdoutLog {
	fn record(&self, entry: CallLogEntry) {
		println!(
			"command={} request={} request_id={} took_ms={} err={}",
			entry.command,
			entry.request,
			entry.request_id.as_deref().unwrap_or("-"),
			entry.took_ms(),
			entry.error().unwrap_or("-"),
		);
	}
}

#[tokio::main]
async fn main() -> Result<()> {
	color_eyre::install()?;

	let store = Arc::new(MemorySecretStore::default());

	store.insert_collection("secret/data/auth", [("signing_key", "demo-signing-key")]);

	let secrets = SecretCache::new(store, "secret");
	let signing_key = secrets.resolve("auth:signing_key").await?;
	let tokens = TokenService::new(signing_key);
	let registry = Arc::new(BreakerRegistry::new(
		BreakerSettings::default()
			.with_failure_threshold(2)
			.with_call_timeout(StdDuration::from_millis(250))
			.with_open_interval(StdDuration::from_secs(1)),
	)?);
	let greet = endpoint_fn(|ctx: CallContext, name: String| async move {
		if name.is_empty() {
			return Err(CallError::logic("name must not be empty".to_owned()));
		}

		let tenant = ctx.identity().and_then(|identity| identity.claim("tenant")).unwrap_or("?");

		Ok(format!("hello {name} from {tenant}"))
	});
	let stack = AuthMiddleware::new(
		ResilientInvoker::new(greet, "greeter.greet", registry.clone())
			.with_log(Arc::new(StdoutLog)),
		tokens.clone(),
		ClaimPolicy::new([("role", "member")]),
	);
	let pair = tokens.issue_pair(
		&ClaimSet::new([("role", "member"), ("tenant", "acme")])?,
		Duration::minutes(5),
	)?;
	let context = |request_id: &str| {
		CallContext::from_metadata(Metadata::from_iter([
			(bearer::AUTHORIZATION, bearer::bearer_header(pair.access_token.expose())),
			("x-request-id", request_id.to_owned()),
		]))
	};

	println!("{}", stack.call(context("req-1"), "ada".to_owned()).await?);

	for request_id in ["req-2", "req-3", "req-4"] {
		match stack.call(context(request_id), String::new()).await {
			Ok(reply) => println!("{reply}"),
			Err(err) => println!("{request_id} failed: {err}"),
		}
	}

	let state = registry.snapshot("greeter.greet").ok_or_else(|| eyre!("breaker was never used"))?;

	println!("breaker is {} after {} failures", state.mode, state.failures);

	Ok(())
}
