// std
use std::{
	sync::{
		Arc,
		atomic::{AtomicBool, AtomicUsize, Ordering},
	},
	time::Duration as StdDuration,
};
// crates.io
use parking_lot::Mutex;
use serde::Serialize;
use time::Duration;
// self
use rpc_shield::{
	CancellationToken,
	auth::{ClaimPolicy, ClaimSet, TokenService, bearer},
	context::{CallContext, Metadata},
	endpoint::{
		AuthMiddleware, CallError, CallLog, CallLogEntry, CallOutcome, Endpoint, ResilientInvoker,
		endpoint_fn,
	},
	resilience::{BreakerMode, BreakerRegistry, BreakerSettings},
};

const COMMAND: &str = "orders.place";

#[derive(Default)]
struct RecordingLog(Mutex<Vec<CallLogEntry>>);
impl RecordingLog {
	fn entries(&self) -> Vec<CallLogEntry> {
		self.0.lock().clone()
	}
}
impl CallLog for RecordingLog {
	fn record(&self, entry: CallLogEntry) {
		self.0.lock().push(entry);
	}
}

#[derive(Clone, Serialize)]
struct PlaceOrder {
	sku: String,
	quantity: u32,
}

fn order() -> PlaceOrder {
	PlaceOrder { sku: "sku-1".into(), quantity: 2 }
}

fn registry() -> Arc<BreakerRegistry> {
	let settings = BreakerSettings::default()
		.with_failure_threshold(3)
		.with_call_timeout(StdDuration::from_millis(200))
		.with_open_interval(StdDuration::from_secs(5));

	Arc::new(BreakerRegistry::new(settings).expect("Breaker settings should be valid."))
}

fn signed_context(tokens: &TokenService, role: &str) -> CallContext {
	let claims = ClaimSet::new([("role", role), ("user_id", "42")])
		.expect("Claim fixture should be valid.");
	let pair = tokens.issue_pair(&claims, Duration::minutes(5)).expect("Issuing should succeed.");
	let metadata = Metadata::from_iter([
		(bearer::AUTHORIZATION, bearer::bearer_header(pair.access_token.expose())),
		("x-request-id", "req-1".to_owned()),
	]);

	CallContext::from_metadata(metadata)
}

#[tokio::test(start_paused = true)]
async fn breaker_opens_after_three_failures_and_recovers_through_one_probe() {
	let failing = Arc::new(AtomicBool::new(true));
	let hits = Arc::new(AtomicUsize::new(0));
	let log = Arc::new(RecordingLog::default());
	let registry = registry();
	let handler = {
		let failing = failing.clone();
		let hits = hits.clone();

		endpoint_fn(move |_: CallContext, order: PlaceOrder| {
			let failing = failing.load(Ordering::SeqCst);

			hits.fetch_add(1, Ordering::SeqCst);

			async move {
				if failing {
					Err(CallError::logic("inventory offline".to_owned()))
				} else {
					Ok(order.quantity)
				}
			}
		})
	};
	let invoker = ResilientInvoker::new(handler, COMMAND, registry.clone()).with_log(log.clone());

	for _ in 0..3 {
		let err = invoker.call(CallContext::new(), order()).await.expect_err("Call should fail.");

		assert!(matches!(err, CallError::Logic(ref msg) if msg == "inventory offline"));
	}

	let snapshot = registry.snapshot(COMMAND).expect("Breaker should exist.");

	assert_eq!(snapshot.mode, BreakerMode::Open);
	assert_eq!(snapshot.failures, 3);

	let refused = invoker.call(CallContext::new(), order()).await.expect_err("Circuit is open.");

	assert!(refused.is_unavailable());
	assert_eq!(hits.load(Ordering::SeqCst), 3);

	tokio::time::advance(StdDuration::from_secs(5)).await;
	failing.store(false, Ordering::SeqCst);

	let quantity = invoker.call(CallContext::new(), order()).await.expect("Probe should succeed.");

	assert_eq!(quantity, 2);
	assert_eq!(
		registry.snapshot(COMMAND).map(|s| (s.mode, s.failures)),
		Some((BreakerMode::Closed, 0))
	);

	let entries = log.entries();

	assert_eq!(entries.len(), 5);
	assert!(entries.iter().all(|entry| entry.command == COMMAND));
	assert_eq!(entries[0].request, r#"{"sku":"sku-1","quantity":2}"#);
	assert_eq!(entries[4].outcome, CallOutcome::Success);
}

#[tokio::test(start_paused = true)]
async fn canceled_calls_count_as_failures() {
	let registry = registry();
	let log = Arc::new(RecordingLog::default());
	let invoker = ResilientInvoker::new(
		endpoint_fn(|_: CallContext, _: PlaceOrder| async {
			tokio::time::sleep(StdDuration::from_secs(60)).await;

			Ok::<_, CallError<String>>(0)
		}),
		COMMAND,
		registry.clone(),
	)
	.with_log(log.clone());
	let cancel = CancellationToken::new();
	let context = CallContext::new().with_cancellation(cancel.clone());
	let trigger = tokio::spawn(async move {
		tokio::time::sleep(StdDuration::from_millis(50)).await;
		cancel.cancel();
	});
	let err = invoker.call(context, order()).await.expect_err("Canceled call should fail.");

	trigger.await.expect("Cancel task should not panic.");

	assert!(err.is_unavailable());
	assert_eq!(registry.snapshot(COMMAND).map(|s| s.failures), Some(1));
	assert_eq!(log.entries().len(), 1);
	assert!(log.entries()[0].elapsed < StdDuration::from_millis(200));
}

#[tokio::test(start_paused = true)]
async fn authorized_calls_flow_through_the_full_stack() {
	let tokens = TokenService::new("stack-secret");
	let log = Arc::new(RecordingLog::default());
	let handler = endpoint_fn(|ctx: CallContext, order: PlaceOrder| async move {
		let user = ctx
			.identity()
			.and_then(|identity| identity.claim("user_id"))
			.map(str::to_owned)
			.unwrap_or_default();
		let mut downstream = Metadata::new();

		ctx.forward_authorization(&mut downstream);

		Ok::<_, CallError<String>>((user, order.sku, downstream.contains_key("authorization")))
	});
	let stack = AuthMiddleware::new(
		ResilientInvoker::new(handler, COMMAND, registry()).with_log(log.clone()),
		tokens.clone(),
		ClaimPolicy::new([("role", "buyer")]),
	);
	let (user, sku, forwarded) = stack
		.call(signed_context(&tokens, "buyer"), order())
		.await
		.expect("Buyer should be served.");

	assert_eq!((user.as_str(), sku.as_str(), forwarded), ("42", "sku-1", true));

	let rejected = stack
		.call(signed_context(&tokens, "guest"), order())
		.await
		.expect_err("Guest should be rejected.");

	assert!(rejected.is_unauthorized());

	let entries = log.entries();

	assert_eq!(entries.len(), 1);
	assert_eq!(entries[0].request_id.as_deref(), Some("req-1"));
	assert_eq!(entries[0].outcome, CallOutcome::Success);
}

#[tokio::test(start_paused = true)]
async fn rejected_callers_never_trip_the_breaker() {
	let tokens = TokenService::new("stack-secret");
	let registry = registry();
	let hits = Arc::new(AtomicUsize::new(0));
	let handler = {
		let hits = hits.clone();

		endpoint_fn(move |_: CallContext, order: PlaceOrder| {
			hits.fetch_add(1, Ordering::SeqCst);

			async move { Ok::<_, CallError<String>>(order.quantity) }
		})
	};
	let stack = AuthMiddleware::new(
		ResilientInvoker::new(handler, COMMAND, registry.clone()),
		tokens.clone(),
		ClaimPolicy::new([("role", "buyer")]),
	);

	stack.call(signed_context(&tokens, "buyer"), order()).await.expect("Buyer should be served.");

	for _ in 0..5 {
		let anonymous =
			stack.call(CallContext::new(), order()).await.expect_err("Anonymous call should fail.");

		assert!(anonymous.is_unauthorized());
	}

	let forged_context = CallContext::from_metadata(Metadata::from_iter([(
		bearer::AUTHORIZATION,
		bearer::bearer_header("not.a.token"),
	)]));
	let forged = stack.call(forged_context, order()).await.expect_err("Forged token should fail.");

	assert!(forged.is_unauthorized());
	assert_eq!(
		registry.snapshot(COMMAND).map(|s| (s.mode, s.failures)),
		Some((BreakerMode::Closed, 0))
	);
	assert_eq!(
		stack.call(signed_context(&tokens, "buyer"), order()).await.expect("Buyer should be served."),
		2
	);
	assert_eq!(hits.load(Ordering::SeqCst), 2);
}
