//! Breaker-guarded, logged endpoint invocation.

// std
use std::mem;
// crates.io
use tokio::time::Instant;
// self
use crate::{
	_prelude::*,
	context::CallContext,
	endpoint::{
		CallLog, CallLogEntry, CallOutcome, Endpoint, EndpointFuture, ServiceError, TracingCallLog,
	},
	obs::{self, OpKind, OpOutcome, OpSpan},
	resilience::{BreakerError, BreakerRegistry},
};

const KIND: OpKind = OpKind::GuardedCall;
/// Error text logged for invocations dropped before they settled.
const CANCELED: &str = "canceled";

/// Runs an endpoint through its command's circuit breaker and logs every invocation.
///
/// Business errors from the inner endpoint pass through unchanged. Breaker refusals, timeouts,
/// and cancellations surface as [`ServiceError::unavailable`]. Exactly one [`CallLogEntry`] is
/// recorded per call, whatever the outcome; a call dropped before it settles is logged as
/// `canceled`.
#[derive(Clone)]
pub struct ResilientInvoker<S> {
	inner: S,
	command: String,
	registry: Arc<BreakerRegistry>,
	log: Arc<dyn CallLog>,
}
impl<S> ResilientInvoker<S> {
	/// Guards `inner` with the breaker registered for `command`, logging through `tracing`.
	pub fn new(inner: S, command: impl Into<String>, registry: Arc<BreakerRegistry>) -> Self {
		Self { inner, command: command.into(), registry, log: Arc::new(TracingCallLog) }
	}

	/// Replaces the call log sink.
	pub fn with_log(mut self, log: Arc<dyn CallLog>) -> Self {
		self.log = log;

		self
	}

	/// Guarded command name.
	pub fn command(&self) -> &str {
		&self.command
	}
}
impl<S> Debug for ResilientInvoker<S> {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("ResilientInvoker")
			.field("command", &self.command)
			.field("registry", &self.registry)
			.finish_non_exhaustive()
	}
}
impl<S, Req> Endpoint<Req> for ResilientInvoker<S>
where
	S: Endpoint<Req>,
	S::Response: 'static + Send,
	S::Error: 'static + ServiceError,
	Req: 'static + Send + Serialize,
{
	type Error = S::Error;
	type Response = S::Response;

	fn call(&self, ctx: CallContext, request: Req) -> EndpointFuture<'_, S::Response, S::Error> {
		let record = PendingEntry {
			log: &*self.log,
			command: &self.command,
			request: serde_json::to_string(&request).unwrap_or_default(),
			request_id: ctx.request_id().map(str::to_owned),
			started: Instant::now(),
			written: false,
		};
		let cancel = ctx.cancellation().clone();
		let span = OpSpan::new(KIND, "invoke");

		Box::pin(span.instrument(async move {
			let result = self
				.registry
				.execute(&self.command, &cancel, || self.inner.call(ctx, request))
				.await
				.map_err(|err| match err {
					BreakerError::Call(err) => err,
					err => {
						#[cfg(feature = "tracing")]
						tracing::warn!(command = %self.command, reason = %err, "call turned away");
						#[cfg(not(feature = "tracing"))]
						let _ = err;

						S::Error::unavailable(&self.command)
					},
				});
			let outcome = match &result {
				Ok(_) => CallOutcome::Success,
				Err(err) => CallOutcome::Failure { error: err.to_string() },
			};

			obs::record_op_outcome(KIND, OpOutcome::from_result(&result));
			record.finish(outcome);

			result
		}))
	}
}

/// Log entry of one invocation; dropping it unwritten records a canceled failure.
struct PendingEntry<'a> {
	log: &'a dyn CallLog,
	command: &'a str,
	request: String,
	request_id: Option<String>,
	started: Instant,
	written: bool,
}
impl PendingEntry<'_> {
	fn finish(mut self, outcome: CallOutcome) {
		self.write(outcome);
	}

	fn write(&mut self, outcome: CallOutcome) {
		self.written = true;
		self.log.record(CallLogEntry {
			command: self.command.to_owned(),
			request: mem::take(&mut self.request),
			request_id: self.request_id.take(),
			elapsed: self.started.elapsed(),
			outcome,
		});
	}
}
impl Drop for PendingEntry<'_> {
	fn drop(&mut self) {
		if !self.written {
			obs::record_op_outcome(KIND, OpOutcome::Failure);
			self.write(CallOutcome::Failure { error: CANCELED.to_owned() });
		}
	}
}
