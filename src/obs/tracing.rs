// self
use crate::{_prelude::*, obs::OpKind, resilience::BreakerMode, secret::SecretError};

/// Type alias that resolves to an instrumented future when tracing is enabled.
#[cfg(feature = "tracing")]
pub type InstrumentedOp<F> = tracing::instrument::Instrumented<F>;
/// Passthrough future type when tracing is disabled.
#[cfg(not(feature = "tracing"))]
pub type InstrumentedOp<F> = F;

/// A span builder used around token, secret, and guarded-call operations.
#[derive(Clone, Debug)]
pub struct OpSpan {
	#[cfg(feature = "tracing")]
	span: tracing::Span,
}
impl OpSpan {
	/// Creates a new span tagged with the provided operation kind + stage.
	pub fn new(kind: OpKind, stage: &'static str) -> Self {
		#[cfg(feature = "tracing")]
		{
			let span = tracing::info_span!("rpc_shield.op", op = kind.as_str(), stage);

			Self { span }
		}
		#[cfg(not(feature = "tracing"))]
		{
			let _ = (kind, stage);

			Self {}
		}
	}

	/// Enters the span for synchronous sections.
	pub fn entered(self) -> OpSpanGuard {
		#[cfg(feature = "tracing")]
		{
			OpSpanGuard { guard: self.span.entered() }
		}
		#[cfg(not(feature = "tracing"))]
		{
			let _ = self;

			OpSpanGuard {}
		}
	}

	/// Instruments an async block without holding a guard across `.await` points.
	pub fn instrument<Fut>(&self, fut: Fut) -> InstrumentedOp<Fut>
	where
		Fut: Future,
	{
		#[cfg(feature = "tracing")]
		{
			use tracing::Instrument;

			fut.instrument(self.span.clone())
		}
		#[cfg(not(feature = "tracing"))]
		{
			fut
		}
	}
}

/// RAII guard returned by [`OpSpan::entered`].
pub struct OpSpanGuard {
	#[cfg(feature = "tracing")]
	#[allow(dead_code)]
	guard: tracing::span::EnteredSpan,
}
impl Debug for OpSpanGuard {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("OpSpanGuard(..)")
	}
}

/// Emits a structured event for a breaker state change (when tracing is enabled).
pub fn trace_breaker_transition(command: &str, from: BreakerMode, to: BreakerMode, failures: u32) {
	#[cfg(feature = "tracing")]
	{
		if to == BreakerMode::Open {
			tracing::warn!(command, from = from.as_str(), to = to.as_str(), failures, "circuit opened");
		} else {
			tracing::info!(
				command,
				from = from.as_str(),
				to = to.as_str(),
				failures,
				"circuit state changed"
			);
		}
	}
	#[cfg(not(feature = "tracing"))]
	{
		let _ = (command, from, to, failures);
	}
}

/// Emits a structured event when a lenient secret lookup swallows a failure.
pub fn trace_secret_fallback(err: &SecretError) {
	#[cfg(feature = "tracing")]
	{
		match err {
			SecretError::StoreUnavailable { .. } | SecretError::MalformedPayload { .. } =>
				tracing::warn!(error = %err, "secret lookup fell back to empty value"),
			_ => tracing::debug!(error = %err, "secret lookup fell back to empty value"),
		}
	}
	#[cfg(not(feature = "tracing"))]
	{
		let _ = err;
	}
}
