//! Per-invocation call log written by [`ResilientInvoker`](crate::endpoint::ResilientInvoker).

// std
use std::time::Duration as StdDuration;
// self
use crate::_prelude::*;

/// How a guarded invocation ended, as seen by the caller.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CallOutcome {
	/// The endpoint returned a response.
	Success,
	/// The caller received an error.
	Failure {
		/// Rendered outward error.
		error: String,
	},
}

/// One log line per guarded invocation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CallLogEntry {
	/// Guarded command name.
	pub command: String,
	/// Request rendered as JSON; empty when it could not be rendered.
	pub request: String,
	/// Caller-supplied request id.
	pub request_id: Option<String>,
	/// Wall time spent in the invocation, including breaker decisions.
	pub elapsed: StdDuration,
	/// Outcome delivered to the caller.
	pub outcome: CallOutcome,
}
impl CallLogEntry {
	/// Elapsed time in whole milliseconds.
	pub fn took_ms(&self) -> u128 {
		self.elapsed.as_millis()
	}

	/// Rendered error, if the invocation failed.
	pub fn error(&self) -> Option<&str> {
		match &self.outcome {
			CallOutcome::Success => None,
			CallOutcome::Failure { error } => Some(error),
		}
	}
}

/// Sink receiving [`CallLogEntry`] values.
pub trait CallLog
where
	Self: Send + Sync,
{
	/// Records one finished invocation.
	fn record(&self, entry: CallLogEntry);
}

/// Default [`CallLog`] emitting one structured `tracing` event per entry.
///
/// Successful calls log at `INFO`, failed calls at `ERROR`. Without the `tracing` feature the
/// sink discards entries.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingCallLog;
impl CallLog for TracingCallLog {
	fn record(&self, entry: CallLogEntry) {
		#[cfg(feature = "tracing")]
		{
			let request_id = entry.request_id.as_deref().unwrap_or_default();
			let took_ms = entry.took_ms() as u64;

			match entry.error() {
				None => tracing::info!(
					command = %entry.command,
					request = %entry.request,
					request_id,
					took_ms,
					"call finished"
				),
				Some(err) => tracing::error!(
					command = %entry.command,
					request = %entry.request,
					request_id,
					took_ms,
					err,
					"call failed"
				),
			}
		}
		#[cfg(not(feature = "tracing"))]
		{
			let _ = entry;
		}
	}
}
