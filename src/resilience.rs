//! Per-command circuit breakers and the registry that owns them.
//!
//! # State Transitions
//! ```text
//! Closed → Open: consecutive failures reach the threshold
//! Open → HalfOpen: first attempt after the open interval
//! HalfOpen → Closed: probe succeeds
//! HalfOpen → Open: probe fails (fresh interval)
//! ```

pub mod breaker;
pub mod registry;
pub mod settings;

pub use breaker::*;
pub use registry::*;
pub use settings::*;

// std
use std::time::Duration as StdDuration;
// self
use crate::_prelude::*;

/// Failure surfaced by a breaker-guarded call.
///
/// [`BreakerError::Call`] carries the wrapped call's own error; every other variant means the
/// breaker (not the call) decided the outcome.
#[derive(Debug, ThisError)]
pub enum BreakerError<E> {
	/// The circuit is open and the call was not attempted.
	#[error("Circuit for `{command}` is open.")]
	Open {
		/// Guarded command.
		command: String,
	},
	/// The call exceeded the command's timeout.
	#[error("Call to `{command}` timed out after {after:?}.")]
	Timeout {
		/// Guarded command.
		command: String,
		/// Configured timeout.
		after: StdDuration,
	},
	/// The caller canceled the call while it was in flight.
	#[error("Call to `{command}` was canceled.")]
	Canceled {
		/// Guarded command.
		command: String,
	},
	/// The wrapped call failed.
	#[error("{0}")]
	Call(E),
}
impl<E> BreakerError<E> {
	/// Returns true when the breaker, not the wrapped call, produced the failure.
	pub fn is_infrastructure(&self) -> bool {
		!matches!(self, Self::Call(_))
	}

	/// Returns the wrapped call's error, if that is what failed.
	pub fn into_call_error(self) -> Option<E> {
		match self {
			Self::Call(err) => Some(err),
			_ => None,
		}
	}
}
