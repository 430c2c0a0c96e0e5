//! Optional observability helpers for token, secret, and guarded-call operations.
//!
//! # Feature Flags
//!
//! - Enable `tracing` to emit structured spans named `rpc_shield.op` with the `op` (operation)
//!   and `stage` (call site) fields, and to route [`TracingCallLog`](crate::endpoint::TracingCallLog)
//!   entries to the active subscriber.
//! - Enable `metrics` to increment the `rpc_shield_op_total` counter for every success/failure,
//!   labeled by `op` + `outcome`, and `rpc_shield_breaker_transition_total` for every breaker
//!   state change, labeled by `command`, `from`, and `to`.

mod metrics;
mod tracing;

pub use metrics::*;
pub use tracing::*;

// self
use crate::_prelude::*;

/// Operation kinds observed by the crate.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OpKind {
	/// Token pair issuance.
	IssueToken,
	/// Token verification.
	VerifyToken,
	/// Secret reference resolution.
	ResolveSecret,
	/// Breaker-guarded endpoint call.
	GuardedCall,
}
impl OpKind {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			OpKind::IssueToken => "issue_token",
			OpKind::VerifyToken => "verify_token",
			OpKind::ResolveSecret => "resolve_secret",
			OpKind::GuardedCall => "guarded_call",
		}
	}
}
impl Display for OpKind {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Outcome labels recorded for each operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OpOutcome {
	/// Successful completion.
	Success,
	/// Failure propagated back to the caller.
	Failure,
}
impl OpOutcome {
	/// Maps a result onto its outcome label.
	pub fn from_result<T, E>(result: &Result<T, E>) -> Self {
		if result.is_ok() { OpOutcome::Success } else { OpOutcome::Failure }
	}

	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			OpOutcome::Success => "success",
			OpOutcome::Failure => "failure",
		}
	}
}
impl Display for OpOutcome {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}
