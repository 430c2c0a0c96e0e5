// self
use crate::{
	obs::{OpKind, OpOutcome},
	resilience::BreakerMode,
};

/// Records an operation outcome via the global metrics recorder (when enabled).
pub fn record_op_outcome(kind: OpKind, outcome: OpOutcome) {
	#[cfg(feature = "metrics")]
	{
		metrics::counter!(
			"rpc_shield_op_total",
			"op" => kind.as_str(),
			"outcome" => outcome.as_str()
		)
		.increment(1);
	}

	#[cfg(not(feature = "metrics"))]
	{
		let _ = (kind, outcome);
	}
}

/// Records a breaker state change via the global metrics recorder (when enabled).
pub fn record_breaker_transition(command: &str, from: BreakerMode, to: BreakerMode) {
	#[cfg(feature = "metrics")]
	{
		metrics::counter!(
			"rpc_shield_breaker_transition_total",
			"command" => command.to_owned(),
			"from" => from.as_str(),
			"to" => to.as_str()
		)
		.increment(1);
	}

	#[cfg(not(feature = "metrics"))]
	{
		let _ = (command, from, to);
	}
}
