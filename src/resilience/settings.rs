//! Per-command breaker settings and the registry configuration document.

// std
use std::time::Duration as StdDuration;
// self
use crate::{_prelude::*, error::ConfigError};

/// Tuning for one command's breaker.
///
/// Durations serialize as whole milliseconds (`timeout_ms`, `open_interval_ms`).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BreakerSettings {
	/// Consecutive failures that open the circuit.
	pub failure_threshold: u32,
	/// Upper bound for a single guarded call; exceeding it counts as a failure.
	#[serde(rename = "timeout_ms", with = "millis")]
	pub call_timeout: StdDuration,
	/// How long an open circuit rejects calls before admitting a probe.
	#[serde(rename = "open_interval_ms", with = "millis")]
	pub open_interval: StdDuration,
}
impl BreakerSettings {
	const DEFAULT_CALL_TIMEOUT: StdDuration = StdDuration::from_secs(1);
	const DEFAULT_FAILURE_THRESHOLD: u32 = 5;
	const DEFAULT_OPEN_INTERVAL: StdDuration = StdDuration::from_secs(5);

	/// Overrides the failure threshold.
	pub fn with_failure_threshold(mut self, threshold: u32) -> Self {
		self.failure_threshold = threshold;

		self
	}

	/// Overrides the per-call timeout.
	pub fn with_call_timeout(mut self, timeout: StdDuration) -> Self {
		self.call_timeout = timeout;

		self
	}

	/// Overrides the open interval.
	pub fn with_open_interval(mut self, interval: StdDuration) -> Self {
		self.open_interval = interval;

		self
	}

	/// Rejects settings that would make the breaker useless.
	pub fn validate(&self, command: &str) -> Result<(), ConfigError> {
		if self.failure_threshold == 0 {
			return Err(ConfigError::ZeroFailureThreshold { command: command.to_owned() });
		}
		if self.call_timeout.is_zero() {
			return Err(ConfigError::ZeroDuration {
				command: command.to_owned(),
				field: "call timeout",
			});
		}
		if self.open_interval.is_zero() {
			return Err(ConfigError::ZeroDuration {
				command: command.to_owned(),
				field: "open interval",
			});
		}

		Ok(())
	}
}
impl Default for BreakerSettings {
	fn default() -> Self {
		Self {
			failure_threshold: Self::DEFAULT_FAILURE_THRESHOLD,
			call_timeout: Self::DEFAULT_CALL_TIMEOUT,
			open_interval: Self::DEFAULT_OPEN_INTERVAL,
		}
	}
}

/// Deserializable registry configuration: defaults plus per-command overrides.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
	/// Settings applied to commands without an override.
	pub defaults: BreakerSettings,
	/// Per-command overrides keyed by command name.
	pub commands: BTreeMap<String, BreakerSettings>,
}

mod millis {
	// std
	use std::time::Duration;
	// crates.io
	use serde::{Deserialize, Deserializer, Serializer};

	pub fn serialize<S>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error>
	where
		S: Serializer,
	{
		serializer.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
	}

	pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
	where
		D: Deserializer<'de>,
	{
		u64::deserialize(deserializer).map(Duration::from_millis)
	}
}
