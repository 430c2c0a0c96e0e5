//! Explicitly owned registry of per-command breakers.

// self
use crate::{
	_prelude::*,
	error::ConfigError,
	resilience::{BreakerError, BreakerSettings, BreakerSnapshot, CircuitBreaker, RegistryConfig},
};

/// Owns one [`CircuitBreaker`] per command name, created lazily on first use.
///
/// The registry lock is held only to look a breaker up; calls to different commands never
/// contend on each other's state.
#[derive(Debug, Default)]
pub struct BreakerRegistry {
	defaults: BreakerSettings,
	overrides: RwLock<HashMap<String, BreakerSettings>>,
	breakers: Mutex<HashMap<String, Arc<CircuitBreaker>>>,
}
impl BreakerRegistry {
	/// Creates a registry whose commands all start from `defaults`.
	pub fn new(defaults: BreakerSettings) -> Result<Self, ConfigError> {
		defaults.validate("*")?;

		Ok(Self { defaults, ..Default::default() })
	}

	/// Creates a registry from a deserialized configuration document.
	pub fn from_config(config: RegistryConfig) -> Result<Self, ConfigError> {
		let registry = Self::new(config.defaults)?;

		for (command, settings) in config.commands {
			registry.configure(command, settings)?;
		}

		Ok(registry)
	}

	/// Sets the settings for `command`.
	///
	/// A breaker already created for the command is replaced by a fresh closed one.
	pub fn configure(
		&self,
		command: impl Into<String>,
		settings: BreakerSettings,
	) -> Result<(), ConfigError> {
		let command = command.into();

		settings.validate(&command)?;
		self.overrides.write().insert(command.clone(), settings);
		self.breakers.lock().remove(&command);

		Ok(())
	}

	/// Settings that apply to `command`.
	pub fn settings(&self, command: &str) -> BreakerSettings {
		self.overrides.read().get(command).copied().unwrap_or(self.defaults)
	}

	/// Returns (and creates on demand) the breaker for `command`.
	pub fn breaker(&self, command: &str) -> Arc<CircuitBreaker> {
		let mut breakers = self.breakers.lock();

		if let Some(breaker) = breakers.get(command) {
			return breaker.clone();
		}

		let breaker = Arc::new(CircuitBreaker::new(command, self.settings(command)));

		breakers.insert(command.to_owned(), breaker.clone());

		breaker
	}

	/// State of `command`'s breaker, if it has been used.
	pub fn snapshot(&self, command: &str) -> Option<BreakerSnapshot> {
		self.breakers.lock().get(command).map(|breaker| breaker.snapshot())
	}

	/// Runs `call` through `command`'s breaker.
	pub async fn execute<T, E, F, Fut>(
		&self,
		command: &str,
		cancel: &CancellationToken,
		call: F,
	) -> Result<T, BreakerError<E>>
	where
		F: FnOnce() -> Fut,
		Fut: Future<Output = Result<T, E>>,
	{
		self.breaker(command).execute(cancel, call).await
	}

	/// Runs `call` through `command`'s breaker, mapping every failure through `fallback`.
	pub async fn execute_with_fallback<T, E, E2, F, Fut, Fb>(
		&self,
		command: &str,
		cancel: &CancellationToken,
		call: F,
		fallback: Fb,
	) -> Result<T, E2>
	where
		F: FnOnce() -> Fut,
		Fut: Future<Output = Result<T, E>>,
		Fb: FnOnce(BreakerError<E>) -> E2,
	{
		self.breaker(command).execute_with_fallback(cancel, call, fallback).await
	}
}
