//! Closed/open/half-open circuit breaker guarding one command.
//!
//! Transitions are evaluated lazily on each call attempt; there is no background timer.
//! Every transition bumps a generation counter so outcomes of calls admitted under an older
//! state never mutate the current one.

// crates.io
use tokio::time::{self, Instant};
// self
use crate::{
	_prelude::*,
	obs,
	resilience::{BreakerError, BreakerSettings},
};

/// Breaker modes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakerMode {
	/// Calls pass through and failures are counted.
	Closed,
	/// Calls short-circuit until the open interval elapses.
	Open,
	/// A single probe call decides whether the circuit closes again.
	HalfOpen,
}
impl BreakerMode {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			BreakerMode::Closed => "closed",
			BreakerMode::Open => "open",
			BreakerMode::HalfOpen => "half_open",
		}
	}
}
impl Display for BreakerMode {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Point-in-time view of a breaker's state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BreakerSnapshot {
	/// Current mode.
	pub mode: BreakerMode,
	/// Failures counted since the last reset.
	pub failures: u32,
	/// Instant from which an open breaker admits a probe.
	pub probe_at: Option<Instant>,
}

#[derive(Debug)]
struct BreakerState {
	mode: BreakerMode,
	failures: u32,
	probe_at: Option<Instant>,
	probe_in_flight: bool,
	generation: u64,
}
impl Default for BreakerState {
	fn default() -> Self {
		Self {
			mode: BreakerMode::Closed,
			failures: 0,
			probe_at: None,
			probe_in_flight: false,
			generation: 0,
		}
	}
}

/// Circuit breaker for a single command name.
#[derive(Debug)]
pub struct CircuitBreaker {
	command: String,
	settings: BreakerSettings,
	state: Mutex<BreakerState>,
}
impl CircuitBreaker {
	/// Creates a closed breaker with zero failures.
	pub fn new(command: impl Into<String>, settings: BreakerSettings) -> Self {
		Self { command: command.into(), settings, state: Default::default() }
	}

	/// Command guarded by this breaker.
	pub fn command(&self) -> &str {
		&self.command
	}

	/// Settings the breaker was built with.
	pub fn settings(&self) -> &BreakerSettings {
		&self.settings
	}

	/// Returns the current state.
	pub fn snapshot(&self) -> BreakerSnapshot {
		let state = self.state.lock();

		BreakerSnapshot { mode: state.mode, failures: state.failures, probe_at: state.probe_at }
	}

	/// Runs `call` through the breaker.
	///
	/// Short-circuits with [`BreakerError::Open`] without invoking `call` while the circuit is
	/// open (or a half-open probe is already in flight). Otherwise the call runs under the
	/// configured timeout and is abandoned as soon as `cancel` fires; timeouts and
	/// cancellations count as failures.
	pub async fn execute<T, E, F, Fut>(
		&self,
		cancel: &CancellationToken,
		call: F,
	) -> Result<T, BreakerError<E>>
	where
		F: FnOnce() -> Fut,
		Fut: Future<Output = Result<T, E>>,
	{
		let Some(admission) = self.admit(Instant::now()) else {
			return Err(BreakerError::Open { command: self.command.clone() });
		};
		let timeout = self.settings.call_timeout;
		let outcome = tokio::select! {
			biased;
			_ = cancel.cancelled() => Err(BreakerError::Canceled { command: self.command.clone() }),
			result = time::timeout(timeout, call()) => match result {
				Ok(Ok(value)) => Ok(value),
				Ok(Err(err)) => Err(BreakerError::Call(err)),
				Err(_) => Err(BreakerError::Timeout { command: self.command.clone(), after: timeout }),
			},
		};

		admission.settle(outcome.is_ok());

		outcome
	}

	/// Like [`execute`](Self::execute), but maps every failure through `fallback`.
	pub async fn execute_with_fallback<T, E, E2, F, Fut, Fb>(
		&self,
		cancel: &CancellationToken,
		call: F,
		fallback: Fb,
	) -> Result<T, E2>
	where
		F: FnOnce() -> Fut,
		Fut: Future<Output = Result<T, E>>,
		Fb: FnOnce(BreakerError<E>) -> E2,
	{
		self.execute(cancel, call).await.map_err(fallback)
	}

	fn admit(&self, now: Instant) -> Option<Admission<'_>> {
		let mut state = self.state.lock();

		match state.mode {
			BreakerMode::Closed => Some(self.admission(&state, false)),
			BreakerMode::Open => {
				if state.probe_at.is_none_or(|at| now < at) {
					return None;
				}

				self.transition(&mut state, BreakerMode::HalfOpen);
				state.probe_in_flight = true;

				Some(self.admission(&state, true))
			},
			BreakerMode::HalfOpen => {
				if state.probe_in_flight {
					return None;
				}

				state.probe_in_flight = true;

				Some(self.admission(&state, true))
			},
		}
	}

	fn admission(&self, state: &BreakerState, probe: bool) -> Admission<'_> {
		Admission { breaker: self, generation: state.generation, probe, settled: false }
	}

	fn settle(&self, generation: u64, probe: bool, success: bool, now: Instant) {
		let mut state = self.state.lock();

		if state.generation != generation {
			return;
		}

		match (state.mode, probe, success) {
			(BreakerMode::Closed, _, true) => state.failures = 0,
			(BreakerMode::Closed, _, false) => {
				state.failures = state.failures.saturating_add(1);

				if state.failures >= self.settings.failure_threshold {
					self.trip(&mut state, now);
				}
			},
			(BreakerMode::HalfOpen, true, true) => {
				state.probe_in_flight = false;
				state.failures = 0;
				state.probe_at = None;

				self.transition(&mut state, BreakerMode::Closed);
			},
			(BreakerMode::HalfOpen, true, false) => {
				state.probe_in_flight = false;

				self.trip(&mut state, now);
			},
			_ => {},
		}
	}

	fn trip(&self, state: &mut BreakerState, now: Instant) {
		state.probe_at = Some(now + self.settings.open_interval);

		self.transition(state, BreakerMode::Open);
	}

	fn transition(&self, state: &mut BreakerState, to: BreakerMode) {
		let from = state.mode;

		state.mode = to;
		state.generation = state.generation.wrapping_add(1);

		obs::record_breaker_transition(&self.command, from, to);
		obs::trace_breaker_transition(&self.command, from, to, state.failures);
	}
}

/// Permit for one admitted call; dropping it unsettled records a failure.
struct Admission<'a> {
	breaker: &'a CircuitBreaker,
	generation: u64,
	probe: bool,
	settled: bool,
}
impl Admission<'_> {
	fn settle(mut self, success: bool) {
		self.settled = true;
		self.breaker.settle(self.generation, self.probe, success, Instant::now());
	}
}
impl Drop for Admission<'_> {
	fn drop(&mut self) {
		if !self.settled {
			self.breaker.settle(self.generation, self.probe, false, Instant::now());
		}
	}
}

#[cfg(test)]
mod tests {
	// std
	use std::{
		sync::atomic::{AtomicU32, Ordering},
		time::Duration as StdDuration,
	};
	// self
	use super::*;

	fn remaining_open(snapshot: &BreakerSnapshot, now: Instant) -> Option<StdDuration> {
		snapshot.probe_at.map(|at| at.saturating_duration_since(now))
	}

	fn breaker() -> CircuitBreaker {
		CircuitBreaker::new(
			"users",
			BreakerSettings::default()
				.with_failure_threshold(3)
				.with_call_timeout(StdDuration::from_millis(100))
				.with_open_interval(StdDuration::from_secs(10)),
		)
	}

	async fn fail(
		breaker: &CircuitBreaker,
		cancel: &CancellationToken,
	) -> Result<(), BreakerError<&'static str>> {
		breaker.execute(cancel, || async { Err::<(), _>("boom") }).await
	}

	#[tokio::test(start_paused = true)]
	async fn threshold_failures_open_the_circuit() {
		let breaker = breaker();
		let cancel = CancellationToken::new();

		for _ in 0..2 {
			assert!(matches!(fail(&breaker, &cancel).await, Err(BreakerError::Call("boom"))));
		}

		assert_eq!(breaker.snapshot().mode, BreakerMode::Closed);
		assert!(matches!(fail(&breaker, &cancel).await, Err(BreakerError::Call("boom"))));

		let snapshot = breaker.snapshot();

		assert_eq!(snapshot.mode, BreakerMode::Open);
		assert_eq!(snapshot.failures, 3);
		assert_eq!(remaining_open(&snapshot, Instant::now()), Some(StdDuration::from_secs(10)));
	}

	#[tokio::test(start_paused = true)]
	async fn success_resets_the_closed_counter() {
		let breaker = breaker();
		let cancel = CancellationToken::new();

		let _ = fail(&breaker, &cancel).await;
		let _ = fail(&breaker, &cancel).await;
		breaker.execute(&cancel, || async { Ok::<_, &str>(()) }).await.expect("Call should pass.");
		let _ = fail(&breaker, &cancel).await;

		assert_eq!(breaker.snapshot(), BreakerSnapshot {
			mode: BreakerMode::Closed,
			failures: 1,
			probe_at: None
		});
	}

	#[tokio::test(start_paused = true)]
	async fn timeouts_count_as_failures() {
		let breaker = breaker();
		let cancel = CancellationToken::new();
		let result = breaker
			.execute(&cancel, || async {
				time::sleep(StdDuration::from_secs(60)).await;

				Ok::<_, &str>(())
			})
			.await;

		assert!(matches!(
			result,
			Err(BreakerError::Timeout { after, .. }) if after == StdDuration::from_millis(100)
		));
		assert_eq!(breaker.snapshot().failures, 1);
	}

	#[tokio::test(start_paused = true)]
	async fn cancellation_abandons_the_call_and_counts_as_failure() {
		let breaker = breaker();
		let cancel = CancellationToken::new();
		let finished = Arc::new(AtomicU32::new(0));
		let trigger = cancel.clone();
		let observed = finished.clone();

		tokio::spawn(async move {
			time::sleep(StdDuration::from_millis(10)).await;
			trigger.cancel();
		});

		let result = breaker
			.execute(&cancel, || async move {
				time::sleep(StdDuration::from_millis(50)).await;
				observed.fetch_add(1, Ordering::SeqCst);

				Ok::<_, &str>(())
			})
			.await;

		assert!(matches!(result, Err(BreakerError::Canceled { .. })));
		assert_eq!(finished.load(Ordering::SeqCst), 0);
		assert_eq!(breaker.snapshot().failures, 1);
	}

	#[tokio::test(start_paused = true)]
	async fn half_open_admits_a_single_concurrent_probe() {
		let breaker = Arc::new(breaker());
		let cancel = CancellationToken::new();

		for _ in 0..3 {
			let _ = fail(&breaker, &cancel).await;
		}

		time::advance(StdDuration::from_secs(10)).await;

		let probe_breaker = breaker.clone();
		let probe_cancel = cancel.clone();
		let probe = tokio::spawn(async move {
			probe_breaker
				.execute(&probe_cancel, || async {
					time::sleep(StdDuration::from_millis(50)).await;

					Ok::<_, &str>("probed")
				})
				.await
		});

		tokio::task::yield_now().await;

		assert_eq!(breaker.snapshot().mode, BreakerMode::HalfOpen);

		let invoked = AtomicU32::new(0);
		let rejected = breaker
			.execute(&cancel, || async {
				invoked.fetch_add(1, Ordering::SeqCst);

				Ok::<_, &str>("second")
			})
			.await;

		assert!(matches!(rejected, Err(BreakerError::Open { .. })));
		assert_eq!(invoked.load(Ordering::SeqCst), 0);
		assert_eq!(
			probe.await.expect("Probe task should not panic.").expect("Probe should succeed."),
			"probed"
		);
		assert_eq!(breaker.snapshot().mode, BreakerMode::Closed);
		assert_eq!(breaker.snapshot().failures, 0);
	}

	#[tokio::test(start_paused = true)]
	async fn failed_probe_reopens_with_a_fresh_window() {
		let breaker = breaker();
		let cancel = CancellationToken::new();

		for _ in 0..3 {
			let _ = fail(&breaker, &cancel).await;
		}

		time::advance(StdDuration::from_secs(10)).await;

		assert!(matches!(fail(&breaker, &cancel).await, Err(BreakerError::Call("boom"))));

		let now = Instant::now();
		let snapshot = breaker.snapshot();

		assert_eq!(snapshot.mode, BreakerMode::Open);
		assert_eq!(snapshot.probe_at, Some(now + StdDuration::from_secs(10)));
		assert!(matches!(fail(&breaker, &cancel).await, Err(BreakerError::Open { .. })));
	}

	#[tokio::test(start_paused = true)]
	async fn dropped_probe_reopens_the_circuit() {
		let breaker = breaker();
		let cancel = CancellationToken::new();

		for _ in 0..3 {
			let _ = fail(&breaker, &cancel).await;
		}

		time::advance(StdDuration::from_secs(10)).await;

		{
			let pending = breaker.execute(&cancel, || async {
				time::sleep(StdDuration::from_secs(1)).await;

				Ok::<_, &str>(())
			});
			let _ = time::timeout(StdDuration::from_millis(1), pending).await;
		}

		let snapshot = breaker.snapshot();

		assert_eq!(snapshot.mode, BreakerMode::Open);
		assert_eq!(remaining_open(&snapshot, Instant::now()), Some(StdDuration::from_secs(10)));
	}

	#[tokio::test(start_paused = true)]
	async fn stale_outcomes_do_not_touch_the_new_state() {
		let breaker = Arc::new(
			CircuitBreaker::new(
				"slow",
				BreakerSettings::default()
					.with_failure_threshold(1)
					.with_call_timeout(StdDuration::from_secs(5))
					.with_open_interval(StdDuration::from_secs(10)),
			),
		);
		let cancel = CancellationToken::new();
		let slow_breaker = breaker.clone();
		let slow_cancel = cancel.clone();
		let slow = tokio::spawn(async move {
			slow_breaker
				.execute(&slow_cancel, || async {
					time::sleep(StdDuration::from_secs(1)).await;

					Ok::<_, &str>(())
				})
				.await
		});

		tokio::task::yield_now().await;

		let _ = fail(&breaker, &cancel).await;

		assert_eq!(breaker.snapshot().mode, BreakerMode::Open);

		slow.await.expect("Slow task should not panic.").expect("Slow call should succeed.");

		assert_eq!(breaker.snapshot().mode, BreakerMode::Open);
		assert_eq!(breaker.snapshot().failures, 1);
	}

	#[tokio::test(start_paused = true)]
	async fn fallback_maps_every_failure() {
		let breaker = breaker();
		let cancel = CancellationToken::new();
		let mapped = breaker
			.execute_with_fallback(
				&cancel,
				|| async { Err::<(), _>("boom") },
				|err| if err.is_infrastructure() { "unavailable" } else { "logic" },
			)
			.await;

		assert_eq!(mapped, Err("logic"));
	}
}
