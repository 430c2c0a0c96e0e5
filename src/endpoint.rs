//! Endpoint abstraction and the middlewares that wrap it.
//!
//! An [`Endpoint`] takes a [`CallContext`] and a request and returns a boxed future. Middlewares
//! are endpoints themselves, so authorization and resilience stack by nesting:
//!
//! ```text
//! AuthMiddleware(ResilientInvoker(handler))
//! ```
//!
//! Authorization runs first, so rejected callers never reach the breaker and never count
//! toward its failure threshold.
//!
//! Middlewares build their outward failures through [`ServiceError`], which keeps the wrapped
//! endpoint's error type intact for business errors.

pub mod auth;
pub mod invoker;
pub mod log;

pub use auth::AuthMiddleware;
pub use invoker::ResilientInvoker;
pub use log::*;

// self
use crate::{_prelude::*, auth::AuthError, context::CallContext};

/// Boxed future returned by [`Endpoint::call`].
pub type EndpointFuture<'a, T, E> = Pin<Box<dyn Future<Output = Result<T, E>> + 'a + Send>>;

/// A callable RPC endpoint.
pub trait Endpoint<Req>
where
	Self: Send + Sync,
{
	/// Successful response type.
	type Response;
	/// Failure type surfaced to the caller.
	type Error;

	/// Handles one request.
	fn call(&self, ctx: CallContext, request: Req) -> EndpointFuture<'_, Self::Response, Self::Error>;
}
impl<Req, T> Endpoint<Req> for Arc<T>
where
	T: ?Sized + Endpoint<Req>,
{
	type Error = T::Error;
	type Response = T::Response;

	fn call(&self, ctx: CallContext, request: Req) -> EndpointFuture<'_, Self::Response, Self::Error> {
		(**self).call(ctx, request)
	}
}

/// Endpoint built from a closure with [`endpoint_fn`].
#[derive(Clone, Copy)]
pub struct EndpointFn<F>(F);
impl<F> Debug for EndpointFn<F> {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("EndpointFn(..)")
	}
}
impl<Req, Resp, Err, F, Fut> Endpoint<Req> for EndpointFn<F>
where
	F: Send + Sync + Fn(CallContext, Req) -> Fut,
	Fut: 'static + Send + Future<Output = Result<Resp, Err>>,
{
	type Error = Err;
	type Response = Resp;

	fn call(&self, ctx: CallContext, request: Req) -> EndpointFuture<'_, Resp, Err> {
		Box::pin((self.0)(ctx, request))
	}
}

/// Wraps an async closure as an [`Endpoint`].
pub fn endpoint_fn<F>(f: F) -> EndpointFn<F> {
	EndpointFn(f)
}

/// Outward errors a middleware may need to build in the wrapped endpoint's error type.
pub trait ServiceError
where
	Self: Sized + Send + Display,
{
	/// The caller failed authorization.
	fn unauthorized(err: AuthError) -> Self;

	/// The command's breaker refused, timed out, or lost the call.
	fn unavailable(command: &str) -> Self;
}

/// Ready-made [`ServiceError`] carrying the endpoint's business error as `Logic`.
#[derive(Debug, ThisError)]
pub enum CallError<L> {
	/// Authorization failed; never retried.
	#[error("Unauthorized: {0}")]
	Unauthorized(#[source] AuthError),
	/// The command is not accepting calls right now.
	#[error("service {command} is busy or unavailable, please try again later")]
	Unavailable {
		/// Guarded command.
		command: String,
	},
	/// Business error returned by the endpoint itself.
	#[error("{0}")]
	Logic(L),
}
impl<L> CallError<L> {
	/// Wraps a business error.
	pub fn logic(err: L) -> Self {
		Self::Logic(err)
	}

	/// Returns true for authorization failures.
	pub fn is_unauthorized(&self) -> bool {
		matches!(self, Self::Unauthorized(_))
	}

	/// Returns true when the breaker turned the call away.
	pub fn is_unavailable(&self) -> bool {
		matches!(self, Self::Unavailable { .. })
	}
}
impl<L> ServiceError for CallError<L>
where
	L: Send + Display,
{
	fn unauthorized(err: AuthError) -> Self {
		Self::Unauthorized(err)
	}

	fn unavailable(command: &str) -> Self {
		Self::Unavailable { command: command.to_owned() }
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn unavailable_message_names_the_command() {
		let err = <CallError<String> as ServiceError>::unavailable("users.get");

		assert!(err.is_unavailable());
		assert_eq!(
			err.to_string(),
			"service users.get is busy or unavailable, please try again later"
		);
	}

	#[tokio::test]
	async fn closures_become_endpoints() {
		let echo = endpoint_fn(|ctx: CallContext, name: String| async move {
			Ok::<_, CallError<String>>(format!("{}:{name}", ctx.request_id().unwrap_or("-")))
		});
		let shared = Arc::new(echo);
		let reply = shared
			.call(CallContext::new().with_request_id("r1"), "ada".to_owned())
			.await
			.expect("Echo endpoint should succeed.");

		assert_eq!(reply, "r1:ada");
	}
}
