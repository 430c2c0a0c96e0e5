//! Claim-checking authorization in front of an endpoint.

// self
use crate::{
	_prelude::*,
	auth::{ClaimPolicy, TokenService},
	context::CallContext,
	endpoint::{Endpoint, EndpointFuture, ServiceError},
};

/// Verifies the caller's bearer token against a [`ClaimPolicy`] before the inner endpoint runs.
///
/// On success every string claim of the verified token is attached to the context as a
/// [`VerifiedIdentity`](crate::auth::VerifiedIdentity). Any failure is returned as
/// [`ServiceError::unauthorized`] and the inner endpoint is never called.
#[derive(Clone, Debug)]
pub struct AuthMiddleware<S> {
	inner: S,
	tokens: TokenService,
	policy: ClaimPolicy,
}
impl<S> AuthMiddleware<S> {
	/// Wraps `inner` with `policy`, verifying tokens with `tokens`.
	pub fn new(inner: S, tokens: TokenService, policy: ClaimPolicy) -> Self {
		Self { inner, tokens, policy }
	}

	/// Policy enforced on every call.
	pub fn policy(&self) -> &ClaimPolicy {
		&self.policy
	}
}
impl<S, Req> Endpoint<Req> for AuthMiddleware<S>
where
	S: Endpoint<Req>,
	S::Response: 'static + Send,
	S::Error: 'static + ServiceError,
{
	type Error = S::Error;
	type Response = S::Response;

	fn call(&self, ctx: CallContext, request: Req) -> EndpointFuture<'_, S::Response, S::Error> {
		match self.policy.authorize(&self.tokens, ctx.authorization()) {
			Ok(identity) => self.inner.call(ctx.with_identity(identity), request),
			Err(err) => {
				#[cfg(feature = "tracing")]
				tracing::debug!(error = %err, request_id = ctx.request_id(), "call rejected");

				Box::pin(std::future::ready(Err(S::Error::unauthorized(err))))
			},
		}
	}
}

#[cfg(test)]
mod tests {
	// std
	use std::sync::atomic::{AtomicUsize, Ordering};
	// self
	use super::*;
	use crate::{
		auth::{AuthError, ClaimSet, TokenError, bearer},
		context::Metadata,
		endpoint::{CallError, endpoint_fn},
	};

	fn context_with(header: &str) -> CallContext {
		CallContext::from_metadata(Metadata::from_iter([(bearer::AUTHORIZATION, header)]))
	}

	#[tokio::test]
	async fn identity_reaches_the_inner_endpoint() {
		let tokens = TokenService::new("hmac-key");
		let claims = ClaimSet::new([("role", "admin"), ("tenant", "acme")])
			.expect("Claim fixture should be valid.");
		let pair =
			tokens.issue_pair(&claims, Duration::minutes(5)).expect("Issuing should succeed.");
		let guarded = AuthMiddleware::new(
			endpoint_fn(|ctx: CallContext, _: ()| async move {
				let identity = ctx.identity().expect("Identity should be attached.");

				Ok::<_, CallError<String>>(identity.claim("tenant").map(str::to_owned))
			}),
			tokens,
			ClaimPolicy::new([("role", "admin"), ("tenant", "acme")]),
		);
		let header = bearer::bearer_header(pair.access_token.expose());
		let tenant = guarded.call(context_with(&header), ()).await.expect("Call should pass.");

		assert_eq!(tenant.as_deref(), Some("acme"));
	}

	#[tokio::test]
	async fn rejected_calls_never_reach_the_inner_endpoint() {
		let tokens = TokenService::new("hmac-key");
		let claims = ClaimSet::new([("role", "viewer")]).expect("Claim fixture should be valid.");
		let pair =
			tokens.issue_pair(&claims, Duration::minutes(5)).expect("Issuing should succeed.");
		let hits = Arc::new(AtomicUsize::new(0));
		let counter = hits.clone();
		let guarded = AuthMiddleware::new(
			endpoint_fn(move |_: CallContext, _: ()| {
				counter.fetch_add(1, Ordering::SeqCst);

				async { Ok::<_, CallError<String>>(()) }
			}),
			tokens,
			ClaimPolicy::new([("role", "admin")]),
		);
		let header = bearer::bearer_header(pair.access_token.expose());
		let mismatch = guarded.call(context_with(&header), ()).await;
		let missing = guarded.call(CallContext::new(), ()).await;

		assert!(matches!(
			mismatch,
			Err(CallError::Unauthorized(AuthError::ClaimMismatch { ref key })) if key == "role"
		));
		assert!(matches!(
			missing,
			Err(CallError::Unauthorized(AuthError::Token(TokenError::NoTokenGiven)))
		));
		assert_eq!(hits.load(Ordering::SeqCst), 0);
	}
}
