//! `Authorization: Bearer <token>` header parsing.

// self
use crate::auth::TokenError;

/// Metadata key carrying the bearer credential.
pub const AUTHORIZATION: &str = "authorization";
/// Scheme name expected as the first header segment.
pub const BEARER_SCHEME: &str = "Bearer";

/// Extracts the token from a `Bearer <token>` header.
///
/// The header must split on a single space into exactly two segments, the first being
/// [`BEARER_SCHEME`].
pub fn bearer_token(header: Option<&str>) -> Result<&str, TokenError> {
	let header = match header {
		Some(value) if !value.is_empty() => value,
		_ => return Err(TokenError::NoTokenGiven),
	};
	let mut segments = header.split(' ');

	match (segments.next(), segments.next(), segments.next()) {
		(Some(BEARER_SCHEME), Some(token), None) if !token.is_empty() => Ok(token),
		_ => Err(TokenError::InvalidBearerFormat),
	}
}

/// Formats a token as a bearer header value.
pub fn bearer_header(token: &str) -> String {
	format!("{BEARER_SCHEME} {token}")
}
