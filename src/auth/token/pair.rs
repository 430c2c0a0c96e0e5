//! Access/refresh token pairs and their `access:refresh` wire form.

// self
use crate::{
	_prelude::*,
	auth::{TokenError, token::secret::TokenSecret},
};

/// Separator between the access and refresh halves of the wire form.
pub const PAIR_SEPARATOR: char = ':';

/// Two tokens signed from the same claim set during one issuance.
///
/// The refresh half always expires exactly one TTL after the access half.
#[derive(Clone, PartialEq, Eq)]
pub struct TokenPair {
	/// Short-lived token presented as the bearer credential.
	pub access_token: TokenSecret,
	/// Longer-lived token exchanged for a fresh pair.
	pub refresh_token: TokenSecret,
	/// Expiry embedded in the access token.
	pub access_expires_at: OffsetDateTime,
	/// Expiry embedded in the refresh token.
	pub refresh_expires_at: OffsetDateTime,
}
impl TokenPair {
	/// Renders `"<access>:<refresh>"`. The result contains both secrets.
	pub fn to_wire(&self) -> String {
		format!(
			"{}{PAIR_SEPARATOR}{}",
			self.access_token.expose(),
			self.refresh_token.expose()
		)
	}

	/// Splits the wire form into `(access, refresh)` without verifying either half.
	pub fn parse(wire: &str) -> Result<(&str, &str), TokenError> {
		match wire.split_once(PAIR_SEPARATOR) {
			Some((access, refresh))
				if !access.is_empty() && !refresh.is_empty() && !refresh.contains(PAIR_SEPARATOR) =>
				Ok((access, refresh)),
			_ =>
				Err(TokenError::Malformed { reason: "token pair must look like access:refresh".into() }),
		}
	}
}
impl Debug for TokenPair {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("TokenPair")
			.field("access_token", &"<redacted>")
			.field("refresh_token", &"<redacted>")
			.field("access_expires_at", &self.access_expires_at)
			.field("refresh_expires_at", &self.refresh_expires_at)
			.finish()
	}
}
