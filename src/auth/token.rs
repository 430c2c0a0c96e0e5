//! HS256 token issuance, verification, and typed claim extraction.
//!
//! [`TokenService`] signs every token of a [`TokenPair`] independently with the same shared
//! secret. Verification only accepts the HMAC family, so a token whose header names an
//! asymmetric algorithm is rejected as an invalid signature rather than verified with the
//! shared secret as a public key.

pub mod pair;
pub mod secret;

// std
use std::collections::HashSet;
// crates.io
use jsonwebtoken::{
	Algorithm, DecodingKey, EncodingKey, Header, Validation, errors::ErrorKind as JwtErrorKind,
};
use serde_json::Value;
// self
use crate::{
	_prelude::*,
	auth::{ClaimSet, bearer},
	obs::{self, OpKind, OpOutcome, OpSpan},
};
pub use pair::TokenPair;
pub use secret::{SigningSecret, TokenSecret};

const EXPIRY_CLAIM: &str = "exp";
const ACCEPTED_ALGORITHMS: [Algorithm; 3] = [Algorithm::HS256, Algorithm::HS384, Algorithm::HS512];

/// Token issuance, parsing, and claim extraction failures.
#[derive(Debug, ThisError)]
pub enum TokenError {
	/// The signing step failed; the issuance attempt is abandoned.
	#[error("Token could not be signed.")]
	Signing {
		/// Underlying signing failure.
		#[source]
		source: jsonwebtoken::errors::Error,
	},
	/// Token lifetimes must be at least one second.
	#[error("Token TTL must be at least one second.")]
	NonPositiveTtl,
	/// Signature mismatch, or the header names an algorithm outside the HMAC family.
	#[error("Token signature is invalid.")]
	InvalidSignature,
	/// The `exp` claim lies in the past.
	#[error("Token has expired.")]
	Expired,
	/// The token structure could not be decoded.
	#[error("Token is malformed: {reason}.")]
	Malformed {
		/// Decoder-supplied reason.
		reason: String,
	},
	/// A requested claim is absent.
	#[error("Claim `{key}` is not present in the token.")]
	ClaimNotFound {
		/// Requested key.
		key: String,
	},
	/// A requested claim is present but not a string.
	#[error("Claim `{key}` is not a string.")]
	ClaimTypeMismatch {
		/// Requested key.
		key: String,
	},
	/// Claims were requested from a token that has not passed verification.
	#[error("Token has not been verified.")]
	TokenInvalid,
	/// No bearer header was supplied.
	#[error("No bearer token given.")]
	NoTokenGiven,
	/// The header is not `Bearer <token>`.
	#[error("Invalid bearer token format.")]
	InvalidBearerFormat,
}

#[derive(Serialize)]
struct OutgoingClaims<'a> {
	exp: i64,
	#[serde(flatten)]
	claims: &'a BTreeMap<String, String>,
}

#[derive(Clone, Deserialize)]
struct IncomingClaims {
	exp: i64,
	#[serde(flatten)]
	claims: BTreeMap<String, Value>,
}

/// Claims decoded from a token.
///
/// Only tokens returned by [`TokenService::verify`] are marked verified; claims can be read
/// from those alone.
#[derive(Clone, Debug)]
pub struct ParsedToken {
	expires_at: OffsetDateTime,
	claims: BTreeMap<String, Value>,
	verified: bool,
}
impl ParsedToken {
	fn unverified(incoming: IncomingClaims) -> Result<Self, TokenError> {
		Ok(Self { expires_at: expiry_instant(incoming.exp)?, claims: incoming.claims, verified: false })
	}

	/// Expiry carried by the token's `exp` claim.
	pub fn expires_at(&self) -> OffsetDateTime {
		self.expires_at
	}

	/// Whether the signature and expiry checks passed.
	pub fn is_verified(&self) -> bool {
		self.verified
	}

	/// Extracts one string claim.
	pub fn claim(&self, key: &str) -> Result<&str, TokenError> {
		if !self.verified {
			return Err(TokenError::TokenInvalid);
		}
		if key == EXPIRY_CLAIM {
			return Err(TokenError::ClaimTypeMismatch { key: key.to_owned() });
		}

		match self.claims.get(key) {
			Some(Value::String(value)) => Ok(value.as_str()),
			Some(_) => Err(TokenError::ClaimTypeMismatch { key: key.to_owned() }),
			None => Err(TokenError::ClaimNotFound { key: key.to_owned() }),
		}
	}

	/// Extracts every requested key, failing on the first missing or mistyped claim.
	pub fn claims<S>(&self, keys: &[S]) -> Result<BTreeMap<String, String>, TokenError>
	where
		S: AsRef<str>,
	{
		keys.iter()
			.map(|key| {
				let key = key.as_ref();

				self.claim(key).map(|value| (key.to_owned(), value.to_owned()))
			})
			.collect()
	}

	/// Every string-valued application claim; non-string values are skipped.
	pub fn string_claims(&self) -> Result<BTreeMap<String, String>, TokenError> {
		if !self.verified {
			return Err(TokenError::TokenInvalid);
		}

		Ok(self
			.claims
			.iter()
			.filter_map(|(key, value)| value.as_str().map(|value| (key.clone(), value.to_owned())))
			.collect())
	}

	/// Rebuilds the application claim set, requiring every claim to be a string.
	pub fn claim_set(&self) -> Result<ClaimSet, TokenError> {
		let keys = self.claims.keys().collect::<Vec<_>>();
		let claims = self.claims(&keys)?;

		ClaimSet::new(claims).map_err(|err| TokenError::Malformed { reason: err.to_string() })
	}
}

/// Issues and verifies HMAC-signed token pairs with one shared secret.
#[derive(Clone, Debug)]
pub struct TokenService {
	secret: SigningSecret,
}
impl TokenService {
	/// Creates a service bound to the shared signing secret.
	pub fn new(secret: impl Into<SigningSecret>) -> Self {
		Self { secret: secret.into() }
	}

	/// Issues an access/refresh pair expiring `ttl` and `2 * ttl` from now.
	pub fn issue_pair(&self, claims: &ClaimSet, ttl: Duration) -> Result<TokenPair, TokenError> {
		self.issue_pair_at(claims, ttl, OffsetDateTime::now_utc())
	}

	/// Issues a pair as if the current instant were `now`.
	pub fn issue_pair_at(
		&self,
		claims: &ClaimSet,
		ttl: Duration,
		now: OffsetDateTime,
	) -> Result<TokenPair, TokenError> {
		const KIND: OpKind = OpKind::IssueToken;

		let _span = OpSpan::new(KIND, "issue_pair").entered();
		let result = self.sign_pair(claims, ttl, now);

		obs::record_op_outcome(KIND, OpOutcome::from_result(&result));

		result
	}

	/// Verifies the signature and expiry of `token` against the current clock.
	pub fn verify(&self, token: &str) -> Result<ParsedToken, TokenError> {
		self.verify_at(token, OffsetDateTime::now_utc())
	}

	/// Verifies `token` as if the current instant were `now`.
	pub fn verify_at(&self, token: &str, now: OffsetDateTime) -> Result<ParsedToken, TokenError> {
		const KIND: OpKind = OpKind::VerifyToken;

		let _span = OpSpan::new(KIND, "verify").entered();
		let result = self.decode(token).and_then(|mut parsed| {
			if now.unix_timestamp() > parsed.expires_at.unix_timestamp() {
				return Err(TokenError::Expired);
			}

			parsed.verified = true;

			Ok(parsed)
		});

		obs::record_op_outcome(KIND, OpOutcome::from_result(&result));

		result
	}

	/// Decodes `token` without checking its signature or expiry.
	///
	/// Useful for diagnostics such as reading a refresh token's expiry; claims cannot be
	/// extracted from the result.
	pub fn inspect(&self, token: &str) -> Result<ParsedToken, TokenError> {
		let data = jsonwebtoken::dangerous::insecure_decode::<IncomingClaims>(token)
			.map_err(map_decode_error)?;

		ParsedToken::unverified(data.claims)
	}

	/// Verifies `token` once and extracts every requested claim.
	pub fn extract_claims<S>(
		&self,
		token: &str,
		keys: &[S],
	) -> Result<BTreeMap<String, String>, TokenError>
	where
		S: AsRef<str>,
	{
		self.verify(token)?.claims(keys)
	}

	/// Parses a `Bearer <token>` header and extracts the requested claims from its token.
	pub fn extract_claims_from_bearer<S>(
		&self,
		header: Option<&str>,
		keys: &[S],
	) -> Result<BTreeMap<String, String>, TokenError>
	where
		S: AsRef<str>,
	{
		let token = bearer::bearer_token(header)?;

		self.extract_claims(token, keys)
	}

	/// Verifies a refresh token (or a full `access:refresh` wire pair) and issues a new pair
	/// carrying the same application claims.
	pub fn refresh_pair(&self, refresh_token: &str, ttl: Duration) -> Result<TokenPair, TokenError> {
		self.refresh_pair_at(refresh_token, ttl, OffsetDateTime::now_utc())
	}

	/// Refreshes as if the current instant were `now`.
	pub fn refresh_pair_at(
		&self,
		refresh_token: &str,
		ttl: Duration,
		now: OffsetDateTime,
	) -> Result<TokenPair, TokenError> {
		let token = match TokenPair::parse(refresh_token) {
			Ok((_, refresh)) => refresh,
			Err(_) => refresh_token,
		};
		let claims = self.verify_at(token, now)?.claim_set()?;

		self.issue_pair_at(&claims, ttl, now)
	}

	fn sign_pair(
		&self,
		claims: &ClaimSet,
		ttl: Duration,
		now: OffsetDateTime,
	) -> Result<TokenPair, TokenError> {
		let ttl_secs = ttl.whole_seconds();

		if ttl_secs < 1 {
			return Err(TokenError::NonPositiveTtl);
		}

		let issued = now.unix_timestamp();
		let access_exp = issued.checked_add(ttl_secs).ok_or(TokenError::NonPositiveTtl)?;
		let refresh_exp = access_exp.checked_add(ttl_secs).ok_or(TokenError::NonPositiveTtl)?;
		let access_token = self.sign(claims, access_exp)?;
		let refresh_token = self.sign(claims, refresh_exp)?;

		Ok(TokenPair {
			access_token,
			refresh_token,
			access_expires_at: expiry_instant(access_exp)?,
			refresh_expires_at: expiry_instant(refresh_exp)?,
		})
	}

	fn sign(&self, claims: &ClaimSet, exp: i64) -> Result<TokenSecret, TokenError> {
		let payload = OutgoingClaims { exp, claims: claims.as_map() };
		let key = EncodingKey::from_secret(self.secret.expose());

		jsonwebtoken::encode(&Header::new(Algorithm::HS256), &payload, &key)
			.map(TokenSecret::new)
			.map_err(|source| TokenError::Signing { source })
	}

	fn decode(&self, token: &str) -> Result<ParsedToken, TokenError> {
		let key = DecodingKey::from_secret(self.secret.expose());
		let data = jsonwebtoken::decode::<IncomingClaims>(token, &key, &Self::validation())
			.map_err(map_decode_error)?;

		ParsedToken::unverified(data.claims)
	}

	fn validation() -> Validation {
		let mut validation = Validation::new(Algorithm::HS256);

		validation.algorithms = ACCEPTED_ALGORITHMS.to_vec();
		validation.required_spec_claims = HashSet::from([EXPIRY_CLAIM.to_owned()]);
		// Expiry is compared against the caller's clock in `verify_at`.
		validation.validate_exp = false;
		validation.validate_aud = false;
		validation.leeway = 0;

		validation
	}
}

fn expiry_instant(exp: i64) -> Result<OffsetDateTime, TokenError> {
	OffsetDateTime::from_unix_timestamp(exp)
		.map_err(|err| TokenError::Malformed { reason: err.to_string() })
}

fn map_decode_error(err: jsonwebtoken::errors::Error) -> TokenError {
	match err.kind() {
		JwtErrorKind::InvalidSignature
		| JwtErrorKind::InvalidAlgorithm
		| JwtErrorKind::InvalidAlgorithmName => TokenError::InvalidSignature,
		JwtErrorKind::ExpiredSignature => TokenError::Expired,
		_ => TokenError::Malformed { reason: err.to_string() },
	}
}
