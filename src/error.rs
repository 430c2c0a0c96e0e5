//! Crate-level error types shared across token, secret, and breaker subsystems.

// self
use crate::_prelude::*;

/// Crate-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Canonical error exposed by APIs that span more than one subsystem.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Token issuance or verification failure.
	#[error(transparent)]
	Token(#[from] crate::auth::TokenError),
	/// Application claims could not be validated.
	#[error(transparent)]
	Claim(#[from] crate::auth::ClaimError),
	/// Authorization rejected the call.
	#[error(transparent)]
	Auth(#[from] crate::auth::AuthError),
	/// Secret resolution failure.
	#[error("{0}")]
	Secret(
		#[from]
		#[source]
		crate::secret::SecretError,
	),
	/// Local configuration problem.
	#[error(transparent)]
	Config(#[from] ConfigError),
}

/// Configuration and validation failures raised while wiring the crate together.
#[derive(Debug, ThisError)]
pub enum ConfigError {
	/// HTTP client could not be constructed.
	#[error("HTTP client could not be constructed.")]
	HttpClientBuild {
		/// Underlying transport builder failure.
		#[source]
		source: BoxError,
	},
	/// Secret store address cannot be parsed.
	#[error("Secret store address is invalid.")]
	InvalidAddress {
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
	/// Secret store address uses an unsupported scheme.
	#[error("Secret store address must use http or https, got `{scheme}`.")]
	UnsupportedScheme {
		/// Scheme found on the address.
		scheme: String,
	},
	/// Breaker threshold must admit at least one failure.
	#[error("Breaker `{command}` must have a failure threshold of at least one.")]
	ZeroFailureThreshold {
		/// Command the settings were meant for.
		command: String,
	},
	/// Breaker durations must be positive.
	#[error("Breaker `{command}` has a zero {field}.")]
	ZeroDuration {
		/// Command the settings were meant for.
		command: String,
		/// Offending field label.
		field: &'static str,
	},
}
impl ConfigError {
	/// Wraps a transport's builder failure inside [`ConfigError`].
	pub fn http_client_build(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::HttpClientBuild { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for ConfigError {
	fn from(e: ReqwestError) -> Self {
		Self::http_client_build(e)
	}
}
impl From<url::ParseError> for ConfigError {
	fn from(source: url::ParseError) -> Self {
		Self::InvalidAddress { source }
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::secret::SecretError;

	#[test]
	fn secret_error_converts_into_crate_error_with_source() {
		let secret_error = SecretError::StoreUnavailable { message: "connection refused".into() };
		let error: Error = secret_error.clone().into();

		assert!(matches!(error, Error::Secret(_)));
		assert!(error.to_string().contains("connection refused"));

		let source = StdError::source(&error)
			.expect("Crate error should expose the original secret error as its source.");

		assert_eq!(source.to_string(), secret_error.to_string());
	}

	#[test]
	fn url_parse_errors_become_invalid_address() {
		let err: ConfigError = Url::parse("not a url").expect_err("Fixture must not parse.").into();

		assert!(matches!(err, ConfigError::InvalidAddress { .. }));
		assert!(StdError::source(&err).is_some());
	}
}
