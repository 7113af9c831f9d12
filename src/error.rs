//! Crate-level error types shared across the signer, cache, transport, and call executor.

// self
use crate::{_prelude::*, auth::AuthScheme};

/// Crate-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Canonical error exposed by public APIs.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Cache-layer failure.
	#[error("{0}")]
	Cache(
		#[from]
		#[source]
		crate::cache::CacheError,
	),
	/// Local configuration problem.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// Request parameters, headers, or options could not be serialized.
	#[error(transparent)]
	Encoding(#[from] EncodingError),
	/// Transport failure (DNS, TCP, TLS, timeout).
	#[error(transparent)]
	Transport(#[from] TransportError),
	/// Server kept answering 401 after every negotiated scheme was tried.
	#[error(transparent)]
	Auth(#[from] AuthError),
}

/// Configuration and validation failures.
#[derive(Debug, ThisError)]
pub enum ConfigError {
	/// HTTP client could not be constructed.
	#[error("HTTP client could not be constructed.")]
	HttpClientBuild {
		/// Underlying transport builder failure.
		#[source]
		source: BoxError,
	},
	/// Target URL cannot be parsed as an absolute URL.
	#[error("Target URL `{url}` is invalid.")]
	InvalidUrl {
		/// Offending input.
		url: String,
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
	/// Verb outside of GET, POST, PUT, DELETE, HEAD.
	#[error("HTTP verb `{verb}` is not supported.")]
	UnsupportedVerb {
		/// Offending input.
		verb: String,
	},
	/// Credentials were requested without a password.
	#[error("Option `username` requires `password`.")]
	MissingPassword,
}
impl ConfigError {
	/// Wraps a transport's builder failure inside [`ConfigError`].
	pub fn http_client_build(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::HttpClientBuild { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<reqwest::Error> for ConfigError {
	fn from(e: reqwest::Error) -> Self {
		Self::http_client_build(e)
	}
}

/// Input that cannot be turned into a request.
#[derive(Debug, ThisError)]
pub enum EncodingError {
	/// Parameter blob has a shape the verb cannot carry.
	#[error("Request parameters cannot be encoded for {verb}: {reason}.")]
	Unencodable {
		/// Verb label.
		verb: &'static str,
		/// What made the blob unencodable.
		reason: String,
	},
	/// Header name or value is not valid on the wire.
	#[error("Header `{name}` is not a valid HTTP header.")]
	InvalidHeader {
		/// Offending header name.
		name: String,
	},
	/// Options mapping failed to deserialize.
	#[error("Call options are malformed at `{path}`.")]
	Options {
		/// Path to the offending option.
		path: String,
		/// Structured parsing failure.
		#[source]
		source: serde_json::Error,
	},
	/// Response payload does not match the requested type.
	#[error("Response payload does not match the expected shape at `{path}`.")]
	Response {
		/// Path to the offending member.
		path: String,
		/// Structured parsing failure.
		#[source]
		source: serde_json::Error,
	},
}
impl From<serde_path_to_error::Error<serde_json::Error>> for EncodingError {
	fn from(e: serde_path_to_error::Error<serde_json::Error>) -> Self {
		let path = e.path().to_string();

		Self::Options { path, source: e.into_inner() }
	}
}

/// Transport-level failures.
#[derive(Debug, ThisError)]
pub enum TransportError {
	/// Underlying HTTP client reported a network failure.
	#[error("Network error occurred while calling {url}.")]
	Network {
		/// Target URL.
		url: String,
		/// Transport-specific network error.
		#[source]
		source: BoxError,
	},
	/// Request did not complete within the configured timeout.
	#[error("Request to {url} timed out.")]
	Timeout {
		/// Target URL.
		url: String,
	},
	/// Failure already flattened into a call record's `info.error`.
	#[error("Transport failed: {message}")]
	Reported {
		/// Error text recorded in the call info.
		message: String,
	},
}
impl TransportError {
	/// Wraps a transport-specific network error.
	pub fn network(
		url: impl Into<String>,
		src: impl 'static + Send + Sync + std::error::Error,
	) -> Self {
		Self::Network { url: url.into(), source: Box::new(src) }
	}
}

/// Terminal authentication failures.
#[derive(Debug, ThisError)]
pub enum AuthError {
	/// Every negotiated scheme was answered with HTTP 401.
	#[error("Server at {url} rejected credentials after trying {attempted:?}.")]
	Exhausted {
		/// Effective URL of the final attempt.
		url: String,
		/// Schemes tried, in order.
		attempted: Vec<AuthScheme>,
	},
}
