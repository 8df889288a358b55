//! Client-level error types shared across the executor, coordinator, and transports.

// self
use crate::_prelude::*;

/// Client-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Canonical client error exposed by public APIs.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Local configuration or request-construction problem.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// Transport failure (DNS, TCP, TLS).
	#[error(transparent)]
	Transport(#[from] TransportError),
	/// Service rejected the request with a non-success status.
	#[error(transparent)]
	Api(#[from] ApiFailure),
	/// Successful response carried a body that could not be decoded.
	#[error(transparent)]
	Decode(#[from] DecodeError),
}
impl Error {
	/// Returns the HTTP status when the failure originated from a service response.
	pub fn status(&self) -> Option<StatusCode> {
		match self {
			Self::Api(failure) => Some(failure.status),
			_ => None,
		}
	}

	/// Returns `true` when the failure is the service's unauthorized rejection.
	pub fn is_unauthorized(&self) -> bool {
		self.status() == Some(StatusCode::UNAUTHORIZED)
	}
}

/// Structured failure extracted from a non-success service response.
///
/// Carries everything the UI layer branches on: the status, a human-readable message,
/// field-level validation details, and an optional machine-readable reason code.
#[derive(Clone, Debug, ThisError)]
#[error("Service responded with status {status}: {message}")]
pub struct ApiFailure {
	/// HTTP status returned by the service.
	pub status: StatusCode,
	/// Human-readable message extracted from the failure body.
	pub message: String,
	/// Field-level validation messages keyed by field name.
	pub details: Option<BTreeMap<String, Vec<String>>>,
	/// Machine-readable reason code, when the service supplied one.
	pub reason: Option<ReasonCode>,
	/// Retry-After hint from upstream, if supplied.
	pub retry_after: Option<Duration>,
}
impl ApiFailure {
	/// Classifies a terminal non-success response into a structured failure.
	///
	/// The body is parsed leniently; older endpoints return plain text, in which case the
	/// status' canonical reason becomes the message.
	pub fn from_response(status: StatusCode, headers: &HeaderMap, body: &[u8]) -> Self {
		let parsed = serde_json::from_slice::<FailureBody>(body).unwrap_or_default();
		let message = parsed
			.message
			.filter(|message| !message.is_empty())
			.unwrap_or_else(|| status.canonical_reason().unwrap_or("Request failed").to_owned());

		Self {
			status,
			message,
			details: parsed.errors.filter(|map| !map.is_empty()),
			reason: parsed.code.map(ReasonCode::from),
			retry_after: crate::http::parse_retry_after(headers),
		}
	}

	/// Returns `true` when the service flagged the account as banned.
	pub fn is_banned(&self) -> bool {
		self.reason == Some(ReasonCode::Banned)
	}
}

/// Wire shape of service failure bodies; every field is optional.
#[derive(Debug, Default, Deserialize)]
struct FailureBody {
	message: Option<String>,
	errors: Option<BTreeMap<String, Vec<String>>>,
	code: Option<String>,
}

/// Machine-readable failure reasons the marketplace UI branches on.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReasonCode {
	/// Account is banned from the marketplace.
	Banned,
	/// Account is temporarily suspended.
	Suspended,
	/// Service is inside a maintenance window.
	Maintenance,
	/// Reason label this client version does not know; preserved verbatim.
	Other(String),
}
impl ReasonCode {
	/// Returns the stable wire label for the reason.
	pub fn as_str(&self) -> &str {
		match self {
			Self::Banned => "banned",
			Self::Suspended => "suspended",
			Self::Maintenance => "maintenance",
			Self::Other(label) => label,
		}
	}
}
impl From<String> for ReasonCode {
	fn from(value: String) -> Self {
		match value.as_str() {
			"banned" => Self::Banned,
			"suspended" => Self::Suspended,
			"maintenance" => Self::Maintenance,
			_ => Self::Other(value),
		}
	}
}
impl Display for ReasonCode {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Configuration and request-construction failures raised before any traffic is sent.
#[derive(Debug, ThisError)]
pub enum ConfigError {
	/// HTTP client could not be constructed.
	#[error("HTTP client could not be constructed.")]
	HttpClientBuild {
		/// Underlying transport builder failure.
		#[source]
		source: BoxError,
	},
	/// Base URL cannot be used as a prefix for request paths.
	#[error("Base URL cannot be joined with request paths.")]
	InvalidBaseUrl {
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
	/// Request path does not resolve against the configured base URL.
	#[error("Request path `{path}` does not resolve against the base URL.")]
	InvalidPath {
		/// The offending service-relative path.
		path: String,
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
	/// Access credential cannot be encoded into an authorization header.
	#[error("Access credential cannot be encoded into an authorization header.")]
	InvalidAuthorization {
		/// Underlying header encoding failure.
		#[source]
		source: http::header::InvalidHeaderValue,
	},
	/// Request body could not be serialized to JSON.
	#[error("Request body could not be serialized to JSON.")]
	BodySerialize {
		/// Underlying serialization failure.
		#[source]
		source: serde_json::Error,
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

/// Transport-level failures (network, IO).
#[derive(Debug, ThisError)]
pub enum TransportError {
	/// Underlying HTTP client reported a network failure.
	#[error("Network error occurred while calling the service.")]
	Network {
		/// Transport-specific network error.
		#[source]
		source: BoxError,
	},
	/// Underlying IO failure surfaced during transport.
	#[error("I/O error occurred while calling the service.")]
	Io(#[from] std::io::Error),
}
impl TransportError {
	/// Wraps a transport-specific network error.
	pub fn network(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::Network { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for TransportError {
	fn from(e: ReqwestError) -> Self {
		Self::network(e)
	}
}

/// Failure to decode a response body into the caller's expected type.
#[derive(Debug, ThisError)]
#[error("Response body could not be decoded.")]
pub struct DecodeError {
	/// Structured parsing failure including the path that failed.
	#[source]
	pub source: serde_path_to_error::Error<serde_json::Error>,
	/// HTTP status of the response whose body failed to decode.
	pub status: StatusCode,
}
