//! Transport primitives for outbound marketplace calls.
//!
//! The module exposes [`ApiHttpClient`] alongside the request/response model so downstream
//! crates can integrate custom HTTP stacks. The executor resolves the URL and final header
//! set before handing a call to the transport, so implementations stay a thin
//! dispatch-and-collect shim over their underlying client.

// std
use std::ops::Deref;
// crates.io
use http::header::RETRY_AFTER;
use time::format_description::well_known::Rfc2822;
// self
use crate::{
	_prelude::*,
	error::{ConfigError, DecodeError, TransportError},
};

/// Boxed future returned by transport implementations.
pub type TransportFuture<'a, T> =
	Pin<Box<dyn Future<Output = Result<T, TransportError>> + 'a + Send>>;

/// Abstraction over HTTP transports capable of executing prepared marketplace calls.
///
/// The trait is the client's only dependency on an HTTP stack. Implementations must be
/// `Send + Sync + 'static` so one transport can be shared between the executor and the
/// refresh coordinator, and the futures they return must be `Send` so in-flight calls can
/// hop executors.
pub trait ApiHttpClient
where
	Self: 'static + Send + Sync,
{
	/// Dispatches a prepared call and collects the complete response.
	fn execute(&self, call: PreparedCall) -> TransportFuture<'_, ApiResponse>;
}

/// Outbound request as described by the caller: method, service-relative path, optional
/// JSON body, and extra headers.
///
/// Treated as immutable once handed to the executor; after a successful credential
/// rotation the executor re-issues it exactly once with a fresh authorization header.
#[derive(Clone, Debug)]
pub struct ApiRequest {
	/// HTTP method.
	pub method: Method,
	/// Path resolved against the service base URL.
	pub path: String,
	/// JSON body encoded on dispatch.
	pub body: Option<serde_json::Value>,
	/// Extra headers merged into every attempt.
	pub headers: HeaderMap,
}
impl ApiRequest {
	/// Creates a request for the provided method and service-relative path.
	pub fn new(method: Method, path: impl Into<String>) -> Self {
		Self { method, path: path.into(), body: None, headers: HeaderMap::new() }
	}

	/// Convenience constructor for GET requests.
	pub fn get(path: impl Into<String>) -> Self {
		Self::new(Method::GET, path)
	}

	/// Convenience constructor for POST requests.
	pub fn post(path: impl Into<String>) -> Self {
		Self::new(Method::POST, path)
	}

	/// Convenience constructor for PUT requests.
	pub fn put(path: impl Into<String>) -> Self {
		Self::new(Method::PUT, path)
	}

	/// Convenience constructor for DELETE requests.
	pub fn delete(path: impl Into<String>) -> Self {
		Self::new(Method::DELETE, path)
	}

	/// Attaches a JSON body.
	pub fn with_body(mut self, body: serde_json::Value) -> Self {
		self.body = Some(body);

		self
	}

	/// Serializes `body` to JSON and attaches it.
	pub fn with_json<T>(self, body: &T) -> Result<Self>
	where
		T: ?Sized + Serialize,
	{
		let value =
			serde_json::to_value(body).map_err(|source| ConfigError::BodySerialize { source })?;

		Ok(self.with_body(value))
	}

	/// Merges an extra header into every attempt of this request.
	pub fn with_header(mut self, name: http::header::HeaderName, value: http::HeaderValue) -> Self {
		self.headers.insert(name, value);

		self
	}
}

/// Fully resolved call handed to the transport: verb, absolute URL, final headers, and the
/// encoded body.
#[derive(Clone, Debug)]
pub struct PreparedCall {
	/// HTTP method.
	pub method: Method,
	/// Absolute request URL.
	pub url: Url,
	/// Final header set, authorization included when available.
	pub headers: HeaderMap,
	/// Encoded request body, if any.
	pub body: Option<Vec<u8>>,
}

/// Complete response collected by the transport.
#[derive(Clone, Debug)]
pub struct ApiResponse {
	/// HTTP status.
	pub status: StatusCode,
	/// Response headers.
	pub headers: HeaderMap,
	/// Raw response body.
	pub body: Vec<u8>,
}
impl ApiResponse {
	/// Returns `true` for 2xx statuses.
	pub fn is_success(&self) -> bool {
		self.status.is_success()
	}

	/// Returns `true` when the service rejected the attempt as unauthorized.
	pub fn is_unauthorized(&self) -> bool {
		self.status == StatusCode::UNAUTHORIZED
	}

	/// Decodes the body as JSON into `T`, reporting the failing path on mismatch.
	pub fn json<T>(&self) -> Result<T, DecodeError>
	where
		T: serde::de::DeserializeOwned,
	{
		let mut deserializer = serde_json::Deserializer::from_slice(&self.body);

		serde_path_to_error::deserialize(&mut deserializer)
			.map_err(|source| DecodeError { source, status: self.status })
	}
}

/// Parses a Retry-After header into a relative duration (delta seconds or an RFC 2822
/// instant).
pub(crate) fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
	let value = headers.get(RETRY_AFTER)?;
	let raw = value.to_str().ok()?.trim();

	if let Ok(secs) = raw.parse::<u64>() {
		return Some(Duration::seconds(secs as i64));
	}
	if let Ok(moment) = OffsetDateTime::parse(raw, &Rfc2822) {
		let delta = moment - OffsetDateTime::now_utc();

		if delta.is_positive() {
			return Some(delta);
		}
	}

	None
}

/// Thin wrapper around [`ReqwestClient`] so shared HTTP behavior lives in one place.
/// Configure timeouts and proxies on the inner client; the crate imposes none of its own.
#[cfg(feature = "reqwest")]
#[derive(Clone, Default)]
pub struct ReqwestHttpClient(pub ReqwestClient);
#[cfg(feature = "reqwest")]
impl ReqwestHttpClient {
	/// Wraps an existing reqwest [`ReqwestClient`].
	pub fn with_client(client: ReqwestClient) -> Self {
		Self(client)
	}
}
#[cfg(feature = "reqwest")]
impl AsRef<ReqwestClient> for ReqwestHttpClient {
	fn as_ref(&self) -> &ReqwestClient {
		&self.0
	}
}
#[cfg(feature = "reqwest")]
impl Deref for ReqwestHttpClient {
	type Target = ReqwestClient;

	fn deref(&self) -> &Self::Target {
		&self.0
	}
}
#[cfg(feature = "reqwest")]
impl ApiHttpClient for ReqwestHttpClient {
	fn execute(&self, call: PreparedCall) -> TransportFuture<'_, ApiResponse> {
		let client = self.0.clone();

		Box::pin(async move {
			let mut request = client.request(call.method, call.url).headers(call.headers);

			if let Some(body) = call.body {
				request = request.body(body);
			}

			let response = request.send().await.map_err(TransportError::from)?;
			let status = response.status();
			let headers = response.headers().to_owned();
			let body = response.bytes().await.map_err(TransportError::from)?.to_vec();

			Ok(ApiResponse { status, headers, body })
		})
	}
}
