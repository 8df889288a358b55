//! Authenticated request execution with at-most-once retry semantics.
//!
//! [`ApiClient`] performs one logical outbound call: read the stored pair, attach the
//! access credential, dispatch, and, when the service answers unauthorized while a refresh
//! credential was available, rotate via the [`RefreshCoordinator`] and re-issue the request
//! exactly once. The retried attempt's outcome is final; no further refresh is triggered
//! even if it is unauthorized again.

// self
use crate::{
	_prelude::*,
	error::ApiFailure,
	http::{ApiHttpClient, ApiRequest, ApiResponse},
	obs::{self, CallKind, CallOutcome, CallSpan},
	refresh::RefreshCoordinator,
	service::ServiceDescriptor,
	session::Secret,
	store::CredentialStore,
};
#[cfg(feature = "reqwest")] use crate::http::ReqwestHttpClient;

#[cfg(feature = "reqwest")]
/// Client specialized for the crate's default reqwest transport stack.
pub type ReqwestApiClient = ApiClient<ReqwestHttpClient>;

/// Disposition of the initial attempt; drives the single refresh-and-retry cycle.
///
/// The progression is strictly linear (`Final` never re-enters the refresh path), which
/// makes the at-most-once retry guarantee structural rather than conventional.
enum InitialAttempt {
	/// Response is terminal: success, a non-auth failure, or unauthorized with no refresh
	/// credential available.
	Final(ApiResponse),
	/// Unauthorized while a refresh credential was stored; rotation may rescue it.
	RefreshAndRetry(ApiResponse),
}

/// Issues authorized marketplace calls over a shared transport.
///
/// The client owns the store handle, the service descriptor, and the refresh coordinator
/// so call sites focus on request shape. Clones share all of them, so one client can be
/// handed to every feature module of an application.
pub struct ApiClient<C>
where
	C: ?Sized + ApiHttpClient,
{
	/// Transport used for every outbound call.
	pub http_client: Arc<C>,
	/// Store holding the session's credential pair.
	pub store: Arc<dyn CredentialStore>,
	/// Descriptor of the remote service.
	pub descriptor: ServiceDescriptor,
	/// Coordinator collapsing concurrent refreshes into one exchange.
	pub refresh: RefreshCoordinator<C>,
}
impl<C> ApiClient<C>
where
	C: ?Sized + ApiHttpClient,
{
	/// Creates a client that reuses the caller-provided transport.
	///
	/// A dedicated [`RefreshCoordinator`] is constructed over the same store and
	/// transport; use [`ApiClient::with_coordinator`] to share one coordinator between
	/// several clients.
	pub fn with_http_client(
		store: Arc<dyn CredentialStore>,
		descriptor: ServiceDescriptor,
		http_client: impl Into<Arc<C>>,
	) -> Self {
		let http_client = http_client.into();
		let refresh = RefreshCoordinator::with_http_client(
			store.clone(),
			descriptor.clone(),
			http_client.clone(),
		);

		Self::with_coordinator(store, descriptor, http_client, refresh)
	}

	/// Creates a client around an existing coordinator.
	pub fn with_coordinator(
		store: Arc<dyn CredentialStore>,
		descriptor: ServiceDescriptor,
		http_client: impl Into<Arc<C>>,
		refresh: RefreshCoordinator<C>,
	) -> Self {
		Self { http_client: http_client.into(), store, descriptor, refresh }
	}

	/// Performs one logical call with authorization and exactly-once-retry semantics.
	///
	/// Success returns the raw response. Non-success statuses classify into
	/// [`Error::Api`](crate::error::Error::Api); transport failures surface as
	/// [`Error::Transport`](crate::error::Error::Transport) without touching the refresh
	/// machinery.
	pub async fn send(&self, request: ApiRequest) -> Result<ApiResponse> {
		const KIND: CallKind = CallKind::Request;

		let span = CallSpan::new(KIND, "send");

		obs::record_call_outcome(KIND, CallOutcome::Attempt);

		let result = span
			.instrument(async {
				let response = match self.first_attempt(&request).await? {
					InitialAttempt::Final(response) => response,
					InitialAttempt::RefreshAndRetry(original) => {
						match self.refresh.refresh().await {
							// Rotation produced a pair; the retried outcome is final
							// either way.
							Some(rotated) => {
								self.dispatch(&request, Some(&rotated.access)).await?
							},
							// No valid credentials remain; surface the original
							// rejection.
							None => original,
						}
					},
				};

				Self::classify(response)
			})
			.await;

		match &result {
			Ok(_) => obs::record_call_outcome(KIND, CallOutcome::Success),
			Err(_) => obs::record_call_outcome(KIND, CallOutcome::Failure),
		}

		result
	}

	/// Performs a call and decodes the successful response body into `T`.
	pub async fn send_json<T>(&self, request: ApiRequest) -> Result<T>
	where
		T: serde::de::DeserializeOwned,
	{
		let response = self.send(request).await?;

		Ok(response.json()?)
	}

	/// Discards the stored credential pair; subsequent calls proceed anonymously.
	pub fn logout(&self) {
		self.store.clear();
	}

	/// Returns `true` while a credential pair is stored.
	pub fn is_authenticated(&self) -> bool {
		self.store.read().is_some()
	}

	async fn first_attempt(&self, request: &ApiRequest) -> Result<InitialAttempt> {
		let pair = self.store.read();
		let response = self.dispatch(request, pair.as_ref().map(|pair| &pair.access)).await?;

		// Refresh is only worth attempting when a pair was stored; anonymous rejections
		// go straight to the caller.
		if response.is_unauthorized() && pair.is_some() {
			Ok(InitialAttempt::RefreshAndRetry(response))
		} else {
			Ok(InitialAttempt::Final(response))
		}
	}

	async fn dispatch(&self, request: &ApiRequest, access: Option<&Secret>) -> Result<ApiResponse> {
		let call = self.descriptor.prepare(request, access)?;

		Ok(self.http_client.execute(call).await?)
	}

	fn classify(response: ApiResponse) -> Result<ApiResponse> {
		if response.is_success() {
			Ok(response)
		} else {
			Err(ApiFailure::from_response(response.status, &response.headers, &response.body)
				.into())
		}
	}
}
#[cfg(feature = "reqwest")]
impl ApiClient<ReqwestHttpClient> {
	/// Creates a client with the crate's default reqwest transport.
	pub fn new(store: Arc<dyn CredentialStore>, descriptor: ServiceDescriptor) -> Self {
		Self::with_http_client(store, descriptor, ReqwestHttpClient::default())
	}
}
impl<C> Clone for ApiClient<C>
where
	C: ?Sized + ApiHttpClient,
{
	fn clone(&self) -> Self {
		Self {
			http_client: Arc::clone(&self.http_client),
			store: Arc::clone(&self.store),
			descriptor: self.descriptor.clone(),
			refresh: self.refresh.clone(),
		}
	}
}
impl<C> Debug for ApiClient<C>
where
	C: ?Sized + ApiHttpClient,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("ApiClient")
			.field("descriptor", &self.descriptor)
			.field("authenticated", &self.is_authenticated())
			.finish()
	}
}

#[cfg(test)]
mod tests {
	// std
	use std::sync::atomic::{AtomicUsize, Ordering};
	// self
	use super::*;
	use crate::{
		_preludet::{seeded_store, test_descriptor},
		error::TransportError,
		http::{PreparedCall, TransportFuture},
		session::CredentialPair,
		store::MemoryStore,
	};

	type Responder = Box<dyn Fn(&PreparedCall) -> Result<ApiResponse, TransportError> + Send + Sync>;

	struct ScriptedTransport {
		responder: Responder,
	}
	impl ScriptedTransport {
		fn new(
			responder: impl Fn(&PreparedCall) -> Result<ApiResponse, TransportError>
			+ Send
			+ Sync
			+ 'static,
		) -> Arc<Self> {
			Arc::new(Self { responder: Box::new(responder) })
		}
	}
	impl ApiHttpClient for ScriptedTransport {
		fn execute(&self, call: PreparedCall) -> TransportFuture<'_, ApiResponse> {
			let result = (self.responder)(&call);

			Box::pin(async move {
				// Yield once so concurrent callers interleave deterministically.
				tokio::task::yield_now().await;

				result
			})
		}
	}

	fn json_response(status: StatusCode, body: &str) -> ApiResponse {
		ApiResponse { status, headers: HeaderMap::new(), body: body.as_bytes().to_vec() }
	}

	fn pair_body(access: &str, refresh: &str) -> String {
		format!("{{\"access_token\":\"{access}\",\"refresh_token\":\"{refresh}\"}}")
	}

	fn bearer(call: &PreparedCall) -> Option<&str> {
		call.headers.get(http::header::AUTHORIZATION).and_then(|value| value.to_str().ok())
	}

	fn build_client(
		transport: Arc<ScriptedTransport>,
		store: Arc<MemoryStore>,
	) -> (ApiClient<ScriptedTransport>, Arc<MemoryStore>) {
		let dyn_store: Arc<dyn CredentialStore> = store.clone();

		(ApiClient::with_http_client(dyn_store, test_descriptor(), transport), store)
	}

	#[tokio::test]
	async fn rotates_credentials_and_retries_once() {
		let refresh_calls = Arc::new(AtomicUsize::new(0));
		let counted = refresh_calls.clone();
		let transport = ScriptedTransport::new(move |call| {
			if call.url.path() == "/auth/refresh" {
				counted.fetch_add(1, Ordering::SeqCst);

				return Ok(json_response(StatusCode::OK, &pair_body("t2", "r2")));
			}

			match bearer(call) {
				Some("Bearer t2") => Ok(json_response(StatusCode::OK, "{\"ok\":true}")),
				_ => Ok(json_response(StatusCode::UNAUTHORIZED, "{}")),
			}
		});
		let (client, store) = build_client(transport, seeded_store("t1", "r1"));
		let response = client
			.send(ApiRequest::get("/profile"))
			.await
			.expect("Retried request should succeed after rotation.");

		assert!(response.is_success());
		assert_eq!(refresh_calls.load(Ordering::SeqCst), 1);
		assert_eq!(store.read(), Some(CredentialPair::new("t2", "r2")));
	}

	#[tokio::test]
	async fn unauthorized_retry_is_final() {
		let protected_calls = Arc::new(AtomicUsize::new(0));
		let refresh_calls = Arc::new(AtomicUsize::new(0));
		let protected = protected_calls.clone();
		let refreshed = refresh_calls.clone();
		let transport = ScriptedTransport::new(move |call| {
			if call.url.path() == "/auth/refresh" {
				refreshed.fetch_add(1, Ordering::SeqCst);

				return Ok(json_response(StatusCode::OK, &pair_body("t2", "r2")));
			}

			protected.fetch_add(1, Ordering::SeqCst);

			Ok(json_response(StatusCode::UNAUTHORIZED, "{}"))
		});
		let (client, _store) = build_client(transport, seeded_store("t1", "r1"));
		let err = client
			.send(ApiRequest::get("/profile"))
			.await
			.expect_err("Second unauthorized response should be final.");

		assert!(err.is_unauthorized());
		assert_eq!(protected_calls.load(Ordering::SeqCst), 2);
		assert_eq!(refresh_calls.load(Ordering::SeqCst), 1);
	}

	#[tokio::test]
	async fn anonymous_requests_never_trigger_refresh() {
		let transport = ScriptedTransport::new(|call| {
			assert_ne!(
				call.url.path(),
				"/auth/refresh",
				"Refresh must not run for anonymous calls.",
			);
			assert!(bearer(call).is_none(), "Anonymous calls must omit authorization.");

			Ok(json_response(StatusCode::UNAUTHORIZED, "{}"))
		});
		let (client, _store) = build_client(transport, Arc::new(MemoryStore::default()));
		let err = client
			.send(ApiRequest::get("/profile"))
			.await
			.expect_err("Anonymous rejection should surface directly.");

		assert!(err.is_unauthorized());
	}

	#[tokio::test]
	async fn refresh_failure_surfaces_original_rejection() {
		let protected_calls = Arc::new(AtomicUsize::new(0));
		let protected = protected_calls.clone();
		let transport = ScriptedTransport::new(move |call| {
			if call.url.path() == "/auth/refresh" {
				return Ok(json_response(StatusCode::BAD_REQUEST, "{\"message\":\"invalid\"}"));
			}

			protected.fetch_add(1, Ordering::SeqCst);

			Ok(json_response(StatusCode::UNAUTHORIZED, "{}"))
		});
		let (client, store) = build_client(transport, seeded_store("t1", "r1"));
		let err = client
			.send(ApiRequest::get("/profile"))
			.await
			.expect_err("Unrecoverable refresh should surface the original rejection.");

		assert!(err.is_unauthorized());
		assert_eq!(protected_calls.load(Ordering::SeqCst), 1);
		assert!(store.read().is_none(), "Unrecoverable refresh should clear the store.");
	}

	#[tokio::test]
	async fn business_failures_bypass_refresh_machinery() {
		let transport = ScriptedTransport::new(|call| {
			assert_ne!(
				call.url.path(),
				"/auth/refresh",
				"Refresh must not run for business failures.",
			);

			Ok(json_response(
				StatusCode::FORBIDDEN,
				"{\"message\":\"Account banned.\",\"code\":\"banned\"}",
			))
		});
		let (client, _store) = build_client(transport, seeded_store("t1", "r1"));
		let err = client
			.send(ApiRequest::get("/listings"))
			.await
			.expect_err("Forbidden responses should classify immediately.");
		let Error::Api(failure) = err else {
			panic!("Business failures should classify as API failures.");
		};

		assert!(failure.is_banned());
		assert_eq!(failure.message, "Account banned.");
	}

	#[tokio::test]
	async fn transport_failures_propagate_immediately() {
		let transport = ScriptedTransport::new(|_| {
			Err(TransportError::Io(std::io::Error::other("connection reset")))
		});
		let (client, _store) = build_client(transport, seeded_store("t1", "r1"));
		let err = client
			.send(ApiRequest::get("/profile"))
			.await
			.expect_err("Transport failures should propagate.");

		assert!(matches!(err, Error::Transport(_)));
	}

	#[tokio::test]
	async fn simultaneous_unauthorized_requests_share_one_exchange() {
		let refresh_calls = Arc::new(AtomicUsize::new(0));
		let counted = refresh_calls.clone();
		let transport = ScriptedTransport::new(move |call| {
			if call.url.path() == "/auth/refresh" {
				counted.fetch_add(1, Ordering::SeqCst);

				return Ok(json_response(StatusCode::OK, &pair_body("t2", "r2")));
			}

			match bearer(call) {
				Some("Bearer t2") => Ok(json_response(StatusCode::OK, "{\"ok\":true}")),
				_ => Ok(json_response(StatusCode::UNAUTHORIZED, "{}")),
			}
		});
		let (client, store) = build_client(transport, seeded_store("t1", "r1"));
		let (first, second) = tokio::join!(
			client.send(ApiRequest::get("/profile")),
			client.send(ApiRequest::get("/standings")),
		);

		assert!(first.expect("First concurrent request should succeed.").is_success());
		assert!(second.expect("Second concurrent request should succeed.").is_success());
		assert_eq!(refresh_calls.load(Ordering::SeqCst), 1);
		assert_eq!(store.read(), Some(CredentialPair::new("t2", "r2")));
	}

	#[tokio::test]
	async fn logout_discards_credentials() {
		let transport = ScriptedTransport::new(|_| Ok(json_response(StatusCode::OK, "{}")));
		let (client, store) = build_client(transport, seeded_store("t1", "r1"));

		assert!(client.is_authenticated());

		client.logout();

		assert!(!client.is_authenticated());
		assert!(store.read().is_none());
	}
}
