//! Credential refresh coordination with single-flight guarantees and race recovery.
//!
//! However many callers observe an expired access credential at the same time, exactly one
//! network exchange runs and every caller observes that exchange's settled outcome. A
//! failed exchange re-checks the store before giving up: refresh credentials are
//! single-use server-side, so a sibling that won the rotation race already replaced the
//! credential this exchange was holding, and adopting its pair avoids a spurious logout.

mod metrics;

pub use metrics::RefreshMetrics;

// self
use crate::{
	_prelude::*,
	error::ApiFailure,
	http::{ApiHttpClient, ApiRequest},
	obs::{self, CallKind, CallOutcome, CallSpan},
	service::ServiceDescriptor,
	session::{CredentialPair, Secret},
	store::CredentialStore,
};

/// Outcome of a settled exchange: the new pair, or `None` when no valid credentials
/// remain.
pub type RefreshOutcome = Option<CredentialPair>;

/// Coordinates refresh exchanges for one credential store.
///
/// The coordinator is an explicit object owned by the composition root (typically an
/// [`ApiClient`](crate::client::ApiClient)); tests construct isolated instances instead of
/// sharing process-wide state. Cloning is cheap and every clone drives the same in-flight
/// operation slot.
pub struct RefreshCoordinator<C>
where
	C: ?Sized + ApiHttpClient,
{
	inner: Arc<CoordinatorInner<C>>,
}
impl<C> RefreshCoordinator<C>
where
	C: ?Sized + ApiHttpClient,
{
	/// Creates a coordinator over the provided store, descriptor, and transport.
	pub fn with_http_client(
		store: Arc<dyn CredentialStore>,
		descriptor: ServiceDescriptor,
		http_client: impl Into<Arc<C>>,
	) -> Self {
		Self {
			inner: Arc::new(CoordinatorInner {
				store,
				descriptor,
				http_client: http_client.into(),
				metrics: RefreshMetrics::default(),
				inflight: Mutex::new(None),
			}),
		}
	}

	/// Shared counters for exchanges driven by this coordinator.
	pub fn metrics(&self) -> &RefreshMetrics {
		&self.inner.metrics
	}

	/// Exchanges the stored refresh credential for a new pair, joining an in-flight
	/// exchange when one exists.
	///
	/// Resolves to `None` when no valid credentials remain: nothing was stored, or the
	/// exchange failed and no sibling rotation superseded it. `None` is the only failure
	/// signal; callers proceed to their unauthenticated path instead of handling errors.
	pub async fn refresh(&self) -> RefreshOutcome {
		const KIND: CallKind = CallKind::Refresh;

		let span = CallSpan::new(KIND, "refresh");

		obs::record_call_outcome(KIND, CallOutcome::Attempt);

		let outcome = span
			.instrument(async {
				// Check-then-create happens under the synchronous lock, so a burst of
				// concurrent callers can never create two operations.
				let operation = {
					let mut slot = self.inner.inflight.lock();

					match slot.as_ref() {
						Some(operation) => Arc::clone(operation),
						None => {
							let operation = Arc::new(RefreshOperation::default());

							*slot = Some(Arc::clone(&operation));

							operation
						},
					}
				};
				let outcome = self.drive(&operation).await;

				// Drop the handle once settled; pointer identity keeps a newer operation
				// started by a later caller intact.
				let mut slot = self.inner.inflight.lock();

				if slot.as_ref().is_some_and(|current| Arc::ptr_eq(current, &operation)) {
					*slot = None;
				}

				outcome
			})
			.await;

		match &outcome {
			Some(_) => obs::record_call_outcome(KIND, CallOutcome::Success),
			None => obs::record_call_outcome(KIND, CallOutcome::Failure),
		}

		outcome
	}

	/// The first caller through the gate performs the exchange while holding it; later
	/// joiners block on the gate and read the memoized outcome. A caller dropped
	/// mid-exchange releases the gate and the next waiter takes over.
	async fn drive(&self, operation: &RefreshOperation) -> RefreshOutcome {
		let mut settled = operation.outcome.lock().await;

		if let Some(outcome) = settled.as_ref() {
			return outcome.clone();
		}

		let outcome = self.exchange().await;

		*settled = Some(outcome.clone());

		outcome
	}

	async fn exchange(&self) -> RefreshOutcome {
		self.inner.metrics.record_attempt();

		// Nothing stored means nothing to refresh; resolve without touching the network.
		// The pair type guarantees a stored access credential always has a refresh
		// sibling.
		let Some(current) = self.inner.store.read() else {
			self.inner.metrics.record_failure();

			return None;
		};
		// Captured once here; re-reading later could pick up a credential rotated by a
		// sibling mid-exchange.
		let attempted = current.refresh.clone();

		match self.execute_exchange(&attempted).await {
			Ok(pair) => {
				self.inner.store.write(pair.clone());
				self.inner.metrics.record_success();

				Some(pair)
			},
			Err(_e) => {
				#[cfg(feature = "tracing")]
				tracing::debug!(error = %_e, "Refresh exchange failed; re-checking the store.");

				match self.inner.store.read() {
					// A sibling rotation already replaced the credential this exchange
					// used; adopt its pair instead of failing spuriously.
					Some(stored) if stored.refresh != attempted => {
						self.inner.metrics.record_success();

						Some(stored)
					},
					_ => {
						self.inner.store.clear();
						self.inner.metrics.record_failure();

						#[cfg(feature = "tracing")]
						tracing::warn!("Refresh credential rejected; clearing stored credentials.");

						None
					},
				}
			},
		}
	}

	async fn execute_exchange(&self, refresh: &Secret) -> Result<CredentialPair> {
		let request = ApiRequest::post(self.inner.descriptor.refresh_path.clone())
			.with_json(&ExchangeRequest { refresh_token: refresh.expose() })?;
		let call = self.inner.descriptor.prepare(&request, None)?;
		let response = self.inner.http_client.execute(call).await?;

		if !response.is_success() {
			return Err(ApiFailure::from_response(
				response.status,
				&response.headers,
				&response.body,
			)
			.into());
		}

		let exchanged: ExchangeResponse = response.json()?;

		Ok(CredentialPair::new(exchanged.access_token, exchanged.refresh_token))
	}
}
impl<C> Clone for RefreshCoordinator<C>
where
	C: ?Sized + ApiHttpClient,
{
	fn clone(&self) -> Self {
		Self { inner: Arc::clone(&self.inner) }
	}
}
impl<C> Debug for RefreshCoordinator<C>
where
	C: ?Sized + ApiHttpClient,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("RefreshCoordinator")
			.field("descriptor", &self.inner.descriptor)
			.field("inflight", &self.inner.inflight.lock().is_some())
			.finish()
	}
}

struct CoordinatorInner<C>
where
	C: ?Sized + ApiHttpClient,
{
	store: Arc<dyn CredentialStore>,
	descriptor: ServiceDescriptor,
	http_client: Arc<C>,
	metrics: RefreshMetrics,
	inflight: Mutex<Option<Arc<RefreshOperation>>>,
}

/// Handle for one in-flight exchange; the settled outcome is memoized behind the gate.
#[derive(Default)]
struct RefreshOperation {
	outcome: AsyncMutex<Option<RefreshOutcome>>,
}

/// Body sent to the refresh exchange endpoint.
#[derive(Debug, Serialize)]
struct ExchangeRequest<'a> {
	refresh_token: &'a str,
}

/// Body returned by a successful exchange.
#[derive(Debug, Deserialize)]
struct ExchangeResponse {
	access_token: String,
	refresh_token: String,
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
		http::{ApiResponse, PreparedCall, TransportFuture},
		store::MemoryStore,
	};

	type Responder = Box<dyn Fn(&PreparedCall) -> Result<ApiResponse, TransportError> + Send + Sync>;

	struct ScriptedTransport {
		calls: AtomicUsize,
		responder: Responder,
	}
	impl ScriptedTransport {
		fn new(
			responder: impl Fn(&PreparedCall) -> Result<ApiResponse, TransportError>
			+ Send
			+ Sync
			+ 'static,
		) -> Arc<Self> {
			Arc::new(Self { calls: AtomicUsize::new(0), responder: Box::new(responder) })
		}

		fn calls(&self) -> usize {
			self.calls.load(Ordering::SeqCst)
		}
	}
	impl ApiHttpClient for ScriptedTransport {
		fn execute(&self, call: PreparedCall) -> TransportFuture<'_, ApiResponse> {
			self.calls.fetch_add(1, Ordering::SeqCst);

			let result = (self.responder)(&call);

			Box::pin(async move {
				// Yield once so a sibling caller can interleave before the response lands.
				tokio::task::yield_now().await;

				result
			})
		}
	}

	fn coordinator(
		store: Arc<MemoryStore>,
		transport: Arc<ScriptedTransport>,
	) -> RefreshCoordinator<ScriptedTransport> {
		RefreshCoordinator::with_http_client(store, test_descriptor(), transport)
	}

	fn pair_response(access: &str, refresh: &str) -> ApiResponse {
		ApiResponse {
			status: StatusCode::OK,
			headers: HeaderMap::new(),
			body: format!(
				"{{\"access_token\":\"{access}\",\"refresh_token\":\"{refresh}\"}}"
			)
			.into_bytes(),
		}
	}

	fn rejection(status: StatusCode) -> ApiResponse {
		ApiResponse { status, headers: HeaderMap::new(), body: b"{}".to_vec() }
	}

	#[tokio::test]
	async fn refresh_is_noop_without_stored_credentials() {
		let transport = ScriptedTransport::new(|_| Ok(rejection(StatusCode::BAD_REQUEST)));
		let coordinator = coordinator(Arc::new(MemoryStore::default()), transport.clone());

		assert!(coordinator.refresh().await.is_none());
		assert_eq!(transport.calls(), 0);
		assert_eq!(coordinator.metrics().attempts(), 1);
		assert_eq!(coordinator.metrics().failures(), 1);
	}

	#[tokio::test]
	async fn refresh_rotates_and_persists_pair() {
		let transport = ScriptedTransport::new(|call| {
			let body = call.body.as_deref().unwrap_or_default();

			assert!(
				std::str::from_utf8(body)
					.expect("Exchange body should be UTF-8.")
					.contains("\"refresh_token\":\"r1\""),
				"Exchange should carry the captured refresh credential.",
			);

			Ok(pair_response("t2", "r2"))
		});
		let store = seeded_store("t1", "r1");
		let coordinator = coordinator(store.clone(), transport.clone());
		let pair = coordinator.refresh().await.expect("Rotation should produce a new pair.");

		assert_eq!(pair.access.expose(), "t2");
		assert_eq!(store.read(), Some(CredentialPair::new("t2", "r2")));
		assert_eq!(transport.calls(), 1);
		assert_eq!(coordinator.metrics().successes(), 1);
	}

	#[tokio::test]
	async fn concurrent_refreshes_share_one_exchange() {
		let transport = ScriptedTransport::new(|_| Ok(pair_response("t2", "r2")));
		let coordinator = coordinator(seeded_store("t1", "r1"), transport.clone());
		let (first, second) = tokio::join!(coordinator.refresh(), coordinator.refresh());

		assert_eq!(first, second);
		assert_eq!(first, Some(CredentialPair::new("t2", "r2")));
		assert_eq!(transport.calls(), 1);
	}

	#[tokio::test]
	async fn failed_exchange_adopts_sibling_rotation() {
		let store = seeded_store("t1", "r1");
		let sibling_store = store.clone();
		let transport = ScriptedTransport::new(move |_| {
			// A sibling client completes its own rotation while this exchange is on the
			// wire, consuming the shared refresh credential.
			sibling_store.write(CredentialPair::new("t2", "r2"));

			Err(TransportError::Io(std::io::Error::other("connection reset")))
		});
		let coordinator = coordinator(store.clone(), transport);
		let outcome = coordinator.refresh().await;

		assert_eq!(outcome, Some(CredentialPair::new("t2", "r2")));
		assert_eq!(store.read(), Some(CredentialPair::new("t2", "r2")));
	}

	#[tokio::test]
	async fn failed_exchange_clears_store_when_unsuperseded() {
		let transport = ScriptedTransport::new(|_| Ok(rejection(StatusCode::BAD_REQUEST)));
		let store = seeded_store("t1", "r1");
		let coordinator = coordinator(store.clone(), transport.clone());

		assert!(coordinator.refresh().await.is_none());
		assert!(store.read().is_none());
		assert_eq!(transport.calls(), 1);
		assert_eq!(coordinator.metrics().failures(), 1);
	}

	#[tokio::test]
	async fn settled_operation_is_cleared_for_future_triggers() {
		let transport = ScriptedTransport::new(|_| Ok(pair_response("t2", "r2")));
		let coordinator = coordinator(seeded_store("t1", "r1"), transport.clone());

		coordinator.refresh().await.expect("First rotation should succeed.");
		coordinator.refresh().await.expect("Second trigger should start a fresh exchange.");

		assert_eq!(transport.calls(), 2);
	}
}
