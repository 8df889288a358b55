//! Arena's authenticated API client - bearer attachment, single-flight credential refresh, and
//! structured failure classification in one crate shared by every surface of the marketplace.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod client;
pub mod error;
pub mod http;
pub mod obs;
pub mod refresh;
pub mod service;
pub mod session;
pub mod store;

#[cfg(any(test, feature = "test"))]
pub mod _preludet {
	//! Convenience re-exports and fixtures for unit and downstream tests; enabled via
	//! `cfg(test)` or the `test` crate feature.

	pub use crate::_prelude::*;

	// self
	use crate::{service::ServiceDescriptor, session::CredentialPair, store::MemoryStore};

	/// Builds the service descriptor used by in-process tests.
	pub fn test_descriptor() -> ServiceDescriptor {
		ServiceDescriptor::builder(
			Url::parse("https://api.arena.test").expect("Test base URL should parse successfully."),
		)
		.build()
		.expect("Test service descriptor should build successfully.")
	}

	/// Builds an in-memory store seeded with the provided credential pair.
	pub fn seeded_store(access: &str, refresh: &str) -> Arc<MemoryStore> {
		Arc::new(MemoryStore::with_pair(CredentialPair::new(access, refresh)))
	}
}

mod _prelude {
	pub use std::{
		collections::BTreeMap,
		error::Error as StdError,
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		pin::Pin,
		sync::Arc,
	};

	pub use async_lock::Mutex as AsyncMutex;
	pub use http::{HeaderMap, Method, StatusCode};
	pub use parking_lot::{Mutex, RwLock};
	#[cfg(feature = "reqwest")]
	pub use reqwest::{Client as ReqwestClient, Error as ReqwestError};
	pub use serde::{Deserialize, Serialize};
	pub use thiserror::Error as ThisError;
	pub use time::{Duration, OffsetDateTime};
	pub use url::Url;

	pub use crate::error::{Error, Result};
}

#[cfg(feature = "reqwest")] pub use reqwest;
pub use url;
#[cfg(test)] use httpmock as _;
