//! Thread-safe in-memory [`CredentialStore`] for tests, demos, and ephemeral sessions.

// self
use crate::{_prelude::*, session::CredentialPair, store::CredentialStore};

/// Keeps the pair in process memory behind a read-write lock.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore(Arc<RwLock<Option<CredentialPair>>>);
impl MemoryStore {
	/// Creates an empty store.
	pub fn new() -> Self {
		Self::default()
	}

	/// Creates a store pre-populated with a pair, e.g. restored after login.
	pub fn with_pair(pair: CredentialPair) -> Self {
		Self(Arc::new(RwLock::new(Some(pair))))
	}
}
impl CredentialStore for MemoryStore {
	fn read(&self) -> Option<CredentialPair> {
		self.0.read().clone()
	}

	fn write(&self, pair: CredentialPair) {
		*self.0.write() = Some(pair);
	}

	fn clear(&self) {
		*self.0.write() = None;
	}
}
