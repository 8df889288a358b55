//! Storage contracts and built-in credential store implementations.

pub mod file;
pub mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

// self
use crate::{_prelude::*, session::CredentialPair};

/// Storage key under which the access credential is persisted.
pub const ACCESS_TOKEN_KEY: &str = "access_token";
/// Storage key under which the refresh credential is persisted.
pub const REFRESH_TOKEN_KEY: &str = "refresh_token";

/// Persistence contract for the session's credential pair.
///
/// The store has no opinion on credential validity, only on presence: it holds either a
/// complete pair or nothing. Reads and writes are synchronous and infallible at this
/// boundary; backends that can fail internally (disk, platform keychains) degrade to
/// "absent" and log instead of surfacing errors.
///
/// During a refresh only the coordinator writes here. The composition root installs a pair
/// after login and clears it on explicit logout; everything else is read-only.
pub trait CredentialStore
where
	Self: Send + Sync,
{
	/// Returns the stored pair, if present.
	fn read(&self) -> Option<CredentialPair>;

	/// Replaces any existing pair atomically; no reader observes a partial update.
	fn write(&self, pair: CredentialPair);

	/// Removes the pair entirely.
	fn clear(&self);
}
