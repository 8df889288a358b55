//! The atomically replaced access + refresh credential pair.

// self
use crate::{_prelude::*, session::Secret};

/// Access and refresh credentials issued together and replaced together.
///
/// Both fields are mandatory, so a store can only ever hold a complete pair; no reader can
/// observe an access credential without its refresh sibling. The serde field names double as
/// the persisted storage keys.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialPair {
	/// Short-lived credential presented on each protected request.
	#[serde(rename = "access_token")]
	pub access: Secret,
	/// Longer-lived, single-use credential exchanged for a new pair.
	#[serde(rename = "refresh_token")]
	pub refresh: Secret,
}
impl CredentialPair {
	/// Builds a pair from raw credential strings.
	pub fn new(access: impl Into<String>, refresh: impl Into<String>) -> Self {
		Self { access: Secret::new(access), refresh: Secret::new(refresh) }
	}
}
