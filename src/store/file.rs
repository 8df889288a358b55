//! JSON-snapshot [`CredentialStore`] that survives application restarts.

// std
use std::{
	fs::{self, File},
	io::Write,
	path::{Path, PathBuf},
};
// self
use crate::{_prelude::*, session::CredentialPair, store::CredentialStore};

/// Persists the credential pair to a JSON file after each mutation.
///
/// Reads are served from an in-memory snapshot loaded eagerly by [`FileStore::open`]. The
/// snapshot is replaced via a temp-file rename so a crash mid-write never leaves a torn
/// pair on disk. A snapshot that is missing, empty, or unparsable degrades to "absent";
/// persistence failures are logged and swallowed so the store honors its infallible
/// contract.
#[derive(Clone, Debug)]
pub struct FileStore {
	path: PathBuf,
	inner: Arc<RwLock<Option<CredentialPair>>>,
}
impl FileStore {
	/// Opens (or creates) a store at the provided path, eagerly loading existing data.
	pub fn open(path: impl Into<PathBuf>) -> Self {
		let path = path.into();
		let snapshot = Self::load_snapshot(&path);

		Self { path, inner: Arc::new(RwLock::new(snapshot)) }
	}

	fn load_snapshot(path: &Path) -> Option<CredentialPair> {
		let bytes = match fs::read(path) {
			Ok(bytes) if !bytes.is_empty() => bytes,
			_ => return None,
		};

		match serde_json::from_slice(&bytes) {
			Ok(pair) => Some(pair),
			Err(_e) => {
				#[cfg(feature = "tracing")]
				tracing::warn!(
					path = %path.display(),
					error = %_e,
					"Discarding unparsable credential snapshot."
				);

				None
			},
		}
	}

	fn persist(&self, contents: &Option<CredentialPair>) {
		if let Err(_e) = self.persist_inner(contents) {
			#[cfg(feature = "tracing")]
			tracing::warn!(
				path = %self.path.display(),
				error = %_e,
				"Failed to persist credential snapshot."
			);
		}
	}

	fn persist_inner(&self, contents: &Option<CredentialPair>) -> std::io::Result<()> {
		if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
			fs::create_dir_all(parent)?;
		}

		match contents {
			Some(pair) => {
				let serialized = serde_json::to_vec_pretty(pair).map_err(std::io::Error::other)?;
				let mut tmp_path = self.path.clone();

				tmp_path.set_extension("tmp");

				{
					let mut file = File::create(&tmp_path)?;

					file.write_all(&serialized)?;
					file.sync_all()?;
				}

				fs::rename(&tmp_path, &self.path)
			},
			None => match fs::remove_file(&self.path) {
				Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e),
				_ => Ok(()),
			},
		}
	}
}
impl CredentialStore for FileStore {
	fn read(&self) -> Option<CredentialPair> {
		self.inner.read().clone()
	}

	fn write(&self, pair: CredentialPair) {
		let mut guard = self.inner.write();

		*guard = Some(pair);
		self.persist(&guard);
	}

	fn clear(&self) {
		let mut guard = self.inner.write();

		*guard = None;
		self.persist(&guard);
	}
}
