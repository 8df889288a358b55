// std
use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe counters for refresh exchanges.
#[derive(Debug, Default)]
pub struct RefreshMetrics {
	attempted: AtomicU64,
	succeeded: AtomicU64,
	failed: AtomicU64,
}
impl RefreshMetrics {
	/// Returns the total number of exchanges driven (joiners of an in-flight exchange are
	/// not counted).
	pub fn attempts(&self) -> u64 {
		self.attempted.load(Ordering::Relaxed)
	}

	/// Returns the number of exchanges that produced a pair, adopted rotations included.
	pub fn successes(&self) -> u64 {
		self.succeeded.load(Ordering::Relaxed)
	}

	/// Returns the number of exchanges that resolved without valid credentials.
	pub fn failures(&self) -> u64 {
		self.failed.load(Ordering::Relaxed)
	}

	pub(crate) fn record_attempt(&self) {
		self.attempted.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_success(&self) {
		self.succeeded.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_failure(&self) {
		self.failed.fetch_add(1, Ordering::Relaxed);
	}
}
