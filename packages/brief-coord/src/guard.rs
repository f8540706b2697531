use crate::store::CoordinationStore;

/// Outcome of [`CoordinationStore::run_exclusive`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Claim<T> {
	Ran(T),
	/// Another caller holds the claim; no work was started.
	AlreadyRunning,
}
impl<T> Claim<T> {
	pub fn ran(self) -> Option<T> {
		match self {
			Self::Ran(value) => Some(value),
			Self::AlreadyRunning => None,
		}
	}

	pub fn is_already_running(&self) -> bool {
		matches!(self, Self::AlreadyRunning)
	}
}

/// Dedup membership held for the lifetime of the guard.
///
/// Dropping the guard releases the membership on every exit path, including panics and
/// cancelled futures. A guard whose lease was reclaimed and handed to another caller
/// leaves the new owner's membership untouched.
#[must_use = "the claim is released as soon as the guard is dropped"]
#[derive(Debug)]
pub struct DedupGuard {
	store: CoordinationStore,
	set: String,
	member: String,
	token: u64,
}
impl DedupGuard {
	pub(crate) fn new(store: CoordinationStore, set: &str, member: &str, token: u64) -> Self {
		Self { store, set: set.to_string(), member: member.to_string(), token }
	}

	pub fn set(&self) -> &str {
		&self.set
	}

	pub fn member(&self) -> &str {
		&self.member
	}

	/// Extends the lease. Returns `false` once the membership has been reclaimed.
	pub fn renew(&self) -> bool {
		self.store.renew_claim(&self.set, &self.member, self.token)
	}
}
impl Drop for DedupGuard {
	fn drop(&mut self) {
		if !self.store.release_claim(&self.set, &self.member, self.token) {
			tracing::debug!(
				set = %self.set,
				member = %self.member,
				"Dedup membership was already gone when the guard dropped."
			);
		}
	}
}
