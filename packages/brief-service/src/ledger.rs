//! Preference ledger: per-user serialized read-modify-write over [`UserPreferenceState`].

use std::sync::{Arc, Mutex, PoisonError};

use ahash::AHashMap;
use time::{Duration, OffsetDateTime};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use brief_domain::preference::{FoldPolicy, RecordOutcome, UserPreferenceState};

use crate::{BriefService, Error, Result};

const MIN_PRUNE_AT: usize = 1_024;

/// One async mutex per user id.
///
/// Entries nobody holds or waits on are pruned once the table doubles past its last
/// pruned size.
pub(crate) struct UserLocks {
	table: Mutex<LockTable>,
}
impl UserLocks {
	fn with_min_prune_at(min_prune_at: usize) -> Self {
		Self {
			table: Mutex::new(LockTable {
				locks: AHashMap::new(),
				prune_at: min_prune_at,
				min_prune_at,
			}),
		}
	}

	pub(crate) async fn lock(&self, user_id: &str) -> OwnedMutexGuard<()> {
		let lock = {
			let mut table = self.table.lock().unwrap_or_else(PoisonError::into_inner);

			table.prune();
			table.locks.entry(user_id.to_string()).or_default().clone()
		};

		lock.lock_owned().await
	}

	#[cfg(test)]
	fn len(&self) -> usize {
		self.table.lock().unwrap_or_else(PoisonError::into_inner).locks.len()
	}
}
impl Default for UserLocks {
	fn default() -> Self {
		Self::with_min_prune_at(MIN_PRUNE_AT)
	}
}

struct LockTable {
	locks: AHashMap<String, Arc<AsyncMutex<()>>>,
	prune_at: usize,
	min_prune_at: usize,
}
impl LockTable {
	fn prune(&mut self) {
		if self.locks.len() < self.prune_at {
			return;
		}

		// The table holds one reference; any other is a guard or a waiter.
		self.locks.retain(|_, lock| Arc::strong_count(lock) > 1);
		self.prune_at = self.locks.len().saturating_mul(2).max(self.min_prune_at);
	}
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FoldReport {
	pub folded: usize,
	pub failed: Vec<String>,
}

impl BriefService {
	pub fn fold_policy(&self) -> FoldPolicy {
		let preference = &self.cfg.preference;

		FoldPolicy {
			batch_size: preference.batch_size,
			realtime_mix: preference.realtime_mix,
			daily_mix: preference.daily_mix,
			daily_fold_interval: Duration::hours(i64::from(preference.daily_fold_interval_hours)),
		}
	}

	/// Creates the user's preference state seeded from `initial`. Returns `false` when the
	/// user already exists; the stored state is left untouched.
	pub async fn ensure_user(&self, user_id: &str, initial: Vec<f32>) -> Result<bool> {
		crate::require_user_id(user_id)?;

		if initial.len() != self.vector_dim() {
			return Err(Error::InvalidRequest {
				message: format!(
					"Initial preference vector has dimension {}, expected {}.",
					initial.len(),
					self.vector_dim()
				),
			});
		}
		if initial.iter().any(|value| !value.is_finite()) {
			return Err(Error::InvalidRequest {
				message: "Initial preference vector must be finite.".to_string(),
			});
		}

		let _guard = self.locks.lock(user_id).await;
		let state = UserPreferenceState::new(initial, OffsetDateTime::now_utc());
		let created = self.backends.preferences.create_preferences(user_id, &state).await?;

		if created {
			tracing::info!(user_id = %user_id, "Created user preference state.");
		}

		Ok(created)
	}

	pub async fn preferences(&self, user_id: &str) -> Result<Option<UserPreferenceState>> {
		self.backends.preferences.load_preferences(user_id).await
	}

	/// Applies one weighted embedding to both timescales under the user's lock.
	pub async fn record_interaction(
		&self,
		user_id: &str,
		embedding: &[f32],
		weight: f32,
	) -> Result<RecordOutcome> {
		let _guard = self.locks.lock(user_id).await;

		self.record_locked(user_id, embedding, weight).await
	}

	/// Folds the daily accumulator into `prev_day_vector` regardless of elapsed time.
	pub async fn fold_daily(&self, user_id: &str) -> Result<()> {
		let _guard = self.locks.lock(user_id).await;
		let mut state = self.load_state(user_id).await?;

		state.fold_daily(self.cfg.preference.daily_mix, OffsetDateTime::now_utc());
		self.backends.preferences.save_preferences(user_id, &state).await?;

		tracing::debug!(user_id = %user_id, "Folded daily preferences.");

		Ok(())
	}

	/// Runs [`Self::fold_daily`] for every user. A failing user is logged and skipped.
	pub async fn fold_daily_all(&self) -> Result<FoldReport> {
		let mut report = FoldReport::default();

		for user_id in self.backends.preferences.list_user_ids().await? {
			match self.fold_daily(&user_id).await {
				Ok(()) => report.folded += 1,
				Err(err) => {
					tracing::error!(user_id = %user_id, error = %err, "Failed to fold daily preferences.");

					report.failed.push(user_id);
				},
			}
		}

		Ok(report)
	}

	pub(crate) async fn lock_user(&self, user_id: &str) -> OwnedMutexGuard<()> {
		self.locks.lock(user_id).await
	}

	/// Caller must hold the user's lock.
	pub(crate) async fn record_locked(
		&self,
		user_id: &str,
		embedding: &[f32],
		weight: f32,
	) -> Result<RecordOutcome> {
		let mut state = self.load_state(user_id).await?;
		let outcome =
			state.record(embedding, weight, &self.fold_policy(), OffsetDateTime::now_utc())?;

		self.backends.preferences.save_preferences(user_id, &state).await?;

		if outcome.batch_folded {
			tracing::debug!(user_id = %user_id, "Folded batch preferences into realtime vector.");
		}
		if outcome.daily_folded {
			tracing::debug!(user_id = %user_id, "Folded daily preferences into previous-day vector.");
		}

		Ok(outcome)
	}

	pub(crate) async fn load_state(&self, user_id: &str) -> Result<UserPreferenceState> {
		self.backends
			.preferences
			.load_preferences(user_id)
			.await?
			.ok_or_else(|| Error::NotFound { message: format!("User {user_id} does not exist.") })
	}
}
