use time::{Duration, OffsetDateTime};

use crate::decay;

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum PreferenceError {
	#[error("Embedding dimension {actual} does not match preference dimension {expected}.")]
	DimensionMismatch { expected: usize, actual: usize },
	#[error("Interaction weight must be finite, got {0}.")]
	NonFiniteWeight(f32),
}

/// Thresholds and mixing ratios for the two fold timescales.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FoldPolicy {
	pub batch_size: u32,
	pub realtime_mix: f32,
	pub daily_mix: f32,
	pub daily_fold_interval: Duration,
}
impl Default for FoldPolicy {
	fn default() -> Self {
		Self {
			batch_size: 10,
			realtime_mix: 0.1,
			daily_mix: 0.2,
			daily_fold_interval: Duration::hours(24),
		}
	}
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct RecordOutcome {
	pub batch_count: u32,
	pub batch_folded: bool,
	pub daily_folded: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub struct UserPreferenceState {
	pub realtime_vector: Vec<f32>,
	pub batched_vector: Vec<f32>,
	pub batch_total_weight: f32,
	pub batch_count: u32,
	pub prev_day_vector: Vec<f32>,
	pub daily_vector: Vec<f32>,
	pub daily_total_weight: f32,
	pub daily_listen_count: u32,
	pub last_daily_fold_at: OffsetDateTime,
}
impl UserPreferenceState {
	/// Seeds both authoritative vectors from the initial preference vector.
	pub fn new(initial: Vec<f32>, now: OffsetDateTime) -> Self {
		let dim = initial.len();
		let initial =
			if initial.iter().all(|value| value.is_finite()) { initial } else { vec![0.0; dim] };

		Self {
			realtime_vector: initial.clone(),
			batched_vector: vec![0.0; dim],
			batch_total_weight: 0.0,
			batch_count: 0,
			prev_day_vector: initial,
			daily_vector: vec![0.0; dim],
			daily_total_weight: 0.0,
			daily_listen_count: 0,
			last_daily_fold_at: now,
		}
	}

	pub fn dimension(&self) -> usize {
		self.realtime_vector.len()
	}

	/// Adds a weighted embedding to the batch accumulator and returns the new batch count.
	pub fn accumulate_batch(
		&mut self,
		embedding: &[f32],
		weight: f32,
	) -> Result<u32, PreferenceError> {
		self.check(embedding, weight)?;

		self.batched_vector = decay::add_scaled(&self.batched_vector, embedding, weight);
		self.batch_total_weight += weight;
		self.batch_count += 1;

		Ok(self.batch_count)
	}

	pub fn fold_batch(&mut self, ratio: f32) {
		self.realtime_vector =
			decay::fold(&self.realtime_vector, &self.batched_vector, self.batch_total_weight, ratio);
		self.batched_vector = vec![0.0; self.dimension()];
		self.batch_total_weight = 0.0;
		self.batch_count = 0;
	}

	/// Adds a weighted embedding to the daily accumulator and returns the new listen count.
	pub fn accumulate_daily(
		&mut self,
		embedding: &[f32],
		weight: f32,
	) -> Result<u32, PreferenceError> {
		self.check(embedding, weight)?;

		self.daily_vector = decay::add_scaled(&self.daily_vector, embedding, weight);
		self.daily_total_weight += weight;
		self.daily_listen_count += 1;

		Ok(self.daily_listen_count)
	}

	pub fn fold_daily(&mut self, ratio: f32, now: OffsetDateTime) {
		self.prev_day_vector =
			decay::fold(&self.prev_day_vector, &self.daily_vector, self.daily_total_weight, ratio);
		self.daily_vector = vec![0.0; self.dimension()];
		self.daily_total_weight = 0.0;
		self.daily_listen_count = 0;
		self.last_daily_fold_at = now;
	}

	pub fn daily_fold_due(&self, now: OffsetDateTime, interval: Duration) -> bool {
		now - self.last_daily_fold_at > interval
	}

	/// Applies one weighted interaction to both timescales, folding each accumulator
	/// when its trigger is reached.
	pub fn record(
		&mut self,
		embedding: &[f32],
		weight: f32,
		policy: &FoldPolicy,
		now: OffsetDateTime,
	) -> Result<RecordOutcome, PreferenceError> {
		self.check(embedding, weight)?;

		let batch_count = self.accumulate_batch(embedding, weight)?;
		let batch_folded = batch_count >= policy.batch_size;

		if batch_folded {
			self.fold_batch(policy.realtime_mix);
		}

		self.accumulate_daily(embedding, weight)?;

		let daily_folded = self.daily_fold_due(now, policy.daily_fold_interval);

		if daily_folded {
			self.fold_daily(policy.daily_mix, now);
		}

		Ok(RecordOutcome { batch_count, batch_folded, daily_folded })
	}

	fn check(&self, embedding: &[f32], weight: f32) -> Result<(), PreferenceError> {
		if embedding.len() != self.dimension() {
			return Err(PreferenceError::DimensionMismatch {
				expected: self.dimension(),
				actual: embedding.len(),
			});
		}
		if !weight.is_finite() {
			return Err(PreferenceError::NonFiniteWeight(weight));
		}

		Ok(())
	}
}
