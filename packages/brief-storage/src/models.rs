use time::OffsetDateTime;
use uuid::Uuid;

use brief_domain::{embedding::SparseVector, preference::UserPreferenceState, scoring::ClusterScore};

#[derive(Debug, sqlx::FromRow)]
pub struct UserPreferencesRow {
	pub user_id: String,
	pub realtime_vector: Vec<f32>,
	pub batched_vector: Vec<f32>,
	pub batch_total_weight: f32,
	pub batch_count: i32,
	pub prev_day_vector: Vec<f32>,
	pub daily_vector: Vec<f32>,
	pub daily_total_weight: f32,
	pub daily_listen_count: i32,
	pub last_daily_fold_at: OffsetDateTime,
}
impl UserPreferencesRow {
	pub fn from_state(user_id: &str, state: &UserPreferenceState) -> Self {
		Self {
			user_id: user_id.to_string(),
			realtime_vector: state.realtime_vector.clone(),
			batched_vector: state.batched_vector.clone(),
			batch_total_weight: state.batch_total_weight,
			batch_count: clamp_count(state.batch_count),
			prev_day_vector: state.prev_day_vector.clone(),
			daily_vector: state.daily_vector.clone(),
			daily_total_weight: state.daily_total_weight,
			daily_listen_count: clamp_count(state.daily_listen_count),
			last_daily_fold_at: state.last_daily_fold_at,
		}
	}

	pub fn into_state(self) -> UserPreferenceState {
		UserPreferenceState {
			realtime_vector: self.realtime_vector,
			batched_vector: self.batched_vector,
			batch_total_weight: self.batch_total_weight,
			batch_count: self.batch_count.max(0) as u32,
			prev_day_vector: self.prev_day_vector,
			daily_vector: self.daily_vector,
			daily_total_weight: self.daily_total_weight,
			daily_listen_count: self.daily_listen_count.max(0) as u32,
			last_daily_fold_at: self.last_daily_fold_at,
		}
	}
}

#[derive(Clone, Debug, PartialEq, sqlx::FromRow)]
pub struct ItemRecord {
	pub item_id: Uuid,
	pub title: String,
	pub link: String,
	pub published_at: OffsetDateTime,
	pub cluster_id: Option<Uuid>,
}

#[derive(Clone, Copy, Debug, PartialEq, sqlx::FromRow)]
pub struct ClusterRecord {
	pub cluster_id: Uuid,
	pub hot: bool,
	pub trending: bool,
	pub hot_score: i32,
	pub trending_score: i32,
	pub hot_at: Option<OffsetDateTime>,
	pub trending_at: Option<OffsetDateTime>,
}
impl ClusterRecord {
	/// Applies a fresh score, stamping `hot_at`/`trending_at` when a flag first turns on.
	pub fn rescored(
		cluster_id: Uuid,
		previous: Option<&Self>,
		score: ClusterScore,
		now: OffsetDateTime,
	) -> Self {
		let hot_at = match (score.hot, previous) {
			(false, _) => None,
			(true, Some(prev)) if prev.hot => prev.hot_at.or(Some(now)),
			(true, _) => Some(now),
		};
		let trending_at = match (score.trending, previous) {
			(false, _) => None,
			(true, Some(prev)) if prev.trending => prev.trending_at.or(Some(now)),
			(true, _) => Some(now),
		};

		Self {
			cluster_id,
			hot: score.hot,
			trending: score.trending,
			hot_score: clamp_count(score.hot_score),
			trending_score: clamp_count(score.trending_score),
			hot_at,
			trending_at,
		}
	}
}

/// One listening-history row as seen by replay counting.
#[derive(Clone, Copy, Debug, PartialEq, sqlx::FromRow)]
pub struct HistoryPlay {
	pub play_count: i32,
	pub hidden: bool,
	pub listened_at: OffsetDateTime,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ListenRecord {
	pub listen_duration_seconds: f32,
	pub stop_position_seconds: f32,
	pub completed: bool,
	pub shared: bool,
	pub downloaded: bool,
	pub added_to_playlist: bool,
	pub rating: Option<i32>,
	pub listened_at: OffsetDateTime,
}

/// Dense nearest-neighbor request.
#[derive(Clone, Debug, Default)]
pub struct DenseSearch {
	pub vector: Vec<f32>,
	pub limit: u32,
	pub exclude: Vec<Uuid>,
	/// When set, only these items are eligible.
	pub restrict_to: Option<Vec<Uuid>>,
	pub min_published_at: Option<OffsetDateTime>,
	/// Minimum cosine similarity, inclusive.
	pub score_threshold: Option<f32>,
}

/// Dense plus sparse request fused with reciprocal rank fusion.
#[derive(Clone, Debug, Default)]
pub struct HybridSearch {
	pub dense: Vec<f32>,
	pub sparse: SparseVector,
	/// Per-branch candidate count.
	pub candidate_limit: u32,
	/// Size of the fused list.
	pub fused_limit: u32,
	pub exclude: Vec<Uuid>,
	pub min_published_at: Option<OffsetDateTime>,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ScoredItem {
	pub item_id: Uuid,
	pub score: f32,
}

fn clamp_count(value: u32) -> i32 {
	i32::try_from(value).unwrap_or(i32::MAX)
}
