//! In-process backends for tests and single-host deployments without Postgres or Qdrant.
//!
//! Hybrid search fuses the dense and sparse rankings with reciprocal rank fusion using
//! [`RRF_K`].

use std::{
	cmp::Ordering,
	future,
	sync::{Mutex, MutexGuard, PoisonError},
};

use ahash::{AHashMap, AHashSet};
use time::OffsetDateTime;
use uuid::Uuid;

use brief_domain::{
	embedding::{self, Embedding, SparseVector},
	preference::UserPreferenceState,
};
use brief_storage::models::{
	ClusterRecord, DenseSearch, HistoryPlay, HybridSearch, ItemRecord, ListenRecord, ScoredItem,
};

use crate::{BoxFuture, CatalogStore, Error, PreferenceStore, Result, VectorIndex};

pub const RRF_K: f32 = 60.0;

#[derive(Default)]
pub struct MemoryBackend {
	state: Mutex<MemoryState>,
}
impl MemoryBackend {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn item_count(&self) -> usize {
		self.state().items.len()
	}

	pub fn vector_count(&self) -> usize {
		self.state().points.len()
	}

	fn state(&self) -> MutexGuard<'_, MemoryState> {
		self.state.lock().unwrap_or_else(PoisonError::into_inner)
	}
}

#[derive(Default)]
struct MemoryState {
	users: AHashMap<String, UserPreferenceState>,
	history: Vec<HistoryRow>,
	items: AHashMap<Uuid, ItemRecord>,
	clusters: AHashMap<Uuid, ClusterRecord>,
	points: AHashMap<Uuid, Point>,
}
impl MemoryState {
	fn visible_row(&mut self, user_id: &str, item_id: Uuid) -> Option<&mut HistoryRow> {
		self.history
			.iter_mut()
			.find(|row| row.user_id == user_id && row.item_id == item_id && !row.hidden)
	}

	/// Newest member of each cluster matching `flagged`, published at or after `since`.
	fn representatives(
		&self,
		since: OffsetDateTime,
		flagged: impl Fn(&ClusterRecord) -> bool,
	) -> Vec<(&ClusterRecord, &ItemRecord)> {
		let mut newest: AHashMap<Uuid, &ItemRecord> = AHashMap::new();

		for item in self.items.values().filter(|item| item.published_at >= since) {
			let Some(cluster_id) = item.cluster_id else { continue };
			let slot = newest.entry(cluster_id).or_insert(item);

			if item.published_at > slot.published_at {
				*slot = item;
			}
		}

		newest
			.into_iter()
			.filter_map(|(cluster_id, item)| {
				self.clusters.get(&cluster_id).filter(|cluster| flagged(cluster)).map(|c| (c, item))
			})
			.collect()
	}
}

struct HistoryRow {
	user_id: String,
	item_id: Uuid,
	play_count: i32,
	hidden: bool,
	listened_at: OffsetDateTime,
}

struct Point {
	embedding: Embedding,
	published_at: OffsetDateTime,
}

impl PreferenceStore for MemoryBackend {
	fn load_preferences<'a>(
		&'a self,
		user_id: &'a str,
	) -> BoxFuture<'a, Result<Option<UserPreferenceState>>> {
		ready(Ok(self.state().users.get(user_id).cloned()))
	}

	fn create_preferences<'a>(
		&'a self,
		user_id: &'a str,
		state: &'a UserPreferenceState,
	) -> BoxFuture<'a, Result<bool>> {
		let mut guard = self.state();

		if guard.users.contains_key(user_id) {
			return ready(Ok(false));
		}

		guard.users.insert(user_id.to_string(), state.clone());

		ready(Ok(true))
	}

	fn save_preferences<'a>(
		&'a self,
		user_id: &'a str,
		state: &'a UserPreferenceState,
	) -> BoxFuture<'a, Result<()>> {
		let result = match self.state().users.get_mut(user_id) {
			Some(slot) => {
				*slot = state.clone();

				Ok(())
			},
			None => Err(Error::NotFound { message: format!("User {user_id} does not exist.") }),
		};

		ready(result)
	}

	fn list_user_ids(&self) -> BoxFuture<'_, Result<Vec<String>>> {
		let mut ids: Vec<String> = self.state().users.keys().cloned().collect();

		ids.sort();

		ready(Ok(ids))
	}

	fn history_item_ids<'a>(&'a self, user_id: &'a str) -> BoxFuture<'a, Result<Vec<Uuid>>> {
		let guard = self.state();
		let ids = crate::dedup_ids(
			guard.history.iter().filter(|row| row.user_id == user_id).map(|row| row.item_id),
		);

		ready(Ok(ids))
	}

	fn history_plays<'a>(
		&'a self,
		user_id: &'a str,
		item_id: Uuid,
	) -> BoxFuture<'a, Result<Vec<HistoryPlay>>> {
		let guard = self.state();
		let mut plays: Vec<HistoryPlay> = guard
			.history
			.iter()
			.filter(|row| row.user_id == user_id && row.item_id == item_id)
			.map(|row| HistoryPlay {
				play_count: row.play_count,
				hidden: row.hidden,
				listened_at: row.listened_at,
			})
			.collect();

		plays.sort_by(|a, b| b.listened_at.cmp(&a.listened_at));

		ready(Ok(plays))
	}

	fn record_listen<'a>(
		&'a self,
		user_id: &'a str,
		item_id: Uuid,
		listen: &'a ListenRecord,
	) -> BoxFuture<'a, Result<()>> {
		let mut guard = self.state();

		match guard.visible_row(user_id, item_id) {
			Some(row) => {
				row.play_count += 1;
				row.listened_at = listen.listened_at;
			},
			None => guard.history.push(HistoryRow {
				user_id: user_id.to_string(),
				item_id,
				play_count: 1,
				hidden: false,
				listened_at: listen.listened_at,
			}),
		}

		ready(Ok(()))
	}

	fn hide_item<'a>(&'a self, user_id: &'a str, item_id: Uuid) -> BoxFuture<'a, Result<bool>> {
		let mut guard = self.state();
		let hidden = match guard.visible_row(user_id, item_id) {
			Some(row) => {
				row.hidden = true;

				true
			},
			None => false,
		};

		ready(Ok(hidden))
	}
}

impl CatalogStore for MemoryBackend {
	fn item_by_link<'a>(&'a self, link: &'a str) -> BoxFuture<'a, Result<Option<ItemRecord>>> {
		let item = self.state().items.values().find(|item| item.link == link).cloned();

		ready(Ok(item))
	}

	fn items_by_ids<'a>(&'a self, item_ids: &'a [Uuid]) -> BoxFuture<'a, Result<Vec<ItemRecord>>> {
		let guard = self.state();
		let items = item_ids.iter().filter_map(|id| guard.items.get(id).cloned()).collect();

		ready(Ok(items))
	}

	fn insert_item<'a>(&'a self, item: &'a ItemRecord) -> BoxFuture<'a, Result<()>> {
		let mut guard = self.state();

		if guard.items.values().any(|existing| existing.link == item.link) {
			return ready(Err(Error::InvalidRequest {
				message: format!("An item with link {} already exists.", item.link),
			}));
		}

		guard.items.insert(item.item_id, item.clone());

		ready(Ok(()))
	}

	fn get_cluster(&self, cluster_id: Uuid) -> BoxFuture<'_, Result<Option<ClusterRecord>>> {
		ready(Ok(self.state().clusters.get(&cluster_id).copied()))
	}

	fn assign_cluster<'a>(
		&'a self,
		cluster: &'a ClusterRecord,
		item_ids: &'a [Uuid],
	) -> BoxFuture<'a, Result<()>> {
		let mut guard = self.state();

		guard.clusters.insert(cluster.cluster_id, *cluster);

		for item_id in item_ids {
			if let Some(item) = guard.items.get_mut(item_id) {
				item.cluster_id = Some(cluster.cluster_id);
			}
		}

		ready(Ok(()))
	}

	fn hot_representatives(
		&self,
		since: OffsetDateTime,
		limit: u32,
	) -> BoxFuture<'_, Result<Vec<Uuid>>> {
		let guard = self.state();
		let mut reps = guard.representatives(since, |cluster| cluster.hot);

		reps.sort_by(|(a, a_item), (b, b_item)| {
			b.hot_score
				.cmp(&a.hot_score)
				.then_with(|| b.hot_at.cmp(&a.hot_at))
				.then_with(|| b_item.published_at.cmp(&a_item.published_at))
		});

		let ids = reps.into_iter().take(limit as usize).map(|(_, item)| item.item_id).collect();

		ready(Ok(ids))
	}

	fn trending_representatives(&self, since: OffsetDateTime) -> BoxFuture<'_, Result<Vec<Uuid>>> {
		let guard = self.state();
		let mut reps = guard.representatives(since, |cluster| cluster.trending);

		reps.sort_by(|(a, a_item), (b, b_item)| {
			b.trending_score
				.cmp(&a.trending_score)
				.then_with(|| b.trending_at.cmp(&a.trending_at))
				.then_with(|| b_item.published_at.cmp(&a_item.published_at))
		});

		ready(Ok(reps.into_iter().map(|(_, item)| item.item_id).collect()))
	}

	fn expired_item_ids(
		&self,
		published_before: OffsetDateTime,
	) -> BoxFuture<'_, Result<Vec<Uuid>>> {
		let ids = self
			.state()
			.items
			.values()
			.filter(|item| item.published_at < published_before)
			.map(|item| item.item_id)
			.collect();

		ready(Ok(ids))
	}

	fn delete_items<'a>(&'a self, item_ids: &'a [Uuid]) -> BoxFuture<'a, Result<u64>> {
		let mut guard = self.state();
		let deleted = item_ids.iter().filter(|id| guard.items.remove(*id).is_some()).count() as u64;
		let live: AHashSet<Uuid> = guard.items.values().filter_map(|item| item.cluster_id).collect();

		guard.clusters.retain(|cluster_id, _| live.contains(cluster_id));

		ready(Ok(deleted))
	}
}

impl VectorIndex for MemoryBackend {
	fn upsert_item<'a>(
		&'a self,
		item_id: Uuid,
		embedding: &'a Embedding,
		published_at: OffsetDateTime,
	) -> BoxFuture<'a, Result<()>> {
		self.state().points.insert(item_id, Point { embedding: embedding.clone(), published_at });

		ready(Ok(()))
	}

	fn dense_vector(&self, item_id: Uuid) -> BoxFuture<'_, Result<Option<Vec<f32>>>> {
		ready(Ok(self.state().points.get(&item_id).map(|point| point.embedding.dense.clone())))
	}

	fn search_dense<'a>(
		&'a self,
		request: &'a DenseSearch,
	) -> BoxFuture<'a, Result<Vec<ScoredItem>>> {
		let guard = self.state();
		let filter = Filter {
			exclude: &request.exclude,
			restrict_to: request.restrict_to.as_deref(),
			min_published_at: request.min_published_at,
		};
		let mut scored = rank_dense(&guard.points, &request.vector, &filter);

		if let Some(threshold) = request.score_threshold {
			scored.retain(|item| item.score >= threshold);
		}

		scored.truncate(request.limit as usize);

		ready(Ok(scored))
	}

	fn search_hybrid<'a>(
		&'a self,
		request: &'a HybridSearch,
	) -> BoxFuture<'a, Result<Vec<ScoredItem>>> {
		let guard = self.state();
		let filter = Filter {
			exclude: &request.exclude,
			restrict_to: None,
			min_published_at: request.min_published_at,
		};
		let candidates = request.candidate_limit as usize;
		let mut dense = rank_dense(&guard.points, &request.dense, &filter);

		dense.truncate(candidates);

		let mut sparse = rank_sparse(&guard.points, &request.sparse, &filter);

		sparse.truncate(candidates);

		let mut fused = reciprocal_rank_fusion(&[dense, sparse]);

		fused.truncate(request.fused_limit as usize);

		ready(Ok(fused))
	}

	fn delete_items<'a>(&'a self, item_ids: &'a [Uuid]) -> BoxFuture<'a, Result<()>> {
		let mut guard = self.state();

		for item_id in item_ids {
			guard.points.remove(item_id);
		}

		ready(Ok(()))
	}
}

struct Filter<'a> {
	exclude: &'a [Uuid],
	restrict_to: Option<&'a [Uuid]>,
	min_published_at: Option<OffsetDateTime>,
}
impl Filter<'_> {
	fn admits(&self, item_id: &Uuid, point: &Point) -> bool {
		!self.exclude.contains(item_id)
			&& self.restrict_to.is_none_or(|allowed| allowed.contains(item_id))
			&& self.min_published_at.is_none_or(|cutoff| point.published_at >= cutoff)
	}
}

/// Sums `1 / (RRF_K + rank)` across rankings, ranks starting at 1.
pub fn reciprocal_rank_fusion(rankings: &[Vec<ScoredItem>]) -> Vec<ScoredItem> {
	let mut fused: AHashMap<Uuid, f32> = AHashMap::new();

	for ranking in rankings {
		for (rank, item) in ranking.iter().enumerate() {
			*fused.entry(item.item_id).or_default() += 1.0 / (RRF_K + rank as f32 + 1.0);
		}
	}

	sorted(fused.into_iter().map(|(item_id, score)| ScoredItem { item_id, score }).collect())
}

fn rank_dense(
	points: &AHashMap<Uuid, Point>,
	query: &[f32],
	filter: &Filter<'_>,
) -> Vec<ScoredItem> {
	sorted(
		points
			.iter()
			.filter(|(id, point)| filter.admits(id, point))
			.map(|(id, point)| ScoredItem {
				item_id: *id,
				score: embedding::cosine(query, &point.embedding.dense),
			})
			.collect(),
	)
}

fn rank_sparse(
	points: &AHashMap<Uuid, Point>,
	query: &SparseVector,
	filter: &Filter<'_>,
) -> Vec<ScoredItem> {
	if query.is_empty() {
		return Vec::new();
	}

	sorted(
		points
			.iter()
			.filter(|(id, point)| filter.admits(id, point))
			.map(|(id, point)| ScoredItem { item_id: *id, score: query.dot(&point.embedding.sparse) })
			.filter(|item| item.score > 0.0)
			.collect(),
	)
}

/// Highest score first; ties broken by id so results are stable.
fn sorted(mut items: Vec<ScoredItem>) -> Vec<ScoredItem> {
	items.sort_by(|a, b| {
		b.score
			.partial_cmp(&a.score)
			.unwrap_or(Ordering::Equal)
			.then_with(|| a.item_id.cmp(&b.item_id))
	});

	items
}

fn ready<'a, T>(value: T) -> BoxFuture<'a, T>
where
	T: Send + 'a,
{
	Box::pin(future::ready(value))
}

#[cfg(test)]
mod tests {
	use super::*;

	fn scored(ids: &[Uuid]) -> Vec<ScoredItem> {
		ids.iter().map(|id| ScoredItem { item_id: *id, score: 1.0 }).collect()
	}

	#[test]
	fn fusion_rewards_items_ranked_by_both_lists() {
		let (a, b, c) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
		let fused = reciprocal_rank_fusion(&[scored(&[a, b]), scored(&[c, b])]);

		assert_eq!(fused[0].item_id, b);
		assert_eq!(fused.len(), 3);
		assert!((fused[0].score - (1.0 / 62.0 + 1.0 / 62.0)).abs() < 1e-6);
	}

	#[test]
	fn fusion_of_nothing_is_empty() {
		assert!(reciprocal_rank_fusion(&[Vec::new(), Vec::new()]).is_empty());
	}
}
