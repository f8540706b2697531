//! Hot and trending clusters.

use ahash::AHashMap;
use time::OffsetDateTime;
use uuid::Uuid;

use brief_domain::scoring::{self, ClusterThresholds};
use brief_storage::models::{ClusterRecord, DenseSearch, ItemRecord};

use crate::{
	BriefService, Result,
	retrieval::{degrade, retrieval_error},
};

impl BriefService {
	pub fn cluster_thresholds(&self) -> ClusterThresholds {
		ClusterThresholds {
			hot_min_score: self.cfg.trending.hot_min_score,
			trending_min_score: self.cfg.trending.trending_min_score,
		}
	}

	/// Clusters the item with its recent near-duplicates and rescores the cluster.
	///
	/// Peers are items published within the trending window whose cosine similarity to
	/// `dense` is strictly above the threshold. The first peer already in a cluster donates
	/// its cluster id; otherwise a new cluster is minted. Returns `None` when no peer was
	/// found, leaving everything unclustered.
	///
	/// Calls are serialized across the service, from the peer search through the assignment.
	pub async fn tag_item(&self, dense: &[f32]) -> Result<Option<ClusterRecord>> {
		let _tagging = self.tagging.lock().await;
		let trending = &self.cfg.trending;
		let now = OffsetDateTime::now_utc();
		let request = DenseSearch {
			vector: dense.to_vec(),
			limit: trending.peer_limit,
			min_published_at: Some(crate::hours_ago(now, trending.window_hours)),
			score_threshold: Some(trending.similarity_threshold),
			..Default::default()
		};
		let hits = self.backends.vectors.search_dense(&request).await?;
		let peer_ids = crate::dedup_ids(
			hits.into_iter()
				.filter(|hit| hit.score > trending.similarity_threshold)
				.map(|hit| hit.item_id),
		);

		if peer_ids.is_empty() {
			return Ok(None);
		}

		let peers: AHashMap<Uuid, ItemRecord> = self
			.backends
			.catalog
			.items_by_ids(&peer_ids)
			.await?
			.into_iter()
			.map(|item| (item.item_id, item))
			.collect();
		let cluster_id = peer_ids
			.iter()
			.find_map(|id| peers.get(id).and_then(|item| item.cluster_id))
			.unwrap_or_else(Uuid::new_v4);
		let previous = self.backends.catalog.get_cluster(cluster_id).await?;
		let score = scoring::score_cluster(
			peers.values().map(|item| item.link.as_str()),
			&trending.authoritative_domains,
			self.cluster_thresholds(),
		);
		let cluster = ClusterRecord::rescored(cluster_id, previous.as_ref(), score, now);
		let member_ids: Vec<Uuid> =
			peer_ids.into_iter().filter(|id| peers.contains_key(id)).collect();

		self.backends.catalog.assign_cluster(&cluster, &member_ids).await?;

		tracing::debug!(
			cluster_id = %cluster_id,
			members = member_ids.len(),
			hot_score = score.hot_score,
			trending_score = score.trending_score,
			"Rescored cluster."
		);

		Ok(Some(cluster))
	}

	/// One representative per hot cluster, hottest first.
	///
	/// Backend failures degrade to an empty list.
	pub async fn hot_items(&self, limit: u32) -> Result<Vec<Uuid>> {
		let since = crate::hours_ago(OffsetDateTime::now_utc(), self.cfg.trending.window_hours);

		self.backends
			.catalog
			.hot_representatives(since, limit)
			.await
			.map_err(retrieval_error)
			.or_else(|err| degrade("hot_items", None, err))
	}

	/// Trending cluster representatives close to the user's realtime vector.
	///
	/// Backend failures degrade to an empty list; an unknown user is
	/// [`crate::Error::NotFound`].
	pub async fn trending_for_user(&self, user_id: &str, limit: u32) -> Result<Vec<Uuid>> {
		crate::require_user_id(user_id)?;

		self.trending_candidates(user_id, limit)
			.await
			.or_else(|err| degrade("trending_for_user", Some(user_id), err))
	}

	/// Hot items followed by the user's trending items, without duplicates.
	pub async fn hot_and_trending(&self, user_id: &str, limit: u32) -> Result<Vec<Uuid>> {
		let hot = self.hot_items(limit).await?;
		let trending = self.trending_for_user(user_id, limit).await?;

		Ok(crate::dedup_ids(hot.into_iter().chain(trending)))
	}

	async fn trending_candidates(&self, user_id: &str, limit: u32) -> Result<Vec<Uuid>> {
		let trending = &self.cfg.trending;
		let since = crate::hours_ago(OffsetDateTime::now_utc(), trending.window_hours);
		let representatives = self
			.backends
			.catalog
			.trending_representatives(since)
			.await
			.map_err(retrieval_error)?;

		if representatives.is_empty() || limit == 0 {
			return Ok(Vec::new());
		}

		let state = self.load_state(user_id).await.map_err(retrieval_error)?;
		let request = DenseSearch {
			vector: state.realtime_vector,
			limit: limit.saturating_mul(2),
			restrict_to: Some(representatives),
			score_threshold: Some(trending.similarity_threshold),
			..Default::default()
		};
		let hits = self.backends.vectors.search_dense(&request).await.map_err(retrieval_error)?;
		let mut ids = crate::dedup_ids(hits.into_iter().map(|hit| hit.item_id));

		ids.truncate(limit as usize);

		Ok(ids)
	}
}
