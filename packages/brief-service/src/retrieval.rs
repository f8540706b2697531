//! Hybrid retrieval and the read paths built on it.

use time::OffsetDateTime;
use uuid::Uuid;

use brief_coord::Claim;
use brief_domain::embedding::Embedding;
use brief_storage::models::{DenseSearch, HybridSearch};

use crate::{BriefService, Error, Result};

pub const DAILY_NEWS_SET: &str = "daily_news";

impl BriefService {
	/// Dense nearest neighbors, excluding `exclude` and anything published before
	/// `min_published_at`. Backend failures surface as [`Error::Retrieval`].
	pub async fn search_dense(
		&self,
		vector: &[f32],
		limit: u32,
		exclude: &[Uuid],
		min_published_at: Option<OffsetDateTime>,
	) -> Result<Vec<Uuid>> {
		if limit == 0 {
			return Ok(Vec::new());
		}

		let request = DenseSearch {
			vector: vector.to_vec(),
			limit,
			exclude: exclude.to_vec(),
			min_published_at,
			..Default::default()
		};
		let hits = self.backends.vectors.search_dense(&request).await.map_err(retrieval_error)?;
		let mut ids = crate::dedup_ids(hits.into_iter().map(|hit| hit.item_id));

		ids.truncate(limit as usize);

		Ok(ids)
	}

	/// Dense plus sparse search over the embedded query, fused by reciprocal rank from a
	/// pool of `2 * limit` candidates.
	pub async fn search_hybrid(
		&self,
		query: &str,
		limit: u32,
		exclude: &[Uuid],
		min_published_at: Option<OffsetDateTime>,
	) -> Result<Vec<Uuid>> {
		if limit == 0 {
			return Ok(Vec::new());
		}

		let embedding = self.embed_query(query).await.map_err(retrieval_error)?;
		let request = HybridSearch {
			dense: embedding.dense,
			sparse: embedding.sparse,
			candidate_limit: limit,
			fused_limit: limit.saturating_mul(2),
			exclude: exclude.to_vec(),
			min_published_at,
		};
		let hits = self.backends.vectors.search_hybrid(&request).await.map_err(retrieval_error)?;
		let mut ids = crate::dedup_ids(hits.into_iter().map(|hit| hit.item_id));

		ids.truncate(limit as usize);

		Ok(ids)
	}

	/// Recent items near `seed_item`, or near the user's realtime vector when no seed is
	/// given or the seed has no embedding. Items already in the user's history are skipped.
	///
	/// Backend failures degrade to an empty list; an unknown user is [`Error::NotFound`].
	pub async fn recommend(&self, user_id: &str, seed_item: Option<Uuid>) -> Result<Vec<Uuid>> {
		crate::require_user_id(user_id)?;

		self.recommend_candidates(user_id, seed_item)
			.await
			.or_else(|err| degrade("recommend", Some(user_id), err))
	}

	/// Hybrid search for the user, then folds the query into their preferences.
	pub async fn search(&self, user_id: &str, query: &str) -> Result<Vec<Uuid>> {
		crate::require_user_id(user_id)?;

		let ids = self
			.search_hybrid(query, self.cfg.retrieval.search_limit, &[], None)
			.await
			.or_else(|err| degrade("search", Some(user_id), err))?;

		if let Err(err) = self.log_search(user_id, query).await {
			tracing::warn!(user_id = %user_id, error = %err, "Failed to log search.");
		}

		Ok(ids)
	}

	/// Candidate items for the user's daily digest, ranked against `prev_day_vector`.
	///
	/// Concurrent calls for the same user collapse: all but one observe
	/// [`Claim::AlreadyRunning`].
	pub async fn daily_digest_candidates(
		&self,
		user_id: &str,
		limit: u32,
	) -> Result<Claim<Vec<Uuid>>> {
		crate::require_user_id(user_id)?;

		let claim = self
			.coord
			.run_exclusive(DAILY_NEWS_SET, user_id, async {
				let state = self.load_state(user_id).await?;
				let history = self.backends.preferences.history_item_ids(user_id).await?;
				let retrieval = &self.cfg.retrieval;
				let since =
					crate::hours_ago(OffsetDateTime::now_utc(), retrieval.digest_window_hours);
				let pool = limit.saturating_mul(retrieval.digest_candidate_multiplier);

				self.search_dense(&state.prev_day_vector, pool, &history, Some(since)).await
			})
			.await;

		crate::transpose_claim(claim)
	}

	async fn recommend_candidates(
		&self,
		user_id: &str,
		seed_item: Option<Uuid>,
	) -> Result<Vec<Uuid>> {
		let seed = match seed_item {
			Some(item_id) =>
				self.backends.vectors.dense_vector(item_id).await.map_err(retrieval_error)?,
			None => None,
		};
		let vector = match seed {
			Some(vector) => vector,
			None => self.load_state(user_id).await.map_err(retrieval_error)?.realtime_vector,
		};
		let history =
			self.backends.preferences.history_item_ids(user_id).await.map_err(retrieval_error)?;
		let retrieval = &self.cfg.retrieval;
		let since = crate::hours_ago(OffsetDateTime::now_utc(), retrieval.recommend_window_hours);

		self.search_dense(&vector, retrieval.recommend_limit, &history, Some(since)).await
	}

	pub(crate) async fn embed_query(&self, query: &str) -> Result<Embedding> {
		if query.trim().is_empty() {
			return Err(Error::InvalidRequest { message: "query must be non-empty.".to_string() });
		}

		self.embed_cached(query).await
	}
}

/// Wraps backend and provider failures as [`Error::Retrieval`]; caller mistakes pass through.
pub(crate) fn retrieval_error(err: Error) -> Error {
	match err {
		Error::InvalidRequest { .. } | Error::NotFound { .. } | Error::Retrieval { .. } => err,
		other => Error::Retrieval { message: other.to_string() },
	}
}

pub(crate) fn degrade(operation: &str, user_id: Option<&str>, err: Error) -> Result<Vec<Uuid>> {
	match err {
		Error::Retrieval { message } => {
			tracing::warn!(
				user_id = user_id.unwrap_or_default(),
				operation,
				error = %message,
				"Retrieval failed; returning no items."
			);

			Ok(Vec::new())
		},
		other => Err(other),
	}
}
