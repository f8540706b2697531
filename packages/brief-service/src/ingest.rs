use std::time::Duration as StdDuration;

use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use brief_coord::Claim;
use brief_domain::embedding::Embedding;
use brief_providers::embedding;
use brief_storage::models::{ClusterRecord, ItemRecord};

use crate::{BriefService, Error, Result};

pub const INGEST_SET: &str = "ingest";
pub const EMBED_SET: &str = "embed";

const EMBED_WAIT_POLL_MS: u64 = 10;

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct NewItem {
	pub title: String,
	pub link: String,
	pub published_at: OffsetDateTime,
	/// Body text embedded alongside the title.
	#[serde(default)]
	pub summary: Option<String>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct IngestedItem {
	pub item: ItemRecord,
	/// `false` when an item with the same link already existed.
	pub created: bool,
	pub cluster: Option<ClusterRecord>,
}

impl BriefService {
	/// Stores a new item, indexes its embedding, and tags it for hot/trending clusters.
	///
	/// Ingestion is dedup-guarded by link: a concurrent ingest of the same link observes
	/// [`Claim::AlreadyRunning`].
	pub async fn ingest_item(&self, new_item: &NewItem) -> Result<Claim<IngestedItem>> {
		let link = new_item.link.trim();

		if link.is_empty() {
			return Err(Error::InvalidRequest { message: "link must be non-empty.".to_string() });
		}
		if new_item.title.trim().is_empty() {
			return Err(Error::InvalidRequest { message: "title must be non-empty.".to_string() });
		}

		let claim =
			self.coord.run_exclusive(INGEST_SET, link, self.ingest_claimed(new_item, link)).await;

		crate::transpose_claim(claim)
	}

	/// Deletes items published before the expiry horizon from both stores.
	pub async fn purge_expired(&self) -> Result<u64> {
		let horizon = OffsetDateTime::now_utc()
			- Duration::days(i64::from(self.cfg.lifecycle.item_expire_days));
		let expired = self.backends.catalog.expired_item_ids(horizon).await?;

		if expired.is_empty() {
			return Ok(0);
		}

		self.backends.vectors.delete_items(&expired).await?;

		let deleted = self.backends.catalog.delete_items(&expired).await?;

		tracing::info!(deleted, "Purged expired items.");

		Ok(deleted)
	}

	/// Embeds `text`, reusing a cached embedding from the coordination store when present.
	///
	/// Concurrent calls for the same text collapse into one provider call: the caller that
	/// claims the text on [`EMBED_SET`] embeds it, the others wait for its cache entry.
	pub async fn embed_cached(&self, text: &str) -> Result<Embedding> {
		let key = embedding::cache_key(&self.cfg.providers.embedding, text);

		loop {
			if let Some(cached) = self.cached_embedding(&key) {
				return Ok(cached);
			}

			if let Some(_guard) = self.coord.try_claim(EMBED_SET, &key) {
				// The previous owner may have filled the cache between the lookup and the claim.
				if let Some(cached) = self.cached_embedding(&key) {
					return Ok(cached);
				}

				return self.embed_uncached(text, &key).await;
			}

			tokio::time::sleep(StdDuration::from_millis(EMBED_WAIT_POLL_MS)).await;
		}
	}

	fn cached_embedding(&self, key: &str) -> Option<Embedding> {
		match self.coord.get_as::<Embedding>(key) {
			Ok(cached) => cached,
			Err(err) => {
				tracing::warn!(key = %key, error = %err, "Discarding unreadable cached embedding.");

				None
			},
		}
	}

	async fn embed_uncached(&self, text: &str, key: &str) -> Result<Embedding> {
		let texts = [text.to_string()];
		let embedding = self
			.providers
			.embedding
			.embed(&self.cfg.providers.embedding, &texts)
			.await?
			.into_iter()
			.next()
			.ok_or_else(|| Error::Provider {
				message: "Embedding provider returned no vectors.".to_string(),
			})?;

		if embedding.dense.len() != self.vector_dim() {
			return Err(Error::Provider {
				message: format!(
					"Embedding dimension {} does not match the configured {}.",
					embedding.dense.len(),
					self.vector_dim()
				),
			});
		}

		let ttl = StdDuration::from_secs(self.cfg.coordination.embedding_cache_ttl_seconds);

		self.coord.set_as(key, &embedding, Some(ttl))?;

		Ok(embedding)
	}

	async fn ingest_claimed(&self, new_item: &NewItem, link: &str) -> Result<IngestedItem> {
		if let Some(item) = self.backends.catalog.item_by_link(link).await? {
			return Ok(IngestedItem { item, created: false, cluster: None });
		}

		let text = match new_item.summary.as_deref().map(str::trim) {
			Some(summary) if !summary.is_empty() => format!("{}\n{summary}", new_item.title.trim()),
			_ => new_item.title.trim().to_string(),
		};
		let embedding = self.embed_cached(&text).await?;
		let item = ItemRecord {
			item_id: Uuid::new_v4(),
			title: new_item.title.trim().to_string(),
			link: link.to_string(),
			published_at: new_item.published_at,
			cluster_id: None,
		};

		// Every catalog row must have a vector, so the row is written last.
		self.backends.vectors.upsert_item(item.item_id, &embedding, item.published_at).await?;

		if let Err(err) = self.backends.catalog.insert_item(&item).await {
			if let Err(cleanup) = self.backends.vectors.delete_items(&[item.item_id]).await {
				tracing::error!(
					item_id = %item.item_id,
					error = %cleanup,
					"Failed to remove the vector of an item that was not stored."
				);
			}

			return Err(err);
		}

		let cluster = self.tag_item(&embedding.dense).await?;
		let item = match cluster {
			Some(_) => self
				.backends
				.catalog
				.items_by_ids(&[item.item_id])
				.await?
				.into_iter()
				.next()
				.unwrap_or(item),
			None => item,
		};

		tracing::info!(item_id = %item.item_id, link = %item.link, "Ingested item.");

		Ok(IngestedItem { item, created: true, cluster })
	}
}
