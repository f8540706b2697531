//! Postgres and Qdrant implementations of the backend traits.

use time::OffsetDateTime;
use uuid::Uuid;

use brief_domain::{embedding::Embedding, preference::UserPreferenceState};
use brief_storage::{
	db::Db,
	models::{
		ClusterRecord, DenseSearch, HistoryPlay, HybridSearch, ItemRecord, ListenRecord,
		ScoredItem, UserPreferencesRow,
	},
	qdrant::QdrantStore,
	queries,
};

use crate::{BoxFuture, CatalogStore, PreferenceStore, Result, VectorIndex};

impl PreferenceStore for Db {
	fn load_preferences<'a>(
		&'a self,
		user_id: &'a str,
	) -> BoxFuture<'a, Result<Option<UserPreferenceState>>> {
		Box::pin(async move {
			let row = queries::get_user_preferences(self, user_id).await?;

			Ok(row.map(UserPreferencesRow::into_state))
		})
	}

	fn create_preferences<'a>(
		&'a self,
		user_id: &'a str,
		state: &'a UserPreferenceState,
	) -> BoxFuture<'a, Result<bool>> {
		Box::pin(async move {
			let row = UserPreferencesRow::from_state(user_id, state);

			Ok(queries::insert_user_preferences(self, &row).await?)
		})
	}

	fn save_preferences<'a>(
		&'a self,
		user_id: &'a str,
		state: &'a UserPreferenceState,
	) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move {
			let row = UserPreferencesRow::from_state(user_id, state);

			Ok(queries::update_user_preferences(self, &row).await?)
		})
	}

	fn list_user_ids(&self) -> BoxFuture<'_, Result<Vec<String>>> {
		Box::pin(async move { Ok(queries::list_user_ids(self).await?) })
	}

	fn history_item_ids<'a>(&'a self, user_id: &'a str) -> BoxFuture<'a, Result<Vec<Uuid>>> {
		Box::pin(async move { Ok(queries::history_item_ids(self, user_id).await?) })
	}

	fn history_plays<'a>(
		&'a self,
		user_id: &'a str,
		item_id: Uuid,
	) -> BoxFuture<'a, Result<Vec<HistoryPlay>>> {
		Box::pin(async move { Ok(queries::history_plays(self, user_id, item_id).await?) })
	}

	fn record_listen<'a>(
		&'a self,
		user_id: &'a str,
		item_id: Uuid,
		listen: &'a ListenRecord,
	) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move { Ok(queries::record_listen(self, user_id, item_id, listen).await?) })
	}

	fn hide_item<'a>(&'a self, user_id: &'a str, item_id: Uuid) -> BoxFuture<'a, Result<bool>> {
		Box::pin(async move { Ok(queries::hide_history(self, user_id, item_id).await?) })
	}
}

impl CatalogStore for Db {
	fn item_by_link<'a>(&'a self, link: &'a str) -> BoxFuture<'a, Result<Option<ItemRecord>>> {
		Box::pin(async move { Ok(queries::get_item_by_link(self, link).await?) })
	}

	fn items_by_ids<'a>(&'a self, item_ids: &'a [Uuid]) -> BoxFuture<'a, Result<Vec<ItemRecord>>> {
		Box::pin(async move { Ok(queries::get_items(self, item_ids).await?) })
	}

	fn insert_item<'a>(&'a self, item: &'a ItemRecord) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move { Ok(queries::insert_item(self, item).await?) })
	}

	fn get_cluster(&self, cluster_id: Uuid) -> BoxFuture<'_, Result<Option<ClusterRecord>>> {
		Box::pin(async move { Ok(queries::get_cluster(self, cluster_id).await?) })
	}

	fn assign_cluster<'a>(
		&'a self,
		cluster: &'a ClusterRecord,
		item_ids: &'a [Uuid],
	) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move { Ok(queries::assign_cluster(self, cluster, item_ids).await?) })
	}

	fn hot_representatives(
		&self,
		since: OffsetDateTime,
		limit: u32,
	) -> BoxFuture<'_, Result<Vec<Uuid>>> {
		Box::pin(async move { Ok(queries::hot_representatives(self, since, limit).await?) })
	}

	fn trending_representatives(&self, since: OffsetDateTime) -> BoxFuture<'_, Result<Vec<Uuid>>> {
		Box::pin(async move { Ok(queries::trending_representatives(self, since).await?) })
	}

	fn expired_item_ids(
		&self,
		published_before: OffsetDateTime,
	) -> BoxFuture<'_, Result<Vec<Uuid>>> {
		Box::pin(async move { Ok(queries::expired_item_ids(self, published_before).await?) })
	}

	fn delete_items<'a>(&'a self, item_ids: &'a [Uuid]) -> BoxFuture<'a, Result<u64>> {
		Box::pin(async move { Ok(queries::delete_items(self, item_ids).await?) })
	}
}

impl VectorIndex for QdrantStore {
	fn upsert_item<'a>(
		&'a self,
		item_id: Uuid,
		embedding: &'a Embedding,
		published_at: OffsetDateTime,
	) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move {
			Ok(QdrantStore::upsert_item(self, item_id, embedding, published_at).await?)
		})
	}

	fn dense_vector(&self, item_id: Uuid) -> BoxFuture<'_, Result<Option<Vec<f32>>>> {
		Box::pin(async move { Ok(QdrantStore::dense_vector(self, item_id).await?) })
	}

	fn search_dense<'a>(
		&'a self,
		request: &'a DenseSearch,
	) -> BoxFuture<'a, Result<Vec<ScoredItem>>> {
		Box::pin(async move { Ok(QdrantStore::search_dense(self, request).await?) })
	}

	fn search_hybrid<'a>(
		&'a self,
		request: &'a HybridSearch,
	) -> BoxFuture<'a, Result<Vec<ScoredItem>>> {
		Box::pin(async move { Ok(QdrantStore::search_hybrid(self, request).await?) })
	}

	fn delete_items<'a>(&'a self, item_ids: &'a [Uuid]) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move { Ok(QdrantStore::delete_items(self, item_ids).await?) })
	}
}
