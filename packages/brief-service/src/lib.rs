pub mod activity;
pub mod backends;
pub mod ingest;
pub mod ledger;
pub mod memory;
pub mod retrieval;
pub mod trending;

mod error;

pub use activity::{ListenEvent, ReplayPolicy};
pub use error::{Error, Result};
pub use ingest::{IngestedItem, NewItem};
pub use ledger::FoldReport;
pub use memory::MemoryBackend;

use std::{future::Future, pin::Pin, sync::Arc};

use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use brief_config::{Config, EmbeddingProviderConfig};
use brief_coord::{Claim, CoordinationStore};
use brief_domain::{embedding::Embedding, preference::UserPreferenceState};
use brief_providers::embedding;
use brief_storage::{
	db::Db,
	models::{
		ClusterRecord, DenseSearch, HistoryPlay, HybridSearch, ItemRecord, ListenRecord, ScoredItem,
	},
	qdrant::QdrantStore,
};
use ledger::UserLocks;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

pub trait EmbeddingProvider
where
	Self: Send + Sync,
{
	fn embed<'a>(
		&'a self,
		cfg: &'a EmbeddingProviderConfig,
		texts: &'a [String],
	) -> BoxFuture<'a, color_eyre::Result<Vec<Embedding>>>;
}

/// Per-user preference vectors and listening history.
pub trait PreferenceStore
where
	Self: Send + Sync,
{
	fn load_preferences<'a>(
		&'a self,
		user_id: &'a str,
	) -> BoxFuture<'a, Result<Option<UserPreferenceState>>>;

	/// Returns `false` when the user already exists.
	fn create_preferences<'a>(
		&'a self,
		user_id: &'a str,
		state: &'a UserPreferenceState,
	) -> BoxFuture<'a, Result<bool>>;

	fn save_preferences<'a>(
		&'a self,
		user_id: &'a str,
		state: &'a UserPreferenceState,
	) -> BoxFuture<'a, Result<()>>;

	fn list_user_ids(&self) -> BoxFuture<'_, Result<Vec<String>>>;

	/// Every item with a history row for the user, hidden rows included.
	fn history_item_ids<'a>(&'a self, user_id: &'a str) -> BoxFuture<'a, Result<Vec<Uuid>>>;

	/// History rows for one item, newest first.
	fn history_plays<'a>(
		&'a self,
		user_id: &'a str,
		item_id: Uuid,
	) -> BoxFuture<'a, Result<Vec<HistoryPlay>>>;

	fn record_listen<'a>(
		&'a self,
		user_id: &'a str,
		item_id: Uuid,
		listen: &'a ListenRecord,
	) -> BoxFuture<'a, Result<()>>;

	fn hide_item<'a>(&'a self, user_id: &'a str, item_id: Uuid) -> BoxFuture<'a, Result<bool>>;
}

/// Item metadata and clusters.
pub trait CatalogStore
where
	Self: Send + Sync,
{
	fn item_by_link<'a>(&'a self, link: &'a str) -> BoxFuture<'a, Result<Option<ItemRecord>>>;

	fn items_by_ids<'a>(&'a self, item_ids: &'a [Uuid]) -> BoxFuture<'a, Result<Vec<ItemRecord>>>;

	fn insert_item<'a>(&'a self, item: &'a ItemRecord) -> BoxFuture<'a, Result<()>>;

	fn get_cluster(&self, cluster_id: Uuid) -> BoxFuture<'_, Result<Option<ClusterRecord>>>;

	fn assign_cluster<'a>(
		&'a self,
		cluster: &'a ClusterRecord,
		item_ids: &'a [Uuid],
	) -> BoxFuture<'a, Result<()>>;

	fn hot_representatives(
		&self,
		since: OffsetDateTime,
		limit: u32,
	) -> BoxFuture<'_, Result<Vec<Uuid>>>;

	fn trending_representatives(&self, since: OffsetDateTime) -> BoxFuture<'_, Result<Vec<Uuid>>>;

	fn expired_item_ids(&self, published_before: OffsetDateTime)
	-> BoxFuture<'_, Result<Vec<Uuid>>>;

	fn delete_items<'a>(&'a self, item_ids: &'a [Uuid]) -> BoxFuture<'a, Result<u64>>;
}

/// Similarity index over item embeddings.
pub trait VectorIndex
where
	Self: Send + Sync,
{
	fn upsert_item<'a>(
		&'a self,
		item_id: Uuid,
		embedding: &'a Embedding,
		published_at: OffsetDateTime,
	) -> BoxFuture<'a, Result<()>>;

	fn dense_vector(&self, item_id: Uuid) -> BoxFuture<'_, Result<Option<Vec<f32>>>>;

	fn search_dense<'a>(&'a self, request: &'a DenseSearch)
	-> BoxFuture<'a, Result<Vec<ScoredItem>>>;

	fn search_hybrid<'a>(
		&'a self,
		request: &'a HybridSearch,
	) -> BoxFuture<'a, Result<Vec<ScoredItem>>>;

	fn delete_items<'a>(&'a self, item_ids: &'a [Uuid]) -> BoxFuture<'a, Result<()>>;
}

#[derive(Clone)]
pub struct Providers {
	pub embedding: Arc<dyn EmbeddingProvider>,
}
impl Providers {
	pub fn new(embedding: Arc<dyn EmbeddingProvider>) -> Self {
		Self { embedding }
	}
}
impl Default for Providers {
	fn default() -> Self {
		Self { embedding: Arc::new(DefaultProviders) }
	}
}

#[derive(Clone)]
pub struct Backends {
	pub preferences: Arc<dyn PreferenceStore>,
	pub catalog: Arc<dyn CatalogStore>,
	pub vectors: Arc<dyn VectorIndex>,
}
impl Backends {
	pub fn new(
		preferences: Arc<dyn PreferenceStore>,
		catalog: Arc<dyn CatalogStore>,
		vectors: Arc<dyn VectorIndex>,
	) -> Self {
		Self { preferences, catalog, vectors }
	}

	/// Postgres for users, history and the catalog; Qdrant for embeddings.
	pub fn postgres(db: Db, qdrant: QdrantStore) -> Self {
		let db = Arc::new(db);

		Self { preferences: db.clone(), catalog: db, vectors: Arc::new(qdrant) }
	}

	pub fn in_memory(backend: Arc<MemoryBackend>) -> Self {
		Self { preferences: backend.clone(), catalog: backend.clone(), vectors: backend }
	}
}

pub struct BriefService {
	pub cfg: Config,
	pub coord: CoordinationStore,
	pub backends: Backends,
	pub providers: Providers,
	locks: UserLocks,
	tagging: tokio::sync::Mutex<()>,
}
impl BriefService {
	pub fn new(cfg: Config, coord: CoordinationStore, backends: Backends) -> Self {
		Self::with_providers(cfg, coord, backends, Providers::default())
	}

	pub fn with_providers(
		cfg: Config,
		coord: CoordinationStore,
		backends: Backends,
		providers: Providers,
	) -> Self {
		Self {
			cfg,
			coord,
			backends,
			providers,
			locks: UserLocks::default(),
			tagging: Default::default(),
		}
	}

	/// Connects to Postgres and Qdrant and bootstraps both schemas.
	pub async fn connect(cfg: Config, coord: CoordinationStore) -> Result<Self> {
		let db = Db::connect(&cfg.storage.postgres).await?;

		db.ensure_schema(cfg.storage.qdrant.vector_dim).await?;

		let qdrant = QdrantStore::new(&cfg.storage.qdrant)?;

		qdrant.ensure_collection().await?;

		Ok(Self::new(cfg, coord, Backends::postgres(db, qdrant)))
	}

	pub(crate) fn vector_dim(&self) -> usize {
		self.cfg.storage.qdrant.vector_dim as usize
	}
}

struct DefaultProviders;
impl EmbeddingProvider for DefaultProviders {
	fn embed<'a>(
		&'a self,
		cfg: &'a EmbeddingProviderConfig,
		texts: &'a [String],
	) -> BoxFuture<'a, color_eyre::Result<Vec<Embedding>>> {
		Box::pin(embedding::embed(cfg, texts))
	}
}

pub(crate) fn hours_ago(now: OffsetDateTime, hours: u32) -> OffsetDateTime {
	now - Duration::hours(i64::from(hours))
}

pub(crate) fn require_user_id(user_id: &str) -> Result<()> {
	if user_id.trim().is_empty() {
		return Err(Error::InvalidRequest { message: "user_id must be non-empty.".to_string() });
	}

	Ok(())
}

/// Flattens a dedup-guarded fallible job into a fallible claim.
pub(crate) fn transpose_claim<T>(claim: Claim<Result<T>>) -> Result<Claim<T>> {
	match claim {
		Claim::Ran(result) => result.map(Claim::Ran),
		Claim::AlreadyRunning => Ok(Claim::AlreadyRunning),
	}
}

/// Keeps the first occurrence of each id.
pub(crate) fn dedup_ids(ids: impl IntoIterator<Item = Uuid>) -> Vec<Uuid> {
	let mut seen = ahash::AHashSet::new();

	ids.into_iter().filter(|id| seen.insert(*id)).collect()
}
