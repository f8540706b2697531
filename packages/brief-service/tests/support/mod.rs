#![allow(dead_code)]

use std::{
	collections::HashMap,
	sync::{
		Arc, Mutex,
		atomic::{AtomicBool, AtomicUsize, Ordering},
	},
	time::Duration as StdDuration,
};

use color_eyre::eyre;
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use brief_config::{Config, EmbeddingProviderConfig};
use brief_coord::{CoordinationOptions, CoordinationStore};
use brief_domain::embedding::{Embedding, SparseVector};
use brief_service::{
	Backends, BoxFuture, BriefService, CatalogStore, EmbeddingProvider, Error, MemoryBackend,
	Providers, Result, VectorIndex,
};
use brief_storage::models::{ClusterRecord, DenseSearch, HybridSearch, ItemRecord, ScoredItem};

pub const DIM: u32 = 4;

pub fn test_config(overrides: &str) -> Config {
	let raw = format!(
		r#"
[service]
log_level = "debug"

[storage.postgres]
dsn = "postgres://unused/brief"
pool_max_conns = 1

[storage.qdrant]
url = "http://127.0.0.1:6334"
collection = "brief_items"
vector_dim = {DIM}

[providers.embedding]
provider_id = "stub"
api_base = "http://127.0.0.1:9"
api_key = "test-key"
path = "/embeddings"
model = "stub-embedding"
dimensions = {DIM}
timeout_ms = 1000

{overrides}
"#
	);

	brief_config::parse(&raw).expect("Test config should be valid.")
}

/// Embedding provider answering from a fixed table and counting calls.
#[derive(Default)]
pub struct StubEmbedding {
	table: Mutex<HashMap<String, Embedding>>,
	calls: AtomicUsize,
	delay: Mutex<Option<StdDuration>>,
}
impl StubEmbedding {
	pub fn insert(&self, text: &str, dense: [f32; DIM as usize], sparse: &[(u32, f32)]) {
		let embedding = Embedding {
			dense: dense.to_vec(),
			sparse: SparseVector::from_pairs(sparse.iter().copied()),
		};

		self.table.lock().expect("Stub table lock poisoned.").insert(text.to_string(), embedding);
	}

	pub fn calls(&self) -> usize {
		self.calls.load(Ordering::SeqCst)
	}

	/// Makes every later call sleep before answering.
	pub fn set_delay(&self, delay: StdDuration) {
		*self.delay.lock().expect("Stub delay lock poisoned.") = Some(delay);
	}
}
impl EmbeddingProvider for StubEmbedding {
	fn embed<'a>(
		&'a self,
		_cfg: &'a EmbeddingProviderConfig,
		texts: &'a [String],
	) -> BoxFuture<'a, color_eyre::Result<Vec<Embedding>>> {
		self.calls.fetch_add(1, Ordering::SeqCst);

		let table = self.table.lock().expect("Stub table lock poisoned.");
		let result: color_eyre::Result<Vec<Embedding>> = texts
			.iter()
			.map(|text| {
				table.get(text).cloned().ok_or_else(|| eyre::eyre!("No stub embedding for {text:?}."))
			})
			.collect();

		let delay = *self.delay.lock().expect("Stub delay lock poisoned.");

		Box::pin(async move {
			if let Some(delay) = delay {
				tokio::time::sleep(delay).await;
			}

			result
		})
	}
}

/// Catalog and vector index over a [`MemoryBackend`] with switchable outages.
pub struct FlakyBackend {
	inner: Arc<MemoryBackend>,
	vectors_down: AtomicBool,
	catalog_down: AtomicBool,
	catalog_writes_down: AtomicBool,
	assign_delay: Mutex<Option<StdDuration>>,
}
impl FlakyBackend {
	pub fn new(inner: Arc<MemoryBackend>) -> Self {
		Self {
			inner,
			vectors_down: AtomicBool::new(false),
			catalog_down: AtomicBool::new(false),
			catalog_writes_down: AtomicBool::new(false),
			assign_delay: Mutex::new(None),
		}
	}

	pub fn set_vectors_down(&self, down: bool) {
		self.vectors_down.store(down, Ordering::SeqCst);
	}

	pub fn set_catalog_down(&self, down: bool) {
		self.catalog_down.store(down, Ordering::SeqCst);
	}

	/// Fails item inserts and cluster assignments while reads keep working.
	pub fn set_catalog_writes_down(&self, down: bool) {
		self.catalog_writes_down.store(down, Ordering::SeqCst);
	}

	/// Makes cluster assignments sleep before they are applied.
	pub fn set_assign_delay(&self, delay: StdDuration) {
		*self.assign_delay.lock().expect("Delay lock poisoned.") = Some(delay);
	}

	fn vectors_down(&self) -> bool {
		self.vectors_down.load(Ordering::SeqCst)
	}

	fn catalog_down(&self) -> bool {
		self.catalog_down.load(Ordering::SeqCst)
	}

	fn catalog_writes_down(&self) -> bool {
		self.catalog_down() || self.catalog_writes_down.load(Ordering::SeqCst)
	}
}
impl VectorIndex for FlakyBackend {
	fn upsert_item<'a>(
		&'a self,
		item_id: Uuid,
		embedding: &'a Embedding,
		published_at: OffsetDateTime,
	) -> BoxFuture<'a, Result<()>> {
		if self.vectors_down() {
			return qdrant_unreachable();
		}

		self.inner.upsert_item(item_id, embedding, published_at)
	}

	fn dense_vector(&self, item_id: Uuid) -> BoxFuture<'_, Result<Option<Vec<f32>>>> {
		if self.vectors_down() {
			return qdrant_unreachable();
		}

		self.inner.dense_vector(item_id)
	}

	fn search_dense<'a>(
		&'a self,
		request: &'a DenseSearch,
	) -> BoxFuture<'a, Result<Vec<ScoredItem>>> {
		if self.vectors_down() {
			return qdrant_unreachable();
		}

		VectorIndex::search_dense(&*self.inner, request)
	}

	fn search_hybrid<'a>(
		&'a self,
		request: &'a HybridSearch,
	) -> BoxFuture<'a, Result<Vec<ScoredItem>>> {
		if self.vectors_down() {
			return qdrant_unreachable();
		}

		VectorIndex::search_hybrid(&*self.inner, request)
	}

	fn delete_items<'a>(&'a self, item_ids: &'a [Uuid]) -> BoxFuture<'a, Result<()>> {
		if self.vectors_down() {
			return qdrant_unreachable();
		}

		VectorIndex::delete_items(&*self.inner, item_ids)
	}
}
impl CatalogStore for FlakyBackend {
	fn item_by_link<'a>(&'a self, link: &'a str) -> BoxFuture<'a, Result<Option<ItemRecord>>> {
		if self.catalog_down() {
			return storage_unreachable();
		}

		self.inner.item_by_link(link)
	}

	fn items_by_ids<'a>(&'a self, item_ids: &'a [Uuid]) -> BoxFuture<'a, Result<Vec<ItemRecord>>> {
		if self.catalog_down() {
			return storage_unreachable();
		}

		self.inner.items_by_ids(item_ids)
	}

	fn insert_item<'a>(&'a self, item: &'a ItemRecord) -> BoxFuture<'a, Result<()>> {
		if self.catalog_writes_down() {
			return storage_unreachable();
		}

		self.inner.insert_item(item)
	}

	fn get_cluster(&self, cluster_id: Uuid) -> BoxFuture<'_, Result<Option<ClusterRecord>>> {
		if self.catalog_down() {
			return storage_unreachable();
		}

		self.inner.get_cluster(cluster_id)
	}

	fn assign_cluster<'a>(
		&'a self,
		cluster: &'a ClusterRecord,
		item_ids: &'a [Uuid],
	) -> BoxFuture<'a, Result<()>> {
		if self.catalog_writes_down() {
			return storage_unreachable();
		}

		let delay = *self.assign_delay.lock().expect("Delay lock poisoned.");

		Box::pin(async move {
			if let Some(delay) = delay {
				tokio::time::sleep(delay).await;
			}

			self.inner.assign_cluster(cluster, item_ids).await
		})
	}

	fn hot_representatives(
		&self,
		since: OffsetDateTime,
		limit: u32,
	) -> BoxFuture<'_, Result<Vec<Uuid>>> {
		if self.catalog_down() {
			return storage_unreachable();
		}

		self.inner.hot_representatives(since, limit)
	}

	fn trending_representatives(&self, since: OffsetDateTime) -> BoxFuture<'_, Result<Vec<Uuid>>> {
		if self.catalog_down() {
			return storage_unreachable();
		}

		self.inner.trending_representatives(since)
	}

	fn expired_item_ids(
		&self,
		published_before: OffsetDateTime,
	) -> BoxFuture<'_, Result<Vec<Uuid>>> {
		if self.catalog_down() {
			return storage_unreachable();
		}

		self.inner.expired_item_ids(published_before)
	}

	fn delete_items<'a>(&'a self, item_ids: &'a [Uuid]) -> BoxFuture<'a, Result<u64>> {
		if self.catalog_writes_down() {
			return storage_unreachable();
		}

		CatalogStore::delete_items(&*self.inner, item_ids)
	}
}

fn qdrant_unreachable<'a, T>() -> BoxFuture<'a, Result<T>>
where
	T: Send + 'a,
{
	Box::pin(async { Err(Error::Qdrant { message: "unreachable".to_string() }) })
}

fn storage_unreachable<'a, T>() -> BoxFuture<'a, Result<T>>
where
	T: Send + 'a,
{
	Box::pin(async { Err(Error::Storage { message: "unreachable".to_string() }) })
}

pub struct Harness {
	pub service: Arc<BriefService>,
	pub backend: Arc<MemoryBackend>,
	pub faults: Arc<FlakyBackend>,
	pub embedding: Arc<StubEmbedding>,
}
impl Harness {
	pub fn new(overrides: &str) -> Self {
		let backend = Arc::new(MemoryBackend::new());
		let faults = Arc::new(FlakyBackend::new(backend.clone()));
		let embedding = Arc::new(StubEmbedding::default());
		let service = BriefService::with_providers(
			test_config(overrides),
			CoordinationStore::new(CoordinationOptions::default()),
			Backends::new(backend.clone(), faults.clone(), faults.clone()),
			Providers::new(embedding.clone()),
		);

		Self { service: Arc::new(service), backend, faults, embedding }
	}

	/// Indexes an item's dense vector directly, bypassing ingestion.
	pub async fn index(&self, dense: [f32; DIM as usize], age: Duration) -> Uuid {
		let item_id = Uuid::new_v4();
		let embedding = Embedding { dense: dense.to_vec(), sparse: SparseVector::default() };

		self.backend
			.upsert_item(item_id, &embedding, OffsetDateTime::now_utc() - age)
			.await
			.expect("Failed to index item.");

		item_id
	}
}

pub fn assert_close(actual: &[f32], expected: &[f32]) {
	assert_eq!(actual.len(), expected.len());

	for (a, e) in actual.iter().zip(expected) {
		assert!((a - e).abs() < 1e-5, "Expected {expected:?}, got {actual:?}.");
	}
}
