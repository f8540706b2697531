pub const DENSE_VECTOR_NAME: &str = "dense";
pub const SPARSE_VECTOR_NAME: &str = "sparse";
pub const PUBLISHED_AT_FIELD: &str = "published_at";
pub const ITEM_ID_FIELD: &str = "item_id";

use std::collections::HashMap;

use qdrant_client::{
	Payload, Qdrant,
	qdrant::{
		Condition, CreateCollectionBuilder, CreateFieldIndexCollectionBuilder,
		DeletePointsBuilder, Distance, FieldType, Filter, Fusion, GetPointsBuilder, PointId,
		PointStruct, PrefetchQueryBuilder, Query, QueryPointsBuilder, Range, ScoredPoint,
		SparseVectorParamsBuilder, SparseVectorsConfigBuilder, UpsertPointsBuilder, Vector,
		VectorInput, VectorParamsBuilder, VectorsConfigBuilder, point_id::PointIdOptions,
		vector_output,
	},
};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
	Error, Result,
	models::{DenseSearch, HybridSearch, ScoredItem},
};
use brief_domain::embedding::Embedding;

pub struct QdrantStore {
	pub client: Qdrant,
	pub collection: String,
	pub vector_dim: u32,
}
impl QdrantStore {
	pub fn new(cfg: &brief_config::Qdrant) -> Result<Self> {
		let client = Qdrant::from_url(&cfg.url).build()?;

		Ok(Self { client, collection: cfg.collection.clone(), vector_dim: cfg.vector_dim })
	}

	/// Creates the item collection with named dense and sparse vectors if it is missing.
	pub async fn ensure_collection(&self) -> Result<()> {
		if self.client.collection_exists(self.collection.clone()).await? {
			return Ok(());
		}

		let mut vectors_config = VectorsConfigBuilder::default();

		vectors_config.add_named_vector_params(
			DENSE_VECTOR_NAME,
			VectorParamsBuilder::new(self.vector_dim.into(), Distance::Cosine),
		);

		let mut sparse_vectors_config = SparseVectorsConfigBuilder::default();

		sparse_vectors_config
			.add_named_vector_params(SPARSE_VECTOR_NAME, SparseVectorParamsBuilder::default());

		let builder = CreateCollectionBuilder::new(self.collection.clone())
			.vectors_config(vectors_config)
			.sparse_vectors_config(sparse_vectors_config);

		self.client.create_collection(builder).await?;
		self.client
			.create_field_index(CreateFieldIndexCollectionBuilder::new(
				self.collection.clone(),
				PUBLISHED_AT_FIELD,
				FieldType::Integer,
			))
			.await?;

		tracing::info!(collection = %self.collection, "Created vector collection.");

		Ok(())
	}

	pub async fn upsert_item(
		&self,
		item_id: Uuid,
		embedding: &Embedding,
		published_at: OffsetDateTime,
	) -> Result<()> {
		if embedding.dense.len() != self.vector_dim as usize {
			return Err(Error::InvalidArgument(format!(
				"Dense vector has dimension {}, expected {}.",
				embedding.dense.len(),
				self.vector_dim
			)));
		}

		let mut payload = Payload::new();

		payload.insert(ITEM_ID_FIELD, item_id.to_string());
		payload.insert(PUBLISHED_AT_FIELD, published_at.unix_timestamp());

		let mut vectors = HashMap::new();

		vectors.insert(DENSE_VECTOR_NAME.to_string(), Vector::from(embedding.dense.clone()));

		if !embedding.sparse.is_empty() {
			vectors.insert(
				SPARSE_VECTOR_NAME.to_string(),
				Vector::new_sparse(embedding.sparse.indices.clone(), embedding.sparse.values.clone()),
			);
		}

		let point = PointStruct::new(item_id.to_string(), vectors, payload);

		self.client
			.upsert_points(UpsertPointsBuilder::new(self.collection.clone(), vec![point]).wait(true))
			.await?;

		Ok(())
	}

	/// Exact-id lookup of an item's dense vector.
	pub async fn dense_vector(&self, item_id: Uuid) -> Result<Option<Vec<f32>>> {
		let response = self
			.client
			.get_points(
				GetPointsBuilder::new(self.collection.clone(), vec![point_id(item_id)])
					.with_vectors(true)
					.with_payload(false),
			)
			.await?;
		let vector = response
			.result
			.into_iter()
			.filter_map(|point| point.vectors)
			.find_map(|vectors| vectors.get_vector_by_name(DENSE_VECTOR_NAME))
			.and_then(|vector| match vector {
				vector_output::Vector::Dense(dense) => Some(dense.data),
				_ => None,
			});

		Ok(vector)
	}

	pub async fn search_dense(&self, request: &DenseSearch) -> Result<Vec<ScoredItem>> {
		if request.limit == 0 || request.restrict_to.as_ref().is_some_and(Vec::is_empty) {
			return Ok(Vec::new());
		}

		let mut search = QueryPointsBuilder::new(self.collection.clone())
			.query(Query::new_nearest(request.vector.clone()))
			.using(DENSE_VECTOR_NAME)
			.with_payload(false)
			.limit(request.limit.into());

		if let Some(filter) =
			build_filter(&request.exclude, request.restrict_to.as_deref(), request.min_published_at)
		{
			search = search.filter(filter);
		}
		if let Some(threshold) = request.score_threshold {
			search = search.score_threshold(threshold);
		}

		let response = self.client.query(search).await?;

		Ok(scored_items(response.result))
	}

	pub async fn search_hybrid(&self, request: &HybridSearch) -> Result<Vec<ScoredItem>> {
		if request.fused_limit == 0 || request.candidate_limit == 0 {
			return Ok(Vec::new());
		}

		let filter = build_filter(&request.exclude, None, request.min_published_at);
		let mut dense_prefetch = PrefetchQueryBuilder::default()
			.query(Query::new_nearest(request.dense.clone()))
			.using(DENSE_VECTOR_NAME)
			.limit(u64::from(request.candidate_limit));

		if let Some(filter) = filter.clone() {
			dense_prefetch = dense_prefetch.filter(filter);
		}

		let mut search = QueryPointsBuilder::new(self.collection.clone()).add_prefetch(dense_prefetch);

		if !request.sparse.is_empty() {
			let mut sparse_prefetch = PrefetchQueryBuilder::default()
				.query(Query::new_nearest(VectorInput::new_sparse(
					request.sparse.indices.clone(),
					request.sparse.values.clone(),
				)))
				.using(SPARSE_VECTOR_NAME)
				.limit(u64::from(request.candidate_limit));

			if let Some(filter) = filter {
				sparse_prefetch = sparse_prefetch.filter(filter);
			}

			search = search.add_prefetch(sparse_prefetch);
		}

		let search =
			search.with_payload(false).query(Fusion::Rrf).limit(u64::from(request.fused_limit));
		let response = self.client.query(search).await?;

		Ok(scored_items(response.result))
	}

	pub async fn delete_items(&self, item_ids: &[Uuid]) -> Result<()> {
		if item_ids.is_empty() {
			return Ok(());
		}

		let ids: Vec<PointId> = item_ids.iter().copied().map(point_id).collect();

		self.client
			.delete_points(DeletePointsBuilder::new(self.collection.clone()).points(ids).wait(true))
			.await?;

		Ok(())
	}
}

pub fn point_id(item_id: Uuid) -> PointId {
	PointId::from(item_id.to_string())
}

pub fn point_id_to_uuid(point_id: &PointId) -> Option<Uuid> {
	match &point_id.point_id_options {
		Some(PointIdOptions::Uuid(id)) => Uuid::parse_str(id).ok(),
		_ => None,
	}
}

fn build_filter(
	exclude: &[Uuid],
	restrict_to: Option<&[Uuid]>,
	min_published_at: Option<OffsetDateTime>,
) -> Option<Filter> {
	let mut must = Vec::new();
	let mut must_not = Vec::new();

	if let Some(ids) = restrict_to {
		must.push(Condition::has_id(ids.iter().copied().map(point_id)));
	}
	if let Some(cutoff) = min_published_at {
		must.push(Condition::range(
			PUBLISHED_AT_FIELD,
			Range { gte: Some(cutoff.unix_timestamp() as f64), ..Default::default() },
		));
	}
	if !exclude.is_empty() {
		must_not.push(Condition::has_id(exclude.iter().copied().map(point_id)));
	}

	if must.is_empty() && must_not.is_empty() {
		return None;
	}

	Some(Filter { must, must_not, ..Default::default() })
}

/// Converts points to items, dropping foreign ids and repeated ids while keeping rank order.
fn scored_items(points: Vec<ScoredPoint>) -> Vec<ScoredItem> {
	let mut seen = std::collections::HashSet::new();

	points
		.into_iter()
		.filter_map(|point| {
			let item_id = point.id.as_ref().and_then(point_id_to_uuid)?;

			seen.insert(item_id).then_some(ScoredItem { item_id, score: point.score })
		})
		.collect()
}
