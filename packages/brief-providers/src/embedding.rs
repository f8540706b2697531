use std::time::Duration;

use color_eyre::{Result, eyre};
use reqwest::Client;
use serde_json::Value;

use brief_config::EmbeddingProviderConfig;
use brief_domain::embedding::{Embedding, SparseVector};

/// Embeds `texts` into dense and sparse vectors, in input order.
///
/// The provider is expected to answer with an OpenAI-style `data` array. Each item carries
/// `embedding` and, when the model produces lexical weights, a `sparse_embedding` given
/// either as `{"indices": [...], "values": [...]}` or as a map of index to weight.
pub async fn embed(cfg: &EmbeddingProviderConfig, texts: &[String]) -> Result<Vec<Embedding>> {
	let client = Client::builder().timeout(Duration::from_millis(cfg.timeout_ms)).build()?;
	let url = format!("{}{}", cfg.api_base, cfg.path);
	let body = serde_json::json!({
		"model": cfg.model,
		"input": texts,
		"dimensions": cfg.dimensions,
		"return_sparse": true,
	});
	let res = client
		.post(url)
		.headers(crate::auth_headers(&cfg.api_key, &cfg.default_headers)?)
		.json(&body)
		.send()
		.await?;
	let json: Value = res.error_for_status()?.json().await?;
	let embeddings = parse_embedding_response(json)?;

	if embeddings.len() != texts.len() {
		return Err(eyre::eyre!(
			"Embedding provider returned {} vectors for {} inputs.",
			embeddings.len(),
			texts.len()
		));
	}
	if let Some(bad) =
		embeddings.iter().find(|embedding| embedding.dense.len() != cfg.dimensions as usize)
	{
		return Err(eyre::eyre!(
			"Embedding provider returned dimension {}, expected {}.",
			bad.dense.len(),
			cfg.dimensions
		));
	}

	Ok(embeddings)
}

/// Cache key for one text under one model configuration.
pub fn cache_key(cfg: &EmbeddingProviderConfig, text: &str) -> String {
	let mut hasher = blake3::Hasher::new();

	hasher.update(cfg.provider_id.as_bytes());
	hasher.update(b"\0");
	hasher.update(cfg.model.as_bytes());
	hasher.update(b"\0");
	hasher.update(&cfg.dimensions.to_le_bytes());
	hasher.update(text.as_bytes());

	format!("embedding:{}", hasher.finalize().to_hex())
}

fn parse_embedding_response(json: Value) -> Result<Vec<Embedding>> {
	let data = json
		.get("data")
		.and_then(|v| v.as_array())
		.ok_or_else(|| eyre::eyre!("Embedding response is missing data array."))?;
	let mut indexed: Vec<(usize, Embedding)> = Vec::with_capacity(data.len());

	for (fallback_index, item) in data.iter().enumerate() {
		let index = item
			.get("index")
			.and_then(|v| v.as_u64())
			.map(|v| v as usize)
			.unwrap_or(fallback_index);
		let embedding = item
			.get("embedding")
			.and_then(|v| v.as_array())
			.ok_or_else(|| eyre::eyre!("Embedding item missing embedding array."))?;
		let mut dense = Vec::with_capacity(embedding.len());

		for value in embedding {
			let number =
				value.as_f64().ok_or_else(|| eyre::eyre!("Embedding value must be numeric."))?;

			dense.push(number as f32);
		}

		let sparse = match item.get("sparse_embedding") {
			Some(raw) if !raw.is_null() => parse_sparse(raw)?,
			_ => SparseVector::default(),
		};

		indexed.push((index, Embedding { dense, sparse }));
	}

	indexed.sort_by_key(|(index, _)| *index);

	Ok(indexed.into_iter().map(|(_, embedding)| embedding).collect())
}

fn parse_sparse(raw: &Value) -> Result<SparseVector> {
	if let (Some(indices), Some(values)) =
		(raw.get("indices").and_then(Value::as_array), raw.get("values").and_then(Value::as_array))
	{
		if indices.len() != values.len() {
			return Err(eyre::eyre!("Sparse embedding indices and values differ in length."));
		}

		let mut pairs = Vec::with_capacity(indices.len());

		for (index, value) in indices.iter().zip(values) {
			pairs.push((sparse_index(index)?, sparse_value(value)?));
		}

		return Ok(SparseVector::from_pairs(pairs));
	}

	let map = raw
		.as_object()
		.ok_or_else(|| eyre::eyre!("Sparse embedding must be an object."))?;
	let mut pairs = Vec::with_capacity(map.len());

	for (key, value) in map {
		let index = key
			.parse::<u32>()
			.map_err(|_| eyre::eyre!("Sparse embedding key {key:?} is not a term index."))?;

		pairs.push((index, sparse_value(value)?));
	}

	Ok(SparseVector::from_pairs(pairs))
}

fn sparse_index(value: &Value) -> Result<u32> {
	value
		.as_u64()
		.and_then(|v| u32::try_from(v).ok())
		.ok_or_else(|| eyre::eyre!("Sparse embedding index must be a 32-bit unsigned integer."))
}

fn sparse_value(value: &Value) -> Result<f32> {
	value
		.as_f64()
		.map(|v| v as f32)
		.ok_or_else(|| eyre::eyre!("Sparse embedding weight must be numeric."))
}
