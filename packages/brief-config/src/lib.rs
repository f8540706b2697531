mod error;
mod types;

pub use error::{Error, Result};
pub use types::{
	Config, Coordination, EmbeddingProviderConfig, Lifecycle, Postgres, Preference, Providers,
	Qdrant, Retrieval, Service, Storage, Trending,
};

use std::{fs, path::Path};

pub const REPLAY_POLICIES: [&str; 2] = ["latest_visible", "all_time"];

pub fn load(path: &Path) -> Result<Config> {
	let raw = fs::read_to_string(path)
		.map_err(|err| Error::ReadConfig { path: path.to_path_buf(), source: err })?;

	parse(&raw).map_err(|err| match err {
		Error::ParseConfig { source, .. } =>
			Error::ParseConfig { path: path.to_path_buf(), source },
		other => other,
	})
}

pub fn parse(raw: &str) -> Result<Config> {
	let mut cfg: Config = toml::from_str(raw)
		.map_err(|err| Error::ParseConfig { path: Default::default(), source: err })?;

	normalize(&mut cfg);

	validate(&cfg)?;

	Ok(cfg)
}

pub fn validate(cfg: &Config) -> Result<()> {
	if cfg.service.log_level.trim().is_empty() {
		return Err(Error::validation("service.log_level", "must be non-empty."));
	}
	if cfg.storage.postgres.pool_max_conns == 0 {
		return Err(Error::validation("storage.postgres.pool_max_conns", "must be greater than zero."));
	}
	if cfg.storage.qdrant.collection.trim().is_empty() {
		return Err(Error::validation("storage.qdrant.collection", "must be non-empty."));
	}

	let embedding = &cfg.providers.embedding;

	if embedding.dimensions == 0 {
		return Err(Error::validation(
			"providers.embedding.dimensions",
			"must be greater than zero.",
		));
	}
	if embedding.dimensions != cfg.storage.qdrant.vector_dim {
		return Err(Error::validation(
			"providers.embedding.dimensions",
			"must match storage.qdrant.vector_dim.",
		));
	}
	if embedding.api_key.trim().is_empty() {
		return Err(Error::validation("providers.embedding.api_key", "must be non-empty."));
	}
	if embedding.timeout_ms == 0 {
		return Err(Error::validation(
			"providers.embedding.timeout_ms",
			"must be greater than zero.",
		));
	}
	if cfg.coordination.sweep_interval_ms == 0 {
		return Err(Error::validation(
			"coordination.sweep_interval_ms",
			"must be greater than zero.",
		));
	}
	if cfg.coordination.dedup_lease_seconds == Some(0) {
		return Err(Error::validation(
			"coordination.dedup_lease_seconds",
			"must be greater than zero when set.",
		));
	}

	let preference = &cfg.preference;

	if preference.batch_size == 0 {
		return Err(Error::validation("preference.batch_size", "must be greater than zero."));
	}

	for (field, ratio) in [
		("preference.realtime_mix", preference.realtime_mix),
		("preference.daily_mix", preference.daily_mix),
	] {
		if !ratio.is_finite() || ratio <= 0.0 || ratio > 1.0 {
			return Err(Error::validation(field, "must be in the range (0.0, 1.0]."));
		}
	}

	if preference.daily_fold_interval_hours == 0 {
		return Err(Error::validation(
			"preference.daily_fold_interval_hours",
			"must be greater than zero.",
		));
	}
	if !REPLAY_POLICIES.contains(&preference.replay_policy.as_str()) {
		return Err(Error::validation(
			"preference.replay_policy",
			"must be one of latest_visible or all_time.",
		));
	}

	let retrieval = &cfg.retrieval;

	for (field, value) in [
		("retrieval.recommend_limit", retrieval.recommend_limit),
		("retrieval.search_limit", retrieval.search_limit),
		("retrieval.digest_candidate_multiplier", retrieval.digest_candidate_multiplier),
	] {
		if value == 0 {
			return Err(Error::validation(field, "must be greater than zero."));
		}
	}

	let trending = &cfg.trending;

	if !trending.similarity_threshold.is_finite()
		|| !(0.0..=1.0).contains(&trending.similarity_threshold)
	{
		return Err(Error::validation(
			"trending.similarity_threshold",
			"must be in the range 0.0-1.0.",
		));
	}
	if trending.window_hours == 0 {
		return Err(Error::validation("trending.window_hours", "must be greater than zero."));
	}
	if trending.peer_limit == 0 {
		return Err(Error::validation("trending.peer_limit", "must be greater than zero."));
	}

	let lifecycle = &cfg.lifecycle;

	for (field, value) in [
		("lifecycle.item_expire_days", lifecycle.item_expire_days),
		("lifecycle.fold_all_interval_hours", lifecycle.fold_all_interval_hours),
		("lifecycle.purge_interval_hours", lifecycle.purge_interval_hours),
	] {
		if value == 0 {
			return Err(Error::validation(field, "must be greater than zero."));
		}
	}

	Ok(())
}

fn normalize(cfg: &mut Config) {
	let mut domains: Vec<String> = cfg
		.trending
		.authoritative_domains
		.iter()
		.map(|domain| domain.trim().trim_start_matches("www.").to_ascii_lowercase())
		.filter(|domain| !domain.is_empty())
		.collect();

	domains.sort();
	domains.dedup();

	cfg.trending.authoritative_domains = domains;
	cfg.preference.replay_policy = cfg.preference.replay_policy.trim().to_ascii_lowercase();
}
