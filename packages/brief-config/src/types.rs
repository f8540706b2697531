use serde::Deserialize;
use serde_json::{Map, Value};

#[derive(Debug, Deserialize)]
pub struct Config {
	pub service: Service,
	pub storage: Storage,
	pub providers: Providers,
	#[serde(default)]
	pub coordination: Coordination,
	#[serde(default)]
	pub preference: Preference,
	#[serde(default)]
	pub retrieval: Retrieval,
	#[serde(default)]
	pub trending: Trending,
	#[serde(default)]
	pub lifecycle: Lifecycle,
}

#[derive(Debug, Deserialize)]
pub struct Service {
	pub log_level: String,
}

#[derive(Debug, Deserialize)]
pub struct Storage {
	pub postgres: Postgres,
	pub qdrant: Qdrant,
}

#[derive(Debug, Deserialize)]
pub struct Postgres {
	pub dsn: String,
	pub pool_max_conns: u32,
}

#[derive(Debug, Deserialize)]
pub struct Qdrant {
	pub url: String,
	pub collection: String,
	pub vector_dim: u32,
}

#[derive(Debug, Deserialize)]
pub struct Providers {
	pub embedding: EmbeddingProviderConfig,
}

#[derive(Clone, Debug, Deserialize)]
pub struct EmbeddingProviderConfig {
	pub provider_id: String,
	pub api_base: String,
	pub api_key: String,
	pub path: String,
	pub model: String,
	pub dimensions: u32,
	pub timeout_ms: u64,
	#[serde(default)]
	pub default_headers: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
pub struct Coordination {
	#[serde(default = "default_sweep_interval_ms")]
	pub sweep_interval_ms: u64,
	/// Lease applied to dedup memberships so a crashed worker cannot block a key forever.
	/// Unset keeps memberships until they are released explicitly.
	#[serde(default)]
	pub dedup_lease_seconds: Option<u64>,
	#[serde(default = "default_embedding_cache_ttl_seconds")]
	pub embedding_cache_ttl_seconds: u64,
}
impl Default for Coordination {
	fn default() -> Self {
		Self {
			sweep_interval_ms: default_sweep_interval_ms(),
			dedup_lease_seconds: None,
			embedding_cache_ttl_seconds: default_embedding_cache_ttl_seconds(),
		}
	}
}

#[derive(Debug, Deserialize)]
pub struct Preference {
	#[serde(default = "default_batch_size")]
	pub batch_size: u32,
	#[serde(default = "default_realtime_mix")]
	pub realtime_mix: f32,
	#[serde(default = "default_daily_mix")]
	pub daily_mix: f32,
	#[serde(default = "default_daily_fold_interval_hours")]
	pub daily_fold_interval_hours: u32,
	/// One of "latest_visible" or "all_time".
	#[serde(default = "default_replay_policy")]
	pub replay_policy: String,
}
impl Default for Preference {
	fn default() -> Self {
		Self {
			batch_size: default_batch_size(),
			realtime_mix: default_realtime_mix(),
			daily_mix: default_daily_mix(),
			daily_fold_interval_hours: default_daily_fold_interval_hours(),
			replay_policy: default_replay_policy(),
		}
	}
}

#[derive(Debug, Deserialize)]
pub struct Retrieval {
	#[serde(default = "default_recommend_limit")]
	pub recommend_limit: u32,
	#[serde(default = "default_recommend_window_hours")]
	pub recommend_window_hours: u32,
	#[serde(default = "default_search_limit")]
	pub search_limit: u32,
	#[serde(default = "default_digest_window_hours")]
	pub digest_window_hours: u32,
	#[serde(default = "default_digest_candidate_multiplier")]
	pub digest_candidate_multiplier: u32,
}
impl Default for Retrieval {
	fn default() -> Self {
		Self {
			recommend_limit: default_recommend_limit(),
			recommend_window_hours: default_recommend_window_hours(),
			search_limit: default_search_limit(),
			digest_window_hours: default_digest_window_hours(),
			digest_candidate_multiplier: default_digest_candidate_multiplier(),
		}
	}
}

#[derive(Debug, Deserialize)]
pub struct Trending {
	#[serde(default = "default_similarity_threshold")]
	pub similarity_threshold: f32,
	#[serde(default = "default_trending_window_hours")]
	pub window_hours: u32,
	#[serde(default = "default_peer_limit")]
	pub peer_limit: u32,
	#[serde(default = "default_hot_min_score")]
	pub hot_min_score: u32,
	#[serde(default = "default_trending_min_score")]
	pub trending_min_score: u32,
	#[serde(default = "default_authoritative_domains")]
	pub authoritative_domains: Vec<String>,
}
impl Default for Trending {
	fn default() -> Self {
		Self {
			similarity_threshold: default_similarity_threshold(),
			window_hours: default_trending_window_hours(),
			peer_limit: default_peer_limit(),
			hot_min_score: default_hot_min_score(),
			trending_min_score: default_trending_min_score(),
			authoritative_domains: default_authoritative_domains(),
		}
	}
}

#[derive(Debug, Deserialize)]
pub struct Lifecycle {
	#[serde(default = "default_item_expire_days")]
	pub item_expire_days: u32,
	#[serde(default = "default_fold_all_interval_hours")]
	pub fold_all_interval_hours: u32,
	#[serde(default = "default_purge_interval_hours")]
	pub purge_interval_hours: u32,
}
impl Default for Lifecycle {
	fn default() -> Self {
		Self {
			item_expire_days: default_item_expire_days(),
			fold_all_interval_hours: default_fold_all_interval_hours(),
			purge_interval_hours: default_purge_interval_hours(),
		}
	}
}

fn default_sweep_interval_ms() -> u64 {
	500
}

fn default_embedding_cache_ttl_seconds() -> u64 {
	3_600
}

fn default_batch_size() -> u32 {
	10
}

fn default_realtime_mix() -> f32 {
	0.1
}

fn default_daily_mix() -> f32 {
	0.2
}

fn default_daily_fold_interval_hours() -> u32 {
	24
}

fn default_replay_policy() -> String {
	"latest_visible".to_string()
}

fn default_recommend_limit() -> u32 {
	100
}

fn default_recommend_window_hours() -> u32 {
	24 * 7
}

fn default_search_limit() -> u32 {
	20
}

fn default_digest_window_hours() -> u32 {
	30
}

fn default_digest_candidate_multiplier() -> u32 {
	10
}

fn default_similarity_threshold() -> f32 {
	0.7
}

fn default_trending_window_hours() -> u32 {
	36
}

fn default_peer_limit() -> u32 {
	100
}

fn default_hot_min_score() -> u32 {
	2
}

fn default_trending_min_score() -> u32 {
	4
}

fn default_authoritative_domains() -> Vec<String> {
	[
		"reuters.com",
		"apnews.com",
		"cnn.com",
		"bbc.com",
		"nytimes.com",
		"wsj.com",
		"cnbc.com",
		"ft.com",
		"theguardian.com",
		"washingtonpost.com",
		"scmp.com",
		"news.cn",
		"cbc.ca",
		"forbes.com",
	]
	.into_iter()
	.map(str::to_string)
	.collect()
}

fn default_item_expire_days() -> u32 {
	30
}

fn default_fold_all_interval_hours() -> u32 {
	24
}

fn default_purge_interval_hours() -> u32 {
	24
}
