mod support;

use std::time::Duration as StdDuration;

use time::{Duration, OffsetDateTime};

use brief_coord::Claim;
use brief_providers::embedding;
use brief_service::{
	Error, NewItem, PreferenceStore, ingest::EMBED_SET, retrieval::DAILY_NEWS_SET,
};
use brief_storage::models::ListenRecord;
use support::Harness;

fn listen_now() -> ListenRecord {
	ListenRecord {
		listen_duration_seconds: 10.0,
		stop_position_seconds: 10.0,
		completed: false,
		shared: false,
		downloaded: false,
		added_to_playlist: false,
		rating: None,
		listened_at: OffsetDateTime::now_utc(),
	}
}

#[tokio::test]
async fn dense_search_returns_the_closest_item() {
	let harness = Harness::new("");
	let near = harness.index([1.0, 0.1, 0.0, 0.0], Duration::hours(1)).await;
	let far = harness.index([0.0, 0.0, 1.0, 0.0], Duration::hours(1)).await;
	let ids = harness
		.service
		.search_dense(&[1.0, 0.0, 0.0, 0.0], 1, &[], None)
		.await
		.expect("Search failed.");

	assert_eq!(ids, vec![near]);

	let ids = harness
		.service
		.search_dense(&[1.0, 0.0, 0.0, 0.0], 5, &[near], None)
		.await
		.expect("Search failed.");

	assert_eq!(ids, vec![far]);
}

#[tokio::test]
async fn dense_search_respects_the_publication_cutoff() {
	let harness = Harness::new("");
	let fresh = harness.index([0.5, 0.5, 0.0, 0.0], Duration::hours(2)).await;

	harness.index([1.0, 0.0, 0.0, 0.0], Duration::days(10)).await;

	let cutoff = OffsetDateTime::now_utc() - Duration::days(1);
	let ids = harness
		.service
		.search_dense(&[1.0, 0.0, 0.0, 0.0], 10, &[], Some(cutoff))
		.await
		.expect("Search failed.");

	assert_eq!(ids, vec![fresh]);
}

#[tokio::test]
async fn empty_index_yields_no_results() {
	let harness = Harness::new("");
	let ids =
		harness.service.search_dense(&[1.0; 4], 10, &[], None).await.expect("Search failed.");

	assert!(ids.is_empty());
	assert!(
		harness.service.search_dense(&[1.0; 4], 0, &[], None).await.expect("Search failed.").is_empty()
	);
}

#[tokio::test]
async fn hybrid_search_prefers_lexical_and_semantic_agreement() {
	let harness = Harness::new("");

	harness.embedding.insert("Rate cut", [1.0, 0.0, 0.0, 0.0], &[(7, 1.0), (9, 0.5)]);
	harness.embedding.insert("Storm warning", [0.0, 1.0, 0.0, 0.0], &[(3, 1.0)]);
	harness.embedding.insert("rate cut", [0.9, 0.1, 0.0, 0.0], &[(7, 1.0)]);

	let now = OffsetDateTime::now_utc();
	let mut ingested = Vec::new();

	for (title, link) in
		[("Rate cut", "https://example.org/rates"), ("Storm warning", "https://sample.net/storm")]
	{
		let item = NewItem {
			title: title.to_string(),
			link: link.to_string(),
			published_at: now - Duration::hours(1),
			summary: None,
		};
		let claim = harness.service.ingest_item(&item).await.expect("Ingest failed.");

		ingested.push(claim.ran().expect("Ingest should run.").item.item_id);
	}

	let ids = harness.service.search_hybrid("rate cut", 1, &[], None).await.expect("Search failed.");

	assert_eq!(ids, vec![ingested[0]]);

	let calls = harness.embedding.calls();
	let again = harness.service.search_hybrid("rate cut", 2, &[], None).await.expect("Search failed.");

	assert_eq!(again.len(), 2);
	assert_eq!(again[0], ingested[0]);
	assert_eq!(harness.embedding.calls(), calls, "Cached query embedding should be reused.");
}

#[tokio::test]
async fn hybrid_search_reports_provider_failures_as_retrieval_errors() {
	let harness = Harness::new("");
	let result = harness.service.search_hybrid("unknown words", 5, &[], None).await;

	assert!(matches!(result, Err(Error::Retrieval { .. })));
}

#[tokio::test]
async fn search_degrades_to_empty_and_still_validates_queries() {
	let harness = Harness::new("");

	harness.service.ensure_user("u1", vec![1.0, 0.0, 0.0, 0.0]).await.expect("Create failed.");

	let ids = harness.service.search("u1", "nothing stubbed").await.expect("Search failed.");

	assert!(ids.is_empty());
	assert!(matches!(harness.service.search("u1", "  ").await, Err(Error::InvalidRequest { .. })));
}

#[tokio::test]
async fn search_folds_the_query_into_preferences() {
	let harness = Harness::new("");

	harness.embedding.insert("markets", [0.0, 1.0, 0.0, 0.0], &[(1, 1.0)]);
	harness.service.ensure_user("u1", vec![1.0, 0.0, 0.0, 0.0]).await.expect("Create failed.");
	harness.service.search("u1", "markets").await.expect("Search failed.");

	let state =
		harness.service.preferences("u1").await.expect("Load failed.").expect("User exists.");

	assert_eq!(state.batch_count, 1);
	assert!((state.batch_total_weight - 0.75).abs() < 1e-6);
	assert!((state.batched_vector[1] - 0.75).abs() < 1e-6);
}

#[tokio::test]
async fn recommendations_skip_history_including_hidden_rows() {
	let harness = Harness::new("");
	let heard = harness.index([1.0, 0.0, 0.0, 0.0], Duration::hours(1)).await;
	let hidden = harness.index([0.95, 0.05, 0.0, 0.0], Duration::hours(1)).await;
	let fresh = harness.index([0.9, 0.1, 0.0, 0.0], Duration::hours(1)).await;

	harness.index([0.9, 0.0, 0.1, 0.0], Duration::days(8)).await;
	harness.service.ensure_user("u1", vec![1.0, 0.0, 0.0, 0.0]).await.expect("Create failed.");

	for item_id in [heard, hidden] {
		harness.backend.record_listen("u1", item_id, &listen_now()).await.expect("Listen failed.");
	}

	harness.service.hide_item("u1", hidden).await.expect("Hide failed.");

	let ids = harness.service.recommend("u1", None).await.expect("Recommend failed.");

	assert_eq!(ids, vec![fresh]);

	let seeded = harness.service.recommend("u1", Some(heard)).await.expect("Recommend failed.");

	assert_eq!(seeded, vec![fresh]);
}

#[tokio::test]
async fn recommending_for_an_unknown_user_without_seed_is_not_found() {
	let harness = Harness::new("");

	assert!(matches!(harness.service.recommend("ghost", None).await, Err(Error::NotFound { .. })));
}

#[tokio::test]
async fn daily_digest_is_dedup_guarded_per_user() {
	let harness = Harness::new("");
	let recent = harness.index([0.0, 1.0, 0.0, 0.0], Duration::hours(5)).await;

	harness.index([0.0, 1.0, 0.0, 0.0], Duration::hours(40)).await;
	harness.service.ensure_user("u1", vec![0.0, 1.0, 0.0, 0.0]).await.expect("Create failed.");

	let held = harness.service.coord.try_claim(DAILY_NEWS_SET, "u1").expect("Claim should be free.");
	let blocked = harness.service.daily_digest_candidates("u1", 5).await.expect("Digest failed.");

	assert!(blocked.is_already_running());

	drop(held);

	let claim = harness.service.daily_digest_candidates("u1", 5).await.expect("Digest failed.");

	assert_eq!(claim, Claim::Ran(vec![recent]));
	assert!(!harness.service.coord.is_member(DAILY_NEWS_SET, "u1"));
}

#[tokio::test]
async fn failed_digest_releases_its_claim() {
	let harness = Harness::new("");
	let result = harness.service.daily_digest_candidates("ghost", 5).await;

	assert!(matches!(result, Err(Error::NotFound { .. })));
	assert!(!harness.service.coord.is_member(DAILY_NEWS_SET, "ghost"));
}

#[tokio::test]
async fn concurrent_identical_embeds_call_the_provider_once() {
	let harness = Harness::new("");

	harness.embedding.insert("same text", [0.0, 0.0, 1.0, 0.0], &[(3, 1.0)]);
	harness.embedding.set_delay(StdDuration::from_millis(50));

	let (first, second) = tokio::join!(
		harness.service.embed_cached("same text"),
		harness.service.embed_cached("same text")
	);

	assert_eq!(first.expect("Embed failed."), second.expect("Embed failed."));
	assert_eq!(harness.embedding.calls(), 1);

	let key = embedding::cache_key(&harness.service.cfg.providers.embedding, "same text");

	assert!(!harness.service.coord.is_member(EMBED_SET, &key));
}

#[tokio::test]
async fn waiters_retry_after_a_failed_embed() {
	let harness = Harness::new("");

	harness.embedding.set_delay(StdDuration::from_millis(20));

	let (first, second) = tokio::join!(
		harness.service.embed_cached("missing"),
		harness.service.embed_cached("missing")
	);

	assert!(matches!(first, Err(Error::Provider { .. })));
	assert!(matches!(second, Err(Error::Provider { .. })));
	assert_eq!(harness.embedding.calls(), 2);
}

#[tokio::test]
async fn recommendations_degrade_when_the_vector_index_is_down() {
	let harness = Harness::new("");
	let seed = harness.index([1.0, 0.0, 0.0, 0.0], Duration::hours(1)).await;

	harness.index([0.9, 0.1, 0.0, 0.0], Duration::hours(1)).await;
	harness.service.ensure_user("u1", vec![1.0, 0.0, 0.0, 0.0]).await.expect("Create failed.");
	harness.faults.set_vectors_down(true);

	let seeded = harness.service.recommend("u1", Some(seed)).await.expect("Recommend failed.");
	let unseeded = harness.service.recommend("u1", None).await.expect("Recommend failed.");

	assert!(seeded.is_empty());
	assert!(unseeded.is_empty());
	assert!(matches!(harness.service.recommend("ghost", None).await, Err(Error::NotFound { .. })));

	harness.faults.set_vectors_down(false);

	let recovered = harness.service.recommend("u1", Some(seed)).await.expect("Recommend failed.");

	assert_eq!(recovered.len(), 2);
}
