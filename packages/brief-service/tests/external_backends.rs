mod support;

use std::sync::Arc;

use time::{Duration, OffsetDateTime};

use brief_coord::{CoordinationOptions, CoordinationStore};
use brief_service::{BriefService, NewItem, Providers};
use brief_testkit::TestDatabase;
use support::{StubEmbedding, test_config};

#[tokio::test]
#[ignore = "Requires external Postgres and Qdrant. Set BRIEF_PG_DSN and BRIEF_QDRANT_URL to run."]
async fn ingest_and_recommend_through_postgres_and_qdrant() {
	let (Some(base_dsn), Some(qdrant_url)) =
		(brief_testkit::env_dsn(), brief_testkit::env_qdrant_url())
	else {
		eprintln!("Skipping ingest_and_recommend_through_postgres_and_qdrant; set BRIEF_PG_DSN.");

		return;
	};
	let test_db = TestDatabase::new(&base_dsn).await.expect("Failed to create test database.");
	let collection = test_db.collection_name("brief_items");
	let mut cfg = test_config("");

	cfg.storage.postgres.dsn = test_db.dsn().to_string();
	cfg.storage.qdrant.url = qdrant_url;
	cfg.storage.qdrant.collection = collection;

	let embedding = Arc::new(StubEmbedding::default());

	embedding.insert("Central bank holds rates", [1.0, 0.0, 0.0, 0.0], &[(4, 1.0)]);
	embedding.insert("Harvest season begins", [0.0, 1.0, 0.0, 0.0], &[(8, 1.0)]);

	let service = BriefService::connect(cfg, CoordinationStore::new(CoordinationOptions::default()))
		.await
		.expect("Failed to connect service.");
	let service = BriefService::with_providers(
		service.cfg,
		service.coord,
		service.backends,
		Providers::new(embedding),
	);
	let mut ids = Vec::new();

	for (title, link) in [
		("Central bank holds rates", "https://www.reuters.com/rates"),
		("Harvest season begins", "https://example.org/harvest"),
	] {
		let item = NewItem {
			title: title.to_string(),
			link: link.to_string(),
			published_at: OffsetDateTime::now_utc() - Duration::hours(1),
			summary: None,
		};
		let ingested = service
			.ingest_item(&item)
			.await
			.expect("Ingest failed.")
			.ran()
			.expect("Ingest should run.");

		ids.push(ingested.item.item_id);
	}

	service.ensure_user("u1", vec![0.9, 0.1, 0.0, 0.0]).await.expect("Create failed.");

	let recommended = service.recommend("u1", None).await.expect("Recommend failed.");

	assert_eq!(recommended.first(), Some(&ids[0]));

	let hybrid =
		service.search_hybrid("Harvest season begins", 1, &[], None).await.expect("Search failed.");

	assert_eq!(hybrid, vec![ids[1]]);
	assert_eq!(service.purge_expired().await.expect("Purge failed."), 0);

	test_db.cleanup().await.expect("Failed to cleanup test database.");
}
