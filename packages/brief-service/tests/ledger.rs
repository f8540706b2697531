mod support;

use std::collections::HashSet;

use time::Duration;
use tokio::task::JoinSet;
use uuid::Uuid;

use brief_domain::weighting::ActionKind;
use brief_service::{Error, ListenEvent};
use support::{Harness, assert_close};

fn like(item_id: Uuid) -> ListenEvent {
	ListenEvent {
		item_id,
		actions: HashSet::from([ActionKind::Like]),
		listen_duration_seconds: 0.0,
		stop_position_seconds: 0.0,
		total_duration_seconds: 100.0,
		..Default::default()
	}
}

#[tokio::test]
async fn batch_fold_resets_accumulator_and_nudges_realtime() {
	let harness = Harness::new("");
	let service = &harness.service;

	service.ensure_user("u1", vec![1.0, 0.0, 0.0, 0.0]).await.expect("Failed to create user.");

	for _ in 0..9 {
		let outcome = service
			.record_interaction("u1", &[0.0, 1.0, 0.0, 0.0], 1.0)
			.await
			.expect("Failed to record.");

		assert!(!outcome.batch_folded);
	}

	let outcome =
		service.record_interaction("u1", &[0.0, 1.0, 0.0, 0.0], 1.0).await.expect("Failed.");

	assert!(outcome.batch_folded);

	let state = service.preferences("u1").await.expect("Load failed.").expect("User exists.");

	assert_eq!(state.batch_count, 0);
	assert_eq!(state.batch_total_weight, 0.0);
	assert_eq!(state.batched_vector, vec![0.0; 4]);
	assert_close(&state.realtime_vector, &[0.9, 0.1, 0.0, 0.0]);
	assert_eq!(state.daily_listen_count, 10);
}

#[tokio::test]
async fn zero_total_weight_folds_a_zero_mean() {
	let harness = Harness::new("[preference]\nbatch_size = 2");
	let service = &harness.service;

	service.ensure_user("u1", vec![0.0, 0.0, 1.0, 0.0]).await.expect("Failed to create user.");
	service.record_interaction("u1", &[5.0, 0.0, 0.0, 0.0], 1.0).await.expect("Failed.");
	service.record_interaction("u1", &[5.0, 0.0, 0.0, 0.0], -1.0).await.expect("Failed.");

	let state = service.preferences("u1").await.expect("Load failed.").expect("User exists.");

	assert_close(&state.realtime_vector, &[0.0, 0.0, 0.9, 0.0]);
	assert!(state.realtime_vector.iter().all(|value| value.is_finite()));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_updates_for_one_user_are_serialized() {
	let harness = Harness::new("");

	harness.service.ensure_user("u1", vec![0.0; 4]).await.expect("Failed to create user.");

	let mut tasks = JoinSet::new();

	for _ in 0..25 {
		let service = harness.service.clone();

		tasks.spawn(async move {
			service.record_interaction("u1", &[1.0, 0.0, 0.0, 0.0], 1.0).await.map(|_| ())
		});
	}

	while let Some(joined) = tasks.join_next().await {
		joined.expect("Task panicked.").expect("Record failed.");
	}

	let state =
		harness.service.preferences("u1").await.expect("Load failed.").expect("User exists.");

	assert_eq!(state.batch_count, 5);
	assert_eq!(state.batch_total_weight, 5.0);
	assert_eq!(state.daily_listen_count, 25);
	assert_eq!(state.daily_total_weight, 25.0);
}

#[tokio::test]
async fn ensure_user_is_idempotent_and_validates_dimension() {
	let harness = Harness::new("");
	let service = &harness.service;

	assert!(service.ensure_user("u1", vec![1.0, 0.0, 0.0, 0.0]).await.expect("Create failed."));
	assert!(!service.ensure_user("u1", vec![0.0, 1.0, 0.0, 0.0]).await.expect("Create failed."));

	let state = service.preferences("u1").await.expect("Load failed.").expect("User exists.");

	assert_eq!(state.realtime_vector, vec![1.0, 0.0, 0.0, 0.0]);
	assert_eq!(state.prev_day_vector, vec![1.0, 0.0, 0.0, 0.0]);
	assert!(matches!(
		service.ensure_user("u2", vec![1.0; 3]).await,
		Err(Error::InvalidRequest { .. })
	));
	assert!(matches!(service.ensure_user(" ", vec![1.0; 4]).await, Err(Error::InvalidRequest { .. })));
}

#[tokio::test]
async fn recording_for_an_unknown_user_is_not_found() {
	let harness = Harness::new("");

	assert!(matches!(
		harness.service.record_interaction("ghost", &[1.0; 4], 1.0).await,
		Err(Error::NotFound { .. })
	));
}

#[tokio::test]
async fn listens_are_damped_by_prior_plays_until_hidden() {
	let harness = Harness::new("");
	let service = &harness.service;
	let item_id = harness.index([1.0, 0.0, 0.0, 0.0], Duration::hours(1)).await;

	service.ensure_user("u1", vec![0.0, 1.0, 0.0, 0.0]).await.expect("Failed to create user.");

	let mut expected = 0.0;

	for weight in [1.0, 1.0, (-1.0_f32).exp()] {
		assert!(service.log_listen("u1", &like(item_id)).await.expect("Listen failed."));

		expected += weight;

		let state = service.preferences("u1").await.expect("Load failed.").expect("User exists.");

		assert!((state.batch_total_weight - expected).abs() < 1e-5);
	}

	assert!(service.hide_item("u1", item_id).await.expect("Hide failed."));
	assert!(service.log_listen("u1", &like(item_id)).await.expect("Listen failed."));

	let state = service.preferences("u1").await.expect("Load failed.").expect("User exists.");

	assert!((state.batch_total_weight - (expected + 1.0)).abs() < 1e-5);
	assert_eq!(state.batch_count, 4);
}

#[tokio::test]
async fn all_time_policy_keeps_counting_hidden_plays() {
	let harness = Harness::new("[preference]\nreplay_policy = \"all_time\"");
	let service = &harness.service;
	let item_id = harness.index([1.0, 0.0, 0.0, 0.0], Duration::hours(1)).await;

	service.ensure_user("u1", vec![0.0, 1.0, 0.0, 0.0]).await.expect("Failed to create user.");
	service.log_listen("u1", &like(item_id)).await.expect("Listen failed.");
	service.log_listen("u1", &like(item_id)).await.expect("Listen failed.");
	service.hide_item("u1", item_id).await.expect("Hide failed.");
	service.log_listen("u1", &like(item_id)).await.expect("Listen failed.");

	let state = service.preferences("u1").await.expect("Load failed.").expect("User exists.");

	assert!((state.batch_total_weight - (2.0 + (-1.0_f32).exp())).abs() < 1e-5);
}

#[tokio::test]
async fn listen_for_an_item_without_embedding_changes_nothing() {
	let harness = Harness::new("");
	let service = &harness.service;

	service.ensure_user("u1", vec![0.0, 1.0, 0.0, 0.0]).await.expect("Failed to create user.");

	assert!(!service.log_listen("u1", &like(Uuid::new_v4())).await.expect("Listen failed."));

	let state = service.preferences("u1").await.expect("Load failed.").expect("User exists.");

	assert_eq!(state.batch_count, 0);
	assert_eq!(state.daily_listen_count, 0);
}

#[tokio::test]
async fn non_finite_listen_fields_are_rejected() {
	let harness = Harness::new("");
	let item_id = harness.index([1.0, 0.0, 0.0, 0.0], Duration::hours(1)).await;
	let event = ListenEvent { stop_position_seconds: f32::NAN, ..like(item_id) };

	harness.service.ensure_user("u1", vec![0.0; 4]).await.expect("Failed to create user.");

	assert!(matches!(
		harness.service.log_listen("u1", &event).await,
		Err(Error::InvalidRequest { .. })
	));
}

#[tokio::test]
async fn fold_daily_all_moves_daily_evidence_into_prev_day() {
	let harness = Harness::new("");
	let service = &harness.service;

	service.ensure_user("u1", vec![1.0, 0.0, 0.0, 0.0]).await.expect("Failed to create user.");
	service.ensure_user("u2", vec![0.0, 0.0, 0.0, 1.0]).await.expect("Failed to create user.");
	service.record_interaction("u1", &[0.0, 2.0, 0.0, 0.0], 0.5).await.expect("Failed.");

	let report = service.fold_daily_all().await.expect("Fold failed.");

	assert_eq!(report.folded, 2);
	assert!(report.failed.is_empty());

	let u1 = service.preferences("u1").await.expect("Load failed.").expect("User exists.");
	let u2 = service.preferences("u2").await.expect("Load failed.").expect("User exists.");

	assert_close(&u1.prev_day_vector, &[0.8, 0.4, 0.0, 0.0]);
	assert_eq!(u1.daily_listen_count, 0);
	assert_eq!(u1.daily_vector, vec![0.0; 4]);
	assert_close(&u2.prev_day_vector, &[0.0, 0.0, 0.0, 0.8]);
}
