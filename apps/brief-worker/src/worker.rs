use std::{sync::Arc, time::Duration as StdDuration};

use color_eyre::Result;
use serde_json::Value;
use time::{Duration, OffsetDateTime};
use tokio::time as tokio_time;

use brief_coord::{EXPIRED_CHANNEL, Handler};
use brief_service::{BriefService, FoldReport};

const POLL_INTERVAL_MS: u64 = 1_000;

/// When the periodic jobs last ran. Purge runs on the first tick; folds wait a full interval.
#[derive(Clone, Copy, Debug)]
pub struct Schedule {
	pub fold_every: Duration,
	pub purge_every: Duration,
	pub last_fold: OffsetDateTime,
	pub last_purge: Option<OffsetDateTime>,
}
impl Schedule {
	pub fn from_config(cfg: &brief_config::Lifecycle, now: OffsetDateTime) -> Self {
		Self {
			fold_every: Duration::hours(i64::from(cfg.fold_all_interval_hours)),
			purge_every: Duration::hours(i64::from(cfg.purge_interval_hours)),
			last_fold: now,
			last_purge: None,
		}
	}

	pub fn fold_due(&self, now: OffsetDateTime) -> bool {
		now - self.last_fold >= self.fold_every
	}

	pub fn purge_due(&self, now: OffsetDateTime) -> bool {
		self.last_purge.is_none_or(|last| now - last >= self.purge_every)
	}
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct TickReport {
	pub folded: Option<FoldReport>,
	pub purged: Option<u64>,
}

pub async fn run_worker(service: BriefService) -> Result<()> {
	let sweeper = service.coord.spawn_sweeper();
	let subscription = service.coord.subscribe(EXPIRED_CHANNEL, expired_logger());
	let mut schedule = Schedule::from_config(&service.cfg.lifecycle, OffsetDateTime::now_utc());

	tracing::info!(
		fold_every_hours = service.cfg.lifecycle.fold_all_interval_hours,
		purge_every_hours = service.cfg.lifecycle.purge_interval_hours,
		"Worker schedule armed."
	);

	loop {
		tick(&service, &mut schedule, OffsetDateTime::now_utc()).await;

		if !sweeper.is_running() {
			service.coord.unsubscribe(subscription);

			return Err(color_eyre::eyre::eyre!("Coordination sweeper stopped unexpectedly."));
		}

		tokio_time::sleep(StdDuration::from_millis(POLL_INTERVAL_MS)).await;
	}
}

/// Runs whichever periodic jobs are due. Failures are logged and retried on a later tick.
pub async fn tick(
	service: &BriefService,
	schedule: &mut Schedule,
	now: OffsetDateTime,
) -> TickReport {
	let mut report = TickReport::default();

	if schedule.fold_due(now) {
		match service.fold_daily_all().await {
			Ok(folds) => {
				tracing::info!(
					folded = folds.folded,
					failed = folds.failed.len(),
					"Folded daily preferences for all users."
				);

				schedule.last_fold = now;
				report.folded = Some(folds);
			},
			Err(err) => tracing::error!(error = %err, "Daily preference fold failed."),
		}
	}
	if schedule.purge_due(now) {
		match service.purge_expired().await {
			Ok(deleted) => {
				schedule.last_purge = Some(now);
				report.purged = Some(deleted);
			},
			Err(err) => tracing::error!(error = %err, "Expired item purge failed."),
		}
	}

	report
}

pub fn expired_logger() -> Handler {
	Arc::new(|message: &Value| -> Result<()> {
		let key = message.get("key").and_then(Value::as_str).unwrap_or_default();

		tracing::debug!(key, "Coordination entry expired.");

		Ok(())
	})
}
