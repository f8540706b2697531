use std::time::Duration;

use tokio::{task::JoinHandle, time::MissedTickBehavior};

use crate::store::CoordinationStore;

/// Background task that expires lapsed entries and leases. Aborted on drop.
#[derive(Debug)]
pub struct Sweeper {
	handle: JoinHandle<()>,
}
impl Sweeper {
	pub(crate) fn spawn(store: CoordinationStore, every: Duration) -> Self {
		let handle = tokio::spawn(async move {
			let mut ticker = tokio::time::interval(every);

			ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

			loop {
				ticker.tick().await;

				let notified = store.sweep_expired();

				if notified > 0 {
					tracing::debug!(notified, "Coordination sweep expired entries.");
				}
			}
		});

		Self { handle }
	}

	pub fn is_running(&self) -> bool {
		!self.handle.is_finished()
	}

	pub fn shutdown(self) {
		self.handle.abort();
	}
}
impl Drop for Sweeper {
	fn drop(&mut self) {
		self.handle.abort();
	}
}
