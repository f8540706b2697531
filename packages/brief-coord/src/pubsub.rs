use std::{
	panic::{self, AssertUnwindSafe},
	sync::Arc,
};

use serde_json::Value;

pub type Handler = Arc<dyn Fn(&Value) -> color_eyre::Result<()> + Send + Sync>;

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct SubscriptionId(pub(crate) u64);

#[derive(Clone)]
pub(crate) struct Subscription {
	pub(crate) id: SubscriptionId,
	pub(crate) handler: Handler,
}

/// Runs every handler in order. Failures are logged and never reach the publisher.
pub(crate) fn dispatch(channel: &str, handlers: &[Subscription], message: &Value) -> usize {
	for subscription in handlers {
		let outcome = panic::catch_unwind(AssertUnwindSafe(|| (subscription.handler)(message)));

		match outcome {
			Ok(Ok(())) => {},
			Ok(Err(err)) => {
				tracing::error!(
					channel,
					subscription = subscription.id.0,
					error = %err,
					"Subscriber failed to handle message."
				);
			},
			Err(payload) => {
				let reason = payload
					.downcast_ref::<&str>()
					.map(|reason| reason.to_string())
					.or_else(|| payload.downcast_ref::<String>().cloned())
					.unwrap_or_else(|| "unknown panic".to_string());

				tracing::error!(
					channel,
					subscription = subscription.id.0,
					reason = %reason,
					"Subscriber panicked while handling message."
				);
			},
		}
	}

	handlers.len()
}
