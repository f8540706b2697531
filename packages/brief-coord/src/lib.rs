mod error;
mod guard;
mod pubsub;
mod store;
mod sweeper;

pub use error::{Error, Result};
pub use guard::{Claim, DedupGuard};
pub use pubsub::{Handler, SubscriptionId};
pub use store::{CoordinationOptions, CoordinationStore};
pub use sweeper::Sweeper;

/// Channel announcing entries removed by TTL expiry, with `{"key", "value"}` payloads.
pub const EXPIRED_CHANNEL: &str = "expired";
/// Channel announcing dedup memberships whose lease ran out, with `{"set", "member"}` payloads.
pub const LEASE_RECLAIMED_CHANNEL: &str = "lease_reclaimed";
