use std::{
	future::Future,
	sync::{
		Arc, Mutex, MutexGuard, PoisonError,
		atomic::{AtomicU64, Ordering},
	},
	time::Duration,
};

use ahash::AHashMap;
use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;
use tokio::time::Instant;

use crate::{
	EXPIRED_CHANNEL, Error, LEASE_RECLAIMED_CHANNEL, Result,
	guard::{Claim, DedupGuard},
	pubsub::{self, Handler, Subscription, SubscriptionId},
	sweeper::Sweeper,
};

#[derive(Clone, Copy, Debug)]
pub struct CoordinationOptions {
	pub sweep_interval: Duration,
	/// Lease attached to every dedup membership. `None` keeps memberships until released.
	pub dedup_lease: Option<Duration>,
}
impl CoordinationOptions {
	pub fn from_config(cfg: &brief_config::Coordination) -> Self {
		Self {
			sweep_interval: Duration::from_millis(cfg.sweep_interval_ms),
			dedup_lease: cfg.dedup_lease_seconds.map(Duration::from_secs),
		}
	}
}
impl Default for CoordinationOptions {
	fn default() -> Self {
		Self { sweep_interval: Duration::from_millis(500), dedup_lease: None }
	}
}

struct Entry {
	value: Value,
	expires_at: Option<Instant>,
}
impl Entry {
	fn is_expired(&self, now: Instant) -> bool {
		self.expires_at.is_some_and(|deadline| deadline <= now)
	}
}

struct Membership {
	token: u64,
	lease_until: Option<Instant>,
}
impl Membership {
	fn is_lapsed(&self, now: Instant) -> bool {
		self.lease_until.is_some_and(|deadline| deadline <= now)
	}
}

#[derive(Default)]
struct State {
	entries: AHashMap<String, Entry>,
	sets: AHashMap<String, AHashMap<String, Membership>>,
	channels: AHashMap<String, Vec<Subscription>>,
}

/// Notifications collected under the lock and delivered after it is released.
#[derive(Default)]
struct Pending(Vec<(&'static str, Value, Vec<Subscription>)>);
impl Pending {
	fn push(&mut self, state: &State, channel: &'static str, message: Value) {
		let handlers = state.channels.get(channel).cloned().unwrap_or_default();

		self.0.push((channel, message, handlers));
	}

	fn deliver(self) -> usize {
		let count = self.0.len();

		for (channel, message, handlers) in self.0 {
			pubsub::dispatch(channel, &handlers, &message);
		}

		count
	}
}

struct Inner {
	state: Mutex<State>,
	options: CoordinationOptions,
	next_id: AtomicU64,
}

/// Process-wide key/value cache, dedup sets, and pub/sub behind one lock.
///
/// Cloning is cheap and every clone shares the same state. Handlers always run
/// after the lock is released, so a handler may call back into the store.
#[derive(Clone)]
pub struct CoordinationStore {
	inner: Arc<Inner>,
}
impl CoordinationStore {
	pub fn new(options: CoordinationOptions) -> Self {
		Self {
			inner: Arc::new(Inner {
				state: Mutex::new(State::default()),
				options,
				next_id: AtomicU64::new(1),
			}),
		}
	}

	pub fn options(&self) -> CoordinationOptions {
		self.inner.options
	}

	pub fn exists(&self, key: &str) -> bool {
		self.get(key).is_some()
	}

	pub fn get(&self, key: &str) -> Option<Value> {
		let mut pending = Pending::default();
		let value = {
			let mut state = self.lock();
			let now = Instant::now();

			let expired = state.entries.get(key).map(|entry| entry.is_expired(now));

			match expired {
				Some(true) => {
					expire_entry(&mut state, key, &mut pending);

					None
				},
				Some(false) => state.entries.get(key).map(|entry| entry.value.clone()),
				None => None,
			}
		};

		pending.deliver();

		value
	}

	pub fn get_as<T>(&self, key: &str) -> Result<Option<T>>
	where
		T: DeserializeOwned,
	{
		let Some(value) = self.get(key) else {
			return Ok(None);
		};

		serde_json::from_value(value)
			.map(Some)
			.map_err(|err| Error::Decode { key: key.to_string(), source: err })
	}

	/// Stores `value`, replacing any previous entry and its TTL.
	pub fn set(&self, key: &str, value: Value, ttl: Option<Duration>) {
		let expires_at = ttl.map(|ttl| Instant::now() + ttl);

		self.lock().entries.insert(key.to_string(), Entry { value, expires_at });
	}

	pub fn set_as<T>(&self, key: &str, value: &T, ttl: Option<Duration>) -> Result<()>
	where
		T: Serialize,
	{
		let value = serde_json::to_value(value)
			.map_err(|err| Error::Encode { key: key.to_string(), source: err })?;

		self.set(key, value, ttl);

		Ok(())
	}

	/// Removes an entry without announcing it.
	pub fn remove(&self, key: &str) -> Option<Value> {
		self.lock().entries.remove(key).map(|entry| entry.value)
	}

	/// Adds `member` to `set`. Returns `false` when it was already present.
	pub fn add_member(&self, set: &str, member: &str) -> bool {
		self.claim_token(set, member).is_some()
	}

	pub fn is_member(&self, set: &str, member: &str) -> bool {
		let mut pending = Pending::default();
		let present = {
			let mut state = self.lock();
			let now = Instant::now();
			let lapsed = match state.sets.get(set).and_then(|members| members.get(member)) {
				Some(membership) => membership.is_lapsed(now),
				None => return false,
			};

			if lapsed {
				reclaim_member(&mut state, set, member, &mut pending);
			}

			!lapsed
		};

		pending.deliver();

		present
	}

	pub fn remove_member(&self, set: &str, member: &str) -> bool {
		let mut state = self.lock();

		remove_membership(&mut state, set, member, None)
	}

	/// Atomically checks and claims `member`. The returned guard releases the claim on drop.
	pub fn try_claim(&self, set: &str, member: &str) -> Option<DedupGuard> {
		let token = self.claim_token(set, member)?;

		Some(DedupGuard::new(self.clone(), set, member, token))
	}

	/// Runs `work` only if no other caller currently holds the same claim.
	pub async fn run_exclusive<F, T>(&self, set: &str, member: &str, work: F) -> Claim<T>
	where
		F: Future<Output = T>,
	{
		let Some(guard) = self.try_claim(set, member) else {
			tracing::debug!(set, member, "Skipped work already claimed by another caller.");

			return Claim::AlreadyRunning;
		};
		let output = work.await;

		drop(guard);

		Claim::Ran(output)
	}

	pub fn subscribe(&self, channel: &str, handler: Handler) -> SubscriptionId {
		let id = SubscriptionId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));

		self.lock()
			.channels
			.entry(channel.to_string())
			.or_default()
			.push(Subscription { id, handler });

		id
	}

	pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
		let mut state = self.lock();
		let mut removed = false;

		for handlers in state.channels.values_mut() {
			let before = handlers.len();

			handlers.retain(|subscription| subscription.id != id);

			removed |= handlers.len() != before;
		}

		removed
	}

	/// Delivers `message` to every current subscriber of `channel` and returns how many ran.
	pub fn publish(&self, channel: &str, message: &Value) -> usize {
		let handlers = self.lock().channels.get(channel).cloned().unwrap_or_default();

		pubsub::dispatch(channel, &handlers, message)
	}

	/// Expires every lapsed entry and lease. Returns the number of notifications sent.
	pub fn sweep_expired(&self) -> usize {
		let mut pending = Pending::default();

		{
			let mut state = self.lock();
			let now = Instant::now();
			let expired: Vec<String> = state
				.entries
				.iter()
				.filter(|(_, entry)| entry.is_expired(now))
				.map(|(key, _)| key.clone())
				.collect();

			for key in expired {
				expire_entry(&mut state, &key, &mut pending);
			}

			let lapsed: Vec<(String, String)> = state
				.sets
				.iter()
				.flat_map(|(set, members)| {
					members
						.iter()
						.filter(|(_, membership)| membership.is_lapsed(now))
						.map(move |(member, _)| (set.clone(), member.clone()))
				})
				.collect();

			for (set, member) in lapsed {
				reclaim_member(&mut state, &set, &member, &mut pending);
			}
		}

		pending.deliver()
	}

	/// Starts the periodic sweep on the current tokio runtime.
	pub fn spawn_sweeper(&self) -> Sweeper {
		Sweeper::spawn(self.clone(), self.inner.options.sweep_interval)
	}

	pub(crate) fn renew_claim(&self, set: &str, member: &str, token: u64) -> bool {
		let Some(lease) = self.inner.options.dedup_lease else {
			return self.owns_claim(set, member, token);
		};
		let mut state = self.lock();

		match state.sets.get_mut(set).and_then(|members| members.get_mut(member)) {
			Some(membership) if membership.token == token => {
				membership.lease_until = Some(Instant::now() + lease);

				true
			},
			_ => false,
		}
	}

	pub(crate) fn release_claim(&self, set: &str, member: &str, token: u64) -> bool {
		let mut state = self.lock();

		remove_membership(&mut state, set, member, Some(token))
	}

	fn owns_claim(&self, set: &str, member: &str, token: u64) -> bool {
		self.lock()
			.sets
			.get(set)
			.and_then(|members| members.get(member))
			.is_some_and(|membership| membership.token == token)
	}

	fn claim_token(&self, set: &str, member: &str) -> Option<u64> {
		let mut pending = Pending::default();
		let token = {
			let mut state = self.lock();
			let now = Instant::now();
			let lapsed = state
				.sets
				.get(set)
				.and_then(|members| members.get(member))
				.map(|membership| membership.is_lapsed(now));

			match lapsed {
				Some(false) => None,
				Some(true) | None => {
					if lapsed == Some(true) {
						reclaim_member(&mut state, set, member, &mut pending);
					}

					let token = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
					let lease_until = self.inner.options.dedup_lease.map(|lease| now + lease);

					state
						.sets
						.entry(set.to_string())
						.or_default()
						.insert(member.to_string(), Membership { token, lease_until });

					Some(token)
				},
			}
		};

		pending.deliver();

		token
	}

	fn lock(&self) -> MutexGuard<'_, State> {
		self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
	}
}

fn expire_entry(state: &mut State, key: &str, pending: &mut Pending) {
	if let Some(entry) = state.entries.remove(key) {
		let message = serde_json::json!({ "key": key, "value": entry.value });

		pending.push(state, EXPIRED_CHANNEL, message);
	}
}

fn reclaim_member(state: &mut State, set: &str, member: &str, pending: &mut Pending) {
	if remove_membership(state, set, member, None) {
		tracing::warn!(set, member, "Reclaimed dedup membership after its lease lapsed.");

		pending.push(state, LEASE_RECLAIMED_CHANNEL, serde_json::json!({ "set": set, "member": member }));
	}
}

fn remove_membership(state: &mut State, set: &str, member: &str, token: Option<u64>) -> bool {
	let Some(members) = state.sets.get_mut(set) else {
		return false;
	};
	let owned = match (members.get(member), token) {
		(Some(membership), Some(token)) => membership.token == token,
		(Some(_), None) => true,
		(None, _) => false,
	};

	if owned {
		members.remove(member);

		if members.is_empty() {
			state.sets.remove(set);
		}
	}

	owned
}

impl std::fmt::Debug for CoordinationStore {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		let state = self.lock();

		f.debug_struct("CoordinationStore")
			.field("entries", &state.entries.len())
			.field("sets", &state.sets.len())
			.field("channels", &state.channels.len())
			.field("options", &self.inner.options)
			.finish()
	}
}
