//! Chain event monitor (spec §4.D): one worker per configured chain,
//! subscribed to the *Signal* contract's log topics, handing deduplicated
//! `SignalSent` events to the signing coordinator.
//!
//! The concrete RPC client is out of this repo's scope (§1 places
//! destination-chain contracts and their tooling out of scope) — a real
//! deployment implements [`ChainProvider`] per chain family. What lives
//! here is the part the spec actually constrains: backoff, dedup,
//! confirmation depth, and the `healthCheck` contract the `/health`
//! endpoint reads.

use std::{
	collections::VecDeque,
	sync::{
		atomic::{AtomicBool, AtomicU64, Ordering},
		Arc,
	},
	time::{Duration, Instant},
};

use async_trait::async_trait;
use rand::Rng;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, info_span, warn, Instrument};

use crate::signal::SignalEvent;

/// Minimum dedup-ring capacity mandated by the spec ("K >= 10 000").
pub const MIN_DEDUP_CAPACITY: usize = 10_000;

const BACKOFF_BASE: Duration = Duration::from_secs(1);
const BACKOFF_CAP: Duration = Duration::from_secs(30);
const BACKOFF_JITTER: f64 = 0.2;

/// A raw log observed on a source chain, before confirmation-depth
/// filtering. `SignalReceived` logs are observational only (spec §4.D) and
/// are reported through [`RawLog::Received`] purely so a provider
/// implementation has somewhere to put them; the monitor does not forward
/// them to the signing coordinator.
#[derive(Debug, Clone)]
pub enum RawLog {
	Sent { event: SignalEvent, block_depth_available: u64 },
	Received { signal_id: [u8; 32] },
}

/// What a concrete chain RPC client has to provide. Implementations own
/// reconnection at the transport level; the worker in this module owns
/// the retry *policy* (backoff, jitter) around calls to `poll`.
#[async_trait]
pub trait ChainProvider: Send + Sync {
	/// Chain identifier this provider serves, matching `SignalEvent::chain_id`.
	fn chain_id(&self) -> u32;

	/// Confirmation depth required before a log is considered final
	/// (spec §4.D reorg policy): 12 for Ethereum-family chains, as low as
	/// 1 for optimistic L2s, operator-configured per chain.
	fn confirmation_depth(&self) -> u64;

	/// Poll for new logs since the last call. Transient failures should be
	/// returned as `Err`; the worker applies backoff and retries.
	async fn poll(&self) -> anyhow::Result<Vec<RawLog>>;
}

/// Bounded, insertion-order dedup set of the last `K` observed signal ids
/// (spec §4.D). A `VecDeque` plus a side `HashSet` gives O(1) membership
/// and O(1) eviction of the oldest entry; a real node persists this
/// (spec §6 "Persisted state") but an in-memory ring is explicitly
/// permitted if the monitor tolerates `K` redelivered events on restart.
pub struct DedupRing {
	capacity: usize,
	order: VecDeque<[u8; 32]>,
	seen: std::collections::HashSet<[u8; 32]>,
}

impl DedupRing {
	pub fn new(capacity: usize) -> Self {
		let capacity = capacity.max(MIN_DEDUP_CAPACITY);
		Self { capacity, order: VecDeque::with_capacity(capacity), seen: Default::default() }
	}

	/// Returns `true` if `id` had not been seen before, and records it.
	pub fn insert(&mut self, id: [u8; 32]) -> bool {
		if !self.seen.insert(id) {
			return false
		}
		self.order.push_back(id);
		if self.order.len() > self.capacity {
			if let Some(evicted) = self.order.pop_front() {
				self.seen.remove(&evicted);
			}
		}
		true
	}

	pub fn len(&self) -> usize {
		self.order.len()
	}

	pub fn is_empty(&self) -> bool {
		self.order.is_empty()
	}
}

#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct ChainHealth {
	pub healthy: bool,
	pub latency_ms: u64,
}

/// One worker per configured chain (spec §4.D). Owns the provider, the
/// backoff state, and the dedup ring for that chain; forwards confirmed
/// `SignalSent` events to `out`.
pub struct ChainWorker {
	provider: Box<dyn ChainProvider>,
	dedup: Mutex<DedupRing>,
	last_latency_ms: AtomicU64,
	healthy: AtomicBool,
	stopped: AtomicBool,
}

impl ChainWorker {
	pub fn new(provider: Box<dyn ChainProvider>, dedup_capacity: usize) -> Arc<Self> {
		Arc::new(Self {
			provider,
			dedup: Mutex::new(DedupRing::new(dedup_capacity)),
			last_latency_ms: AtomicU64::new(0),
			healthy: AtomicBool::new(false),
			stopped: AtomicBool::new(false),
		})
	}

	pub fn chain_id(&self) -> u32 {
		self.provider.chain_id()
	}

	/// `healthCheck()` (spec §4.D), fed into the ambient `/health` endpoint.
	pub fn health_check(&self) -> ChainHealth {
		ChainHealth {
			healthy: self.healthy.load(Ordering::Relaxed),
			latency_ms: self.last_latency_ms.load(Ordering::Relaxed),
		}
	}

	pub fn dedup_len(&self) -> usize {
		// Best-effort for metrics; does not block a concurrent poll.
		self.dedup.try_lock().map(|g| g.len()).unwrap_or(0)
	}

	/// Detach: stop polling. `run` observes this within one poll interval
	/// and returns, which is how the supervisor enforces the 5s drain
	/// budget in `stop()` (spec §4.D termination, §5 shutdown).
	pub fn stop(&self) {
		self.stopped.store(true, Ordering::Relaxed);
	}

	/// Poll loop with exponential backoff (base 1s, cap 30s, +-20% jitter)
	/// on transport failure, confirmation-depth filtering, and dedup.
	/// Confirmed, novel `SignalSent` logs are sent on `out`.
	pub async fn run(self: Arc<Self>, out: mpsc::UnboundedSender<SignalEvent>) {
		let span = info_span!("chain-monitor", chain_id = self.chain_id());
		async move {
			let mut backoff = BACKOFF_BASE;
			while !self.stopped.load(Ordering::Relaxed) {
				let started = Instant::now();
				match self.provider.poll().await {
					Ok(logs) => {
						self.last_latency_ms.store(started.elapsed().as_millis() as u64, Ordering::Relaxed);
						self.healthy.store(true, Ordering::Relaxed);
						backoff = BACKOFF_BASE;

						for log in logs {
							self.handle_log(log, &out).await;
						}
					},
					Err(error) => {
						self.healthy.store(false, Ordering::Relaxed);
						warn!(%error, backoff_ms = backoff.as_millis() as u64, "Chain RPC poll failed, backing off");
						tokio::time::sleep(jittered(backoff)).await;
						backoff = (backoff * 2).min(BACKOFF_CAP);
						continue
					},
				}
			}
			info!("Chain monitor stopped");
		}
		.instrument(span)
		.await
	}

	async fn handle_log(&self, log: RawLog, out: &mpsc::UnboundedSender<SignalEvent>) {
		match log {
			RawLog::Sent { event, block_depth_available } => {
				if block_depth_available < self.provider.confirmation_depth() {
					debug!(
						signal_id = hex::encode(event.signal_id),
						depth = block_depth_available,
						required = self.provider.confirmation_depth(),
						"Signal not yet at confirmation depth, deferring"
					);
					return
				}

				let novel = self.dedup.lock().await.insert(event.signal_id);
				if !novel {
					debug!(signal_id = hex::encode(event.signal_id), "Duplicate signal, dropping");
					return
				}

				if out.send(event).is_err() {
					warn!("Signing coordinator channel closed, dropping signal");
				}
			},
			RawLog::Received { signal_id } => {
				debug!(signal_id = hex::encode(signal_id), "Observed SignalReceived (observational only)");
			},
		}
	}
}

fn jittered(base: Duration) -> Duration {
	let jitter_frac = rand::thread_rng().gen_range(-BACKOFF_JITTER..=BACKOFF_JITTER);
	let millis = (base.as_millis() as f64) * (1.0 + jitter_frac);
	Duration::from_millis(millis.max(0.0) as u64)
}
