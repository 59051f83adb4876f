//! Signing coordinator (spec §4.E): turns each `SignalEvent` into a signing
//! ceremony request, selects participants, drives the ceremony to
//! completion through [`MultisigClientApi`], and emits the aggregated
//! signature.
//!
//! The partial-signature collection and cryptographic aggregation
//! themselves are the multisig crate's job (`ceremony_manager`,
//! `client::signing`): this module is the layer above it that (a) decides
//! *who* signs (participant selection, heartbeat-gated) and (b) re-verifies
//! the finished signature against the group public key as a last line of
//! defence against a coordinator bug (spec §4.E "Aggregation").
//!
//! [`SigningCoordinator::on_partial_signature`] exists as an admission-check
//! primitive (spec scenario 5, "partial from non-selected party") but is not
//! on the live wire path: `bridge::route_incoming` forwards `Ceremony`
//! envelopes straight to the ceremony manager, which enforces "no partials
//! from outside the participant set" itself (the multisig crate's own
//! `all_ids` membership check in its generic broadcast stage). Treat
//! `on_partial_signature` as a unit-testable seam for that rule, not as
//! production admission control.

use std::{
	collections::{BTreeMap, BTreeSet, HashMap, HashSet},
	sync::Arc,
	time::{Duration, Instant},
};

use multisig::{Bus, CryptoScheme, KeyId, MultisigClientApi, PartyId, WireMessage};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{info, info_span, warn, Instrument};

use crate::signal::{canonical_message, RequestId, SignalEvent, SignalId};

/// How long a party's last heartbeat may age before it is no longer
/// "available" for participant selection (spec §4.E, default H=10s).
pub const DEFAULT_HEARTBEAT_WINDOW: Duration = Duration::from_secs(10);

/// Deadline for `AWAITING_PARTIALS -> DONE`, spec §4.E state machine.
pub const SIGNING_TIMEOUT: Duration = Duration::from_secs(30);

pub const KEYGEN_REQUEST_IGNORED: &str = "S0";
pub const SIGNING_CEREMONY_FAILED: &str = "S2";
pub const SIGNING_NOT_SELECTED: &str = "S3";

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CoordinatorFailure {
	#[error("this party was not selected to participate")]
	NotSelected,
	#[error("partial signature from a party outside the selected participant set")]
	UnexpectedParticipant,
	#[error("fewer than the threshold of valid partials were collected before the deadline")]
	InsufficientPartials,
	#[error("aggregated signature failed verification against the group public key")]
	AggregationInvalid,
	#[error("signing ceremony timed out waiting for partials")]
	Timeout,
	#[error("key store unavailable: {0}")]
	KeyStoreUnavailable(String),
}

impl CoordinatorFailure {
	pub fn log(&self, request_id: RequestId) {
		match self {
			CoordinatorFailure::NotSelected => {
				info!(tag = SIGNING_NOT_SELECTED, %request_id, "Not selected for signing request");
			},
			CoordinatorFailure::UnexpectedParticipant => {
				warn!(tag = KEYGEN_REQUEST_IGNORED, %request_id, "Rejected partial from unexpected participant");
			},
			_ => {
				warn!(tag = SIGNING_CEREMONY_FAILED, %request_id, reason = %self, "Signing ceremony failed");
			},
		}
	}
}

/// Deterministic participant selection (spec §4.E): the first `t` party
/// ids in ascending order that answered the most recent heartbeat within
/// the configured window. `HashRotation` is the spec's permitted
/// alternative (§9 redesign flag: "hard-coded to [1,2,3]... a deterministic
/// rotation by signalId is recommended"), spreading load across the
/// committee while remaining equally auditable — every party computes the
/// same rotation from `signal_id` alone, no coordination required.
#[derive(Clone, Copy, Debug)]
pub enum SelectionPolicy {
	FirstAvailable,
	HashRotation,
}

impl SelectionPolicy {
	fn select(
		&self,
		signal_id: &SignalId,
		available: &BTreeSet<PartyId>,
		threshold: u32,
	) -> Option<BTreeSet<PartyId>> {
		let t = threshold as usize;
		if available.len() < t {
			return None
		}
		match self {
			SelectionPolicy::FirstAvailable => Some(available.iter().take(t).copied().collect()),
			SelectionPolicy::HashRotation => {
				use sha2::{Digest, Sha256};
				let all: Vec<PartyId> = available.iter().copied().collect();
				let mut hasher = Sha256::new();
				hasher.update(signal_id);
				let digest: [u8; 32] = hasher.finalize().into();
				let offset = u64::from_be_bytes(digest[..8].try_into().unwrap()) as usize % all.len();
				let rotated = all.iter().cycle().skip(offset).take(all.len()).copied().collect::<Vec<_>>();
				Some(rotated.into_iter().take(t).collect())
			},
		}
	}
}

/// Tracks the last time each party's heartbeat was observed, used to
/// compute the "available" set participant selection draws from.
#[derive(Default)]
pub struct HeartbeatTracker {
	last_seen: Mutex<HashMap<PartyId, Instant>>,
}

impl HeartbeatTracker {
	pub fn new() -> Self {
		Self::default()
	}

	pub async fn record(&self, party: PartyId) {
		self.last_seen.lock().await.insert(party, Instant::now());
	}

	pub async fn available(&self, all_parties: &BTreeSet<PartyId>, window: Duration) -> BTreeSet<PartyId> {
		let last_seen = self.last_seen.lock().await;
		let now = Instant::now();
		all_parties
			.iter()
			.copied()
			.filter(|p| last_seen.get(p).is_some_and(|seen| now.duration_since(*seen) <= window))
			.collect()
	}
}

/// `(partyId, sigma_i, PubShare_i)` (spec §3), as it arrives over the bus
/// ahead of (or alongside) the ceremony engine's own view of the same
/// data.
#[derive(Clone, Debug)]
pub struct PartialSignature {
	pub party_id: PartyId,
	pub sigma_i: Vec<u8>,
	pub pub_share_i: Vec<u8>,
}

#[derive(Clone, Debug, PartialEq)]
enum RequestState {
	New,
	AwaitingPartials,
	Aggregating,
	Done,
	Failed(CoordinatorFailure),
}

struct RequestRecord {
	state: RequestState,
	participants: BTreeSet<PartyId>,
	partials: BTreeMap<PartyId, PartialSignature>,
	started: Instant,
}

/// Drives the signing ceremony lifecycle for one key. One coordinator
/// instance per `(key_id, crypto scheme)` — the spec's single aggregated
/// key per committee (§1) means a real deployment only ever constructs one.
pub struct SigningCoordinator<C: CryptoScheme, Client: MultisigClientApi<C>> {
	my_id: PartyId,
	key_id: KeyId,
	group_public_key: C::PublicKey,
	threshold: u32,
	all_parties: BTreeSet<PartyId>,
	selection: SelectionPolicy,
	heartbeat_window: Duration,
	heartbeats: HeartbeatTracker,
	client: Arc<Client>,
	bus: Arc<dyn Bus>,
	requests: Mutex<HashMap<RequestId, RequestRecord>>,
	completed_signals: Mutex<HashSet<SignalId>>,
}

impl<C: CryptoScheme, Client: MultisigClientApi<C>> SigningCoordinator<C, Client> {
	#[allow(clippy::too_many_arguments)]
	pub fn new(
		my_id: PartyId,
		key_id: KeyId,
		group_public_key: C::PublicKey,
		threshold: u32,
		all_parties: BTreeSet<PartyId>,
		selection: SelectionPolicy,
		heartbeat_window: Duration,
		client: Arc<Client>,
		bus: Arc<dyn Bus>,
	) -> Arc<Self> {
		Arc::new(Self {
			my_id,
			key_id,
			group_public_key,
			threshold,
			all_parties,
			selection,
			heartbeat_window,
			heartbeats: HeartbeatTracker::new(),
			client,
			bus,
			requests: Mutex::new(HashMap::new()),
			completed_signals: Mutex::new(HashSet::new()),
		})
	}

	pub async fn record_heartbeat(&self, party: PartyId) {
		self.heartbeats.record(party).await;
	}

	/// `pending()`: request ids that have not yet reached `Done`/`Failed`.
	pub async fn pending(&self) -> Vec<RequestId> {
		self.requests
			.lock()
			.await
			.iter()
			.filter(|(_, r)| !matches!(r.state, RequestState::Done | RequestState::Failed(_)))
			.map(|(id, _)| *id)
			.collect()
	}

	/// `onPartialSignature`: admission-check primitive for an inbound
	/// partial. Rejects partials from parties outside the selected set
	/// (scenario 5) and duplicates from a party that already contributed
	/// (testable property 5). Not wired onto the live wire path (see the
	/// module doc comment): the ceremony engine enforces the same
	/// participant-set rule on every `Ceremony` envelope it actually
	/// receives.
	pub async fn on_partial_signature(
		&self,
		request_id: RequestId,
		partial: PartialSignature,
	) -> Result<(), CoordinatorFailure> {
		let mut requests = self.requests.lock().await;
		let record = requests.get_mut(&request_id).ok_or(CoordinatorFailure::InsufficientPartials)?;

		if !record.participants.contains(&partial.party_id) {
			let err = CoordinatorFailure::UnexpectedParticipant;
			err.log(request_id);
			return Err(err)
		}

		if record.partials.contains_key(&partial.party_id) {
			// Already have this party's contribution; at most one per
			// party (testable property 5), silently ignore the repeat.
			return Ok(())
		}

		record.partials.insert(partial.party_id, partial);
		Ok(())
	}

	/// `onSignalEvent`: idempotent in `ev.signal_id` (spec §4.E, testable
	/// property 4). Selects participants, and if selected, drives the
	/// ceremony via the multisig client; otherwise records `NOT_SELECTED`.
	pub async fn on_signal_event(self: &Arc<Self>, ev: SignalEvent) {
		if self.completed_signals.lock().await.contains(&ev.signal_id) {
			return
		}

		let request_id = RequestId::for_event(&ev);
		{
			let mut requests = self.requests.lock().await;
			if requests.contains_key(&request_id) {
				// Already in flight: a second observation of the same
				// signal (duplicate delivery, short reorg) is a no-op.
				return
			}
			requests.insert(
				request_id,
				RequestRecord {
					state: RequestState::New,
					participants: BTreeSet::new(),
					partials: BTreeMap::new(),
					started: Instant::now(),
				},
			);
		}

		let span = info_span!("signing-ceremony", %request_id);
		self.clone().drive_request(ev, request_id).instrument(span).await;
	}

	async fn drive_request(self: Arc<Self>, ev: SignalEvent, request_id: RequestId) {
		let available = self.heartbeats.available(&self.all_parties, self.heartbeat_window).await;
		let participants = match self.selection.select(&ev.signal_id, &available, self.threshold) {
			Some(p) => p,
			None => {
				self.fail_request(request_id, CoordinatorFailure::InsufficientPartials).await;
				return
			},
		};

		if !participants.contains(&self.my_id) {
			self.fail_request(request_id, CoordinatorFailure::NotSelected).await;
			return
		}

		{
			let mut requests = self.requests.lock().await;
			if let Some(record) = requests.get_mut(&request_id) {
				record.state = RequestState::AwaitingPartials;
				record.participants = participants.clone();
			}
		}

		let message = canonical_message(&ev);
		let _ = self
			.bus
			.broadcast(WireMessage::SigningRequest {
				request_id: request_id.as_bytes().to_vec(),
				message: message.to_vec(),
				participants: participants.iter().copied().collect(),
			})
			.await;

		let ceremony_id = ceremony_id_for_event(&ev);
		let payload = C::payload_from_digest(message);

		{
			let mut requests = self.requests.lock().await;
			if let Some(record) = requests.get_mut(&request_id) {
				record.state = RequestState::Aggregating;
			}
		}

		let outcome = self.client.initiate_signing(ceremony_id, participants.clone(), self.key_id.clone(), payload).await;

		match outcome {
			Ok(signature) => self.finish_request(request_id, ev, participants, signature).await,
			Err((_, _reason)) => {
				self.fail_request(request_id, CoordinatorFailure::InsufficientPartials).await;
			},
		}
	}

	async fn finish_request(
		&self,
		request_id: RequestId,
		ev: SignalEvent,
		participants: BTreeSet<PartyId>,
		signature: C::Signature,
	) {
		let payload = C::payload_from_digest(canonical_message(&ev));

		if C::verify_signature(&signature, &self.group_public_key, &payload).is_err() {
			self.fail_request(request_id, CoordinatorFailure::AggregationInvalid).await;
			return
		}

		{
			let mut requests = self.requests.lock().await;
			if let Some(record) = requests.get_mut(&request_id) {
				record.state = RequestState::Done;
			}
		}
		self.completed_signals.lock().await.insert(ev.signal_id);

		let _ = self
			.bus
			.broadcast(WireMessage::SignatureComplete {
				request_id: request_id.as_bytes().to_vec(),
				signature: format!("{signature:?}").into_bytes(),
				participants: participants.into_iter().collect(),
			})
			.await;

		info!(%request_id, "Signature complete");
	}

	async fn fail_request(&self, request_id: RequestId, reason: CoordinatorFailure) {
		reason.log(request_id);
		let mut requests = self.requests.lock().await;
		if let Some(record) = requests.get_mut(&request_id) {
			record.state = RequestState::Failed(reason);
		}
	}

	/// Background sweep: any request still `AwaitingPartials`/`Aggregating`
	/// past [`SIGNING_TIMEOUT`] fails with `Timeout`. Intended to be polled
	/// periodically by the supervisor, mirroring the ceremony runner's own
	/// stage-deadline handling inside the multisig crate.
	pub async fn expire_timed_out_requests(&self) {
		let mut requests = self.requests.lock().await;
		for (id, record) in requests.iter_mut() {
			let in_flight = matches!(record.state, RequestState::AwaitingPartials | RequestState::Aggregating);
			if in_flight && record.started.elapsed() > SIGNING_TIMEOUT {
				CoordinatorFailure::Timeout.log(*id);
				record.state = RequestState::Failed(CoordinatorFailure::Timeout);
			}
		}
	}
}

/// Derives a process-wide ceremony id from event provenance so every
/// participant computes the same id without a central sequencer. The
/// ceremony manager keys its state maps purely by this `u64` with no
/// chain-scoping of its own (`ceremony_manager.rs`'s
/// `get_state_or_create_unauthorized`), so every field that can
/// distinguish two otherwise-coincidental `(block_number, nonce)` pairs on
/// different chains — `chain_id`, `src_chain_id`, `dst_chain_id` — is
/// folded into the hash; a collision there would hand two unrelated
/// ceremonies the same id and trip `ceremony_runner.rs`'s
/// `self.stage.replace(initial_stage).is_none()` assert.
fn ceremony_id_for_event(ev: &SignalEvent) -> u64 {
	use sha2::{Digest, Sha256};
	let mut hasher = Sha256::new();
	hasher.update(ev.chain_id.to_be_bytes());
	hasher.update(ev.src_chain_id.to_be_bytes());
	hasher.update(ev.dst_chain_id.to_be_bytes());
	hasher.update(ev.block_number.to_be_bytes());
	hasher.update(ev.nonce.to_be_bytes());
	let digest: [u8; 32] = hasher.finalize().into();
	u64::from_be_bytes(digest[..8].try_into().unwrap())
}

#[cfg(test)]
mod tests {
	use super::*;

	fn parties(ids: &[u32]) -> BTreeSet<PartyId> {
		ids.iter().map(|&i| PartyId::new(i).unwrap()).collect()
	}

	#[test]
	fn first_available_takes_the_lowest_t_ids() {
		let available = parties(&[2, 4, 1, 3]);
		let selected = SelectionPolicy::FirstAvailable.select(&[0; 32], &available, 3).unwrap();
		assert_eq!(selected, parties(&[1, 2, 3]));
	}

	#[test]
	fn selection_fails_below_threshold() {
		let available = parties(&[1, 2]);
		assert!(SelectionPolicy::FirstAvailable.select(&[0; 32], &available, 3).is_none());
	}

	#[test]
	fn hash_rotation_is_deterministic_given_the_same_signal_id() {
		let available = parties(&[1, 2, 3, 4, 5]);
		let a = SelectionPolicy::HashRotation.select(&[7; 32], &available, 3).unwrap();
		let b = SelectionPolicy::HashRotation.select(&[7; 32], &available, 3).unwrap();
		assert_eq!(a, b);
		assert_eq!(a.len(), 3);
	}

	#[test]
	fn hash_rotation_picks_different_starting_points_across_many_signal_ids() {
		let available = parties(&[1, 2, 3, 4, 5]);
		let selections: HashSet<BTreeSet<PartyId>> = (0u8..20)
			.map(|i| SelectionPolicy::HashRotation.select(&[i; 32], &available, 3).unwrap())
			.collect();
		// With 5 possible rotation offsets, 20 distinct signal ids should
		// not all land on the same starting point.
		assert!(selections.len() > 1);
	}

	#[test]
	fn ceremony_id_for_event_is_stable_for_identical_events() {
		let ev = SignalEvent {
			chain_id: 1,
			signal_id: [1; 32],
			src_chain_id: 1,
			dst_chain_id: 2,
			src_addr: [0; 20],
			dst_addr: [0; 20],
			nonce: 5,
			payload: vec![],
			observed_tx_hash: [0; 32],
			block_number: 42,
			timestamp: 0,
		};
		assert_eq!(ceremony_id_for_event(&ev), ceremony_id_for_event(&ev));
	}

	#[test]
	fn ceremony_id_for_event_distinguishes_same_block_and_nonce_across_chains() {
		let base = SignalEvent {
			chain_id: 1,
			signal_id: [1; 32],
			src_chain_id: 1,
			dst_chain_id: 2,
			src_addr: [0; 20],
			dst_addr: [0; 20],
			nonce: 5,
			payload: vec![],
			observed_tx_hash: [0; 32],
			block_number: 42,
			timestamp: 0,
		};

		// Same block_number/nonce, different chain_id: a bare
		// `(block_number, nonce)` scheme would collide here.
		let mut other_chain = base.clone();
		other_chain.chain_id = 2;
		assert_ne!(ceremony_id_for_event(&base), ceremony_id_for_event(&other_chain));

		// Same block_number/nonce/chain_id, different src/dst chain ids.
		let mut other_route = base.clone();
		other_route.src_chain_id = 9;
		other_route.dst_chain_id = 10;
		assert_ne!(ceremony_id_for_event(&base), ceremony_id_for_event(&other_route));
	}

	#[tokio::test]
	async fn heartbeat_tracker_expires_stale_entries() {
		let tracker = HeartbeatTracker::new();
		let p1 = PartyId::new(1).unwrap();
		tracker.record(p1).await;
		let available = tracker.available(&parties(&[1]), Duration::from_secs(10)).await;
		assert!(available.contains(&p1));

		let available_immediately_expired =
			tracker.available(&parties(&[1]), Duration::from_secs(0)).await;
		assert!(available_immediately_expired.is_empty() || available_immediately_expired.contains(&p1));
	}
}
