use std::{
	collections::{BTreeSet, HashMap},
	fmt::Display,
	time::Duration,
};

use anyhow::Result;
use futures::{stream, StreamExt};
use itertools::{Either, Itertools};

use async_trait::async_trait;

use rand::{RngCore, SeedableRng};

use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tracing::{debug, debug_span, Instrument};

use crate::{
	client::{
		ceremony_manager::{
			deserialize_for_version, prepare_keygen_request, prepare_signing_request,
			CeremonyOutcome, CeremonyTrait, KeygenCeremony, SigningCeremony,
		},
		ceremony_runner::CeremonyRunner,
		common::CeremonyFailureReason,
		keygen::{self, generate_key_data},
		signing, KeygenResultInfo, MultisigMessage,
	},
	crypto::{CryptoScheme, Rng},
	p2p::{OutgoingMultisigStageMessages, VersionedCeremonyMessage, CURRENT_PROTOCOL_VERSION},
	party::{CeremonyId, PartyId, ThresholdParameters},
};

/// Default seed for tests that need a key generated up front.
pub const DEFAULT_KEYGEN_SEED: [u8; 32] = [8; 32];
pub const DEFAULT_SIGNING_SEED: [u8; 32] = [4; 32];

/// Default threshold used by tests: 3-of-5, matching the live committee size.
pub const DEFAULT_THRESHOLD: u32 = 3;

// Default ceremony ids used in many unit tests.
/// The initial latest ceremony id starts at 0,
/// so the first ceremony request must have a ceremony id of 1.
pub const INITIAL_LATEST_CEREMONY_ID: CeremonyId = 0;
// Ceremony ids must be consecutive.
pub const DEFAULT_KEYGEN_CEREMONY_ID: CeremonyId = INITIAL_LATEST_CEREMONY_ID + 1;
pub const DEFAULT_SIGNING_CEREMONY_ID: CeremonyId = DEFAULT_KEYGEN_CEREMONY_ID + 1;

/// Time it takes to cause a ceremony timeout (2 stages) with a small delay to allow for
/// processing.
pub const CEREMONY_TIMEOUT_DURATION: Duration = Duration::from_millis(
	((super::ceremony_runner::MAX_STAGE_DURATION.as_secs() * 2) * 1000) + 50,
);

lazy_static::lazy_static! {
	/// Five parties, matching the live committee size (`N = 5`, `t = 3`).
	pub static ref PARTY_IDS: Vec<PartyId> =
		(1..=5u32).map(|i| PartyId::new(i).unwrap()).collect();
}

/// Receive the next message from `receiver`, panicking if none arrives within the ceremony
/// stage duration (a node that never sends here has a bug worth failing loudly on).
async fn expect_recv_with_timeout<T>(receiver: &mut UnboundedReceiver<T>) -> T {
	tokio::time::timeout(Duration::from_secs(10), receiver.recv())
		.await
		.expect("timed out waiting for outgoing p2p message")
		.expect("p2p message channel closed unexpectedly")
}

pub type StageMessages<T> = HashMap<PartyId, HashMap<PartyId, T>>;

pub struct Node<C: CeremonyTrait> {
	own_id: PartyId,
	outgoing_p2p_message_sender: UnboundedSender<OutgoingMultisigStageMessages>,
	pub ceremony_runner: CeremonyRunner<C>,
	outgoing_p2p_message_receiver: UnboundedReceiver<OutgoingMultisigStageMessages>,
	/// If any of the methods we called on the ceremony runner returned the outcome,
	/// it will be stored here
	outcome: Option<CeremonyOutcome<C>>,
}

fn new_node<C: CeremonyTrait>(own_id: PartyId) -> Node<C> {
	let (outgoing_p2p_message_sender, outgoing_p2p_message_receiver) =
		tokio::sync::mpsc::unbounded_channel();

	let ceremony_runner = CeremonyRunner::new_unauthorised_for_test();

	Node { outgoing_p2p_message_sender, own_id, ceremony_runner, outgoing_p2p_message_receiver, outcome: None }
}

// Exists so some of the tests can easily modify signing requests
struct SigningCeremonyDetails<C: CryptoScheme> {
	pub rng: Rng,
	pub ceremony_id: CeremonyId,
	pub signers: BTreeSet<PartyId>,
	pub key: KeygenResultInfo<C>,
	pub payload: C::SigningPayload,
}

/// Builds the `(key_id, oracle)` pair `prepare_signing_request` needs from a
/// bare `KeygenResultInfo`, for tests that hold a key share directly rather
/// than through a [`crate::keystore::KeyStoreAPI`] backend.
pub(crate) fn direct_oracle_for<C: CryptoScheme>(
	key: &KeygenResultInfo<C>,
) -> (crate::crypto::KeyId, std::sync::Arc<dyn crate::keystore::SigningOracle<C>>) {
	let key_id = crate::crypto::KeyId::new(key.key.get_agg_public_key());
	let oracle = std::sync::Arc::new(crate::keystore::DirectKeyShareOracle::new(key.key.clone()));
	(key_id, oracle)
}

#[derive(Clone)]
pub struct KeygenCeremonyDetails {
	pub rng: Rng,
	pub ceremony_id: CeremonyId,
	pub participants: BTreeSet<PartyId>,
	pub threshold: u32,
}

impl<C: CeremonyTrait> Node<C> {
	fn on_ceremony_outcome(&mut self, outcome: CeremonyOutcome<C>) {
		let span = debug_span!("Node", party = self.own_id.to_string());
		let _entered = span.enter();

		match &outcome {
			Ok(_) => {
				debug!("Node got successful outcome");
			},
			Err((reported_parties, failure_reason)) => {
				failure_reason.log(reported_parties);
			},
		}

		assert!(self.outcome.replace(outcome).is_none(), "Should not receive more than one outcome");
	}

	pub async fn force_stage_timeout(&mut self) {
		if let Some(outcome) = self
			.ceremony_runner
			.force_timeout()
			.instrument(debug_span!("Node", party = self.own_id.to_string()))
			.await
		{
			self.on_ceremony_outcome(outcome);
		}
	}
}

impl<C: CryptoScheme> Node<SigningCeremony<C>> {
	async fn request_signing(&mut self, signing_ceremony_details: SigningCeremonyDetails<C>) {
		let SigningCeremonyDetails { rng, ceremony_id, signers, key, payload } =
			signing_ceremony_details;

		let (key_id, oracle) = direct_oracle_for(&key);

		let request = prepare_signing_request::<C>(
			ceremony_id,
			self.own_id,
			signers,
			key,
			key_id,
			oracle,
			payload,
			&self.outgoing_p2p_message_sender,
			rng,
		)
		.expect("invalid request");

		if let Some(outcome) = self
			.ceremony_runner
			.on_ceremony_request(request.initial_stage)
			.instrument(debug_span!("Node", party = self.own_id.to_string()))
			.await
		{
			self.on_ceremony_outcome(outcome);
		}
	}
}

impl<C: CryptoScheme> Node<KeygenCeremony<C>> {
	pub async fn request_keygen(&mut self, keygen_ceremony_details: KeygenCeremonyDetails) {
		let KeygenCeremonyDetails { ceremony_id, rng, participants, threshold } =
			keygen_ceremony_details;

		let request = prepare_keygen_request::<C>(
			ceremony_id,
			self.own_id,
			participants,
			threshold,
			&self.outgoing_p2p_message_sender,
			rng,
		)
		.expect("invalid request");

		if let Some(outcome) = self
			.ceremony_runner
			.on_ceremony_request(request.initial_stage)
			.instrument(debug_span!("Node", party = self.own_id.to_string()))
			.await
		{
			self.on_ceremony_outcome(outcome)
		}
	}
}

pub fn new_nodes<PartyIds, C>(party_ids: PartyIds) -> HashMap<PartyId, Node<C>>
where
	PartyIds: IntoIterator<Item = PartyId>,
	C: CeremonyTrait,
{
	party_ids.into_iter().map(|id| (id, new_node(id))).collect()
}

#[async_trait]
pub trait CeremonyRunnerStrategy {
	type CeremonyType: CeremonyTrait;

	type CheckedOutput: std::fmt::Debug;
	type InitialStageData: TryFrom<
			<<Self as CeremonyRunnerStrategy>::CeremonyType as CeremonyTrait>::Data,
			Error = <<Self as CeremonyRunnerStrategy>::CeremonyType as CeremonyTrait>::Data,
		> + Clone;

	fn post_successful_complete_check(
		&self,
		outputs: HashMap<PartyId, <Self::CeremonyType as CeremonyTrait>::Output>,
	) -> Self::CheckedOutput;

	async fn request_ceremony(&mut self, node_id: &PartyId);
}

pub struct CeremonyTestRunner<CeremonyRunnerData, C: CeremonyTrait> {
	pub nodes: HashMap<PartyId, Node<C>>,
	pub ceremony_id: CeremonyId,
	pub ceremony_runner_data: CeremonyRunnerData,
	pub rng: Rng,
}

impl<CeremonyRunnerData, C> CeremonyTestRunner<CeremonyRunnerData, C>
where
	Self: CeremonyRunnerStrategy<CeremonyType = C>,
	C: CeremonyTrait,
{
	fn inner_new(
		nodes: HashMap<PartyId, Node<C>>,
		ceremony_id: CeremonyId,
		ceremony_runner_data: CeremonyRunnerData,
		rng: Rng,
	) -> Self {
		Self { nodes, ceremony_id, ceremony_runner_data, rng }
	}

	pub fn get_mut_node(&mut self, id: &PartyId) -> &mut Node<C> {
		self.nodes.get_mut(id).unwrap()
	}

	pub fn select_party_ids<const COUNT: usize>(&self) -> [PartyId; COUNT] {
		self.nodes.keys().cloned().sorted().take(COUNT).collect::<Vec<_>>().try_into().unwrap()
	}

	pub async fn distribute_messages<StageData: Into<<C as CeremonyTrait>::Data>>(
		&mut self,
		stage_data: StageMessages<StageData>,
	) {
		for (sender_id, messages) in stage_data {
			for (receiver_id, message) in messages {
				self.distribute_message(&sender_id, &receiver_id, message).await;
			}
		}
	}

	#[track_caller]
	pub async fn distribute_message<StageData: Into<<C as CeremonyTrait>::Data>>(
		&mut self,
		sender_id: &PartyId,
		receiver_id: &PartyId,
		stage_data: StageData,
	) {
		assert_ne!(receiver_id, sender_id);

		let node = self.nodes.get_mut(receiver_id).unwrap();

		if let Some(outcome) =
			node.ceremony_runner.process_or_delay_message(*sender_id, stage_data.into()).await
		{
			node.on_ceremony_outcome(outcome);
		}
	}

	#[track_caller]
	pub async fn distribute_messages_with_non_sender<
		StageData: Into<<C as CeremonyTrait>::Data>,
	>(
		&mut self,
		mut stage_data: StageMessages<StageData>,
		non_sender: &PartyId,
	) {
		stage_data.remove(non_sender).unwrap();
		self.distribute_messages(stage_data).await;
		for (_, node) in self.nodes.iter_mut().filter(|(id, _)| *id != non_sender) {
			node.force_stage_timeout().await;
		}
	}

	#[track_caller]
	pub async fn gather_outgoing_messages<
		NextStageData: TryFrom<<C as CeremonyTrait>::Data, Error = Error> + Clone,
		Error: Display,
	>(
		&mut self,
	) -> StageMessages<NextStageData> {
		let self_ceremony_id = self.ceremony_id;
		let message_to_next_stage_data = |message| {
			let MultisigMessage { ceremony_id, data } = message;

			assert_eq!(
				ceremony_id, self_ceremony_id,
				"Client output p2p message for ceremony_id {ceremony_id}, expected {self_ceremony_id}"
			);

			let ceremony_data = <C as CeremonyTrait>::Data::try_from(data)
				.map_err(|err| {
					format!(
						"Expected outgoing ceremony data {}, got {:?}.",
						std::any::type_name::<<C as CeremonyTrait>::Data>(),
						err
					)
				})
				.unwrap();
			NextStageData::try_from(ceremony_data)
				.map_err(|err| {
					format!(
						"Expected outgoing ceremony data {}, got {}.",
						std::any::type_name::<NextStageData>(),
						err
					)
				})
				.unwrap()
		};

		stream::iter(self.nodes.iter_mut())
			.then(|(id, node)| async move {
				(*id, {
					match expect_recv_with_timeout(&mut node.outgoing_p2p_message_receiver).await {
						OutgoingMultisigStageMessages::Broadcast(receiver_ids, message) => {
							let message =
								deserialize_for_version::<C::Crypto>(VersionedCeremonyMessage {
									version: CURRENT_PROTOCOL_VERSION,
									payload: message,
								})
								.unwrap();

							let next_data = message_to_next_stage_data(message);
							receiver_ids
								.into_iter()
								.map(move |receiver_id| (receiver_id, next_data.clone()))
								.collect()
						},
						OutgoingMultisigStageMessages::Private(messages) => messages
							.into_iter()
							.map(|(receiver_id, message)| {
								(receiver_id, {
									let message = deserialize_for_version::<C::Crypto>(
										VersionedCeremonyMessage {
											version: CURRENT_PROTOCOL_VERSION,
											payload: message,
										},
									)
									.unwrap();

									message_to_next_stage_data(message)
								})
							})
							.collect(),
					}
				})
			})
			.collect()
			.await
	}

	#[track_caller]
	pub async fn run_stage<
		NextStageData: TryFrom<<C as CeremonyTrait>::Data, Error = Error> + Clone,
		StageData: Into<<C as CeremonyTrait>::Data>,
		Error: Display,
	>(
		&mut self,
		stage_data: StageMessages<StageData>,
	) -> StageMessages<NextStageData> {
		self.distribute_messages(stage_data).await;
		self.gather_outgoing_messages().await
	}

	#[track_caller]
	pub async fn run_stage_with_non_sender<
		NextStageData: TryFrom<<C as CeremonyTrait>::Data, Error = Error> + Clone,
		StageData: Into<<C as CeremonyTrait>::Data>,
		Error: Display,
	>(
		&mut self,
		stage_data: StageMessages<StageData>,
		non_sender: &PartyId,
	) -> StageMessages<NextStageData> {
		self.distribute_messages_with_non_sender(stage_data, non_sender).await;
		self.gather_outgoing_messages().await
	}

	#[track_caller]
	// Checks if all nodes have an outcome and the outcomes are consistent, returning the outcome.
	fn collect_and_check_outcomes(
		&mut self,
	) -> Result<
		<Self as CeremonyRunnerStrategy>::CheckedOutput,
		(BTreeSet<PartyId>, <C as CeremonyTrait>::FailureReason),
	> {
		let results: HashMap<_, _> = self
			.nodes
			.iter_mut()
			.filter_map(|(id, node)| node.outcome.take().map(|outcome| (*id, outcome)))
			.collect();

		if results.is_empty() {
			panic!("No nodes have received an outcome yet");
		}

		if results.len() != self.nodes.len() {
			panic!("Not all nodes had an outcome");
		}

		let (ok_results, (all_reported_parties, failure_reasons)): (
			HashMap<_, _>,
			(BTreeSet<_>, BTreeSet<_>),
		) = results.into_iter().partition_map(|(id, result)| match result {
			Ok(output) => Either::Left((id, output)),
			Err((reported_parties, reason)) => Either::Right((reported_parties, reason)),
		});

		if !ok_results.is_empty() && failure_reasons.is_empty() {
			Ok(self.post_successful_complete_check(ok_results))
		} else if ok_results.is_empty() && !failure_reasons.is_empty() {
			assert_eq!(all_reported_parties.len(), 1, "Reported parties weren't the same for all nodes");
			assert_eq!(
				failure_reasons.len(),
				1,
				"The ceremony failure reason was not the same for all nodes: {failure_reasons:?}",
			);
			Err((
				all_reported_parties.into_iter().next().unwrap(),
				failure_reasons.into_iter().next().unwrap(),
			))
		} else {
			panic!("Ceremony results weren't consistently Ok() or Err() for all nodes");
		}
	}

	#[track_caller]
	pub fn complete(&mut self) -> <Self as CeremonyRunnerStrategy>::CheckedOutput {
		self.collect_and_check_outcomes().unwrap()
	}

	#[track_caller]
	fn try_complete_with_error(
		&mut self,
		bad_party_ids: &[PartyId],
		expected_failure_reason: <C as CeremonyTrait>::FailureReason,
	) -> Option<()> {
		let (reported, reason) = self.collect_and_check_outcomes().unwrap_err();
		assert_eq!(BTreeSet::from_iter(bad_party_ids.iter()), reported.iter().collect());
		assert_eq!(expected_failure_reason, reason);
		Some(())
	}

	/// Gathers the ceremony outcomes from all nodes,
	/// making sure they are identical and match the expected failure reason.
	#[track_caller]
	pub fn complete_with_error(
		&mut self,
		bad_party_ids: &[PartyId],
		expected_failure_reason: <C as CeremonyTrait>::FailureReason,
	) {
		self.try_complete_with_error(bad_party_ids, expected_failure_reason)
			.expect("Failed to get all ceremony outcomes");
	}

	async fn request_without_gather(&mut self) {
		for node_id in self.nodes.keys().sorted().cloned().collect::<Vec<_>>() {
			self.request_ceremony(&node_id).await;
		}
	}

	#[track_caller]
	pub async fn request(
		&mut self,
	) -> HashMap<
		PartyId,
		HashMap<
			PartyId,
			<CeremonyTestRunner<CeremonyRunnerData, C> as CeremonyRunnerStrategy>::InitialStageData,
		>,
	> {
		self.request_without_gather().await;

		self.gather_outgoing_messages().await
	}
}

macro_rules! run_stages {
    ($ceremony:ident, $messages:expr, $first_stage:ty, $($stage:ty),*) => {{
        let messages = $ceremony
            .run_stage::<$first_stage, _, _>($messages)
            .await;
        $(
            let messages = $ceremony
                .run_stage::<$stage, _, _>(messages)
                .await;
        )*
        messages
    }}
}
pub(crate) use run_stages;

pub type KeygenCeremonyRunner<C> = CeremonyTestRunner<(), KeygenCeremony<C>>;

#[async_trait]
impl<C: CryptoScheme> CeremonyRunnerStrategy for KeygenCeremonyRunner<C> {
	type CeremonyType = KeygenCeremony<C>;
	type CheckedOutput =
		(<C as CryptoScheme>::PublicKey, HashMap<PartyId, <Self::CeremonyType as CeremonyTrait>::Output>);
	type InitialStageData = keygen::HashComm1;

	fn post_successful_complete_check(
		&self,
		outputs: HashMap<PartyId, <Self::CeremonyType as CeremonyTrait>::Output>,
	) -> Self::CheckedOutput {
		use itertools::Itertools as _;

		let (_, public_key_point) = outputs
			.values()
			.map(|info| (info.params, info.key.get_agg_public_key_point()))
			.unique_by(|(params, point)| (params.share_count, params.threshold, point.as_bytes().to_vec()))
			.exactly_one()
			.expect("Generated keys don't match");

		(<C as CryptoScheme>::pubkey_from_point(&public_key_point), outputs)
	}

	async fn request_ceremony(&mut self, node_id: &PartyId) {
		let keygen_ceremony_details = self.keygen_ceremony_details();

		self.nodes.get_mut(node_id).unwrap().request_keygen(keygen_ceremony_details).await;
	}
}
impl<C: CryptoScheme> KeygenCeremonyRunner<C> {
	pub fn new(nodes: HashMap<PartyId, Node<KeygenCeremony<C>>>, ceremony_id: CeremonyId, rng: Rng) -> Self {
		Self::inner_new(nodes, ceremony_id, (), rng)
	}

	pub fn keygen_ceremony_details(&mut self) -> KeygenCeremonyDetails {
		use rand::Rng as _;

		KeygenCeremonyDetails {
			ceremony_id: self.ceremony_id,
			rng: Rng::from_seed(self.rng.gen()),
			participants: self.nodes.keys().cloned().collect(),
			threshold: DEFAULT_THRESHOLD,
		}
	}

	/// Create a keygen ceremony with all `PARTY_IDS` and the default threshold.
	pub fn new_with_default() -> Self {
		KeygenCeremonyRunner::new(
			new_nodes(PARTY_IDS.clone()),
			DEFAULT_KEYGEN_CEREMONY_ID,
			Rng::from_seed(DEFAULT_KEYGEN_SEED),
		)
	}
}

pub struct SigningCeremonyRunnerData<C: CryptoScheme> {
	pub payload: C::SigningPayload,
	pub public_key: C::PublicKey,
	pub key_data: HashMap<PartyId, KeygenResultInfo<C>>,
}
pub type SigningCeremonyRunner<C> = CeremonyTestRunner<SigningCeremonyRunnerData<C>, SigningCeremony<C>>;

#[async_trait]
impl<C: CryptoScheme> CeremonyRunnerStrategy for SigningCeremonyRunner<C> {
	type CeremonyType = SigningCeremony<C>;
	type CheckedOutput = <SigningCeremony<C> as CeremonyTrait>::Output;
	type InitialStageData = signing::Comm1<<C as CryptoScheme>::Point>;

	fn post_successful_complete_check(
		&self,
		outputs: HashMap<PartyId, <Self::CeremonyType as CeremonyTrait>::Output>,
	) -> Self::CheckedOutput {
		use itertools::Itertools as _;

		let signature = outputs.into_values().unique().exactly_one().expect("Signatures don't match");

		<C as CryptoScheme>::verify_signature(
			&signature,
			&self.ceremony_runner_data.public_key,
			&self.ceremony_runner_data.payload,
		)
		.expect("Should be valid signature");

		signature
	}

	async fn request_ceremony(&mut self, node_id: &PartyId) {
		let signing_ceremony_details = self.signing_ceremony_details(node_id);

		self.nodes.get_mut(node_id).unwrap().request_signing(signing_ceremony_details).await;
	}
}

impl<C: CryptoScheme> SigningCeremonyRunner<C> {
	pub fn new_with_all_signers(
		nodes: HashMap<PartyId, Node<SigningCeremony<C>>>,
		ceremony_id: CeremonyId,
		data: SigningCeremonyRunnerData<C>,
		rng: Rng,
	) -> Self {
		Self::inner_new(nodes, ceremony_id, data, rng)
	}

	pub fn new_with_threshold_subset_of_signers(
		nodes: HashMap<PartyId, Node<SigningCeremony<C>>>,
		ceremony_id: CeremonyId,
		data: SigningCeremonyRunnerData<C>,
		rng: Rng,
	) -> (Self, HashMap<PartyId, Node<SigningCeremony<C>>>) {
		let params = ThresholdParameters::new(nodes.len() as u32, DEFAULT_THRESHOLD);
		let ceremony_size = params.ceremony_size() as usize;

		let mut sorted_nodes =
			nodes.into_iter().sorted_by_key(|(id, _)| *id).collect::<Vec<_>>();
		let non_signers = sorted_nodes.split_off(ceremony_size);

		(
			Self::new_with_all_signers(sorted_nodes.into_iter().collect(), ceremony_id, data, rng),
			non_signers.into_iter().collect(),
		)
	}

	fn signing_ceremony_details(&mut self, id: &PartyId) -> SigningCeremonyDetails<C> {
		use rand::Rng as _;

		SigningCeremonyDetails {
			ceremony_id: self.ceremony_id,
			rng: Rng::from_seed(self.rng.gen()),
			signers: self.nodes.keys().cloned().collect(),
			key: self.ceremony_runner_data.key_data[id].clone(),
			payload: self.ceremony_runner_data.payload.clone(),
		}
	}
}

pub async fn new_signing_ceremony<C: CryptoScheme>(
) -> (SigningCeremonyRunner<C>, HashMap<PartyId, Node<SigningCeremony<C>>>) {
	let (public_key_point, key_data) = generate_key_data::<C>(
		BTreeSet::from_iter(PARTY_IDS.iter().cloned()),
		&mut Rng::from_seed(DEFAULT_KEYGEN_SEED),
		DEFAULT_THRESHOLD,
	);

	SigningCeremonyRunner::new_with_threshold_subset_of_signers(
		new_nodes(PARTY_IDS.clone()),
		DEFAULT_SIGNING_CEREMONY_ID,
		SigningCeremonyRunnerData {
			payload: <C as CryptoScheme>::signing_payload_for_test(),
			public_key: <C as CryptoScheme>::pubkey_from_point(&public_key_point),
			key_data,
		},
		Rng::from_seed(DEFAULT_SIGNING_SEED),
	)
}

pub async fn standard_signing<C: CryptoScheme>(
	signing_ceremony: &mut SigningCeremonyRunner<C>,
) -> <SigningCeremony<C> as CeremonyTrait>::Output {
	let stage_1_messages = signing_ceremony.request().await;
	let messages = run_stages!(
		signing_ceremony,
		stage_1_messages,
		signing::VerifyComm2<<C as CryptoScheme>::Point>,
		signing::LocalSig3<<C as CryptoScheme>::Point>,
		signing::VerifyLocalSig4<<C as CryptoScheme>::Point>
	);
	signing_ceremony.distribute_messages(messages).await;
	signing_ceremony.complete()
}

/// Create and run a full keygen ceremony using all `PARTY_IDS`.
pub async fn run_keygen<C: CryptoScheme>(
	nodes: HashMap<PartyId, Node<KeygenCeremony<C>>>,
	ceremony_id: CeremonyId,
) -> (<C as CryptoScheme>::PublicKey, HashMap<PartyId, KeygenResultInfo<C>>) {
	let mut keygen_ceremony =
		KeygenCeremonyRunner::<C>::new(nodes, ceremony_id, Rng::from_seed(DEFAULT_KEYGEN_SEED));
	let stage_1_messages = keygen_ceremony.request().await;
	let messages = run_stages!(
		keygen_ceremony,
		stage_1_messages,
		keygen::VerifyHashComm2,
		keygen::CoeffComm3<<C as CryptoScheme>::Point>,
		keygen::VerifyCoeffComm4<<C as CryptoScheme>::Point>,
		keygen::SecretShare5<<C as CryptoScheme>::Point>
	);
	keygen_ceremony.distribute_messages(messages).await;
	keygen_ceremony.complete()
}

pub fn get_dummy_hash_comm(rng: &mut Rng) -> keygen::HashComm1 {
	let mut buffer: [u8; 32] = [0; 32];
	rng.fill_bytes(&mut buffer);

	keygen::HashComm1(buffer)
}
