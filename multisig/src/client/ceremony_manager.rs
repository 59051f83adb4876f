#[cfg(test)]
mod tests;

use anyhow::{anyhow, bail, Context, Result};
use serde::Serialize;
use std::{
	collections::{BTreeSet, HashMap},
	fmt::{Debug, Display},
	marker::PhantomData,
};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, info_span, trace, warn, Instrument};

use crate::{
	client,
	client::{
		ceremony_id_string,
		common::{KeygenFailureReason, SigningFailureReason},
		CeremonyRequestDetails,
	},
	crypto::{CryptoScheme, Rng},
	p2p::{OutgoingMultisigStageMessages, VersionedCeremonyMessage},
	party::{CeremonyId, PartyId, CEREMONY_ID_WINDOW},
};

use client::{ceremony_runner::CeremonyRunner, keygen::generate_keygen_context};

use tokio::sync::oneshot;

use client::common::{
	broadcast::BroadcastStage, CeremonyCommon, CeremonyFailureReason, KeygenResultInfo,
};

use super::{
	common::{CeremonyStage, KeygenStageName, PreProcessStageDataCheck, SigningStageName},
	keygen::{HashCommitments1, KeygenCommon},
	signing::{AwaitCommitments1, SigningStateCommonInfo},
	CeremonyRequest, MultisigData, MultisigMessage,
};

pub type CeremonyOutcome<C> =
	Result<<C as CeremonyTrait>::Output, (BTreeSet<PartyId>, <C as CeremonyTrait>::FailureReason)>;

pub type CeremonyResultSender<Ceremony> = oneshot::Sender<CeremonyOutcome<Ceremony>>;
pub type CeremonyResultReceiver<Ceremony> = oneshot::Receiver<CeremonyOutcome<Ceremony>>;

const KEYGEN_LABEL: &str = "keygen";
const SIGNING_LABEL: &str = "signing";

/// Combines type parameters that are often used together for a single ceremony kind.
pub trait CeremonyTrait: 'static {
	const CEREMONY_TYPE: &'static str;
	type Crypto: CryptoScheme;
	/// The type of data exchanged over the transport bus for this ceremony kind.
	type Data: Debug
		+ Display
		+ PreProcessStageDataCheck<Self::CeremonyStageName>
		+ TryFrom<
			MultisigData<<Self::Crypto as CryptoScheme>::Point>,
			Error = MultisigData<<Self::Crypto as CryptoScheme>::Point>,
		> + Into<MultisigData<<Self::Crypto as CryptoScheme>::Point>>
		+ Send
		+ Ord
		+ Serialize
		+ 'static;
	type Request: Send + 'static;
	/// The product of a successful ceremony.
	type Output: Debug + Send + 'static;
	type FailureReason: CeremonyFailureReason + Send + Ord + Debug;
	type CeremonyStageName: Debug + Display + Ord + Send;
}

pub struct KeygenCeremony<C> {
	_phantom: PhantomData<C>,
}

impl<C: CryptoScheme> CeremonyTrait for KeygenCeremony<C> {
	const CEREMONY_TYPE: &'static str = KEYGEN_LABEL;
	type Crypto = C;
	type Data = client::keygen::KeygenData<<C as CryptoScheme>::Point>;
	type Request = CeremonyRequest<C>;
	type Output = KeygenResultInfo<C>;
	type FailureReason = KeygenFailureReason;
	type CeremonyStageName = KeygenStageName;
}

pub struct SigningCeremony<C> {
	_phantom: PhantomData<C>,
}

impl<C: CryptoScheme> CeremonyTrait for SigningCeremony<C> {
	const CEREMONY_TYPE: &'static str = SIGNING_LABEL;
	type Crypto = C;
	type Data = client::signing::SigningData<<C as CryptoScheme>::Point>;
	type Request = CeremonyRequest<C>;
	type Output = <C as CryptoScheme>::Signature;
	type FailureReason = SigningFailureReason;
	type CeremonyStageName = SigningStageName;
}

/// Maps ceremony ids to the corresponding running ceremony tasks.
pub struct CeremonyManager<C: CryptoScheme> {
	my_id: PartyId,
	outgoing_p2p_message_sender: UnboundedSender<OutgoingMultisigStageMessages>,
	signing_states: CeremonyStates<SigningCeremony<C>>,
	keygen_states: CeremonyStates<KeygenCeremony<C>>,
	latest_ceremony_id: CeremonyId,
}

// A CeremonyStage for either keygen or signing
pub type DynStage<C> = Box<dyn CeremonyStage<C> + Send + Sync>;

// A ceremony request that has passed initial checks and set up its initial stage
pub struct PreparedRequest<C: CeremonyTrait> {
	pub initial_stage: DynStage<C>,
}

// Initial checks and setup before handing the request to the `CeremonyRunner`.
#[allow(clippy::too_many_arguments)]
pub fn prepare_signing_request<C: CryptoScheme>(
	ceremony_id: CeremonyId,
	own_id: PartyId,
	signers: BTreeSet<PartyId>,
	key: KeygenResultInfo<C>,
	key_id: crate::crypto::KeyId,
	key_store: std::sync::Arc<dyn crate::keystore::SigningOracle<C>>,
	payload: C::SigningPayload,
	outgoing_p2p_message_sender: &UnboundedSender<OutgoingMultisigStageMessages>,
	rng: Rng,
) -> Result<PreparedRequest<SigningCeremony<C>>, SigningFailureReason> {
	if !signers.contains(&own_id) {
		return Err(SigningFailureReason::DeveloperError("we are not among signers".to_string()))
	}

	if !signers.is_subset(&key.all_ids) {
		debug!("Request to sign invalid: signers are not all holders of the key");
		return Err(SigningFailureReason::InvalidParticipants)
	}

	let minimum_signers_needed = key.params.ceremony_size();
	let signers_len: u32 = signers.len().try_into().expect("too many signers");
	if signers_len < minimum_signers_needed {
		debug!(
			"Request to sign invalid: not enough signers ({}/{minimum_signers_needed})",
			signers.len(),
		);
		return Err(SigningFailureReason::NotEnoughSigners)
	}

	let initial_stage = {
		let common = CeremonyCommon {
			ceremony_id,
			own_id,
			all_ids: signers,
			outgoing_p2p_message_sender: outgoing_p2p_message_sender.clone(),
			rng,
		};

		let processor = AwaitCommitments1::<C>::new(
			common.clone(),
			SigningStateCommonInfo { payload, key: key.key, key_id, oracle: key_store },
		);

		Box::new(BroadcastStage::new(processor, common))
	};

	Ok(PreparedRequest { initial_stage })
}

// Initial checks and setup before handing the request to the `CeremonyRunner`.
//
// `threshold` here is the operator-configured quorum size `t` (the number of
// signers a later signing ceremony must gather), not the reconstruction
// polynomial's degree; `ThresholdParameters` wants the degree `t - 1`.
pub fn prepare_keygen_request<C: CryptoScheme>(
	ceremony_id: CeremonyId,
	own_id: PartyId,
	participants: BTreeSet<PartyId>,
	threshold: u32,
	outgoing_p2p_message_sender: &UnboundedSender<OutgoingMultisigStageMessages>,
	rng: Rng,
) -> Result<PreparedRequest<KeygenCeremony<C>>, KeygenFailureReason> {
	assert!(!participants.is_empty(), "Keygen request has no participants");

	if !participants.contains(&own_id) {
		debug!("Keygen request invalid: we are not among participants");
		return Err(KeygenFailureReason::InvalidParticipants)
	}

	let degree = threshold.saturating_sub(1).max(1);

	let initial_stage = {
		let common = CeremonyCommon {
			ceremony_id,
			own_id,
			all_ids: participants.clone(),
			outgoing_p2p_message_sender: outgoing_p2p_message_sender.clone(),
			rng,
		};

		let keygen_common = KeygenCommon {
			context: generate_keygen_context(ceremony_id, &participants),
			params: crate::party::ThresholdParameters::new(participants.len() as u32, degree),
		};

		let processor = HashCommitments1::new(common.clone(), keygen_common);

		Box::new(BroadcastStage::new(processor, common))
	};

	Ok(PreparedRequest { initial_stage })
}

pub fn deserialize_for_version<C: CryptoScheme>(
	message: VersionedCeremonyMessage,
) -> Result<MultisigMessage<C::Point>> {
	match message.version {
		1 => bincode::deserialize::<'_, MultisigMessage<C::Point>>(&message.payload).map_err(|e| {
			anyhow!("Failed to deserialize message (version: {}): {:?}", message.version, e)
		}),
		_ => Err(anyhow!("Unsupported message version: {}", message.version)),
	}
}

impl<C: CryptoScheme> CeremonyManager<C> {
	pub fn new(
		my_id: PartyId,
		outgoing_p2p_message_sender: UnboundedSender<OutgoingMultisigStageMessages>,
		latest_ceremony_id: CeremonyId,
	) -> Self {
		CeremonyManager {
			my_id,
			outgoing_p2p_message_sender,
			signing_states: CeremonyStates::new(),
			keygen_states: CeremonyStates::new(),
			latest_ceremony_id,
		}
	}

	fn on_request(&mut self, request: CeremonyRequest<C>) {
		// Always update the latest ceremony id, even if we are not participating.
		self.update_latest_ceremony_id(request.ceremony_id);

		match request.details {
			Some(CeremonyRequestDetails::Keygen(details)) => {
				self.on_keygen_request(
					request.ceremony_id,
					details.participants,
					details.threshold,
					details.rng,
					details.result_sender,
				);
			},
			Some(CeremonyRequestDetails::Sign(details)) => {
				self.on_request_to_sign(
					request.ceremony_id,
					details.participants,
					details.key,
					details.key_id,
					details.key_store,
					details.payload,
					details.rng,
					details.result_sender,
				);
			},
			None => {
				// Because unauthorised ceremonies don't time out, we must check the id of
				// ceremonies we are not participating in and clean up any unauthorised
				// ceremonies that may have been created by a bad p2p message.
				if self.signing_states.cleanup_unauthorised_ceremony(&request.ceremony_id) {
					SigningFailureReason::NotParticipatingInUnauthorisedCeremony
						.log(&BTreeSet::default());
				}
				if self.keygen_states.cleanup_unauthorised_ceremony(&request.ceremony_id) {
					KeygenFailureReason::NotParticipatingInUnauthorisedCeremony
						.log(&BTreeSet::default());
				}
			},
		}
	}

	pub async fn run(
		mut self,
		mut ceremony_request_receiver: UnboundedReceiver<CeremonyRequest<C>>,
		mut incoming_p2p_message_receiver: UnboundedReceiver<(PartyId, VersionedCeremonyMessage)>,
	) -> Result<()> {
		async {
			loop {
				tokio::select! {
					Some(request) = ceremony_request_receiver.recv() => {
						self.on_request(request);
					}
					Some((sender_id, data)) = incoming_p2p_message_receiver.recv() => {
						match deserialize_for_version::<C>(data) {
							Ok(message) => self.process_p2p_message(sender_id, message),
							Err(_) => {
								warn!("Failed to deserialize message from: {sender_id}");
							},
						}
					}
					Some((id, outcome)) = self.signing_states.outcome_receiver.recv() => {
						self.signing_states.finalize_authorised_ceremony(id, outcome);
					}
					Some((id, outcome)) = self.keygen_states.outcome_receiver.recv() => {
						self.keygen_states.finalize_authorised_ceremony(id, outcome);
					}
					else => break Ok(()),
				}
			}
		}
		.instrument(info_span!("CeremonyManager", party = self.my_id.to_string()))
		.await
	}

	/// Process a keygen request.
	fn on_keygen_request(
		&mut self,
		ceremony_id: CeremonyId,
		participants: BTreeSet<PartyId>,
		threshold: u32,
		rng: Rng,
		result_sender: CeremonyResultSender<KeygenCeremony<C>>,
	) {
		let span = info_span!("Keygen Ceremony", ceremony_id = ceremony_id_string(ceremony_id));
		let _entered = span.enter();

		debug!("Processing a keygen request");

		let request = match prepare_keygen_request::<C>(
			ceremony_id,
			self.my_id,
			participants,
			threshold,
			&self.outgoing_p2p_message_sender,
			rng,
		) {
			Ok(request) => request,
			Err(failed_outcome) => {
				let _res = result_sender.send(Err((BTreeSet::new(), failed_outcome)));
				self.keygen_states.cleanup_unauthorised_ceremony(&ceremony_id);
				return
			},
		};

		let ceremony_handle = self.keygen_states.get_state_or_create_unauthorized(ceremony_id);

		ceremony_handle
			.on_request(request, result_sender)
			.with_context(|| format!("Invalid keygen request with ceremony id {ceremony_id}"))
			.unwrap();
	}

	/// Process a request to sign.
	#[allow(clippy::too_many_arguments)]
	fn on_request_to_sign(
		&mut self,
		ceremony_id: CeremonyId,
		signers: BTreeSet<PartyId>,
		key: KeygenResultInfo<C>,
		key_id: crate::crypto::KeyId,
		key_store: std::sync::Arc<dyn crate::keystore::SigningOracle<C>>,
		payload: C::SigningPayload,
		rng: Rng,
		result_sender: CeremonyResultSender<SigningCeremony<C>>,
	) {
		assert!(!signers.is_empty(), "Request to sign has no signers");

		let span = info_span!("Signing Ceremony", ceremony_id = ceremony_id_string(ceremony_id));
		let _entered = span.enter();

		debug!("Processing a request to sign");

		let request = match prepare_signing_request::<C>(
			ceremony_id,
			self.my_id,
			signers,
			key,
			key_id,
			key_store,
			payload,
			&self.outgoing_p2p_message_sender,
			rng,
		) {
			Ok(request) => request,
			Err(failed_outcome) => {
				let _res = result_sender.send(Err((BTreeSet::new(), failed_outcome)));
				self.signing_states.cleanup_unauthorised_ceremony(&ceremony_id);
				return
			},
		};

		let ceremony_handle = self.signing_states.get_state_or_create_unauthorized(ceremony_id);

		ceremony_handle
			.on_request(request, result_sender)
			.with_context(|| format!("Invalid sign request with ceremony id {ceremony_id}"))
			.unwrap();
	}

	/// Process a message from another party.
	fn process_p2p_message(
		&mut self,
		sender_id: PartyId,
		message: MultisigMessage<<C as CryptoScheme>::Point>,
	) {
		match message {
			MultisigMessage { ceremony_id, data: MultisigData::Keygen(data) } => {
				let span =
					info_span!("Keygen Ceremony", ceremony_id = ceremony_id_string(ceremony_id));
				let _entered = span.enter();

				self.keygen_states.process_data(sender_id, ceremony_id, data, self.latest_ceremony_id)
			},
			MultisigMessage { ceremony_id, data: MultisigData::Signing(data) } => {
				let span =
					info_span!("Signing Ceremony", ceremony_id = ceremony_id_string(ceremony_id));
				let _entered = span.enter();

				self.signing_states.process_data(
					sender_id,
					ceremony_id,
					data,
					self.latest_ceremony_id,
				)
			},
		}
	}

	/// Override the latest ceremony id. Used to limit spamming of unauthorised ceremonies.
	pub fn update_latest_ceremony_id(&mut self, ceremony_id: CeremonyId) {
		assert_eq!(self.latest_ceremony_id + 1, ceremony_id);
		self.latest_ceremony_id = ceremony_id;
	}
}

struct CeremonyStates<Ceremony: CeremonyTrait> {
	ceremony_handles: HashMap<CeremonyId, CeremonyHandle<Ceremony>>,
	outcome_sender: UnboundedSender<(CeremonyId, CeremonyOutcome<Ceremony>)>,
	outcome_receiver: UnboundedReceiver<(CeremonyId, CeremonyOutcome<Ceremony>)>,
}

impl<Ceremony: CeremonyTrait> CeremonyStates<Ceremony> {
	fn new() -> Self {
		let (outcome_sender, outcome_receiver) = mpsc::unbounded_channel();
		Self { ceremony_handles: HashMap::new(), outcome_sender, outcome_receiver }
	}

	/// Process ceremony data arriving from a peer.
	fn process_data(
		&mut self,
		sender_id: PartyId,
		ceremony_id: CeremonyId,
		data: Ceremony::Data,
		latest_ceremony_id: CeremonyId,
	) {
		debug!("Received data {data} from [{sender_id}]");

		if let std::collections::hash_map::Entry::Vacant(e) =
			self.ceremony_handles.entry(ceremony_id)
		{
			// Only a ceremony id within the forward window may create an unauthorised
			// ceremony; this bounds how much state a bad message can make us buffer.
			if ceremony_id > latest_ceremony_id + CEREMONY_ID_WINDOW {
				warn!("Ignoring data: unexpected future ceremony id {ceremony_id}");
				return
			} else if ceremony_id <= latest_ceremony_id {
				trace!("Ignoring data: old ceremony id {ceremony_id}");
				return
			} else {
				e.insert(CeremonyHandle::spawn(ceremony_id, self.outcome_sender.clone()));
				trace!(
					"Unauthorised ceremony created {ceremony_id} (total: {})",
					self.count_unauthorised_ceremonies()
				);
			}
		}

		let ceremony_handle =
			self.ceremony_handles.get(&ceremony_id).expect("Entry is inserted above");

		// There is a short delay between dropping the ceremony runner (and any channels
		// associated with it) and dropping the corresponding ceremony handle, so the
		// following `send` can fail.
		if ceremony_handle.message_sender.send((sender_id, data)).is_err() {
			debug!("Ignoring data: ceremony runner has been dropped");
		}
	}

	/// Returns the state for the given ceremony id if it exists, otherwise creates a new
	/// unauthorized one.
	fn get_state_or_create_unauthorized(
		&mut self,
		ceremony_id: CeremonyId,
	) -> &mut CeremonyHandle<Ceremony> {
		self.ceremony_handles
			.entry(ceremony_id)
			.or_insert_with(|| CeremonyHandle::spawn(ceremony_id, self.outcome_sender.clone()))
	}

	/// Send the outcome of the ceremony and remove its state.
	fn finalize_authorised_ceremony(
		&mut self,
		ceremony_id: CeremonyId,
		ceremony_outcome: CeremonyOutcome<Ceremony>,
	) {
		if let CeremonyRequestState::Authorised(result_sender) = self
			.ceremony_handles
			.remove(&ceremony_id)
			.expect("Should have handle")
			.request_state
		{
			let _result = result_sender.send(ceremony_outcome);
		} else {
			panic!("Expected authorised ceremony");
		}
	}

	/// Remove any state associated with the unauthorized ceremony, aborting its task.
	fn cleanup_unauthorised_ceremony(&mut self, ceremony_id: &CeremonyId) -> bool {
		if let Some(ceremony_handle) = self.ceremony_handles.remove(ceremony_id) {
			assert!(
				matches!(ceremony_handle.request_state, CeremonyRequestState::Unauthorised(_)),
				"Expected an unauthorised ceremony"
			);
			true
		} else {
			false
		}
	}

	fn count_unauthorised_ceremonies(&self) -> usize {
		self.ceremony_handles
			.values()
			.filter(|handle| matches!(handle.request_state, CeremonyRequestState::Unauthorised(_)))
			.count()
	}
}

/// Aborts the wrapped task when dropped, mirroring a scoped task handle.
struct AbortOnDrop(tokio::task::JoinHandle<()>);

impl Drop for AbortOnDrop {
	fn drop(&mut self) {
		self.0.abort();
	}
}

/// Holds the result sender and the channels used to send data to a running ceremony task.
struct CeremonyHandle<Ceremony: CeremonyTrait> {
	message_sender: UnboundedSender<(PartyId, Ceremony::Data)>,
	request_state: CeremonyRequestState<Ceremony>,
	_task_handle: AbortOnDrop,
}

/// Holds either the request sender or the result sender depending on ceremony state.
enum CeremonyRequestState<Ceremony: CeremonyTrait> {
	/// Before the local ceremony request has arrived. Holds the channel used to relay the
	/// request to the ceremony task once it does.
	Unauthorised(oneshot::Sender<PreparedRequest<Ceremony>>),
	/// After the local ceremony request has arrived. Holds the channel used to receive the
	/// ceremony's outcome.
	Authorised(CeremonyResultSender<Ceremony>),
}

impl<Ceremony: CeremonyTrait> CeremonyHandle<Ceremony> {
	fn spawn(
		ceremony_id: CeremonyId,
		outcome_sender: UnboundedSender<(CeremonyId, CeremonyOutcome<Ceremony>)>,
	) -> Self {
		let (message_sender, message_receiver) = mpsc::unbounded_channel();
		let (request_sender, request_receiver) = oneshot::channel();

		let task_handle = tokio::spawn(async move {
			if let Err(e) =
				CeremonyRunner::<Ceremony>::run(ceremony_id, message_receiver, request_receiver, outcome_sender)
					.await
			{
				warn!("Ceremony task for {ceremony_id} ended with an error: {e}");
			}
		});

		CeremonyHandle {
			message_sender,
			request_state: CeremonyRequestState::Unauthorised(request_sender),
			_task_handle: AbortOnDrop(task_handle),
		}
	}

	fn on_request(
		&mut self,
		request: PreparedRequest<Ceremony>,
		result_sender: CeremonyResultSender<Ceremony>,
	) -> Result<()> {
		if let CeremonyRequestState::Unauthorised(request_sender) = std::mem::replace(
			&mut self.request_state,
			CeremonyRequestState::Authorised(result_sender),
		) {
			let _res = request_sender.send(request);
		} else {
			bail!("Duplicate ceremony id");
		}

		Ok(())
	}
}
