use std::{
	collections::{btree_map, BTreeMap},
	fmt::Display,
};

use async_trait::async_trait;
use tracing::warn;

use super::ceremony_stage::{CeremonyCommon, CeremonyStage, ProcessMessageResult, StageResult};
use crate::{
	client::{ceremony_manager::CeremonyTrait, MultisigMessage},
	p2p::{OutgoingMultisigStageMessages, ProtocolVersion, CURRENT_PROTOCOL_VERSION},
	party::{CeremonyId, PartyId},
};

/// Used by individual stages to distinguish between a public message that
/// should be broadcast to everyone and secret messages that should be
/// delivered to different parties in private.
pub enum DataToSend<T> {
	Broadcast(T),
	Private(BTreeMap<PartyId, T>),
}

/// Abstracts away computations performed during every "broadcast" stage
/// of a ceremony
#[async_trait]
pub trait BroadcastStageProcessor<C: CeremonyTrait>: Display {
	/// The specific variant of D shared between parties
	/// during this stage
	type Message: Clone + Into<C::Data> + TryFrom<C::Data, Error = C::Data> + Send;

	/// Unique stage name used for logging and testing.
	const NAME: C::CeremonyStageName;

	/// Init the stage, returning the data to broadcast
	fn init(&mut self) -> DataToSend<Self::Message>;

	/// Determines how the data for this stage (of type `Self::Message`)
	/// should be processed once it either received it from all other parties
	/// or the stage timed out (None is used for missing messages)
	async fn process(self, messages: BTreeMap<PartyId, Option<Self::Message>>) -> StageResult<C>;
}

/// Responsible for broadcasting/collecting of stage data,
/// delegating the actual processing to `StageProcessor`
pub struct BroadcastStage<C: CeremonyTrait, Stage>
where
	Stage: BroadcastStageProcessor<C>,
{
	common: CeremonyCommon,
	/// Messages collected so far
	messages: BTreeMap<PartyId, Stage::Message>,
	/// Determines the actual computations before/after
	/// the data is collected
	processor: Stage,
}

impl<C: CeremonyTrait, Stage> BroadcastStage<C, Stage>
where
	Stage: BroadcastStageProcessor<C>,
{
	pub fn new(processor: Stage, common: CeremonyCommon) -> Self {
		BroadcastStage { common, messages: BTreeMap::new(), processor }
	}
}

impl<C: CeremonyTrait, Stage> Display for BroadcastStage<C, Stage>
where
	Stage: BroadcastStageProcessor<C>,
	BroadcastStage<C, Stage>: CeremonyStage<C>,
{
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "BroadcastStage({})", &self.get_stage_name())
	}
}

fn serialize_for_version<C: CeremonyTrait>(
	ceremony_id: CeremonyId,
	data: C::Data,
	version: ProtocolVersion,
) -> Vec<u8> {
	let message = MultisigMessage { ceremony_id, data: data.into() };
	match version {
		1 => bincode::serialize(&message).unwrap(),
		_ => panic!("Unsupported protocol version"),
	}
}

#[async_trait]
impl<C: CeremonyTrait, Stage> CeremonyStage<C> for BroadcastStage<C, Stage>
where
	Stage: BroadcastStageProcessor<C> + Send,
{
	fn init(&mut self) -> ProcessMessageResult {
		let common = &self.common;

		let (own_message, outgoing_messages) = match self.processor.init() {
			DataToSend::Broadcast(stage_data) => {
				let ceremony_data: C::Data = stage_data.clone().into();
				(
					stage_data,
					OutgoingMultisigStageMessages::Broadcast(
						common.all_ids.iter().filter(|id| **id != common.own_id).copied().collect(),
						serialize_for_version::<C>(
							common.ceremony_id,
							ceremony_data,
							CURRENT_PROTOCOL_VERSION,
						),
					),
				)
			},
			DataToSend::Private(mut messages) => (
				messages.remove(&common.own_id).expect("Must include message to self"),
				OutgoingMultisigStageMessages::Private(
					messages
						.into_iter()
						.map(|(id, stage_data)| {
							let ceremony_data: C::Data = stage_data.into();
							(
								id,
								serialize_for_version::<C>(
									common.ceremony_id,
									ceremony_data,
									CURRENT_PROTOCOL_VERSION,
								),
							)
						})
						.collect(),
				),
			),
		};

		self.common
			.outgoing_p2p_message_sender
			.send(outgoing_messages)
			.expect("Could not send p2p message.");

		// Save our own share
		self.process_message(common.own_id, own_message.into())
	}

	fn process_message(&mut self, sender_id: PartyId, m: C::Data) -> ProcessMessageResult {
		let m: Stage::Message = match m.try_into() {
			Ok(m) => m,
			Err(incorrect_type) => {
				warn!(
					from_id = sender_id.to_string(),
					"Ignoring unexpected message {incorrect_type} while in stage {self}",
				);
				return ProcessMessageResult::NotReady
			},
		};

		if !self.common.all_ids.contains(&sender_id) {
			warn!(from_id = sender_id.to_string(), "Ignoring a message from non-participant for stage {self}",);
			return ProcessMessageResult::NotReady
		}

		match self.messages.entry(sender_id) {
			btree_map::Entry::Occupied(_) => {
				warn!(from_id = sender_id.to_string(), "Ignoring a redundant message for stage {self}",);
				ProcessMessageResult::NotReady
			},
			btree_map::Entry::Vacant(entry) => {
				entry.insert(m);

				if self.messages.len() == self.common.all_ids.len() {
					ProcessMessageResult::Ready
				} else {
					ProcessMessageResult::NotReady
				}
			},
		}
	}

	async fn finalize(mut self: Box<Self>) -> StageResult<C> {
		// Because we might want to finalize the stage before all data has been received
		// (e.g. due to a timeout), we insert None for any missing data.
		let mut received_messages = std::mem::take(&mut self.messages);

		// Turns values T into Option<T>, inserting `None` where data hasn't been received
		// for `id`
		let messages: BTreeMap<_, _> = self
			.common
			.all_ids
			.iter()
			.map(|id| (*id, received_messages.remove(id)))
			.collect();

		self.processor.process(messages).await
	}

	fn awaited_parties(&self) -> std::collections::BTreeSet<PartyId> {
		self.common.all_ids.iter().filter(|id| !self.messages.contains_key(id)).copied().collect()
	}

	fn get_stage_name(&self) -> C::CeremonyStageName {
		<Stage as BroadcastStageProcessor<C>>::NAME
	}

	fn ceremony_common(&self) -> &CeremonyCommon {
		&self.common
	}
}
