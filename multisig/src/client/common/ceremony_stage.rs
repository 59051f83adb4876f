use std::collections::BTreeSet;

use crate::{
	client::ceremony_manager::CeremonyTrait, crypto::Rng, p2p::OutgoingMultisigStageMessages,
	party::{CeremonyId, PartyId},
};
use async_trait::async_trait;
use tokio::sync::mpsc::UnboundedSender;

/// Outcome of a given ceremony stage
pub enum StageResult<C: CeremonyTrait> {
	/// Ceremony proceeds to the next stage
	NextStage(Box<dyn CeremonyStage<C> + Send + Sync>),
	/// Ceremony aborted (contains parties to report)
	Error(BTreeSet<PartyId>, C::FailureReason),
	/// Ceremony finished and successful
	Done(C::Output),
}

/// The result of processing a message for a stage from a single party
/// (currently used to indicate whether we are ready to proceed to the
/// next stage)
pub enum ProcessMessageResult {
	/// No further messages are expected for the current stage
	Ready,
	/// Should wait for more messages
	NotReady,
}

/// Defines actions that any given stage of a ceremony should be able to perform
#[async_trait]
pub trait CeremonyStage<C: CeremonyTrait> {
	/// Perform initial computation for this stage (and initiate communication with other parties)
	fn init(&mut self) -> ProcessMessageResult;

	/// Process message from `sender_id`. Precondition: the sender is a valid holder of the key
	/// and selected to participate in this ceremony.
	fn process_message(&mut self, sender_id: PartyId, m: C::Data) -> ProcessMessageResult;

	/// Verify data for this stage after it is received from all other parties,
	/// either abort or proceed to the next stage based on the result
	async fn finalize(self: Box<Self>) -> StageResult<C>;

	/// Parties we haven't heard from for the current stage
	fn awaited_parties(&self) -> BTreeSet<PartyId>;

	fn get_stage_name(&self) -> C::CeremonyStageName;

	fn ceremony_common(&self) -> &CeremonyCommon;
}

/// Data useful during any stage of a ceremony
#[derive(Clone)]
pub struct CeremonyCommon {
	pub ceremony_id: CeremonyId,
	/// Our own party id
	pub own_id: PartyId,
	/// Ids of parties participating in the ceremony
	pub all_ids: BTreeSet<PartyId>,
	pub outgoing_p2p_message_sender: UnboundedSender<OutgoingMultisigStageMessages>,
	pub rng: Rng,
}

impl CeremonyCommon {
	pub fn is_id_valid(&self, id: PartyId) -> bool {
		self.all_ids.contains(&id)
	}
}

pub trait PreProcessStageDataCheck<CeremonyStageName> {
	/// Check that the number of elements in the data is correct
	fn is_data_size_valid(&self, num_of_parties: u32) -> bool;

	/// Check that the number of elements in the data is within expected bounds.
	/// This is needed because we may not know how many parties are going to participate yet.
	fn is_initial_stage_data_size_valid(&self) -> bool;

	/// Returns true if this message should be delayed if the ceremony is still unauthorised.
	/// This is needed because a message may arrive before the ceremony request.
	fn should_delay_unauthorised(&self) -> bool;

	/// Returns true if this message should be delayed for the given stage
	fn should_delay(stage_name: CeremonyStageName, message: &Self) -> bool;
}
