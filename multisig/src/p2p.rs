use crate::party::PartyId;
use serde::{Deserialize, Serialize};

/// Wire protocol version. Bumped whenever the serialized shape of
/// [`crate::client::MultisigMessage`] changes in a way that isn't backwards
/// compatible.
pub type ProtocolVersion = u8;

pub const CURRENT_PROTOCOL_VERSION: ProtocolVersion = 1;

/// Messages a ceremony stage hands to the transport layer for delivery.
/// Broadcasts go to every other party in the ceremony; private messages are
/// addressed individually (used for DKG secret shares).
#[derive(Debug, Clone)]
pub enum OutgoingMultisigStageMessages {
	Broadcast(Vec<PartyId>, Vec<u8>),
	Private(Vec<(PartyId, Vec<u8>)>),
}

/// A ceremony message as it arrives off the wire, still tagged with the
/// protocol version it was serialized with.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionedCeremonyMessage {
	pub version: ProtocolVersion,
	pub payload: Vec<u8>,
}
