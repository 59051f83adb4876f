use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::party::{find_frequent_element, threshold_for_broadcast_verification, PartyId};

use super::failure_reason::BroadcastFailureReason;

/// Bytes received off the wire for a stage, kept un-deserialized until we
/// know which concrete message type the stage expects (so a malformed
/// message from one party can be reported without blocking everyone else).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DelayDeserialization<T> {
	pub payload: Vec<u8>,
	#[serde(skip)]
	_marker: std::marker::PhantomData<T>,
}

impl<T> DelayDeserialization<T> {
	pub fn new(payload: Vec<u8>) -> Self {
		Self { payload, _marker: std::marker::PhantomData }
	}
}

// The wrapped type is not deserialized until needed, so ordering/equality is
// defined purely in terms of the raw bytes, regardless of whether `T` itself
// implements these traits.
impl<T> PartialEq for DelayDeserialization<T> {
	fn eq(&self, other: &Self) -> bool {
		self.payload == other.payload
	}
}

impl<T> Eq for DelayDeserialization<T> {}

impl<T> PartialOrd for DelayDeserialization<T> {
	fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
		Some(self.cmp(other))
	}
}

impl<T> Ord for DelayDeserialization<T> {
	fn cmp(&self, other: &Self) -> std::cmp::Ordering {
		self.payload.cmp(&other.payload)
	}
}

impl<T: serde::de::DeserializeOwned> DelayDeserialization<T> {
	pub fn deserialize(&self) -> bincode::Result<T> {
		bincode::deserialize(&self.payload)
	}
}

/// What a single party claims to have received, directly, from every sender
/// during the broadcast half of a stage. Sent during the verification half
/// so that a sender who told different parties different things gets caught.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
pub struct BroadcastVerificationMessage<T: PartialEq + Eq + PartialOrd + Ord> {
	pub data: BTreeMap<PartyId, Option<T>>,
}

/// Reconcile what every party claims to have received from every sender.
///
/// For each sender, looks at what all the verifiers say that sender sent them
/// and accepts the value only if a majority of verifiers agree on it. Senders
/// for whom no majority value exists are reported as having broadcast
/// inconsistent data. If too few parties even sent a verification message to
/// begin with, consensus can't be established at all and the non-responders
/// are reported instead.
pub fn verify_broadcasts<T>(
	verifying_parties: &BTreeSet<PartyId>,
	verification_messages: BTreeMap<PartyId, Option<BroadcastVerificationMessage<T>>>,
) -> Result<BTreeMap<PartyId, T>, (BTreeSet<PartyId>, BroadcastFailureReason)>
where
	T: Clone + Ord,
{
	let threshold = threshold_for_broadcast_verification(verifying_parties.len());

	let missing_verifiers: BTreeSet<PartyId> = verifying_parties
		.iter()
		.filter(|id| !matches!(verification_messages.get(id), Some(Some(_))))
		.copied()
		.collect();

	if verifying_parties.len() - missing_verifiers.len() <= threshold {
		return Err((missing_verifiers, BroadcastFailureReason::InsufficientVerificationMessages))
	}

	let mut agreed_values = BTreeMap::new();
	let mut bad_parties = BTreeSet::new();

	for &sender_id in verifying_parties {
		let reported_values = verification_messages
			.values()
			.filter_map(|m| m.as_ref())
			.filter_map(|m| m.data.get(&sender_id).cloned().flatten());

		match find_frequent_element(reported_values, threshold) {
			Some(value) => {
				agreed_values.insert(sender_id, value);
			},
			None => {
				bad_parties.insert(sender_id);
			},
		}
	}

	if bad_parties.is_empty() {
		Ok(agreed_values)
	} else {
		Err((bad_parties, BroadcastFailureReason::Inconsistency))
	}
}
