use std::{collections::BTreeSet, fmt, num::NonZeroU32};

use serde::{Deserialize, Serialize};

/// Identifies a member of the signing committee. Doubles as the party's Shamir
/// evaluation point, so it is never allowed to be zero.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PartyId(NonZeroU32);

impl PartyId {
	pub fn new(id: u32) -> Option<Self> {
		NonZeroU32::new(id).map(PartyId)
	}

	pub fn get(&self) -> u32 {
		self.0.get()
	}
}

impl fmt::Display for PartyId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "party-{}", self.0)
	}
}

impl TryFrom<u32> for PartyId {
	type Error = &'static str;

	fn try_from(value: u32) -> Result<Self, Self::Error> {
		PartyId::new(value).ok_or("party id must not be zero")
	}
}

/// A monotonically increasing identifier scoped to this process, shared by
/// both DKG and signing ceremonies.
pub type CeremonyId = u64;

/// How many ceremony ids ahead of the latest authorised one we are willing to
/// buffer messages for before discarding them as out of window.
pub const CEREMONY_ID_WINDOW: u64 = 6000;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThresholdParameters {
	/// Number of parties holding a share of the key.
	pub share_count: u32,
	/// Number of parties required to produce a valid signature (the `t` in `t`-of-`n`).
	pub threshold: u32,
}

impl ThresholdParameters {
	pub fn new(share_count: u32, threshold: u32) -> Self {
		assert!(threshold < share_count, "threshold must be strictly less than the party count");
		ThresholdParameters { share_count, threshold }
	}

	/// Minimum number of parties that must agree to make progress.
	pub fn ceremony_size(&self) -> u32 {
		self.threshold + 1
	}
}

/// Find an element that appears more than `threshold` times.
pub fn find_frequent_element<T, Iter>(iter: Iter, threshold: usize) -> Option<T>
where
	T: Clone + Ord,
	Iter: Iterator<Item = T>,
{
	use itertools::Itertools;

	iter.sorted_unstable()
		.group_by(|x| x.clone())
		.into_iter()
		.map(|(_, group)| (group.clone().next().unwrap(), group.count()))
		.find(|(_, count)| *count > threshold)
		.map(|(x, _)| x)
}

/// The number of parties that must agree on what was broadcast in order to
/// trust it, given `total_parties` participants. Using (one more than) half
/// the participants maximises the number of colluding parties required to
/// falsely accuse an honest one.
pub fn threshold_for_broadcast_verification(total_parties: usize) -> usize {
	total_parties / 2
}

pub fn all_party_ids(count: u32) -> BTreeSet<PartyId> {
	(1..=count).map(|id| PartyId::new(id).expect("non-zero by construction")).collect()
}
