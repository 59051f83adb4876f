pub mod broadcast;
mod broadcast_verification;
mod ceremony_stage;
mod failure_reason;

pub use ceremony_stage::{
	CeremonyCommon, CeremonyStage, PreProcessStageDataCheck, ProcessMessageResult, StageResult,
};

pub use broadcast_verification::{verify_broadcasts, BroadcastVerificationMessage, DelayDeserialization};

pub use failure_reason::{
	BroadcastFailureReason, CeremonyFailureReason, KeygenFailureReason, SigningFailureReason,
};
use thiserror::Error;

use std::{
	collections::{BTreeMap, BTreeSet},
	sync::Arc,
};

use serde::{Deserialize, Serialize};

use crate::crypto::{CryptoScheme, ECPoint, KeyShare};
use crate::party::{PartyId, ThresholdParameters};

pub type PublicKey<C> = <C as CryptoScheme>::PublicKey;
pub type SigningPayload<C> = <C as CryptoScheme>::SigningPayload;
pub type Signature<C> = <C as CryptoScheme>::Signature;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct KeygenResult<C: CryptoScheme> {
	#[serde(bound = "")]
	pub key_share: KeyShare<C::Point>,
	#[serde(bound = "")]
	pub party_public_keys: BTreeMap<PartyId, C::Point>,
	// NOTE: making this private ensures that the only way to create the struct is through the
	// constructor below.
	unused_private_field: (),
}

impl<C: CryptoScheme> KeygenResult<C> {
	pub fn new(key_share: KeyShare<C::Point>, party_public_keys: BTreeMap<PartyId, C::Point>) -> Self {
		Self { key_share, party_public_keys, unused_private_field: () }
	}

	pub fn get_agg_public_key_point(&self) -> C::Point {
		self.key_share.y
	}

	pub fn get_agg_public_key(&self) -> C::PublicKey {
		C::pubkey_from_point(&self.get_agg_public_key_point())
	}
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct KeygenResultInfo<C: CryptoScheme> {
	#[serde(bound = "")]
	pub key: Arc<KeygenResult<C>>,
	pub own_id: PartyId,
	pub all_ids: BTreeSet<PartyId>,
	pub params: ThresholdParameters,
}

#[derive(Error, Debug, PartialEq, Eq, PartialOrd, Ord, Clone, Copy)]
pub enum KeygenStageName {
	#[error("Hash Commitments [1]")]
	HashCommitments1,
	#[error("Verify Hash Commitments [2]")]
	VerifyHashCommitmentsBroadcast2,
	#[error("Coefficient Commitments [3]")]
	CoefficientCommitments3,
	#[error("Verify Coefficient Commitments [4]")]
	VerifyCommitmentsBroadcast4,
	#[error("Secret Shares [5]")]
	SecretSharesStage5,
}

#[derive(Error, Debug, PartialEq, Eq, PartialOrd, Ord, Clone, Copy)]
pub enum SigningStageName {
	#[error("Commitments [1]")]
	AwaitCommitments1,
	#[error("Verify Commitments [2]")]
	VerifyCommitmentsBroadcast2,
	#[error("Local Signatures [3]")]
	LocalSigStage3,
	#[error("Verify Local Signatures [4]")]
	VerifyLocalSigsBroadcastStage4,
}

/// Try to deserialize all messages. If at least one fails,
/// return the parties for which deserialization failed.
pub fn try_deserialize<T: serde::de::DeserializeOwned>(
	messages: BTreeMap<PartyId, DelayDeserialization<T>>,
) -> Result<BTreeMap<PartyId, T>, BTreeSet<PartyId>> {
	use itertools::Itertools as _;

	let (deserialized_messages, bad_parties): (BTreeMap<_, _>, BTreeSet<_>) = messages
		.into_iter()
		.map(|(id, serialized_message)| match serialized_message.deserialize() {
			Ok(message) => Ok((id, message)),
			Err(e) => {
				tracing::warn!("Failed to deserialize message from party {}: {}", id, e);
				Err(id)
			},
		})
		.partition_result();

	if bad_parties.is_empty() {
		Ok(deserialized_messages)
	} else {
		Err(bad_parties)
	}
}
