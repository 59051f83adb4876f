use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use tracing::warn;

use super::{
	keygen_data::{CoeffComm3, HashComm1, SecretShare5, VerifyCoeffComm4, VerifyHashComm2},
	keygen_detail::{
		compute_secret_key_share, finalize_keygen, generate_hash_commitment,
		generate_secret_and_shares, validate_commitment, verify_share, DkgCommitment,
		DkgUnverifiedCommitment, HashContext, ShamirShare,
	},
};
use crate::{
	client::{
		ceremony_manager::KeygenCeremony,
		common::{
			broadcast::{BroadcastStage, BroadcastStageProcessor, DataToSend},
			try_deserialize, verify_broadcasts, BroadcastVerificationMessage, CeremonyCommon,
			KeygenFailureReason, KeygenStageName, StageResult,
		},
	},
	crypto::CryptoScheme,
	party::{PartyId, ThresholdParameters},
};

/// Ceremony-wide context for a keygen ceremony, independent of any
/// particular stage.
#[derive(Clone)]
pub struct KeygenCommon {
	pub context: HashContext,
	pub params: ThresholdParameters,
}

/// Stage 1: generate our secret polynomial, the shares derived from it, and
/// broadcast a hash commitment to it without revealing the values yet.
pub struct HashCommitments1<C: CryptoScheme> {
	common: CeremonyCommon,
	keygen_common: KeygenCommon,
	own_commitment: DkgUnverifiedCommitment<C::Point>,
	own_shares: BTreeMap<PartyId, ShamirShare<C::Point>>,
}

impl<C: CryptoScheme> HashCommitments1<C> {
	pub fn new(mut common: CeremonyCommon, keygen_common: KeygenCommon) -> Self {
		let (commitments, zkp, own_shares) = generate_secret_and_shares::<C::Point>(
			&mut common.rng,
			common.own_id,
			&common.all_ids,
			keygen_common.params.threshold,
			&keygen_common.context,
		);

		HashCommitments1 {
			common,
			keygen_common,
			own_commitment: DkgUnverifiedCommitment { commitments, zkp },
			own_shares,
		}
	}
}

derive_display_as_type_name!(HashCommitments1<C: CryptoScheme>);

#[async_trait]
impl<C: CryptoScheme> BroadcastStageProcessor<KeygenCeremony<C>> for HashCommitments1<C> {
	type Message = HashComm1;
	const NAME: KeygenStageName = KeygenStageName::HashCommitments1;

	fn init(&mut self) -> DataToSend<Self::Message> {
		DataToSend::Broadcast(HashComm1(generate_hash_commitment(&self.own_commitment)))
	}

	async fn process(
		self,
		messages: BTreeMap<PartyId, Option<Self::Message>>,
	) -> StageResult<KeygenCeremony<C>> {
		let processor = VerifyHashCommitmentsBroadcast2 {
			common: self.common.clone(),
			keygen_common: self.keygen_common,
			own_commitment: self.own_commitment,
			own_shares: self.own_shares,
			hash_commitments: messages,
		};

		StageResult::NextStage(Box::new(BroadcastStage::new(processor, self.common)))
	}
}

/// Stage 2: re-broadcast the hash commitments received in stage 1 and reach
/// consensus on each party's claimed hash.
pub struct VerifyHashCommitmentsBroadcast2<C: CryptoScheme> {
	common: CeremonyCommon,
	keygen_common: KeygenCommon,
	own_commitment: DkgUnverifiedCommitment<C::Point>,
	own_shares: BTreeMap<PartyId, ShamirShare<C::Point>>,
	hash_commitments: BTreeMap<PartyId, Option<HashComm1>>,
}

derive_display_as_type_name!(VerifyHashCommitmentsBroadcast2<C: CryptoScheme>);

#[async_trait]
impl<C: CryptoScheme> BroadcastStageProcessor<KeygenCeremony<C>>
	for VerifyHashCommitmentsBroadcast2<C>
{
	type Message = VerifyHashComm2;
	const NAME: KeygenStageName = KeygenStageName::VerifyHashCommitmentsBroadcast2;

	fn init(&mut self) -> DataToSend<Self::Message> {
		DataToSend::Broadcast(BroadcastVerificationMessage { data: self.hash_commitments.clone() })
	}

	async fn process(
		self,
		messages: BTreeMap<PartyId, Option<Self::Message>>,
	) -> StageResult<KeygenCeremony<C>> {
		match verify_broadcasts(&self.common.all_ids, messages) {
			Ok(agreed_hash_commitments) => {
				let processor = CoefficientCommitments3 {
					common: self.common.clone(),
					keygen_common: self.keygen_common,
					own_commitment: self.own_commitment,
					own_shares: self.own_shares,
					agreed_hash_commitments,
				};

				StageResult::NextStage(Box::new(BroadcastStage::new(processor, self.common)))
			},
			Err((reported_parties, reason)) => StageResult::Error(
				reported_parties,
				KeygenFailureReason::BroadcastFailure(reason, Self::NAME),
			),
		}
	}
}

/// Stage 3: reveal our coefficient commitments and zero-knowledge proof.
pub struct CoefficientCommitments3<C: CryptoScheme> {
	common: CeremonyCommon,
	keygen_common: KeygenCommon,
	own_commitment: DkgUnverifiedCommitment<C::Point>,
	own_shares: BTreeMap<PartyId, ShamirShare<C::Point>>,
	agreed_hash_commitments: BTreeMap<PartyId, HashComm1>,
}

derive_display_as_type_name!(CoefficientCommitments3<C: CryptoScheme>);

#[async_trait]
impl<C: CryptoScheme> BroadcastStageProcessor<KeygenCeremony<C>> for CoefficientCommitments3<C> {
	type Message = CoeffComm3<C::Point>;
	const NAME: KeygenStageName = KeygenStageName::CoefficientCommitments3;

	fn init(&mut self) -> DataToSend<Self::Message> {
		let bytes =
			bincode::serialize(&self.own_commitment).expect("commitment is always serializable");
		DataToSend::Broadcast(CoeffComm3::<C::Point>::new(bytes))
	}

	async fn process(
		self,
		messages: BTreeMap<PartyId, Option<Self::Message>>,
	) -> StageResult<KeygenCeremony<C>> {
		let processor = VerifyCommitmentsBroadcast4 {
			common: self.common.clone(),
			keygen_common: self.keygen_common,
			own_shares: self.own_shares,
			agreed_hash_commitments: self.agreed_hash_commitments,
			commitments: messages,
		};

		StageResult::NextStage(Box::new(BroadcastStage::new(processor, self.common)))
	}
}

/// Stage 4: re-broadcast the raw coefficient commitments received in stage 3,
/// reach consensus on each sender's bytes, then check them against the
/// stage 2 hash commitment, the zero-knowledge proof, and the expected
/// polynomial degree.
pub struct VerifyCommitmentsBroadcast4<C: CryptoScheme> {
	common: CeremonyCommon,
	keygen_common: KeygenCommon,
	own_shares: BTreeMap<PartyId, ShamirShare<C::Point>>,
	agreed_hash_commitments: BTreeMap<PartyId, HashComm1>,
	commitments: BTreeMap<PartyId, Option<CoeffComm3<C::Point>>>,
}

derive_display_as_type_name!(VerifyCommitmentsBroadcast4<C: CryptoScheme>);

#[async_trait]
impl<C: CryptoScheme> BroadcastStageProcessor<KeygenCeremony<C>> for VerifyCommitmentsBroadcast4<C> {
	type Message = VerifyCoeffComm4<C::Point>;
	const NAME: KeygenStageName = KeygenStageName::VerifyCommitmentsBroadcast4;

	fn init(&mut self) -> DataToSend<Self::Message> {
		DataToSend::Broadcast(BroadcastVerificationMessage { data: self.commitments.clone() })
	}

	async fn process(
		self,
		messages: BTreeMap<PartyId, Option<Self::Message>>,
	) -> StageResult<KeygenCeremony<C>> {
		let raw_commitments = match verify_broadcasts(&self.common.all_ids, messages) {
			Ok(raw_commitments) => raw_commitments,
			Err((reported_parties, reason)) =>
				return StageResult::Error(
					reported_parties,
					KeygenFailureReason::BroadcastFailure(reason, Self::NAME),
				),
		};

		let unverified_commitments = match try_deserialize(raw_commitments) {
			Ok(unverified_commitments) => unverified_commitments,
			Err(bad_parties) =>
				return StageResult::Error(bad_parties, KeygenFailureReason::InvalidCommitment),
		};

		let mut dkg_commitments: BTreeMap<PartyId, DkgCommitment<C::Point>> = BTreeMap::new();
		let mut bad_parties = BTreeSet::new();

		for (sender_id, unverified) in unverified_commitments {
			let hash_commitment = &self.agreed_hash_commitments[&sender_id].0;
			match validate_commitment::<C::Point>(
				sender_id,
				unverified,
				hash_commitment,
				self.keygen_common.params.threshold,
				&self.keygen_common.context,
			) {
				Ok(commitment) => {
					dkg_commitments.insert(sender_id, commitment);
				},
				Err(reason) => {
					warn!(from_id = sender_id.to_string(), "Invalid coefficient commitment: {reason}");
					bad_parties.insert(sender_id);
				},
			}
		}

		if !bad_parties.is_empty() {
			return StageResult::Error(bad_parties, KeygenFailureReason::InvalidCommitment)
		}

		let processor = SecretSharesStage5 {
			common: self.common.clone(),
			keygen_common: self.keygen_common,
			own_shares: self.own_shares,
			commitments: dkg_commitments,
		};

		StageResult::NextStage(Box::new(BroadcastStage::new(processor, self.common)))
	}
}

/// Stage 5: privately send each party their Shamir share, verify the shares
/// we receive against the now-agreed commitments, and derive our key share.
pub struct SecretSharesStage5<C: CryptoScheme> {
	common: CeremonyCommon,
	keygen_common: KeygenCommon,
	own_shares: BTreeMap<PartyId, ShamirShare<C::Point>>,
	commitments: BTreeMap<PartyId, DkgCommitment<C::Point>>,
}

derive_display_as_type_name!(SecretSharesStage5<C: CryptoScheme>);

#[async_trait]
impl<C: CryptoScheme> BroadcastStageProcessor<KeygenCeremony<C>> for SecretSharesStage5<C> {
	type Message = SecretShare5<C::Point>;
	const NAME: KeygenStageName = KeygenStageName::SecretSharesStage5;

	fn init(&mut self) -> DataToSend<Self::Message> {
		DataToSend::Private(std::mem::take(&mut self.own_shares))
	}

	async fn process(
		self,
		messages: BTreeMap<PartyId, Option<Self::Message>>,
	) -> StageResult<KeygenCeremony<C>> {
		let mut bad_parties = BTreeSet::new();
		let mut valid_shares = BTreeMap::new();

		for (sender_id, share) in messages {
			match share {
				Some(share) if verify_share(&share, &self.commitments[&sender_id], self.common.own_id) => {
					valid_shares.insert(sender_id, share);
				},
				_ => {
					warn!(from_id = sender_id.to_string(), "Invalid or missing secret share");
					bad_parties.insert(sender_id);
				},
			}
		}

		if !bad_parties.is_empty() {
			return StageResult::Error(bad_parties, KeygenFailureReason::InvalidSecretShare)
		}

		let secret_share = compute_secret_key_share::<C::Point>(valid_shares);

		let info = finalize_keygen::<C>(
			self.common.own_id,
			self.common.all_ids.clone(),
			self.keygen_common.params,
			secret_share,
			&self.commitments,
		);

		StageResult::Done(info)
	}
}
