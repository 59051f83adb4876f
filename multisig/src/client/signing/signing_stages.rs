use std::collections::BTreeMap;

use async_trait::async_trait;

use super::{
	signing_data::{Comm1, LocalSig3, VerifyComm2, VerifyLocalSig4},
	signing_detail::{aggregate_signature, SecretNoncePair},
	SigningCommitment,
};
use crate::{
	client::{
		ceremony_manager::SigningCeremony,
		common::{
			broadcast::{BroadcastStage, BroadcastStageProcessor, DataToSend},
			verify_broadcasts, BroadcastVerificationMessage, CeremonyCommon, KeygenResult,
			SigningFailureReason, SigningStageName, StageResult,
		},
	},
	crypto::{CryptoScheme, KeyId},
	keystore::SigningOracle,
	party::PartyId,
};

type SigningStageResult<C> = StageResult<SigningCeremony<C>>;

/// Key share and payload a signing ceremony is running over. Kept separate
/// from [`CeremonyCommon`] since keygen ceremonies have no payload.
///
/// `key` carries the public aggregate key and per-party public shares, which
/// stage 4 needs to verify the aggregated signature; the secret share itself
/// is never read out of the key store directly. Stage 3 instead asks `oracle`
/// to produce this party's response share for `key_id`.
#[derive(Clone)]
pub struct SigningStateCommonInfo<C: CryptoScheme> {
	pub payload: C::SigningPayload,
	pub key: std::sync::Arc<KeygenResult<C>>,
	pub key_id: KeyId,
	pub oracle: std::sync::Arc<dyn SigningOracle<C>>,
}

/// Stage 1: generate and broadcast our secret nonce pair's public commitment.
pub struct AwaitCommitments1<C: CryptoScheme> {
	common: CeremonyCommon,
	signing_common: SigningStateCommonInfo<C>,
	nonces: Box<SecretNoncePair<C::Point>>,
}

impl<C: CryptoScheme> AwaitCommitments1<C> {
	pub fn new(mut common: CeremonyCommon, signing_common: SigningStateCommonInfo<C>) -> Self {
		let nonces = SecretNoncePair::sample_random(&mut common.rng);
		AwaitCommitments1 { common, signing_common, nonces }
	}
}

derive_display_as_type_name!(AwaitCommitments1<C: CryptoScheme>);

#[async_trait]
impl<C: CryptoScheme> BroadcastStageProcessor<SigningCeremony<C>> for AwaitCommitments1<C> {
	type Message = Comm1<C::Point>;
	const NAME: SigningStageName = SigningStageName::AwaitCommitments1;

	fn init(&mut self) -> DataToSend<Self::Message> {
		DataToSend::Broadcast(SigningCommitment { d: self.nonces.d_pub, e: self.nonces.e_pub })
	}

	async fn process(self, messages: BTreeMap<PartyId, Option<Self::Message>>) -> SigningStageResult<C> {
		let processor = VerifyCommitmentsBroadcast2 {
			common: self.common.clone(),
			signing_common: self.signing_common,
			nonces: self.nonces,
			commitments: messages,
		};

		StageResult::NextStage(Box::new(BroadcastStage::new(processor, self.common)))
	}
}

/// Stage 2: re-broadcast what was received in stage 1 and reach consensus
/// on each party's commitment.
pub struct VerifyCommitmentsBroadcast2<C: CryptoScheme> {
	common: CeremonyCommon,
	signing_common: SigningStateCommonInfo<C>,
	nonces: Box<SecretNoncePair<C::Point>>,
	commitments: BTreeMap<PartyId, Option<Comm1<C::Point>>>,
}

derive_display_as_type_name!(VerifyCommitmentsBroadcast2<C: CryptoScheme>);

#[async_trait]
impl<C: CryptoScheme> BroadcastStageProcessor<SigningCeremony<C>> for VerifyCommitmentsBroadcast2<C> {
	type Message = VerifyComm2<C::Point>;
	const NAME: SigningStageName = SigningStageName::VerifyCommitmentsBroadcast2;

	fn init(&mut self) -> DataToSend<Self::Message> {
		DataToSend::Broadcast(BroadcastVerificationMessage { data: self.commitments.clone() })
	}

	async fn process(self, messages: BTreeMap<PartyId, Option<Self::Message>>) -> SigningStageResult<C> {
		match verify_broadcasts(&self.common.all_ids, messages) {
			Ok(commitments) => {
				let processor = LocalSigStage3 {
					common: self.common.clone(),
					signing_common: self.signing_common,
					nonces: self.nonces,
					commitments,
				};

				StageResult::NextStage(Box::new(BroadcastStage::new(processor, self.common)))
			},
			Err((reported_parties, reason)) => StageResult::Error(
				reported_parties,
				SigningFailureReason::BroadcastFailure(reason, Self::NAME),
			),
		}
	}
}

/// Stage 3: compute and broadcast this party's local signature response.
pub struct LocalSigStage3<C: CryptoScheme> {
	common: CeremonyCommon,
	signing_common: SigningStateCommonInfo<C>,
	nonces: Box<SecretNoncePair<C::Point>>,
	commitments: BTreeMap<PartyId, SigningCommitment<C::Point>>,
}

derive_display_as_type_name!(LocalSigStage3<C: CryptoScheme>);

#[async_trait]
impl<C: CryptoScheme> BroadcastStageProcessor<SigningCeremony<C>> for LocalSigStage3<C> {
	type Message = LocalSig3<C::Point>;
	const NAME: SigningStageName = SigningStageName::LocalSigStage3;

	fn init(&mut self) -> DataToSend<Self::Message> {
		let response = self
			.signing_common
			.oracle
			.sign(
				&self.signing_common.key_id,
				&self.signing_common.payload,
				self.common.own_id,
				&self.common.all_ids,
				&self.nonces,
				&self.commitments,
			)
			.expect("key store must hold a valid share for a ceremony already authorised to sign with it");

		// Nonces are single-use (step 6, Figure 3, https://eprint.iacr.org/2020/852.pdf)
		// and are zeroized on drop, so nothing further to clear here.
		DataToSend::Broadcast(response)
	}

	async fn process(self, messages: BTreeMap<PartyId, Option<Self::Message>>) -> SigningStageResult<C> {
		let processor = VerifyLocalSigsBroadcastStage4 {
			common: self.common.clone(),
			signing_common: self.signing_common,
			commitments: self.commitments,
			responses: messages,
		};

		StageResult::NextStage(Box::new(BroadcastStage::new(processor, self.common)))
	}
}

/// Stage 4: re-broadcast stage 3 responses, reach consensus, then aggregate
/// and verify the final signature.
pub struct VerifyLocalSigsBroadcastStage4<C: CryptoScheme> {
	common: CeremonyCommon,
	signing_common: SigningStateCommonInfo<C>,
	commitments: BTreeMap<PartyId, SigningCommitment<C::Point>>,
	responses: BTreeMap<PartyId, Option<LocalSig3<C::Point>>>,
}

derive_display_as_type_name!(VerifyLocalSigsBroadcastStage4<C: CryptoScheme>);

#[async_trait]
impl<C: CryptoScheme> BroadcastStageProcessor<SigningCeremony<C>> for VerifyLocalSigsBroadcastStage4<C> {
	type Message = VerifyLocalSig4<C::Point>;
	const NAME: SigningStageName = SigningStageName::VerifyLocalSigsBroadcastStage4;

	fn init(&mut self) -> DataToSend<Self::Message> {
		DataToSend::Broadcast(BroadcastVerificationMessage { data: self.responses.clone() })
	}

	async fn process(self, messages: BTreeMap<PartyId, Option<Self::Message>>) -> SigningStageResult<C> {
		let responses = match verify_broadcasts(&self.common.all_ids, messages) {
			Ok(responses) => responses,
			Err((reported_parties, reason)) =>
				return StageResult::Error(
					reported_parties,
					SigningFailureReason::BroadcastFailure(reason, Self::NAME),
				),
		};

		let agg_pubkey = self.signing_common.key.get_agg_public_key_point();

		match aggregate_signature::<C>(
			&self.signing_common.payload,
			&self.common.all_ids,
			agg_pubkey,
			&self.signing_common.key.party_public_keys,
			&self.commitments,
			&responses,
		) {
			Ok(signature) => StageResult::Done(signature),
			Err(reported_parties) =>
				StageResult::Error(reported_parties, SigningFailureReason::InvalidSigShare),
		}
	}
}
