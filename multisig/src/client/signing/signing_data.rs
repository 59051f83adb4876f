use serde::{Deserialize, Serialize};

use crate::{
	client::common::{BroadcastVerificationMessage, PreProcessStageDataCheck, SigningStageName},
	crypto::ECPoint,
	party::PartyId,
};

/// A party's public nonce commitments `(d, e)` for one signing ceremony,
/// broadcast before any response is computed. See Section 5.2 (page 14) of
/// <https://eprint.iacr.org/2020/852.pdf>.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
pub struct SigningCommitment<P: ECPoint> {
	#[serde(bound = "")]
	pub d: P,
	#[serde(bound = "")]
	pub e: P,
}

pub type Comm1<P> = SigningCommitment<P>;

pub type VerifyComm2<P> = BroadcastVerificationMessage<Comm1<P>>;

/// This party's response share for the ceremony, additive with every other
/// party's share once the nonce binding and Lagrange coefficient have been
/// folded in (see [`super::signing_detail::generate_local_sig`]).
pub type LocalSig3Inner<P> = <P as ECPoint>::Scalar;

pub type LocalSig3<P> = LocalSig3Inner<P>;

pub type VerifyLocalSig4<P> = BroadcastVerificationMessage<LocalSig3<P>>;

/// Data sent between parties over p2p for a signing ceremony
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
pub enum SigningData<P: ECPoint> {
	#[serde(bound = "")]
	CommStage1(Comm1<P>),
	#[serde(bound = "")]
	VerifyCommitmentsBroadcast2(VerifyComm2<P>),
	#[serde(bound = "")]
	LocalSigStage3(LocalSig3<P>),
	#[serde(bound = "")]
	VerifyLocalSigsBroadcastStage4(VerifyLocalSig4<P>),
}

impl<P: ECPoint> std::fmt::Display for SigningData<P> {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		let inner = match self {
			SigningData::CommStage1(_) => "CommStage1",
			SigningData::VerifyCommitmentsBroadcast2(_) => "VerifyCommitmentsBroadcast2",
			SigningData::LocalSigStage3(_) => "LocalSigStage3",
			SigningData::VerifyLocalSigsBroadcastStage4(_) => "VerifyLocalSigsBroadcastStage4",
		};
		write!(f, "SigningData({inner})")
	}
}

impl<P: ECPoint> PreProcessStageDataCheck<SigningStageName> for SigningData<P> {
	fn is_data_size_valid(&self, num_of_parties: u32) -> bool {
		let num_of_parties = num_of_parties as usize;
		match self {
			SigningData::CommStage1(_) => self.is_initial_stage_data_size_valid(),
			SigningData::VerifyCommitmentsBroadcast2(message) => message.data.len() == num_of_parties,
			SigningData::LocalSigStage3(_) => true,
			SigningData::VerifyLocalSigsBroadcastStage4(message) => message.data.len() == num_of_parties,
		}
	}

	fn is_initial_stage_data_size_valid(&self) -> bool {
		match self {
			SigningData::CommStage1(_) => true,
			_ => panic!("unexpected stage"),
		}
	}

	fn should_delay_unauthorised(&self) -> bool {
		matches!(self, SigningData::CommStage1(_))
	}

	fn should_delay(stage_name: SigningStageName, message: &Self) -> bool {
		match stage_name {
			SigningStageName::AwaitCommitments1 => {
				matches!(message, SigningData::VerifyCommitmentsBroadcast2(_))
			},
			SigningStageName::VerifyCommitmentsBroadcast2 => {
				matches!(message, SigningData::LocalSigStage3(_))
			},
			SigningStageName::LocalSigStage3 => {
				matches!(message, SigningData::VerifyLocalSigsBroadcastStage4(_))
			},
			SigningStageName::VerifyLocalSigsBroadcastStage4 => false,
		}
	}
}

derive_impls_for_enum_variants!(impl<P: ECPoint> for Comm1<P>, SigningData::CommStage1, SigningData<P>);
derive_impls_for_enum_variants!(impl<P: ECPoint> for VerifyComm2<P>, SigningData::VerifyCommitmentsBroadcast2, SigningData<P>);
derive_impls_for_enum_variants!(impl<P: ECPoint> for LocalSig3<P>, SigningData::LocalSigStage3, SigningData<P>);
derive_impls_for_enum_variants!(impl<P: ECPoint> for VerifyLocalSig4<P>, SigningData::VerifyLocalSigsBroadcastStage4, SigningData<P>);

#[cfg(test)]
pub fn gen_signing_data_stage1(
	d: crate::crypto::secp256k1::Point,
	e: crate::crypto::secp256k1::Point,
) -> SigningData<crate::crypto::secp256k1::Point> {
	SigningData::CommStage1(SigningCommitment { d, e })
}

#[cfg(test)]
pub fn gen_signing_data_stage2(
	data: std::collections::BTreeMap<PartyId, Option<Comm1<crate::crypto::secp256k1::Point>>>,
) -> SigningData<crate::crypto::secp256k1::Point> {
	SigningData::VerifyCommitmentsBroadcast2(BroadcastVerificationMessage { data })
}

#[cfg(test)]
pub fn gen_signing_data_stage4(
	data: std::collections::BTreeMap<PartyId, Option<LocalSig3<crate::crypto::secp256k1::Point>>>,
) -> SigningData<crate::crypto::secp256k1::Point> {
	SigningData::VerifyLocalSigsBroadcastStage4(BroadcastVerificationMessage { data })
}
