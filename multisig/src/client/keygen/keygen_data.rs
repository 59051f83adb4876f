
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{
	client::common::{
		BroadcastVerificationMessage, DelayDeserialization, KeygenStageName,
		PreProcessStageDataCheck,
	},
	crypto::ECPoint,
	party::PartyId,
};

use super::keygen_detail::{ShamirShare, MAX_COEFF_COMM_3_SIZE};

/// Data sent between parties over p2p for a keygen ceremony
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
pub enum KeygenData<P: ECPoint> {
	HashComm1(HashComm1),
	VerifyHashComm2(VerifyHashComm2),
	#[serde(bound = "")] // see https://github.com/serde-rs/serde/issues/1296
	CoeffComm3(CoeffComm3<P>),
	#[serde(bound = "")]
	VerifyCoeffComm4(VerifyCoeffComm4<P>),
	#[serde(bound = "")]
	SecretShares5(SecretShare5<P>),
}

impl<P: ECPoint> std::fmt::Display for KeygenData<P> {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		let inner = match self {
			KeygenData::HashComm1(inner) => inner.to_string(),
			KeygenData::VerifyHashComm2(inner) => inner.to_string(),
			KeygenData::CoeffComm3(inner) => inner.to_string(),
			KeygenData::VerifyCoeffComm4(inner) => inner.to_string(),
			KeygenData::SecretShares5(inner) => inner.to_string(),
		};
		write!(f, "KeygenData({inner})")
	}
}

impl<P: ECPoint> PreProcessStageDataCheck<KeygenStageName> for KeygenData<P> {
	fn is_data_size_valid(&self, num_of_parties: u32) -> bool {
		let num_of_parties = num_of_parties as usize;
		match self {
			KeygenData::HashComm1(_) => self.is_initial_stage_data_size_valid(),
			KeygenData::VerifyHashComm2(message) => message.data.len() == num_of_parties,
			KeygenData::CoeffComm3(message) => message.payload.len() <= MAX_COEFF_COMM_3_SIZE,
			KeygenData::VerifyCoeffComm4(message) =>
				message.data.len() == num_of_parties &&
					!message
						.data
						.values()
						.flatten()
						.any(|comm| comm.payload.len() > MAX_COEFF_COMM_3_SIZE),
			KeygenData::SecretShares5(_) => true,
		}
	}

	fn is_initial_stage_data_size_valid(&self) -> bool {
		match self {
			KeygenData::HashComm1(_) => true,
			_ => panic!("unexpected stage"),
		}
	}

	fn should_delay_unauthorised(&self) -> bool {
		matches!(self, KeygenData::HashComm1(_))
	}

	fn should_delay(stage_name: KeygenStageName, message: &Self) -> bool {
		match stage_name {
			KeygenStageName::HashCommitments1 => {
				matches!(message, KeygenData::VerifyHashComm2(_))
			},
			KeygenStageName::VerifyHashCommitmentsBroadcast2 => {
				matches!(message, KeygenData::CoeffComm3(_))
			},
			KeygenStageName::CoefficientCommitments3 => {
				matches!(message, KeygenData::VerifyCoeffComm4(_))
			},
			KeygenStageName::VerifyCommitmentsBroadcast4 => {
				matches!(message, KeygenData::SecretShares5(_))
			},
			KeygenStageName::SecretSharesStage5 => {
				// Last stage, nothing to delay
				false
			},
		}
	}
}

/// SHA-256 commitment to a party's coefficient commitments and zero-knowledge
/// proof, broadcast before the values themselves are revealed.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialOrd, Ord, PartialEq, Eq)]
pub struct HashComm1(pub [u8; 32]);

pub type VerifyHashComm2 = BroadcastVerificationMessage<HashComm1>;

pub type CoeffComm3<P> = DelayDeserialization<super::keygen_detail::DkgUnverifiedCommitment<P>>;

pub type VerifyCoeffComm4<P> = BroadcastVerificationMessage<CoeffComm3<P>>;

/// Secret share of our locally generated secret calculated separately
/// for each party as the result of evaluating sharing polynomial (generated
/// during stage 1) at the corresponding signer's index
pub type SecretShare5<P> = ShamirShare<P>;

derive_impls_for_enum_variants!(impl<P: ECPoint> for HashComm1, KeygenData::HashComm1, KeygenData<P>);
derive_impls_for_enum_variants!(impl<P: ECPoint> for VerifyHashComm2, KeygenData::VerifyHashComm2, KeygenData<P>);
derive_impls_for_enum_variants!(impl<P: ECPoint> for CoeffComm3<P>, KeygenData::CoeffComm3, KeygenData<P>);
derive_impls_for_enum_variants!(impl<P: ECPoint> for VerifyCoeffComm4<P>, KeygenData::VerifyCoeffComm4, KeygenData<P>);
derive_impls_for_enum_variants!(impl<P: ECPoint> for SecretShare5<P>, KeygenData::SecretShares5, KeygenData<P>);

derive_display_as_type_name!(HashComm1);
derive_display_as_type_name!(VerifyHashComm2);
derive_display_as_type_name!(CoeffComm3<P: ECPoint>);
derive_display_as_type_name!(VerifyCoeffComm4<P: ECPoint>);
derive_display_as_type_name!(SecretShare5<P: ECPoint>);

#[cfg(test)]
pub fn gen_keygen_data_hash_comm1(hash: [u8; 32]) -> KeygenData<crate::crypto::secp256k1::Point> {
	KeygenData::HashComm1(HashComm1(hash))
}

#[cfg(test)]
pub fn gen_keygen_data_verify_hash_comm2(
	data: BTreeMap<PartyId, Option<HashComm1>>,
) -> KeygenData<crate::crypto::secp256k1::Point> {
	KeygenData::VerifyHashComm2(BroadcastVerificationMessage { data })
}
