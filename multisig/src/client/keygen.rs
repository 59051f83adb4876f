mod keygen_data;
mod keygen_detail;
mod keygen_stages;


#[cfg(test)]
pub use keygen_data::{gen_keygen_data_hash_comm1, gen_keygen_data_verify_hash_comm2};

pub use keygen_data::{
	CoeffComm3, HashComm1, KeygenData, SecretShare5, VerifyCoeffComm4, VerifyHashComm2,
};

#[cfg(feature = "test")]
pub use keygen_detail::genesis::generate_key_data;

pub use keygen_detail::{generate_keygen_context, HashContext};

pub use keygen_stages::{
	CoefficientCommitments3, HashCommitments1, KeygenCommon, SecretSharesStage5,
	VerifyCommitmentsBroadcast4, VerifyHashCommitmentsBroadcast2,
};
