mod signing_data;
mod signing_detail;
mod signing_stages;


pub use signing_data::{
	Comm1, LocalSig3, LocalSig3Inner, SigningCommitment, SigningData, VerifyComm2, VerifyLocalSig4,
};

pub use signing_detail::generate_schnorr_response;

pub use signing_stages::{
	AwaitCommitments1, LocalSigStage3, SigningStateCommonInfo, VerifyCommitmentsBroadcast2,
	VerifyLocalSigsBroadcastStage4,
};

#[cfg(test)]
pub use signing_data::{gen_signing_data_stage1, gen_signing_data_stage2, gen_signing_data_stage4};

pub use signing_detail::get_lagrange_coeff;
