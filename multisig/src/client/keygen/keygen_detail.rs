use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::{
	crypto::{ECPoint, ECScalar, KeyShare, Rng},
	party::PartyId,
};

use super::super::common::{KeygenResult, KeygenResultInfo};
use crate::crypto::CryptoScheme;
use crate::party::ThresholdParameters;

/// Upper bound on the number of coefficient commitments in a single [`CoeffComm3`]
/// message, i.e. one more than the largest threshold this crate expects to run with.
///
/// [`CoeffComm3`]: super::keygen_data::CoeffComm3
pub const MAX_COEFF_COMM_3_SIZE: usize = 32;

/// Domain-separation context for a specific ceremony, preventing a party's
/// zero-knowledge proof from one ceremony being replayed in another.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HashContext(pub [u8; 32]);

pub fn generate_keygen_context(
	ceremony_id: crate::party::CeremonyId,
	signers: &BTreeSet<PartyId>,
) -> HashContext {
	let mut hasher = Sha256::new();
	hasher.update(ceremony_id.to_be_bytes());
	for id in signers {
		hasher.update(id.get().to_be_bytes());
	}
	HashContext(hasher.finalize().into())
}

/// Evaluate a polynomial (given by its coefficients, constant term first) at
/// `x` using Horner's rule.
pub fn evaluate_polynomial<P: ECPoint>(coefficients: &[P::Scalar], x: PartyId) -> P::Scalar {
	let x_scalar = P::Scalar::from(x.get());
	coefficients
		.iter()
		.rev()
		.fold(P::Scalar::zero(), |acc, coeff| acc * &x_scalar + coeff.clone())
}

fn evaluate_polynomial_in_exponent<P: ECPoint>(commitments: &[P], x: PartyId) -> P {
	let x_scalar = P::Scalar::from(x.get());
	commitments
		.iter()
		.rev()
		.fold(P::point_at_infinity(), |acc, commitment| acc * x_scalar.clone() + *commitment)
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
pub struct ShamirShare<P: ECPoint> {
	#[serde(bound = "")]
	pub value: P::Scalar,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct CoefficientCommitments<P: ECPoint>(#[serde(bound = "")] pub Vec<P>);

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ZkpSignature<P: ECPoint> {
	#[serde(bound = "")]
	pub r: P,
	#[serde(bound = "")]
	pub z: P::Scalar,
}

/// Coefficient commitments plus the proof of knowledge of the constant term,
/// as broadcast during round 3, before they have been checked against the
/// hash commitment from round 1.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct DkgUnverifiedCommitment<P: ECPoint> {
	#[serde(bound = "")]
	pub commitments: CoefficientCommitments<P>,
	#[serde(bound = "")]
	pub zkp: ZkpSignature<P>,
}

/// Coefficient commitments once they have been confirmed to match the round 1
/// hash commitment.
#[derive(Clone, Debug, PartialEq)]
pub struct DkgCommitment<P: ECPoint>(pub CoefficientCommitments<P>);

/// A party's proposed aggregate public key once every commitment has checked
/// out. Not yet known to be "compatible" — see [`KeygenResult::new_compatible`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ValidAggregateKey<P: ECPoint>(pub P);

/// Generate a random secret polynomial of degree `threshold`, the per-party
/// Shamir shares derived from it, and a Schnorr proof of knowledge of its
/// constant term (our share of the aggregate secret key).
pub fn generate_secret_and_shares<P: ECPoint>(
	rng: &mut Rng,
	own_id: PartyId,
	all_ids: &BTreeSet<PartyId>,
	threshold: u32,
	context: &HashContext,
) -> (CoefficientCommitments<P>, ZkpSignature<P>, BTreeMap<PartyId, ShamirShare<P>>) {
	let coefficients: Vec<P::Scalar> = (0..=threshold).map(|_| P::Scalar::random(rng)).collect();

	let commitments = CoefficientCommitments(coefficients.iter().map(P::from_scalar).collect());

	let zkp = generate_zkp_of_secret::<P>(rng, &coefficients[0], own_id, context);

	let shares = all_ids
		.iter()
		.map(|id| (*id, ShamirShare { value: evaluate_polynomial::<P>(&coefficients, *id) }))
		.collect();

	(commitments, zkp, shares)
}

/// Schnorr proof of knowledge of `secret`, domain-separated by the party's
/// own id and the ceremony context so it cannot be replayed by another party
/// or in another ceremony.
fn generate_zkp_of_secret<P: ECPoint>(
	rng: &mut Rng,
	secret: &P::Scalar,
	own_id: PartyId,
	context: &HashContext,
) -> ZkpSignature<P> {
	let r_scalar = P::Scalar::random(rng);
	let r = P::from_scalar(&r_scalar);

	let pubkey = P::from_scalar(secret);

	let challenge = generate_dkg_challenge::<P>(own_id, context, pubkey, r);

	let z = r_scalar + challenge * secret.clone();

	ZkpSignature { r, z }
}

fn generate_dkg_challenge<P: ECPoint>(
	signer_id: PartyId,
	context: &HashContext,
	pubkey: P,
	commitment: P,
) -> P::Scalar {
	let mut hasher = Sha256::new();
	hasher.update(context.0);
	hasher.update(signer_id.get().to_be_bytes());
	hasher.update(pubkey.as_bytes());
	hasher.update(commitment.as_bytes());
	P::Scalar::from_bytes_mod_order(&hasher.finalize().into())
}

pub fn is_valid_zkp<P: ECPoint>(
	challenge: P::Scalar,
	zkp: &ZkpSignature<P>,
	comm: &CoefficientCommitments<P>,
) -> bool {
	let Some(constant_commitment) = comm.0.first() else { return false };
	P::from_scalar(&zkp.z) == zkp.r + *constant_commitment * challenge
}

/// Check that a share we received evaluates to the point implied by the
/// sender's coefficient commitments (the Feldman VSS check).
pub fn verify_share<P: ECPoint>(
	share: &ShamirShare<P>,
	commitment: &DkgCommitment<P>,
	receiver_id: PartyId,
) -> bool {
	P::from_scalar(&share.value) == evaluate_polynomial_in_exponent(&commitment.0 .0, receiver_id)
}

/// SHA-256 commitment to the coefficient commitments and zkp, broadcast in
/// round 1 before the values themselves are revealed in round 3.
pub fn generate_hash_commitment<P: ECPoint>(unverified: &DkgUnverifiedCommitment<P>) -> [u8; 32] {
	let bytes = bincode::serialize(unverified).expect("commitment is always serializable");
	Sha256::digest(bytes).into()
}

pub fn is_valid_hash_commitment<P: ECPoint>(
	unverified: &DkgUnverifiedCommitment<P>,
	hash_commitment: &[u8; 32],
) -> bool {
	&generate_hash_commitment(unverified) == hash_commitment
}

/// Round 3/4 verification: the hash commitment matches, the zkp of the
/// constant term is valid, and the polynomial's degree is exactly `threshold`
/// (a higher degree would let the sender demand participation from parties
/// outside the claimed committee).
pub fn validate_commitment<P: ECPoint>(
	sender_id: PartyId,
	unverified: DkgUnverifiedCommitment<P>,
	hash_commitment: &[u8; 32],
	threshold: u32,
	context: &HashContext,
) -> Result<DkgCommitment<P>, &'static str> {
	if !is_valid_hash_commitment(&unverified, hash_commitment) {
		return Err("commitment does not match the hash broadcast earlier")
	}

	if unverified.commitments.0.len() != threshold as usize + 1 {
		return Err("coefficient commitment has the wrong degree")
	}

	let Some(constant_commitment) = unverified.commitments.0.first() else {
		return Err("coefficient commitment is empty")
	};

	let challenge =
		generate_dkg_challenge::<P>(sender_id, context, *constant_commitment, unverified.zkp.r);

	if !is_valid_zkp(challenge, &unverified.zkp, &unverified.commitments) {
		return Err("proof of knowledge of the secret coefficient is invalid")
	}

	Ok(DkgCommitment(unverified.commitments))
}

/// Sum of each party's secret share to us: our share of the aggregate secret key.
pub fn compute_secret_key_share<P: ECPoint>(shares: BTreeMap<PartyId, ShamirShare<P>>) -> P::Scalar {
	shares.into_values().map(|s| s.value).sum()
}

/// The aggregate public key: sum of every party's constant-term commitment.
pub fn derive_aggregate_key<P: ECPoint>(
	commitments: &BTreeMap<PartyId, DkgCommitment<P>>,
) -> ValidAggregateKey<P> {
	let sum = commitments
		.values()
		.map(|c| *c.0 .0.first().expect("commitment is never empty"))
		.fold(P::point_at_infinity(), |acc, p| acc + p);
	ValidAggregateKey(sum)
}

/// Each party's local public key share: the value implied by every sender's
/// polynomial at that party's index, summed across all senders.
pub fn derive_local_pubkeys_for_parties<P: ECPoint>(
	all_ids: &BTreeSet<PartyId>,
	commitments: &BTreeMap<PartyId, DkgCommitment<P>>,
) -> BTreeMap<PartyId, P> {
	all_ids
		.iter()
		.map(|&id| {
			let pubkey = commitments
				.values()
				.map(|c| evaluate_polynomial_in_exponent(&c.0 .0, id))
				.fold(P::point_at_infinity(), |acc, p| acc + p);
			(id, pubkey)
		})
		.collect()
}

pub fn finalize_keygen<C: CryptoScheme>(
	own_id: PartyId,
	all_ids: BTreeSet<PartyId>,
	params: ThresholdParameters,
	secret_share: <C::Point as ECPoint>::Scalar,
	commitments: &BTreeMap<PartyId, DkgCommitment<C::Point>>,
) -> KeygenResultInfo<C> {
	let agg_key = derive_aggregate_key(commitments);
	let party_public_keys = derive_local_pubkeys_for_parties(&all_ids, commitments);

	let key_share = KeyShare { y: agg_key.0, x_i: secret_share };

	let key = KeygenResult::new(key_share, party_public_keys);

	KeygenResultInfo { key: std::sync::Arc::new(key), own_id, all_ids, params }
}

#[cfg(feature = "test")]
pub mod genesis {
	use super::*;
	use crate::party::all_party_ids;

	/// Centralised key generation used by tests that need a valid
	/// [`KeygenResultInfo`] without running the distributed ceremony.
	pub fn generate_key_data<C: CryptoScheme>(
		all_ids: BTreeSet<PartyId>,
		rng: &mut Rng,
		threshold: u32,
	) -> (C::PublicKey, BTreeMap<PartyId, KeygenResultInfo<C>>) {
		let params = ThresholdParameters { share_count: all_ids.len() as u32, threshold };
		let context = HashContext([0u8; 32]);

		let mut commitments = BTreeMap::new();
		let mut all_shares = BTreeMap::new();

		for &id in &all_ids {
			let (comm, _zkp, shares) =
				generate_secret_and_shares::<C::Point>(rng, id, &all_ids, threshold, &context);
			commitments.insert(id, DkgCommitment(comm));
			all_shares.insert(id, shares);
		}

		let keys = all_ids
			.iter()
			.map(|&id| {
				let my_shares: BTreeMap<_, _> = all_shares
					.iter()
					.map(|(sender, shares)| (*sender, shares[&id].clone()))
					.collect();
				let secret_share = compute_secret_key_share::<C::Point>(my_shares);
				let info =
					finalize_keygen::<C>(id, all_ids.clone(), params, secret_share, &commitments);
				(id, info)
			})
			.collect::<BTreeMap<_, _>>();

		let pubkey =
			C::pubkey_from_point(&keys[all_ids.iter().next().unwrap()].key.get_agg_public_key_point());

		(pubkey, keys)
	}
}
