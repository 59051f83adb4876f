//! The types and operations as discussed in <https://eprint.iacr.org/2020/852.pdf>.
//! Comments in this file reference sections from this document.
//! Note that unlike the protocol described in the document, we don't have a
//! centralised signature aggregator and don't have a preprocessing stage.
use std::collections::{BTreeMap, BTreeSet};

use sha2::{Digest, Sha256};
use zeroize::Zeroize;

use crate::{
	crypto::{CryptoScheme, ECPoint, ECScalar, KeyShare, Rng},
	party::PartyId,
};

use super::signing_data::SigningCommitment;

/// A pair of secret single-use nonces (and their
/// corresponding public commitments). Correspond to (d,e)
/// generated during the preprocessing stage in Section 5.3 (page 13)
#[derive(Debug, Zeroize)]
pub struct SecretNoncePair<P: ECPoint> {
	pub d: P::Scalar,
	pub d_pub: P,
	pub e: P::Scalar,
	pub e_pub: P,
}

impl<P: ECPoint> SecretNoncePair<P> {
	/// Generate a random pair of nonces (in a Box,
	/// to avoid them being copied on move)
	pub fn sample_random(rng: &mut Rng) -> Box<Self> {
		let d = P::Scalar::random(rng);
		let e = P::Scalar::random(rng);

		let d_pub = P::from_scalar(&d);
		let e_pub = P::from_scalar(&e);

		Box::new(SecretNoncePair { d, d_pub, e, e_pub })
	}
}

/// Generate a lagrange coefficient for party `signer_id`
/// according to Section 4 (page 9)
pub fn get_lagrange_coeff<P: ECPoint>(
	signer_id: PartyId,
	all_signer_ids: &BTreeSet<PartyId>,
) -> P::Scalar {
	let mut num = P::Scalar::from(1);
	let mut den = P::Scalar::from(1);

	for j in all_signer_ids {
		if *j == signer_id {
			continue
		}

		let j = P::Scalar::from(j.get());
		let signer_id = P::Scalar::from(signer_id.get());
		num = num * j.clone();
		den = den * (j - signer_id);
	}

	num * den
		.invert()
		.expect("should not be possible to get a zero scalar because all ids are unique")
}

/// Generate a "binding value" for party `id`. See "Signing Protocol" in Section 5.2 (page 14)
fn gen_rho_i<P: ECPoint>(
	id: PartyId,
	msg: &[u8],
	signing_commitments: &BTreeMap<PartyId, SigningCommitment<P>>,
	all_ids: &BTreeSet<PartyId>,
) -> P::Scalar {
	let mut hasher = Sha256::new();

	hasher.update(b"I");
	hasher.update(id.get().to_be_bytes());
	hasher.update(msg);

	// This needs to be processed in order!
	for id in all_ids {
		let com = &signing_commitments[id];
		hasher.update(id.get().to_be_bytes());
		hasher.update(com.d.as_bytes());
		hasher.update(com.e.as_bytes());
	}

	let x: [u8; 32] = hasher.finalize().into();

	let mut rho_i = P::Scalar::from_bytes_mod_order(&x);

	// The protocol requires rho_i != 0. Note that this slightly biases the hash,
	// which should be safe as this doesn't meaningfully impact collision resistance
	// (especially since parties have no or little control over the inputs)
	if rho_i == P::Scalar::zero() {
		rho_i = P::Scalar::from(1);
	}

	rho_i
}

type SigningResponse<P> = <P as ECPoint>::Scalar;

pub type NonceBinding<Crypto> = <<Crypto as CryptoScheme>::Point as ECPoint>::Scalar;
pub type SchnorrCommitment<Crypto> = <Crypto as CryptoScheme>::Point;

/// Generate binding values for each party given their previously broadcast commitments
pub fn generate_bindings<C: CryptoScheme>(
	payload: &C::SigningPayload,
	commitments: &BTreeMap<PartyId, SigningCommitment<C::Point>>,
	all_ids: &BTreeSet<PartyId>,
) -> BTreeMap<PartyId, NonceBinding<C>> {
	all_ids
		.iter()
		.map(|&id| (id, gen_rho_i::<C::Point>(id, payload.as_ref(), commitments, all_ids)))
		.collect()
}

/// Generate local signature/response (shard). See step 5 in Figure 3 (page 15).
pub fn generate_local_sig<C: CryptoScheme>(
	payload: &C::SigningPayload,
	key: &KeyShare<C::Point>,
	nonces: &SecretNoncePair<C::Point>,
	commitments: &BTreeMap<PartyId, SigningCommitment<C::Point>>,
	own_id: PartyId,
	all_ids: &BTreeSet<PartyId>,
) -> SigningResponse<C::Point> {
	let SecretNoncePair { d, e, .. } = nonces;

	let bindings = generate_bindings::<C>(payload, commitments, all_ids);

	let group_commitment = all_ids
		.iter()
		.map(|id| commitments[id].d + commitments[id].e * bindings[id].clone())
		.fold(<C::Point as ECPoint>::point_at_infinity(), |acc, p| acc + p);

	let lambda_i = get_lagrange_coeff::<C::Point>(own_id, all_ids);

	let rho_i = bindings[&own_id].clone();

	let nonce_share = rho_i * e + d.clone();

	let key_share = lambda_i * &key.x_i;

	generate_schnorr_response::<C>(&key_share, key.y, group_commitment, nonce_share, payload)
}

pub fn generate_schnorr_response<C: CryptoScheme>(
	private_key: &<C::Point as ECPoint>::Scalar,
	pubkey: C::Point,
	nonce_commitment: C::Point,
	nonce: <C::Point as ECPoint>::Scalar,
	payload: &C::SigningPayload,
) -> <C::Point as ECPoint>::Scalar {
	let challenge = C::build_challenge(pubkey, nonce_commitment, payload);

	C::build_response(nonce, nonce_commitment, private_key, challenge)
}

/// Combine local signatures received from all parties into the final
/// (aggregate) signature given that no party misbehaved. Otherwise
/// return the misbehaving parties.
pub fn aggregate_signature<C: CryptoScheme>(
	payload: &C::SigningPayload,
	signer_ids: &BTreeSet<PartyId>,
	agg_pubkey: C::Point,
	pubkeys: &BTreeMap<PartyId, C::Point>,
	commitments: &BTreeMap<PartyId, SigningCommitment<C::Point>>,
	responses: &BTreeMap<PartyId, SigningResponse<C::Point>>,
) -> Result<C::Signature, BTreeSet<PartyId>> {
	let bindings = generate_bindings::<C>(payload, commitments, signer_ids);

	let bound_commitments: BTreeMap<PartyId, C::Point> = signer_ids
		.iter()
		.map(|id| (*id, commitments[id].d + commitments[id].e * bindings[id].clone()))
		.collect();

	let group_commitment = bound_commitments
		.values()
		.fold(<C::Point as ECPoint>::point_at_infinity(), |acc, p| acc + *p);

	let lagrange_coefficients: BTreeMap<PartyId, <C::Point as ECPoint>::Scalar> =
		signer_ids.iter().map(|&id| (id, get_lagrange_coeff::<C::Point>(id, signer_ids))).collect();

	let challenge = C::build_challenge(agg_pubkey, group_commitment, payload);

	let invalid_ids: BTreeSet<PartyId> = signer_ids
		.iter()
		.copied()
		.filter(|signer_id| {
			let y_i = pubkeys[signer_id];

			let response = &responses[signer_id];

			!C::is_party_response_valid(
				&y_i,
				&lagrange_coefficients[signer_id],
				&bound_commitments[signer_id],
				&group_commitment,
				&challenge,
				response,
			)
		})
		.collect();

	if invalid_ids.is_empty() {
		// Response shares/shards are additive, so we simply need to
		// add them together (see step 7.c in Figure 3, page 15).
		let z: <C::Point as ECPoint>::Scalar = responses.values().cloned().sum();

		Ok(C::build_signature(z, group_commitment))
	} else {
		Err(invalid_ids)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::{
		crypto::{schnorr::BridgeSchnorr, secp256k1::Point},
		schnorr::SigningPayload,
	};
	use rand::SeedableRng;

	#[test]
	fn lagrange_coeff_with_one_party() {
		let id = PartyId::new(1).unwrap();
		let coeff = get_lagrange_coeff::<Point>(id, &BTreeSet::from([id]));
		assert_eq!(coeff, <Point as ECPoint>::Scalar::from(1));
	}

	#[test]
	fn bindings_are_deterministic_given_the_same_commitments() {
		let mut rng = Rng::from_seed([0; 32]);

		let payload = SigningPayload([7u8; 32]);
		let ids: BTreeSet<PartyId> =
			[1u32, 2, 3].into_iter().map(|i| PartyId::new(i).unwrap()).collect();
		let commitments: BTreeMap<PartyId, SigningCommitment<Point>> = ids
			.iter()
			.map(|&id| {
				(
					id,
					SigningCommitment {
						d: Point::from_scalar(&<Point as ECPoint>::Scalar::random(&mut rng)),
						e: Point::from_scalar(&<Point as ECPoint>::Scalar::random(&mut rng)),
					},
				)
			})
			.collect();

		let bindings_a = generate_bindings::<BridgeSchnorr>(&payload, &commitments, &ids);
		let bindings_b = generate_bindings::<BridgeSchnorr>(&payload, &commitments, &ids);

		assert_eq!(bindings_a, bindings_b);
	}
}
