//! Shared fixtures for the cross-component integration tests. Lives under a
//! `support/` subdirectory (not `support.rs`) so cargo doesn't also try to
//! run it as its own, empty test binary.

use multisig::{
	client::signing::generate_schnorr_response, CryptoScheme, ECPoint, ECScalar, Rng,
};
use rand::SeedableRng;

/// Builds a fresh keypair and a single-party Schnorr signature over `payload`
/// using only the crypto scheme's public surface, the same construction the
/// real multi-party ceremony collapses to when there is exactly one signer.
/// Used to hand a `MockMultisigClientApi` a signature the coordinator's own
/// `verify_signature` re-check will actually accept.
pub fn single_party_signature<C: CryptoScheme>(
	payload: &C::SigningPayload,
	seed: [u8; 32],
) -> (C::Signature, C::PublicKey) {
	let mut rng = Rng::from_seed(seed);

	let secret = <C::Point as ECPoint>::Scalar::random(&mut rng);
	let nonce = <C::Point as ECPoint>::Scalar::random(&mut rng);

	let pubkey_point = C::Point::from_scalar(&secret);
	let nonce_commitment = C::Point::from_scalar(&nonce);

	let response =
		generate_schnorr_response::<C>(&secret, pubkey_point, nonce_commitment, nonce, payload);
	let signature = C::build_signature(response, nonce_commitment);
	let public_key = C::pubkey_from_point(&pubkey_point);

	(signature, public_key)
}
