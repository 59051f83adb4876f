use super::{secp256k1::Scalar, CanonicalEncoding};
use crate::crypto::{secp256k1::Point, CryptoScheme, ECPoint};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Canonical 32-byte payload signed by a ceremony: the Keccak/Blake hash a
/// deployment computes over the event it wants attested, already reduced to
/// the wire format this node deals in.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq, Hash)]
pub struct SigningPayload(pub [u8; 32]);

impl std::fmt::Display for SigningPayload {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}", hex::encode(self.0))
	}
}

impl AsRef<[u8]> for SigningPayload {
	fn as_ref(&self) -> &[u8] {
		&self.0
	}
}

/// Schnorr signature over secp256k1: `(R, z)` such that `z*G = R - e*P`
/// where `e = H(P || R || payload)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
	pub z: [u8; 32],
	pub r: secp256k1::PublicKey,
}

/// Compressed public key plus the parity of its `y` coordinate, the
/// canonical representation this node stores and gossips.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicKey {
	pub x_bytes: [u8; 32],
	pub y_is_even: bool,
}

impl CanonicalEncoding for PublicKey {
	fn encode_key(&self) -> Vec<u8> {
		let mut out = Vec::with_capacity(33);
		out.push(if self.y_is_even { 0x02 } else { 0x03 });
		out.extend_from_slice(&self.x_bytes);
		out
	}
}

/// Schnorr threshold signing over secp256k1, following the commit-reveal
/// FROST construction (https://eprint.iacr.org/2020/852.pdf).
#[derive(Clone, Debug, PartialEq)]
pub struct BridgeSchnorr;

fn hash_challenge(pubkey: &Point, nonce_commitment: &Point, payload: &[u8]) -> [u8; 32] {
	let mut hasher = Sha256::new();
	hasher.update(pubkey.as_bytes());
	hasher.update(nonce_commitment.as_bytes());
	hasher.update(payload);
	hasher.finalize().into()
}

impl CryptoScheme for BridgeSchnorr {
	type Point = Point;
	type Signature = Signature;
	type PublicKey = PublicKey;
	type SigningPayload = SigningPayload;

	const NAME: &'static str = "secp256k1-schnorr";
	const ALGORITHM: crate::keystore::Algorithm = crate::keystore::Algorithm::Secp256k1Schnorr;

	fn build_signature(z: Scalar, group_commitment: Self::Point) -> Self::Signature {
		Signature { z: *z.as_bytes(), r: group_commitment.get_element() }
	}

	fn build_challenge(
		pubkey: Self::Point,
		nonce_commitment: Self::Point,
		payload: &Self::SigningPayload,
	) -> Scalar {
		Scalar::from_bytes_mod_order(&hash_challenge(&pubkey, &nonce_commitment, payload.as_ref()))
	}

	fn build_response(
		nonce: Scalar,
		_nonce_commitment: Self::Point,
		private_key: &Scalar,
		challenge: Scalar,
	) -> Scalar {
		nonce - challenge * private_key
	}

	fn is_party_response_valid(
		y_i: &Self::Point,
		lambda_i: &Scalar,
		commitment: &Self::Point,
		_group_commitment: &Self::Point,
		challenge: &Scalar,
		signature_response: &Scalar,
	) -> bool {
		Point::from_scalar(signature_response) == *commitment - (*y_i) * *challenge * lambda_i
	}

	fn verify_signature(
		signature: &Self::Signature,
		public_key: &Self::PublicKey,
		payload: &Self::SigningPayload,
	) -> anyhow::Result<()> {
		let pubkey_point = Point::from_compressed(public_key.y_is_even, &public_key.x_bytes)?;
		let r_point = Point::from_public_key(signature.r);
		let z = Scalar::from_bytes_mod_order(&signature.z);

		let e = Self::build_challenge(pubkey_point, r_point, payload);

		if Point::from_scalar(&z) == r_point - pubkey_point * e {
			Ok(())
		} else {
			Err(anyhow::anyhow!("schnorr signature does not verify against the given public key"))
		}
	}

	fn pubkey_from_point(pubkey_point: &Self::Point) -> Self::PublicKey {
		PublicKey { x_bytes: pubkey_point.x_bytes(), y_is_even: pubkey_point.is_even_y() }
	}

	fn payload_from_digest(digest: [u8; 32]) -> Self::SigningPayload {
		SigningPayload(digest)
	}

	#[cfg(feature = "test")]
	fn signing_payload_for_test() -> Self::SigningPayload {
		SigningPayload(*b"bridge-validator-test-payload-32")
	}
}
