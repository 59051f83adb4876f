#[macro_use]
mod helpers;
mod key_id;
pub mod schnorr;
pub mod secp256k1;

pub use key_id::{CanonicalEncoding, KeyId};

use generic_array::{typenum::Unsigned, ArrayLength, GenericArray};
use serde::{Deserialize, Serialize};
use std::fmt::{Debug, Display};
use zeroize::{DefaultIsZeroes, ZeroizeOnDrop};

/// Upper bound on the size of a point and scalar in bytes, useful for
/// estimating the size of serialized ceremony data.
pub const MAX_POINT_SIZE: usize = 33;
pub const MAX_SCALAR_SIZE: usize = 32;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct KeyShare<P: ECPoint> {
	#[serde(bound = "")]
	pub y: P,
	#[serde(bound = "")]
	pub x_i: P::Scalar,
}

// Ideally we'd use a concrete implementation (e.g. ChaCha20) rather than StdRng
// so it can't silently change from under us.
pub type Rng = rand::rngs::StdRng;

pub trait ECPoint:
	Clone
	+ Copy
	+ Debug
	+ Default
	+ DefaultIsZeroes
	+ 'static
	+ serde::Serialize
	+ for<'de> serde::Deserialize<'de>
	+ std::ops::Mul<Self::Scalar, Output = Self>
	+ for<'a> std::ops::Mul<&'a Self::Scalar, Output = Self>
	+ std::ops::Sub<Output = Self>
	+ std::ops::Add<Output = Self>
	+ std::iter::Sum
	+ PartialEq
	+ Ord
	+ Sync
	+ Send
{
	type Scalar: ECScalar;

	type CompressedPointLength: ArrayLength + Unsigned;

	fn from_scalar(scalar: &Self::Scalar) -> Self;

	fn as_bytes(&self) -> GenericArray<u8, Self::CompressedPointLength>;

	fn point_at_infinity() -> Self;

	fn is_point_at_infinity(&self) -> bool {
		self == &Self::point_at_infinity()
	}
}

pub trait ECScalar:
	Clone
	+ Debug
	+ Sized
	+ Default
	+ serde::Serialize
	+ for<'de> serde::Deserialize<'de>
	+ for<'a> std::ops::Mul<&'a Self, Output = Self>
	+ for<'a> std::ops::Add<&'a Self, Output = Self>
	+ std::ops::Mul<Output = Self>
	+ std::ops::Add<Output = Self>
	+ std::ops::Sub<Output = Self>
	+ std::iter::Sum
	+ zeroize::Zeroize
	+ PartialEq
	+ Ord
	+ Sync
	+ Send
	+ ZeroizeOnDrop
	+ std::convert::From<u32>
{
	fn random(rng: &mut Rng) -> Self;

	fn from_bytes_mod_order(x: &[u8; 32]) -> Self;

	fn zero() -> Self;

	fn invert(&self) -> Option<Self>;
}

/// Threshold Schnorr/ECDSA crypto backend used by the DKG and signing
/// ceremonies. This node only ships a secp256k1 Schnorr scheme
/// ([`schnorr::BridgeSchnorr`]); the trait is kept generic so another curve
/// or scheme could be slotted in without touching the ceremony state
/// machines (see the Open Questions entry in DESIGN.md).
pub trait CryptoScheme: 'static + Clone + Send + Sync + Debug + PartialEq {
	type Point: ECPoint;

	type Signature: Debug + Clone + PartialEq + Sync + Send;

	type PublicKey: CanonicalEncoding + Debug + Clone + Sync + Send;

	type SigningPayload: Display + Debug + Sync + Send + Clone + PartialEq + Eq + AsRef<[u8]>;

	/// Friendly name of the scheme, used for logging.
	const NAME: &'static str;

	/// The key store algorithm tag this scheme's shares are stored under
	/// (see [`crate::keystore::KeyMetadata`]); `KeyStoreAPI::sign` refuses a
	/// key whose stored tag doesn't match.
	const ALGORITHM: crate::keystore::Algorithm;

	fn build_signature(
		z: <Self::Point as ECPoint>::Scalar,
		group_commitment: Self::Point,
	) -> Self::Signature;

	fn build_challenge(
		pubkey: Self::Point,
		nonce_commitment: Self::Point,
		payload: &Self::SigningPayload,
	) -> <Self::Point as ECPoint>::Scalar;

	/// Build a challenge response using our key share.
	fn build_response(
		nonce: <Self::Point as ECPoint>::Scalar,
		nonce_commitment: Self::Point,
		private_key: &<Self::Point as ECPoint>::Scalar,
		challenge: <Self::Point as ECPoint>::Scalar,
	) -> <Self::Point as ECPoint>::Scalar;

	/// Check that a party's challenge response is valid w.r.t their public key share
	/// (see step 7.b in Figure 3, page 15 of https://eprint.iacr.org/2020/852.pdf).
	fn is_party_response_valid(
		y_i: &Self::Point,
		lambda_i: &<Self::Point as ECPoint>::Scalar,
		commitment: &Self::Point,
		group_commitment: &Self::Point,
		challenge: &<Self::Point as ECPoint>::Scalar,
		signature_response: &<Self::Point as ECPoint>::Scalar,
	) -> bool;

	fn verify_signature(
		signature: &Self::Signature,
		public_key: &Self::PublicKey,
		payload: &Self::SigningPayload,
	) -> anyhow::Result<()>;

	fn pubkey_from_point(pubkey_point: &Self::Point) -> Self::PublicKey;

	/// Builds this scheme's signing payload from the 32-byte canonical
	/// message digest a caller outside the ceremony engine (the signing
	/// coordinator) has already computed. Kept as an explicit conversion
	/// rather than a `From`/`TryFrom` bound so schemes whose payload is not
	/// a bare digest (e.g. one carrying auxiliary domain data) can still
	/// implement `CryptoScheme`.
	fn payload_from_digest(digest: [u8; 32]) -> Self::SigningPayload;

	#[cfg(feature = "test")]
	fn signing_payload_for_test() -> Self::SigningPayload;

	#[cfg(feature = "test")]
	fn signature_for_test() -> Self::Signature {
		use rand::{rngs::StdRng, SeedableRng};
		let scalar = <Self::Point as ECPoint>::Scalar::random(&mut StdRng::from_seed([0_u8; 32]));
		let point = <Self::Point as ECPoint>::from_scalar(&scalar);
		Self::build_signature(scalar, point)
	}
}

#[cfg(test)]
pub fn generate_single_party_signature<C: CryptoScheme>(
	secret_key: &<C::Point as ECPoint>::Scalar,
	payload: &C::SigningPayload,
	rng: &mut Rng,
) -> C::Signature {
	use crate::client::signing::generate_schnorr_response;

	let public_key = C::Point::from_scalar(secret_key);

	let nonce = <C::Point as ECPoint>::Scalar::random(rng);

	let r = C::Point::from_scalar(&nonce);

	let sigma = generate_schnorr_response::<C>(secret_key, public_key, r, nonce, payload);

	C::build_signature(sigma, r)
}
