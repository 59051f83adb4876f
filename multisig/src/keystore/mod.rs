mod file;
mod remote;

pub use file::FileKeyStore;
pub use remote::RemoteKeyStore;

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
	client::common::KeygenResultInfo,
	client::signing::{signing_detail, SigningCommitment},
	crypto::{CryptoScheme, ECPoint, KeyId},
	party::PartyId,
};

/// Algorithm a key is permitted to be used with. Checked on every `sign`
/// call so a key generated for one scheme can't accidentally be used to
/// produce a signature for another.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Algorithm {
	Secp256k1Schnorr,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyMetadata {
	pub algorithm: Algorithm,
	pub created_at: DateTime<Utc>,
	pub permitted_usages: Vec<String>,
}

#[derive(Error, Debug)]
pub enum KeyStoreError {
	#[error("key not found")]
	KeyNotFound,
	#[error("key already exists, refusing to overwrite")]
	AlreadyExists,
	#[error("key was generated for a different algorithm")]
	AlgoMismatch,
	#[error("key store backend unavailable: {0}")]
	BackendUnavailable(String),
}

/// Storage and sign-oracle contract for this party's long-term key share
/// (spec section 4.A). Concrete backends (an encrypted local file, or a
/// remote HSM/KMS) implement this trait; ceremony code and the supervisor
/// only ever see the trait object.
///
/// `sign` does not run the multi-party nonce protocol itself (that is an
/// inner two-round exchange the signing coordinator drives over the
/// transport bus, see `client::signing`); it takes the already-agreed
/// nonce pair and commitments for the ceremony and returns this party's
/// response share, computed without the secret scalar ever leaving this
/// trait's implementor.
pub trait KeyStoreAPI<C: CryptoScheme>: Send + Sync {
	fn put(
		&mut self,
		key_id: KeyId,
		share: KeygenResultInfo<C>,
		metadata: KeyMetadata,
	) -> Result<(), KeyStoreError>;

	fn get(&self, key_id: &KeyId) -> Result<KeygenResultInfo<C>, KeyStoreError>;

	/// Metadata stored alongside `key_id`'s share, notably the algorithm tag
	/// `sign` checks against `C::ALGORITHM`.
	fn metadata(&self, key_id: &KeyId) -> Result<KeyMetadata, KeyStoreError>;

	#[allow(clippy::too_many_arguments)]
	fn sign(
		&self,
		key_id: &KeyId,
		payload: &C::SigningPayload,
		own_id: PartyId,
		all_ids: &BTreeSet<PartyId>,
		nonces: &signing_detail::SecretNoncePair<C::Point>,
		commitments: &std::collections::BTreeMap<PartyId, SigningCommitment<C::Point>>,
	) -> Result<<C::Point as ECPoint>::Scalar, KeyStoreError> {
		if self.metadata(key_id)?.algorithm != C::ALGORITHM {
			return Err(KeyStoreError::AlgoMismatch)
		}

		let share = self.get(key_id)?;
		if !share.all_ids.contains(&own_id) {
			return Err(KeyStoreError::KeyNotFound)
		}
		Ok(signing_detail::generate_local_sig::<C>(
			payload,
			&share.key.key_share,
			nonces,
			commitments,
			own_id,
			all_ids,
		))
	}

	fn public_key(&self, key_id: &KeyId) -> Result<C::Point, KeyStoreError> {
		Ok(self.get(key_id)?.key.get_agg_public_key_point())
	}

	fn list(&self) -> Vec<KeyId>;

	fn delete(&mut self, key_id: &KeyId) -> Result<(), KeyStoreError>;
}

/// Type-erased handle onto a [`KeyStoreAPI`] that can produce this party's
/// signing response share for an in-progress ceremony without exposing the
/// raw key share to ceremony code (spec §4.A/§4.E: the coordinator asks the
/// key store to produce `sigma_i`, not the other way around). Implemented
/// generically for any locked key store so `client::MultisigClient` can hand
/// a ceremony an `Arc<dyn SigningOracle<C>>` instead of the concrete store
/// type.
pub trait SigningOracle<C: CryptoScheme>: Send + Sync {
	#[allow(clippy::too_many_arguments)]
	fn sign(
		&self,
		key_id: &KeyId,
		payload: &C::SigningPayload,
		own_id: PartyId,
		all_ids: &BTreeSet<PartyId>,
		nonces: &signing_detail::SecretNoncePair<C::Point>,
		commitments: &std::collections::BTreeMap<PartyId, SigningCommitment<C::Point>>,
	) -> Result<<C::Point as ECPoint>::Scalar, KeyStoreError>;
}

impl<C: CryptoScheme, S: KeyStoreAPI<C>> SigningOracle<C> for std::sync::Mutex<S> {
	fn sign(
		&self,
		key_id: &KeyId,
		payload: &C::SigningPayload,
		own_id: PartyId,
		all_ids: &BTreeSet<PartyId>,
		nonces: &signing_detail::SecretNoncePair<C::Point>,
		commitments: &std::collections::BTreeMap<PartyId, SigningCommitment<C::Point>>,
	) -> Result<<C::Point as ECPoint>::Scalar, KeyStoreError> {
		KeyStoreAPI::sign(&*self.lock().unwrap(), key_id, payload, own_id, all_ids, nonces, commitments)
	}
}

/// A [`SigningOracle`] that signs directly off an already-resolved key share,
/// bypassing any backing [`KeyStoreAPI`]/metadata lookup. Ceremony test
/// helpers hold a bare `KeygenResultInfo<C>` (no store to register it in);
/// this adapter lets them exercise the same oracle seam production code goes
/// through instead of poking `signing_detail::generate_local_sig` directly.
pub struct DirectKeyShareOracle<C: CryptoScheme> {
	key: std::sync::Arc<crate::client::common::KeygenResult<C>>,
}

impl<C: CryptoScheme> DirectKeyShareOracle<C> {
	pub fn new(key: std::sync::Arc<crate::client::common::KeygenResult<C>>) -> Self {
		Self { key }
	}
}

impl<C: CryptoScheme> SigningOracle<C> for DirectKeyShareOracle<C> {
	fn sign(
		&self,
		_key_id: &KeyId,
		payload: &C::SigningPayload,
		own_id: PartyId,
		all_ids: &BTreeSet<PartyId>,
		nonces: &signing_detail::SecretNoncePair<C::Point>,
		commitments: &std::collections::BTreeMap<PartyId, SigningCommitment<C::Point>>,
	) -> Result<<C::Point as ECPoint>::Scalar, KeyStoreError> {
		Ok(signing_detail::generate_local_sig::<C>(
			payload,
			&self.key.key_share,
			nonces,
			commitments,
			own_id,
			all_ids,
		))
	}
}
