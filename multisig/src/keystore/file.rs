//! Encrypted-at-rest key store backend. Marked "development only": production
//! deployments should select [`super::RemoteKeyStore`] instead.
//!
//! Layout on disk, one file per key id: `salt(32) || iv(16) || tag(16) || ciphertext`.
//! The share is serialized with `bincode`, then encrypted with AES-256-GCM keyed
//! by PBKDF2-HMAC-SHA256 over the supplied password (>=100k iterations, 32-byte
//! salt, per spec section 4.A).

use std::{
	collections::HashMap,
	fs, io,
	path::{Path, PathBuf},
};

use aes_gcm::{
	aead::{generic_array::GenericArray, Aead, KeyInit, OsRng as AeadOsRng},
	Aes256Gcm, Nonce,
};
use pbkdf2::pbkdf2_hmac;
use rand::RngCore;
use sha2::Sha256;
use zeroize::Zeroizing;

use super::{Algorithm, KeyMetadata, KeyStoreAPI, KeyStoreError};
use crate::{client::common::KeygenResultInfo, crypto::CryptoScheme, crypto::KeyId};

const SALT_LEN: usize = 32;
const IV_LEN: usize = 16;
const TAG_LEN: usize = 16;
const PBKDF2_ITERATIONS: u32 = 100_000;

fn key_id_to_filename(key_id: &KeyId) -> String {
	hex::encode(key_id.as_bytes())
}

fn derive_aes_key(password: &[u8], salt: &[u8; SALT_LEN]) -> Zeroizing<[u8; 32]> {
	let mut key = Zeroizing::new([0u8; 32]);
	pbkdf2_hmac::<Sha256>(password, salt, PBKDF2_ITERATIONS, &mut *key);
	key
}

/// Encrypted local-file key store. Holds everything in a single directory,
/// one ciphertext file per key id, and keeps a decrypted in-memory cache for
/// the lifetime of the process so ceremonies don't pay the KDF cost per sign.
pub struct FileKeyStore<C: CryptoScheme> {
	dir: PathBuf,
	password: Zeroizing<Vec<u8>>,
	cache: HashMap<KeyId, (KeygenResultInfo<C>, KeyMetadata)>,
}

impl<C: CryptoScheme> FileKeyStore<C> {
	pub fn open(dir: impl AsRef<Path>, password: impl Into<Vec<u8>>) -> io::Result<Self> {
		let dir = dir.as_ref().to_path_buf();
		fs::create_dir_all(&dir)?;
		tracing::warn!(
			path = %dir.display(),
			"using the encrypted file key store backend; this is development only, \
			 production deployments should use a remote HSM/KMS backend",
		);
		let mut store = FileKeyStore { dir, password: Zeroizing::new(password.into()), cache: HashMap::new() };
		store.load_all()?;
		Ok(store)
	}

	fn path_for(&self, key_id: &KeyId) -> PathBuf {
		self.dir.join(key_id_to_filename(key_id))
	}

	fn load_all(&mut self) -> io::Result<()> {
		for entry in fs::read_dir(&self.dir)? {
			let entry = entry?;
			if !entry.file_type()?.is_file() {
				continue
			}
			let Ok(key_id_bytes) = hex::decode(entry.file_name().to_string_lossy().as_ref()) else {
				continue
			};
			let key_id = KeyId::new(key_id_bytes);
			if let Ok((share, metadata)) = self.decrypt_file(&key_id) {
				self.cache.insert(key_id, (share, metadata));
			}
		}
		Ok(())
	}

	fn decrypt_file(&self, key_id: &KeyId) -> Result<(KeygenResultInfo<C>, KeyMetadata), KeyStoreError> {
		let bytes = fs::read(self.path_for(key_id))
			.map_err(|e| KeyStoreError::BackendUnavailable(e.to_string()))?;
		if bytes.len() < SALT_LEN + IV_LEN + TAG_LEN {
			return Err(KeyStoreError::BackendUnavailable("truncated key file".into()))
		}
		let (salt, rest) = bytes.split_at(SALT_LEN);
		let (iv, rest) = rest.split_at(IV_LEN);
		let (tag, ciphertext) = rest.split_at(TAG_LEN);

		let salt: [u8; SALT_LEN] = salt.try_into().unwrap();
		let aes_key = derive_aes_key(&self.password, &salt);
		let cipher = Aes256Gcm::new(GenericArray::from_slice(&*aes_key));
		let nonce = Nonce::from_slice(iv);

		// The `aes-gcm` crate's combined format is ciphertext||tag; the
		// on-disk layout puts the tag first (spec section 4.A), so rebuild
		// the combined buffer before handing it to the AEAD.
		let mut ciphertext_and_tag = Vec::with_capacity(ciphertext.len() + TAG_LEN);
		ciphertext_and_tag.extend_from_slice(ciphertext);
		ciphertext_and_tag.extend_from_slice(tag);

		let plaintext = cipher
			.decrypt(nonce, ciphertext_and_tag.as_slice())
			.map_err(|_| KeyStoreError::BackendUnavailable("decryption failed".into()))?;

		bincode::deserialize(&plaintext)
			.map_err(|e| KeyStoreError::BackendUnavailable(format!("corrupt key record: {e}")))
	}

	fn encrypt_and_write(
		&self,
		key_id: &KeyId,
		share: &KeygenResultInfo<C>,
		metadata: &KeyMetadata,
	) -> Result<(), KeyStoreError> {
		let plaintext = bincode::serialize(&(share, metadata))
			.map_err(|e| KeyStoreError::BackendUnavailable(e.to_string()))?;

		let mut salt = [0u8; SALT_LEN];
		rand::thread_rng().fill_bytes(&mut salt);
		let mut iv = [0u8; IV_LEN];
		rand::thread_rng().fill_bytes(&mut iv);

		let aes_key = derive_aes_key(&self.password, &salt);
		let cipher = Aes256Gcm::new(GenericArray::from_slice(&*aes_key));
		let nonce = Nonce::from_slice(&iv);

		let ciphertext_and_tag = cipher
			.encrypt(nonce, plaintext.as_ref())
			.map_err(|_| KeyStoreError::BackendUnavailable("encryption failed".into()))?;

		// `aes-gcm` appends the 16-byte tag after the ciphertext; reorder to
		// the spec's mandated `salt || iv || tag || ciphertext` layout.
		let split_at = ciphertext_and_tag.len() - TAG_LEN;
		let (ciphertext, tag) = ciphertext_and_tag.split_at(split_at);

		let mut out = Vec::with_capacity(SALT_LEN + IV_LEN + TAG_LEN + ciphertext.len());
		out.extend_from_slice(&salt);
		out.extend_from_slice(&iv);
		out.extend_from_slice(tag);
		out.extend_from_slice(ciphertext);

		fs::write(self.path_for(key_id), out).map_err(|e| KeyStoreError::BackendUnavailable(e.to_string()))
	}
}

impl<C: CryptoScheme> KeyStoreAPI<C> for FileKeyStore<C> {
	fn put(
		&mut self,
		key_id: KeyId,
		share: KeygenResultInfo<C>,
		metadata: KeyMetadata,
	) -> Result<(), KeyStoreError> {
		if self.cache.contains_key(&key_id) {
			return Err(KeyStoreError::AlreadyExists)
		}
		self.encrypt_and_write(&key_id, &share, &metadata)?;
		self.cache.insert(key_id, (share, metadata));
		Ok(())
	}

	fn get(&self, key_id: &KeyId) -> Result<KeygenResultInfo<C>, KeyStoreError> {
		self.cache.get(key_id).map(|(share, _)| share.clone()).ok_or(KeyStoreError::KeyNotFound)
	}

	fn metadata(&self, key_id: &KeyId) -> Result<KeyMetadata, KeyStoreError> {
		self.cache.get(key_id).map(|(_, metadata)| metadata.clone()).ok_or(KeyStoreError::KeyNotFound)
	}

	fn list(&self) -> Vec<KeyId> {
		self.cache.keys().cloned().collect()
	}

	fn delete(&mut self, key_id: &KeyId) -> Result<(), KeyStoreError> {
		if self.cache.remove(key_id).is_none() {
			return Err(KeyStoreError::KeyNotFound)
		}
		let _ = fs::remove_file(self.path_for(key_id));
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::{
		client::common::{KeygenResult, KeygenResultInfo},
		crypto::{schnorr::BridgeSchnorr, secp256k1::Point, ECPoint, KeyShare},
		party::{all_party_ids, PartyId, ThresholdParameters},
	};
	use std::collections::BTreeMap;

	fn sample_share() -> KeygenResultInfo<BridgeSchnorr> {
		let y = Point::from_scalar(&crate::crypto::secp256k1::Scalar::from(7u32));
		let key_share = KeyShare { y, x_i: crate::crypto::secp256k1::Scalar::from(3u32) };
		let party_public_keys: BTreeMap<PartyId, Point> =
			all_party_ids(3).into_iter().map(|id| (id, y)).collect();
		KeygenResultInfo {
			key: std::sync::Arc::new(KeygenResult::new(key_share, party_public_keys)),
			own_id: PartyId::new(1).unwrap(),
			all_ids: all_party_ids(3),
			params: ThresholdParameters::new(3, 1),
		}
	}

	#[test]
	fn put_then_reopen_recovers_identical_share() {
		let dir = tempfile::tempdir().unwrap();
		let key_id = KeyId::new([0xABu8; 33]);
		let metadata = KeyMetadata {
			algorithm: Algorithm::Secp256k1Schnorr,
			created_at: chrono::Utc::now(),
			permitted_usages: vec!["sign".into()],
		};

		{
			let mut store: FileKeyStore<BridgeSchnorr> =
				FileKeyStore::open(dir.path(), "correct horse battery staple").unwrap();
			store.put(key_id.clone(), sample_share(), metadata).unwrap();
		}

		let reopened: FileKeyStore<BridgeSchnorr> =
			FileKeyStore::open(dir.path(), "correct horse battery staple").unwrap();
		let recovered = reopened.get(&key_id).unwrap();
		assert_eq!(recovered, sample_share());
	}

	#[test]
	fn wrong_password_fails_to_decrypt() {
		let dir = tempfile::tempdir().unwrap();
		let key_id = KeyId::new([0xCDu8; 33]);
		let metadata = KeyMetadata {
			algorithm: Algorithm::Secp256k1Schnorr,
			created_at: chrono::Utc::now(),
			permitted_usages: vec![],
		};
		{
			let mut store: FileKeyStore<BridgeSchnorr> = FileKeyStore::open(dir.path(), "hunter2").unwrap();
			store.put(key_id.clone(), sample_share(), metadata).unwrap();
		}

		let reopened: FileKeyStore<BridgeSchnorr> = FileKeyStore::open(dir.path(), "wrong password").unwrap();
		assert!(reopened.get(&key_id).is_err());
	}

	#[test]
	fn put_twice_is_rejected() {
		let dir = tempfile::tempdir().unwrap();
		let key_id = KeyId::new([0xEFu8; 33]);
		let metadata = KeyMetadata {
			algorithm: Algorithm::Secp256k1Schnorr,
			created_at: chrono::Utc::now(),
			permitted_usages: vec![],
		};
		let mut store: FileKeyStore<BridgeSchnorr> = FileKeyStore::open(dir.path(), "pw").unwrap();
		store.put(key_id.clone(), sample_share(), metadata.clone()).unwrap();
		assert!(matches!(store.put(key_id, sample_share(), metadata), Err(KeyStoreError::AlreadyExists)));
	}

	#[test]
	fn delete_then_get_not_found() {
		let dir = tempfile::tempdir().unwrap();
		let key_id = KeyId::new([0x11u8; 33]);
		let metadata = KeyMetadata {
			algorithm: Algorithm::Secp256k1Schnorr,
			created_at: chrono::Utc::now(),
			permitted_usages: vec![],
		};
		let mut store: FileKeyStore<BridgeSchnorr> = FileKeyStore::open(dir.path(), "pw").unwrap();
		store.put(key_id.clone(), sample_share(), metadata).unwrap();
		store.delete(&key_id).unwrap();
		assert!(matches!(store.get(&key_id), Err(KeyStoreError::KeyNotFound)));
	}
}
