//! Seam for a remote HSM/KMS-backed key store. The spec treats the remote
//! backend as a black box behind the same [`KeyStoreAPI`] contract as the
//! local file backend; this type documents the shape a real gRPC/REST client
//! would fill in, without shipping a specific vendor's wire protocol.

use std::collections::HashMap;

use async_trait::async_trait;

use super::{KeyMetadata, KeyStoreAPI, KeyStoreError};
use crate::{client::common::KeygenResultInfo, crypto::CryptoScheme, crypto::KeyId};

/// What a real implementation talks to: an HSM/KMS endpoint able to hold a
/// share and produce responses without ever handing back the raw scalar.
#[async_trait]
pub trait RemoteKeyStoreTransport: Send + Sync {
	async fn store(&self, key_id: &KeyId, payload: Vec<u8>) -> Result<(), KeyStoreError>;
	async fn fetch(&self, key_id: &KeyId) -> Result<Vec<u8>, KeyStoreError>;
	async fn remove(&self, key_id: &KeyId) -> Result<(), KeyStoreError>;
	async fn list_ids(&self) -> Result<Vec<KeyId>, KeyStoreError>;
}

/// A thin client over [`RemoteKeyStoreTransport`]. Requests are resolved
/// synchronously via `futures::executor::block_on` because [`KeyStoreAPI`]
/// is a sync trait the ceremony machinery calls from inside a non-async
/// stage; a production transport would instead run its own async runtime
/// handle and block on that.
pub struct RemoteKeyStore<C: CryptoScheme, T: RemoteKeyStoreTransport> {
	transport: T,
	// Local, never-persisted cache of key ids this process has seen, so
	// `list()` doesn't need a sync round trip on every call.
	known_ids: std::sync::Mutex<HashMap<KeyId, ()>>,
	_marker: std::marker::PhantomData<C>,
}

impl<C: CryptoScheme, T: RemoteKeyStoreTransport> RemoteKeyStore<C, T> {
	pub fn new(transport: T) -> Self {
		Self { transport, known_ids: std::sync::Mutex::new(HashMap::new()), _marker: Default::default() }
	}
}

impl<C: CryptoScheme + 'static, T: RemoteKeyStoreTransport> KeyStoreAPI<C> for RemoteKeyStore<C, T> {
	fn put(
		&mut self,
		key_id: KeyId,
		share: KeygenResultInfo<C>,
		metadata: KeyMetadata,
	) -> Result<(), KeyStoreError> {
		let payload =
			bincode::serialize(&(share, metadata)).map_err(|e| KeyStoreError::BackendUnavailable(e.to_string()))?;
		futures::executor::block_on(self.transport.store(&key_id, payload))?;
		self.known_ids.lock().unwrap().insert(key_id, ());
		Ok(())
	}

	fn get(&self, key_id: &KeyId) -> Result<KeygenResultInfo<C>, KeyStoreError> {
		let bytes = futures::executor::block_on(self.transport.fetch(key_id))?;
		let (share, _metadata): (KeygenResultInfo<C>, KeyMetadata) =
			bincode::deserialize(&bytes).map_err(|e| KeyStoreError::BackendUnavailable(e.to_string()))?;
		Ok(share)
	}

	fn metadata(&self, key_id: &KeyId) -> Result<KeyMetadata, KeyStoreError> {
		let bytes = futures::executor::block_on(self.transport.fetch(key_id))?;
		let (_share, metadata): (KeygenResultInfo<C>, KeyMetadata) =
			bincode::deserialize(&bytes).map_err(|e| KeyStoreError::BackendUnavailable(e.to_string()))?;
		Ok(metadata)
	}

	fn list(&self) -> Vec<KeyId> {
		futures::executor::block_on(self.transport.list_ids()).unwrap_or_default()
	}

	fn delete(&mut self, key_id: &KeyId) -> Result<(), KeyStoreError> {
		futures::executor::block_on(self.transport.remove(key_id))?;
		self.known_ids.lock().unwrap().remove(key_id);
		Ok(())
	}
}
