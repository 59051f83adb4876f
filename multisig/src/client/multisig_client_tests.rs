use std::collections::{BTreeSet, HashMap};

use futures::FutureExt;

use super::*;
use crate::{
	client::{
		self,
		common::SigningFailureReason,
		helpers::{new_nodes, DEFAULT_KEYGEN_CEREMONY_ID, DEFAULT_SIGNING_CEREMONY_ID, PARTY_IDS},
		CeremonyRequestDetails, KeygenResultInfo,
	},
	crypto::{schnorr::BridgeSchnorr, CryptoScheme},
	keystore::{KeyMetadata, KeyStoreAPI, KeyStoreError},
	KeyId,
};
use client::MultisigClient;

/// Bare in-memory store used only to exercise `MultisigClient` in these tests;
/// `keystore::FileKeyStore` and `keystore::RemoteKeyStore` are the real backends.
#[derive(Default)]
struct InMemoryKeyStore {
	keys: HashMap<KeyId, (KeygenResultInfo<BridgeSchnorr>, KeyMetadata)>,
}

impl KeyStoreAPI<BridgeSchnorr> for InMemoryKeyStore {
	fn put(
		&mut self,
		key_id: KeyId,
		share: KeygenResultInfo<BridgeSchnorr>,
		metadata: KeyMetadata,
	) -> Result<(), KeyStoreError> {
		if self.keys.contains_key(&key_id) {
			return Err(KeyStoreError::AlreadyExists)
		}
		self.keys.insert(key_id, (share, metadata));
		Ok(())
	}

	fn get(&self, key_id: &KeyId) -> Result<KeygenResultInfo<BridgeSchnorr>, KeyStoreError> {
		self.keys.get(key_id).map(|(share, _)| share.clone()).ok_or(KeyStoreError::KeyNotFound)
	}

	fn metadata(&self, key_id: &KeyId) -> Result<KeyMetadata, KeyStoreError> {
		self.keys.get(key_id).map(|(_, metadata)| metadata.clone()).ok_or(KeyStoreError::KeyNotFound)
	}

	fn list(&self) -> Vec<KeyId> {
		self.keys.keys().cloned().collect()
	}

	fn delete(&mut self, key_id: &KeyId) -> Result<(), KeyStoreError> {
		self.keys.remove(key_id).map(|_| ()).ok_or(KeyStoreError::KeyNotFound)
	}
}

#[tokio::test]
async fn should_ignore_rts_for_unknown_key() {
	let key_store = InMemoryKeyStore::default();

	let (ceremony_request_sender, mut ceremony_request_receiver) =
		tokio::sync::mpsc::unbounded_channel();

	let client = MultisigClient::new(PARTY_IDS[0], key_store, ceremony_request_sender);

	// Send a signing request for a key that was never generated
	let signing_request_fut = client.initiate_signing(
		DEFAULT_SIGNING_CEREMONY_ID,
		BTreeSet::from_iter(PARTY_IDS.iter().cloned()),
		KeyId::new([0u8; 33]),
		BridgeSchnorr::signing_payload_for_test(),
	);

	// Check that the signing request fails immediately with an "unknown key" error
	let (_, failure_reason) =
		signing_request_fut.now_or_never().expect("unknown key is rejected synchronously").unwrap_err();
	assert_eq!(failure_reason, SigningFailureReason::UnknownKey);

	let request = ceremony_request_receiver.recv().await.unwrap();
	assert_eq!(request.ceremony_id, DEFAULT_SIGNING_CEREMONY_ID);
	assert!(request.details.is_none());
}

#[tokio::test]
async fn should_save_key_after_keygen() {
	// Generate a key to use in this test
	let (public_key, keygen_result_info) = {
		let (public_key, mut key_data) =
			helpers::run_keygen(new_nodes(PARTY_IDS.clone()), DEFAULT_KEYGEN_CEREMONY_ID).await;
		(public_key, key_data.remove(&PARTY_IDS[0]).unwrap())
	};

	let key_store = InMemoryKeyStore::default();
	let (ceremony_request_sender, mut ceremony_request_receiver) =
		tokio::sync::mpsc::unbounded_channel();
	let client = MultisigClient::new(PARTY_IDS[0], key_store, ceremony_request_sender);

	// Send Keygen Request
	let keygen_request_fut = client.initiate_keygen(
		DEFAULT_KEYGEN_CEREMONY_ID,
		BTreeSet::from_iter(PARTY_IDS.iter().cloned()),
		3,
	);

	// Get the oneshot channel that is linked to the keygen request
	// and send a successful keygen result
	let request = ceremony_request_receiver.recv().await.unwrap();
	match request.details.unwrap() {
		CeremonyRequestDetails::Keygen(details) => {
			details.result_sender.send(Ok(keygen_result_info)).unwrap();
		},
		_ => {
			panic!("Unexpected ceremony request");
		},
	}

	// Complete the keygen request
	let returned_public_key = keygen_request_fut.await.unwrap();
	assert_eq!(KeyId::new(returned_public_key.clone()), KeyId::new(public_key));

	// The key must now be retrievable: a signing request for it is forwarded
	// to the ceremony manager instead of being rejected as unknown.
	let signing_request_fut = client.initiate_signing(
		DEFAULT_SIGNING_CEREMONY_ID,
		BTreeSet::from_iter(PARTY_IDS.iter().cloned()),
		KeyId::new(returned_public_key),
		BridgeSchnorr::signing_payload_for_test(),
	);
	assert!(signing_request_fut.now_or_never().is_none(), "should be awaiting the ceremony manager");
	let request = ceremony_request_receiver.recv().await.unwrap();
	assert!(matches!(request.details, Some(CeremonyRequestDetails::Sign(_))));
}
