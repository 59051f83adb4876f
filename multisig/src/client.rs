#[macro_use]
mod macros;
mod ceremony_runner;
pub(crate) mod common;
pub mod keygen;
pub mod signing;

#[cfg(test)]
mod helpers;

#[cfg(test)]
mod multisig_client_tests;

pub mod ceremony_manager;

use std::collections::BTreeSet;

use futures::{future::BoxFuture, FutureExt};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, info_span, Instrument};

use keygen::KeygenData;

pub use common::{
	CeremonyFailureReason, KeygenFailureReason, KeygenResult, KeygenResultInfo, KeygenStageName,
	SigningFailureReason, SigningStageName,
};

#[cfg(test)]
pub use signing::{gen_signing_data_stage1, gen_signing_data_stage4};

#[cfg(test)]
pub use keygen::{gen_keygen_data_hash_comm1, gen_keygen_data_verify_hash_comm2};

#[cfg(feature = "test")]
pub use keygen::generate_key_data;

#[cfg(feature = "test")]
use mockall::automock;

use self::{
	ceremony_manager::{CeremonyResultSender, KeygenCeremony, SigningCeremony},
	signing::SigningData,
};

use super::{
	crypto::{CryptoScheme, ECPoint, KeyId},
	keystore::{KeyMetadata, KeyStoreAPI, KeyStoreError},
	party::{CeremonyId, PartyId},
	Rng,
};

#[derive(Serialize, Deserialize, Debug, Clone)]
pub enum MultisigData<P: ECPoint> {
	#[serde(bound = "")]
	Keygen(KeygenData<P>),
	#[serde(bound = "")]
	Signing(SigningData<P>),
}

derive_try_from_variant!(impl<P: ECPoint> for KeygenData<P>, MultisigData::Keygen, MultisigData<P>);
derive_try_from_variant!(impl<P: ECPoint> for SigningData<P>, MultisigData::Signing, MultisigData<P>);

impl<P: ECPoint> From<SigningData<P>> for MultisigData<P> {
	fn from(data: SigningData<P>) -> Self {
		MultisigData::Signing(data)
	}
}

impl<P: ECPoint> From<KeygenData<P>> for MultisigData<P> {
	fn from(data: KeygenData<P>) -> Self {
		MultisigData::Keygen(data)
	}
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct MultisigMessage<P: ECPoint> {
	ceremony_id: CeremonyId,
	#[serde(bound = "")]
	data: MultisigData<P>,
}

/// The public interface to the multi-signature code. The initiate functions
/// send a ceremony request and return a future that can be awaited for the
/// result. Splitting requesting and waiting for completion lets requests be
/// sent synchronously, which matters since the chain event monitor expects
/// them ordered by ceremony id.
#[cfg_attr(feature = "test", automock)]
pub trait MultisigClientApi<C: CryptoScheme> {
	fn initiate_keygen(
		&self,
		ceremony_id: CeremonyId,
		participants: BTreeSet<PartyId>,
		threshold: u32,
	) -> BoxFuture<'_, Result<C::PublicKey, (BTreeSet<PartyId>, KeygenFailureReason)>>;

	fn initiate_signing(
		&self,
		ceremony_id: CeremonyId,
		signers: BTreeSet<PartyId>,
		key_id: KeyId,
		payload: C::SigningPayload,
	) -> BoxFuture<'_, Result<C::Signature, (BTreeSet<PartyId>, SigningFailureReason)>>;

	fn update_latest_ceremony_id(&self, ceremony_id: CeremonyId);
}

/// The ceremony details are optional to allow updating the ceremony id
/// tracking when we are not participating in the ceremony.
pub struct CeremonyRequest<C: CryptoScheme> {
	pub ceremony_id: CeremonyId,
	pub details: Option<CeremonyRequestDetails<C>>,
}

impl<C: CryptoScheme> std::fmt::Debug for CeremonyRequest<C> {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("CeremonyRequest")
			.field("ceremony_id", &self.ceremony_id)
			.field("details", &self.details)
			.finish()
	}
}

pub enum CeremonyRequestDetails<C>
where
	C: CryptoScheme,
{
	Keygen(KeygenRequestDetails<C>),
	Sign(SigningRequestDetails<C>),
}

impl<C: CryptoScheme> std::fmt::Debug for CeremonyRequestDetails<C> {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			CeremonyRequestDetails::Keygen(details) => f.debug_tuple("Keygen").field(details).finish(),
			CeremonyRequestDetails::Sign(details) => {
				f.debug_tuple("Sign").field(&details.participants).finish()
			},
		}
	}
}

#[derive(Debug)]
pub struct KeygenRequestDetails<C: CryptoScheme> {
	pub participants: BTreeSet<PartyId>,
	pub threshold: u32,
	pub rng: Rng,
	pub result_sender: CeremonyResultSender<KeygenCeremony<C>>,
}

/// `key_id`/`key_store` let the signing ceremony's secret-touching stage
/// (`LocalSigStage3`) ask the key store to produce this party's response
/// share instead of holding the raw key share itself (spec §4.A "sign
/// oracle" contract); `key` still carries the public aggregate key and
/// per-party public shares the later verification stage needs.
pub struct SigningRequestDetails<C>
where
	C: CryptoScheme,
{
	pub participants: BTreeSet<PartyId>,
	pub key: KeygenResultInfo<C>,
	pub key_id: KeyId,
	pub key_store: std::sync::Arc<dyn crate::keystore::SigningOracle<C>>,
	pub payload: C::SigningPayload,
	pub rng: Rng,
	pub result_sender: CeremonyResultSender<SigningCeremony<C>>,
}

impl<C: CryptoScheme> std::fmt::Debug for SigningRequestDetails<C> {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("SigningRequestDetails")
			.field("participants", &self.participants)
			.field("key_id", &self.key_id)
			.finish_non_exhaustive()
	}
}

/// Multisig client acts as the frontend for the multisig functionality,
/// delegating the actual ceremony execution to [`ceremony_manager`]. It is
/// additionally responsible for persistently storing generated keys and
/// retrieving them for signing ceremonies.
pub struct MultisigClient<C: CryptoScheme, KeyStore: KeyStoreAPI<C>> {
	my_id: PartyId,
	ceremony_request_sender: UnboundedSender<CeremonyRequest<C>>,
	key_store: std::sync::Arc<std::sync::Mutex<KeyStore>>,
}

impl<C: CryptoScheme, KeyStore: KeyStoreAPI<C>> MultisigClient<C, KeyStore> {
	pub fn new(
		my_id: PartyId,
		key_store: KeyStore,
		ceremony_request_sender: UnboundedSender<CeremonyRequest<C>>,
	) -> Self {
		MultisigClient {
			my_id,
			key_store: std::sync::Arc::new(std::sync::Mutex::new(key_store)),
			ceremony_request_sender,
		}
	}
}

impl<C: CryptoScheme, KeyStore: KeyStoreAPI<C>> MultisigClientApi<C> for MultisigClient<C, KeyStore> {
	fn initiate_keygen(
		&self,
		ceremony_id: CeremonyId,
		participants: BTreeSet<PartyId>,
		threshold: u32,
	) -> BoxFuture<'_, Result<C::PublicKey, (BTreeSet<PartyId>, KeygenFailureReason)>> {
		assert!(participants.contains(&self.my_id), "we are not among participants");

		let span = info_span!("Keygen Ceremony", ceremony_id = ceremony_id_string(ceremony_id));
		let _entered = span.enter();

		info!(
			participants = participants.iter().join(", "),
			threshold, "Received a keygen request"
		);

		use rand::SeedableRng;
		let rng = Rng::from_entropy();

		let (result_sender, result_receiver) = tokio::sync::oneshot::channel();
		self.ceremony_request_sender
			.send(CeremonyRequest {
				ceremony_id,
				details: Some(CeremonyRequestDetails::Keygen(KeygenRequestDetails {
					participants,
					threshold,
					rng,
					result_sender,
				})),
			})
			.unwrap();

		async move {
			result_receiver
				.await
				.expect("Keygen result channel dropped before receiving a result")
				.map(|keygen_result_info| {
					let agg_key = keygen_result_info.key.get_agg_public_key();
					let key_id = KeyId::new(agg_key.clone());
					let metadata = KeyMetadata {
						algorithm: C::ALGORITHM,
						created_at: chrono::Utc::now(),
						permitted_usages: vec!["sign".to_string()],
					};

					match self.key_store.lock().unwrap().put(key_id, keygen_result_info, metadata) {
						Ok(()) => {},
						Err(KeyStoreError::AlreadyExists) => {
							debug!("Generated key already present in key store, keeping existing share");
						},
						Err(e) => panic!("Failed to persist generated key share: {e}"),
					}

					agg_key
				})
				.map_err(|(reported_parties, failure_reason)| {
					failure_reason.log(&reported_parties);
					(reported_parties, failure_reason)
				})
		}
		.instrument(span.clone())
		.boxed()
	}

	fn initiate_signing(
		&self,
		ceremony_id: CeremonyId,
		signers: BTreeSet<PartyId>,
		key_id: KeyId,
		payload: C::SigningPayload,
	) -> BoxFuture<'_, Result<C::Signature, (BTreeSet<PartyId>, SigningFailureReason)>> {
		let span = info_span!("Signing Ceremony", ceremony_id = ceremony_id_string(ceremony_id));
		let _entered = span.enter();

		assert!(signers.contains(&self.my_id), "we are not among signers");

		debug!(key_id = key_id.to_string(), signers = signers.iter().join(", "), "Received a request to sign");

		let key = self.key_store.lock().unwrap().get(&key_id);

		if let Ok(key) = key {
			use rand::SeedableRng;
			let rng = Rng::from_entropy();

			let (result_sender, result_receiver) = tokio::sync::oneshot::channel();
			self.ceremony_request_sender
				.send(CeremonyRequest {
					ceremony_id,
					details: Some(CeremonyRequestDetails::Sign(SigningRequestDetails {
						participants: signers,
						key,
						key_id: key_id.clone(),
						key_store: self.key_store.clone(),
						payload,
						rng,
						result_sender,
					})),
				})
				.unwrap();

			async move {
				result_receiver
					.await
					.expect("Signing result oneshot channel dropped before receiving a result")
					.map_err(|(reported_parties, failure_reason)| {
						failure_reason.log(&reported_parties);
						(reported_parties, failure_reason)
					})
			}
			.instrument(span.clone())
			.boxed()
		} else {
			self.update_latest_ceremony_id(ceremony_id);
			let reported_parties = Default::default();
			let failure_reason = SigningFailureReason::UnknownKey;
			failure_reason.log(&reported_parties);
			futures::future::ready(Err((reported_parties, failure_reason))).boxed()
		}
	}

	fn update_latest_ceremony_id(&self, ceremony_id: CeremonyId) {
		self.ceremony_request_sender.send(CeremonyRequest { ceremony_id, details: None }).unwrap();
	}
}

/// Outputs the ceremony id in a form that's visibly unique in the logs.
pub fn ceremony_id_string(ceremony_id: CeremonyId) -> String {
	format!("ceremony-{ceremony_id}")
}
