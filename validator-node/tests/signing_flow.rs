//! Drives `SigningCoordinator` against a mocked multisig client: a signal
//! observed once produces exactly one signing ceremony and a broadcast
//! `SIGNATURE_COMPLETE`, and observing the same signal again is a no-op.

mod support;

use std::{collections::BTreeSet, sync::Arc, time::Duration};

use multisig::{
	client::MockMultisigClientApi, Bus, BridgeSchnorr, CryptoScheme, KeyId, LoopbackBus, PartyId, WireMessage,
};
use validator_node::{
	coordinator::{CoordinatorFailure, PartialSignature, SelectionPolicy, SigningCoordinator},
	signal::{canonical_message, RequestId, SignalEvent},
};

fn sample_event() -> SignalEvent {
	SignalEvent {
		chain_id: 1,
		signal_id: [0x07; 32],
		src_chain_id: 1,
		dst_chain_id: 56,
		src_addr: [0xaa; 20],
		dst_addr: [0xbb; 20],
		nonce: 3,
		payload: vec![0xc0, 0xff, 0xee],
		observed_tx_hash: [0x11; 32],
		block_number: 42,
		timestamp: 1_700_000_000,
	}
}

fn two_parties() -> (PartyId, PartyId) {
	(PartyId::new(1).unwrap(), PartyId::new(2).unwrap())
}

#[tokio::test]
async fn happy_signing_broadcasts_a_verified_signature_once() {
	let (me, peer) = two_parties();
	let all_parties: BTreeSet<PartyId> = [me, peer].into_iter().collect();

	let ev = sample_event();
	let payload = BridgeSchnorr::payload_from_digest(canonical_message(&ev));
	let (signature, group_public_key) = support::single_party_signature::<BridgeSchnorr>(&payload, [9u8; 32]);

	let mut mock = MockMultisigClientApi::<BridgeSchnorr>::new();
	mock.expect_initiate_signing()
		.times(1)
		.returning(move |_ceremony_id, _signers, _key_id, _payload| {
			let signature = signature.clone();
			Box::pin(async move { Ok(signature) })
		});

	let mut network = LoopbackBus::network(&[me, peer]);
	let my_bus = Arc::new(network.remove(&me).unwrap());
	let peer_bus = network.remove(&peer).unwrap();

	let coordinator = SigningCoordinator::new(
		me,
		KeyId::new([0xAAu8; 33]),
		group_public_key,
		2,
		all_parties,
		SelectionPolicy::FirstAvailable,
		Duration::from_secs(30),
		Arc::new(mock),
		my_bus,
	);

	coordinator.record_heartbeat(me).await;
	coordinator.record_heartbeat(peer).await;

	coordinator.on_signal_event(ev.clone()).await;

	assert!(coordinator.pending().await.is_empty(), "completed request should no longer be pending");

	let signing_request = tokio::time::timeout(Duration::from_secs(1), peer_bus.recv())
		.await
		.expect("did not observe a SigningRequest in time")
		.unwrap();
	assert!(matches!(signing_request.message, WireMessage::SigningRequest { .. }));

	let signature_complete = tokio::time::timeout(Duration::from_secs(1), peer_bus.recv())
		.await
		.expect("did not observe a SignatureComplete in time")
		.unwrap();
	assert!(matches!(signature_complete.message, WireMessage::SignatureComplete { .. }));

	// A second observation of the exact same signal is idempotent: the mock's
	// `times(1)` expectation would panic if `initiate_signing` were invoked again.
	coordinator.on_signal_event(ev).await;
	assert!(coordinator.pending().await.is_empty());
}

#[tokio::test]
async fn duplicate_signal_does_not_start_a_second_ceremony() {
	let (me, peer) = two_parties();
	let all_parties: BTreeSet<PartyId> = [me, peer].into_iter().collect();

	let ev = sample_event();
	let payload = BridgeSchnorr::payload_from_digest(canonical_message(&ev));
	let (signature, group_public_key) = support::single_party_signature::<BridgeSchnorr>(&payload, [3u8; 32]);

	let mut mock = MockMultisigClientApi::<BridgeSchnorr>::new();
	mock.expect_initiate_signing().times(1).returning(move |_, _, _, _| {
		let signature = signature.clone();
		Box::pin(async move { Ok(signature) })
	});

	let mut network = LoopbackBus::network(&[me, peer]);
	let my_bus = Arc::new(network.remove(&me).unwrap());
	let _peer_bus = network.remove(&peer).unwrap();

	let coordinator = SigningCoordinator::new(
		me,
		KeyId::new([0xBBu8; 33]),
		group_public_key,
		2,
		all_parties,
		SelectionPolicy::FirstAvailable,
		Duration::from_secs(30),
		Arc::new(mock),
		my_bus,
	);

	coordinator.record_heartbeat(me).await;
	coordinator.record_heartbeat(peer).await;

	let (first, second) = tokio::join!(coordinator.on_signal_event(ev.clone()), coordinator.on_signal_event(ev));
	let _: ((), ()) = (first, second);

	assert!(coordinator.pending().await.is_empty());
}

#[tokio::test]
async fn partial_signature_from_unselected_party_is_rejected() {
	let (me, peer) = two_parties();
	let all_parties: BTreeSet<PartyId> = [me, peer].into_iter().collect();

	let ev = sample_event();
	let payload = BridgeSchnorr::payload_from_digest(canonical_message(&ev));
	let (signature, group_public_key) = support::single_party_signature::<BridgeSchnorr>(&payload, [5u8; 32]);

	let mut mock = MockMultisigClientApi::<BridgeSchnorr>::new();
	mock.expect_initiate_signing().times(1).returning(move |_, _, _, _| {
		let signature = signature.clone();
		Box::pin(async move { Ok(signature) })
	});

	let mut network = LoopbackBus::network(&[me, peer]);
	let my_bus = Arc::new(network.remove(&me).unwrap());
	let _peer_bus = network.remove(&peer).unwrap();

	let coordinator = SigningCoordinator::new(
		me,
		KeyId::new([0xCCu8; 33]),
		group_public_key,
		2,
		all_parties,
		SelectionPolicy::FirstAvailable,
		Duration::from_secs(30),
		Arc::new(mock),
		my_bus,
	);

	coordinator.record_heartbeat(me).await;
	coordinator.record_heartbeat(peer).await;
	coordinator.on_signal_event(ev.clone()).await;

	let request_id = RequestId::for_event(&ev);
	let stranger = PartyId::new(99).unwrap();
	let result = coordinator
		.on_partial_signature(request_id, PartialSignature { party_id: stranger, sigma_i: vec![], pub_share_i: vec![] })
		.await;

	assert_eq!(result, Err(CoordinatorFailure::UnexpectedParticipant));
}
