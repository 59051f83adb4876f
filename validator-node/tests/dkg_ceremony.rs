//! Two parties drive a real DKG ceremony end to end over in-process
//! `LoopbackBus` transports and confirm they land on the same aggregate key
//! and that each persists it to their own file key store.

use std::{collections::BTreeSet, sync::Arc};

use multisig::{
	client::ceremony_manager::CeremonyManager,
	keystore::FileKeyStore,
	p2p::{OutgoingMultisigStageMessages, VersionedCeremonyMessage, CURRENT_PROTOCOL_VERSION},
	Bus, BridgeSchnorr, KeyStoreAPI, LoopbackBus, MultisigClient, MultisigClientApi, PartyId,
	WireMessage,
};
use tokio::sync::mpsc;

/// Forwards ceremony-stage output onto the bus as `WireMessage::Ceremony`,
/// and routes inbound `Ceremony` traffic back into this party's ceremony
/// manager. A stripped-down stand-in for `validator_node::bridge`'s routing
/// loop, which can't be reused directly here: it requires a `SigningCoordinator`,
/// which in turn requires a group public key that doesn't exist until after
/// this very ceremony completes.
async fn route_ceremony_traffic(
	bus: Arc<dyn Bus>,
	mut outgoing: mpsc::UnboundedReceiver<OutgoingMultisigStageMessages>,
	incoming: mpsc::UnboundedSender<(PartyId, VersionedCeremonyMessage)>,
) {
	loop {
		tokio::select! {
			maybe_message = outgoing.recv() => {
				let Some(message) = maybe_message else { break };
				let targets: Vec<(PartyId, Vec<u8>)> = match message {
					OutgoingMultisigStageMessages::Broadcast(to, payload) =>
						to.into_iter().map(|p| (p, payload.clone())).collect(),
					OutgoingMultisigStageMessages::Private(messages) => messages,
				};
				for (to, payload) in targets {
					let _ = bus.send_to(to, WireMessage::Ceremony { ceremony_id: 0, payload }).await;
				}
			}
			envelope = bus.recv() => {
				let Some(envelope) = envelope else { break };
				if let WireMessage::Ceremony { payload, .. } = envelope.message {
					let versioned = VersionedCeremonyMessage { version: CURRENT_PROTOCOL_VERSION, payload };
					if incoming.send((envelope.sender, versioned)).is_err() {
						break
					}
				}
			}
		}
	}
}

#[tokio::test]
async fn two_party_dkg_produces_matching_aggregate_key() {
	let party_ids: Vec<PartyId> = (1..=2).map(|i| PartyId::new(i).unwrap()).collect();
	let participants: BTreeSet<PartyId> = party_ids.iter().copied().collect();
	let mut network = LoopbackBus::network(&party_ids);

	let mut tmp_dirs = Vec::new();
	let mut clients = Vec::new();
	let mut background_tasks = Vec::new();

	for &party_id in &party_ids {
		let bus: Arc<dyn Bus> = Arc::new(network.remove(&party_id).unwrap());

		let tmp_dir = tempfile::tempdir().unwrap();
		let key_store =
			FileKeyStore::<BridgeSchnorr>::open(tmp_dir.path(), b"test-password".to_vec()).unwrap();
		tmp_dirs.push(tmp_dir);

		let (ceremony_request_tx, ceremony_request_rx) = mpsc::unbounded_channel();
		let (outgoing_tx, outgoing_rx) = mpsc::unbounded_channel();
		let (incoming_tx, incoming_rx) = mpsc::unbounded_channel();

		let manager = CeremonyManager::<BridgeSchnorr>::new(party_id, outgoing_tx, 0);
		background_tasks.push(tokio::spawn(async move {
			let _ = manager.run(ceremony_request_rx, incoming_rx).await;
		}));
		background_tasks.push(tokio::spawn(route_ceremony_traffic(bus, outgoing_rx, incoming_tx)));

		let client = Arc::new(MultisigClient::new(party_id, key_store, ceremony_request_tx));
		clients.push(client);
	}

	let keygen_results = futures::future::join_all(
		clients.iter().map(|client| client.initiate_keygen(1, participants.clone(), 2)),
	)
	.await;

	let public_keys: Vec<_> =
		keygen_results.into_iter().map(|r| r.expect("both parties are online, keygen should succeed")).collect();

	assert_eq!(public_keys[0].x_bytes, public_keys[1].x_bytes);
	assert_eq!(public_keys[0].y_is_even, public_keys[1].y_is_even);

	for task in background_tasks {
		task.abort();
	}

	for tmp_dir in &tmp_dirs {
		let reopened =
			FileKeyStore::<BridgeSchnorr>::open(tmp_dir.path(), b"test-password".to_vec()).unwrap();
		assert_eq!(reopened.list().len(), 1, "generated key share should have been persisted to disk");
	}
}
