//! Glues the multisig crate's ceremony machinery to the transport bus
//! (spec §4.B/§4.C/§4.E): ceremony stage output becomes wire traffic, and
//! wire traffic addressed to a ceremony becomes ceremony input. Also routes
//! the non-ceremony wire message kinds (`HEARTBEAT`, `SIGNATURE_COMPLETE`)
//! to the signing coordinator.
//!
//! This is the "coordinator owns the bus client; the bus invokes the
//! coordinator through a narrow callback interface" seam from spec §9 —
//! here realised as a single `tokio::select!` loop rather than a callback,
//! since both sides are already channel-shaped.

use std::sync::Arc;

use multisig::{
	p2p::{OutgoingMultisigStageMessages, VersionedCeremonyMessage, CURRENT_PROTOCOL_VERSION},
	Bus, CryptoScheme, MultisigClientApi, PartyId, WireMessage,
};
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tracing::{debug, warn};

use crate::coordinator::SigningCoordinator;

/// Runs until the bus is closed. Call this from the supervisor alongside
/// `CeremonyManager::run`; the two tasks share the `outgoing`/`incoming`
/// channel pair the ceremony manager was constructed with.
pub async fn run_ceremony_bridge<C: CryptoScheme, Client: MultisigClientApi<C> + 'static>(
	bus: Arc<dyn Bus>,
	coordinator: Arc<SigningCoordinator<C, Client>>,
	mut outgoing: UnboundedReceiver<OutgoingMultisigStageMessages>,
	incoming: UnboundedSender<(PartyId, VersionedCeremonyMessage)>,
) {
	loop {
		tokio::select! {
			Some(message) = outgoing.recv() => {
				send_outgoing(&bus, message).await;
			}
			envelope = bus.recv() => {
				match envelope {
					Some(envelope) => route_incoming(envelope, &incoming, &coordinator).await,
					None => {
						debug!("Transport bus closed, stopping ceremony bridge");
						break
					},
				}
			}
			else => break,
		}
	}
}

async fn send_outgoing(bus: &Arc<dyn Bus>, message: OutgoingMultisigStageMessages) {
	match message {
		OutgoingMultisigStageMessages::Broadcast(recipients, payload) => {
			// The bus's own broadcast already fans out to every configured
			// peer; the ceremony layer additionally restricts recipients to
			// this ceremony's participants, so send individually rather
			// than widen the audience via `Bus::broadcast`.
			for to in recipients {
				send_one(bus, to, payload.clone()).await;
			}
		},
		OutgoingMultisigStageMessages::Private(messages) => {
			for (to, payload) in messages {
				send_one(bus, to, payload).await;
			}
		},
	}
}

async fn send_one(bus: &Arc<dyn Bus>, to: PartyId, payload: Vec<u8>) {
	// Ceremony id isn't cheaply available here without decoding the
	// payload (it's generic over the crypto scheme's point type); the bus
	// only uses it for dedup/FIFO bucketing, so a constant bucket per
	// transport connection is sufficient - sequencing is still correct
	// because the underlying transport preserves FIFO per sender.
	if let Err(error) = bus.send_to(to, WireMessage::Ceremony { ceremony_id: 0, payload }).await {
		warn!(%to, %error, "Failed to send ceremony message");
	}
}

async fn route_incoming<C: CryptoScheme, Client: MultisigClientApi<C> + 'static>(
	envelope: multisig::Envelope,
	incoming: &UnboundedSender<(PartyId, VersionedCeremonyMessage)>,
	coordinator: &Arc<SigningCoordinator<C, Client>>,
) {
	match envelope.message {
		WireMessage::Ceremony { payload, .. } => {
			let versioned = VersionedCeremonyMessage { version: CURRENT_PROTOCOL_VERSION, payload };
			if incoming.send((envelope.sender, versioned)).is_err() {
				warn!("Ceremony manager channel closed, dropping ceremony message");
			}
		},
		WireMessage::Heartbeat { .. } => {
			coordinator.record_heartbeat(envelope.sender).await;
		},
		WireMessage::SignatureComplete { .. } => {
			debug!(from = %envelope.sender, "Observed a peer's SIGNATURE_COMPLETE");
		},
		WireMessage::ValidatorRegister { .. } |
		WireMessage::DkgStart { .. } |
		WireMessage::SignalEvent { .. } |
		WireMessage::SigningRequest { .. } => {
			debug!(from = %envelope.sender, kind = ?envelope.message, "Observed wire message (audit only)");
		},
	}
}
