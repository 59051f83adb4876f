//! In-process transport: an `mpsc` channel per ordered pair of parties.
//! Used for single-process integration tests and as the concrete transport
//! the supervisor wires up when no TLS peer configuration is given.
//!
//! Channels are lossless and ordered by construction, so the FIFO-per-sender
//! and at-least-once-with-dedup properties the trait documents hold here
//! trivially; a real network transport (see [`super::TlsTransport`]) is
//! where sequence numbers and a dedup window actually earn their keep.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex};

use super::{Bus, BusError, Envelope, WireMessage};
use crate::party::PartyId;

pub struct LoopbackBus {
	own_id: PartyId,
	peers: HashMap<PartyId, mpsc::UnboundedSender<Envelope>>,
	inbox: Mutex<mpsc::UnboundedReceiver<Envelope>>,
}

impl LoopbackBus {
	/// Build one fully-connected bus per id in `party_ids`.
	pub fn network(party_ids: &[PartyId]) -> HashMap<PartyId, LoopbackBus> {
		let mut senders = HashMap::new();
		let mut receivers = HashMap::new();
		for &id in party_ids {
			let (tx, rx) = mpsc::unbounded_channel();
			senders.insert(id, tx);
			receivers.insert(id, rx);
		}

		party_ids
			.iter()
			.map(|&own_id| {
				let inbox = receivers.remove(&own_id).expect("receiver present for every configured id");
				let peers = senders.clone();
				(own_id, LoopbackBus { own_id, peers, inbox: Mutex::new(inbox) })
			})
			.collect()
	}
}

#[async_trait]
impl Bus for LoopbackBus {
	async fn broadcast(&self, message: WireMessage) -> Result<(), BusError> {
		for (&peer_id, sender) in &self.peers {
			if peer_id == self.own_id {
				continue
			}
			sender
				.send(Envelope { sender: self.own_id, message: message.clone() })
				.map_err(|_| BusError::SendFailed(format!("peer {peer_id} channel closed")))?;
		}
		Ok(())
	}

	async fn send_to(&self, to: PartyId, message: WireMessage) -> Result<(), BusError> {
		let sender = self.peers.get(&to).ok_or(BusError::UnknownPeer(to))?;
		sender
			.send(Envelope { sender: self.own_id, message })
			.map_err(|_| BusError::SendFailed(format!("peer {to} channel closed")))
	}

	async fn recv(&self) -> Option<Envelope> {
		self.inbox.lock().await.recv().await
	}
}
