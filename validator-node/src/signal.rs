//! `SignalEvent`: the typed, deduplicated event the chain monitor (§4.D)
//! hands to the signing coordinator (§4.E), and the canonical encoding of
//! the bytes a ceremony signs over (§6).

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// 32-byte digest the source chain assigns to a signal. Primary key: two
/// observations of the same `signal_id` must be byte-identical (spec §3).
pub type SignalId = [u8; 32];

/// One observation of a `SignalSent` log entry on a source chain (spec §3,
/// §6 ABI). `observed_tx_hash` and `block_number` are provenance, not part
/// of the canonical message — the destination chain only ever sees
/// `signal_id`, the two chain ids, `nonce` and `payload`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalEvent {
	pub chain_id: u32,
	pub signal_id: SignalId,
	pub src_chain_id: u32,
	pub dst_chain_id: u32,
	pub src_addr: [u8; 20],
	pub dst_addr: [u8; 20],
	pub nonce: u32,
	pub payload: Vec<u8>,
	pub observed_tx_hash: [u8; 32],
	pub block_number: u64,
	pub timestamp: i64,
}

/// `requestId = signalId || observedTxHash_prefix` (spec §3). The prefix is
/// kept short: it exists so two otherwise-identical signals observed on
/// different transactions (a vanishingly unlikely collision on `signal_id`
/// alone) don't get coalesced, not to carry provenance.
pub const TX_HASH_PREFIX_LEN: usize = 8;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestId(pub [u8; 32 + TX_HASH_PREFIX_LEN]);

impl RequestId {
	pub fn for_event(ev: &SignalEvent) -> Self {
		let mut bytes = [0u8; 32 + TX_HASH_PREFIX_LEN];
		bytes[..32].copy_from_slice(&ev.signal_id);
		bytes[32..].copy_from_slice(&ev.observed_tx_hash[..TX_HASH_PREFIX_LEN]);
		RequestId(bytes)
	}

	pub fn as_bytes(&self) -> &[u8] {
		&self.0
	}
}

impl std::fmt::Display for RequestId {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}", hex::encode(self.0))
	}
}

/// Domain-separation tag for the canonical message hash. Binds the digest
/// to this protocol so it can never be reinterpreted as a hash computed
/// for an unrelated purpose (tagged-hash construction, as used by BIP-340
/// Schnorr challenges).
const MESSAGE_TAG: &[u8] = b"bridge-validator/signal-message/v1";

/// `H(signalId || BE32(srcChainId) || BE32(dstChainId) || BE32(nonce) || payload)`
/// (spec §4.E, §6). Bit-exact agreement between independent encoders is a
/// tested property (spec §8): this function has no branching on event
/// content, so any two implementations that serialize the same
/// `SignalEvent` fields in this order produce the same digest.
pub fn canonical_message(ev: &SignalEvent) -> [u8; 32] {
	let mut hasher = Sha256::new();
	hasher.update(MESSAGE_TAG);
	hasher.update(ev.signal_id);
	hasher.update(ev.src_chain_id.to_be_bytes());
	hasher.update(ev.dst_chain_id.to_be_bytes());
	hasher.update(ev.nonce.to_be_bytes());
	hasher.update(&ev.payload);
	hasher.finalize().into()
}
