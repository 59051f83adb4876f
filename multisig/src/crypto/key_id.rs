use serde::{Deserialize, Serialize};

/// Identifies a specific aggregate key by its canonical public key encoding.
/// There is no notion of an epoch here: this node manages a single static
/// committee and its single aggregate key.
#[derive(Serialize, Deserialize, PartialEq, Eq, Hash, Debug, Clone)]
pub struct KeyId(Vec<u8>);

/// Commonly agreed-upon byte-encoding used for public keys.
pub trait CanonicalEncoding {
	fn encode_key(&self) -> Vec<u8>;
}

impl KeyId {
	pub fn new<Key: CanonicalEncoding>(key: Key) -> Self {
		KeyId(key.encode_key())
	}

	pub fn as_bytes(&self) -> &[u8] {
		&self.0
	}
}

impl CanonicalEncoding for secp256k1::XOnlyPublicKey {
	fn encode_key(&self) -> Vec<u8> {
		self.serialize().to_vec()
	}
}

impl<const S: usize> CanonicalEncoding for [u8; S] {
	fn encode_key(&self) -> Vec<u8> {
		self.to_vec()
	}
}

impl core::fmt::Display for KeyId {
	fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
		write!(f, "KeyId({})", hex::encode(&self.0))
	}
}
