#![cfg_attr(test, feature(closure_track_caller))]

//! Threshold key generation and signing core for the bridge validator.
pub use crypto::{schnorr::BridgeSchnorr, CanonicalEncoding, CryptoScheme, ECPoint, ECScalar, KeyId, Rng};

pub use bus::{Bus, BusError, Envelope, LoopbackBus, WireMessage};
pub use client::{MultisigClient, MultisigClientApi, MultisigMessage};
pub use keystore::{Algorithm, KeyMetadata, KeyStoreAPI, KeyStoreError};
pub use party::{CeremonyId, PartyId, ThresholdParameters};

/// Transport bus abstraction and wire message envelopes (spec section 4.B).
pub mod bus;
/// Multisig client: ceremony management, keygen and signing state machines.
pub mod client;
/// Cryptographic primitives (secp256k1 group ops, Schnorr scheme).
mod crypto;
/// Durable storage and sign-oracle for this party's long-term key share.
pub mod keystore;
/// Wire-level message envelopes exchanged over the transport bus.
pub mod p2p;
/// Party and ceremony identifiers shared by keygen and signing.
mod party;
