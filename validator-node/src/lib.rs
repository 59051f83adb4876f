//! Supervisor wiring for the bridge validator node: config loading, the
//! ceremony-bus bridge, chain event monitoring, and the signing
//! coordinator. Split into a library so `tests/` can exercise component
//! wiring directly, the way the teacher's `chainflip-engine` crate
//! separates `lib.rs` from `main.rs`.

pub mod bridge;
pub mod config;
pub mod coordinator;
pub mod http;
pub mod monitor;
pub mod signal;
