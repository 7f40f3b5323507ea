//! Signed-request authentication.
//!
//! HMAC signatures over the request body, optionally bound to a time-based
//! request identifier for expiry and replay protection.
//!
//! ## Components
//! - `signer`: HMAC computation, digest encoding, constant-time verify
//! - `identifier`: identifier codec, clock, freshness and single-use checks
//! - `replay_store`: replay store capability and in-memory implementation
//! - `gate`: per-request verification producing a `Verdict`
//! - `middleware`: Axum middleware and handler extractor
//! - `client`: header generation for outgoing requests
//! - `error`: configuration, store and HTTP-facing errors

pub mod client;
pub mod error;
pub mod gate;
pub mod identifier;
pub mod middleware;
pub mod replay_store;
pub mod signer;

// Re-export for convenience
pub use client::{RequestSigner, SignedHeaders};
pub use error::{AuthError, AuthErrorCode, ConfigError, GateError, StoreError};
pub use gate::{AuthenticationGate, Verdict};
pub use identifier::{
    Clock, IdentifierCodec, ParsedIdentifier, RequestIdentifier, SystemClock, TimeUuidCodec,
};
pub use middleware::{Authenticity, signed_request_middleware};
pub use replay_store::{MemoryReplayStore, ReplayStore};
pub use signer::{DigestEncoding, HashAlgorithm, Signer, sign, signing_payload};
