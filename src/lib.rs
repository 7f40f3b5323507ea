//! Signed Requests - HMAC request authentication for Axum services
//!
//! Verifies that a request body was produced by a holder of a shared
//! secret, and optionally that it is fresh and used only once.
//!
//! # Modules
//!
//! - [`api_auth`] - Signing, identifier validation, replay store, gate, middleware
//! - [`config`] - YAML application and authentication configuration
//! - [`gateway`] - Example HTTP server behind the middleware
//! - [`logging`] - tracing subscriber setup

pub mod api_auth;
pub mod config;
pub mod gateway;
pub mod logging;

// Convenient re-exports at crate root
pub use api_auth::{
    AuthenticationGate, Authenticity, MemoryReplayStore, ReplayStore, RequestSigner, Verdict,
    signed_request_middleware,
};
pub use config::{AppConfig, AuthConfig};
