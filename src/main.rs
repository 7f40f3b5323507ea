//! Signed Requests - example server
//!
//! ```text
//! ┌──────────┐    ┌──────────────┐    ┌──────────────┐    ┌──────────┐
//! │  Client  │───▶│  Middleware  │───▶│     Gate     │───▶│ Handler  │
//! │ (signed) │    │ (headers,    │    │ (HMAC, ident,│    │ (verdict)│
//! └──────────┘    │  body)       │    │  replay)     │    └──────────┘
//!                 └──────────────┘    └──────────────┘
//! ```
//!
//! Usage: `signed_requests [--env dev]` reads `config/{env}.yaml`.

use std::sync::Arc;
use std::time::Duration;

use signed_requests::api_auth::{AuthenticationGate, MemoryReplayStore, ReplayStore};
use signed_requests::config::AppConfig;
use signed_requests::gateway;
use signed_requests::logging::init_logging;

fn get_env() -> String {
    let args: Vec<String> = std::env::args().collect();
    for i in 0..args.len() {
        if (args[i] == "--env" || args[i] == "-e") && i + 1 < args.len() {
            return args[i + 1].clone();
        }
    }
    "dev".to_string()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env = get_env();
    let config = AppConfig::load(&env)?;
    let _guard = init_logging(&config.logging);

    tracing::info!(
        "Starting signed_requests (env={}, build={})",
        env,
        env!("GIT_HASH")
    );

    let store = Arc::new(MemoryReplayStore::new());
    let _sweeper = store.start_sweeper(Duration::from_secs(config.auth.expiry.max(1)));

    let replay_store: Option<Arc<dyn ReplayStore>> = Some(store);
    let gate = Arc::new(AuthenticationGate::new(&config.auth, replay_store)?);

    if gate.debug_bypass() {
        tracing::warn!("debug_bypass is enabled: signatures are NOT verified");
    }

    gateway::run_server(&config.gateway, gate).await
}
