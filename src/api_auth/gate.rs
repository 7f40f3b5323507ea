//! Authentication gate.
//!
//! Per request: recompute the signature over (identifier ‖ body) or body
//! alone, compare in constant time, then validate and consume the
//! identifier. The outcome is always data ([`Verdict`]); only infrastructure
//! failures surface as [`GateError`].

use axum::body::Bytes;
use axum::http::{HeaderName, Method};
use std::sync::Arc;

use super::error::{ConfigError, GateError};
use super::identifier::{Clock, IdentifierCodec, RequestIdentifier};
use super::replay_store::ReplayStore;
use super::signer::{Signer, signing_payload};
use crate::config::AuthConfig;

/// Per-request authentication outcome.
#[derive(Debug, Clone)]
pub struct Verdict {
    pub authenticated: bool,
    /// Transport identifier, or a generated one when identifiers are
    /// required but none was sent
    pub identifier: Option<String>,
    /// Raw body, read exactly once
    pub body: Bytes,
    /// Structured body, only ever set on authenticated requests
    pub media: Option<serde_json::Value>,
}

impl Verdict {
    /// Decode the body as JSON when authenticated.
    ///
    /// JSON is the default media type, so a missing content type also
    /// decodes. Decode failures leave `media` empty and never touch
    /// `authenticated`.
    pub fn decode_media(&mut self, content_type: Option<&str>) {
        if !self.authenticated {
            return;
        }
        let is_json = content_type.is_none_or(|ct| {
            ct.split(';')
                .next()
                .is_some_and(|mime| mime.trim().eq_ignore_ascii_case("application/json"))
        });
        if is_json {
            self.media = serde_json::from_slice(&self.body).ok();
        }
    }
}

/// Verifies signed requests. Build once, share across requests.
pub struct AuthenticationGate {
    signer: Signer,
    identifiers: Option<RequestIdentifier>,
    signature_header: HeaderName,
    identifier_header: HeaderName,
    debug_bypass: bool,
    max_body_bytes: usize,
}

impl AuthenticationGate {
    /// Fails fast on any configuration problem.
    ///
    /// `store` may be `None` only when identifiers are not required.
    pub fn new(
        config: &AuthConfig,
        store: Option<Arc<dyn ReplayStore>>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let signer = Signer::from_config(config)?;

        let identifiers = if config.identifier_required {
            let store = store.ok_or(ConfigError::MissingReplayStore)?;
            Some(RequestIdentifier::new(
                store,
                config.expiry,
                config.nonce_prefix.clone(),
            ))
        } else {
            None
        };

        Ok(Self {
            signer,
            identifiers,
            signature_header: config.signature_header()?,
            identifier_header: config.identifier_header()?,
            debug_bypass: config.debug_bypass,
            max_body_bytes: config.max_body_bytes,
        })
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.identifiers = self.identifiers.map(|ids| ids.with_clock(clock));
        self
    }

    pub fn with_codec(mut self, codec: Arc<dyn IdentifierCodec>) -> Self {
        self.identifiers = self.identifiers.map(|ids| ids.with_codec(codec));
        self
    }

    pub fn signature_header(&self) -> &HeaderName {
        &self.signature_header
    }

    pub fn identifier_header(&self) -> &HeaderName {
        &self.identifier_header
    }

    pub fn identifier_required(&self) -> bool {
        self.identifiers.is_some()
    }

    pub fn debug_bypass(&self) -> bool {
        self.debug_bypass
    }

    pub fn max_body_bytes(&self) -> usize {
        self.max_body_bytes
    }

    /// Requests that skip verification entirely, body unread.
    pub fn is_pass_through(method: &Method, signature: Option<&str>) -> bool {
        let carries_body = matches!(*method, Method::POST | Method::PUT | Method::PATCH);
        !carries_body && signature.is_none()
    }

    /// Authenticate one request.
    pub async fn authenticate(
        &self,
        signature: Option<&str>,
        identifier: Option<&str>,
        body: Bytes,
    ) -> Result<Verdict, GateError> {
        let payload_identifier = self
            .identifiers
            .as_ref()
            .map(|_| identifier.unwrap_or_default());
        let payload = signing_payload(payload_identifier, &body);

        let signature_matches = signature.is_some_and(|sig| self.signer.verify(&payload, sig));

        // A successful validate has already recorded the identifier as used.
        let authenticated = match (&self.identifiers, signature_matches) {
            (_, false) => {
                tracing::debug!("[AUTH] Signature mismatch");
                false
            }
            (None, true) => true,
            (Some(ids), true) => match identifier {
                Some(id) => ids.validate(id).await?,
                None => false,
            },
        };

        let verdict = Verdict {
            authenticated,
            identifier: self.bookkeeping_identifier(identifier),
            body,
            media: None,
        };

        tracing::debug!(
            "[AUTH] authenticated={} identifier={:?}",
            verdict.authenticated,
            verdict.identifier
        );
        Ok(verdict)
    }

    /// Verdict for a request let through by `debug_bypass`.
    pub fn bypass(&self, identifier: Option<&str>, body: Bytes) -> Verdict {
        tracing::warn!("[AUTH] debug_bypass is enabled; request accepted without verification");
        Verdict {
            authenticated: true,
            identifier: self.bookkeeping_identifier(identifier),
            body,
            media: None,
        }
    }

    fn bookkeeping_identifier(&self, identifier: Option<&str>) -> Option<String> {
        match (identifier, &self.identifiers) {
            (Some(id), _) => Some(id.to_string()),
            (None, Some(ids)) => Some(ids.generate()),
            (None, None) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api_auth::error::StoreError;
    use crate::api_auth::client::RequestSigner;
    use crate::api_auth::identifier::{FixedClock, ParsedIdentifier, TimeUuidCodec};
    use crate::api_auth::signer::{DigestEncoding, HashAlgorithm};
    use crate::api_auth::MemoryReplayStore;
    use async_trait::async_trait;
    use chrono::{DateTime, TimeDelta, Utc};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    const SECRET: &str = "SecretKey1234";

    /// Counts every store call, delegating to memory.
    #[derive(Default)]
    struct CountingStore {
        inner: MemoryReplayStore,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ReplayStore for CountingStore {
        async fn exists(&self, key: &str) -> Result<bool, StoreError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.exists(key).await
        }

        async fn set_with_ttl(
            &self,
            key: &str,
            value: &str,
            ttl: Duration,
        ) -> Result<(), StoreError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.set_with_ttl(key, value, ttl).await
        }

        async fn set_if_absent_with_ttl(
            &self,
            key: &str,
            value: &str,
            ttl: Duration,
        ) -> Result<bool, StoreError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.set_if_absent_with_ttl(key, value, ttl).await
        }
    }

    struct FailingStore;

    #[async_trait]
    impl ReplayStore for FailingStore {
        async fn exists(&self, _key: &str) -> Result<bool, StoreError> {
            Err(StoreError::Unavailable("connection refused".into()))
        }

        async fn set_with_ttl(&self, _: &str, _: &str, _: Duration) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("connection refused".into()))
        }

        async fn set_if_absent_with_ttl(
            &self,
            _: &str,
            _: &str,
            _: Duration,
        ) -> Result<bool, StoreError> {
            Err(StoreError::Unavailable("connection refused".into()))
        }
    }

    fn epoch() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap()
    }

    /// `{unix_secs}-{token}` identifiers, minted at a fixed second.
    struct StampCodec {
        minted_at: i64,
        minted: AtomicUsize,
    }

    impl StampCodec {
        fn at(minted_at: DateTime<Utc>) -> Self {
            Self {
                minted_at: minted_at.timestamp(),
                minted: AtomicUsize::new(0),
            }
        }
    }

    impl IdentifierCodec for StampCodec {
        fn parse(&self, identifier: &str) -> Option<ParsedIdentifier> {
            let (secs, token) = identifier.split_once('-')?;
            if token.is_empty() {
                return None;
            }
            Some(ParsedIdentifier {
                issued_at: DateTime::from_timestamp(secs.parse().ok()?, 0)?,
                token: token.to_ascii_lowercase(),
            })
        }

        fn generate(&self) -> String {
            let n = self.minted.fetch_add(1, Ordering::SeqCst);
            format!("{}-minted{}", self.minted_at, n)
        }
    }

    fn sign(config: &AuthConfig, identifier: Option<&str>, body: &[u8]) -> String {
        let signer = Signer::from_config(config).unwrap();
        signer.signature(&signing_payload(identifier, body))
    }

    fn default_gate() -> (AuthenticationGate, Arc<CountingStore>, AuthConfig) {
        let config = AuthConfig::with_secret(SECRET);
        let store = Arc::new(CountingStore::default());
        let gate = AuthenticationGate::new(&config, Some(store.clone())).unwrap();
        (gate, store, config)
    }

    fn github_config() -> AuthConfig {
        AuthConfig {
            header: "hub".to_string(),
            hash: HashAlgorithm::Sha1,
            digest: DigestEncoding::Hex,
            identifier_required: false,
            ..AuthConfig::with_secret(SECRET)
        }
    }

    #[tokio::test]
    async fn test_authentic_then_replayed() {
        let (gate, _, config) = default_gate();
        let id = TimeUuidCodec::new().generate();
        let body = Bytes::from_static(br#"{"example":"data"}"#);
        let sig = sign(&config, Some(&id), &body);

        let first = gate
            .authenticate(Some(&sig), Some(&id), body.clone())
            .await
            .unwrap();
        assert!(first.authenticated);
        assert_eq!(first.identifier.as_deref(), Some(id.as_str()));

        let second = gate
            .authenticate(Some(&sig), Some(&id), body)
            .await
            .unwrap();
        assert!(!second.authenticated);
    }

    #[tokio::test]
    async fn test_single_byte_flips_rejected() {
        let (gate, _, config) = default_gate();
        let codec = TimeUuidCodec::new();
        let body = b"Example Data".to_vec();

        for i in 0..body.len() {
            let id = codec.generate();
            let sig = sign(&config, Some(&id), &body);
            let mut tampered = body.clone();
            tampered[i] ^= 0x01;
            let verdict = gate
                .authenticate(Some(&sig), Some(&id), Bytes::from(tampered))
                .await
                .unwrap();
            assert!(!verdict.authenticated, "body byte {} flipped", i);
        }

        let id = codec.generate();
        let sig = sign(&config, Some(&id), &body);
        for i in 0..sig.len() {
            let mut tampered = sig.clone().into_bytes();
            tampered[i] ^= 0x01;
            let tampered = String::from_utf8_lossy(&tampered).into_owned();
            let verdict = gate
                .authenticate(Some(&tampered), Some(&id), Bytes::from(body.clone()))
                .await
                .unwrap();
            assert!(!verdict.authenticated, "signature byte {} flipped", i);
        }

        for i in 0..id.len() {
            let mut tampered = id.clone().into_bytes();
            tampered[i] ^= 0x01;
            let tampered = String::from_utf8_lossy(&tampered).into_owned();
            let verdict = gate
                .authenticate(Some(&sig), Some(&tampered), Bytes::from(body.clone()))
                .await
                .unwrap();
            assert!(!verdict.authenticated, "identifier byte {} flipped", i);
        }

        // Untouched request still authenticates: nothing above consumed it
        let verdict = gate
            .authenticate(Some(&sig), Some(&id), Bytes::from(body))
            .await
            .unwrap();
        assert!(verdict.authenticated);
    }

    #[tokio::test]
    async fn test_failed_signature_does_not_consume_identifier() {
        let (gate, store, config) = default_gate();
        let id = TimeUuidCodec::new().generate();
        let body = Bytes::from_static(b"payload");

        let verdict = gate
            .authenticate(Some("bogus"), Some(&id), body.clone())
            .await
            .unwrap();
        assert!(!verdict.authenticated);
        assert_eq!(store.calls.load(Ordering::SeqCst), 0);

        let sig = sign(&config, Some(&id), &body);
        let verdict = gate.authenticate(Some(&sig), Some(&id), body).await.unwrap();
        assert!(verdict.authenticated);
    }

    #[tokio::test]
    async fn test_missing_identifier_when_required() {
        let (gate, store, config) = default_gate();
        let body = Bytes::from_static(br#""Example Data""#);
        // Signed as if identifiers were optional
        let sig = sign(&config, None, &body);

        let verdict = gate.authenticate(Some(&sig), None, body).await.unwrap();
        assert!(!verdict.authenticated);
        // Bookkeeping identifier is minted anyway
        let generated = verdict.identifier.unwrap();
        assert!(TimeUuidCodec::new().parse(&generated).is_some());
        assert_eq!(store.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_missing_signature_keeps_body() {
        let (gate, _, _) = default_gate();
        let body = Bytes::from_static(b"Unauthenticated Data");
        let verdict = gate.authenticate(None, None, body.clone()).await.unwrap();
        assert!(!verdict.authenticated);
        assert_eq!(verdict.body, body);
        assert!(verdict.media.is_none());
    }

    #[tokio::test]
    async fn test_expiry_boundary() {
        let config = AuthConfig::with_secret(SECRET);
        let clock = Arc::new(FixedClock::new(epoch() + TimeDelta::seconds(300)));
        let gate = AuthenticationGate::new(&config, Some(Arc::new(MemoryReplayStore::new())))
            .unwrap()
            .with_clock(clock.clone());

        let id = TimeUuidCodec::new().encode_at(epoch());
        let body = Bytes::from_static(b"{}");
        let sig = sign(&config, Some(&id), &body);

        let verdict = gate
            .authenticate(Some(&sig), Some(&id), body.clone())
            .await
            .unwrap();
        assert!(!verdict.authenticated);

        clock.set(epoch() + TimeDelta::seconds(300) - TimeDelta::milliseconds(1));
        let verdict = gate.authenticate(Some(&sig), Some(&id), body).await.unwrap();
        assert!(verdict.authenticated);
    }

    #[tokio::test]
    async fn test_custom_codec_drives_freshness_and_replay() {
        let config = AuthConfig::with_secret(SECRET);
        let store = Arc::new(MemoryReplayStore::new());
        let codec = Arc::new(StampCodec::at(epoch()));
        let gate = AuthenticationGate::new(&config, Some(store.clone()))
            .unwrap()
            .with_clock(Arc::new(FixedClock::new(epoch())))
            .with_codec(codec.clone());
        let body = Bytes::from_static(br#"{"example":"data"}"#);

        let id = "1700000000-abc";
        let sig = sign(&config, Some(id), &body);
        let verdict = gate
            .authenticate(Some(&sig), Some(id), body.clone())
            .await
            .unwrap();
        assert!(verdict.authenticated);
        assert_eq!(store.get("nonce.abc").as_deref(), Some(id));

        let verdict = gate
            .authenticate(Some(&sig), Some(id), body.clone())
            .await
            .unwrap();
        assert!(!verdict.authenticated);

        // Same token in another spelling shares the replay key
        let respelled = "1700000000-ABC";
        let sig = sign(&config, Some(respelled), &body);
        let verdict = gate
            .authenticate(Some(&sig), Some(respelled), body.clone())
            .await
            .unwrap();
        assert!(!verdict.authenticated);

        let stale = "1699999700-def";
        let sig = sign(&config, Some(stale), &body);
        let verdict = gate
            .authenticate(Some(&sig), Some(stale), body.clone())
            .await
            .unwrap();
        assert!(!verdict.authenticated);
        assert!(store.get("nonce.def").is_none());

        let malformed = "abc";
        let sig = sign(&config, Some(malformed), &body);
        let verdict = gate
            .authenticate(Some(&sig), Some(malformed), body.clone())
            .await
            .unwrap();
        assert!(!verdict.authenticated);

        let verdict = gate.authenticate(Some(&sig), None, body.clone()).await.unwrap();
        assert!(!verdict.authenticated);
        assert_eq!(verdict.identifier.as_deref(), Some("1700000000-minted0"));

        let signed = RequestSigner::new(&config).unwrap().with_codec(codec).sign(&body);
        assert_eq!(signed.identifier.as_deref(), Some("1700000000-minted1"));
        let verdict = gate
            .authenticate(Some(&signed.signature), signed.identifier.as_deref(), body)
            .await
            .unwrap();
        assert!(verdict.authenticated);
        assert!(store.get("nonce.minted1").is_some());
    }

    #[tokio::test]
    async fn test_pre_epoch_uuid_rejected() {
        let (gate, store, config) = default_gate();
        let id = "00000000-0000-1000-8000-000000000000";
        let body = Bytes::from_static(b"{}");
        let sig = sign(&config, Some(id), &body);

        let verdict = gate.authenticate(Some(&sig), Some(id), body).await.unwrap();
        assert!(!verdict.authenticated);
        assert_eq!(store.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_github_style_never_touches_store() {
        let config = github_config();
        let store = Arc::new(CountingStore::default());
        let gate = AuthenticationGate::new(&config, Some(store.clone())).unwrap();

        let body = Bytes::from_static(br#""Example Data""#);
        let sig = sign(&config, None, &body);
        assert_eq!(sig, "2603d418bd482dc3b04456da8eb139e97ad10c79");

        let verdict = gate.authenticate(Some(&sig), None, body.clone()).await.unwrap();
        assert!(verdict.authenticated);
        assert!(verdict.identifier.is_none());

        // Replays are fine without identifiers
        let verdict = gate.authenticate(Some(&sig), None, body).await.unwrap();
        assert!(verdict.authenticated);

        let verdict = gate
            .authenticate(Some(&sig), None, Bytes::from_static(br#""Different Data""#))
            .await
            .unwrap();
        assert!(!verdict.authenticated);

        assert_eq!(store.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_store_optional_without_identifiers() {
        let gate = AuthenticationGate::new(&github_config(), None).unwrap();
        assert!(!gate.identifier_required());
        assert_eq!(gate.signature_header(), "x-hub-signature");
    }

    #[test]
    fn test_config_errors_at_construction() {
        let store: Arc<dyn ReplayStore> = Arc::new(MemoryReplayStore::new());

        let result = AuthenticationGate::new(&AuthConfig::default(), Some(store));
        assert!(matches!(result, Err(ConfigError::MissingSecret)));

        let result = AuthenticationGate::new(&AuthConfig::with_secret(SECRET), None);
        assert!(matches!(result, Err(ConfigError::MissingReplayStore)));

        let huge = AuthConfig {
            expiry: u64::MAX / 4,
            ..AuthConfig::with_secret(SECRET)
        };
        let result = AuthenticationGate::new(&huge, Some(Arc::new(MemoryReplayStore::new())));
        assert!(matches!(result, Err(ConfigError::InvalidExpiry)));
    }

    #[tokio::test]
    async fn test_store_failure_is_gate_error() {
        let config = AuthConfig::with_secret(SECRET);
        let gate = AuthenticationGate::new(&config, Some(Arc::new(FailingStore))).unwrap();
        let id = TimeUuidCodec::new().generate();
        let body = Bytes::from_static(b"{}");
        let sig = sign(&config, Some(&id), &body);

        let result = gate.authenticate(Some(&sig), Some(&id), body).await;
        assert!(matches!(result, Err(GateError::Store(_))));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_replay_single_winner() {
        let (gate, _, config) = default_gate();
        let gate = Arc::new(gate);
        let id = TimeUuidCodec::new().generate();
        let body = Bytes::from_static(br#"{"example":"data"}"#);
        let sig = sign(&config, Some(&id), &body);

        let attempts = (0..32).map(|_| {
            let gate = Arc::clone(&gate);
            let (sig, id, body) = (sig.clone(), id.clone(), body.clone());
            tokio::spawn(async move {
                gate.authenticate(Some(&sig), Some(&id), body)
                    .await
                    .unwrap()
                    .authenticated
            })
        });

        let results = futures::future::join_all(attempts).await;
        let winners = results.into_iter().filter(|r| *r.as_ref().unwrap()).count();
        assert_eq!(winners, 1);
    }

    #[test]
    fn test_pass_through_methods() {
        assert!(AuthenticationGate::is_pass_through(&Method::GET, None));
        assert!(AuthenticationGate::is_pass_through(&Method::DELETE, None));
        assert!(!AuthenticationGate::is_pass_through(&Method::GET, Some("sig")));
        assert!(!AuthenticationGate::is_pass_through(&Method::POST, None));
        assert!(!AuthenticationGate::is_pass_through(&Method::PUT, None));
    }

    #[test]
    fn test_media_only_for_authenticated() {
        let mut verdict = Verdict {
            authenticated: false,
            identifier: None,
            body: Bytes::from_static(br#"{"example":"data"}"#),
            media: None,
        };
        verdict.decode_media(None);
        assert!(verdict.media.is_none());

        verdict.authenticated = true;
        verdict.decode_media(Some("application/json; charset=utf-8"));
        assert_eq!(verdict.media, Some(serde_json::json!({"example": "data"})));
    }

    #[test]
    fn test_media_decode_failure_keeps_verdict() {
        let mut verdict = Verdict {
            authenticated: true,
            identifier: None,
            body: Bytes::from_static(b"not json"),
            media: None,
        };
        verdict.decode_media(None);
        assert!(verdict.authenticated);
        assert!(verdict.media.is_none());

        let mut verdict = Verdict {
            authenticated: true,
            identifier: None,
            body: Bytes::from_static(b"{}"),
            media: None,
        };
        verdict.decode_media(Some("text/plain"));
        assert!(verdict.media.is_none());
    }

    #[test]
    fn test_bypass_is_authenticated() {
        let config = AuthConfig {
            debug_bypass: true,
            ..AuthConfig::with_secret(SECRET)
        };
        let gate =
            AuthenticationGate::new(&config, Some(Arc::new(MemoryReplayStore::new()))).unwrap();
        assert!(gate.debug_bypass());
        let verdict = gate.bypass(None, Bytes::new());
        assert!(verdict.authenticated);
        assert!(verdict.identifier.is_some());
    }
}
