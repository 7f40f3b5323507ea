//! Request identifiers: creation timestamp plus uniqueness token.
//!
//! An identifier is valid while `now - issued_at < expiry` and only until it
//! has been consumed once. Consumption is recorded in the [`ReplayStore`]
//! under `{nonce_prefix}.{token}` for twice the expiry window, absorbing
//! clock skew between signer and verifier.

use chrono::{DateTime, TimeDelta, Utc};
use std::sync::Arc;
use std::time::Duration;
use uuid::{Context, Timestamp, Uuid, Version};

use super::error::StoreError;
use super::replay_store::ReplayStore;

/// Source of the current time.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Decomposed identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedIdentifier {
    pub issued_at: DateTime<Utc>,
    /// Canonical form used for replay bookkeeping
    pub token: String,
}

/// Identifier format: parse into timestamp + token, and mint new ones.
pub trait IdentifierCodec: Send + Sync {
    fn parse(&self, identifier: &str) -> Option<ParsedIdentifier>;
    fn generate(&self) -> String;
}

/// Time-based UUIDs.
///
/// Parses v1, v6 and v7; generates v1, the form existing clients send.
#[derive(Debug, Clone)]
pub struct TimeUuidCodec {
    node_id: [u8; 6],
}

impl TimeUuidCodec {
    /// Codec with a random node id (multicast bit set, per RFC 4122 4.5).
    pub fn new() -> Self {
        let random = Uuid::new_v4();
        let mut node_id = [0u8; 6];
        node_id.copy_from_slice(&random.as_bytes()[..6]);
        node_id[0] |= 0x01;
        Self { node_id }
    }

    pub fn with_node_id(node_id: [u8; 6]) -> Self {
        Self { node_id }
    }

    /// v1 UUID stamped with `at`.
    pub fn encode_at(&self, at: DateTime<Utc>) -> String {
        let seconds = u64::try_from(at.timestamp()).unwrap_or(0);
        let ts = Timestamp::from_unix(Context::new(0), seconds, at.timestamp_subsec_nanos());
        Uuid::new_v1(ts, &self.node_id).to_string()
    }
}

impl Default for TimeUuidCodec {
    fn default() -> Self {
        Self::new()
    }
}

/// 100ns ticks between 1582-10-15 and 1970-01-01.
const GREGORIAN_UNIX_OFFSET: u64 = 0x01B2_1DD2_1381_4000;

/// 60-bit Gregorian tick count of a v1 or v6 UUID.
fn gregorian_ticks(uuid: &Uuid) -> Option<u64> {
    let (d1, d2, d3, _) = uuid.as_fields();
    let (d1, d2, d3) = (u64::from(d1), u64::from(d2), u64::from(d3 & 0x0fff));
    match uuid.get_version()? {
        Version::Mac => Some(d3 << 48 | d2 << 32 | d1),
        Version::SortMac => Some(d1 << 28 | d2 << 12 | d3),
        _ => None,
    }
}

/// Issue time of a time-based UUID. Gregorian stamps before the Unix epoch
/// yield `None`.
fn uuid_issued_at(uuid: &Uuid) -> Option<DateTime<Utc>> {
    if let Some(ticks) = gregorian_ticks(uuid) {
        let since_epoch = ticks.checked_sub(GREGORIAN_UNIX_OFFSET)?;
        let seconds = i64::try_from(since_epoch / 10_000_000).ok()?;
        let nanos = u32::try_from(since_epoch % 10_000_000).ok()? * 100;
        return DateTime::from_timestamp(seconds, nanos);
    }
    let (seconds, nanos) = uuid.get_timestamp()?.to_unix();
    DateTime::from_timestamp(i64::try_from(seconds).ok()?, nanos)
}

impl IdentifierCodec for TimeUuidCodec {
    fn parse(&self, identifier: &str) -> Option<ParsedIdentifier> {
        let uuid = Uuid::parse_str(identifier).ok()?;
        let issued_at = uuid_issued_at(&uuid)?;
        Some(ParsedIdentifier {
            issued_at,
            token: uuid.hyphenated().to_string(),
        })
    }

    fn generate(&self) -> String {
        Uuid::now_v1(&self.node_id).to_string()
    }
}

/// Freshness and single-use validation of request identifiers.
pub struct RequestIdentifier {
    codec: Arc<dyn IdentifierCodec>,
    store: Arc<dyn ReplayStore>,
    clock: Arc<dyn Clock>,
    expiry: TimeDelta,
    retention: Duration,
    nonce_prefix: String,
}

impl RequestIdentifier {
    pub fn new(
        store: Arc<dyn ReplayStore>,
        expiry_seconds: u64,
        nonce_prefix: impl Into<String>,
    ) -> Self {
        let expiry = i64::try_from(expiry_seconds)
            .ok()
            .and_then(TimeDelta::try_seconds)
            .unwrap_or(TimeDelta::MAX);
        Self {
            codec: Arc::new(TimeUuidCodec::new()),
            store,
            clock: Arc::new(SystemClock),
            expiry,
            retention: Duration::from_secs(expiry_seconds.saturating_mul(2)),
            nonce_prefix: nonce_prefix.into(),
        }
    }

    pub fn with_codec(mut self, codec: Arc<dyn IdentifierCodec>) -> Self {
        self.codec = codec;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn parse(&self, identifier: &str) -> Option<ParsedIdentifier> {
        self.codec.parse(identifier)
    }

    pub fn generate(&self) -> String {
        self.codec.generate()
    }

    /// Strictly inside the window: an identifier exactly `expiry` old is stale.
    ///
    /// Identifiers stamped in the future are tolerated up to one window
    /// ahead, so a consumed identifier's replay entry always outlives its
    /// freshness.
    pub fn is_fresh(&self, parsed: &ParsedIdentifier) -> bool {
        let age = self.clock.now() - parsed.issued_at;
        age < self.expiry && -age <= self.expiry
    }

    pub fn replay_key(&self, token: &str) -> String {
        format!("{}.{}", self.nonce_prefix, token)
    }

    /// How long a consumed identifier stays recorded.
    pub fn retention(&self) -> Duration {
        self.retention
    }

    fn key_for(&self, identifier: &str) -> String {
        match self.codec.parse(identifier) {
            Some(parsed) => self.replay_key(&parsed.token),
            None => self.replay_key(identifier),
        }
    }

    /// Whether the identifier has already been consumed.
    pub async fn is_used(&self, identifier: &str) -> Result<bool, StoreError> {
        self.store.exists(&self.key_for(identifier)).await
    }

    /// Record the identifier as consumed, unconditionally.
    pub async fn mark_used(&self, identifier: &str) -> Result<(), StoreError> {
        self.store
            .set_with_ttl(&self.key_for(identifier), identifier, self.retention)
            .await
    }

    /// Validate and consume in one step.
    ///
    /// Malformed or expired identifiers are rejected before the store is
    /// touched. The uniqueness check and the mark-used write are a single
    /// atomic `set_if_absent_with_ttl`, so of several concurrent requests
    /// bearing the same identifier at most one gets `true`.
    pub async fn validate(&self, identifier: &str) -> Result<bool, StoreError> {
        let Some(parsed) = self.codec.parse(identifier) else {
            tracing::debug!("[IDENT] Malformed identifier rejected");
            return Ok(false);
        };

        if !self.is_fresh(&parsed) {
            tracing::debug!("[IDENT] Expired identifier rejected: {}", parsed.token);
            return Ok(false);
        }

        let key = self.replay_key(&parsed.token);
        let claimed = self
            .store
            .set_if_absent_with_ttl(&key, identifier, self.retention)
            .await?;
        if !claimed {
            tracing::debug!("[IDENT] Reused identifier rejected: {}", parsed.token);
        }
        Ok(claimed)
    }
}

/// Clock pinned to a settable instant.
#[cfg(test)]
pub(crate) struct FixedClock(std::sync::Mutex<DateTime<Utc>>);

#[cfg(test)]
impl FixedClock {
    pub(crate) fn new(at: DateTime<Utc>) -> Self {
        Self(std::sync::Mutex::new(at))
    }

    pub(crate) fn set(&self, at: DateTime<Utc>) {
        *self.0.lock().unwrap() = at;
    }
}

#[cfg(test)]
impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.0.lock().unwrap()
    }
}
