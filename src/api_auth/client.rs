//! Client-side signing of outgoing requests.
//!
//! 1. mint a time-based identifier (when identifiers are required)
//! 2. concatenate identifier and body bytes
//! 3. HMAC with the shared secret and encode per config

use axum::http::header::InvalidHeaderValue;
use axum::http::{HeaderMap, HeaderName, HeaderValue};
use std::sync::Arc;

use super::error::ConfigError;
use super::identifier::{IdentifierCodec, TimeUuidCodec};
use super::signer::{Signer, signing_payload};
use crate::config::AuthConfig;

/// Header values for one signed request.
#[derive(Debug, Clone)]
pub struct SignedHeaders {
    pub signature_header: HeaderName,
    pub signature: String,
    pub identifier_header: HeaderName,
    pub identifier: Option<String>,
}

impl SignedHeaders {
    pub fn to_header_map(&self) -> Result<HeaderMap, InvalidHeaderValue> {
        let mut headers = HeaderMap::new();
        headers.insert(
            self.signature_header.clone(),
            HeaderValue::from_str(&self.signature)?,
        );
        if let Some(id) = &self.identifier {
            headers.insert(self.identifier_header.clone(), HeaderValue::from_str(id)?);
        }
        Ok(headers)
    }
}

/// Produces the headers an [`AuthenticationGate`] with the same config accepts.
///
/// [`AuthenticationGate`]: super::gate::AuthenticationGate
pub struct RequestSigner {
    signer: Signer,
    codec: Arc<dyn IdentifierCodec>,
    identifier_required: bool,
    signature_header: HeaderName,
    identifier_header: HeaderName,
}

impl RequestSigner {
    pub fn new(config: &AuthConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            signer: Signer::from_config(config)?,
            codec: Arc::new(TimeUuidCodec::new()),
            identifier_required: config.identifier_required,
            signature_header: config.signature_header()?,
            identifier_header: config.identifier_header()?,
        })
    }

    pub fn with_codec(mut self, codec: Arc<dyn IdentifierCodec>) -> Self {
        self.codec = codec;
        self
    }

    /// Sign `body`, minting a fresh identifier when required.
    pub fn sign(&self, body: &[u8]) -> SignedHeaders {
        let identifier = self.identifier_required.then(|| self.codec.generate());
        self.sign_with_identifier(identifier.as_deref(), body)
    }

    /// Sign `body` with a caller-chosen identifier.
    ///
    /// The identifier only enters the payload when identifiers are required.
    pub fn sign_with_identifier(&self, identifier: Option<&str>, body: &[u8]) -> SignedHeaders {
        let covered = if self.identifier_required {
            Some(identifier.unwrap_or_default())
        } else {
            None
        };
        let signature = self.signer.signature(&signing_payload(covered, body));
        SignedHeaders {
            signature_header: self.signature_header.clone(),
            signature,
            identifier_header: self.identifier_header.clone(),
            identifier: identifier.map(str::to_string),
        }
    }
}
