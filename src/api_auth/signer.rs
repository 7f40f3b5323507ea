//! HMAC request signing.
//!
//! Wire contract: the identifier (UTF-8, when required) is concatenated with
//! the raw body bytes, no delimiter, and HMAC'd with the shared secret. The
//! digest travels as standard padded Base64 or lowercase hex, optionally
//! behind a literal prefix such as `sha1=`.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha1::Sha1;
use sha2::Sha256;
use subtle::ConstantTimeEq;

use super::error::ConfigError;
use crate::config::AuthConfig;

/// Hash function underneath the HMAC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    Sha256,
    Sha1,
}

/// Text encoding of the raw digest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DigestEncoding {
    Base64,
    Hex,
}

impl DigestEncoding {
    pub fn encode(self, raw: &[u8]) -> String {
        match self {
            Self::Base64 => STANDARD.encode(raw),
            Self::Hex => hex::encode(raw),
        }
    }
}

/// Keyed digest over `payload`.
pub fn sign(secret: &[u8], payload: &[u8], hash: HashAlgorithm) -> Vec<u8> {
    match hash {
        HashAlgorithm::Sha256 => {
            let mut mac = Hmac::<Sha256>::new_from_slice(secret)
                .expect("HMAC accepts any key length");
            mac.update(payload);
            mac.finalize().into_bytes().to_vec()
        }
        HashAlgorithm::Sha1 => {
            let mut mac =
                Hmac::<Sha1>::new_from_slice(secret).expect("HMAC accepts any key length");
            mac.update(payload);
            mac.finalize().into_bytes().to_vec()
        }
    }
}

/// Bytes covered by the signature.
///
/// `Some(identifier)` only when identifiers are part of the protocol.
pub fn signing_payload(identifier: Option<&str>, body: &[u8]) -> Vec<u8> {
    match identifier {
        Some(id) => {
            let mut payload = Vec::with_capacity(id.len() + body.len());
            payload.extend_from_slice(id.as_bytes());
            payload.extend_from_slice(body);
            payload
        }
        None => body.to_vec(),
    }
}

/// Stateless signer bound to one secret and one output format.
#[derive(Clone)]
pub struct Signer {
    secret: Vec<u8>,
    hash: HashAlgorithm,
    encoding: DigestEncoding,
    prefix: String,
}

impl Signer {
    pub fn new(
        secret: &[u8],
        hash: HashAlgorithm,
        encoding: DigestEncoding,
    ) -> Result<Self, ConfigError> {
        if secret.is_empty() {
            return Err(ConfigError::MissingSecret);
        }
        Ok(Self {
            secret: secret.to_vec(),
            hash,
            encoding,
            prefix: String::new(),
        })
    }

    pub fn from_config(config: &AuthConfig) -> Result<Self, ConfigError> {
        Ok(Self::new(config.secret_bytes()?, config.hash, config.digest)?
            .with_prefix(config.signature_prefix.clone()))
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub fn sign(&self, payload: &[u8]) -> Vec<u8> {
        sign(&self.secret, payload, self.hash)
    }

    /// Transport form of the signature: prefix followed by the encoded digest.
    pub fn signature(&self, payload: &[u8]) -> String {
        let encoded = self.encoding.encode(&self.sign(payload));
        format!("{}{}", self.prefix, encoded)
    }

    /// Constant-time check of a transport signature.
    ///
    /// Length mismatch yields `false` without an early exit on content.
    pub fn verify(&self, payload: &[u8], provided: &str) -> bool {
        let expected = self.signature(payload);
        expected.as_bytes().ct_eq(provided.as_bytes()).into()
    }
}

impl std::fmt::Debug for Signer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Signer")
            .field("hash", &self.hash)
            .field("encoding", &self.encoding)
            .field("prefix", &self.prefix)
            .finish_non_exhaustive()
    }
}
