// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! HMAC-SHA256 signing of request bodies with a shared secret.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::fmt::Debug;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the hex encoded signature of the request body.
pub const SIGNATURE_HEADER: &str = "HashSHA256";

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SignatureError {
    #[error("signing key is empty")]
    EmptyKey,
    #[error("signing key was rejected: {0}")]
    InvalidKey(String),
}

#[derive(Clone)]
pub struct Signer {
    mac: HmacSha256,
}

impl Signer {
    pub fn new(key: impl AsRef<[u8]>) -> Result<Self, SignatureError> {
        let key = key.as_ref();
        if key.is_empty() {
            return Err(SignatureError::EmptyKey);
        }
        let mac = HmacSha256::new_from_slice(key)
            .map_err(|e| SignatureError::InvalidKey(e.to_string()))?;
        Ok(Self { mac })
    }

    /// Hex encoded HMAC of `body`.
    pub fn sign(&self, body: &[u8]) -> String {
        let mut mac = self.mac.clone();
        mac.update(body);
        hex::encode(mac.finalize().into_bytes())
    }

    /// Checks a hex signature against `body` in constant time.
    pub fn verify(&self, body: &[u8], signature: &str) -> bool {
        let Ok(expected) = hex::decode(signature.trim()) else {
            return false;
        };
        let mut mac = self.mac.clone();
        mac.update(body);
        mac.verify_slice(&expected).is_ok()
    }
}

impl Debug for Signer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Signer").field("key", &"[REDACTED]").finish()
    }
}
