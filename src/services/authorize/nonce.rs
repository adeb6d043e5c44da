use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

const NONCE_BYTES: usize = 16;

#[derive(Debug, Error)]
#[error("nonce generation failed: {0}")]
pub struct NonceError(String);

/// One-time value binding a login redirect to the browser that started it.
///
/// 128 bits from the OS RNG, rendered as lowercase hex.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Nonce(String);

impl Nonce {
    pub fn generate() -> Result<Self, NonceError> {
        let mut bytes = [0u8; NONCE_BYTES];
        getrandom::fill(&mut bytes).map_err(|e| NonceError(e.to_string()))?;
        Ok(Self(hex::encode(bytes)))
    }

    pub fn from_cookie(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Nonce {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
