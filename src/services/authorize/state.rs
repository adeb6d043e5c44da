use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::nonce::Nonce;
use super::requested_url::RequestedUrl;

#[derive(Debug, Error)]
pub enum StateError {
    #[error("state is not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("state is not valid json: {0}")]
    Json(#[from] serde_json::Error),
}

/// Request context carried through the identity provider as the OAuth2 `state` parameter.
///
/// Encoding is JSON then standard base64. It proves nothing on its own; the nonce
/// must still be matched against the cookie on callback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorizeState {
    pub origin_url: RequestedUrl,
    pub nonce: Nonce,
}

impl AuthorizeState {
    pub fn new(origin_url: RequestedUrl, nonce: Nonce) -> Self {
        Self { origin_url, nonce }
    }

    pub fn encode(&self) -> Result<String, StateError> {
        let json = serde_json::to_vec(self)?;
        Ok(STANDARD.encode(json))
    }

    pub fn decode(encoded: &str) -> Result<Self, StateError> {
        let json = STANDARD.decode(encoded.trim())?;
        Ok(serde_json::from_slice(&json)?)
    }
}
