use std::sync::Arc;

use async_trait::async_trait;
use jsonwebtoken::DecodingKey;
use thiserror::Error;

// moka の try_get_with は Arc<E> を返すので Clone にしておく
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum KeyError {
    #[error("signing key not found for kid: {0}")]
    UnknownKeyId(String),
    #[error("jwks fetch failed: {0}")]
    Fetch(String),
    #[error("invalid jwks: {0}")]
    InvalidJwks(String),
}

/// Source of issuer signing keys, looked up by the JWT header `kid`.
#[async_trait]
pub trait KeyProvider: Send + Sync + 'static {
    async fn signing_key(&self, kid: &str) -> Result<Arc<DecodingKey>, KeyError>;
}
