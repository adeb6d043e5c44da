/*
 * Responsibility
 * - raw token → Token の分類と署名検証
 * - 検証結果の sliding TTL cache
 */
mod algorithm;
mod cache;
mod service;

use thiserror::Error;

pub use cache::{SlidingTtlCache, VerificationCache};
pub use service::TokenVerifier;

use crate::services::keys::KeyError;
use crate::services::token::ClaimsError;

/// Why a JWT-shaped token was classified `Invalid`. Rendered into the token's reason.
#[derive(Debug, Error)]
pub enum VerifyError {
    #[error("malformed token: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),
    #[error("unsupported token algorithm: {0:?}")]
    UnsupportedAlgorithm(jsonwebtoken::Algorithm),
    #[error("token header has no kid")]
    MissingKeyId,
    #[error(transparent)]
    Key(#[from] KeyError),
    #[error(transparent)]
    Claims(#[from] ClaimsError),
    #[error("token audience does not contain {0}")]
    AudienceMismatch(String),
    #[error("token expired at {0}")]
    Expired(chrono::DateTime<chrono::Utc>),
}
