use thiserror::Error;

use super::nonce::Nonce;
use super::state::{AuthorizeState, StateError};

#[derive(Debug, Error)]
pub enum CallbackError {
    #[error("state parameter is missing")]
    MissingState,
    #[error(transparent)]
    MalformedState(#[from] StateError),
    #[error("nonce cookie is missing")]
    MissingNonce,
    #[error("nonce does not match")]
    NonceMismatch,
}

/// Checks the `state` returned by the identity provider against the nonce cookie set at redirect.
///
/// Library API for the sign-in callback handler. This service does not serve the callback
/// itself; the handler that exchanges the code calls this first and maps `CallbackError`
/// through `AppError` (400).
///
/// Every failure is a hard rejection; there is no fallback redirect.
pub fn verify_callback(
    state: Option<&str>,
    nonce_cookie: Option<&str>,
) -> Result<AuthorizeState, CallbackError> {
    let state = state
        .filter(|s| !s.is_empty())
        .ok_or(CallbackError::MissingState)?;
    let decoded = AuthorizeState::decode(state)?;

    let cookie = nonce_cookie
        .filter(|n| !n.is_empty())
        .map(Nonce::from_cookie)
        .ok_or(CallbackError::MissingNonce)?;

    if decoded.nonce != cookie {
        tracing::warn!(origin = %decoded.origin_url, "callback nonce mismatch");
        return Err(CallbackError::NonceMismatch);
    }
    Ok(decoded)
}
