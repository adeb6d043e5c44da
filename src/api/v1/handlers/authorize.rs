/*
 * Responsibility
 * - GET /authorize (reverse proxy の forward-auth 先)
 * - 認可結果を HTTP に写す
 *   - granted  → 204 + Authorization / x-forwardauth-* header
 *   - redirect → 307 + Location + AUTH_NONCE cookie
 *   - denied   → 403
 *   - error    → 401
 */
use axum::{
    extract::State,
    http::{HeaderMap, HeaderName, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};

use crate::api::v1::cookies;
use crate::api::v1::extractors::{AuthCtxExtractor, Forwarded};
use crate::error::AppError;
use crate::services::forward_auth::AuthorizeEvent;
use crate::services::user::AuthenticatedUser;
use crate::state::AppState;

pub const USERINFO_HEADER_PREFIX: &str = "x-forwardauth-";

pub async fn authorize(
    State(state): State<AppState>,
    AuthCtxExtractor(ctx): AuthCtxExtractor,
    forwarded: Forwarded,
) -> Result<Response, AppError> {
    let event = state.forward_auth.authorize(
        &ctx.authentication,
        &forwarded.requested_url,
        forwarded.is_api,
    );

    match event {
        AuthorizeEvent::AccessGranted { user } => {
            tracing::info!(
                url = %forwarded.requested_url,
                method = %forwarded.requested_url.method,
                subject = user.as_ref().map(|u| u.subject.as_str()).unwrap_or("-"),
                "access granted"
            );
            let headers = user.as_ref().map(upstream_headers).unwrap_or_default();
            Ok((StatusCode::NO_CONTENT, headers).into_response())
        }
        AuthorizeEvent::NeedRedirect {
            authorize_url,
            nonce,
            cookie_domain,
            max_age,
        } => {
            tracing::info!(url = %forwarded.requested_url, "redirecting to sign-in");
            let location =
                HeaderValue::from_str(authorize_url.as_str()).map_err(|_| AppError::Internal)?;
            let cookie = cookies::nonce_cookie(
                nonce.as_str(),
                &cookie_domain,
                max_age,
                state.secure_cookies,
            )
            .ok_or(AppError::Internal)?;

            let mut headers = HeaderMap::new();
            headers.insert(header::LOCATION, location);
            headers.insert(header::SET_COOKIE, cookie);
            Ok((StatusCode::TEMPORARY_REDIRECT, headers).into_response())
        }
        AuthorizeEvent::AccessDenied { reason } => {
            tracing::info!(url = %forwarded.requested_url, %reason, "access denied");
            Err(AppError::Forbidden(reason))
        }
        AuthorizeEvent::Error { reason } => {
            tracing::warn!(url = %forwarded.requested_url, %reason, "authorization error");
            Err(AppError::Unauthorized(reason))
        }
    }
}

/// Headers the proxy copies onto the upstream request.
/// `given_name` becomes `x-forwardauth-given-name`; claims whose name or value is not a valid header are skipped.
fn upstream_headers(user: &AuthenticatedUser) -> HeaderMap {
    let mut headers = HeaderMap::new();
    if let Ok(value) = HeaderValue::from_str(&format!("Bearer {}", user.access_token.raw())) {
        headers.insert(header::AUTHORIZATION, value);
    }
    for (claim, value) in &user.userinfo {
        let name = format!(
            "{USERINFO_HEADER_PREFIX}{}",
            claim.replace('_', "-").to_ascii_lowercase()
        );
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            (Ok(name), Ok(value)) => {
                headers.insert(name, value);
            }
            _ => tracing::debug!(%claim, "claim cannot be sent as a header"),
        }
    }
    headers
}
