/*
 * Responsibility
 * - GET /userinfo
 * - 認証済みユーザーの user-info を JSON で返す (anonymous / error は 401)
 */
use std::collections::BTreeMap;

use axum::Json;

use crate::api::v1::extractors::AuthCtxExtractor;
use crate::error::AppError;
use crate::services::authenticate::AuthenticationEvent;

pub async fn userinfo(
    AuthCtxExtractor(ctx): AuthCtxExtractor,
) -> Result<Json<BTreeMap<String, String>>, AppError> {
    match ctx.authentication.event {
        AuthenticationEvent::Authenticated(user) => Ok(Json(user.userinfo)),
        AuthenticationEvent::Anonymous { reason } | AuthenticationEvent::Error { reason } => {
            Err(AppError::Unauthorized(reason))
        }
    }
}
