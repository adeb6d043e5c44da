//! access token / id token 検証 → AuthCtx を extensions に入れる
//!
//! - access token は `Authorization: Bearer <jwt>`、なければ `ACCESS_TOKEN` cookie
//! - id token は `JWT_TOKEN` cookie
//! - アプリ設定は `X-Forwarded-Host`（なければ `Host`）で引く
//!
//! 認証に失敗しても request は止めない。anonymous / error も AuthCtx として渡し、
//! 許可するかどうかは handler (認可) が決める。

use axum::{
    Router,
    body::Body,
    extract::State,
    http::{HeaderMap, Request, header},
    middleware::{self, Next},
    response::Response,
};

use crate::api::v1::cookies;
use crate::api::v1::extractors::AuthCtx;
use crate::services::authenticate::AuthenticationEvent;
use crate::state::AppState;

/// 認証が必要な route に middleware を適用する。
///
/// 例：
/// ```ignore
/// let protected = middleware::auth::access::apply(protected, state.clone());
/// ```
pub fn apply(router: Router<AppState>, state: AppState) -> Router<AppState> {
    // axum 0.8 の from_fn は State extractor を受け取れないため、`from_fn_with_state` で明示的に state を渡す
    router.layer(middleware::from_fn_with_state(state, access_middleware))
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(|token| token.trim().to_string())
        .filter(|token| !token.is_empty())
}

fn forwarded_host(headers: &HeaderMap) -> Option<String> {
    headers
        .get("x-forwarded-host")
        .or_else(|| headers.get(header::HOST))
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim().to_string())
}

async fn access_middleware(
    State(state): State<AppState>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    let headers = req.headers();
    let access_token =
        bearer_token(headers).or_else(|| cookies::get(headers, cookies::ACCESS_TOKEN));
    let id_token = cookies::get(headers, cookies::ID_TOKEN);
    let host = forwarded_host(headers);

    let authentication = state
        .forward_auth
        .authenticate(access_token.as_deref(), id_token.as_deref(), host.as_deref())
        .await;

    match &authentication.event {
        AuthenticationEvent::Authenticated(user) => {
            tracing::debug!(subject = %user.subject, "request authenticated")
        }
        AuthenticationEvent::Anonymous { reason } => {
            tracing::debug!(%reason, "anonymous request")
        }
        AuthenticationEvent::Error { reason } => {
            tracing::warn!(%reason, "authentication error")
        }
    }

    // middleware → extractor への受け渡し
    req.extensions_mut().insert(AuthCtx::new(authentication));

    next.run(req).await
}
