/*
 * Responsibility
 * - reverse proxy (Traefik 等) が付ける X-Forwarded-* から元リクエストを復元する
 * - Accept / X-Requested-With から API 呼び出しかどうかを判定する
 */
use axum::extract::FromRequestParts;
use axum::http::{HeaderMap, header, request::Parts};

use crate::error::AppError;
use crate::services::authorize::RequestedUrl;

pub const X_FORWARDED_PROTO: &str = "x-forwarded-proto";
pub const X_FORWARDED_HOST: &str = "x-forwarded-host";
pub const X_FORWARDED_URI: &str = "x-forwarded-uri";
pub const X_FORWARDED_METHOD: &str = "x-forwarded-method";

/// 転送元リクエスト
#[derive(Debug, Clone)]
pub struct Forwarded {
    pub requested_url: RequestedUrl,
    pub is_api: bool,
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

fn is_api(headers: &HeaderMap) -> bool {
    let accepts = headers
        .get_all(header::ACCEPT)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .any(|v| v.contains("application/json") || v.contains("text/event-stream"));
    let xhr = header_str(headers, "x-requested-with")
        .is_some_and(|v| v.eq_ignore_ascii_case("XMLHttpRequest"));
    accepts || xhr
}

impl<S> FromRequestParts<S> for Forwarded
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let headers = &parts.headers;
        let required = |name: &'static str| {
            header_str(headers, name).ok_or_else(|| {
                AppError::bad_request("MISSING_FORWARDED_HEADER", format!("{name} is required"))
            })
        };

        let requested_url = RequestedUrl::new(
            required(X_FORWARDED_PROTO)?,
            required(X_FORWARDED_HOST)?,
            required(X_FORWARDED_URI)?,
            required(X_FORWARDED_METHOD)?.to_ascii_uppercase(),
        );

        Ok(Self {
            requested_url,
            is_api: is_api(headers),
        })
    }
}
