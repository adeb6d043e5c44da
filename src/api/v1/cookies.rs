/*
 * Responsibility
 * - Cookie header からの値取り出しと Set-Cookie の組み立て
 *
 * Notes
 * - 扱うのは固定名の 3 つだけ (ACCESS_TOKEN / JWT_TOKEN / AUTH_NONCE)
 */
use std::time::Duration;

use axum::http::{HeaderMap, HeaderValue, header};

pub const ACCESS_TOKEN: &str = "ACCESS_TOKEN";
pub const ID_TOKEN: &str = "JWT_TOKEN";
pub const NONCE: &str = "AUTH_NONCE";

/// First non-empty value of cookie `name` across all `Cookie` headers.
pub fn get(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, value)| *key == name && !value.is_empty())
        .map(|(_, value)| value.trim_matches('"').to_string())
}

pub fn nonce_cookie(
    nonce: &str,
    domain: &str,
    max_age: Duration,
    secure: bool,
) -> Option<HeaderValue> {
    let mut cookie = format!("{NONCE}={nonce}");
    if !domain.is_empty() {
        cookie.push_str(&format!("; Domain={domain}"));
    }
    cookie.push_str(&format!(
        "; Path=/; Max-Age={}; HttpOnly; SameSite=Lax",
        max_age.as_secs()
    ));
    if secure {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_named_cookie_among_others() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("theme=dark; JWT_TOKEN=a.b.c; ACCESS_TOKEN="),
        );
        headers.append(header::COOKIE, HeaderValue::from_static("ACCESS_TOKEN=x.y.z"));

        assert_eq!(get(&headers, ID_TOKEN).as_deref(), Some("a.b.c"));
        assert_eq!(get(&headers, ACCESS_TOKEN).as_deref(), Some("x.y.z"));
        assert_eq!(get(&headers, NONCE), None);
    }

    #[test]
    fn nonce_cookie_attributes() {
        let cookie = nonce_cookie("abc", "example.com", Duration::from_secs(60), true).unwrap();
        assert_eq!(
            cookie.to_str().unwrap(),
            "AUTH_NONCE=abc; Domain=example.com; Path=/; Max-Age=60; HttpOnly; SameSite=Lax; Secure"
        );

        let cookie = nonce_cookie("abc", "", Duration::from_secs(30), false).unwrap();
        assert_eq!(
            cookie.to_str().unwrap(),
            "AUTH_NONCE=abc; Path=/; Max-Age=30; HttpOnly; SameSite=Lax"
        );
    }
}
