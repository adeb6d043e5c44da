/*
 * Responsibility
 * - 認証済みユーザーの表現 (anonymous は AuthenticationEvent 側で表す)
 * - user-info (x-forwardauth-* header / GET /userinfo の元データ) の組み立て
 */
use std::collections::BTreeMap;

use serde::Serialize;

use crate::services::token::VerifiedToken;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuthenticatedUser {
    pub subject: String,
    pub userinfo: BTreeMap<String, String>,
    #[serde(skip)]
    pub access_token: VerifiedToken,
    #[serde(skip)]
    pub id_token: VerifiedToken,
}

impl AuthenticatedUser {
    pub fn new(access_token: VerifiedToken, id_token: VerifiedToken, claims: &[String]) -> Self {
        Self {
            subject: access_token.subject().to_string(),
            userinfo: userinfo(&access_token, &id_token, claims),
            access_token,
            id_token,
        }
    }
}

/// `sub` from the access token plus the allow-listed id-token claims, string-coerced.
pub fn userinfo(
    access_token: &VerifiedToken,
    id_token: &VerifiedToken,
    claims: &[String],
) -> BTreeMap<String, String> {
    let mut info = BTreeMap::new();
    for name in claims {
        if let Some(value) = id_token.claim(name).and_then(|v| v.stringify()) {
            info.insert(name.clone(), value);
        }
    }
    info.insert("sub".to_string(), access_token.subject().to_string());
    info
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::services::testutil;

    #[test]
    fn userinfo_keeps_only_allow_listed_claims() {
        let access = testutil::verified("user-1", json!({}));
        let id = testutil::verified(
            "user-1",
            json!({
                "email": "a@example.com",
                "email_verified": true,
                "groups": ["admin", "dev"],
                "logins": 3,
                "address": {"country": "SE"},
                "nickname": "secret",
            }),
        );
        let allow: Vec<String> = ["email", "email_verified", "groups", "logins", "address", "missing"]
            .into_iter()
            .map(String::from)
            .collect();

        let info = userinfo(
            access.verified().unwrap(),
            id.verified().unwrap(),
            &allow,
        );

        assert_eq!(info.get("sub").map(String::as_str), Some("user-1"));
        assert_eq!(info.get("email").map(String::as_str), Some("a@example.com"));
        assert_eq!(info.get("email_verified").map(String::as_str), Some("true"));
        assert_eq!(info.get("groups").map(String::as_str), Some("admin, dev"));
        assert_eq!(info.get("logins").map(String::as_str), Some("3"));
        assert!(!info.contains_key("address"));
        assert!(!info.contains_key("nickname"));
        assert!(!info.contains_key("missing"));
    }
}
