/*
 * Responsibility
 * - アプリケーション単位の認可ポリシー (audience / client id / scope / callback など)
 * - Host 名からのアプリ解決と、未設定項目の default からの継承
 */
use serde::{Deserialize, Serialize};

pub const DEFAULT_SCOPE: &str = "profile openid email";
pub const DEFAULT_RESTRICTED_METHODS: &[&str] =
    &["DELETE", "GET", "HEAD", "OPTIONS", "PATCH", "POST", "PUT"];

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ApplicationPolicy {
    pub name: String,
    pub audience: String,
    pub client_id: String,
    pub scope: String,
    /// Callback URL of the login flow; requests under it are never restricted.
    pub redirect_uri: String,
    pub token_cookie_domain: String,
    pub restricted_methods: Vec<String>,
    pub required_permissions: Vec<String>,
    /// Id-token claims surfaced as user attributes.
    pub claims: Vec<String>,
}

impl ApplicationPolicy {
    pub fn is_restricted_method(&self, method: &str) -> bool {
        self.restricted_methods
            .iter()
            .any(|m| m.eq_ignore_ascii_case(method))
    }

    fn inherit_from(mut self, default: &ApplicationPolicy) -> Self {
        fn text(value: &mut String, fallback: &str) {
            if value.is_empty() {
                *value = fallback.to_string();
            }
        }
        fn list(value: &mut Vec<String>, fallback: &[String]) {
            if value.is_empty() {
                *value = fallback.to_vec();
            }
        }

        text(&mut self.audience, &default.audience);
        text(&mut self.client_id, &default.client_id);
        text(&mut self.scope, &default.scope);
        text(&mut self.redirect_uri, &default.redirect_uri);
        text(&mut self.token_cookie_domain, &default.token_cookie_domain);
        list(&mut self.restricted_methods, &default.restricted_methods);
        list(&mut self.required_permissions, &default.required_permissions);
        list(&mut self.claims, &default.claims);
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct ForwardAuthSettings {
    pub default: ApplicationPolicy,
    pub apps: Vec<ApplicationPolicy>,
}

impl ForwardAuthSettings {
    /// Application whose name matches `host` (case-insensitive), else the default application.
    pub fn find_application_or_default(&self, host: Option<&str>) -> ApplicationPolicy {
        let Some(host) = host.filter(|h| !h.is_empty()) else {
            return self.default.clone();
        };

        self.apps
            .iter()
            .find(|app| app.name.eq_ignore_ascii_case(host))
            .map(|app| app.clone().inherit_from(&self.default))
            .unwrap_or_else(|| self.default.clone())
    }
}
