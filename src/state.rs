/*
 * Responsibility
 * - Router に紐づける共有コンテキスト (AppState)
 *   - forward_auth: 判定サービス (verifier / cache / アプリ設定を内包)
 * - Clone 前提で持つ (内部は Arc/Clone cheap)
 */
use std::sync::Arc;

use crate::services::forward_auth::ForwardAuthService;

#[derive(Clone, Debug)]
pub struct AppState {
    pub forward_auth: Arc<ForwardAuthService>,
    /// Adds `Secure` to cookies set by this service.
    pub secure_cookies: bool,
}

impl AppState {
    pub fn new(forward_auth: Arc<ForwardAuthService>, secure_cookies: bool) -> Self {
        Self {
            forward_auth,
            secure_cookies,
        }
    }
}
