/*
 * Responsibility
 * - Handler から見える「認証結果」の型
 * - middleware が token を検証して request extensions に格納し、handler はこの型だけを受け取る
 *
 * Notes
 * - anonymous でも格納される (認可判定は handler 側で行うため)
 */
use crate::services::forward_auth::Authentication;
use crate::services::user::AuthenticatedUser;

#[derive(Debug, Clone)]
pub struct AuthCtx {
    pub authentication: Authentication,
}

impl AuthCtx {
    pub fn new(authentication: Authentication) -> Self {
        Self { authentication }
    }

    pub fn user(&self) -> Option<&AuthenticatedUser> {
        self.authentication.user()
    }
}
