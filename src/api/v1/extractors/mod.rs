/*
 * Responsibility
 * - handler 向けの extractor 群
 *   - AuthCtx: middleware が格納した認証結果
 *   - Forwarded: reverse proxy が付けた X-Forwarded-* と API 判定
 */
mod auth_ctx;
mod forwarded;

pub use auth_ctx::{AuthCtx, AuthCtxExtractor};
pub use forwarded::Forwarded;
