use std::fmt;
use std::sync::Arc;

use jsonwebtoken::{Validation, decode, decode_header};
use serde_json::{Map, Value};

use super::{VerificationCache, VerifyError, algorithm};
use crate::services::clock::Clock;
use crate::services::keys::KeyProvider;
use crate::services::token::{Claims, Token, VerifiedToken, fingerprint};

/// Classifies raw credentials and verifies JWTs against the issuer's signing keys.
///
/// Verification never fails outward: every problem becomes `Token::Invalid(reason)`.
#[derive(Clone)]
pub struct TokenVerifier {
    issuer: String,
    keys: Arc<dyn KeyProvider>,
    cache: Arc<dyn VerificationCache>,
    clock: Arc<dyn Clock>,
}

impl TokenVerifier {
    pub fn new(
        issuer: impl Into<String>,
        keys: Arc<dyn KeyProvider>,
        cache: Arc<dyn VerificationCache>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            issuer: issuer.into(),
            keys,
            cache,
            clock,
        }
    }

    pub fn cache(&self) -> &Arc<dyn VerificationCache> {
        &self.cache
    }

    pub async fn verify(&self, raw: Option<&str>, expected_audience: &str) -> Token {
        let raw = match raw.map(str::trim) {
            None | Some("") => return Token::NoToken,
            Some(raw) => raw,
        };

        if raw.matches('.').count() != 2 {
            return Token::Opaque(raw.to_string());
        }

        let claims = match self.cache.get(raw) {
            Some(claims) => claims,
            None => match self.decode(raw).await {
                Ok(claims) => {
                    self.cache.insert(raw, claims.clone());
                    claims
                }
                Err(err) => return self.reject(raw, err),
            },
        };

        // cache hit でも aud / exp は毎回見る
        if let Err(err) = self.check(&claims, expected_audience) {
            return self.reject(raw, err);
        }

        Token::Verified(VerifiedToken::new(raw, claims))
    }

    async fn decode(&self, raw: &str) -> Result<Arc<Claims>, VerifyError> {
        let header = decode_header(raw)?;
        algorithm::ensure_accepted(header.alg)?;
        let kid = header.kid.ok_or(VerifyError::MissingKeyId)?;
        let key = self.keys.signing_key(&kid).await?;

        let mut validation = Validation::new(header.alg);
        validation.set_issuer(&[self.issuer.as_str()]);
        validation.set_required_spec_claims(&["exp", "iss", "sub"]);
        validation.validate_aud = false;
        validation.validate_exp = false;

        let data = decode::<Map<String, Value>>(raw, key.as_ref(), &validation)?;
        Ok(Arc::new(Claims::from_map(data.claims)?))
    }

    fn check(&self, claims: &Claims, expected_audience: &str) -> Result<(), VerifyError> {
        if !claims.has_audience(expected_audience) {
            return Err(VerifyError::AudienceMismatch(expected_audience.to_string()));
        }
        if claims.expires_at < self.clock.now() {
            return Err(VerifyError::Expired(claims.expires_at));
        }
        Ok(())
    }

    fn reject(&self, raw: &str, err: VerifyError) -> Token {
        self.cache.invalidate(raw);
        tracing::warn!(
            token = %fingerprint(raw),
            error = %err,
            "token verification failed"
        );
        Token::Invalid(err.to_string())
    }
}

impl fmt::Debug for TokenVerifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenVerifier")
            .field("issuer", &self.issuer)
            .field("cached", &self.cache.len())
            .finish()
    }
}
