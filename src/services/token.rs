/*
 * Responsibility
 * - Token の分類 (NoToken / Opaque / Invalid / Verified)
 * - 検証済み claim の保持と型付きアクセス (ClaimValue)
 * - ログ用の token fingerprint (生 token はログに出さない)
 */
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Credential classification produced by the verifier.
///
/// Only `Verified` carries claims that may be trusted.
#[derive(Clone, PartialEq)]
pub enum Token {
    NoToken,
    Opaque(String),
    Invalid(String),
    Verified(VerifiedToken),
}

impl Token {
    pub fn invalid(reason: impl Into<String>) -> Self {
        Self::Invalid(reason.into())
    }

    pub fn is_verified(&self) -> bool {
        matches!(self, Self::Verified(_))
    }

    pub fn verified(&self) -> Option<&VerifiedToken> {
        match self {
            Self::Verified(token) => Some(token),
            _ => None,
        }
    }
}

// raw token は Debug 出力にも出さない
impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoToken => f.write_str("NoToken"),
            Self::Opaque(raw) => f.debug_tuple("Opaque").field(&fingerprint(raw)).finish(),
            Self::Invalid(reason) => f.debug_tuple("Invalid").field(reason).finish(),
            Self::Verified(token) => f.debug_tuple("Verified").field(token).finish(),
        }
    }
}

/// A token whose signature, issuer, audience and expiry have been checked.
#[derive(Clone, PartialEq)]
pub struct VerifiedToken {
    raw: String,
    claims: Arc<Claims>,
}

impl VerifiedToken {
    pub fn new(raw: impl Into<String>, claims: Arc<Claims>) -> Self {
        Self {
            raw: raw.into(),
            claims,
        }
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn subject(&self) -> &str {
        &self.claims.subject
    }

    pub fn claim(&self, name: &str) -> Option<&ClaimValue> {
        self.claims.values.get(name)
    }

    /// `permissions` claim as a string list. `None` when absent or not a string array.
    pub fn permissions(&self) -> Option<Vec<String>> {
        match self.claim("permissions")? {
            ClaimValue::StringArray(values) => Some(values.clone()),
            _ => None,
        }
    }
}

impl fmt::Debug for VerifiedToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VerifiedToken")
            .field("fingerprint", &fingerprint(&self.raw))
            .field("subject", &self.claims.subject)
            .finish()
    }
}

/// Claim set decoded once after signature verification.
#[derive(Debug, Clone, PartialEq)]
pub struct Claims {
    pub subject: String,
    pub issuer: String,
    pub audience: Vec<String>,
    pub expires_at: DateTime<Utc>,
    pub values: BTreeMap<String, ClaimValue>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ClaimsError {
    #[error("missing claim: {0}")]
    Missing(&'static str),
    #[error("invalid claim: {0}")]
    Invalid(&'static str),
}

impl Claims {
    pub fn from_map(map: Map<String, Value>) -> Result<Self, ClaimsError> {
        let subject = match map.get("sub") {
            Some(Value::String(sub)) if !sub.is_empty() => sub.clone(),
            Some(_) => return Err(ClaimsError::Invalid("sub")),
            None => return Err(ClaimsError::Missing("sub")),
        };

        let issuer = match map.get("iss") {
            Some(Value::String(iss)) => iss.clone(),
            Some(_) => return Err(ClaimsError::Invalid("iss")),
            None => String::new(),
        };

        let audience = match map.get("aud") {
            Some(Value::String(aud)) => vec![aud.clone()],
            Some(Value::Array(items)) => items
                .iter()
                .map(|v| v.as_str().map(str::to_string))
                .collect::<Option<Vec<_>>>()
                .ok_or(ClaimsError::Invalid("aud"))?,
            Some(_) => return Err(ClaimsError::Invalid("aud")),
            None => Vec::new(),
        };

        let exp = map.get("exp").ok_or(ClaimsError::Missing("exp"))?;
        let exp = exp
            .as_i64()
            .or_else(|| exp.as_f64().map(|f| f as i64))
            .ok_or(ClaimsError::Invalid("exp"))?;
        let expires_at = DateTime::from_timestamp(exp, 0).ok_or(ClaimsError::Invalid("exp"))?;

        let values = map
            .into_iter()
            .map(|(name, value)| (name, ClaimValue::from(value)))
            .collect();

        Ok(Self {
            subject,
            issuer,
            audience,
            expires_at,
            values,
        })
    }

    pub fn has_audience(&self, expected: &str) -> bool {
        self.audience.iter().any(|aud| aud == expected)
    }
}

/// Claim value shape, decoded once from JSON.
#[derive(Debug, Clone, PartialEq)]
pub enum ClaimValue {
    String(String),
    StringArray(Vec<String>),
    Bool(bool),
    Integer(i64),
    Other(Value),
}

impl From<Value> for ClaimValue {
    fn from(value: Value) -> Self {
        match value {
            Value::String(s) => Self::String(s),
            Value::Bool(b) => Self::Bool(b),
            Value::Number(ref n) => match n.as_i64() {
                Some(i) => Self::Integer(i),
                None => Self::Other(value),
            },
            Value::Array(ref items) if items.iter().all(Value::is_string) => Self::StringArray(
                items
                    .iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect(),
            ),
            other => Self::Other(other),
        }
    }
}

impl ClaimValue {
    /// String form used for user-info attributes. `None` means the claim is omitted.
    pub fn stringify(&self) -> Option<String> {
        match self {
            Self::String(s) => Some(s.clone()),
            Self::StringArray(items) => Some(items.join(", ")),
            Self::Bool(b) => Some(b.to_string()),
            Self::Integer(i) => Some(i.to_string()),
            Self::Other(_) => None,
        }
    }
}

/// Short SHA-256 prefix of a raw token, safe to log.
pub fn fingerprint(raw: &str) -> String {
    let digest = Sha256::digest(raw.as_bytes());
    hex::encode(&digest[..6])
}
