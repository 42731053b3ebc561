//! Signed capability tokens for file downloads.
//!
//! A token certifies that the server issued it for one stored file and that
//! it has not expired. Whether the bearer may use it is decided by the
//! caller, which compares the owner claim with the live session.

use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::FileCategory;

pub const DEFAULT_LINK_TTL_SECONDS: i64 = 15 * 60;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TokenError {
    #[error("token has expired")]
    Expired,
    #[error("token signature does not match")]
    SignatureMismatch,
    #[error("token is malformed")]
    Malformed,
    #[error("token claims have the wrong shape")]
    WrongShape,
    #[error("failed to sign token: {0}")]
    Signing(String),
}

/// What a verified token certifies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapabilityClaims {
    pub file_id: i64,
    pub owner_id: i64,
    pub category: FileCategory,
    pub issued_for_admin: bool,
    pub issued_at: i64,
    pub expires_at: i64,
}

/// JWT body. `sub` carries the file id as a string.
#[derive(Debug, Serialize, Deserialize)]
struct TokenBody {
    sub: String,
    owner: i64,
    category: FileCategory,
    admin: bool,
    iat: i64,
    exp: i64,
}

#[derive(Clone)]
pub struct CapabilityTokenService {
    encoding: EncodingKey,
    decoding: DecodingKey,
    download_root: String,
}

impl CapabilityTokenService {
    pub fn new(secret: &str, download_root: &str) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            download_root: download_root.trim_end_matches('/').to_string(),
        }
    }

    pub fn issue(
        &self,
        file_id: i64,
        owner_id: i64,
        category: FileCategory,
        ttl_seconds: i64,
        issued_for_admin: bool,
    ) -> Result<String, TokenError> {
        let now = chrono::Utc::now().timestamp();
        self.issue_at(file_id, owner_id, category, ttl_seconds, issued_for_admin, now)
    }

    /// Issue a token as if it were `issued_at` (unix seconds).
    pub fn issue_at(
        &self,
        file_id: i64,
        owner_id: i64,
        category: FileCategory,
        ttl_seconds: i64,
        issued_for_admin: bool,
        issued_at: i64,
    ) -> Result<String, TokenError> {
        let body = TokenBody {
            sub: file_id.to_string(),
            owner: owner_id,
            category,
            admin: issued_for_admin,
            iat: issued_at,
            exp: issued_at + ttl_seconds,
        };

        encode(&Header::new(Algorithm::HS256), &body, &self.encoding)
            .map_err(|e| TokenError::Signing(e.to_string()))
    }

    pub fn verify(&self, token: &str) -> Result<CapabilityClaims, TokenError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp"]);

        let data = decode::<TokenBody>(token, &self.decoding, &validation).map_err(|e| {
            let error = match e.kind() {
                ErrorKind::ExpiredSignature => TokenError::Expired,
                ErrorKind::InvalidSignature => TokenError::SignatureMismatch,
                ErrorKind::Json(_) | ErrorKind::MissingRequiredClaim(_) => TokenError::WrongShape,
                _ => TokenError::Malformed,
            };
            log::debug!("Capability token rejected: {:?}", e);
            error
        })?;

        let body = data.claims;
        let file_id = body.sub.parse().map_err(|_| TokenError::WrongShape)?;

        Ok(CapabilityClaims {
            file_id,
            owner_id: body.owner,
            category: body.category,
            issued_for_admin: body.admin,
            issued_at: body.iat,
            expires_at: body.exp,
        })
    }

    /// Path a client follows to redeem `token`.
    pub fn download_url(&self, token: &str) -> String {
        format!("{}/{}", self.download_root, token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const SECRET: &str = "test-secret";

    fn service() -> CapabilityTokenService {
        CapabilityTokenService::new(SECRET, "/download/")
    }

    #[test]
    fn test_issue_and_verify() {
        let service = service();
        let token = service
            .issue(12, 7, FileCategory::Document, 60, true)
            .unwrap();
        let claims = service.verify(&token).unwrap();

        assert_eq!(claims.file_id, 12);
        assert_eq!(claims.owner_id, 7);
        assert_eq!(claims.category, FileCategory::Document);
        assert!(claims.issued_for_admin);
        assert_eq!(claims.expires_at - claims.issued_at, 60);
    }

    #[test]
    fn test_expired_token() {
        let service = service();
        let now = chrono::Utc::now().timestamp();
        let token = service
            .issue_at(1, 1, FileCategory::Attachment, 60, false, now - 120)
            .unwrap();

        assert_eq!(service.verify(&token), Err(TokenError::Expired));
    }

    #[test]
    fn test_foreign_signature() {
        let other = CapabilityTokenService::new("another-secret", "/download");
        let token = other.issue(1, 1, FileCategory::Document, 60, false).unwrap();

        assert_eq!(service().verify(&token), Err(TokenError::SignatureMismatch));
    }

    #[test]
    fn test_malformed_token() {
        assert_eq!(service().verify("not-a-token"), Err(TokenError::Malformed));
        assert_eq!(service().verify("a.b.c"), Err(TokenError::Malformed));
    }

    #[test]
    fn test_wrong_shape() {
        let key = EncodingKey::from_secret(SECRET.as_bytes());
        let exp = chrono::Utc::now().timestamp() + 60;

        let missing_fields =
            encode(&Header::default(), &json!({ "sub": "1", "exp": exp }), &key).unwrap();
        assert_eq!(service().verify(&missing_fields), Err(TokenError::WrongShape));

        let bad_subject = encode(
            &Header::default(),
            &json!({
                "sub": "file-one",
                "owner": 1,
                "category": "document",
                "admin": false,
                "iat": exp - 60,
                "exp": exp,
            }),
            &key,
        )
        .unwrap();
        assert_eq!(service().verify(&bad_subject), Err(TokenError::WrongShape));

        let no_expiry = encode(
            &Header::default(),
            &json!({ "sub": "1", "owner": 1, "category": "document", "admin": false, "iat": 0 }),
            &key,
        )
        .unwrap();
        assert_eq!(service().verify(&no_expiry), Err(TokenError::WrongShape));
    }

    #[test]
    fn test_download_url() {
        assert_eq!(service().download_url("abc"), "/download/abc");
    }
}
