//! HS256 token verification against the shared login secret.

use chrono::Utc;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};

use crate::claims::{Claims, Role};
use crate::error::AuthError;

/// Lifetime of tokens issued by the login service (24 hours).
pub const DEFAULT_TOKEN_TTL_SECS: i64 = 24 * 60 * 60;

/// Verifies (and, for tooling and tests, issues) login tokens.
#[derive(Clone)]
pub struct TokenVerifier {
    encoding: EncodingKey,
    decoding: DecodingKey,
    leeway_secs: u64,
}

impl TokenVerifier {
    pub fn new(secret: &str) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            leeway_secs: 0,
        }
    }

    /// Clock-skew tolerance applied to `exp`.
    pub fn with_leeway(mut self, leeway_secs: u64) -> Self {
        self.leeway_secs = leeway_secs;
        self
    }

    /// Decode and check a token: HS256 signature plus expiry.
    pub fn verify(&self, token: &str) -> Result<Claims, AuthError> {
        let token = token.trim();
        if token.is_empty() {
            return Err(AuthError::Missing);
        }
        // Browsers sometimes forward the raw Authorization header value.
        let token = token.strip_prefix("Bearer ").unwrap_or(token);

        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = self.leeway_secs;
        let data = decode::<Claims>(token, &self.decoding, &validation)?;
        Ok(data.claims)
    }

    /// Like [`verify`](Self::verify), but absent tokens are `Ok(None)`.
    pub fn verify_optional(&self, token: Option<&str>) -> Result<Option<Claims>, AuthError> {
        match token {
            None => Ok(None),
            Some(t) if t.trim().is_empty() => Ok(None),
            Some(t) => self.verify(t).map(Some),
        }
    }

    /// Issue a token valid for `ttl_secs` from now.
    pub fn issue(
        &self,
        user_id: &str,
        username: &str,
        role: Role,
        ttl_secs: i64,
    ) -> Result<String, AuthError> {
        let now = Utc::now().timestamp();
        self.sign(&Claims::new(user_id, username, role, now, now + ttl_secs))
    }

    /// Sign arbitrary claims as-is (no expiry adjustment).
    pub fn sign(&self, claims: &Claims) -> Result<String, AuthError> {
        encode(&Header::new(Algorithm::HS256), claims, &self.encoding)
            .map_err(|e| AuthError::Signing(e.to_string()))
    }
}

impl std::fmt::Debug for TokenVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenVerifier")
            .field("leeway_secs", &self.leeway_secs)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "test-secret";

    #[test]
    fn issue_then_verify() {
        let verifier = TokenVerifier::new(SECRET);
        let token = verifier
            .issue("BN0001", "an.nguyen", Role::Patient, DEFAULT_TOKEN_TTL_SECS)
            .unwrap();
        let claims = verifier.verify(&token).unwrap();
        assert_eq!(claims.user_id, "BN0001");
        assert_eq!(claims.username, "an.nguyen");
        assert_eq!(claims.role, Role::Patient);
        assert!(claims.exp > claims.iat);
    }

    #[test]
    fn bearer_prefix_is_accepted() {
        let verifier = TokenVerifier::new(SECRET);
        let token = verifier.issue("BS0001", "BS0001", Role::Doctor, 60).unwrap();
        let claims = verifier.verify(&format!("Bearer {token}")).unwrap();
        assert_eq!(claims.role, Role::Doctor);
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let issuer = TokenVerifier::new("other-secret");
        let token = issuer.issue("BN0001", "an", Role::Patient, 60).unwrap();
        let err = TokenVerifier::new(SECRET).verify(&token).unwrap_err();
        assert_eq!(err, AuthError::InvalidSignature);
    }

    #[test]
    fn expired_token_is_rejected() {
        let verifier = TokenVerifier::new(SECRET);
        let now = Utc::now().timestamp();
        let claims = Claims::new("BN0001", "an", Role::Patient, now - 7200, now - 3600);
        let token = verifier.sign(&claims).unwrap();
        assert_eq!(verifier.verify(&token).unwrap_err(), AuthError::Expired);
    }

    #[test]
    fn leeway_tolerates_small_skew() {
        let verifier = TokenVerifier::new(SECRET).with_leeway(120);
        let now = Utc::now().timestamp();
        let claims = Claims::new("BN0001", "an", Role::Patient, now - 600, now - 30);
        let token = verifier.sign(&claims).unwrap();
        assert!(verifier.verify(&token).is_ok());
    }

    #[test]
    fn garbage_is_malformed() {
        let verifier = TokenVerifier::new(SECRET);
        let err = verifier.verify("not-a-jwt").unwrap_err();
        assert_eq!(err.error_code(), "malformed");
        assert_eq!(verifier.verify("   ").unwrap_err(), AuthError::Missing);
    }

    #[test]
    fn optional_token() {
        let verifier = TokenVerifier::new(SECRET);
        assert_eq!(verifier.verify_optional(None), Ok(None));
        assert_eq!(verifier.verify_optional(Some("")), Ok(None));
        let token = verifier.issue("BN0002", "binh", Role::Patient, 60).unwrap();
        let claims = verifier.verify_optional(Some(&token)).unwrap().unwrap();
        assert_eq!(claims.user_id, "BN0002");
    }
}
