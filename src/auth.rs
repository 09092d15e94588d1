//! Verification of session tokens.
//!
//! Token minting lives in the account service; this side only checks
//! the HS256 signature and expiry and extracts the user id.

use crate::error_handling::types::AuthError;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// User id.
    pub sub: i64,
    /// Expiry as a unix timestamp.
    pub exp: usize,
}

#[derive(Clone)]
pub struct TokenVerifier {
    decoding: DecodingKey,
    validation: Validation,
}

impl TokenVerifier {
    pub fn new(secret: &str) -> Self {
        Self {
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            validation: Validation::new(Algorithm::HS256),
        }
    }

    /// Verifies a raw token and returns the user id.
    pub fn verify(&self, token: &str) -> Result<i64, AuthError> {
        let data = decode::<Claims>(token, &self.decoding, &self.validation)
            .map_err(|_| AuthError::InvalidToken)?;
        Ok(data.claims.sub)
    }

    /// Verifies an `Authorization: Bearer <token>` header value.
    pub fn bearer(&self, header: Option<&str>) -> Result<i64, AuthError> {
        let header = header.ok_or(AuthError::MissingToken)?;
        let token = header
            .strip_prefix("Bearer ")
            .ok_or(AuthError::InvalidToken)?;
        self.verify(token)
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::{mint, mint_expired};
    use super::*;

    #[test]
    fn accepts_valid_token_and_extracts_user() {
        let verifier = TokenVerifier::new("secret");
        let token = mint("secret", 42);
        assert_eq!(verifier.verify(&token).unwrap(), 42);
    }

    #[test]
    fn rejects_wrong_secret_and_garbage() {
        let verifier = TokenVerifier::new("secret");
        let token = mint("other-secret", 42);
        assert_eq!(verifier.verify(&token), Err(AuthError::InvalidToken));
        assert_eq!(verifier.verify("not-a-jwt"), Err(AuthError::InvalidToken));
    }

    #[test]
    fn rejects_expired_token() {
        let verifier = TokenVerifier::new("secret");
        let token = mint_expired("secret", 42);
        assert_eq!(verifier.verify(&token), Err(AuthError::InvalidToken));
    }

    #[test]
    fn bearer_extraction() {
        let verifier = TokenVerifier::new("secret");
        let token = mint("secret", 7);
        let header = format!("Bearer {}", token);
        assert_eq!(verifier.bearer(Some(&header)).unwrap(), 7);
        assert_eq!(verifier.bearer(None), Err(AuthError::MissingToken));
        assert_eq!(verifier.bearer(Some(&token)), Err(AuthError::InvalidToken));
    }
}
