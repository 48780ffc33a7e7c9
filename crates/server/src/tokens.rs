//! Access / refresh token minting.
//!
//! Short-lived access token (24h) and long-lived refresh token (7d),
//! signed with separate secrets.

use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use vitrine_protocol::{UserRole, UserSnapshot};

use crate::error::GatewayError;
use crate::session_store::unix_now_secs;

const ACCESS_TTL_SECS: u64 = 24 * 3600;
const REFRESH_TTL_SECS: u64 = 7 * 24 * 3600;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub email: String,
    pub role: UserRole,
    pub iat: u64,
    pub exp: u64,
}

#[derive(Debug, Clone)]
pub struct TokenPair {
    pub token: String,
    pub refresh_token: String,
}

pub struct TokenMinter {
    access_enc: EncodingKey,
    access_dec: DecodingKey,
    refresh_enc: EncodingKey,
    refresh_dec: DecodingKey,
}

impl TokenMinter {
    pub fn new(jwt_secret: &str, refresh_secret: &str) -> Self {
        Self {
            access_enc: EncodingKey::from_secret(jwt_secret.as_bytes()),
            access_dec: DecodingKey::from_secret(jwt_secret.as_bytes()),
            refresh_enc: EncodingKey::from_secret(refresh_secret.as_bytes()),
            refresh_dec: DecodingKey::from_secret(refresh_secret.as_bytes()),
        }
    }

    /// Mint the access + refresh pair for an authenticated user.
    pub fn mint_pair(&self, user: &UserSnapshot) -> Result<TokenPair, GatewayError> {
        let now = unix_now_secs();
        let claims = |ttl: u64| Claims {
            sub: user.id.clone(),
            email: user.email.clone(),
            role: user.role,
            iat: now,
            exp: now + ttl,
        };

        Ok(TokenPair {
            token: encode(&Header::default(), &claims(ACCESS_TTL_SECS), &self.access_enc)?,
            refresh_token: encode(
                &Header::default(),
                &claims(REFRESH_TTL_SECS),
                &self.refresh_enc,
            )?,
        })
    }

    pub fn verify_access(&self, token: &str) -> Result<Claims, GatewayError> {
        let data = decode::<Claims>(token, &self.access_dec, &Validation::default())?;
        Ok(data.claims)
    }

    pub fn verify_refresh(&self, token: &str) -> Result<Claims, GatewayError> {
        let data = decode::<Claims>(token, &self.refresh_dec, &Validation::default())?;
        Ok(data.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user() -> UserSnapshot {
        UserSnapshot {
            id: "u1".to_string(),
            email: "jo@example.com".to_string(),
            firstname: "Jo".to_string(),
            lastname: "Martin".to_string(),
            picture: None,
            role: UserRole::Admin,
        }
    }

    #[test]
    fn mint_and_verify_access_token() {
        let minter = TokenMinter::new("access-secret", "refresh-secret");
        let pair = minter.mint_pair(&user()).unwrap();

        let claims = minter.verify_access(&pair.token).unwrap();
        assert_eq!(claims.sub, "u1");
        assert_eq!(claims.email, "jo@example.com");
        assert_eq!(claims.role, UserRole::Admin);
        assert!(claims.exp > claims.iat);
    }

    #[test]
    fn token_pair_uses_separate_secrets() {
        let minter = TokenMinter::new("access-secret", "refresh-secret");
        let pair = minter.mint_pair(&user()).unwrap();

        // A refresh token must not verify as an access token and vice versa.
        assert!(minter.verify_access(&pair.refresh_token).is_err());
        assert!(minter.verify_refresh(&pair.token).is_err());
        assert!(minter.verify_refresh(&pair.refresh_token).is_ok());
    }

    #[test]
    fn garbage_token_is_rejected() {
        let minter = TokenMinter::new("access-secret", "refresh-secret");
        assert!(minter.verify_access("not-a-jwt").is_err());
    }
}
