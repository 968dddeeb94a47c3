//! JWT token management
//!
//! Handles creation and validation of officer bearer tokens.

use crate::config::{AdminConfig, MAX_TOKEN_TTL_MINUTES};
use crate::error::AppError;
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

/// JWT claims
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Claims {
    /// Subject (officer id)
    pub sub: String,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    /// Issued at (Unix timestamp)
    pub iat: i64,
}

/// Token response
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IssuedToken {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: i64,
    pub officer_id: String,
}

/// Signs and verifies HS256 officer tokens
pub struct TokenIssuer {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl_minutes: i64,
}

impl TokenIssuer {
    /// Lifetimes above [`MAX_TOKEN_TTL_MINUTES`] are capped
    pub fn new(secret: &str, ttl_minutes: i64) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            ttl_minutes: ttl_minutes.min(MAX_TOKEN_TTL_MINUTES),
        }
    }

    pub fn from_config(config: &AdminConfig) -> Self {
        Self::new(&config.jwt_secret, config.token_ttl_minutes)
    }

    /// Create an access token for an authenticated officer
    pub fn issue(&self, officer_id: &str) -> Result<IssuedToken, AppError> {
        let now = Utc::now();
        let claims = Claims {
            sub: officer_id.to_string(),
            exp: (now + Duration::minutes(self.ttl_minutes)).timestamp(),
            iat: now.timestamp(),
        };

        let access_token = encode(&Header::default(), &claims, &self.encoding)
            .map_err(|e| AppError::Internal(format!("Failed to create access token: {}", e)))?;

        Ok(IssuedToken {
            access_token,
            token_type: "Bearer".to_string(),
            expires_in: self.ttl_minutes * 60,
            officer_id: claims.sub,
        })
    }

    /// Decode and validate a token
    pub fn verify(&self, token: &str) -> Result<Claims, AppError> {
        let token_data = decode::<Claims>(token, &self.decoding, &Validation::default())
            .map_err(|e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => {
                    AppError::Unauthorized("Token expired".to_string())
                }
                jsonwebtoken::errors::ErrorKind::InvalidToken => {
                    AppError::Unauthorized("Invalid token".to_string())
                }
                _ => AppError::Unauthorized(format!("Token validation failed: {}", e)),
            })?;

        Ok(token_data.claims)
    }
}
