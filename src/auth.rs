//! # Authentication
//!
//! Stateless bearer tokens signed with the server secret (HS256).
//!
//! Two composable extractors guard the routes:
//! - [`AuthUser`]: verifies the `Authorization: Bearer <token>` header and
//!   yields the identity from the claims. Any failure is a 401.
//! - [`AdminUser`]: runs the verification above and additionally requires the
//!   `ADMIN` role. A known identity without the role is a 403, never a 401.
//!
//! Tokens expire 8 hours after issue. There is no refresh or rotation; a new
//! login issues a new token.

use std::{fmt, sync::Arc};

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};
use chrono::{Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{error::AppError, state::AppState};

pub const TOKEN_TTL_HOURS: i64 = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Client,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Client => "CLIENT",
            Role::Admin => "ADMIN",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "CLIENT" => Some(Role::Client),
            "ADMIN" => Some(Role::Admin),
            _ => None,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub name: String,
    pub role: String,
    pub iat: i64,
    pub exp: i64,
}

/// Verified identity attached to the request by the extractor.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: Uuid,
    pub name: String,
    pub role: Role,
}

pub fn issue_token(secret: &str, id: Uuid, name: &str, role: &str) -> Result<String, AppError> {
    let now = Utc::now();
    let claims = Claims {
        sub: id,
        name: name.to_string(),
        role: role.to_string(),
        iat: now.timestamp(),
        exp: (now + Duration::hours(TOKEN_TTL_HOURS)).timestamp(),
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| AppError::Internal(e.into()))
}

pub fn verify_token(secret: &str, token: &str) -> Result<AuthUser, AppError> {
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|_| AppError::Unauthenticated("Invalid or expired token"))?;

    let role = Role::parse(&data.claims.role)
        .ok_or(AppError::Unauthenticated("Unrecognized role in token"))?;

    Ok(AuthUser {
        id: data.claims.sub,
        name: data.claims.name,
        role,
    })
}

#[async_trait]
impl FromRequestParts<Arc<AppState>> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or(AppError::Unauthenticated("Authentication token missing"))?;

        let token = header
            .strip_prefix("Bearer ")
            .ok_or(AppError::Unauthenticated("Malformed authorization header"))?;

        verify_token(&state.config.jwt_secret, token)
    }
}

/// Privileged identity. Must wrap an already-verified [`AuthUser`].
pub struct AdminUser(pub AuthUser);

#[async_trait]
impl FromRequestParts<Arc<AppState>> for AdminUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let user = AuthUser::from_request_parts(parts, state).await?;

        if user.role != Role::Admin {
            return Err(AppError::Forbidden("Administrator privileges required"));
        }

        Ok(AdminUser(user))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "test-secret";

    #[test]
    fn test_token_roundtrip() {
        let id = Uuid::new_v4();
        let token = issue_token(SECRET, id, "Ana", "CLIENT").unwrap();

        let user = verify_token(SECRET, &token).unwrap();
        assert_eq!(user.id, id);
        assert_eq!(user.name, "Ana");
        assert_eq!(user.role, Role::Client);
    }

    #[test]
    fn test_tampered_token_rejected() {
        let token = issue_token(SECRET, Uuid::new_v4(), "Ana", "ADMIN").unwrap();

        assert!(verify_token("another-secret", &token).is_err());
    }

    #[test]
    fn test_expired_token_rejected() {
        let now = Utc::now();
        let claims = Claims {
            sub: Uuid::new_v4(),
            name: "Ana".to_string(),
            role: "CLIENT".to_string(),
            iat: (now - Duration::hours(9)).timestamp(),
            exp: (now - Duration::hours(1)).timestamp(),
        };
        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .unwrap();

        assert!(verify_token(SECRET, &token).is_err());
    }

    #[test]
    fn test_unknown_role_rejected() {
        let token = issue_token(SECRET, Uuid::new_v4(), "Ana", "SUPERUSER").unwrap();

        assert!(verify_token(SECRET, &token).is_err());
    }

    #[test]
    fn test_role_parse() {
        assert_eq!(Role::parse("CLIENT"), Some(Role::Client));
        assert_eq!(Role::parse("ADMIN"), Some(Role::Admin));
        assert_eq!(Role::parse("client"), None);
        assert_eq!(Role::parse(""), None);
    }
}
