//! JWT authentication and capability checks.
//!
//! Tokens are minted by the platform's identity service and signed with the
//! shared HS256 secret. Each request's bearer token becomes a [`Caller`];
//! command functions then gate themselves with `require_*`.
//!
//! | Check                   | Passes for                          |
//! |-------------------------|-------------------------------------|
//! | `require_auth`          | any valid token                     |
//! | `require_team`          | `team` or `admin`                   |
//! | `require_admin`         | `admin`                             |
//! | `require_self_or_admin` | `admin`, or the employee themself   |

use std::sync::Arc;

use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use axum::http::HeaderMap;
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::error::ApiError;
use crate::AppState;

/// Access role derived by the identity service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessRole {
    Admin,
    Team,
    User,
}

impl std::str::FromStr for AccessRole {
    type Err = AuthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "admin" => Ok(AccessRole::Admin),
            "team" => Ok(AccessRole::Team),
            "user" => Ok(AccessRole::User),
            other => Err(AuthError::InvalidToken(format!("unknown access role: {}", other))),
        }
    }
}

/// JWT claims structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user id)
    pub sub: String,

    /// Employee record of the user, if they are one
    pub employee_id: Option<String>,

    /// Access role
    pub access: AccessRole,

    /// Issued at (Unix timestamp)
    pub iat: i64,

    /// Expiration (Unix timestamp)
    pub exp: i64,

    /// JWT ID (unique identifier for this token)
    pub jti: String,
}

/// Authentication and authorization failures.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Missing bearer token")]
    MissingToken,

    #[error("Authorization header must be 'Bearer <token>'")]
    MalformedHeader,

    #[error("Invalid token: {0}")]
    InvalidToken(String),

    #[error("Token expired")]
    Expired,

    #[error("Forbidden: {0}")]
    Forbidden(String),
}

/// JWT token manager.
pub struct JwtManager {
    secret: String,
    lifetime_secs: i64,
}

impl JwtManager {
    /// Create a new JWT manager.
    pub fn new(secret: String, lifetime_secs: i64) -> Self {
        JwtManager {
            secret,
            lifetime_secs,
        }
    }

    /// Issues a token. Used by the dev `issue-token` command and tests.
    pub fn issue(
        &self,
        user_id: &str,
        employee_id: Option<&str>,
        access: AccessRole,
    ) -> Result<String, AuthError> {
        let now = Utc::now();
        let exp = now + Duration::seconds(self.lifetime_secs);

        let claims = Claims {
            sub: user_id.to_string(),
            employee_id: employee_id.map(str::to_string),
            access,
            iat: now.timestamp(),
            exp: exp.timestamp(),
            jti: Uuid::new_v4().to_string(),
        };

        encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(self.secret.as_bytes()),
        )
        .map_err(|e| AuthError::InvalidToken(format!("Failed to generate token: {}", e)))
    }

    /// Validate and decode a token.
    pub fn validate(&self, token: &str) -> Result<Claims, AuthError> {
        let validation = Validation::new(Algorithm::HS256);

        decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.secret.as_bytes()),
            &validation,
        )
        .map(|data| data.claims)
        .map_err(|e| match e.kind() {
            jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::Expired,
            _ => AuthError::InvalidToken(e.to_string()),
        })
    }
}

/// Extract bearer token from authorization header.
pub fn extract_bearer_token(auth_header: &str) -> Option<&str> {
    auth_header
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

// =============================================================================
// Caller
// =============================================================================

/// The authenticated identity behind a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    pub user_id: String,
    pub employee_id: Option<String>,
    pub access: AccessRole,
}

impl From<Claims> for Caller {
    fn from(claims: Claims) -> Self {
        Caller {
            user_id: claims.sub,
            employee_id: claims.employee_id,
            access: claims.access,
        }
    }
}

impl Caller {
    pub fn is_admin(&self) -> bool {
        self.access == AccessRole::Admin
    }

    pub fn require_admin(&self) -> Result<(), AuthError> {
        if self.is_admin() {
            Ok(())
        } else {
            Err(AuthError::Forbidden("admin access required".to_string()))
        }
    }

    pub fn require_team(&self) -> Result<(), AuthError> {
        match self.access {
            AccessRole::Admin | AccessRole::Team => Ok(()),
            AccessRole::User => Err(AuthError::Forbidden("team access required".to_string())),
        }
    }

    /// Employee-scoped reads: admins see everyone, others only themselves.
    pub fn require_self_or_admin(&self, employee_id: &str) -> Result<(), AuthError> {
        if self.is_admin() || self.employee_id.as_deref() == Some(employee_id) {
            Ok(())
        } else {
            Err(AuthError::Forbidden(format!(
                "cannot read commissions of employee {}",
                employee_id
            )))
        }
    }
}

/// Authenticates a request from its headers.
pub fn require_auth(headers: &HeaderMap, jwt: &JwtManager) -> Result<Caller, AuthError> {
    let header = headers
        .get(AUTHORIZATION)
        .ok_or(AuthError::MissingToken)?
        .to_str()
        .map_err(|_| AuthError::MalformedHeader)?;

    let token = extract_bearer_token(header).ok_or(AuthError::MalformedHeader)?;
    jwt.validate(token).map(Caller::from)
}

impl FromRequestParts<Arc<AppState>> for Caller {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        require_auth(&parts.headers, &state.jwt).map_err(ApiError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    const SECRET: &str = "test-secret-at-least-16";

    fn headers(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn test_jwt_roundtrip() {
        let manager = JwtManager::new(SECRET.to_string(), 3600);
        let token = manager
            .issue("user-1", Some("emp-a"), AccessRole::Team)
            .unwrap();

        let claims = manager.validate(&token).unwrap();
        assert_eq!(claims.sub, "user-1");
        assert_eq!(claims.employee_id.as_deref(), Some("emp-a"));
        assert_eq!(claims.access, AccessRole::Team);
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let token = JwtManager::new(SECRET.to_string(), 3600)
            .issue("user-1", None, AccessRole::Admin)
            .unwrap();

        let other = JwtManager::new("another-secret-of-length".to_string(), 3600);
        assert!(matches!(other.validate(&token), Err(AuthError::InvalidToken(_))));
    }

    #[test]
    fn test_expired_token_rejected() {
        let manager = JwtManager::new(SECRET.to_string(), -3600);
        let token = manager.issue("user-1", None, AccessRole::Admin).unwrap();
        assert!(matches!(manager.validate(&token), Err(AuthError::Expired)));
    }

    #[test]
    fn test_require_auth_from_headers() {
        let manager = JwtManager::new(SECRET.to_string(), 3600);
        let token = manager
            .issue("user-1", Some("emp-a"), AccessRole::User)
            .unwrap();

        let caller = require_auth(&headers(&format!("Bearer {}", token)), &manager).unwrap();
        assert_eq!(caller.employee_id.as_deref(), Some("emp-a"));

        assert!(matches!(
            require_auth(&HeaderMap::new(), &manager),
            Err(AuthError::MissingToken)
        ));
        assert!(matches!(
            require_auth(&headers(&format!("Token {}", token)), &manager),
            Err(AuthError::MalformedHeader)
        ));
    }

    #[test]
    fn test_capability_checks() {
        let user = Caller {
            user_id: "u".to_string(),
            employee_id: Some("emp-a".to_string()),
            access: AccessRole::User,
        };
        let team = Caller {
            access: AccessRole::Team,
            ..user.clone()
        };
        let admin = Caller {
            employee_id: None,
            access: AccessRole::Admin,
            ..user.clone()
        };

        assert!(user.require_team().is_err());
        assert!(team.require_team().is_ok());
        assert!(team.require_admin().is_err());
        assert!(admin.require_admin().is_ok());

        assert!(user.require_self_or_admin("emp-a").is_ok());
        assert!(user.require_self_or_admin("emp-b").is_err());
        assert!(admin.require_self_or_admin("emp-b").is_ok());
    }

    #[test]
    fn test_access_role_parsing() {
        assert_eq!("ADMIN".parse::<AccessRole>().unwrap(), AccessRole::Admin);
        assert!("owner".parse::<AccessRole>().is_err());
    }
}
