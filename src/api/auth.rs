//! Session-token authentication.
//!
//! Tokens are HS256 JWTs signed with `SECRET_KEY`, read from the `usercookie`
//! cookie or an `Authorization: Bearer` header. Issuing them belongs to the
//! identity service; [`issue_token`] exists for tools and tests.

use axum::extract::FromRequestParts;
use axum::http::header::{AUTHORIZATION, COOKIE};
use axum::http::request::Parts;
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::AppState;
use crate::EcommerceError;

pub const SESSION_COOKIE: &str = "usercookie";
const TOKEN_TTL_HOURS: i64 = 24;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role { User, Admin }

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// Principal id
    pub sub: Uuid,
    pub role: Role,
    /// Display name, used as the review author.
    #[serde(default)]
    pub name: Option<String>,
    pub exp: usize,
    pub iat: usize,
}

/// Authenticated caller.
#[derive(Clone, Debug)]
pub struct Principal {
    pub id: Uuid,
    pub role: Role,
    pub name: Option<String>,
}

/// Authenticated caller holding the admin role.
#[derive(Clone, Debug)]
pub struct AdminPrincipal(pub Principal);

pub fn issue_token(principal_id: Uuid, role: Role, name: Option<&str>, secret: &str) -> Result<String, jsonwebtoken::errors::Error> {
    let now = chrono::Utc::now();
    let claims = Claims {
        sub: principal_id,
        role,
        name: name.map(str::to_string),
        exp: (now + chrono::Duration::hours(TOKEN_TTL_HOURS)).timestamp() as usize,
        iat: now.timestamp() as usize,
    };
    jsonwebtoken::encode(&Header::default(), &claims, &EncodingKey::from_secret(secret.as_bytes()))
}

fn token_from(parts: &Parts) -> Option<&str> {
    let from_cookie = parts.headers.get_all(COOKIE).iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .find_map(|pair| pair.trim().strip_prefix(SESSION_COOKIE)?.strip_prefix('='))
        .filter(|t| !t.is_empty());
    from_cookie.or_else(|| {
        parts.headers.get(AUTHORIZATION)?.to_str().ok()?.strip_prefix("Bearer ").map(str::trim).filter(|t| !t.is_empty())
    })
}

pub fn authenticate(parts: &Parts, secret: &str) -> Result<Principal, EcommerceError> {
    let token = token_from(parts).ok_or_else(|| EcommerceError::Unauthorized("No authentication token provided".into()))?;
    let data = jsonwebtoken::decode::<Claims>(token, &DecodingKey::from_secret(secret.as_bytes()), &Validation::default())
        .map_err(|e| {
            tracing::debug!(error = %e, "token rejected");
            EcommerceError::Unauthorized("Unauthorized: Invalid token".into())
        })?;
    Ok(Principal { id: data.claims.sub, role: data.claims.role, name: data.claims.name })
}

#[axum::async_trait]
impl FromRequestParts<AppState> for Principal {
    type Rejection = EcommerceError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        authenticate(parts, &state.secret_key)
    }
}

#[axum::async_trait]
impl FromRequestParts<AppState> for AdminPrincipal {
    type Rejection = EcommerceError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let principal = authenticate(parts, &state.secret_key)?;
        if principal.role != Role::Admin {
            tracing::warn!(principal = %principal.id, "admin route refused");
            return Err(EcommerceError::Forbidden("Admin access required".into()));
        }
        Ok(Self(principal))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    fn parts(header: (&str, String)) -> Parts {
        Request::builder().header(header.0, header.1).body(()).unwrap().into_parts().0
    }

    #[test]
    fn test_cookie_and_bearer() {
        let id = Uuid::new_v4();
        let token = issue_token(id, Role::User, Some("Asha"), "s3cret").unwrap();

        let p = authenticate(&parts(("cookie", format!("theme=dark; usercookie={token}"))), "s3cret").unwrap();
        assert_eq!(p.id, id);
        assert_eq!(p.name.as_deref(), Some("Asha"));

        let p = authenticate(&parts(("authorization", format!("Bearer {token}"))), "s3cret").unwrap();
        assert_eq!(p.role, Role::User);
    }

    #[test]
    fn test_rejections() {
        let token = issue_token(Uuid::new_v4(), Role::Admin, None, "s3cret").unwrap();
        let wrong_key = authenticate(&parts(("authorization", format!("Bearer {token}"))), "other");
        assert!(matches!(wrong_key, Err(EcommerceError::Unauthorized(_))));
        let missing = authenticate(&parts(("x-other", "1".into())), "s3cret");
        assert!(matches!(missing, Err(EcommerceError::Unauthorized(m)) if m == "No authentication token provided"));
    }
}
