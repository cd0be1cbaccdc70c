use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::middleware::AuthenticatedPrincipal;

pub const SESSION_HOURS: i64 = 24;

/// Claims carried by the login session cookie.
#[derive(Debug, Serialize, Deserialize)]
pub struct SessionClaims {
    pub sub: String, // principal id
    pub exp: i64,
    pub iat: i64,
}

impl SessionClaims {
    pub fn new(principal_id: String) -> Self {
        let now = Utc::now();
        let exp = now + Duration::hours(SESSION_HOURS);

        Self {
            sub: principal_id,
            exp: exp.timestamp(),
            iat: now.timestamp(),
        }
    }
}

pub fn create_session_token<P: AuthenticatedPrincipal>(
    principal: &P,
    secret: &str,
) -> Result<String, jsonwebtoken::errors::Error> {
    let claims = SessionClaims::new(principal.get_id());

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_ref()),
    )
}

pub fn verify_session_token(
    token: &str,
    secret: &str,
) -> Result<SessionClaims, jsonwebtoken::errors::Error> {
    let token_data = decode::<SessionClaims>(
        token,
        &DecodingKey::from_secret(secret.as_ref()),
        &Validation::default(),
    )?;

    Ok(token_data.claims)
}
