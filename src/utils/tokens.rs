//! Signed tokens used in account emails.
//!
//! Confirmation links use a timed serializer: the payload is JSON, stamped with
//! its issue time and signed with HMAC-SHA256 over the application secret. The
//! age is checked against a max-age at load time. Password-reset links are HS256
//! JWTs carrying an absolute `exp` claim.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("token is malformed")]
    Malformed,

    #[error("token signature does not match")]
    BadSignature,

    #[error("token has expired")]
    Expired,

    #[error("signing key rejected")]
    InvalidKey,

    #[error("token payload is invalid: {0}")]
    Payload(#[from] serde_json::Error),
}

pub struct TimedSerializer<'k> {
    secret: &'k [u8],
    salt: &'static str,
}

impl<'k> TimedSerializer<'k> {
    /// `salt` namespaces the signatures so a token minted for one purpose
    /// does not verify for another.
    pub fn new(secret: &'k [u8], salt: &'static str) -> Self {
        Self { secret, salt }
    }

    pub fn dumps<T: Serialize>(&self, value: &T) -> Result<String, TokenError> {
        self.dumps_at(value, Utc::now())
    }

    pub fn dumps_at<T: Serialize>(
        &self,
        value: &T,
        issued_at: DateTime<Utc>,
    ) -> Result<String, TokenError> {
        let payload = URL_SAFE_NO_PAD.encode(serde_json::to_vec(value)?);
        let timestamp = URL_SAFE_NO_PAD.encode(issued_at.timestamp().to_be_bytes());
        let signed = format!("{payload}.{timestamp}");

        let mut mac = self.mac()?;
        mac.update(signed.as_bytes());
        let signature = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());

        Ok(format!("{signed}.{signature}"))
    }

    pub fn loads<T: DeserializeOwned>(
        &self,
        token: &str,
        max_age: Duration,
    ) -> Result<T, TokenError> {
        self.loads_at(token, max_age, Utc::now())
    }

    pub fn loads_at<T: DeserializeOwned>(
        &self,
        token: &str,
        max_age: Duration,
        now: DateTime<Utc>,
    ) -> Result<T, TokenError> {
        let (signed, signature) = token.rsplit_once('.').ok_or(TokenError::Malformed)?;
        let (payload, timestamp) = signed.split_once('.').ok_or(TokenError::Malformed)?;
        let signature = URL_SAFE_NO_PAD
            .decode(signature)
            .map_err(|_| TokenError::BadSignature)?;

        let mut mac = self.mac()?;
        mac.update(signed.as_bytes());
        mac.verify_slice(&signature)
            .map_err(|_| TokenError::BadSignature)?;

        let timestamp: [u8; 8] = URL_SAFE_NO_PAD
            .decode(timestamp)
            .map_err(|_| TokenError::Malformed)?
            .try_into()
            .map_err(|_| TokenError::Malformed)?;
        let age = now
            .timestamp()
            .checked_sub(i64::from_be_bytes(timestamp))
            .and_then(Duration::try_seconds)
            .ok_or(TokenError::Expired)?;
        if age < Duration::zero() || age > max_age {
            return Err(TokenError::Expired);
        }

        let payload = URL_SAFE_NO_PAD
            .decode(payload)
            .map_err(|_| TokenError::Malformed)?;
        Ok(serde_json::from_slice(&payload)?)
    }

    fn mac(&self) -> Result<HmacSha256, TokenError> {
        let mut mac = HmacSha256::new_from_slice(self.secret).map_err(|_| TokenError::InvalidKey)?;
        mac.update(self.salt.as_bytes());
        mac.update(b".");
        Ok(mac)
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ResetClaims {
    pub reset_password: String,
    pub exp: i64,
}

pub fn encode_reset_token(
    user_uid: &str,
    expires_at: DateTime<Utc>,
    secret: &str,
) -> Result<String, jsonwebtoken::errors::Error> {
    let claims = ResetClaims {
        reset_password: user_uid.to_string(),
        exp: expires_at.timestamp(),
    };

    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret.as_ref()),
    )
}

/// Returns the user id carried by a reset token. Expiry is enforced without leeway.
pub fn decode_reset_token(
    token: &str,
    secret: &str,
) -> Result<String, jsonwebtoken::errors::Error> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.leeway = 0;

    let token_data = decode::<ResetClaims>(
        token,
        &DecodingKey::from_secret(secret.as_ref()),
        &validation,
    )?;

    Ok(token_data.claims.reset_password)
}
