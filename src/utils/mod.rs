pub mod auth;
pub mod password;
pub mod tokens;

pub use auth::{create_session_token, verify_session_token, SessionClaims};
pub use password::{hash_password, verify_password, MAX_PASSWORD_BYTES};
pub use tokens::{decode_reset_token, encode_reset_token, TimedSerializer, TokenError};
