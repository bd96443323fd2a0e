// Copyright 2023 Remi Bernotavicius

use crate::database::models::UserId;
use crate::error::{AppError, AppResult};
use argon2::Argon2;
use axum::async_trait;
use axum::extract::{FromRef, FromRequestParts};
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation};
use password_hash::{PasswordHash, PasswordVerifier as _, SaltString};
use serde::{Deserialize, Serialize};

const SESSION_DAYS: i64 = 30;
const LOGIN_STATE_MINUTES: i64 = 10;

pub fn hash_password(password: impl AsRef<[u8]>) -> AppResult<String> {
    let salt = SaltString::generate(&mut rand::thread_rng());
    let hash = PasswordHash::generate(Argon2::default(), password.as_ref(), &salt)?.to_string();
    Ok(hash)
}

pub fn verify_password(password: impl AsRef<[u8]>, hash: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(hash) else {
        log::warn!("stored password hash could not be parsed");
        return false;
    };
    Argon2::default()
        .verify_password(password.as_ref(), &parsed)
        .is_ok()
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub exp: i64,
    pub user_id: UserId,
}

#[derive(Debug, Serialize, Deserialize)]
struct LoginState {
    exp: i64,
    provider: String,
    nonce: u64,
}

/// Signing keys for session tokens and social-login state.
#[derive(Clone)]
pub struct Keys {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl Keys {
    pub fn new(secret: &[u8]) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
        }
    }

    pub fn issue(&self, user_id: UserId) -> AppResult<String> {
        let exp = (chrono::Utc::now() + chrono::Duration::days(SESSION_DAYS)).timestamp();
        let claims = Claims { exp, user_id };
        Ok(jsonwebtoken::encode(
            &Header::default(),
            &claims,
            &self.encoding,
        )?)
    }

    pub fn verify(&self, token: &str) -> AppResult<Claims> {
        let data = jsonwebtoken::decode::<Claims>(token, &self.decoding, &Validation::default())?;
        Ok(data.claims)
    }

    /// A signed, short-lived value for the OAuth `state` parameter.
    pub fn issue_login_state(&self, provider: &str) -> AppResult<String> {
        let exp = (chrono::Utc::now() + chrono::Duration::minutes(LOGIN_STATE_MINUTES)).timestamp();
        let state = LoginState {
            exp,
            provider: provider.into(),
            nonce: rand::random(),
        };
        Ok(jsonwebtoken::encode(
            &Header::default(),
            &state,
            &self.encoding,
        )?)
    }

    pub fn verify_login_state(&self, provider: &str, state: &str) -> AppResult<()> {
        let data =
            jsonwebtoken::decode::<LoginState>(state, &self.decoding, &Validation::default())?;
        if data.claims.provider != provider {
            return Err(AppError::Unauthorized("login state was issued for another provider"));
        }
        Ok(())
    }
}

fn bearer_token(parts: &Parts) -> AppResult<&str> {
    let Some(value) = parts.headers.get(AUTHORIZATION) else {
        return Err(AppError::Unauthorized("No authorization was provided"));
    };
    let value = value
        .to_str()
        .map_err(|_| AppError::Unauthorized("Malformed authorization header"))?;

    let mut it = value.split_whitespace();
    match (it.next(), it.next(), it.next()) {
        (Some("Bearer" | "Token"), Some(token), None) => Ok(token),
        _ => Err(AppError::Unauthorized("Invalid authorization method")),
    }
}

/// The signed-in user. Use `Option<AuthUser>` where anonymous access is allowed.
#[derive(Debug, Clone, Copy)]
pub struct AuthUser {
    pub id: UserId,
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    Keys: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let keys = Keys::from_ref(state);
        let token = bearer_token(parts)?;
        let claims = keys.verify(token)?;
        Ok(Self { id: claims.user_id })
    }
}

#[test]
fn password_round_trip() {
    let hash = hash_password("correct horse").unwrap();
    assert!(verify_password("correct horse", &hash));
    assert!(!verify_password("battery staple", &hash));
    assert!(!verify_password("correct horse", "not a hash"));
}

#[test]
fn session_tokens() {
    let keys = Keys::new(b"secret");
    let token = keys.issue(UserId::from(7)).unwrap();
    assert_eq!(keys.verify(&token).unwrap().user_id, UserId::from(7));

    let other = Keys::new(b"another secret");
    assert!(other.verify(&token).is_err());
}

#[test]
fn login_state_is_bound_to_provider() {
    let keys = Keys::new(b"secret");
    let state = keys.issue_login_state("google").unwrap();
    assert!(keys.verify_login_state("google", &state).is_ok());
    assert!(keys.verify_login_state("line", &state).is_err());
    assert!(keys.verify_login_state("google", "garbage").is_err());
}

#[test]
fn authorization_header_schemes() {
    let parts = |value: &str| {
        let (parts, _) = axum::http::Request::builder()
            .header(AUTHORIZATION, value)
            .body(())
            .unwrap()
            .into_parts();
        parts
    };

    assert_eq!(bearer_token(&parts("Bearer abc")).unwrap(), "abc");
    assert_eq!(bearer_token(&parts("Token abc")).unwrap(), "abc");
    assert!(bearer_token(&parts("Basic abc")).is_err());
    assert!(bearer_token(&parts("Bearer abc def")).is_err());
}
