// Copyright 2023 Remi Bernotavicius

use axum::{
    extract::{multipart::MultipartError, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::borrow::Cow;
use thiserror::Error;
use validator::{ValidationError, ValidationErrors};

pub type AppResult<T, E = AppError> = std::result::Result<T, E>;

#[derive(Error, Debug)]
pub enum AppError {
    // 400
    #[error("Bad request: {0}")]
    BadRequest(String),

    // 401
    #[error("Unauthorized: {0}")]
    Unauthorized(&'static str),

    // 403
    #[error("Forbidden: {0}")]
    Forbidden(&'static str),

    // 404
    #[error("Not Found")]
    NotFound,

    // 422
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationErrors),

    #[error("Database error: {0}")]
    Database(#[from] diesel::result::Error),

    #[error("Connection pool error: {0}")]
    Pool(#[from] diesel::r2d2::PoolError),

    #[error("Blocking task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("Token error: {0}")]
    Token(#[from] jsonwebtoken::errors::Error),

    #[error("Password hash error: {0}")]
    PasswordHash(password_hash::Error),

    #[error("Storage error: {0}")]
    Storage(#[from] std::io::Error),

    // 400, 415 or 422 depending on what was wrong with the body
    #[error("Invalid JSON body: {0}")]
    Json(#[from] JsonRejection),

    #[error("Multipart error: {0}")]
    Multipart(#[from] MultipartError),

    #[error("Social login error: {0}")]
    Social(String),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),
}

impl From<password_hash::Error> for AppError {
    fn from(e: password_hash::Error) -> Self {
        Self::PasswordHash(e)
    }
}

impl AppError {
    /// A single field-level validation error, reported the same way `validator` reports them.
    pub fn field(field: &'static str, code: &'static str, message: impl Into<String>) -> Self {
        let mut error = ValidationError::new(code);
        error.message = Some(Cow::Owned(message.into()));
        let mut errors = ValidationErrors::new();
        errors.add(field, error);
        Self::Validation(errors)
    }

    fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) | Self::Multipart(_) => StatusCode::BAD_REQUEST,
            Self::Json(rejection) => rejection.status(),
            Self::Unauthorized(_) | Self::Token(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::NotFound | Self::Database(diesel::result::Error::NotFound) => {
                StatusCode::NOT_FOUND
            }
            Self::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Social(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// `{"field": ["message", ...]}` for every field that failed.
fn field_messages(errors: &ValidationErrors) -> serde_json::Value {
    let fields = errors
        .field_errors()
        .into_iter()
        .map(|(field, errors)| {
            let messages: Vec<String> = errors
                .iter()
                .map(|e| match &e.message {
                    Some(message) => message.to_string(),
                    None => e.code.to_string(),
                })
                .collect();
            (field.to_string(), json!(messages))
        })
        .collect::<serde_json::Map<_, _>>();
    serde_json::Value::Object(fields)
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            log::error!("{self}");
        } else {
            log::warn!("{self}");
        }

        let body = match &self {
            Self::Validation(errors) => json!({ "errors": field_messages(errors) }),
            Self::BadRequest(message) => json!({ "error": message }),
            Self::Json(rejection) => json!({ "error": rejection.body_text() }),
            Self::Unauthorized(message) | Self::Forbidden(message) => json!({ "error": message }),
            _ => json!({
                "error": status.canonical_reason().unwrap_or("Internal Server Error"),
            }),
        };

        (status, Json(body)).into_response()
    }
}

#[test]
fn validation_errors_are_reported_per_field() {
    let error = AppError::field("email", "taken", "このメールアドレスは既に登録されています");
    assert_eq!(error.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let AppError::Validation(errors) = &error else {
        panic!("expected a validation error");
    };
    assert_eq!(
        field_messages(errors),
        json!({ "email": ["このメールアドレスは既に登録されています"] })
    );
}

#[test]
fn diesel_not_found_is_404() {
    let error = AppError::from(diesel::result::Error::NotFound);
    assert_eq!(error.status(), StatusCode::NOT_FOUND);
}

#[test]
fn unreadable_json_is_reported_as_json() {
    use axum::extract::FromRequest as _;
    use std::collections::BTreeMap;

    let request = axum::http::Request::builder()
        .method("POST")
        .header("content-type", "application/json")
        .body(axum::body::Body::from(r#"{"name": 7}"#))
        .unwrap();
    let rejection = tokio::runtime::Runtime::new()
        .unwrap()
        .block_on(axum::Json::<BTreeMap<String, String>>::from_request(request, &()))
        .unwrap_err();

    let error = AppError::from(rejection);
    assert_eq!(error.status(), StatusCode::UNPROCESSABLE_ENTITY);
}
