// Copyright 2023 Remi Bernotavicius

use super::{with_conn, AppState};
use crate::error::{AppError, AppResult};
use crate::query::users;
use axum::extract::{Path, Query, State};
use axum::http::header::LOCATION;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use reqwest::Url;
use serde::Deserialize;

fn found(location: String) -> Response {
    (StatusCode::FOUND, [(LOCATION, location)]).into_response()
}

fn with_param(base: &str, key: &str, value: &str) -> String {
    match Url::parse_with_params(base, [(key, value)]) {
        Ok(url) => url.into(),
        Err(e) => {
            log::error!("configured url {base:?} is invalid: {e}");
            base.to_owned()
        }
    }
}

// GET /auth/:provider/redirect
pub async fn redirect(
    State(state): State<AppState>,
    Path(provider): Path<String>,
) -> AppResult<Response> {
    let social = state.social.get(&provider).ok_or(AppError::NotFound)?;
    let login_state = state.keys.issue_login_state(&provider)?;
    Ok(found(social.authorize_url(&login_state)?))
}

#[derive(Debug, Deserialize)]
pub struct Callback {
    pub code: Option<String>,
    pub state: Option<String>,
    /// Set by the provider when the user declined.
    pub error: Option<String>,
}

async fn finish_login(state: &AppState, provider: &str, callback: Callback) -> AppResult<String> {
    if let Some(error) = callback.error {
        return Err(AppError::Social(error));
    }
    let social = state.social.get(provider).ok_or(AppError::NotFound)?;
    let login_state = callback
        .state
        .ok_or(AppError::Unauthorized("missing login state"))?;
    state.keys.verify_login_state(provider, &login_state)?;
    let code = callback
        .code
        .ok_or_else(|| AppError::BadRequest("missing authorization code".into()))?;

    let identity = social.fetch_user(&code).await?.into_identity(provider);
    let user = with_conn(&state.pool, move |conn| {
        users::find_or_create_social_user(conn, &identity)
    })
    .await?;
    log::info!("user {} signed in via {provider}", user.id);
    state.keys.issue(user.id)
}

// GET /auth/:provider/callback
pub async fn callback(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    Query(callback): Query<Callback>,
) -> Response {
    match finish_login(&state, &provider, callback).await {
        Ok(token) => found(with_param(&state.config.home_url, "token", &token)),
        Err(e) => {
            log::warn!("social login via {provider} failed: {e}");
            found(with_param(
                &state.config.login_url,
                "flash",
                "ログインに失敗しました。もう一度お試しください。",
            ))
        }
    }
}
