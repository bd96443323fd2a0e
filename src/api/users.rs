// Copyright 2023 Remi Bernotavicius

use super::{replace_image, with_conn, AppState, Json};
use crate::auth::{hash_password, verify_password, AuthUser};
use crate::error::{AppError, AppResult};
use crate::query::users;
use axum::extract::{Multipart, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde::Deserialize;
use serde_json::json;
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
pub struct Registration {
    #[validate(length(min = 1, max = 50, message = "名前は1〜50文字で入力してください"))]
    pub name: String,
    #[validate(email(message = "メールアドレスの形式が正しくありません"))]
    pub email: String,
    #[validate(length(min = 8, max = 128, message = "パスワードは8文字以上で入力してください"))]
    pub password: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct Login {
    #[validate(email(message = "メールアドレスの形式が正しくありません"))]
    pub email: String,
    #[validate(length(min = 1, message = "パスワードを入力してください"))]
    pub password: String,
}

/// Fields left out are not changed.
#[derive(Debug, Deserialize, Validate)]
pub struct ProfileUpdate {
    #[validate(length(min = 1, max = 50, message = "名前は1〜50文字で入力してください"))]
    pub name: Option<String>,
    #[validate(email(message = "メールアドレスの形式が正しくありません"))]
    pub email: Option<String>,
}

// POST /api/register
pub async fn register(
    State(state): State<AppState>,
    Json(form): Json<Registration>,
) -> AppResult<impl IntoResponse> {
    form.validate()?;

    let user = with_conn(&state.pool, move |conn| {
        let hash = hash_password(&form.password)?;
        users::create_user(conn, form.name.trim(), form.email.trim(), &hash)
    })
    .await?;
    let token = state.keys.issue(user.id)?;
    Ok((StatusCode::CREATED, Json(json!({ "user": user, "token": token }))))
}

// POST /api/login
pub async fn login(
    State(state): State<AppState>,
    Json(form): Json<Login>,
) -> AppResult<impl IntoResponse> {
    form.validate()?;

    let user = with_conn(&state.pool, move |conn| {
        let user = users::find_user_by_email(conn, form.email.trim())?;
        let verified = user.as_ref().is_some_and(|user| {
            user.password_hash
                .as_deref()
                .is_some_and(|hash| verify_password(&form.password, hash))
        });
        match user {
            Some(user) if verified => Ok(user),
            _ => Err(AppError::Unauthorized("メールアドレスまたはパスワードが違います")),
        }
    })
    .await?;
    log::info!("user {} signed in", user.id);
    let token = state.keys.issue(user.id)?;
    Ok(Json(json!({ "user": user, "token": token })))
}

// GET /api/user
pub async fn current_user(
    State(state): State<AppState>,
    auth: AuthUser,
) -> AppResult<impl IntoResponse> {
    let user = with_conn(&state.pool, move |conn| users::find_user(conn, auth.id)).await?;
    Ok(Json(json!({ "user": user })))
}

// PUT /api/user
pub async fn update_user(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(form): Json<ProfileUpdate>,
) -> AppResult<impl IntoResponse> {
    form.validate()?;

    let user = with_conn(&state.pool, move |conn| {
        users::update_profile(
            conn,
            auth.id,
            form.name.as_deref().map(str::trim),
            form.email.as_deref().map(str::trim),
        )
    })
    .await?;
    Ok(Json(json!({ "user": user })))
}

// POST /api/user/image
pub async fn upload_image(
    State(state): State<AppState>,
    auth: AuthUser,
    multipart: Multipart,
) -> AppResult<impl IntoResponse> {
    let path = replace_image(&state, "users", multipart, move |conn, path| {
        users::set_profile_image(conn, auth.id, path)
    })
    .await?;
    Ok(Json(json!({ "image": path })))
}
