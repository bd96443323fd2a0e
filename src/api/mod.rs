// Copyright 2023 Remi Bernotavicius

//! JSON handlers. Database work happens on the blocking pool through
//! [`with_conn`]; everything else stays on the async runtime.

use crate::auth::Keys;
use crate::config::Config;
use crate::database;
use crate::error::{AppError, AppResult};
use crate::social::SocialProviders;
use crate::storage::Storage;
use axum::async_trait;
use axum::extract::rejection::JsonRejection;
use axum::extract::{FromRef, FromRequest, Multipart, Request};
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use std::sync::Arc;

pub mod ingredients;
pub mod recipes;
pub mod refrigerator;
pub mod shopping_list;
pub mod social;
pub mod users;

#[cfg(test)]
mod tests;

#[derive(Clone)]
pub struct AppState {
    pub pool: database::Pool,
    pub keys: Keys,
    pub storage: Storage,
    pub social: SocialProviders,
    pub config: Arc<Config>,
}

impl FromRef<AppState> for Keys {
    fn from_ref(state: &AppState) -> Self {
        state.keys.clone()
    }
}

/// `axum::Json`, except a body that can't be read as `T` is answered with an
/// [`AppError`] like every other failure.
#[derive(Debug, Clone, Copy, Default)]
pub struct Json<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for Json<T>
where
    axum::Json<T>: FromRequest<S, Rejection = JsonRejection>,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let axum::Json(value) = axum::Json::<T>::from_request(req, state).await?;
        Ok(Self(value))
    }
}

impl<T: Serialize> IntoResponse for Json<T> {
    fn into_response(self) -> Response {
        axum::Json(self.0).into_response()
    }
}

/// Runs `f` on the blocking pool with a pooled connection.
pub async fn with_conn<T, F>(pool: &database::Pool, f: F) -> AppResult<T>
where
    F: FnOnce(&mut database::Connection) -> AppResult<T> + Send + 'static,
    T: Send + 'static,
{
    let pool = pool.clone();
    tokio::task::spawn_blocking(move || {
        let mut conn = pool.get()?;
        f(&mut conn)
    })
    .await?
}

/// The `image` field of a multipart upload.
pub async fn read_image(mut multipart: Multipart) -> AppResult<Vec<u8>> {
    while let Some(field) = multipart.next_field().await? {
        if field.name() == Some("image") {
            return Ok(field.bytes().await?.to_vec());
        }
    }
    Err(AppError::field("image", "required", "画像を選択してください"))
}

pub async fn store_image(
    storage: &Storage,
    dir: &'static str,
    bytes: Vec<u8>,
) -> AppResult<String> {
    let storage = storage.clone();
    tokio::task::spawn_blocking(move || storage.store(dir, &bytes)).await?
}

/// Files that are no longer referenced. Failing to delete one only leaves it behind.
pub async fn delete_images(storage: &Storage, paths: Vec<String>) {
    if paths.is_empty() {
        return;
    }
    let storage = storage.clone();
    let result = tokio::task::spawn_blocking(move || {
        for path in paths {
            if let Err(e) = storage.delete(&path) {
                log::warn!("failed to delete {path}: {e}");
            }
        }
    })
    .await;
    if let Err(e) = result {
        log::warn!("failed to delete images: {e}");
    }
}

/// Stores the upload, then records it with `set`, which returns the path it
/// replaced. The new file is removed again if `set` fails.
pub async fn replace_image<F>(
    state: &AppState,
    dir: &'static str,
    multipart: Multipart,
    set: F,
) -> AppResult<String>
where
    F: FnOnce(&mut database::Connection, &str) -> AppResult<Option<String>> + Send + 'static,
{
    let bytes = read_image(multipart).await?;
    let path = store_image(&state.storage, dir, bytes).await?;

    let stored = path.clone();
    match with_conn(&state.pool, move |conn| set(conn, &stored)).await {
        Ok(previous) => {
            delete_images(&state.storage, previous.into_iter().collect()).await;
            Ok(path)
        }
        Err(e) => {
            delete_images(&state.storage, vec![path]).await;
            Err(e)
        }
    }
}
