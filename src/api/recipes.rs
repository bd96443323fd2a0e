// Copyright 2023 Remi Bernotavicius

use super::{delete_images, replace_image, with_conn, AppState, Json};
use crate::auth::AuthUser;
use crate::database::models::RecipeId;
use crate::error::AppResult;
use crate::query::recipes::{self, RecipeFilter, RecipeForm};
use crate::query::{goods, shopping_list};
use axum::extract::{Multipart, Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

// GET /api/recipe-categories
pub async fn categories(
    State(state): State<AppState>,
    auth: Option<AuthUser>,
) -> AppResult<impl IntoResponse> {
    let viewer = auth.map(|a| a.id);
    let categories = with_conn(&state.pool, move |conn| {
        recipes::recipe_category_counts(conn, viewer)
    })
    .await?;
    Ok(Json(json!({ "categories": categories })))
}

// GET /api/recipes
pub async fn list(
    State(state): State<AppState>,
    auth: Option<AuthUser>,
    Query(filter): Query<RecipeFilter>,
) -> AppResult<impl IntoResponse> {
    let viewer = auth.map(|a| a.id);
    let found = with_conn(&state.pool, move |conn| {
        recipes::list_recipes(conn, viewer, &filter)
    })
    .await?;
    Ok(Json(json!({ "recipes": found })))
}

// GET /api/recipes/:id
pub async fn show(
    State(state): State<AppState>,
    auth: Option<AuthUser>,
    Path(id): Path<RecipeId>,
) -> AppResult<impl IntoResponse> {
    let viewer = auth.map(|a| a.id);
    let recipe = with_conn(&state.pool, move |conn| recipes::get_recipe(conn, viewer, id)).await?;
    Ok(Json(json!({ "recipe": recipe })))
}

// POST /api/recipes
pub async fn create(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(form): Json<RecipeForm>,
) -> AppResult<impl IntoResponse> {
    let recipe = with_conn(&state.pool, move |conn| {
        let id = recipes::create_recipe(conn, auth.id, &form)?;
        recipes::get_recipe(conn, Some(auth.id), id)
    })
    .await?;
    Ok((StatusCode::CREATED, Json(json!({ "recipe": recipe }))))
}

// PUT /api/recipes/:id
pub async fn update(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<RecipeId>,
    Json(form): Json<RecipeForm>,
) -> AppResult<impl IntoResponse> {
    let (recipe, orphaned) = with_conn(&state.pool, move |conn| {
        let orphaned = recipes::update_recipe(conn, auth.id, id, &form)?;
        Ok((recipes::get_recipe(conn, Some(auth.id), id)?, orphaned))
    })
    .await?;
    delete_images(&state.storage, orphaned).await;
    Ok(Json(json!({ "recipe": recipe })))
}

// DELETE /api/recipes/:id
pub async fn delete(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<RecipeId>,
) -> AppResult<impl IntoResponse> {
    let images = with_conn(&state.pool, move |conn| {
        recipes::delete_recipe(conn, auth.id, id)
    })
    .await?;
    delete_images(&state.storage, images).await;
    Ok(StatusCode::NO_CONTENT)
}

// POST /api/recipes/:id/image
pub async fn upload_image(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<RecipeId>,
    multipart: Multipart,
) -> AppResult<impl IntoResponse> {
    // check before storing anything
    with_conn(&state.pool, move |conn| recipes::owned_recipe(conn, auth.id, id)).await?;
    let path = replace_image(&state, "recipes", multipart, move |conn, path| {
        recipes::set_recipe_image(conn, auth.id, id, path)
    })
    .await?;
    Ok(Json(json!({ "image": path })))
}

// POST /api/recipes/:id/instructions/:step/image
pub async fn upload_instruction_image(
    State(state): State<AppState>,
    auth: AuthUser,
    Path((id, step)): Path<(RecipeId, i32)>,
    multipart: Multipart,
) -> AppResult<impl IntoResponse> {
    with_conn(&state.pool, move |conn| recipes::owned_recipe(conn, auth.id, id)).await?;
    let path = replace_image(&state, "instructions", multipart, move |conn, path| {
        recipes::set_instruction_image(conn, auth.id, id, step, path)
    })
    .await?;
    Ok(Json(json!({ "image": path })))
}

// POST /api/recipes/:id/good
pub async fn toggle_good(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<RecipeId>,
) -> AppResult<impl IntoResponse> {
    let good = with_conn(&state.pool, move |conn| goods::toggle_good(conn, auth.id, id)).await?;
    Ok(Json(good))
}

// POST /api/recipes/:id/shopping-list
pub async fn add_missing_to_shopping_list(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<RecipeId>,
) -> AppResult<impl IntoResponse> {
    let added = with_conn(&state.pool, move |conn| {
        shopping_list::add_missing_to_shopping_list(conn, auth.id, id)
    })
    .await?;
    Ok(Json(json!({ "added": added })))
}
