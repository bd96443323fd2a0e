use super::{with_conn, AppState, Json};
use crate::auth::AuthUser;
use crate::database::models::{Ingredient, IngredientCategory, IngredientId};
use crate::error::{AppError, AppResult};
use crate::query::{ingredients, refrigerator};
use axum::extract::{Path, State};
use axum::response::IntoResponse;
use serde::{Deserialize, Serialize};
use serde_json::json;
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
pub struct IngredientIds {
    #[validate(length(min = 1, message = "食材を選択してください"))]
    pub ingredient_ids: Vec<IngredientId>,
}

#[derive(Debug, Serialize)]
pub struct CategoryShelf {
    pub category: IngredientCategory,
    pub ingredients: Vec<Ingredient>,
}

// GET /api/refrigerator
pub async fn list(State(state): State<AppState>, auth: AuthUser) -> AppResult<impl IntoResponse> {
    let shelves = with_conn(&state.pool, move |conn| {
        let owned = refrigerator::list_refrigerator(conn, auth.id)?;
        let mut shelves = vec![];
        for category in ingredients::list_ingredient_categories(conn)? {
            let in_category: Vec<Ingredient> = owned
                .iter()
                .filter(|(_, i)| i.ingredient_category_id == category.id)
                .map(|(_, i)| i.clone())
                .collect();
            if !in_category.is_empty() {
                shelves.push(CategoryShelf {
                    category,
                    ingredients: in_category,
                });
            }
        }
        Ok(shelves)
    })
    .await?;
    Ok(Json(json!({ "refrigerator": shelves })))
}

// POST /api/refrigerator
pub async fn add(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(form): Json<IngredientIds>,
) -> AppResult<impl IntoResponse> {
    form.validate()?;
    let added = with_conn(&state.pool, move |conn| {
        refrigerator::add_to_refrigerator(conn, auth.id, &form.ingredient_ids)
    })
    .await?;
    Ok(Json(json!({ "added": added })))
}

// DELETE /api/refrigerator/:ingredient_id
pub async fn remove_one(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(ingredient_id): Path<IngredientId>,
) -> AppResult<impl IntoResponse> {
    let removed = with_conn(&state.pool, move |conn| {
        refrigerator::remove_from_refrigerator(conn, auth.id, &[ingredient_id])
    })
    .await?;
    if removed == 0 {
        return Err(AppError::NotFound);
    }
    Ok(Json(json!({ "removed": removed })))
}

// POST /api/refrigerator/remove
pub async fn remove(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(form): Json<IngredientIds>,
) -> AppResult<impl IntoResponse> {
    form.validate()?;
    let removed = with_conn(&state.pool, move |conn| {
        refrigerator::remove_from_refrigerator(conn, auth.id, &form.ingredient_ids)
    })
    .await?;
    Ok(Json(json!({ "removed": removed })))
}

// POST /api/refrigerator/to-shopping-list
pub async fn to_shopping_list(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(form): Json<IngredientIds>,
) -> AppResult<impl IntoResponse> {
    form.validate()?;
    let moved = with_conn(&state.pool, move |conn| {
        refrigerator::move_to_shopping_list(conn, auth.id, &form.ingredient_ids)
    })
    .await?;
    Ok(Json(moved))
}
