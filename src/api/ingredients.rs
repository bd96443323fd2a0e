use super::{with_conn, AppState};
use crate::database::models::{IngredientCategoryId, IngredientUnit};
use crate::error::AppResult;
use crate::query::ingredients::{self, IngredientFilter};
use axum::extract::{Query, State};
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use serde_json::json;

const SUGGESTION_LIMIT: i64 = 20;

// GET /api/ingredient-categories
pub async fn categories(State(state): State<AppState>) -> AppResult<impl IntoResponse> {
    let categories = with_conn(&state.pool, ingredients::list_ingredient_categories).await?;
    Ok(Json(json!({ "categories": categories })))
}

#[derive(Debug, Default, Deserialize)]
pub struct IngredientQuery {
    pub category: Option<IngredientCategoryId>,
    pub seasoning: Option<bool>,
    /// Search box text. Takes precedence over the other filters.
    pub q: Option<String>,
}

// GET /api/ingredients
pub async fn list(
    State(state): State<AppState>,
    Query(query): Query<IngredientQuery>,
) -> AppResult<impl IntoResponse> {
    let found = with_conn(&state.pool, move |conn| match query.q.as_deref() {
        Some(q) if !q.trim().is_empty() => {
            ingredients::search_ingredients(conn, q, SUGGESTION_LIMIT)
        }
        _ => {
            let filter = IngredientFilter {
                category: query.category,
                seasoning: query.seasoning,
            };
            ingredients::list_ingredients(conn, &filter)
        }
    })
    .await?;
    Ok(Json(json!({ "ingredients": found })))
}

// GET /api/units
pub async fn units() -> impl IntoResponse {
    let units: Vec<_> = IngredientUnit::iter()
        .map(|unit| json!({ "value": unit, "label": unit.to_string() }))
        .collect();
    Json(json!({ "units": units }))
}
