use super::{with_conn, AppState, Json};
use crate::auth::AuthUser;
use crate::database::models::{Ingredient, IngredientId, ShoppingListItem, ShoppingListItemId};
use crate::error::{AppError, AppResult};
use crate::query::shopping_list::{self, AddedShoppingListItem, NewShoppingListItem};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde::{Deserialize, Serialize};
use serde_json::json;
use validator::Validate;

#[derive(Debug, Serialize)]
pub struct ShoppingListEntry {
    #[serde(flatten)]
    pub item: ShoppingListItem,
    pub ingredient: Option<Ingredient>,
}

// GET /api/shopping-list
pub async fn list(State(state): State<AppState>, auth: AuthUser) -> AppResult<impl IntoResponse> {
    let items = with_conn(&state.pool, move |conn| {
        shopping_list::list_shopping_list(conn, auth.id)
    })
    .await?;
    let items: Vec<_> = items
        .into_iter()
        .map(|(item, ingredient)| ShoppingListEntry { item, ingredient })
        .collect();
    Ok(Json(json!({ "shopping_list": items })))
}

/// Either a known ingredient or free text.
#[derive(Debug, Deserialize)]
pub struct NewItemForm {
    pub ingredient_id: Option<IngredientId>,
    pub name: Option<String>,
}

impl NewItemForm {
    fn into_item(self) -> AppResult<NewShoppingListItem> {
        match (self.ingredient_id, self.name) {
            (Some(id), _) => Ok(NewShoppingListItem::Ingredient(id)),
            (None, Some(name)) => Ok(NewShoppingListItem::Text(name)),
            (None, None) => Err(AppError::field("name", "required", "買うものを入力してください")),
        }
    }
}

// POST /api/shopping-list
pub async fn add(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(form): Json<NewItemForm>,
) -> AppResult<impl IntoResponse> {
    let item = form.into_item()?;
    let added = with_conn(&state.pool, move |conn| {
        shopping_list::add_shopping_list_item(conn, auth.id, &item)
    })
    .await?;
    let status = match added {
        AddedShoppingListItem::Added(_) => StatusCode::CREATED,
        AddedShoppingListItem::Duplicate(_) => StatusCode::OK,
    };
    Ok((status, Json(added)))
}

#[derive(Debug, Deserialize, Validate)]
pub struct ItemIds {
    #[validate(length(min = 1, message = "項目を選択してください"))]
    pub ids: Vec<ShoppingListItemId>,
}

// DELETE /api/shopping-list/:id
pub async fn remove_one(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<ShoppingListItemId>,
) -> AppResult<impl IntoResponse> {
    let removed = with_conn(&state.pool, move |conn| {
        shopping_list::remove_shopping_list_items(conn, auth.id, &[id])
    })
    .await?;
    if removed == 0 {
        return Err(AppError::NotFound);
    }
    Ok(Json(json!({ "removed": removed })))
}

// POST /api/shopping-list/remove
pub async fn remove(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(form): Json<ItemIds>,
) -> AppResult<impl IntoResponse> {
    form.validate()?;
    let removed = with_conn(&state.pool, move |conn| {
        shopping_list::remove_shopping_list_items(conn, auth.id, &form.ids)
    })
    .await?;
    Ok(Json(json!({ "removed": removed })))
}

// POST /api/shopping-list/to-refrigerator
pub async fn to_refrigerator(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(form): Json<ItemIds>,
) -> AppResult<impl IntoResponse> {
    form.validate()?;
    let moved = with_conn(&state.pool, move |conn| {
        shopping_list::move_to_refrigerator(conn, auth.id, &form.ids)
    })
    .await?;
    Ok(Json(moved))
}
