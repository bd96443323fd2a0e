use super::ingredients::{ensure_ingredients_exist, find_ingredient_by_name};
use super::recipes::{required_ingredient_ids, visible_recipe};
use super::refrigerator::{insert_missing, owned_ingredient_ids};
use crate::database;
use crate::database::models::{
    Ingredient, IngredientId, RecipeId, ShoppingListItem, ShoppingListItemId, UserId,
};
use crate::error::{AppError, AppResult};
use diesel::prelude::OptionalExtension as _;
use diesel::ExpressionMethods as _;
use diesel::QueryDsl as _;
use diesel::RunQueryDsl as _;
use diesel::SelectableHelper as _;
use serde::Serialize;
use std::collections::BTreeSet;

pub fn list_shopping_list(
    conn: &mut database::Connection,
    user: UserId,
) -> AppResult<Vec<(ShoppingListItem, Option<Ingredient>)>> {
    use database::schema::{ingredients, shopping_lists};

    Ok(shopping_lists::table
        .left_join(ingredients::table)
        .filter(shopping_lists::user_id.eq(user))
        .select((ShoppingListItem::as_select(), Option::<Ingredient>::as_select()))
        .order((shopping_lists::created_at, shopping_lists::id))
        .load(conn)?)
}

pub fn listed_ingredient_ids(
    conn: &mut database::Connection,
    user: UserId,
) -> AppResult<BTreeSet<IngredientId>> {
    use database::schema::shopping_lists::dsl::*;

    let listed: Vec<Option<IngredientId>> = shopping_lists
        .select(ingredient_id)
        .filter(user_id.eq(user))
        .filter(ingredient_id.is_not_null())
        .load(conn)?;
    Ok(listed.into_iter().flatten().collect())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NewShoppingListItem {
    Ingredient(IngredientId),
    Text(String),
}

#[derive(Debug, Serialize)]
#[serde(tag = "status", content = "item", rename_all = "snake_case")]
pub enum AddedShoppingListItem {
    Added(ShoppingListItem),
    /// The same thing was already on the list; nothing was inserted.
    Duplicate(ShoppingListItem),
}

impl AddedShoppingListItem {
    pub fn item(&self) -> &ShoppingListItem {
        match self {
            Self::Added(item) | Self::Duplicate(item) => item,
        }
    }
}

/// Free text naming a known ingredient is stored as that ingredient.
pub fn add_shopping_list_item(
    conn: &mut database::Connection,
    user: UserId,
    item: &NewShoppingListItem,
) -> AppResult<AddedShoppingListItem> {
    use database::schema::shopping_lists::dsl::*;

    let item = match item {
        NewShoppingListItem::Text(text) => {
            let text = text.trim();
            if text.is_empty() {
                return Err(AppError::field("name", "required", "買うものを入力してください"));
            }
            match find_ingredient_by_name(conn, text)? {
                Some(ingredient) => NewShoppingListItem::Ingredient(ingredient.id),
                None => NewShoppingListItem::Text(text.into()),
            }
        }
        NewShoppingListItem::Ingredient(new_id) => {
            ensure_ingredients_exist(conn, "ingredient_id", &[*new_id])?;
            NewShoppingListItem::Ingredient(*new_id)
        }
    };

    conn.immediate_transaction(|conn| {
        let mut existing = shopping_lists
            .select(ShoppingListItem::as_select())
            .filter(user_id.eq(user))
            .into_boxed();
        existing = match &item {
            NewShoppingListItem::Ingredient(new_id) => existing.filter(ingredient_id.eq(*new_id)),
            NewShoppingListItem::Text(text) => existing
                .filter(ingredient_id.is_null())
                .filter(name.eq(text)),
        };
        if let Some(existing) = existing.first(conn).optional()? {
            return Ok(AddedShoppingListItem::Duplicate(existing));
        }

        let (new_ingredient, new_name) = match &item {
            NewShoppingListItem::Ingredient(new_id) => (Some(*new_id), None),
            NewShoppingListItem::Text(text) => (None, Some(text.as_str())),
        };
        let added = diesel::insert_into(shopping_lists)
            .values((
                user_id.eq(user),
                ingredient_id.eq(new_ingredient),
                name.eq(new_name),
            ))
            .returning(ShoppingListItem::as_returning())
            .get_result(conn)?;
        Ok(AddedShoppingListItem::Added(added))
    })
}

/// Only ever touches the given user's rows. Returns how many were removed.
pub fn remove_shopping_list_items(
    conn: &mut database::Connection,
    user: UserId,
    ids: &[ShoppingListItemId],
) -> AppResult<usize> {
    use database::schema::shopping_lists::dsl::*;

    Ok(diesel::delete(
        shopping_lists
            .filter(user_id.eq(user))
            .filter(id.eq_any(ids.iter().copied())),
    )
    .execute(conn)?)
}

#[derive(Debug, Default, Serialize, PartialEq, Eq)]
pub struct MovedToRefrigerator {
    /// Newly added to the refrigerator.
    pub moved: usize,
    /// Bought, but the refrigerator already had them.
    pub already_owned: usize,
    /// Removed from the shopping list, free-text items included.
    pub removed: usize,
}

/// The bought items leave the shopping list; their ingredients go into the
/// refrigerator unless already there.
pub fn move_to_refrigerator(
    conn: &mut database::Connection,
    user: UserId,
    ids: &[ShoppingListItemId],
) -> AppResult<MovedToRefrigerator> {
    use database::schema::shopping_lists::dsl::*;

    conn.immediate_transaction(|conn| {
        let bought: Vec<Option<IngredientId>> = shopping_lists
            .select(ingredient_id)
            .filter(user_id.eq(user))
            .filter(id.eq_any(ids.iter().copied()))
            .load(conn)?;
        let bought: Vec<IngredientId> = bought.into_iter().flatten().collect();

        let mut owned = owned_ingredient_ids(conn, user)?;
        let moved = insert_missing(conn, user, &mut owned, bought.iter().copied())?;
        let removed = remove_shopping_list_items(conn, user, ids)?;

        log::info!("user {user} moved {moved} ingredients to the refrigerator");
        Ok(MovedToRefrigerator {
            moved,
            already_owned: bought.len() - moved,
            removed,
        })
    })
}

/// Lists the recipe's ingredients that are neither in the refrigerator nor
/// already on the list. Returns how many were added.
pub fn add_missing_to_shopping_list(
    conn: &mut database::Connection,
    user: UserId,
    recipe: RecipeId,
) -> AppResult<usize> {
    use database::schema::shopping_lists::dsl::*;

    visible_recipe(conn, Some(user), recipe)?;

    conn.immediate_transaction(|conn| {
        let required = required_ingredient_ids(conn, recipe)?;
        let owned = owned_ingredient_ids(conn, user)?;
        let listed = listed_ingredient_ids(conn, user)?;

        let mut added = 0;
        for missing in required.iter().filter(|i| !owned.contains(i) && !listed.contains(i)) {
            diesel::insert_into(shopping_lists)
                .values((user_id.eq(user), ingredient_id.eq(*missing)))
                .execute(conn)?;
            added += 1;
        }
        Ok(added)
    })
}

#[test]
fn duplicates_are_detected() {
    use super::ingredients::test_catalog;
    use super::users::test_user;

    let mut conn = database::test_connection();
    let catalog = test_catalog(&mut conn);
    let hana = test_user(&mut conn, "hana");

    let onion = NewShoppingListItem::Ingredient(catalog.onion.id);
    let first = add_shopping_list_item(&mut conn, hana.id, &onion).unwrap();
    assert!(matches!(first, AddedShoppingListItem::Added(_)));

    // naming a known ingredient is the same as picking it
    let by_name = NewShoppingListItem::Text(" 玉ねぎ".into());
    let second = add_shopping_list_item(&mut conn, hana.id, &by_name).unwrap();
    assert!(matches!(second, AddedShoppingListItem::Duplicate(_)));
    assert_eq!(second.item().id, first.item().id);

    let foil = NewShoppingListItem::Text("アルミホイル".into());
    let added = add_shopping_list_item(&mut conn, hana.id, &foil).unwrap();
    assert_eq!(added.item().name.as_deref(), Some("アルミホイル"));
    assert_eq!(added.item().ingredient_id, None);
    assert!(matches!(
        add_shopping_list_item(&mut conn, hana.id, &foil).unwrap(),
        AddedShoppingListItem::Duplicate(_)
    ));

    let blank = NewShoppingListItem::Text("  ".into());
    assert!(add_shopping_list_item(&mut conn, hana.id, &blank).is_err());
    assert_eq!(list_shopping_list(&mut conn, hana.id).unwrap().len(), 2);
}

#[test]
fn removing_is_scoped_to_owner() {
    use super::ingredients::test_catalog;
    use super::users::test_user;

    let mut conn = database::test_connection();
    let catalog = test_catalog(&mut conn);
    let hana = test_user(&mut conn, "hana");
    let taro = test_user(&mut conn, "taro");

    let onion = NewShoppingListItem::Ingredient(catalog.onion.id);
    let hanas = add_shopping_list_item(&mut conn, hana.id, &onion)
        .unwrap()
        .item()
        .id;
    let taros = add_shopping_list_item(&mut conn, taro.id, &onion)
        .unwrap()
        .item()
        .id;

    // taro can't delete hana's row, even by id
    assert_eq!(remove_shopping_list_items(&mut conn, taro.id, &[hanas]).unwrap(), 0);
    assert_eq!(list_shopping_list(&mut conn, hana.id).unwrap().len(), 1);

    assert_eq!(remove_shopping_list_items(&mut conn, hana.id, &[hanas, taros]).unwrap(), 1);
    assert!(list_shopping_list(&mut conn, hana.id).unwrap().is_empty());
    assert_eq!(list_shopping_list(&mut conn, taro.id).unwrap().len(), 1);
}

#[test]
fn moving_to_refrigerator() {
    use super::ingredients::test_catalog;
    use super::refrigerator::add_to_refrigerator;
    use super::users::test_user;
    use maplit::btreeset;

    let mut conn = database::test_connection();
    let catalog = test_catalog(&mut conn);
    let hana = test_user(&mut conn, "hana");

    add_to_refrigerator(&mut conn, hana.id, &[catalog.carrot.id]).unwrap();
    let mut ids = vec![];
    for item in [
        NewShoppingListItem::Ingredient(catalog.onion.id),
        NewShoppingListItem::Ingredient(catalog.carrot.id),
        NewShoppingListItem::Text("キッチンペーパー".into()),
    ] {
        ids.push(add_shopping_list_item(&mut conn, hana.id, &item).unwrap().item().id);
    }
    let potato = NewShoppingListItem::Ingredient(catalog.potato.id);
    let potato = add_shopping_list_item(&mut conn, hana.id, &potato)
        .unwrap()
        .item()
        .id;

    let outcome = move_to_refrigerator(&mut conn, hana.id, &ids).unwrap();
    assert_eq!(
        outcome,
        MovedToRefrigerator {
            moved: 1,
            already_owned: 1,
            removed: 3,
        }
    );
    assert_eq!(
        owned_ingredient_ids(&mut conn, hana.id).unwrap(),
        btreeset! {catalog.onion.id, catalog.carrot.id}
    );

    // the potato wasn't selected, so it stays on the list
    let left: Vec<_> = list_shopping_list(&mut conn, hana.id)
        .unwrap()
        .into_iter()
        .map(|(item, _)| item.id)
        .collect();
    assert_eq!(left, vec![potato]);
}
