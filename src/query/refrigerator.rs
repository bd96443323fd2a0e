use super::ingredients::ensure_ingredients_exist;
use super::shopping_list::listed_ingredient_ids;
use crate::database;
use crate::database::models::{Ingredient, IngredientId, RefrigeratorEntry, UserId};
use crate::error::AppResult;
use diesel::ExpressionMethods as _;
use diesel::QueryDsl as _;
use diesel::RunQueryDsl as _;
use diesel::SelectableHelper as _;
use serde::Serialize;
use std::collections::BTreeSet;

pub fn list_refrigerator(
    conn: &mut database::Connection,
    user: UserId,
) -> AppResult<Vec<(RefrigeratorEntry, Ingredient)>> {
    use database::schema::{ingredients, refrigerators};

    Ok(refrigerators::table
        .inner_join(ingredients::table)
        .filter(refrigerators::user_id.eq(user))
        .select((RefrigeratorEntry::as_select(), Ingredient::as_select()))
        .order((ingredients::ingredient_category_id, ingredients::name))
        .load(conn)?)
}

pub fn owned_ingredient_ids(
    conn: &mut database::Connection,
    user: UserId,
) -> AppResult<BTreeSet<IngredientId>> {
    use database::schema::refrigerators::dsl::*;

    let owned: Vec<IngredientId> = refrigerators
        .select(ingredient_id)
        .filter(user_id.eq(user))
        .load(conn)?;
    Ok(owned.into_iter().collect())
}

/// Inserts the ingredients not yet in the user's refrigerator. Returns how many were added.
pub fn add_to_refrigerator(
    conn: &mut database::Connection,
    user: UserId,
    ids: &[IngredientId],
) -> AppResult<usize> {
    ensure_ingredients_exist(conn, "ingredient_ids", ids)?;

    conn.immediate_transaction(|conn| {
        let mut owned = owned_ingredient_ids(conn, user)?;
        insert_missing(conn, user, &mut owned, ids.iter().copied())
    })
}

/// Inserts each ingredient not already in `owned`, keeping `owned` current.
pub(super) fn insert_missing(
    conn: &mut database::Connection,
    user: UserId,
    owned: &mut BTreeSet<IngredientId>,
    ids: impl IntoIterator<Item = IngredientId>,
) -> AppResult<usize> {
    use database::schema::refrigerators::dsl::*;

    let mut added = 0;
    for new_id in ids {
        if !owned.insert(new_id) {
            continue;
        }
        diesel::insert_into(refrigerators)
            .values((user_id.eq(user), ingredient_id.eq(new_id)))
            .execute(conn)?;
        added += 1;
    }
    Ok(added)
}

/// Only ever touches the given user's rows. Returns how many were removed.
pub fn remove_from_refrigerator(
    conn: &mut database::Connection,
    user: UserId,
    ids: &[IngredientId],
) -> AppResult<usize> {
    use database::schema::refrigerators::dsl::*;

    Ok(diesel::delete(
        refrigerators
            .filter(user_id.eq(user))
            .filter(ingredient_id.eq_any(ids.iter().copied())),
    )
    .execute(conn)?)
}

#[derive(Debug, Default, Serialize, PartialEq, Eq)]
pub struct MovedToShoppingList {
    /// Removed from the refrigerator.
    pub removed: usize,
    /// Newly added to the shopping list.
    pub listed: usize,
}

/// Takes ingredients out of the refrigerator and puts them on the shopping
/// list, unless they're already on it.
pub fn move_to_shopping_list(
    conn: &mut database::Connection,
    user: UserId,
    ids: &[IngredientId],
) -> AppResult<MovedToShoppingList> {
    use database::schema::shopping_lists;

    conn.immediate_transaction(|conn| {
        let owned = owned_ingredient_ids(conn, user)?;
        let moving: BTreeSet<IngredientId> = ids
            .iter()
            .copied()
            .filter(|i| owned.contains(i))
            .collect();

        let moving_ids: Vec<IngredientId> = moving.iter().copied().collect();
        let removed = remove_from_refrigerator(conn, user, &moving_ids)?;

        let listed_already = listed_ingredient_ids(conn, user)?;
        let mut listed = 0;
        for new_id in moving.difference(&listed_already) {
            diesel::insert_into(shopping_lists::table)
                .values((
                    shopping_lists::user_id.eq(user),
                    shopping_lists::ingredient_id.eq(*new_id),
                ))
                .execute(conn)?;
            listed += 1;
        }

        log::info!("user {user} moved {removed} ingredients to the shopping list");
        Ok(MovedToShoppingList { removed, listed })
    })
}

#[test]
fn add_skips_duplicates() {
    use super::ingredients::test_catalog;
    use super::users::test_user;

    let mut conn = database::test_connection();
    let catalog = test_catalog(&mut conn);
    let hana = test_user(&mut conn, "hana");

    let added = add_to_refrigerator(
        &mut conn,
        hana.id,
        &[catalog.onion.id, catalog.carrot.id, catalog.onion.id],
    )
    .unwrap();
    assert_eq!(added, 2);

    let added =
        add_to_refrigerator(&mut conn, hana.id, &[catalog.carrot.id, catalog.pork.id]).unwrap();
    assert_eq!(added, 1);

    let listed: Vec<_> = list_refrigerator(&mut conn, hana.id)
        .unwrap()
        .into_iter()
        .map(|(_, i)| i.id)
        .collect();
    assert_eq!(listed.len(), 3);
    assert!(add_to_refrigerator(&mut conn, hana.id, &[999.into()]).is_err());
}

#[test]
fn remove_is_scoped_to_user() {
    use super::ingredients::test_catalog;
    use super::users::test_user;
    use maplit::btreeset;

    let mut conn = database::test_connection();
    let catalog = test_catalog(&mut conn);
    let hana = test_user(&mut conn, "hana");
    let taro = test_user(&mut conn, "taro");

    add_to_refrigerator(&mut conn, hana.id, &[catalog.onion.id, catalog.carrot.id]).unwrap();
    add_to_refrigerator(&mut conn, taro.id, &[catalog.onion.id]).unwrap();

    let removed = remove_from_refrigerator(&mut conn, hana.id, &[catalog.onion.id]).unwrap();
    assert_eq!(removed, 1);
    assert_eq!(
        owned_ingredient_ids(&mut conn, hana.id).unwrap(),
        btreeset! {catalog.carrot.id}
    );
    assert_eq!(
        owned_ingredient_ids(&mut conn, taro.id).unwrap(),
        btreeset! {catalog.onion.id}
    );
}

#[test]
fn move_to_shopping_list_skips_listed() {
    use super::ingredients::test_catalog;
    use super::shopping_list::{add_shopping_list_item, NewShoppingListItem};
    use super::users::test_user;
    use maplit::btreeset;

    let mut conn = database::test_connection();
    let catalog = test_catalog(&mut conn);
    let hana = test_user(&mut conn, "hana");

    add_to_refrigerator(&mut conn, hana.id, &[catalog.onion.id, catalog.carrot.id]).unwrap();
    add_shopping_list_item(
        &mut conn,
        hana.id,
        &NewShoppingListItem::Ingredient(catalog.carrot.id),
    )
    .unwrap();

    // potato isn't in the refrigerator, so it's ignored
    let moved = move_to_shopping_list(
        &mut conn,
        hana.id,
        &[catalog.onion.id, catalog.carrot.id, catalog.potato.id],
    )
    .unwrap();
    assert_eq!(moved, MovedToShoppingList { removed: 2, listed: 1 });
    assert!(owned_ingredient_ids(&mut conn, hana.id).unwrap().is_empty());
    assert_eq!(
        listed_ingredient_ids(&mut conn, hana.id).unwrap(),
        btreeset! {catalog.onion.id, catalog.carrot.id}
    );
}
