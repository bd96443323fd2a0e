use super::recipes::visible_recipe;
use crate::database;
use crate::database::models::{GoodId, RecipeId, UserId};
use crate::error::AppResult;
use diesel::prelude::OptionalExtension as _;
use diesel::ExpressionMethods as _;
use diesel::QueryDsl as _;
use diesel::RunQueryDsl as _;
use serde::Serialize;
use std::collections::BTreeSet;

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct GoodState {
    pub liked: bool,
    pub count: i64,
}

pub fn good_count(conn: &mut database::Connection, recipe: RecipeId) -> AppResult<i64> {
    use database::schema::goods::dsl::*;

    Ok(goods.filter(recipe_id.eq(recipe)).count().get_result(conn)?)
}

pub fn liked_recipe_ids(
    conn: &mut database::Connection,
    user: UserId,
) -> AppResult<BTreeSet<RecipeId>> {
    use database::schema::goods::dsl::*;

    let liked: Vec<RecipeId> = goods.select(recipe_id).filter(user_id.eq(user)).load(conn)?;
    Ok(liked.into_iter().collect())
}

/// Likes the recipe, or takes the like back if the user already gave one.
pub fn toggle_good(
    conn: &mut database::Connection,
    user: UserId,
    recipe: RecipeId,
) -> AppResult<GoodState> {
    use database::schema::goods::dsl::*;

    visible_recipe(conn, Some(user), recipe)?;

    conn.immediate_transaction(|conn| {
        let existing = goods
            .select(id)
            .filter(user_id.eq(user))
            .filter(recipe_id.eq(recipe))
            .get_result::<GoodId>(conn)
            .optional()?;

        let liked = match existing {
            Some(existing) => {
                diesel::delete(goods.find(existing)).execute(conn)?;
                false
            }
            None => {
                diesel::insert_into(goods)
                    .values((user_id.eq(user), recipe_id.eq(recipe)))
                    .execute(conn)?;
                true
            }
        };
        Ok(GoodState {
            liked,
            count: good_count(conn, recipe)?,
        })
    })
}

#[test]
fn toggle_twice_restores() {
    use super::recipes::test_recipe;
    use super::users::test_user;

    let mut conn = database::test_connection();
    let hana = test_user(&mut conn, "hana");
    let taro = test_user(&mut conn, "taro");
    let recipe = test_recipe(&mut conn, hana.id);

    assert_eq!(
        toggle_good(&mut conn, taro.id, recipe).unwrap(),
        GoodState { liked: true, count: 1 }
    );
    assert_eq!(
        toggle_good(&mut conn, hana.id, recipe).unwrap(),
        GoodState { liked: true, count: 2 }
    );
    assert!(liked_recipe_ids(&mut conn, taro.id).unwrap().contains(&recipe));

    assert_eq!(
        toggle_good(&mut conn, taro.id, recipe).unwrap(),
        GoodState { liked: false, count: 1 }
    );
    assert!(liked_recipe_ids(&mut conn, taro.id).unwrap().is_empty());
    assert_eq!(good_count(&mut conn, recipe).unwrap(), 1);
}

#[test]
fn cannot_like_hidden_recipe() {
    use super::recipes::{set_published, test_recipe};
    use super::users::test_user;

    let mut conn = database::test_connection();
    let hana = test_user(&mut conn, "hana");
    let taro = test_user(&mut conn, "taro");
    let recipe = test_recipe(&mut conn, hana.id);
    set_published(&mut conn, recipe, false);

    assert!(toggle_good(&mut conn, taro.id, recipe).is_err());
    assert_eq!(good_count(&mut conn, recipe).unwrap(), 0);
}
