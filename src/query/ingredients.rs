use crate::database;
use crate::database::models::{Ingredient, IngredientCategory, IngredientCategoryId, IngredientId};
use crate::error::{AppError, AppResult};
use diesel::prelude::OptionalExtension as _;
use diesel::ExpressionMethods as _;
use diesel::QueryDsl as _;
use diesel::RunQueryDsl as _;
use diesel::SelectableHelper as _;
use std::collections::BTreeSet;

pub fn list_ingredient_categories(
    conn: &mut database::Connection,
) -> AppResult<Vec<IngredientCategory>> {
    use database::schema::ingredient_categories::dsl::*;

    Ok(ingredient_categories
        .select(IngredientCategory::as_select())
        .order(id)
        .load(conn)?)
}

#[derive(Debug, Default, Clone)]
pub struct IngredientFilter {
    pub category: Option<IngredientCategoryId>,
    pub seasoning: Option<bool>,
}

pub fn list_ingredients(
    conn: &mut database::Connection,
    filter: &IngredientFilter,
) -> AppResult<Vec<Ingredient>> {
    use database::schema::ingredients::dsl::*;

    let mut query = ingredients.select(Ingredient::as_select()).into_boxed();
    if let Some(category) = filter.category {
        query = query.filter(ingredient_category_id.eq(category));
    }
    if let Some(seasoning) = filter.seasoning {
        query = query.filter(is_seasoning.eq(seasoning));
    }
    Ok(query.order((ingredient_category_id, name)).load(conn)?)
}

/// Suggestions for the ingredient search box.
pub fn search_ingredients(
    conn: &mut database::Connection,
    query: &str,
    limit: i64,
) -> AppResult<Vec<Ingredient>> {
    use database::schema::ingredients::dsl::*;
    use diesel::expression_methods::{EscapeExpressionMethods as _, TextExpressionMethods as _};

    let query = query.trim();
    if query.is_empty() {
        return Ok(vec![]);
    }

    Ok(ingredients
        .select(Ingredient::as_select())
        .filter(name.like(super::contains_pattern(query)).escape('\\'))
        .order(name)
        .limit(limit)
        .load(conn)?)
}

pub fn find_ingredient_by_name(
    conn: &mut database::Connection,
    find_name: &str,
) -> AppResult<Option<Ingredient>> {
    use database::schema::ingredients::dsl::*;

    Ok(ingredients
        .select(Ingredient::as_select())
        .filter(name.eq(find_name.trim()))
        .get_result(conn)
        .optional()?)
}

/// Fails with a field error on `field` unless every id names an ingredient.
pub fn ensure_ingredients_exist(
    conn: &mut database::Connection,
    field: &'static str,
    ids: &[IngredientId],
) -> AppResult<()> {
    use database::schema::ingredients::dsl::*;

    let wanted: BTreeSet<IngredientId> = ids.iter().copied().collect();
    let found: i64 = ingredients
        .filter(id.eq_any(wanted.iter().copied()))
        .count()
        .get_result(conn)?;
    if found as usize != wanted.len() {
        return Err(AppError::field(field, "unknown", "存在しない食材が含まれています"));
    }
    Ok(())
}

/// Returns the id of the category with this name, creating it if needed, and
/// whether it was created.
pub fn add_ingredient_category(
    conn: &mut database::Connection,
    new_name: &str,
    new_image: Option<&str>,
) -> AppResult<(IngredientCategoryId, bool)> {
    use database::schema::ingredient_categories::dsl::*;

    let existing: Option<IngredientCategoryId> = ingredient_categories
        .select(id)
        .filter(name.eq(new_name))
        .get_result(conn)
        .optional()?;
    if let Some(existing) = existing {
        if new_image.is_some() {
            diesel::update(ingredient_categories.find(existing))
                .set(image.eq(new_image))
                .execute(conn)?;
        }
        return Ok((existing, false));
    }

    let new_id: IngredientCategoryId = diesel::insert_into(ingredient_categories)
        .values((name.eq(new_name), image.eq(new_image)))
        .returning(id)
        .get_result(conn)?;
    Ok((new_id, true))
}

/// Returns the ingredient with this name, creating it if needed, and whether
/// it was created.
pub fn add_ingredient(
    conn: &mut database::Connection,
    new_name: &str,
    category: IngredientCategoryId,
    seasoning: bool,
) -> AppResult<(Ingredient, bool)> {
    use database::schema::ingredients::dsl::*;

    if let Some(existing) = find_ingredient_by_name(conn, new_name)? {
        return Ok((existing, false));
    }

    let ingredient = diesel::insert_into(ingredients)
        .values((
            name.eq(new_name.trim()),
            ingredient_category_id.eq(category),
            is_seasoning.eq(seasoning),
        ))
        .returning(Ingredient::as_returning())
        .get_result(conn)?;
    Ok((ingredient, true))
}

/// A small catalog shared by the query tests: a few categories, a handful of
/// ingredients, one of them a seasoning.
#[cfg(test)]
pub struct TestCatalog {
    pub vegetables: IngredientCategoryId,
    pub seasonings: IngredientCategoryId,
    pub onion: Ingredient,
    pub carrot: Ingredient,
    pub potato: Ingredient,
    pub pork: Ingredient,
    pub soy_sauce: Ingredient,
}

#[cfg(test)]
pub fn test_catalog(conn: &mut database::Connection) -> TestCatalog {
    let (vegetables, _) = add_ingredient_category(conn, "野菜", None).unwrap();
    let (meat, _) = add_ingredient_category(conn, "肉", None).unwrap();
    let (seasonings, _) = add_ingredient_category(conn, "調味料", None).unwrap();
    TestCatalog {
        vegetables,
        seasonings,
        onion: add_ingredient(conn, "玉ねぎ", vegetables, false).unwrap().0,
        carrot: add_ingredient(conn, "にんじん", vegetables, false).unwrap().0,
        potato: add_ingredient(conn, "じゃがいも", vegetables, false).unwrap().0,
        pork: add_ingredient(conn, "豚肉", meat, false).unwrap().0,
        soy_sauce: add_ingredient(conn, "醤油", seasonings, true).unwrap().0,
    }
}

#[test]
fn get_or_create_by_name() {
    let mut conn = database::test_connection();
    let (category, created) = add_ingredient_category(&mut conn, "野菜", None).unwrap();
    assert!(created);
    let (again, created) =
        add_ingredient_category(&mut conn, "野菜", Some("vegetables.png")).unwrap();
    assert_eq!(category, again);
    assert!(!created);
    assert_eq!(
        list_ingredient_categories(&mut conn).unwrap()[0].image.as_deref(),
        Some("vegetables.png")
    );

    let (onion, created) = add_ingredient(&mut conn, "玉ねぎ", category, false).unwrap();
    assert!(created);
    let (same, created) = add_ingredient(&mut conn, " 玉ねぎ ", category, false).unwrap();
    assert_eq!(onion.id, same.id);
    assert!(!created);
}

#[test]
fn filter_and_search() {
    let mut conn = database::test_connection();
    let catalog = test_catalog(&mut conn);

    let seasonings = list_ingredients(
        &mut conn,
        &IngredientFilter {
            seasoning: Some(true),
            ..Default::default()
        },
    )
    .unwrap();
    let names: Vec<_> = seasonings.iter().map(|i| i.name.as_str()).collect();
    assert_eq!(names, ["醤油"]);

    let vegetables = list_ingredients(
        &mut conn,
        &IngredientFilter {
            category: Some(catalog.vegetables),
            ..Default::default()
        },
    )
    .unwrap();
    assert_eq!(vegetables.len(), 3);
    let in_seasonings = list_ingredients(
        &mut conn,
        &IngredientFilter {
            category: Some(catalog.seasonings),
            ..Default::default()
        },
    )
    .unwrap();
    assert_eq!(in_seasonings.len(), 1);
    assert_eq!(in_seasonings[0].id, catalog.soy_sauce.id);

    let found = search_ingredients(&mut conn, "ねぎ", 10).unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].id, catalog.onion.id);
    assert!(search_ingredients(&mut conn, "  ", 10).unwrap().is_empty());
    // wildcards are matched literally
    assert!(search_ingredients(&mut conn, "%", 10).unwrap().is_empty());
    assert!(search_ingredients(&mut conn, "_", 10).unwrap().is_empty());

    ensure_ingredients_exist(&mut conn, "ids", &[catalog.onion.id, catalog.onion.id]).unwrap();
    assert!(ensure_ingredients_exist(&mut conn, "ids", &[catalog.onion.id, 999.into()]).is_err());
}
