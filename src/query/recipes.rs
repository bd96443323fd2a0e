// Copyright 2023 Remi Bernotavicius

use super::goods::liked_recipe_ids;
use super::ingredients::ensure_ingredients_exist;
use super::refrigerator::owned_ingredient_ids;
use crate::cookable;
use crate::database;
use crate::database::models::{
    Author, Ingredient, IngredientId, IngredientUnit, Instruction, NewInstruction, NewRecipe,
    NewRecipeIngredient, Recipe, RecipeCategory, RecipeCategoryId, RecipeId, RecipeIngredient,
    UserId,
};
use crate::error::{AppError, AppResult};
use diesel::prelude::OptionalExtension as _;
use diesel::expression::BoxableExpression;
use diesel::sql_types::Bool;
use diesel::sqlite::Sqlite;
use diesel::BelongingToDsl as _;
use diesel::BoolExpressionMethods as _;
use diesel::ExpressionMethods as _;
use diesel::QueryDsl as _;
use diesel::RunQueryDsl as _;
use diesel::SelectableHelper as _;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::{BTreeMap, BTreeSet};
use validator::{Validate, ValidationError, ValidationErrors};

pub fn list_recipe_categories(conn: &mut database::Connection) -> AppResult<Vec<RecipeCategory>> {
    use database::schema::recipe_categories::dsl::*;

    Ok(recipe_categories
        .select(RecipeCategory::as_select())
        .order(id)
        .load(conn)?)
}

/// Returns the id of the category with this name, creating it if needed, and
/// whether it was created.
pub fn add_recipe_category(
    conn: &mut database::Connection,
    new_name: &str,
    new_image: Option<&str>,
) -> AppResult<(RecipeCategoryId, bool)> {
    use database::schema::recipe_categories::dsl::*;

    let existing: Option<RecipeCategoryId> = recipe_categories
        .select(id)
        .filter(name.eq(new_name))
        .get_result(conn)
        .optional()?;
    if let Some(existing) = existing {
        if new_image.is_some() {
            diesel::update(recipe_categories.find(existing))
                .set(image.eq(new_image))
                .execute(conn)?;
        }
        return Ok((existing, false));
    }

    let new_id: RecipeCategoryId = diesel::insert_into(recipe_categories)
        .values((name.eq(new_name), image.eq(new_image)))
        .returning(id)
        .get_result(conn)?;
    Ok((new_id, true))
}

/// Published recipes, plus the viewer's own drafts.
fn visible_to(
    viewer: Option<UserId>,
) -> Box<dyn BoxableExpression<database::schema::recipes::table, Sqlite, SqlType = Bool>> {
    use database::schema::recipes::dsl::*;

    match viewer {
        Some(viewer) => Box::new(is_published.eq(true).or(user_id.eq(viewer))),
        None => Box::new(is_published.eq(true)),
    }
}

/// Not-found unless `viewer` may see the recipe.
pub fn visible_recipe(
    conn: &mut database::Connection,
    viewer: Option<UserId>,
    recipe: RecipeId,
) -> AppResult<Recipe> {
    use database::schema::recipes::dsl::*;

    let found = recipes
        .find(recipe)
        .select(Recipe::as_select())
        .get_result(conn)
        .optional()?
        .ok_or(AppError::NotFound)?;
    if !found.is_published && Some(found.user_id) != viewer {
        return Err(AppError::NotFound);
    }
    Ok(found)
}

/// Forbidden unless `user` wrote the recipe.
pub fn owned_recipe(
    conn: &mut database::Connection,
    user: UserId,
    recipe: RecipeId,
) -> AppResult<Recipe> {
    let found = visible_recipe(conn, Some(user), recipe)?;
    if found.user_id != user {
        return Err(AppError::Forbidden("only the author can change this recipe"));
    }
    Ok(found)
}

pub fn required_ingredient_ids(
    conn: &mut database::Connection,
    recipe: RecipeId,
) -> AppResult<BTreeSet<IngredientId>> {
    Ok(required_by_recipe(conn, &[recipe])?
        .remove(&recipe)
        .unwrap_or_default())
}

fn required_by_recipe(
    conn: &mut database::Connection,
    ids: &[RecipeId],
) -> AppResult<BTreeMap<RecipeId, BTreeSet<IngredientId>>> {
    use database::schema::recipe_ingredients::dsl::*;

    let rows: Vec<(RecipeId, IngredientId)> = recipe_ingredients
        .select((recipe_id, ingredient_id))
        .filter(recipe_id.eq_any(ids.iter().copied()))
        .load(conn)?;

    let mut required: BTreeMap<RecipeId, BTreeSet<IngredientId>> = BTreeMap::new();
    for (recipe, ingredient) in rows {
        required.entry(recipe).or_default().insert(ingredient);
    }
    Ok(required)
}

fn good_counts(
    conn: &mut database::Connection,
    ids: &[RecipeId],
) -> AppResult<BTreeMap<RecipeId, i64>> {
    use database::schema::goods::dsl::*;

    let counts: Vec<(RecipeId, i64)> = goods
        .filter(recipe_id.eq_any(ids.iter().copied()))
        .group_by(recipe_id)
        .select((recipe_id, diesel::dsl::count_star()))
        .load(conn)?;
    Ok(counts.into_iter().collect())
}

fn owned_by(
    conn: &mut database::Connection,
    viewer: Option<UserId>,
) -> AppResult<Option<BTreeSet<IngredientId>>> {
    viewer.map(|v| owned_ingredient_ids(conn, v)).transpose()
}

#[derive(Debug, Serialize)]
pub struct RecipeCategoryCount {
    #[serde(flatten)]
    pub category: RecipeCategory,
    pub recipes: usize,
    /// Only known for a signed-in viewer.
    pub cookable: Option<usize>,
}

pub fn recipe_category_counts(
    conn: &mut database::Connection,
    viewer: Option<UserId>,
) -> AppResult<Vec<RecipeCategoryCount>> {
    use database::schema::recipes::dsl::*;

    let visible: Vec<(RecipeId, RecipeCategoryId)> = recipes
        .select((id, recipe_category_id))
        .filter(visible_to(viewer))
        .load(conn)?;
    let ids: Vec<RecipeId> = visible.iter().map(|(r, _)| *r).collect();
    let required = required_by_recipe(conn, &ids)?;
    let owned = owned_by(conn, viewer)?;
    let none = BTreeSet::new();

    let mut counts = vec![];
    for category in list_recipe_categories(conn)? {
        let in_category: Vec<RecipeId> = visible
            .iter()
            .filter(|(_, c)| *c == category.id)
            .map(|(r, _)| *r)
            .collect();
        let cookable = owned.as_ref().map(|owned| {
            in_category
                .iter()
                .filter(|r| cookable::is_cookable(required.get(r).unwrap_or(&none), owned))
                .count()
        });
        counts.push(RecipeCategoryCount {
            category,
            recipes: in_category.len(),
            cookable,
        });
    }
    Ok(counts)
}

#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default)]
pub struct RecipeFilter {
    pub category: Option<RecipeCategoryId>,
    #[serde(rename = "q")]
    pub query: Option<String>,
    /// Only recipes the viewer can cook with what's in their refrigerator.
    pub cookable: bool,
    pub mine: bool,
    pub liked: bool,
}

#[derive(Debug, Serialize)]
pub struct RecipeSummary {
    #[serde(flatten)]
    pub recipe: Recipe,
    pub author: Author,
    pub goods: i64,
    pub liked: bool,
    pub cookable: bool,
}

/// Newest first.
pub fn list_recipes(
    conn: &mut database::Connection,
    viewer: Option<UserId>,
    filter: &RecipeFilter,
) -> AppResult<Vec<RecipeSummary>> {
    use database::schema::{recipes, users};
    use diesel::expression_methods::{EscapeExpressionMethods as _, TextExpressionMethods as _};

    if viewer.is_none() && (filter.cookable || filter.mine || filter.liked) {
        return Ok(vec![]);
    }
    let liked = match viewer {
        Some(viewer) => liked_recipe_ids(conn, viewer)?,
        None => BTreeSet::new(),
    };

    let mut query = recipes::table
        .select(Recipe::as_select())
        .into_boxed()
        .filter(visible_to(viewer));
    if let Some(category) = filter.category {
        query = query.filter(recipes::recipe_category_id.eq(category));
    }
    if let Some(name) = filter
        .query
        .as_deref()
        .map(str::trim)
        .filter(|q| !q.is_empty())
    {
        query = query.filter(recipes::name.like(super::contains_pattern(name)).escape('\\'));
    }
    if let (true, Some(viewer)) = (filter.mine, viewer) {
        query = query.filter(recipes::user_id.eq(viewer));
    }
    if filter.liked {
        query = query.filter(recipes::id.eq_any(liked.iter().copied()));
    }
    let found: Vec<Recipe> = query
        .order((recipes::created_at.desc(), recipes::id.desc()))
        .load(conn)?;

    let ids: Vec<RecipeId> = found.iter().map(|r| r.id).collect();
    let author_ids: BTreeSet<UserId> = found.iter().map(|r| r.user_id).collect();
    let authors: Vec<Author> = users::table
        .select(Author::as_select())
        .filter(users::id.eq_any(author_ids.iter().copied()))
        .load(conn)?;
    let authors: BTreeMap<UserId, Author> = authors.into_iter().map(|a| (a.id, a)).collect();
    let counts = good_counts(conn, &ids)?;
    let required = required_by_recipe(conn, &ids)?;
    let owned = owned_by(conn, viewer)?;
    let none = BTreeSet::new();

    let mut summaries = vec![];
    for recipe in found {
        let cookable = owned.as_ref().is_some_and(|owned| {
            cookable::is_cookable(required.get(&recipe.id).unwrap_or(&none), owned)
        });
        if filter.cookable && !cookable {
            continue;
        }
        let author = authors.get(&recipe.user_id).cloned().ok_or(AppError::NotFound)?;
        summaries.push(RecipeSummary {
            author,
            goods: counts.get(&recipe.id).copied().unwrap_or(0),
            liked: liked.contains(&recipe.id),
            cookable,
            recipe,
        });
    }
    Ok(summaries)
}

#[derive(Debug, Serialize)]
pub struct RecipeIngredientDetail {
    pub ingredient: Ingredient,
    pub quantity: f32,
    pub unit: Option<IngredientUnit>,
    /// As written in the recipe, e.g. "大さじ2".
    pub amount: String,
    pub owned: bool,
}

#[derive(Debug, Serialize)]
pub struct RecipeDetail {
    #[serde(flatten)]
    pub recipe: Recipe,
    pub category: RecipeCategory,
    pub author: Author,
    pub ingredients: Vec<RecipeIngredientDetail>,
    pub instructions: Vec<Instruction>,
    pub goods: i64,
    pub liked: bool,
    pub cookable: bool,
    pub missing: Vec<Ingredient>,
}

pub fn get_recipe(
    conn: &mut database::Connection,
    viewer: Option<UserId>,
    recipe_id: RecipeId,
) -> AppResult<RecipeDetail> {
    use database::schema::{
        goods, ingredients, instructions, recipe_categories, recipe_ingredients, users,
    };

    let recipe = visible_recipe(conn, viewer, recipe_id)?;
    let category = recipe_categories::table
        .find(recipe.recipe_category_id)
        .select(RecipeCategory::as_select())
        .get_result(conn)?;
    let author = users::table
        .find(recipe.user_id)
        .select(Author::as_select())
        .get_result(conn)?;
    let used = RecipeIngredient::belonging_to(&recipe)
        .inner_join(ingredients::table)
        .select((RecipeIngredient::as_select(), Ingredient::as_select()))
        .order(recipe_ingredients::id)
        .load::<(RecipeIngredient, Ingredient)>(conn)?;
    let steps: Vec<Instruction> = Instruction::belonging_to(&recipe)
        .select(Instruction::as_select())
        .order(instructions::step)
        .load(conn)?;
    let count: i64 = goods::table
        .filter(goods::recipe_id.eq(recipe.id))
        .count()
        .get_result(conn)?;
    let liked = match viewer {
        Some(viewer) => liked_recipe_ids(conn, viewer)?.contains(&recipe.id),
        None => false,
    };
    let owned = owned_by(conn, viewer)?;

    let required: BTreeSet<IngredientId> = used.iter().map(|(u, _)| u.ingredient_id).collect();
    let cookable = owned
        .as_ref()
        .is_some_and(|owned| cookable::is_cookable(&required, owned));
    let nothing = BTreeSet::new();
    let missing_ids: BTreeSet<IngredientId> =
        cookable::missing(&required, owned.as_ref().unwrap_or(&nothing))
            .into_iter()
            .collect();

    let mut missing = vec![];
    let mut details = vec![];
    for (usage, ingredient) in used {
        if missing_ids.contains(&ingredient.id)
            && !missing.iter().any(|m: &Ingredient| m.id == ingredient.id)
        {
            missing.push(ingredient.clone());
        }
        details.push(RecipeIngredientDetail {
            amount: usage.amount(),
            quantity: usage.quantity,
            unit: usage.unit,
            owned: !missing_ids.contains(&ingredient.id),
            ingredient,
        });
    }

    Ok(RecipeDetail {
        recipe,
        category,
        author,
        ingredients: details,
        instructions: steps,
        goods: count,
        liked,
        cookable,
        missing,
    })
}

fn default_serving() -> i32 {
    1
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecipeIngredientForm {
    pub ingredient_id: IngredientId,
    pub quantity: f32,
    #[serde(default)]
    pub unit: Option<IngredientUnit>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstructionForm {
    pub body: String,
}

/// Everything a user types in when writing a recipe. Images are uploaded
/// separately once the recipe exists.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct RecipeForm {
    #[validate(length(min = 1, max = 100, message = "レシピ名は1〜100文字で入力してください"))]
    pub name: String,
    pub recipe_category_id: RecipeCategoryId,
    #[serde(default = "default_serving")]
    #[validate(range(min = 1, max = 100, message = "何人分かは1〜100で入力してください"))]
    pub serving: i32,
    #[serde(default)]
    pub is_published: bool,
    #[serde(default)]
    #[validate(length(min = 1, message = "材料を1つ以上入力してください"))]
    pub ingredients: Vec<RecipeIngredientForm>,
    #[serde(default)]
    #[validate(length(min = 1, message = "作り方を1つ以上入力してください"))]
    pub instructions: Vec<InstructionForm>,
}

fn add_error(
    errors: &mut ValidationErrors,
    field: &'static str,
    code: &'static str,
    message: &'static str,
) {
    let mut error = ValidationError::new(code);
    error.message = Some(Cow::Borrowed(message));
    errors.add(field, error);
}

fn check_form(conn: &mut database::Connection, form: &RecipeForm) -> AppResult<()> {
    use database::schema::recipe_categories;

    let mut errors = form.validate().err().unwrap_or_else(ValidationErrors::new);
    if form.name.trim().is_empty() && !errors.field_errors().contains_key("name") {
        add_error(&mut errors, "name", "length", "レシピ名を入力してください");
    }
    if form
        .ingredients
        .iter()
        .any(|i| !i.quantity.is_finite() || i.quantity < 0.0)
    {
        add_error(&mut errors, "ingredients", "quantity", "分量が正しくありません");
    }
    let distinct: BTreeSet<IngredientId> =
        form.ingredients.iter().map(|i| i.ingredient_id).collect();
    if distinct.len() != form.ingredients.len() {
        add_error(&mut errors, "ingredients", "duplicate", "同じ材料が重複しています");
    }
    if form.instructions.iter().any(|i| i.body.trim().is_empty()) {
        add_error(&mut errors, "instructions", "blank", "空の手順があります");
    }
    if !errors.errors().is_empty() {
        return Err(errors.into());
    }

    let category_exists: i64 = recipe_categories::table
        .find(form.recipe_category_id)
        .count()
        .get_result(conn)?;
    if category_exists == 0 {
        return Err(AppError::field(
            "recipe_category_id",
            "unknown",
            "カテゴリーが存在しません",
        ));
    }
    let ids: Vec<IngredientId> = distinct.into_iter().collect();
    ensure_ingredients_exist(conn, "ingredients", &ids)
}

/// Writes the form's ingredients and steps. `images` keeps step images
/// from an earlier version of the recipe.
fn insert_children(
    conn: &mut database::Connection,
    recipe: RecipeId,
    form: &RecipeForm,
    images: &BTreeMap<i32, String>,
) -> AppResult<()> {
    use database::schema::{instructions, recipe_ingredients};

    let new_ingredients: Vec<_> = form
        .ingredients
        .iter()
        .map(|i| NewRecipeIngredient {
            recipe_id: recipe,
            ingredient_id: i.ingredient_id,
            quantity: i.quantity,
            unit: i.unit,
        })
        .collect();
    diesel::insert_into(recipe_ingredients::table)
        .values(&new_ingredients)
        .execute(conn)?;

    for (step, instruction) in (1..).zip(&form.instructions) {
        diesel::insert_into(instructions::table)
            .values(NewInstruction {
                recipe_id: recipe,
                step,
                body: instruction.body.trim(),
                image: images.get(&step).map(String::as_str),
            })
            .execute(conn)?;
    }
    Ok(())
}

pub fn create_recipe(
    conn: &mut database::Connection,
    user: UserId,
    form: &RecipeForm,
) -> AppResult<RecipeId> {
    use database::schema::recipes::dsl::*;

    check_form(conn, form)?;

    conn.immediate_transaction(|conn| {
        let new_id: RecipeId = diesel::insert_into(recipes)
            .values(NewRecipe {
                user_id: user,
                recipe_category_id: form.recipe_category_id,
                name: form.name.trim(),
                serving: form.serving,
                is_published: form.is_published,
            })
            .returning(id)
            .get_result(conn)?;
        insert_children(conn, new_id, form, &BTreeMap::new())?;
        log::info!("user {user} created recipe {new_id}");
        Ok(new_id)
    })
}

/// Replaces the recipe's ingredients and steps. Returns the images of steps
/// that no longer exist, for the caller to delete.
pub fn update_recipe(
    conn: &mut database::Connection,
    user: UserId,
    recipe: RecipeId,
    form: &RecipeForm,
) -> AppResult<Vec<String>> {
    use database::schema::{instructions, recipe_ingredients, recipes};

    owned_recipe(conn, user, recipe)?;
    check_form(conn, form)?;

    conn.immediate_transaction(|conn| {
        diesel::update(recipes::table.find(recipe))
            .set((
                recipes::recipe_category_id.eq(form.recipe_category_id),
                recipes::name.eq(form.name.trim()),
                recipes::serving.eq(form.serving),
                recipes::is_published.eq(form.is_published),
                recipes::updated_at.eq(chrono::Utc::now().naive_utc()),
            ))
            .execute(conn)?;

        let old_images: Vec<(i32, Option<String>)> = instructions::table
            .select((instructions::step, instructions::image))
            .filter(instructions::recipe_id.eq(recipe))
            .load(conn)?;
        let (kept, orphaned): (Vec<_>, Vec<_>) = old_images
            .into_iter()
            .filter_map(|(step, image)| Some((step, image?)))
            .partition(|(step, _)| *step as usize <= form.instructions.len());

        diesel::delete(
            recipe_ingredients::table.filter(recipe_ingredients::recipe_id.eq(recipe)),
        )
        .execute(conn)?;
        diesel::delete(instructions::table.filter(instructions::recipe_id.eq(recipe)))
            .execute(conn)?;
        insert_children(conn, recipe, form, &kept.into_iter().collect())?;

        log::info!("user {user} updated recipe {recipe}");
        Ok(orphaned.into_iter().map(|(_, image)| image).collect())
    })
}

/// Returns every image the recipe used, for the caller to delete.
pub fn delete_recipe(
    conn: &mut database::Connection,
    user: UserId,
    recipe: RecipeId,
) -> AppResult<Vec<String>> {
    use database::schema::{instructions, recipes};

    let found = owned_recipe(conn, user, recipe)?;

    conn.immediate_transaction(|conn| {
        let step_images: Vec<Option<String>> = instructions::table
            .select(instructions::image)
            .filter(instructions::recipe_id.eq(recipe))
            .load(conn)?;
        diesel::delete(recipes::table.find(recipe)).execute(conn)?;

        log::info!("user {user} deleted recipe {recipe}");
        Ok(found
            .image
            .into_iter()
            .chain(step_images.into_iter().flatten())
            .collect())
    })
}

/// Returns the previous image so the caller can remove it from storage.
pub fn set_recipe_image(
    conn: &mut database::Connection,
    user: UserId,
    recipe: RecipeId,
    path: &str,
) -> AppResult<Option<String>> {
    use database::schema::recipes::dsl::*;

    let found = owned_recipe(conn, user, recipe)?;
    diesel::update(recipes.find(recipe))
        .set((image.eq(path), updated_at.eq(chrono::Utc::now().naive_utc())))
        .execute(conn)?;
    Ok(found.image)
}

/// Returns the previous image so the caller can remove it from storage.
pub fn set_instruction_image(
    conn: &mut database::Connection,
    user: UserId,
    recipe: RecipeId,
    at_step: i32,
    path: &str,
) -> AppResult<Option<String>> {
    use database::schema::instructions::dsl::*;

    owned_recipe(conn, user, recipe)?;
    let found = instructions
        .select(Instruction::as_select())
        .filter(recipe_id.eq(recipe))
        .filter(step.eq(at_step))
        .get_result(conn)
        .optional()?
        .ok_or(AppError::NotFound)?;
    diesel::update(instructions.find(found.id))
        .set(image.eq(path))
        .execute(conn)?;
    Ok(found.image)
}

#[cfg(test)]
pub fn test_form(conn: &mut database::Connection) -> RecipeForm {
    let catalog = super::ingredients::test_catalog(conn);
    let (category, _) = add_recipe_category(conn, "主菜", None).unwrap();
    RecipeForm {
        name: "豚の生姜焼き".into(),
        recipe_category_id: category,
        serving: 2,
        is_published: true,
        ingredients: vec![
            RecipeIngredientForm {
                ingredient_id: catalog.pork.id,
                quantity: 200.0,
                unit: Some(IngredientUnit::Grams),
            },
            RecipeIngredientForm {
                ingredient_id: catalog.onion.id,
                quantity: 1.0,
                unit: Some(IngredientUnit::Pieces),
            },
            RecipeIngredientForm {
                ingredient_id: catalog.soy_sauce.id,
                quantity: 2.0,
                unit: Some(IngredientUnit::Tablespoons),
            },
        ],
        instructions: vec![
            InstructionForm {
                body: "玉ねぎを薄切りにする".into(),
            },
            InstructionForm {
                body: "豚肉と玉ねぎを炒め、醤油で味付けする".into(),
            },
        ],
    }
}

#[cfg(test)]
pub fn test_recipe(conn: &mut database::Connection, user: UserId) -> RecipeId {
    let form = test_form(conn);
    create_recipe(conn, user, &form).unwrap()
}

#[cfg(test)]
pub fn set_published(conn: &mut database::Connection, recipe: RecipeId, published: bool) {
    use database::schema::recipes::dsl::*;

    diesel::update(recipes.find(recipe))
        .set(is_published.eq(published))
        .execute(conn)
        .unwrap();
}

#[test]
fn recipe_needs_ingredient_and_instruction() {
    use super::users::test_user;

    let mut conn = database::test_connection();
    let hana = test_user(&mut conn, "hana");

    let mut form = test_form(&mut conn);
    form.ingredients.clear();
    form.instructions.clear();
    let error = create_recipe(&mut conn, hana.id, &form).unwrap_err();
    let AppError::Validation(errors) = error else {
        panic!("expected validation error");
    };
    let fields = errors.field_errors();
    assert!(fields.contains_key("ingredients"));
    assert!(fields.contains_key("instructions"));
    assert!(list_recipes(&mut conn, Some(hana.id), &RecipeFilter::default())
        .unwrap()
        .is_empty());

    let mut form = test_form(&mut conn);
    form.ingredients[0].ingredient_id = 999.into();
    assert!(create_recipe(&mut conn, hana.id, &form).is_err());
}

#[test]
fn cookable_follows_refrigerator() {
    use super::ingredients::test_catalog;
    use super::refrigerator::{add_to_refrigerator, remove_from_refrigerator};
    use super::users::test_user;

    let mut conn = database::test_connection();
    let catalog = test_catalog(&mut conn);
    let hana = test_user(&mut conn, "hana");
    let recipe = test_recipe(&mut conn, hana.id);

    let detail = get_recipe(&mut conn, Some(hana.id), recipe).unwrap();
    assert!(!detail.cookable);
    assert_eq!(detail.missing.len(), 3);
    assert_eq!(detail.ingredients[2].amount, "大さじ2");
    let steps: Vec<_> = detail.instructions.iter().map(|i| i.step).collect();
    assert_eq!(steps, [1, 2]);

    // a superset of what the recipe needs
    add_to_refrigerator(
        &mut conn,
        hana.id,
        &[catalog.pork.id, catalog.onion.id, catalog.soy_sauce.id, catalog.carrot.id],
    )
    .unwrap();
    let detail = get_recipe(&mut conn, Some(hana.id), recipe).unwrap();
    assert!(detail.cookable);
    assert!(detail.missing.is_empty());
    assert!(detail.ingredients.iter().all(|i| i.owned));

    let cookable_only = RecipeFilter {
        cookable: true,
        ..Default::default()
    };
    assert_eq!(
        list_recipes(&mut conn, Some(hana.id), &cookable_only)
            .unwrap()
            .len(),
        1
    );

    remove_from_refrigerator(&mut conn, hana.id, &[catalog.soy_sauce.id]).unwrap();
    assert!(list_recipes(&mut conn, Some(hana.id), &cookable_only)
        .unwrap()
        .is_empty());
    let counts = recipe_category_counts(&mut conn, Some(hana.id)).unwrap();
    assert_eq!(counts[0].recipes, 1);
    assert_eq!(counts[0].cookable, Some(0));
}

#[test]
fn drafts_are_private() {
    use super::users::test_user;

    let mut conn = database::test_connection();
    let hana = test_user(&mut conn, "hana");
    let taro = test_user(&mut conn, "taro");
    let recipe = test_recipe(&mut conn, hana.id);
    set_published(&mut conn, recipe, false);

    assert!(get_recipe(&mut conn, Some(hana.id), recipe).is_ok());
    assert!(matches!(
        get_recipe(&mut conn, Some(taro.id), recipe),
        Err(AppError::NotFound)
    ));
    assert!(matches!(
        get_recipe(&mut conn, None, recipe),
        Err(AppError::NotFound)
    ));
    let everything = RecipeFilter::default();
    assert!(list_recipes(&mut conn, None, &everything).unwrap().is_empty());
    assert_eq!(
        list_recipes(&mut conn, Some(hana.id), &everything)
            .unwrap()
            .len(),
        1
    );

    let counts = recipe_category_counts(&mut conn, None).unwrap();
    assert_eq!(counts[0].recipes, 0);
    assert_eq!(counts[0].cookable, None);
}

#[test]
fn only_the_author_changes_a_recipe() {
    use super::users::test_user;

    let mut conn = database::test_connection();
    let hana = test_user(&mut conn, "hana");
    let taro = test_user(&mut conn, "taro");
    let recipe = test_recipe(&mut conn, hana.id);
    let form = test_form(&mut conn);

    assert!(matches!(
        update_recipe(&mut conn, taro.id, recipe, &form),
        Err(AppError::Forbidden(_))
    ));
    assert!(matches!(
        delete_recipe(&mut conn, taro.id, recipe),
        Err(AppError::Forbidden(_))
    ));
    assert!(matches!(
        set_recipe_image(&mut conn, taro.id, recipe, "recipes/x.png"),
        Err(AppError::Forbidden(_))
    ));
}

#[test]
fn update_keeps_step_images() {
    use super::users::test_user;

    let mut conn = database::test_connection();
    let hana = test_user(&mut conn, "hana");
    let recipe = test_recipe(&mut conn, hana.id);

    set_instruction_image(&mut conn, hana.id, recipe, 1, "instructions/1.png").unwrap();
    set_instruction_image(&mut conn, hana.id, recipe, 2, "instructions/2.png").unwrap();
    assert!(matches!(
        set_instruction_image(&mut conn, hana.id, recipe, 3, "instructions/3.png"),
        Err(AppError::NotFound)
    ));

    let mut form = test_form(&mut conn);
    form.name = "生姜焼き".into();
    form.instructions.truncate(1);
    form.instructions[0].body = "全部炒める".into();
    let orphaned = update_recipe(&mut conn, hana.id, recipe, &form).unwrap();
    assert_eq!(orphaned, vec!["instructions/2.png".to_owned()]);

    let detail = get_recipe(&mut conn, Some(hana.id), recipe).unwrap();
    assert_eq!(detail.recipe.name, "生姜焼き");
    assert_eq!(detail.instructions.len(), 1);
    assert_eq!(detail.instructions[0].body, "全部炒める");
    assert_eq!(detail.instructions[0].image.as_deref(), Some("instructions/1.png"));

    set_recipe_image(&mut conn, hana.id, recipe, "recipes/a.png").unwrap();
    let mut images = delete_recipe(&mut conn, hana.id, recipe).unwrap();
    images.sort();
    assert_eq!(images, ["instructions/1.png", "recipes/a.png"]);
    assert!(matches!(
        get_recipe(&mut conn, Some(hana.id), recipe),
        Err(AppError::NotFound)
    ));
}

#[test]
fn missing_ingredients_go_to_shopping_list() {
    use super::ingredients::test_catalog;
    use super::refrigerator::add_to_refrigerator;
    use super::shopping_list::{add_missing_to_shopping_list, listed_ingredient_ids};
    use super::users::test_user;
    use maplit::btreeset;

    let mut conn = database::test_connection();
    let catalog = test_catalog(&mut conn);
    let hana = test_user(&mut conn, "hana");
    let recipe = test_recipe(&mut conn, hana.id);

    add_to_refrigerator(&mut conn, hana.id, &[catalog.soy_sauce.id]).unwrap();
    assert_eq!(add_missing_to_shopping_list(&mut conn, hana.id, recipe).unwrap(), 2);
    assert_eq!(
        listed_ingredient_ids(&mut conn, hana.id).unwrap(),
        btreeset! {catalog.pork.id, catalog.onion.id}
    );
    // nothing new the second time
    assert_eq!(add_missing_to_shopping_list(&mut conn, hana.id, recipe).unwrap(), 0);
}

#[test]
fn list_filters_follow_the_viewer() {
    use super::goods::toggle_good;
    use super::users::test_user;

    fn ids(found: &[RecipeSummary]) -> Vec<RecipeId> {
        found.iter().map(|s| s.recipe.id).collect()
    }

    let mut conn = database::test_connection();
    let hana = test_user(&mut conn, "hana");
    let taro = test_user(&mut conn, "taro");
    let hanas = test_recipe(&mut conn, hana.id);
    let mut form = test_form(&mut conn);
    form.name = "肉野菜炒め".into();
    let taros = create_recipe(&mut conn, taro.id, &form).unwrap();

    toggle_good(&mut conn, hana.id, hanas).unwrap();
    toggle_good(&mut conn, taro.id, hanas).unwrap();

    let mine = RecipeFilter {
        mine: true,
        ..Default::default()
    };
    let liked = RecipeFilter {
        liked: true,
        ..Default::default()
    };
    let cookable = RecipeFilter {
        cookable: true,
        ..Default::default()
    };

    assert_eq!(ids(&list_recipes(&mut conn, Some(hana.id), &mine).unwrap()), [hanas]);
    assert_eq!(ids(&list_recipes(&mut conn, Some(taro.id), &mine).unwrap()), [taros]);
    assert_eq!(ids(&list_recipes(&mut conn, Some(taro.id), &liked).unwrap()), [hanas]);

    let everything = list_recipes(&mut conn, Some(taro.id), &RecipeFilter::default()).unwrap();
    assert_eq!(ids(&everything), [taros, hanas]);
    assert!(!everything[0].liked);
    assert!(everything[1].liked);
    assert_eq!(everything[1].goods, 2);
    assert_eq!(everything[1].author.name, "hana");

    // these only make sense for someone signed in
    for filter in [&mine, &liked, &cookable] {
        assert!(list_recipes(&mut conn, None, filter).unwrap().is_empty());
    }
    let anonymous = list_recipes(&mut conn, None, &RecipeFilter::default()).unwrap();
    assert_eq!(ids(&anonymous), [taros, hanas]);
    assert!(anonymous.iter().all(|s| !s.liked && !s.cookable));

    let search = |query: &str| RecipeFilter {
        query: Some(query.into()),
        ..Default::default()
    };
    assert_eq!(ids(&list_recipes(&mut conn, None, &search("炒め")).unwrap()), [taros]);
    assert!(list_recipes(&mut conn, None, &search("%")).unwrap().is_empty());
}
