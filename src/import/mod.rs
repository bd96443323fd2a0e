// Copyright 2023 Remi Bernotavicius

//! Loads the ingredient and recipe-category catalog from a TOML file like:
//!
//! ```toml
//! [[ingredient_categories]]
//! name = "野菜"
//! image = "categories/vegetables.png"
//! ingredients = ["玉ねぎ", "にんじん"]
//!
//! [[ingredient_categories]]
//! name = "調味料"
//! seasoning = true
//! ingredients = ["醤油", "みりん"]
//!
//! [[recipe_categories]]
//! name = "主菜"
//! ```
//!
//! Everything is matched by name, so importing the same catalog twice
//! changes nothing.

use crate::database;
use crate::query::ingredients::{add_ingredient, add_ingredient_category};
use crate::query::recipes::add_recipe_category;
use crate::Result;
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct IngredientCategoryEntry {
    name: String,
    image: Option<String>,
    /// Every ingredient in the category is a seasoning.
    #[serde(default)]
    seasoning: bool,
    #[serde(default)]
    ingredients: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RecipeCategoryEntry {
    name: String,
    image: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct Catalog {
    ingredient_categories: Vec<IngredientCategoryEntry>,
    recipe_categories: Vec<RecipeCategoryEntry>,
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct ImportCounts {
    pub ingredient_categories: usize,
    pub ingredients: usize,
    pub recipe_categories: usize,
}

fn decode_catalog_from_path(path: impl AsRef<Path>) -> Result<Catalog> {
    let contents = std::fs::read_to_string(path)?;
    Ok(toml::from_str(&contents)?)
}

fn import(conn: &mut database::Connection, catalog: Catalog) -> Result<ImportCounts> {
    let mut counts = ImportCounts::default();

    conn.immediate_transaction(|conn| {
        for entry in catalog.ingredient_categories {
            let (category, created) =
                add_ingredient_category(conn, &entry.name, entry.image.as_deref())?;
            counts.ingredient_categories += created as usize;

            for name in &entry.ingredients {
                let (_, created) = add_ingredient(conn, name, category, entry.seasoning)?;
                counts.ingredients += created as usize;
            }
        }

        for entry in catalog.recipe_categories {
            let (_, created) = add_recipe_category(conn, &entry.name, entry.image.as_deref())?;
            counts.recipe_categories += created as usize;
        }
        Ok::<_, crate::error::AppError>(())
    })?;

    Ok(counts)
}

pub fn import_catalog(mut conn: database::Connection, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    let catalog = decode_catalog_from_path(path)?;
    let counts = import(&mut conn, catalog)?;

    log::info!("imported catalog from {}", path.display());
    println!(
        "created {} ingredient categories, {} ingredients, {} recipe categories",
        counts.ingredient_categories, counts.ingredients, counts.recipe_categories
    );
    Ok(())
}

#[test]
fn import_is_idempotent() {
    use crate::query::ingredients::{list_ingredient_categories, list_ingredients, IngredientFilter};
    use crate::query::recipes::list_recipe_categories;

    let catalog = || -> Catalog {
        toml::from_str(
            r#"
            [[ingredient_categories]]
            name = "野菜"
            ingredients = ["玉ねぎ", "にんじん"]

            [[ingredient_categories]]
            name = "調味料"
            image = "categories/seasonings.png"
            seasoning = true
            ingredients = ["醤油"]

            [[recipe_categories]]
            name = "主菜"

            [[recipe_categories]]
            name = "汁物"
            "#,
        )
        .unwrap()
    };

    let mut conn = database::test_connection();
    assert_eq!(
        import(&mut conn, catalog()).unwrap(),
        ImportCounts {
            ingredient_categories: 2,
            ingredients: 3,
            recipe_categories: 2,
        }
    );
    assert_eq!(import(&mut conn, catalog()).unwrap(), ImportCounts::default());

    assert_eq!(list_ingredient_categories(&mut conn).unwrap().len(), 2);
    assert_eq!(list_recipe_categories(&mut conn).unwrap().len(), 2);
    let seasonings = list_ingredients(
        &mut conn,
        &IngredientFilter {
            seasoning: Some(true),
            ..Default::default()
        },
    )
    .unwrap();
    assert_eq!(seasonings.len(), 1);
    assert_eq!(seasonings[0].name, "醤油");
}

#[test]
fn import_from_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("catalog.toml");
    std::fs::write(&path, "[[recipe_categories]]\nname = \"副菜\"\n").unwrap();

    let conn = database::test_connection();
    import_catalog(conn, &path).unwrap();

    std::fs::write(&path, "[[recipe_categories]]\ntitle = \"副菜\"\n").unwrap();
    assert!(import_catalog(database::test_connection(), &path).is_err());
}
