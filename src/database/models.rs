// Copyright 2023 Remi Bernotavicius

use chrono::NaiveDateTime;
use derive_more::Display;
use diesel::associations::{Associations, Identifiable};
use diesel::deserialize::Queryable;
use diesel::expression::Selectable;
use diesel::prelude::{AsChangeset, Insertable};
use diesel_derive_enum::DbEnum;
use diesel_derive_newtype::DieselNewType;
use serde::{Deserialize, Serialize};
use strum::EnumIter;

macro_rules! id_type {
    ($name:ident) => {
        #[derive(
            DieselNewType,
            Serialize,
            Deserialize,
            Display,
            Debug,
            Hash,
            PartialEq,
            Eq,
            PartialOrd,
            Ord,
            Copy,
            Clone,
        )]
        #[serde(transparent)]
        pub struct $name(i32);

        impl From<i32> for $name {
            fn from(id: i32) -> Self {
                Self(id)
            }
        }
    };
}

id_type!(UserId);
id_type!(IngredientCategoryId);
id_type!(IngredientId);
id_type!(RefrigeratorEntryId);
id_type!(ShoppingListItemId);
id_type!(RecipeCategoryId);
id_type!(RecipeId);
id_type!(RecipeIngredientId);
id_type!(InstructionId);
id_type!(GoodId);

#[derive(Queryable, Selectable, Identifiable, Serialize, Debug, Clone)]
#[diesel(table_name = crate::database::schema::users)]
pub struct User {
    pub id: UserId,
    pub name: String,
    pub email: Option<String>,
    #[serde(skip)]
    pub password_hash: Option<String>,
    pub social_provider: Option<String>,
    #[serde(skip)]
    pub social_id: Option<String>,
    pub image: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Insertable)]
#[diesel(table_name = crate::database::schema::users)]
pub struct NewUser<'a> {
    pub name: &'a str,
    pub email: Option<&'a str>,
    pub password_hash: Option<&'a str>,
    pub social_provider: Option<&'a str>,
    pub social_id: Option<&'a str>,
    pub image: Option<&'a str>,
}

/// Fields left as `None` are not touched.
#[derive(AsChangeset, Default)]
#[diesel(table_name = crate::database::schema::users)]
pub struct UserChange<'a> {
    pub name: Option<&'a str>,
    pub email: Option<&'a str>,
    pub updated_at: Option<NaiveDateTime>,
}

/// The public part of a user shown next to their recipes.
#[derive(Queryable, Selectable, Serialize, Debug, Clone)]
#[diesel(table_name = crate::database::schema::users)]
pub struct Author {
    pub id: UserId,
    pub name: String,
    pub image: Option<String>,
}

#[derive(Queryable, Selectable, Identifiable, Serialize, Debug, Clone)]
#[diesel(table_name = crate::database::schema::ingredient_categories)]
pub struct IngredientCategory {
    pub id: IngredientCategoryId,
    pub name: String,
    pub image: Option<String>,
}

#[derive(Associations, Queryable, Selectable, Identifiable, Serialize, Debug, Clone)]
#[diesel(belongs_to(IngredientCategory))]
#[diesel(table_name = crate::database::schema::ingredients)]
pub struct Ingredient {
    pub id: IngredientId,
    pub name: String,
    pub ingredient_category_id: IngredientCategoryId,
    pub is_seasoning: bool,
}

#[derive(Queryable, Selectable, Identifiable, Serialize, Debug, Clone)]
#[diesel(table_name = crate::database::schema::refrigerators)]
pub struct RefrigeratorEntry {
    pub id: RefrigeratorEntryId,
    pub user_id: UserId,
    pub ingredient_id: IngredientId,
    pub created_at: NaiveDateTime,
}

/// Either `ingredient_id` or `name` is set; free-text items have no ingredient.
#[derive(Queryable, Selectable, Identifiable, Serialize, Debug, Clone)]
#[diesel(table_name = crate::database::schema::shopping_lists)]
pub struct ShoppingListItem {
    pub id: ShoppingListItemId,
    pub user_id: UserId,
    pub ingredient_id: Option<IngredientId>,
    pub name: Option<String>,
    pub created_at: NaiveDateTime,
}

#[derive(Queryable, Selectable, Identifiable, Serialize, Debug, Clone)]
#[diesel(table_name = crate::database::schema::recipe_categories)]
pub struct RecipeCategory {
    pub id: RecipeCategoryId,
    pub name: String,
    pub image: Option<String>,
}

#[derive(Associations, Queryable, Selectable, Identifiable, Serialize, Debug, Clone)]
#[diesel(belongs_to(RecipeCategory))]
#[diesel(belongs_to(User))]
#[diesel(table_name = crate::database::schema::recipes)]
pub struct Recipe {
    pub id: RecipeId,
    pub user_id: UserId,
    pub recipe_category_id: RecipeCategoryId,
    pub name: String,
    pub image: Option<String>,
    pub serving: i32,
    pub is_published: bool,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Insertable)]
#[diesel(table_name = crate::database::schema::recipes)]
pub struct NewRecipe<'a> {
    pub user_id: UserId,
    pub recipe_category_id: RecipeCategoryId,
    pub name: &'a str,
    pub serving: i32,
    pub is_published: bool,
}

#[derive(
    Debug, Display, EnumIter, Serialize, Deserialize, Hash, Copy, Clone, PartialEq, Eq, DbEnum,
)]
#[serde(rename_all = "snake_case")]
pub enum IngredientUnit {
    #[display("g")]
    Grams,
    #[display("kg")]
    Kilograms,
    #[display("ml")]
    Milliliters,
    #[display("L")]
    Liters,
    #[display("カップ")]
    Cups,
    #[display("大さじ")]
    Tablespoons,
    #[display("小さじ")]
    Teaspoons,
    #[display("個")]
    Pieces,
    #[display("枚")]
    Slices,
    #[display("本")]
    Sticks,
    #[display("片")]
    Cloves,
    #[display("少々")]
    Pinch,
    #[display("適量")]
    ToTaste,
}

impl IngredientUnit {
    pub fn iter() -> impl Iterator<Item = Self> {
        <Self as strum::IntoEnumIterator>::iter()
    }

    /// Units written without a number, as in "塩 少々".
    pub fn is_unquantified(&self) -> bool {
        matches!(self, Self::Pinch | Self::ToTaste)
    }

    /// Spoon and cup measures are written before the number ("大さじ2").
    pub fn is_prefix(&self) -> bool {
        matches!(self, Self::Cups | Self::Tablespoons | Self::Teaspoons)
    }
}

#[derive(Associations, Queryable, Selectable, Identifiable, Serialize, Debug, Clone)]
#[diesel(belongs_to(Recipe))]
#[diesel(belongs_to(Ingredient))]
#[diesel(table_name = crate::database::schema::recipe_ingredients)]
pub struct RecipeIngredient {
    pub id: RecipeIngredientId,
    pub recipe_id: RecipeId,
    pub ingredient_id: IngredientId,
    pub quantity: f32,
    pub unit: Option<IngredientUnit>,
}

impl RecipeIngredient {
    /// How much of the ingredient the recipe calls for, the way it is written in a recipe book.
    pub fn amount(&self) -> String {
        let quantity = self.quantity;
        match self.unit {
            Some(u) if u.is_unquantified() => u.to_string(),
            Some(u) if u.is_prefix() => format!("{u}{quantity}"),
            Some(u) => format!("{quantity}{u}"),
            None => quantity.to_string(),
        }
    }
}

#[test]
fn recipe_ingredient_amount() {
    let usage = |quantity, unit| RecipeIngredient {
        id: 1.into(),
        recipe_id: 1.into(),
        ingredient_id: 1.into(),
        quantity,
        unit,
    };

    assert_eq!(usage(200.0, Some(IngredientUnit::Grams)).amount(), "200g");
    assert_eq!(usage(2.0, Some(IngredientUnit::Tablespoons)).amount(), "大さじ2");
    assert_eq!(usage(0.5, Some(IngredientUnit::Teaspoons)).amount(), "小さじ0.5");
    assert_eq!(usage(1.0, Some(IngredientUnit::Pinch)).amount(), "少々");
    assert_eq!(usage(3.0, Some(IngredientUnit::Pieces)).amount(), "3個");
    assert_eq!(usage(2.0, None).amount(), "2");
}

#[derive(Insertable)]
#[diesel(table_name = crate::database::schema::recipe_ingredients)]
pub struct NewRecipeIngredient {
    pub recipe_id: RecipeId,
    pub ingredient_id: IngredientId,
    pub quantity: f32,
    pub unit: Option<IngredientUnit>,
}

#[derive(Associations, Queryable, Selectable, Identifiable, Serialize, Debug, Clone)]
#[diesel(belongs_to(Recipe))]
#[diesel(table_name = crate::database::schema::instructions)]
pub struct Instruction {
    pub id: InstructionId,
    pub recipe_id: RecipeId,
    pub step: i32,
    pub body: String,
    pub image: Option<String>,
}

#[derive(Insertable)]
#[diesel(table_name = crate::database::schema::instructions)]
pub struct NewInstruction<'a> {
    pub recipe_id: RecipeId,
    pub step: i32,
    pub body: &'a str,
    pub image: Option<&'a str>,
}

#[derive(Associations, Queryable, Selectable, Identifiable, Serialize, Debug, Clone)]
#[diesel(belongs_to(Recipe))]
#[diesel(belongs_to(User))]
#[diesel(table_name = crate::database::schema::goods)]
pub struct Good {
    pub id: GoodId,
    pub user_id: UserId,
    pub recipe_id: RecipeId,
    pub created_at: NaiveDateTime,
}
