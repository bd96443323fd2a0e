// Copyright 2023 Remi Bernotavicius

use crate::api::{self, AppState};
use crate::error::AppError;
use axum::extract::DefaultBodyLimit;
use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::http::{HeaderValue, Method};
use axum::routing::{delete, get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;

const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

fn cors(origin: Option<&str>) -> crate::Result<CorsLayer> {
    let Some(origin) = origin else {
        return Ok(CorsLayer::new());
    };
    Ok(CorsLayer::new()
        .allow_origin(origin.parse::<HeaderValue>()?)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE]))
}

pub fn router(state: AppState) -> crate::Result<Router> {
    let cors = cors(state.config.cors_origin.as_deref())?;
    let storage = ServeDir::new(state.storage.root());

    Ok(Router::new()
        // ==== USERS ==== //
        .route("/api/register", post(api::users::register))
        .route("/api/login", post(api::users::login))
        .route(
            "/api/user",
            get(api::users::current_user).put(api::users::update_user),
        )
        .route("/api/user/image", post(api::users::upload_image))
        .route("/auth/:provider/redirect", get(api::social::redirect))
        .route("/auth/:provider/callback", get(api::social::callback))
        // ==== INGREDIENTS ==== //
        .route(
            "/api/ingredient-categories",
            get(api::ingredients::categories),
        )
        .route("/api/ingredients", get(api::ingredients::list))
        .route("/api/units", get(api::ingredients::units))
        // ==== REFRIGERATOR ==== //
        .route(
            "/api/refrigerator",
            get(api::refrigerator::list).post(api::refrigerator::add),
        )
        .route(
            "/api/refrigerator/:ingredient_id",
            delete(api::refrigerator::remove_one),
        )
        .route("/api/refrigerator/remove", post(api::refrigerator::remove))
        .route(
            "/api/refrigerator/to-shopping-list",
            post(api::refrigerator::to_shopping_list),
        )
        // ==== SHOPPING LIST ==== //
        .route(
            "/api/shopping-list",
            get(api::shopping_list::list).post(api::shopping_list::add),
        )
        .route(
            "/api/shopping-list/:id",
            delete(api::shopping_list::remove_one),
        )
        .route(
            "/api/shopping-list/remove",
            post(api::shopping_list::remove),
        )
        .route(
            "/api/shopping-list/to-refrigerator",
            post(api::shopping_list::to_refrigerator),
        )
        // ==== RECIPES ==== //
        .route("/api/recipe-categories", get(api::recipes::categories))
        .route(
            "/api/recipes",
            get(api::recipes::list).post(api::recipes::create),
        )
        .route(
            "/api/recipes/:id",
            get(api::recipes::show)
                .put(api::recipes::update)
                .delete(api::recipes::delete),
        )
        .route("/api/recipes/:id/image", post(api::recipes::upload_image))
        .route(
            "/api/recipes/:id/instructions/:step/image",
            post(api::recipes::upload_instruction_image),
        )
        .route("/api/recipes/:id/good", post(api::recipes::toggle_good))
        .route(
            "/api/recipes/:id/shopping-list",
            post(api::recipes::add_missing_to_shopping_list),
        )
        // ==== FILES ==== //
        .nest_service("/storage", storage)
        .fallback(|| async { AppError::NotFound })
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(cors)
        .with_state(state))
}
