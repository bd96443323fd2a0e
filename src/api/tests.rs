// Copyright 2023 Remi Bernotavicius

use super::AppState;
use crate::auth::Keys;
use crate::config::Config;
use crate::database;
use crate::error::{AppError, AppResult};
use crate::query::ingredients::{test_catalog, TestCatalog};
use crate::query::recipes::add_recipe_category;
use crate::social::{SocialProvider, SocialUser};
use crate::storage::{test_png, Storage};
use axum::async_trait;
use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::response::Response;
use axum::Router;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use tower::ServiceExt as _;

struct FakeProvider;

#[async_trait]
impl SocialProvider for FakeProvider {
    fn authorize_url(&self, state: &str) -> AppResult<String> {
        Ok(format!("https://provider.example/authorize?state={state}"))
    }

    async fn fetch_user(&self, code: &str) -> AppResult<SocialUser> {
        if code != "good-code" {
            return Err(AppError::Social("bad code".into()));
        }
        Ok(SocialUser {
            id: "fake-1".into(),
            name: "花子".into(),
            email: Some("hana@example.com".into()),
            email_verified: true,
            avatar: None,
        })
    }
}

struct TestApp {
    router: Router,
    state: AppState,
    _dir: tempfile::TempDir,
}

impl TestApp {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            database: dir.path().join("data.sqlite"),
            storage: dir.path().join("storage"),
            secret: Some("test secret".into()),
            home_url: "http://app.example/".into(),
            login_url: "http://app.example/login".into(),
            ..Config::default()
        };

        let mut social: BTreeMap<String, Arc<dyn SocialProvider>> = BTreeMap::new();
        social.insert("fake".into(), Arc::new(FakeProvider));
        let state = AppState {
            pool: database::establish_pool(&config.database, 2).unwrap(),
            keys: Keys::new(&config.session_secret()),
            storage: Storage::new(&config.storage).unwrap(),
            social: Arc::new(social),
            config: Arc::new(config),
        };
        let router = crate::routes::router(state.clone()).unwrap();
        Self {
            router,
            state,
            _dir: dir,
        }
    }

    fn catalog(&self) -> TestCatalog {
        let mut conn = self.state.pool.get().unwrap();
        test_catalog(&mut conn)
    }

    fn recipe_category(&self) -> Value {
        let mut conn = self.state.pool.get().unwrap();
        json!(add_recipe_category(&mut conn, "主菜", None).unwrap().0)
    }

    async fn send(&self, request: Request<Body>) -> Response {
        self.router.clone().oneshot(request).await.unwrap()
    }

    async fn request(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string())),
            None => builder.body(Body::empty()),
        }
        .unwrap();

        let response = self.send(request).await;
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }

    async fn upload(&self, uri: &str, token: &str, bytes: &[u8]) -> (StatusCode, Value) {
        let boundary = "gohandoki-test-boundary";
        let mut body = format!(
            "--{boundary}\r\n\
             Content-Disposition: form-data; name=\"image\"; filename=\"image.png\"\r\n\
             Content-Type: image/png\r\n\r\n"
        )
        .into_bytes();
        body.extend_from_slice(bytes);
        body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());

        let request = Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header(header::AUTHORIZATION, format!("Bearer {token}"))
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={boundary}"),
            )
            .body(Body::from(body))
            .unwrap();
        let response = self.send(request).await;
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    async fn register(&self, name: &str) -> String {
        let (status, body) = self
            .request(
                Method::POST,
                "/api/register",
                None,
                Some(json!({
                    "name": name,
                    "email": format!("{name}@example.com"),
                    "password": "correct horse",
                })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        body["token"].as_str().unwrap().to_owned()
    }
}

fn location(response: &Response) -> &str {
    response
        .headers()
        .get(header::LOCATION)
        .unwrap()
        .to_str()
        .unwrap()
}

#[tokio::test]
async fn register_and_login() {
    let app = TestApp::new();
    let token = app.register("hana").await;

    let (status, body) = app.request(Method::GET, "/api/user", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user"]["name"], "hana");
    assert!(body["user"].get("password_hash").is_none());

    let (status, _) = app.request(Method::GET, "/api/user", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = app
        .request(
            Method::POST,
            "/api/register",
            None,
            Some(json!({"name": "hana2", "email": "hana@example.com", "password": "12345678"})),
        )
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["errors"]["email"].is_array());

    let (status, body) = app
        .request(
            Method::POST,
            "/api/register",
            None,
            Some(json!({"name": "", "email": "nope", "password": "short"})),
        )
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    for field in ["name", "email", "password"] {
        assert!(body["errors"][field].is_array(), "{field}");
    }

    let login = |password: &str| {
        json!({"email": "hana@example.com", "password": password})
    };
    let (status, _) = app
        .request(Method::POST, "/api/login", None, Some(login("wrong password")))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (status, body) = app
        .request(Method::POST, "/api/login", None, Some(login("correct horse")))
        .await;
    assert_eq!(status, StatusCode::OK);
    let token = body["token"].as_str().unwrap();

    let (status, body) = app
        .request(
            Method::PUT,
            "/api/user",
            Some(token),
            Some(json!({"name": "はな"})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user"]["name"], "はな");
    assert_eq!(body["user"]["email"], "hana@example.com");

    let (status, body) = app.upload("/api/user/image", token, &test_png()).await;
    assert_eq!(status, StatusCode::OK);
    let image = body["image"].as_str().unwrap();
    assert!(image.starts_with("users/"));

    let (status, body) = app.upload("/api/user/image", token, b"not an image").await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["errors"]["image"].is_array());
}

#[tokio::test]
async fn refrigerator_and_shopping_list() {
    let app = TestApp::new();
    let catalog = app.catalog();
    let hana = app.register("hana").await;
    let taro = app.register("taro").await;

    let (status, body) = app
        .request(
            Method::POST,
            "/api/refrigerator",
            Some(&hana),
            Some(json!({"ingredient_ids": [catalog.onion.id, catalog.soy_sauce.id]})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["added"], 2);

    let (_, body) = app.request(Method::GET, "/api/refrigerator", Some(&hana), None).await;
    let shelves = body["refrigerator"].as_array().unwrap();
    assert_eq!(shelves.len(), 2);
    assert_eq!(shelves[0]["category"]["name"], "野菜");
    assert_eq!(shelves[0]["ingredients"][0]["name"], "玉ねぎ");

    let (status, body) = app
        .request(
            Method::POST,
            "/api/shopping-list",
            Some(&hana),
            Some(json!({"ingredient_id": catalog.carrot.id})),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["status"], "added");
    let carrot_item = body["item"]["id"].clone();

    let (status, body) = app
        .request(
            Method::POST,
            "/api/shopping-list",
            Some(&hana),
            Some(json!({"name": "にんじん"})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "duplicate");

    let (status, body) = app
        .request(
            Method::POST,
            "/api/shopping-list",
            Some(&hana),
            Some(json!({"name": "ラップ"})),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let wrap_item = body["item"]["id"].clone();

    // taro can't touch hana's list
    let (status, _) = app
        .request(
            Method::DELETE,
            &format!("/api/shopping-list/{carrot_item}"),
            Some(&taro),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = app
        .request(
            Method::POST,
            "/api/shopping-list/to-refrigerator",
            Some(&hana),
            Some(json!({"ids": [carrot_item, wrap_item]})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"moved": 1, "already_owned": 0, "removed": 2}));

    let (_, body) = app.request(Method::GET, "/api/shopping-list", Some(&hana), None).await;
    assert!(body["shopping_list"].as_array().unwrap().is_empty());

    let (status, body) = app
        .request(
            Method::POST,
            "/api/refrigerator/to-shopping-list",
            Some(&hana),
            Some(json!({"ingredient_ids": [catalog.onion.id]})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"removed": 1, "listed": 1}));

    let (_, body) = app.request(Method::GET, "/api/shopping-list", Some(&hana), None).await;
    assert_eq!(body["shopping_list"][0]["ingredient"]["name"], "玉ねぎ");

    let (status, _) = app
        .request(
            Method::DELETE,
            &format!("/api/refrigerator/{}", catalog.soy_sauce.id),
            Some(&hana),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = app
        .request(
            Method::POST,
            "/api/refrigerator/remove",
            Some(&hana),
            Some(json!({"ingredient_ids": []})),
        )
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn recipe_lifecycle() {
    let app = TestApp::new();
    let catalog = app.catalog();
    let category = app.recipe_category();
    let hana = app.register("hana").await;
    let taro = app.register("taro").await;

    // lists left out entirely are reported like empty ones
    let (status, body) = app
        .request(
            Method::POST,
            "/api/recipes",
            Some(&hana),
            Some(json!({"name": "肉じゃが", "recipe_category_id": category})),
        )
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["errors"]["ingredients"].is_array(), "{body}");
    assert!(body["errors"]["instructions"].is_array(), "{body}");

    let (status, body) = app
        .request(
            Method::POST,
            "/api/recipes",
            Some(&hana),
            Some(json!({"name": 3, "recipe_category_id": category})),
        )
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["error"].is_string(), "{body}");

    let mut form = json!({
        "name": "肉じゃが",
        "recipe_category_id": category,
        "serving": 2,
        "is_published": true,
        "ingredients": [],
        "instructions": [],
    });
    let (status, body) = app
        .request(Method::POST, "/api/recipes", Some(&hana), Some(form.clone()))
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["errors"]["ingredients"].is_array());
    assert!(body["errors"]["instructions"].is_array());

    form["ingredients"] = json!([
        {"ingredient_id": catalog.potato.id, "quantity": 3, "unit": "pieces"},
        {"ingredient_id": catalog.pork.id, "quantity": 150, "unit": "grams"},
        {"ingredient_id": catalog.soy_sauce.id, "quantity": 2, "unit": "tablespoons"},
    ]);
    form["instructions"] = json!([{"body": "材料を切る"}, {"body": "煮込む"}]);
    let (status, body) = app
        .request(Method::POST, "/api/recipes", Some(&hana), Some(form.clone()))
        .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    let id = body["recipe"]["id"].clone();
    assert_eq!(body["recipe"]["author"]["name"], "hana");
    assert_eq!(body["recipe"]["ingredients"][2]["amount"], "大さじ2");
    assert_eq!(body["recipe"]["cookable"], false);

    let (status, body) = app
        .request(Method::GET, &format!("/api/recipes/{id}"), None, None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["recipe"]["instructions"][1]["step"], 2);

    for (liked, count) in [(true, 1), (false, 0)] {
        let (status, body) = app
            .request(Method::POST, &format!("/api/recipes/{id}/good"), Some(&taro), None)
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"liked": liked, "count": count}));
    }

    let (status, body) = app
        .request(
            Method::POST,
            &format!("/api/recipes/{id}/shopping-list"),
            Some(&taro),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["added"], 3);

    let (status, _) = app
        .request(Method::PUT, &format!("/api/recipes/{id}"), Some(&taro), Some(form.clone()))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = app
        .upload(&format!("/api/recipes/{id}/image"), &taro, &test_png())
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = app
        .upload(&format!("/api/recipes/{id}/image"), &hana, &test_png())
        .await;
    assert_eq!(status, StatusCode::OK);
    let image = body["image"].as_str().unwrap().to_owned();
    let response = app
        .send(
            Request::builder()
                .uri(format!("/storage/{image}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let (status, _) = app
        .upload(&format!("/api/recipes/{id}/instructions/1/image"), &hana, &test_png())
        .await;
    assert_eq!(status, StatusCode::OK);

    let (_, body) = app
        .request(Method::GET, "/api/recipe-categories", Some(&hana), None)
        .await;
    assert_eq!(body["categories"][0]["recipes"], 1);
    assert_eq!(body["categories"][0]["cookable"], 0);

    let (status, _) = app
        .request(Method::DELETE, &format!("/api/recipes/{id}"), Some(&hana), None)
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = app
        .request(Method::GET, &format!("/api/recipes/{id}"), Some(&hana), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(!app.state.storage.root().join(&image).exists());
}

#[tokio::test]
async fn social_login() {
    let app = TestApp::new();

    let response = app
        .send(
            Request::builder()
                .uri("/auth/fake/redirect")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::FOUND);
    let state = location(&response)
        .split_once("state=")
        .unwrap()
        .1
        .to_owned();

    let callback = |query: String| {
        Request::builder()
            .uri(format!("/auth/fake/callback?{query}"))
            .body(Body::empty())
            .unwrap()
    };

    let response = app
        .send(callback(format!("code=good-code&state={state}")))
        .await;
    assert_eq!(response.status(), StatusCode::FOUND);
    let token = location(&response)
        .strip_prefix("http://app.example/?token=")
        .unwrap()
        .to_owned();
    let (status, body) = app.request(Method::GET, "/api/user", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user"]["name"], "花子");
    assert_eq!(body["user"]["social_provider"], "fake");

    let response = app.send(callback("code=good-code&state=forged".into())).await;
    assert!(location(&response).starts_with("http://app.example/login?flash="));
    let response = app
        .send(callback(format!("code=bad-code&state={state}")))
        .await;
    assert!(location(&response).starts_with("http://app.example/login?flash="));

    let response = app
        .send(
            Request::builder()
                .uri("/auth/nobody/redirect")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn catalog_and_fallback() {
    let app = TestApp::new();
    app.catalog();

    let (status, body) = app
        .request(Method::GET, "/api/ingredients?seasoning=true", None, None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ingredients"][0]["name"], "醤油");

    let (_, body) = app
        .request(Method::GET, "/api/ingredients?q=%E3%81%AD%E3%81%8E", None, None)
        .await;
    assert_eq!(body["ingredients"][0]["name"], "玉ねぎ");

    let (_, body) = app
        .request(Method::GET, "/api/ingredients?q=%25", None, None)
        .await;
    assert_eq!(body["ingredients"], json!([]));

    let (_, body) = app.request(Method::GET, "/api/units", None, None).await;
    assert_eq!(body["units"][0], json!({"value": "grams", "label": "g"}));

    let (status, body) = app.request(Method::GET, "/api/nothing-here", None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Not Found");
}
