// Copyright 2023 Remi Bernotavicius

use crate::config::SocialConfig;
use crate::error::{AppError, AppResult};
use crate::query::users::SocialIdentity;
use axum::async_trait;
use reqwest::Url;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

const USER_AGENT: &str = concat!("gohandoki/", env!("CARGO_PKG_VERSION"));

/// The person signing in, as the provider describes them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SocialUser {
    pub id: String,
    pub name: String,
    pub email: Option<String>,
    /// Only a verified email may match an existing account.
    pub email_verified: bool,
    pub avatar: Option<String>,
}

impl SocialUser {
    pub fn into_identity(self, provider: &str) -> SocialIdentity {
        SocialIdentity {
            provider: provider.into(),
            id: self.id,
            name: self.name,
            email: self.email,
            email_verified: self.email_verified,
        }
    }
}

#[async_trait]
pub trait SocialProvider: Send + Sync {
    /// Where to send the browser to sign in. `state` comes back on the callback.
    fn authorize_url(&self, state: &str) -> AppResult<String>;

    /// Exchanges the callback's code for the signed-in user.
    async fn fetch_user(&self, code: &str) -> AppResult<SocialUser>;
}

pub type SocialProviders = Arc<BTreeMap<String, Arc<dyn SocialProvider>>>;

pub fn providers_from_config(
    configs: &BTreeMap<String, SocialConfig>,
) -> AppResult<SocialProviders> {
    let mut providers: BTreeMap<String, Arc<dyn SocialProvider>> = BTreeMap::new();
    for (name, config) in configs {
        log::info!("social login enabled for {name}");
        providers.insert(name.clone(), Arc::new(OAuthProvider::new(config.clone())?));
    }
    Ok(Arc::new(providers))
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct UserInfo {
    #[serde(alias = "sub")]
    id: serde_json::Value,
    name: Option<String>,
    email: Option<String>,
    /// OpenID Connect claim. Providers that leave it out are treated as unverified.
    #[serde(default)]
    email_verified: bool,
    #[serde(alias = "picture", alias = "avatar_url")]
    avatar: Option<String>,
}

impl UserInfo {
    fn into_user(self) -> AppResult<SocialUser> {
        let id = match self.id {
            serde_json::Value::String(id) => id,
            serde_json::Value::Number(id) => id.to_string(),
            other => return Err(AppError::Social(format!("unexpected user id {other}"))),
        };
        let name = self
            .name
            .filter(|n| !n.trim().is_empty())
            .or_else(|| {
                let email = self.email.as_deref()?;
                email.split('@').next().map(str::to_owned)
            })
            .unwrap_or_else(|| "ゲスト".into());
        Ok(SocialUser {
            id,
            name,
            email: self.email,
            email_verified: self.email_verified,
            avatar: self.avatar,
        })
    }
}

/// The OAuth2 authorization-code flow: exchange the code for an access token,
/// then read the userinfo endpoint with it.
pub struct OAuthProvider {
    config: SocialConfig,
    http_client: reqwest::Client,
}

impl OAuthProvider {
    pub fn new(config: SocialConfig) -> AppResult<Self> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            config,
            http_client,
        })
    }
}

#[async_trait]
impl SocialProvider for OAuthProvider {
    fn authorize_url(&self, state: &str) -> AppResult<String> {
        let scope = self.config.scopes.join(" ");
        let url = Url::parse_with_params(
            &self.config.authorize_url,
            [
                ("response_type", "code"),
                ("client_id", self.config.client_id.as_str()),
                ("redirect_uri", self.config.redirect_url.as_str()),
                ("scope", scope.as_str()),
                ("state", state),
            ],
        )
        .map_err(|e| AppError::Social(format!("bad authorize_url: {e}")))?;
        Ok(url.into())
    }

    async fn fetch_user(&self, code: &str) -> AppResult<SocialUser> {
        let token: TokenResponse = self
            .http_client
            .post(&self.config.token_url)
            .form(&[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("redirect_uri", self.config.redirect_url.as_str()),
                ("client_id", self.config.client_id.as_str()),
                ("client_secret", self.config.client_secret.as_str()),
            ])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let info: UserInfo = self
            .http_client
            .get(&self.config.userinfo_url)
            .bearer_auth(&token.access_token)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        info.into_user()
    }
}

#[test]
fn authorize_url_carries_state() {
    let provider = OAuthProvider::new(SocialConfig {
        client_id: "client".into(),
        client_secret: "secret".into(),
        authorize_url: "https://provider.example/authorize".into(),
        token_url: "https://provider.example/token".into(),
        userinfo_url: "https://provider.example/userinfo".into(),
        redirect_url: "http://localhost:8080/auth/example/callback".into(),
        scopes: vec!["openid".into(), "email".into()],
    })
    .unwrap();

    let url = Url::parse(&provider.authorize_url("abc").unwrap()).unwrap();
    let query: BTreeMap<_, _> = url.query_pairs().into_owned().collect();
    assert_eq!(url.host_str(), Some("provider.example"));
    assert_eq!(query["state"], "abc");
    assert_eq!(query["client_id"], "client");
    assert_eq!(query["scope"], "openid email");
    assert_eq!(query["response_type"], "code");
}

#[test]
fn userinfo_shapes() {
    let oidc: UserInfo = serde_json::from_str(
        r#"{
            "sub": "1234",
            "name": "花子",
            "email": "hana@example.com",
            "email_verified": true,
            "picture": "https://x/p.png"
        }"#,
    )
    .unwrap();
    assert_eq!(
        oidc.into_user().unwrap(),
        SocialUser {
            id: "1234".into(),
            name: "花子".into(),
            email: Some("hana@example.com".into()),
            email_verified: true,
            avatar: Some("https://x/p.png".into()),
        }
    );

    let numeric: UserInfo =
        serde_json::from_str(r#"{"id": 42, "email": "taro@example.com"}"#).unwrap();
    let user = numeric.into_user().unwrap();
    assert_eq!(user.id, "42");
    assert_eq!(user.name, "taro");
    assert!(!user.email_verified);
}
