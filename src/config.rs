// Copyright 2023 Remi Bernotavicius

use serde::Deserialize;
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

/// This is where the database and uploaded images live on-disk. On Linux it should be like:
/// `~/.local/share/gohandoki/`
fn data_path() -> PathBuf {
    directories::BaseDirs::new()
        .map(|dirs| dirs.data_dir().join("gohandoki"))
        .unwrap_or_else(|| PathBuf::from("gohandoki-data"))
}

/// `~/.config/gohandoki/config.toml` on Linux.
pub fn default_config_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|dirs| dirs.config_dir().join("gohandoki/config.toml"))
}

/// One OAuth2 authorization-code provider, keyed by name in `[social.<name>]`.
#[derive(Debug, Clone, Deserialize)]
pub struct SocialConfig {
    pub client_id: String,
    pub client_secret: String,
    pub authorize_url: String,
    pub token_url: String,
    pub userinfo_url: String,
    pub redirect_url: String,
    #[serde(default)]
    pub scopes: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub listen: SocketAddr,
    pub database: PathBuf,
    pub storage: PathBuf,
    /// Signs session tokens. Without it every restart signs everyone out.
    pub secret: Option<String>,
    /// Where the social login callback sends the browser with its token.
    pub home_url: String,
    /// Where a failed social login sends the browser, with a `flash` message.
    pub login_url: String,
    pub cors_origin: Option<String>,
    pub pool_size: u32,
    pub social: BTreeMap<String, SocialConfig>,
}

impl Default for Config {
    fn default() -> Self {
        let data = data_path();
        Self {
            listen: SocketAddr::from(([127, 0, 0, 1], 8080)),
            database: data.join("data.sqlite"),
            storage: data.join("storage"),
            secret: None,
            home_url: "http://localhost:5173/".into(),
            login_url: "http://localhost:5173/login".into(),
            cors_origin: None,
            pool_size: 8,
            social: BTreeMap::new(),
        }
    }
}

impl Config {
    /// Reads the config file. A missing file is only an error when it was
    /// asked for explicitly.
    pub fn load(path: Option<&Path>) -> crate::Result<Self> {
        let (path, required) = match path {
            Some(path) => (path.to_owned(), true),
            None => match default_config_path() {
                Some(path) => (path, false),
                None => return Ok(Self::default()),
            },
        };

        match std::fs::read_to_string(&path) {
            Ok(contents) => {
                log::info!("reading config from {}", path.display());
                Ok(toml::from_str(&contents)?)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound && !required => {
                log::info!("no config at {}, using defaults", path.display());
                Ok(Self::default())
            }
            Err(e) => Err(format!("failed to read config {}: {e}", path.display()).into()),
        }
    }

    pub fn session_secret(&self) -> Vec<u8> {
        match &self.secret {
            Some(secret) => secret.as_bytes().to_vec(),
            None => {
                log::warn!("no secret configured, sessions won't survive a restart");
                (0..32).map(|_| rand::random::<u8>()).collect()
            }
        }
    }
}

#[test]
fn parse_config() {
    let config: Config = toml::from_str(
        r#"
        listen = "0.0.0.0:3000"
        database = "/srv/gohandoki/data.sqlite"
        secret = "hunter2"
        cors_origin = "https://gohandoki.example"

        [social.google]
        client_id = "id"
        client_secret = "shh"
        authorize_url = "https://accounts.google.com/o/oauth2/v2/auth"
        token_url = "https://oauth2.googleapis.com/token"
        userinfo_url = "https://openidconnect.googleapis.com/v1/userinfo"
        redirect_url = "https://gohandoki.example/auth/google/callback"
        scopes = ["openid", "email", "profile"]
        "#,
    )
    .unwrap();

    assert_eq!(config.listen.port(), 3000);
    assert_eq!(config.database, Path::new("/srv/gohandoki/data.sqlite"));
    assert_eq!(config.session_secret(), b"hunter2");
    assert_eq!(config.pool_size, 8);
    assert_eq!(config.social["google"].scopes.len(), 3);
}

#[test]
fn missing_config() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    assert!(Config::load(Some(path.as_path())).is_err());

    std::fs::write(&path, "pool_size = 2\n").unwrap();
    let config = Config::load(Some(path.as_path())).unwrap();
    assert_eq!(config.pool_size, 2);
    assert!(config.social.is_empty());
    assert_eq!(config.session_secret().len(), 32);
}
