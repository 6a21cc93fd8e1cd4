// src/config.rs

use std::{env, fs, path::PathBuf, time::Duration};

use dotenvy::dotenv;
use thiserror::Error;
use url::Url;

/// File consulted for the OAuth client id when `OAUTH_CLIENT_ID` is unset.
pub const CLIENT_ID_FILE: &str = "oauth_client_id.txt";

const DEFAULT_ISSUERS: &str = "accounts.google.com,https://accounts.google.com";
const DEFAULT_CERTS_URL: &str = "https://www.googleapis.com/oauth2/v3/certs";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error(
        "OAUTH_CLIENT_ID is empty. Obtain a web client id from your identity provider and \
         export it, or store it in {CLIENT_ID_FILE} in the working directory"
    )]
    MissingClientId,

    #[error("invalid value for {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    /// Expected `aud` of identity assertions.
    pub oauth_client_id: String,
    /// Accepted `iss` values of identity assertions.
    pub oauth_issuers: Vec<String>,
    /// JWKS endpoint of the identity provider.
    pub oauth_certs_url: Url,
    pub key_fetch_timeout: Duration,
    pub port: u16,
    pub static_dir: PathBuf,
    pub rust_log: String,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv().ok();

        let database_url = env::var("DATABASE_URL")
            .unwrap_or_else(|_| "sqlite://quizdrum.db?mode=rwc".to_string());

        let oauth_client_id = match env::var("OAUTH_CLIENT_ID") {
            Ok(id) if !id.trim().is_empty() => id.trim().to_string(),
            _ => read_client_id_file()?,
        };

        let oauth_issuers =
            parse_issuers(&env::var("OAUTH_ISSUERS").unwrap_or_else(|_| DEFAULT_ISSUERS.into()));
        if oauth_issuers.is_empty() {
            return Err(ConfigError::Invalid {
                name: "OAUTH_ISSUERS",
                reason: "at least one issuer is required".to_string(),
            });
        }

        let certs_url =
            env::var("OAUTH_CERTS_URL").unwrap_or_else(|_| DEFAULT_CERTS_URL.to_string());
        let oauth_certs_url = Url::parse(&certs_url).map_err(|e| ConfigError::Invalid {
            name: "OAUTH_CERTS_URL",
            reason: e.to_string(),
        })?;

        let key_fetch_timeout = Duration::from_secs(parse_number(
            "KEY_FETCH_TIMEOUT_SECS",
            env::var("KEY_FETCH_TIMEOUT_SECS").ok(),
            10,
        )?);

        let port = parse_number("PORT", env::var("PORT").ok(), 8094)?;

        let static_dir = env::var("STATIC_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("static"));

        let rust_log = env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());

        Ok(Self {
            database_url,
            oauth_client_id,
            oauth_issuers,
            oauth_certs_url,
            key_fetch_timeout,
            port,
            static_dir,
            rust_log,
        })
    }

    /// Configuration for tests: in-memory database, fixed client id.
    pub fn for_tests(oauth_client_id: &str) -> Self {
        Self {
            database_url: "sqlite::memory:".to_string(),
            oauth_client_id: oauth_client_id.to_string(),
            oauth_issuers: parse_issuers(DEFAULT_ISSUERS),
            oauth_certs_url: Url::parse("http://127.0.0.1:0/certs")
                .expect("static test url is valid"),
            key_fetch_timeout: Duration::from_secs(2),
            port: 0,
            static_dir: PathBuf::from("static"),
            rust_log: "error".to_string(),
        }
    }
}

fn read_client_id_file() -> Result<String, ConfigError> {
    let contents = fs::read_to_string(CLIENT_ID_FILE).map_err(|_| ConfigError::MissingClientId)?;
    let id = contents.trim();
    if id.is_empty() {
        return Err(ConfigError::MissingClientId);
    }
    Ok(id.to_string())
}

/// Splits a comma separated issuer list, dropping blanks.
pub fn parse_issuers(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_number<T: std::str::FromStr>(
    name: &'static str,
    raw: Option<String>,
    default: T,
) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match raw {
        None => Ok(default),
        Some(value) => value.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            name,
            reason: e.to_string(),
        }),
    }
}
