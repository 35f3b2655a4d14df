use anyhow::{anyhow, Context, Result};
use std::env;
use std::net::SocketAddr;
use std::time::Duration;

pub const DEFAULT_TMDB_BASE: &str = "https://api.themoviedb.org/3";
pub const DEFAULT_IMAGE_BASE: &str = "https://image.tmdb.org/t/p/w500";
const DEFAULT_LANGUAGE: &str = "en-US";
const DEFAULT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_DEBOUNCE_MS: u64 = 450;
const DEFAULT_BIND_ADDR: &str = "127.0.0.1:3147";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TmdbAuth {
    /// v4 read access token, sent as `Authorization: Bearer`.
    Bearer(String),
    /// v3 key, sent as the `api_key` query parameter.
    ApiKey(String),
}

#[derive(Debug, Clone)]
pub struct TmdbConfig {
    pub base_url: String,
    pub image_base_url: String,
    pub auth: TmdbAuth,
    pub language: String,
    pub timeout: Duration,
}

impl TmdbConfig {
    pub fn new(auth: TmdbAuth) -> Self {
        Self {
            base_url: DEFAULT_TMDB_BASE.to_string(),
            image_base_url: DEFAULT_IMAGE_BASE.to_string(),
            auth,
            language: DEFAULT_LANGUAGE.to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub tmdb: TmdbConfig,
    pub search_debounce: Duration,
    pub bind_addr: SocketAddr,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let auth = match (get("TMDB_BEARER_TOKEN"), get("TMDB_API_KEY")) {
            (Some(token), _) => TmdbAuth::Bearer(token),
            (None, Some(key)) => TmdbAuth::ApiKey(key),
            (None, None) => {
                return Err(anyhow!(
                    "Missing TMDB credentials: set TMDB_BEARER_TOKEN or TMDB_API_KEY"
                ))
            }
        };

        let mut tmdb = TmdbConfig::new(auth);
        if let Some(base) = get("TMDB_BASE_URL") {
            tmdb.base_url = base.trim_end_matches('/').to_string();
        }
        if let Some(base) = get("TMDB_IMAGE_BASE_URL") {
            tmdb.image_base_url = base.trim_end_matches('/').to_string();
        }
        if let Some(lang) = get("TMDB_LANGUAGE") {
            tmdb.language = lang;
        }
        if let Some(secs) = get("TMDB_TIMEOUT_SECS") {
            let secs: u64 = secs
                .parse()
                .with_context(|| format!("TMDB_TIMEOUT_SECS is not a number: {secs}"))?;
            tmdb.timeout = Duration::from_secs(secs.max(1));
        }

        let debounce_ms = match get("SEARCH_DEBOUNCE_MS") {
            Some(ms) => ms
                .parse()
                .with_context(|| format!("SEARCH_DEBOUNCE_MS is not a number: {ms}"))?,
            None => DEFAULT_DEBOUNCE_MS,
        };

        let bind = get("BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string());
        let bind_addr: SocketAddr = bind
            .parse()
            .with_context(|| format!("BIND_ADDR is not a socket address: {bind}"))?;

        Ok(Self {
            tmdb,
            search_debounce: Duration::from_millis(debounce_ms),
            bind_addr,
        })
    }
}
