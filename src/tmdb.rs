use async_trait::async_trait;
use reqwest::{header, Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::{TmdbAuth, TmdbConfig};
use crate::error::RemoteFetchError;
use crate::models::{extract_year, AccountDetails, Genre, Movie, MovieDetail};

type Result<T> = std::result::Result<T, RemoteFetchError>;

/// The catalog calls the repository depends on.
#[async_trait]
pub trait TmdbApi: Send + Sync {
    /// Discover (popular first) when `query` is blank or absent, search otherwise.
    async fn discover_or_search(&self, page: u32, query: Option<&str>) -> Result<MoviesPageDto>;
    async fn movie_detail(&self, id: i32) -> Result<MovieDetailDto>;
    async fn account_details(&self) -> Result<AccountDetailsDto>;
    async fn add_favorite(
        &self,
        account_id: i32,
        media_id: i32,
        favorite: bool,
    ) -> Result<FavoriteResponseDto>;
    async fn favorite_movies(&self, account_id: i32, page: u32) -> Result<MoviesPageDto>;
    async fn movie_account_state(&self, movie_id: i32) -> Result<AccountStateDto>;

    /// Prefix prepended to `poster_path` values.
    fn image_base_url(&self) -> &str;
}

#[derive(Debug, Clone)]
pub struct TmdbClient {
    client: Client,
    config: TmdbConfig,
}

impl TmdbClient {
    pub fn new(config: TmdbConfig) -> Result<Self> {
        let user_agent = format!("moviedeck/{}", env!("CARGO_PKG_VERSION"));
        let client = Client::builder()
            .timeout(config.timeout)
            .user_agent(user_agent)
            .build()
            .map_err(|source| RemoteFetchError::Transport {
                url: config.base_url.clone(),
                source,
            })?;
        Ok(Self { client, config })
    }

    fn url(&self, path: &str, params: &[(&str, String)]) -> String {
        let mut url = format!("{}{}", self.config.base_url, path);
        for (i, (key, value)) in params.iter().enumerate() {
            url.push(if i == 0 { '?' } else { '&' });
            url.push_str(key);
            url.push('=');
            url.push_str(&urlencoding::encode(value));
        }
        url
    }

    fn authorize(&self, req: RequestBuilder) -> RequestBuilder {
        let req = req.header(header::ACCEPT, "application/json");
        match &self.config.auth {
            TmdbAuth::Bearer(token) => req.bearer_auth(token),
            TmdbAuth::ApiKey(key) => req.query(&[("api_key", key)]),
        }
    }

    fn language(&self) -> (&'static str, String) {
        ("language", self.config.language.clone())
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        debug!(url = %url, "GET");
        let req = self.authorize(self.client.get(url));
        self.send(url, req).await
    }

    async fn post_json<B: Serialize + Sync, T: DeserializeOwned>(
        &self,
        url: &str,
        body: &B,
    ) -> Result<T> {
        debug!(url = %url, "POST");
        let req = self.authorize(self.client.post(url).json(body));
        self.send(url, req).await
    }

    async fn send<T: DeserializeOwned>(&self, url: &str, req: RequestBuilder) -> Result<T> {
        let transport = |source| RemoteFetchError::Transport {
            url: url.to_string(),
            source,
        };
        let res = req.send().await.map_err(transport)?;
        let status = res.status();
        let text = res.text().await.map_err(transport)?;
        if !status.is_success() {
            return Err(RemoteFetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
                body: text,
            });
        }
        serde_json::from_str(&text).map_err(|source| RemoteFetchError::Decode {
            url: url.to_string(),
            source,
        })
    }
}

#[async_trait]
impl TmdbApi for TmdbClient {
    async fn discover_or_search(&self, page: u32, query: Option<&str>) -> Result<MoviesPageDto> {
        let url = match query.map(str::trim).filter(|q| !q.is_empty()) {
            Some(q) => self.url(
                "/search/movie",
                &[
                    ("query", q.to_string()),
                    ("include_adult", "false".to_string()),
                    self.language(),
                    ("page", page.to_string()),
                ],
            ),
            None => self.url(
                "/discover/movie",
                &[
                    ("include_adult", "false".to_string()),
                    ("include_video", "false".to_string()),
                    self.language(),
                    ("page", page.to_string()),
                    ("sort_by", "popularity.desc".to_string()),
                ],
            ),
        };
        self.get_json(&url).await
    }

    async fn movie_detail(&self, id: i32) -> Result<MovieDetailDto> {
        let url = self.url(&format!("/movie/{id}"), &[self.language()]);
        self.get_json(&url).await
    }

    async fn account_details(&self) -> Result<AccountDetailsDto> {
        let url = self.url("/account", &[]);
        self.get_json(&url).await
    }

    async fn add_favorite(
        &self,
        account_id: i32,
        media_id: i32,
        favorite: bool,
    ) -> Result<FavoriteResponseDto> {
        let url = self.url(&format!("/account/{account_id}/favorite"), &[]);
        let body = FavoriteRequest {
            media_type: "movie",
            media_id,
            favorite,
        };
        let res: FavoriteResponseDto = self.post_json(&url, &body).await?;
        if res.success == Some(false) {
            return Err(RemoteFetchError::Rejected {
                url,
                message: res
                    .status_message
                    .unwrap_or_else(|| "favorite update was not applied".to_string()),
            });
        }
        Ok(res)
    }

    async fn favorite_movies(&self, account_id: i32, page: u32) -> Result<MoviesPageDto> {
        let url = self.url(
            &format!("/account/{account_id}/favorite/movies"),
            &[
                self.language(),
                ("page", page.to_string()),
                ("sort_by", "created_at.asc".to_string()),
            ],
        );
        self.get_json(&url).await
    }

    async fn movie_account_state(&self, movie_id: i32) -> Result<AccountStateDto> {
        let url = self.url(&format!("/movie/{movie_id}/account_states"), &[]);
        self.get_json(&url).await
    }

    fn image_base_url(&self) -> &str {
        &self.config.image_base_url
    }
}

#[derive(Debug, Serialize)]
struct FavoriteRequest {
    media_type: &'static str,
    media_id: i32,
    favorite: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MoviesPageDto {
    #[serde(default = "first_page")]
    pub page: u32,
    #[serde(default)]
    pub results: Vec<MovieDto>,
    #[serde(default)]
    pub total_pages: u32,
    #[serde(default)]
    pub total_results: u32,
}

fn first_page() -> u32 {
    1
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MovieDto {
    pub id: i32,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub overview: String,
    pub poster_path: Option<String>,
    #[serde(default)]
    pub vote_average: f64,
    pub release_date: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MovieDetailDto {
    pub id: i32,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub overview: String,
    pub poster_path: Option<String>,
    #[serde(default)]
    pub vote_average: f64,
    pub release_date: Option<String>,
    pub runtime: Option<i32>,
    #[serde(default)]
    pub genres: Vec<GenreDto>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GenreDto {
    pub id: i32,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AccountDetailsDto {
    pub id: i32,
    pub username: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FavoriteResponseDto {
    pub success: Option<bool>,
    pub status_code: Option<i32>,
    pub status_message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AccountStateDto {
    pub id: i32,
    #[serde(default)]
    pub favorite: bool,
}

pub fn poster_url(image_base: &str, path: Option<&str>) -> Option<String> {
    let path = path.map(str::trim).filter(|p| !p.is_empty())?;
    if path.starts_with('/') {
        Some(format!("{image_base}{path}"))
    } else {
        Some(format!("{image_base}/{path}"))
    }
}

impl MovieDto {
    pub fn into_movie(self, image_base: &str) -> Movie {
        let release_year = self.release_date.as_deref().and_then(extract_year);
        Movie {
            id: self.id,
            poster_url: poster_url(image_base, self.poster_path.as_deref()),
            title: self.title,
            overview: self.overview,
            rating: self.vote_average,
            release_year,
        }
    }
}

impl MovieDetailDto {
    pub fn into_detail(self, image_base: &str) -> MovieDetail {
        MovieDetail {
            id: self.id,
            poster_url: poster_url(image_base, self.poster_path.as_deref()),
            title: self.title,
            overview: self.overview,
            rating: self.vote_average,
            release_date: self.release_date.filter(|d| !d.is_empty()),
            runtime: self.runtime.filter(|r| *r > 0),
            genres: self
                .genres
                .into_iter()
                .map(|g| Genre {
                    id: g.id,
                    name: g.name,
                })
                .collect(),
        }
    }
}

impl From<AccountDetailsDto> for AccountDetails {
    fn from(dto: AccountDetailsDto) -> Self {
        AccountDetails {
            id: dto.id,
            username: dto.username.filter(|u| !u.is_empty()),
        }
    }
}
