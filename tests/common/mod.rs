#![allow(dead_code)]

use moviedeck::tmdb::{
    AccountDetailsDto, AccountStateDto, FavoriteResponseDto, MovieDetailDto, MovieDto,
    MoviesPageDto, TmdbApi,
};
use moviedeck::RemoteFetchError;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::watch;

pub const IMAGE_BASE: &str = "https://img.test";

#[derive(Debug, Clone)]
pub enum Reply {
    Page(MoviesPageDto),
    Fail(u16),
    Slow(Duration, MoviesPageDto),
}

/// In-memory catalog. Discover pages are keyed by the empty query.
pub struct FakeTmdb {
    pub catalog: Mutex<HashMap<(String, u32), Reply>>,
    pub catalog_calls: Mutex<Vec<(String, u32)>>,
    pub details: Mutex<HashMap<i32, MovieDetailDto>>,
    pub account: Mutex<Option<AccountDetailsDto>>,
    pub server_favorites: Mutex<Vec<MovieDto>>,
    pub favorites_page_size: usize,
    pub favorite_calls: Mutex<Vec<(i32, i32, bool)>>,
    pub fail_favorite_updates: Mutex<bool>,
    pub fail_favorite_pages: Mutex<bool>,
    pub account_states: Mutex<HashMap<i32, bool>>,
}

impl Default for FakeTmdb {
    fn default() -> Self {
        Self {
            catalog: Mutex::new(HashMap::new()),
            catalog_calls: Mutex::new(Vec::new()),
            details: Mutex::new(HashMap::new()),
            account: Mutex::new(None),
            server_favorites: Mutex::new(Vec::new()),
            favorites_page_size: 2,
            favorite_calls: Mutex::new(Vec::new()),
            fail_favorite_updates: Mutex::new(false),
            fail_favorite_pages: Mutex::new(false),
            account_states: Mutex::new(HashMap::new()),
        }
    }
}

impl FakeTmdb {
    pub fn with_account(self, id: i32) -> Self {
        *self.account.lock().unwrap() = Some(AccountDetailsDto {
            id,
            username: Some("tester".to_string()),
        });
        self
    }

    pub fn reply(&self, query: &str, page: u32, reply: Reply) {
        self.catalog
            .lock()
            .unwrap()
            .insert((query.to_string(), page), reply);
    }

    pub fn calls_for(&self, query: &str) -> Vec<u32> {
        self.catalog_calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(q, _)| q == query)
            .map(|(_, p)| *p)
            .collect()
    }
}

pub fn movie_dto(id: i32, title: &str) -> MovieDto {
    MovieDto {
        id,
        title: title.to_string(),
        overview: String::new(),
        poster_path: Some(format!("/poster-{id}.jpg")),
        vote_average: 7.0,
        release_date: Some("2022-03-04".to_string()),
    }
}

pub fn page_dto(page: u32, total_pages: u32, movies: &[(i32, &str)]) -> MoviesPageDto {
    MoviesPageDto {
        page,
        results: movies.iter().map(|(id, t)| movie_dto(*id, t)).collect(),
        total_pages,
        total_results: total_pages * 20,
    }
}

pub fn detail_dto(id: i32, title: &str, poster: Option<&str>) -> MovieDetailDto {
    MovieDetailDto {
        id,
        title: title.to_string(),
        overview: "detail overview".to_string(),
        poster_path: poster.map(str::to_string),
        vote_average: 8.1,
        release_date: Some("2022-03-04".to_string()),
        runtime: Some(176),
        genres: Vec::new(),
    }
}

fn status(url: &str, status: u16) -> RemoteFetchError {
    RemoteFetchError::Status {
        url: url.to_string(),
        status,
        body: "fake failure".to_string(),
    }
}

#[async_trait::async_trait]
impl TmdbApi for FakeTmdb {
    async fn discover_or_search(
        &self,
        page: u32,
        query: Option<&str>,
    ) -> Result<MoviesPageDto, RemoteFetchError> {
        let key = (query.unwrap_or("").trim().to_string(), page);
        self.catalog_calls.lock().unwrap().push(key.clone());
        let reply = self.catalog.lock().unwrap().get(&key).cloned();
        match reply {
            Some(Reply::Page(dto)) => Ok(dto),
            Some(Reply::Slow(delay, dto)) => {
                tokio::time::sleep(delay).await;
                Ok(dto)
            }
            Some(Reply::Fail(code)) => Err(status("/discover", code)),
            None => Err(status("/discover", 404)),
        }
    }

    async fn movie_detail(&self, id: i32) -> Result<MovieDetailDto, RemoteFetchError> {
        let found = self.details.lock().unwrap().get(&id).cloned();
        found.ok_or_else(|| status(&format!("/movie/{id}"), 404))
    }

    async fn account_details(&self) -> Result<AccountDetailsDto, RemoteFetchError> {
        let account = self.account.lock().unwrap().clone();
        account.ok_or_else(|| status("/account", 401))
    }

    async fn add_favorite(
        &self,
        account_id: i32,
        media_id: i32,
        favorite: bool,
    ) -> Result<FavoriteResponseDto, RemoteFetchError> {
        self.favorite_calls
            .lock()
            .unwrap()
            .push((account_id, media_id, favorite));
        if *self.fail_favorite_updates.lock().unwrap() {
            return Err(status("/account/favorite", 500));
        }
        let mut list = self.server_favorites.lock().unwrap();
        list.retain(|m| m.id != media_id);
        if favorite {
            list.push(movie_dto(media_id, &format!("Movie {media_id}")));
        }
        Ok(FavoriteResponseDto {
            success: Some(true),
            status_code: Some(if favorite { 1 } else { 13 }),
            status_message: Some("Success.".to_string()),
        })
    }

    async fn favorite_movies(
        &self,
        _account_id: i32,
        page: u32,
    ) -> Result<MoviesPageDto, RemoteFetchError> {
        if *self.fail_favorite_pages.lock().unwrap() {
            return Err(status("/account/favorite/movies", 503));
        }
        let list = self.server_favorites.lock().unwrap().clone();
        let size = self.favorites_page_size.max(1);
        let total_pages = list.len().div_ceil(size) as u32;
        let start = (page.saturating_sub(1) as usize) * size;
        let results = list.into_iter().skip(start).take(size).collect();
        Ok(MoviesPageDto {
            page,
            results,
            total_pages,
            total_results: 0,
        })
    }

    async fn movie_account_state(&self, movie_id: i32) -> Result<AccountStateDto, RemoteFetchError> {
        let favorite = self.account_states.lock().unwrap().get(&movie_id).copied();
        match favorite {
            Some(favorite) => Ok(AccountStateDto {
                id: movie_id,
                favorite,
            }),
            None => Err(status("/account_states", 401)),
        }
    }

    fn image_base_url(&self) -> &str {
        IMAGE_BASE
    }
}

pub async fn wait_for<T, F>(rx: &mut watch::Receiver<T>, pred: F) -> T
where
    T: Clone,
    F: FnMut(&T) -> bool,
{
    match tokio::time::timeout(Duration::from_secs(30), rx.wait_for(pred)).await {
        Ok(Ok(value)) => value.clone(),
        Ok(Err(_)) => panic!("state sender dropped"),
        Err(_) => panic!("timed out waiting for state"),
    }
}
