use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tokio_stream::wrappers::WatchStream;
use tracing::{debug, info};

use crate::error::{Error, RemoteFetchError, Result};
use crate::models::{AccountDetails, Movie, MovieDetail};
use crate::paging::{Page, PageFetcher, Pager, PagingConfig, PagingSource};
use crate::state::Observable;
use crate::tmdb::{MoviesPageDto, TmdbApi};

// TMDB refuses pages past 500.
const MAX_FAVORITE_PAGES: u32 = 500;

/// Every movie seen by any paged sequence, keyed by id.
#[derive(Debug, Default)]
pub struct MovieCache {
    order: Vec<i32>,
    by_id: HashMap<i32, Movie>,
}

impl MovieCache {
    /// Returns how many ids were new. Known ids keep their position but take
    /// the newer record.
    pub fn merge<I>(&mut self, movies: I) -> usize
    where
        I: IntoIterator<Item = Movie>,
    {
        let mut added = 0;
        for movie in movies {
            if self.by_id.insert(movie.id, movie.clone()).is_none() {
                self.order.push(movie.id);
                added += 1;
            }
        }
        added
    }

    pub fn get(&self, id: i32) -> Option<&Movie> {
        self.by_id.get(&id)
    }

    pub fn movies(&self) -> impl Iterator<Item = &Movie> {
        self.order.iter().filter_map(|id| self.by_id.get(id))
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

fn into_page(dto: MoviesPageDto, image_base: &str) -> Page<Movie> {
    Page {
        page: dto.page,
        total_pages: dto.total_pages,
        items: dto
            .results
            .into_iter()
            .map(|m| m.into_movie(image_base))
            .collect(),
    }
}

struct CatalogPages {
    api: Arc<dyn TmdbApi>,
    cache: Arc<Mutex<MovieCache>>,
    query: Option<String>,
}

#[async_trait]
impl PageFetcher<Movie> for CatalogPages {
    async fn fetch_page(&self, page: u32) -> Result<Page<Movie>, RemoteFetchError> {
        let dto = self
            .api
            .discover_or_search(page, self.query.as_deref())
            .await?;
        let page = into_page(dto, self.api.image_base_url());
        let added = self.cache.lock().await.merge(page.items.iter().cloned());
        debug!(query = ?self.query, page = page.page, added, "catalog page cached");
        Ok(page)
    }
}

struct FavoritePages {
    api: Arc<dyn TmdbApi>,
    cache: Arc<Mutex<MovieCache>>,
    account_id: i32,
}

#[async_trait]
impl PageFetcher<Movie> for FavoritePages {
    async fn fetch_page(&self, page: u32) -> Result<Page<Movie>, RemoteFetchError> {
        let dto = self.api.favorite_movies(self.account_id, page).await?;
        let page = into_page(dto, self.api.image_base_url());
        self.cache.lock().await.merge(page.items.iter().cloned());
        Ok(page)
    }
}

pub struct MovieRepository {
    api: Arc<dyn TmdbApi>,
    cache: Arc<Mutex<MovieCache>>,
    account: Observable<Option<AccountDetails>>,
    favorites: Observable<HashSet<i32>>,
    favorites_revision: watch::Sender<u64>,
    // Held across the remote call so two toggles cannot interleave.
    toggle_lock: Mutex<()>,
}

impl MovieRepository {
    pub fn new(api: Arc<dyn TmdbApi>) -> Self {
        let (favorites_revision, _) = watch::channel(0);
        Self {
            api,
            cache: Arc::new(Mutex::new(MovieCache::default())),
            account: Observable::new(None),
            favorites: Observable::new(HashSet::new()),
            favorites_revision,
            toggle_lock: Mutex::new(()),
        }
    }

    /// Discover when `query` is blank, search otherwise. A new query needs a new pager.
    pub fn paged_movies(&self, query: Option<&str>) -> Pager<Movie> {
        let query = query
            .map(str::trim)
            .filter(|q| !q.is_empty())
            .map(str::to_string);
        let source = PagingSource::new(CatalogPages {
            api: self.api.clone(),
            cache: self.cache.clone(),
            query,
        });
        Pager::new(source, PagingConfig::default())
    }

    /// Restarts from page 1 after every confirmed favorite change.
    pub fn favorite_paged_movies(&self, account_id: i32) -> Pager<Movie> {
        let source = PagingSource::new(FavoritePages {
            api: self.api.clone(),
            cache: self.cache.clone(),
            account_id,
        });
        Pager::new(source, PagingConfig::default())
            .invalidated_by(self.favorites_revision.subscribe())
    }

    pub async fn movie_details(&self, id: i32) -> Result<MovieDetail> {
        let dto = self.api.movie_detail(id).await?;
        let mut detail = dto.into_detail(self.api.image_base_url());
        if detail.poster_url.is_none() {
            if let Some(cached) = self.cache.lock().await.get(id) {
                debug!(movie_id = id, "using cached poster");
                detail.poster_url = cached.poster_url.clone();
            }
        }
        Ok(detail)
    }

    pub async fn account_details(&self) -> Result<AccountDetails> {
        Ok(self.api.account_details().await?.into())
    }

    /// Fetches the account and seeds the favorites set from every favorites page.
    pub async fn sign_in(&self) -> Result<AccountDetails> {
        let _guard = self.toggle_lock.lock().await;
        let account = self.account_details().await?;

        let mut ids = HashSet::new();
        let mut page = 1;
        loop {
            let dto = self.api.favorite_movies(account.id, page).await?;
            let total_pages = dto.total_pages.min(MAX_FAVORITE_PAGES);
            let movies = into_page(dto, self.api.image_base_url()).items;
            ids.extend(movies.iter().map(|m| m.id));
            self.cache.lock().await.merge(movies);
            if page >= total_pages {
                break;
            }
            page += 1;
        }

        info!(
            account_id = account.id,
            favorites = ids.len(),
            "Signed in as {}",
            account.username.as_deref().unwrap_or("<unnamed>")
        );
        self.account.set(Some(account.clone()));
        if self.favorites.set(ids) {
            self.favorites_revision.send_modify(|rev| *rev += 1);
        }
        Ok(account)
    }

    pub fn account(&self) -> Option<AccountDetails> {
        self.account.get()
    }

    pub fn subscribe_account(&self) -> watch::Receiver<Option<AccountDetails>> {
        self.account.subscribe()
    }

    /// Flips membership of `id` once the catalog has confirmed it. Returns the
    /// new membership.
    pub async fn toggle_favorite(&self, id: i32) -> Result<bool> {
        let _guard = self.toggle_lock.lock().await;
        let account_id = self.account.with(|a| a.as_ref().map(|a| a.id));
        let account_id = account_id.ok_or(Error::NoAccount)?;

        let favorite = !self.favorites.with(|f| f.contains(&id));
        self.api.add_favorite(account_id, id, favorite).await?;

        self.favorites.update(|f| {
            if favorite {
                f.insert(id);
            } else {
                f.remove(&id);
            }
        });
        self.favorites_revision.send_modify(|rev| *rev += 1);
        info!(movie_id = id, favorite, "favorite updated");
        Ok(favorite)
    }

    pub async fn movie_account_state(&self, id: i32) -> Result<bool> {
        Ok(self.api.movie_account_state(id).await?.favorite)
    }

    pub fn favorites(&self) -> HashSet<i32> {
        self.favorites.get()
    }

    pub fn is_favorite(&self, id: i32) -> bool {
        self.favorites.with(|f| f.contains(&id))
    }

    /// Current set first, then one item per change.
    pub fn favorites_stream(&self) -> WatchStream<HashSet<i32>> {
        self.favorites.stream()
    }

    pub fn subscribe_favorites(&self) -> watch::Receiver<HashSet<i32>> {
        self.favorites.subscribe()
    }

    pub async fn cached_movie(&self, id: i32) -> Option<Movie> {
        self.cache.lock().await.get(id).cloned()
    }

    pub async fn cached_len(&self) -> usize {
        self.cache.lock().await.len()
    }
}
