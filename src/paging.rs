use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::error::RemoteFetchError;
use crate::models::Identified;

pub const DEFAULT_INITIAL_KEY: u32 = 1;

/// One page as returned by the catalog.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: u32,
    pub total_pages: u32,
}

#[async_trait]
pub trait PageFetcher<T>: Send + Sync {
    async fn fetch_page(&self, page: u32) -> Result<Page<T>, RemoteFetchError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadDirection {
    /// Replaces everything loaded so far.
    Refresh,
    Append,
    Prepend,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadParams {
    pub key: u32,
    pub direction: LoadDirection,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LoadedPage<T> {
    pub data: Vec<T>,
    pub key: u32,
    pub prev_key: Option<u32>,
    pub next_key: Option<u32>,
}

#[derive(Debug)]
pub enum LoadResult<T> {
    Page(LoadedPage<T>),
    Error(RemoteFetchError),
}

pub fn prev_key(key: u32) -> Option<u32> {
    if key > 1 {
        Some(key - 1)
    } else {
        None
    }
}

pub fn next_key(key: u32, total_pages: u32) -> Option<u32> {
    if key < total_pages {
        Some(key + 1)
    } else {
        None
    }
}

/// Snapshot handed to [`PagingSource::refresh_key`]. Positions index into the
/// concatenated `data` of `pages`.
pub struct PagingState<'a, T> {
    pub pages: &'a [LoadedPage<T>],
    pub anchor_position: Option<usize>,
}

impl<T> PagingState<'_, T> {
    pub fn closest_page_to_position(&self, position: usize) -> Option<&LoadedPage<T>> {
        let mut offset = 0;
        for page in self.pages {
            if position < offset + page.data.len() {
                return Some(page);
            }
            offset += page.data.len();
        }
        self.pages.last()
    }
}

/// Turns a "fetch page N" function into keyed load results.
pub struct PagingSource<T> {
    fetcher: Arc<dyn PageFetcher<T>>,
}

impl<T> Clone for PagingSource<T> {
    fn clone(&self) -> Self {
        Self {
            fetcher: self.fetcher.clone(),
        }
    }
}

impl<T: Send + 'static> PagingSource<T> {
    pub fn new<F>(fetcher: F) -> Self
    where
        F: PageFetcher<T> + 'static,
    {
        Self {
            fetcher: Arc::new(fetcher),
        }
    }

    /// Never fails past this boundary: errors come back as [`LoadResult::Error`].
    pub async fn load(&self, key: u32) -> LoadResult<T> {
        match self.fetcher.fetch_page(key).await {
            Ok(page) => LoadResult::Page(LoadedPage {
                data: page.items,
                key,
                prev_key: prev_key(key),
                next_key: next_key(key, page.total_pages),
            }),
            Err(err) => LoadResult::Error(err),
        }
    }

    pub fn refresh_key(&self, state: &PagingState<'_, T>) -> Option<u32> {
        let anchor = state.anchor_position?;
        let page = state.closest_page_to_position(anchor)?;
        page.prev_key
            .map(|k| k + 1)
            .or_else(|| page.next_key.map(|k| k - 1))
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PagingConfig {
    pub initial_key: u32,
}

impl Default for PagingConfig {
    fn default() -> Self {
        Self {
            initial_key: DEFAULT_INITIAL_KEY,
        }
    }
}

#[derive(Debug)]
pub enum LoadStatus {
    Loaded { key: u32, added: usize },
    /// No page exists in the requested direction.
    EndReached,
    Failed(RemoteFetchError),
}

/// A consumer-driven paged sequence.
///
/// Items from all loaded pages form one list, deduplicated by id in
/// first-seen order. Loads are cancel-safe: state only changes once a fetch
/// has completed, so dropping a pending `load_*` future leaves the pager as
/// it was.
pub struct Pager<T> {
    source: PagingSource<T>,
    config: PagingConfig,
    pages: Vec<LoadedPage<T>>,
    seen: HashSet<i32>,
    failed: Option<LoadParams>,
    invalidation: Option<watch::Receiver<u64>>,
    applied_revision: u64,
}

impl<T> Pager<T>
where
    T: Identified + Send + 'static,
{
    pub fn new(source: PagingSource<T>, config: PagingConfig) -> Self {
        Self {
            source,
            config,
            pages: Vec::new(),
            seen: HashSet::new(),
            failed: None,
            invalidation: None,
            applied_revision: 0,
        }
    }

    /// Restart from the initial key whenever `revision` moves.
    pub fn invalidated_by(mut self, revision: watch::Receiver<u64>) -> Self {
        self.applied_revision = *revision.borrow();
        self.invalidation = Some(revision);
        self
    }

    pub fn pages(&self) -> &[LoadedPage<T>] {
        &self.pages
    }

    pub fn items(&self) -> impl Iterator<Item = &T> {
        self.pages.iter().flat_map(|p| p.data.iter())
    }

    pub fn len(&self) -> usize {
        self.pages.iter().map(|p| p.data.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn end_reached(&self) -> bool {
        !self.is_invalidated() && self.pages.last().is_some_and(|p| p.next_key.is_none())
    }

    pub fn has_failed_load(&self) -> bool {
        self.failed.is_some()
    }

    pub fn is_invalidated(&self) -> bool {
        self.invalidation
            .as_ref()
            .is_some_and(|rx| *rx.borrow() != self.applied_revision)
    }

    /// Current value of the invalidation signal, if there is one.
    pub fn revision(&self) -> Option<u64> {
        self.invalidation.as_ref().map(|rx| *rx.borrow())
    }

    /// Resolves once the invalidation signal has moved past the applied revision.
    pub async fn invalidated(&mut self) {
        let applied = self.applied_revision;
        self.revision_changed_from(applied).await
    }

    /// Resolves once the invalidation signal differs from `seen`. Pends forever
    /// without a signal or after its sender is gone.
    pub async fn revision_changed_from(&mut self, seen: u64) {
        let Some(rx) = self.invalidation.as_mut() else {
            return std::future::pending().await;
        };
        let closed = rx.wait_for(|rev| *rev != seen).await.is_err();
        if closed {
            std::future::pending::<()>().await;
        }
    }

    pub async fn load_next(&mut self) -> LoadStatus {
        let params = if self.is_invalidated() {
            LoadParams {
                key: self.config.initial_key,
                direction: LoadDirection::Refresh,
            }
        } else {
            match self.pages.last() {
                None => LoadParams {
                    key: self.config.initial_key,
                    direction: LoadDirection::Refresh,
                },
                Some(last) => match last.next_key {
                    Some(key) => LoadParams {
                        key,
                        direction: LoadDirection::Append,
                    },
                    None => return LoadStatus::EndReached,
                },
            }
        };
        self.run(params).await
    }

    pub async fn load_previous(&mut self) -> LoadStatus {
        let Some(first) = self.pages.first() else {
            return self.load_next().await;
        };
        match first.prev_key {
            Some(key) => {
                self.run(LoadParams {
                    key,
                    direction: LoadDirection::Prepend,
                })
                .await
            }
            None => LoadStatus::EndReached,
        }
    }

    /// Repeats the last failed load, if any.
    pub async fn retry(&mut self) -> Option<LoadStatus> {
        let params = self.failed?;
        Some(self.run(params).await)
    }

    /// Reloads from the page closest to `anchor_position`, dropping everything else.
    pub async fn refresh(&mut self, anchor_position: Option<usize>) -> LoadStatus {
        let state = PagingState {
            pages: &self.pages,
            anchor_position,
        };
        let key = self
            .source
            .refresh_key(&state)
            .unwrap_or(self.config.initial_key);
        self.run(LoadParams {
            key,
            direction: LoadDirection::Refresh,
        })
        .await
    }

    async fn run(&mut self, params: LoadParams) -> LoadStatus {
        let revision = self.revision();
        match self.source.load(params.key).await {
            LoadResult::Page(page) => {
                self.failed = None;
                if params.direction == LoadDirection::Refresh {
                    if let Some(rev) = revision {
                        self.applied_revision = rev;
                    }
                }
                let added = self.apply(params.direction, page);
                debug!(key = params.key, added, "page loaded");
                LoadStatus::Loaded {
                    key: params.key,
                    added,
                }
            }
            LoadResult::Error(err) => {
                warn!(key = params.key, "page load failed: {}", err);
                self.failed = Some(params);
                LoadStatus::Failed(err)
            }
        }
    }

    fn apply(&mut self, direction: LoadDirection, mut page: LoadedPage<T>) -> usize {
        if direction == LoadDirection::Refresh {
            self.pages.clear();
            self.seen.clear();
        }
        page.data.retain(|item| self.seen.insert(item.id()));
        let added = page.data.len();
        match direction {
            LoadDirection::Prepend => self.pages.insert(0, page),
            LoadDirection::Refresh | LoadDirection::Append => self.pages.push(page),
        }
        added
    }
}

impl<T> Pager<T>
where
    T: Identified + Clone + Send + 'static,
{
    pub fn snapshot(&self) -> Vec<T> {
        self.items().cloned().collect()
    }
}
