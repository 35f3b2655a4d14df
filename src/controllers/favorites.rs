use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::movies::{mirror_favorites, FavoritesView};
use super::{load_preemptible, LoadOp, LoadOutcome};
use crate::error::Result;
use crate::models::Movie;
use crate::paging::{LoadStatus, Pager};
use crate::repository::MovieRepository;
use crate::state::Observable;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FavoritesUiState {
    pub account_id: Option<i32>,
    pub favorites: HashSet<i32>,
    pub search_query: String,
    /// Every loaded favorite; see [`FavoritesUiState::visible_movies`].
    pub movies: Vec<Movie>,
    pub is_loading: bool,
    pub error: Option<String>,
    pub end_reached: bool,
}

impl FavoritesUiState {
    /// Loaded favorites whose title contains the search text, ignoring case.
    pub fn visible_movies(&self) -> Vec<&Movie> {
        let needle = self.search_query.trim().to_lowercase();
        self.movies
            .iter()
            .filter(|m| needle.is_empty() || m.title.to_lowercase().contains(&needle))
            .collect()
    }
}

impl FavoritesView for FavoritesUiState {
    fn set_favorites(&mut self, account_id: Option<i32>, favorites: HashSet<i32>) {
        self.account_id = account_id;
        self.favorites = favorites;
    }
}

/// Favorites screen. Signs in on start and reloads from the first page after
/// every confirmed favorite change. A failed reload is shown until retried or
/// until the next favorite change, which reloads again.
pub struct FavoritesController {
    repo: Arc<MovieRepository>,
    state: Observable<FavoritesUiState>,
    commands: mpsc::UnboundedSender<LoadOp>,
    cancel: CancellationToken,
}

impl FavoritesController {
    pub fn new(repo: Arc<MovieRepository>) -> Self {
        let state = Observable::new(FavoritesUiState::default());
        let cancel = CancellationToken::new();
        let (commands, rx) = mpsc::unbounded_channel();

        let actor = FavoritesActor {
            repo: repo.clone(),
            state: state.clone(),
            pager: None,
            failed_at: None,
            commands: rx,
            cancel: cancel.clone(),
        };
        tokio::spawn(actor.run());
        tokio::spawn(mirror_favorites(repo.clone(), state.clone(), cancel.clone()));

        let _ = commands.send(LoadOp::Next);
        Self {
            repo,
            state,
            commands,
            cancel,
        }
    }

    pub fn state(&self) -> FavoritesUiState {
        self.state.get()
    }

    pub fn subscribe(&self) -> watch::Receiver<FavoritesUiState> {
        self.state.subscribe()
    }

    /// Filters locally; no request is made.
    pub fn on_search(&self, text: &str) {
        self.state.update(|s| s.search_query = text.to_string());
    }

    pub fn load_more(&self) {
        self.send(LoadOp::Next);
    }

    /// Retries the failed page, or the sign-in if that is what failed.
    pub fn retry(&self) {
        self.send(LoadOp::Retry);
    }

    pub async fn toggle_favorite(&self, id: i32) -> Result<bool> {
        let result = self.repo.toggle_favorite(id).await;
        if self.cancel.is_cancelled() {
            return result;
        }
        if let Err(e) = &result {
            warn!(movie_id = id, "Failed to toggle favorite: {}", e);
            let message = e.to_string();
            self.state.update(|s| s.error = Some(message));
        }
        result
    }

    pub fn dispose(&self) {
        self.cancel.cancel();
    }

    fn send(&self, op: LoadOp) {
        if self.commands.send(op).is_err() {
            debug!("favorites controller already stopped");
        }
    }
}

impl Drop for FavoritesController {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

struct FavoritesActor {
    repo: Arc<MovieRepository>,
    state: Observable<FavoritesUiState>,
    pager: Option<Pager<Movie>>,
    // Revision seen when the last load failed. Only a newer one reloads;
    // the still-pending invalidation would otherwise loop on the failure.
    failed_at: Option<u64>,
    commands: mpsc::UnboundedReceiver<LoadOp>,
    cancel: CancellationToken,
}

impl FavoritesActor {
    async fn run(mut self) {
        let mut next: Option<LoadOp> = None;
        loop {
            let op = match next.take() {
                Some(op) => op,
                None => {
                    tokio::select! {
                        _ = self.cancel.cancelled() => break,
                        op = self.commands.recv() => match op {
                            Some(op) => op,
                            None => break,
                        },
                        _ = favorites_changed(&mut self.pager, self.failed_at) => {
                            info!("Favorites changed, reloading from the first page");
                            LoadOp::Next
                        }
                    }
                }
            };

            if self.pager.is_none() {
                match self.open_pager().await {
                    Some(true) => {}
                    Some(false) => continue,
                    None => break,
                }
            }
            let Some(pager) = self.pager.as_mut() else {
                continue;
            };
            if op == LoadOp::Next && pager.end_reached() {
                continue;
            }

            self.state.update(|s| {
                s.is_loading = true;
                s.error = None;
            });
            match load_preemptible(pager, op, &mut self.commands, &self.cancel).await {
                LoadOutcome::Stopped => break,
                LoadOutcome::Preempted(op) => {
                    self.state.update(|s| s.is_loading = false);
                    next = Some(op);
                }
                LoadOutcome::Finished(status) => {
                    let movies = pager.snapshot();
                    let end_reached = pager.end_reached();
                    let error = match status {
                        Some(LoadStatus::Failed(e)) => Some(e.to_string()),
                        _ => None,
                    };
                    self.failed_at = match error {
                        Some(_) => Some(pager.revision().unwrap_or_default()),
                        None => None,
                    };
                    self.state.update(|s| {
                        s.movies = movies;
                        s.end_reached = end_reached;
                        s.is_loading = false;
                        s.error = error;
                    });
                }
            }
        }
        debug!("favorites actor stopped");
    }

    /// `Some(false)` when sign-in failed and the error was published, `None` on cancellation.
    async fn open_pager(&mut self) -> Option<bool> {
        let account_id = match self.repo.account() {
            Some(account) => account.id,
            None => {
                self.state.update(|s| {
                    s.is_loading = true;
                    s.error = None;
                });
                let signed_in = tokio::select! {
                    _ = self.cancel.cancelled() => return None,
                    res = self.repo.sign_in() => res,
                };
                match signed_in {
                    Ok(account) => account.id,
                    Err(e) => {
                        warn!("Failed to load account for favorites: {}", e);
                        let message = e.to_string();
                        self.state.update(|s| {
                            s.is_loading = false;
                            s.error = Some(message);
                        });
                        return Some(false);
                    }
                }
            }
        };
        self.pager = Some(self.repo.favorite_paged_movies(account_id));
        Some(true)
    }
}

async fn favorites_changed(pager: &mut Option<Pager<Movie>>, failed_at: Option<u64>) {
    match (pager, failed_at) {
        (Some(pager), None) => pager.invalidated().await,
        (Some(pager), Some(seen)) => pager.revision_changed_from(seen).await,
        (None, _) => std::future::pending().await,
    }
}
