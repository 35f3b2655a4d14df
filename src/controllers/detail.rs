use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::error::Result;
use crate::models::MovieDetail;
use crate::repository::MovieRepository;
use crate::state::Observable;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DetailState {
    Loading,
    Success {
        detail: MovieDetail,
        is_favorite: bool,
    },
    Error {
        message: String,
    },
}

/// Movie detail screen.
pub struct DetailController {
    repo: Arc<MovieRepository>,
    state: Observable<DetailState>,
    // Bumped per load_details call; older calls drop their result.
    generation: AtomicU64,
    cancel: CancellationToken,
}

impl DetailController {
    pub fn new(repo: Arc<MovieRepository>) -> Self {
        let state = Observable::new(DetailState::Loading);
        let cancel = CancellationToken::new();
        tokio::spawn(follow_favorites(repo.clone(), state.clone(), cancel.clone()));
        Self {
            repo,
            state,
            generation: AtomicU64::new(0),
            cancel,
        }
    }

    pub fn state(&self) -> DetailState {
        self.state.get()
    }

    pub fn subscribe(&self) -> watch::Receiver<DetailState> {
        self.state.subscribe()
    }

    pub async fn load_details(&self, id: i32) {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.state.set(DetailState::Loading);

        let fetched = tokio::select! {
            _ = self.cancel.cancelled() => return,
            res = self.fetch(id) => res,
        };
        if self.cancel.is_cancelled() || self.generation.load(Ordering::SeqCst) != generation {
            return;
        }
        self.state.set(match fetched {
            Ok((detail, is_favorite)) => DetailState::Success {
                detail,
                is_favorite,
            },
            Err(e) => {
                warn!(movie_id = id, "Failed to load movie details: {}", e);
                DetailState::Error {
                    message: e.to_string(),
                }
            }
        });
    }

    async fn fetch(&self, id: i32) -> Result<(MovieDetail, bool)> {
        let detail = self.repo.movie_details(id).await?;
        // The local set is authoritative once signed in.
        let is_favorite = if self.repo.account().is_some() {
            self.repo.is_favorite(id)
        } else {
            match self.repo.movie_account_state(id).await {
                Ok(favorite) => favorite,
                Err(e) => {
                    warn!(movie_id = id, "Account state unavailable: {}", e);
                    false
                }
            }
        };
        Ok((detail, is_favorite))
    }

    pub async fn toggle_favorite(&self, id: i32) -> Result<bool> {
        let favorite = match self.repo.toggle_favorite(id).await {
            Ok(favorite) => favorite,
            Err(e) => {
                warn!(movie_id = id, "Failed to toggle favorite: {}", e);
                return Err(e);
            }
        };
        if !self.cancel.is_cancelled() {
            self.state.update(|s| {
                if let DetailState::Success {
                    detail,
                    is_favorite,
                } = s
                {
                    if detail.id == id {
                        *is_favorite = favorite;
                    }
                }
            });
        }
        Ok(favorite)
    }

    pub fn dispose(&self) {
        self.cancel.cancel();
    }
}

impl Drop for DetailController {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn follow_favorites(
    repo: Arc<MovieRepository>,
    state: Observable<DetailState>,
    cancel: CancellationToken,
) {
    let mut favorites = repo.subscribe_favorites();
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            changed = favorites.changed() => if changed.is_err() { return },
        }
        if repo.account().is_none() {
            continue;
        }
        let ids = favorites.borrow_and_update().clone();
        state.update(|s| {
            if let DetailState::Success {
                detail,
                is_favorite,
            } = s
            {
                *is_favorite = ids.contains(&detail.id);
            }
        });
    }
}
