use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{load_preemptible, Debouncer, LoadOp, LoadOutcome};
use crate::error::Result;
use crate::models::Movie;
use crate::paging::{LoadStatus, Pager};
use crate::repository::MovieRepository;
use crate::state::Observable;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MoviesUiState {
    pub account_id: Option<i32>,
    pub favorites: HashSet<i32>,
    /// What the user typed, echoed immediately.
    pub search_query: String,
    /// The query `movies` belong to, applied after the debounce interval.
    pub applied_query: String,
    pub movies: Vec<Movie>,
    pub is_loading: bool,
    pub error: Option<String>,
    pub end_reached: bool,
}

#[derive(Debug)]
enum Command {
    Query(String),
    Load(LoadOp),
}

/// Movie list screen: discover or search results plus favorite marks.
pub struct MoviesController {
    repo: Arc<MovieRepository>,
    state: Observable<MoviesUiState>,
    commands: mpsc::UnboundedSender<Command>,
    search: Debouncer<String>,
    // Message of the last failed toggle, so a later success clears only that.
    toggle_error: Mutex<Option<String>>,
    cancel: CancellationToken,
}

impl MoviesController {
    /// Starts loading the first discover page right away.
    pub fn new(repo: Arc<MovieRepository>, search_debounce: Duration) -> Self {
        let state = Observable::new(MoviesUiState::default());
        let cancel = CancellationToken::new();
        let (commands, rx) = mpsc::unbounded_channel();

        let query_tx = commands.clone();
        let search = Debouncer::spawn(search_debounce, cancel.clone(), move |query| {
            let _ = query_tx.send(Command::Query(query));
        });

        let actor = ListActor {
            pager: repo.paged_movies(None),
            repo: repo.clone(),
            state: state.clone(),
            query: String::new(),
            commands: rx,
            cancel: cancel.clone(),
        };
        tokio::spawn(actor.run());
        tokio::spawn(mirror_favorites(repo.clone(), state.clone(), cancel.clone()));

        let _ = commands.send(Command::Load(LoadOp::Next));
        Self {
            repo,
            state,
            commands,
            search,
            toggle_error: Mutex::new(None),
            cancel,
        }
    }

    pub fn state(&self) -> MoviesUiState {
        self.state.get()
    }

    pub fn subscribe(&self) -> watch::Receiver<MoviesUiState> {
        self.state.subscribe()
    }

    pub fn on_search(&self, text: &str) {
        self.state.update(|s| s.search_query = text.to_string());
        self.search.push(text.to_string());
    }

    pub fn load_more(&self) {
        self.send(Command::Load(LoadOp::Next));
    }

    pub fn retry(&self) {
        self.send(Command::Load(LoadOp::Retry));
    }

    pub fn refresh(&self, anchor_position: Option<usize>) {
        self.send(Command::Load(LoadOp::Refresh(anchor_position)));
    }

    /// The shared favorites set follows the remote result even if this screen
    /// is disposed meanwhile; only this screen's state is left alone then.
    /// Page-load errors survive a successful toggle.
    pub async fn toggle_favorite(&self, id: i32) -> Result<bool> {
        let result = self.repo.toggle_favorite(id).await;
        if self.cancel.is_cancelled() {
            return result;
        }
        let mut toggle_error = self.toggle_error.lock().await;
        match &result {
            Ok(_) => {
                if let Some(message) = toggle_error.take() {
                    self.state.update(|s| {
                        if s.error.as_ref() == Some(&message) {
                            s.error = None;
                        }
                    });
                }
            }
            Err(e) => {
                warn!(movie_id = id, "Failed to toggle favorite: {}", e);
                let message = e.to_string();
                *toggle_error = Some(message.clone());
                self.state.update(|s| s.error = Some(message));
            }
        }
        result
    }

    pub fn dispose(&self) {
        self.cancel.cancel();
    }

    fn send(&self, cmd: Command) {
        if self.commands.send(cmd).is_err() {
            debug!("movies controller already stopped");
        }
    }
}

impl Drop for MoviesController {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

struct ListActor {
    repo: Arc<MovieRepository>,
    state: Observable<MoviesUiState>,
    pager: Pager<Movie>,
    query: String,
    commands: mpsc::UnboundedReceiver<Command>,
    cancel: CancellationToken,
}

impl ListActor {
    async fn run(mut self) {
        let mut next: Option<Command> = None;
        loop {
            let cmd = match next.take() {
                Some(cmd) => cmd,
                None => tokio::select! {
                    _ = self.cancel.cancelled() => break,
                    cmd = self.commands.recv() => match cmd {
                        Some(cmd) => cmd,
                        None => break,
                    },
                },
            };
            match self.handle(cmd).await {
                Some(Step::Then(cmd)) => next = Some(cmd),
                Some(Step::Idle) => {}
                None => break,
            }
        }
        debug!("movies list actor stopped");
    }

    /// Commands that would leave the list as it is: the current query again,
    /// or another page once the end is reached.
    fn is_noop(&self, cmd: &Command) -> bool {
        match cmd {
            Command::Query(raw) => raw.trim() == self.query,
            Command::Load(LoadOp::Next) => self.pager.end_reached(),
            Command::Load(_) => false,
        }
    }

    async fn handle(&mut self, cmd: Command) -> Option<Step> {
        if self.is_noop(&cmd) {
            return Some(Step::Idle);
        }
        match cmd {
            Command::Query(raw) => {
                let query = raw.trim().to_string();
                info!(query = %query, "Switching movie list query");
                self.query = query;
                self.pager = self.repo.paged_movies(Some(&self.query));
                let applied = self.query.clone();
                self.state.update(|s| {
                    s.applied_query = applied;
                    s.movies.clear();
                    s.end_reached = false;
                    s.error = None;
                });
                self.load(LoadOp::Next).await
            }
            Command::Load(op) => self.load(op).await,
        }
    }

    async fn load(&mut self, op: LoadOp) -> Option<Step> {
        self.state.update(|s| {
            s.is_loading = true;
            s.error = None;
        });
        let outcome =
            load_preemptible(&mut self.pager, op, &mut self.commands, &self.cancel).await;
        match outcome {
            LoadOutcome::Stopped => None,
            // A no-op must not cost the interrupted load.
            LoadOutcome::Preempted(cmd) if self.is_noop(&cmd) => {
                debug!(?cmd, "resuming interrupted load");
                Some(Step::Then(Command::Load(op)))
            }
            LoadOutcome::Preempted(cmd) => {
                self.state.update(|s| s.is_loading = false);
                Some(Step::Then(cmd))
            }
            LoadOutcome::Finished(status) => {
                let movies = self.pager.snapshot();
                let end_reached = self.pager.end_reached();
                let error = match status {
                    Some(LoadStatus::Failed(e)) => Some(e.to_string()),
                    _ => None,
                };
                self.state.update(|s| {
                    s.movies = movies;
                    s.end_reached = end_reached;
                    s.is_loading = false;
                    s.error = error;
                });
                Some(Step::Idle)
            }
        }
    }
}

enum Step {
    Idle,
    Then(Command),
}

pub(super) async fn mirror_favorites<S>(
    repo: Arc<MovieRepository>,
    state: Observable<S>,
    cancel: CancellationToken,
) where
    S: FavoritesView + Clone + PartialEq + Send + Sync + 'static,
{
    let mut favorites = repo.subscribe_favorites();
    let mut account = repo.subscribe_account();
    loop {
        let ids = favorites.borrow_and_update().clone();
        let account_id = account.borrow_and_update().as_ref().map(|a| a.id);
        state.update(|s| s.set_favorites(account_id, ids));
        tokio::select! {
            _ = cancel.cancelled() => return,
            changed = favorites.changed() => if changed.is_err() { return },
            changed = account.changed() => if changed.is_err() { return },
        }
    }
}

/// UI states that show the signed-in account's favorite marks.
pub(super) trait FavoritesView {
    fn set_favorites(&mut self, account_id: Option<i32>, favorites: HashSet<i32>);
}

impl FavoritesView for MoviesUiState {
    fn set_favorites(&mut self, account_id: Option<i32>, favorites: HashSet<i32>) {
        self.account_id = account_id;
        self.favorites = favorites;
    }
}
