//! Per-screen state holders. Each owns its background tasks and stops them on
//! `dispose()` or drop, so nothing it started can touch its state afterwards.

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::models::Movie;
use crate::paging::{LoadStatus, Pager};

mod debounce;
mod detail;
mod favorites;
mod movies;

pub use debounce::Debouncer;
pub use detail::{DetailController, DetailState};
pub use favorites::{FavoritesController, FavoritesUiState};
pub use movies::{MoviesController, MoviesUiState};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LoadOp {
    Next,
    Retry,
    Refresh(Option<usize>),
}

impl LoadOp {
    /// `None` when there was nothing to retry.
    async fn apply(self, pager: &mut Pager<Movie>) -> Option<LoadStatus> {
        match self {
            LoadOp::Next => Some(pager.load_next().await),
            LoadOp::Retry if pager.has_failed_load() => pager.retry().await,
            LoadOp::Retry => Some(pager.load_next().await),
            LoadOp::Refresh(anchor) => Some(pager.refresh(anchor).await),
        }
    }
}

pub(crate) enum LoadOutcome<C> {
    Finished(Option<LoadStatus>),
    /// A newer command arrived first; the in-flight fetch was dropped.
    Preempted(C),
    Stopped,
}

/// Runs `op` unless a newer command or cancellation arrives first. Dropping the
/// load future aborts its request and leaves the pager untouched.
pub(crate) async fn load_preemptible<C>(
    pager: &mut Pager<Movie>,
    op: LoadOp,
    commands: &mut mpsc::UnboundedReceiver<C>,
    cancel: &CancellationToken,
) -> LoadOutcome<C> {
    tokio::select! {
        _ = cancel.cancelled() => LoadOutcome::Stopped,
        cmd = commands.recv() => match cmd {
            Some(cmd) => LoadOutcome::Preempted(cmd),
            None => LoadOutcome::Stopped,
        },
        status = op.apply(pager) => LoadOutcome::Finished(status),
    }
}
