use crate::config::Config;
use crate::controllers::{DetailController, DetailState, FavoritesController, MoviesController};
use crate::error::Error;
use crate::repository::MovieRepository;
use crate::tmdb::{TmdbApi, TmdbClient};
use anyhow::{Context, Result};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use std::{sync::Arc, time::Duration};
use tower_http::{limit::RequestBodyLimitLayer, trace::TraceLayer};
use tracing::{info, warn};

const MAX_BODY_BYTES: usize = 16 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<MovieRepository>,
    pub movies: Arc<MoviesController>,
    pub favorites: Arc<FavoritesController>,
}

impl AppState {
    /// Must run inside a Tokio runtime: the controllers start loading immediately.
    pub fn new(repo: Arc<MovieRepository>, search_debounce: Duration) -> Self {
        Self {
            movies: Arc::new(MoviesController::new(repo.clone(), search_debounce)),
            favorites: Arc::new(FavoritesController::new(repo.clone())),
            repo,
        }
    }
}

pub async fn run_server(config: Config) -> Result<()> {
    let api: Arc<dyn TmdbApi> =
        Arc::new(TmdbClient::new(config.tmdb.clone()).context("Failed to build TMDB client")?);
    let repo = Arc::new(MovieRepository::new(api));

    match repo.sign_in().await {
        Ok(account) => info!("Favorites enabled for account {}", account.id),
        Err(e) => warn!("Sign-in failed, favorites unavailable until retried: {}", e),
    }

    let app = build_router(AppState::new(repo, config.search_debounce));

    info!("Listening on {}", config.bind_addr);
    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/account", get(account))
        .route("/movies", get(movies))
        .route("/movies/search", post(movies_search))
        .route("/movies/more", post(movies_more))
        .route("/movies/retry", post(movies_retry))
        .route("/movies/refresh", post(movies_refresh))
        .route("/movies/:id", get(movie_detail))
        .route("/movies/:id/favorite", post(toggle_favorite))
        .route("/favorites", get(favorites))
        .route("/favorites/search", post(favorites_search))
        .route("/favorites/more", post(favorites_more))
        .route("/favorites/retry", post(favorites_retry))
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

struct ApiError(Error);

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        ApiError(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            Error::NoAccount => StatusCode::CONFLICT,
            Error::Remote(_) => StatusCode::BAD_GATEWAY,
        };
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

#[derive(Deserialize)]
struct SearchBody {
    query: String,
}

#[derive(Deserialize)]
struct RefreshParams {
    anchor: Option<usize>,
}

async fn health() -> &'static str {
    "OK"
}

async fn account(State(state): State<AppState>) -> Result<Response, ApiError> {
    let account = state.repo.account_details().await?;
    Ok(Json(account).into_response())
}

async fn movies(State(state): State<AppState>) -> Response {
    Json(state.movies.state()).into_response()
}

async fn movies_search(
    State(state): State<AppState>,
    Json(body): Json<SearchBody>,
) -> StatusCode {
    state.movies.on_search(&body.query);
    StatusCode::ACCEPTED
}

async fn movies_more(State(state): State<AppState>) -> StatusCode {
    state.movies.load_more();
    StatusCode::ACCEPTED
}

async fn movies_retry(State(state): State<AppState>) -> StatusCode {
    state.movies.retry();
    StatusCode::ACCEPTED
}

async fn movies_refresh(
    State(state): State<AppState>,
    Query(params): Query<RefreshParams>,
) -> StatusCode {
    state.movies.refresh(params.anchor);
    StatusCode::ACCEPTED
}

async fn movie_detail(State(state): State<AppState>, Path(id): Path<i32>) -> Response {
    let screen = DetailController::new(state.repo.clone());
    screen.load_details(id).await;
    let detail = screen.state();
    let status = match detail {
        DetailState::Error { .. } => StatusCode::BAD_GATEWAY,
        _ => StatusCode::OK,
    };
    (status, Json(detail)).into_response()
}

async fn toggle_favorite(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<Response, ApiError> {
    let favorite = state.movies.toggle_favorite(id).await?;
    Ok(Json(json!({ "id": id, "favorite": favorite })).into_response())
}

async fn favorites(State(state): State<AppState>) -> Response {
    let s = state.favorites.state();
    Json(json!({
        "account_id": s.account_id,
        "search_query": s.search_query,
        "movies": s.visible_movies(),
        "is_loading": s.is_loading,
        "error": s.error,
        "end_reached": s.end_reached,
    }))
    .into_response()
}

async fn favorites_search(
    State(state): State<AppState>,
    Json(body): Json<SearchBody>,
) -> StatusCode {
    state.favorites.on_search(&body.query);
    StatusCode::ACCEPTED
}

async fn favorites_more(State(state): State<AppState>) -> StatusCode {
    state.favorites.load_more();
    StatusCode::ACCEPTED
}

async fn favorites_retry(State(state): State<AppState>) -> StatusCode {
    state.favorites.retry();
    StatusCode::ACCEPTED
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        let mut term = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
        term.recv().await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Shutdown signal received (Ctrl+C)");
        }
        _ = terminate => {
            info!("Shutdown signal received (SIGTERM)");
        }
    }
}
