//! Fetch catalog data through the repository and print the mapped records.
//! Usage:
//!   cargo run --bin tmdb_props -- discover [page]
//!   cargo run --bin tmdb_props -- search <query> [page]
//!   cargo run --bin tmdb_props -- movie <tmdb_id>
//!   cargo run --bin tmdb_props -- favorites
//! Requires TMDB_BEARER_TOKEN or TMDB_API_KEY in the environment (.env supported).

use anyhow::{anyhow, Context, Result};
use dotenvy::dotenv;
use moviedeck::config::Config;
use moviedeck::paging::LoadStatus;
use moviedeck::repository::MovieRepository;
use moviedeck::tmdb::{TmdbApi, TmdbClient};
use serde_json::json;
use std::env;
use std::str::FromStr;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq)]
enum Probe {
    Discover,
    Search,
    Movie,
    Favorites,
}

impl FromStr for Probe {
    type Err = anyhow::Error;
    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "discover" => Ok(Probe::Discover),
            "search" => Ok(Probe::Search),
            "movie" => Ok(Probe::Movie),
            "favorites" => Ok(Probe::Favorites),
            _ => Err(anyhow!(
                "probe must be 'discover', 'search', 'movie' or 'favorites'"
            )),
        }
    }
}

fn parse_page(arg: Option<&String>) -> Result<u32> {
    match arg {
        Some(p) => p.parse().with_context(|| format!("invalid page: {p}")),
        None => Ok(1),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenv();
    let args: Vec<String> = env::args().skip(1).collect();
    let probe: Probe = args
        .first()
        .ok_or_else(|| anyhow!("missing probe kind"))?
        .parse()?;

    let config = Config::from_env()?;
    let api: Arc<dyn TmdbApi> = Arc::new(TmdbClient::new(config.tmdb)?);
    let repo = MovieRepository::new(api);

    let out = match probe {
        Probe::Discover | Probe::Search => {
            let (query, page) = if probe == Probe::Search {
                let q = args.get(1).ok_or_else(|| anyhow!("missing search query"))?;
                (Some(q.as_str()), parse_page(args.get(2))?)
            } else {
                (None, parse_page(args.get(1))?)
            };
            let mut pager = repo.paged_movies(query);
            let mut last = None;
            for _ in 0..page {
                match pager.load_next().await {
                    LoadStatus::Loaded { key, .. } => last = Some(key),
                    LoadStatus::EndReached => break,
                    LoadStatus::Failed(e) => return Err(e.into()),
                }
            }
            json!({
                "query": query,
                "last_page": last,
                "end_reached": pager.end_reached(),
                "movies": pager.snapshot(),
            })
        }
        Probe::Movie => {
            let id: i32 = args
                .get(1)
                .ok_or_else(|| anyhow!("missing tmdb id"))?
                .parse()
                .context("tmdb id must be a number")?;
            let detail = repo.movie_details(id).await?;
            json!({ "detail": detail })
        }
        Probe::Favorites => {
            let account = repo.sign_in().await?;
            let mut ids: Vec<i32> = repo.favorites().into_iter().collect();
            ids.sort_unstable();
            json!({ "account": account, "favorite_ids": ids })
        }
    };

    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}
