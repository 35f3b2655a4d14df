mod common;

use common::{detail_dto, movie_dto, page_dto, wait_for, FakeTmdb, Reply};
use moviedeck::controllers::{DetailController, DetailState, FavoritesController, MoviesController};
use moviedeck::error::Error;
use moviedeck::repository::MovieRepository;
use std::sync::Arc;
use std::time::Duration;

const DEBOUNCE: Duration = Duration::from_millis(300);

fn repo_with(fake: FakeTmdb) -> (Arc<MovieRepository>, Arc<FakeTmdb>) {
    let fake = Arc::new(fake);
    (Arc::new(MovieRepository::new(fake.clone())), fake)
}

fn ids<'a>(movies: impl IntoIterator<Item = &'a moviedeck::models::Movie>) -> Vec<i32> {
    movies.into_iter().map(|m| m.id).collect()
}

#[tokio::test(start_paused = true)]
async fn first_discover_page_loads_on_start() {
    let fake = FakeTmdb::default();
    fake.reply("", 1, Reply::Page(page_dto(1, 2, &[(1, "A"), (2, "B")])));
    let (repo, fake) = repo_with(fake);

    let screen = MoviesController::new(repo, DEBOUNCE);
    let mut rx = screen.subscribe();
    let state = wait_for(&mut rx, |s| !s.movies.is_empty() && !s.is_loading).await;

    assert_eq!(ids(&state.movies), vec![1, 2]);
    assert!(!state.end_reached);
    assert_eq!(state.error, None);
    assert_eq!(state.applied_query, "");
    assert_eq!(fake.calls_for(""), vec![1]);
}

#[tokio::test(start_paused = true)]
async fn search_waits_for_typing_to_settle() {
    let fake = FakeTmdb::default();
    fake.reply("", 1, Reply::Page(page_dto(1, 1, &[(1, "A")])));
    fake.reply("bat", 1, Reply::Page(page_dto(1, 1, &[(10, "Batman")])));
    let (repo, fake) = repo_with(fake);

    let screen = MoviesController::new(repo, DEBOUNCE);
    let mut rx = screen.subscribe();
    wait_for(&mut rx, |s| !s.movies.is_empty() && !s.is_loading).await;

    screen.on_search("b");
    tokio::time::sleep(Duration::from_millis(100)).await;
    screen.on_search("ba");
    tokio::time::sleep(Duration::from_millis(100)).await;
    screen.on_search("bat");
    assert_eq!(screen.state().search_query, "bat");

    let state = wait_for(&mut rx, |s| {
        s.applied_query == "bat" && !s.is_loading && !s.movies.is_empty()
    })
    .await;
    assert_eq!(ids(&state.movies), vec![10]);
    assert!(state.end_reached);
    assert!(fake.calls_for("b").is_empty());
    assert!(fake.calls_for("ba").is_empty());
    assert_eq!(fake.calls_for("bat"), vec![1]);
}

#[tokio::test(start_paused = true)]
async fn newer_query_replaces_a_slow_one() {
    let fake = FakeTmdb::default();
    fake.reply("", 1, Reply::Page(page_dto(1, 1, &[(1, "A")])));
    fake.reply(
        "slow",
        1,
        Reply::Slow(Duration::from_secs(5), page_dto(1, 1, &[(10, "Slow")])),
    );
    fake.reply("fast", 1, Reply::Page(page_dto(1, 1, &[(20, "Fast")])));
    let (repo, fake) = repo_with(fake);

    let screen = MoviesController::new(repo, DEBOUNCE);
    let mut rx = screen.subscribe();
    wait_for(&mut rx, |s| !s.movies.is_empty() && !s.is_loading).await;

    screen.on_search("slow");
    wait_for(&mut rx, |s| s.applied_query == "slow" && s.is_loading).await;
    screen.on_search("fast");

    let state = wait_for(&mut rx, |s| {
        s.applied_query == "fast" && !s.is_loading && !s.movies.is_empty()
    })
    .await;
    assert_eq!(ids(&state.movies), vec![20]);

    // Long past the slow reply; nothing from it may show up.
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(ids(&screen.state().movies), vec![20]);
    assert_eq!(fake.calls_for("slow"), vec![1]);
}

#[tokio::test(start_paused = true)]
async fn failed_page_keeps_loaded_movies_until_retry() {
    let fake = FakeTmdb::default();
    fake.reply("", 1, Reply::Page(page_dto(1, 3, &[(1, "A")])));
    fake.reply("", 2, Reply::Fail(500));
    let (repo, fake) = repo_with(fake);

    let screen = MoviesController::new(repo, DEBOUNCE);
    let mut rx = screen.subscribe();
    wait_for(&mut rx, |s| !s.movies.is_empty() && !s.is_loading).await;

    screen.load_more();
    let state = wait_for(&mut rx, |s| s.error.is_some() && !s.is_loading).await;
    assert_eq!(ids(&state.movies), vec![1]);
    assert!(!state.end_reached);

    fake.reply("", 2, Reply::Page(page_dto(2, 3, &[(2, "B")])));
    screen.retry();
    let state = wait_for(&mut rx, |s| s.movies.len() == 2 && !s.is_loading).await;
    assert_eq!(ids(&state.movies), vec![1, 2]);
    assert_eq!(state.error, None);
    assert_eq!(fake.calls_for(""), vec![1, 2, 2]);
}

#[tokio::test(start_paused = true)]
async fn disposed_screen_stops_loading() {
    let fake = FakeTmdb::default();
    fake.reply("", 1, Reply::Page(page_dto(1, 2, &[(1, "A")])));
    fake.reply("", 2, Reply::Page(page_dto(2, 2, &[(2, "B")])));
    let (repo, fake) = repo_with(fake);

    let screen = MoviesController::new(repo, DEBOUNCE);
    let mut rx = screen.subscribe();
    let before = wait_for(&mut rx, |s| !s.movies.is_empty() && !s.is_loading).await;

    screen.dispose();
    tokio::time::sleep(Duration::from_millis(10)).await;
    screen.load_more();
    tokio::time::sleep(Duration::from_secs(1)).await;

    assert_eq!(screen.state(), before);
    assert_eq!(fake.calls_for(""), vec![1]);
}

#[tokio::test(start_paused = true)]
async fn favorite_marks_follow_confirmed_toggles() {
    let fake = FakeTmdb::default().with_account(11);
    fake.reply("", 1, Reply::Page(page_dto(1, 1, &[(1, "A"), (2, "B")])));
    let (repo, _) = repo_with(fake);
    repo.sign_in().await.expect("sign in");

    let screen = MoviesController::new(repo, DEBOUNCE);
    let mut rx = screen.subscribe();
    wait_for(&mut rx, |s| s.account_id == Some(11) && !s.movies.is_empty()).await;

    assert!(screen.toggle_favorite(1).await.expect("toggle"));
    let state = wait_for(&mut rx, |s| s.favorites.contains(&1)).await;
    assert_eq!(state.error, None);

    assert!(!screen.toggle_favorite(1).await.expect("toggle back"));
    wait_for(&mut rx, |s| s.favorites.is_empty()).await;
}

#[tokio::test(start_paused = true)]
async fn toggle_without_account_is_reported() {
    let fake = FakeTmdb::default();
    fake.reply("", 1, Reply::Page(page_dto(1, 1, &[(1, "A")])));
    let (repo, _) = repo_with(fake);

    let screen = MoviesController::new(repo, DEBOUNCE);
    let mut rx = screen.subscribe();
    wait_for(&mut rx, |s| !s.movies.is_empty() && !s.is_loading).await;

    let err = screen.toggle_favorite(1).await.unwrap_err();
    assert!(matches!(err, Error::NoAccount));
    let state = screen.state();
    assert!(state.error.is_some());
    assert!(state.favorites.is_empty());
}

#[tokio::test(start_paused = true)]
async fn favorites_screen_reloads_after_a_toggle() {
    let fake = FakeTmdb::default().with_account(11);
    *fake.server_favorites.lock().unwrap() =
        vec![movie_dto(1, "A"), movie_dto(2, "B"), movie_dto(3, "C")];
    let (repo, _) = repo_with(fake);

    let screen = FavoritesController::new(repo.clone());
    let mut rx = screen.subscribe();
    let state = wait_for(&mut rx, |s| {
        s.account_id == Some(11) && s.movies.len() == 2 && !s.is_loading
    })
    .await;
    assert!(!state.end_reached);

    screen.load_more();
    let state = wait_for(&mut rx, |s| s.movies.len() == 3 && !s.is_loading).await;
    assert!(state.end_reached);

    assert!(!screen.toggle_favorite(2).await.expect("remove 2"));
    let state = wait_for(&mut rx, |s| ids(&s.movies) == vec![1, 3] && !s.is_loading).await;
    assert!(state.end_reached);
    wait_for(&mut rx, |s| !s.favorites.contains(&2)).await;

    screen.on_search("c");
    assert_eq!(ids(screen.state().visible_movies()), vec![3]);
    screen.on_search("");
    assert_eq!(screen.state().visible_movies().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn favorites_screen_retries_a_failed_sign_in() {
    let (repo, fake) = repo_with(FakeTmdb::default());

    let screen = FavoritesController::new(repo);
    let mut rx = screen.subscribe();
    wait_for(&mut rx, |s| s.error.is_some() && !s.is_loading).await;

    *fake.server_favorites.lock().unwrap() = vec![movie_dto(5, "Five")];
    *fake.account.lock().unwrap() = Some(moviedeck::tmdb::AccountDetailsDto {
        id: 11,
        username: None,
    });
    screen.retry();

    let state = wait_for(&mut rx, |s| {
        s.account_id == Some(11) && !s.movies.is_empty() && !s.is_loading
    })
    .await;
    assert_eq!(ids(&state.movies), vec![5]);
    assert_eq!(state.error, None);
    assert!(state.end_reached);
}

#[tokio::test(start_paused = true)]
async fn detail_tracks_favorite_changes_from_elsewhere() {
    let fake = FakeTmdb::default().with_account(11);
    fake.details
        .lock()
        .unwrap()
        .insert(7, detail_dto(7, "Seven", Some("/seven.jpg")));
    let (repo, _) = repo_with(fake);
    repo.sign_in().await.expect("sign in");

    let screen = DetailController::new(repo.clone());
    screen.load_details(7).await;
    match screen.state() {
        DetailState::Success {
            detail,
            is_favorite,
        } => {
            assert_eq!(detail.title, "Seven");
            assert!(!is_favorite);
        }
        other => panic!("unexpected state: {other:?}"),
    }

    repo.toggle_favorite(7).await.expect("toggle");
    let mut rx = screen.subscribe();
    wait_for(&mut rx, |s| {
        matches!(s, DetailState::Success { is_favorite: true, .. })
    })
    .await;

    assert!(!screen.toggle_favorite(7).await.expect("toggle back"));
    assert!(matches!(
        screen.state(),
        DetailState::Success {
            is_favorite: false,
            ..
        }
    ));
}

#[tokio::test(start_paused = true)]
async fn detail_without_account_asks_the_catalog() {
    let fake = FakeTmdb::default();
    fake.details
        .lock()
        .unwrap()
        .insert(7, detail_dto(7, "Seven", None));
    fake.details
        .lock()
        .unwrap()
        .insert(8, detail_dto(8, "Eight", None));
    fake.account_states.lock().unwrap().insert(7, true);
    let (repo, _) = repo_with(fake);

    let screen = DetailController::new(repo);
    screen.load_details(7).await;
    assert!(matches!(
        screen.state(),
        DetailState::Success {
            is_favorite: true,
            ..
        }
    ));

    // No account state for 8: the detail still shows, unmarked.
    screen.load_details(8).await;
    assert!(matches!(
        screen.state(),
        DetailState::Success {
            is_favorite: false,
            ..
        }
    ));
}

#[tokio::test(start_paused = true)]
async fn detail_failure_becomes_error_state() {
    let (repo, _) = repo_with(FakeTmdb::default());
    let screen = DetailController::new(repo);
    screen.load_details(99).await;
    match screen.state() {
        DetailState::Error { message } => assert!(message.contains("404")),
        other => panic!("unexpected state: {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn same_query_again_does_not_cancel_its_load() {
    let fake = FakeTmdb::default();
    fake.reply("", 1, Reply::Page(page_dto(1, 1, &[(1, "A")])));
    fake.reply(
        "bat",
        1,
        Reply::Slow(Duration::from_secs(2), page_dto(1, 1, &[(10, "Batman")])),
    );
    let (repo, fake) = repo_with(fake);

    let screen = MoviesController::new(repo, DEBOUNCE);
    let mut rx = screen.subscribe();
    wait_for(&mut rx, |s| !s.movies.is_empty() && !s.is_loading).await;

    screen.on_search("bat");
    wait_for(&mut rx, |s| s.applied_query == "bat" && s.is_loading).await;
    screen.on_search("batm");
    screen.on_search("bat");

    let state = wait_for(&mut rx, |s| {
        s.applied_query == "bat" && !s.is_loading && !s.movies.is_empty()
    })
    .await;
    assert_eq!(ids(&state.movies), vec![10]);
    assert_eq!(state.error, None);
    assert!(state.end_reached);
    // The repeated query lands mid-load and restarts the same page.
    assert_eq!(fake.calls_for("bat"), vec![1, 1]);
    assert!(fake.calls_for("batm").is_empty());
}

#[tokio::test(start_paused = true)]
async fn load_more_at_the_end_does_not_cancel_a_refresh() {
    let fake = FakeTmdb::default();
    fake.reply("", 1, Reply::Page(page_dto(1, 1, &[(1, "A")])));
    let (repo, fake) = repo_with(fake);

    let screen = MoviesController::new(repo, DEBOUNCE);
    let mut rx = screen.subscribe();
    let state = wait_for(&mut rx, |s| !s.movies.is_empty() && !s.is_loading).await;
    assert!(state.end_reached);

    fake.reply(
        "",
        1,
        Reply::Slow(Duration::from_secs(2), page_dto(1, 1, &[(2, "B")])),
    );
    screen.refresh(None);
    wait_for(&mut rx, |s| s.is_loading).await;
    screen.load_more();

    let state = wait_for(&mut rx, |s| ids(&s.movies) == vec![2] && !s.is_loading).await;
    assert!(state.end_reached);
    assert_eq!(state.error, None);
    assert_eq!(fake.calls_for(""), vec![1, 1, 1]);
}

#[tokio::test(start_paused = true)]
async fn successful_toggle_keeps_a_page_error() {
    let fake = FakeTmdb::default().with_account(11);
    fake.reply("", 1, Reply::Page(page_dto(1, 3, &[(1, "A")])));
    fake.reply("", 2, Reply::Fail(503));
    let (repo, _) = repo_with(fake);
    repo.sign_in().await.expect("sign in");

    let screen = MoviesController::new(repo, DEBOUNCE);
    let mut rx = screen.subscribe();
    wait_for(&mut rx, |s| !s.movies.is_empty() && !s.is_loading).await;
    screen.load_more();
    let failed = wait_for(&mut rx, |s| s.error.is_some() && !s.is_loading).await;

    assert!(screen.toggle_favorite(1).await.expect("toggle"));
    let state = wait_for(&mut rx, |s| s.favorites.contains(&1)).await;
    assert_eq!(state.error, failed.error);
    assert!(!state.end_reached);
}

#[tokio::test(start_paused = true)]
async fn successful_toggle_clears_an_earlier_toggle_error() {
    let fake = FakeTmdb::default().with_account(11);
    fake.reply("", 1, Reply::Page(page_dto(1, 1, &[(1, "A")])));
    let (repo, _) = repo_with(fake);

    let screen = MoviesController::new(repo.clone(), DEBOUNCE);
    let mut rx = screen.subscribe();
    wait_for(&mut rx, |s| !s.movies.is_empty() && !s.is_loading).await;

    assert!(screen.toggle_favorite(1).await.is_err());
    assert!(screen.state().error.is_some());

    repo.sign_in().await.expect("sign in");
    assert!(screen.toggle_favorite(1).await.expect("toggle"));
    assert_eq!(screen.state().error, None);
}

#[tokio::test(start_paused = true)]
async fn favorites_screen_reloads_on_the_change_after_a_failed_reload() {
    let fake = FakeTmdb::default().with_account(11);
    *fake.server_favorites.lock().unwrap() =
        vec![movie_dto(1, "A"), movie_dto(2, "B"), movie_dto(3, "C")];
    let (repo, fake) = repo_with(fake);

    let screen = FavoritesController::new(repo.clone());
    let mut rx = screen.subscribe();
    wait_for(&mut rx, |s| s.movies.len() == 2 && !s.is_loading).await;

    *fake.fail_favorite_pages.lock().unwrap() = true;
    repo.toggle_favorite(2).await.expect("remove 2");
    let state = wait_for(&mut rx, |s| s.error.is_some() && !s.is_loading).await;
    assert_eq!(ids(&state.movies), vec![1, 2]);

    *fake.fail_favorite_pages.lock().unwrap() = false;
    repo.toggle_favorite(3).await.expect("remove 3");
    let state = wait_for(&mut rx, |s| {
        ids(&s.movies) == vec![1] && s.error.is_none() && !s.is_loading
    })
    .await;
    assert!(state.end_reached);
}

#[tokio::test(start_paused = true)]
async fn detail_toggle_failure_keeps_the_shown_flag() {
    let fake = FakeTmdb::default();
    fake.details
        .lock()
        .unwrap()
        .insert(7, detail_dto(7, "Seven", None));
    let (repo, fake) = repo_with(fake);

    let screen = DetailController::new(repo);
    screen.load_details(7).await;
    let before = screen.state();

    let err = screen.toggle_favorite(7).await.unwrap_err();
    assert!(matches!(err, Error::NoAccount));
    assert_eq!(screen.state(), before);
    assert!(fake.favorite_calls.lock().unwrap().is_empty());
}
