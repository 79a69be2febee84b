// Integration tests for the leadoff tracker.
//
// These exercise the engine end-to-end through the library crate's public
// API: a recorded live-feed payload flows through normalization, projection,
// alerting and SQLite persistence, across restarts and alongside failing
// games.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use leadoff_app::config::{PollingConfig, RefreshInterval};
use leadoff_app::feed::{FetchError, GameFeed, ScheduledGame};
use leadoff_app::protocol::{UiUpdate, UserCommand};
use leadoff_app::scheduler::{self, EngineState};
use leadoff_core::alerts::AlertBook;
use leadoff_core::db::Database;
use leadoff_core::snapshot::{GameId, RawGamePayload};
use leadoff_core::watchlist::Watchlist;

use tokio::sync::mpsc;

// ===========================================================================
// Test helpers
// ===========================================================================

/// Fixture directory path (relative to the crate root, which is the cwd for
/// `cargo test`).
const FIXTURES: &str = "tests/fixtures";

fn end_of_top_7th() -> RawGamePayload {
    let path = format!("{FIXTURES}/live_feed_end_of_top_7th.json");
    let text = std::fs::read_to_string(&path).expect("fixture should exist");
    serde_json::from_str(&text).expect("fixture should parse")
}

/// Feed serving fixed payloads; games without a payload fail with HTTP 500.
struct FixtureFeed {
    games: Vec<GameId>,
    payloads: Mutex<HashMap<GameId, RawGamePayload>>,
}

impl FixtureFeed {
    fn new(games: &[u64], payloads: &[(u64, RawGamePayload)]) -> Arc<dyn GameFeed> {
        Arc::new(FixtureFeed {
            games: games.iter().copied().map(GameId).collect(),
            payloads: Mutex::new(
                payloads
                    .iter()
                    .map(|(id, p)| (GameId(*id), p.clone()))
                    .collect(),
            ),
        })
    }
}

#[async_trait]
impl GameFeed for FixtureFeed {
    async fn live_games(&self) -> Result<Vec<ScheduledGame>, FetchError> {
        Ok(self
            .games
            .iter()
            .map(|id| ScheduledGame {
                game_id: *id,
                away_team: "Seattle Mariners".into(),
                home_team: "Houston Astros".into(),
            })
            .collect())
    }

    async fn game_payload(&self, game_id: GameId) -> Result<RawGamePayload, FetchError> {
        let payload = self.payloads.lock().unwrap().get(&game_id).cloned();
        payload.ok_or(FetchError::Status {
            url: format!("http://feed.test/api/v1.1/game/{game_id}/feed/live"),
            status: 500,
        })
    }
}

fn polling() -> PollingConfig {
    PollingConfig {
        refresh_interval: RefreshInterval::from_secs(15).unwrap(),
        fetch_timeout: Duration::from_secs(5),
        max_concurrent_fetches: 4,
    }
}

/// Open the engine the way the binary does: database, watchlist, alert book.
fn open_engine(db_path: &str) -> EngineState {
    let db = Arc::new(Database::open(db_path).expect("database should open"));
    let watchlist = Watchlist::from_names(db.load_watchlist().unwrap());
    let alerts = AlertBook::load(Arc::clone(&db)).expect("alert log should load");
    EngineState::new(db, alerts, watchlist, &polling())
}

/// A fresh on-disk database path, removed by `cleanup`.
fn temp_db(name: &str) -> PathBuf {
    let path = std::env::temp_dir().join(format!("{name}_{}.db", std::process::id()));
    cleanup(&path);
    path
}

fn cleanup(path: &PathBuf) {
    let _ = std::fs::remove_file(path);
    let _ = std::fs::remove_file(format!("{}-wal", path.display()));
    let _ = std::fs::remove_file(format!("{}-shm", path.display()));
}

// ===========================================================================
// Tests
// ===========================================================================

#[tokio::test]
async fn recorded_feed_projects_next_leadoff_and_alerts() {
    let feed = FixtureFeed::new(&[745804], &[(745804, end_of_top_7th())]);
    let mut state = open_engine(":memory:");
    state.db.add_watch("julio rodriguez").unwrap();
    state.watchlist = Arc::new(Watchlist::from_names(state.db.load_watchlist().unwrap()));

    let report = scheduler::run_cycle(&feed, &mut state).await;

    assert!(report.failures.is_empty(), "failures: {:?}", report.failures);
    assert_eq!(report.new_alerts.len(), 1);
    let alert = &report.new_alerts[0];
    assert_eq!(alert.game_id, GameId(745804));
    assert_eq!(alert.batter_id, 677595);
    assert_eq!(alert.batter_name, "Julio Rodríguez");
    assert_eq!(alert.team_name, "Seattle Mariners");
    assert_eq!(alert.target_inning, 8);
    assert_eq!(
        report.debug_lines,
        vec![
            "Seattle Mariners - Inning 7 (Top), Outs: 3 | Inning 8 leadoff: Julio Rodríguez (Locked)"
                .to_string()
        ]
    );
}

#[tokio::test]
async fn alerts_survive_restart_without_refiring() {
    let path = temp_db("leadoff_it_restart");
    let path_str = path.to_str().unwrap().to_string();
    let feed = FixtureFeed::new(&[745804], &[(745804, end_of_top_7th())]);

    {
        let db = Database::open(&path_str).unwrap();
        db.add_watch("Julio Rodríguez").unwrap();
    }

    {
        let mut state = open_engine(&path_str);
        let report = scheduler::run_cycle(&feed, &mut state).await;
        assert_eq!(report.new_alerts.len(), 1);
        assert!(report.persistence_error.is_none());
    }

    // Restart: no locked projections in memory, same boundary still on the feed.
    let mut state = open_engine(&path_str);
    assert_eq!(state.watchlist.names(), &["Julio Rodríguez".to_string()]);
    let report = scheduler::run_cycle(&feed, &mut state).await;
    assert!(report.new_alerts.is_empty());
    assert_eq!(report.pinned.len(), 1);
    assert_eq!(report.pinned[0].batter_id, 677595);

    drop(state);
    cleanup(&path);
}

#[tokio::test]
async fn failing_games_are_isolated_in_the_polling_loop() {
    let feed = FixtureFeed::new(
        &[1, 2, 3],
        &[(1, end_of_top_7th()), (3, end_of_top_7th())],
    );
    let mut state = open_engine(":memory:");
    state.db.add_watch("Julio Rodríguez").unwrap();
    state.watchlist = Arc::new(Watchlist::from_names(["Julio Rodríguez"]));

    let (cmd_tx, cmd_rx) = mpsc::channel(16);
    let (ui_tx, mut ui_rx) = mpsc::channel(64);
    let handle = tokio::spawn(scheduler::run(feed, state, cmd_rx, ui_tx));

    let report = match ui_rx.recv().await {
        Some(UiUpdate::Cycle(report)) => report,
        other => panic!("expected a cycle report, got {other:?}"),
    };
    assert_eq!(report.live_games, 3);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].game_id, Some(GameId(2)));
    let alerted: Vec<GameId> = report.new_alerts.iter().map(|a| a.game_id).collect();
    assert_eq!(alerted, vec![GameId(1), GameId(3)]);
    assert_eq!(report.pinned.len(), 2);

    cmd_tx.send(UserCommand::Quit).await.unwrap();
    handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn resolved_and_cleared_alerts_persist_across_restart() {
    let path = temp_db("leadoff_it_resolve");
    let path_str = path.to_str().unwrap().to_string();
    let feed = FixtureFeed::new(&[745804], &[(745804, end_of_top_7th())]);

    {
        let mut state = open_engine(&path_str);
        let update = scheduler::apply_command(
            &mut state,
            UserCommand::Watch("Julio Rodríguez".into()),
        )
        .await;
        assert!(matches!(update, UiUpdate::WatchlistChanged(_)));

        let report = scheduler::run_cycle(&feed, &mut state).await;
        let key = report.new_alerts[0].key();
        let update = scheduler::apply_command(
            &mut state,
            UserCommand::ResolveAlert {
                key,
                outcome: "Single".into(),
            },
        )
        .await;
        assert_eq!(update, UiUpdate::AlertResolved(key));
    }

    {
        let state = open_engine(&path_str);
        let book = state.alerts.lock().await;
        assert_eq!(book.all().len(), 1);
        assert_eq!(book.all()[0].outcome.as_deref(), Some("Single"));
        assert!(book.pinned().is_empty());
    }

    {
        let mut state = open_engine(&path_str);
        let update = scheduler::apply_command(&mut state, UserCommand::ClearAlerts).await;
        assert_eq!(update, UiUpdate::AlertsCleared);
    }

    let state = open_engine(&path_str);
    assert!(state.alerts.lock().await.all().is_empty());
    assert_eq!(state.db.load_watchlist().unwrap().len(), 1);

    drop(state);
    cleanup(&path);
}
