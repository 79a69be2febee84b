// Polling scheduler: the engine's main loop.
//
// Each cycle lists the live games, fetches and projects every game
// concurrently, fires alerts through the shared alert book and reports the
// result to the console. Operator commands are queued while the loop sleeps
// and applied at the next cycle boundary; `Quit` ends the loop immediately.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use leadoff_core::alerts::{AlertBook, AlertRecord};
use leadoff_core::db::Database;
use leadoff_core::projector::{project, LeadoffProjection};
use leadoff_core::snapshot::{normalize, GameId};
use leadoff_core::watchlist::Watchlist;
use tokio::sync::{mpsc, Mutex, Semaphore};
use tokio::task::{self, JoinSet};
use tracing::{debug, info, warn};

use crate::config::{PollingConfig, RefreshInterval};
use crate::feed::GameFeed;
use crate::protocol::{CycleReport, GameFailure, UiUpdate, UserCommand};

pub type SharedAlertBook = Arc<Mutex<AlertBook<Arc<Database>>>>;

// ---------------------------------------------------------------------------
// EngineState
// ---------------------------------------------------------------------------

/// Everything the polling loop owns between cycles.
pub struct EngineState {
    pub db: Arc<Database>,
    pub alerts: SharedAlertBook,
    pub watchlist: Arc<Watchlist>,
    pub refresh_interval: RefreshInterval,
    /// Last locked projection per live game, consulted so a boundary that
    /// stays on screen across polls keeps its first projection.
    pub locked: HashMap<GameId, LeadoffProjection>,
    pub fetch_timeout: Duration,
    pub max_concurrent_fetches: usize,
}

impl EngineState {
    pub fn new(
        db: Arc<Database>,
        alerts: AlertBook<Arc<Database>>,
        watchlist: Watchlist,
        polling: &PollingConfig,
    ) -> Self {
        EngineState {
            db,
            alerts: Arc::new(Mutex::new(alerts)),
            watchlist: Arc::new(watchlist),
            refresh_interval: polling.refresh_interval,
            locked: HashMap::new(),
            fetch_timeout: polling.fetch_timeout,
            max_concurrent_fetches: polling.max_concurrent_fetches.max(1),
        }
    }
}

// ---------------------------------------------------------------------------
// One polling cycle
// ---------------------------------------------------------------------------

/// What one game contributed to a cycle.
struct Processed {
    debug_line: String,
    /// `None` when the game was skipped for insufficient data.
    projection: Option<LeadoffProjection>,
    alert: Option<AlertRecord>,
}

/// Poll every live game once. Never fails: listing and per-game errors are
/// recorded in the report.
pub async fn run_cycle(feed: &Arc<dyn GameFeed>, state: &mut EngineState) -> CycleReport {
    let checked_at = Utc::now();
    let mut failures = Vec::new();

    let games = match feed.live_games().await {
        Ok(games) => games,
        Err(e) => {
            warn!("Failed to list live games: {}", e);
            failures.push(GameFailure {
                game_id: None,
                reason: e.to_string(),
            });
            Vec::new()
        }
    };
    debug!("{} live games this cycle", games.len());

    let semaphore = Arc::new(Semaphore::new(state.max_concurrent_fetches));
    let mut tasks = JoinSet::new();
    let mut task_games: HashMap<task::Id, GameId> = HashMap::new();

    for game in &games {
        let game_id = game.game_id;
        let feed = Arc::clone(feed);
        let semaphore = Arc::clone(&semaphore);
        let watchlist = Arc::clone(&state.watchlist);
        let alerts = Arc::clone(&state.alerts);
        let prior = state.locked.get(&game_id).cloned();
        let timeout = state.fetch_timeout;

        let handle = tasks.spawn(async move {
            // The semaphore is never closed.
            let _permit = semaphore.acquire_owned().await.ok();
            process_game(feed.as_ref(), game_id, prior, &watchlist, &alerts, timeout).await
        });
        task_games.insert(handle.id(), game_id);
    }

    let mut new_alerts = Vec::new();
    let mut debug_lines = Vec::new();

    while let Some(joined) = tasks.join_next_with_id().await {
        let (game_id, outcome) = match joined {
            Ok((id, outcome)) => match task_games.get(&id) {
                Some(game_id) => (*game_id, outcome),
                None => continue,
            },
            Err(e) => {
                let game_id = task_games.get(&e.id()).copied();
                warn!("Game task failed for {:?}: {}", game_id, e);
                failures.push(GameFailure {
                    game_id,
                    reason: format!("game task failed: {e}"),
                });
                continue;
            }
        };

        match outcome {
            Ok(processed) => {
                match processed.projection {
                    Some(projection) if projection.is_locked() => {
                        state.locked.insert(game_id, projection);
                    }
                    _ => {
                        state.locked.remove(&game_id);
                    }
                }
                if let Some(alert) = processed.alert {
                    new_alerts.push(alert);
                }
                debug_lines.push((game_id, processed.debug_line));
            }
            Err(reason) => {
                warn!("Game {} skipped this cycle: {}", game_id, reason);
                failures.push(GameFailure {
                    game_id: Some(game_id),
                    reason,
                });
            }
        }
    }

    let live: HashSet<GameId> = games.iter().map(|g| g.game_id).collect();
    state.locked.retain(|game_id, _| live.contains(game_id));

    new_alerts.sort_by_key(|a| a.game_id);
    debug_lines.sort_by_key(|(game_id, _)| *game_id);
    failures.sort_by_key(|f| f.game_id);

    let (pinned, persistence_error) = {
        let book = state.alerts.lock().await;
        (book.pinned(), book.persistence_error().map(str::to_string))
    };

    info!(
        "Cycle complete: {} live games, {} new alerts, {} failures",
        games.len(),
        new_alerts.len(),
        failures.len()
    );

    CycleReport {
        checked_at,
        live_games: games.len(),
        new_alerts,
        pinned,
        failures,
        debug_lines: debug_lines.into_iter().map(|(_, line)| line).collect(),
        persistence_error,
    }
}

async fn process_game(
    feed: &dyn GameFeed,
    game_id: GameId,
    prior: Option<LeadoffProjection>,
    watchlist: &Watchlist,
    alerts: &SharedAlertBook,
    timeout: Duration,
) -> Result<Processed, String> {
    let payload = match tokio::time::timeout(timeout, feed.game_payload(game_id)).await {
        Ok(Ok(payload)) => payload,
        Ok(Err(e)) => return Err(e.to_string()),
        Err(_) => return Err(format!("fetch timed out after {timeout:?}")),
    };

    let (snapshot, plays) = normalize(game_id, &payload).map_err(|e| e.to_string())?;
    let header = format!(
        "{} - Inning {} ({}), Outs: {}",
        snapshot.batting_team_name,
        snapshot.inning,
        snapshot.half_label(),
        snapshot.outs
    );

    match project(&snapshot, &plays, prior.as_ref()) {
        Ok(projection) => {
            let alert = if projection.is_locked() {
                // Persists synchronously under the lock; one short SQLite
                // transaction per fired alert.
                alerts.lock().await.notify(&projection, watchlist)
            } else {
                None
            };
            let debug_line = format!(
                "{header} | Inning {} leadoff: {} ({:?})",
                projection.target_inning, projection.projected_batter_name, projection.status
            );
            Ok(Processed {
                debug_line,
                projection: Some(projection),
                alert,
            })
        }
        Err(reason) => {
            debug!("Game {}: insufficient data: {}", game_id, reason);
            Ok(Processed {
                debug_line: format!("{header} | skipped: {reason}"),
                projection: None,
                alert: None,
            })
        }
    }
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

/// Apply one queued operator command. `Quit` is handled by the loop itself.
pub async fn apply_command(state: &mut EngineState, cmd: UserCommand) -> UiUpdate {
    match cmd {
        UserCommand::ClearAlerts => {
            state.alerts.lock().await.clear();
            UiUpdate::AlertsCleared
        }
        UserCommand::SetRefreshInterval(interval) => {
            info!("Refresh interval set to {}s", interval.as_secs());
            state.refresh_interval = interval;
            UiUpdate::RefreshIntervalChanged(interval)
        }
        UserCommand::ResolveAlert { key, outcome } => {
            if outcome.trim().is_empty() {
                return UiUpdate::CommandRejected("outcome must not be empty".into());
            }
            if state.alerts.lock().await.resolve(&key, &outcome) {
                UiUpdate::AlertResolved(key)
            } else {
                UiUpdate::CommandRejected(format!(
                    "no alert for game {} inning {} batter {}",
                    key.game_id, key.target_inning, key.batter_id
                ))
            }
        }
        UserCommand::Watch(name) => {
            let name = name.trim().to_string();
            if name.is_empty() {
                return UiUpdate::CommandRejected("player name must not be empty".into());
            }
            if state.watchlist.contains(&name) {
                return UiUpdate::CommandRejected(format!("{name} is already in your list"));
            }
            if let Err(e) = state.db.add_watch(&name) {
                warn!("Failed to save watchlist entry {:?}: {:#}", name, e);
                return UiUpdate::CommandRejected(format!("could not save {name}: {e}"));
            }
            Arc::make_mut(&mut state.watchlist).add(&name);
            info!("Watching {}", name);
            UiUpdate::WatchlistChanged(state.watchlist.names().to_vec())
        }
        UserCommand::Unwatch(name) => {
            let name = name.trim().to_string();
            if !state.watchlist.contains(&name) {
                return UiUpdate::CommandRejected(format!("{name} is not in your list"));
            }
            if let Err(e) = state.db.remove_watch(&name) {
                warn!("Failed to remove watchlist entry {:?}: {:#}", name, e);
                return UiUpdate::CommandRejected(format!("could not remove {name}: {e}"));
            }
            Arc::make_mut(&mut state.watchlist).remove(&name);
            info!("No longer watching {}", name);
            UiUpdate::WatchlistChanged(state.watchlist.names().to_vec())
        }
        UserCommand::Quit => UiUpdate::CommandRejected("quit is handled by the loop".into()),
    }
}

// ---------------------------------------------------------------------------
// Main loop
// ---------------------------------------------------------------------------

/// Run polling cycles until `Quit` arrives or the command channel closes.
pub async fn run(
    feed: Arc<dyn GameFeed>,
    mut state: EngineState,
    mut cmd_rx: mpsc::Receiver<UserCommand>,
    ui_tx: mpsc::Sender<UiUpdate>,
) -> anyhow::Result<()> {
    info!(
        "Polling loop started (every {}s, {} watched players)",
        state.refresh_interval.as_secs(),
        state.watchlist.len()
    );

    let mut pending: Vec<UserCommand> = Vec::new();

    'cycles: loop {
        apply_pending(&mut state, &mut pending, &ui_tx).await;

        let report = run_cycle(&feed, &mut state).await;
        let _ = ui_tx.send(UiUpdate::Cycle(report)).await;

        let sleep = tokio::time::sleep(state.refresh_interval.as_duration());
        tokio::pin!(sleep);

        loop {
            tokio::select! {
                _ = &mut sleep => break,
                cmd = cmd_rx.recv() => match cmd {
                    Some(UserCommand::Quit) => {
                        info!("Quit command received, shutting down");
                        apply_pending(&mut state, &mut pending, &ui_tx).await;
                        break 'cycles;
                    }
                    Some(cmd) => {
                        debug!("Queued command for next cycle: {:?}", cmd);
                        pending.push(cmd);
                    }
                    None => {
                        info!("Command channel closed, shutting down");
                        apply_pending(&mut state, &mut pending, &ui_tx).await;
                        break 'cycles;
                    }
                },
            }
        }
    }

    Ok(())
}

/// Apply queued commands in arrival order, reporting each result.
async fn apply_pending(
    state: &mut EngineState,
    pending: &mut Vec<UserCommand>,
    ui_tx: &mpsc::Sender<UiUpdate>,
) {
    for cmd in pending.drain(..) {
        let update = apply_command(state, cmd).await;
        let _ = ui_tx.send(update).await;
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
