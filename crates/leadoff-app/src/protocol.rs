// Message types between the polling engine and its operator console.

use chrono::{DateTime, Utc};
use leadoff_core::alerts::{AlertKey, AlertRecord};
use leadoff_core::snapshot::GameId;

use crate::config::RefreshInterval;

/// Commands from the operator to the engine. Everything except `Quit` is
/// applied at the next cycle boundary.
#[derive(Debug, Clone, PartialEq)]
pub enum UserCommand {
    ClearAlerts,
    SetRefreshInterval(RefreshInterval),
    ResolveAlert { key: AlertKey, outcome: String },
    Watch(String),
    Unwatch(String),
    Quit,
}

/// Updates pushed from the engine to the console.
#[derive(Debug, Clone, PartialEq)]
pub enum UiUpdate {
    Cycle(CycleReport),
    AlertsCleared,
    AlertResolved(AlertKey),
    RefreshIntervalChanged(RefreshInterval),
    WatchlistChanged(Vec<String>),
    CommandRejected(String),
}

/// A game that could not be processed this cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct GameFailure {
    /// `None` when the live-game listing itself failed.
    pub game_id: Option<GameId>,
    pub reason: String,
}

/// Everything one polling cycle produced.
#[derive(Debug, Clone, PartialEq)]
pub struct CycleReport {
    pub checked_at: DateTime<Utc>,
    pub live_games: usize,
    /// Alerts fired this cycle, ordered by game id.
    pub new_alerts: Vec<AlertRecord>,
    /// Unresolved alert history, oldest first.
    pub pinned: Vec<AlertRecord>,
    pub failures: Vec<GameFailure>,
    pub debug_lines: Vec<String>,
    pub persistence_error: Option<String>,
}
