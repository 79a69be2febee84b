// Game state snapshots: raw live-feed payload shapes and their normalization
// into typed per-poll observations.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

/// External game identifier (the feed's `gamePk`), unique per physical game.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GameId(pub u64);

impl fmt::Display for GameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Feed person identifier.
pub type PlayerId = u64;

// ---------------------------------------------------------------------------
// Typed snapshot
// ---------------------------------------------------------------------------

/// Per-player facts for the batting side, as reported by the boxscore.
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerInfo {
    pub id: PlayerId,
    pub name: String,
    /// Position abbreviation (e.g. "SS", "P", "TWP").
    pub position: String,
    pub is_pitcher: bool,
    /// Whether the boxscore assigns this player a batting-order slot.
    pub in_lineup: bool,
}

/// Player lookup keyed by integer id, built once per snapshot.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlayerTable {
    players: HashMap<PlayerId, PlayerInfo>,
}

impl PlayerTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, info: PlayerInfo) {
        self.players.insert(info.id, info);
    }

    pub fn get(&self, id: PlayerId) -> Option<&PlayerInfo> {
        self.players.get(&id)
    }

    /// Display name for `id`, or a placeholder naming the unknown id.
    pub fn display_name(&self, id: PlayerId) -> String {
        self.players
            .get(&id)
            .map(|p| p.name.clone())
            .unwrap_or_else(|| format!("Unknown (ID {id})"))
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }
}

impl FromIterator<PlayerInfo> for PlayerTable {
    fn from_iter<I: IntoIterator<Item = PlayerInfo>>(iter: I) -> Self {
        let mut table = PlayerTable::new();
        for info in iter {
            table.insert(info);
        }
        table
    }
}

/// One poll observation of one live game, from the batting team's side.
#[derive(Debug, Clone, PartialEq)]
pub struct GameStateSnapshot {
    pub game_id: GameId,
    pub inning: u32,
    pub is_top_half: bool,
    /// Always in `0..=3`.
    pub outs: u8,
    pub batting_team_name: String,
    /// Official batting order for the batting team. Indices are circular.
    pub lineup: Vec<PlayerId>,
    pub current_batter_id: Option<PlayerId>,
    pub players: PlayerTable,
}

impl GameStateSnapshot {
    pub fn half_label(&self) -> &'static str {
        if self.is_top_half {
            "Top"
        } else {
            "Bottom"
        }
    }
}

/// Result classification for a completed play.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlayResult {
    Walk,
    IntentionalWalk,
    HitByPitch,
    Balk,
    /// Any other event type (strikeout, field_out, single, ...).
    Other(String),
}

impl PlayResult {
    /// Classify a feed `eventType` string.
    pub fn from_event_type(event_type: &str) -> Self {
        match event_type.trim().to_ascii_lowercase().as_str() {
            "walk" => PlayResult::Walk,
            "intent_walk" => PlayResult::IntentionalWalk,
            "hit_by_pitch" => PlayResult::HitByPitch,
            "balk" => PlayResult::Balk,
            other => PlayResult::Other(other.to_string()),
        }
    }

    /// Walks, hit-by-pitches and balks do not reliably advance the lineup
    /// slot count in every feed representation.
    pub fn is_lineup_ambiguous(&self) -> bool {
        !matches!(self, PlayResult::Other(_))
    }
}

/// One completed play from the feed's play history.
#[derive(Debug, Clone, PartialEq)]
pub struct PlayEvent {
    pub inning: u32,
    pub is_top_half: bool,
    pub batter_id: PlayerId,
    pub result: PlayResult,
}

// ---------------------------------------------------------------------------
// Raw feed payload
// ---------------------------------------------------------------------------

/// Subset of the live game feed consumed by the engine.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawGamePayload {
    #[serde(default)]
    pub game_data: RawGameData,
    #[serde(default)]
    pub live_data: RawLiveData,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawGameData {
    #[serde(default)]
    pub teams: RawSides<RawTeamHeader>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawSides<T> {
    #[serde(default)]
    pub away: T,
    #[serde(default)]
    pub home: T,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawTeamHeader {
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawLiveData {
    #[serde(default)]
    pub linescore: RawLinescore,
    #[serde(default)]
    pub boxscore: RawBoxscore,
    #[serde(default)]
    pub plays: RawPlays,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawLinescore {
    #[serde(default)]
    pub current_inning: Option<u32>,
    #[serde(default)]
    pub is_top_inning: Option<bool>,
    #[serde(default)]
    pub outs: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawBoxscore {
    #[serde(default)]
    pub teams: RawSides<RawBoxscoreTeam>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawBoxscoreTeam {
    /// Every player who has batted or is due up, in appearance order.
    #[serde(default)]
    pub batters: Vec<PlayerId>,
    /// The official current batting order.
    #[serde(default)]
    pub batting_order: Vec<PlayerId>,
    /// Keyed by `"ID<person id>"`.
    #[serde(default)]
    pub players: HashMap<String, RawBoxscorePlayer>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawBoxscorePlayer {
    #[serde(default)]
    pub person: RawPerson,
    #[serde(default)]
    pub position: RawPosition,
    /// e.g. "100" for the starting leadoff hitter, "101" for his substitute.
    #[serde(default)]
    pub batting_order: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawPerson {
    #[serde(default)]
    pub id: Option<PlayerId>,
    #[serde(default)]
    pub full_name: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawPosition {
    #[serde(default)]
    pub abbreviation: String,
    #[serde(rename = "type", default)]
    pub position_type: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawPlays {
    #[serde(default)]
    pub current_play: Option<RawPlay>,
    #[serde(default)]
    pub all_plays: Vec<RawPlay>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawPlay {
    #[serde(default)]
    pub result: RawPlayResult,
    #[serde(default)]
    pub about: RawPlayAbout,
    #[serde(default)]
    pub matchup: RawMatchup,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawPlayResult {
    #[serde(default)]
    pub event_type: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawPlayAbout {
    #[serde(default)]
    pub inning: Option<u32>,
    #[serde(default)]
    pub is_top_inning: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawMatchup {
    #[serde(default)]
    pub batter: Option<RawPerson>,
}

// ---------------------------------------------------------------------------
// Normalization
// ---------------------------------------------------------------------------

#[derive(Debug, Error, PartialEq)]
pub enum SnapshotError {
    #[error("game {game_id}: linescore has no current inning")]
    MissingInning { game_id: GameId },

    #[error("game {game_id}: outs must be between 0 and 3, got {outs}")]
    InvalidOuts { game_id: GameId, outs: i64 },
}

/// Normalize one poll's raw payload into a typed snapshot plus the batting
/// context's completed play history (chronological order).
pub fn normalize(
    game_id: GameId,
    raw: &RawGamePayload,
) -> Result<(GameStateSnapshot, Vec<PlayEvent>), SnapshotError> {
    let linescore = &raw.live_data.linescore;

    let inning = match linescore.current_inning {
        Some(n) if n > 0 => n,
        _ => return Err(SnapshotError::MissingInning { game_id }),
    };
    let outs = linescore.outs.unwrap_or(0);
    if !(0..=3).contains(&outs) {
        return Err(SnapshotError::InvalidOuts { game_id, outs });
    }
    let is_top_half = linescore.is_top_inning.unwrap_or(true);

    // Top of the inning: the away side bats.
    let (header, team) = if is_top_half {
        (&raw.game_data.teams.away, &raw.live_data.boxscore.teams.away)
    } else {
        (&raw.game_data.teams.home, &raw.live_data.boxscore.teams.home)
    };

    let lineup = if team.batting_order.is_empty() {
        team.batters.clone()
    } else {
        team.batting_order.clone()
    };

    let players = build_player_table(team);

    let current_batter_id = raw
        .live_data
        .plays
        .current_play
        .as_ref()
        .and_then(|play| play.matchup.batter.as_ref())
        .and_then(|batter| batter.id);

    let plays = raw
        .live_data
        .plays
        .all_plays
        .iter()
        .filter_map(to_play_event)
        .collect();

    let snapshot = GameStateSnapshot {
        game_id,
        inning,
        is_top_half,
        outs: outs as u8,
        batting_team_name: header.name.clone(),
        lineup,
        current_batter_id,
        players,
    };

    Ok((snapshot, plays))
}

fn build_player_table(team: &RawBoxscoreTeam) -> PlayerTable {
    let mut table = PlayerTable::new();
    for (key, raw) in &team.players {
        let id = match raw.person.id.or_else(|| parse_player_key(key)) {
            Some(id) => id,
            None => {
                debug!("Skipping boxscore player with unparsable key {key:?}");
                continue;
            }
        };
        let abbreviation = raw.position.abbreviation.trim().to_string();
        let is_pitcher =
            raw.position.position_type.eq_ignore_ascii_case("pitcher") || abbreviation == "P";
        let in_lineup = raw
            .batting_order
            .as_deref()
            .is_some_and(|slot| !slot.trim().is_empty());

        table.insert(PlayerInfo {
            id,
            name: raw.person.full_name.clone(),
            position: abbreviation,
            is_pitcher,
            in_lineup,
        });
    }
    table
}

/// Parse a boxscore player key of the form `"ID660271"`.
fn parse_player_key(key: &str) -> Option<PlayerId> {
    key.strip_prefix("ID")?.parse().ok()
}

/// Plays without an event type are still in progress and are skipped.
fn to_play_event(raw: &RawPlay) -> Option<PlayEvent> {
    let event_type = raw.result.event_type.as_deref()?;
    if event_type.trim().is_empty() {
        return None;
    }
    Some(PlayEvent {
        inning: raw.about.inning?,
        is_top_half: raw.about.is_top_inning?,
        batter_id: raw.matchup.batter.as_ref()?.id?,
        result: PlayResult::from_event_type(event_type),
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
