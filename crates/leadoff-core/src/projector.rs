// Leadoff projection: which batter leads off the batting team's next
// half-inning, provisional while outs remain and locked once the third out
// is recorded.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::snapshot::{GameId, GameStateSnapshot, PlayEvent, PlayerId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProjectionStatus {
    /// Outs remain; may change as the half-inning progresses.
    Provisional,
    /// The half-inning has ended; fixed until the game reaches a new half.
    Locked,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeadoffProjection {
    pub game_id: GameId,
    /// Inning and half of the observation that produced this projection.
    pub inning: u32,
    pub is_top_half: bool,
    pub projected_batter_id: PlayerId,
    pub projected_batter_name: String,
    pub team_name: String,
    pub status: ProjectionStatus,
    /// Inning in which the projected batter leads off.
    pub target_inning: u32,
}

impl LeadoffProjection {
    pub fn is_locked(&self) -> bool {
        self.status == ProjectionStatus::Locked
    }
}

/// Reasons a game is skipped for one cycle. None of these are user-facing
/// errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum InsufficientData {
    #[error("no valid batters in the lineup")]
    NoValidBatters,

    #[error("current batter is unknown")]
    CurrentBatterUnknown,

    #[error("current batter {0} is not a valid batter in the lineup")]
    CurrentBatterNotInLineup(PlayerId),

    #[error("no completed plays for this half-inning")]
    NoPlaysThisHalf,

    #[error("no qualifying plate appearance by a valid batter")]
    NoQualifyingPlay,

    /// The third out came on a walk, hit-by-pitch or balk; the lineup slot
    /// count is ambiguous so no batter is guessed.
    #[error("half-inning ended on an ambiguous play ({0})")]
    EndedOnAmbiguousPlay(String),
}

/// Lineup entries that are active position-player batters, in order.
pub fn valid_batters(snapshot: &GameStateSnapshot) -> Vec<PlayerId> {
    snapshot
        .lineup
        .iter()
        .copied()
        .filter(|id| {
            snapshot
                .players
                .get(*id)
                .is_some_and(|p| !p.is_pitcher && p.in_lineup)
        })
        .collect()
}

/// Project the next leadoff batter for the snapshot's batting team.
///
/// `plays` is the completed play history in chronological order.
/// `prior_locked` is the last locked projection the caller holds for this
/// game; while the snapshot still shows the same ended half-inning it is
/// returned unchanged, so a boundary locks exactly once.
pub fn project(
    snapshot: &GameStateSnapshot,
    plays: &[PlayEvent],
    prior_locked: Option<&LeadoffProjection>,
) -> Result<LeadoffProjection, InsufficientData> {
    if snapshot.outs >= 3 {
        if let Some(prior) = prior_locked {
            if prior.is_locked()
                && prior.game_id == snapshot.game_id
                && prior.inning == snapshot.inning
                && prior.is_top_half == snapshot.is_top_half
            {
                return Ok(prior.clone());
            }
        }
    }

    let batters = valid_batters(snapshot);
    if batters.is_empty() {
        return Err(InsufficientData::NoValidBatters);
    }

    if snapshot.outs < 3 {
        project_provisional(snapshot, &batters)
    } else {
        project_locked(snapshot, &batters, plays)
    }
}

fn project_provisional(
    snapshot: &GameStateSnapshot,
    batters: &[PlayerId],
) -> Result<LeadoffProjection, InsufficientData> {
    let current = snapshot
        .current_batter_id
        .ok_or(InsufficientData::CurrentBatterUnknown)?;
    let current_index = batters
        .iter()
        .position(|id| *id == current)
        .ok_or(InsufficientData::CurrentBatterNotInLineup(current))?;

    let remaining = usize::from(3 - snapshot.outs);
    let index = (current_index + remaining) % batters.len();

    Ok(build(snapshot, batters[index], ProjectionStatus::Provisional))
}

fn project_locked(
    snapshot: &GameStateSnapshot,
    batters: &[PlayerId],
    plays: &[PlayEvent],
) -> Result<LeadoffProjection, InsufficientData> {
    let final_play = plays
        .iter()
        .rev()
        .find(|p| p.inning == snapshot.inning && p.is_top_half == snapshot.is_top_half)
        .ok_or(InsufficientData::NoPlaysThisHalf)?;

    if final_play.result.is_lineup_ambiguous() {
        return Err(InsufficientData::EndedOnAmbiguousPlay(format!(
            "{:?}",
            final_play.result
        )));
    }

    // Same batting team, this inning or earlier, newest first.
    let last_index = plays
        .iter()
        .rev()
        .filter(|p| p.is_top_half == snapshot.is_top_half && p.inning <= snapshot.inning)
        .filter(|p| !p.result.is_lineup_ambiguous())
        .find_map(|p| batters.iter().position(|id| *id == p.batter_id))
        .ok_or(InsufficientData::NoQualifyingPlay)?;

    let index = (last_index + 1) % batters.len();
    Ok(build(snapshot, batters[index], ProjectionStatus::Locked))
}

fn build(
    snapshot: &GameStateSnapshot,
    batter_id: PlayerId,
    status: ProjectionStatus,
) -> LeadoffProjection {
    LeadoffProjection {
        game_id: snapshot.game_id,
        inning: snapshot.inning,
        is_top_half: snapshot.is_top_half,
        projected_batter_id: batter_id,
        projected_batter_name: snapshot.players.display_name(batter_id),
        team_name: snapshot.batting_team_name.clone(),
        status,
        target_inning: snapshot.inning + 1,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
