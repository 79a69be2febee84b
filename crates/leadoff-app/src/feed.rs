// Live game feed client.
//
// `GameFeed` is the seam between the polling scheduler and the public stats
// API. `StatsApiClient` lists today's in-progress games from the schedule
// endpoint and fetches each game's live feed as a `RawGamePayload`.

use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use chrono::{Local, NaiveDate};
use leadoff_core::snapshot::{GameId, RawGamePayload};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use crate::config::FeedConfig;

/// Schedule status of a game that is currently being played.
pub const IN_PROGRESS: &str = "In Progress";

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("failed to decode response from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: reqwest::Error,
    },
}

/// A live game as listed by the schedule endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduledGame {
    pub game_id: GameId,
    pub away_team: String,
    pub home_team: String,
}

#[async_trait]
pub trait GameFeed: Send + Sync {
    /// Games currently in progress.
    async fn live_games(&self) -> Result<Vec<ScheduledGame>, FetchError>;

    /// The full live payload for one game.
    async fn game_payload(&self, game_id: GameId) -> Result<RawGamePayload, FetchError>;
}

// ---------------------------------------------------------------------------
// Schedule response types
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
struct RawSchedule {
    #[serde(default)]
    dates: Vec<RawScheduleDate>,
}

#[derive(Debug, Default, Deserialize)]
struct RawScheduleDate {
    #[serde(default)]
    games: Vec<RawScheduledGame>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawScheduledGame {
    game_pk: u64,
    #[serde(default)]
    status: RawGameStatus,
    #[serde(default)]
    teams: RawScheduleTeams,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawGameStatus {
    #[serde(default)]
    detailed_state: String,
}

#[derive(Debug, Default, Deserialize)]
struct RawScheduleTeams {
    #[serde(default)]
    away: RawScheduleSide,
    #[serde(default)]
    home: RawScheduleSide,
}

#[derive(Debug, Default, Deserialize)]
struct RawScheduleSide {
    #[serde(default)]
    team: RawScheduleTeam,
}

#[derive(Debug, Default, Deserialize)]
struct RawScheduleTeam {
    #[serde(default)]
    name: String,
}

fn in_progress_games(schedule: RawSchedule) -> Vec<ScheduledGame> {
    schedule
        .dates
        .into_iter()
        .flat_map(|date| date.games)
        .filter(|game| game.status.detailed_state == IN_PROGRESS)
        .map(|game| ScheduledGame {
            game_id: GameId(game.game_pk),
            away_team: game.teams.away.team.name,
            home_team: game.teams.home.team.name,
        })
        .collect()
}

// ---------------------------------------------------------------------------
// StatsApiClient
// ---------------------------------------------------------------------------

pub struct StatsApiClient {
    http: reqwest::Client,
    base_url: String,
    sport_id: u32,
}

impl StatsApiClient {
    pub fn new(config: &FeedConfig, timeout: Duration) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            sport_id: config.sport_id,
        })
    }

    fn schedule_url(&self, date: NaiveDate) -> String {
        format!(
            "{}/api/v1/schedule?sportId={}&date={}&hydrate=team,linescore",
            self.base_url,
            self.sport_id,
            date.format("%Y-%m-%d")
        )
    }

    fn live_feed_url(&self, game_id: GameId) -> String {
        format!("{}/api/v1.1/game/{}/feed/live", self.base_url, game_id)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: String) -> Result<T, FetchError> {
        debug!("GET {}", url);
        let response = match self.http.get(&url).send().await {
            Ok(response) => response,
            Err(source) => return Err(FetchError::Request { url, source }),
        };

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url,
                status: status.as_u16(),
            });
        }

        match response.json::<T>().await {
            Ok(body) => Ok(body),
            Err(source) => Err(FetchError::Decode { url, source }),
        }
    }
}

#[async_trait]
impl GameFeed for StatsApiClient {
    async fn live_games(&self) -> Result<Vec<ScheduledGame>, FetchError> {
        let url = self.schedule_url(Local::now().date_naive());
        let schedule: RawSchedule = self.get_json(url).await?;
        Ok(in_progress_games(schedule))
    }

    async fn game_payload(&self, game_id: GameId) -> Result<RawGamePayload, FetchError> {
        self.get_json(self.live_feed_url(game_id)).await
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
