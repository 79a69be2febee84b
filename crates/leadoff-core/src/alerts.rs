// Alert deduplication and the persisted alert log.
//
// `AlertBook` owns the fired-key set and the record list. Every mutation
// rewrites the full list through an `AlertStore`; a failed write is kept as
// the pending persistence error and retried on the next mutation while the
// in-memory state stays authoritative.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::projector::LeadoffProjection;
use crate::snapshot::{GameId, PlayerId};
use crate::watchlist::Watchlist;

/// Deduplication identity of an alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AlertKey {
    pub game_id: GameId,
    pub target_inning: u32,
    pub batter_id: PlayerId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertRecord {
    pub game_id: GameId,
    pub target_inning: u32,
    pub batter_id: PlayerId,
    pub batter_name: String,
    pub team_name: String,
    pub detected_at: DateTime<Utc>,
    /// Filled in by a reviewer; `None` means unresolved.
    pub outcome: Option<String>,
}

impl AlertRecord {
    pub fn key(&self) -> AlertKey {
        AlertKey {
            game_id: self.game_id,
            target_inning: self.target_inning,
            batter_id: self.batter_id,
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.outcome.is_some()
    }
}

/// Durable home of the alert log. `save_all` must replace the stored list
/// atomically.
pub trait AlertStore: Send + Sync {
    fn load(&self) -> anyhow::Result<Vec<AlertRecord>>;
    fn save_all(&self, records: &[AlertRecord]) -> anyhow::Result<()>;
}

impl<T: AlertStore + ?Sized> AlertStore for Arc<T> {
    fn load(&self) -> anyhow::Result<Vec<AlertRecord>> {
        (**self).load()
    }

    fn save_all(&self, records: &[AlertRecord]) -> anyhow::Result<()> {
        (**self).save_all(records)
    }
}

/// The alert deduplicator: fired keys plus the persisted record list.
pub struct AlertBook<S: AlertStore> {
    store: S,
    fired: HashSet<AlertKey>,
    records: Vec<AlertRecord>,
    persistence_error: Option<String>,
}

impl<S: AlertStore> AlertBook<S> {
    /// Rebuild the book from the store. An empty store yields an empty book.
    pub fn load(store: S) -> anyhow::Result<Self> {
        let records = store.load()?;
        let fired = records.iter().map(AlertRecord::key).collect();
        info!("Loaded {} persisted alerts", records.len());
        Ok(Self {
            store,
            fired,
            records,
            persistence_error: None,
        })
    }

    /// Fire an alert for a locked projection of a watched batter, at most
    /// once per `(game, target inning, batter)`.
    pub fn notify(
        &mut self,
        projection: &LeadoffProjection,
        watchlist: &Watchlist,
    ) -> Option<AlertRecord> {
        self.notify_at(projection, watchlist, Utc::now())
    }

    /// [`notify`](Self::notify) with an explicit detection timestamp.
    pub fn notify_at(
        &mut self,
        projection: &LeadoffProjection,
        watchlist: &Watchlist,
        detected_at: DateTime<Utc>,
    ) -> Option<AlertRecord> {
        if !projection.is_locked() {
            return None;
        }

        let key = AlertKey {
            game_id: projection.game_id,
            target_inning: projection.target_inning,
            batter_id: projection.projected_batter_id,
        };
        if self.fired.contains(&key) {
            return None;
        }
        if !watchlist.contains(&projection.projected_batter_name) {
            return None;
        }

        let record = AlertRecord {
            game_id: key.game_id,
            target_inning: key.target_inning,
            batter_id: key.batter_id,
            batter_name: projection.projected_batter_name.clone(),
            team_name: projection.team_name.clone(),
            detected_at,
            outcome: None,
        };
        info!(
            "Leadoff alert: {} leads off inning {} for {} (game {})",
            record.batter_name, record.target_inning, record.team_name, record.game_id
        );

        self.fired.insert(key);
        self.records.push(record.clone());
        self.persist();
        Some(record)
    }

    /// Record a reviewer's outcome. The record leaves the pinned history but
    /// its key stays fired. Returns `false` if no record has this key.
    pub fn resolve(&mut self, key: &AlertKey, outcome: &str) -> bool {
        let Some(record) = self.records.iter_mut().find(|r| r.key() == *key) else {
            return false;
        };
        record.outcome = Some(outcome.trim().to_string());
        info!(
            "Alert for {} (game {}, inning {}) resolved: {}",
            record.batter_name, record.game_id, record.target_inning, outcome
        );
        self.persist();
        true
    }

    /// Remove every persisted record. Keys fired during this process stay
    /// fired, so a boundary that is still locked does not alert again.
    pub fn clear(&mut self) {
        info!("Clearing {} persisted alerts", self.records.len());
        self.records.clear();
        self.persist();
    }

    /// Unresolved records, oldest first.
    pub fn pinned(&self) -> Vec<AlertRecord> {
        self.records
            .iter()
            .filter(|r| !r.is_resolved())
            .cloned()
            .collect()
    }

    pub fn all(&self) -> &[AlertRecord] {
        &self.records
    }

    pub fn has_fired(&self, key: &AlertKey) -> bool {
        self.fired.contains(key)
    }

    /// The last write failure, if the store is behind the in-memory state.
    pub fn persistence_error(&self) -> Option<&str> {
        self.persistence_error.as_deref()
    }

    fn persist(&mut self) {
        match self.store.save_all(&self.records) {
            Ok(()) => {
                if self.persistence_error.take().is_some() {
                    info!("Alert log persisted after earlier failure");
                }
            }
            Err(e) => {
                warn!("Failed to persist alert log: {:#}", e);
                self.persistence_error = Some(format!("{e:#}"));
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::projector::ProjectionStatus;
    use chrono::TimeZone;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    fn locked(game: u64, inning: u32, batter: PlayerId, name: &str) -> LeadoffProjection {
        LeadoffProjection {
            game_id: GameId(game),
            inning,
            is_top_half: true,
            projected_batter_id: batter,
            projected_batter_name: name.to_string(),
            team_name: "Visitors".to_string(),
            status: ProjectionStatus::Locked,
            target_inning: inning + 1,
        }
    }

    fn watching(names: &[&str]) -> Watchlist {
        Watchlist::from_names(names.iter().copied())
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 6, 14, 23, 5, 0).unwrap()
    }

    /// In-memory store that can be switched into a failing mode.
    #[derive(Clone, Default)]
    struct FlakyStore {
        saved: Arc<Mutex<Vec<AlertRecord>>>,
        failing: Arc<AtomicBool>,
    }

    impl AlertStore for FlakyStore {
        fn load(&self) -> anyhow::Result<Vec<AlertRecord>> {
            Ok(self.saved.lock().unwrap().clone())
        }

        fn save_all(&self, records: &[AlertRecord]) -> anyhow::Result<()> {
            if self.failing.load(Ordering::SeqCst) {
                anyhow::bail!("disk full");
            }
            *self.saved.lock().unwrap() = records.to_vec();
            Ok(())
        }
    }

    fn memory_book() -> AlertBook<Database> {
        AlertBook::load(Database::open(":memory:").unwrap()).unwrap()
    }

    #[test]
    fn locked_watched_batter_fires_once() {
        let mut book = memory_book();
        let watchlist = watching(&["e"]);
        let projection = locked(1, 4, 5, "E");

        let first = book.notify_at(&projection, &watchlist, now()).unwrap();
        assert_eq!(first.game_id, GameId(1));
        assert_eq!(first.target_inning, 5);
        assert_eq!(first.batter_name, "E");
        assert_eq!(first.detected_at, now());
        assert!(first.outcome.is_none());

        // Next poll cycle re-observes the same locked boundary.
        assert!(book.notify_at(&projection, &watchlist, now()).is_none());
        assert_eq!(book.all().len(), 1);
    }

    #[test]
    fn provisional_projection_never_fires() {
        let mut book = memory_book();
        let mut projection = locked(1, 4, 5, "E");
        projection.status = ProjectionStatus::Provisional;

        assert!(book.notify(&projection, &watching(&["e"])).is_none());
        assert!(!book.has_fired(&AlertKey {
            game_id: GameId(1),
            target_inning: 5,
            batter_id: 5,
        }));
    }

    #[test]
    fn unwatched_batter_does_not_fire_or_mark_key() {
        let mut book = memory_book();
        let projection = locked(1, 4, 5, "E");

        assert!(book.notify(&projection, &watching(&["someone else"])).is_none());

        // Adding the batter later still allows the alert for this boundary.
        assert!(book.notify(&projection, &watching(&["E"])).is_some());
    }

    #[test]
    fn watchlist_match_ignores_case_accents_and_spacing() {
        let mut book = memory_book();
        let projection = locked(1, 4, 5, "Jeremy Peña");
        assert!(book.notify(&projection, &watching(&["  jeremy   PENA "])).is_some());
    }

    #[test]
    fn distinct_boundaries_fire_separately() {
        let mut book = memory_book();
        let watchlist = watching(&["e"]);
        assert!(book.notify(&locked(1, 4, 5, "E"), &watchlist).is_some());
        assert!(book.notify(&locked(1, 7, 5, "E"), &watchlist).is_some());
        assert!(book.notify(&locked(2, 4, 5, "E"), &watchlist).is_some());
        assert_eq!(book.pinned().len(), 3);
    }

    #[test]
    fn reload_reconstructs_fired_set() {
        let store = FlakyStore::default();
        let watchlist = watching(&["e"]);
        let projection = locked(1, 4, 5, "E");

        {
            let mut book = AlertBook::load(store.clone()).unwrap();
            assert!(book.notify(&projection, &watchlist).is_some());
        }

        let mut restarted = AlertBook::load(store.clone()).unwrap();
        assert!(restarted.has_fired(&AlertKey {
            game_id: GameId(1),
            target_inning: 5,
            batter_id: 5,
        }));
        assert!(restarted.notify(&projection, &watchlist).is_none());
        assert_eq!(restarted.pinned().len(), 1);
    }

    #[test]
    fn persistence_failure_keeps_memory_authoritative_and_retries() {
        let store = FlakyStore::default();
        let mut book = AlertBook::load(store.clone()).unwrap();
        let watchlist = watching(&["e", "d"]);

        store.failing.store(true, Ordering::SeqCst);
        assert!(book.notify(&locked(1, 4, 5, "E"), &watchlist).is_some());
        assert!(book.persistence_error().unwrap().contains("disk full"));
        assert_eq!(book.all().len(), 1);
        assert!(store.saved.lock().unwrap().is_empty());

        // Still deduplicated in memory while the store is behind.
        assert!(book.notify(&locked(1, 4, 5, "E"), &watchlist).is_none());

        // The next mutation writes the full list.
        store.failing.store(false, Ordering::SeqCst);
        assert!(book.notify(&locked(1, 5, 4, "D"), &watchlist).is_some());
        assert!(book.persistence_error().is_none());
        assert_eq!(store.saved.lock().unwrap().len(), 2);
    }

    #[test]
    fn resolve_moves_record_out_of_pinned_history() {
        let store = FlakyStore::default();
        let mut book = AlertBook::load(store.clone()).unwrap();
        let record = book
            .notify(&locked(1, 4, 5, "E"), &watching(&["e"]))
            .unwrap();

        assert!(book.resolve(&record.key(), "Hit"));
        assert!(book.pinned().is_empty());
        assert_eq!(book.all()[0].outcome.as_deref(), Some("Hit"));
        assert_eq!(store.saved.lock().unwrap()[0].outcome.as_deref(), Some("Hit"));

        // Resolved keys are never recreated.
        assert!(book
            .notify(&locked(1, 4, 5, "E"), &watching(&["e"]))
            .is_none());
    }

    #[test]
    fn resolve_unknown_key_returns_false() {
        let mut book = memory_book();
        let key = AlertKey {
            game_id: GameId(42),
            target_inning: 3,
            batter_id: 7,
        };
        assert!(!book.resolve(&key, "Out"));
    }

    #[test]
    fn clear_empties_store_but_keeps_session_keys() {
        let store = FlakyStore::default();
        let mut book = AlertBook::load(store.clone()).unwrap();
        let watchlist = watching(&["e"]);
        let projection = locked(1, 4, 5, "E");
        book.notify(&projection, &watchlist).unwrap();

        book.clear();
        assert!(book.all().is_empty());
        assert!(store.saved.lock().unwrap().is_empty());
        assert!(book.notify(&projection, &watchlist).is_none());
    }

    #[test]
    fn loading_empty_store_is_not_an_error() {
        let book = AlertBook::load(FlakyStore::default()).unwrap();
        assert!(book.all().is_empty());
        assert!(book.persistence_error().is_none());
    }
}
