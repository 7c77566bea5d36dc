//! Training -> session -> participation joins.
//!
//! The store has no server-side join, and its formula filter cannot express
//! "link array contains id" for every schema variant, so both hops are plain
//! set-membership scans over the full collections.
//!
//! Sessions linked to more than one training are attributed to each of them.
//! Nothing is deduplicated across trainings; such sessions are surfaced as
//! diagnostics instead.

use serde::Serialize;
use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::Result;
use crate::fields::FieldMisses;
use crate::models::{Participation, Session, Training};
use crate::store::{Record, RecordStore, PARTICIPATIONS, SESSIONS, TRAININGS};

/// Ids of every session whose training link contains `training_id`.
pub fn sessions_for_training(training_id: &str, sessions: &[Session]) -> HashSet<String> {
    sessions
        .iter()
        .filter(|s| s.training_ids.iter().any(|id| id == training_id))
        .map(|s| s.id.clone())
        .collect()
}

/// Participations whose session link intersects `session_ids`, in input
/// order. A participation linked to several accepted sessions appears once.
pub fn participations_for_sessions(
    session_ids: &HashSet<String>,
    participations: &[Participation],
) -> Vec<Participation> {
    if session_ids.is_empty() {
        return Vec::new();
    }
    participations
        .iter()
        .filter(|p| p.session_ids.iter().any(|id| session_ids.contains(id)))
        .cloned()
        .collect()
}

/// Sessions whose training link holds more than one id.
pub fn multi_training_sessions(sessions: &[Session]) -> Vec<String> {
    sessions
        .iter()
        .filter(|s| s.training_ids.len() > 1)
        .map(|s| s.id.clone())
        .collect()
}

/// One training with the sessions and participations attributed to it.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrainingBundle {
    pub training: Training,
    pub sessions: Vec<Session>,
    pub participations: Vec<Participation>,
    /// Tables whose listing failed and were treated as empty.
    pub degraded: Vec<String>,
}

/// Every training plus the raw session and participation collections.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Collections {
    pub trainings: Vec<Training>,
    pub sessions: Vec<Session>,
    pub participations: Vec<Participation>,
    pub degraded: Vec<String>,
    pub multi_training_sessions: Vec<String>,
}

impl Collections {
    pub fn sessions_of(&self, training_id: &str) -> Vec<Session> {
        self.sessions
            .iter()
            .filter(|s| s.training_ids.iter().any(|id| id == training_id))
            .cloned()
            .collect()
    }

    pub fn participations_of(&self, training_id: &str) -> Vec<Participation> {
        let ids = sessions_for_training(training_id, &self.sessions);
        participations_for_sessions(&ids, &self.participations)
    }
}

/// Loads joined views through any [`RecordStore`].
#[derive(Clone)]
pub struct JoinEngine {
    store: Arc<dyn RecordStore>,
}

impl JoinEngine {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    /// Fetch one training and everything linked to it. The training lookup
    /// propagates; the two collection listings degrade to empty.
    pub async fn load_training(&self, training_id: &str) -> Result<TrainingBundle> {
        let (training, sessions, participations) = tokio::join!(
            self.store.get(TRAININGS, training_id),
            degradable(SESSIONS, self.store.list_all(SESSIONS)),
            degradable(PARTICIPATIONS, self.store.list_all(PARTICIPATIONS)),
        );
        let training = training?;
        let degraded = degraded_tables(&[&sessions, &participations]);

        let mut misses = FieldMisses::new();
        let training = Training::from_record(&training, &mut misses);
        let sessions = parse_all(&sessions.records, &mut misses, Session::from_record);
        let participations =
            parse_all(&participations.records, &mut misses, Participation::from_record);
        misses.log("training join");

        let linked_ids = sessions_for_training(&training.id, &sessions);
        let participations = participations_for_sessions(&linked_ids, &participations);
        let sessions: Vec<Session> = sessions
            .into_iter()
            .filter(|s| linked_ids.contains(&s.id))
            .collect();

        debug!(
            training = %training.id,
            sessions = sessions.len(),
            participations = participations.len(),
            "joined training"
        );

        Ok(TrainingBundle {
            training,
            sessions,
            participations,
            degraded,
        })
    }

    /// Fetch all three collections concurrently. The Trainings listing is
    /// required; the other two degrade to empty.
    pub async fn load_collections(&self) -> Result<Collections> {
        let (trainings, sessions, participations) = tokio::join!(
            self.store.list_all(TRAININGS),
            degradable(SESSIONS, self.store.list_all(SESSIONS)),
            degradable(PARTICIPATIONS, self.store.list_all(PARTICIPATIONS)),
        );
        let trainings = trainings?;
        let degraded = degraded_tables(&[&sessions, &participations]);

        let mut misses = FieldMisses::new();
        let trainings = parse_all(&trainings, &mut misses, Training::from_record);
        let sessions = parse_all(&sessions.records, &mut misses, Session::from_record);
        let participations =
            parse_all(&participations.records, &mut misses, Participation::from_record);
        misses.log("collection join");

        let multi = multi_training_sessions(&sessions);
        if !multi.is_empty() {
            warn!(
                sessions = ?multi,
                "sessions linked to several trainings are attributed to each of them"
            );
        }

        Ok(Collections {
            trainings,
            sessions,
            participations,
            degraded,
            multi_training_sessions: multi,
        })
    }
}

/// Outcome of a listing that may be treated as empty on failure.
struct Listing {
    table: &'static str,
    records: Vec<Record>,
    failed: bool,
}

async fn degradable<F>(table: &'static str, fetch: F) -> Listing
where
    F: Future<Output = Result<Vec<Record>>>,
{
    match fetch.await {
        Ok(records) => Listing {
            table,
            records,
            failed: false,
        },
        Err(e) => {
            warn!(table, error = %e, "listing failed, treating as empty");
            Listing {
                table,
                records: Vec::new(),
                failed: true,
            }
        }
    }
}

fn degraded_tables(listings: &[&Listing]) -> Vec<String> {
    listings
        .iter()
        .filter(|l| l.failed)
        .map(|l| l.table.to_string())
        .collect()
}

fn parse_all<T>(
    records: &[Record],
    misses: &mut FieldMisses,
    parse: fn(&Record, &mut FieldMisses) -> T,
) -> Vec<T> {
    records.iter().map(|r| parse(r, misses)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::fixtures::{participation_in, session_linked};
    use serde_json::json;

    #[test]
    fn test_two_hop_join_excludes_unlinked() {
        let sessions = vec![
            session_linked("S1", json!(["T1"])),
            session_linked("S2", json!("T1")),
            session_linked("S3", json!(["T2"])),
        ];
        let participations = vec![
            participation_in("P1", json!(["S1"])),
            participation_in("P2", json!("S2")),
            participation_in("P3", json!(["S3"])),
        ];

        let ids = sessions_for_training("T1", &sessions);
        assert_eq!(ids.len(), 2);
        let joined = participations_for_sessions(&ids, &participations);
        let names: Vec<_> = joined.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(names, vec!["P1", "P2"]);
    }

    #[test]
    fn test_training_without_sessions_is_empty() {
        let sessions = vec![session_linked("S1", json!(["T1"]))];
        let participations = vec![participation_in("P1", json!(["S1"]))];

        let ids = sessions_for_training("T9", &sessions);
        assert!(ids.is_empty());
        assert!(participations_for_sessions(&ids, &participations).is_empty());
    }

    #[test]
    fn test_participation_in_two_sessions_counts_once() {
        let sessions = vec![
            session_linked("S1", json!(["T1"])),
            session_linked("S2", json!(["T1"])),
        ];
        let participations = vec![participation_in("P1", json!(["S1", "S2"]))];
        let ids = sessions_for_training("T1", &sessions);
        assert_eq!(participations_for_sessions(&ids, &participations).len(), 1);
    }

    #[test]
    fn test_multi_training_sessions_are_attributed_to_each() {
        let collections = Collections {
            sessions: vec![session_linked("S1", json!(["T1", "T2"]))],
            participations: vec![participation_in("P1", json!(["S1"]))],
            ..Default::default()
        };
        assert_eq!(collections.participations_of("T1").len(), 1);
        assert_eq!(collections.participations_of("T2").len(), 1);
        assert_eq!(multi_training_sessions(&collections.sessions), vec!["S1"]);
    }
}
