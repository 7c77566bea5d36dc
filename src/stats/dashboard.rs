//! Global dashboard figures across every training.

use chrono::NaiveDate;
use serde::Serialize;

use super::quarter::{group_counts, summarize, unique_participants, GroupCount, TrainingSummary};
use super::{aggregate, PassPolicy, Statistics};
use crate::join::Collections;

const UPCOMING_LIMIT: usize = 5;
const TOP_GROUPS: usize = 5;

/// Global figures across every training.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStats {
    pub total_trainings: usize,
    pub active_trainings: usize,
    pub finalized_trainings: usize,
    pub total_sessions: usize,
    pub active_sessions: usize,
    /// Over every participation record, whether or not its session resolves
    /// to a known training.
    pub statistics: Statistics,
    pub unique_participants: usize,
    pub upcoming_trainings: Vec<TrainingSummary>,
    pub top_departments: Vec<GroupCount>,
    pub multi_training_sessions: Vec<String>,
    pub degraded: Vec<String>,
}

pub fn build_dashboard(
    collections: &Collections,
    policy: &PassPolicy,
    today: NaiveDate,
) -> DashboardStats {
    let trainings = &collections.trainings;
    let participations = &collections.participations;

    let mut upcoming: Vec<_> = trainings
        .iter()
        .filter(|t| !t.finalized && t.date.is_some_and(|d| d >= today))
        .collect();
    upcoming.sort_by_key(|t| t.date);
    let upcoming_trainings = upcoming
        .into_iter()
        .take(UPCOMING_LIMIT)
        .map(|t| {
            let sessions = collections.sessions_of(&t.id);
            let joined = collections.participations_of(&t.id);
            summarize(t, sessions.len(), &joined, policy)
        })
        .collect();

    let mut top_departments = group_counts(participations.iter().map(|p| p.department.as_deref()));
    top_departments.truncate(TOP_GROUPS);

    DashboardStats {
        total_trainings: trainings.len(),
        active_trainings: trainings.iter().filter(|t| t.active && !t.finalized).count(),
        finalized_trainings: trainings.iter().filter(|t| t.finalized).count(),
        total_sessions: collections.sessions.len(),
        active_sessions: collections.sessions.iter().filter(|s| s.active).count(),
        statistics: aggregate(participations, policy),
        unique_participants: unique_participants(participations),
        upcoming_trainings,
        top_departments,
        multi_training_sessions: collections.multi_training_sessions.clone(),
        degraded: collections.degraded.clone(),
    }
}
