//! Participant roll-up for a single training.

use chrono::NaiveDate;
use serde::Serialize;
use std::collections::HashMap;

use super::{aggregate, PassPolicy, Statistics};
use crate::join::TrainingBundle;
use crate::models::Training;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantRow {
    pub id: String,
    pub name: String,
    pub email: Option<String>,
    pub department: Option<String>,
    pub role: Option<String>,
    pub profession: Option<String>,
    pub session_code: Option<String>,
    pub pretest_score: f64,
    pub posttest_score: f64,
    pub passed: bool,
    pub status: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub id: String,
    pub code: Option<String>,
    pub date: Option<NaiveDate>,
    pub active: bool,
    pub participant_count: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrainingReport {
    pub training: Training,
    pub sessions: Vec<SessionSummary>,
    pub participants: Vec<ParticipantRow>,
    pub statistics: Statistics,
    pub pass_policy: PassPolicy,
    pub degraded: Vec<String>,
}

pub fn build_training_report(bundle: &TrainingBundle, policy: &PassPolicy) -> TrainingReport {
    let codes: HashMap<&str, Option<&str>> = bundle
        .sessions
        .iter()
        .map(|s| (s.id.as_str(), s.code.as_deref()))
        .collect();

    let mut participants: Vec<ParticipantRow> = bundle
        .participations
        .iter()
        .map(|p| ParticipantRow {
            id: p.id.clone(),
            name: p.name.clone(),
            email: p.email.clone(),
            department: p.department.clone(),
            role: p.role.clone(),
            profession: p.profession.clone(),
            session_code: p
                .session_ids
                .iter()
                .find_map(|id| codes.get(id.as_str()).copied().flatten())
                .map(str::to_string),
            pretest_score: p.pretest_score,
            posttest_score: p.posttest_score,
            passed: policy.passes(p.posttest_score),
            status: p.status.clone(),
        })
        .collect();
    participants.sort_by_key(|row| row.name.to_lowercase());

    let sessions = bundle
        .sessions
        .iter()
        .map(|s| SessionSummary {
            id: s.id.clone(),
            code: s.code.clone(),
            date: s.date,
            active: s.active,
            participant_count: bundle
                .participations
                .iter()
                .filter(|p| p.session_ids.contains(&s.id))
                .count(),
        })
        .collect();

    TrainingReport {
        training: bundle.training.clone(),
        sessions,
        participants,
        statistics: aggregate(&bundle.participations, policy),
        pass_policy: *policy,
        degraded: bundle.degraded.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::fixtures::{participation_in, session_linked, training_on};
    use serde_json::json;

    #[test]
    fn test_rows_carry_session_codes_and_pass_flags() {
        let mut session = session_linked("S1", json!(["T1"]));
        session.code = Some("ABC123".to_string());

        let mut bea = participation_in("P1", json!(["S1"]));
        bea.name = "Bea".to_string();
        bea.posttest_score = 3.0;
        let mut ana = participation_in("P2", json!("S1"));
        ana.name = "ana".to_string();
        ana.posttest_score = 2.0;

        let bundle = TrainingBundle {
            training: training_on("T1", "RCP", "2024-02-01"),
            sessions: vec![session],
            participations: vec![bea, ana],
            degraded: vec![],
        };

        let report = build_training_report(&bundle, &PassPolicy::default());
        let names: Vec<_> = report.participants.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["ana", "Bea"]);
        assert!(!report.participants[0].passed);
        assert!(report.participants[1].passed);
        assert_eq!(report.participants[1].session_code.as_deref(), Some("ABC123"));
        assert_eq!(report.sessions[0].participant_count, 2);
        assert_eq!(report.statistics.pass_rate, 50);
    }

    #[test]
    fn test_training_without_sessions_reports_zero() {
        let bundle = TrainingBundle {
            training: training_on("T1", "RCP", "2024-02-01"),
            sessions: vec![],
            participations: vec![],
            degraded: vec![],
        };
        let report = build_training_report(&bundle, &PassPolicy::default());
        assert_eq!(report.statistics.total_count, 0);
        assert_eq!(report.statistics.adherence_rate, 0);
        assert!(report.participants.is_empty());
    }
}
