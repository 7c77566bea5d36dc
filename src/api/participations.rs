//! Pretest and posttest submission.

use axum::extract::State;
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use tracing::{info, warn};

use super::trainings::{answers_match, first_created, load_questions, normalize_code};
use super::{ok, required, ApiJson, ApiResult, AppState};
use crate::error::{Error, Result};
use crate::fields::{put, Field, FieldMisses};
use crate::models::{Participation, Question, Session};
use crate::stats::PassPolicy;
use crate::store::{Fields, ListQuery, Record, RecordStore, PARTICIPATIONS, SESSIONS};

/// Uppercase letters and digits without look-alikes (0/O, 1/I/L).
pub const CODE_ALPHABET: &[u8] = b"ABCDEFGHJKMNPQRSTUVWXYZ23456789";
pub const CODE_LENGTH: usize = 6;

pub const STATUS_PRETEST_DONE: &str = "Pretest completado";
pub const STATUS_COMPLETED: &str = "Completado";

pub fn generate_posttest_code() -> String {
    let mut rng = rand::rng();
    (0..CODE_LENGTH)
        .map(|_| CODE_ALPHABET[rng.random_range(0..CODE_ALPHABET.len())] as char)
        .collect()
}

/// Score from a direct value or from graded answers, checked against the
/// scale.
fn resolve_score(
    score: Option<f64>,
    answers: Option<&HashMap<String, String>>,
    questions: &[Question],
    policy: &PassPolicy,
) -> Result<f64> {
    let score = match (score, answers) {
        (Some(score), _) => score,
        (None, Some(answers)) => grade(answers, questions).min(policy.scale),
        (None, None) => {
            return Err(Error::Validation("score or answers is required".into()));
        }
    };
    policy.check_score(score)?;
    Ok(score)
}

/// One point per answer matching the question's expected answer.
pub fn grade(answers: &HashMap<String, String>, questions: &[Question]) -> f64 {
    questions
        .iter()
        .filter(|q| {
            match (answers.get(&q.id), q.answer.as_deref()) {
                (Some(given), Some(expected)) => answers_match(given, expected),
                _ => false,
            }
        })
        .count() as f64
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PretestRequest {
    pub session_id: Option<String>,
    pub name: Option<String>,
    pub email: Option<String>,
    pub department: Option<String>,
    pub role: Option<String>,
    pub profession: Option<String>,
    pub score: Option<f64>,
    pub answers: Option<HashMap<String, String>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PretestResponse {
    pub participation: Participation,
    pub posttest_code: String,
    pub posttest_link: String,
}

pub async fn submit_pretest(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<PretestRequest>,
) -> ApiResult<PretestResponse> {
    let session_id = required(req.session_id, "sessionId")?;
    let name = required(req.name, "name")?;
    let policy = state.config.pass_policy;
    let store = state.store()?;

    let session = Session::from_record(
        &store.get(SESSIONS, &session_id).await?,
        &mut FieldMisses::new(),
    );
    if !session.active {
        return Err(Error::Validation(format!("session {session_id} is closed")));
    }

    let questions = if req.score.is_none() && req.answers.is_some() {
        load_questions(store.as_ref()).await?
    } else {
        Vec::new()
    };
    let score = resolve_score(req.score, req.answers.as_ref(), &questions, &policy)?;

    let code = generate_posttest_code();
    let mut fields = Fields::new();
    put(&mut fields, Field::ParticipantName, name);
    for (field, value) in [
        (Field::ParticipantEmail, req.email),
        (Field::Department, req.department),
        (Field::Role, req.role),
        (Field::Profession, req.profession),
    ] {
        if let Some(value) = value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty()) {
            put(&mut fields, field, value);
        }
    }
    put(&mut fields, Field::PretestScore, score);
    put(&mut fields, Field::ParticipationStatus, STATUS_PRETEST_DONE);
    put(
        &mut fields,
        Field::ParticipationSessions,
        Value::Array(vec![Value::String(session.id.clone())]),
    );
    put(&mut fields, Field::PosttestCode, code.as_str());

    let record = first_created(store.create(PARTICIPATIONS, vec![fields]).await?, PARTICIPATIONS)?;
    let participation = Participation::from_record(&record, &mut FieldMisses::new());
    info!(participation = %participation.id, session = %session.id, "pretest recorded");

    ok(PretestResponse {
        participation,
        posttest_link: state.config.posttest_link(&code),
        posttest_code: code,
    })
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PosttestRequest {
    pub code: Option<String>,
    pub participation_id: Option<String>,
    pub score: Option<f64>,
    pub answers: Option<HashMap<String, String>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PosttestResponse {
    pub participation: Participation,
    pub passed: bool,
}

pub async fn submit_posttest(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<PosttestRequest>,
) -> ApiResult<PosttestResponse> {
    let policy = state.config.pass_policy;
    let store = state.store()?;

    let record = match (req.participation_id.filter(|id| !id.trim().is_empty()), req.code) {
        (Some(id), _) => store.get(PARTICIPATIONS, id.trim()).await?,
        (None, Some(code)) => {
            let code = normalize_code(&code)?;
            find_by_posttest_code(store.as_ref(), &code)
                .await?
                .ok_or_else(|| Error::NotFound(format!("no participation with code {code}")))?
        }
        (None, None) => {
            return Err(Error::Validation("code or participationId is required".into()));
        }
    };

    let questions = if req.score.is_none() && req.answers.is_some() {
        load_questions(store.as_ref()).await?
    } else {
        Vec::new()
    };
    let score = resolve_score(req.score, req.answers.as_ref(), &questions, &policy)?;

    let mut fields = Fields::new();
    put(&mut fields, Field::PosttestScore, score);
    put(&mut fields, Field::ParticipationStatus, STATUS_COMPLETED);
    let updated = store.update(PARTICIPATIONS, &record.id, fields).await?;
    let participation = Participation::from_record(&updated, &mut FieldMisses::new());
    info!(participation = %participation.id, score, "posttest recorded");

    ok(PosttestResponse {
        passed: policy.passes(participation.posttest_score),
        participation,
    })
}

/// Formula lookup on the primary column name, then a full scan; both
/// re-check the code client-side.
async fn find_by_posttest_code(store: &dyn RecordStore, code: &str) -> Result<Option<Record>> {
    let formula = format!("{{{}}}='{}'", Field::PosttestCode.write_name(), code);
    let find = |records: Vec<Record>| {
        let mut misses = FieldMisses::new();
        records.into_iter().find(|r| {
            Participation::from_record(r, &mut misses).posttest_code.as_deref() == Some(code)
        })
    };

    match store
        .list(PARTICIPATIONS, &ListQuery::with_formula(formula))
        .await
    {
        Ok(records) => {
            if let Some(found) = find(records) {
                return Ok(Some(found));
            }
        }
        Err(e) => warn!(error = %e, "formula lookup failed, scanning participations"),
    }

    Ok(find(store.list_all(PARTICIPATIONS).await?))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn question(id: &str, answer: &str) -> Question {
        Question {
            id: id.to_string(),
            text: String::new(),
            options: vec![],
            answer: Some(answer.to_string()),
            phase: None,
            training_ids: vec!["T1".to_string()],
        }
    }

    #[test]
    fn test_codes_use_unambiguous_alphabet() {
        for _ in 0..50 {
            let code = generate_posttest_code();
            assert_eq!(code.len(), CODE_LENGTH);
            assert!(code.bytes().all(|b| CODE_ALPHABET.contains(&b)));
            assert!(!code.contains('O') && !code.contains('0') && !code.contains('I'));
        }
    }

    #[test]
    fn test_grading_is_case_and_accent_insensitive() {
        let questions = vec![question("q1", "Sí"), question("q2", "20"), question("q3", "B")];
        let answers: HashMap<String, String> = [
            ("q1".to_string(), "si".to_string()),
            ("q2".to_string(), "30".to_string()),
            ("q3".to_string(), " b ".to_string()),
            ("unknown".to_string(), "x".to_string()),
        ]
        .into_iter()
        .collect();
        assert_eq!(grade(&answers, &questions), 2.0);
    }

    #[test]
    fn test_score_resolution() {
        let policy = PassPolicy::default();
        assert_eq!(resolve_score(Some(4.0), None, &[], &policy).unwrap(), 4.0);
        assert!(matches!(
            resolve_score(Some(7.0), None, &[], &policy),
            Err(Error::Validation(_))
        ));
        assert!(matches!(
            resolve_score(None, None, &[], &policy),
            Err(Error::Validation(_))
        ));
    }
}
