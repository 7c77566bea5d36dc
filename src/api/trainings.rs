//! Training, session and question handlers.

use axum::extract::State;
use chrono::{Local, NaiveDate};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use super::{ok, required, ApiJson, ApiResult, AppState};
use crate::error::{Error, Result};
use crate::fields::{normalize_key, put, Field, FieldMisses};
use crate::models::{Question, Session, Training};
use crate::store::{Fields, ListQuery, Record, RecordStore, QUESTIONS, SESSIONS, TRAININGS};

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ListTrainingsRequest {
    pub active_only: bool,
}

pub async fn list_trainings(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<ListTrainingsRequest>,
) -> ApiResult<Vec<Training>> {
    let store = state.store()?;
    let records = store.list_all(TRAININGS).await?;

    let mut misses = FieldMisses::new();
    let mut trainings: Vec<Training> = records
        .iter()
        .map(|r| Training::from_record(r, &mut misses))
        .filter(|t| !req.active_only || (t.active && !t.finalized))
        .collect();
    misses.log("list trainings");
    trainings.sort_by(|a, b| b.date.cmp(&a.date));

    ok(trainings)
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTrainingRequest {
    pub title: Option<String>,
    pub date: Option<String>,
    pub process: Option<String>,
    pub description: Option<String>,
    pub alert_emails: Option<String>,
    pub alert_lead_days: Option<i64>,
}

pub async fn create_training(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<CreateTrainingRequest>,
) -> ApiResult<Training> {
    let title = required(req.title, "title")?;
    let date = parse_day(&required(req.date, "date")?)?;
    if let Some(days) = req.alert_lead_days {
        if days < 0 {
            return Err(Error::Validation("alertLeadDays cannot be negative".into()));
        }
    }

    let mut fields = Fields::new();
    put(&mut fields, Field::TrainingTitle, title);
    put(&mut fields, Field::TrainingDate, date.to_string());
    put(&mut fields, Field::TrainingActive, true);
    put(&mut fields, Field::TrainingFinalized, false);
    if let Some(process) = req.process.filter(|p| !p.trim().is_empty()) {
        put(&mut fields, Field::TrainingProcess, process.trim());
    }
    if let Some(description) = req.description.filter(|d| !d.trim().is_empty()) {
        put(&mut fields, Field::TrainingDescription, description.trim());
    }
    if let Some(emails) = req.alert_emails.filter(|e| !e.trim().is_empty()) {
        put(&mut fields, Field::AlertRecipients, emails.trim());
    }
    if let Some(days) = req.alert_lead_days {
        put(&mut fields, Field::AlertLeadDays, days);
    }

    let store = state.store()?;
    let record = first_created(store.create(TRAININGS, vec![fields]).await?, TRAININGS)?;
    let training = Training::from_record(&record, &mut FieldMisses::new());
    info!(training = %training.id, title = %training.title, "created training");
    ok(training)
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrainingStatusRequest {
    pub training_id: Option<String>,
    pub finalized: Option<bool>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionFailure {
    pub session_id: String,
    pub error: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrainingStatusResponse {
    pub training: Training,
    pub sessions_updated: Vec<String>,
    pub session_failures: Vec<SessionFailure>,
    pub degraded: Vec<String>,
}

/// Finalize or reactivate a training and cascade the active flag to its
/// sessions. A session that fails to update does not stop the others.
pub async fn set_training_status(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<TrainingStatusRequest>,
) -> ApiResult<TrainingStatusResponse> {
    let training_id = required(req.training_id, "trainingId")?;
    let finalized = req
        .finalized
        .ok_or_else(|| Error::Validation("finalized is required".into()))?;
    let store = state.store()?;

    let mut fields = Fields::new();
    put(&mut fields, Field::TrainingFinalized, finalized);
    put(&mut fields, Field::TrainingActive, !finalized);
    let record = store.update(TRAININGS, &training_id, fields).await?;
    let training = Training::from_record(&record, &mut FieldMisses::new());

    let mut degraded = Vec::new();
    let sessions = match store.list_all(SESSIONS).await {
        Ok(records) => parse_sessions(&records),
        Err(e) => {
            warn!(error = %e, "could not list sessions for status cascade");
            degraded.push(SESSIONS.to_string());
            Vec::new()
        }
    };

    let mut sessions_updated = Vec::new();
    let mut session_failures = Vec::new();
    for session in sessions
        .iter()
        .filter(|s| s.training_ids.iter().any(|id| *id == training_id))
    {
        let mut fields = Fields::new();
        put(&mut fields, Field::SessionActive, !finalized);
        match store.update(SESSIONS, &session.id, fields).await {
            Ok(_) => sessions_updated.push(session.id.clone()),
            Err(e) => {
                warn!(session = %session.id, error = %e, "session status update failed");
                session_failures.push(SessionFailure {
                    session_id: session.id.clone(),
                    error: e.to_string(),
                });
            }
        }
    }

    info!(
        training = %training_id,
        finalized,
        updated = sessions_updated.len(),
        failed = session_failures.len(),
        "training status changed"
    );
    ok(TrainingStatusResponse {
        training,
        sessions_updated,
        session_failures,
        degraded,
    })
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolveSessionRequest {
    pub code: Option<String>,
    pub training_id: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedSession {
    pub session: Session,
    pub training: Option<Training>,
    pub created: bool,
}

/// Look a session up by access code, creating it for `trainingId` when no
/// session carries that code yet.
pub async fn resolve_session(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<ResolveSessionRequest>,
) -> ApiResult<ResolvedSession> {
    let code = normalize_code(&required(req.code, "code")?)?;
    let store = state.store()?;

    if let Some(session) = find_session_by_code(store.as_ref(), &code).await? {
        if !session.active {
            return Err(Error::Validation(format!("session {code} is closed")));
        }
        let training = match session.primary_training() {
            Some(id) => Some(load_training(store.as_ref(), id).await?),
            None => None,
        };
        return ok(ResolvedSession {
            session,
            training,
            created: false,
        });
    }

    let training_id = req
        .training_id
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty())
        .ok_or_else(|| Error::NotFound(format!("no session with code {code}")))?;
    let training = load_training(store.as_ref(), &training_id).await?;
    if training.finalized {
        return Err(Error::Validation(format!(
            "training {} is finalized",
            training.title
        )));
    }

    let mut fields = Fields::new();
    put(&mut fields, Field::SessionCode, code.as_str());
    put(&mut fields, Field::SessionActive, true);
    put(&mut fields, Field::SessionDate, Local::now().date_naive().to_string());
    put(
        &mut fields,
        Field::SessionTrainings,
        Value::Array(vec![Value::String(training.id.clone())]),
    );
    let record = first_created(store.create(SESSIONS, vec![fields]).await?, SESSIONS)?;
    let session = Session::from_record(&record, &mut FieldMisses::new());
    info!(session = %session.id, code = %code, training = %training.id, "created session");

    ok(ResolvedSession {
        session,
        training: Some(training),
        created: true,
    })
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionsRequest {
    pub training_id: Option<String>,
    pub phase: Option<String>,
}

/// A question as shown to participants: never includes the answer.
#[derive(Debug, Serialize)]
pub struct PublicQuestion {
    pub id: String,
    pub text: String,
    pub options: Vec<String>,
}

pub async fn list_questions(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<QuestionsRequest>,
) -> ApiResult<Vec<PublicQuestion>> {
    let training_id = required(req.training_id, "trainingId")?;
    let phase = required(req.phase, "phase")?.to_lowercase();
    if phase != "pretest" && phase != "posttest" {
        return Err(Error::Validation(format!(
            "phase must be pretest or posttest, got {phase}"
        )));
    }

    let store = state.store()?;
    let questions = load_questions(store.as_ref()).await?;
    let public = questions
        .into_iter()
        .filter(|q| q.applies_to(&training_id, &phase))
        .map(|q| PublicQuestion {
            id: q.id,
            text: q.text,
            options: q.options,
        })
        .collect();
    ok(public)
}

pub(crate) async fn load_training(store: &dyn RecordStore, id: &str) -> Result<Training> {
    let record = store.get(TRAININGS, id).await?;
    Ok(Training::from_record(&record, &mut FieldMisses::new()))
}

pub(crate) async fn load_questions(store: &dyn RecordStore) -> Result<Vec<Question>> {
    let records = store.list_all(QUESTIONS).await?;
    let mut misses = FieldMisses::new();
    let questions = records
        .iter()
        .map(|r| Question::from_record(r, &mut misses))
        .collect();
    misses.log("questions");
    Ok(questions)
}

/// Uppercased access code; only letters, digits, `-` and `_` are accepted so
/// the code can be embedded in a store formula.
pub(crate) fn normalize_code(raw: &str) -> Result<String> {
    let code = raw.trim().to_uppercase();
    let valid = !code.is_empty()
        && code.len() <= 32
        && code
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if !valid {
        return Err(Error::Validation(format!("invalid code '{raw}'")));
    }
    Ok(code)
}

/// Try a store-side formula on the primary column name first, then fall
/// back to scanning every session in case the column was renamed. Matches
/// are always re-checked client-side.
async fn find_session_by_code(store: &dyn RecordStore, code: &str) -> Result<Option<Session>> {
    let formula = format!("UPPER({{{}}})='{}'", Field::SessionCode.write_name(), code);
    let matches = |records: &[Record]| {
        parse_sessions(records)
            .into_iter()
            .find(|s| s.code.as_deref() == Some(code))
    };

    match store.list(SESSIONS, &ListQuery::with_formula(formula)).await {
        Ok(records) => {
            if let Some(session) = matches(&records) {
                return Ok(Some(session));
            }
        }
        Err(e) => warn!(error = %e, "formula lookup failed, scanning sessions"),
    }

    let records = store.list_all(SESSIONS).await?;
    Ok(matches(&records))
}

fn parse_sessions(records: &[Record]) -> Vec<Session> {
    let mut misses = FieldMisses::new();
    let sessions = records
        .iter()
        .map(|r| Session::from_record(r, &mut misses))
        .collect();
    misses.log("sessions");
    sessions
}

pub(crate) fn first_created(records: Vec<Record>, table: &str) -> Result<Record> {
    records.into_iter().next().ok_or_else(|| Error::Upstream {
        status: 502,
        table: table.to_string(),
        payload: Value::String("create returned no records".into()),
    })
}

pub(crate) fn parse_day(raw: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|_| Error::Validation(format!("date must be YYYY-MM-DD, got '{raw}'")))
}

/// Case- and accent-insensitive answer comparison.
pub(crate) fn answers_match(given: &str, expected: &str) -> bool {
    normalize_key(given) == normalize_key(expected)
}
