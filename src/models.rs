//! Typed views over raw store records.
//!
//! Every reader goes through [`crate::fields`], so these types never see raw
//! column names. Expected fields that resolve to nothing are noted in the
//! caller's [`FieldMisses`].

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::fields::{
    parse_date, pick, pick_bool, pick_date, pick_links, pick_number, pick_str, Field, FieldMisses,
};
use crate::store::Record;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Training {
    pub id: String,
    pub title: String,
    pub process: Option<String>,
    pub description: Option<String>,
    pub active: bool,
    pub finalized: bool,
    pub date: Option<NaiveDate>,
    pub alert_recipients: Vec<String>,
    pub alert_lead_days: Option<i64>,
}

impl Training {
    pub fn from_record(record: &Record, misses: &mut FieldMisses) -> Self {
        let title = pick_str(record, Field::TrainingTitle).unwrap_or_else(|| {
            misses.note(Field::TrainingTitle);
            String::new()
        });

        // Records without an explicit date fall back to their creation time.
        let date = pick_date(record, Field::TrainingDate).or_else(|| {
            misses.note(Field::TrainingDate);
            created_date(record)
        });

        let lead_days = pick_number(record, Field::AlertLeadDays);

        Self {
            id: record.id.clone(),
            title,
            process: pick_str(record, Field::TrainingProcess),
            description: pick_str(record, Field::TrainingDescription),
            active: pick_bool(record, Field::TrainingActive).unwrap_or(false),
            finalized: pick_bool(record, Field::TrainingFinalized).unwrap_or(false),
            date,
            alert_recipients: pick_str(record, Field::AlertRecipients)
                .map(|raw| split_recipients(&raw))
                .unwrap_or_default(),
            alert_lead_days: (lead_days > 0.0).then(|| lead_days.round() as i64),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: String,
    pub code: Option<String>,
    pub active: bool,
    pub date: Option<NaiveDate>,
    pub training_ids: Vec<String>,
}

impl Session {
    pub fn from_record(record: &Record, misses: &mut FieldMisses) -> Self {
        let training_ids = pick_links(record, Field::SessionTrainings);
        if training_ids.is_empty() {
            misses.note(Field::SessionTrainings);
        }

        Self {
            id: record.id.clone(),
            code: pick_str(record, Field::SessionCode).map(|c| c.to_uppercase()),
            active: pick_bool(record, Field::SessionActive).unwrap_or(false),
            date: pick_date(record, Field::SessionDate).or_else(|| created_date(record)),
            training_ids,
        }
    }

    /// The training a session resolves to; extra links are ignored here and
    /// reported by the join diagnostics instead.
    pub fn primary_training(&self) -> Option<&str> {
        self.training_ids.first().map(String::as_str)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Participation {
    pub id: String,
    pub name: String,
    pub email: Option<String>,
    pub department: Option<String>,
    pub role: Option<String>,
    pub profession: Option<String>,
    pub pretest_score: f64,
    pub posttest_score: f64,
    pub status: Option<String>,
    pub session_ids: Vec<String>,
    pub posttest_code: Option<String>,
    pub created: Option<NaiveDate>,
}

impl Participation {
    pub fn from_record(record: &Record, misses: &mut FieldMisses) -> Self {
        let session_ids = pick_links(record, Field::ParticipationSessions);
        if session_ids.is_empty() {
            misses.note(Field::ParticipationSessions);
        }
        let name = pick_str(record, Field::ParticipantName).unwrap_or_else(|| {
            misses.note(Field::ParticipantName);
            String::new()
        });

        Self {
            id: record.id.clone(),
            name,
            email: pick_str(record, Field::ParticipantEmail),
            department: pick_str(record, Field::Department),
            role: pick_str(record, Field::Role),
            profession: pick_str(record, Field::Profession),
            pretest_score: pick_number(record, Field::PretestScore),
            posttest_score: pick_number(record, Field::PosttestScore),
            status: pick_str(record, Field::ParticipationStatus),
            session_ids,
            posttest_code: pick_str(record, Field::PosttestCode).map(|c| c.to_uppercase()),
            created: created_date(record),
        }
    }

    pub fn has_pretest(&self) -> bool {
        self.pretest_score > 0.0
    }

    pub fn has_posttest(&self) -> bool {
        self.posttest_score > 0.0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    pub id: String,
    pub text: String,
    pub options: Vec<String>,
    pub answer: Option<String>,
    pub phase: Option<String>,
    pub training_ids: Vec<String>,
}

impl Question {
    pub fn from_record(record: &Record, misses: &mut FieldMisses) -> Self {
        let text = pick_str(record, Field::QuestionText).unwrap_or_else(|| {
            misses.note(Field::QuestionText);
            String::new()
        });

        Self {
            id: record.id.clone(),
            text,
            options: pick(record, Field::QuestionOptions)
                .map(split_options)
                .unwrap_or_default(),
            answer: pick_str(record, Field::QuestionAnswer),
            phase: pick_str(record, Field::QuestionPhase).map(|p| p.to_lowercase()),
            training_ids: pick_links(record, Field::QuestionTrainings),
        }
    }

    /// Questions without a phase are asked in both phases.
    pub fn applies_to(&self, training_id: &str, phase: &str) -> bool {
        let linked = self.training_ids.iter().any(|id| id == training_id);
        let phase_ok = self
            .phase
            .as_deref()
            .map_or(true, |p| p.eq_ignore_ascii_case(phase));
        linked && phase_ok
    }
}

fn created_date(record: &Record) -> Option<NaiveDate> {
    record.created_time.as_deref().and_then(parse_date)
}

/// Split a free-text recipient list on commas, semicolons and whitespace,
/// dropping duplicates case-insensitively while keeping the first spelling.
pub fn split_recipients(raw: &str) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    raw.split(|c: char| c == ',' || c == ';' || c.is_whitespace())
        .map(str::trim)
        .filter(|addr| addr.contains('@'))
        .filter(|addr| seen.insert(addr.to_lowercase()))
        .map(str::to_string)
        .collect()
}

fn split_options(value: &Value) -> Vec<String> {
    match value {
        Value::Array(items) => items
            .iter()
            .filter_map(|item| item.as_str())
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect(),
        Value::String(s) => s
            .split(['\n', '|'])
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(id: &str, fields: Value) -> Record {
        let Value::Object(map) = fields else {
            panic!("fixture must be an object");
        };
        Record::new(id, map)
    }

    #[test]
    fn test_training_falls_back_to_created_time() {
        let mut rec = record("recT", json!({ "Título": "Lavado de manos", "Activa": true }));
        rec.created_time = Some("2024-02-10T08:00:00.000Z".to_string());

        let mut misses = FieldMisses::new();
        let training = Training::from_record(&rec, &mut misses);
        assert_eq!(training.title, "Lavado de manos");
        assert!(training.active);
        assert!(!training.finalized);
        assert_eq!(training.date, NaiveDate::from_ymd_opt(2024, 2, 10));
        assert_eq!(misses.count(Field::TrainingDate), 1);
    }

    #[test]
    fn test_training_alert_fields() {
        let rec = record(
            "recT",
            json!({
                "Título": "RCP",
                "Correos Alerta": "a@h.org; b@h.org,A@h.org  c@h.org",
                "Días Alerta": "3"
            }),
        );
        let training = Training::from_record(&rec, &mut FieldMisses::new());
        assert_eq!(training.alert_recipients, vec!["a@h.org", "b@h.org", "c@h.org"]);
        assert_eq!(training.alert_lead_days, Some(3));
    }

    #[test]
    fn test_session_scalar_link_and_code() {
        let scalar = Session::from_record(
            &record("recS1", json!({ "Capacitación": "recT1", "Código Acceso": "ab12" })),
            &mut FieldMisses::new(),
        );
        let array = Session::from_record(
            &record("recS1", json!({ "Capacitación": ["recT1"], "Código Acceso": "ab12" })),
            &mut FieldMisses::new(),
        );
        assert_eq!(scalar.training_ids, array.training_ids);
        assert_eq!(scalar.primary_training(), Some("recT1"));
        assert_eq!(scalar.code.as_deref(), Some("AB12"));
    }

    #[test]
    fn test_participation_scores_and_links() {
        let mut misses = FieldMisses::new();
        let p = Participation::from_record(
            &record(
                "recP",
                json!({
                    "Nombre": "Ana",
                    "Puntuación Pretest": 3,
                    "Posttest Score": "4",
                    "Sesión": ["recS1"]
                }),
            ),
            &mut misses,
        );
        assert_eq!(p.pretest_score, 3.0);
        assert_eq!(p.posttest_score, 4.0);
        assert!(p.has_pretest() && p.has_posttest());
        assert_eq!(p.session_ids, vec!["recS1"]);
        assert!(misses.is_empty());
    }

    #[test]
    fn test_question_options_and_phase() {
        let q = Question::from_record(
            &record(
                "recQ",
                json!({
                    "Pregunta": "¿Cuántos segundos?",
                    "Opciones": "10|20\n30",
                    "Respuesta Correcta": "20",
                    "Tipo": "Pretest",
                    "Capacitación": ["recT1"]
                }),
            ),
            &mut FieldMisses::new(),
        );
        assert_eq!(q.options, vec!["10", "20", "30"]);
        assert!(q.applies_to("recT1", "pretest"));
        assert!(!q.applies_to("recT1", "posttest"));
        assert!(!q.applies_to("recT2", "pretest"));
    }
}
