//! Field-name normalization.
//!
//! Column names in the record store have been renamed and re-spelled over
//! time, so every logical field is read through an ordered alias list: the
//! first alias present with a non-empty value wins. Writes always use the
//! first alias.

use chrono::{DateTime, NaiveDate};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::warn;
use unicode_normalization::{char::is_combining_mark, UnicodeNormalization};

use crate::store::{Fields, Record};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum Field {
    TrainingTitle,
    TrainingProcess,
    TrainingDescription,
    TrainingActive,
    TrainingFinalized,
    TrainingDate,
    AlertRecipients,
    AlertLeadDays,
    SessionCode,
    SessionActive,
    SessionDate,
    SessionTrainings,
    ParticipantName,
    ParticipantEmail,
    Department,
    Role,
    Profession,
    PretestScore,
    PosttestScore,
    ParticipationStatus,
    ParticipationSessions,
    PosttestCode,
    QuestionText,
    QuestionOptions,
    QuestionAnswer,
    QuestionPhase,
    QuestionTrainings,
}

impl Field {
    /// Accepted raw column names, most current first.
    pub fn aliases(self) -> &'static [&'static str] {
        match self {
            Field::TrainingTitle => &["Título", "Titulo", "Nombre Capacitación", "Title"],
            Field::TrainingProcess => &["Proceso", "Departamento", "Process"],
            Field::TrainingDescription => &["Descripción", "Descripcion", "Description"],
            Field::TrainingActive => &["Activa", "Activo", "Active"],
            Field::TrainingFinalized => &["Finalizada", "Finalizado", "Finalized"],
            Field::TrainingDate => &["Fecha", "Fecha Capacitación", "Fecha Capacitacion", "Date"],
            Field::AlertRecipients => &["Correos Alerta", "Emails Alerta", "Alert Emails"],
            Field::AlertLeadDays => &["Días Alerta", "Dias Alerta", "Alert Lead Days"],
            Field::SessionCode => &["Código Acceso", "Codigo Acceso", "Código", "Access Code"],
            Field::SessionActive => &["Activa", "Activo", "Active"],
            Field::SessionDate => &["Fecha Inicio", "Fecha", "Start Date"],
            Field::SessionTrainings => &["Capacitación", "Capacitaciones", "Capacitacion", "Training"],
            Field::ParticipantName => &["Nombre", "Nombre Completo", "Name"],
            Field::ParticipantEmail => &["Email", "Correo", "Correo Electrónico"],
            Field::Department => &["Servicio", "Departamento", "Department"],
            Field::Role => &["Cargo", "Rol", "Role"],
            Field::Profession => &["Profesión", "Profesion", "Profession"],
            Field::PretestScore => &["Puntuación Pretest", "Puntuacion Pretest", "Pretest Score"],
            Field::PosttestScore => &[
                "Puntuación Posttest",
                "Puntuacion Posttest",
                "Posttest Score",
            ],
            Field::ParticipationStatus => &["Estado", "Status"],
            Field::ParticipationSessions => &["Sesión", "Sesiones", "Sesion", "Session"],
            Field::PosttestCode => &["Código Posttest", "Codigo Posttest", "Posttest Code"],
            Field::QuestionText => &["Pregunta", "Question"],
            Field::QuestionOptions => &["Opciones", "Options"],
            Field::QuestionAnswer => &["Respuesta Correcta", "Respuesta", "Correct Answer"],
            Field::QuestionPhase => &["Tipo", "Fase", "Phase"],
            Field::QuestionTrainings => &["Capacitación", "Capacitaciones", "Training"],
        }
    }

    /// Column name used when writing this field.
    pub fn write_name(self) -> &'static str {
        self.aliases()[0]
    }
}

/// Null, blank strings and empty arrays count as absent.
pub fn is_present(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::String(s) => !s.trim().is_empty(),
        Value::Array(items) => !items.is_empty(),
        _ => true,
    }
}

/// Set `field` under its write name.
pub fn put(fields: &mut Fields, field: Field, value: impl Into<Value>) {
    fields.insert(field.write_name().to_string(), value.into());
}

pub fn pick<'a>(record: &'a Record, field: Field) -> Option<&'a Value> {
    field
        .aliases()
        .iter()
        .filter_map(|name| record.fields.get(*name))
        .find(|value| is_present(value))
}

pub fn pick_str(record: &Record, field: Field) -> Option<String> {
    pick(record, field).and_then(value_to_string)
}

/// Tolerant numeric read: anything missing or unparseable is 0.
pub fn pick_number(record: &Record, field: Field) -> f64 {
    pick(record, field).map(parse_number).unwrap_or(0.0)
}

pub fn pick_bool(record: &Record, field: Field) -> Option<bool> {
    pick(record, field).map(|value| match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|v| v != 0.0),
        Value::String(s) => matches!(
            s.trim().to_lowercase().as_str(),
            "true" | "1" | "yes" | "si" | "sí" | "x"
        ),
        _ => false,
    })
}

pub fn pick_links(record: &Record, field: Field) -> Vec<String> {
    pick(record, field).map(link_ids).unwrap_or_default()
}

pub fn pick_date(record: &Record, field: Field) -> Option<NaiveDate> {
    pick_str(record, field).and_then(|s| parse_date(&s))
}

fn value_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        // Lookup columns come back as single-element arrays.
        Value::Array(items) => items.iter().find_map(value_to_string),
        _ => None,
    }
    .filter(|s| !s.is_empty())
}

pub fn parse_number(value: &Value) -> f64 {
    let parsed = match value {
        Value::Number(n) => n.as_f64().unwrap_or(0.0),
        Value::String(s) => s.trim().replace(',', ".").parse::<f64>().unwrap_or(0.0),
        Value::Array(items) => items.first().map(parse_number).unwrap_or(0.0),
        _ => 0.0,
    };
    if parsed.is_finite() {
        parsed
    } else {
        0.0
    }
}

/// Normalize a link column to a list of record ids. Scalars are wrapped,
/// absent values become empty, and expanded `{ "id": .. }` objects are
/// reduced to their id.
pub fn link_ids(value: &Value) -> Vec<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => vec![s.trim().to_string()],
        Value::Array(items) => items
            .iter()
            .filter_map(|item| match item {
                Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
                Value::Object(map) => map
                    .get("id")
                    .and_then(Value::as_str)
                    .map(str::to_string),
                _ => None,
            })
            .collect(),
        Value::Object(map) => map
            .get("id")
            .and_then(Value::as_str)
            .map(|id| vec![id.to_string()])
            .unwrap_or_default(),
        _ => Vec::new(),
    }
}

/// Accepts `YYYY-MM-DD`, RFC 3339 timestamps and `DD/MM/YYYY`.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.date_naive());
    }
    if let Some(prefix) = raw.get(..10) {
        if let Ok(date) = NaiveDate::parse_from_str(prefix, "%Y-%m-%d") {
            return Some(date);
        }
    }
    NaiveDate::parse_from_str(raw, "%d/%m/%Y").ok()
}

/// Lowercase, accent-free, whitespace-collapsed form used for identity keys
/// and case-insensitive comparisons.
pub fn normalize_key(raw: &str) -> String {
    let stripped: String = raw.nfd().filter(|c| !is_combining_mark(*c)).collect();
    stripped
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Collects alias misses for expected fields so a whole join can log one
/// warning instead of one per record.
#[derive(Debug, Default, Clone)]
pub struct FieldMisses {
    counts: BTreeMap<Field, usize>,
}

impl FieldMisses {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn note(&mut self, field: Field) {
        *self.counts.entry(field).or_insert(0) += 1;
    }

    pub fn count(&self, field: Field) -> usize {
        self.counts.get(&field).copied().unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    pub fn log(&self, context: &str) {
        for (field, count) in &self.counts {
            warn!(
                context,
                field = ?field,
                records = count,
                aliases = ?field.aliases(),
                "no accepted column name matched"
            );
        }
    }
}
