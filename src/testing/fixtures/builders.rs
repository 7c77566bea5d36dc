//! Raw record builders for store-level scenarios

use serde_json::{json, Value};

use crate::fields::{put, Field};
use crate::store::{Fields, Record};

/// Builder for records as the store would return them.
pub struct RecordBuilder {
    record: Record,
}

impl RecordBuilder {
    pub fn new(id: &str) -> Self {
        Self {
            record: Record::new(id, Fields::new()),
        }
    }

    /// Set a field under its current column name.
    pub fn field(mut self, field: Field, value: impl Into<Value>) -> Self {
        put(&mut self.record.fields, field, value);
        self
    }

    /// Set a column by its literal name, e.g. a legacy alias.
    pub fn raw(mut self, column: &str, value: impl Into<Value>) -> Self {
        self.record.fields.insert(column.to_string(), value.into());
        self
    }

    pub fn created(mut self, timestamp: &str) -> Self {
        self.record.created_time = Some(timestamp.to_string());
        self
    }

    pub fn build(self) -> Record {
        self.record
    }
}

pub fn training_record(id: &str, title: &str, date: &str) -> Record {
    RecordBuilder::new(id)
        .field(Field::TrainingTitle, title)
        .field(Field::TrainingDate, date)
        .field(Field::TrainingActive, true)
        .field(Field::TrainingFinalized, false)
        .build()
}

pub fn session_record(id: &str, code: &str, training_id: &str) -> Record {
    RecordBuilder::new(id)
        .field(Field::SessionCode, code)
        .field(Field::SessionActive, true)
        .field(Field::SessionTrainings, json!([training_id]))
        .build()
}

pub fn participation_record(
    id: &str,
    name: &str,
    session_id: &str,
    pretest: f64,
    posttest: f64,
) -> Record {
    RecordBuilder::new(id)
        .field(Field::ParticipantName, name)
        .field(Field::ParticipationSessions, json!([session_id]))
        .field(Field::PretestScore, pretest)
        .field(Field::PosttestScore, posttest)
        .build()
}

pub fn question_record(id: &str, text: &str, answer: &str, training_id: &str) -> Record {
    RecordBuilder::new(id)
        .field(Field::QuestionText, text)
        .field(Field::QuestionOptions, "A|B|C")
        .field(Field::QuestionAnswer, answer)
        .field(Field::QuestionTrainings, json!([training_id]))
        .build()
}
