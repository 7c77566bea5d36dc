//! Test fixtures and data builders
//!
//! Model-level fixtures skip the field normalizer and build the typed
//! structs directly; [`builders`] produces raw records for store-level tests.

pub mod builders;

use serde_json::Value;

use crate::fields::{link_ids, parse_date};
use crate::models::{Participation, Session, Training};

/// An inactive, unfinalized training dated `date` (`YYYY-MM-DD`).
pub fn training_on(id: &str, title: &str, date: &str) -> Training {
    Training {
        id: id.to_string(),
        title: title.to_string(),
        process: None,
        description: None,
        active: false,
        finalized: false,
        date: parse_date(date),
        alert_recipients: Vec::new(),
        alert_lead_days: None,
    }
}

/// A closed session without a code, linked through a raw link value so
/// scalar and list shapes can both be exercised.
pub fn session_linked(id: &str, links: Value) -> Session {
    Session {
        id: id.to_string(),
        code: None,
        active: false,
        date: None,
        training_ids: link_ids(&links),
    }
}

pub fn participation_in(id: &str, sessions: Value) -> Participation {
    Participation {
        session_ids: link_ids(&sessions),
        ..blank_participation(id)
    }
}

pub fn participation_with_scores(id: &str, pretest: f64, posttest: f64) -> Participation {
    Participation {
        pretest_score: pretest,
        posttest_score: posttest,
        ..blank_participation(id)
    }
}

/// A participant with identity fields set and no session links.
pub fn person(
    id: &str,
    name: &str,
    email: Option<&str>,
    department: &str,
    role: &str,
) -> Participation {
    Participation {
        name: name.to_string(),
        email: email.map(str::to_string),
        department: Some(department.to_string()),
        role: Some(role.to_string()),
        ..blank_participation(id)
    }
}

fn blank_participation(id: &str) -> Participation {
    Participation {
        id: id.to_string(),
        name: format!("Participante {id}"),
        email: None,
        department: None,
        role: None,
        profession: None,
        pretest_score: 0.0,
        posttest_score: 0.0,
        status: None,
        session_ids: Vec::new(),
        posttest_code: None,
        created: None,
    }
}
