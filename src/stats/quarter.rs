//! Calendar-quarter reporting.

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

use super::{aggregate, PassPolicy, Statistics};
use crate::error::{Error, Result};
use crate::fields::normalize_key;
use crate::join::Collections;
use crate::models::{Participation, Training};

/// Label used when a grouping field is missing.
pub const UNSPECIFIED: &str = "Sin especificar";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quarter {
    pub year: i32,
    pub number: u32,
}

impl Quarter {
    pub fn new(year: i32, number: u32) -> Result<Self> {
        if !(1..=4).contains(&number) {
            return Err(Error::Validation(format!(
                "quarter must be between 1 and 4, got {number}"
            )));
        }
        if !(1900..=9999).contains(&year) {
            return Err(Error::Validation(format!("year {year} is out of range")));
        }
        Ok(Self { year, number })
    }

    pub fn containing(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            number: (date.month0() / 3) + 1,
        }
    }

    pub fn first_month(&self) -> u32 {
        (self.number - 1) * 3 + 1
    }

    pub fn months(&self) -> [u32; 3] {
        let first = self.first_month();
        [first, first + 1, first + 2]
    }

    pub fn start(&self) -> NaiveDate {
        NaiveDate::from_ymd_opt(self.year, self.first_month(), 1).unwrap_or(NaiveDate::MIN)
    }

    /// Last day of the quarter, inclusive.
    pub fn end(&self) -> NaiveDate {
        let next = if self.number == 4 {
            NaiveDate::from_ymd_opt(self.year + 1, 1, 1)
        } else {
            NaiveDate::from_ymd_opt(self.year, self.first_month() + 3, 1)
        };
        next.and_then(|d| d.pred_opt()).unwrap_or(NaiveDate::MAX)
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start() && date <= self.end()
    }

    pub fn label(&self) -> String {
        format!("Q{} {}", self.number, self.year)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrainingSummary {
    pub id: String,
    pub title: String,
    pub process: Option<String>,
    pub date: Option<NaiveDate>,
    pub active: bool,
    pub finalized: bool,
    pub session_count: usize,
    pub statistics: Statistics,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthBucket {
    pub month: u32,
    pub name: String,
    pub training_count: usize,
    pub participation_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupCount {
    pub name: String,
    pub count: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuarterReport {
    pub quarter: Quarter,
    pub label: String,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub trainings: Vec<TrainingSummary>,
    pub statistics: Statistics,
    pub months: Vec<MonthBucket>,
    pub by_department: Vec<GroupCount>,
    pub by_role: Vec<GroupCount>,
    pub by_profession: Vec<GroupCount>,
    pub unique_participants: usize,
    pub multi_training_sessions: Vec<String>,
    pub degraded: Vec<String>,
}

pub fn build_quarter_report(
    collections: &Collections,
    quarter: Quarter,
    policy: &PassPolicy,
) -> QuarterReport {
    let mut in_quarter: Vec<&Training> = collections
        .trainings
        .iter()
        .filter(|t| t.date.is_some_and(|d| quarter.contains(d)))
        .collect();
    in_quarter.sort_by_key(|t| t.date);

    let mut summaries = Vec::with_capacity(in_quarter.len());
    let mut attributed: Vec<Participation> = Vec::new();
    let mut per_month: HashMap<u32, (usize, usize)> = HashMap::new();

    for training in in_quarter {
        let sessions = collections.sessions_of(&training.id);
        let participations = collections.participations_of(&training.id);

        if let Some(date) = training.date {
            let bucket = per_month.entry(date.month()).or_default();
            bucket.0 += 1;
            bucket.1 += participations.len();
        }

        summaries.push(summarize(training, sessions.len(), &participations, policy));
        attributed.extend(participations);
    }

    let months = quarter
        .months()
        .iter()
        .map(|&m| {
            let (trainings, participations) = per_month.get(&m).copied().unwrap_or_default();
            MonthBucket {
                month: m,
                name: month_name(m),
                training_count: trainings,
                participation_count: participations,
            }
        })
        .collect();

    QuarterReport {
        quarter,
        label: quarter.label(),
        start: quarter.start(),
        end: quarter.end(),
        statistics: aggregate(&attributed, policy),
        by_department: group_counts(attributed.iter().map(|p| p.department.as_deref())),
        by_role: group_counts(attributed.iter().map(|p| p.role.as_deref())),
        by_profession: group_counts(attributed.iter().map(|p| p.profession.as_deref())),
        unique_participants: unique_participants(&attributed),
        trainings: summaries,
        months,
        multi_training_sessions: collections.multi_training_sessions.clone(),
        degraded: collections.degraded.clone(),
    }
}

pub fn summarize(
    training: &Training,
    session_count: usize,
    participations: &[Participation],
    policy: &PassPolicy,
) -> TrainingSummary {
    TrainingSummary {
        id: training.id.clone(),
        title: training.title.clone(),
        process: training.process.clone(),
        date: training.date,
        active: training.active,
        finalized: training.finalized,
        session_count,
        statistics: aggregate(participations, policy),
    }
}

/// Count occurrences per label, most frequent first. Equal counts keep the
/// order in which the label was first seen.
pub fn group_counts<'a, I>(labels: I) -> Vec<GroupCount>
where
    I: IntoIterator<Item = Option<&'a str>>,
{
    let mut groups: Vec<GroupCount> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for label in labels {
        let name = label
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .unwrap_or(UNSPECIFIED);
        match index.get(name) {
            Some(&i) => groups[i].count += 1,
            None => {
                index.insert(name.to_string(), groups.len());
                groups.push(GroupCount {
                    name: name.to_string(),
                    count: 1,
                });
            }
        }
    }

    // sort_by is stable.
    groups.sort_by(|a, b| b.count.cmp(&a.count));
    groups
}

/// Approximate identity: normalized email when present, otherwise
/// name, department and role together.
pub fn participant_key(p: &Participation) -> String {
    match p.email.as_deref().map(normalize_key).filter(|e| !e.is_empty()) {
        Some(email) => format!("email:{email}"),
        None => format!(
            "person:{}|{}|{}",
            normalize_key(&p.name),
            normalize_key(p.department.as_deref().unwrap_or_default()),
            normalize_key(p.role.as_deref().unwrap_or_default()),
        ),
    }
}

pub fn unique_participants(participations: &[Participation]) -> usize {
    participations
        .iter()
        .map(participant_key)
        .collect::<HashSet<_>>()
        .len()
}

const MONTH_NAMES: [&str; 12] = [
    "Enero",
    "Febrero",
    "Marzo",
    "Abril",
    "Mayo",
    "Junio",
    "Julio",
    "Agosto",
    "Septiembre",
    "Octubre",
    "Noviembre",
    "Diciembre",
];

/// Spanish name of a one-based month number.
fn month_name(month: u32) -> String {
    usize::try_from(month)
        .ok()
        .and_then(|m| m.checked_sub(1))
        .and_then(|i| MONTH_NAMES.get(i))
        .map(|name| name.to_string())
        .unwrap_or_default()
}
