//! Aggregate statistics over participations.
//!
//! All rates are integer percentages rounded half-up. Means only consider
//! strictly positive scores, since a zero score means "not taken".

pub mod dashboard;
pub mod quarter;
pub mod rollup;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::models::Participation;

pub use dashboard::{build_dashboard, DashboardStats};
pub use quarter::{build_quarter_report, Quarter, QuarterReport};
pub use rollup::{build_training_report, ParticipantRow, TrainingReport};

/// Decides whether a posttest score passes.
///
/// A score passes when `score / scale * 100 >= pass_percent`, so the default
/// 60 % bar means ">= 3" on a 5-point scale and ">= 60" on a 100-point one.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PassPolicy {
    pub scale: f64,
    pub pass_percent: f64,
}

impl Default for PassPolicy {
    fn default() -> Self {
        Self {
            scale: 5.0,
            pass_percent: 60.0,
        }
    }
}

impl PassPolicy {
    pub fn validate(&self) -> Result<()> {
        if !self.scale.is_finite() || self.scale <= 0.0 {
            return Err(Error::Config(format!(
                "score scale must be positive, got {}",
                self.scale
            )));
        }
        if !(0.0..=100.0).contains(&self.pass_percent) {
            return Err(Error::Config(format!(
                "pass percent must be within 0..=100, got {}",
                self.pass_percent
            )));
        }
        Ok(())
    }

    pub fn passes(&self, score: f64) -> bool {
        // Cross-multiplied to keep 3/5 vs 60 % exact.
        score > 0.0 && score * 100.0 >= self.pass_percent * self.scale
    }

    /// Smallest passing score, used by spreadsheet formulas.
    pub fn threshold(&self) -> f64 {
        self.pass_percent * self.scale / 100.0
    }

    pub fn check_score(&self, score: f64) -> Result<()> {
        if !score.is_finite() || score < 0.0 || score > self.scale {
            return Err(Error::Validation(format!(
                "score must be between 0 and {}, got {}",
                self.scale, score
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Statistics {
    pub total_count: usize,
    pub pretest_completed_count: usize,
    pub posttest_completed_count: usize,
    pub passed_count: usize,
    pub average_pretest: i64,
    pub average_posttest: i64,
    pub adherence_rate: i64,
    pub improvement_rate: i64,
    pub pass_rate: i64,
}

pub fn aggregate<'a, I>(participations: I, policy: &PassPolicy) -> Statistics
where
    I: IntoIterator<Item = &'a Participation>,
{
    let mut total = 0usize;
    let mut pretests = Vec::new();
    let mut posttests = Vec::new();
    let mut passed = 0usize;

    for p in participations {
        total += 1;
        if p.has_pretest() {
            pretests.push(p.pretest_score);
        }
        if p.has_posttest() {
            posttests.push(p.posttest_score);
            if policy.passes(p.posttest_score) {
                passed += 1;
            }
        }
    }

    let average_pretest = mean_rounded(&pretests);
    let average_posttest = mean_rounded(&posttests);

    Statistics {
        total_count: total,
        pretest_completed_count: pretests.len(),
        posttest_completed_count: posttests.len(),
        passed_count: passed,
        average_pretest,
        average_posttest,
        adherence_rate: percentage(posttests.len(), total),
        improvement_rate: improvement(average_pretest, average_posttest),
        pass_rate: percentage(passed, posttests.len()),
    }
}

/// `part / whole` as a rounded percentage; 0 when `whole` is 0.
pub fn percentage(part: usize, whole: usize) -> i64 {
    if whole == 0 {
        return 0;
    }
    round_half_up(part as f64 / whole as f64 * 100.0)
}

/// Relative change between the rounded averages; 0 when either is 0.
pub fn improvement(average_pretest: i64, average_posttest: i64) -> i64 {
    if average_pretest == 0 || average_posttest == 0 {
        return 0;
    }
    round_half_up(
        (average_posttest - average_pretest) as f64 / average_pretest as f64 * 100.0,
    )
}

pub fn mean_rounded(values: &[f64]) -> i64 {
    if values.is_empty() {
        return 0;
    }
    round_half_up(values.iter().sum::<f64>() / values.len() as f64)
}

pub fn round_half_up(value: f64) -> i64 {
    (value + 0.5).floor() as i64
}
