//! Per-cohort daily question schedule.
//!
//! Originally a single hardcoded 14-entry array shared by every cohort; now
//! each cohort stores its own ordered question list (lengths may differ), and
//! lookups wrap once the program outlives the schedule.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::window::program_day_offset;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyQuestion {
    pub category: String,
    pub text: String,
}

/// Fixed, ordered question sequence for one cohort. Never empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyQuestionSchedule {
    questions: Vec<DailyQuestion>,
}

#[derive(Debug, thiserror::Error)]
pub enum ScheduleError {
    #[error("daily question schedule is empty")]
    Empty,
}

impl DailyQuestionSchedule {
    pub fn new(questions: Vec<DailyQuestion>) -> Result<Self, ScheduleError> {
        if questions.is_empty() {
            return Err(ScheduleError::Empty);
        }
        Ok(Self { questions })
    }

    pub fn len(&self) -> usize {
        self.questions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }

    /// Question for a 0-based program day index, wrapping modulo the schedule
    /// length once the program runs past the last configured day.
    pub fn question_for_day(&self, day_index: usize) -> &DailyQuestion {
        &self.questions[day_index % self.questions.len()]
    }

    /// Question for a calendar date. Dates before the program start clamp to
    /// day 0; dates past the end of the schedule wrap cyclically.
    pub fn question_for_date(&self, date: NaiveDate, program_start: NaiveDate) -> &DailyQuestion {
        let offset = program_day_offset(date, program_start).max(0) as usize;
        self.question_for_day(offset)
    }
}
