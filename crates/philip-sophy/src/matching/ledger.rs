//! In-memory view over a cohort's submission rows.
//!
//! The store occasionally holds more than one row per (participant, date)
//! even though the product intends at most one; the ledger resolves the
//! conflict deterministically — the row with the latest `submitted_at` wins,
//! including its status, so a late draft supersedes an earlier certified
//! attempt for that day.

use std::collections::{BTreeSet, HashMap};

use chrono::NaiveDate;

use super::domain::{ParticipantId, ReadingSubmission};

#[derive(Debug, Default)]
pub struct SubmissionLedger {
    counted_dates: HashMap<ParticipantId, BTreeSet<NaiveDate>>,
}

impl SubmissionLedger {
    pub fn from_submissions(rows: &[ReadingSubmission]) -> Self {
        let mut latest: HashMap<(&ParticipantId, NaiveDate), &ReadingSubmission> = HashMap::new();
        for row in rows {
            latest
                .entry((&row.participant_id, row.submission_date))
                .and_modify(|current| {
                    if row.submitted_at > current.submitted_at {
                        *current = row;
                    }
                })
                .or_insert(row);
        }

        let mut counted_dates: HashMap<ParticipantId, BTreeSet<NaiveDate>> = HashMap::new();
        for ((participant, date), row) in latest {
            if row.status.is_counted() {
                counted_dates
                    .entry(participant.clone())
                    .or_default()
                    .insert(date);
            }
        }

        Self { counted_dates }
    }

    /// Distinct certified dates strictly before `date` for one participant.
    /// Drives the profile-book size formula.
    pub fn cumulative_count_before(&self, participant: &ParticipantId, date: NaiveDate) -> usize {
        self.counted_dates
            .get(participant)
            .map(|dates| dates.range(..date).count())
            .unwrap_or(0)
    }

    /// Whether the participant certified on the given logical date.
    pub fn submitted_on(&self, participant: &ParticipantId, date: NaiveDate) -> bool {
        self.counted_dates
            .get(participant)
            .is_some_and(|dates| dates.contains(&date))
    }

    /// Everyone who certified on the given logical date.
    pub fn participants_on(&self, date: NaiveDate) -> BTreeSet<ParticipantId> {
        self.counted_dates
            .iter()
            .filter(|(_, dates)| dates.contains(&date))
            .map(|(participant, _)| participant.clone())
            .collect()
    }
}
