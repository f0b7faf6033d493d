//! Profile library visibility.
//!
//! What a viewer sees in the library depends on where the cohort sits in its
//! lifecycle: the formulaic per-day set while the program runs, everyone who
//! certified yesterday once the unlock date is reached, and the full roster
//! after the program ends. `today` is always the logical date under the 2 AM
//! cutoff (see [`super::window`]), never the wall-clock calendar date.

use std::collections::BTreeSet;

use chrono::{Days, NaiveDate};
use serde::Serialize;

use super::domain::{Cohort, CohortId, Participant, ParticipantId};
use super::engine::MatchingError;
use super::ledger::SubmissionLedger;
use super::store::DocumentStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProfileVisibility {
    /// Program running: certified viewers see only their assigned set.
    Restricted,
    /// Unlock date reached: certified viewers see all of yesterday's
    /// certified participants.
    UnlockedYesterday,
    /// Program over: everyone sees the whole (non-staff) roster, no
    /// certification required.
    FullyOpen,
}

impl ProfileVisibility {
    pub const fn label(self) -> &'static str {
        match self {
            ProfileVisibility::Restricted => "restricted",
            ProfileVisibility::UnlockedYesterday => "unlocked_yesterday",
            ProfileVisibility::FullyOpen => "fully_open",
        }
    }
}

/// Which visibility state applies for one cohort on one logical date.
/// End-of-program openness takes precedence over the unlock date.
pub fn visibility(cohort: &Cohort, today: NaiveDate) -> ProfileVisibility {
    if today >= cohort.end_date {
        return ProfileVisibility::FullyOpen;
    }
    match cohort.profile_unlock_date {
        Some(unlock) if today >= unlock => ProfileVisibility::UnlockedYesterday,
        _ => ProfileVisibility::Restricted,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VisibleProfiles {
    pub visibility: ProfileVisibility,
    pub profiles: Vec<ParticipantId>,
}

/// Resolve the set of profiles `viewer` may open today.
pub fn visible_profiles(
    cohort: &Cohort,
    roster: &[Participant],
    ledger: &SubmissionLedger,
    viewer: &ParticipantId,
    today: NaiveDate,
) -> VisibleProfiles {
    let state = visibility(cohort, today);
    let profiles = match state {
        ProfileVisibility::FullyOpen => roster
            .iter()
            .filter(|p| &p.id != viewer)
            .filter(|p| !p.is_administrator && !p.is_super_admin && !p.is_ghost)
            .map(|p| p.id.clone())
            .collect(),
        ProfileVisibility::UnlockedYesterday => {
            if ledger.submitted_on(viewer, today) {
                certified_yesterday(roster, ledger, viewer, today)
            } else {
                Vec::new()
            }
        }
        ProfileVisibility::Restricted => {
            if ledger.submitted_on(viewer, today) {
                assigned_set(cohort, viewer, today)
            } else {
                Vec::new()
            }
        }
    };

    VisibleProfiles {
        visibility: state,
        profiles,
    }
}

/// Store-backed convenience wrapper around [`visible_profiles`].
pub fn resolve_visible_profiles<S: DocumentStore>(
    store: &S,
    cohort_id: &CohortId,
    viewer: &ParticipantId,
    today: NaiveDate,
) -> Result<VisibleProfiles, MatchingError> {
    let cohort = store
        .cohort(cohort_id)?
        .ok_or_else(|| MatchingError::CohortNotFound(cohort_id.clone()))?;
    let roster = store.participants_by_cohort(cohort_id)?;
    let submissions = store.submissions_by_cohort(cohort_id)?;
    let ledger = SubmissionLedger::from_submissions(&submissions);
    Ok(visible_profiles(&cohort, &roster, &ledger, viewer, today))
}

fn certified_yesterday(
    roster: &[Participant],
    ledger: &SubmissionLedger,
    viewer: &ParticipantId,
    today: NaiveDate,
) -> Vec<ParticipantId> {
    let Some(yesterday) = today.checked_sub_days(Days::new(1)) else {
        return Vec::new();
    };
    let ghosts: BTreeSet<&ParticipantId> = roster
        .iter()
        .filter(|p| p.is_ghost)
        .map(|p| &p.id)
        .collect();

    ledger
        .participants_on(yesterday)
        .into_iter()
        .filter(|id| id != viewer && !ghosts.contains(id))
        .collect()
}

/// Today's assigned set, falling back to the latest stored result (at or
/// before today) that includes the viewer when today's key is absent or
/// skips them. Assignments were screened at matching time, so the stored
/// lists are returned as-is.
fn assigned_set(cohort: &Cohort, viewer: &ParticipantId, today: NaiveDate) -> Vec<ParticipantId> {
    if let Some(result) = cohort.daily_featured.get(&today) {
        if result.contains_viewer(viewer) {
            return result.assigned_to(viewer);
        }
    }

    cohort
        .daily_featured
        .range(..=today)
        .rev()
        .find(|(_, result)| result.contains_viewer(viewer))
        .map(|(_, result)| result.assigned_to(viewer))
        .unwrap_or_default()
}
