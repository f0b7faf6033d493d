//! Roster and result validation for gender-balanced matching.
//!
//! Failures carry the complete list of offenders so an operator can see the
//! whole picture in one pass instead of fixing participants one at a time.

use std::collections::HashMap;

use serde::Serialize;

use super::domain::{AiMatching, Gender, Participant, ParticipantId};

pub const DEFAULT_MIN_PER_GENDER: usize = 3;

/// Per-gender roster counts returned when validation passes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct GenderDistribution {
    pub male: usize,
    pub female: usize,
    pub other: usize,
}

#[derive(Debug, thiserror::Error)]
pub enum RosterValidationError {
    #[error("{} participant(s) have no gender tag", participants.len())]
    MissingGenderData { participants: Vec<ParticipantId> },
    #[error(
        "insufficient gender pool: {male} male / {female} female, need {required} of each"
    )]
    InsufficientGenderPool {
        male: usize,
        female: usize,
        required: usize,
    },
}

/// Validate gender tagging and distribution before a balanced matching run.
///
/// Collects every untagged participant rather than failing on the first one.
pub fn validate_for_matching(
    roster: &[Participant],
    min_per_gender: usize,
) -> Result<GenderDistribution, RosterValidationError> {
    let missing: Vec<ParticipantId> = roster
        .iter()
        .filter(|p| p.gender.is_none())
        .map(|p| p.id.clone())
        .collect();

    if !missing.is_empty() {
        return Err(RosterValidationError::MissingGenderData {
            participants: missing,
        });
    }

    let distribution = GenderDistribution {
        male: roster.iter().filter(|p| p.gender == Some(Gender::Male)).count(),
        female: roster.iter().filter(|p| p.gender == Some(Gender::Female)).count(),
        other: roster.iter().filter(|p| p.gender == Some(Gender::Other)).count(),
    };

    if distribution.male < min_per_gender || distribution.female < min_per_gender {
        return Err(RosterValidationError::InsufficientGenderPool {
            male: distribution.male,
            female: distribution.female,
            required: min_per_gender,
        });
    }

    Ok(distribution)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PairGroup {
    Similar,
    Opposite,
}

impl PairGroup {
    pub const fn label(self) -> &'static str {
        match self {
            PairGroup::Similar => "similar",
            PairGroup::Opposite => "opposite",
        }
    }
}

/// One pair in a legacy result that is not exactly one male + one female.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnbalancedPair {
    pub participant: ParticipantId,
    pub group: PairGroup,
}

/// Check every similar/opposite pair of a legacy result for gender balance.
///
/// Pairs containing participants with `other` or unknown gender can never
/// satisfy the 1 male + 1 female rule and are reported as unbalanced; that is
/// a documented limitation of the v1 scheme, not something to patch here.
pub fn validate_result_balance(
    result: &AiMatching,
    roster: &[Participant],
) -> Result<(), Vec<UnbalancedPair>> {
    let genders: HashMap<&ParticipantId, Option<Gender>> =
        roster.iter().map(|p| (&p.id, p.gender)).collect();

    let mut unbalanced = Vec::new();
    for (participant, assignment) in &result.assignments {
        for (group, pair) in [
            (PairGroup::Similar, &assignment.similar),
            (PairGroup::Opposite, &assignment.opposite),
        ] {
            if !pair_is_balanced(pair, &genders) {
                unbalanced.push(UnbalancedPair {
                    participant: participant.clone(),
                    group,
                });
            }
        }
    }

    if unbalanced.is_empty() {
        Ok(())
    } else {
        Err(unbalanced)
    }
}

fn pair_is_balanced(
    pair: &[ParticipantId; 2],
    genders: &HashMap<&ParticipantId, Option<Gender>>,
) -> bool {
    let mut male = 0;
    let mut female = 0;
    for id in pair {
        match genders.get(id).copied().flatten() {
            Some(Gender::Male) => male += 1,
            Some(Gender::Female) => female += 1,
            _ => return false,
        }
    }
    male == 1 && female == 1
}
