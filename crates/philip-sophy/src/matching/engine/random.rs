//! Gender-balance-preferred random selection.

use rand::seq::SliceRandom;
use rand::Rng;

use crate::matching::domain::{Gender, Participant};

/// Pick up to `count` candidates, preferring an even male/female split.
///
/// Half the target (rounded down) is drawn from each of the male and female
/// groups; whatever is still missing — odd targets, thin gender groups,
/// untagged or `other` participants — is backfilled from the remaining pool.
/// Balance is best-effort only: with `count` candidates or fewer, everyone is
/// selected regardless of gender.
pub(crate) fn select_with_gender_preference<'a>(
    candidates: &[&'a Participant],
    count: usize,
    rng: &mut impl Rng,
) -> Vec<&'a Participant> {
    if count == 0 {
        return Vec::new();
    }
    if candidates.len() <= count {
        let mut all = candidates.to_vec();
        all.shuffle(rng);
        return all;
    }

    let mut males: Vec<&Participant> = candidates
        .iter()
        .filter(|p| p.gender == Some(Gender::Male))
        .copied()
        .collect();
    let mut females: Vec<&Participant> = candidates
        .iter()
        .filter(|p| p.gender == Some(Gender::Female))
        .copied()
        .collect();

    males.shuffle(rng);
    females.shuffle(rng);

    let per_gender = count / 2;
    let male_take = per_gender.min(males.len());
    let female_take = per_gender.min(females.len());

    let mut selected: Vec<&Participant> = Vec::with_capacity(count);
    selected.extend(males.drain(..male_take));
    selected.extend(females.drain(..female_take));

    let remaining = count - selected.len();
    if remaining > 0 {
        let mut rest: Vec<&Participant> = candidates
            .iter()
            .filter(|p| p.gender != Some(Gender::Male) && p.gender != Some(Gender::Female))
            .copied()
            .collect();
        rest.extend(males);
        rest.extend(females);
        rest.shuffle(rng);
        selected.extend(rest.into_iter().take(remaining));
    }

    selected.shuffle(rng);
    selected
}
