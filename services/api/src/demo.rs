use crate::infra::{load_snapshot, matching_config, InMemoryDocumentStore};
use chrono::{Days, Local, NaiveDate};
use clap::Args;
use philip_sophy::config::AppConfig;
use philip_sophy::error::AppError;
use philip_sophy::matching::domain::{
    Cohort, CohortId, Gender, MatchingResult, Participant, ParticipantId, ReadingSubmission,
    SubmissionStatus,
};
use philip_sophy::matching::engine::ProfileMatchingEngine;
use philip_sophy::matching::schedule::DailyQuestion;
use philip_sophy::matching::store::DocumentStore;
use philip_sophy::matching::unlock::resolve_visible_profiles;
use philip_sophy::matching::window;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Args, Debug)]
pub(crate) struct MatchingRunArgs {
    /// Cohort snapshot JSON file exported from the document store
    #[arg(long)]
    pub(crate) snapshot: PathBuf,
    /// Cohort to match
    #[arg(long)]
    pub(crate) cohort: String,
    /// Target date (YYYY-MM-DD); defaults to yesterday per the 2 AM window
    #[arg(long, value_parser = crate::infra::parse_date)]
    pub(crate) target_date: Option<NaiveDate>,
    /// Fixed RNG seed for a reproducible draw
    #[arg(long)]
    pub(crate) seed: Option<u64>,
    /// Confirm the result into the loaded snapshot and print the updated
    /// per-date result map
    #[arg(long)]
    pub(crate) confirm: bool,
}

#[derive(Args, Debug)]
pub(crate) struct MatchingRepairArgs {
    /// Cohort snapshot JSON file, including its backup records
    #[arg(long)]
    pub(crate) snapshot: PathBuf,
    /// Cohort to repair
    #[arg(long)]
    pub(crate) cohort: String,
    /// Date key to restore from backup (YYYY-MM-DD)
    #[arg(long, value_parser = crate::infra::parse_date)]
    pub(crate) date: NaiveDate,
}

#[derive(Args, Debug, Default)]
pub(crate) struct DemoArgs {
    /// Fixed RNG seed for the demo draw
    #[arg(long)]
    pub(crate) seed: Option<u64>,
}

fn snapshot_engine(path: &PathBuf) -> Result<ProfileMatchingEngine<InMemoryDocumentStore>, AppError> {
    let config = AppConfig::load()?;
    let store = Arc::new(InMemoryDocumentStore::default());
    store.load(load_snapshot(path)?);
    Ok(ProfileMatchingEngine::new(store, matching_config(&config.matching)))
}

pub(crate) fn run_matching_run(args: MatchingRunArgs) -> Result<(), AppError> {
    let engine = snapshot_engine(&args.snapshot)?;
    let cohort_id = CohortId(args.cohort);

    let target_date = match args.target_date {
        Some(date) => date,
        None => match window::matching_target_date(Local::now().naive_local()) {
            Some(date) => date,
            None => {
                println!(
                    "Inside the overnight grace window; pass --target-date to run anyway."
                );
                return Ok(());
            }
        },
    };

    let mut rng = match args.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    };

    let report = engine.preview_random(&cohort_id, target_date, &mut rng)?;
    println!("{}", serde_json::to_string_pretty(&report)?);

    if args.confirm {
        engine.confirm(&cohort_id, target_date, report.result)?;
        let stored = engine
            .store()
            .cohort(&cohort_id)
            .map_err(philip_sophy::matching::engine::MatchingError::Store)?;
        if let Some(cohort) = stored {
            println!("--- confirmed daily_featured map ---");
            println!("{}", serde_json::to_string_pretty(&cohort.daily_featured)?);
        }
    }

    Ok(())
}

pub(crate) fn run_matching_repair(args: MatchingRepairArgs) -> Result<(), AppError> {
    let engine = snapshot_engine(&args.snapshot)?;
    let cohort_id = CohortId(args.cohort);

    let restored = engine.overwrite_from_backup(&cohort_id, args.date)?;
    println!(
        "Restored {} result for {} on {} from backup:",
        restored.version_label(),
        cohort_id,
        args.date
    );
    println!("{}", serde_json::to_string_pretty(&restored)?);
    Ok(())
}

pub(crate) fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let config = AppConfig::load()?;
    let store = Arc::new(InMemoryDocumentStore::default());

    let start = NaiveDate::from_ymd_opt(2025, 10, 11).expect("valid date");
    let target = NaiveDate::from_ymd_opt(2025, 10, 16).expect("valid date");
    let end = NaiveDate::from_ymd_opt(2025, 10, 25).expect("valid date");
    seed_demo_cohort(&store, start, target, end);

    let engine = ProfileMatchingEngine::new(store, matching_config(&config.matching));
    let cohort_id = CohortId("demo-cohort".to_string());
    let mut rng = StdRng::seed_from_u64(args.seed.unwrap_or(2025));

    println!("=== Daily matching demo: cohort {cohort_id}, target {target} ===");
    let report = engine.preview_random(&cohort_id, target, &mut rng)?;
    println!(
        "{} certified participants entered the pool.",
        report.eligible_count
    );

    if let MatchingResult::Random(matching) = &report.result {
        for (viewer, assignment) in &matching.assignments {
            let short = report
                .shortfalls
                .iter()
                .find(|s| &s.participant == viewer)
                .map(|s| format!(" (wanted {}, pool-limited)", s.target))
                .unwrap_or_default();
            println!(
                "  {viewer}: {} profile-book(s){short}",
                assignment.assigned.len()
            );
        }
    }

    engine.confirm(&cohort_id, target, report.result.clone())?;
    println!("Confirmed and backed up for {target}.");

    match engine.confirm(&cohort_id, target, report.result) {
        Err(err) => println!("Second confirm refused as expected: {err}"),
        Ok(()) => println!("Unexpected: second confirm was accepted."),
    }

    println!("--- library visibility ---");
    let viewer = ParticipantId("d0".to_string());
    for day in [target, end] {
        let visible = resolve_visible_profiles(engine.store().as_ref(), &cohort_id, &viewer, day)?;
        println!(
            "  {viewer} on {day} [{}]: {} profile(s)",
            visible.visibility.label(),
            visible.profiles.len()
        );
    }

    Ok(())
}

/// Twelve participants (6 male / 6 female) with staggered histories, all
/// certified on the target date.
fn seed_demo_cohort(
    store: &InMemoryDocumentStore,
    start: NaiveDate,
    target: NaiveDate,
    end: NaiveDate,
) {
    let cohort = Cohort {
        id: CohortId("demo-cohort".to_string()),
        start_date: start,
        end_date: end,
        program_start_date: None,
        profile_unlock_date: Some(end - Days::new(5)),
        is_active: true,
        daily_featured: Default::default(),
    };

    let mut participants = Vec::new();
    let mut submissions = Vec::new();
    for i in 0..12u64 {
        let id = format!("d{i}");
        participants.push(Participant {
            id: ParticipantId(id.clone()),
            cohort_id: cohort.id.clone(),
            name: format!("Demo reader {i}"),
            gender: Some(if i % 2 == 0 { Gender::Male } else { Gender::Female }),
            is_administrator: false,
            is_super_admin: false,
            is_ghost: false,
        });

        for back in 0..=(i % 5) {
            let day = target - Days::new(back);
            submissions.push(ReadingSubmission {
                participant_id: ParticipantId(id.clone()),
                cohort_id: cohort.id.clone(),
                submission_date: day,
                status: SubmissionStatus::Approved,
                submitted_at: day.and_hms_opt(21, 0, 0).expect("valid time"),
                answer: Some(format!("Answer from {id} on {day}")),
            });
        }
    }

    let questions = (0..14)
        .map(|i| DailyQuestion {
            category: format!("theme-{}", i % 3),
            text: format!("Demo question {}", i + 1),
        })
        .collect();

    store.load(crate::infra::CohortSnapshot {
        cohort,
        participants,
        submissions,
        questions,
        backups: Default::default(),
    });
}
