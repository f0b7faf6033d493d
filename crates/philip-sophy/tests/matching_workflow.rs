//! Integration specifications for the daily matching workflow.
//!
//! Scenarios run end to end through the public engine facade and HTTP router
//! against an in-memory document store, covering the size formula, exclusion
//! policies, confirm/repair lifecycle, and library visibility.

mod common {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use chrono::{NaiveDate, NaiveDateTime};

    use philip_sophy::matching::domain::{
        Cohort, CohortId, Gender, MatchingResult, Participant, ParticipantId,
        ReadingSubmission, SubmissionStatus,
    };
    use philip_sophy::matching::schedule::DailyQuestion;
    use philip_sophy::matching::store::{DocumentStore, StoreError};

    pub(super) fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    pub(super) fn evening_of(day: NaiveDate) -> NaiveDateTime {
        day.and_hms_opt(21, 30, 0).expect("valid time")
    }

    pub(super) fn pid(raw: &str) -> ParticipantId {
        ParticipantId(raw.to_string())
    }

    pub(super) fn cohort_id() -> CohortId {
        CohortId("cohort-7".to_string())
    }

    pub(super) const TARGET: (i32, u32, u32) = (2025, 10, 16);

    pub(super) fn target_date() -> NaiveDate {
        date(TARGET.0, TARGET.1, TARGET.2)
    }

    pub(super) fn participant(id: &str, gender: Option<Gender>) -> Participant {
        Participant {
            id: pid(id),
            cohort_id: cohort_id(),
            name: id.to_string(),
            gender,
            is_administrator: false,
            is_super_admin: false,
            is_ghost: false,
        }
    }

    pub(super) fn certified(id: &str, day: NaiveDate) -> ReadingSubmission {
        ReadingSubmission {
            participant_id: pid(id),
            cohort_id: cohort_id(),
            submission_date: day,
            status: SubmissionStatus::Approved,
            submitted_at: evening_of(day),
            answer: Some(format!("{id} on {day}")),
        }
    }

    pub(super) fn cohort() -> Cohort {
        Cohort {
            id: cohort_id(),
            start_date: date(2025, 10, 11),
            end_date: date(2025, 10, 25),
            program_start_date: None,
            profile_unlock_date: Some(date(2025, 10, 20)),
            is_active: true,
            daily_featured: Default::default(),
        }
    }

    pub(super) fn question_list() -> Vec<DailyQuestion> {
        (0..14)
            .map(|i| DailyQuestion {
                category: format!("theme-{}", i % 3),
                text: format!("What struck you in chapter {}?", i + 1),
            })
            .collect()
    }

    /// Ten certified participants (5 male / 5 female) whose prior certified
    /// day counts are 0,0,1,1,2,2,3,3,4,4, all certified on the target date.
    pub(super) fn eligible_roster_and_rows() -> (Vec<Participant>, Vec<ReadingSubmission>) {
        let histories = [0usize, 0, 1, 1, 2, 2, 3, 3, 4, 4];
        let mut roster = Vec::new();
        let mut rows = Vec::new();

        for (i, history) in histories.iter().enumerate() {
            let id = format!("e{i}");
            let gender = if i % 2 == 0 { Gender::Male } else { Gender::Female };
            roster.push(participant(&id, Some(gender)));

            rows.push(certified(&id, target_date()));
            for back in 1..=*history {
                let day = target_date() - chrono::Days::new(back as u64);
                rows.push(certified(&id, day));
            }
        }

        (roster, rows)
    }

    #[derive(Default)]
    struct StoreState {
        cohorts: HashMap<CohortId, Cohort>,
        participants: HashMap<CohortId, Vec<Participant>>,
        submissions: HashMap<CohortId, Vec<ReadingSubmission>>,
        questions: HashMap<CohortId, Vec<DailyQuestion>>,
        backups: HashMap<(CohortId, NaiveDate), MatchingResult>,
    }

    #[derive(Default)]
    pub(super) struct MemoryStore {
        inner: Mutex<StoreState>,
    }

    impl MemoryStore {
        pub(super) fn seeded(
            cohort: Cohort,
            participants: Vec<Participant>,
            submissions: Vec<ReadingSubmission>,
            questions: Vec<DailyQuestion>,
        ) -> Self {
            let store = Self::default();
            {
                let mut state = store.inner.lock().expect("store lock");
                let id = cohort.id.clone();
                state.cohorts.insert(id.clone(), cohort);
                state.participants.insert(id.clone(), participants);
                state.submissions.insert(id.clone(), submissions);
                state.questions.insert(id, questions);
            }
            store
        }

        /// Test hook: corrupt a stored date key without going through the
        /// engine's guarded write paths.
        pub(super) fn clobber_daily_featured(
            &self,
            id: &CohortId,
            day: NaiveDate,
            result: MatchingResult,
        ) {
            let mut state = self.inner.lock().expect("store lock");
            let cohort = state.cohorts.get_mut(id).expect("seeded cohort");
            cohort.daily_featured.insert(day, result);
        }
    }

    impl DocumentStore for MemoryStore {
        fn cohort(&self, id: &CohortId) -> Result<Option<Cohort>, StoreError> {
            let state = self.inner.lock().expect("store lock");
            Ok(state.cohorts.get(id).cloned())
        }

        fn participants_by_cohort(
            &self,
            id: &CohortId,
        ) -> Result<Vec<Participant>, StoreError> {
            let state = self.inner.lock().expect("store lock");
            Ok(state.participants.get(id).cloned().unwrap_or_default())
        }

        fn submissions_by_cohort(
            &self,
            id: &CohortId,
        ) -> Result<Vec<ReadingSubmission>, StoreError> {
            let state = self.inner.lock().expect("store lock");
            Ok(state.submissions.get(id).cloned().unwrap_or_default())
        }

        fn daily_questions(&self, id: &CohortId) -> Result<Vec<DailyQuestion>, StoreError> {
            let state = self.inner.lock().expect("store lock");
            Ok(state.questions.get(id).cloned().unwrap_or_default())
        }

        fn confirm_daily_featured(
            &self,
            id: &CohortId,
            day: NaiveDate,
            result: MatchingResult,
        ) -> Result<(), StoreError> {
            let mut state = self.inner.lock().expect("store lock");
            let cohort = state.cohorts.get_mut(id).ok_or(StoreError::NotFound)?;
            if cohort.daily_featured.contains_key(&day) {
                return Err(StoreError::Conflict);
            }
            cohort.daily_featured.insert(day, result);
            Ok(())
        }

        fn overwrite_daily_featured(
            &self,
            id: &CohortId,
            day: NaiveDate,
            result: MatchingResult,
        ) -> Result<(), StoreError> {
            let mut state = self.inner.lock().expect("store lock");
            let cohort = state.cohorts.get_mut(id).ok_or(StoreError::NotFound)?;
            cohort.daily_featured.insert(day, result);
            Ok(())
        }

        fn backup_result(
            &self,
            id: &CohortId,
            day: NaiveDate,
        ) -> Result<Option<MatchingResult>, StoreError> {
            let state = self.inner.lock().expect("store lock");
            Ok(state.backups.get(&(id.clone(), day)).cloned())
        }

        fn write_backup(
            &self,
            id: &CohortId,
            day: NaiveDate,
            result: MatchingResult,
        ) -> Result<(), StoreError> {
            let mut state = self.inner.lock().expect("store lock");
            let key = (id.clone(), day);
            if state.backups.contains_key(&key) {
                return Err(StoreError::Conflict);
            }
            state.backups.insert(key, result);
            Ok(())
        }
    }
}

mod engine_runs {
    use std::collections::{BTreeMap, HashSet};
    use std::sync::Arc;

    use chrono::{Days, NaiveDate};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use philip_sophy::matching::domain::{
        AiAssignment, AiMatching, Gender, MatchingResult, Participant, ParticipantId,
        RandomAssignment, RandomMatching, ReadingSubmission,
    };
    use philip_sophy::matching::engine::{
        AffinityClassifier, ClassifierError, MatchingConfig, MatchingError, ParticipantAnswer,
        ProfileMatchingEngine, ResultDefect,
    };
    use philip_sophy::matching::store::StoreError;

    use super::common::*;

    fn engine_over(store: MemoryStore) -> ProfileMatchingEngine<MemoryStore> {
        ProfileMatchingEngine::new(Arc::new(store), MatchingConfig::default())
    }

    fn seeded_engine() -> ProfileMatchingEngine<MemoryStore> {
        let (roster, rows) = eligible_roster_and_rows();
        engine_over(MemoryStore::seeded(cohort(), roster, rows, question_list()))
    }

    #[test]
    fn random_run_follows_the_size_formula() {
        let engine = seeded_engine();
        let mut rng = StdRng::seed_from_u64(11);

        let report = engine
            .preview_random(&cohort_id(), target_date(), &mut rng)
            .expect("run succeeds");

        assert_eq!(report.eligible_count, 10);
        let MatchingResult::Random(matching) = &report.result else {
            panic!("expected random result");
        };
        assert_eq!(matching.assignments.len(), 10);

        // Histories 0..4 with offset 1 give targets 2,4,6,8,10; the pool of
        // 9 other participants caps the largest books at 9.
        let expected = [2usize, 2, 4, 4, 6, 6, 8, 8, 9, 9];
        for (i, expected_len) in expected.iter().enumerate() {
            let id = pid(&format!("e{i}"));
            let assignment = matching.assignments.get(&id).expect("assignment exists");
            assert_eq!(assignment.assigned.len(), *expected_len, "participant e{i}");

            assert!(!assignment.assigned.contains(&id), "no self-assignment");
            let unique: HashSet<&ParticipantId> = assignment.assigned.iter().collect();
            assert_eq!(unique.len(), assignment.assigned.len(), "no duplicates");
        }

        // Only the two pool-limited participants fall short.
        assert_eq!(report.shortfalls.len(), 2);
        assert!(report
            .shortfalls
            .iter()
            .all(|s| s.target == 10 && s.assigned == 9));
    }

    #[test]
    fn random_run_is_deterministic_under_a_fixed_seed() {
        let first = seeded_engine()
            .preview_random(&cohort_id(), target_date(), &mut StdRng::seed_from_u64(42))
            .expect("first run");
        let second = seeded_engine()
            .preview_random(&cohort_id(), target_date(), &mut StdRng::seed_from_u64(42))
            .expect("second run");

        assert_eq!(first.result, second.result);
    }

    #[test]
    fn random_books_prefer_gender_balance() {
        let engine = seeded_engine();
        let report = engine
            .preview_random(&cohort_id(), target_date(), &mut StdRng::seed_from_u64(3))
            .expect("run succeeds");

        let MatchingResult::Random(matching) = &report.result else {
            panic!("expected random result");
        };

        // e4 has history 2 -> a book of 6 from a 5m/5f pool minus self.
        let assignment = matching.assignments.get(&pid("e4")).expect("assignment");
        let males = assignment
            .assigned
            .iter()
            .filter(|id| id.0.trim_start_matches('e').parse::<usize>().expect("idx") % 2 == 0)
            .count();
        assert_eq!(assignment.assigned.len(), 6);
        assert_eq!(males, 3);
    }

    #[test]
    fn too_few_certified_participants_abort_the_run() {
        let roster = vec![
            participant("p1", Some(Gender::Male)),
            participant("p2", Some(Gender::Female)),
            participant("p3", Some(Gender::Male)),
        ];
        let rows = vec![
            certified("p1", target_date()),
            certified("p2", target_date()),
            certified("p3", target_date()),
        ];
        let engine = engine_over(MemoryStore::seeded(cohort(), roster, rows, question_list()));

        let error = engine
            .preview_random(&cohort_id(), target_date(), &mut StdRng::seed_from_u64(1))
            .expect_err("run must abort");
        assert!(matches!(
            error,
            MatchingError::InsufficientParticipants {
                found: 3,
                required: 4
            }
        ));
    }

    #[test]
    fn random_policy_keeps_plain_admins_but_drops_super_admins_and_ghosts() {
        let (mut roster, mut rows) = eligible_roster_and_rows();

        let mut admin = participant("adm", Some(Gender::Male));
        admin.is_administrator = true;
        let mut super_admin = participant("sa", Some(Gender::Female));
        super_admin.is_super_admin = true;
        let mut ghost = participant("gh", Some(Gender::Male));
        ghost.is_ghost = true;
        roster.extend([admin, super_admin, ghost]);
        rows.extend([
            certified("adm", target_date()),
            certified("sa", target_date()),
            certified("gh", target_date()),
        ]);

        let engine = engine_over(MemoryStore::seeded(cohort(), roster, rows, question_list()));
        let report = engine
            .preview_random(&cohort_id(), target_date(), &mut StdRng::seed_from_u64(5))
            .expect("run succeeds");

        let MatchingResult::Random(matching) = &report.result else {
            panic!("expected random result");
        };
        assert!(matching.assignments.contains_key(&pid("adm")));
        assert!(!matching.assignments.contains_key(&pid("sa")));
        assert!(!matching.assignments.contains_key(&pid("gh")));

        for assignment in matching.assignments.values() {
            assert!(!assignment.assigned.contains(&pid("sa")));
            assert!(!assignment.assigned.contains(&pid("gh")));
        }
    }

    #[test]
    fn uncertified_participants_never_enter_the_pool() {
        let (mut roster, rows) = eligible_roster_and_rows();
        // On the roster, never certified on the target date.
        roster.push(participant("lurker", Some(Gender::Female)));

        let engine = engine_over(MemoryStore::seeded(cohort(), roster, rows, question_list()));
        let report = engine
            .preview_random(&cohort_id(), target_date(), &mut StdRng::seed_from_u64(8))
            .expect("run succeeds");

        let MatchingResult::Random(matching) = &report.result else {
            panic!("expected random result");
        };
        assert!(!matching.assignments.contains_key(&pid("lurker")));
        for assignment in matching.assignments.values() {
            assert!(!assignment.assigned.contains(&pid("lurker")));
        }
    }

    fn four_person_roster() -> (Vec<Participant>, Vec<ReadingSubmission>) {
        let roster = vec![
            participant("p1", Some(Gender::Male)),
            participant("p2", Some(Gender::Female)),
            participant("p3", Some(Gender::Male)),
            participant("p4", Some(Gender::Female)),
        ];
        let rows = roster
            .iter()
            .map(|p| certified(&p.id.0, target_date()))
            .collect();
        (roster, rows)
    }

    fn yesterdays_book_for_p1() -> (NaiveDate, MatchingResult) {
        let yesterday = target_date() - Days::new(1);
        let mut assignments = BTreeMap::new();
        assignments.insert(
            pid("p1"),
            RandomAssignment {
                assigned: vec![pid("p2")],
            },
        );
        (
            yesterday,
            MatchingResult::Random(RandomMatching { assignments }),
        )
    }

    #[test]
    fn recently_seen_ids_are_avoided_when_the_pool_allows() {
        let (roster, rows) = four_person_roster();
        let mut cohort = cohort();
        let (yesterday, stored) = yesterdays_book_for_p1();
        cohort.daily_featured.insert(yesterday, stored);

        let engine = engine_over(MemoryStore::seeded(cohort, roster, rows, question_list()));

        // p1 wants 2 and the fresh pool {p3, p4} covers it, so p2 (received
        // yesterday) must never reappear, whatever the draw.
        for seed in 0..20 {
            let report = engine
                .preview_random(&cohort_id(), target_date(), &mut StdRng::seed_from_u64(seed))
                .expect("run succeeds");
            let MatchingResult::Random(matching) = &report.result else {
                panic!("expected random result");
            };
            let book = matching.assignments.get(&pid("p1")).expect("assignment");
            assert_eq!(book.assigned.len(), 2, "seed {seed}");
            assert!(
                !book.assigned.contains(&pid("p2")),
                "seed {seed}: p2 was seen yesterday and must be avoided"
            );
        }
    }

    #[test]
    fn recent_avoidance_yields_rather_than_shrinking_the_book() {
        let (roster, mut rows) = four_person_roster();
        let mut cohort = cohort();
        let (yesterday, stored) = yesterdays_book_for_p1();
        cohort.daily_featured.insert(yesterday, stored);
        // A prior certified day raises p1's target to 4, beyond the fresh
        // pool of 2, so the full candidate set is used instead.
        rows.push(certified("p1", yesterday));

        let engine = engine_over(MemoryStore::seeded(cohort, roster, rows, question_list()));
        let report = engine
            .preview_random(&cohort_id(), target_date(), &mut StdRng::seed_from_u64(7))
            .expect("run succeeds");

        let MatchingResult::Random(matching) = &report.result else {
            panic!("expected random result");
        };
        let book = matching.assignments.get(&pid("p1")).expect("assignment");
        assert_eq!(book.assigned.len(), 3);
        assert!(book.assigned.contains(&pid("p2")));
        assert!(report
            .shortfalls
            .iter()
            .any(|s| s.participant == pid("p1") && s.target == 4 && s.assigned == 3));
    }

    #[test]
    fn scheduled_matching_stops_once_profiles_unlock() {
        let (roster, rows) = eligible_roster_and_rows();
        let mut unlocked = cohort();
        unlocked.profile_unlock_date = Some(target_date());
        let engine = engine_over(MemoryStore::seeded(unlocked, roster, rows, question_list()));

        let error = engine
            .preview_random(&cohort_id(), target_date(), &mut StdRng::seed_from_u64(4))
            .expect_err("unlock supersedes matching");
        assert!(matches!(error, MatchingError::ProfilesUnlocked { .. }));
    }

    #[test]
    fn audit_flags_legacy_shaped_results() {
        let engine = seeded_engine();

        let mut assignments = BTreeMap::new();
        assignments.insert(
            pid("e0"),
            AiAssignment {
                similar: [pid("e1"), pid("e2")],
                opposite: [pid("e3"), pid("e4")],
            },
        );
        engine.store().clobber_daily_featured(
            &cohort_id(),
            target_date(),
            MatchingResult::Ai(AiMatching { assignments }),
        );

        let defects = engine
            .audit_stored(&cohort_id(), target_date())
            .expect("audit succeeds");
        assert_eq!(defects, vec![ResultDefect::LegacyShape]);
    }

    #[test]
    fn confirm_rejects_a_second_result_for_the_same_date() {
        let engine = seeded_engine();
        let report = engine
            .preview_random(&cohort_id(), target_date(), &mut StdRng::seed_from_u64(2))
            .expect("run succeeds");

        engine
            .confirm(&cohort_id(), target_date(), report.result.clone())
            .expect("first confirm succeeds");

        let error = engine
            .confirm(&cohort_id(), target_date(), report.result)
            .expect_err("second confirm must fail");
        assert!(matches!(error, MatchingError::Store(StoreError::Conflict)));
    }

    #[test]
    fn confirm_accepts_pool_limited_shortfall_books() {
        let engine = seeded_engine();
        let report = engine
            .preview_random(&cohort_id(), target_date(), &mut StdRng::seed_from_u64(11))
            .expect("run succeeds");
        // e8/e9 want 10 from a pool of 9, so their books are odd-length.
        assert_eq!(report.shortfalls.len(), 2);

        engine
            .confirm(&cohort_id(), target_date(), report.result)
            .expect("shortfall output must persist");

        // Audit still surfaces the odd lengths for review.
        let defects = engine
            .audit_stored(&cohort_id(), target_date())
            .expect("audit succeeds");
        assert_eq!(
            defects
                .iter()
                .filter(|d| matches!(d, ResultDefect::OddAssignmentCount { len: 9, .. }))
                .count(),
            2
        );
    }

    #[test]
    fn confirm_refuses_structurally_corrupt_results() {
        let engine = seeded_engine();

        let mut assignments = BTreeMap::new();
        assignments.insert(
            pid("e0"),
            RandomAssignment {
                assigned: vec![pid("e0"), pid("e1")],
            },
        );
        let corrupt = MatchingResult::Random(RandomMatching { assignments });

        let error = engine
            .confirm(&cohort_id(), target_date(), corrupt)
            .expect_err("corrupt result rejected");
        assert!(matches!(error, MatchingError::CorruptResult { .. }));
    }

    #[test]
    fn repair_restores_the_confirmed_backup() {
        let engine = seeded_engine();
        let report = engine
            .preview_random(&cohort_id(), target_date(), &mut StdRng::seed_from_u64(6))
            .expect("run succeeds");
        engine
            .confirm(&cohort_id(), target_date(), report.result.clone())
            .expect("confirm succeeds");

        // Simulate a bad migration clobbering the stored entry.
        let mut assignments = BTreeMap::new();
        assignments.insert(
            pid("e0"),
            RandomAssignment {
                assigned: vec![pid("e0"), pid("e1"), pid("e1")],
            },
        );
        engine.store().clobber_daily_featured(
            &cohort_id(),
            target_date(),
            MatchingResult::Random(RandomMatching { assignments }),
        );

        let defects = engine
            .audit_stored(&cohort_id(), target_date())
            .expect("audit succeeds");
        assert!(defects.contains(&ResultDefect::SelfAssignment {
            participant: pid("e0")
        }));
        assert!(defects.contains(&ResultDefect::DuplicateAssignment {
            participant: pid("e0")
        }));

        let restored = engine
            .overwrite_from_backup(&cohort_id(), target_date())
            .expect("repair succeeds");
        assert_eq!(restored, report.result);

        // The corruption is gone; only the pool-limited odd books remain
        // flagged, and those are review notes rather than damage.
        let defects = engine
            .audit_stored(&cohort_id(), target_date())
            .expect("audit succeeds");
        assert!(defects
            .iter()
            .all(|defect| matches!(defect, ResultDefect::OddAssignmentCount { .. })));
    }

    #[test]
    fn repair_without_a_backup_is_an_error() {
        let engine = seeded_engine();
        let error = engine
            .overwrite_from_backup(&cohort_id(), target_date())
            .expect_err("no backup exists");
        assert!(matches!(error, MatchingError::BackupMissing { .. }));
    }

    /// Pairs each participant with the first available male and female other
    /// than themselves, which always satisfies the balance rule.
    struct BalancedClassifier;

    impl AffinityClassifier for BalancedClassifier {
        fn classify(
            &self,
            _question: &str,
            answers: &[ParticipantAnswer],
        ) -> Result<AiMatching, ClassifierError> {
            let males: Vec<&ParticipantId> = answers
                .iter()
                .filter(|a| a.gender == Some(Gender::Male))
                .map(|a| &a.participant_id)
                .collect();
            let females: Vec<&ParticipantId> = answers
                .iter()
                .filter(|a| a.gender == Some(Gender::Female))
                .map(|a| &a.participant_id)
                .collect();

            let mut assignments = BTreeMap::new();
            for answer in answers {
                let viewer = &answer.participant_id;
                let mut other_males = males.iter().copied().filter(|id| *id != viewer);
                let mut other_females = females.iter().copied().filter(|id| *id != viewer);
                let (Some(m1), Some(m2)) = (other_males.next(), other_males.next()) else {
                    return Err(ClassifierError::Malformed("male pool exhausted".into()));
                };
                let (Some(f1), Some(f2)) = (other_females.next(), other_females.next()) else {
                    return Err(ClassifierError::Malformed("female pool exhausted".into()));
                };
                assignments.insert(
                    viewer.clone(),
                    AiAssignment {
                        similar: [m1.clone(), f1.clone()],
                        opposite: [m2.clone(), f2.clone()],
                    },
                );
            }
            Ok(AiMatching { assignments })
        }
    }

    /// Returns everyone's similar pair as two males.
    struct LopsidedClassifier;

    impl AffinityClassifier for LopsidedClassifier {
        fn classify(
            &self,
            _question: &str,
            answers: &[ParticipantAnswer],
        ) -> Result<AiMatching, ClassifierError> {
            let males: Vec<&ParticipantId> = answers
                .iter()
                .filter(|a| a.gender == Some(Gender::Male))
                .map(|a| &a.participant_id)
                .collect();

            let mut assignments = BTreeMap::new();
            for answer in answers {
                let viewer = &answer.participant_id;
                let mut pool = males.iter().copied().filter(|id| *id != viewer);
                let (Some(m1), Some(m2)) = (pool.next(), pool.next()) else {
                    return Err(ClassifierError::Malformed("male pool exhausted".into()));
                };
                assignments.insert(
                    viewer.clone(),
                    AiAssignment {
                        similar: [m1.clone(), m2.clone()],
                        opposite: [m1.clone(), m2.clone()],
                    },
                );
            }
            Ok(AiMatching { assignments })
        }
    }

    #[test]
    fn ai_run_accepts_a_balanced_pairing() {
        let engine = seeded_engine();
        let report = engine
            .preview_ai(&cohort_id(), target_date(), &BalancedClassifier)
            .expect("run succeeds");

        assert_eq!(report.result.version_label(), "ai");
        assert!(report.shortfalls.is_empty());
    }

    #[test]
    fn ai_run_rejects_unbalanced_pairings() {
        let engine = seeded_engine();
        let error = engine
            .preview_ai(&cohort_id(), target_date(), &LopsidedClassifier)
            .expect_err("unbalanced pairing rejected");

        match error {
            MatchingError::UnbalancedResult { pairs } => assert!(!pairs.is_empty()),
            other => panic!("expected unbalanced result, got {other:?}"),
        }
    }

    #[test]
    fn ai_run_requires_gender_tags_on_the_whole_roster() {
        let (mut roster, mut rows) = eligible_roster_and_rows();
        roster.push(participant("untagged", None));
        rows.push(certified("untagged", target_date()));

        let engine = engine_over(MemoryStore::seeded(cohort(), roster, rows, question_list()));
        let error = engine
            .preview_ai(&cohort_id(), target_date(), &BalancedClassifier)
            .expect_err("untagged roster rejected");
        assert!(matches!(error, MatchingError::Roster(_)));
    }

    #[test]
    fn ai_policy_excludes_plain_administrators() {
        let (mut roster, mut rows) = eligible_roster_and_rows();
        let mut admin = participant("adm", Some(Gender::Male));
        admin.is_administrator = true;
        roster.push(admin);
        rows.push(certified("adm", target_date()));

        let engine = engine_over(MemoryStore::seeded(cohort(), roster, rows, question_list()));
        let report = engine
            .preview_ai(&cohort_id(), target_date(), &BalancedClassifier)
            .expect("run succeeds");

        let MatchingResult::Ai(matching) = &report.result else {
            panic!("expected ai result");
        };
        assert!(!matching.assignments.contains_key(&pid("adm")));
    }
}

mod routing {
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::{header::CONTENT_TYPE, Request, StatusCode};
    use axum::Router;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use philip_sophy::matching::engine::{MatchingConfig, ProfileMatchingEngine};
    use philip_sophy::matching::router::{matching_router, MatchingApi};

    use super::common::*;

    fn app() -> Router {
        let (roster, rows) = eligible_roster_and_rows();
        let store = MemoryStore::seeded(cohort(), roster, rows, question_list());
        let engine = ProfileMatchingEngine::new(Arc::new(store), MatchingConfig::default());
        matching_router(Arc::new(MatchingApi::new(engine, None)))
    }

    fn post(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .expect("request builds")
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder()
            .method("GET")
            .uri(uri)
            .body(Body::empty())
            .expect("request builds")
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body reads");
        serde_json::from_slice(&bytes).expect("body is json")
    }

    fn run_body(seed: u64) -> Value {
        json!({
            "cohort_id": "cohort-7",
            "target_date": "2025-10-16",
            "seed": seed,
        })
    }

    #[tokio::test]
    async fn run_endpoint_returns_a_report() {
        let response = app()
            .oneshot(post("/api/v1/matching/run", run_body(11)))
            .await
            .expect("router responds");
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(response).await;
        assert_eq!(body["eligible_count"], 10);
        assert_eq!(body["result"]["matchingVersion"], "random");
        assert_eq!(body["shortfalls"].as_array().expect("array").len(), 2);
    }

    #[tokio::test]
    async fn run_endpoint_is_reproducible_with_a_seed() {
        let app = app();
        let first = body_json(
            app.clone()
                .oneshot(post("/api/v1/matching/run", run_body(42)))
                .await
                .expect("router responds"),
        )
        .await;
        let second = body_json(
            app.oneshot(post("/api/v1/matching/run", run_body(42)))
                .await
                .expect("router responds"),
        )
        .await;

        assert_eq!(first["result"], second["result"]);
    }

    #[tokio::test]
    async fn run_endpoint_rejects_unknown_cohorts() {
        let body = json!({
            "cohort_id": "nope",
            "target_date": "2025-10-16",
        });
        let response = app()
            .oneshot(post("/api/v1/matching/run", body))
            .await
            .expect("router responds");
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn run_endpoint_rejects_ai_without_a_classifier() {
        let body = json!({
            "cohort_id": "cohort-7",
            "policy": "ai",
            "target_date": "2025-10-16",
        });
        let response = app()
            .oneshot(post("/api/v1/matching/run", body))
            .await
            .expect("router responds");
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn confirm_endpoint_conflicts_on_the_second_write() {
        let app = app();
        let report = body_json(
            app.clone()
                .oneshot(post("/api/v1/matching/run", run_body(7)))
                .await
                .expect("router responds"),
        )
        .await;

        let confirm = json!({
            "cohort_id": "cohort-7",
            "date": "2025-10-16",
            "result": report["result"],
        });

        let first = app
            .clone()
            .oneshot(post("/api/v1/matching/confirm", confirm.clone()))
            .await
            .expect("router responds");
        assert_eq!(first.status(), StatusCode::OK);

        let second = app
            .oneshot(post("/api/v1/matching/confirm", confirm))
            .await
            .expect("router responds");
        assert_eq!(second.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn repair_endpoint_restores_the_backup() {
        let app = app();
        let report = body_json(
            app.clone()
                .oneshot(post("/api/v1/matching/run", run_body(9)))
                .await
                .expect("router responds"),
        )
        .await;

        let confirm = json!({
            "cohort_id": "cohort-7",
            "date": "2025-10-16",
            "result": report["result"],
        });
        let confirmed = app
            .clone()
            .oneshot(post("/api/v1/matching/confirm", confirm))
            .await
            .expect("router responds");
        assert_eq!(confirmed.status(), StatusCode::OK);

        let repair = json!({ "cohort_id": "cohort-7", "date": "2025-10-16" });
        let repaired = app
            .oneshot(post("/api/v1/matching/repair", repair))
            .await
            .expect("router responds");
        assert_eq!(repaired.status(), StatusCode::OK);

        let body = body_json(repaired).await;
        assert_eq!(body["status"], "repaired");
        assert_eq!(body["matchingVersion"], "random");
    }

    #[tokio::test]
    async fn repair_endpoint_404s_without_a_backup() {
        let repair = json!({ "cohort_id": "cohort-7", "date": "2025-10-16" });
        let response = app()
            .oneshot(post("/api/v1/matching/repair", repair))
            .await
            .expect("router responds");
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn library_endpoint_serves_the_confirmed_assignment() {
        let app = app();
        let report = body_json(
            app.clone()
                .oneshot(post("/api/v1/matching/run", run_body(13)))
                .await
                .expect("router responds"),
        )
        .await;
        let expected = report["result"]["assignments"]["e0"]["assigned"].clone();

        let confirm = json!({
            "cohort_id": "cohort-7",
            "date": "2025-10-16",
            "result": report["result"],
        });
        app.clone()
            .oneshot(post("/api/v1/matching/confirm", confirm))
            .await
            .expect("router responds");

        let response = app
            .oneshot(get("/api/v1/library/cohort-7/e0?today=2025-10-16"))
            .await
            .expect("router responds");
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(response).await;
        assert_eq!(body["visibility"], "restricted");
        assert_eq!(body["profiles"], expected);
    }

    #[tokio::test]
    async fn library_endpoint_is_empty_for_uncertified_viewers() {
        let response = app()
            // e0 certified on the 16th but not the 17th.
            .oneshot(get("/api/v1/library/cohort-7/e0?today=2025-10-17"))
            .await
            .expect("router responds");
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(response).await;
        assert_eq!(body["profiles"].as_array().expect("array").len(), 0);
    }

    #[tokio::test]
    async fn library_endpoint_opens_fully_after_the_program_ends() {
        let response = app()
            .oneshot(get("/api/v1/library/cohort-7/e0?today=2025-10-25"))
            .await
            .expect("router responds");
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(response).await;
        assert_eq!(body["visibility"], "fully_open");
        // Everyone on the roster except the viewer.
        assert_eq!(body["profiles"].as_array().expect("array").len(), 9);
    }

    #[tokio::test]
    async fn question_endpoint_wraps_the_schedule() {
        let app = app();

        // Day 5 of the program (start 2025-10-11).
        let response = app
            .clone()
            .oneshot(get("/api/v1/questions/cohort-7?date=2025-10-16"))
            .await
            .expect("router responds");
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["text"], "What struck you in chapter 6?");

        // Day 15 wraps back to the second question of the 14-entry schedule.
        let wrapped = body_json(
            app.oneshot(get("/api/v1/questions/cohort-7?date=2025-10-26"))
                .await
                .expect("router responds"),
        )
        .await;
        assert_eq!(wrapped["text"], "What struck you in chapter 2?");
    }
}
