//! End-to-end scenarios against the real back-end.
//!
//! All models are small enough to solve in seconds; the full-school run is
//! ignored by default because it needs minutes of wall time.

use plan_core::scoring::median_teacher_gaps;
use plan_core::{
    CancelToken, ProgressSink, ProgressStats, SolutionValidator, SolveContext, SolveOptions,
    Solver,
};
use solver_cp::{ChangeSet, CpScheduler};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicU32, Ordering};
use types::{
    ClassId, CourseType, Coupling, CouplingGroup, CouplingKind, CourseTrack, DomainModel, Pin,
    RoomType, SchoolClass, Slot, SoftWeights, SolverLimits, Subject, SubjectCategory, Teacher,
    TimeGrid,
};

fn subject(id: &str, category: SubjectCategory) -> Subject {
    Subject {
        id: id.into(),
        name: id.into(),
        short: id.into(),
        category,
        room_type: None,
        double_required: false,
        double_preferred: false,
        is_hauptfach: matches!(category, SubjectCategory::Hauptfach),
    }
}

fn teacher(id: &str, subjects: &[&str], deputat: u32, min: u32, max: u32) -> Teacher {
    Teacher {
        id: id.into(),
        name: id.into(),
        subjects: subjects.iter().map(|s| (*s).into()).collect(),
        deputat,
        deputat_min: min,
        deputat_max: max,
        unavailable: vec![],
        preferred_free_days: vec![],
        max_hours_per_day: 6,
        max_gaps_per_day: 2,
        max_gaps_per_week: 0,
        can_teach_sek2: false,
    }
}

fn class(id: &str, grade: u8, curriculum: &[(&str, u32)]) -> SchoolClass {
    SchoolClass {
        id: id.into(),
        grade,
        label: id.chars().last().unwrap_or('a').to_string(),
        curriculum: curriculum.iter().map(|(s, h)| ((*s).into(), *h)).collect(),
        max_period: 7,
        is_course: false,
        course_type: CourseType::None,
    }
}

fn base_model() -> DomainModel {
    DomainModel {
        time_grid: TimeGrid::default_gymnasium(),
        subjects: vec![],
        rooms: vec![],
        classes: vec![],
        teachers: vec![],
        couplings: vec![],
        course_tracks: vec![],
        pins: vec![],
        weights: SoftWeights::default(),
        limits: SolverLimits {
            time_limit_seconds: 60,
            num_workers: 1,
            seed: 7,
        },
    }
}

/// Two classes, two subjects, four teachers.
fn mini_model() -> DomainModel {
    let mut m = base_model();
    let mut ma = subject("Ma", SubjectCategory::Hauptfach);
    ma.double_preferred = true;
    let mut de = subject("De", SubjectCategory::Hauptfach);
    de.double_preferred = true;
    m.subjects = vec![ma, de];
    m.classes = vec![
        class("5a", 5, &[("Ma", 4), ("De", 4)]),
        class("5b", 5, &[("Ma", 4), ("De", 4)]),
    ];
    m.teachers = vec![
        teacher("MAA", &["Ma"], 8, 4, 10),
        teacher("MAB", &["Ma"], 8, 4, 10),
        teacher("DEA", &["De"], 8, 4, 10),
        teacher("DEB", &["De"], 8, 4, 10),
    ];
    m
}

fn solve(model: &DomainModel) -> types::Solution {
    CpScheduler::new()
        .solve(model, &SolveContext::default())
        .expect("solve failed")
}

fn assert_valid(solution: &types::Solution, model: &DomainModel) {
    let report = SolutionValidator::new().validate(solution, model);
    assert!(
        report.is_valid(),
        "validator rejected the solution: {:?}",
        report.violations
    );
}

#[test]
fn mini_school_solves_optimally() {
    let model = mini_model();
    let solution = solve(&model);

    assert!(solution.status.is_solution());
    assert_eq!(solution.entries.len(), 16);
    assert!(solution.entries.iter().all(|e| e.coupling.is_none()));
    assert_valid(&solution, &model);

    // Property 1: curriculum per (class, subject).
    let mut per_cs: BTreeMap<(&str, &str), u32> = BTreeMap::new();
    for e in &solution.entries {
        *per_cs.entry((e.class.0.as_str(), e.subject.0.as_str())).or_default() += 1;
    }
    for count in per_cs.values() {
        assert_eq!(*count, 4);
    }

    // Property 4: deputat band.
    for t in &model.teachers {
        let hours = solution.teacher_schedule(&t.id).len() as u32;
        assert!(hours >= t.deputat_min && hours <= t.deputat_max, "{}: {hours}h", t.id);
    }
}

#[test]
fn round_trip_revalidates_cleanly() {
    let model = mini_model();
    let solution = solve(&model);

    let path = std::env::temp_dir().join(format!("stundenplan-rt-{}.json", std::process::id()));
    solution.save_json(&path).unwrap();
    let loaded = types::Solution::load_json(&path).unwrap();
    std::fs::remove_file(&path).ok();

    assert_eq!(loaded.entries, solution.entries);
    let report = SolutionValidator::new().validate(&loaded, &model);
    assert_eq!(report.errors().count(), 0);
}

#[test]
fn resolve_is_deterministic() {
    let model = mini_model();
    let first = solve(&model);
    let second = solve(&model);
    assert_eq!(first.objective_value, second.objective_value);
    assert_eq!(first.entries, second.entries);
}

#[test]
fn forced_two_pass_solves() {
    let model = mini_model();
    let ctx = SolveContext {
        options: SolveOptions {
            two_pass: Some(true),
            ..SolveOptions::default()
        },
        ..SolveContext::default()
    };
    let solution = CpScheduler::new().solve(&model, &ctx).expect("two-pass solve");
    assert!(solution.status.is_solution());
    assert!(solution.config_snapshot.two_pass);
    assert_eq!(solution.entries.len(), 16);
    assert_valid(&solution, &model);
}

#[test]
fn no_soft_solve_has_no_objective() {
    let model = mini_model();
    let ctx = SolveContext {
        options: SolveOptions {
            no_soft: true,
            ..SolveOptions::default()
        },
        ..SolveContext::default()
    };
    let solution = CpScheduler::new().solve(&model, &ctx).expect("hard-only solve");
    assert!(solution.status.is_solution());
    assert_eq!(solution.objective_value, None);
    assert_valid(&solution, &model);
}

struct CountingSink(AtomicU32);

impl ProgressSink for CountingSink {
    fn on_progress(&self, _stats: &ProgressStats) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

#[test]
fn progress_sink_receives_ticks() {
    let model = mini_model();
    let sink = CountingSink(AtomicU32::new(0));
    let ctx = SolveContext {
        options: SolveOptions::default(),
        progress: Some(&sink),
        cancel: CancelToken::new(),
    };
    CpScheduler::new().solve(&model, &ctx).unwrap();
    assert!(sink.0.load(Ordering::SeqCst) > 0);
}

#[test]
fn pre_cancelled_solve_reports_cancellation() {
    let model = mini_model();
    let cancel = CancelToken::new();
    cancel.cancel();
    let ctx = SolveContext {
        options: SolveOptions::default(),
        progress: None,
        cancel,
    };
    let err = CpScheduler::new().solve(&model, &ctx).unwrap_err();
    assert_eq!(err.kind(), "cancelled");
}

/// Three weekly hours of a double-required subject give one double block
/// plus a singleton on another day.
#[test]
fn odd_double_hours_place_one_pair_and_a_stray_hour() {
    let mut model = base_model();
    let mut ph = subject("Ph", SubjectCategory::Nw);
    ph.double_required = true;
    ph.room_type = Some("physik".into());
    model.subjects = vec![ph];
    model.rooms = vec![RoomType {
        id: "physik".into(),
        display_name: "Physik-Raum".into(),
        capacity: 1,
    }];
    model.classes = vec![class("7a", 7, &[("Ph", 3)])];
    model.teachers = vec![teacher("PHY", &["Ph"], 3, 0, 6)];

    let solution = solve(&model);
    assert!(solution.status.is_solution());
    assert_eq!(solution.entries.len(), 3);
    assert_valid(&solution, &model);

    let mut by_day: BTreeMap<u8, Vec<u8>> = BTreeMap::new();
    for e in &solution.entries {
        by_day.entry(e.day).or_default().push(e.period);
        assert_eq!(e.room.as_deref(), Some("physik-1"));
    }
    let mut double_days = 0;
    let mut single_days = 0;
    for periods in by_day.values_mut() {
        periods.sort_unstable();
        match periods.as_slice() {
            [p, q] => {
                assert_eq!(*q, *p + 1, "pair must be consecutive");
                assert!([1u8, 3, 5].contains(p), "pair must start a double block");
                double_days += 1;
            }
            [_] => single_days += 1,
            other => panic!("unexpected day layout {other:?}"),
        }
    }
    assert_eq!(double_days, 1);
    assert_eq!(single_days, 1);
}

/// Six grade-7 classes share a Reli/Ethik band of three groups.
#[test]
fn coupling_blocks_all_classes_together() {
    let mut model = base_model();
    model.subjects = vec![
        subject("Rel", SubjectCategory::Gesellschaft),
        subject("Eth", SubjectCategory::Gesellschaft),
        subject("Ma", SubjectCategory::Hauptfach),
    ];
    let ids = ["7a", "7b", "7c", "7d", "7e", "7f"];
    model.classes = ids
        .iter()
        .map(|id| class(id, 7, &[("Rel", 2), ("Ma", 2)]))
        .collect();
    model.teachers = vec![
        teacher("REL1", &["Rel"], 2, 0, 6),
        teacher("REL2", &["Rel"], 2, 0, 6),
        teacher("ETH1", &["Eth"], 2, 0, 6),
        teacher("MA1", &["Ma"], 4, 0, 10),
        teacher("MA2", &["Ma"], 4, 0, 10),
        teacher("MA3", &["Ma"], 4, 0, 10),
    ];
    model.couplings = vec![Coupling {
        id: "reli_7".into(),
        kind: CouplingKind::ReliEthik,
        involved_classes: ids.iter().map(|id| (*id).into()).collect(),
        groups: vec![
            CouplingGroup { label: "evangelisch".into(), subject: "Rel".into(), hours_per_week: 2 },
            CouplingGroup { label: "katholisch".into(), subject: "Rel".into(), hours_per_week: 2 },
            CouplingGroup { label: "ethik".into(), subject: "Eth".into(), hours_per_week: 2 },
        ],
        hours_per_week: 2,
    }];

    let solution = solve(&model);
    assert!(solution.status.is_solution());
    assert_valid(&solution, &model);

    // Every class sits in the same two coupling slots, split into three
    // groups each.
    let mut slots_per_class: BTreeMap<&str, BTreeSet<(u8, u8)>> = BTreeMap::new();
    for e in solution.entries.iter().filter(|e| e.coupling.is_some()) {
        slots_per_class
            .entry(e.class.0.as_str())
            .or_default()
            .insert((e.day, e.period));
    }
    assert_eq!(slots_per_class.len(), 6);
    let reference = slots_per_class.values().next().unwrap().clone();
    assert_eq!(reference.len(), 2);
    for set in slots_per_class.values() {
        assert_eq!(*set, reference);
    }

    // The two Religion groups have two different teachers.
    for &(day, period) in &reference {
        let teachers: BTreeSet<&str> = solution
            .entries
            .iter()
            .filter(|e| e.coupling.is_some() && e.day == day && e.period == period)
            .map(|e| e.teacher.0.as_str())
            .collect();
        assert_eq!(teachers.len(), 3, "three distinct group teachers per slot");
    }
}

/// The pinned lesson must appear exactly as requested.
#[test]
fn pinned_lesson_is_honoured() {
    let mut model = mini_model();
    model.pins = vec![Pin {
        teacher: "MAA".into(),
        class: "5a".into(),
        subject: "Ma".into(),
        slot: Slot::new(0, 3),
    }];

    let solution = solve(&model);
    assert!(solution.status.is_solution());
    assert_valid(&solution, &model);
    assert!(solution.entries.iter().any(|e| {
        e.teacher.0 == "MAA" && e.class.0 == "5a" && e.subject.0 == "Ma" && e.day == 0 && e.period == 3
    }));

    // Without the pin the model solves to the same curriculum; the pin only
    // narrows the choice.
    model.pins.clear();
    let free = solve(&model);
    assert!(free.status.is_solution());
    assert_eq!(free.entries.len(), solution.entries.len());
    assert_valid(&free, &model);
}

/// Two LK courses in one track run in lock-step; Sek I stays
/// prefix-compact and only sek2-capable teachers serve the courses.
#[test]
fn course_track_runs_in_lockstep() {
    let mut model = base_model();
    model.subjects = vec![
        subject("Ma", SubjectCategory::Hauptfach),
        subject("De", SubjectCategory::Hauptfach),
    ];

    let mut lk_ma = class("12LK1", 12, &[("Ma", 5)]);
    lk_ma.is_course = true;
    lk_ma.course_type = CourseType::Lk;
    lk_ma.max_period = 10;
    let mut lk_de = class("12LK2", 12, &[("De", 5)]);
    lk_de.is_course = true;
    lk_de.course_type = CourseType::Lk;
    lk_de.max_period = 10;
    model.classes = vec![lk_ma, lk_de, class("5a", 5, &[("Ma", 4)])];

    let mut mas = teacher("MAS", &["Ma"], 5, 0, 5);
    mas.can_teach_sek2 = true;
    let mut des = teacher("DES", &["De"], 5, 0, 5);
    des.can_teach_sek2 = true;
    model.teachers = vec![mas, des, teacher("MUL", &["Ma"], 4, 0, 6)];

    model.course_tracks = vec![CourseTrack {
        id: "Q1-S1".into(),
        name: "Kursschiene 1".into(),
        course_ids: vec!["12LK1".into(), "12LK2".into()],
        hours_per_week: 5,
    }];

    let solution = solve(&model);
    assert!(solution.status.is_solution());
    assert_valid(&solution, &model);

    // Property 7: identical slot sets across the track.
    let slots_of = |id: &str| -> BTreeSet<(u8, u8)> {
        solution
            .entries
            .iter()
            .filter(|e| e.class.0 == id)
            .map(|e| (e.day, e.period))
            .collect()
    };
    let ma_slots = slots_of("12LK1");
    assert_eq!(ma_slots.len(), 5);
    assert_eq!(ma_slots, slots_of("12LK2"));

    // Courses only get sek2-capable teachers; 5a keeps its own teacher.
    for e in &solution.entries {
        match e.class.0.as_str() {
            "12LK1" => assert_eq!(e.teacher.0, "MAS"),
            "12LK2" => assert_eq!(e.teacher.0, "DES"),
            "5a" => assert_eq!(e.teacher.0, "MUL"),
            other => panic!("unexpected class {other}"),
        }
    }
}

/// Deputat minima that cannot be met; the relaxer names the deputat
/// band as the first fix.
#[test]
fn relaxer_blames_deputat_band() {
    let mut model = base_model();
    model.subjects = vec![
        subject("Ch", SubjectCategory::Nw),
        subject("Ma", SubjectCategory::Hauptfach),
    ];
    model.classes = ["7a", "7b", "7c", "7d", "7e", "7f"]
        .iter()
        .map(|id| class(id, 7, &[("Ch", 2), ("Ma", 2)]))
        .collect();
    // Chemistry demand is 12h, but the two chemists insist on 8h each.
    model.teachers = vec![
        teacher("CH1", &["Ch"], 9, 8, 10),
        teacher("CH2", &["Ch"], 9, 8, 10),
        teacher("MA1", &["Ma"], 8, 0, 10),
        teacher("MA2", &["Ma"], 8, 0, 10),
    ];

    let ctx = SolveContext {
        options: SolveOptions {
            diagnose: true,
            ..SolveOptions::default()
        },
        ..SolveContext::default()
    };
    let err = CpScheduler::new().solve(&model, &ctx).unwrap_err();
    assert_eq!(err.kind(), "infeasible_solve");
    let message = err.to_string();
    assert!(message.contains("deputat"), "hint should name deputat: {message}");
}

/// Incremental re-solve keeps the placements of untouched classes.
#[test]
fn incremental_resolve_keeps_unchanged_classes() {
    let model = mini_model();
    let previous = solve(&model);

    let mut changes = ChangeSet::default();
    changes.classes.insert(ClassId::from("5b"));
    let solution = CpScheduler::new()
        .resolve_incremental(&model, &previous, &changes, &SolveContext::default())
        .expect("incremental solve");

    assert!(solution.status.is_solution());
    assert_valid(&solution, &model);

    let pick = |s: &types::Solution| -> BTreeSet<(u8, u8, String, String)> {
        s.entries
            .iter()
            .filter(|e| e.class.0 == "5a")
            .map(|e| (e.day, e.period, e.teacher.0.clone(), e.subject.0.clone()))
            .collect()
    };
    assert_eq!(pick(&previous), pick(&solution));
}

/// Six grades with six parallel classes each. Ignored by default; run
/// with `--ignored` when you have a few minutes.
#[test]
#[ignore = "long-running full-school solve"]
fn full_school_solves() {
    let mut model = base_model();
    model.limits.time_limit_seconds = 300;
    model.limits.num_workers = 0;

    let mut de = subject("De", SubjectCategory::Hauptfach);
    de.double_preferred = true;
    let mut ma = subject("Ma", SubjectCategory::Hauptfach);
    ma.double_preferred = true;
    let mut en = subject("En", SubjectCategory::Sprache);
    en.is_hauptfach = true;
    let ek = subject("Ek", SubjectCategory::Gesellschaft);
    let ge = subject("Ge", SubjectCategory::Gesellschaft);
    let mu = subject("Mu", SubjectCategory::Musisch);
    let mut sp = subject("Sp", SubjectCategory::Sport);
    sp.room_type = Some("sport".into());
    model.subjects = vec![de, ma, en, ek, ge, mu, sp];
    model.rooms = vec![RoomType {
        id: "sport".into(),
        display_name: "Sporthalle".into(),
        capacity: 4,
    }];

    let curriculum: &[(&str, u32)] =
        &[("De", 4), ("Ma", 4), ("En", 3), ("Ek", 2), ("Ge", 2), ("Mu", 2), ("Sp", 3)];
    for grade in 5u8..=10 {
        for label in ["a", "b", "c", "d", "e", "f"] {
            model
                .classes
                .push(class(&format!("{grade}{label}"), grade, curriculum));
        }
    }

    let pool = [("De", 7), ("Ma", 7), ("En", 5), ("Ek", 4), ("Ge", 4), ("Mu", 4), ("Sp", 5)];
    for (subject_id, count) in pool {
        for i in 1..=count {
            model
                .teachers
                .push(teacher(&format!("{subject_id}{i:02}"), &[subject_id], 26, 0, 28));
        }
    }

    let solution = solve(&model);
    assert!(solution.status.is_solution());
    assert_valid(&solution, &model);
    assert!(median_teacher_gaps(&model, &solution.entries) <= 2);
}
