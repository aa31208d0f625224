//! Property tests for the aggregate and filter laws that must hold for any
//! snapshot, not just the hand-written fixtures in the module tests.

use proptest::prelude::*;
use std::collections::{BTreeSet, HashMap, HashSet};

use crate::calc::{
    compute_class_performance, compute_class_subject_averages, compute_failing_students,
    compute_stats_report, ReportOptions,
};
use crate::filter::{filter_records, RecordFilters};
use crate::model::{
    EntityId, Grade, Snapshot, Student, Subject, Teacher, MAX_GRADE, MAX_QUARTER, MIN_GRADE,
    MIN_QUARTER,
};

const CLASSES: [&str; 3] = ["9A", "9B", "10A"];
const NAMES: [&str; 4] = ["Ivanov Ivan", "Petrova Anna", "Sidorov Oleg", "Kim Vera"];
const SUBJECTS: [&str; 6] = ["Math", "Art", "Physics", "Math", "History", "Biology"];

// Grades may point at student and subject ids that are not in the snapshot.
prop_compose! {
    fn arb_snapshot()(
        classes in prop::collection::vec(0usize..CLASSES.len(), 0..8),
        teacher_count in 0usize..4,
        subject_count in 0usize..=SUBJECTS.len(),
        grades in prop::collection::vec(
            (1i64..10, 10i64..17, MIN_GRADE..=MAX_GRADE, MIN_QUARTER..=MAX_QUARTER),
            0..40,
        ),
    ) -> Snapshot {
        let students = classes
            .iter()
            .enumerate()
            .map(|(i, c)| Student {
                id: i as EntityId + 1,
                full_name: NAMES[i % NAMES.len()].to_string(),
                class_name: CLASSES[*c].to_string(),
            })
            .collect();
        let teachers = (0..teacher_count)
            .map(|i| Teacher {
                id: i as EntityId + 1,
                full_name: NAMES[i % NAMES.len()].to_string(),
                room_number: format!("{}", 100 + i),
            })
            .collect();
        let subjects = SUBJECTS[..subject_count]
            .iter()
            .enumerate()
            .map(|(i, name)| Subject {
                id: i as EntityId + 10,
                name: name.to_string(),
            })
            .collect();
        let grades = grades
            .into_iter()
            .enumerate()
            .filter_map(|(i, (student_id, subject_id, value, quarter))| {
                Grade::new(i as EntityId + 1, student_id, subject_id, value, quarter).ok()
            })
            .collect();
        Snapshot::new(students, teachers, subjects, grades)
    }
}

prop_compose! {
    fn arb_filters()(
        student_id in prop::option::of(1i64..10),
        subject_id in prop::option::of(10i64..17),
        class_name in prop::option::of(prop::sample::select(CLASSES.to_vec())),
        name_contains in prop::option::of("[a-vA-V]{1,2}"),
        quarter in prop::option::of(1u8..=4),
    ) -> RecordFilters {
        RecordFilters {
            student_id,
            subject_id,
            class_name: class_name.map(String::from),
            name_contains,
            quarter,
        }
    }
}

proptest! {
    #[test]
    fn empty_filters_return_every_collection_unchanged(snap in arb_snapshot()) {
        let none = RecordFilters::default();
        prop_assert_eq!(filter_records(snap.students(), &none), snap.students().to_vec());
        prop_assert_eq!(filter_records(snap.teachers(), &none), snap.teachers().to_vec());
        prop_assert_eq!(filter_records(snap.subjects(), &none), snap.subjects().to_vec());
        prop_assert_eq!(filter_records(snap.grades(), &none), snap.grades().to_vec());
    }

    #[test]
    fn filtered_records_keep_source_order(snap in arb_snapshot(), filters in arb_filters()) {
        let students = filter_records(snap.students(), &filters);
        let expected: Vec<Student> = snap
            .students()
            .iter()
            .filter(|s| filters.matches(*s))
            .cloned()
            .collect();
        prop_assert_eq!(students, expected);

        let grades = filter_records(snap.grades(), &filters);
        let mut source = snap.grades().iter();
        for g in &grades {
            prop_assert!(filters.matches(g));
            // Each kept grade appears later in the source than the previous one.
            prop_assert!(source.any(|s| s == g));
        }
    }

    #[test]
    fn class_subject_averages_only_hold_graded_pairs(snap in arb_snapshot()) {
        let class_of: HashMap<EntityId, &str> = snap
            .students()
            .iter()
            .map(|s| (s.id, s.class_name.as_str()))
            .collect();
        let subject_ids: HashSet<EntityId> = snap.subjects().iter().map(|s| s.id).collect();
        let graded: BTreeSet<(String, EntityId)> = snap
            .grades()
            .iter()
            .filter(|g| subject_ids.contains(&g.subject_id()))
            .filter_map(|g| {
                class_of
                    .get(&g.student_id())
                    .map(|c| ((*c).to_string(), g.subject_id()))
            })
            .collect();

        let averages = compute_class_subject_averages(&snap);
        let keys: BTreeSet<(String, EntityId)> = averages
            .keys()
            .map(|k| (k.class_name.clone(), k.subject_id))
            .collect();
        prop_assert_eq!(keys, graded);
        for avg in averages.values() {
            prop_assert!(avg.grade_count > 0);
            prop_assert!(avg.average.is_finite());
            prop_assert!(avg.average >= MIN_GRADE as f64 && avg.average <= MAX_GRADE as f64);
        }
        for (_, value) in compute_class_performance(&snap) {
            prop_assert!(value >= MIN_GRADE as f64 && value <= MAX_GRADE as f64);
        }
    }

    #[test]
    fn students_without_grades_never_fail(
        snap in arb_snapshot(),
        threshold in -1.0e6f64..1.0e6,
    ) {
        let graded: HashSet<EntityId> = snap.grades().iter().map(|g| g.student_id()).collect();
        let failing = compute_failing_students(&snap, threshold).expect("finite threshold");
        for f in &failing {
            prop_assert!(graded.contains(&f.student_id));
            prop_assert!(!f.entries.is_empty());
            prop_assert!(f.entries.iter().all(|e| e.average < threshold));
        }
    }

    #[test]
    fn report_is_identical_across_runs(snap in arb_snapshot(), threshold in 2.0f64..5.5) {
        let opts = ReportOptions {
            pass_threshold: threshold,
            teacher_subjects: None,
        };
        let first = compute_stats_report(&snap, &opts).expect("report");
        let second = compute_stats_report(&snap.clone(), &opts).expect("report");
        prop_assert_eq!(
            serde_json::to_string(&first).expect("serialize"),
            serde_json::to_string(&second).expect("serialize")
        );
        prop_assert_eq!(first, second);
    }
}
