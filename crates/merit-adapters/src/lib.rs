//! Fixture implementations of the merit external-source seams.
//!
//! Deterministic lesson catalogs, rosters, and clocks for local runs and
//! tests; production deployments substitute platform-backed implementations.

#![deny(unsafe_code)]

use chrono::{DateTime, Duration, Utc};
use merit_core::{
    ClassRoster, Clock, Lesson, LessonCatalog, Question, QuestionNode, SkillDefinition, StoreItem,
    StoreItemKind,
};
use std::collections::HashMap;
use std::sync::Mutex;

/// In-memory lesson catalog with two seeded lessons, one containing a
/// question group.
#[derive(Debug, Clone, Default)]
pub struct FixtureLessonCatalog {
    lessons: HashMap<String, Lesson>,
}

impl FixtureLessonCatalog {
    pub fn seeded() -> Self {
        let mut catalog = Self::default();
        catalog.insert(Lesson {
            id: "lesson-logic-1".to_string(),
            title: "Foundations of deduction".to_string(),
            questions: vec![
                QuestionNode::Single {
                    question: Question::new("logic-1-q1", "Which conclusion follows?"),
                },
                QuestionNode::Single {
                    question: Question::new("logic-1-q2", "Spot the contradiction."),
                },
            ],
        });
        catalog.insert(Lesson {
            id: "lesson-logic-2".to_string(),
            title: "Argument mapping".to_string(),
            questions: vec![
                QuestionNode::Single {
                    question: Question::new("logic-2-q1", "Name the premise."),
                },
                QuestionNode::Group {
                    context: "Two students debate whether the rule generalizes.".to_string(),
                    questions: vec![
                        Question::new("logic-2-q2", "Who carries the burden of proof?"),
                        Question::new("logic-2-q3", "Which counterexample settles it?"),
                    ],
                },
            ],
        });
        catalog
    }

    pub fn insert(&mut self, lesson: Lesson) {
        self.lessons.insert(lesson.id.clone(), lesson);
    }
}

impl LessonCatalog for FixtureLessonCatalog {
    fn lesson(&self, lesson_id: &str) -> Option<Lesson> {
        self.lessons.get(lesson_id).cloned()
    }
}

/// In-memory roster: class -> owning teacher plus enrolled students.
#[derive(Debug, Clone, Default)]
pub struct FixtureClassRoster {
    teachers: HashMap<String, String>,
    students: HashMap<String, Vec<String>>,
}

impl FixtureClassRoster {
    pub fn seeded() -> Self {
        let mut roster = Self::default();
        roster.add_class(
            "class-1",
            "tch-1",
            ["stu-1", "stu-2", "stu-3"].map(String::from).to_vec(),
        );
        roster
    }

    pub fn add_class(
        &mut self,
        class_id: impl Into<String>,
        teacher_id: impl Into<String>,
        students: Vec<String>,
    ) {
        let class_id = class_id.into();
        self.teachers.insert(class_id.clone(), teacher_id.into());
        self.students.insert(class_id, students);
    }
}

impl ClassRoster for FixtureClassRoster {
    fn teacher_for_class(&self, class_id: &str) -> Option<String> {
        self.teachers.get(class_id).cloned()
    }

    fn students_in_class(&self, class_id: &str) -> Vec<String> {
        self.students.get(class_id).cloned().unwrap_or_default()
    }
}

/// Settable clock for driving cooldown and streak transitions in tests and
/// local simulation.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn starting_at(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    pub fn advance(&self, delta: Duration) {
        let mut now = self.now.lock().expect("clock lock poisoned");
        *now += delta;
    }

    pub fn set(&self, instant: DateTime<Utc>) {
        let mut now = self.now.lock().expect("clock lock poisoned");
        *now = instant;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().expect("clock lock poisoned")
    }
}

/// Starter skill forest used by the service when no deployment-specific tree
/// is configured.
pub fn starter_skill_tree() -> Vec<SkillDefinition> {
    vec![
        SkillDefinition::passive("logic-1", "Logic I", 1),
        SkillDefinition::passive("logic-2", "Logic II", 3).with_parent("logic-1"),
        SkillDefinition::passive("logic-3", "Logic III", 5).with_parent("logic-2"),
        SkillDefinition::passive("rhetoric-1", "Rhetoric I", 2),
        SkillDefinition::passive("second-wind", "Second wind", 4)
            .with_parent("rhetoric-1")
            .with_cooldown_hours(24),
    ]
}

/// Starter store inventory: global cosmetics plus one teacher-scoped perk.
pub fn starter_store_items() -> Vec<StoreItem> {
    vec![
        StoreItem {
            id: "theme-dark".to_string(),
            title: "Dark theme".to_string(),
            price: 120,
            kind: StoreItemKind::Theme,
            system: true,
            owner_id: None,
            initial_stock: None,
            allow_multiple: false,
        },
        StoreItem {
            id: "frame-laurel".to_string(),
            title: "Laurel frame".to_string(),
            price: 200,
            kind: StoreItemKind::Frame,
            system: true,
            owner_id: None,
            initial_stock: None,
            allow_multiple: false,
        },
        StoreItem {
            id: "streak-freeze".to_string(),
            title: "Streak freeze".to_string(),
            price: 80,
            kind: StoreItemKind::Perk,
            system: false,
            owner_id: Some("tch-1".to_string()),
            initial_stock: None,
            allow_multiple: true,
        },
        StoreItem {
            id: "homework-pass".to_string(),
            title: "Homework pass".to_string(),
            price: 150,
            kind: StoreItemKind::Perk,
            system: false,
            owner_id: Some("tch-1".to_string()),
            initial_stock: Some(10),
            allow_multiple: true,
        },
    ]
}
