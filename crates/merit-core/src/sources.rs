use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single answerable question.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Question {
    pub id: String,
    pub prompt: String,
}

impl Question {
    pub fn new(id: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            prompt: prompt.into(),
        }
    }
}

/// Lesson content node: a standalone question, or a group of sub-questions
/// sharing one context passage.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum QuestionNode {
    Single { question: Question },
    Group { context: String, questions: Vec<Question> },
}

/// Read-only lesson definition consumed from the platform catalog.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Lesson {
    pub id: String,
    pub title: String,
    pub questions: Vec<QuestionNode>,
}

/// Lesson/question catalog maintained outside the engine. Lookups are local
/// and synchronous; no operation in the core performs a network round-trip.
pub trait LessonCatalog: Send + Sync {
    fn lesson(&self, lesson_id: &str) -> Option<Lesson>;
}

/// Class roster and teacher-ownership mapping, read-only from the engine's
/// point of view.
pub trait ClassRoster: Send + Sync {
    fn teacher_for_class(&self, class_id: &str) -> Option<String>;

    fn students_in_class(&self, class_id: &str) -> Vec<String>;
}

/// Wall-clock source. Every time comparison in the core (cooldowns, streak
/// continuity) goes through this seam so it can be driven in tests.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// System wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
