use crate::sources::{Lesson, QuestionNode};
use crate::types::QuizRecord;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Play mode derived from a student's persisted quiz outcome.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum QuizMode {
    /// First (or unfinished) run over the full question set, scored.
    Normal,
    /// Finished with mistakes: replay exactly the wrong questions.
    Correction,
    /// Finished clean: full set again, no scoring, no mutation.
    Review,
}

/// A flattened, playable question with its group context attached.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlayQuestion {
    pub id: String,
    pub prompt: String,
    pub group_context: Option<String>,
}

/// Question set and mode for one quiz session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionPlan {
    pub lesson_id: String,
    pub mode: QuizMode,
    pub questions: Vec<PlayQuestion>,
}

/// Flatten lesson content into playable questions, tagging each group member
/// with its parent group's context. Lesson order is preserved.
pub fn flatten_questions(lesson: &Lesson) -> Vec<PlayQuestion> {
    let mut questions = Vec::new();
    for node in &lesson.questions {
        match node {
            QuestionNode::Single { question } => questions.push(PlayQuestion {
                id: question.id.clone(),
                prompt: question.prompt.clone(),
                group_context: None,
            }),
            QuestionNode::Group {
                context,
                questions: members,
            } => {
                for question in members {
                    questions.push(PlayQuestion {
                        id: question.id.clone(),
                        prompt: question.prompt.clone(),
                        group_context: Some(context.clone()),
                    });
                }
            }
        }
    }
    questions
}

/// Derive the session plan for one lesson from the persisted record.
pub fn plan_session(record: Option<&QuizRecord>, lesson: &Lesson) -> SessionPlan {
    let full = flatten_questions(lesson);
    let (mode, questions) = match record {
        Some(rec) if rec.finished && !rec.wrong_question_ids.is_empty() => {
            let wrong = full
                .into_iter()
                .filter(|question| rec.wrong_question_ids.contains(&question.id))
                .collect();
            (QuizMode::Correction, wrong)
        }
        Some(rec) if rec.finished => (QuizMode::Review, full),
        _ => (QuizMode::Normal, full),
    };

    SessionPlan {
        lesson_id: lesson.id.clone(),
        mode,
        questions,
    }
}

/// Record a completed normal-mode run. The wrong-question set is REPLACED by
/// this run's mistakes, never merged with the previous run's.
pub fn apply_normal_completion(
    record: &mut QuizRecord,
    score: u32,
    wrong_ids: BTreeSet<String>,
    now: DateTime<Utc>,
) {
    record.highest_score = record.highest_score.max(score);
    record.finished = true;
    record.wrong_question_ids = wrong_ids;
    record.updated_at = now;
}

/// Outcome of one correction-mode answer.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", tag = "outcome")]
pub enum CorrectionOutcome {
    Corrected { remaining: usize },
    StillWrong,
    NotInSet,
}

/// Apply one correction-mode answer: a correct answer removes the question
/// from the wrong set and bumps its correction count; an incorrect answer
/// mutates nothing.
pub fn apply_correction_answer(
    record: &mut QuizRecord,
    question_id: &str,
    correct: bool,
    now: DateTime<Utc>,
) -> CorrectionOutcome {
    if !record.wrong_question_ids.contains(question_id) {
        return CorrectionOutcome::NotInSet;
    }
    if !correct {
        return CorrectionOutcome::StillWrong;
    }

    record.wrong_question_ids.remove(question_id);
    *record
        .correction_counts
        .entry(question_id.to_string())
        .or_insert(0) += 1;
    record.updated_at = now;
    CorrectionOutcome::Corrected {
        remaining: record.wrong_question_ids.len(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::Question;

    fn lesson() -> Lesson {
        Lesson {
            id: "lesson-1".to_string(),
            title: "Deduction".to_string(),
            questions: vec![
                QuestionNode::Single {
                    question: Question::new("q1", "What follows?"),
                },
                QuestionNode::Group {
                    context: "Read the passage.".to_string(),
                    questions: vec![
                        Question::new("q2", "Premise?"),
                        Question::new("q3", "Conclusion?"),
                    ],
                },
            ],
        }
    }

    #[test]
    fn flattening_tags_group_members_with_context() {
        let questions = flatten_questions(&lesson());

        assert_eq!(questions.len(), 3);
        assert_eq!(questions[0].group_context, None);
        assert_eq!(
            questions[1].group_context.as_deref(),
            Some("Read the passage.")
        );
        assert_eq!(questions[2].group_context.as_deref(), Some("Read the passage."));
    }

    #[test]
    fn missing_or_unfinished_record_yields_normal_mode() {
        let plan = plan_session(None, &lesson());
        assert_eq!(plan.mode, QuizMode::Normal);
        assert_eq!(plan.questions.len(), 3);

        let unfinished = QuizRecord::new("lesson-1", Utc::now());
        let plan = plan_session(Some(&unfinished), &lesson());
        assert_eq!(plan.mode, QuizMode::Normal);
    }

    #[test]
    fn wrong_questions_yield_correction_over_exactly_those() {
        let mut record = QuizRecord::new("lesson-1", Utc::now());
        apply_normal_completion(
            &mut record,
            60,
            BTreeSet::from(["q1".to_string(), "q3".to_string()]),
            Utc::now(),
        );

        let plan = plan_session(Some(&record), &lesson());

        assert_eq!(plan.mode, QuizMode::Correction);
        let ids: Vec<&str> = plan.questions.iter().map(|q| q.id.as_str()).collect();
        assert_eq!(ids, vec!["q1", "q3"]);
    }

    #[test]
    fn clean_finish_yields_review_over_the_full_set() {
        let mut record = QuizRecord::new("lesson-1", Utc::now());
        apply_normal_completion(&mut record, 100, BTreeSet::new(), Utc::now());

        let plan = plan_session(Some(&record), &lesson());

        assert_eq!(plan.mode, QuizMode::Review);
        assert_eq!(plan.questions.len(), 3);
    }

    #[test]
    fn highest_score_is_a_running_max_and_wrong_set_is_replaced() {
        let mut record = QuizRecord::new("lesson-1", Utc::now());
        apply_normal_completion(
            &mut record,
            80,
            BTreeSet::from(["q1".to_string()]),
            Utc::now(),
        );
        apply_normal_completion(
            &mut record,
            60,
            BTreeSet::from(["q2".to_string()]),
            Utc::now(),
        );

        assert_eq!(record.highest_score, 80);
        assert!(record.wrong_question_ids.contains("q2"));
        assert!(!record.wrong_question_ids.contains("q1"));
    }

    #[test]
    fn correct_answer_shrinks_the_set_and_counts_the_correction() {
        let mut record = QuizRecord::new("lesson-1", Utc::now());
        apply_normal_completion(
            &mut record,
            50,
            BTreeSet::from(["q1".to_string(), "q2".to_string()]),
            Utc::now(),
        );

        let outcome = apply_correction_answer(&mut record, "q1", true, Utc::now());

        assert_eq!(outcome, CorrectionOutcome::Corrected { remaining: 1 });
        assert!(!record.wrong_question_ids.contains("q1"));
        assert!(record.wrong_question_ids.contains("q2"));
        assert_eq!(record.correction_counts.get("q1"), Some(&1));
    }

    #[test]
    fn incorrect_answer_leaves_the_set_untouched() {
        let mut record = QuizRecord::new("lesson-1", Utc::now());
        apply_normal_completion(
            &mut record,
            50,
            BTreeSet::from(["q1".to_string()]),
            Utc::now(),
        );

        assert_eq!(
            apply_correction_answer(&mut record, "q1", false, Utc::now()),
            CorrectionOutcome::StillWrong
        );
        assert!(record.wrong_question_ids.contains("q1"));
        assert!(record.correction_counts.is_empty());

        assert_eq!(
            apply_correction_answer(&mut record, "q9", true, Utc::now()),
            CorrectionOutcome::NotInSet
        );
    }
}
