//! Core student-progression and rewards engine.
//!
//! This crate owns the progression ledger, the prerequisite-gated skill
//! graph, the artifact review pipeline, reward reconciliation, the class
//! store with redemption approval, streak continuity, and quiz session
//! derivation — with explicit invariant enforcement (no double-spend, no
//! double-reward, no unlock without prerequisites, no purchase beyond stock)
//! against interleaved asynchronous callers.

#![deny(unsafe_code)]

pub mod artifacts;
pub mod catalog;
pub mod error;
pub mod events;
pub mod ledger;
pub mod policy;
pub mod quiz;
pub mod rewards;
pub mod runtime;
pub mod skills;
pub mod sources;
pub mod storage;
pub mod streak;
pub mod types;

pub use artifacts::{
    ReviewDecision, ReviewIndex, ReviewOutcome, SocialOutcome, SubmitReceipt, Submission,
    REJECTION_FALLBACK_FEEDBACK,
};
pub use catalog::{
    CatalogEntry, ItemCatalog, PurchaseOutcome, RedemptionReviewOutcome, UseOutcome,
};
pub use error::MeritError;
pub use events::{EngineEvent, EventBus};
pub use ledger::XpGrant;
pub use policy::{LevelPolicy, ProgressionPolicy, RewardPolicy, StreakPolicy};
pub use quiz::{CorrectionOutcome, PlayQuestion, QuizMode, SessionPlan};
pub use rewards::ReconcileSummary;
pub use runtime::{MeritEngine, MeritEngineConfig, PendingReview};
pub use skills::{ActivationOutcome, SkillRegistry, UnlockOutcome};
pub use sources::{ClassRoster, Clock, Lesson, LessonCatalog, Question, QuestionNode, SystemClock};
pub use storage::{DocKind, StateMutation, StateStore, StoreConfig, StudentState};
pub use streak::{StreakRepairOutcome, StreakReport};
pub use types::{
    artifact_slot_id, Artifact, ArtifactKind, ArtifactStatus, ProgressionRecord, QuizRecord,
    Redemption, RedemptionStatus, SkillDefinition, StoreItem, StoreItemKind, StreakStatus,
    StudentSnapshot,
};
