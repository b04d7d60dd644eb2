use crate::artifacts::{
    self, ReviewDecision, ReviewIndex, ReviewOutcome, SocialOutcome, SubmitReceipt, Submission,
};
use crate::catalog::{
    self, CatalogEntry, ItemCatalog, PurchaseOutcome, RedemptionReviewOutcome, UseOutcome,
};
use crate::error::MeritError;
use crate::events::{EngineEvent, EventBus};
use crate::ledger::{self, XpGrant};
use crate::policy::ProgressionPolicy;
use crate::quiz::{self, CorrectionOutcome, SessionPlan};
use crate::rewards::{self, ReconcileSummary};
use crate::skills::{self, ActivationOutcome, SkillRegistry, UnlockOutcome};
use crate::sources::{ClassRoster, Clock, LessonCatalog};
use crate::storage::{self, DocKind, StateMutation, StateStore, StoreConfig, StudentState};
use crate::streak::{self, StreakRepairOutcome, StreakReport};
use crate::types::{
    Artifact, ArtifactKind, ArtifactStatus, ProgressionRecord, QuizRecord, Redemption,
    RedemptionStatus, SkillDefinition, StoreItem, StreakStatus, StudentSnapshot,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::sync::Mutex as AsyncMutex;

/// Engine configuration.
#[derive(Debug, Clone, Default)]
pub struct MeritEngineConfig {
    pub storage: StoreConfig,
    pub policy: ProgressionPolicy,
}

/// Pending-review queue entry for teacher dashboards.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct PendingReview {
    pub student_id: String,
    pub artifact_id: String,
    pub kind: ArtifactKind,
    pub lesson_id: String,
    pub revision: u64,
    pub submitted_at: DateTime<Utc>,
}

/// Store plus the runtime indexes that must stay consistent with it. The
/// indexes are derived state: rebuilt on bootstrap, updated on every commit.
struct EngineState {
    store: StateStore,
    reviews: ReviewIndex,
    /// redemption id -> student id, pending entries only.
    pending_redemptions: BTreeMap<String, String>,
}

/// The progression engine: single authoritative owner of every student's
/// progression record, artifact collection, redemptions, and quiz records.
///
/// Invariant handling:
/// - Every operation holds the state lock for its whole
///   read -> compute -> persist -> commit sequence, so interleaved async
///   callers cannot observe or produce partial effects.
/// - Expected failures are value-returned outcomes; `Err` means a storage or
///   internal fault.
/// - Events are published only after the mutation they describe has been
///   committed.
pub struct MeritEngine {
    state: Arc<AsyncMutex<EngineState>>,
    skills: SkillRegistry,
    items: ItemCatalog,
    policy: ProgressionPolicy,
    lessons: Arc<dyn LessonCatalog>,
    roster: Arc<dyn ClassRoster>,
    clock: Arc<dyn Clock>,
    events: EventBus,
}

impl MeritEngine {
    /// Bootstrap the engine: validate the static registries, hydrate the
    /// store, and rebuild the runtime indexes from persisted state.
    pub async fn bootstrap(
        config: MeritEngineConfig,
        skill_definitions: Vec<SkillDefinition>,
        item_definitions: Vec<StoreItem>,
        lessons: Arc<dyn LessonCatalog>,
        roster: Arc<dyn ClassRoster>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, MeritError> {
        let skills = SkillRegistry::new(skill_definitions)?;
        let items = ItemCatalog::new(item_definitions)?;
        let store = StateStore::bootstrap(config.storage, items.initial_stock()).await?;

        let mut reviews = ReviewIndex::default();
        let mut pending_redemptions = BTreeMap::new();
        for (student_id, state) in store.students() {
            for artifact in state.artifacts.values() {
                reviews.track(student_id, artifact);
            }
            for redemption in state.redemptions.values() {
                if redemption.status == RedemptionStatus::Pending {
                    pending_redemptions.insert(redemption.id.clone(), student_id.clone());
                }
            }
        }

        Ok(Self {
            state: Arc::new(AsyncMutex::new(EngineState {
                store,
                reviews,
                pending_redemptions,
            })),
            skills,
            items,
            policy: config.policy,
            lessons,
            roster,
            clock,
            events: EventBus::default(),
        })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.events.subscribe()
    }

    pub async fn storage_backend(&self) -> String {
        self.state.lock().await.store.backend_label().to_string()
    }

    /// Create the student's progression record if absent; idempotent.
    pub async fn register_student(&self, student_id: &str) -> Result<StudentSnapshot, MeritError> {
        let mut guard = self.state.lock().await;
        if let Some(state) = guard.store.student(student_id) {
            return Ok(snapshot_of(&state.progression));
        }

        let state = StudentState::new(ProgressionRecord::new(student_id, self.clock.now()));
        let snapshot = snapshot_of(&state.progression);
        guard
            .store
            .commit(StateMutation::new(student_id, state, all_docs()))
            .await?;
        Ok(snapshot)
    }

    pub async fn snapshot(&self, student_id: &str) -> Result<StudentSnapshot, MeritError> {
        let guard = self.state.lock().await;
        let state = require(&guard, student_id)?;
        Ok(snapshot_of(&state.progression))
    }

    /// Account wipe: replace every document with a fresh state and drop the
    /// student's index entries.
    pub async fn reset_student(&self, student_id: &str) -> Result<StudentSnapshot, MeritError> {
        let mut guard = self.state.lock().await;
        if !guard.store.contains(student_id) {
            return Err(MeritError::UnknownStudent(student_id.to_string()));
        }

        let state = StudentState::new(ProgressionRecord::new(student_id, self.clock.now()));
        let snapshot = snapshot_of(&state.progression);
        guard
            .store
            .commit(StateMutation::new(student_id, state, all_docs()))
            .await?;
        guard.reviews.remove_student(student_id);
        guard
            .pending_redemptions
            .retain(|_, owner| owner != student_id);
        Ok(snapshot)
    }

    pub async fn grant_xp(&self, student_id: &str, amount: u64) -> Result<XpGrant, MeritError> {
        let mut guard = self.state.lock().await;
        let mut state = require(&guard, student_id)?;

        let grant = ledger::grant_xp(&mut state.progression, &self.policy.level, amount);
        guard
            .store
            .commit(StateMutation::new(
                student_id,
                state,
                vec![DocKind::Progression],
            ))
            .await?;
        drop(guard);

        self.emit_level_up(student_id, &grant);
        Ok(grant)
    }

    pub async fn grant_coins(&self, student_id: &str, amount: u64) -> Result<u64, MeritError> {
        let mut guard = self.state.lock().await;
        let mut state = require(&guard, student_id)?;

        ledger::grant_coins(&mut state.progression, amount);
        let balance = state.progression.coins;
        guard
            .store
            .commit(StateMutation::new(
                student_id,
                state,
                vec![DocKind::Progression],
            ))
            .await?;
        Ok(balance)
    }

    /// Guarded spend; false means insufficient funds and no mutation.
    pub async fn spend_coins(&self, student_id: &str, amount: u64) -> Result<bool, MeritError> {
        let mut guard = self.state.lock().await;
        let mut state = require(&guard, student_id)?;

        if !ledger::spend_coins(&mut state.progression, amount) {
            return Ok(false);
        }
        guard
            .store
            .commit(StateMutation::new(
                student_id,
                state,
                vec![DocKind::Progression],
            ))
            .await?;
        Ok(true)
    }

    /// Guarded spend; false means insufficient points and no mutation.
    pub async fn spend_skill_points(
        &self,
        student_id: &str,
        amount: u64,
    ) -> Result<bool, MeritError> {
        let mut guard = self.state.lock().await;
        let mut state = require(&guard, student_id)?;

        if !ledger::spend_skill_points(&mut state.progression, amount) {
            return Ok(false);
        }
        guard
            .store
            .commit(StateMutation::new(
                student_id,
                state,
                vec![DocKind::Progression],
            ))
            .await?;
        Ok(true)
    }

    pub async fn unlock_skill(
        &self,
        student_id: &str,
        skill_id: &str,
    ) -> Result<UnlockOutcome, MeritError> {
        let mut guard = self.state.lock().await;
        let mut state = require(&guard, student_id)?;

        let outcome = skills::unlock(&self.skills, &mut state.progression, skill_id);
        if matches!(outcome, UnlockOutcome::Unlocked { .. }) {
            guard
                .store
                .commit(StateMutation::new(
                    student_id,
                    state,
                    vec![DocKind::Progression],
                ))
                .await?;
        }
        Ok(outcome)
    }

    pub async fn activate_skill(
        &self,
        student_id: &str,
        skill_id: &str,
    ) -> Result<ActivationOutcome, MeritError> {
        let now = self.clock.now();
        let mut guard = self.state.lock().await;
        let mut state = require(&guard, student_id)?;

        let outcome = skills::activate(&self.skills, &mut state.progression, skill_id, now);
        if outcome == ActivationOutcome::Activated {
            guard
                .store
                .commit(StateMutation::new(
                    student_id,
                    state,
                    vec![DocKind::Progression],
                ))
                .await?;
        }
        Ok(outcome)
    }

    pub async fn save_draft(&self, submission: Submission) -> Result<SubmitReceipt, MeritError> {
        self.store_submission(submission, false).await
    }

    pub async fn submit_artifact(
        &self,
        submission: Submission,
    ) -> Result<SubmitReceipt, MeritError> {
        self.store_submission(submission, true).await
    }

    async fn store_submission(
        &self,
        submission: Submission,
        for_review: bool,
    ) -> Result<SubmitReceipt, MeritError> {
        let now = self.clock.now();
        let student_id = submission.author_id.clone();
        let mut guard = self.state.lock().await;
        let mut state = require(&guard, &student_id)?;

        let receipt = if for_review {
            artifacts::submit(&mut state.artifacts, submission, now)
        } else {
            artifacts::save_draft(&mut state.artifacts, submission, now)
        };
        let stored = state.artifacts[&receipt.artifact_id].clone();
        guard
            .store
            .commit(StateMutation::new(
                &student_id,
                state,
                vec![DocKind::Artifacts],
            ))
            .await?;
        guard.reviews.track(&student_id, &stored);
        Ok(receipt)
    }

    /// Apply a teacher's review decision, keyed to the revision the teacher
    /// saw so a mid-review resubmission cannot be silently overwritten.
    pub async fn review_artifact(
        &self,
        student_id: &str,
        artifact_id: &str,
        expected_revision: u64,
        decision: ReviewDecision,
        feedback: Option<String>,
    ) -> Result<ReviewOutcome, MeritError> {
        let now = self.clock.now();
        let mut guard = self.state.lock().await;
        let mut state = require(&guard, student_id)?;

        let outcome = artifacts::apply_review(
            &mut state.artifacts,
            artifact_id,
            expected_revision,
            decision,
            feedback,
            now,
        );
        if let ReviewOutcome::Applied { status } = outcome {
            let reviewed = state.artifacts[artifact_id].clone();
            guard
                .store
                .commit(StateMutation::new(
                    student_id,
                    state,
                    vec![DocKind::Artifacts],
                ))
                .await?;
            guard.reviews.track(student_id, &reviewed);
            drop(guard);
            self.events.emit(EngineEvent::ArtifactReviewed {
                student_id: student_id.to_string(),
                artifact_id: artifact_id.to_string(),
                status,
            });
        }
        Ok(outcome)
    }

    pub async fn like_artifact(
        &self,
        student_id: &str,
        artifact_id: &str,
        user_id: &str,
    ) -> Result<SocialOutcome, MeritError> {
        let mut guard = self.state.lock().await;
        let mut state = require(&guard, student_id)?;

        let outcome = artifacts::record_like(&mut state.artifacts, artifact_id, user_id);
        if matches!(outcome, SocialOutcome::Recorded { .. }) {
            guard
                .store
                .commit(StateMutation::new(
                    student_id,
                    state,
                    vec![DocKind::Artifacts],
                ))
                .await?;
        }
        Ok(outcome)
    }

    pub async fn vote_artifact(
        &self,
        student_id: &str,
        artifact_id: &str,
        user_id: &str,
    ) -> Result<SocialOutcome, MeritError> {
        let mut guard = self.state.lock().await;
        let mut state = require(&guard, student_id)?;

        let outcome = artifacts::record_vote(&mut state.artifacts, artifact_id, user_id);
        if matches!(outcome, SocialOutcome::Recorded { .. }) {
            guard
                .store
                .commit(StateMutation::new(
                    student_id,
                    state,
                    vec![DocKind::Artifacts],
                ))
                .await?;
        }
        Ok(outcome)
    }

    pub async fn artifact(
        &self,
        student_id: &str,
        artifact_id: &str,
    ) -> Result<Option<Artifact>, MeritError> {
        let guard = self.state.lock().await;
        let state = require(&guard, student_id)?;
        Ok(state.artifacts.get(artifact_id).cloned())
    }

    /// Sweep unclaimed verified work and new votes into the ledger.
    ///
    /// The progression credit, the claim flags, and the vote watermark are
    /// committed as one transaction; a storage fault here propagates rather
    /// than risking divergence between claimed and persisted state.
    pub async fn reconcile_rewards(
        &self,
        student_id: &str,
    ) -> Result<ReconcileSummary, MeritError> {
        let mut guard = self.state.lock().await;
        let mut state = require(&guard, student_id)?;

        let summary = rewards::reconcile(
            &mut state.progression,
            &mut state.artifacts,
            &self.policy.level,
            &self.policy.rewards,
        );
        if summary.is_zero() {
            return Ok(summary);
        }

        guard
            .store
            .commit(StateMutation::new(
                student_id,
                state,
                vec![DocKind::Progression, DocKind::Artifacts],
            ))
            .await?;
        drop(guard);

        self.events.emit(EngineEvent::RewardsReconciled {
            student_id: student_id.to_string(),
            xp_granted: summary.xp_granted,
            coins_granted: summary.coins_granted,
        });
        if let Some(grant) = &summary.level_up {
            self.emit_level_up(student_id, grant);
        }
        Ok(summary)
    }

    /// System items plus the class teacher's items, with display flags.
    pub async fn catalog_for_class(
        &self,
        class_id: &str,
        student_id: &str,
    ) -> Result<Vec<CatalogEntry>, MeritError> {
        let owner = self.roster.teacher_for_class(class_id);
        let guard = self.state.lock().await;
        let state = require(&guard, student_id)?;
        Ok(catalog::catalog_view(
            &self.items,
            guard.store.stock(),
            &state.progression,
            owner.as_deref(),
        ))
    }

    /// Purchase an item from the class store. Stock decrement and coin debit
    /// commit as one unit; on debit failure the stock is compensated and
    /// nothing persists.
    pub async fn purchase(
        &self,
        student_id: &str,
        class_id: &str,
        item_id: &str,
    ) -> Result<PurchaseOutcome, MeritError> {
        let Some(item) = self.items.get(item_id).cloned() else {
            return Ok(PurchaseOutcome::UnknownItem);
        };
        if !item.system {
            let owner = self.roster.teacher_for_class(class_id);
            if item.owner_id != owner {
                return Ok(PurchaseOutcome::NotInCatalog);
            }
        }

        let mut guard = self.state.lock().await;
        let mut state = require(&guard, student_id)?;
        let mut stock = guard.store.stock().clone();

        let outcome = catalog::apply_purchase(&item, &mut stock, &mut state.progression);
        if matches!(outcome, PurchaseOutcome::Purchased { .. }) {
            let mut mutation =
                StateMutation::new(student_id, state, vec![DocKind::Progression]);
            if item.initial_stock.is_some() {
                mutation = mutation.with_stock(stock);
            }
            guard.store.commit(mutation).await?;
        }
        Ok(outcome)
    }

    /// Use an owned item: system items equip immediately; class items consume
    /// one unit and file a pending redemption with the owning teacher.
    pub async fn use_item(
        &self,
        student_id: &str,
        item_id: &str,
    ) -> Result<UseOutcome, MeritError> {
        let Some(item) = self.items.get(item_id).cloned() else {
            return Ok(UseOutcome::NotOwned);
        };

        let now = self.clock.now();
        let mut guard = self.state.lock().await;
        let mut state = require(&guard, student_id)?;

        let outcome = catalog::apply_use(&item, &mut state.progression, &mut state.redemptions, now);
        match &outcome {
            UseOutcome::Equipped { .. } => {
                guard
                    .store
                    .commit(StateMutation::new(
                        student_id,
                        state,
                        vec![DocKind::Progression],
                    ))
                    .await?;
            }
            UseOutcome::RedemptionRequested { redemption_id } => {
                let redemption_id = redemption_id.clone();
                guard
                    .store
                    .commit(StateMutation::new(
                        student_id,
                        state,
                        vec![DocKind::Progression, DocKind::Redemptions],
                    ))
                    .await?;
                guard
                    .pending_redemptions
                    .insert(redemption_id.clone(), student_id.to_string());
                drop(guard);
                self.events.emit(EngineEvent::RedemptionRequested {
                    student_id: student_id.to_string(),
                    teacher_id: item.owner_id.clone().unwrap_or_default(),
                    redemption_id,
                    item_id: item.id.clone(),
                });
            }
            UseOutcome::NotOwned => {}
        }
        Ok(outcome)
    }

    /// Resolve a pending redemption. Rejection does not refund the consumed
    /// inventory unit.
    pub async fn review_redemption(
        &self,
        redemption_id: &str,
        approve: bool,
    ) -> Result<RedemptionReviewOutcome, MeritError> {
        let now = self.clock.now();
        let mut guard = self.state.lock().await;

        let Some(student_id) = guard.pending_redemptions.get(redemption_id).cloned() else {
            // Not pending: report the terminal status if the id exists at all.
            for (_, state) in guard.store.students() {
                if let Some(redemption) = state.redemptions.get(redemption_id) {
                    return Ok(RedemptionReviewOutcome::NotPending {
                        status: redemption.status,
                    });
                }
            }
            return Ok(RedemptionReviewOutcome::NotFound);
        };

        let mut state = require(&guard, &student_id)?;
        let outcome = catalog::review_redemption(&mut state.redemptions, redemption_id, approve, now);
        if matches!(outcome, RedemptionReviewOutcome::Applied { .. }) {
            guard
                .store
                .commit(StateMutation::new(
                    &student_id,
                    state,
                    vec![DocKind::Redemptions],
                ))
                .await?;
            guard.pending_redemptions.remove(redemption_id);
        }
        Ok(outcome)
    }

    /// Pending artifacts authored by students of the given class, via the
    /// review index (never a full scan).
    pub async fn pending_reviews(&self, class_id: &str) -> Result<Vec<PendingReview>, MeritError> {
        let students: BTreeSet<String> =
            self.roster.students_in_class(class_id).into_iter().collect();
        let guard = self.state.lock().await;

        let mut entries = Vec::new();
        for (student_id, artifact_id) in guard.reviews.with_status(ArtifactStatus::Pending) {
            if !students.contains(&student_id) {
                continue;
            }
            if let Some(artifact) = guard
                .store
                .student(&student_id)
                .and_then(|state| state.artifacts.get(&artifact_id))
            {
                entries.push(PendingReview {
                    student_id: student_id.clone(),
                    artifact_id: artifact_id.clone(),
                    kind: artifact.kind,
                    lesson_id: artifact.lesson_id.clone(),
                    revision: artifact.revision,
                    submitted_at: artifact.updated_at,
                });
            }
        }
        entries.sort_by(|a, b| a.submitted_at.cmp(&b.submitted_at));
        Ok(entries)
    }

    /// Pending redemptions addressed to the given teacher.
    pub async fn pending_redemptions(
        &self,
        teacher_id: &str,
    ) -> Result<Vec<Redemption>, MeritError> {
        let guard = self.state.lock().await;
        let mut entries = Vec::new();
        for (redemption_id, student_id) in &guard.pending_redemptions {
            if let Some(redemption) = guard
                .store
                .student(student_id)
                .and_then(|state| state.redemptions.get(redemption_id))
            {
                if redemption.teacher_id == teacher_id {
                    entries.push(redemption.clone());
                }
            }
        }
        entries.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(entries)
    }

    /// Advance streak state for a login happening now.
    pub async fn record_login(&self, student_id: &str) -> Result<StreakReport, MeritError> {
        let today = self.clock.now().date_naive();
        let mut guard = self.state.lock().await;
        let mut state = require(&guard, student_id)?;

        let was_active = state.progression.streak_status == StreakStatus::Active;
        let report = streak::observe_login(&mut state.progression, today);
        guard
            .store
            .commit(StateMutation::new(
                student_id,
                state,
                vec![DocKind::Progression],
            ))
            .await?;
        drop(guard);

        if was_active && report.status == StreakStatus::Broken {
            self.events.emit(EngineEvent::StreakBroken {
                student_id: student_id.to_string(),
                days_at_break: report.days,
            });
        }
        Ok(report)
    }

    /// Current continuity status; persists the broken flag when the gap rule
    /// newly trips (the day counter stays until the student decides).
    pub async fn streak_status(&self, student_id: &str) -> Result<StreakStatus, MeritError> {
        let today = self.clock.now().date_naive();
        let mut guard = self.state.lock().await;
        let mut state = require(&guard, student_id)?;

        let derived = streak::check_status(&state.progression, today);
        if derived != state.progression.streak_status {
            let days = state.progression.streak_days;
            state.progression.streak_status = derived;
            guard
                .store
                .commit(StateMutation::new(
                    student_id,
                    state,
                    vec![DocKind::Progression],
                ))
                .await?;
            drop(guard);
            if derived == StreakStatus::Broken {
                self.events.emit(EngineEvent::StreakBroken {
                    student_id: student_id.to_string(),
                    days_at_break: days,
                });
            }
        }
        Ok(derived)
    }

    pub async fn repair_streak(
        &self,
        student_id: &str,
    ) -> Result<StreakRepairOutcome, MeritError> {
        let today = self.clock.now().date_naive();
        let mut guard = self.state.lock().await;
        let mut state = require(&guard, student_id)?;

        let outcome = streak::repair_streak(&mut state.progression, &self.policy.streak, today);
        if matches!(outcome, StreakRepairOutcome::Repaired { .. }) {
            guard
                .store
                .commit(StateMutation::new(
                    student_id,
                    state,
                    vec![DocKind::Progression],
                ))
                .await?;
        }
        Ok(outcome)
    }

    pub async fn accept_streak_break(
        &self,
        student_id: &str,
    ) -> Result<StreakReport, MeritError> {
        let today = self.clock.now().date_naive();
        let mut guard = self.state.lock().await;
        let mut state = require(&guard, student_id)?;

        let report = streak::accept_streak_break(&mut state.progression, today);
        guard
            .store
            .commit(StateMutation::new(
                student_id,
                state,
                vec![DocKind::Progression],
            ))
            .await?;
        Ok(report)
    }

    /// Derive the play mode and question set for one lesson. `None` when the
    /// lesson is unknown to the catalog.
    pub async fn quiz_session(
        &self,
        student_id: &str,
        lesson_id: &str,
    ) -> Result<Option<SessionPlan>, MeritError> {
        let Some(lesson) = self.lessons.lesson(lesson_id) else {
            return Ok(None);
        };
        let guard = self.state.lock().await;
        let state = require(&guard, student_id)?;
        Ok(Some(quiz::plan_session(
            state.quizzes.get(lesson_id),
            &lesson,
        )))
    }

    /// Record a completed normal-mode run. Review-mode completions (already
    /// finished, nothing wrong) mutate nothing; `None` for unknown lessons.
    pub async fn complete_quiz(
        &self,
        student_id: &str,
        lesson_id: &str,
        score: u32,
        wrong_ids: BTreeSet<String>,
    ) -> Result<Option<QuizRecord>, MeritError> {
        if self.lessons.lesson(lesson_id).is_none() {
            return Ok(None);
        }

        let now = self.clock.now();
        let mut guard = self.state.lock().await;
        let mut state = require(&guard, student_id)?;

        let record = state
            .quizzes
            .entry(lesson_id.to_string())
            .or_insert_with(|| QuizRecord::new(lesson_id, now));
        if record.finished {
            // Review/correction sessions never rewrite a finished record here.
            return Ok(Some(record.clone()));
        }

        quiz::apply_normal_completion(record, score, wrong_ids, now);
        let updated = record.clone();
        guard
            .store
            .commit(StateMutation::new(
                student_id,
                state,
                vec![DocKind::Quizzes],
            ))
            .await?;
        Ok(Some(updated))
    }

    /// Apply one correction-mode answer against the persisted mistake set.
    pub async fn submit_correction(
        &self,
        student_id: &str,
        lesson_id: &str,
        question_id: &str,
        correct: bool,
    ) -> Result<CorrectionOutcome, MeritError> {
        let now = self.clock.now();
        let mut guard = self.state.lock().await;
        let mut state = require(&guard, student_id)?;

        let Some(record) = state.quizzes.get_mut(lesson_id) else {
            return Ok(CorrectionOutcome::NotInSet);
        };
        let outcome = quiz::apply_correction_answer(record, question_id, correct, now);
        if matches!(outcome, CorrectionOutcome::Corrected { .. }) {
            guard
                .store
                .commit(StateMutation::new(
                    student_id,
                    state,
                    vec![DocKind::Quizzes],
                ))
                .await?;
        }
        Ok(outcome)
    }

    fn emit_level_up(&self, student_id: &str, grant: &XpGrant) {
        if grant.leveled_up() {
            self.events.emit(EngineEvent::LevelUp {
                student_id: student_id.to_string(),
                old_level: grant.old_level,
                new_level: grant.new_level,
                coins_awarded: grant.coins_awarded,
                skill_points_awarded: grant.skill_points_awarded,
            });
        }
    }
}

fn all_docs() -> Vec<DocKind> {
    vec![
        DocKind::Progression,
        DocKind::Artifacts,
        DocKind::Redemptions,
        DocKind::Quizzes,
    ]
}

fn require(guard: &EngineState, student_id: &str) -> Result<StudentState, MeritError> {
    guard
        .store
        .student(student_id)
        .cloned()
        .ok_or_else(|| MeritError::UnknownStudent(student_id.to_string()))
}

fn snapshot_of(record: &ProgressionRecord) -> StudentSnapshot {
    let payload = serde_json::to_value(record).unwrap_or_default();
    StudentSnapshot {
        student_id: record.student_id.clone(),
        level: record.level,
        xp: record.xp,
        coins: record.coins,
        skill_points: record.skill_points,
        unlocked_skills: record.unlocked_skills.clone(),
        inventory: record.inventory.clone(),
        active_theme: record.active_theme.clone(),
        active_frame: record.active_frame.clone(),
        streak_days: record.streak_days,
        streak_status: record.streak_status,
        snapshot_hash: storage::document_hash(&payload),
    }
}
