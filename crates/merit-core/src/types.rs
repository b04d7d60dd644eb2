use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use uuid::Uuid;

/// Daily-streak continuity state.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StreakStatus {
    Active,
    Broken,
}

/// Per-student progression record: the single authoritative holder of every
/// numeric resource and equipped cosmetic.
///
/// Invariant handling:
/// - `xp` is monotonic non-decreasing; `level` only rises with it.
/// - `coins` and `skill_points` never go negative (guarded spends).
/// - `inventory` holds no zero entries.
/// - `lifetime_votes_claimed` is a high-water mark and never decreases.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProgressionRecord {
    pub student_id: String,
    pub level: u32,
    pub xp: u64,
    pub coins: u64,
    pub skill_points: u64,
    pub unlocked_skills: BTreeSet<String>,
    /// Last activation instant per active skill; part of persisted state so
    /// cooldowns survive process restarts.
    pub skill_activations: BTreeMap<String, DateTime<Utc>>,
    pub inventory: BTreeMap<String, u32>,
    pub active_theme: Option<String>,
    pub active_frame: Option<String>,
    pub streak_days: u32,
    pub streak_status: StreakStatus,
    pub last_login_date: NaiveDate,
    pub lifetime_votes_claimed: u64,
    pub created_at: DateTime<Utc>,
}

impl ProgressionRecord {
    pub fn new(student_id: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            student_id: student_id.into(),
            level: 0,
            xp: 0,
            coins: 0,
            skill_points: 0,
            unlocked_skills: BTreeSet::new(),
            skill_activations: BTreeMap::new(),
            inventory: BTreeMap::new(),
            active_theme: None,
            active_frame: None,
            streak_days: 0,
            streak_status: StreakStatus::Active,
            last_login_date: now.date_naive(),
            lifetime_votes_claimed: 0,
            created_at: now,
        }
    }

    pub fn owns(&self, item_id: &str) -> bool {
        self.inventory.contains_key(item_id)
    }

    pub fn add_inventory(&mut self, item_id: &str, count: u32) {
        if count == 0 {
            return;
        }
        *self.inventory.entry(item_id.to_string()).or_insert(0) += count;
    }

    /// Consume one unit, dropping the entry when it reaches zero.
    /// Returns false (no mutation) when the item is not held.
    pub fn take_inventory(&mut self, item_id: &str) -> bool {
        match self.inventory.get_mut(item_id) {
            Some(count) if *count > 1 => {
                *count -= 1;
                true
            }
            Some(_) => {
                self.inventory.remove(item_id);
                true
            }
            None => false,
        }
    }
}

/// Kind of student-authored submission.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    LogicMap,
    Reflection,
    QuizShort,
}

impl ArtifactKind {
    pub fn slot_key(self) -> &'static str {
        match self {
            Self::LogicMap => "logic-map",
            Self::Reflection => "reflection",
            Self::QuizShort => "quiz-short",
        }
    }
}

/// Review pipeline state. Verified and rejected are not terminal: an edited
/// resubmission returns the artifact to pending.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactStatus {
    Draft,
    Pending,
    Verified,
    Rejected,
}

/// A student-authored submission subject to teacher review.
///
/// One slot exists per student/lesson/kind; resubmission overwrites content
/// and status but carries `liked_by`/`voted_by`/`reward_claimed` forward, so
/// social history and claim state survive edits. Like/vote counts are the set
/// sizes, which keeps count and membership consistent by construction.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Artifact {
    pub id: String,
    pub kind: ArtifactKind,
    pub author_id: String,
    pub lesson_id: String,
    pub content: String,
    pub status: ArtifactStatus,
    pub feedback: Option<String>,
    pub liked_by: BTreeSet<String>,
    pub voted_by: BTreeSet<String>,
    pub reward_claimed: bool,
    /// Bumped on every submission; reviews are keyed to it so a stale review
    /// decision cannot land on a newer revision.
    pub revision: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Artifact {
    pub fn likes(&self) -> usize {
        self.liked_by.len()
    }

    pub fn votes(&self) -> usize {
        self.voted_by.len()
    }
}

/// Deterministic artifact slot id: one submission target per
/// student/lesson/kind.
pub fn artifact_slot_id(kind: ArtifactKind, lesson_id: &str, author_id: &str) -> String {
    format!("{}:{}:{}", kind.slot_key(), lesson_id, author_id)
}

/// Static definition of an unlockable skill. Skills form a forest: at most
/// one parent each, and the parent must be unlocked first.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SkillDefinition {
    pub id: String,
    pub title: String,
    pub cost: u64,
    pub parent: Option<String>,
    /// Some(hours) marks an active skill with a reuse cooldown; None is a
    /// passive skill.
    pub cooldown_hours: Option<i64>,
}

impl SkillDefinition {
    pub fn passive(id: impl Into<String>, title: impl Into<String>, cost: u64) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            cost,
            parent: None,
            cooldown_hours: None,
        }
    }

    pub fn with_parent(mut self, parent: impl Into<String>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    pub fn with_cooldown_hours(mut self, hours: i64) -> Self {
        self.cooldown_hours = Some(hours);
        self
    }
}

/// Store item slot.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StoreItemKind {
    Theme,
    Frame,
    Perk,
}

/// Static store item definition. System items are global and equip
/// immediately; non-system items are scoped to their owning teacher and go
/// through redemption approval when used. Live remaining stock is engine
/// state, not part of the definition.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StoreItem {
    pub id: String,
    pub title: String,
    pub price: u64,
    pub kind: StoreItemKind,
    pub system: bool,
    pub owner_id: Option<String>,
    pub initial_stock: Option<u32>,
    pub allow_multiple: bool,
}

/// Redemption approval state. Approved and rejected are terminal.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RedemptionStatus {
    Pending,
    Approved,
    Rejected,
}

/// Teacher-approval request created when a student uses a non-system
/// inventory item. The inventory unit is consumed at request time; rejection
/// does not refund it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Redemption {
    pub id: String,
    pub student_id: String,
    pub item_id: String,
    pub teacher_id: String,
    pub status: RedemptionStatus,
    pub created_at: DateTime<Utc>,
    pub reviewed_at: Option<DateTime<Utc>>,
}

impl Redemption {
    pub fn new(
        student_id: impl Into<String>,
        item_id: impl Into<String>,
        teacher_id: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: format!("rdm-{}", Uuid::new_v4()),
            student_id: student_id.into(),
            item_id: item_id.into(),
            teacher_id: teacher_id.into(),
            status: RedemptionStatus::Pending,
            created_at: now,
            reviewed_at: None,
        }
    }
}

/// Persisted per-lesson quiz outcome.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct QuizRecord {
    pub lesson_id: String,
    pub highest_score: u32,
    pub finished: bool,
    pub wrong_question_ids: BTreeSet<String>,
    pub correction_counts: BTreeMap<String, u32>,
    pub updated_at: DateTime<Utc>,
}

impl QuizRecord {
    pub fn new(lesson_id: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            lesson_id: lesson_id.into(),
            highest_score: 0,
            finished: false,
            wrong_question_ids: BTreeSet::new(),
            correction_counts: BTreeMap::new(),
            updated_at: now,
        }
    }
}

/// Read model of one student's progression for display surfaces.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StudentSnapshot {
    pub student_id: String,
    pub level: u32,
    pub xp: u64,
    pub coins: u64,
    pub skill_points: u64,
    pub unlocked_skills: BTreeSet<String>,
    pub inventory: BTreeMap<String, u32>,
    pub active_theme: Option<String>,
    pub active_frame: Option<String>,
    pub streak_days: u32,
    pub streak_status: StreakStatus,
    /// Content hash of the underlying record so callers can cheaply detect
    /// change between polls.
    pub snapshot_hash: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inventory_drops_zero_entries() {
        let mut record = ProgressionRecord::new("stu-1", Utc::now());
        record.add_inventory("streak-freeze", 2);

        assert!(record.take_inventory("streak-freeze"));
        assert_eq!(record.inventory.get("streak-freeze"), Some(&1));
        assert!(record.take_inventory("streak-freeze"));
        assert!(!record.inventory.contains_key("streak-freeze"));
        assert!(!record.take_inventory("streak-freeze"));
    }

    #[test]
    fn slot_id_is_deterministic_per_target() {
        let a = artifact_slot_id(ArtifactKind::LogicMap, "lesson-1", "stu-1");
        let b = artifact_slot_id(ArtifactKind::LogicMap, "lesson-1", "stu-1");
        let c = artifact_slot_id(ArtifactKind::Reflection, "lesson-1", "stu-1");

        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
