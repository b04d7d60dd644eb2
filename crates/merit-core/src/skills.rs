use crate::error::MeritError;
use crate::ledger;
use crate::types::{ProgressionRecord, SkillDefinition};
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::collections::HashMap;

/// Registry of static skill definitions, validated at engine bootstrap.
#[derive(Debug, Clone, Default)]
pub struct SkillRegistry {
    skills: HashMap<String, SkillDefinition>,
}

impl SkillRegistry {
    /// Build the registry, rejecting duplicate ids, dangling parents, and
    /// parent cycles. The skill set must be a forest.
    pub fn new(definitions: Vec<SkillDefinition>) -> Result<Self, MeritError> {
        let mut skills: HashMap<String, SkillDefinition> = HashMap::new();
        for skill in definitions {
            if skills.insert(skill.id.clone(), skill.clone()).is_some() {
                return Err(MeritError::InvariantViolation(format!(
                    "duplicate skill id '{}'",
                    skill.id
                )));
            }
        }

        for skill in skills.values() {
            if let Some(parent) = &skill.parent {
                if !skills.contains_key(parent) {
                    return Err(MeritError::InvariantViolation(format!(
                        "skill '{}' references unknown parent '{}'",
                        skill.id, parent
                    )));
                }
            }
        }

        // Walk each parent chain; revisiting a node within one walk is a cycle.
        for skill in skills.values() {
            let mut seen = vec![skill.id.as_str()];
            let mut current = skill.parent.as_deref();
            while let Some(parent_id) = current {
                if seen.contains(&parent_id) {
                    return Err(MeritError::InvariantViolation(format!(
                        "skill parent cycle through '{}'",
                        parent_id
                    )));
                }
                seen.push(parent_id);
                current = skills
                    .get(parent_id)
                    .and_then(|parent| parent.parent.as_deref());
            }
        }

        Ok(Self { skills })
    }

    pub fn get(&self, skill_id: &str) -> Option<&SkillDefinition> {
        self.skills.get(skill_id)
    }

    pub fn len(&self) -> usize {
        self.skills.len()
    }

    pub fn is_empty(&self) -> bool {
        self.skills.is_empty()
    }
}

/// Outcome of a skill unlock attempt.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", tag = "outcome")]
pub enum UnlockOutcome {
    Unlocked { cost: u64 },
    UnknownSkill,
    AlreadyUnlocked,
    PrerequisiteLocked { parent: String },
    InsufficientPoints { needed: u64, available: u64 },
}

/// Unlock a skill, spending its cost in skill points.
///
/// All gates (exists, not already unlocked, parent unlocked) are evaluated
/// before any mutation; the guarded point spend is the final gate, so a
/// failure at any step leaves the record untouched.
pub fn unlock(
    registry: &SkillRegistry,
    record: &mut ProgressionRecord,
    skill_id: &str,
) -> UnlockOutcome {
    let Some(skill) = registry.get(skill_id) else {
        return UnlockOutcome::UnknownSkill;
    };
    if record.unlocked_skills.contains(skill_id) {
        return UnlockOutcome::AlreadyUnlocked;
    }
    if let Some(parent) = &skill.parent {
        if !record.unlocked_skills.contains(parent) {
            return UnlockOutcome::PrerequisiteLocked {
                parent: parent.clone(),
            };
        }
    }
    if !ledger::spend_skill_points(record, skill.cost) {
        return UnlockOutcome::InsufficientPoints {
            needed: skill.cost,
            available: record.skill_points,
        };
    }

    record.unlocked_skills.insert(skill_id.to_string());
    UnlockOutcome::Unlocked { cost: skill.cost }
}

/// Outcome of an active-skill activation attempt. `CoolingDown` carries the
/// remaining wait so callers can display it.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", tag = "outcome")]
pub enum ActivationOutcome {
    Activated,
    UnknownSkill,
    NotUnlocked,
    Passive,
    CoolingDown { remaining_secs: i64 },
}

/// Activate an unlocked active skill, enforcing its wall-clock cooldown.
/// On success the activation instant is stamped into the persisted record.
pub fn activate(
    registry: &SkillRegistry,
    record: &mut ProgressionRecord,
    skill_id: &str,
    now: DateTime<Utc>,
) -> ActivationOutcome {
    let Some(skill) = registry.get(skill_id) else {
        return ActivationOutcome::UnknownSkill;
    };
    if !record.unlocked_skills.contains(skill_id) {
        return ActivationOutcome::NotUnlocked;
    }
    let Some(cooldown_hours) = skill.cooldown_hours else {
        return ActivationOutcome::Passive;
    };

    let cooldown = Duration::hours(cooldown_hours);
    if let Some(last) = record.skill_activations.get(skill_id) {
        let elapsed = now - *last;
        if elapsed < cooldown {
            return ActivationOutcome::CoolingDown {
                remaining_secs: (cooldown - elapsed).num_seconds(),
            };
        }
    }

    record.skill_activations.insert(skill_id.to_string(), now);
    ActivationOutcome::Activated
}
