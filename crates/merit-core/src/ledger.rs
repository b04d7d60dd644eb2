use crate::policy::LevelPolicy;
use crate::types::ProgressionRecord;
use serde::{Deserialize, Serialize};

/// Level derived from total experience: `floor(k * sqrt(xp))`.
pub fn level_for_xp(policy: &LevelPolicy, xp: u64) -> u32 {
    (policy.curve_factor * (xp as f64).sqrt()).floor() as u32
}

/// Result of one xp grant, including any level-up awards it triggered.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct XpGrant {
    pub amount: u64,
    pub old_level: u32,
    pub new_level: u32,
    pub coins_awarded: u64,
    pub skill_points_awarded: u64,
}

impl XpGrant {
    pub fn leveled_up(&self) -> bool {
        self.new_level > self.old_level
    }

    pub fn levels_gained(&self) -> u32 {
        self.new_level.saturating_sub(self.old_level)
    }
}

/// Credit experience and pay out level-up awards.
///
/// A single large grant can cross several thresholds; the award is paid once
/// per level gained (or once flat when `LevelPolicy::flat_level_bonus` is
/// set). The stored level only ever rises.
pub fn grant_xp(record: &mut ProgressionRecord, policy: &LevelPolicy, amount: u64) -> XpGrant {
    let old_level = record.level;
    record.xp = record.xp.saturating_add(amount);

    let recomputed = level_for_xp(policy, record.xp);
    let mut coins_awarded = 0;
    let mut skill_points_awarded = 0;
    if recomputed > old_level {
        let crossings = if policy.flat_level_bonus {
            1
        } else {
            u64::from(recomputed - old_level)
        };
        coins_awarded = policy.coins_per_level * crossings;
        skill_points_awarded = policy.skill_points_per_level * crossings;
        record.coins = record.coins.saturating_add(coins_awarded);
        record.skill_points = record.skill_points.saturating_add(skill_points_awarded);
        record.level = recomputed;
    }

    XpGrant {
        amount,
        old_level,
        new_level: record.level,
        coins_awarded,
        skill_points_awarded,
    }
}

pub fn grant_coins(record: &mut ProgressionRecord, amount: u64) {
    record.coins = record.coins.saturating_add(amount);
}

/// Guarded decrement: false means insufficient funds and no mutation. The
/// check and the write happen under the caller's exclusive borrow, so no
/// interleaved mutation can slip between them.
pub fn spend_coins(record: &mut ProgressionRecord, amount: u64) -> bool {
    if record.coins < amount {
        return false;
    }
    record.coins -= amount;
    true
}

/// Guarded decrement for skill points; same contract as [`spend_coins`].
pub fn spend_skill_points(record: &mut ProgressionRecord, amount: u64) -> bool {
    if record.skill_points < amount {
        return false;
    }
    record.skill_points -= amount;
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn record() -> ProgressionRecord {
        ProgressionRecord::new("stu-1", Utc::now())
    }

    #[test]
    fn level_tracks_curve_for_any_grant_sequence() {
        let policy = LevelPolicy::default();
        let mut rec = record();

        for amount in [10, 90, 300, 5_000, 12_345, 1] {
            grant_xp(&mut rec, &policy, amount);
            assert_eq!(rec.level, level_for_xp(&policy, rec.xp));
        }
    }

    #[test]
    fn multi_level_jump_pays_award_once_per_level() {
        let policy = LevelPolicy::default();
        let mut rec = record();

        // 0 -> 160,000 xp crosses levels 1..=40 in one grant.
        let grant = grant_xp(&mut rec, &policy, 160_000);

        assert_eq!(grant.old_level, 0);
        assert_eq!(grant.new_level, 40);
        assert_eq!(grant.coins_awarded, 40 * policy.coins_per_level);
        assert_eq!(grant.skill_points_awarded, 40 * policy.skill_points_per_level);
        assert_eq!(rec.coins, grant.coins_awarded);
        assert_eq!(rec.skill_points, grant.skill_points_awarded);
    }

    #[test]
    fn flat_bonus_toggle_pays_single_award_on_jump() {
        let policy = LevelPolicy {
            flat_level_bonus: true,
            ..LevelPolicy::default()
        };
        let mut rec = record();

        let grant = grant_xp(&mut rec, &policy, 160_000);

        assert_eq!(grant.levels_gained(), 40);
        assert_eq!(grant.coins_awarded, policy.coins_per_level);
        assert_eq!(grant.skill_points_awarded, policy.skill_points_per_level);
    }

    #[test]
    fn grant_below_next_threshold_pays_nothing() {
        let policy = LevelPolicy::default();
        let mut rec = record();

        let grant = grant_xp(&mut rec, &policy, 99);

        assert!(!grant.leveled_up());
        assert_eq!(rec.coins, 0);
        assert_eq!(rec.skill_points, 0);
    }

    #[test]
    fn failed_spend_leaves_balance_unchanged() {
        let mut rec = record();
        grant_coins(&mut rec, 100);

        assert!(!spend_coins(&mut rec, 150));
        assert_eq!(rec.coins, 100);
        assert!(spend_coins(&mut rec, 100));
        assert_eq!(rec.coins, 0);
        assert!(!spend_coins(&mut rec, 1));
    }

    #[test]
    fn failed_skill_point_spend_leaves_balance_unchanged() {
        let mut rec = record();
        rec.skill_points = 3;

        assert!(!spend_skill_points(&mut rec, 4));
        assert_eq!(rec.skill_points, 3);
        assert!(spend_skill_points(&mut rec, 3));
        assert_eq!(rec.skill_points, 0);
    }
}
