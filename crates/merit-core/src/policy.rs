/// Level curve and level-up award configuration.
///
/// The same input always yields the same level; the curve is deliberately
/// free of randomness so awards are replayable.
#[derive(Debug, Clone)]
pub struct LevelPolicy {
    /// `level = floor(curve_factor * sqrt(xp))`.
    pub curve_factor: f64,
    /// Coins awarded per level gained.
    pub coins_per_level: u64,
    /// Skill points awarded per level gained.
    pub skill_points_per_level: u64,
    /// When set, a multi-level jump pays the level-up award once instead of
    /// once per level crossed.
    pub flat_level_bonus: bool,
}

impl Default for LevelPolicy {
    fn default() -> Self {
        Self {
            // Level 10 at 10,000 xp.
            curve_factor: 0.1,
            coins_per_level: 50,
            skill_points_per_level: 1,
            flat_level_bonus: false,
        }
    }
}

/// Fixed credit bundles paid out by the reward sweep.
#[derive(Debug, Clone)]
pub struct RewardPolicy {
    /// Xp credited per newly verified artifact.
    pub verified_xp: u64,
    /// Coins credited per newly verified artifact.
    pub verified_coins: u64,
    /// Coins credited per vote above the lifetime watermark.
    pub coins_per_vote: u64,
}

impl Default for RewardPolicy {
    fn default() -> Self {
        Self {
            verified_xp: 50,
            verified_coins: 20,
            coins_per_vote: 2,
        }
    }
}

/// Streak continuity configuration.
#[derive(Debug, Clone)]
pub struct StreakPolicy {
    /// Inventory item consumed by a streak repair.
    pub freeze_item_id: String,
}

impl Default for StreakPolicy {
    fn default() -> Self {
        Self {
            freeze_item_id: "streak-freeze".to_string(),
        }
    }
}

/// Bundle of all deterministic engine tunables.
#[derive(Debug, Clone, Default)]
pub struct ProgressionPolicy {
    pub level: LevelPolicy,
    pub rewards: RewardPolicy,
    pub streak: StreakPolicy,
}
