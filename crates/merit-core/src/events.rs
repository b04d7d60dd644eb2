use crate::types::ArtifactStatus;
use serde::Serialize;
use tokio::sync::broadcast;

/// State-change notifications consumed by UI layers.
///
/// The engine publishes these after the corresponding mutation has been
/// committed; subscribers mirror state, they never drive decisions.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", tag = "event")]
pub enum EngineEvent {
    LevelUp {
        student_id: String,
        old_level: u32,
        new_level: u32,
        coins_awarded: u64,
        skill_points_awarded: u64,
    },
    ArtifactReviewed {
        student_id: String,
        artifact_id: String,
        status: ArtifactStatus,
    },
    RewardsReconciled {
        student_id: String,
        xp_granted: u64,
        coins_granted: u64,
    },
    RedemptionRequested {
        student_id: String,
        teacher_id: String,
        redemption_id: String,
        item_id: String,
    },
    StreakBroken {
        student_id: String,
        days_at_break: u32,
    },
}

/// Broadcast fan-out for engine events. Slow subscribers that fall behind the
/// channel capacity miss events; the engine never blocks on consumers.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<EngineEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.sender.subscribe()
    }

    /// Publish to whoever is listening; no subscribers is not an error.
    pub fn emit(&self, event: EngineEvent) {
        let _ = self.sender.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
