use thiserror::Error;

/// Engine faults.
///
/// Expected, user-triggerable conditions (insufficient balance, invalid
/// transition, unknown artifact/item/skill id, cooldown still running) are
/// value-returned outcomes on the operation that produced them, never errors.
/// `MeritError` is reserved for faults the caller cannot recover from locally.
#[derive(Debug, Error)]
pub enum MeritError {
    #[error("storage error: {0}")]
    Storage(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    #[error("unknown student '{0}'")]
    UnknownStudent(String),
}
