use crate::types::{artifact_slot_id, Artifact, ArtifactKind, ArtifactStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Student-visible message stored when a rejection arrives without feedback.
pub const REJECTION_FALLBACK_FEEDBACK: &str =
    "Your submission needs another pass; ask your teacher for details.";

/// Incoming submission payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Submission {
    pub kind: ArtifactKind,
    pub author_id: String,
    pub lesson_id: String,
    pub content: String,
}

/// Receipt for a stored submission.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct SubmitReceipt {
    pub artifact_id: String,
    pub revision: u64,
    pub status: ArtifactStatus,
    pub resubmission: bool,
}

/// Upsert a submission into its deterministic slot with status `Pending`.
///
/// Invariant handling:
/// - An existing artifact keeps its `liked_by`/`voted_by` sets, its
///   `reward_claimed` flag, and the teacher's last feedback — resubmission
///   never erases social or review history.
/// - The revision bumps on every submission, so in-flight reviews of the
///   prior revision become stale instead of landing silently.
pub fn submit(
    artifacts: &mut BTreeMap<String, Artifact>,
    submission: Submission,
    now: DateTime<Utc>,
) -> SubmitReceipt {
    upsert(artifacts, submission, ArtifactStatus::Pending, now)
}

/// Upsert a submission as a draft, not yet visible to review queues.
pub fn save_draft(
    artifacts: &mut BTreeMap<String, Artifact>,
    submission: Submission,
    now: DateTime<Utc>,
) -> SubmitReceipt {
    upsert(artifacts, submission, ArtifactStatus::Draft, now)
}

fn upsert(
    artifacts: &mut BTreeMap<String, Artifact>,
    submission: Submission,
    status: ArtifactStatus,
    now: DateTime<Utc>,
) -> SubmitReceipt {
    let id = artifact_slot_id(submission.kind, &submission.lesson_id, &submission.author_id);

    match artifacts.get_mut(&id) {
        Some(existing) => {
            existing.content = submission.content;
            existing.status = status;
            existing.revision += 1;
            existing.updated_at = now;
            SubmitReceipt {
                artifact_id: id,
                revision: existing.revision,
                status,
                resubmission: true,
            }
        }
        None => {
            let artifact = Artifact {
                id: id.clone(),
                kind: submission.kind,
                author_id: submission.author_id,
                lesson_id: submission.lesson_id,
                content: submission.content,
                status,
                feedback: None,
                liked_by: BTreeSet::new(),
                voted_by: BTreeSet::new(),
                reward_claimed: false,
                revision: 1,
                created_at: now,
                updated_at: now,
            };
            artifacts.insert(id.clone(), artifact);
            SubmitReceipt {
                artifact_id: id,
                revision: 1,
                status,
                resubmission: false,
            }
        }
    }
}

/// Teacher review decision.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ReviewDecision {
    Approve,
    Reject,
}

/// Outcome of a review attempt.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", tag = "outcome")]
pub enum ReviewOutcome {
    Applied { status: ArtifactStatus },
    NotFound,
    NotPending { status: ArtifactStatus },
    StaleRevision { current: u64 },
}

/// Apply a review decision to a pending artifact.
///
/// The decision is keyed to the revision the reviewer saw: a resubmission
/// arriving mid-review bumps the revision and the stale decision is rejected.
/// Rejections always store student-visible feedback, falling back to
/// [`REJECTION_FALLBACK_FEEDBACK`] when the reviewer provided none.
pub fn apply_review(
    artifacts: &mut BTreeMap<String, Artifact>,
    artifact_id: &str,
    expected_revision: u64,
    decision: ReviewDecision,
    feedback: Option<String>,
    now: DateTime<Utc>,
) -> ReviewOutcome {
    let Some(artifact) = artifacts.get_mut(artifact_id) else {
        return ReviewOutcome::NotFound;
    };
    if artifact.status != ArtifactStatus::Pending {
        return ReviewOutcome::NotPending {
            status: artifact.status,
        };
    }
    if artifact.revision != expected_revision {
        return ReviewOutcome::StaleRevision {
            current: artifact.revision,
        };
    }

    let feedback = feedback.filter(|text| !text.trim().is_empty());
    match decision {
        ReviewDecision::Approve => {
            artifact.status = ArtifactStatus::Verified;
            artifact.feedback = feedback;
        }
        ReviewDecision::Reject => {
            artifact.status = ArtifactStatus::Rejected;
            artifact.feedback =
                Some(feedback.unwrap_or_else(|| REJECTION_FALLBACK_FEEDBACK.to_string()));
        }
    }
    artifact.updated_at = now;

    ReviewOutcome::Applied {
        status: artifact.status,
    }
}

/// Outcome of a like/vote attempt. Duplicates are deduplicated per user.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", tag = "outcome")]
pub enum SocialOutcome {
    Recorded { total: usize },
    Duplicate,
    NotFound,
}

pub fn record_like(
    artifacts: &mut BTreeMap<String, Artifact>,
    artifact_id: &str,
    user_id: &str,
) -> SocialOutcome {
    let Some(artifact) = artifacts.get_mut(artifact_id) else {
        return SocialOutcome::NotFound;
    };
    if !artifact.liked_by.insert(user_id.to_string()) {
        return SocialOutcome::Duplicate;
    }
    SocialOutcome::Recorded {
        total: artifact.likes(),
    }
}

pub fn record_vote(
    artifacts: &mut BTreeMap<String, Artifact>,
    artifact_id: &str,
    user_id: &str,
) -> SocialOutcome {
    let Some(artifact) = artifacts.get_mut(artifact_id) else {
        return SocialOutcome::NotFound;
    };
    if !artifact.voted_by.insert(user_id.to_string()) {
        return SocialOutcome::Duplicate;
    }
    SocialOutcome::Recorded {
        total: artifact.votes(),
    }
}

/// Index of artifact keys by status, maintained alongside the store so
/// review-queue queries never rescan whole collections.
#[derive(Debug, Clone, Default)]
pub struct ReviewIndex {
    by_status: BTreeMap<ArtifactStatus, BTreeSet<(String, String)>>,
}

impl ReviewIndex {
    /// Re-file one artifact under its current status.
    pub fn track(&mut self, student_id: &str, artifact: &Artifact) {
        let key = (student_id.to_string(), artifact.id.clone());
        for keys in self.by_status.values_mut() {
            keys.remove(&key);
        }
        self.by_status
            .entry(artifact.status)
            .or_default()
            .insert(key);
    }

    /// Drop every entry for one student (account wipe).
    pub fn remove_student(&mut self, student_id: &str) {
        for keys in self.by_status.values_mut() {
            keys.retain(|(owner, _)| owner != student_id);
        }
    }

    /// All `(student_id, artifact_id)` keys currently filed under `status`.
    pub fn with_status(&self, status: ArtifactStatus) -> Vec<(String, String)> {
        self.by_status
            .get(&status)
            .map(|keys| keys.iter().cloned().collect())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn submission(content: &str) -> Submission {
        Submission {
            kind: ArtifactKind::LogicMap,
            author_id: "stu-1".to_string(),
            lesson_id: "lesson-1".to_string(),
            content: content.to_string(),
        }
    }

    #[test]
    fn resubmission_preserves_social_history_and_claim_flag() {
        let mut artifacts = BTreeMap::new();
        let receipt = submit(&mut artifacts, submission("v1"), Utc::now());

        {
            let artifact = artifacts.get_mut(&receipt.artifact_id).unwrap();
            artifact.liked_by.insert("peer-1".to_string());
            artifact.voted_by.insert("peer-1".to_string());
            artifact.voted_by.insert("peer-2".to_string());
            artifact.reward_claimed = true;
            artifact.status = ArtifactStatus::Verified;
        }

        let second = submit(&mut artifacts, submission("v2"), Utc::now());
        let artifact = &artifacts[&second.artifact_id];

        assert!(second.resubmission);
        assert_eq!(second.revision, 2);
        assert_eq!(artifact.status, ArtifactStatus::Pending);
        assert_eq!(artifact.content, "v2");
        assert_eq!(artifact.likes(), 1);
        assert_eq!(artifact.votes(), 2);
        assert!(artifact.reward_claimed);
    }

    #[test]
    fn rejection_stores_feedback_and_resubmission_keeps_it_until_next_review() {
        let mut artifacts = BTreeMap::new();
        let receipt = submit(&mut artifacts, submission("v1"), Utc::now());

        let outcome = apply_review(
            &mut artifacts,
            &receipt.artifact_id,
            receipt.revision,
            ReviewDecision::Reject,
            Some("revise structure".to_string()),
            Utc::now(),
        );
        assert_eq!(
            outcome,
            ReviewOutcome::Applied {
                status: ArtifactStatus::Rejected
            }
        );

        let second = submit(&mut artifacts, submission("v2"), Utc::now());
        let artifact = &artifacts[&second.artifact_id];
        assert_eq!(artifact.status, ArtifactStatus::Pending);
        assert_eq!(artifact.feedback.as_deref(), Some("revise structure"));
    }

    #[test]
    fn blank_rejection_feedback_falls_back_to_the_generic_message() {
        let mut artifacts = BTreeMap::new();
        let receipt = submit(&mut artifacts, submission("v1"), Utc::now());

        apply_review(
            &mut artifacts,
            &receipt.artifact_id,
            receipt.revision,
            ReviewDecision::Reject,
            Some("   ".to_string()),
            Utc::now(),
        );

        assert_eq!(
            artifacts[&receipt.artifact_id].feedback.as_deref(),
            Some(REJECTION_FALLBACK_FEEDBACK)
        );
    }

    #[test]
    fn reviewing_a_non_pending_artifact_is_rejected() {
        let mut artifacts = BTreeMap::new();
        let receipt = submit(&mut artifacts, submission("v1"), Utc::now());
        apply_review(
            &mut artifacts,
            &receipt.artifact_id,
            receipt.revision,
            ReviewDecision::Approve,
            None,
            Utc::now(),
        );

        let outcome = apply_review(
            &mut artifacts,
            &receipt.artifact_id,
            receipt.revision,
            ReviewDecision::Reject,
            Some("too late".to_string()),
            Utc::now(),
        );

        assert_eq!(
            outcome,
            ReviewOutcome::NotPending {
                status: ArtifactStatus::Verified
            }
        );
        assert_eq!(artifacts[&receipt.artifact_id].status, ArtifactStatus::Verified);
    }

    #[test]
    fn stale_review_of_a_resubmitted_revision_is_rejected() {
        let mut artifacts = BTreeMap::new();
        let first = submit(&mut artifacts, submission("v1"), Utc::now());
        let second = submit(&mut artifacts, submission("v2"), Utc::now());

        let stale = apply_review(
            &mut artifacts,
            &first.artifact_id,
            first.revision,
            ReviewDecision::Approve,
            None,
            Utc::now(),
        );
        assert_eq!(stale, ReviewOutcome::StaleRevision { current: 2 });
        assert_eq!(artifacts[&first.artifact_id].status, ArtifactStatus::Pending);

        let fresh = apply_review(
            &mut artifacts,
            &second.artifact_id,
            second.revision,
            ReviewDecision::Approve,
            None,
            Utc::now(),
        );
        assert_eq!(
            fresh,
            ReviewOutcome::Applied {
                status: ArtifactStatus::Verified
            }
        );
    }

    #[test]
    fn votes_and_likes_deduplicate_per_user() {
        let mut artifacts = BTreeMap::new();
        let receipt = submit(&mut artifacts, submission("v1"), Utc::now());

        assert_eq!(
            record_vote(&mut artifacts, &receipt.artifact_id, "peer-1"),
            SocialOutcome::Recorded { total: 1 }
        );
        assert_eq!(
            record_vote(&mut artifacts, &receipt.artifact_id, "peer-1"),
            SocialOutcome::Duplicate
        );
        assert_eq!(
            record_like(&mut artifacts, &receipt.artifact_id, "peer-1"),
            SocialOutcome::Recorded { total: 1 }
        );
        assert_eq!(record_vote(&mut artifacts, "missing", "peer-1"), SocialOutcome::NotFound);
    }

    #[test]
    fn index_refiles_artifacts_as_their_status_changes() {
        let mut artifacts = BTreeMap::new();
        let mut index = ReviewIndex::default();
        let receipt = submit(&mut artifacts, submission("v1"), Utc::now());
        index.track("stu-1", &artifacts[&receipt.artifact_id]);

        assert_eq!(index.with_status(ArtifactStatus::Pending).len(), 1);

        apply_review(
            &mut artifacts,
            &receipt.artifact_id,
            receipt.revision,
            ReviewDecision::Approve,
            None,
            Utc::now(),
        );
        index.track("stu-1", &artifacts[&receipt.artifact_id]);

        assert!(index.with_status(ArtifactStatus::Pending).is_empty());
        assert_eq!(index.with_status(ArtifactStatus::Verified).len(), 1);

        index.remove_student("stu-1");
        assert!(index.with_status(ArtifactStatus::Verified).is_empty());
    }
}
