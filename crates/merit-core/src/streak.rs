use crate::policy::StreakPolicy;
use crate::types::{ProgressionRecord, StreakStatus};
use chrono::NaiveDate;
use serde::Serialize;

/// Streak state reported back to the caller after a login or break decision.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct StreakReport {
    pub days: u32,
    pub status: StreakStatus,
    /// True when this login extended the streak by a day.
    pub extended: bool,
}

/// Advance streak state for a login occurring on `today`.
///
/// Same-day logins are no-ops; exactly one elapsed day extends the streak; a
/// longer gap marks the streak broken WITHOUT resetting `streak_days` — the
/// reset is deferred until the student either repairs the break or accepts it.
pub fn observe_login(record: &mut ProgressionRecord, today: NaiveDate) -> StreakReport {
    let elapsed = (today - record.last_login_date).num_days();

    if record.streak_status == StreakStatus::Broken {
        // A broken streak stays broken until repaired or accepted, no matter
        // how many logins happen in between.
        return report(record, false);
    }

    if elapsed <= 0 {
        return report(record, false);
    }

    if elapsed == 1 {
        record.streak_days += 1;
        record.last_login_date = today;
        return report(record, true);
    }

    record.streak_status = StreakStatus::Broken;
    report(record, false)
}

/// Pure derivation of the continuity rule; mutates nothing.
pub fn check_status(record: &ProgressionRecord, today: NaiveDate) -> StreakStatus {
    if (today - record.last_login_date).num_days() > 1 {
        StreakStatus::Broken
    } else {
        record.streak_status
    }
}

/// Outcome of a streak repair attempt.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", tag = "outcome")]
pub enum StreakRepairOutcome {
    Repaired { days: u32 },
    NotBroken,
    NoFreezeAvailable,
}

/// Repair a broken streak by consuming one freeze item.
///
/// Fails without consuming anything when no freeze is held. On success the
/// streak count is preserved, the status returns to active, and the login
/// date is stamped so the repaired streak does not re-break on the next check.
pub fn repair_streak(
    record: &mut ProgressionRecord,
    policy: &StreakPolicy,
    today: NaiveDate,
) -> StreakRepairOutcome {
    if record.streak_status != StreakStatus::Broken {
        return StreakRepairOutcome::NotBroken;
    }
    if !record.take_inventory(&policy.freeze_item_id) {
        return StreakRepairOutcome::NoFreezeAvailable;
    }

    record.streak_status = StreakStatus::Active;
    record.last_login_date = today;
    StreakRepairOutcome::Repaired {
        days: record.streak_days,
    }
}

/// Forfeit the prior streak: zero the counter and start over from today.
pub fn accept_streak_break(record: &mut ProgressionRecord, today: NaiveDate) -> StreakReport {
    record.streak_days = 0;
    record.streak_status = StreakStatus::Active;
    record.last_login_date = today;
    report(record, false)
}

fn report(record: &ProgressionRecord, extended: bool) -> StreakReport {
    StreakReport {
        days: record.streak_days,
        status: record.streak_status,
        extended,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn record_on(date: NaiveDate) -> ProgressionRecord {
        let mut record = ProgressionRecord::new("stu-1", Utc::now());
        record.last_login_date = date;
        record
    }

    fn day(offset: i64) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, 1).unwrap() + Duration::days(offset)
    }

    #[test]
    fn consecutive_days_extend_the_streak() {
        let mut record = record_on(day(0));

        let first = observe_login(&mut record, day(1));
        assert!(first.extended);
        assert_eq!(first.days, 1);

        let second = observe_login(&mut record, day(2));
        assert_eq!(second.days, 2);
        assert_eq!(second.status, StreakStatus::Active);
    }

    #[test]
    fn same_day_login_changes_nothing() {
        let mut record = record_on(day(0));
        observe_login(&mut record, day(1));

        let repeat = observe_login(&mut record, day(1));
        assert!(!repeat.extended);
        assert_eq!(repeat.days, 1);
    }

    #[test]
    fn gap_marks_broken_but_defers_the_reset() {
        let mut record = record_on(day(0));
        record.streak_days = 7;

        let after_gap = observe_login(&mut record, day(3));

        assert_eq!(after_gap.status, StreakStatus::Broken);
        assert_eq!(after_gap.days, 7);
        assert_eq!(check_status(&record, day(3)), StreakStatus::Broken);
    }

    #[test]
    fn repair_consumes_a_freeze_and_keeps_the_count() {
        let policy = StreakPolicy::default();
        let mut record = record_on(day(0));
        record.streak_days = 7;
        record.streak_status = StreakStatus::Broken;
        record.add_inventory(&policy.freeze_item_id, 1);

        let outcome = repair_streak(&mut record, &policy, day(3));

        assert_eq!(outcome, StreakRepairOutcome::Repaired { days: 7 });
        assert_eq!(record.streak_status, StreakStatus::Active);
        assert_eq!(record.last_login_date, day(3));
        assert!(!record.inventory.contains_key(&policy.freeze_item_id));
    }

    #[test]
    fn repair_without_a_freeze_fails_and_consumes_nothing() {
        let policy = StreakPolicy::default();
        let mut record = record_on(day(0));
        record.streak_days = 7;
        record.streak_status = StreakStatus::Broken;

        let outcome = repair_streak(&mut record, &policy, day(3));

        assert_eq!(outcome, StreakRepairOutcome::NoFreezeAvailable);
        assert_eq!(record.streak_status, StreakStatus::Broken);
        assert_eq!(record.streak_days, 7);
    }

    #[test]
    fn repair_on_an_active_streak_is_rejected() {
        let policy = StreakPolicy::default();
        let mut record = record_on(day(0));
        record.add_inventory(&policy.freeze_item_id, 1);

        assert_eq!(
            repair_streak(&mut record, &policy, day(0)),
            StreakRepairOutcome::NotBroken
        );
        assert_eq!(record.inventory.get(&policy.freeze_item_id), Some(&1));
    }

    #[test]
    fn accepting_the_break_forfeits_the_count() {
        let mut record = record_on(day(0));
        record.streak_days = 7;
        record.streak_status = StreakStatus::Broken;

        let report = accept_streak_break(&mut record, day(3));

        assert_eq!(report.days, 0);
        assert_eq!(report.status, StreakStatus::Active);
        assert_eq!(record.last_login_date, day(3));
    }
}
