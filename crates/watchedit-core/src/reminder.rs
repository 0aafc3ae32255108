//! Watch reminders for in-progress works. Reminders are computed on demand;
//! the store only remembers when each work was last reminded.

use chrono::{DateTime, Duration, Months, Utc};
use serde::Serialize;

use crate::error::Result;
use crate::models::{ReminderFrequency, Work, WorkStatus};
use crate::storage::database::Database;

/// Fallback interval for custom frequencies without a day count.
pub const DEFAULT_CUSTOM_DAYS: u32 = 7;

/// Whole days that must pass between two reminders.
pub fn interval_days(frequency: ReminderFrequency) -> i64 {
    match frequency {
        ReminderFrequency::Daily => 1,
        ReminderFrequency::Weekly => 7,
        ReminderFrequency::Monthly => 30,
        ReminderFrequency::Custom => i64::from(DEFAULT_CUSTOM_DAYS),
    }
}

pub fn is_due(work: &Work, last_reminder: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
    let Some(frequency) = work.reminder_frequency else {
        return false;
    };
    if !work.reminder_enabled || work.status != WorkStatus::Watching {
        return false;
    }
    if work.episodes.iter().all(|ep| ep.watched) {
        return false;
    }

    match last_reminder {
        None => true,
        Some(last) => (now - last).num_days() >= interval_days(frequency),
    }
}

/// Monthly steps by calendar month; `custom_days` only applies to custom.
pub fn next_reminder_date(
    frequency: ReminderFrequency,
    custom_days: Option<u32>,
    from: DateTime<Utc>,
) -> DateTime<Utc> {
    match frequency {
        ReminderFrequency::Daily => from + Duration::days(1),
        ReminderFrequency::Weekly => from + Duration::days(7),
        ReminderFrequency::Monthly => from
            .checked_add_months(Months::new(1))
            .unwrap_or(from + Duration::days(30)),
        ReminderFrequency::Custom => {
            let days = custom_days.filter(|d| *d > 0).unwrap_or(DEFAULT_CUSTOM_DAYS);
            from + Duration::days(i64::from(days))
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Reminder {
    pub work_id: String,
    pub title: String,
    pub watched: usize,
    pub total: usize,
    pub unwatched: usize,
    /// `(season, number)` of the next episode to watch.
    pub next_episode: Option<(u32, u32)>,
    pub next_reminder: DateTime<Utc>,
}

impl Reminder {
    pub fn message(&self) -> String {
        format!(
            "{}: {} unwatched, {}/{} watched",
            self.title, self.unwatched, self.watched, self.total
        )
    }
}

/// Every work whose reminder is due at `now`.
pub fn due_reminders(db: &Database, now: DateTime<Utc>) -> Result<Vec<Reminder>> {
    let mut due = Vec::new();
    for work in db.all_works()? {
        let Some(frequency) = work.reminder_frequency else {
            continue;
        };
        if !is_due(&work, db.last_reminder(&work.id)?, now) {
            continue;
        }
        let progress = work.progress();
        due.push(Reminder {
            work_id: work.id.clone(),
            title: work.title.clone(),
            watched: progress.watched,
            total: progress.total,
            unwatched: progress.total - progress.watched,
            next_episode: progress.next_unwatched,
            next_reminder: next_reminder_date(frequency, None, now),
        });
    }
    Ok(due)
}

/// Mark reminders as delivered so they are not due again until their interval passes.
pub fn acknowledge(db: &Database, reminders: &[Reminder], now: DateTime<Utc>) -> Result<()> {
    for reminder in reminders {
        db.set_last_reminder(&reminder.work_id, now)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Episode, EpisodeType, NewWork, WorkType};
    use chrono::TimeZone;

    fn reminded_work(frequency: ReminderFrequency) -> Work {
        let mut work = Work::new("One Piece", WorkType::Anime);
        work.reminder_enabled = true;
        work.reminder_frequency = Some(frequency);
        work.episodes.push(Episode::new(1, 1, EpisodeType::Episode));
        work
    }

    #[test]
    fn test_is_due_preconditions() {
        let now = Utc::now();
        let work = reminded_work(ReminderFrequency::Daily);
        assert!(is_due(&work, None, now));

        let mut off = work.clone();
        off.reminder_enabled = false;
        assert!(!is_due(&off, None, now));

        let mut paused = work.clone();
        paused.status = WorkStatus::Paused;
        assert!(!is_due(&paused, None, now));

        let mut done = work.clone();
        done.episodes[0].watched = true;
        assert!(!is_due(&done, None, now));

        let mut no_episodes = work.clone();
        no_episodes.episodes.clear();
        assert!(!is_due(&no_episodes, None, now));

        let mut no_frequency = work;
        no_frequency.reminder_frequency = None;
        assert!(!is_due(&no_frequency, None, now));
    }

    #[test]
    fn test_is_due_intervals() {
        let now = Utc::now();
        let cases = [
            (ReminderFrequency::Daily, 1),
            (ReminderFrequency::Weekly, 7),
            (ReminderFrequency::Monthly, 30),
            (ReminderFrequency::Custom, 7),
        ];
        for (frequency, days) in cases {
            let work = reminded_work(frequency);
            assert!(is_due(&work, Some(now - Duration::days(days)), now));
            assert!(!is_due(&work, Some(now - Duration::days(days) + Duration::hours(1)), now));
        }
    }

    #[test]
    fn test_next_reminder_date() {
        let from = Utc.with_ymd_and_hms(2024, 1, 31, 8, 0, 0).unwrap();
        assert_eq!(
            next_reminder_date(ReminderFrequency::Daily, None, from),
            from + Duration::days(1)
        );
        assert_eq!(
            next_reminder_date(ReminderFrequency::Monthly, None, from),
            Utc.with_ymd_and_hms(2024, 2, 29, 8, 0, 0).unwrap()
        );
        assert_eq!(
            next_reminder_date(ReminderFrequency::Custom, Some(3), from),
            from + Duration::days(3)
        );
        assert_eq!(
            next_reminder_date(ReminderFrequency::Custom, None, from),
            from + Duration::days(7)
        );
    }

    #[test]
    fn test_due_and_acknowledge() {
        let db = Database::open_in_memory().unwrap();
        let mut input = NewWork::new("Bleach", WorkType::Anime);
        input.reminder_enabled = true;
        input.reminder_frequency = Some(ReminderFrequency::Weekly);
        input.episodes.push(Episode::new(1, 1, EpisodeType::Episode));
        input.episodes.push(Episode::new(2, 1, EpisodeType::Episode));
        db.create_work(input).unwrap();
        db.create_work(NewWork::new("No reminder", WorkType::Anime)).unwrap();

        let now = Utc::now();
        let due = due_reminders(&db, now).unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].unwatched, 2);
        assert_eq!(due[0].next_episode, Some((1, 1)));
        assert!(due[0].message().contains("Bleach"));

        acknowledge(&db, &due, now).unwrap();
        assert!(due_reminders(&db, now + Duration::days(6)).unwrap().is_empty());
        assert_eq!(due_reminders(&db, now + Duration::days(7)).unwrap().len(), 1);
    }
}
