//! Result types for scheduling attempts

use crate::domain::Task;

/// Result of a scheduling attempt
#[derive(Debug, Clone, PartialEq)]
pub enum ScheduleResult {
    /// A new waiting task was stored
    Scheduled(Task),

    /// A pending task with the same identity already exists; nothing stored
    Duplicate { reason: String },

    /// The source task does not repeat; nothing stored
    NotRepeating,
}

impl ScheduleResult {
    /// The newly stored task, if any
    pub fn task(&self) -> Option<&Task> {
        match self {
            Self::Scheduled(task) => Some(task),
            _ => None,
        }
    }

    pub fn into_task(self) -> Option<Task> {
        match self {
            Self::Scheduled(task) => Some(task),
            _ => None,
        }
    }

    pub fn is_scheduled(&self) -> bool {
        matches!(self, Self::Scheduled(_))
    }

    pub fn is_duplicate(&self) -> bool {
        matches!(self, Self::Duplicate { .. })
    }
}

/// Statistics for a scheduler instance
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SchedulerStats {
    pub total_scheduled: u64,
    pub total_duplicates: u64,
    pub total_not_repeating: u64,
    pub total_settled: u64,
}

impl SchedulerStats {
    pub(crate) fn record(&mut self, result: &ScheduleResult) {
        match result {
            ScheduleResult::Scheduled(_) => self.total_scheduled += 1,
            ScheduleResult::Duplicate { .. } => self.total_duplicates += 1,
            ScheduleResult::NotRepeating => self.total_not_repeating += 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_accessors() {
        let task = Task::bare("job").unwrap();
        let scheduled = ScheduleResult::Scheduled(task.clone());
        assert!(scheduled.is_scheduled());
        assert_eq!(scheduled.task(), Some(&task));
        assert_eq!(scheduled.into_task(), Some(task));

        let duplicate = ScheduleResult::Duplicate {
            reason: "already pending".to_string(),
        };
        assert!(duplicate.is_duplicate());
        assert!(duplicate.task().is_none());
        assert!(ScheduleResult::NotRepeating.into_task().is_none());
    }

    #[test]
    fn test_stats_record() {
        let mut stats = SchedulerStats::default();
        stats.record(&ScheduleResult::NotRepeating);
        stats.record(&ScheduleResult::Duplicate { reason: String::new() });
        stats.record(&ScheduleResult::Duplicate { reason: String::new() });
        assert_eq!(stats.total_not_repeating, 1);
        assert_eq!(stats.total_duplicates, 2);
        assert_eq!(stats.total_scheduled, 0);
    }
}
