//! Dead letter queue migration primitives.
//!
//! These operate on the raw collections and are only ever applied under the
//! registry lock. Two files cannot be renamed atomically together, so
//! migration is idempotent instead: re-running it for a job that already
//! left the active collection is a no-op, and the DLQ holds at most one
//! entry per id.

use chrono::{DateTime, Utc};

use crate::queue::job::{Job, JobState};

/// Move `id` from the active collection to the DLQ, forcing state `dead`.
///
/// Returns true if the active collection changed.
pub(crate) fn migrate(
    active: &mut Vec<Job>,
    dlq: &mut Vec<Job>,
    id: &str,
    now: DateTime<Utc>,
) -> bool {
    let Some(pos) = active.iter().position(|j| j.id == id) else {
        return false;
    };
    let mut job = active.remove(pos);
    if dlq.iter().all(|j| j.id != job.id) {
        job.state = JobState::Dead;
        job.updated_at = now;
        dlq.push(job);
    }
    true
}

/// Remove `id` from the DLQ, handing the job back for re-activation.
pub(crate) fn take(dlq: &mut Vec<Job>, id: &str) -> Option<Job> {
    let pos = dlq.iter().position(|j| j.id == id)?;
    Some(dlq.remove(pos))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::QueueConfig;
    use crate::queue::job::JobSpec;

    fn job(id: &str) -> Job {
        JobSpec::parse(&format!(r#"{{"id":"{id}","command":"true"}}"#))
            .unwrap()
            .into_job(&QueueConfig::default(), Utc::now())
    }

    #[test]
    fn migrate_moves_job_and_forces_dead() {
        let mut active = vec![job("j1"), job("j2")];
        let mut dlq = Vec::new();

        assert!(migrate(&mut active, &mut dlq, "j1", Utc::now()));
        assert_eq!(active.len(), 1);
        assert_eq!(dlq.len(), 1);
        assert_eq!(dlq[0].id, "j1");
        assert_eq!(dlq[0].state, JobState::Dead);
    }

    #[test]
    fn migrate_is_idempotent() {
        let mut active = vec![job("j1")];
        let mut dlq = Vec::new();

        migrate(&mut active, &mut dlq, "j1", Utc::now());
        assert!(!migrate(&mut active, &mut dlq, "j1", Utc::now()));
        assert_eq!(dlq.len(), 1);
    }

    #[test]
    fn migrate_does_not_duplicate_after_partial_crash() {
        // Crash window: job already appended to the DLQ but still active.
        let mut active = vec![job("j1")];
        let mut dlq = vec![job("j1")];

        assert!(migrate(&mut active, &mut dlq, "j1", Utc::now()));
        assert!(active.is_empty());
        assert_eq!(dlq.len(), 1);
    }

    #[test]
    fn take_removes_matching_id_only() {
        let mut dlq = vec![job("j1"), job("j2")];
        assert!(take(&mut dlq, "j3").is_none());
        let taken = take(&mut dlq, "j1").unwrap();
        assert_eq!(taken.id, "j1");
        assert_eq!(dlq.len(), 1);
    }
}
