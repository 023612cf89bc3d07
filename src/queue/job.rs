use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::QueueConfig;
use crate::error::{QueueError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Pending,
    Processing,
    Completed,
    Failed,
    Dead,
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobState::Pending => write!(f, "pending"),
            JobState::Processing => write!(f, "processing"),
            JobState::Completed => write!(f, "completed"),
            JobState::Failed => write!(f, "failed"),
            JobState::Dead => write!(f, "dead"),
        }
    }
}

impl std::str::FromStr for JobState {
    type Err = QueueError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(JobState::Pending),
            "processing" => Ok(JobState::Processing),
            "completed" => Ok(JobState::Completed),
            "failed" => Ok(JobState::Failed),
            "dead" => Ok(JobState::Dead),
            other => Err(QueueError::InvalidFilter(format!(
                "unknown state '{other}' (expected pending, processing, completed, failed, or dead)"
            ))),
        }
    }
}

/// A unit of work: an opaque shell command plus its retry bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub command: String,
    pub state: JobState,
    pub attempts: u32,
    pub max_retries: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Not claimable before this instant; absent means eligible now.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_eligible_at: Option<DateTime<Utc>>,
}

impl Job {
    /// True if a worker may claim this job at `now`.
    pub fn is_eligible(&self, now: DateTime<Utc>) -> bool {
        self.state == JobState::Pending && self.next_eligible_at.map_or(true, |t| t <= now)
    }
}

/// External job specification, as supplied to `enqueue`.
///
/// Untyped input is validated and converted here, at the boundary; nothing
/// malformed reaches the registry.
#[derive(Debug, Deserialize)]
pub struct JobSpec {
    #[serde(default)]
    pub id: Option<String>,
    pub command: String,
    #[serde(default)]
    pub max_retries: Option<u32>,
}

impl JobSpec {
    /// Parse a JSON job specification, rejecting malformed input.
    pub fn parse(input: &str) -> Result<Self> {
        let spec: JobSpec = serde_json::from_str(input)
            .map_err(|e| QueueError::InvalidInput(e.to_string()))?;
        if spec.command.trim().is_empty() {
            return Err(QueueError::InvalidInput(
                "'command' must not be empty".to_string(),
            ));
        }
        if let Some(id) = &spec.id {
            if id.trim().is_empty() {
                return Err(QueueError::InvalidInput("'id' must not be empty".to_string()));
            }
        }
        Ok(spec)
    }

    /// Build the stored job, filling defaults from the current config.
    pub fn into_job(self, config: &QueueConfig, now: DateTime<Utc>) -> Job {
        Job {
            id: self.id.unwrap_or_else(|| Uuid::new_v4().to_string()),
            command: self.command,
            state: JobState::Pending,
            attempts: 0,
            max_retries: self.max_retries.unwrap_or(config.max_retries),
            created_at: now,
            updated_at: now,
            next_eligible_at: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spec_requires_command() {
        let err = JobSpec::parse(r#"{"id":"j1"}"#).unwrap_err();
        assert!(matches!(err, QueueError::InvalidInput(_)));
        assert!(err.to_string().contains("command"));
    }

    #[test]
    fn spec_rejects_malformed_json() {
        assert!(matches!(
            JobSpec::parse("{not json"),
            Err(QueueError::InvalidInput(_))
        ));
    }

    #[test]
    fn spec_rejects_empty_command() {
        assert!(matches!(
            JobSpec::parse(r#"{"command":"  "}"#),
            Err(QueueError::InvalidInput(_))
        ));
    }

    #[test]
    fn spec_generates_id_when_absent() {
        let spec = JobSpec::parse(r#"{"command":"echo hi"}"#).unwrap();
        let job = spec.into_job(&QueueConfig::default(), Utc::now());
        assert!(!job.id.is_empty());
        assert_eq!(job.state, JobState::Pending);
        assert_eq!(job.attempts, 0);
        assert_eq!(job.max_retries, 3);
    }

    #[test]
    fn spec_keeps_explicit_fields() {
        let spec = JobSpec::parse(r#"{"id":"j1","command":"true","max_retries":5}"#).unwrap();
        let job = spec.into_job(&QueueConfig::default(), Utc::now());
        assert_eq!(job.id, "j1");
        assert_eq!(job.max_retries, 5);
    }

    #[test]
    fn state_round_trips_through_str() {
        for state in [
            JobState::Pending,
            JobState::Processing,
            JobState::Completed,
            JobState::Failed,
            JobState::Dead,
        ] {
            assert_eq!(state.to_string().parse::<JobState>().unwrap(), state);
        }
        assert!("running".parse::<JobState>().is_err());
    }

    #[test]
    fn eligibility_honors_next_eligible_at() {
        let now = Utc::now();
        let mut job = JobSpec::parse(r#"{"command":"true"}"#)
            .unwrap()
            .into_job(&QueueConfig::default(), now);
        assert!(job.is_eligible(now));

        job.next_eligible_at = Some(now + chrono::Duration::seconds(10));
        assert!(!job.is_eligible(now));
        assert!(job.is_eligible(now + chrono::Duration::seconds(10)));

        job.state = JobState::Processing;
        assert!(!job.is_eligible(now + chrono::Duration::seconds(20)));
    }
}
