//! Build status records and their merge rules.

use chrono::{DateTime, Utc};
use derive_more::Display;
use serde::{Deserialize, Serialize};

use crate::Error;

/// Lifecycle of a build. Serialized as its numeric code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[serde(into = "u8", try_from = "u8")]
pub enum BuildStatus {
    #[display("pending")]
    Pending = 1,
    #[display("building")]
    Building = 2,
    #[display("succeeded")]
    Succeeded = 3,
    #[display("failed")]
    Failed = 4,
}

impl BuildStatus {
    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, BuildStatus::Succeeded | BuildStatus::Failed)
    }

    /// Legal edges: Pending -> Building -> {Succeeded, Failed}.
    pub fn can_transition_to(self, next: BuildStatus) -> bool {
        matches!(
            (self, next),
            (BuildStatus::Pending, BuildStatus::Building)
                | (BuildStatus::Building, BuildStatus::Succeeded)
                | (BuildStatus::Building, BuildStatus::Failed)
        )
    }
}

impl From<BuildStatus> for u8 {
    fn from(status: BuildStatus) -> Self {
        status.code()
    }
}

impl TryFrom<u8> for BuildStatus {
    type Error = Error;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        match code {
            1 => Ok(BuildStatus::Pending),
            2 => Ok(BuildStatus::Building),
            3 => Ok(BuildStatus::Succeeded),
            4 => Ok(BuildStatus::Failed),
            other => Err(Error::Validation(format!("unknown build status code {}", other))),
        }
    }
}

/// Persisted state of one build, keyed by image name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildStatusRecord {
    pub status: BuildStatus,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    #[serde(rename = "error")]
    pub error: String,
    pub logs: String,
}

/// Partial update merged into a stored record.
///
/// `None` fields mean "no change"; `logs` is always appended.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusUpdate {
    pub status: Option<BuildStatus>,
    pub end_time: Option<DateTime<Utc>>,
    pub error: Option<String>,
    pub logs: String,
}

/// Outcome of merging an update's status field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Unchanged,
    Advanced { from: BuildStatus, to: BuildStatus },
    Rejected { from: BuildStatus, to: BuildStatus },
}

impl StatusUpdate {
    pub fn status(status: BuildStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    pub fn logs(logs: impl Into<String>) -> Self {
        Self {
            logs: logs.into(),
            ..Default::default()
        }
    }

    pub fn with_end_time(mut self, end_time: DateTime<Utc>) -> Self {
        self.end_time = Some(end_time);
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    pub fn with_logs(mut self, logs: impl Into<String>) -> Self {
        self.logs = logs.into();
        self
    }
}

impl BuildStatusRecord {
    /// Fresh record for a just-submitted build.
    pub fn pending(start_time: DateTime<Utc>, logs: impl Into<String>) -> Self {
        Self {
            status: BuildStatus::Pending,
            start_time,
            end_time: None,
            error: String::new(),
            logs: logs.into(),
        }
    }

    /// Merge a partial update into this record.
    ///
    /// Illegal status transitions are ignored; every other field still merges.
    pub fn merge(&mut self, update: StatusUpdate) -> Transition {
        if let Some(end_time) = update.end_time {
            self.end_time = Some(end_time);
        }
        if let Some(error) = update.error {
            self.error = error;
        }
        self.logs.push_str(&update.logs);

        match update.status {
            None => Transition::Unchanged,
            Some(next) if next == self.status => Transition::Unchanged,
            Some(next) if self.status.can_transition_to(next) => {
                let from = self.status;
                self.status = next;
                Transition::Advanced { from, to: next }
            }
            Some(next) => Transition::Rejected {
                from: self.status,
                to: next,
            },
        }
    }
}

/// Status query reply, with the status name spelled out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusReport {
    pub status: BuildStatus,
    pub status_string: String,
    pub error: String,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub logs: String,
}

impl From<BuildStatusRecord> for StatusReport {
    fn from(record: BuildStatusRecord) -> Self {
        Self {
            status: record.status,
            status_string: record.status.to_string(),
            error: record.error,
            start_time: record.start_time,
            end_time: record.end_time,
            logs: record.logs,
        }
    }
}
