use std::fmt;
use std::str::FromStr;

use chrono::{SecondsFormat, Utc};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::Serialize;

/// RFC 3339 UTC timestamp with fixed millisecond width, so stored values
/// sort lexicographically.
pub fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

macro_rules! text_enum {
    ($name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $text,)+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.pad(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = anyhow::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok(Self::$variant),)+
                    other => anyhow::bail!("unknown {} value: {}", stringify!($name), other),
                }
            }
        }

        impl ToSql for $name {
            fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
                Ok(self.as_str().into())
            }
        }

        impl FromSql for $name {
            fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
                value
                    .as_str()?
                    .parse()
                    .map_err(|e: anyhow::Error| FromSqlError::Other(e.into()))
            }
        }
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

text_enum!(JobStatus {
    Pending => "pending",
    Processing => "processing",
    Completed => "completed",
    Failed => "failed",
});

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogKind {
    Info,
    Success,
    Error,
    Progress,
}

text_enum!(LogKind {
    Info => "info",
    Success => "success",
    Error => "error",
    Progress => "progress",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OutcomeStatus {
    Success,
    Failed,
    /// Transport failure caused by the fetch timeout elapsing.
    Timeout,
}

text_enum!(OutcomeStatus {
    Success => "success",
    Failed => "failed",
    Timeout => "timeout",
});

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogEntry {
    pub timestamp: String,
    #[serde(rename = "type")]
    pub kind: LogKind,
    pub message: String,
}

impl LogEntry {
    pub fn new(kind: LogKind, message: impl Into<String>) -> Self {
        LogEntry {
            timestamp: now_timestamp(),
            kind,
            message: message.into(),
        }
    }
}

/// One extraction run, as persisted.
#[derive(Debug, Clone, Serialize)]
pub struct Job {
    pub id: String,
    pub source_url: String,
    pub domain: String,
    pub status: JobStatus,
    pub total_files: i64,
    pub successful_files: i64,
    pub failed_files: i64,
    pub total_size_bytes: i64,
    pub logs: Vec<LogEntry>,
    pub created_at: String,
    pub completed_at: Option<String>,
}

/// Partial update merged into a job record. `None` fields are left untouched.
#[derive(Debug, Clone, Default)]
pub struct JobUpdate {
    pub status: Option<JobStatus>,
    pub total_files: Option<i64>,
    pub successful_files: Option<i64>,
    pub failed_files: Option<i64>,
    pub total_size_bytes: Option<i64>,
    pub completed_at: Option<String>,
}

impl JobUpdate {
    pub fn status(status: JobStatus) -> Self {
        JobUpdate {
            status: Some(status),
            ..Default::default()
        }
    }

    /// Terminal transition: sets the status and stamps `completed_at`.
    pub fn finish(status: JobStatus) -> Self {
        JobUpdate {
            status: Some(status),
            completed_at: Some(now_timestamp()),
            ..Default::default()
        }
    }
}

/// Outcome row to insert; the store assigns id and timestamp.
#[derive(Debug, Clone)]
pub struct NewOutcome {
    pub job_id: String,
    pub original_url: String,
    pub local_filename: String,
    pub size_bytes: Option<i64>,
    pub status: OutcomeStatus,
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResourceOutcome {
    pub id: i64,
    pub job_id: String,
    pub original_url: String,
    pub local_filename: String,
    pub size_bytes: Option<i64>,
    pub status: OutcomeStatus,
    pub error_message: Option<String>,
    pub created_at: String,
}

/// Prefix `https://` when the requested URL carries no scheme.
pub fn normalize_url(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("https://{}", trimmed)
    }
}

/// Host component of a normalized URL, or an empty string when it has none.
pub fn domain_of(url: &str) -> String {
    url::Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_adds_scheme() {
        assert_eq!(normalize_url("example.com/page"), "https://example.com/page");
        assert_eq!(normalize_url("  example.com "), "https://example.com");
    }

    #[test]
    fn normalize_keeps_existing_scheme() {
        assert_eq!(normalize_url("http://example.com"), "http://example.com");
        assert_eq!(normalize_url("https://example.com/a"), "https://example.com/a");
        assert_eq!(normalize_url("ftp://example.com/a"), "ftp://example.com/a");
    }

    #[test]
    fn domain_is_host_only() {
        assert_eq!(domain_of("https://sub.example.com:8443/x?y=1"), "sub.example.com");
        assert_eq!(domain_of("https://"), "");
    }

    #[test]
    fn status_text_round_trips() {
        for s in [JobStatus::Pending, JobStatus::Processing, JobStatus::Completed, JobStatus::Failed] {
            assert_eq!(s.as_str().parse::<JobStatus>().unwrap(), s);
        }
        assert!("done".parse::<JobStatus>().is_err());
        assert!(JobStatus::Failed.is_terminal());
        assert!(!JobStatus::Processing.is_terminal());
    }

    #[test]
    fn finish_stamps_completion() {
        let update = JobUpdate::finish(JobStatus::Completed);
        assert_eq!(update.status, Some(JobStatus::Completed));
        assert!(update.completed_at.is_some());
        assert!(update.total_files.is_none());
    }
}
