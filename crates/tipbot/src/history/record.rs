//! Post record types.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::errors::{StorageError, StorageResult};

/// Terminal status of a post attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PostStatus {
    /// Published on the platform.
    Success,
    /// Reached the posting stage (or ran out of candidates) and did not publish.
    Failed,
    /// Candidate refused by the content filter.
    Rejected,
}

impl PostStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failed => "failed",
            Self::Rejected => "rejected",
        }
    }
}

impl fmt::Display for PostStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug)]
#[error("Unknown post status '{0}'")]
pub struct ParseStatusError(String);

impl FromStr for PostStatus {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "success" => Ok(Self::Success),
            "failed" => Ok(Self::Failed),
            "rejected" => Ok(Self::Rejected),
            other => Err(ParseStatusError(other.to_string())),
        }
    }
}

impl ToSql for PostStatus {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for PostStatus {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|e| FromSqlError::Other(Box::new(e)))
    }
}

/// A stored post attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostRecord {
    pub id: i64,
    pub content: String,
    pub content_hash: String,
    pub hash_version: u32,
    pub created_at: DateTime<Utc>,
    pub status: PostStatus,
    pub error_message: Option<String>,
    pub topic: String,
    pub platform_post_id: Option<String>,
}

/// A record about to be appended. The store computes the hash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPostRecord {
    pub content: String,
    pub topic: String,
    pub status: PostStatus,
    pub error_message: Option<String>,
    pub platform_post_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl NewPostRecord {
    pub fn success(
        content: impl Into<String>,
        topic: impl Into<String>,
        platform_post_id: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            content: content.into(),
            topic: topic.into(),
            status: PostStatus::Success,
            error_message: None,
            platform_post_id: Some(platform_post_id.into()),
            created_at,
        }
    }

    pub fn failed(
        content: impl Into<String>,
        topic: impl Into<String>,
        error_message: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            content: content.into(),
            topic: topic.into(),
            status: PostStatus::Failed,
            error_message: Some(error_message.into()),
            platform_post_id: None,
            created_at,
        }
    }

    pub fn rejected(
        content: impl Into<String>,
        topic: impl Into<String>,
        reason: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            status: PostStatus::Rejected,
            ..Self::failed(content, topic, reason, created_at)
        }
    }

    /// `error_message` is present iff the status is not `success`.
    pub fn validate(&self) -> StorageResult<()> {
        match (self.status, &self.error_message) {
            (PostStatus::Success, Some(_)) => Err(StorageError::InvalidRecord {
                reason: "success records carry no error message".to_string(),
            }),
            (PostStatus::Failed | PostStatus::Rejected, None) => {
                Err(StorageError::InvalidRecord {
                    reason: format!("{} records need an error message", self.status),
                })
            }
            _ => Ok(()),
        }
    }
}

/// Record counts per status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostStats {
    pub total: u64,
    pub success: u64,
    pub failed: u64,
    pub rejected: u64,
}
