//! Job record and its status state machine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::task_list::TaskList;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    PendingApproval,
    Processing,
    Completed,
    Rejected,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::PendingApproval => "pending_approval",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Rejected => "rejected",
            JobStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending_approval" => Some(JobStatus::PendingApproval),
            "processing" => Some(JobStatus::Processing),
            "completed" => Some(JobStatus::Completed),
            "rejected" => Some(JobStatus::Rejected),
            "failed" => Some(JobStatus::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Rejected
        )
    }

    /// Edges of the lifecycle graph. Processing -> PendingApproval is the
    /// compensating revert after a failed publish.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        use JobStatus::*;
        matches!(
            (self, next),
            (PendingApproval, Processing)
                | (PendingApproval, Rejected)
                | (Processing, PendingApproval)
                | (Processing, Completed)
                | (Processing, Failed)
        )
    }

    /// Whether `update_status` may write the consumer result `next` over
    /// `self`: a graph edge, or a re-write of the same outcome so redelivered
    /// results stay idempotent.
    pub fn accepts_result(&self, next: JobStatus) -> bool {
        if !matches!(next, JobStatus::Completed | JobStatus::Failed) {
            return false;
        }
        self.can_transition_to(next) || *self == next
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub event_id: String,
    pub uid: String,
    pub status: JobStatus,
    pub task_list: TaskList,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub approved_at: Option<DateTime<Utc>>,
    pub captions: Vec<String>,
    pub images: Vec<String>,
    pub videos: Vec<String>,
    pub warnings: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Job {
    pub fn new(event_id: impl Into<String>, uid: impl Into<String>, task_list: TaskList) -> Self {
        let now = Utc::now();
        Job {
            event_id: event_id.into(),
            uid: uid.into(),
            status: JobStatus::PendingApproval,
            task_list,
            created_at: now,
            updated_at: now,
            approved_at: None,
            captions: Vec::new(),
            images: Vec::new(),
            videos: Vec::new(),
            warnings: Vec::new(),
            error: None,
        }
    }

    /// Append generated asset URLs, skipping any already recorded.
    pub fn append_assets(&mut self, assets: &AssetUrls) {
        append_unique(&mut self.captions, assets.captions_url.as_deref());
        append_unique(&mut self.images, assets.image_url.as_deref());
        append_unique(&mut self.videos, assets.video_url.as_deref());
    }

    /// Append warnings not already recorded, keeping their order.
    pub fn append_warnings<'a>(&mut self, warnings: impl IntoIterator<Item = &'a String>) {
        for warning in warnings {
            append_unique(&mut self.warnings, Some(warning));
        }
    }
}

fn append_unique(list: &mut Vec<String>, value: Option<&str>) {
    if let Some(v) = value {
        if !list.iter().any(|existing| existing == v) {
            list.push(v.to_string());
        }
    }
}

/// Storage URL per generated asset kind.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetUrls {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub captions_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_url: Option<String>,
}

impl AssetUrls {
    pub fn is_empty(&self) -> bool {
        self.captions_url.is_none() && self.image_url.is_none() && self.video_url.is_none()
    }

    pub fn kinds(&self) -> Vec<&'static str> {
        let mut kinds = Vec::new();
        if self.captions_url.is_some() {
            kinds.push("captions");
        }
        if self.image_url.is_some() {
            kinds.push("image");
        }
        if self.video_url.is_some() {
            kinds.push("video");
        }
        kinds
    }
}

/// Result written by the consumer when it finishes a job.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusUpdate {
    pub status: JobStatus,
    pub assets: AssetUrls,
    pub warnings: Vec<String>,
    pub error: Option<String>,
}

impl StatusUpdate {
    pub fn completed(assets: AssetUrls) -> Self {
        StatusUpdate {
            status: JobStatus::Completed,
            assets,
            warnings: Vec::new(),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        StatusUpdate {
            status: JobStatus::Failed,
            assets: AssetUrls::default(),
            warnings: Vec::new(),
            error: Some(error.into()),
        }
    }

    pub fn with_warnings(mut self, warnings: Vec<String>) -> Self {
        self.warnings = warnings;
        self
    }
}
