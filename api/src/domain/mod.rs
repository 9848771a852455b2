pub mod brand;
pub mod job;
pub mod jobs;
pub mod platform;
pub mod task_list;

pub use brand::{BrandColor, BrandStyle, BrandTone, ColorUsage};
pub use job::{AssetUrls, Job, JobStatus, StatusUpdate};
pub use platform::{Platform, PlatformConstraints, TargetPlatforms};
pub use task_list::{CaptionConfig, ImageConfig, TaskList, TaskListDraft, VideoConfig};

/// Input that fails a domain invariant.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct ValidationError(String);

impl ValidationError {
    pub fn new(message: impl Into<String>) -> Self {
        ValidationError(message.into())
    }
}
