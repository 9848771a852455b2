//! Job store: persistence for job records with atomic state transitions.
//!
//! Query functions use the generic Executor pattern so they work with both
//! `&PgPool` and `&mut PgConnection` inside a transaction. `PgJobStore` and
//! `MemoryJobStore` implement the same `JobStore` contract.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::{Executor, PgPool, Postgres};
use std::collections::HashMap;
use tokio::sync::RwLock;

use super::job::{Job, JobStatus, StatusUpdate};
use super::task_list::TaskList;

#[derive(Debug, thiserror::Error)]
pub enum JobStoreError {
    #[error("Job {0} already exists")]
    AlreadyExists(String),
    #[error("Job {0} not found")]
    NotFound(String),
    #[error("User {uid} does not own job {event_id}")]
    PermissionDenied { event_id: String, uid: String },
    #[error("Job {event_id} is {current}, expected {expected}")]
    InvalidState {
        event_id: String,
        current: JobStatus,
        expected: String,
    },
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("Corrupt job record {event_id}: {reason}")]
    Corrupt { event_id: String, reason: String },
}

#[async_trait]
pub trait JobStore: Send + Sync {
    /// Insert a new job in `pending_approval`.
    async fn create(&self, event_id: &str, uid: &str, task_list: &TaskList)
    -> Result<Job, JobStoreError>;

    async fn get(&self, event_id: &str) -> Result<Job, JobStoreError>;

    /// Atomically move an owned, pending job to `processing`.
    async fn approve(&self, event_id: &str, uid: &str) -> Result<Job, JobStoreError>;

    /// Compensating transition back to `pending_approval`. A job that is no
    /// longer processing is left alone.
    async fn revert_to_pending(&self, event_id: &str) -> Result<(), JobStoreError>;

    /// Write the consumer's result. Asset URLs already present are not
    /// appended again.
    async fn update_status(
        &self,
        event_id: &str,
        update: &StatusUpdate,
    ) -> Result<Job, JobStoreError>;

    async fn add_warning(&self, event_id: &str, warning: &str) -> Result<Job, JobStoreError>;
}

fn check_approvable(job: &Job, uid: &str) -> Result<(), JobStoreError> {
    if job.uid != uid {
        return Err(JobStoreError::PermissionDenied {
            event_id: job.event_id.clone(),
            uid: uid.to_string(),
        });
    }
    if !job.status.can_transition_to(JobStatus::Processing) {
        return Err(JobStoreError::InvalidState {
            event_id: job.event_id.clone(),
            current: job.status,
            expected: JobStatus::PendingApproval.to_string(),
        });
    }
    Ok(())
}

fn check_result(job: &Job, update: &StatusUpdate) -> Result<(), JobStoreError> {
    if !job.status.accepts_result(update.status) {
        return Err(JobStoreError::InvalidState {
            event_id: job.event_id.clone(),
            current: job.status,
            expected: JobStatus::Processing.to_string(),
        });
    }
    Ok(())
}

fn apply_result(job: &mut Job, update: &StatusUpdate) {
    job.append_assets(&update.assets);
    job.append_warnings(&update.warnings);
    job.status = update.status;
    if update.error.is_some() {
        job.error = update.error.clone();
    }
    job.updated_at = Utc::now();
}

// ============================================================================
// In-memory store
// ============================================================================

/// Process-local store used in mock mode and tests. Each operation performs
/// its read-check-write under a single write guard.
#[derive(Default)]
pub struct MemoryJobStore {
    jobs: RwLock<HashMap<String, Job>>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn create(
        &self,
        event_id: &str,
        uid: &str,
        task_list: &TaskList,
    ) -> Result<Job, JobStoreError> {
        let mut jobs = self.jobs.write().await;
        if jobs.contains_key(event_id) {
            return Err(JobStoreError::AlreadyExists(event_id.to_string()));
        }
        let job = Job::new(event_id, uid, task_list.clone());
        jobs.insert(event_id.to_string(), job.clone());
        Ok(job)
    }

    async fn get(&self, event_id: &str) -> Result<Job, JobStoreError> {
        self.jobs
            .read()
            .await
            .get(event_id)
            .cloned()
            .ok_or_else(|| JobStoreError::NotFound(event_id.to_string()))
    }

    async fn approve(&self, event_id: &str, uid: &str) -> Result<Job, JobStoreError> {
        let mut jobs = self.jobs.write().await;
        let job = jobs
            .get_mut(event_id)
            .ok_or_else(|| JobStoreError::NotFound(event_id.to_string()))?;
        check_approvable(job, uid)?;
        let now = Utc::now();
        job.status = JobStatus::Processing;
        job.approved_at = Some(now);
        job.updated_at = now;
        Ok(job.clone())
    }

    async fn revert_to_pending(&self, event_id: &str) -> Result<(), JobStoreError> {
        let mut jobs = self.jobs.write().await;
        let job = jobs
            .get_mut(event_id)
            .ok_or_else(|| JobStoreError::NotFound(event_id.to_string()))?;
        if !job.status.can_transition_to(JobStatus::PendingApproval) {
            tracing::warn!(
                event_id,
                status = %job.status,
                "[jobs] revert skipped, job is no longer processing"
            );
            return Ok(());
        }
        job.status = JobStatus::PendingApproval;
        job.approved_at = None;
        job.updated_at = Utc::now();
        Ok(())
    }

    async fn update_status(
        &self,
        event_id: &str,
        update: &StatusUpdate,
    ) -> Result<Job, JobStoreError> {
        let mut jobs = self.jobs.write().await;
        let job = jobs
            .get_mut(event_id)
            .ok_or_else(|| JobStoreError::NotFound(event_id.to_string()))?;
        check_result(job, update)?;
        apply_result(job, update);
        Ok(job.clone())
    }

    async fn add_warning(&self, event_id: &str, warning: &str) -> Result<Job, JobStoreError> {
        let mut jobs = self.jobs.write().await;
        let job = jobs
            .get_mut(event_id)
            .ok_or_else(|| JobStoreError::NotFound(event_id.to_string()))?;
        let warning = warning.to_string();
        job.append_warnings([&warning]);
        job.updated_at = Utc::now();
        Ok(job.clone())
    }
}

// ============================================================================
// Postgres store
// ============================================================================

#[derive(Debug, sqlx::FromRow)]
struct JobRow {
    event_id: String,
    uid: String,
    status: String,
    task_list: Json<TaskList>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    approved_at: Option<DateTime<Utc>>,
    captions: Vec<String>,
    images: Vec<String>,
    videos: Vec<String>,
    warnings: Vec<String>,
    error: Option<String>,
}

impl TryFrom<JobRow> for Job {
    type Error = JobStoreError;

    fn try_from(row: JobRow) -> Result<Self, Self::Error> {
        let status = JobStatus::parse(&row.status).ok_or_else(|| JobStoreError::Corrupt {
            event_id: row.event_id.clone(),
            reason: format!("unknown status '{}'", row.status),
        })?;
        Ok(Job {
            event_id: row.event_id,
            uid: row.uid,
            status,
            task_list: row.task_list.0,
            created_at: row.created_at,
            updated_at: row.updated_at,
            approved_at: row.approved_at,
            captions: row.captions,
            images: row.images,
            videos: row.videos,
            warnings: row.warnings,
            error: row.error,
        })
    }
}

const JOB_COLUMNS: &str = "event_id, uid, status, task_list, created_at, updated_at, \
     approved_at, captions, images, videos, warnings, error";

/// Insert a job row. Returns `None` when the event_id already exists.
pub async fn insert_job<'e, E>(executor: E, job: &Job) -> Result<Option<String>, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    let row: Option<(String,)> = sqlx::query_as(
        r#"
        INSERT INTO jobs (event_id, uid, status, task_list, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6)
        ON CONFLICT (event_id) DO NOTHING
        RETURNING event_id
        "#,
    )
    .bind(&job.event_id)
    .bind(&job.uid)
    .bind(job.status.as_str())
    .bind(Json(&job.task_list))
    .bind(job.created_at)
    .bind(job.updated_at)
    .fetch_optional(executor)
    .await?;
    Ok(row.map(|r| r.0))
}

async fn fetch_job<'e, E>(
    executor: E,
    event_id: &str,
    for_update: bool,
) -> Result<Option<JobRow>, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    let lock = if for_update { " FOR UPDATE" } else { "" };
    let sql = format!("SELECT {} FROM jobs WHERE event_id = $1{}", JOB_COLUMNS, lock);
    sqlx::query_as::<_, JobRow>(&sql)
        .bind(event_id)
        .fetch_optional(executor)
        .await
}

/// Conditional revert. Returns the number of rows moved back to pending.
pub async fn revert_processing_job<'e, E>(executor: E, event_id: &str) -> Result<u64, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    let result = sqlx::query(
        r#"
        UPDATE jobs
        SET status = 'pending_approval', approved_at = NULL, updated_at = NOW()
        WHERE event_id = $1 AND status = 'processing'
        "#,
    )
    .bind(event_id)
    .execute(executor)
    .await?;
    Ok(result.rows_affected())
}

async fn write_job<'e, E>(executor: E, job: &Job) -> Result<(), sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    sqlx::query(
        r#"
        UPDATE jobs
        SET status = $2, updated_at = $3, approved_at = $4,
            captions = $5, images = $6, videos = $7, warnings = $8, error = $9
        WHERE event_id = $1
        "#,
    )
    .bind(&job.event_id)
    .bind(job.status.as_str())
    .bind(job.updated_at)
    .bind(job.approved_at)
    .bind(&job.captions)
    .bind(&job.images)
    .bind(&job.videos)
    .bind(&job.warnings)
    .bind(&job.error)
    .execute(executor)
    .await?;
    Ok(())
}

pub struct PgJobStore {
    db: PgPool,
}

impl PgJobStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl JobStore for PgJobStore {
    async fn create(
        &self,
        event_id: &str,
        uid: &str,
        task_list: &TaskList,
    ) -> Result<Job, JobStoreError> {
        let job = Job::new(event_id, uid, task_list.clone());
        insert_job(&self.db, &job)
            .await?
            .ok_or_else(|| JobStoreError::AlreadyExists(event_id.to_string()))?;
        Ok(job)
    }

    async fn get(&self, event_id: &str) -> Result<Job, JobStoreError> {
        fetch_job(&self.db, event_id, false)
            .await?
            .ok_or_else(|| JobStoreError::NotFound(event_id.to_string()))?
            .try_into()
    }

    async fn approve(&self, event_id: &str, uid: &str) -> Result<Job, JobStoreError> {
        // Row lock serialises concurrent approvals; the loser sees `processing`.
        let mut tx = self.db.begin().await?;
        let mut job: Job = fetch_job(&mut *tx, event_id, true)
            .await?
            .ok_or_else(|| JobStoreError::NotFound(event_id.to_string()))?
            .try_into()?;
        check_approvable(&job, uid)?;

        let now = Utc::now();
        job.status = JobStatus::Processing;
        job.approved_at = Some(now);
        job.updated_at = now;
        write_job(&mut *tx, &job).await?;
        tx.commit().await?;
        Ok(job)
    }

    async fn revert_to_pending(&self, event_id: &str) -> Result<(), JobStoreError> {
        if revert_processing_job(&self.db, event_id).await? == 1 {
            return Ok(());
        }
        let job = self.get(event_id).await?;
        tracing::warn!(
            event_id,
            status = %job.status,
            "[jobs] revert skipped, job is no longer processing"
        );
        Ok(())
    }

    async fn update_status(
        &self,
        event_id: &str,
        update: &StatusUpdate,
    ) -> Result<Job, JobStoreError> {
        let mut tx = self.db.begin().await?;
        let mut job: Job = fetch_job(&mut *tx, event_id, true)
            .await?
            .ok_or_else(|| JobStoreError::NotFound(event_id.to_string()))?
            .try_into()?;
        check_result(&job, update)?;
        apply_result(&mut job, update);
        write_job(&mut *tx, &job).await?;
        tx.commit().await?;
        Ok(job)
    }

    async fn add_warning(&self, event_id: &str, warning: &str) -> Result<Job, JobStoreError> {
        let row = sqlx::query_as::<_, JobRow>(&format!(
            r#"
            UPDATE jobs
            SET warnings = CASE WHEN $2 = ANY(warnings) THEN warnings
                                ELSE array_append(warnings, $2) END,
                updated_at = NOW()
            WHERE event_id = $1
            RETURNING {}
            "#,
            JOB_COLUMNS
        ))
        .bind(event_id)
        .bind(warning)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| JobStoreError::NotFound(event_id.to_string()))?;
        row.try_into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::job::AssetUrls;
    use crate::domain::platform::{Platform, TargetPlatforms};
    use std::sync::Arc;

    fn task_list() -> TaskList {
        let platforms = TargetPlatforms::try_from(vec![Platform::Twitter]).unwrap();
        TaskList::fallback("Promote the summer sale", platforms, None)
    }

    async fn store_with_job() -> MemoryJobStore {
        let store = MemoryJobStore::new();
        store.create("evt-1", "owner", &task_list()).await.unwrap();
        store
    }

    #[tokio::test]
    async fn test_create_rejects_duplicate() {
        let store = store_with_job().await;
        let err = store.create("evt-1", "owner", &task_list()).await.unwrap_err();
        assert!(matches!(err, JobStoreError::AlreadyExists(_)));
    }

    #[tokio::test]
    async fn test_get_missing() {
        let store = MemoryJobStore::new();
        assert!(matches!(
            store.get("nope").await,
            Err(JobStoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_approve_sets_processing() {
        let store = store_with_job().await;
        let job = store.approve("evt-1", "owner").await.unwrap();
        assert_eq!(job.status, JobStatus::Processing);
        assert!(job.approved_at.is_some());
    }

    #[tokio::test]
    async fn test_approve_checks_owner_before_state() {
        let store = store_with_job().await;
        store.approve("evt-1", "owner").await.unwrap();
        // still PermissionDenied even though the job is no longer pending
        let err = store.approve("evt-1", "intruder").await.unwrap_err();
        assert!(matches!(err, JobStoreError::PermissionDenied { .. }));
    }

    #[tokio::test]
    async fn test_second_approve_is_invalid_state() {
        let store = store_with_job().await;
        store.approve("evt-1", "owner").await.unwrap();
        let err = store.approve("evt-1", "owner").await.unwrap_err();
        assert!(matches!(err, JobStoreError::InvalidState { .. }));
    }

    #[tokio::test]
    async fn test_concurrent_approve_exactly_one_wins() {
        let store = Arc::new(store_with_job().await);
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = store.clone();
                tokio::spawn(async move { store.approve("evt-1", "owner").await })
            })
            .collect();

        let mut wins = 0;
        let mut invalid = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => wins += 1,
                Err(JobStoreError::InvalidState { .. }) => invalid += 1,
                Err(e) => panic!("unexpected error: {}", e),
            }
        }
        assert_eq!(wins, 1);
        assert_eq!(invalid, 7);
    }

    #[tokio::test]
    async fn test_revert_only_from_processing() {
        let store = store_with_job().await;
        store.approve("evt-1", "owner").await.unwrap();
        store.revert_to_pending("evt-1").await.unwrap();
        let job = store.get("evt-1").await.unwrap();
        assert_eq!(job.status, JobStatus::PendingApproval);
        assert!(job.approved_at.is_none());

        // no-op on a pending job
        store.revert_to_pending("evt-1").await.unwrap();
        assert_eq!(store.get("evt-1").await.unwrap().status, JobStatus::PendingApproval);
    }

    #[tokio::test]
    async fn test_revert_does_not_touch_completed_job() {
        let store = store_with_job().await;
        store.approve("evt-1", "owner").await.unwrap();
        store
            .update_status("evt-1", &StatusUpdate::completed(AssetUrls::default()))
            .await
            .unwrap();
        store.revert_to_pending("evt-1").await.unwrap();
        assert_eq!(store.get("evt-1").await.unwrap().status, JobStatus::Completed);
    }

    #[tokio::test]
    async fn test_update_status_idempotent_append() {
        let store = store_with_job().await;
        store.approve("evt-1", "owner").await.unwrap();
        let update = StatusUpdate::completed(AssetUrls {
            captions_url: Some("https://storage.googleapis.com/b/evt-1/captions.json".into()),
            image_url: Some("https://storage.googleapis.com/b/evt-1/image.png".into()),
            video_url: None,
        });
        store.update_status("evt-1", &update).await.unwrap();
        let job = store.update_status("evt-1", &update).await.unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.captions.len(), 1);
        assert_eq!(job.images.len(), 1);
        assert!(job.videos.is_empty());
    }

    #[tokio::test]
    async fn test_result_warnings_written_once() {
        let store = store_with_job().await;
        store.approve("evt-1", "owner").await.unwrap();
        store.add_warning("evt-1", "orchestration failed").await.unwrap();
        let update = StatusUpdate::failed("nothing generated").with_warnings(vec![
            "orchestration failed".to_string(),
            "video too large".to_string(),
        ]);
        store.update_status("evt-1", &update).await.unwrap();
        let job = store.update_status("evt-1", &update).await.unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.warnings, vec!["orchestration failed", "video too large"]);
    }

    #[tokio::test]
    async fn test_update_status_rejects_pending_job() {
        let store = store_with_job().await;
        let err = store
            .update_status("evt-1", &StatusUpdate::failed("boom"))
            .await
            .unwrap_err();
        assert!(matches!(err, JobStoreError::InvalidState { .. }));
    }

    #[tokio::test]
    async fn test_failed_records_error() {
        let store = store_with_job().await;
        store.approve("evt-1", "owner").await.unwrap();
        let job = store
            .update_status("evt-1", &StatusUpdate::failed("no asset generated"))
            .await
            .unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.error.as_deref(), Some("no asset generated"));
    }

    #[tokio::test]
    async fn test_add_warning() {
        let store = store_with_job().await;
        store.add_warning("evt-1", "first").await.unwrap();
        store.add_warning("evt-1", "second").await.unwrap();
        let job = store.add_warning("evt-1", "first").await.unwrap();
        assert_eq!(job.warnings, vec!["first", "second"]);
        assert!(matches!(
            store.add_warning("missing", "x").await,
            Err(JobStoreError::NotFound(_))
        ));
    }

    /// Runs against a real Postgres when `TEST_DATABASE_URL` is set and
    /// skips otherwise.
    mod postgres {
        use super::*;
        use sqlx::postgres::PgPoolOptions;

        async fn pg_store() -> Option<PgJobStore> {
            let Ok(url) = std::env::var("TEST_DATABASE_URL") else {
                eprintln!("TEST_DATABASE_URL not set, skipping Postgres job store test");
                return None;
            };
            let pool = PgPoolOptions::new()
                .max_connections(8)
                .connect(&url)
                .await
                .unwrap();
            sqlx::migrate!("./migrations").run(&pool).await.unwrap();
            Some(PgJobStore::new(pool))
        }

        async fn seeded(store: &PgJobStore) -> String {
            let event_id = uuid::Uuid::now_v7().to_string();
            store.create(&event_id, "owner", &task_list()).await.unwrap();
            event_id
        }

        #[tokio::test]
        async fn test_pg_create_and_get() {
            let Some(store) = pg_store().await else { return };
            let event_id = seeded(&store).await;
            let err = store.create(&event_id, "owner", &task_list()).await.unwrap_err();
            assert!(matches!(err, JobStoreError::AlreadyExists(_)));

            let job = store.get(&event_id).await.unwrap();
            assert_eq!(job.status, JobStatus::PendingApproval);
            assert_eq!(job.uid, "owner");
            assert_eq!(job.task_list.goal, task_list().goal);
        }

        #[tokio::test]
        async fn test_pg_concurrent_approve_exactly_one_wins() {
            let Some(store) = pg_store().await else { return };
            let store = Arc::new(store);
            let event_id = seeded(&store).await;

            let handles: Vec<_> = (0..4)
                .map(|_| {
                    let store = store.clone();
                    let event_id = event_id.clone();
                    tokio::spawn(async move { store.approve(&event_id, "owner").await })
                })
                .collect();
            let mut wins = 0;
            for handle in handles {
                match handle.await.unwrap() {
                    Ok(_) => wins += 1,
                    Err(JobStoreError::InvalidState { .. }) => {}
                    Err(e) => panic!("unexpected error: {}", e),
                }
            }
            assert_eq!(wins, 1);

            let err = store.approve(&event_id, "intruder").await.unwrap_err();
            assert!(matches!(err, JobStoreError::PermissionDenied { .. }));
        }

        #[tokio::test]
        async fn test_pg_revert_only_from_processing() {
            let Some(store) = pg_store().await else { return };
            let event_id = seeded(&store).await;
            store.approve(&event_id, "owner").await.unwrap();
            store.revert_to_pending(&event_id).await.unwrap();
            let job = store.get(&event_id).await.unwrap();
            assert_eq!(job.status, JobStatus::PendingApproval);
            assert!(job.approved_at.is_none());

            store.approve(&event_id, "owner").await.unwrap();
            store
                .update_status(&event_id, &StatusUpdate::completed(AssetUrls::default()))
                .await
                .unwrap();
            store.revert_to_pending(&event_id).await.unwrap();
            assert_eq!(store.get(&event_id).await.unwrap().status, JobStatus::Completed);
        }

        #[tokio::test]
        async fn test_pg_update_status_and_warnings_idempotent() {
            let Some(store) = pg_store().await else { return };
            let event_id = seeded(&store).await;
            assert!(matches!(
                store.update_status(&event_id, &StatusUpdate::failed("early")).await,
                Err(JobStoreError::InvalidState { .. })
            ));
            store.approve(&event_id, "owner").await.unwrap();

            store.add_warning(&event_id, "fallback used").await.unwrap();
            store.add_warning(&event_id, "fallback used").await.unwrap();
            let update = StatusUpdate::completed(AssetUrls {
                captions_url: Some(format!("https://storage.googleapis.com/b/{}/captions.json", event_id)),
                image_url: None,
                video_url: None,
            })
            .with_warnings(vec!["fallback used".to_string(), "video skipped".to_string()]);
            store.update_status(&event_id, &update).await.unwrap();
            let job = store.update_status(&event_id, &update).await.unwrap();

            assert_eq!(job.status, JobStatus::Completed);
            assert_eq!(job.captions.len(), 1);
            assert!(job.images.is_empty());
            assert_eq!(job.warnings, vec!["fallback used", "video skipped"]);
            assert!(matches!(
                store.add_warning("missing-event", "x").await,
                Err(JobStoreError::NotFound(_))
            ));
        }
    }
}
