//! Object storage for generated assets and reference images.
//!
//! Objects live under `{event_id}/...` keys in a single bucket and are
//! addressed by their public `https://storage.googleapis.com/{bucket}/{key}`
//! URL.

use async_trait::async_trait;
use futures::StreamExt;
use std::collections::BTreeMap;
use std::future::Future;
use std::time::Duration;
use tokio::sync::RwLock;

use crate::constants::STORAGE_HOST;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Storage backend error: {0}")]
    Backend(String),
    #[error("Object not found: {0}")]
    NotFound(String),
    #[error("Invalid GCS URI format: {0}")]
    InvalidUri(String),
    #[error("Storage {0} timed out after {1:?}")]
    Timeout(String, Duration),
}

/// Bound a storage call. Object stores are remote and can stall.
pub async fn with_storage_timeout<T, F>(limit: Duration, what: &str, call: F) -> Result<T, StorageError>
where
    F: Future<Output = Result<T, StorageError>>,
{
    tokio::time::timeout(limit, call)
        .await
        .unwrap_or_else(|_| Err(StorageError::Timeout(what.to_string(), limit)))
}

#[async_trait]
pub trait ObjectStorage: Send + Sync {
    fn bucket(&self) -> &str;

    /// Store an object and return its public URL.
    async fn put(&self, key: &str, data: Vec<u8>, content_type: &str) -> Result<String, StorageError>;

    /// Delete every object whose key starts with `prefix`. Returns how many
    /// were removed.
    async fn delete_prefix(&self, prefix: &str) -> Result<usize, StorageError>;

    fn public_url(&self, key: &str) -> String {
        format!("https://{}/{}/{}", STORAGE_HOST, self.bucket(), key)
    }
}

pub fn asset_key(event_id: &str, filename: &str) -> String {
    format!("{}/{}", event_id, filename)
}

/// Key prefix of a job's uploaded reference image.
pub fn reference_image_prefix(event_id: &str) -> String {
    format!("{}/reference_image", event_id)
}

pub fn reference_image_filename(content_type: &str) -> &'static str {
    match content_type {
        "image/png" => "reference_image.png",
        _ => "reference_image.jpg",
    }
}

/// Split `gs://bucket/path/to/object` into bucket and object path.
pub fn parse_gcs_uri(uri: &str) -> Result<(String, String), StorageError> {
    let rest = uri
        .strip_prefix("gs://")
        .ok_or_else(|| StorageError::InvalidUri(uri.to_string()))?;
    match rest.split_once('/') {
        Some((bucket, path)) if !bucket.is_empty() && !path.is_empty() => {
            Ok((bucket.to_string(), path.to_string()))
        }
        _ => Err(StorageError::InvalidUri(uri.to_string())),
    }
}

// ============================================================================
// GCS backend
// ============================================================================

/// Writes, lists and deletes through `cloud-storage`; reads through
/// `google-cloud-storage`.
pub struct GcsStorage {
    client: cloud_storage::Client,
    reader: google_cloud_storage::client::Storage,
    bucket: String,
    call_timeout: Duration,
}

impl GcsStorage {
    pub async fn connect(bucket: &str, call_timeout: Duration) -> Result<Self, StorageError> {
        // GCS client uses GOOGLE_APPLICATION_CREDENTIALS env var
        let reader = google_cloud_storage::client::Storage::builder()
            .build()
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(Self {
            client: cloud_storage::Client::default(),
            reader,
            bucket: bucket.to_string(),
            call_timeout,
        })
    }

    pub fn reader(&self) -> &google_cloud_storage::client::Storage {
        &self.reader
    }
}

#[async_trait]
impl ObjectStorage for GcsStorage {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn put(&self, key: &str, data: Vec<u8>, content_type: &str) -> Result<String, StorageError> {
        with_storage_timeout(self.call_timeout, "upload", async {
            self.client
                .object()
                .create(&self.bucket, data, key, content_type)
                .await
                .map_err(|e| StorageError::Backend(e.to_string()))
        })
        .await?;
        Ok(self.public_url(key))
    }

    async fn delete_prefix(&self, prefix: &str) -> Result<usize, StorageError> {
        with_storage_timeout(self.call_timeout, "prefix delete", self.delete_listed(prefix)).await
    }
}

impl GcsStorage {
    async fn delete_listed(&self, prefix: &str) -> Result<usize, StorageError> {
        let request = cloud_storage::ListRequest {
            prefix: Some(prefix.to_string()),
            ..Default::default()
        };
        let mut pages = Box::pin(
            self.client
                .object()
                .list(&self.bucket, request)
                .await
                .map_err(|e| StorageError::Backend(e.to_string()))?,
        );

        let mut names = Vec::new();
        while let Some(page) = pages.next().await {
            let page = page.map_err(|e| StorageError::Backend(e.to_string()))?;
            names.extend(page.items.into_iter().map(|o| o.name));
        }

        for name in &names {
            self.client
                .object()
                .delete(&self.bucket, name)
                .await
                .map_err(|e| StorageError::Backend(e.to_string()))?;
        }
        Ok(names.len())
    }
}

/// Download a whole object from GCS.
pub async fn download_object(
    gcs: &google_cloud_storage::client::Storage,
    bucket_name: &str,
    path: &str,
) -> Result<Vec<u8>, StorageError> {
    let bucket = format!("projects/_/buckets/{}", bucket_name);
    let mut resp = gcs
        .read_object(&bucket, path)
        .send()
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;
    let mut data = Vec::new();
    while let Some(chunk) = resp.next().await {
        data.extend_from_slice(&chunk.map_err(|e| StorageError::Backend(e.to_string()))?);
    }
    Ok(data)
}

// ============================================================================
// In-memory backend
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct StoredObject {
    pub data: Vec<u8>,
    pub content_type: String,
}

pub struct MemoryStorage {
    bucket: String,
    objects: RwLock<BTreeMap<String, StoredObject>>,
}

impl MemoryStorage {
    pub fn new(bucket: &str) -> Self {
        Self {
            bucket: bucket.to_string(),
            objects: RwLock::new(BTreeMap::new()),
        }
    }

    pub async fn get(&self, key: &str) -> Option<StoredObject> {
        self.objects.read().await.get(key).cloned()
    }

    pub async fn keys(&self) -> Vec<String> {
        self.objects.read().await.keys().cloned().collect()
    }
}

#[async_trait]
impl ObjectStorage for MemoryStorage {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn put(&self, key: &str, data: Vec<u8>, content_type: &str) -> Result<String, StorageError> {
        self.objects.write().await.insert(
            key.to_string(),
            StoredObject {
                data,
                content_type: content_type.to_string(),
            },
        );
        Ok(self.public_url(key))
    }

    async fn delete_prefix(&self, prefix: &str) -> Result<usize, StorageError> {
        let mut objects = self.objects.write().await;
        let before = objects.len();
        objects.retain(|key, _| !key.starts_with(prefix));
        Ok(before - objects.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_put_returns_public_url() {
        let storage = MemoryStorage::new("mock-bucket");
        let url = storage
            .put(&asset_key("evt-1", "captions.json"), b"[]".to_vec(), "application/json")
            .await
            .unwrap();
        assert_eq!(url, "https://storage.googleapis.com/mock-bucket/evt-1/captions.json");
        let stored = storage.get("evt-1/captions.json").await.unwrap();
        assert_eq!(stored.content_type, "application/json");
    }

    #[tokio::test]
    async fn test_delete_prefix_only_removes_matching() {
        let storage = MemoryStorage::new("b");
        storage.put("evt-1/reference_image.png", vec![1], "image/png").await.unwrap();
        storage.put("evt-1/image.png", vec![2], "image/png").await.unwrap();
        storage.put("evt-2/reference_image.jpg", vec![3], "image/jpeg").await.unwrap();

        let removed = storage.delete_prefix(&reference_image_prefix("evt-1")).await.unwrap();
        assert_eq!(removed, 1);
        assert_eq!(storage.keys().await, vec!["evt-1/image.png", "evt-2/reference_image.jpg"]);
    }

    #[test]
    fn test_parse_gcs_uri() {
        assert_eq!(
            parse_gcs_uri("gs://test-bucket/path/to/video.mp4").unwrap(),
            ("test-bucket".to_string(), "path/to/video.mp4".to_string())
        );
        for bad in ["gs://", "gs://bucket-only", "http://bucket/path", "relative/path", "gs:///path"] {
            let err = parse_gcs_uri(bad).unwrap_err();
            assert!(err.to_string().contains("Invalid GCS URI format"), "{}", bad);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_storage_call_times_out() {
        let result: Result<(), _> = with_storage_timeout(Duration::from_secs(30), "upload", async {
            std::future::pending::<()>().await;
            Ok(())
        })
        .await;
        let err = result.unwrap_err();
        assert!(matches!(err, StorageError::Timeout(_, d) if d == Duration::from_secs(30)));
        assert!(err.to_string().contains("upload"));
    }

    #[test]
    fn test_reference_image_filename() {
        assert_eq!(reference_image_filename("image/png"), "reference_image.png");
        assert_eq!(reference_image_filename("image/jpeg"), "reference_image.jpg");
    }
}
