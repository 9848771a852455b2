//! Campaign planning endpoint (/strategize)

use axum::{
    Json, Router,
    body::Bytes,
    extract::{DefaultBodyLimit, Multipart, State},
    routing::post,
};
use serde::Serialize;
use std::sync::Arc;
use tower_governor::{
    GovernorLayer, governor::GovernorConfigBuilder, key_extractor::SmartIpKeyExtractor,
};
use uuid::Uuid;

use super::auth::CallerIdentity;
use crate::constants::{MAX_GOAL_CHARS, MAX_REFERENCE_IMAGE_SIZE, MAX_STRATEGIZE_BODY_SIZE, MIN_GOAL_CHARS};
use crate::domain::{BrandStyle, JobStatus, Platform, TargetPlatforms, TaskList, ValidationError};
use crate::error::ApiError;
use crate::services::error::LogErr;
use crate::state::StrategyState;
use crate::storage::{asset_key, reference_image_filename};

pub fn routes() -> Router<Arc<StrategyState>> {
    // Planning calls a model per request: burst of 10, then one every 6 seconds per client IP
    let rate_limit_config = GovernorConfigBuilder::default()
        .per_second(6)
        .burst_size(10)
        .key_extractor(SmartIpKeyExtractor)
        .finish()
        .expect("Failed to build rate limit config");

    let rate_limit_layer = GovernorLayer {
        config: rate_limit_config.into(),
    };

    Router::new()
        .route("/strategize", post(strategize))
        .layer(DefaultBodyLimit::max(MAX_STRATEGIZE_BODY_SIZE))
        .layer(rate_limit_layer)
}

#[derive(Debug, Serialize)]
pub struct StrategizeResponse {
    pub event_id: String,
    pub status: JobStatus,
    pub task_list: TaskList,
    pub warnings: Vec<String>,
    pub message: String,
}

struct ReferenceUpload {
    data: Bytes,
    content_type: String,
}

#[derive(Default)]
struct RawForm {
    goal: Option<String>,
    uid: Option<String>,
    target_platforms: Option<String>,
    brand_style: Option<String>,
    reference_image: Option<ReferenceUpload>,
}

struct StrategizeForm {
    goal: String,
    target_platforms: TargetPlatforms,
    brand_style: Option<BrandStyle>,
    reference_image: Option<ReferenceUpload>,
}

async fn read_form(mut multipart: Multipart) -> Result<RawForm, ApiError> {
    let mut form = RawForm::default();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(format!("Invalid multipart body: {}", e)))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "reference_image" => {
                let content_type = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_string();
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::bad_request(format!("Failed to read reference_image: {}", e)))?;
                if !data.is_empty() {
                    form.reference_image = Some(ReferenceUpload { data, content_type });
                }
            }
            "goal" | "uid" | "target_platforms" | "brand_style" => {
                let value = field
                    .text()
                    .await
                    .map_err(|e| ApiError::bad_request(format!("Failed to read {}: {}", name, e)))?;
                let slot = match name.as_str() {
                    "goal" => &mut form.goal,
                    "uid" => &mut form.uid,
                    "target_platforms" => &mut form.target_platforms,
                    _ => &mut form.brand_style,
                };
                *slot = Some(value);
            }
            _ => {}
        }
    }
    Ok(form)
}

impl RawForm {
    fn validate(self) -> Result<StrategizeForm, ValidationError> {
        let goal = self
            .goal
            .map(|g| g.trim().to_string())
            .ok_or_else(|| ValidationError::new("goal is required"))?;
        let goal_chars = goal.chars().count();
        if !(MIN_GOAL_CHARS..=MAX_GOAL_CHARS).contains(&goal_chars) {
            return Err(ValidationError::new(format!(
                "goal must be between {} and {} characters",
                MIN_GOAL_CHARS, MAX_GOAL_CHARS
            )));
        }

        let raw_platforms = self
            .target_platforms
            .ok_or_else(|| ValidationError::new("target_platforms is required"))?;
        let platforms: Vec<Platform> = serde_json::from_str(&raw_platforms).map_err(|e| {
            ValidationError::new(format!(
                "target_platforms must be a JSON array of platform names: {}",
                e
            ))
        })?;
        let target_platforms = TargetPlatforms::try_from(platforms)?;

        let brand_style = match self.brand_style.as_deref().map(str::trim) {
            None | Some("") | Some("null") => None,
            Some(raw) => Some(
                serde_json::from_str::<BrandStyle>(raw)
                    .map_err(|e| ValidationError::new(format!("Invalid brand_style: {}", e)))?,
            ),
        };

        if let Some(upload) = &self.reference_image {
            if !matches!(upload.content_type.as_str(), "image/jpeg" | "image/png") {
                return Err(ValidationError::new(format!(
                    "reference_image must be JPEG or PNG, got {}",
                    upload.content_type
                )));
            }
            if upload.data.len() > MAX_REFERENCE_IMAGE_SIZE {
                return Err(ValidationError::new(format!(
                    "reference_image exceeds {} MB",
                    MAX_REFERENCE_IMAGE_SIZE / (1024 * 1024)
                )));
            }
        }

        Ok(StrategizeForm {
            goal,
            target_platforms,
            brand_style,
            reference_image: self.reference_image,
        })
    }
}

/// POST /strategize - Plan a campaign and park it for approval
async fn strategize(
    State(state): State<Arc<StrategyState>>,
    caller: CallerIdentity,
    multipart: Multipart,
) -> Result<Json<StrategizeResponse>, ApiError> {
    let raw = read_form(multipart).await?;
    let uid = raw
        .uid
        .clone()
        .map(|u| u.trim().to_string())
        .filter(|u| !u.is_empty())
        .ok_or_else(|| ApiError::validation("uid is required"))?;
    caller.require_uid(&uid)?;
    let form = raw.validate()?;

    let event_id = Uuid::now_v7().to_string();
    tracing::info!(event_id, uid, platforms = %form.target_platforms.joined(), "[strategize] Planning campaign");

    let mut reference_url = None;
    let mut analysis = None;
    if let Some(upload) = form.reference_image {
        let key = asset_key(&event_id, reference_image_filename(&upload.content_type));
        let url = state
            .storage
            .put(&key, upload.data.to_vec(), &upload.content_type)
            .await
            .log_500("Failed to store reference image")
            .map_err(|e| e.with_event(&event_id))?;

        analysis = match state.vision.analyze_image(&url, &form.goal).await {
            Ok(text) => Some(text),
            Err(e) => {
                tracing::warn!(event_id, error = %e, "[strategize] Reference image analysis failed, continuing without it");
                None
            }
        };
        reference_url = Some(url);
    }

    let generated = state
        .task_generator
        .generate(
            &form.goal,
            &form.target_platforms,
            form.brand_style.as_ref(),
            analysis.as_deref(),
        )
        .await;

    let mut task_list = generated.task_list;
    if let Some(url) = &reference_url {
        task_list.reference_image_url = Some(url.clone());
        if let Some(image) = task_list.image.as_mut() {
            image.reference_image_url = Some(url.clone());
        }
    }

    let job = state
        .jobs
        .create(&event_id, &uid, &task_list)
        .await
        .map_err(ApiError::from)?;

    tracing::info!(
        event_id,
        uid,
        kinds = task_list.requested_kinds(),
        warnings = generated.warnings.len(),
        "[strategize] Job created"
    );

    Ok(Json(StrategizeResponse {
        event_id: job.event_id,
        status: job.status,
        task_list: job.task_list,
        warnings: generated.warnings,
        message: "Strategy generated successfully. Please review and approve.".to_string(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::jobs::JobStore;
    use crate::routes::tests::{json_body, strategize_request, strategy_harness};
    use axum::http::StatusCode;
    use tower::ServiceExt;

    const GOAL: &str = "Launch our new ceramic coffee mug collection";

    #[tokio::test]
    async fn test_strategize_creates_pending_job() {
        let h = strategy_harness();
        let req = strategize_request(
            Some("user-1"),
            &[("goal", GOAL), ("uid", "user-1"), ("target_platforms", r#"["twitter","linkedin"]"#)],
            None,
        );

        let resp = h.app.clone().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = json_body(resp).await;
        assert_eq!(body["status"], "pending_approval");

        let event_id = body["event_id"].as_str().unwrap();
        let job = h.jobs.get(event_id).await.unwrap();
        assert_eq!(job.uid, "user-1");
        assert_eq!(job.status, JobStatus::PendingApproval);
        assert_eq!(body["task_list"]["goal"], GOAL);
    }

    #[tokio::test]
    async fn test_strategize_requires_token() {
        let h = strategy_harness();
        let req = strategize_request(
            None,
            &[("goal", GOAL), ("uid", "user-1"), ("target_platforms", r#"["twitter"]"#)],
            None,
        );
        let resp = h.app.clone().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_strategize_uid_mismatch_forbidden() {
        let h = strategy_harness();
        let req = strategize_request(
            Some("someone-else"),
            &[("goal", GOAL), ("uid", "user-1"), ("target_platforms", r#"["twitter"]"#)],
            None,
        );
        let resp = h.app.clone().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
        assert_eq!(json_body(resp).await["error"], "uid_mismatch");
    }

    #[tokio::test]
    async fn test_strategize_validation_errors() {
        let h = strategy_harness();
        for fields in [
            vec![("goal", "too short"), ("uid", "user-1"), ("target_platforms", r#"["twitter"]"#)],
            vec![("goal", GOAL), ("uid", "user-1"), ("target_platforms", "[]")],
            vec![("goal", GOAL), ("uid", "user-1"), ("target_platforms", r#"["myspace"]"#)],
            vec![
                ("goal", GOAL),
                ("uid", "user-1"),
                ("target_platforms", r#"["twitter"]"#),
                ("brand_style", r##"{"colors":[{"hex_code":"#FF0000","name":"Red"}]}"##),
            ],
        ] {
            let req = strategize_request(Some("user-1"), &fields, None);
            let resp = h.app.clone().oneshot(req).await.unwrap();
            assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY, "{:?}", fields);
            let body = json_body(resp).await;
            assert_eq!(body["error"], "validation_error");
        }
    }

    #[tokio::test]
    async fn test_strategize_rejects_non_image_reference() {
        let h = strategy_harness();
        let req = strategize_request(
            Some("user-1"),
            &[("goal", GOAL), ("uid", "user-1"), ("target_platforms", r#"["twitter"]"#)],
            Some((b"GIF89a".as_slice(), "image/gif")),
        );
        let resp = h.app.clone().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert!(h.storage.keys().await.is_empty());
    }

    #[tokio::test]
    async fn test_strategize_stores_reference_image() {
        let h = strategy_harness();
        let req = strategize_request(
            Some("user-1"),
            &[("goal", GOAL), ("uid", "user-1"), ("target_platforms", r#"["instagram_feed"]"#)],
            Some(([0x89u8, b'P', b'N', b'G'].as_slice(), "image/png")),
        );
        let resp = h.app.clone().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = json_body(resp).await;
        let event_id = body["event_id"].as_str().unwrap();

        let key = format!("{}/reference_image.png", event_id);
        assert!(h.storage.get(&key).await.is_some());
        let job = h.jobs.get(event_id).await.unwrap();
        assert_eq!(
            job.task_list.reference_image_url.as_deref(),
            Some(format!("https://storage.googleapis.com/mock-bucket/{}", key).as_str())
        );
    }
}
