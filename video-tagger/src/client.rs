use crate::traits::AnnotationApi;
use crate::types::{ApiConfig, ListPage, Result, TagId, TaggerError, VideoAnnotation, VideoInfo};
use async_trait::async_trait;
use backoff::{backoff::Backoff, exponential::ExponentialBackoff, SystemClock};
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::time::Duration;
use tag_defs::{FrameRange, ProjectMeta, TagValue};
use tracing::{debug, error, warn};
use url::Url;

const API_PREFIX: &str = "public/api/v3/";
const PAGE_SIZE: u64 = 500;

#[derive(Deserialize)]
struct CreatedId {
    id: TagId,
}

/// JSON-over-HTTP client for the platform's public API.
pub struct HttpApi {
    client: Client,
    base_url: Url,
    config: ApiConfig,
}

impl HttpApi {
    pub fn new(config: ApiConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(Duration::from_secs(config.timeout_seconds))
            .gzip(true)
            .deflate(true)
            .brotli(true)
            .build()?;

        let base_url = api_base_url(&config.server_address)?;
        debug!("Platform API at {}", base_url);

        Ok(Self {
            client,
            base_url,
            config,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    async fn post(&self, method: &str, body: &Value) -> Result<Value> {
        let url = self.base_url.join(method)?;

        let mut backoff = retry_backoff(&self.config);

        let mut attempt = 0;
        loop {
            match self.post_once(&url, method, body).await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && attempt < self.config.max_retries => {
                    let Some(delay) = backoff.next_backoff() else {
                        return Err(e);
                    };
                    attempt += 1;
                    warn!("Attempt {} of {} failed: {}, retrying in {:?}", attempt, method, e, delay);
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    error!("{} failed: {}", method, e);
                    return Err(e);
                }
            }
        }
    }

    async fn post_once(&self, url: &Url, method: &str, body: &Value) -> Result<Value> {
        debug!("POST {} {}", method, body);

        let response = self
            .client
            .post(url.clone())
            .header("x-api-key", &self.config.api_token)
            .json(body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            return Err(TaggerError::Api {
                method: method.to_string(),
                status: status.as_u16(),
                message: error_message(&text, status.canonical_reason()),
            });
        }

        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(&text)?)
    }

    async fn post_for_id(&self, method: &str, body: &Value) -> Result<TagId> {
        let created: CreatedId = serde_json::from_value(self.post(method, body).await?)?;
        Ok(created.id)
    }
}

/// Growing delays between attempts; `max_retries` alone decides when to stop,
/// so a slow attempt never eats the retry budget.
fn retry_backoff(config: &ApiConfig) -> ExponentialBackoff<SystemClock> {
    let delay = Duration::from_secs(config.retry_delay_seconds);
    ExponentialBackoff {
        current_interval: delay,
        initial_interval: delay,
        max_interval: delay * 32,
        multiplier: 2.0,
        max_elapsed_time: None,
        ..Default::default()
    }
}

fn api_base_url(server_address: &str) -> Result<Url> {
    let mut base = server_address.trim().trim_end_matches('/').to_string();
    if !base.starts_with("http://") && !base.starts_with("https://") {
        base = format!("https://{}", base);
    }
    Ok(Url::parse(&format!("{}/", base))?.join(API_PREFIX)?)
}

/// Pulls `error`/`message` out of an error body, falling back to the raw text.
fn error_message(body: &str, reason: Option<&str>) -> String {
    if let Ok(value) = serde_json::from_str::<Value>(body) {
        for key in ["error", "message", "details"] {
            match value.get(key) {
                Some(Value::String(message)) => return message.clone(),
                Some(other) if !other.is_null() => return other.to_string(),
                _ => {}
            }
        }
    }
    if body.trim().is_empty() {
        reason.unwrap_or("Unknown").to_string()
    } else {
        body.trim().to_string()
    }
}

fn tag_request(key: &str, target_id: i64, tag_meta_id: i64, value: Option<&TagValue>, frame_range: Option<FrameRange>) -> Result<Value> {
    let mut body = Map::new();
    body.insert("tagId".to_string(), json!(tag_meta_id));
    body.insert(key.to_string(), json!(target_id));
    if let Some(value) = value {
        body.insert("value".to_string(), serde_json::to_value(value)?);
    }
    if let Some(range) = frame_range {
        body.insert("frameRange".to_string(), serde_json::to_value(range)?);
    }
    Ok(Value::Object(body))
}

#[async_trait]
impl AnnotationApi for HttpApi {
    async fn get_project_meta(&self, project_id: i64) -> Result<ProjectMeta> {
        let data = self.post("projects.meta", &json!({ "id": project_id })).await?;
        Ok(ProjectMeta::from_json(&data)?)
    }

    async fn update_project_meta(&self, project_id: i64, meta: &ProjectMeta) -> Result<()> {
        let body = json!({ "id": project_id, "meta": meta.to_json()? });
        self.post("projects.meta.update", &body).await?;
        Ok(())
    }

    async fn list_videos(&self, dataset_id: i64) -> Result<Vec<VideoInfo>> {
        let mut videos = Vec::new();
        let mut page = 1;

        loop {
            let body = json!({ "datasetId": dataset_id, "page": page, "per_page": PAGE_SIZE });
            let data: ListPage<VideoInfo> = serde_json::from_value(self.post("videos.list", &body).await?)?;
            let pages_count = data.pages_count;
            videos.extend(data.entities);

            if page >= pages_count {
                debug!("Listed {} of {} videos in dataset {}", videos.len(), data.total, dataset_id);
                return Ok(videos);
            }
            page += 1;
        }
    }

    async fn get_video_info(&self, video_id: i64) -> Result<VideoInfo> {
        let data = self.post("videos.info", &json!({ "id": video_id })).await?;
        if data.is_null() {
            return Err(TaggerError::VideoNotFound(video_id));
        }
        Ok(serde_json::from_value(data)?)
    }

    async fn download_video_annotation(&self, video_id: i64) -> Result<VideoAnnotation> {
        let info = self.get_video_info(video_id).await?;
        let dataset_id = info.dataset_id.ok_or(TaggerError::VideoNotFound(video_id))?;

        let body = json!({ "datasetId": dataset_id, "entityIds": [video_id] });
        let annotations: Vec<VideoAnnotation> = serde_json::from_value(self.post("videos.annotations.bulk.info", &body).await?)?;
        annotations.into_iter().next().ok_or(TaggerError::VideoNotFound(video_id))
    }

    async fn add_video_tag(&self, tag_meta_id: i64, video_id: i64, value: Option<&TagValue>, frame_range: Option<FrameRange>) -> Result<TagId> {
        let body = tag_request("videoId", video_id, tag_meta_id, value, frame_range)?;
        self.post_for_id("videos.tags.add", &body).await
    }

    async fn update_video_tag_value(&self, tag_id: TagId, value: &TagValue) -> Result<()> {
        self.post("videos.tags.update-value", &json!({ "id": tag_id, "value": value })).await?;
        Ok(())
    }

    async fn update_video_tag_frame_range(&self, tag_id: TagId, frame_range: FrameRange) -> Result<()> {
        self.post("videos.tags.update-frame-range", &json!({ "id": tag_id, "frameRange": frame_range }))
            .await?;
        Ok(())
    }

    async fn remove_video_tag(&self, tag_id: TagId) -> Result<()> {
        self.post("videos.tags.remove", &json!({ "id": tag_id })).await?;
        Ok(())
    }

    async fn add_object_tag(&self, tag_meta_id: i64, object_id: i64, value: Option<&TagValue>, frame_range: Option<FrameRange>) -> Result<TagId> {
        let body = tag_request("objectId", object_id, tag_meta_id, value, frame_range)?;
        self.post_for_id("annotation-objects.tags.add", &body).await
    }

    async fn update_object_tag_value(&self, tag_id: TagId, value: &TagValue) -> Result<()> {
        self.post("annotation-objects.tags.update-value", &json!({ "id": tag_id, "value": value }))
            .await?;
        Ok(())
    }

    async fn update_object_tag_frame_range(&self, tag_id: TagId, frame_range: FrameRange) -> Result<()> {
        self.post(
            "annotation-objects.tags.update-frame-range",
            &json!({ "id": tag_id, "frameRange": frame_range }),
        )
        .await?;
        Ok(())
    }

    async fn remove_object_tag(&self, tag_id: TagId) -> Result<()> {
        self.post("annotation-objects.tags.remove", &json!({ "id": tag_id })).await?;
        Ok(())
    }
}
