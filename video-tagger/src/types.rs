use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tag_defs::{DefsError, FrameRange, TagApplicableTo, TagValue};

pub type TagId = i64;

#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub server_address: String,
    pub api_token: String,
    pub user_agent: String,
    pub timeout_seconds: u64,
    pub max_retries: u32,
    pub retry_delay_seconds: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            server_address: String::new(),
            api_token: String::new(),
            user_agent: "video-tagger/0.1".to_string(),
            timeout_seconds: 30,
            max_retries: 3,
            retry_delay_seconds: 1,
        }
    }
}

/// Project and dataset the tagging commands operate on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProjectContext {
    pub project_id: i64,
    pub dataset_id: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TagInstance {
    pub id: TagId,
    pub tag_id: i64,
    #[serde(default)]
    pub value: Option<TagValue>,
    #[serde(default)]
    pub frame_range: Option<FrameRange>,
    #[serde(default)]
    pub labeler_login: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoInfo {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub dataset_id: Option<i64>,
    #[serde(default)]
    pub frames_count: Option<u32>,
    #[serde(default)]
    pub tags: Vec<TagInstance>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnnotatedObject {
    pub id: i64,
    pub class_title: String,
    #[serde(default)]
    pub tags: Vec<TagInstance>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoAnnotation {
    #[serde(default)]
    pub video_id: Option<i64>,
    #[serde(default)]
    pub frames_count: Option<u32>,
    #[serde(default)]
    pub objects: Vec<AnnotatedObject>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl VideoAnnotation {
    pub fn objects_with_class<'a>(&'a self, class_title: &'a str) -> impl Iterator<Item = &'a AnnotatedObject> + 'a {
        self.objects.iter().filter(move |object| object.class_title == class_title)
    }
}

/// One page of a paginated list endpoint.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListPage<T> {
    pub total: u64,
    #[serde(default)]
    pub per_page: Option<u64>,
    pub pages_count: u64,
    pub entities: Vec<T>,
}

#[derive(Debug, thiserror::Error)]
pub enum TaggerError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error {status} on {method}: {message}")]
    Api {
        method: String,
        status: u16,
        message: String,
    },

    #[error("Tag definition error: {0}")]
    Defs(#[from] DefsError),

    #[error("Environment variable {0} is not set")]
    MissingEnv(String),

    #[error("Environment variable {name} has invalid value {value:?}")]
    InvalidEnv { name: String, value: String },

    #[error("Invalid server address: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("Tag meta [{0}] not found in project meta")]
    TagMetaNotFound(String),

    #[error("Tag meta [{0}] has no server id; fetch the project meta first")]
    TagMetaWithoutId(String),

    #[error("Dataset {dataset_id} has no videos")]
    NoVideos { dataset_id: i64 },

    #[error("Video {0} not found")]
    VideoNotFound(i64),

    #[error("No annotated object with class [{0}]")]
    ObjectNotFound(String),

    #[error("Tag {0} not found")]
    TagNotFound(TagId),

    #[error("Value {value} is not valid for tag meta [{name}]")]
    InvalidTagValue { name: String, value: String },

    #[error("Tag meta [{name}] is scoped {scope:?} and cannot be attached to {target}")]
    NotApplicable {
        name: String,
        scope: TagApplicableTo,
        target: &'static str,
    },

    #[error("Project {0} not found")]
    ProjectNotFound(i64),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl TaggerError {
    /// Connection failures, throttling and server errors are worth another attempt.
    pub fn is_transient(&self) -> bool {
        match self {
            TaggerError::Http(e) => e.is_connect() || e.is_timeout() || e.is_request(),
            TaggerError::Api { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, TaggerError>;
