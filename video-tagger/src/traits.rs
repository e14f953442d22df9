use crate::types::{Result, TagId, VideoAnnotation, VideoInfo};
use async_trait::async_trait;
use tag_defs::{FrameRange, ProjectMeta, TagValue};

/// Remote operations of the annotation platform used by the tagger.
///
/// Calls are plain request/response. Implementations do not cache: every
/// read reflects the current server state.
#[async_trait]
pub trait AnnotationApi: Send + Sync {
    /// Read the project schema
    async fn get_project_meta(&self, project_id: i64) -> Result<ProjectMeta>;

    /// Replace the project schema. Ids of new tag metas are only visible
    /// after a fresh `get_project_meta`.
    async fn update_project_meta(&self, project_id: i64, meta: &ProjectMeta) -> Result<()>;

    /// All videos of a dataset, across every page
    async fn list_videos(&self, dataset_id: i64) -> Result<Vec<VideoInfo>>;

    async fn get_video_info(&self, video_id: i64) -> Result<VideoInfo>;

    async fn download_video_annotation(&self, video_id: i64) -> Result<VideoAnnotation>;

    async fn add_video_tag(
        &self,
        tag_meta_id: i64,
        video_id: i64,
        value: Option<&TagValue>,
        frame_range: Option<FrameRange>,
    ) -> Result<TagId>;

    async fn update_video_tag_value(&self, tag_id: TagId, value: &TagValue) -> Result<()>;

    async fn update_video_tag_frame_range(&self, tag_id: TagId, frame_range: FrameRange) -> Result<()>;

    async fn remove_video_tag(&self, tag_id: TagId) -> Result<()>;

    async fn add_object_tag(
        &self,
        tag_meta_id: i64,
        object_id: i64,
        value: Option<&TagValue>,
        frame_range: Option<FrameRange>,
    ) -> Result<TagId>;

    async fn update_object_tag_value(&self, tag_id: TagId, value: &TagValue) -> Result<()>;

    async fn update_object_tag_frame_range(&self, tag_id: TagId, frame_range: FrameRange) -> Result<()>;

    async fn remove_object_tag(&self, tag_id: TagId) -> Result<()>;
}
