use crate::traits::AnnotationApi;
use crate::types::{AnnotatedObject, ProjectContext, Result, TagId, TagInstance, TaggerError, VideoAnnotation, VideoInfo};
use async_trait::async_trait;
use chrono::Utc;
use serde_json::Map;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tag_defs::{color_for_name, FrameRange, ObjClass, ProjectMeta, TagApplicableTo, TagMeta, TagValue};
use tokio::sync::RwLock;
use tracing::debug;

struct StoredVideo {
    info: VideoInfo,
    project_id: i64,
    annotation: VideoAnnotation,
}

#[derive(Default)]
struct PlatformState {
    next_id: i64,
    projects: HashMap<i64, ProjectMeta>,
    datasets: HashMap<i64, i64>,
    videos: BTreeMap<i64, StoredVideo>,
    meta_updates: usize,
}

impl PlatformState {
    fn allocate_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn project(&self, project_id: i64) -> Result<&ProjectMeta> {
        self.projects.get(&project_id).ok_or(TaggerError::ProjectNotFound(project_id))
    }

    fn tag_meta(&self, project_id: i64, tag_meta_id: i64) -> Result<TagMeta> {
        self.project(project_id)?
            .get_tag_meta_by_id(tag_meta_id)
            .cloned()
            .ok_or_else(|| bad_request("tags.add", format!("tag meta {} does not exist in project {}", tag_meta_id, project_id)))
    }

    fn video_mut(&mut self, video_id: i64) -> Result<&mut StoredVideo> {
        self.videos.get_mut(&video_id).ok_or(TaggerError::VideoNotFound(video_id))
    }

    fn find_object(&self, object_id: i64) -> Option<(i64, i64)> {
        self.videos.values().find_map(|video| {
            video
                .annotation
                .objects
                .iter()
                .any(|object| object.id == object_id)
                .then_some((video.info.id, video.project_id))
        })
    }

    fn object_mut(&mut self, object_id: i64) -> Option<&mut AnnotatedObject> {
        self.videos
            .values_mut()
            .flat_map(|video| video.annotation.objects.iter_mut())
            .find(|object| object.id == object_id)
    }

    fn video_tag_mut(&mut self, tag_id: TagId) -> Result<(i64, &mut TagInstance)> {
        self.videos
            .values_mut()
            .find_map(|video| {
                let project_id = video.project_id;
                video.info.tags.iter_mut().find(|tag| tag.id == tag_id).map(|tag| (project_id, tag))
            })
            .ok_or(TaggerError::TagNotFound(tag_id))
    }

    fn object_tag_mut(&mut self, tag_id: TagId) -> Result<(i64, &mut TagInstance)> {
        self.videos
            .values_mut()
            .find_map(|video| {
                let project_id = video.project_id;
                video
                    .annotation
                    .objects
                    .iter_mut()
                    .flat_map(|object| object.tags.iter_mut())
                    .find(|tag| tag.id == tag_id)
                    .map(|tag| (project_id, tag))
            })
            .ok_or(TaggerError::TagNotFound(tag_id))
    }
}

fn bad_request(method: &str, message: String) -> TaggerError {
    TaggerError::Api {
        method: method.to_string(),
        status: 400,
        message,
    }
}

fn check_value(method: &str, tag_meta: &TagMeta, value: Option<&TagValue>) -> Result<()> {
    if tag_meta.is_valid_value(value) {
        Ok(())
    } else {
        Err(bad_request(
            method,
            format!("value {:?} does not match tag meta [{}]", value, tag_meta.name),
        ))
    }
}

fn new_tag(id: TagId, tag_meta_id: i64, value: Option<&TagValue>, frame_range: Option<FrameRange>) -> TagInstance {
    let now = Utc::now();
    TagInstance {
        id,
        tag_id: tag_meta_id,
        value: value.cloned(),
        frame_range,
        labeler_login: Some("mock".to_string()),
        created_at: Some(now),
        updated_at: Some(now),
    }
}

/// In-memory annotation platform.
///
/// Behaves like the remote service for the calls the tagger makes: it
/// assigns ids to new tag metas on schema update, validates tag values
/// against their meta and rejects tags outside the meta's scope.
#[derive(Clone, Default)]
pub struct MockPlatform {
    state: Arc<RwLock<PlatformState>>,
}

impl MockPlatform {
    pub fn new() -> Self {
        Self::default()
    }

    /// A project with `orange` and `kiwi` classes, one dataset and one video
    /// holding two orange objects and one kiwi object.
    pub async fn with_demo_project() -> (Self, ProjectContext) {
        let platform = Self::new();
        let meta = ProjectMeta {
            obj_classes: vec![demo_class("orange"), demo_class("kiwi")],
            ..ProjectMeta::default()
        };
        let project_id = platform.create_project(meta).await;
        let dataset_id = platform.create_dataset(project_id).await;
        let video_id = platform.add_video(dataset_id, "demo.mp4", 10).await;
        for class_title in ["orange", "orange", "kiwi"] {
            platform.add_object(video_id, class_title).await;
        }
        (platform, ProjectContext { project_id, dataset_id })
    }

    pub async fn create_project(&self, meta: ProjectMeta) -> i64 {
        let mut state = self.state.write().await;
        let project_id = state.allocate_id();
        let meta = assign_ids(&mut state, meta);
        state.projects.insert(project_id, meta);
        project_id
    }

    pub async fn create_dataset(&self, project_id: i64) -> i64 {
        let mut state = self.state.write().await;
        let dataset_id = state.allocate_id();
        state.datasets.insert(dataset_id, project_id);
        dataset_id
    }

    /// Adds a video to a dataset. Unknown datasets yield a video that no list call returns.
    pub async fn add_video(&self, dataset_id: i64, name: &str, frames_count: u32) -> i64 {
        let mut state = self.state.write().await;
        let video_id = state.allocate_id();
        let project_id = state.datasets.get(&dataset_id).copied().unwrap_or_default();
        let now = Utc::now();

        state.videos.insert(
            video_id,
            StoredVideo {
                info: VideoInfo {
                    id: video_id,
                    name: name.to_string(),
                    dataset_id: Some(dataset_id),
                    frames_count: Some(frames_count),
                    tags: Vec::new(),
                    created_at: Some(now),
                    updated_at: Some(now),
                },
                project_id,
                annotation: VideoAnnotation {
                    video_id: Some(video_id),
                    frames_count: Some(frames_count),
                    objects: Vec::new(),
                    extra: Map::new(),
                },
            },
        );
        video_id
    }

    /// Adds an annotated object to a video; returns `None` if the video does not exist.
    pub async fn add_object(&self, video_id: i64, class_title: &str) -> Option<i64> {
        let mut state = self.state.write().await;
        let object_id = state.allocate_id();
        let video = state.videos.get_mut(&video_id)?;
        video.annotation.objects.push(AnnotatedObject {
            id: object_id,
            class_title: class_title.to_string(),
            tags: Vec::new(),
            extra: Map::new(),
        });
        Some(object_id)
    }

    /// Number of `update_project_meta` calls served so far.
    pub async fn meta_update_count(&self) -> usize {
        self.state.read().await.meta_updates
    }

    pub async fn object_tags(&self, object_id: i64) -> Vec<TagInstance> {
        let state = self.state.read().await;
        state
            .videos
            .values()
            .flat_map(|video| video.annotation.objects.iter())
            .find(|object| object.id == object_id)
            .map(|object| object.tags.clone())
            .unwrap_or_default()
    }
}

fn demo_class(title: &str) -> ObjClass {
    ObjClass {
        title: title.to_string(),
        shape: "rectangle".to_string(),
        color: color_for_name(title),
        id: None,
        extra: Map::new(),
    }
}

fn assign_ids(state: &mut PlatformState, mut meta: ProjectMeta) -> ProjectMeta {
    for obj_class in meta.obj_classes.iter_mut().filter(|obj_class| obj_class.id.is_none()) {
        obj_class.id = Some(state.allocate_id());
    }
    for tag_meta in meta.tag_metas.iter_mut().filter(|tag_meta| tag_meta.id.is_none()) {
        tag_meta.id = Some(state.allocate_id());
    }
    meta
}

#[async_trait]
impl AnnotationApi for MockPlatform {
    async fn get_project_meta(&self, project_id: i64) -> Result<ProjectMeta> {
        let state = self.state.read().await;
        Ok(state.project(project_id)?.clone())
    }

    async fn update_project_meta(&self, project_id: i64, meta: &ProjectMeta) -> Result<()> {
        let mut state = self.state.write().await;
        state.project(project_id)?;

        let mut seen = std::collections::HashSet::new();
        for tag_meta in &meta.tag_metas {
            if !seen.insert(tag_meta.name.as_str()) {
                return Err(bad_request(
                    "projects.meta.update",
                    format!("duplicate tag meta name [{}]", tag_meta.name),
                ));
            }
            tag_meta.validate()?;
        }

        let meta = assign_ids(&mut state, meta.clone());
        state.projects.insert(project_id, meta);
        state.meta_updates += 1;
        debug!("Mock project {} meta updated ({} total)", project_id, state.meta_updates);
        Ok(())
    }

    async fn list_videos(&self, dataset_id: i64) -> Result<Vec<VideoInfo>> {
        let state = self.state.read().await;
        Ok(state
            .videos
            .values()
            .filter(|video| video.info.dataset_id == Some(dataset_id))
            .map(|video| video.info.clone())
            .collect())
    }

    async fn get_video_info(&self, video_id: i64) -> Result<VideoInfo> {
        let state = self.state.read().await;
        state
            .videos
            .get(&video_id)
            .map(|video| video.info.clone())
            .ok_or(TaggerError::VideoNotFound(video_id))
    }

    async fn download_video_annotation(&self, video_id: i64) -> Result<VideoAnnotation> {
        let state = self.state.read().await;
        state
            .videos
            .get(&video_id)
            .map(|video| video.annotation.clone())
            .ok_or(TaggerError::VideoNotFound(video_id))
    }

    async fn add_video_tag(&self, tag_meta_id: i64, video_id: i64, value: Option<&TagValue>, frame_range: Option<FrameRange>) -> Result<TagId> {
        let mut state = self.state.write().await;
        let project_id = state.videos.get(&video_id).ok_or(TaggerError::VideoNotFound(video_id))?.project_id;
        let tag_meta = state.tag_meta(project_id, tag_meta_id)?;

        if tag_meta.applicable_to == TagApplicableTo::ObjectsOnly {
            return Err(bad_request("videos.tags.add", format!("tag meta [{}] is for objects only", tag_meta.name)));
        }
        check_value("videos.tags.add", &tag_meta, value)?;

        let tag_id = state.allocate_id();
        state.video_mut(video_id)?.info.tags.push(new_tag(tag_id, tag_meta_id, value, frame_range));
        Ok(tag_id)
    }

    async fn update_video_tag_value(&self, tag_id: TagId, value: &TagValue) -> Result<()> {
        let mut state = self.state.write().await;
        let (project_id, tag_meta_id) = {
            let (project_id, tag) = state.video_tag_mut(tag_id)?;
            (project_id, tag.tag_id)
        };
        let tag_meta = state.tag_meta(project_id, tag_meta_id)?;
        check_value("videos.tags.update-value", &tag_meta, Some(value))?;

        let (_, tag) = state.video_tag_mut(tag_id)?;
        tag.value = Some(value.clone());
        tag.updated_at = Some(Utc::now());
        Ok(())
    }

    async fn update_video_tag_frame_range(&self, tag_id: TagId, frame_range: FrameRange) -> Result<()> {
        let mut state = self.state.write().await;
        let (_, tag) = state.video_tag_mut(tag_id)?;
        tag.frame_range = Some(frame_range);
        tag.updated_at = Some(Utc::now());
        Ok(())
    }

    async fn remove_video_tag(&self, tag_id: TagId) -> Result<()> {
        let mut state = self.state.write().await;
        for video in state.videos.values_mut() {
            if let Some(index) = video.info.tags.iter().position(|tag| tag.id == tag_id) {
                video.info.tags.remove(index);
                return Ok(());
            }
        }
        Err(TaggerError::TagNotFound(tag_id))
    }

    async fn add_object_tag(&self, tag_meta_id: i64, object_id: i64, value: Option<&TagValue>, frame_range: Option<FrameRange>) -> Result<TagId> {
        let mut state = self.state.write().await;
        let (_, project_id) = state
            .find_object(object_id)
            .ok_or_else(|| bad_request("annotation-objects.tags.add", format!("object {} does not exist", object_id)))?;
        let tag_meta = state.tag_meta(project_id, tag_meta_id)?;

        if tag_meta.applicable_to == TagApplicableTo::ImagesOnly {
            return Err(bad_request(
                "annotation-objects.tags.add",
                format!("tag meta [{}] is for videos only", tag_meta.name),
            ));
        }
        check_value("annotation-objects.tags.add", &tag_meta, value)?;

        let tag_id = state.allocate_id();
        if let Some(object) = state.object_mut(object_id) {
            object.tags.push(new_tag(tag_id, tag_meta_id, value, frame_range));
        }
        Ok(tag_id)
    }

    async fn update_object_tag_value(&self, tag_id: TagId, value: &TagValue) -> Result<()> {
        let mut state = self.state.write().await;
        let (project_id, tag_meta_id) = {
            let (project_id, tag) = state.object_tag_mut(tag_id)?;
            (project_id, tag.tag_id)
        };
        let tag_meta = state.tag_meta(project_id, tag_meta_id)?;
        check_value("annotation-objects.tags.update-value", &tag_meta, Some(value))?;

        let (_, tag) = state.object_tag_mut(tag_id)?;
        tag.value = Some(value.clone());
        tag.updated_at = Some(Utc::now());
        Ok(())
    }

    async fn update_object_tag_frame_range(&self, tag_id: TagId, frame_range: FrameRange) -> Result<()> {
        let mut state = self.state.write().await;
        let (_, tag) = state.object_tag_mut(tag_id)?;
        tag.frame_range = Some(frame_range);
        tag.updated_at = Some(Utc::now());
        Ok(())
    }

    async fn remove_object_tag(&self, tag_id: TagId) -> Result<()> {
        let mut state = self.state.write().await;
        for object in state.videos.values_mut().flat_map(|video| video.annotation.objects.iter_mut()) {
            if let Some(index) = object.tags.iter().position(|tag| tag.id == tag_id) {
                object.tags.remove(index);
                return Ok(());
            }
        }
        Err(TaggerError::TagNotFound(tag_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tag_defs::TagValueType;

    #[tokio::test]
    async fn schema_update_assigns_ids_to_new_tag_metas() {
        let (platform, context) = MockPlatform::with_demo_project().await;
        let meta = platform.get_project_meta(context.project_id).await.unwrap();
        assert!(meta.obj_classes.iter().all(|obj_class| obj_class.id.is_some()));

        let updated = meta.add_tag_meta(TagMeta::new("fruits", TagValueType::AnyNumber)).unwrap();
        platform.update_project_meta(context.project_id, &updated).await.unwrap();

        let refreshed = platform.get_project_meta(context.project_id).await.unwrap();
        assert!(refreshed.get_tag_meta("fruits").and_then(TagMeta::sly_id).is_some());
        assert_eq!(platform.meta_update_count().await, 1);
    }

    #[tokio::test]
    async fn rejects_values_outside_the_tag_meta() {
        let (platform, context) = MockPlatform::with_demo_project().await;
        let meta = platform.get_project_meta(context.project_id).await.unwrap();
        let updated = meta.add_tag_meta(TagMeta::new("fruits", TagValueType::AnyNumber)).unwrap();
        platform.update_project_meta(context.project_id, &updated).await.unwrap();
        let fruits_id = platform
            .get_project_meta(context.project_id)
            .await
            .unwrap()
            .get_tag_meta("fruits")
            .and_then(TagMeta::sly_id)
            .unwrap();

        let video = platform.list_videos(context.dataset_id).await.unwrap().remove(0);
        let err = platform
            .add_video_tag(fruits_id, video.id, Some(&TagValue::from("three")), None)
            .await
            .unwrap_err();
        assert!(matches!(err, TaggerError::Api { status: 400, .. }));
        assert!(platform.get_video_info(video.id).await.unwrap().tags.is_empty());
    }

    #[tokio::test]
    async fn unknown_tags_are_reported() {
        let platform = MockPlatform::new();
        assert!(matches!(platform.remove_video_tag(99).await, Err(TaggerError::TagNotFound(99))));
        assert!(matches!(
            platform.update_object_tag_frame_range(5, FrameRange::new(1, 2).unwrap()).await,
            Err(TaggerError::TagNotFound(5))
        ));
    }
}
