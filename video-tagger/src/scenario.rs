use crate::tag_meta_sync::ensure_tag_meta;
use crate::tagger::{ObjectTags, VideoTags};
use crate::traits::AnnotationApi;
use crate::types::{ProjectContext, Result, TagId, TaggerError, VideoAnnotation};
use serde::Serialize;
use std::collections::BTreeMap;
use tag_defs::{FrameRange, ProjectMeta, TagApplicableTo, TagMeta, TagValue, TagValueType};
use tracing::info;

pub const FRUITS: &str = "fruits";
pub const ORANGE: &str = "orange";
pub const KIWI: &str = "kiwi";

pub fn fruits_tag_meta() -> TagMeta {
    TagMeta::new(FRUITS, TagValueType::AnyNumber).with_applicable_to(TagApplicableTo::All)
}

pub fn orange_tag_meta() -> TagMeta {
    TagMeta::new(ORANGE, TagValueType::OneofString)
        .with_applicable_to(TagApplicableTo::ObjectsOnly)
        .with_possible_values(["small", "big"])
}

pub fn kiwi_tag_meta() -> TagMeta {
    TagMeta::new(KIWI, TagValueType::OneofString)
        .with_applicable_to(TagApplicableTo::ObjectsOnly)
        .with_possible_values(["ripe", "unripe"])
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ScenarioOptions {
    /// Also tag `kiwi` objects (second variant of the walkthrough).
    pub with_kiwi: bool,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ScenarioReport {
    pub video_id: i64,
    pub tag_meta_ids: BTreeMap<String, i64>,
    pub matched_objects: BTreeMap<String, usize>,
    pub created_tags: Vec<TagId>,
    pub removed_tags: Vec<TagId>,
}

struct ObjectPlan {
    tag_meta: TagMeta,
    ranged_value: &'static str,
    plain_value: &'static str,
    updated_value: &'static str,
    remove: bool,
}

fn range(start: u32, end: u32) -> Result<FrameRange> {
    Ok(FrameRange::new(start, end)?)
}

/// Walks through every tag operation on the first video of the dataset.
pub async fn run_scenario<A>(api: &A, context: ProjectContext, options: ScenarioOptions) -> Result<ScenarioReport>
where
    A: AnnotationApi + ?Sized,
{
    let videos = api.list_videos(context.dataset_id).await?;
    let video = videos.first().ok_or(TaggerError::NoVideos {
        dataset_id: context.dataset_id,
    })?;
    info!("Dataset {} has {} videos, using [{}] ({})", context.dataset_id, videos.len(), video.name, video.id);

    let project_meta = api.get_project_meta(context.project_id).await?;
    let annotation = api.download_video_annotation(video.id).await?;

    let mut report = ScenarioReport {
        video_id: video.id,
        ..ScenarioReport::default()
    };

    let project_meta = tag_video(api, context.project_id, video.id, project_meta, &mut report).await?;

    let mut plans = vec![ObjectPlan {
        tag_meta: orange_tag_meta(),
        ranged_value: "big",
        plain_value: "small",
        updated_value: "small",
        remove: true,
    }];
    if options.with_kiwi {
        plans.push(ObjectPlan {
            tag_meta: kiwi_tag_meta(),
            ranged_value: "ripe",
            plain_value: "unripe",
            updated_value: "unripe",
            remove: false,
        });
    }

    let mut project_meta = project_meta;
    for plan in &plans {
        project_meta = tag_objects(api, context.project_id, &annotation, plan, project_meta, &mut report).await?;
    }

    info!(
        "Scenario finished: {} tags created, {} removed",
        report.created_tags.len(),
        report.removed_tags.len()
    );
    Ok(report)
}

async fn tag_video<A>(
    api: &A,
    project_id: i64,
    video_id: i64,
    project_meta: ProjectMeta,
    report: &mut ScenarioReport,
) -> Result<ProjectMeta>
where
    A: AnnotationApi + ?Sized,
{
    let (fruits, project_meta) = ensure_tag_meta(api, project_id, &fruits_tag_meta(), project_meta).await?;
    let tags = VideoTags::new(api, &fruits)?;
    if let Some(id) = fruits.sly_id() {
        report.tag_meta_ids.insert(fruits.name.clone(), id);
    }

    let whole_video = tags.add(video_id, Some(&TagValue::from(3)), None).await?;
    report.created_tags.push(whole_video);

    let ranged = tags.add(video_id, Some(&TagValue::from(2)), Some(range(2, 6)?)).await?;
    report.created_tags.push(ranged);

    tags.update_value(ranged, &TagValue::from(1)).await?;
    tags.update_frame_range(ranged, range(3, 5)?).await?;
    tags.remove(ranged).await?;
    report.removed_tags.push(ranged);

    Ok(project_meta)
}

async fn tag_objects<A>(
    api: &A,
    project_id: i64,
    annotation: &VideoAnnotation,
    plan: &ObjectPlan,
    project_meta: ProjectMeta,
    report: &mut ScenarioReport,
) -> Result<ProjectMeta>
where
    A: AnnotationApi + ?Sized,
{
    let (tag_meta, project_meta) = ensure_tag_meta(api, project_id, &plan.tag_meta, project_meta).await?;
    let tags = ObjectTags::new(api, &tag_meta)?;
    if let Some(id) = tag_meta.sly_id() {
        report.tag_meta_ids.insert(tag_meta.name.clone(), id);
    }

    let class_title = plan.tag_meta.name.as_str();
    let mut ranged_by_object: Vec<(i64, TagId)> = Vec::new();

    for object in annotation.objects_with_class(class_title) {
        let ranged = tags
            .add(object.id, Some(&TagValue::from(plan.ranged_value)), Some(range(2, 6)?))
            .await?;
        let plain = tags.add(object.id, Some(&TagValue::from(plan.plain_value)), None).await?;
        report.created_tags.extend([ranged, plain]);
        ranged_by_object.push((object.id, ranged));
    }
    report.matched_objects.insert(class_title.to_string(), ranged_by_object.len());

    let (object_id, tag_id) = ranged_by_object
        .first()
        .copied()
        .ok_or_else(|| TaggerError::ObjectNotFound(class_title.to_string()))?;
    info!("Operating on tag {} of object {}", tag_id, object_id);

    tags.update_value(tag_id, &TagValue::from(plan.updated_value)).await?;
    tags.update_frame_range(tag_id, range(3, 5)?).await?;
    if plan.remove {
        tags.remove(tag_id).await?;
        report.removed_tags.push(tag_id);
    }

    Ok(project_meta)
}
