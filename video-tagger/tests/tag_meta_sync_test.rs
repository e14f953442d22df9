use serde_json::json;
use std::sync::Once;
use tag_defs::{ProjectMeta, TagApplicableTo, TagMeta, TagValue, TagValueType};
use tokio_test::{assert_err, assert_ok};
use tracing::info;
use video_tagger::{ensure_tag_meta, AnnotationApi, MockPlatform, ObjectTags, TaggerError, VideoTags};

static INIT: Once = Once::new();

fn init_tracing() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::INFO)
            .try_init()
            .ok();
    });
}

fn orange(values: &[&str]) -> TagMeta {
    TagMeta::new("orange", TagValueType::OneofString)
        .with_applicable_to(TagApplicableTo::ObjectsOnly)
        .with_possible_values(values.iter().copied())
}

#[tokio::test]
async fn test_new_tag_meta_is_created_once() {
    init_tracing();

    let (platform, context) = MockPlatform::with_demo_project().await;
    let meta = assert_ok!(platform.get_project_meta(context.project_id).await);
    assert!(!meta.has_tag_meta("orange"));

    let (created, refreshed) = assert_ok!(ensure_tag_meta(&platform, context.project_id, &orange(&["small", "big"]), meta).await);
    info!("Created tag meta {:?}", created.sly_id());

    assert_eq!(platform.meta_update_count().await, 1);
    assert!(created.sly_id().is_some());
    assert_eq!(created.possible_values, vec!["small", "big"]);
    assert_eq!(refreshed.get_tag_meta("orange"), Some(&created));
}

#[tokio::test]
async fn test_second_call_reuses_server_definition() {
    init_tracing();

    let (platform, context) = MockPlatform::with_demo_project().await;
    let meta = assert_ok!(platform.get_project_meta(context.project_id).await);

    let (first, meta) = assert_ok!(ensure_tag_meta(&platform, context.project_id, &orange(&["small", "big"]), meta).await);
    let (second, meta) = assert_ok!(ensure_tag_meta(&platform, context.project_id, &orange(&["big", "small"]), meta).await);

    assert_eq!(first, second);
    assert_eq!(platform.meta_update_count().await, 1);
    assert_eq!(meta.tag_metas.iter().filter(|tag_meta| tag_meta.name == "orange").count(), 1);

    let server = assert_ok!(platform.get_project_meta(context.project_id).await);
    assert_eq!(server.tag_metas.len(), 1);
}

#[tokio::test]
async fn test_divergent_values_keep_existing_definition() {
    init_tracing();

    let (platform, context) = MockPlatform::with_demo_project().await;
    let meta = assert_ok!(platform.get_project_meta(context.project_id).await);
    let (existing, meta) = assert_ok!(ensure_tag_meta(&platform, context.project_id, &orange(&["small", "big"]), meta).await);

    let (resolved, _) = assert_ok!(ensure_tag_meta(&platform, context.project_id, &orange(&["small", "medium"]), meta).await);

    assert_eq!(resolved, existing);
    assert_eq!(resolved.possible_values, vec!["small", "big"]);
    assert_eq!(platform.meta_update_count().await, 1);
}

#[tokio::test]
async fn test_unknown_meta_fields_survive_update() {
    init_tracing();

    let platform = MockPlatform::new();
    let meta = assert_ok!(ProjectMeta::from_json(&json!({
        "classes": [{"title": "orange", "shape": "rectangle", "color": "#FF8800", "geometry_config": {}}],
        "tags": [],
        "projectType": "videos",
        "projectSettings": {"multiView": {"enabled": false}}
    })));
    let project_id = platform.create_project(meta).await;

    let meta = assert_ok!(platform.get_project_meta(project_id).await);
    let fruits = TagMeta::new("fruits", TagValueType::AnyNumber);
    assert_ok!(ensure_tag_meta(&platform, project_id, &fruits, meta).await);

    let written = assert_ok!(assert_ok!(platform.get_project_meta(project_id).await).to_json());
    assert_eq!(written["projectType"], json!("videos"));
    assert_eq!(written["projectSettings"]["multiView"]["enabled"], json!(false));
    assert_eq!(written["classes"][0]["geometry_config"], json!({}));
    assert_eq!(written["tags"][0]["name"], json!("fruits"));
}

#[tokio::test]
async fn test_invalid_values_are_rejected_before_any_call() {
    init_tracing();

    let (platform, context) = MockPlatform::with_demo_project().await;
    let meta = assert_ok!(platform.get_project_meta(context.project_id).await);
    let (orange, _) = assert_ok!(ensure_tag_meta(&platform, context.project_id, &orange(&["small", "big"]), meta).await);

    let videos = assert_ok!(platform.list_videos(context.dataset_id).await);
    let annotation = assert_ok!(platform.download_video_annotation(videos[0].id).await);
    let object = annotation.objects_with_class("orange").next().unwrap();

    let tags = assert_ok!(ObjectTags::new(&platform, &orange));
    let err = assert_err!(tags.add(object.id, Some(&TagValue::from("medium")), None).await);
    assert!(matches!(err, TaggerError::InvalidTagValue { .. }));
    assert!(platform.object_tags(object.id).await.is_empty());

    let err = VideoTags::new(&platform, &orange).err().expect("object-only tag meta accepted for videos");
    assert!(matches!(err, TaggerError::NotApplicable { target: "videos", .. }));
}

#[tokio::test]
async fn test_local_definition_without_id_cannot_be_used() {
    init_tracing();

    let platform = MockPlatform::new();
    let local = TagMeta::new("fruits", TagValueType::AnyNumber);
    let err = VideoTags::new(&platform, &local).err().expect("tag meta without id accepted");
    assert!(matches!(err, TaggerError::TagMetaWithoutId(name) if name == "fruits"));
}

#[tokio::test]
async fn test_numeric_looking_text_is_kept_for_string_tags() {
    init_tracing();

    let (platform, context) = MockPlatform::with_demo_project().await;
    let meta = assert_ok!(platform.get_project_meta(context.project_id).await);
    let (label, _) = assert_ok!(ensure_tag_meta(&platform, context.project_id, &TagMeta::new("label", TagValueType::AnyString), meta).await);

    let videos = assert_ok!(platform.list_videos(context.dataset_id).await);
    let value = assert_ok!(label.parse_value("123"));
    let tags = assert_ok!(VideoTags::new(&platform, &label));
    let tag_id = assert_ok!(tags.add(videos[0].id, Some(&value), None).await);

    let info = assert_ok!(platform.get_video_info(videos[0].id).await);
    let tag = info.tags.iter().find(|tag| tag.id == tag_id).unwrap();
    assert_eq!(tag.value, Some(TagValue::from("123")));
}
