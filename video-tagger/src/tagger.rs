use crate::tag_meta_sync::require_id;
use crate::traits::AnnotationApi;
use crate::types::{Result, TagId, TaggerError};
use tag_defs::{FrameRange, TagApplicableTo, TagMeta, TagValue};
use tracing::info;

fn check_value(tag_meta: &TagMeta, value: Option<&TagValue>) -> Result<()> {
    if tag_meta.is_valid_value(value) {
        return Ok(());
    }
    Err(TaggerError::InvalidTagValue {
        name: tag_meta.name.clone(),
        value: value.map(|v| v.to_string()).unwrap_or_else(|| "<none>".to_string()),
    })
}

fn check_scope(tag_meta: &TagMeta, forbidden: TagApplicableTo, target: &'static str) -> Result<()> {
    if tag_meta.applicable_to == forbidden {
        return Err(TaggerError::NotApplicable {
            name: tag_meta.name.clone(),
            scope: tag_meta.applicable_to,
            target,
        });
    }
    Ok(())
}

/// Video-level tags of one tag meta.
pub struct VideoTags<'a, A: ?Sized> {
    api: &'a A,
    tag_meta: &'a TagMeta,
    tag_meta_id: i64,
}

impl<'a, A: AnnotationApi + ?Sized> VideoTags<'a, A> {
    pub fn new(api: &'a A, tag_meta: &'a TagMeta) -> Result<Self> {
        check_scope(tag_meta, TagApplicableTo::ObjectsOnly, "videos")?;
        Ok(Self {
            api,
            tag_meta,
            tag_meta_id: require_id(tag_meta)?,
        })
    }

    pub async fn add(&self, video_id: i64, value: Option<&TagValue>, frame_range: Option<FrameRange>) -> Result<TagId> {
        check_value(self.tag_meta, value)?;
        let tag_id = self.api.add_video_tag(self.tag_meta_id, video_id, value, frame_range).await?;
        info!(
            "Added tag [{}] to video {} (tag id {}, range {:?})",
            self.tag_meta.name, video_id, tag_id, frame_range
        );
        Ok(tag_id)
    }

    pub async fn update_value(&self, tag_id: TagId, value: &TagValue) -> Result<()> {
        check_value(self.tag_meta, Some(value))?;
        self.api.update_video_tag_value(tag_id, value).await?;
        info!("Video tag {} value set to {}", tag_id, value);
        Ok(())
    }

    pub async fn update_frame_range(&self, tag_id: TagId, frame_range: FrameRange) -> Result<()> {
        self.api.update_video_tag_frame_range(tag_id, frame_range).await?;
        info!("Video tag {} frame range set to {}", tag_id, frame_range);
        Ok(())
    }

    pub async fn remove(&self, tag_id: TagId) -> Result<()> {
        self.api.remove_video_tag(tag_id).await?;
        info!("Removed video tag {}", tag_id);
        Ok(())
    }
}

/// Tags of one tag meta on annotated objects.
pub struct ObjectTags<'a, A: ?Sized> {
    api: &'a A,
    tag_meta: &'a TagMeta,
    tag_meta_id: i64,
}

impl<'a, A: AnnotationApi + ?Sized> ObjectTags<'a, A> {
    pub fn new(api: &'a A, tag_meta: &'a TagMeta) -> Result<Self> {
        check_scope(tag_meta, TagApplicableTo::ImagesOnly, "objects")?;
        Ok(Self {
            api,
            tag_meta,
            tag_meta_id: require_id(tag_meta)?,
        })
    }

    pub async fn add(&self, object_id: i64, value: Option<&TagValue>, frame_range: Option<FrameRange>) -> Result<TagId> {
        check_value(self.tag_meta, value)?;
        let tag_id = self.api.add_object_tag(self.tag_meta_id, object_id, value, frame_range).await?;
        info!(
            "Added tag [{}] to object {} (tag id {}, range {:?})",
            self.tag_meta.name, object_id, tag_id, frame_range
        );
        Ok(tag_id)
    }

    pub async fn update_value(&self, tag_id: TagId, value: &TagValue) -> Result<()> {
        check_value(self.tag_meta, Some(value))?;
        self.api.update_object_tag_value(tag_id, value).await?;
        info!("Object tag {} value set to {}", tag_id, value);
        Ok(())
    }

    pub async fn update_frame_range(&self, tag_id: TagId, frame_range: FrameRange) -> Result<()> {
        self.api.update_object_tag_frame_range(tag_id, frame_range).await?;
        info!("Object tag {} frame range set to {}", tag_id, frame_range);
        Ok(())
    }

    pub async fn remove(&self, tag_id: TagId) -> Result<()> {
        self.api.remove_object_tag(tag_id).await?;
        info!("Removed object tag {}", tag_id);
        Ok(())
    }
}
