use crate::traits::AnnotationApi;
use crate::types::{Result, TaggerError};
use tag_defs::{reconcile, ProjectMeta, Reconciliation, TagMeta};
use tracing::{info, warn};

/// Returns a server-backed tag meta named like `desired`, creating it first if
/// the project does not have one.
///
/// When the name already exists the server definition wins; differences from
/// `desired` are logged as warnings and otherwise ignored. The returned
/// project meta is the latest one this call has seen.
pub async fn ensure_tag_meta<A>(
    api: &A,
    project_id: i64,
    desired: &TagMeta,
    project_meta: ProjectMeta,
) -> Result<(TagMeta, ProjectMeta)>
where
    A: AnnotationApi + ?Sized,
{
    match reconcile(desired, &project_meta)? {
        Reconciliation::Create { updated_meta } => {
            info!("Creating tag meta [{}] in project {}", desired.name, project_id);
            api.update_project_meta(project_id, &updated_meta).await?;

            let refreshed = api.get_project_meta(project_id).await?;
            let created = refreshed
                .get_tag_meta(&desired.name)
                .cloned()
                .ok_or_else(|| TaggerError::TagMetaNotFound(desired.name.clone()))?;
            Ok((created, refreshed))
        }
        Reconciliation::Reuse { existing, divergences } => {
            for divergence in &divergences {
                warn!("Tag [{}] {}", existing.name, divergence);
            }
            Ok((existing, project_meta))
        }
    }
}

/// Server id of a tag meta obtained from the platform.
pub fn require_id(tag_meta: &TagMeta) -> Result<i64> {
    tag_meta
        .sly_id()
        .ok_or_else(|| TaggerError::TagMetaWithoutId(tag_meta.name.clone()))
}
