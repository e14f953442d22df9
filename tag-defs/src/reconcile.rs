use crate::defs::{DefsError, ProjectMeta, TagMeta, TagValueType};

/// A way in which an existing server tag meta differs from the requested one.
#[derive(Debug, Clone, PartialEq)]
pub enum Divergence {
    PossibleValues {
        existing: Vec<String>,
        requested: Vec<String>,
    },
    ValueType {
        existing: TagValueType,
        requested: TagValueType,
    },
}

impl std::fmt::Display for Divergence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Divergence::PossibleValues { existing, .. } => {
                write!(f, "already exists, but with another values: {:?}", existing)
            }
            Divergence::ValueType { existing, requested } => {
                write!(f, "already exists with value type {} (requested {})", existing, requested)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Reconciliation {
    /// The name is new: push `updated_meta`, then re-fetch to learn the id.
    Create { updated_meta: ProjectMeta },
    /// The name exists: use the server definition as-is.
    Reuse {
        existing: TagMeta,
        divergences: Vec<Divergence>,
    },
}

/// Decides how to obtain a usable tag meta named like `desired` from `meta`.
///
/// Possible values are compared as sorted lists and only when `desired`
/// declares any. Mismatches never fail; they are returned for the caller to
/// report.
pub fn reconcile(desired: &TagMeta, meta: &ProjectMeta) -> Result<Reconciliation, DefsError> {
    let Some(existing) = meta.get_tag_meta(&desired.name) else {
        let updated_meta = meta.add_tag_meta(desired.clone())?;
        return Ok(Reconciliation::Create { updated_meta });
    };

    let mut divergences = Vec::new();

    if existing.value_type != desired.value_type {
        divergences.push(Divergence::ValueType {
            existing: existing.value_type,
            requested: desired.value_type,
        });
    }

    if !desired.possible_values.is_empty()
        && existing.sorted_possible_values() != desired.sorted_possible_values()
    {
        divergences.push(Divergence::PossibleValues {
            existing: existing.possible_values.clone(),
            requested: desired.possible_values.clone(),
        });
    }

    Ok(Reconciliation::Reuse {
        existing: existing.clone(),
        divergences,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::defs::TagApplicableTo;

    fn orange(values: &[&str]) -> TagMeta {
        TagMeta::new("orange", TagValueType::OneofString)
            .with_applicable_to(TagApplicableTo::ObjectsOnly)
            .with_possible_values(values.iter().copied())
    }

    fn server_meta_with(tag_meta: TagMeta, id: i64) -> ProjectMeta {
        let mut meta = ProjectMeta::default().add_tag_meta(tag_meta).unwrap();
        meta.tag_metas[0].id = Some(id);
        meta
    }

    #[test]
    fn new_name_produces_create() {
        let meta = ProjectMeta::default();
        let desired = TagMeta::new("fruits", TagValueType::AnyNumber);

        match reconcile(&desired, &meta).unwrap() {
            Reconciliation::Create { updated_meta } => {
                assert_eq!(updated_meta.tag_metas.len(), 1);
                assert_eq!(updated_meta.get_tag_meta("fruits"), Some(&desired));
            }
            other => panic!("expected Create, got {:?}", other),
        }
    }

    #[test]
    fn same_values_in_other_order_reuse_without_divergence() {
        let meta = server_meta_with(orange(&["small", "big"]), 7);

        match reconcile(&orange(&["big", "small"]), &meta).unwrap() {
            Reconciliation::Reuse { existing, divergences } => {
                assert_eq!(existing.sly_id(), Some(7));
                assert!(divergences.is_empty());
            }
            other => panic!("expected Reuse, got {:?}", other),
        }
    }

    #[test]
    fn different_values_report_one_divergence_and_keep_server_definition() {
        let meta = server_meta_with(orange(&["small", "big"]), 7);

        match reconcile(&orange(&["small", "medium"]), &meta).unwrap() {
            Reconciliation::Reuse { existing, divergences } => {
                assert_eq!(existing.possible_values, vec!["small", "big"]);
                assert_eq!(
                    divergences,
                    vec![Divergence::PossibleValues {
                        existing: vec!["small".to_string(), "big".to_string()],
                        requested: vec!["small".to_string(), "medium".to_string()],
                    }]
                );
            }
            other => panic!("expected Reuse, got {:?}", other),
        }
    }

    #[test]
    fn requested_without_values_skips_value_comparison() {
        let meta = server_meta_with(TagMeta::new("fruits", TagValueType::AnyNumber), 3);
        let desired = TagMeta::new("fruits", TagValueType::AnyNumber);

        let Reconciliation::Reuse { divergences, .. } = reconcile(&desired, &meta).unwrap() else {
            panic!("expected Reuse");
        };
        assert!(divergences.is_empty());
    }

    #[test]
    fn value_type_mismatch_is_reported_not_corrected() {
        let meta = server_meta_with(TagMeta::new("fruits", TagValueType::AnyString), 3);
        let desired = TagMeta::new("fruits", TagValueType::AnyNumber);

        let Reconciliation::Reuse { existing, divergences } = reconcile(&desired, &meta).unwrap() else {
            panic!("expected Reuse");
        };
        assert_eq!(existing.value_type, TagValueType::AnyString);
        assert_eq!(
            divergences,
            vec![Divergence::ValueType {
                existing: TagValueType::AnyString,
                requested: TagValueType::AnyNumber,
            }]
        );
    }

    #[test]
    fn invalid_new_definition_is_rejected() {
        let desired = TagMeta::new("orange", TagValueType::OneofString);
        assert!(matches!(
            reconcile(&desired, &ProjectMeta::default()),
            Err(DefsError::MissingPossibleValues(_))
        ));
    }
}
