use std::collections::HashSet;

use crate::model::{Annotation, Id, ValidityReport};

/// Appended to the id of an annotation the fixer had to change.
pub const REPAIR_SUFFIX: &str = "-repaired";

/// Single-pass repair of annotations broken by removed endpoints.
pub struct AnnotationFixer;

impl AnnotationFixer {
    /// Drops every part of `annotation` that depends on an endpoint removed
    /// according to `report`. The result may still be breaking, e.g. when a
    /// parameter was removed; callers re-check it.
    pub fn fix(annotation: &Annotation, report: &ValidityReport) -> Annotation {
        if !report.is_breaking() {
            return annotation.clone();
        }

        let removed: HashSet<Id> = report.removed_endpoint_ids().map(str::to_string).collect();
        if removed.is_empty() {
            return annotation.clone();
        }

        let id = if annotation.id.ends_with(REPAIR_SUFFIX) {
            annotation.id.clone()
        } else {
            format!("{}{}", annotation.id, REPAIR_SUFFIX)
        };

        let inputs = annotation
            .inputs
            .iter()
            .filter(|input| input.as_extracted().map_or(true, |extracted| !extracted.references_any(&removed)))
            .cloned()
            .collect();

        let endpoint_annotations = annotation
            .endpoint_annotations
            .iter()
            .filter(|ann| !removed.contains(ann.endpoint.id()))
            .cloned()
            .collect();

        Annotation {
            id,
            inputs,
            endpoint_annotations,
            overrides: annotation.overrides.clone(),
        }
    }
}
