use std::collections::{BTreeSet, HashMap, HashSet};

use crate::model::{
    Annotation, Application, Change, ChangeReport, EndpointAnnotation, ModelElementReference, Violation,
    ViolationMap, ViolationType, ValidityReport,
};

/// Accumulates violations while an annotation is walked.
///
/// Active system changes are indexed by the element they changed. Whenever a
/// reference to such an element is resolved, the change is attached to the
/// annotation element holding the reference. Parameter changes only match a
/// reference made within the same endpoint. Whatever is left unclaimed at the
/// end lands in the synthetic "System changes" bucket.
struct ReportBuilder<'a> {
    application_changes: BTreeSet<Change>,
    changes_by_element: HashMap<&'a ModelElementReference, Vec<&'a Change>>,
    claimed: HashSet<&'a Change>,
    violations: ViolationMap,
}

impl<'a> ReportBuilder<'a> {
    fn new(change_report: Option<&'a ChangeReport>) -> Self {
        let mut changes_by_element: HashMap<&ModelElementReference, Vec<&Change>> = HashMap::new();
        let mut application_changes = BTreeSet::new();

        if let Some(report) = change_report {
            for change in &report.changes {
                changes_by_element
                    .entry(&change.changed_element)
                    .or_default()
                    .push(change);
                application_changes.insert(change.clone());
            }
        }

        Self {
            application_changes,
            changes_by_element,
            claimed: HashSet::new(),
            violations: ViolationMap::new(),
        }
    }

    fn add_violation(&mut self, holder: ModelElementReference, violation: Violation) {
        self.violations.entry(holder).or_default().insert(violation);
    }

    /// Attaches all changes of `referenced` within `parent` to `holder`.
    fn attach_changes(
        &mut self,
        holder: &ModelElementReference,
        referenced: &ModelElementReference,
        parent: Option<&ModelElementReference>,
    ) {
        let Some(changes) = self.changes_by_element.get(referenced) else {
            return;
        };

        let matching: Vec<&'a Change> = changes
            .iter()
            .copied()
            .filter(|change| change.parent.as_ref() == parent)
            .collect();
        if matching.is_empty() {
            return;
        }

        let entry = self.violations.entry(holder.clone()).or_default();
        entry.extend(matching.iter().map(|change| Violation::from(*change)));
        self.claimed.extend(matching);
    }

    fn build(mut self) -> ValidityReport {
        let unclaimed: Vec<Violation> = self
            .changes_by_element
            .values()
            .flatten()
            .filter(|change| !self.claimed.contains(*change))
            .map(|change| Violation::from(*change))
            .collect();

        if !unclaimed.is_empty() {
            self.violations
                .entry(ModelElementReference::system_changes())
                .or_default()
                .extend(unclaimed);
        }

        ValidityReport {
            application_changes: self.application_changes,
            violations: self.violations,
            violations_before_fix: None,
        }
    }
}

/// Checks annotations against system models.
pub struct ValidityChecker;

impl ValidityChecker {
    /// Checks `annotation` against `application`, relating the active changes of
    /// `change_report` to the annotation elements they affect. Pure.
    pub fn check(
        application: &Application,
        annotation: Option<&Annotation>,
        change_report: Option<&ChangeReport>,
    ) -> ValidityReport {
        let mut builder = ReportBuilder::new(change_report);

        if let Some(annotation) = annotation {
            Self::check_internal_references(&mut builder, annotation);
            Self::check_external_references(&mut builder, application, annotation);
        }

        builder.build()
    }

    fn check_internal_references(builder: &mut ReportBuilder<'_>, annotation: &Annotation) {
        for (endpoint_annotation, parameter_annotation) in annotation.parameter_annotations() {
            if parameter_annotation.input.is_dangling(annotation) {
                let violation = Violation::new(
                    ViolationType::IllegalInternalReference,
                    parameter_annotation.input.element_reference(),
                );
                builder.add_violation(parameter_annotation.element_reference(endpoint_annotation), violation.clone());
                builder.add_violation(endpoint_annotation.element_reference(), violation);
            }
        }
    }

    fn check_external_references(builder: &mut ReportBuilder<'_>, application: &Application, annotation: &Annotation) {
        for endpoint_annotation in &annotation.endpoint_annotations {
            Self::check_endpoint_annotation(builder, application, endpoint_annotation);
        }

        for (holder, extraction) in annotation.extractions() {
            let referenced = extraction.from.element_reference();
            builder.attach_changes(&holder, &referenced, None);

            if extraction.from.is_dangling(application) {
                builder.add_violation(holder, Violation::new(ViolationType::IllegalEndpointReference, referenced));
            }
        }
    }

    fn check_endpoint_annotation(
        builder: &mut ReportBuilder<'_>,
        application: &Application,
        endpoint_annotation: &EndpointAnnotation,
    ) {
        let holder = endpoint_annotation.element_reference();
        let referenced = endpoint_annotation.endpoint.element_reference();
        builder.attach_changes(&holder, &referenced, None);

        let endpoint = endpoint_annotation.endpoint.resolve(application);
        match endpoint {
            Some(endpoint) => {
                for param in &endpoint.parameters {
                    let param_ref = ModelElementReference::parameter(param.id.clone());
                    builder.attach_changes(&holder, &param_ref, Some(&referenced));
                }
            }
            None => builder.add_violation(
                holder,
                Violation::new(ViolationType::IllegalEndpointReference, referenced.clone()),
            ),
        }

        // Parameters resolve within the annotated endpoint only
        for parameter_annotation in &endpoint_annotation.parameter_annotations {
            let holder = parameter_annotation.element_reference(endpoint_annotation);
            let param_ref = parameter_annotation.parameter.element_reference();
            builder.attach_changes(&holder, &param_ref, Some(&referenced));

            let resolved = endpoint.and_then(|endpoint| parameter_annotation.parameter.resolve(endpoint));
            if resolved.is_none() {
                builder.add_violation(holder, Violation::new(ViolationType::IllegalParameterReference, param_ref));
            }
        }
    }
}
