use std::collections::{BTreeSet, HashSet};

use crate::model::{
    Application, Change, ChangeReport, ChangeType, Endpoint, IgnoredChangeTypes,
    ModelElementReference, Timestamp,
};

/// Collects changes and routes each into the active or the ignored set.
struct ChangeReportBuilder {
    ignored_types: IgnoredChangeTypes,
    changes: BTreeSet<Change>,
    ignored_changes: BTreeSet<Change>,
}

impl ChangeReportBuilder {
    fn new(ignored_types: IgnoredChangeTypes) -> Self {
        Self {
            ignored_types,
            changes: BTreeSet::new(),
            ignored_changes: BTreeSet::new(),
        }
    }

    fn add(&mut self, change: Change) {
        if self.ignored_types.ignores(change.change_type) {
            self.ignored_changes.insert(change);
        } else {
            self.changes.insert(change);
        }
    }

    fn build(self, before_change: Timestamp, after_change: Timestamp) -> ChangeReport {
        ChangeReport {
            changes: self.changes,
            ignored_changes: self.ignored_changes,
            before_change,
            after_change,
        }
    }
}

/// Diffs two system-model snapshots. Pure: neither input is modified.
#[derive(Debug, Clone, Default)]
pub struct ChangeDetector {
    ignored_types: IgnoredChangeTypes,
}

impl ChangeDetector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ignoring(ignored_types: IgnoredChangeTypes) -> Self {
        Self { ignored_types }
    }

    /// Reports what changed from `old_model` to `new_model`.
    pub fn compare(&self, new_model: &Application, old_model: &Application) -> ChangeReport {
        let mut builder = ChangeReportBuilder::new(self.ignored_types);
        let mut visited: HashSet<&str> = HashSet::new();

        for new_endpoint in &new_model.endpoints {
            let endpoint_ref = ModelElementReference::endpoint(new_endpoint.id.clone());

            match old_model.find_endpoint(&new_endpoint.id) {
                None => builder.add(Change::new(ChangeType::EndpointAdded, endpoint_ref)),
                Some(old_endpoint) => {
                    for property in old_endpoint.differing_properties(new_endpoint) {
                        if property != "parameters" {
                            builder.add(
                                Change::new(ChangeType::EndpointChanged, endpoint_ref.clone())
                                    .with_property(property),
                            );
                        }
                    }

                    Self::compare_parameters(&mut builder, old_endpoint, new_endpoint);
                    visited.insert(old_endpoint.id.as_str());
                }
            }
        }

        for old_endpoint in &old_model.endpoints {
            if !visited.contains(old_endpoint.id.as_str()) {
                builder.add(Change::new(
                    ChangeType::EndpointRemoved,
                    ModelElementReference::endpoint(old_endpoint.id.clone()),
                ));
            }
        }

        builder.build(old_model.timestamp, new_model.timestamp)
    }

    fn compare_parameters(builder: &mut ChangeReportBuilder, old_endpoint: &Endpoint, new_endpoint: &Endpoint) {
        if old_endpoint.parameters == new_endpoint.parameters {
            return;
        }

        let parent = ModelElementReference::endpoint(new_endpoint.id.clone());

        for param in &new_endpoint.parameters {
            let param_ref = ModelElementReference::parameter(param.id.clone());

            match old_endpoint.find_parameter(&param.id) {
                None => builder.add(
                    Change::new(ChangeType::ParameterAdded, param_ref).with_parent(parent.clone()),
                ),
                Some(old_param) => {
                    for property in param.differing_properties(old_param) {
                        builder.add(
                            Change::new(ChangeType::ParameterChanged, param_ref.clone())
                                .with_property(property)
                                .with_parent(parent.clone()),
                        );
                    }
                }
            }
        }

        for param in &old_endpoint.parameters {
            if new_endpoint.find_parameter(&param.id).is_none() {
                builder.add(
                    Change::new(ChangeType::ParameterRemoved, ModelElementReference::parameter(param.id.clone()))
                        .with_parent(parent.clone()),
                );
            }
        }
    }

    /// Builds the model that is actually stored for an update: every ignored change
    /// is undone, so that ignored additions are dropped, ignored removals restored
    /// and ignored property changes reset to their old values.
    pub fn revert_ignored(new_model: &Application, old_model: &Application, report: &ChangeReport) -> Application {
        let mut result = new_model.clone();

        for change in &report.ignored_changes {
            let id = change.changed_element.id.as_str();
            let parent_id = change.parent.as_ref().map(|p| p.id.as_str());

            match change.change_type {
                ChangeType::EndpointAdded => result.endpoints.retain(|e| e.id != id),
                ChangeType::EndpointRemoved => {
                    if let Some(old) = old_model.find_endpoint(id) {
                        result.endpoints.push(old.clone());
                    }
                }
                ChangeType::EndpointChanged => {
                    if let (Some(old), Some(property)) = (old_model.find_endpoint(id), &change.changed_property) {
                        if let Some(endpoint) = result.find_endpoint_mut(id) {
                            endpoint.copy_property_from(old, property);
                        }
                    }
                }
                ChangeType::ParameterAdded => {
                    if let Some(endpoint) = parent_id.and_then(|p| result.find_endpoint_mut(p)) {
                        endpoint.parameters.retain(|param| param.id != id);
                    }
                }
                ChangeType::ParameterRemoved => {
                    let old_param = parent_id
                        .and_then(|p| old_model.find_endpoint(p))
                        .and_then(|e| e.find_parameter(id));

                    if let (Some(old_param), Some(endpoint)) =
                        (old_param, parent_id.and_then(|p| result.find_endpoint_mut(p)))
                    {
                        endpoint.parameters.push(old_param.clone());
                    }
                }
                ChangeType::ParameterChanged => {
                    let old_param = parent_id
                        .and_then(|p| old_model.find_endpoint(p))
                        .and_then(|e| e.find_parameter(id));

                    if let (Some(old_param), Some(property), Some(endpoint)) = (
                        old_param,
                        &change.changed_property,
                        parent_id.and_then(|p| result.find_endpoint_mut(p)),
                    ) {
                        if let Some(param) = endpoint.parameters.iter_mut().find(|param| param.id == id) {
                            param.copy_property_from(old_param, property);
                        }
                    }
                }
            }
        }

        result
    }
}
