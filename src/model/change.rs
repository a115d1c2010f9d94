use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

use crate::model::{ModelElementReference, Timestamp};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChangeType {
    EndpointAdded,
    EndpointRemoved,
    EndpointChanged,
    ParameterAdded,
    ParameterRemoved,
    ParameterChanged,
}

impl ChangeType {
    pub const ALL: [ChangeType; 6] = [
        ChangeType::EndpointAdded,
        ChangeType::EndpointRemoved,
        ChangeType::EndpointChanged,
        ChangeType::ParameterAdded,
        ChangeType::ParameterRemoved,
        ChangeType::ParameterChanged,
    ];

    pub fn description(&self) -> &'static str {
        match self {
            ChangeType::EndpointAdded => "A new endpoint has been added.",
            ChangeType::EndpointRemoved => "The endpoint has been removed.",
            ChangeType::EndpointChanged => "The endpoint has changed.",
            ChangeType::ParameterAdded => "A new parameter has been added.",
            ChangeType::ParameterRemoved => "The parameter has been removed.",
            ChangeType::ParameterChanged => "The parameter has changed.",
        }
    }
}

/// One difference between two system-model snapshots.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Change {
    #[serde(rename = "type")]
    pub change_type: ChangeType,
    pub changed_element: ModelElementReference,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub changed_property: Option<String>,
    /// Endpoint owning a changed parameter.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<ModelElementReference>,
}

impl Change {
    pub fn new(change_type: ChangeType, changed_element: ModelElementReference) -> Self {
        Self {
            change_type,
            changed_element,
            changed_property: None,
            parent: None,
        }
    }

    pub fn with_property(mut self, property: impl Into<String>) -> Self {
        self.changed_property = Some(property.into());
        self
    }

    pub fn with_parent(mut self, parent: ModelElementReference) -> Self {
        self.parent = Some(parent);
        self
    }
}

impl fmt::Display for Change {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} {}", self.change_type, self.changed_element)?;
        if let Some(property) = &self.changed_property {
            write!(f, " ({})", property)?;
        }
        Ok(())
    }
}

/// Which change types are routed into the ignored set instead of the active one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct IgnoredChangeTypes {
    pub ignore_endpoint_added: bool,
    pub ignore_endpoint_removed: bool,
    pub ignore_endpoint_changed: bool,
    pub ignore_parameter_added: bool,
    pub ignore_parameter_removed: bool,
    pub ignore_parameter_changed: bool,
}

impl IgnoredChangeTypes {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn of(types: &[ChangeType]) -> Self {
        let mut ignored = Self::default();
        for change_type in types {
            match change_type {
                ChangeType::EndpointAdded => ignored.ignore_endpoint_added = true,
                ChangeType::EndpointRemoved => ignored.ignore_endpoint_removed = true,
                ChangeType::EndpointChanged => ignored.ignore_endpoint_changed = true,
                ChangeType::ParameterAdded => ignored.ignore_parameter_added = true,
                ChangeType::ParameterRemoved => ignored.ignore_parameter_removed = true,
                ChangeType::ParameterChanged => ignored.ignore_parameter_changed = true,
            }
        }
        ignored
    }

    pub fn ignores(&self, change_type: ChangeType) -> bool {
        match change_type {
            ChangeType::EndpointAdded => self.ignore_endpoint_added,
            ChangeType::EndpointRemoved => self.ignore_endpoint_removed,
            ChangeType::EndpointChanged => self.ignore_endpoint_changed,
            ChangeType::ParameterAdded => self.ignore_parameter_added,
            ChangeType::ParameterRemoved => self.ignore_parameter_removed,
            ChangeType::ParameterChanged => self.ignore_parameter_changed,
        }
    }

    /// Union of both configurations, e.g. service defaults and per-request flags.
    pub fn merge(&self, other: &IgnoredChangeTypes) -> Self {
        let types: Vec<ChangeType> = ChangeType::ALL
            .into_iter()
            .filter(|t| self.ignores(*t) || other.ignores(*t))
            .collect();
        Self::of(&types)
    }
}

/// Result of diffing two system-model snapshots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeReport {
    pub changes: BTreeSet<Change>,
    pub ignored_changes: BTreeSet<Change>,
    pub before_change: Timestamp,
    pub after_change: Timestamp,
}

impl ChangeReport {
    pub fn changed(&self) -> bool {
        !self.changes.is_empty()
    }

    pub fn changes_of(&self, change_type: ChangeType) -> impl Iterator<Item = &Change> {
        self.changes
            .iter()
            .filter(move |change| change.change_type == change_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ignored_change_types_config_keys() {
        let ignored: IgnoredChangeTypes = serde_json::from_value(serde_json::json!({
            "ignore-endpoint-added": true,
            "ignore-parameter-removed": true
        }))
        .unwrap();

        assert!(ignored.ignores(ChangeType::EndpointAdded));
        assert!(ignored.ignores(ChangeType::ParameterRemoved));
        assert!(!ignored.ignores(ChangeType::EndpointRemoved));
        assert_eq!(
            ignored,
            IgnoredChangeTypes::of(&[ChangeType::EndpointAdded, ChangeType::ParameterRemoved])
        );
    }

    #[test]
    fn test_merge_is_union() {
        let a = IgnoredChangeTypes::of(&[ChangeType::EndpointAdded]);
        let b = IgnoredChangeTypes::of(&[ChangeType::ParameterChanged]);
        let merged = a.merge(&b);

        assert!(merged.ignores(ChangeType::EndpointAdded));
        assert!(merged.ignores(ChangeType::ParameterChanged));
        assert!(!merged.ignores(ChangeType::EndpointChanged));
    }
}
