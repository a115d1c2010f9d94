use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::model::{Change, ChangeType, ModelElementReference};

/// Violations per affected annotation element.
pub type ViolationMap = BTreeMap<ModelElementReference, BTreeSet<Violation>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ViolationType {
    // System changes
    EndpointAdded,
    EndpointRemoved,
    EndpointChanged,
    ParameterAdded,
    ParameterRemoved,
    ParameterChanged,

    // Broken references
    IllegalInternalReference,
    IllegalEndpointReference,
    IllegalParameterReference,
}

impl ViolationType {
    pub fn is_breaking(&self) -> bool {
        matches!(
            self,
            ViolationType::IllegalInternalReference
                | ViolationType::IllegalEndpointReference
                | ViolationType::IllegalParameterReference
        )
    }

    pub fn description(&self) -> &'static str {
        match self {
            ViolationType::IllegalInternalReference => "The reference to the input is not valid.",
            ViolationType::IllegalEndpointReference => "The reference to the endpoint is not valid.",
            ViolationType::IllegalParameterReference => "The reference to the parameter is not valid.",
            other => other
                .change_type()
                .map(|t| t.description())
                .unwrap_or_default(),
        }
    }

    fn change_type(&self) -> Option<ChangeType> {
        match self {
            ViolationType::EndpointAdded => Some(ChangeType::EndpointAdded),
            ViolationType::EndpointRemoved => Some(ChangeType::EndpointRemoved),
            ViolationType::EndpointChanged => Some(ChangeType::EndpointChanged),
            ViolationType::ParameterAdded => Some(ChangeType::ParameterAdded),
            ViolationType::ParameterRemoved => Some(ChangeType::ParameterRemoved),
            ViolationType::ParameterChanged => Some(ChangeType::ParameterChanged),
            _ => None,
        }
    }
}

impl From<ChangeType> for ViolationType {
    fn from(change_type: ChangeType) -> Self {
        match change_type {
            ChangeType::EndpointAdded => ViolationType::EndpointAdded,
            ChangeType::EndpointRemoved => ViolationType::EndpointRemoved,
            ChangeType::EndpointChanged => ViolationType::EndpointChanged,
            ChangeType::ParameterAdded => ViolationType::ParameterAdded,
            ChangeType::ParameterRemoved => ViolationType::ParameterRemoved,
            ChangeType::ParameterChanged => ViolationType::ParameterChanged,
        }
    }
}

/// One report entry: either a system change relevant to an annotation element or
/// a reference that failed to resolve.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Violation {
    #[serde(rename = "type")]
    pub violation_type: ViolationType,
    /// The referenced (possibly missing) element.
    pub referenced: ModelElementReference,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub changed_property: Option<String>,
}

impl Violation {
    pub fn new(violation_type: ViolationType, referenced: ModelElementReference) -> Self {
        Self {
            violation_type,
            referenced,
            changed_property: None,
        }
    }

    pub fn is_breaking(&self) -> bool {
        self.violation_type.is_breaking()
    }
}

impl From<&Change> for Violation {
    fn from(change: &Change) -> Self {
        Self {
            violation_type: change.change_type.into(),
            referenced: change.changed_element.clone(),
            changed_property: change.changed_property.clone(),
        }
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:?}: {} ({})",
            self.violation_type,
            self.violation_type.description(),
            self.referenced
        )?;
        if let Some(property) = &self.changed_property {
            write!(f, " [{}]", property)?;
        }
        Ok(())
    }
}

/// Outcome of checking an annotation against a system model.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidityReport {
    /// Active system changes of the transition that was checked.
    #[serde(default)]
    pub application_changes: BTreeSet<Change>,
    #[serde(default, with = "violation_entries")]
    pub violations: ViolationMap,
    /// Violations of the annotation before the fixer was applied.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "optional_violation_entries"
    )]
    pub violations_before_fix: Option<ViolationMap>,
}

impl ValidityReport {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_ok(&self) -> bool {
        self.violations.values().all(BTreeSet::is_empty) && self.application_changes.is_empty()
    }

    pub fn is_breaking(&self) -> bool {
        self.violations
            .values()
            .flat_map(BTreeSet::iter)
            .any(Violation::is_breaking)
    }

    pub fn violations_of(&self, element: &ModelElementReference) -> Option<&BTreeSet<Violation>> {
        self.violations.get(element)
    }

    pub fn breaking_violations(&self) -> impl Iterator<Item = (&ModelElementReference, &Violation)> {
        self.violations
            .iter()
            .flat_map(|(element, set)| set.iter().map(move |v| (element, v)))
            .filter(|(_, v)| v.is_breaking())
    }

    pub fn removed_endpoint_ids(&self) -> impl Iterator<Item = &str> {
        self.application_changes
            .iter()
            .filter(|c| c.change_type == ChangeType::EndpointRemoved)
            .map(|c| c.changed_element.id.as_str())
    }
}

impl fmt::Display for ValidityReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_ok() {
            return f.write_str("OK");
        }

        writeln!(
            f,
            "{} ({} system changes)",
            if self.is_breaking() { "BREAKING" } else { "NOT BREAKING" },
            self.application_changes.len()
        )?;

        for (element, violations) in &self.violations {
            writeln!(f, "{}: {}", element, violations.iter().join("; "))?;
        }

        Ok(())
    }
}

#[derive(Serialize, Deserialize)]
struct ViolationEntry {
    element: ModelElementReference,
    violations: BTreeSet<Violation>,
}

/// Serializes the struct-keyed map as a list of entries, JSON objects only allow string keys.
mod violation_entries {
    use super::*;
    use serde::{Deserializer, Serializer};

    pub fn serialize<S: Serializer>(map: &ViolationMap, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(map.iter().map(|(element, violations)| ViolationEntry {
            element: element.clone(),
            violations: violations.clone(),
        }))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<ViolationMap, D::Error> {
        let entries = Vec::<ViolationEntry>::deserialize(deserializer)?;
        Ok(entries.into_iter().map(|e| (e.element, e.violations)).collect())
    }
}

mod optional_violation_entries {
    use super::*;
    use serde::{Deserializer, Serializer};

    pub fn serialize<S: Serializer>(map: &Option<ViolationMap>, serializer: S) -> Result<S::Ok, S::Error> {
        match map {
            Some(map) => violation_entries::serialize(map, serializer),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<ViolationMap>, D::Error> {
        let entries = Option::<Vec<ViolationEntry>>::deserialize(deserializer)?;
        Ok(entries.map(|entries| entries.into_iter().map(|e| (e.element, e.violations)).collect()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ElementKind;

    fn reference(id: &str) -> ModelElementReference {
        ModelElementReference::new(ElementKind::Endpoint, id)
    }

    #[test]
    fn test_only_reference_violations_are_breaking() {
        let mut report = ValidityReport::empty();
        assert!(report.is_ok());
        assert!(!report.is_breaking());

        report
            .violations
            .entry(ModelElementReference::system_changes())
            .or_default()
            .insert(Violation::new(ViolationType::ParameterAdded, reference("bar")));
        assert!(!report.is_ok());
        assert!(!report.is_breaking());

        report
            .violations
            .entry(ModelElementReference::system_changes())
            .or_default()
            .insert(Violation::new(ViolationType::EndpointChanged, reference("42")));
        assert!(!report.is_ok());
        assert!(!report.is_breaking());

        report
            .violations
            .entry(reference("xyz"))
            .or_default()
            .insert(Violation::new(ViolationType::IllegalEndpointReference, reference("abc")));
        assert!(!report.is_ok());
        assert!(report.is_breaking());
    }

    #[test]
    fn test_report_json_shape() {
        let mut report = ValidityReport::empty();
        report
            .violations
            .entry(reference("login"))
            .or_default()
            .insert(Violation::new(ViolationType::IllegalEndpointReference, reference("login")));

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["violations"][0]["element"]["id"], "login");
        assert_eq!(
            json["violations"][0]["violations"][0]["type"],
            "ILLEGAL_ENDPOINT_REFERENCE"
        );
        assert!(json.get("violations_before_fix").is_none());

        let back: ValidityReport = serde_json::from_value(json).unwrap();
        assert_eq!(back, report);
    }
}
