use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

pub type Id = String;

/// Version timestamp of a snapshot. Snapshots of one tag are ordered by it.
pub type Timestamp = DateTime<Utc>;

/// The kinds of model elements a weak reference or a report entry can point at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum ElementKind {
    Application,
    Endpoint,
    Parameter,
    Annotation,
    Input,
    EndpointAnnotation,
    ParameterAnnotation,
    RegexExtraction,
    SystemChanges,
}

impl ElementKind {
    pub fn type_name(&self) -> &'static str {
        match self {
            ElementKind::Application => "Application",
            ElementKind::Endpoint => "Endpoint",
            ElementKind::Parameter => "Parameter",
            ElementKind::Annotation => "Annotation",
            ElementKind::Input => "Input",
            ElementKind::EndpointAnnotation => "EndpointAnnotation",
            ElementKind::ParameterAnnotation => "ParameterAnnotation",
            ElementKind::RegexExtraction => "RegexExtraction",
            ElementKind::SystemChanges => "SystemChanges",
        }
    }
}

impl fmt::Display for ElementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.type_name())
    }
}

/// Timestamp used for the "before" side of a diff against a tag without history.
pub fn epoch() -> Timestamp {
    Utc.timestamp_opt(0, 0)
        .single()
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}
