use serde::{Deserialize, Serialize};

use crate::model::{ElementKind, Endpoint, Id, ModelElementReference, Parameter, WeakReference};

/// Hand-authored enrichment of a system model. Every link into the system model is
/// a [`WeakReference`]; the annotation never owns system-model elements.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Annotation {
    pub id: Id,
    #[serde(default)]
    pub inputs: Vec<Input>,
    #[serde(default)]
    pub endpoint_annotations: Vec<EndpointAnnotation>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub overrides: Vec<PropertyOverride>,
}

/// A named source of test data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Input {
    DirectList(DirectListInput),
    Csv(CsvInput),
    Extracted(ExtractedInput),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DirectListInput {
    pub id: Id,
    #[serde(default)]
    pub data: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CsvInput {
    pub id: Id,
    pub filename: String,
    pub column: usize,
    #[serde(default = "default_separator")]
    pub separator: String,
    #[serde(default)]
    pub header: bool,
}

fn default_separator() -> String {
    ";".to_string()
}

/// Values extracted from the responses of other endpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedInput {
    pub id: Id,
    #[serde(default)]
    pub extractions: Vec<RegexExtraction>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initial_value: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegexExtraction {
    pub from: WeakReference<Endpoint>,
    pub pattern: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback_value: Option<String>,
    #[serde(default = "default_match_number")]
    pub match_number: i32,
}

fn default_match_number() -> i32 {
    1
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndpointAnnotation {
    pub endpoint: WeakReference<Endpoint>,
    #[serde(default)]
    pub parameter_annotations: Vec<ParameterAnnotation>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub overrides: Vec<PropertyOverride>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterAnnotation {
    pub parameter: WeakReference<Parameter>,
    pub input: WeakReference<Input>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub overrides: Vec<PropertyOverride>,
}

/// Replaces a property of the generated load test, e.g. the target domain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyOverride {
    pub key: PropertyOverrideKey,
    pub value: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PropertyOverrideKey {
    #[serde(rename = "HttpEndpoint.domain")]
    HttpEndpointDomain,
    #[serde(rename = "HttpEndpoint.port")]
    HttpEndpointPort,
    #[serde(rename = "HttpEndpoint.protocol")]
    HttpEndpointProtocol,
    #[serde(rename = "HttpEndpoint.encoding")]
    HttpEndpointEncoding,
    #[serde(rename = "HttpEndpoint.base-path")]
    HttpEndpointBasePath,
    #[serde(rename = "Input.encoded")]
    InputEncoded,
}

impl Annotation {
    pub fn new(id: impl Into<Id>) -> Self {
        Self {
            id: id.into(),
            inputs: Vec::new(),
            endpoint_annotations: Vec::new(),
            overrides: Vec::new(),
        }
    }

    pub fn find_input(&self, id: &str) -> Option<&Input> {
        self.inputs.iter().find(|input| input.id() == id)
    }

    pub fn find_endpoint_annotation(&self, endpoint_id: &str) -> Option<&EndpointAnnotation> {
        self.endpoint_annotations
            .iter()
            .find(|ann| ann.endpoint.id() == endpoint_id)
    }

    pub fn parameter_annotations(&self) -> impl Iterator<Item = (&EndpointAnnotation, &ParameterAnnotation)> {
        self.endpoint_annotations
            .iter()
            .flat_map(|ep| ep.parameter_annotations.iter().map(move |p| (ep, p)))
    }

    /// All regex extractions with the element reference identifying each of them.
    pub fn extractions(&self) -> impl Iterator<Item = (ModelElementReference, &RegexExtraction)> {
        self.inputs.iter().filter_map(Input::as_extracted).flat_map(|input| {
            input
                .extractions
                .iter()
                .enumerate()
                .map(move |(index, extraction)| (input.extraction_reference(index), extraction))
        })
    }
}

impl Input {
    pub fn id(&self) -> &str {
        match self {
            Input::DirectList(input) => &input.id,
            Input::Csv(input) => &input.id,
            Input::Extracted(input) => &input.id,
        }
    }

    pub fn as_extracted(&self) -> Option<&ExtractedInput> {
        match self {
            Input::Extracted(input) => Some(input),
            _ => None,
        }
    }
}

impl ExtractedInput {
    pub fn extraction_reference(&self, index: usize) -> ModelElementReference {
        ModelElementReference::new(ElementKind::RegexExtraction, format!("{}#{}", self.id, index))
    }

    pub fn references_any(&self, endpoint_ids: &std::collections::HashSet<Id>) -> bool {
        self.extractions
            .iter()
            .any(|extraction| endpoint_ids.contains(extraction.from.id()))
    }
}

impl EndpointAnnotation {
    pub fn new(endpoint_id: impl Into<Id>) -> Self {
        Self {
            endpoint: WeakReference::new(endpoint_id),
            parameter_annotations: Vec::new(),
            overrides: Vec::new(),
        }
    }

    pub fn with_parameter(mut self, parameter_id: impl Into<Id>, input_id: impl Into<Id>) -> Self {
        self.parameter_annotations.push(ParameterAnnotation::new(parameter_id, input_id));
        self
    }

    pub fn element_reference(&self) -> ModelElementReference {
        ModelElementReference::new(ElementKind::EndpointAnnotation, self.endpoint.id())
    }
}

impl ParameterAnnotation {
    pub fn new(parameter_id: impl Into<Id>, input_id: impl Into<Id>) -> Self {
        Self {
            parameter: WeakReference::new(parameter_id),
            input: WeakReference::new(input_id),
            overrides: Vec::new(),
        }
    }

    /// Parameter ids are only unique per endpoint, so the holder is addressed as
    /// `<endpoint>/<parameter>`.
    pub fn element_reference(&self, endpoint_annotation: &EndpointAnnotation) -> ModelElementReference {
        ModelElementReference::new(
            ElementKind::ParameterAnnotation,
            format!("{}/{}", endpoint_annotation.endpoint.id(), self.parameter.id()),
        )
    }
}

impl RegexExtraction {
    pub fn new(from: impl Into<Id>, pattern: impl Into<String>) -> Self {
        Self {
            from: WeakReference::new(from),
            pattern: pattern.into(),
            response_key: None,
            fallback_value: None,
            match_number: default_match_number(),
        }
    }
}

impl DirectListInput {
    pub fn new(id: impl Into<Id>, data: Vec<String>) -> Input {
        Input::DirectList(Self { id: id.into(), data })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_input_variants_are_tagged() {
        let input = DirectListInput::new("DAT1", vec!["foo".to_string(), "bar".to_string()]);
        let json = serde_json::to_value(&input).unwrap();
        assert_eq!(json["type"], "direct-list");
        assert_eq!(json["id"], "DAT1");

        let csv: Input = serde_json::from_value(serde_json::json!({
            "type": "csv",
            "id": "CSV1",
            "filename": "users.csv",
            "column": 3
        }))
        .unwrap();
        match csv {
            Input::Csv(csv) => {
                assert_eq!(csv.column, 3);
                assert_eq!(csv.separator, ";");
            }
            other => panic!("expected csv input, got {:?}", other),
        }
    }

    #[test]
    fn test_extractions_are_addressed_by_input_and_index() {
        let mut annotation = Annotation::new("ANN");
        annotation.inputs.push(Input::Extracted(ExtractedInput {
            id: "EXT".to_string(),
            extractions: vec![
                RegexExtraction::new("login", "token=(.*)"),
                RegexExtraction::new("logout", "(.*)"),
            ],
            initial_value: None,
        }));

        let refs: Vec<String> = annotation.extractions().map(|(r, _)| r.id).collect();
        assert_eq!(refs, vec!["EXT#0".to_string(), "EXT#1".to_string()]);
    }

    #[test]
    fn test_override_keys_use_dotted_names() {
        let ov = PropertyOverride {
            key: PropertyOverrideKey::HttpEndpointDomain,
            value: "localhost".to_string(),
        };
        let json = serde_json::to_value(&ov).unwrap();
        assert_eq!(json["key"], "HttpEndpoint.domain");
    }
}
