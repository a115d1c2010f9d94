use serde::{Deserialize, Serialize};

use crate::model::{epoch, Id, Timestamp};

/// One snapshot of the endpoint inventory of a monitored application.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Application {
    pub id: Id,
    pub timestamp: Timestamp,
    #[serde(default)]
    pub endpoints: Vec<Endpoint>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Endpoint {
    pub id: Id,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encoding: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub headers: Vec<String>,
    #[serde(default)]
    pub parameters: Vec<Parameter>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Parameter {
    pub id: Id,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub kind: ParameterKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ParameterKind {
    #[default]
    ReqParam,
    UrlPart,
    Form,
    Body,
    Header,
}

impl Application {
    pub fn new(id: impl Into<Id>, timestamp: Timestamp) -> Self {
        Self {
            id: id.into(),
            timestamp,
            endpoints: Vec::new(),
        }
    }

    /// An application without endpoints, dated at the epoch. Used as the "before"
    /// side when a tag has no stored system model yet.
    pub fn empty(id: impl Into<Id>) -> Self {
        Self::new(id, epoch())
    }

    pub fn with_endpoint(mut self, endpoint: Endpoint) -> Self {
        self.endpoints.push(endpoint);
        self
    }

    pub fn find_endpoint(&self, id: &str) -> Option<&Endpoint> {
        self.endpoints.iter().find(|e| e.id == id)
    }

    pub fn find_endpoint_mut(&mut self, id: &str) -> Option<&mut Endpoint> {
        self.endpoints.iter_mut().find(|e| e.id == id)
    }

    /// Ids of all endpoints must be unique, and parameter ids unique per endpoint.
    pub fn duplicate_ids(&self) -> Vec<Id> {
        let mut seen = std::collections::HashSet::new();
        let mut duplicates = Vec::new();

        for endpoint in &self.endpoints {
            if !seen.insert(endpoint.id.as_str()) {
                duplicates.push(endpoint.id.clone());
            }

            let mut params = std::collections::HashSet::new();
            for param in &endpoint.parameters {
                if !params.insert(param.id.as_str()) {
                    duplicates.push(format!("{}/{}", endpoint.id, param.id));
                }
            }
        }

        duplicates
    }
}

impl Endpoint {
    pub fn new(id: impl Into<Id>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    pub fn with_parameter(mut self, parameter: Parameter) -> Self {
        self.parameters.push(parameter);
        self
    }

    pub fn find_parameter(&self, id: &str) -> Option<&Parameter> {
        self.parameters.iter().find(|p| p.id == id)
    }

    /// Names of the properties that differ from `other`, including `parameters`.
    pub fn differing_properties(&self, other: &Endpoint) -> Vec<&'static str> {
        let mut props = Vec::new();

        if self.domain != other.domain {
            props.push("domain");
        }
        if self.port != other.port {
            props.push("port");
        }
        if self.path != other.path {
            props.push("path");
        }
        if self.method != other.method {
            props.push("method");
        }
        if self.encoding != other.encoding {
            props.push("encoding");
        }
        if self.protocol != other.protocol {
            props.push("protocol");
        }
        if self.headers != other.headers {
            props.push("headers");
        }
        if self.parameters != other.parameters {
            props.push("parameters");
        }

        props
    }

    /// Resets a single property to the value held by `source`.
    /// Returns false for unknown property names.
    pub fn copy_property_from(&mut self, source: &Endpoint, property: &str) -> bool {
        match property {
            "domain" => self.domain = source.domain.clone(),
            "port" => self.port = source.port.clone(),
            "path" => self.path = source.path.clone(),
            "method" => self.method = source.method.clone(),
            "encoding" => self.encoding = source.encoding.clone(),
            "protocol" => self.protocol = source.protocol.clone(),
            "headers" => self.headers = source.headers.clone(),
            "parameters" => self.parameters = source.parameters.clone(),
            _ => return false,
        }
        true
    }
}

impl Parameter {
    pub fn new(id: impl Into<Id>, kind: ParameterKind) -> Self {
        Self {
            id: id.into(),
            name: None,
            kind,
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn differing_properties(&self, other: &Parameter) -> Vec<&'static str> {
        let mut props = Vec::new();

        if self.name != other.name {
            props.push("name");
        }
        if self.kind != other.kind {
            props.push("kind");
        }

        props
    }

    pub fn copy_property_from(&mut self, source: &Parameter, property: &str) -> bool {
        match property {
            "name" => self.name = source.name.clone(),
            "kind" => self.kind = source.kind,
            _ => return false,
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_differing_properties_lists_parameters_separately() {
        let mut a = Endpoint::new("login");
        a.domain = Some("localhost".to_string());
        let mut b = a.clone();
        b.domain = Some("example.org".to_string());
        b.parameters.push(Parameter::new("user", ParameterKind::ReqParam));

        assert_eq!(a.differing_properties(&b), vec!["domain", "parameters"]);
        assert!(a.differing_properties(&a).is_empty());
    }

    #[test]
    fn test_parameter_ids_may_repeat_across_endpoints() {
        let app = Application::empty("shop")
            .with_endpoint(Endpoint::new("login").with_parameter(Parameter::new("user", ParameterKind::Form)))
            .with_endpoint(
                Endpoint::new("logout").with_parameter(Parameter::new("user", ParameterKind::ReqParam)),
            );

        assert!(app.duplicate_ids().is_empty());
        assert_eq!(
            app.find_endpoint("logout").and_then(|e| e.find_parameter("user")).map(|p| p.kind),
            Some(ParameterKind::ReqParam)
        );
    }

    #[test]
    fn test_duplicate_ids() {
        let app = Application::empty("shop")
            .with_endpoint(Endpoint::new("login"))
            .with_endpoint(
                Endpoint::new("login")
                    .with_parameter(Parameter::new("user", ParameterKind::Form))
                    .with_parameter(Parameter::new("user", ParameterKind::Form)),
            );

        assert_eq!(app.duplicate_ids(), vec!["login".to_string(), "login/user".to_string()]);
    }
}
