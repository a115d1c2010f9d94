use crate::logic::AnnotationStorageManager;
use crate::model::{
    epoch, Annotation, Application, DirectListInput, Endpoint, EndpointAnnotation, ExtractedInput,
    IgnoredChangeTypes, Input, Parameter, ParameterKind, RegexExtraction, Timestamp,
};
use crate::store::traits::Store;
use anyhow::Result;
use chrono::{TimeZone, Utc};

pub const SEED_TAG: &str = "shop";

fn day(month: u32, day: u32) -> Timestamp {
    Utc.with_ymd_and_hms(2018, month, day, 0, 0, 0)
        .single()
        .unwrap_or_else(epoch)
}

fn http_endpoint(id: &str, method: &str, path: &str) -> Endpoint {
    Endpoint {
        domain: Some("localhost".to_string()),
        port: Some("8080".to_string()),
        path: Some(path.to_string()),
        method: Some(method.to_string()),
        encoding: Some("<no-encoding>".to_string()),
        protocol: Some("http".to_string()),
        ..Endpoint::new(id)
    }
}

fn login() -> Endpoint {
    http_endpoint("login", "POST", "/login")
        .with_parameter(Parameter::new("user", ParameterKind::Form).named("user"))
        .with_parameter(Parameter::new("password", ParameterKind::Form).named("password"))
}

fn logout() -> Endpoint {
    http_endpoint("logout", "GET", "/logout")
        .with_parameter(Parameter::new("logoutuser", ParameterKind::ReqParam).named("user"))
}

/// Only the login endpoint.
pub fn first_application() -> Application {
    Application::new(SEED_TAG, day(1, 1)).with_endpoint(login())
}

/// Login gains a `remember` parameter and a logout endpoint appears.
pub fn second_application() -> Application {
    let login = login().with_parameter(Parameter::new("remember", ParameterKind::Form).named("remember"));
    Application::new(SEED_TAG, day(2, 1))
        .with_endpoint(login)
        .with_endpoint(logout())
}

/// Login is gone, only logout is left.
pub fn third_application() -> Application {
    Application::new(SEED_TAG, day(3, 1)).with_endpoint(logout())
}

fn users() -> Input {
    DirectListInput::new("USERS", vec!["alice".to_string(), "bob".to_string()])
}

fn passwords() -> Input {
    DirectListInput::new("PASSWORDS", vec!["secret".to_string(), "hunter2".to_string()])
}

/// Annotates the login endpoint of [`first_application`].
pub fn first_annotation() -> Annotation {
    let mut annotation = Annotation::new(SEED_TAG);
    annotation.inputs = vec![users(), passwords()];
    annotation.endpoint_annotations = vec![EndpointAnnotation::new("login")
        .with_parameter("user", "USERS")
        .with_parameter("password", "PASSWORDS")];
    annotation
}

/// Annotates both endpoints of [`second_application`]; the session token is
/// extracted from the login response.
pub fn second_annotation() -> Annotation {
    let mut annotation = first_annotation();
    annotation.inputs.push(Input::Extracted(ExtractedInput {
        id: "TOKEN".to_string(),
        extractions: vec![RegexExtraction::new("login", "token=([a-z0-9]+)")],
        initial_value: None,
    }));
    annotation
        .endpoint_annotations
        .push(EndpointAnnotation::new("logout").with_parameter("logoutuser", "USERS"));
    annotation
}

/// Replays the sample history of the `shop` tag through the manager.
pub async fn load_seed_data<S: Store>(manager: &AnnotationStorageManager<S>) -> Result<()> {
    let none = IgnoredChangeTypes::none();

    manager
        .apply_application_update(SEED_TAG, first_application(), &none)
        .await?;
    manager
        .apply_annotation_update(SEED_TAG, first_annotation())
        .await?;
    manager
        .apply_application_update(SEED_TAG, second_application(), &none)
        .await?;
    manager
        .apply_annotation_update(SEED_TAG, second_annotation())
        .await?;

    let snapshots = manager.store().list_timestamps(SEED_TAG).await?.len();
    log::info!("Seeded tag '{}' with {} snapshots", SEED_TAG, snapshots);
    Ok(())
}
