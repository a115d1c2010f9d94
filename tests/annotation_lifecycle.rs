use annotation_db_rust::seed;
use annotation_db_rust::{
    Annotation, AnnotationStorageManager, Application, ChangeType, Endpoint, EndpointAnnotation, FileStore,
    IgnoredChangeTypes, ManagerError, MemoryStore, Parameter, ParameterKind, SnapshotStore, Store, Timestamp,
    ViolationType,
};
use chrono::Duration;

fn none() -> IgnoredChangeTypes {
    IgnoredChangeTypes::none()
}

fn at_day(day: i64) -> Timestamp {
    seed::first_application().timestamp + Duration::days(day)
}

/// The second model without the `logoutuser` parameter: the fixer cannot repair this.
fn without_logout_user(timestamp: Timestamp) -> Application {
    let mut app = seed::second_application();
    app.timestamp = timestamp;
    if let Some(logout) = app.find_endpoint_mut("logout") {
        logout.parameters.clear();
    }
    app
}

async fn manager_with_second<S: Store>(store: S) -> AnnotationStorageManager<S> {
    let manager = AnnotationStorageManager::new(store);
    manager
        .apply_application_update("shop", seed::first_application(), &none())
        .await
        .unwrap();
    manager
        .apply_annotation_update("shop", seed::first_annotation())
        .await
        .unwrap();
    manager
        .apply_application_update("shop", seed::second_application(), &none())
        .await
        .unwrap();
    let report = manager
        .apply_annotation_update("shop", seed::second_annotation())
        .await
        .unwrap();
    assert!(!report.is_breaking(), "{}", report);
    manager
}

async fn login_removal_is_repaired<S: Store>(store: S) {
    let manager = AnnotationStorageManager::new(store);

    // First model plus annotation
    manager
        .apply_application_update("shop", seed::first_application(), &none())
        .await
        .unwrap();
    let report = manager
        .apply_annotation_update("shop", seed::first_annotation())
        .await
        .unwrap();
    assert!(report.is_ok());

    // Additions carry the annotation along
    let report = manager
        .apply_application_update("shop", seed::second_application(), &none())
        .await
        .unwrap();
    assert!(!report.is_breaking());
    assert_eq!(
        manager.latest_annotation("shop").await.unwrap(),
        Some(seed::first_annotation())
    );

    manager
        .apply_annotation_update("shop", seed::second_annotation())
        .await
        .unwrap();

    // Login disappears: the fixer drops its endpoint annotation and the token extraction
    let report = manager
        .apply_application_update("shop", seed::third_application(), &none())
        .await
        .unwrap();
    assert!(!report.is_breaking(), "{}", report);
    let before_fix = report.violations_before_fix.as_ref().unwrap();
    assert!(before_fix
        .values()
        .flatten()
        .any(|v| v.violation_type == ViolationType::IllegalEndpointReference));

    let repaired = manager.latest_annotation("shop").await.unwrap().unwrap();
    assert_eq!(repaired.id, "shop-repaired");
    assert!(repaired.find_endpoint_annotation("login").is_none());
    assert!(repaired.find_input("TOKEN").is_none());
    assert!(!manager.is_broken("shop").await.unwrap());

    // The pre-break pair is kept for recovery
    assert_eq!(
        manager.base_application("shop").await.unwrap(),
        Some(seed::second_application())
    );
    assert_eq!(
        manager.base_annotation("shop").await.unwrap(),
        Some(seed::second_annotation())
    );

    // Earlier snapshots are untouched
    assert_eq!(
        manager
            .annotation_at("shop", seed::second_application().timestamp)
            .await
            .unwrap(),
        Some(seed::second_annotation())
    );
}

#[tokio::test]
async fn test_login_removal_is_repaired_in_memory() {
    login_removal_is_repaired(MemoryStore::new()).await;
}

#[tokio::test]
async fn test_login_removal_is_repaired_on_disk() {
    let dir = tempfile::tempdir().unwrap();
    login_removal_is_repaired(FileStore::new(dir.path()).await.unwrap()).await;
}

#[tokio::test]
async fn test_parameter_removal_quarantines_annotation() {
    let manager = manager_with_second(MemoryStore::new()).await;

    let report = manager
        .apply_application_update("shop", without_logout_user(at_day(60)), &none())
        .await
        .unwrap();

    assert!(report.is_breaking());
    assert!(report.violations_before_fix.is_some());
    assert!(report
        .breaking_violations()
        .any(|(_, v)| v.violation_type == ViolationType::IllegalParameterReference));

    assert!(manager.is_broken("shop").await.unwrap());
    assert!(manager.latest_annotation("shop").await.unwrap().is_none());
    assert_eq!(
        manager.base_annotation("shop").await.unwrap(),
        Some(seed::second_annotation())
    );
    assert!(!manager
        .is_broken_at("shop", seed::second_application().timestamp)
        .await
        .unwrap());
}

#[tokio::test]
async fn test_second_quarantine_keeps_first_base() {
    let manager = manager_with_second(MemoryStore::new()).await;

    manager
        .apply_application_update("shop", without_logout_user(at_day(60)), &none())
        .await
        .unwrap();

    let mut worse = without_logout_user(at_day(90));
    worse.endpoints.retain(|e| e.id != "login");
    let report = manager
        .apply_application_update("shop", worse.clone(), &none())
        .await
        .unwrap();

    assert!(report.is_breaking());
    assert!(manager.is_broken("shop").await.unwrap());
    assert_eq!(
        manager.base_application("shop").await.unwrap(),
        Some(seed::second_application())
    );

    // A manual fix against the latest model recovers the tag
    let mut fixed = Annotation::new("shop-manual");
    fixed.inputs = seed::first_annotation().inputs;
    fixed.endpoint_annotations = vec![EndpointAnnotation::new("logout")];

    let report = manager.apply_annotation_update("shop", fixed.clone()).await.unwrap();
    assert!(!report.is_breaking());
    assert!(!manager.is_broken("shop").await.unwrap());
    assert_eq!(manager.latest_annotation("shop").await.unwrap(), Some(fixed));
    assert!(manager.base_annotation("shop").await.unwrap().is_none());
    assert!(manager.base_application("shop").await.unwrap().is_none());
}

#[tokio::test]
async fn test_restored_parameter_recovers_quarantined_annotation() {
    let manager = manager_with_second(MemoryStore::new()).await;

    manager
        .apply_application_update("shop", without_logout_user(at_day(60)), &none())
        .await
        .unwrap();
    assert!(manager.is_broken("shop").await.unwrap());

    let mut restored = seed::second_application();
    restored.timestamp = at_day(90);
    let report = manager
        .apply_application_update("shop", restored, &none())
        .await
        .unwrap();

    assert!(!report.is_breaking());
    assert!(report
        .application_changes
        .iter()
        .any(|c| c.change_type == ChangeType::ParameterAdded));
    assert!(!manager.is_broken("shop").await.unwrap());
    assert_eq!(
        manager.latest_annotation("shop").await.unwrap(),
        Some(seed::second_annotation())
    );
}

#[tokio::test]
async fn test_breaking_annotation_update_is_not_stored() {
    let manager = manager_with_second(MemoryStore::new()).await;

    let mut annotation = seed::second_annotation();
    annotation.endpoint_annotations[1] = EndpointAnnotation::new("logout").with_parameter("logoutuser", "NOPE");

    let report = manager.apply_annotation_update("shop", annotation).await.unwrap();
    assert!(report.is_breaking());
    assert_eq!(
        manager.latest_annotation("shop").await.unwrap(),
        Some(seed::second_annotation())
    );
    assert!(!manager.is_broken("shop").await.unwrap());
}

#[tokio::test]
async fn test_equal_timestamp_replaces_latest_snapshot() {
    let manager = manager_with_second(MemoryStore::new()).await;

    let mut replacement = seed::second_application();
    replacement.endpoints[0].port = Some("9090".to_string());
    manager
        .apply_application_update("shop", replacement.clone(), &none())
        .await
        .unwrap();

    assert_eq!(manager.store().list_timestamps("shop").await.unwrap().len(), 2);
    assert_eq!(manager.latest_application("shop").await.unwrap(), Some(replacement));
    assert_eq!(
        manager.latest_annotation("shop").await.unwrap(),
        Some(seed::second_annotation())
    );
}

#[tokio::test]
async fn test_retime_cascade_recomputes_broken_flags() {
    let manager = AnnotationStorageManager::new(MemoryStore::new());

    manager
        .apply_application_update("shop", seed::first_application(), &none())
        .await
        .unwrap();
    manager
        .apply_annotation_update("shop", seed::first_annotation())
        .await
        .unwrap();

    // Login loses its password parameter; the annotation cannot be repaired
    let mut broken_model = seed::first_application();
    broken_model.timestamp = at_day(30);
    broken_model.endpoints[0].parameters.retain(|p| p.id != "password");
    manager
        .apply_application_update("shop", broken_model, &none())
        .await
        .unwrap();
    assert!(manager.is_broken("shop").await.unwrap());

    // Moved before the annotated snapshot, the model has no annotation in effect
    let earlier = at_day(-30);
    manager
        .retime_application_snapshot("shop", at_day(30), earlier)
        .await
        .unwrap();

    assert!(!manager.is_broken_at("shop", earlier).await.unwrap());
    assert!(manager.annotation_at("shop", earlier).await.unwrap().is_none());
    assert!(!manager.is_broken("shop").await.unwrap());
    assert_eq!(
        manager.latest_annotation("shop").await.unwrap(),
        Some(seed::first_annotation())
    );
    assert_eq!(
        manager.store().list_timestamps("shop").await.unwrap(),
        vec![seed::first_application().timestamp, earlier]
    );
}

/// The first model without the `password` parameter, dated `timestamp`.
fn without_password(timestamp: Timestamp) -> Application {
    let mut app = seed::first_application();
    app.timestamp = timestamp;
    app.endpoints[0].parameters.retain(|p| p.id != "password");
    app
}

/// Several unannotated snapshots follow the retimed one; once the annotated
/// snapshot moves before them, every one of them is checked against it.
async fn retime_flags_every_later_snapshot<S: Store>(store: S) {
    let manager = AnnotationStorageManager::new(store);
    let ignored = none();

    manager
        .apply_application_update("shop", seed::first_application(), &ignored)
        .await
        .unwrap();
    manager
        .apply_application_update("shop", without_password(at_day(10)), &ignored)
        .await
        .unwrap();

    let mut with_logout = without_password(at_day(20));
    with_logout.endpoints.push(seed::second_application().endpoints[1].clone());
    manager
        .apply_application_update("shop", with_logout, &ignored)
        .await
        .unwrap();

    let mut restored = seed::first_application();
    restored.timestamp = at_day(30);
    restored.endpoints.push(seed::second_application().endpoints[1].clone());
    manager
        .apply_application_update("shop", restored, &ignored)
        .await
        .unwrap();
    let report = manager
        .apply_annotation_update("shop", seed::first_annotation())
        .await
        .unwrap();
    assert!(!report.is_breaking(), "{}", report);

    for day in [0, 10, 20, 30] {
        assert!(!manager.is_broken_at("shop", at_day(day)).await.unwrap());
    }

    manager
        .retime_application_snapshot("shop", at_day(30), at_day(5))
        .await
        .unwrap();

    assert_eq!(
        manager.store().list_timestamps("shop").await.unwrap(),
        vec![at_day(20), at_day(10), at_day(5), at_day(0)]
    );
    assert!(!manager.is_broken_at("shop", at_day(0)).await.unwrap());
    assert!(!manager.is_broken_at("shop", at_day(5)).await.unwrap());
    assert!(manager.is_broken_at("shop", at_day(10)).await.unwrap());
    assert!(manager.is_broken_at("shop", at_day(20)).await.unwrap());
    assert!(manager.is_broken("shop").await.unwrap());

    assert_eq!(
        manager.annotation_at("shop", at_day(5)).await.unwrap(),
        Some(seed::first_annotation())
    );
    assert!(manager.annotation_at("shop", at_day(0)).await.unwrap().is_none());
    assert!(manager.latest_annotation("shop").await.unwrap().is_none());
}

#[tokio::test]
async fn test_retime_flags_every_later_snapshot_in_memory() {
    retime_flags_every_later_snapshot(MemoryStore::new()).await;
}

#[tokio::test]
async fn test_retime_flags_every_later_snapshot_on_disk() {
    let dir = tempfile::tempdir().unwrap();
    retime_flags_every_later_snapshot(FileStore::new(dir.path()).await.unwrap()).await;
}

#[tokio::test]
async fn test_removed_parameter_is_found_on_its_own_endpoint() {
    let manager = AnnotationStorageManager::new(MemoryStore::new());
    let model = Application::new("shop", at_day(0))
        .with_endpoint(Endpoint::new("login").with_parameter(Parameter::new("user", ParameterKind::Form)))
        .with_endpoint(Endpoint::new("logout").with_parameter(Parameter::new("user", ParameterKind::ReqParam)));
    manager
        .apply_application_update("shop", model.clone(), &none())
        .await
        .unwrap();

    let mut annotation = seed::first_annotation();
    annotation.endpoint_annotations = vec![EndpointAnnotation::new("logout").with_parameter("user", "USERS")];
    let report = manager.apply_annotation_update("shop", annotation).await.unwrap();
    assert!(!report.is_breaking(), "{}", report);

    // `user` survives on login only
    let mut next = model;
    next.timestamp = at_day(10);
    next.endpoints[1].parameters.clear();
    let report = manager
        .apply_application_update("shop", next, &none())
        .await
        .unwrap();

    assert!(report.is_breaking(), "{}", report);
    assert!(report
        .breaking_violations()
        .any(|(holder, v)| holder.id == "logout/user" && v.violation_type == ViolationType::IllegalParameterReference));
    assert!(manager.is_broken("shop").await.unwrap());
}

#[tokio::test]
async fn test_annotation_update_without_model_is_a_precondition_error() {
    let manager = AnnotationStorageManager::new(MemoryStore::new());
    let result = manager.apply_annotation_update("shop", seed::first_annotation()).await;

    assert!(matches!(result, Err(ManagerError::NoApplicationModel(tag)) if tag == "shop"));
    assert!(manager.latest_application("shop").await.unwrap().is_none());
}
