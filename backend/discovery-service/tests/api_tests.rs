use actix_web::{test, web, App};
use discovery_service::{configure_routes, RegistryState};
use murmur_common::ManualClock;
use serde_json::{json, Value};
use service_registry::InMemoryRegistry;
use std::sync::Arc;
use std::time::Duration;

fn state(clock: &ManualClock) -> web::Data<RegistryState> {
    let registry = Arc::new(InMemoryRegistry::with_clock(
        Duration::from_secs(60),
        clock.shared(),
    ));
    web::Data::new(RegistryState { registry })
}

fn registration(service: &str, id: &str, port: u32) -> Value {
    json!({
        "serviceName": service,
        "host": "10.0.0.1",
        "port": port,
        "instanceId": id
    })
}

#[actix_web::test]
async fn test_register_heartbeat_resolve_deregister() {
    let clock = ManualClock::starting_now();
    let app = test::init_service(
        App::new()
            .app_data(state(&clock))
            .configure(configure_routes),
    )
    .await;

    let req = test::TestRequest::post()
        .uri("/register")
        .set_json(registration("content-service", "content-1", 8081))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["instanceId"], "content-1");

    let req = test::TestRequest::post()
        .uri("/heartbeat/content-1")
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 200);

    let req = test::TestRequest::get()
        .uri("/services/content-service")
        .to_request();
    let instances: Vec<Value> = test::call_and_read_body_json(&app, req).await;
    assert_eq!(instances.len(), 1);
    assert_eq!(instances[0]["instanceId"], "content-1");
    assert_eq!(instances[0]["status"], "UP");

    let req = test::TestRequest::delete()
        .uri("/instance/content-1")
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 204);

    let req = test::TestRequest::get()
        .uri("/services/content-service")
        .to_request();
    let instances: Vec<Value> = test::call_and_read_body_json(&app, req).await;
    assert!(instances.is_empty());
}

#[actix_web::test]
async fn test_heartbeat_after_lease_expiry_is_404() {
    let clock = ManualClock::starting_now();
    let app = test::init_service(
        App::new()
            .app_data(state(&clock))
            .configure(configure_routes),
    )
    .await;

    let req = test::TestRequest::post()
        .uri("/register")
        .set_json(registration("identity-service", "identity-1", 8082))
        .to_request();
    assert!(test::call_service(&app, req).await.status().is_success());

    clock.advance(Duration::from_secs(600));

    let req = test::TestRequest::get()
        .uri("/services/identity-service")
        .to_request();
    let instances: Vec<Value> = test::call_and_read_body_json(&app, req).await;
    assert!(instances.is_empty());

    let req = test::TestRequest::post()
        .uri("/heartbeat/identity-1")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 404);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error_type"], "not_found");
}

#[actix_web::test]
async fn test_invalid_registration_is_400() {
    let clock = ManualClock::starting_now();
    let app = test::init_service(
        App::new()
            .app_data(state(&clock))
            .configure(configure_routes),
    )
    .await;

    let mut bad_host = registration("content-service", "c-1", 8081);
    bad_host["host"] = json!("not a host");
    let req = test::TestRequest::post()
        .uri("/register")
        .set_json(bad_host)
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 400);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error_type"], "validation");

    let req = test::TestRequest::post()
        .uri("/register")
        .set_json(registration("content-service", "c-1", 0))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 400);

    let req = test::TestRequest::post()
        .uri("/register")
        .insert_header(("content-type", "application/json"))
        .set_payload("{not json")
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 400);
}

#[actix_web::test]
async fn test_status_override_and_catalogue() {
    let clock = ManualClock::starting_now();
    let app = test::init_service(
        App::new()
            .app_data(state(&clock))
            .configure(configure_routes),
    )
    .await;

    for (service, id) in [("content-service", "c-1"), ("content-service", "c-2"), ("identity-service", "i-1")] {
        let req = test::TestRequest::post()
            .uri("/register")
            .set_json(registration(service, id, 9000))
            .to_request();
        assert!(test::call_service(&app, req).await.status().is_success());
    }

    let req = test::TestRequest::put()
        .uri("/instance/c-1/status")
        .set_json(json!({ "status": "DOWN" }))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 204);

    let req = test::TestRequest::get()
        .uri("/services/content-service")
        .to_request();
    let instances: Vec<Value> = test::call_and_read_body_json(&app, req).await;
    assert_eq!(instances.len(), 1);
    assert_eq!(instances[0]["instanceId"], "c-2");

    let req = test::TestRequest::get().uri("/services").to_request();
    let catalogue: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(catalogue["content-service"].as_array().unwrap().len(), 2);
    assert_eq!(catalogue["identity-service"].as_array().unwrap().len(), 1);

    let req = test::TestRequest::put()
        .uri("/instance/ghost/status")
        .set_json(json!({ "status": "UP" }))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 404);
}
