use std::sync::Arc;

use sds_client::metax::MetaxClient;
use sds_client::rems::RemsClient;
use sds_client::ror::RorClient;
use sds_core::config::{MetaxConfig, RemsConfig, RorConfig};
use sds_core::AppError;
use serde_json::json;
use wiremock::matchers::{body_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn ror_client(server: &MockServer) -> RorClient {
    RorClient::new(&RorConfig {
        url: server.uri(),
    })
    .unwrap()
}

fn metax_client(server: &MockServer) -> MetaxClient {
    MetaxClient::new(&MetaxConfig {
        url: server.uri(),
        token: "token".into(),
    })
    .unwrap()
}

fn rems_client(server: &MockServer) -> RemsClient {
    RemsClient::new(&RemsConfig {
        url: server.uri(),
        user: "owner".into(),
        key: "key".into(),
        discovery_url: "https://etsin.example/dataset".into(),
    })
    .unwrap()
}

fn ror_item(display: &str) -> serde_json::Value {
    json!({
        "id": "https://ror.org/01abcde",
        "names": [
            {"types": ["ror_display"], "value": display},
            {"types": ["alias"], "value": "Alias"},
        ],
    })
}

#[tokio::test]
async fn ror_single_match_returns_display_name() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/organizations"))
        .and(query_param("query", "\"Academy of Medicine\""))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"items": [ror_item("Academy of Medicine")]})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let ror = ror_client(&server);
    let name = ror.is_ror_organisation("Academy of Medicine").await.unwrap();
    assert_eq!(name.as_deref(), Some("Academy of Medicine"));

    // Second lookup is served from the one-week cache.
    let name = ror.is_ror_organisation("Academy of Medicine").await.unwrap();
    assert_eq!(name.as_deref(), Some("Academy of Medicine"));
    server.verify().await;
}

#[tokio::test]
async fn ror_multiple_matches_need_an_exact_normalised_hit() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/organizations"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [ror_item("Aalto University"), ror_item("Aalto-University")],
        })))
        .mount(&server)
        .await;

    let ror = ror_client(&server);
    // Both display names normalise to the same key: ambiguous, no match.
    assert_eq!(ror.is_ror_organisation("Aalto University").await.unwrap(), None);
}

#[tokio::test]
async fn ror_no_match_is_none() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/organizations"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"items": []})))
        .mount(&server)
        .await;

    let ror = ror_client(&server);
    assert_eq!(ror.is_ror_organisation("Atlantis Institute").await.unwrap(), None);
}

fn fields_of_science_body() -> serde_json::Value {
    json!({
        "results": [
            {
                "code": "ta111",
                "pref_label": {"en": "Mathematics", "fi": "Matematiikka"},
                "url": "http://www.yso.fi/onto/okm-tieteenala/ta111",
            },
            {
                "code": "ta113",
                "pref_label": {"en": "Computer and information sciences"},
                "url": "http://www.yso.fi/onto/okm-tieteenala/ta113",
            },
        ],
    })
}

#[tokio::test]
async fn field_of_science_lookup_matches_code_digits_and_label() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/reference-data/fields-of-science"))
        .respond_with(ResponseTemplate::new(200).set_body_json(fields_of_science_body()))
        .expect(1)
        .mount(&server)
        .await;

    let metax = metax_client(&server);

    let by_code = metax.get_field_of_science("ta111").await.unwrap().unwrap();
    assert_eq!(by_code.code, "ta111");

    let by_digits = metax.get_field_of_science("111").await.unwrap().unwrap();
    assert_eq!(by_digits.code, "ta111");

    let by_label = metax
        .get_field_of_science("computer AND information sciences")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(by_label.code, "ta113");

    assert!(metax.get_field_of_science("basket weaving").await.unwrap().is_none());

    // All four lookups hit the week-long cache, not the endpoint.
    server.verify().await;
}

#[tokio::test]
async fn metax_draft_and_publish_round() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/datasets"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"id": "metax-123"})))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/datasets/metax-123/publish"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"id": "metax-123", "state": "published"})),
        )
        .mount(&server)
        .await;

    let metax = metax_client(&server);
    let metax_id = metax
        .create_draft_dataset("10.80869/sd-1", "Title", "Description")
        .await
        .unwrap();
    assert_eq!(metax_id, "metax-123");

    let record = metax.publish_dataset(&metax_id, "10.80869/sd-1").await.unwrap();
    assert_eq!(record["state"], "published");
}

fn rems_workflow_body(organization: &str) -> serde_json::Value {
    json!({
        "id": 1,
        "title": "default workflow",
        "organization": {
            "organization/id": organization,
            "organization/name": {"en": "CSC"},
            "organization/short-name": {"en": "CSC"},
        },
        "workflow": {"type": "workflow/default", "licenses": []},
        "archived": false,
        "enabled": true,
    })
}

#[tokio::test]
async fn rems_create_resource_validates_the_workflow_first() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/workflows/1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(rems_workflow_body("csc")))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/resources/create"))
        .and(body_json(json!({
            "resid": "10.80869/sd-1",
            "organization": {"organization/id": "csc"},
            "licenses": [1],
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": 7, "success": true})))
        .mount(&server)
        .await;

    let rems = rems_client(&server);
    let resource_id = rems
        .create_resource(Some("csc"), 1, &[1], "10.80869/sd-1")
        .await
        .unwrap();
    assert_eq!(resource_id, 7);
}

#[tokio::test]
async fn rems_cross_organisation_reference_is_a_user_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/workflows/1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(rems_workflow_body("other")))
        .mount(&server)
        .await;

    let rems = rems_client(&server);
    let err = rems
        .create_resource(Some("csc"), 1, &[], "10.80869/sd-1")
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::User(_)), "got {err}");
}

#[tokio::test]
async fn rems_unknown_workflow_is_a_user_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/workflows/42"))
        .respond_with(ResponseTemplate::new(404).set_body_string("not found"))
        .mount(&server)
        .await;

    let rems = rems_client(&server);
    let err = rems.get_workflow(None, 42).await.unwrap_err();
    match err {
        AppError::User(message) => assert!(message.contains("Unknown REMS workflow '42'")),
        other => panic!("expected User error, got {other}"),
    }
}

#[tokio::test]
async fn rems_urls_are_derived_from_configuration() {
    let server = MockServer::start().await;
    let rems = rems_client(&server);
    assert_eq!(
        rems.get_discovery_url("metax-123"),
        "https://etsin.example/dataset/metax-123"
    );
    let application_url = rems.get_application_url(9);
    assert!(application_url.ends_with("/application?items=9"));
}

#[tokio::test]
async fn concurrent_ror_misses_fetch_upstream_once() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/organizations"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"items": [ror_item("CSC - IT Center for Science")]}))
                .set_delay(std::time::Duration::from_millis(50)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let ror = Arc::new(ror_client(&server));
    let lookups: Vec<_> = (0..4)
        .map(|_| {
            let ror = ror.clone();
            tokio::spawn(async move {
                ror.is_ror_organisation("CSC - IT Center for Science").await
            })
        })
        .collect();
    for lookup in lookups {
        let name = lookup.await.unwrap().unwrap();
        assert_eq!(name.as_deref(), Some("CSC - IT Center for Science"));
    }
    server.verify().await;
}
