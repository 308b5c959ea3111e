//! Publication scenarios across the SD and BP workflows.

mod common;

use axum::body::Body;
use axum::http::StatusCode;
use common::{body_json, spawn, Upstreams, PROJECT_ID};
use sds_client::file::BucketFile;
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const DOI: &str = "10.80869/sd-X";
const METAX_ID: &str = "M";

fn sd_metadata() -> serde_json::Value {
    json!({
        "creators": [{
            "name": "A",
            "affiliation": [{"name": "Academy of Medicine"}],
        }],
        "publisher": {"name": "Attogen Biomedical Research"},
        "subjects": [{"subject": "111 - Mathematics", "valueUri": "http://www.yso.fi/onto/okm-tieteenala/ta111"}],
    })
}

fn sd_submission(metadata: serde_json::Value) -> serde_json::Value {
    json!({
        "name": "sd-submission",
        "projectId": PROJECT_ID,
        "workflow": "SD",
        "title": "T",
        "description": "D",
        "bucket": "b",
        "metadata": metadata,
        "rems": {"organizationId": "1", "workflowId": 1, "licenses": [1]},
    })
}

async fn mount_pid(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/v1/pid/doi"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!(DOI)))
        .mount(server)
        .await;
    Mock::given(method("PUT"))
        .and(path(format!("/v1/pid/doi/{DOI}")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
        .mount(server)
        .await;
}

async fn mount_metax(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/datasets"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"id": METAX_ID})))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("/datasets/{METAX_ID}")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": METAX_ID,
            "state": "draft",
            "title": {"en": "T"},
            "description": {"en": "D"},
            "persistent_identifier": DOI,
        })))
        .mount(server)
        .await;
    Mock::given(method("PATCH"))
        .and(path(format!("/datasets/{METAX_ID}")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": METAX_ID})))
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path(format!("/datasets/{METAX_ID}/publish")))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"id": METAX_ID, "state": "published"})),
        )
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/reference-data/fields-of-science"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "results": [{
                "code": "ta111",
                "pref_label": {"en": "Mathematics"},
                "url": "http://www.yso.fi/onto/okm-tieteenala/ta111",
            }],
        })))
        .mount(server)
        .await;
}

async fn mount_ror(server: &MockServer) {
    // Every queried organisation resolves to itself.
    Mock::given(method("GET"))
        .and(path("/organizations"))
        .respond_with(move |req: &wiremock::Request| {
            let query = req.url.query_pairs().find(|(k, _)| k == "query");
            let name = query
                .map(|(_, v)| v.trim_matches('"').to_string())
                .unwrap_or_default();
            ResponseTemplate::new(200).set_body_json(json!({
                "items": [{
                    "id": "https://ror.org/01abcde",
                    "names": [{"types": ["ror_display"], "value": name}],
                }],
            }))
        })
        .mount(server)
        .await;
}

async fn mount_rems(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/api/workflows/1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": 1,
            "title": "default workflow",
            "organization": {
                "organization/id": "1",
                "organization/name": {"en": "CSC"},
                "organization/short-name": {"en": "CSC"},
            },
            "workflow": {"type": "workflow/default", "licenses": []},
            "archived": false,
            "enabled": true,
        })))
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/resources/create"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": 1, "success": true})))
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/catalogue-items/create"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": 1, "success": true})))
        .mount(server)
        .await;
}

async fn sd_app(server: &MockServer) -> common::TestApp {
    spawn(Upstreams {
        pid: Some(server.uri()),
        metax: Some(server.uri()),
        rems: Some(server.uri()),
        ror: Some(server.uri()),
        datacite: None,
        files: vec![BucketFile {
            path: "p".into(),
            bytes: 1,
        }],
    })
    .await
}

#[tokio::test]
async fn sd_happy_path_registers_and_publishes() {
    let server = MockServer::start().await;
    mount_pid(&server).await;
    mount_metax(&server).await;
    mount_ror(&server).await;
    mount_rems(&server).await;

    let app = sd_app(&server).await;
    let submission_id = app.create_submission(sd_submission(sd_metadata())).await;

    let resp = app
        .send(
            app.request("PATCH", &format!("/v1/publish/{submission_id}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_json(resp).await;
    assert_eq!(body["submissionId"], submission_id.as_str());

    // The submission flipped to published.
    let resp = app
        .send(
            app.request("GET", &format!("/v1/submissions/{submission_id}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    let submission = body_json(resp).await;
    assert_eq!(submission["published"], true);

    // One registration with every identifier recorded.
    let resp = app
        .send(
            app.request("GET", &format!("/v1/submissions/{submission_id}/registrations"))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    let registrations = body_json(resp).await;
    assert_eq!(registrations.as_array().unwrap().len(), 1);
    let registration = &registrations[0];
    assert_eq!(registration["doi"], DOI);
    assert_eq!(registration["metaxId"], METAX_ID);
    assert_eq!(registration["remsResourceId"], "1");
    assert_eq!(registration["remsCatalogueId"], "1");

    // The Metax description was extended with the application link.
    let requests = server.received_requests().await.unwrap();
    let description_patch = requests
        .iter()
        .filter(|r| r.method.as_str() == "PATCH" && r.url.path() == format!("/datasets/{METAX_ID}"))
        .filter_map(|r| serde_json::from_slice::<serde_json::Value>(&r.body).ok())
        .find(|body| body.get("description").is_some() && body.get("actors").is_none())
        .expect("description update not sent");
    assert_eq!(
        description_patch["description"]["en"],
        format!(
            "D\n\nSD Apply Application link: {}/application?items=1",
            server.uri()
        )
    );

    // The DOI stayed a draft: no publish event in the PID body.
    let pid_update = requests
        .iter()
        .find(|r| r.method.as_str() == "PUT" && r.url.path().starts_with("/v1/pid/doi/"))
        .expect("PID update not sent");
    let pid_body: serde_json::Value = serde_json::from_slice(&pid_update.body).unwrap();
    assert!(pid_body["data"]["attributes"].get("event").is_none());
    assert_eq!(
        pid_body["data"]["attributes"]["url"],
        format!("https://etsin.example/dataset/{METAX_ID}")
    );
    // Accession number, title and description were injected.
    assert_eq!(
        pid_body["data"]["attributes"]["alternateIdentifiers"][0]["alternateIdentifier"],
        submission_id.as_str()
    );
    assert_eq!(pid_body["data"]["attributes"]["titles"][0]["title"], "T");
    // The subject was enriched with the field-of-science classification.
    assert_eq!(
        pid_body["data"]["attributes"]["subjects"][0]["classificationCode"],
        "ta111"
    );
}

#[tokio::test]
async fn sd_missing_subjects_is_a_user_error() {
    let server = MockServer::start().await;
    mount_pid(&server).await;
    mount_metax(&server).await;
    mount_ror(&server).await;
    mount_rems(&server).await;

    let app = sd_app(&server).await;
    let mut metadata = sd_metadata();
    metadata["subjects"] = json!([]);
    let submission_id = app.create_submission(sd_submission(metadata)).await;

    let resp = app
        .send(
            app.request("PATCH", &format!("/v1/publish/{submission_id}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body = body_json(resp).await;
    assert!(
        body["detail"].as_str().unwrap().contains("Missing DataCite subjects"),
        "got {body}"
    );

    // The draft DOI was minted but nothing was published or registered.
    let requests = server.received_requests().await.unwrap();
    assert!(requests
        .iter()
        .any(|r| r.method.as_str() == "POST" && r.url.path() == "/v1/pid/doi"));
    assert!(!requests
        .iter()
        .any(|r| r.method.as_str() == "PUT" && r.url.path().starts_with("/v1/pid/doi/")));

    let resp = app
        .send(
            app.request("GET", &format!("/v1/submissions/{submission_id}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(body_json(resp).await["published"], false);
}

#[tokio::test]
async fn bp_datacite_outage_aborts_after_retries() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/dois"))
        .respond_with(ResponseTemplate::new(500).set_body_string("internal error"))
        .expect(5)
        .mount(&server)
        .await;

    let app = spawn(Upstreams {
        datacite: Some(server.uri()),
        files: vec![BucketFile {
            path: "p".into(),
            bytes: 1,
        }],
        ..Default::default()
    })
    .await;

    let submission_id = app
        .create_submission(json!({
            "name": "bp-submission",
            "projectId": PROJECT_ID,
            "workflow": "BP",
            "title": "T",
            "description": "D",
            "bucket": "b",
            "metadata": {
                "creators": [{"name": "A", "affiliation": [{"name": "Org"}]}],
                "publisher": {"name": "Org"},
            },
        }))
        .await;
    let resp = app
        .send_json(
            "POST",
            &format!("/v1/objects/dataset?submissionId={submission_id}"),
            json!({"title": "DS", "description": "dataset"}),
        )
        .await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let object_id = body_json(resp).await["objectId"].as_str().unwrap().to_string();
    let resp = app
        .send_json(
            "POST",
            &format!("/v1/submissions/{submission_id}/files"),
            json!([{"path": "p", "objectId": object_id}]),
        )
        .await;
    assert_eq!(resp.status(), StatusCode::CREATED);

    let resp = app
        .send(
            app.request("PATCH", &format!("/v1/publish/{submission_id}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
    server.verify().await;

    // No registration was written and the submission stayed a draft.
    let resp = app
        .send(
            app.request("GET", &format!("/v1/submissions/{submission_id}/registrations"))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(body_json(resp).await.as_array().unwrap().len(), 0);
    let resp = app
        .send(
            app.request("GET", &format!("/v1/submissions/{submission_id}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(body_json(resp).await["published"], false);
}

#[tokio::test]
async fn concurrent_publishes_race_to_a_single_winner() {
    let server = MockServer::start().await;
    mount_pid(&server).await;
    mount_metax(&server).await;
    mount_ror(&server).await;
    mount_rems(&server).await;

    let app = sd_app(&server).await;
    let submission_id = app.create_submission(sd_submission(sd_metadata())).await;

    let first = app.send(
        app.request("PATCH", &format!("/v1/publish/{submission_id}"))
            .body(Body::empty())
            .unwrap(),
    );
    let second = app.send(
        app.request("PATCH", &format!("/v1/publish/{submission_id}"))
            .body(Body::empty())
            .unwrap(),
    );
    let (first, second) = tokio::join!(first, second);

    let statuses = [first.status(), second.status()];
    assert!(
        statuses.contains(&StatusCode::OK),
        "one publish must win: {statuses:?}"
    );
    assert!(
        statuses.contains(&StatusCode::BAD_REQUEST),
        "one publish must observe the published state: {statuses:?}"
    );

    let loser = if first.status() == StatusCode::OK { second } else { first };
    let body = body_json(loser).await;
    assert!(
        body["detail"].as_str().unwrap().contains("already published"),
        "got {body}"
    );

    // Exactly one set of registrations exists.
    let resp = app
        .send(
            app.request("GET", &format!("/v1/submissions/{submission_id}/registrations"))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(body_json(resp).await.as_array().unwrap().len(), 1);
}
