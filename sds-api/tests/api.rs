//! API surface scenarios: keys, pagination, health, CRUD contracts.

mod common;

use axum::body::Body;
use axum::http::{header, StatusCode};
use common::{body_json, body_text, spawn, Upstreams, PROJECT_ID};
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn submission_body(name: &str) -> serde_json::Value {
    json!({
        "name": name,
        "projectId": PROJECT_ID,
        "workflow": "SD",
        "title": "T",
        "description": "D",
    })
}

#[tokio::test]
async fn api_key_lifecycle_end_to_end() {
    let app = spawn(Upstreams::default()).await;

    // Issue a key; the body is the plain-text secret wrapped in newlines.
    let resp = app.send_json("POST", "/v1/api/keys", json!({"keyId": "k1"})).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_text(resp).await;
    assert!(body.starts_with('\n') && body.ends_with("\n\n"), "got {body:?}");
    let api_key = body.trim().to_string();
    let (generated_id, secret) = api_key.split_once('.').unwrap();
    assert_eq!(generated_id.len(), 12);
    assert!(generated_id.chars().all(|c| c.is_ascii_hexdigit()));
    assert_eq!(secret.len(), 32);
    assert!(secret.chars().all(|c| c.is_ascii_alphanumeric()));

    // Reusing the key id fails.
    let resp = app.send_json("POST", "/v1/api/keys", json!({"keyId": "k1"})).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    // The key authenticates requests.
    let resp = app
        .send(
            axum::http::Request::get("/v1/users")
                .header(header::AUTHORIZATION, format!("Bearer {api_key}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(resp.status(), StatusCode::OK);
    let user = body_json(resp).await;
    assert_eq!(user["userId"], common::USER_ID);

    // It is listed, revocable and dead afterwards.
    let resp = app
        .send(app.request("GET", "/v1/api/keys").body(Body::empty()).unwrap())
        .await;
    let keys = body_json(resp).await;
    assert_eq!(keys[0]["keyId"], "k1");

    let resp = app.send_json("DELETE", "/v1/api/keys", json!({"keyId": "k1"})).await;
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);

    let resp = app
        .send(
            axum::http::Request::get("/v1/users")
                .header(header::AUTHORIZATION, format!("Bearer {api_key}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn pagination_contract_with_link_header() {
    let app = spawn(Upstreams::default()).await;
    for i in 0..35 {
        app.create_submission(submission_body(&format!("sub-{i:02}"))).await;
    }

    let resp = app
        .send(
            app.request(
                "GET",
                &format!("/v1/submissions?projectId={PROJECT_ID}&page=2&per_page=10"),
            )
            .body(Body::empty())
            .unwrap(),
        )
        .await;
    assert_eq!(resp.status(), StatusCode::OK);
    let link = resp
        .headers()
        .get(header::LINK)
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    let body = body_json(resp).await;

    assert_eq!(body["total"], 35);
    assert_eq!(body["total_pages"], 4);
    assert_eq!(body["submissions"].as_array().unwrap().len(), 10);

    for expected in [
        format!("</v1/submissions?projectId={PROJECT_ID}&page=1&per_page=10>; rel=\"first\""),
        format!("</v1/submissions?projectId={PROJECT_ID}&page=1&per_page=10>; rel=\"prev\""),
        format!("</v1/submissions?projectId={PROJECT_ID}&page=3&per_page=10>; rel=\"next\""),
        format!("</v1/submissions?projectId={PROJECT_ID}&page=4&per_page=10>; rel=\"last\""),
    ] {
        assert!(link.contains(&expected), "missing {expected} in {link}");
    }

    // First page has no prev, last page has no next.
    let resp = app
        .send(
            app.request(
                "GET",
                &format!("/v1/submissions?projectId={PROJECT_ID}&page=1&per_page=10"),
            )
            .body(Body::empty())
            .unwrap(),
        )
        .await;
    let link = resp.headers().get(header::LINK).unwrap().to_str().unwrap().to_string();
    assert!(!link.contains("rel=\"prev\""));

    let resp = app
        .send(
            app.request(
                "GET",
                &format!("/v1/submissions?projectId={PROJECT_ID}&page=4&per_page=10"),
            )
            .body(Body::empty())
            .unwrap(),
        )
        .await;
    let link = resp.headers().get(header::LINK).unwrap().to_str().unwrap().to_string();
    assert!(!link.contains("rel=\"next\""));
    let body = body_json(resp).await;
    assert_eq!(body["submissions"].as_array().unwrap().len(), 5);
}

#[tokio::test]
async fn duplicate_submission_name_is_rejected() {
    let app = spawn(Upstreams::default()).await;
    app.create_submission(submission_body("twin")).await;
    let resp = app
        .send_json("POST", "/v1/submissions", submission_body("twin"))
        .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body = body_json(resp).await;
    assert!(body["detail"].as_str().unwrap().contains("already exists"));
}

#[tokio::test]
async fn unknown_submission_is_404_and_missing_auth_is_401() {
    let app = spawn(Upstreams::default()).await;

    let resp = app
        .send(
            app.request("GET", "/v1/submissions/nope")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    let problem = body_json(resp).await;
    assert_eq!(problem["status"], 404);
    assert_eq!(problem["title"], "Not Found");

    let resp = app
        .send(
            axum::http::Request::get("/v1/submissions/nope")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn published_submissions_are_read_only() {
    let app = spawn(Upstreams::default()).await;
    let submission_id = app.create_submission(submission_body("frozen")).await;
    sqlx::query("UPDATE submissions SET published = 1 WHERE submission_id = ?")
        .bind(&submission_id)
        .execute(&app.pool)
        .await
        .unwrap();

    let resp = app
        .send_json(
            "PATCH",
            &format!("/v1/submissions/{submission_id}"),
            json!({"title": "New"}),
        )
        .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let resp = app
        .send(
            app.request("DELETE", &format!("/v1/submissions/{submission_id}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn submission_delete_cascades() {
    let app = spawn(Upstreams::default()).await;
    let submission_id = app.create_submission(submission_body("gone")).await;
    let resp = app
        .send_json(
            "POST",
            &format!("/v1/objects/study?submissionId={submission_id}"),
            json!({"title": "S"}),
        )
        .await;
    assert_eq!(resp.status(), StatusCode::CREATED);

    let resp = app
        .send(
            app.request("DELETE", &format!("/v1/submissions/{submission_id}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);

    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM objects")
        .fetch_one(&app.pool)
        .await
        .unwrap();
    assert_eq!(count, 0);
}

#[tokio::test]
async fn strict_metadata_validation_rejects_unknown_fields() {
    let app = spawn(Upstreams::default()).await;
    let mut body = submission_body("strict");
    body["metadata"] = json!({
        "creators": [{"name": "A"}],
        "publisher": {"name": "CSC"},
        "mystery": 1,
    });
    let resp = app.send_json("POST", "/v1/submissions", body).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let problem = body_json(resp).await;
    assert!(problem["detail"].as_str().unwrap().contains("Invalid DataCite metadata"));
}

#[tokio::test]
async fn xml_validation_endpoint_reports_errors() {
    let app = spawn(Upstreams::default()).await;

    let resp = app
        .send(
            app.request("POST", "/v1/validate?schema=study")
                .header(header::CONTENT_TYPE, "text/xml")
                .body(Body::from("<STUDY_SET><STUDY alias=\"a\"/></STUDY_SET>"))
                .unwrap(),
        )
        .await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_json(resp).await["isValid"], true);

    let resp = app
        .send(
            app.request("POST", "/v1/validate?schema=study")
                .header(header::CONTENT_TYPE, "text/xml")
                .body(Body::from("<STUDY_SET><broken></STUDY_SET>"))
                .unwrap(),
        )
        .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body = body_json(resp).await;
    assert_eq!(body["isValid"], false);
    let error = &body["errors"][0];
    assert!(error["reason"].as_str().is_some());
    assert!(error["position"].as_str().is_some());
    assert_eq!(error["pointer"], "/study");
}

#[tokio::test]
async fn health_aggregates_enabled_integrations() {
    // Healthy ROR, unreachable PID: Down dominates.
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/heartbeat"))
        .respond_with(ResponseTemplate::new(200).set_body_string("OK"))
        .mount(&server)
        .await;

    let app = spawn(Upstreams {
        ror: Some(server.uri()),
        pid: Some("http://127.0.0.1:1".into()),
        ..Default::default()
    })
    .await;

    let resp = app
        .send(axum::http::Request::get("/health").body(Body::empty()).unwrap())
        .await;
    assert_eq!(resp.status(), StatusCode::OK);
    let health = body_json(resp).await;
    assert_eq!(health["services"]["database"], "Up");
    assert_eq!(health["services"]["ror"], "Up");
    assert_eq!(health["services"]["pid"], "Down");
    assert_eq!(health["status"], "Down");
}

#[tokio::test]
async fn rems_read_api_groups_by_organisation() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/workflows"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
            "id": 1,
            "title": "default workflow",
            "organization": {
                "organization/id": "csc",
                "organization/name": {"en": "CSC"},
                "organization/short-name": {"en": "CSC"},
            },
            "workflow": {"type": "workflow/default", "licenses": []},
            "archived": false,
            "enabled": true,
        }])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/licenses"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
            "license/id": 2,
            "licensetype": "link",
            "localizations": {"en": {"title": "CC BY 4.0", "textcontent": "https://creativecommons.org/licenses/by/4.0/"}},
            "organization": {
                "organization/id": "csc",
                "organization/name": {"en": "CSC"},
                "organization/short-name": {"en": "CSC"},
            },
            "archived": false,
            "enabled": true,
        }])))
        .mount(&server)
        .await;

    let app = spawn(Upstreams {
        rems: Some(server.uri()),
        ..Default::default()
    })
    .await;

    let resp = app
        .send(
            app.request("GET", "/v1/rems?language=en")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(resp.status(), StatusCode::OK);
    let organisations = body_json(resp).await;
    assert_eq!(organisations[0]["id"], "csc");
    assert_eq!(organisations[0]["name"], "CSC");
    assert_eq!(organisations[0]["workflows"][0]["id"], 1);
    assert_eq!(organisations[0]["licenses"][0]["title"], "CC BY 4.0");
}
