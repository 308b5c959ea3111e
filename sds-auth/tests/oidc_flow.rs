//! Authorization-code flow against a mocked provider, including the DPoP
//! nonce capture and the Bearer→DPoP upgrade on userinfo.

use sds_auth::oidc::OidcClient;
use sds_auth::AuthService;
use sds_core::config::{OidcConfig, ServerConfig};
use serde_json::json;
use url::Url;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn config(server: &MockServer) -> (OidcConfig, ServerConfig) {
    (
        OidcConfig {
            oidc_url: server.uri(),
            client_id: "sd-submit".into(),
            client_secret: "secret".into(),
            scope: "openid profile email".into(),
            secure_cookie: true,
            jwt_secret: "jwt-secret".into(),
        },
        ServerConfig {
            base_url: "https://submit.example".into(),
            redirect_url: "https://submit.example".into(),
            database_url: "sqlite::memory:".into(),
        },
    )
}

async fn mount_discovery(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/.well-known/openid-configuration"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "issuer": server.uri(),
            "authorization_endpoint": format!("{}/authorize", server.uri()),
            "token_endpoint": format!("{}/token", server.uri()),
            "userinfo_endpoint": format!("{}/userinfo", server.uri()),
        })))
        .mount(server)
        .await;
}

#[tokio::test]
async fn login_url_carries_state_nonce_and_pkce() {
    let server = MockServer::start().await;
    mount_discovery(&server).await;

    let (oidc_config, server_config) = config(&server);
    let oidc = OidcClient::new(oidc_config, &server_config).unwrap();

    let url = Url::parse(&oidc.login_url().await.unwrap()).unwrap();
    assert_eq!(url.path(), "/authorize");
    let params: std::collections::HashMap<_, _> = url.query_pairs().collect();
    assert_eq!(params["response_type"], "code");
    assert_eq!(params["client_id"], "sd-submit");
    assert_eq!(params["redirect_uri"], "https://submit.example/callback");
    assert_eq!(params["code_challenge_method"], "S256");
    assert_eq!(params["state"].len(), 32);
    assert!(!params["code_challenge"].is_empty());
    assert!(!params["nonce"].is_empty());
}

#[tokio::test]
async fn callback_exchanges_code_and_upgrades_userinfo_to_dpop() {
    let server = MockServer::start().await;
    mount_discovery(&server).await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("DPoP-Nonce", "server-nonce-1")
                .set_body_json(json!({
                    "access_token": "at-123",
                    "token_type": "DPoP",
                    "expires_in": 600,
                })),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/userinfo"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "sub": "oidc-sub",
            "CSCUserName": "cscuser",
            "given_name": "Ada",
            "family_name": "Lovelace",
        })))
        .mount(&server)
        .await;

    let (oidc_config, server_config) = config(&server);
    let oidc = OidcClient::new(oidc_config, &server_config).unwrap();
    let auth = AuthService::new("jwt-secret");

    let login_url = Url::parse(&oidc.login_url().await.unwrap()).unwrap();
    let state = login_url
        .query_pairs()
        .find(|(k, _)| k == "state")
        .map(|(_, v)| v.into_owned())
        .unwrap();

    let (jwt, userinfo) = oidc.callback(&auth, &state, "auth-code").await.unwrap();
    assert_eq!(userinfo["CSCUserName"], "cscuser");
    let (user_id, user_name) = auth.validate_jwt_token(&jwt).unwrap();
    assert_eq!(user_id, "cscuser");
    assert_eq!(user_name, "Ada Lovelace");

    let requests = server.received_requests().await.unwrap();

    // The token request carried a DPoP proof and the code verifier.
    let token_request = requests
        .iter()
        .find(|r| r.url.path() == "/token")
        .expect("token request missing");
    assert!(token_request.headers.contains_key("dpop"));
    let form = String::from_utf8_lossy(&token_request.body).to_string();
    assert!(form.contains("grant_type=authorization_code"));
    assert!(form.contains("code=auth-code"));
    assert!(form.contains("code_verifier="));

    // Userinfo used the DPoP scheme with a proof bound to the server nonce.
    let userinfo_request = requests
        .iter()
        .find(|r| r.url.path() == "/userinfo")
        .expect("userinfo request missing");
    let authorization = userinfo_request.headers.get("authorization").unwrap();
    assert_eq!(authorization.to_str().unwrap(), "DPoP at-123");
    let proof = userinfo_request.headers.get("dpop").unwrap().to_str().unwrap();
    let payload = proof.split('.').nth(1).unwrap();
    use base64::Engine;
    let payload: serde_json::Value = serde_json::from_slice(
        &base64::engine::general_purpose::URL_SAFE_NO_PAD
            .decode(payload)
            .unwrap(),
    )
    .unwrap();
    assert_eq!(payload["htm"], "GET");
    assert_eq!(payload["nonce"], "server-nonce-1");
    assert!(payload.get("ath").is_some());
}

#[tokio::test]
async fn callback_with_unknown_state_is_unauthorized() {
    let server = MockServer::start().await;
    mount_discovery(&server).await;

    let (oidc_config, server_config) = config(&server);
    let oidc = OidcClient::new(oidc_config, &server_config).unwrap();
    let auth = AuthService::new("jwt-secret");

    let err = oidc.callback(&auth, "no-such-state", "code").await.unwrap_err();
    assert!(matches!(err, sds_core::AppError::Unauthorized(_)));
}
