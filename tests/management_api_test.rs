//! Management and credential API flows

mod common;

use axum::http::StatusCode;
use serde_json::json;

use bundlemux_api_types::AuthStrategy;
use common::{read_json, ScriptedFactory, TestHarness};

fn admin_headers(key: &str) -> Vec<(String, String)> {
    vec![("authorization".to_string(), format!("Bearer {}", key))]
}

async fn post_as_admin(
    harness: &TestHarness,
    path: &str,
    body: serde_json::Value,
) -> axum::response::Response {
    let headers = admin_headers(&harness.admin_key);
    let header_refs: Vec<(&str, &str)> = headers
        .iter()
        .map(|(name, value)| (name.as_str(), value.as_str()))
        .collect();
    harness.post(path, &header_refs, body).await
}

#[tokio::test]
async fn test_mcp_crud_with_validation() {
    let harness = TestHarness::new(ScriptedFactory::new()).await;

    // Invalid namespace (contains the separator) -> 400
    let response = post_as_admin(
        &harness,
        "/api/v1/mcps",
        json!({"namespace": "bad__ns", "url": "http://x/mcp"}),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // Master strategy without auth material -> 400
    let response = post_as_admin(
        &harness,
        "/api/v1/mcps",
        json!({"namespace": "github", "url": "http://x/mcp", "auth_strategy": "master"}),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // Valid create -> 201
    let response = post_as_admin(
        &harness,
        "/api/v1/mcps",
        json!({
            "namespace": "github",
            "url": "http://github-mcp:3000/mcp",
            "auth_strategy": "master",
            "auth": {"method": "bearer", "token": "ghp_secret"},
        }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let created = read_json(response).await;
    assert_eq!(created["namespace"], "github");
    // Secrets do not appear in the response body... the auth config does,
    // since the admin just supplied it, but never the password hash fields
    assert!(created.get("password_hash").is_none());

    // Duplicate namespace -> 409
    let response = post_as_admin(
        &harness,
        "/api/v1/mcps",
        json!({"namespace": "github", "url": "http://elsewhere/mcp"}),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);

    // Unauthenticated list -> 401
    let response = harness
        .request("GET", "/api/v1/mcps", &[], None)
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    // Malformed admin key (bundle-token prefix) -> 401
    let bundle_shaped = format!("mcpb_{}", "a".repeat(64));
    let response = harness
        .request(
            "GET",
            "/api/v1/mcps",
            &[("authorization", &format!("Bearer {}", bundle_shaped))],
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_bundle_rejects_uncompilable_patterns() {
    let harness = TestHarness::new(ScriptedFactory::new()).await;
    post_as_admin(
        &harness,
        "/api/v1/mcps",
        json!({"namespace": "fs", "url": "http://fs/mcp"}),
    )
    .await;

    let response = post_as_admin(
        &harness,
        "/api/v1/bundles",
        json!({
            "name": "dev",
            "entries": [{
                "namespace": "fs",
                "permissions": {"allowed_tools": ["([unclosed"]},
            }],
        }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = read_json(response).await;
    assert!(body["error"].as_str().unwrap().contains("does not compile"));
}

#[tokio::test]
async fn test_token_issue_revoke_full_loop() {
    let harness = TestHarness::new(ScriptedFactory::new().with_tools("fs", &["read_file"])).await;

    post_as_admin(
        &harness,
        "/api/v1/mcps",
        json!({"namespace": "fs", "url": "http://fs/mcp"}),
    )
    .await;

    let response = post_as_admin(
        &harness,
        "/api/v1/bundles",
        json!({
            "name": "dev",
            "entries": [{"namespace": "fs", "permissions": {
                "allowed_tools": ["*"],
                "allowed_resources": ["*"],
                "allowed_prompts": ["*"],
            }}],
        }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let bundle = read_json(response).await;
    let bundle_id = bundle["id"].as_i64().unwrap();

    // Issue a token through the API
    let response = post_as_admin(
        &harness,
        &format!("/api/v1/bundles/{}/tokens", bundle_id),
        json!({"name": "ci"}),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let issued = read_json(response).await;
    let token = issued["token"].as_str().unwrap().to_string();
    assert!(token.starts_with("mcpb_"));
    // Only the hash is recorded
    assert_ne!(issued["record"]["token_hash"].as_str().unwrap(), token);

    // The token opens a session
    let (session_id, _) = harness.open_session(&token).await;
    let listed = harness.rpc(&session_id, "tools/list", json!({})).await;
    assert_eq!(listed["result"]["tools"][0]["name"], "fs__read_file");

    // Revoke, then new sessions are refused
    let record_id = issued["record"]["id"].as_i64().unwrap();
    let headers = admin_headers(&harness.admin_key);
    let header_refs: Vec<(&str, &str)> = headers
        .iter()
        .map(|(name, value)| (name.as_str(), value.as_str()))
        .collect();
    let response = harness
        .request(
            "DELETE",
            &format!("/api/v1/tokens/{}", record_id),
            &header_refs,
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = harness
        .post(
            "/mcp",
            &[
                ("accept", "application/json, text/event-stream"),
                ("authorization", &format!("Bearer {}", token)),
            ],
            common::initialize_body(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_hierarchy_blocks_foreign_mutations() {
    let harness = TestHarness::new(ScriptedFactory::new()).await;

    // Root creates a sub-user; the sub-user creates an MCP
    let response = post_as_admin(
        &harness,
        "/api/v1/users",
        json!({"username": "dev", "password": "devpass"}),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let created = read_json(response).await;
    let dev_key = created["api_key"].as_str().unwrap().to_string();

    let response = harness
        .post(
            "/api/v1/mcps",
            &[("authorization", &format!("Bearer {}", dev_key))],
            json!({"namespace": "devtool", "url": "http://devtool/mcp"}),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);

    // Root is the dev user's transitive creator, so root may delete it
    let headers = admin_headers(&harness.admin_key);
    let header_refs: Vec<(&str, &str)> = headers
        .iter()
        .map(|(name, value)| (name.as_str(), value.as_str()))
        .collect();
    let response = harness
        .request("DELETE", "/api/v1/mcps/devtool", &header_refs, None)
        .await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    // A sibling user cannot touch root's records
    let response = post_as_admin(
        &harness,
        "/api/v1/mcps",
        json!({"namespace": "roottool", "url": "http://roottool/mcp"}),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CREATED);

    let response = harness
        .request(
            "DELETE",
            "/api/v1/mcps/roottool",
            &[("authorization", &format!("Bearer {}", dev_key))],
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_credential_binding_enables_user_set_upstream() {
    let harness = TestHarness::new(
        ScriptedFactory::new().with_tools("notion", &["search"]),
    )
    .await;

    let notion = harness
        .seed_mcp("notion", false, AuthStrategy::UserSet, None)
        .await;
    let token = harness
        .seed_bundle("dev", &[(notion.id, bundlemux_api_types::McpPermissions::allow_all())])
        .await;

    // Without a credential the upstream is skipped
    let (session_id, result) = harness.open_session(&token).await;
    assert_eq!(result["skippedNamespaces"], json!(["notion"]));
    let listed = harness.rpc(&session_id, "tools/list", json!({})).await;
    assert!(listed["result"]["tools"].as_array().unwrap().is_empty());

    // Bind a credential with the bundle token
    let response = harness
        .post(
            "/api/v1/credentials/notion",
            &[("x-bundle-token", token.as_str())],
            json!({"method": "bearer", "token": "secret-notion-token"}),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);

    // Re-binding conflicts; updating succeeds
    let response = harness
        .post(
            "/api/v1/credentials/notion",
            &[("x-bundle-token", token.as_str())],
            json!({"method": "bearer", "token": "other"}),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let response = harness
        .request(
            "PUT",
            "/api/v1/credentials/notion",
            &[("x-bundle-token", token.as_str())],
            Some(json!({"method": "bearer", "token": "rotated"})),
        )
        .await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    // A fresh session now attaches the upstream
    let (session_id, result) = harness.open_session(&token).await;
    assert!(result["skippedNamespaces"].is_null());
    let listed = harness.rpc(&session_id, "tools/list", json!({})).await;
    assert_eq!(listed["result"]["tools"][0]["name"], "notion__search");

    // Listing credentials never exposes secret material
    let response = harness
        .request(
            "GET",
            "/api/v1/credentials",
            &[("x-bundle-token", token.as_str())],
            None,
        )
        .await;
    let body = read_json(response).await;
    assert_eq!(body[0]["namespace"], "notion");
    assert_eq!(body[0]["method"], "bearer");
    assert!(!body.to_string().contains("rotated"));
}

#[tokio::test]
async fn test_login_rotates_admin_key() {
    let harness = TestHarness::new(ScriptedFactory::new()).await;

    let response = harness
        .post(
            "/api/v1/auth/login",
            &[],
            json!({"username": "root", "password": "root-password"}),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json(response).await;
    let fresh_key = body["api_key"].as_str().unwrap().to_string();
    assert!(fresh_key.starts_with("mcpa_"));
    assert_ne!(fresh_key, harness.admin_key);

    // The old key stops working, the fresh one works
    let headers = admin_headers(&harness.admin_key);
    let header_refs: Vec<(&str, &str)> = headers
        .iter()
        .map(|(name, value)| (name.as_str(), value.as_str()))
        .collect();
    let response = harness
        .request("GET", "/api/v1/mcps", &header_refs, None)
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = harness
        .request(
            "GET",
            "/api/v1/mcps",
            &[("authorization", &format!("Bearer {}", fresh_key))],
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    // Wrong password -> 401
    let response = harness
        .post(
            "/api/v1/auth/login",
            &[],
            json!({"username": "root", "password": "nope"}),
        )
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}
