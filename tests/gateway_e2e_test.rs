//! End-to-end gateway scenarios driven through the HTTP ingress

mod common;

use axum::http::StatusCode;
use chrono::{Duration as ChronoDuration, Utc};
use serde_json::json;
use std::time::Duration;

use bundlemux_api_types::{AuthConfig, AuthStrategy, McpPermissions};
use bundlemux_interfaces::RepositoryFactory;
use common::{initialize_body, ScriptedFactory, TestHarness};

fn allow_all() -> McpPermissions {
    McpPermissions::allow_all()
}

#[tokio::test]
async fn test_tool_collision_across_namespaces() {
    let harness = TestHarness::new(
        ScriptedFactory::new()
            .with_tools("github", &["search"])
            .with_tools("notion", &["search"]),
    )
    .await;

    let github = harness
        .seed_mcp("github", false, AuthStrategy::None, None)
        .await;
    let notion = harness
        .seed_mcp("notion", false, AuthStrategy::None, None)
        .await;
    let token = harness
        .seed_bundle("dev", &[(github.id, allow_all()), (notion.id, allow_all())])
        .await;

    let (session_id, _) = harness.open_session(&token).await;

    let listed = harness.rpc(&session_id, "tools/list", json!({})).await;
    let names: Vec<&str> = listed["result"]["tools"]
        .as_array()
        .unwrap()
        .iter()
        .map(|tool| tool["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["github__search", "notion__search"]);

    // The call routes only to the notion connector, with the original name
    let called = harness
        .rpc(
            &session_id,
            "tools/call",
            json!({"name": "notion__search", "arguments": {"q": "minutes"}}),
        )
        .await;
    let text = called["result"]["content"][0]["text"].as_str().unwrap();
    assert_eq!(text, "notion executed search");
}

#[tokio::test]
async fn test_overlong_tool_name_is_hashed() {
    let long_name = "n".repeat(80);
    let harness = TestHarness::new(
        ScriptedFactory::new()
            .with_tools("integrations.customer-extranet.v2", &[long_name.as_str()]),
    )
    .await;

    let mcp = harness
        .seed_mcp(
            "integrations.customer-extranet.v2",
            false,
            AuthStrategy::None,
            None,
        )
        .await;
    let token = harness.seed_bundle("dev", &[(mcp.id, allow_all())]).await;
    let (session_id, _) = harness.open_session(&token).await;

    let listed = harness.rpc(&session_id, "tools/list", json!({})).await;
    let tool = &listed["result"]["tools"][0];
    let public = tool["name"].as_str().unwrap();
    assert_eq!(public.len(), 12);
    assert!(public.bytes().all(|b| b.is_ascii_hexdigit()));
    assert_eq!(tool["originalName"].as_str().unwrap(), long_name);
    assert_eq!(
        tool["namespace"].as_str().unwrap(),
        "integrations.customer-extranet.v2"
    );

    // The hashed public name still routes to the original tool
    let called = harness
        .rpc(&session_id, "tools/call", json!({"name": public}))
        .await;
    assert!(called["error"].is_null());
    assert!(called["result"]["content"][0]["text"]
        .as_str()
        .unwrap()
        .ends_with(&long_name));
}

#[tokio::test]
async fn test_user_set_without_credential_skips_upstream() {
    let harness = TestHarness::new(
        ScriptedFactory::new()
            .with_tools("a", &["ping"])
            .with_tools("b", &["x"]),
    )
    .await;

    let a = harness
        .seed_mcp(
            "a",
            false,
            AuthStrategy::Master,
            Some(AuthConfig::Bearer {
                token: "shared".to_string(),
            }),
        )
        .await;
    let b = harness.seed_mcp("b", false, AuthStrategy::UserSet, None).await;
    let token = harness
        .seed_bundle("dev", &[(a.id, allow_all()), (b.id, allow_all())])
        .await;

    let (session_id, init_result) = harness.open_session(&token).await;

    // The skipped namespace is surfaced on initialize
    assert_eq!(init_result["skippedNamespaces"], json!(["b"]));

    let listed = harness.rpc(&session_id, "tools/list", json!({})).await;
    let names: Vec<&str> = listed["result"]["tools"]
        .as_array()
        .unwrap()
        .iter()
        .map(|tool| tool["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["a__ping"]);

    let called = harness
        .rpc(&session_id, "tools/call", json!({"name": "b__x"}))
        .await;
    assert_eq!(called["error"]["code"], -32601);
}

#[tokio::test]
async fn test_permission_regex_filters_and_denies() {
    let harness = TestHarness::new(
        ScriptedFactory::new().with_tools("fs", &["read_file", "read_dir", "write_file"]),
    )
    .await;

    let fs = harness.seed_mcp("fs", false, AuthStrategy::None, None).await;
    let permissions = McpPermissions {
        allowed_tools: vec!["^read_.*$".to_string()],
        allowed_resources: vec!["*".to_string()],
        allowed_prompts: vec!["*".to_string()],
    };
    let token = harness.seed_bundle("dev", &[(fs.id, permissions)]).await;
    let (session_id, _) = harness.open_session(&token).await;

    let listed = harness.rpc(&session_id, "tools/list", json!({})).await;
    let names: Vec<&str> = listed["result"]["tools"]
        .as_array()
        .unwrap()
        .iter()
        .map(|tool| tool["name"].as_str().unwrap())
        .collect();
    assert!(names.contains(&"fs__read_file"));
    assert!(names.contains(&"fs__read_dir"));
    assert!(!names.contains(&"fs__write_file"));

    let allowed = harness
        .rpc(&session_id, "tools/call", json!({"name": "fs__read_dir"}))
        .await;
    assert!(allowed["error"].is_null());

    let denied = harness
        .rpc(&session_id, "tools/call", json!({"name": "fs__write_file"}))
        .await;
    assert_eq!(denied["error"]["code"], -32000);
    assert!(denied["error"]["message"]
        .as_str()
        .unwrap()
        .contains("Permission denied"));
}

#[tokio::test]
async fn test_expired_token_is_unauthorized() {
    let harness = TestHarness::new(ScriptedFactory::new().with_tools("github", &["search"])).await;
    let github = harness
        .seed_mcp("github", false, AuthStrategy::None, None)
        .await;
    let token = harness
        .seed_bundle("dev", &[(github.id, allow_all())])
        .await;
    // A second token on the same bundle, already expired
    let bundle_id = harness
        .state
        .repositories
        .tokens()
        .find_by_hash(&bundlemux_core::hash_token(&token))
        .await
        .unwrap()
        .unwrap()
        .bundle_id;
    let expired = harness
        .issue_token(bundle_id, Some(Utc::now() - ChronoDuration::hours(1)))
        .await;

    let response = harness
        .post(
            "/mcp",
            &[
                ("accept", "application/json, text/event-stream"),
                ("authorization", &format!("Bearer {}", expired)),
            ],
            initialize_body(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test(start_paused = true)]
async fn test_idle_timeout_closes_session() {
    let mut config = bundlemux_config::BundlemuxConfig::default();
    config.gateway.idle_timeout = Duration::from_millis(100);
    config.gateway.idle_check_interval = Duration::from_millis(10);

    let harness = TestHarness::with_config(
        ScriptedFactory::new().with_tools("github", &["search"]),
        config,
    )
    .await;
    let github = harness
        .seed_mcp("github", false, AuthStrategy::None, None)
        .await;
    let token = harness
        .seed_bundle("dev", &[(github.id, allow_all())])
        .await;
    let (session_id, _) = harness.open_session(&token).await;

    let session_uuid = session_id.parse().unwrap();
    let session = harness.state.sessions.get(&session_uuid).await.unwrap();
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    session.subscribe_shutdown("observer", tx);

    tokio::time::sleep(Duration::from_millis(150)).await;

    // Exactly one shutdown, reason idle
    let event = rx.try_recv().unwrap();
    assert_eq!(event.reason, bundlemux_mcp::ShutdownReason::IdleTimeout);
    assert!(rx.try_recv().is_err());

    // The registry reaped the session; further operations find nothing
    let response = harness
        .post(
            "/mcp",
            &[
                ("accept", "application/json, text/event-stream"),
                ("mcp-session-id", &session_id),
            ],
            json!({
                "jsonrpc": "2.0",
                "id": 2,
                "method": "tools/call",
                "params": {"name": "github__search"},
            }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_ingress_header_contract() {
    let harness = TestHarness::new(ScriptedFactory::new().with_tools("github", &["search"])).await;
    let github = harness
        .seed_mcp("github", false, AuthStrategy::None, None)
        .await;
    let token = harness
        .seed_bundle("dev", &[(github.id, allow_all())])
        .await;

    // Missing Accept -> 406
    let response = harness
        .post(
            "/mcp",
            &[("authorization", &format!("Bearer {}", token))],
            initialize_body(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::NOT_ACCEPTABLE);

    // Missing Authorization on the creating POST -> 401
    let response = harness
        .post(
            "/mcp",
            &[("accept", "application/json, text/event-stream")],
            initialize_body(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    // Unknown session id -> 404
    let response = harness
        .post(
            "/mcp",
            &[
                ("accept", "application/json, text/event-stream"),
                ("mcp-session-id", &uuid::Uuid::new_v4().to_string()),
            ],
            json!({"jsonrpc": "2.0", "id": 1, "method": "tools/list"}),
        )
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_session_capacity_returns_503() {
    let mut config = bundlemux_config::BundlemuxConfig::default();
    config.server.max_sessions = 1;

    let harness = TestHarness::with_config(
        ScriptedFactory::new().with_tools("github", &["search"]),
        config,
    )
    .await;
    let github = harness
        .seed_mcp("github", false, AuthStrategy::None, None)
        .await;
    let token = harness
        .seed_bundle("dev", &[(github.id, allow_all())])
        .await;

    let (_session, _) = harness.open_session(&token).await;

    let response = harness
        .post(
            "/mcp",
            &[
                ("accept", "application/json, text/event-stream"),
                ("authorization", &format!("Bearer {}", token)),
            ],
            initialize_body(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_delete_closes_session() {
    let harness = TestHarness::new(ScriptedFactory::new().with_tools("github", &["search"])).await;
    let github = harness
        .seed_mcp("github", false, AuthStrategy::None, None)
        .await;
    let token = harness
        .seed_bundle("dev", &[(github.id, allow_all())])
        .await;
    let (session_id, _) = harness.open_session(&token).await;

    let response = harness
        .request(
            "DELETE",
            "/mcp",
            &[
                ("accept", "application/json, text/event-stream"),
                ("mcp-session-id", &session_id),
            ],
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let listed = harness
        .post(
            "/mcp",
            &[
                ("accept", "application/json, text/event-stream"),
                ("mcp-session-id", &session_id),
            ],
            json!({"jsonrpc": "2.0", "id": 1, "method": "tools/list"}),
        )
        .await;
    assert_eq!(listed.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_stateless_upstream_shared_across_sessions() {
    let harness =
        TestHarness::new(ScriptedFactory::new().with_tools("github", &["search"])).await;
    let github = harness
        .seed_mcp("github", true, AuthStrategy::None, None)
        .await;
    let token = harness
        .seed_bundle("dev", &[(github.id, allow_all())])
        .await;

    let (first, _) = harness.open_session(&token).await;
    let (second, _) = harness.open_session(&token).await;
    assert_ne!(first, second);
    assert_eq!(harness.state.pool.len().await, 1);

    // Both sessions see the shared upstream's catalog
    let listed = harness.rpc(&second, "tools/list", json!({})).await;
    assert_eq!(listed["result"]["tools"][0]["name"], "github__search");

    // Closing one session leaves the pooled connector usable by the other
    harness
        .request(
            "DELETE",
            "/mcp",
            &[
                ("accept", "application/json, text/event-stream"),
                ("mcp-session-id", &first),
            ],
            None,
        )
        .await;
    let listed = harness.rpc(&second, "tools/list", json!({})).await;
    assert_eq!(listed["result"]["tools"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_event_stream_endpoint() {
    let harness = TestHarness::new(ScriptedFactory::new().with_tools("github", &["search"])).await;
    let github = harness
        .seed_mcp("github", false, AuthStrategy::None, None)
        .await;
    let token = harness
        .seed_bundle("dev", &[(github.id, allow_all())])
        .await;
    let (session_id, _) = harness.open_session(&token).await;

    let response = harness
        .request(
            "GET",
            "/mcp",
            &[
                ("accept", "application/json, text/event-stream"),
                ("mcp-session-id", &session_id),
            ],
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers()["content-type"]
        .to_str()
        .unwrap()
        .starts_with("text/event-stream"));

    // Without a session header the stream cannot be bound
    let response = harness
        .request(
            "GET",
            "/mcp",
            &[("accept", "application/json, text/event-stream")],
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_wildcard_token_resolves_everything_but_user_set() {
    let mut config = bundlemux_config::BundlemuxConfig::default();
    config.resolver.wildcard_allow = true;
    config.resolver.wildcard_token = Some("dev-wildcard-token".to_string());

    let harness = TestHarness::with_config(
        ScriptedFactory::new()
            .with_tools("github", &["search"])
            .with_tools("notion", &["search"]),
        config,
    )
    .await;
    harness
        .seed_mcp("github", false, AuthStrategy::None, None)
        .await;
    harness
        .seed_mcp("notion", false, AuthStrategy::UserSet, None)
        .await;

    let (session_id, result) = harness.open_session("dev-wildcard-token").await;
    assert_eq!(result["bundle"], "all");

    let listed = harness.rpc(&session_id, "tools/list", json!({})).await;
    let names: Vec<&str> = listed["result"]["tools"]
        .as_array()
        .unwrap()
        .iter()
        .map(|tool| tool["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["github__search"]);
}
