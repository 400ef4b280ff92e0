//! Repository round-trips against an in-memory SQLite database

use chrono::{Duration, Utc};
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter};
use uuid::Uuid;

use bundlemux_api_types::{
    AuthConfig, AuthStrategy, Bundle, BundleEntry, McpPermissions, McpServer, Token, User,
};
use bundlemux_config::DecryptFailurePolicy;
use bundlemux_core::{hash_token, looks_encrypted, mint_token, CredentialVault};
use bundlemux_interfaces::{DatabaseError, RepositoryFactory};
use bundlemux_storage::entities::{mcp_servers, McpServers};
use bundlemux_storage::{DatabaseConnection, SeaOrmRepositoryFactory};

async fn setup(policy: DecryptFailurePolicy) -> (SeaOrmRepositoryFactory, DatabaseConnection) {
    let db = DatabaseConnection::in_memory().await.unwrap();
    db.migrate().await.unwrap();
    let vault = CredentialVault::from_secret("an-integration-test-secret-of-32ch").unwrap();
    (
        SeaOrmRepositoryFactory::new(db.clone(), vault, policy),
        db,
    )
}

fn user(username: &str) -> User {
    User {
        id: 0,
        uuid: Uuid::new_v4(),
        username: username.to_string(),
        password_hash: "hash".to_string(),
        api_key_hash: None,
        created_by: None,
        is_admin: true,
        created_at: Utc::now(),
        last_login_at: None,
    }
}

fn mcp(namespace: &str, creator: i32, strategy: AuthStrategy, auth: Option<AuthConfig>) -> McpServer {
    McpServer {
        id: 0,
        uuid: Uuid::new_v4(),
        namespace: namespace.to_string(),
        url: format!("http://{}/mcp", namespace),
        version: "1.0.0".to_string(),
        stateless: false,
        auth_strategy: strategy,
        auth,
        created_by: creator,
        created_at: Utc::now(),
    }
}

#[tokio::test]
async fn test_master_auth_is_encrypted_at_rest() {
    let (repos, db) = setup(DecryptFailurePolicy::FailClosed).await;
    let admin = repos.users().create(user("root")).await.unwrap();

    let created = repos
        .mcp_servers()
        .create(mcp(
            "github",
            admin.id,
            AuthStrategy::Master,
            Some(AuthConfig::Bearer {
                token: "ghp_secret_value".to_string(),
            }),
        ))
        .await
        .unwrap();

    // Cleartext comes back through the port
    assert_eq!(
        created.auth,
        Some(AuthConfig::Bearer {
            token: "ghp_secret_value".to_string()
        })
    );

    // The row itself holds ciphertext, never the secret
    let row = McpServers::find()
        .filter(mcp_servers::Column::Namespace.eq("github"))
        .one(db.get_connection())
        .await
        .unwrap()
        .unwrap();
    let blob = row.auth_blob.unwrap();
    assert!(looks_encrypted(&blob));
    assert!(!blob.contains("ghp_secret_value"));
}

#[tokio::test]
async fn test_bundle_aggregate_round_trip_preserves_order() {
    let (repos, _db) = setup(DecryptFailurePolicy::FailClosed).await;
    let admin = repos.users().create(user("root")).await.unwrap();

    let a = repos
        .mcp_servers()
        .create(mcp("alpha", admin.id, AuthStrategy::None, None))
        .await
        .unwrap();
    let b = repos
        .mcp_servers()
        .create(mcp("beta", admin.id, AuthStrategy::None, None))
        .await
        .unwrap();

    let entry = |mcp_id: i32, patterns: &[&str]| BundleEntry {
        id: 0,
        bundle_id: 0,
        mcp_id,
        permissions: McpPermissions {
            allowed_tools: patterns.iter().map(|p| p.to_string()).collect(),
            allowed_resources: vec!["*".to_string()],
            allowed_prompts: vec![],
        },
        position: 0,
    };

    let created = repos
        .bundles()
        .create(Bundle {
            id: 0,
            uuid: Uuid::new_v4(),
            name: "dev".to_string(),
            description: Some("dev bundle".to_string()),
            created_by: admin.id,
            created_at: Utc::now(),
            entries: vec![entry(b.id, &["^read_.*$"]), entry(a.id, &["*"])],
        })
        .await
        .unwrap();

    let loaded = repos
        .bundles()
        .find_by_id(created.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(loaded.entries.len(), 2);
    // Position reflects the submitted order: beta first, alpha second
    assert_eq!(loaded.entries[0].mcp_id, b.id);
    assert_eq!(loaded.entries[1].mcp_id, a.id);
    assert_eq!(loaded.entries[0].permissions.allowed_tools, vec!["^read_.*$"]);

    // The (bundle, mcp) pair is unique
    let duplicate = repos
        .bundles()
        .update(Bundle {
            entries: vec![entry(a.id, &["*"]), entry(a.id, &["*"])],
            ..loaded.clone()
        })
        .await;
    assert!(matches!(duplicate, Err(DatabaseError::Constraint { .. })));
}

#[tokio::test]
async fn test_token_lifecycle() {
    let (repos, _db) = setup(DecryptFailurePolicy::FailClosed).await;
    let admin = repos.users().create(user("root")).await.unwrap();
    let bundle = repos
        .bundles()
        .create(Bundle {
            id: 0,
            uuid: Uuid::new_v4(),
            name: "dev".to_string(),
            description: None,
            created_by: admin.id,
            created_at: Utc::now(),
            entries: vec![],
        })
        .await
        .unwrap();

    let cleartext = mint_token();
    let created = repos
        .tokens()
        .create(Token {
            id: 0,
            bundle_id: bundle.id,
            token_hash: hash_token(&cleartext),
            name: "ci".to_string(),
            expires_at: None,
            revoked: false,
            created_at: Utc::now(),
        })
        .await
        .unwrap();

    let found = repos
        .tokens()
        .find_by_hash(&hash_token(&cleartext))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(found.id, created.id);
    assert!(repos.tokens().is_valid(created.id).await.unwrap());

    repos.tokens().revoke(created.id).await.unwrap();
    assert!(!repos.tokens().is_valid(created.id).await.unwrap());

    // Expired tokens are invalid even when unrevoked
    let expired = repos
        .tokens()
        .create(Token {
            id: 0,
            bundle_id: bundle.id,
            token_hash: hash_token(&mint_token()),
            name: "old".to_string(),
            expires_at: Some(Utc::now() - Duration::hours(1)),
            revoked: false,
            created_at: Utc::now(),
        })
        .await
        .unwrap();
    assert!(!repos.tokens().is_valid(expired.id).await.unwrap());
}

#[tokio::test]
async fn test_credential_binding_is_unique_per_pair() {
    let (repos, _db) = setup(DecryptFailurePolicy::FailClosed).await;
    let admin = repos.users().create(user("root")).await.unwrap();
    let server = repos
        .mcp_servers()
        .create(mcp("notion", admin.id, AuthStrategy::UserSet, None))
        .await
        .unwrap();
    let bundle = repos
        .bundles()
        .create(Bundle {
            id: 0,
            uuid: Uuid::new_v4(),
            name: "dev".to_string(),
            description: None,
            created_by: admin.id,
            created_at: Utc::now(),
            entries: vec![],
        })
        .await
        .unwrap();
    let token = repos
        .tokens()
        .create(Token {
            id: 0,
            bundle_id: bundle.id,
            token_hash: hash_token(&mint_token()),
            name: "ci".to_string(),
            expires_at: None,
            revoked: false,
            created_at: Utc::now(),
        })
        .await
        .unwrap();

    let auth = AuthConfig::ApiKey {
        key: "notion-key".to_string(),
        header: "X-API-Key".to_string(),
    };

    repos
        .credentials()
        .bind(token.id, server.id, auth.clone())
        .await
        .unwrap();

    let rebind = repos.credentials().bind(token.id, server.id, auth).await;
    assert!(matches!(rebind, Err(DatabaseError::Constraint { .. })));

    let updated = repos
        .credentials()
        .update_by_token_and_mcp(
            token.id,
            server.id,
            AuthConfig::Bearer {
                token: "rotated".to_string(),
            },
        )
        .await
        .unwrap();
    assert_eq!(
        updated.auth,
        AuthConfig::Bearer {
            token: "rotated".to_string()
        }
    );

    repos.credentials().remove(token.id, server.id).await.unwrap();
    assert!(repos
        .credentials()
        .find_by_token_and_mcp(token.id, server.id)
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_user_hierarchy_authorization() {
    let (repos, _db) = setup(DecryptFailurePolicy::FailClosed).await;
    let root = repos.users().create(user("root")).await.unwrap();

    let mut middle = user("middle");
    middle.created_by = Some(root.id);
    let middle = repos.users().create(middle).await.unwrap();

    let mut leaf = user("leaf");
    leaf.created_by = Some(middle.id);
    let leaf = repos.users().create(leaf).await.unwrap();

    let mut other = user("other");
    other.created_by = None;
    let other = repos.users().create(other).await.unwrap();

    let descendants = repos.users().collect_descendant_ids(root.id).await.unwrap();
    assert!(descendants.contains(&middle.id));
    assert!(descendants.contains(&leaf.id));
    assert!(!descendants.contains(&other.id));

    // Root may act on records created by its transitive descendants
    assert!(repos.users().is_authorized(root.id, leaf.id).await.unwrap());
    // But not the other way around
    assert!(!repos.users().is_authorized(leaf.id, root.id).await.unwrap());
    assert!(!repos.users().is_authorized(root.id, other.id).await.unwrap());
}

#[tokio::test]
async fn test_decrypt_failure_policies() {
    // Write a row with one vault, read it with another key
    let db = DatabaseConnection::in_memory().await.unwrap();
    db.migrate().await.unwrap();

    let writer_vault = CredentialVault::from_secret("writer-secret-writer-secret-12345").unwrap();
    let writer = SeaOrmRepositoryFactory::new(
        db.clone(),
        writer_vault,
        DecryptFailurePolicy::FailClosed,
    );
    let admin = writer.users().create(user("root")).await.unwrap();
    let created = writer
        .mcp_servers()
        .create(mcp(
            "github",
            admin.id,
            AuthStrategy::Master,
            Some(AuthConfig::Bearer {
                token: "secret".to_string(),
            }),
        ))
        .await
        .unwrap();

    let rotated_vault = CredentialVault::from_secret("rotated-secret-rotated-secret-123").unwrap();

    // fail-closed surfaces the decrypt error
    let strict = SeaOrmRepositoryFactory::new(
        db.clone(),
        rotated_vault.clone(),
        DecryptFailurePolicy::FailClosed,
    );
    let result = strict.mcp_servers().find_by_id(created.id).await;
    assert!(matches!(result, Err(DatabaseError::Decrypt { .. })));

    // fallback-none substitutes an unauthenticated config
    let lenient =
        SeaOrmRepositoryFactory::new(db, rotated_vault, DecryptFailurePolicy::FallbackNone);
    let server = lenient
        .mcp_servers()
        .find_by_id(created.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(server.auth, Some(AuthConfig::None));
}
