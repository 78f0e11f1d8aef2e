//! Integration tests for the sync flow: binding a gist, pushing the
//! collection, and restoring from remote.
//!
//! The GitHub API is mocked with wiremock; each test runs against its own
//! server and its own temporary data directory.

use serde_json::json;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use daybook::article::Article;
use daybook::storage::{LocalStore, PersistenceManager};
use daybook::store::ArticleStore;
use daybook::sync::{
    ApiError, StartupLoad, SyncConfig, SyncError, SyncManager, GIST_FILENAME,
};

fn config_with_token() -> SyncConfig {
    SyncConfig {
        token: Some("test-token".to_string()),
        ..SyncConfig::default()
    }
}

fn manager_for(server: &MockServer, config: &SyncConfig) -> SyncManager {
    SyncManager::new(config, Some(&server.uri())).unwrap()
}

/// A gist response carrying the backup file with the given document inline.
fn gist_with_document(id: &str, document: &str) -> serde_json::Value {
    json!({
        "id": id,
        "files": {
            GIST_FILENAME: { "content": document, "truncated": false, "size": document.len() },
        },
    })
}

// ============================================================================
// Push / Bind
// ============================================================================

#[tokio::test]
async fn test_push_creates_gist_on_first_sync() {
    let mock_server = MockServer::start().await;
    // Nothing to adopt
    Mock::given(method("GET"))
        .and(path("/gists"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("POST"))
        .and(path("/gists"))
        .and(body_string_contains("daybook-app-v1"))
        .respond_with(
            ResponseTemplate::new(201)
                .set_body_json(json!({ "id": "fresh1", "files": {} })),
        )
        .expect(1)
        .mount(&mock_server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let local = LocalStore::open(dir.path()).unwrap();
    let mut config = config_with_token();
    let manager = manager_for(&mock_server, &config);

    let articles = vec![Article::new("First entry", "", "Others", "words", "")];
    let report = manager.push(&articles, &mut config, &local).await.unwrap();

    assert!(report.created);
    assert!(!report.adopted);
    assert_eq!(report.gist_id, "fresh1");
    assert_eq!(report.articles, 1);
    assert_eq!(config.gist_id.as_deref(), Some("fresh1"));
    assert!(config.last_sync.is_some());

    // The binding was persisted, not just held in memory
    let reloaded = SyncConfig::load(&local);
    assert_eq!(reloaded.gist_id.as_deref(), Some("fresh1"));
    assert!(reloaded.last_sync.is_some());
}

#[tokio::test]
async fn test_push_uploads_full_document_to_bound_gist() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/gists/bound1"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "id": "bound1", "files": {} })),
        )
        .expect(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("PATCH"))
        .and(path("/gists/bound1"))
        .and(body_string_contains("daybook-app-v1"))
        .and(body_string_contains("Sea kayaking at dawn"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "id": "bound1", "files": {} })),
        )
        .expect(1)
        .mount(&mock_server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let local = LocalStore::open(dir.path()).unwrap();
    let mut config = config_with_token();
    config.gist_id = Some("bound1".to_string());
    let manager = manager_for(&mock_server, &config);

    let articles = vec![Article::new(
        "Sea kayaking at dawn",
        "Out before sunrise",
        "Travel",
        "<p>Flat water, no wind.</p>",
        "",
    )];
    let report = manager.push(&articles, &mut config, &local).await.unwrap();

    assert!(!report.created);
    assert!(!report.adopted);
    assert_eq!(report.gist_id, "bound1");
}

#[tokio::test]
async fn test_push_adopts_newest_existing_backup() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/gists"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {
                "id": "older",
                "updated_at": "2026-01-01T00:00:00Z",
                "files": { GIST_FILENAME: { "size": 10 } },
            },
            {
                "id": "unrelated",
                "updated_at": "2026-06-01T00:00:00Z",
                "files": { "notes.txt": { "size": 3 } },
            },
            {
                "id": "newer",
                "updated_at": "2026-05-01T00:00:00Z",
                "files": { GIST_FILENAME: { "size": 10 } },
            },
        ])))
        .expect(1)
        .mount(&mock_server)
        .await;
    // Only the newest matching gist gets the upload
    Mock::given(method("PATCH"))
        .and(path("/gists/newer"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "id": "newer", "files": {} })),
        )
        .expect(1)
        .mount(&mock_server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let local = LocalStore::open(dir.path()).unwrap();
    let mut config = config_with_token();
    let manager = manager_for(&mock_server, &config);

    let articles = vec![Article::new("Entry", "", "Others", "", "")];
    let report = manager.push(&articles, &mut config, &local).await.unwrap();

    assert!(report.adopted);
    assert!(!report.created);
    assert_eq!(report.gist_id, "newer");
    assert_eq!(SyncConfig::load(&local).gist_id.as_deref(), Some("newer"));
}

#[tokio::test]
async fn test_push_replaces_unreachable_bound_gist() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/gists/dead"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("POST"))
        .and(path("/gists"))
        .respond_with(
            ResponseTemplate::new(201)
                .set_body_json(json!({ "id": "fresh2", "files": {} })),
        )
        .expect(1)
        .mount(&mock_server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let local = LocalStore::open(dir.path()).unwrap();
    let mut config = config_with_token();
    config.gist_id = Some("dead".to_string());
    let manager = manager_for(&mock_server, &config);

    let articles = vec![Article::new("Entry", "", "Others", "", "")];
    let report = manager.push(&articles, &mut config, &local).await.unwrap();

    assert!(report.created, "a dead binding should be replaced, not kept");
    assert_eq!(report.gist_id, "fresh2");
    assert_eq!(config.gist_id.as_deref(), Some("fresh2"));
    assert_eq!(SyncConfig::load(&local).gist_id.as_deref(), Some("fresh2"));
}

// ============================================================================
// Pull / Restore
// ============================================================================

#[tokio::test]
async fn test_pull_replaces_local_collection() {
    let document = json!({
        "version": "1.0",
        "appIdentifier": "daybook-app-v1",
        "lastSync": "2026-08-20T00:00:00.000Z",
        "articles": [
            {
                "id": "r1",
                "title": "Remote one",
                "category": "Travel",
                "date": "2026-08-01T00:00:00.000Z",
            },
            { "id": "r2", "title": "Remote two", "date": "2026-08-02T00:00:00.000Z" },
        ],
    })
    .to_string();

    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/gists/backup"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(gist_with_document("backup", &document)),
        )
        .expect(1)
        .mount(&mock_server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let local = LocalStore::open(dir.path()).unwrap();
    let persist = PersistenceManager::new(local.clone());
    let mut store = ArticleStore::from_vec(vec![Article::new(
        "Doomed draft",
        "",
        "Others",
        "",
        "",
    )]);
    persist.save(&mut store).unwrap();

    let mut config = config_with_token();
    let manager = manager_for(&mock_server, &config);
    let report = manager
        .pull_from("backup", &mut store, &persist, &mut config)
        .await
        .unwrap();

    assert_eq!(report.count, 2);
    assert_eq!(report.dropped, 0);
    assert_eq!(store.len(), 2);
    assert_eq!(store.as_slice()[0].id, "r1");
    assert_eq!(store.as_slice()[1].title, "Remote two");
    // The fill-in category was applied to the sparse remote entry
    assert_eq!(store.as_slice()[1].category, "Others");
    assert!(config.last_sync.is_some());

    // No merge: the local draft is gone from disk as well
    let reloaded = PersistenceManager::new(local).load();
    let titles: Vec<&str> = reloaded.articles.iter().map(|a| a.title.as_str()).collect();
    assert_eq!(titles, vec!["Remote one", "Remote two"]);
}

#[tokio::test]
async fn test_pull_repairs_what_it_can() {
    // A well-formed entry, an empty object, and a number: the number is the
    // only thing that cannot be repaired into an article.
    let document = json!({
        "articles": [
            { "id": "ok", "title": "Fine", "date": "2026-08-01T00:00:00.000Z" },
            {},
            42,
        ],
    })
    .to_string();

    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/gists/ragged"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(gist_with_document("ragged", &document)),
        )
        .mount(&mock_server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let local = LocalStore::open(dir.path()).unwrap();
    let persist = PersistenceManager::new(local);
    let mut store = ArticleStore::new();
    let mut config = config_with_token();

    let manager = manager_for(&mock_server, &config);
    let report = manager
        .pull_from("ragged", &mut store, &persist, &mut config)
        .await
        .unwrap();

    assert_eq!(report.count, 2);
    assert_eq!(report.dropped, 1);
    assert_eq!(store.as_slice()[0].id, "ok");

    let repaired = &store.as_slice()[1];
    assert_eq!(repaired.title, "Untitled");
    assert_eq!(repaired.category, "Others");
    assert_eq!(repaired.id.len(), 36);
    assert!(!repaired.date.is_empty());
}

#[tokio::test]
async fn test_pull_missing_gist_keeps_local() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/gists/nope"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&mock_server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let local = LocalStore::open(dir.path()).unwrap();
    let persist = PersistenceManager::new(local.clone());
    let mut store = ArticleStore::from_vec(vec![Article::new(
        "Survivor",
        "",
        "Others",
        "",
        "",
    )]);
    persist.save(&mut store).unwrap();

    let mut config = config_with_token();
    let manager = manager_for(&mock_server, &config);
    let result = manager
        .pull_from("nope", &mut store, &persist, &mut config)
        .await;

    assert!(matches!(result, Err(SyncError::Api(ApiError::NotFound))));
    assert_eq!(store.len(), 1);
    assert_eq!(store.as_slice()[0].title, "Survivor");

    let reloaded = PersistenceManager::new(local).load();
    assert_eq!(reloaded.articles.len(), 1);
    assert_eq!(reloaded.articles[0].title, "Survivor");
}

#[tokio::test]
async fn test_pull_without_backup_file_reports_missing() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/gists/foreign"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "foreign",
            "files": { "readme.md": { "content": "hello", "size": 5 } },
        })))
        .mount(&mock_server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let local = LocalStore::open(dir.path()).unwrap();
    let persist = PersistenceManager::new(local);
    let mut store = ArticleStore::new();
    let mut config = config_with_token();

    let manager = manager_for(&mock_server, &config);
    let result = manager
        .pull_from("foreign", &mut store, &persist, &mut config)
        .await;

    assert!(matches!(result, Err(SyncError::MissingFile)));
}

// ============================================================================
// Startup Restore
// ============================================================================

#[tokio::test]
async fn test_startup_restore_replaces_seed_collection() {
    let document = json!({
        "articles": [
            { "id": "s1", "title": "One", "date": "2026-08-01T00:00:00.000Z" },
            { "id": "s2", "title": "Two", "date": "2026-08-02T00:00:00.000Z" },
            { "id": "s3", "title": "Three", "date": "2026-08-03T00:00:00.000Z" },
        ],
    })
    .to_string();

    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/gists/backup"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(gist_with_document("backup", &document)),
        )
        .expect(1)
        .mount(&mock_server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let local = LocalStore::open(dir.path()).unwrap();
    let persist = PersistenceManager::new(local.clone());
    // First run: the local collection is just the two-article seed
    let mut store = ArticleStore::from_vec(persist.load().articles);
    assert_eq!(store.len(), 2);

    let mut config = config_with_token();
    config.gist_id = Some("backup".to_string());
    let manager = manager_for(&mock_server, &config);

    let outcome = manager
        .load_on_startup(&mut store, &persist, &mut config)
        .await
        .unwrap();

    assert!(matches!(
        outcome,
        StartupLoad::Replaced {
            count: 3,
            dropped: 0
        }
    ));
    assert_eq!(store.len(), 3);
    assert_eq!(store.as_slice()[0].title, "One");

    let reloaded = PersistenceManager::new(local).load();
    assert_eq!(reloaded.articles.len(), 3);
}
