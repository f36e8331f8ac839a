//! Integration tests for the homebase-store crate.
//!
//! These tests run archives, caches and the reconciler against a real SQLite
//! database on disk (via tempfile), including reopening it.

use homebase_store::{
    Archive, Cached, Database, Entity, EntityFilter, EntityKey, LocalCache, ReconcileBatch,
    Reconciler, SortOrder, SqliteArchive, SqliteEntityCache,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Paste {
    title: String,
    content: String,
    modified_on: i64,
}

impl Entity for Paste {
    const KIND: &'static str = "paste";

    fn local_id(&self) -> String {
        self.title.clone()
    }

    fn sort_key(&self) -> i64 {
        self.modified_on
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Purl {
    name: String,
    url: String,
}

impl Entity for Purl {
    const KIND: &'static str = "purl";

    fn local_id(&self) -> String {
        self.name.clone()
    }
}

fn paste(title: &str, modified_on: i64) -> Paste {
    Paste {
        title: title.into(),
        content: format!("contents of {title}"),
        modified_on,
    }
}

fn purl(name: &str) -> Purl {
    Purl {
        name: name.into(),
        url: format!("https://example.com/{name}"),
    }
}

// ═══════════════════════════════════════════════════════════════════════
//  Database lifecycle
// ═══════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn database_open_and_migrate_on_disk() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("homebase.db");

    let db = Database::open_and_migrate(db_path.clone()).await.unwrap();

    for table in ["archives", "entities"] {
        let count: i64 = db
            .execute(move |conn| {
                Ok(conn.query_row(&format!("SELECT count(*) FROM {table}"), [], |row| {
                    row.get(0)
                })?)
            })
            .await
            .unwrap();
        assert_eq!(count, 0);
    }

    assert!(db_path.exists());
}

#[tokio::test]
async fn database_open_and_migrate_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("homebase.db");

    let first = Database::open_and_migrate(db_path.clone()).await.unwrap();
    drop(first);
    let _second = Database::open_and_migrate(db_path).await.unwrap();
}

// ═══════════════════════════════════════════════════════════════════════
//  Persistence across reopen
// ═══════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn archive_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("homebase.db");

    {
        let db = Database::open_and_migrate(db_path.clone()).await.unwrap();
        let address: SqliteArchive<String> = SqliteArchive::new(db, "selected_address");
        address.save(&"alice".to_string()).await.unwrap();
    }

    let db = Database::open_and_migrate(db_path).await.unwrap();
    let address: SqliteArchive<String> = SqliteArchive::new(db, "selected_address");
    assert_eq!(address.load().await.unwrap().as_deref(), Some("alice"));
}

#[tokio::test]
async fn cache_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("homebase.db");

    {
        let db = Database::open_and_migrate(db_path.clone()).await.unwrap();
        let pastes = SqliteEntityCache::new(db);
        Reconciler::apply(
            &pastes,
            ReconcileBatch::for_address("alice", vec![paste("notes", 1), paste("todo", 2)]),
        )
        .await;
    }

    let db = Database::open_and_migrate(db_path).await.unwrap();
    let pastes: SqliteEntityCache<Paste> = SqliteEntityCache::new(db);
    let rows = pastes.query(EntityFilter::All, SortOrder::Newest).await.unwrap();
    let titles: Vec<_> = rows.iter().map(|c| c.entity.title.as_str()).collect();
    assert_eq!(titles, vec!["todo", "notes"]);
}

// ═══════════════════════════════════════════════════════════════════════
//  Reconciliation
// ═══════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn reconcile_prunes_only_reported_address() {
    let dir = tempfile::tempdir().unwrap();
    let db = Database::open_and_migrate(dir.path().join("homebase.db"))
        .await
        .unwrap();
    let pastes = SqliteEntityCache::new(db);

    for (address, title) in [("alice", "1"), ("alice", "2"), ("bob", "5")] {
        pastes
            .upsert(Cached::new(address, paste(title, 0)))
            .await
            .unwrap();
    }

    let report = Reconciler::apply(
        &pastes,
        ReconcileBatch::for_address("alice", vec![paste("1", 0), paste("3", 0)]),
    )
    .await;
    assert!(report.is_clean());

    let keys: Vec<EntityKey> = pastes
        .query(EntityFilter::All, SortOrder::ById)
        .await
        .unwrap()
        .iter()
        .map(Cached::key)
        .collect();
    assert_eq!(
        keys,
        vec![
            EntityKey::new("alice", "1"),
            EntityKey::new("alice", "3"),
            EntityKey::new("bob", "5"),
        ]
    );
}

#[tokio::test]
async fn reconcile_one_feature_leaves_others_alone() {
    let db = Database::in_memory_migrated().await.unwrap();
    let pastes: SqliteEntityCache<Paste> = SqliteEntityCache::new(db.clone());
    let purls: SqliteEntityCache<Purl> = SqliteEntityCache::new(db);

    purls.upsert(Cached::new("alice", purl("blog"))).await.unwrap();
    pastes
        .upsert(Cached::new("alice", paste("notes", 0)))
        .await
        .unwrap();

    Reconciler::apply(&pastes, ReconcileBatch::for_address("alice", Vec::new())).await;

    assert_eq!(pastes.count(EntityFilter::All).await.unwrap(), 0);
    assert_eq!(purls.count(EntityFilter::All).await.unwrap(), 1);
}

#[tokio::test]
async fn concurrent_reconciles_on_shared_database() {
    let db = Database::in_memory_migrated().await.unwrap();
    let pastes: SqliteEntityCache<Paste> = SqliteEntityCache::new(db.clone());
    let purls: SqliteEntityCache<Purl> = SqliteEntityCache::new(db);

    let paste_batch: Vec<Paste> = (0..50).map(|i| paste(&format!("p{i}"), i)).collect();
    let purl_batch: Vec<Purl> = (0..50).map(|i| purl(&format!("u{i}"))).collect();

    let (a, b) = tokio::join!(
        Reconciler::apply(&pastes, ReconcileBatch::for_address("alice", paste_batch)),
        Reconciler::apply(&purls, ReconcileBatch::for_address("alice", purl_batch)),
    );

    assert_eq!(a.upserted, 50);
    assert_eq!(b.upserted, 50);
    assert_eq!(pastes.count(EntityFilter::All).await.unwrap(), 50);
    assert_eq!(purls.count(EntityFilter::All).await.unwrap(), 50);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn readers_never_see_a_half_applied_reconcile() {
    let dir = tempfile::tempdir().unwrap();
    let db = Database::open_and_migrate(dir.path().join("homebase.db"))
        .await
        .unwrap();
    let pastes: SqliteEntityCache<Paste> = SqliteEntityCache::new(db);

    let seed: Vec<Paste> = (0..100).map(|i| paste(&format!("seed{i}"), i)).collect();
    Reconciler::apply(&pastes, ReconcileBatch::for_address("alice", seed)).await;

    // Every round replaces all 100 ids with 100 new ones.
    let writer = {
        let pastes = pastes.clone();
        tokio::spawn(async move {
            for round in 0..5 {
                let batch: Vec<Paste> = (0..100)
                    .map(|i| paste(&format!("r{round}-{i}"), i))
                    .collect();
                let report =
                    Reconciler::apply(&pastes, ReconcileBatch::for_address("alice", batch)).await;
                assert_eq!(report.upserted, 100);
                assert_eq!(report.deleted, 100);
            }
        })
    };

    let mut observed = Vec::new();
    loop {
        observed.push(
            pastes
                .count(EntityFilter::Address("alice".into()))
                .await
                .unwrap(),
        );
        if writer.is_finished() {
            break;
        }
    }
    writer.await.unwrap();

    assert!(
        observed.iter().all(|&n| n == 100),
        "reader saw a partial batch: {observed:?}"
    );
    let titles: Vec<String> = pastes
        .query(EntityFilter::All, SortOrder::ById)
        .await
        .unwrap()
        .into_iter()
        .map(|c| c.entity.title)
        .collect();
    assert_eq!(titles.len(), 100);
    assert!(titles.iter().all(|t| t.starts_with("r4-")));
}
