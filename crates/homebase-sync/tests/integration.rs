//! Integration tests for the homebase-sync crate.
//!
//! These tests wire real auth/session stores and SQLite caches to a
//! scripted in-process API and drive the repositories end to end.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use homebase_auth::{AccountAddress, AuthStateStore, CurrentAccount, SessionStateStore};
use homebase_store::{
    Database, EntityFilter, LocalCache, MemoryArchive, MemoryEntityCache, SortOrder,
    SqliteEntityCache,
};
use homebase_sync::features::paste::PasteResponse;
use homebase_sync::features::purl::PurlResponse;
use homebase_sync::features::{Paste, PasteDraft, Pastes, Purl, PurlDraft, Purls};
use homebase_sync::{
    AccountApi, AccountRepository, DraftOf, Feature, FeatureApi, RemoteSource, ResponseOf,
    SyncError, SyncRepository,
};
use homebase_vault::MemorySecureStore;

// ═══════════════════════════════════════════════════════════════════════
//  Scripted API
// ═══════════════════════════════════════════════════════════════════════

/// Server-side behaviour the scripted API needs per feature.
trait Scripted: Feature {
    fn id(item: &Self::Response) -> String;
    fn from_draft(draft: &Self::Draft) -> Self::Response;
}

impl Scripted for Pastes {
    fn id(item: &PasteResponse) -> String {
        item.title.clone()
    }

    fn from_draft(draft: &PasteDraft) -> PasteResponse {
        PasteResponse {
            title: draft.title.clone(),
            content: draft.content.clone(),
            modified_on: Utc::now().timestamp(),
            listed: draft.listed,
        }
    }
}

impl Scripted for Purls {
    fn id(item: &PurlResponse) -> String {
        item.name.clone()
    }

    fn from_draft(draft: &PurlDraft) -> PurlResponse {
        PurlResponse {
            name: draft.name.clone(),
            url: draft.url.clone(),
            counter: 0,
            listed: draft.listed,
        }
    }
}

/// In-process stand-in for the remote API.
struct ScriptedApi<F: Scripted> {
    items: Mutex<HashMap<String, Vec<F::Response>>>,
    fetches: AtomicUsize,
    offline: AtomicBool,
}

impl<F: Scripted> ScriptedApi<F> {
    fn new() -> Self {
        Self {
            items: Mutex::new(HashMap::new()),
            fetches: AtomicUsize::new(0),
            offline: AtomicBool::new(false),
        }
    }

    fn seed(&self, address: &str, items: Vec<F::Response>) {
        self.items.lock().unwrap().insert(address.to_string(), items);
    }

    fn remove(&self, address: &str, id: &str) {
        if let Some(items) = self.items.lock().unwrap().get_mut(address) {
            items.retain(|item| F::id(item) != id);
        }
    }

    fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    fn check_online(&self) -> homebase_sync::Result<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(SyncError::Remote {
                status: 503,
                message: "offline".into(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl<F: Scripted> FeatureApi for ScriptedApi<F> {
    type Feature = F;

    async fn fetch(&self, _token: &str, address: &str) -> homebase_sync::Result<Vec<ResponseOf<Self>>> {
        self.check_online()?;
        self.fetches.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .items
            .lock()
            .unwrap()
            .get(address)
            .cloned()
            .unwrap_or_default())
    }

    async fn create(&self, _token: &str, address: &str, draft: &DraftOf<Self>) -> homebase_sync::Result<()> {
        self.check_online()?;
        self.items
            .lock()
            .unwrap()
            .entry(address.to_string())
            .or_default()
            .push(F::from_draft(draft));
        Ok(())
    }

    async fn update(
        &self,
        token: &str,
        address: &str,
        id: &str,
        draft: &DraftOf<Self>,
    ) -> homebase_sync::Result<()> {
        self.check_online()?;
        self.remove(address, id);
        self.create(token, address, draft).await
    }

    async fn delete(&self, _token: &str, address: &str, id: &str) -> homebase_sync::Result<()> {
        self.check_online()?;
        self.remove(address, id);
        Ok(())
    }
}

struct FixedAccount(Vec<&'static str>);

#[async_trait]
impl AccountApi for FixedAccount {
    async fn fetch_account(&self, _token: &str) -> homebase_sync::Result<CurrentAccount> {
        let now = Utc::now();
        Ok(CurrentAccount::new(
            "Alice",
            "alice@example.com",
            now,
            self.0.iter().map(|a| AccountAddress::new(*a, now)).collect(),
        ))
    }
}

// ═══════════════════════════════════════════════════════════════════════
//  Fixture
// ═══════════════════════════════════════════════════════════════════════

struct App {
    auth: Arc<AuthStateStore>,
    session: Arc<SessionStateStore>,
    accounts: AccountRepository,
    paste_api: Arc<ScriptedApi<Pastes>>,
    pastes: SyncRepository<ScriptedApi<Pastes>>,
    purl_api: Arc<ScriptedApi<Purls>>,
    purls: SyncRepository<ScriptedApi<Purls>>,
}

async fn app() -> App {
    let db = Database::in_memory_migrated().await.unwrap();
    let auth = Arc::new(AuthStateStore::load(Arc::new(MemorySecureStore::new())));
    let session = Arc::new(
        SessionStateStore::load(
            Arc::new(MemoryArchive::<CurrentAccount>::new()),
            Arc::new(MemoryArchive::<String>::new()),
        )
        .await,
    );
    let accounts = AccountRepository::new(
        Arc::new(FixedAccount(vec!["alice", "alice-art"])),
        auth.clone(),
        session.clone(),
    );

    let paste_api = Arc::new(ScriptedApi::<Pastes>::new());
    let pastes = SyncRepository::new(
        Arc::new(RemoteSource::from_arc(paste_api.clone())),
        Arc::new(SqliteEntityCache::<Paste>::new(db.clone())),
        auth.clone(),
        session.clone(),
    );

    let purl_api = Arc::new(ScriptedApi::<Purls>::new());
    let purls = SyncRepository::new(
        Arc::new(RemoteSource::from_arc(purl_api.clone())),
        Arc::new(SqliteEntityCache::<Purl>::new(db)),
        auth.clone(),
        session.clone(),
    );

    App {
        auth,
        session,
        accounts,
        paste_api,
        pastes,
        purl_api,
        purls,
    }
}

impl App {
    async fn login(&self) {
        self.auth.set_access_token(Some("tok1".into()));
        self.accounts.fetch().await.unwrap();
    }
}

fn paste(title: &str) -> PasteResponse {
    PasteResponse {
        title: title.into(),
        content: format!("{title} body"),
        modified_on: 1,
        listed: false,
    }
}

fn purl(name: &str) -> PurlResponse {
    PurlResponse {
        name: name.into(),
        url: format!("https://example.com/{name}"),
        counter: 0,
        listed: true,
    }
}

/// Poll `check` until it holds, failing after two seconds.
async fn eventually<F, Fut>(what: &str, mut check: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while !check().await {
        assert!(tokio::time::Instant::now() < deadline, "timed out waiting for {what}");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

async fn titles(app: &App) -> Vec<String> {
    app.pastes
        .cache()
        .query(EntityFilter::All, SortOrder::ById)
        .await
        .unwrap()
        .into_iter()
        .map(|c| format!("{}/{}", c.address, c.entity.title))
        .collect()
}

// ═══════════════════════════════════════════════════════════════════════
//  Scenarios
// ═══════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn fetch_while_logged_out_is_a_silent_no_op() {
    let app = app().await;
    app.paste_api.seed("alice", vec![paste("a")]);

    app.pastes.fetch().await.unwrap();
    app.accounts.fetch().await.unwrap();

    assert_eq!(app.paste_api.fetches(), 0);
    assert!(titles(&app).await.is_empty());
}

#[tokio::test]
async fn fetch_without_selected_address_is_a_no_op() {
    let app = app().await;
    app.auth.set_access_token(Some("tok1".into()));

    app.pastes.fetch().await.unwrap();
    assert_eq!(app.paste_api.fetches(), 0);
}

#[tokio::test]
async fn login_then_fetch_caches_exactly_the_batch() {
    let app = app().await;
    app.paste_api.seed("alice", vec![paste("notes"), paste("todo")]);
    app.paste_api.seed("alice-art", vec![paste("sketch")]);

    app.login().await;
    assert_eq!(app.session.address().selected(), Some("alice"));

    app.pastes.fetch().await.unwrap();
    eventually("pastes to be cached", || async {
        titles(&app).await == ["alice/notes", "alice/todo"]
    })
    .await;
}

#[tokio::test]
async fn refetch_prunes_items_removed_on_the_server() {
    let app = app().await;
    app.paste_api.seed("alice", vec![paste("1"), paste("2")]);
    app.login().await;

    app.pastes.fetch().await.unwrap();
    eventually("initial batch", || async { titles(&app).await.len() == 2 }).await;

    app.paste_api.seed("alice", vec![paste("1"), paste("3")]);
    app.pastes.fetch().await.unwrap();
    eventually("reconciled batch", || async {
        titles(&app).await == ["alice/1", "alice/3"]
    })
    .await;
}

#[tokio::test]
async fn logout_purges_every_feature() {
    let app = app().await;
    app.paste_api.seed("alice", vec![paste("notes")]);
    app.purl_api.seed("alice", vec![purl("blog"), purl("cv")]);
    app.login().await;

    app.pastes.fetch().await.unwrap();
    app.purls.fetch().await.unwrap();
    eventually("both caches filled", || async {
        app.pastes.cache().count(EntityFilter::All).await.unwrap() == 1
            && app.purls.cache().count(EntityFilter::All).await.unwrap() == 2
    })
    .await;

    app.auth.set_access_token(None);

    eventually("caches purged", || async {
        app.pastes.cache().count(EntityFilter::All).await.unwrap() == 0
            && app.purls.cache().count(EntityFilter::All).await.unwrap() == 0
    })
    .await;
    eventually("session cleared", || async { !app.session.session().is_available() }).await;
}

#[tokio::test]
async fn batches_for_other_addresses_are_dropped() {
    let app = app().await;
    app.paste_api.seed("alice-art", vec![paste("sketch")]);
    app.login().await;

    // Delivered on the channel, but "alice" is the selected address.
    app.pastes
        .remote()
        .fetch("tok1", "alice-art")
        .await
        .unwrap();
    app.paste_api.seed("alice", vec![paste("marker")]);
    app.pastes.fetch().await.unwrap();

    eventually("marker batch", || async { titles(&app).await == ["alice/marker"] }).await;
}

#[tokio::test]
async fn switching_address_syncs_the_new_one_and_keeps_the_old() {
    let app = app().await;
    app.paste_api.seed("alice", vec![paste("a")]);
    app.paste_api.seed("alice-art", vec![paste("b")]);
    app.login().await;

    app.pastes.fetch().await.unwrap();
    eventually("alice synced", || async { titles(&app).await.len() == 1 }).await;

    app.session.set_selected_address("alice-art").await;
    app.pastes.fetch().await.unwrap();
    eventually("alice-art synced", || async {
        titles(&app).await == ["alice/a", "alice-art/b"]
    })
    .await;

    let visible = app.pastes.items(SortOrder::Newest).await.unwrap();
    assert_eq!(visible.len(), 1);
    assert_eq!(visible[0].address, "alice-art");
}

#[tokio::test]
async fn create_refetches_and_delete_removes_locally() {
    let app = app().await;
    app.login().await;

    app.pastes
        .create(&PasteDraft {
            title: "fresh".into(),
            content: "hello".into(),
            listed: true,
        })
        .await
        .unwrap();
    eventually("created paste cached", || async {
        titles(&app).await == ["alice/fresh"]
    })
    .await;

    app.pastes.delete("fresh").await.unwrap();
    assert!(titles(&app).await.is_empty());
}

#[tokio::test]
async fn update_refetches() {
    let app = app().await;
    app.purl_api.seed("alice", vec![purl("blog")]);
    app.login().await;

    app.purls
        .update(
            "blog",
            &PurlDraft {
                name: "blog".into(),
                url: "https://blog.example.com".into(),
                listed: true,
            },
        )
        .await
        .unwrap();

    eventually("updated purl cached", || async {
        let rows = app
            .purls
            .cache()
            .query(EntityFilter::All, SortOrder::ById)
            .await
            .unwrap();
        rows.len() == 1 && rows[0].entity.url == "https://blog.example.com"
    })
    .await;
}

#[tokio::test]
async fn network_failures_propagate_to_the_caller() {
    let app = app().await;
    app.login().await;
    app.paste_api.offline.store(true, Ordering::SeqCst);

    let err = app.pastes.fetch().await.unwrap_err();
    assert!(err.is_network());

    let err = app.pastes.delete("anything").await.unwrap_err();
    assert!(matches!(err, SyncError::Remote { status: 503, .. }));
}

#[tokio::test]
async fn write_commands_require_a_session() {
    let app = app().await;
    let err = app.pastes.delete("x").await.unwrap_err();
    assert!(matches!(err, SyncError::MissingToken));

    app.auth.set_access_token(Some("tok1".into()));
    let err = app.pastes.delete("x").await.unwrap_err();
    assert!(matches!(err, SyncError::NoAddressSelected));
}

#[tokio::test]
async fn local_delete_failure_is_not_propagated() {
    let auth = Arc::new(AuthStateStore::load(Arc::new(MemorySecureStore::new())));
    let session = Arc::new(
        SessionStateStore::load(
            Arc::new(MemoryArchive::<CurrentAccount>::new()),
            Arc::new(MemoryArchive::with_value("alice".to_string())),
        )
        .await,
    );
    auth.set_access_token(Some("tok1".into()));

    struct BrokenDeletes(MemoryEntityCache<Paste>);

    #[async_trait]
    impl LocalCache<Paste> for BrokenDeletes {
        async fn upsert(
            &self,
            item: homebase_store::Cached<Paste>,
        ) -> homebase_store::StoreResult<()> {
            self.0.upsert(item).await
        }
        async fn delete_where(&self, _filter: EntityFilter) -> homebase_store::StoreResult<usize> {
            Err(homebase_store::StoreError::WriteFailed {
                target: "pastes".into(),
                reason: "read-only".into(),
            })
        }
        async fn replace(
            &self,
            batch: homebase_store::ReconcileBatch<Paste>,
        ) -> homebase_store::StoreResult<homebase_store::ReconcileReport> {
            self.0.replace(batch).await
        }
        async fn query(
            &self,
            filter: EntityFilter,
            sort: SortOrder,
        ) -> homebase_store::StoreResult<Vec<homebase_store::Cached<Paste>>>
        {
            self.0.query(filter, sort).await
        }
    }

    let repo = SyncRepository::new(
        Arc::new(RemoteSource::new(ScriptedApi::<Pastes>::new())),
        Arc::new(BrokenDeletes(MemoryEntityCache::new())),
        auth,
        session,
    );

    repo.delete("anything").await.unwrap();
    repo.shutdown().await;
}

// ═══════════════════════════════════════════════════════════════════════
//  Teardown
// ═══════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn shutdown_deregisters_and_stops_writing() {
    let app = app().await;
    app.login().await;

    let remote = app.pastes.remote().clone();
    let cache = app.pastes.cache().clone();
    assert_eq!(remote.subscriber_count(), 1);

    app.pastes.shutdown().await;
    assert_eq!(remote.subscriber_count(), 0);

    app.paste_api.seed("alice", vec![paste("late")]);
    remote.fetch("tok1", "alice").await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(cache.count(EntityFilter::All).await.unwrap(), 0);
}

#[tokio::test]
async fn dropping_a_repository_deregisters_it() {
    let app = app().await;
    let remote = app.purls.remote().clone();
    assert_eq!(remote.subscriber_count(), 1);

    drop(app.purls);
    eventually("subscription released", || {
        let remote = remote.clone();
        async move { remote.subscriber_count() == 0 }
    })
    .await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn dropping_mid_reconcile_never_leaves_a_partial_batch() {
    let app = app().await;
    let big: Vec<PasteResponse> = (0..300).map(|i| paste(&format!("p{i}"))).collect();
    app.paste_api.seed("alice", big);
    app.login().await;

    let cache = app.pastes.cache().clone();
    app.pastes.fetch().await.unwrap();
    drop(app.pastes);

    tokio::time::sleep(Duration::from_millis(200)).await;
    let cached = cache.count(EntityFilter::All).await.unwrap();
    assert!(cached == 0 || cached == 300, "partial batch of {cached} items");
}

#[tokio::test]
async fn logout_clears_the_replayed_batch() {
    let app = app().await;
    app.paste_api.seed("alice", vec![paste("old")]);
    app.login().await;

    app.pastes.fetch().await.unwrap();
    eventually("batch cached", || async { titles(&app).await == ["alice/old"] }).await;
    let remote = app.pastes.remote().clone();
    assert!(remote.latest().is_some());

    app.auth.set_access_token(None);
    eventually("replay cleared", || async { remote.latest().is_none() }).await;
    eventually("session cleared", || async { !app.session.session().is_available() }).await;

    // Same token and address again: a repository created now must not be
    // handed the previous session's batch.
    app.login().await;
    let cache = Arc::new(MemoryEntityCache::<Paste>::new());
    let late = SyncRepository::new(
        remote.clone(),
        cache.clone(),
        app.auth.clone(),
        app.session.clone(),
    );
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(cache.keys().is_empty());

    late.shutdown().await;
}
