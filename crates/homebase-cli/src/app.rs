//! Wiring of stores, repositories and the HTTP client behind each command.

use std::sync::Arc;

use anyhow::{Context, Result, bail};
use chrono::Utc;
use homebase_auth::{
    Account, Address, AuthStateStore, CurrentAccount, OAuthFlow, SessionStateStore,
    generate_state, verify_state,
};
use homebase_store::{
    Database, Entity, EntityFilter, LocalCache, SortOrder, SqliteArchive, SqliteEntityCache,
};
use homebase_sync::features::{NowPageFeature, Pastes, Pics, Purls, Statuses, WeblogEntries};
use homebase_sync::{
    AccountRepository, Feature, HttpAccountApi, HttpApi, HttpClient, RemoteSource, SyncRepository,
};
use homebase_vault::{FileKeychain, SecureStore, Vault};
use tracing::{debug, info, warn};

use crate::config::AppConfig;

/// Vault key of the CSRF state issued with the last authorization URL.
const OAUTH_STATE_KEY: &str = "homebase.oauth_state";

/// What to do with one feature.
#[derive(Debug, Clone)]
pub enum FeatureAction {
    Sync,
    List(SortOrder),
    Delete(String),
    Count,
}

pub struct App {
    config: AppConfig,
    db: Database,
    vault: Arc<Vault>,
    auth: Arc<AuthStateStore>,
    session: Arc<SessionStateStore>,
    client: Arc<HttpClient>,
}

impl App {
    /// Open the data directory: database, vault and both state stores.
    pub async fn open(config: AppConfig) -> Result<Self> {
        let data_dir = config.storage.data_dir.clone();
        std::fs::create_dir_all(&data_dir)
            .with_context(|| format!("failed to create data directory {}", data_dir.display()))?;

        let db = Database::open_and_migrate(config.storage.database_path())
            .await
            .context("failed to open database")?;

        let master_key = FileKeychain::new(FileKeychain::default_path(&data_dir))
            .load_or_create()
            .context("failed to load master key")?;
        let vault = Arc::new(
            Vault::open(config.storage.vault_path(), master_key).context("failed to open vault")?,
        );

        let auth = Arc::new(AuthStateStore::load(vault.clone()));
        let session = Arc::new(
            SessionStateStore::load(
                Arc::new(SqliteArchive::<CurrentAccount>::new(db.clone(), "account")),
                Arc::new(SqliteArchive::<String>::new(db.clone(), "selected_address")),
            )
            .await,
        );

        let client = Arc::new(
            HttpClient::new(&config.api.base_url, config.api.timeout())
                .context("invalid api configuration")?,
        );

        debug!(data_dir = %data_dir.display(), "app opened");
        Ok(Self {
            config,
            db,
            vault,
            auth,
            session,
            client,
        })
    }

    // -----------------------------------------------------------------------
    // Login / logout
    // -----------------------------------------------------------------------

    /// Build the authorization URL and remember its state.
    pub fn begin_login(&self) -> Result<String> {
        let flow = self.oauth()?;
        let state = generate_state()?;
        self.vault
            .write(OAUTH_STATE_KEY, &state)
            .context("failed to remember oauth state")?;
        Ok(flow.authorization_url(&state)?)
    }

    /// Exchange an authorization code, then sign in with the resulting token.
    pub async fn login_with_code(&self, code: &str, state: Option<&str>) -> Result<()> {
        let flow = self.oauth()?;

        if let Some(expected) = self.vault.read(OAUTH_STATE_KEY)? {
            let returned = state.context("--state is required to finish this login")?;
            verify_state(&expected, returned)?;
        }

        let token = flow.exchange_code(code).await?;
        if let Err(e) = self.vault.delete(OAUTH_STATE_KEY) {
            warn!(error = %e, "failed to forget oauth state");
        }
        self.login_with_token(token).await
    }

    /// Store `token` and synchronize the account.
    pub async fn login_with_token(&self, token: String) -> Result<()> {
        self.auth.set_access_token(Some(token));
        info!("logged in");

        if self.config.api.email.is_some() {
            self.sync_account().await?;
        } else {
            warn!("no account email configured, skipping account sync");
        }
        Ok(())
    }

    /// Sign out.  Every feature cache and the session are cleared by the
    /// repositories' logout handling before this returns.
    pub async fn logout(&self) -> Result<()> {
        let account = self.account_repository().ok();
        let repos = self.all_repositories();

        self.auth.set_access_token(None);

        if let Some(account) = account {
            account.shutdown().await;
        } else {
            self.session.clear_session().await;
        }
        repos.shutdown().await;
        info!("logged out");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Session
    // -----------------------------------------------------------------------

    pub async fn sync_account(&self) -> Result<()> {
        let repo = self.account_repository()?;
        let result = repo.fetch().await;
        repo.shutdown().await;
        result.context("failed to fetch account")?;
        Ok(())
    }

    /// Select `name`, which must be one of the synchronized account's
    /// addresses when an account is known.
    pub async fn select_address(&self, name: &str) -> Result<()> {
        if let Account::Present(account) = self.session.account()
            && !account.owns(name)
        {
            bail!("address `{name}` does not belong to {}", account.email());
        }
        self.session.set_selected_address(name).await;

        match self.session.address() {
            Address::Selected(selected) if selected == name => Ok(()),
            _ => bail!("failed to persist the selected address"),
        }
    }

    pub fn is_logged_in(&self) -> bool {
        self.auth.is_logged_in()
    }

    pub fn account(&self) -> Account {
        self.session.account()
    }

    pub fn address(&self) -> Address {
        self.session.address()
    }

    /// Render the login state, account, addresses and cache counts.
    pub async fn status(&self) -> Result<String> {
        let mut out = String::new();
        let login = if self.is_logged_in() { "logged in" } else { "logged out" };
        out.push_str(&format!("  Login:     {login}\n"));

        let selected = self.address();
        match self.account() {
            Account::NotSynchronized => out.push_str("  Account:   not synchronized\n"),
            Account::Present(account) => {
                out.push_str(&format!("  Account:   {} <{}>\n", account.name(), account.email()));
                let now = Utc::now();
                for address in account.addresses() {
                    let marker = if selected.selected() == Some(address.address.as_str()) {
                        "*"
                    } else {
                        " "
                    };
                    let expiry = if address.is_expired_at(now) { " (expired)" } else { "" };
                    out.push_str(&format!("   {marker} {}{expiry}\n", address.address));
                }
            }
        }
        out.push_str(&format!("  Address:   {selected}\n"));

        for name in homebase_sync::features::FEATURE_NAMES {
            let count = self.count_feature(name).await?;
            out.push_str(&format!("  {name:<10} {count}\n"));
        }
        Ok(out)
    }

    // -----------------------------------------------------------------------
    // Features
    // -----------------------------------------------------------------------

    /// Run `action` on the feature called `name`.  Returns the lines to print.
    pub async fn feature(&self, name: &str, action: FeatureAction) -> Result<Vec<String>> {
        match name {
            "statuses" => self.run::<Statuses>(action).await,
            "purls" => self.run::<Purls>(action).await,
            "pastes" => self.run::<Pastes>(action).await,
            "weblog" => self.run::<WeblogEntries>(action).await,
            "pics" => self.run::<Pics>(action).await,
            "now" => self.run::<NowPageFeature>(action).await,
            other => bail!("unknown feature `{other}`"),
        }
    }

    async fn count_feature(&self, name: &str) -> Result<usize> {
        let lines = self.feature(name, FeatureAction::Count).await?;
        Ok(lines.first().and_then(|l| l.parse().ok()).unwrap_or(0))
    }

    async fn run<F: Feature>(&self, action: FeatureAction) -> Result<Vec<String>> {
        match action {
            FeatureAction::Count => {
                let Some(address) = self.address().selected().map(String::from) else {
                    return Ok(vec!["0".into()]);
                };
                let cache = SqliteEntityCache::<F::Entity>::new(self.db.clone());
                let n = cache.count(EntityFilter::Address(address)).await?;
                Ok(vec![n.to_string()])
            }
            FeatureAction::List(sort) => {
                let repo = self.repository::<F>();
                let items = repo.items(sort).await;
                repo.shutdown().await;
                items?
                    .iter()
                    .map(|item| {
                        let json = serde_json::to_string(&item.entity)?;
                        Ok(format!("{}\t{json}", item.entity.local_id()))
                    })
                    .collect()
            }
            FeatureAction::Sync => {
                self.require_session()?;
                let repo = self.repository::<F>();
                let fetched = repo.fetch().await;
                let items = repo.cache().clone();
                repo.shutdown().await;
                fetched.with_context(|| format!("failed to sync {}", F::name()))?;

                let address = self.address().selected().map(String::from).unwrap_or_default();
                let n = items.count(EntityFilter::Address(address.clone())).await?;
                Ok(vec![format!("{n} {} cached for {address}", F::name())])
            }
            FeatureAction::Delete(id) => {
                let repo = self.repository::<F>();
                let result = repo.delete(&id).await;
                repo.shutdown().await;
                result.with_context(|| format!("failed to delete {} `{id}`", F::name()))?;
                Ok(vec![format!("deleted {id}")])
            }
        }
    }

    fn require_session(&self) -> Result<()> {
        if !self.is_logged_in() {
            bail!("not logged in; run `homebase login` first");
        }
        if !self.address().is_set() {
            bail!("no address selected; run `homebase address <name>` first");
        }
        Ok(())
    }

    fn repository<F: Feature>(&self) -> SyncRepository<HttpApi<F>> {
        SyncRepository::new(
            Arc::new(RemoteSource::new(HttpApi::<F>::new(self.client.clone()))),
            Arc::new(SqliteEntityCache::<F::Entity>::new(self.db.clone())),
            self.auth.clone(),
            self.session.clone(),
        )
    }

    fn all_repositories(&self) -> Repositories {
        Repositories {
            statuses: self.repository(),
            purls: self.repository(),
            pastes: self.repository(),
            weblog: self.repository(),
            pics: self.repository(),
            now: self.repository(),
        }
    }

    fn account_repository(&self) -> Result<AccountRepository> {
        let email = self
            .config
            .api
            .email
            .clone()
            .context("no account email configured (set api.email or pass --email)")?;
        let api = HttpAccountApi::new(self.client.clone(), email);
        Ok(AccountRepository::new(
            Arc::new(api),
            self.auth.clone(),
            self.session.clone(),
        ))
    }

    fn oauth(&self) -> Result<OAuthFlow> {
        let config = self
            .config
            .oauth
            .clone()
            .context("oauth is not configured; add an [oauth] section or use --token")?;
        config.validate()?;
        Ok(OAuthFlow::new(config))
    }
}

/// One live repository per feature, used to fan a logout out to every cache.
struct Repositories {
    statuses: SyncRepository<HttpApi<Statuses>>,
    purls: SyncRepository<HttpApi<Purls>>,
    pastes: SyncRepository<HttpApi<Pastes>>,
    weblog: SyncRepository<HttpApi<WeblogEntries>>,
    pics: SyncRepository<HttpApi<Pics>>,
    now: SyncRepository<HttpApi<NowPageFeature>>,
}

impl Repositories {
    async fn shutdown(self) {
        tokio::join!(
            self.statuses.shutdown(),
            self.purls.shutdown(),
            self.pastes.shutdown(),
            self.weblog.shutdown(),
            self.pics.shutdown(),
            self.now.shutdown(),
        );
    }
}
