//! HTTP implementation of the remote APIs.
//!
//! [`HttpClient`] holds the shared `reqwest::Client` (bearer auth, timeout,
//! base URL).  [`HttpApi<F>`] implements [`FeatureApi`] for any feature from
//! its [`FeatureEndpoint`]; [`HttpAccountApi`] implements [`AccountApi`].
//!
//! Responses use a `{"request": {...}, "response": {...}}` envelope; list
//! items live under `response.<field>`.

use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use homebase_auth::{AccountAddress, CurrentAccount};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, instrument, warn};
use url::Url;

use crate::account::AccountApi;
use crate::error::{Result, SyncError};
use crate::feature::{Feature, Route, Verb, path_segments};
use crate::remote::{DraftOf, FeatureApi, ResponseOf};

/// Default API base URL.
pub const DEFAULT_BASE_URL: &str = "https://api.omg.lol";

/// Shared transport for every remote API.
pub struct HttpClient {
    client: reqwest::Client,
    base_url: Url,
}

impl HttpClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let base_url = Url::parse(base_url).map_err(|e| SyncError::InvalidConfig {
            reason: format!("invalid api base url `{base_url}`: {e}"),
        })?;
        if base_url.cannot_be_a_base() {
            return Err(SyncError::InvalidConfig {
                reason: format!("api base url `{base_url}` cannot have a path"),
            });
        }

        let client = reqwest::Client::builder()
            .user_agent(concat!("homebase/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()?;

        Ok(Self { client, base_url })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Base URL with `segments` appended, each percent-encoded.
    fn url(&self, segments: &[String]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    /// Send one request and return the decoded JSON body (`Null` if empty).
    async fn send(
        &self,
        verb: reqwest::Method,
        url: Url,
        token: &str,
        body: Option<Value>,
    ) -> Result<Value> {
        debug!(method = %verb, url = %url, "api request");

        let mut request = self.client.request(verb, url).bearer_auth(token);
        if let Some(body) = body {
            request = request.json(&body);
        }

        let response = request.send().await?;
        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            let message = error_message(&text).unwrap_or_else(|| {
                status
                    .canonical_reason()
                    .unwrap_or("request failed")
                    .to_string()
            });
            warn!(status = status.as_u16(), message = %message, "api request failed");
            return Err(SyncError::Remote {
                status: status.as_u16(),
                message,
            });
        }

        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&text).map_err(|e| SyncError::Decode {
            reason: format!("invalid json: {e}"),
        })
    }

    async fn get(&self, segments: &[String], token: &str) -> Result<Value> {
        self.send(reqwest::Method::GET, self.url(segments), token, None)
            .await
    }
}

fn method(verb: Verb) -> reqwest::Method {
    match verb {
        Verb::Post => reqwest::Method::POST,
        Verb::Put => reqwest::Method::PUT,
        Verb::Patch => reqwest::Method::PATCH,
        Verb::Delete => reqwest::Method::DELETE,
    }
}

/// `response.message` of an error body, if there is one.
fn error_message(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    value
        .pointer("/response/message")
        .or_else(|| value.get("message"))
        .and_then(Value::as_str)
        .map(String::from)
}

/// The `response` envelope of a successful body.
fn envelope(body: &Value) -> Result<&Value> {
    body.get("response").ok_or_else(|| SyncError::Decode {
        reason: "missing `response` envelope".to_string(),
    })
}

/// Items under `response.<field>`.  An object is a one-item list; an absent
/// or null field is an empty list.
fn list_items<R: DeserializeOwned>(body: &Value, field: &str) -> Result<Vec<R>> {
    let decode = |e: serde_json::Error| SyncError::Decode {
        reason: format!("`{field}`: {e}"),
    };
    match envelope(body)?.get(field) {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(items @ Value::Array(_)) => Vec::<R>::deserialize(items).map_err(decode),
        Some(item @ Value::Object(_)) => Ok(vec![R::deserialize(item).map_err(decode)?]),
        Some(other) => Err(SyncError::Decode {
            reason: format!("`{field}` is neither a list nor an object: {other}"),
        }),
    }
}

// ---------------------------------------------------------------------------
// Feature API
// ---------------------------------------------------------------------------

/// [`FeatureApi`] for feature `F` over HTTP.
pub struct HttpApi<F> {
    client: Arc<HttpClient>,
    _feature: PhantomData<fn() -> F>,
}

impl<F: Feature> HttpApi<F> {
    pub fn new(client: Arc<HttpClient>) -> Self {
        Self {
            client,
            _feature: PhantomData,
        }
    }

    fn route(route: Option<Route>, operation: &'static str) -> Result<Route> {
        route.ok_or(SyncError::Unsupported {
            feature: F::name(),
            operation,
        })
    }

    async fn write(
        &self,
        route: Route,
        token: &str,
        address: &str,
        id: Option<&str>,
        body: Option<Value>,
    ) -> Result<()> {
        let url = self.client.url(&path_segments(route.path, address, id));
        self.client
            .send(method(route.verb), url, token, body)
            .await
            .map(drop)
    }
}

#[async_trait]
impl<F: Feature> FeatureApi for HttpApi<F> {
    type Feature = F;

    #[instrument(skip(self, token), fields(feature = F::name()))]
    async fn fetch(&self, token: &str, address: &str) -> Result<Vec<ResponseOf<Self>>> {
        let endpoint = F::ENDPOINT;
        let body = self
            .client
            .get(&path_segments(endpoint.list, address, None), token)
            .await?;
        list_items(&body, endpoint.field)
    }

    async fn create(&self, token: &str, address: &str, draft: &DraftOf<Self>) -> Result<()> {
        let route = Self::route(F::ENDPOINT.create, "create")?;
        let body = serde_json::to_value(draft).map_err(|e| SyncError::Decode {
            reason: format!("draft: {e}"),
        })?;
        self.write(route, token, address, None, Some(body)).await
    }

    async fn update(
        &self,
        token: &str,
        address: &str,
        id: &str,
        draft: &DraftOf<Self>,
    ) -> Result<()> {
        let route = Self::route(F::ENDPOINT.update, "update")?;
        let mut body = serde_json::to_value(draft).map_err(|e| SyncError::Decode {
            reason: format!("draft: {e}"),
        })?;
        // Routes without an `{id}` segment identify the item in the body.
        if let Value::Object(fields) = &mut body {
            fields
                .entry("id")
                .or_insert_with(|| Value::String(id.to_string()));
        }
        self.write(route, token, address, Some(id), Some(body)).await
    }

    async fn delete(&self, token: &str, address: &str, id: &str) -> Result<()> {
        let route = Self::route(F::ENDPOINT.delete, "delete")?;
        self.write(route, token, address, Some(id), None).await
    }
}

// ---------------------------------------------------------------------------
// Account API
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
struct Timestamp {
    #[serde(deserialize_with = "crate::features::de::int", default)]
    unix_epoch_time: i64,
}

impl Timestamp {
    fn to_datetime(&self) -> Option<DateTime<Utc>> {
        (self.unix_epoch_time > 0)
            .then(|| DateTime::from_timestamp(self.unix_epoch_time, 0))
            .flatten()
    }
}

#[derive(Debug, Deserialize)]
struct AccountInfo {
    #[serde(default)]
    name: String,
    #[serde(default)]
    email: String,
    #[serde(default)]
    created: Timestamp,
}

#[derive(Debug, Deserialize)]
struct AddressInfo {
    address: String,
    #[serde(default)]
    registration: Timestamp,
    #[serde(default)]
    expiration: Option<Expiration>,
}

#[derive(Debug, Deserialize)]
struct Expiration {
    #[serde(deserialize_with = "crate::features::de::flag", default)]
    will_expire: bool,
    #[serde(flatten)]
    at: Timestamp,
}

impl AddressInfo {
    fn into_address(self) -> AccountAddress {
        let registered = self.registration.to_datetime().unwrap_or_default();
        let address = AccountAddress::new(self.address, registered);
        match self.expiration {
            Some(exp) if exp.will_expire => match exp.at.to_datetime() {
                Some(at) => address.expiring(at),
                None => address,
            },
            _ => address,
        }
    }
}

/// [`AccountApi`] over HTTP for the account registered under `email`.
pub struct HttpAccountApi {
    client: Arc<HttpClient>,
    email: String,
}

impl HttpAccountApi {
    pub fn new(client: Arc<HttpClient>, email: impl Into<String>) -> Self {
        Self {
            client,
            email: email.into(),
        }
    }
}

#[async_trait]
impl AccountApi for HttpAccountApi {
    #[instrument(skip(self, token))]
    async fn fetch_account(&self, token: &str) -> Result<CurrentAccount> {
        let account = |leaf: &str| vec!["account".to_string(), self.email.clone(), leaf.to_string()];

        let info_body = self.client.get(&account("info"), token).await?;
        let info = AccountInfo::deserialize(envelope(&info_body)?).map_err(|e| {
            SyncError::Decode {
                reason: format!("account info: {e}"),
            }
        })?;

        let addresses_body = self.client.get(&account("addresses"), token).await?;
        let addresses = Vec::<AddressInfo>::deserialize(envelope(&addresses_body)?).map_err(
            |e| SyncError::Decode {
                reason: format!("account addresses: {e}"),
            },
        )?;

        let email = if info.email.is_empty() {
            self.email.clone()
        } else {
            info.email
        };
        Ok(CurrentAccount::new(
            info.name,
            email,
            info.created.to_datetime().unwrap_or_default(),
            addresses.into_iter().map(AddressInfo::into_address).collect(),
        ))
    }
}
