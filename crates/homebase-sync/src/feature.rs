//! Feature descriptors.
//!
//! A [`Feature`] ties together the three types one synchronized collection
//! needs: the server's response item, the draft sent on create/update, and
//! the cached [`Entity`].  The same generic repository, remote source and
//! HTTP client serve every feature; only this trait differs.

use serde::Serialize;
use serde::de::DeserializeOwned;

use homebase_store::Entity;

/// HTTP verb of a write route.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verb {
    Post,
    Put,
    Patch,
    Delete,
}

/// A write endpoint: verb plus path template.
///
/// Templates contain `{address}` and, for item routes, `{id}` placeholders.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Route {
    pub verb: Verb,
    pub path: &'static str,
}

impl Route {
    pub const fn new(verb: Verb, path: &'static str) -> Self {
        Self { verb, path }
    }
}

/// Where a feature lives on the remote API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeatureEndpoint {
    /// Path template of the list read.
    pub list: &'static str,
    /// Key under the `response` envelope holding the items.  A JSON object
    /// there is treated as a single-item list.
    pub field: &'static str,
    pub create: Option<Route>,
    pub update: Option<Route>,
    pub delete: Option<Route>,
}

/// One synchronized collection.
pub trait Feature: Send + Sync + 'static {
    /// Item as returned by the server.
    type Response: DeserializeOwned + Clone + Send + Sync + 'static;
    /// Body of create and update requests.
    type Draft: Serialize + Send + Sync + 'static;
    /// Item as cached locally.
    type Entity: Entity;

    const ENDPOINT: FeatureEndpoint;

    /// Map a server item to its cached form.
    fn to_entity(response: Self::Response) -> Self::Entity;

    /// Short name used in logs and on the command line.
    fn name() -> &'static str {
        <Self::Entity as Entity>::KIND
    }
}

/// Expand `{address}` and `{id}` in a path template into URL path segments.
///
/// Each placeholder must fill a whole segment; the values are returned
/// unescaped for the URL builder to encode.
pub fn path_segments(template: &str, address: &str, id: Option<&str>) -> Vec<String> {
    template
        .split('/')
        .filter(|segment| !segment.is_empty())
        .map(|segment| match segment {
            "{address}" => address.to_string(),
            "{id}" => id.unwrap_or_default().to_string(),
            other => other.to_string(),
        })
        .collect()
}
