//! Weblog entries.

use serde::{Deserialize, Serialize};

use homebase_store::Entity;

use super::de;
use crate::feature::{Feature, FeatureEndpoint, Route, Verb};

#[derive(Debug, Clone, Deserialize)]
pub struct WeblogEntryResponse {
    pub entry: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub title: String,
    #[serde(deserialize_with = "de::int", default)]
    pub date: i64,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub body: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeblogEntry {
    pub id: String,
    pub title: String,
    pub location: String,
    pub date: i64,
    pub status: String,
    pub body: String,
}

impl WeblogEntry {
    pub fn is_draft(&self) -> bool {
        self.status.eq_ignore_ascii_case("draft")
    }
}

impl Entity for WeblogEntry {
    const KIND: &'static str = "weblog";

    fn local_id(&self) -> String {
        self.id.clone()
    }

    fn sort_key(&self) -> i64 {
        self.date
    }
}

/// Raw entry source, front matter included.
#[derive(Debug, Clone, Serialize)]
pub struct WeblogDraft {
    pub content: String,
}

pub struct WeblogEntries;

impl Feature for WeblogEntries {
    type Response = WeblogEntryResponse;
    type Draft = WeblogDraft;
    type Entity = WeblogEntry;

    const ENDPOINT: FeatureEndpoint = FeatureEndpoint {
        list: "/address/{address}/weblog/entries",
        field: "entries",
        create: Some(Route::new(Verb::Post, "/address/{address}/weblog/entry")),
        update: Some(Route::new(Verb::Post, "/address/{address}/weblog/entry/{id}")),
        delete: Some(Route::new(Verb::Delete, "/address/{address}/weblog/delete/{id}")),
    };

    fn to_entity(r: WeblogEntryResponse) -> WeblogEntry {
        let title = if r.title.trim().is_empty() {
            r.location.trim_start_matches('/').to_string()
        } else {
            r.title
        };
        WeblogEntry {
            id: r.entry,
            title,
            location: r.location,
            date: r.date,
            status: r.status,
            body: r.body,
        }
    }
}
