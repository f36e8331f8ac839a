//! Statuslog posts.

use serde::{Deserialize, Serialize};

use homebase_store::Entity;

use super::de;
use crate::feature::{Feature, FeatureEndpoint, Route, Verb};

/// A status as listed by the server.
#[derive(Debug, Clone, Deserialize)]
pub struct StatusResponse {
    pub id: String,
    #[serde(default)]
    pub emoji: Option<String>,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub external_url: Option<String>,
    #[serde(deserialize_with = "de::int", default)]
    pub created: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Status {
    pub id: String,
    pub emoji: String,
    pub content: String,
    pub external_url: Option<String>,
    pub created: i64,
}

impl Entity for Status {
    const KIND: &'static str = "statuses";

    fn local_id(&self) -> String {
        self.id.clone()
    }

    fn sort_key(&self) -> i64 {
        self.created
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusDraft {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub emoji: Option<String>,
    pub content: String,
}

pub struct Statuses;

impl Feature for Statuses {
    type Response = StatusResponse;
    type Draft = StatusDraft;
    type Entity = Status;

    const ENDPOINT: FeatureEndpoint = FeatureEndpoint {
        list: "/address/{address}/statuses",
        field: "statuses",
        create: Some(Route::new(Verb::Post, "/address/{address}/statuses")),
        update: Some(Route::new(Verb::Patch, "/address/{address}/statuses")),
        delete: Some(Route::new(Verb::Delete, "/address/{address}/statuses/{id}")),
    };

    fn to_entity(r: StatusResponse) -> Status {
        Status {
            id: r.id,
            emoji: r.emoji.filter(|e| !e.is_empty()).unwrap_or_else(|| "✨".to_string()),
            content: r.content,
            external_url: r.external_url.filter(|u| !u.is_empty()),
            created: r.created,
        }
    }
}
