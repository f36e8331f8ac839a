//! Pastebin.

use serde::{Deserialize, Serialize};

use homebase_store::Entity;

use super::de;
use crate::feature::{Feature, FeatureEndpoint, Route, Verb};

#[derive(Debug, Clone, Deserialize)]
pub struct PasteResponse {
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(deserialize_with = "de::int", default)]
    pub modified_on: i64,
    #[serde(deserialize_with = "de::flag", default)]
    pub listed: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Paste {
    pub title: String,
    pub content: String,
    pub modified_on: i64,
    pub listed: bool,
}

impl Entity for Paste {
    const KIND: &'static str = "pastes";

    fn local_id(&self) -> String {
        self.title.clone()
    }

    fn sort_key(&self) -> i64 {
        self.modified_on
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PasteDraft {
    pub title: String,
    pub content: String,
    pub listed: bool,
}

pub struct Pastes;

impl Feature for Pastes {
    type Response = PasteResponse;
    type Draft = PasteDraft;
    type Entity = Paste;

    const ENDPOINT: FeatureEndpoint = FeatureEndpoint {
        list: "/address/{address}/pastebin",
        field: "pastebin",
        create: Some(Route::new(Verb::Post, "/address/{address}/pastebin")),
        update: Some(Route::new(Verb::Post, "/address/{address}/pastebin")),
        delete: Some(Route::new(Verb::Delete, "/address/{address}/pastebin/{id}")),
    };

    fn to_entity(r: PasteResponse) -> Paste {
        Paste {
            title: r.title,
            content: r.content,
            modified_on: r.modified_on,
            listed: r.listed,
        }
    }
}
