//! The /now page.
//!
//! Every address has at most one now page, so the entity id is fixed and a
//! list read returns a single object.

use serde::{Deserialize, Serialize};

use homebase_store::Entity;

use super::de;
use crate::feature::{Feature, FeatureEndpoint, Route, Verb};

/// Id of the only now page of an address.
pub const NOW_PAGE_ID: &str = "now";

#[derive(Debug, Clone, Deserialize)]
pub struct NowResponse {
    #[serde(default)]
    pub content: String,
    #[serde(deserialize_with = "de::int", default)]
    pub updated: i64,
    #[serde(deserialize_with = "de::flag", default)]
    pub listed: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NowPage {
    pub content: String,
    pub updated: i64,
    pub listed: bool,
}

impl Entity for NowPage {
    const KIND: &'static str = "now";

    fn local_id(&self) -> String {
        NOW_PAGE_ID.to_string()
    }

    fn sort_key(&self) -> i64 {
        self.updated
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct NowDraft {
    pub content: String,
    pub listed: bool,
}

pub struct NowPageFeature;

impl Feature for NowPageFeature {
    type Response = NowResponse;
    type Draft = NowDraft;
    type Entity = NowPage;

    const ENDPOINT: FeatureEndpoint = FeatureEndpoint {
        list: "/address/{address}/now",
        field: "now",
        create: Some(Route::new(Verb::Post, "/address/{address}/now")),
        update: Some(Route::new(Verb::Post, "/address/{address}/now")),
        delete: None,
    };

    fn to_entity(r: NowResponse) -> NowPage {
        NowPage {
            content: r.content,
            updated: r.updated,
            listed: r.listed,
        }
    }
}
