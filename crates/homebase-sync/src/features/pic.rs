//! Picture gallery.

use serde::{Deserialize, Serialize};

use homebase_store::Entity;

use super::de;
use crate::feature::{Feature, FeatureEndpoint, Route, Verb};

#[derive(Debug, Clone, Deserialize)]
pub struct PicResponse {
    pub id: String,
    pub url: String,
    #[serde(default)]
    pub mime: String,
    #[serde(deserialize_with = "de::int", default)]
    pub size: i64,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(deserialize_with = "de::int", default)]
    pub created: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pic {
    pub id: String,
    pub url: String,
    pub mime: String,
    pub size: i64,
    pub description: String,
    pub created: i64,
}

impl Entity for Pic {
    const KIND: &'static str = "pics";

    fn local_id(&self) -> String {
        self.id.clone()
    }

    fn sort_key(&self) -> i64 {
        self.created
    }
}

/// Only the description of an uploaded picture can be edited.
#[derive(Debug, Clone, Serialize)]
pub struct PicDraft {
    pub description: String,
}

pub struct Pics;

impl Feature for Pics {
    type Response = PicResponse;
    type Draft = PicDraft;
    type Entity = Pic;

    const ENDPOINT: FeatureEndpoint = FeatureEndpoint {
        list: "/address/{address}/pics",
        field: "pics",
        create: None,
        update: Some(Route::new(Verb::Post, "/address/{address}/pics/{id}")),
        delete: Some(Route::new(Verb::Delete, "/address/{address}/pics/{id}")),
    };

    fn to_entity(r: PicResponse) -> Pic {
        Pic {
            id: r.id,
            url: r.url,
            mime: r.mime,
            size: r.size,
            description: r.description.unwrap_or_default(),
            created: r.created,
        }
    }
}
