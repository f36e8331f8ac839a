//! Short links.

use serde::{Deserialize, Serialize};

use homebase_store::Entity;

use super::de;
use crate::feature::{Feature, FeatureEndpoint, Route, Verb};

#[derive(Debug, Clone, Deserialize)]
pub struct PurlResponse {
    pub name: String,
    pub url: String,
    #[serde(deserialize_with = "de::int", default)]
    pub counter: i64,
    #[serde(deserialize_with = "de::flag", default)]
    pub listed: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Purl {
    pub name: String,
    pub url: String,
    pub counter: i64,
    pub listed: bool,
}

impl Entity for Purl {
    const KIND: &'static str = "purls";

    fn local_id(&self) -> String {
        self.name.clone()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PurlDraft {
    pub name: String,
    pub url: String,
    pub listed: bool,
}

pub struct Purls;

impl Feature for Purls {
    type Response = PurlResponse;
    type Draft = PurlDraft;
    type Entity = Purl;

    // Creating over an existing name replaces it, so update reuses create.
    const ENDPOINT: FeatureEndpoint = FeatureEndpoint {
        list: "/address/{address}/purls",
        field: "purls",
        create: Some(Route::new(Verb::Post, "/address/{address}/purl")),
        update: Some(Route::new(Verb::Post, "/address/{address}/purl")),
        delete: Some(Route::new(Verb::Delete, "/address/{address}/purl/{id}")),
    };

    fn to_entity(r: PurlResponse) -> Purl {
        Purl {
            name: r.name,
            url: r.url,
            counter: r.counter,
            listed: r.listed,
        }
    }
}
