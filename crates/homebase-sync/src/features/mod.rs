//! Feature catalogue.
//!
//! Each feature pairs a wire shape with a cached entity and an endpoint
//! description.  Wire shapes are lenient: timestamps and flags arrive as
//! numbers or numeric strings depending on the endpoint.

pub mod now;
pub mod paste;
pub mod pic;
pub mod purl;
pub mod status;
pub mod weblog;

pub use now::{NowDraft, NowPage, NowPageFeature};
pub use paste::{Paste, PasteDraft, Pastes};
pub use pic::{Pic, PicDraft, Pics};
pub use purl::{Purl, PurlDraft, Purls};
pub use status::{Status, StatusDraft, Statuses};
pub use weblog::{WeblogDraft, WeblogEntries, WeblogEntry};

/// Feature names accepted on the command line.
pub const FEATURE_NAMES: &[&str] = &["statuses", "purls", "pastes", "weblog", "pics", "now"];

pub(crate) mod de {
    use serde::{Deserialize, Deserializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Loose {
        Int(i64),
        Float(f64),
        Bool(bool),
        Text(String),
    }

    /// Integer from a JSON number, a numeric string or null (as 0).
    pub fn int<'de, D: Deserializer<'de>>(d: D) -> Result<i64, D::Error> {
        Ok(match Option::<Loose>::deserialize(d)? {
            Some(Loose::Int(n)) => n,
            Some(Loose::Float(f)) => f as i64,
            Some(Loose::Bool(b)) => i64::from(b),
            Some(Loose::Text(s)) => s.trim().parse().unwrap_or_default(),
            None => 0,
        })
    }

    /// Flag from a JSON bool, a number, `"1"`/`"true"`, or null (as false).
    pub fn flag<'de, D: Deserializer<'de>>(d: D) -> Result<bool, D::Error> {
        Ok(match Option::<Loose>::deserialize(d)? {
            Some(Loose::Bool(b)) => b,
            Some(Loose::Int(n)) => n != 0,
            Some(Loose::Float(f)) => f != 0.0,
            Some(Loose::Text(s)) => matches!(s.trim(), "1" | "true" | "yes"),
            None => false,
        })
    }

}
