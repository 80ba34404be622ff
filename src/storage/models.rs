use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One captured selection plus its annotations. Immutable once appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Clipping {
    pub text: String,
    pub note: String,
    pub tags: Vec<String>,
    pub date: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Site {
    pub identity: String,
    pub title: String,
    pub url: String,
    pub created: DateTime<Utc>,
    pub clippings: Vec<Clipping>,
}

/// Every site keyed by identity. `BTreeMap` keeps iteration in ascending
/// lexicographic identity order, which rendering relies on.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Collection {
    pub sites: BTreeMap<String, Site>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CollectionStats {
    pub sites: usize,
    pub clippings: usize,
    pub tags: usize,
    pub newest: Option<DateTime<Utc>>,
}

impl Collection {
    pub fn is_empty(&self) -> bool {
        self.sites.is_empty()
    }

    pub fn site(&self, identity: &str) -> Option<&Site> {
        self.sites.get(identity)
    }

    /// Every tag used on any clipping, de-duplicated and sorted.
    pub fn all_tags(&self) -> Vec<String> {
        self.sites
            .values()
            .flat_map(|site| site.clippings.iter())
            .flat_map(|clip| clip.tags.iter())
            .filter(|tag| !tag.is_empty())
            .cloned()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    pub fn stats(&self) -> CollectionStats {
        let clippings = self.sites.values().map(|s| s.clippings.len()).sum();
        let newest = self
            .sites
            .values()
            .flat_map(|s| s.clippings.iter().map(|c| c.date))
            .max();
        CollectionStats {
            sites: self.sites.len(),
            clippings,
            tags: self.all_tags().len(),
            newest,
        }
    }
}

/// Persistable reference to a user-authorized export folder. Only the
/// folder authority that issued it interprets `path`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FolderHandle {
    pub name: String,
    pub path: PathBuf,
}

/// Incoming save request. Every field is optional and wrong-typed fields
/// are read as absent, so any payload shape is accepted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClippingPayload {
    #[serde(default, deserialize_with = "lenient::string", skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, deserialize_with = "lenient::string", skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(default, deserialize_with = "lenient::tags", skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(default, deserialize_with = "lenient::string", skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, deserialize_with = "lenient::string", skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, deserialize_with = "lenient::timestamp", skip_serializing_if = "Option::is_none")]
    pub date: Option<DateTime<Utc>>,
}

pub(crate) mod lenient {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer};
    use serde_json::Value;

    use super::ClippingPayload;

    /// A payload that is not an object is read as an empty one.
    pub fn payload<'de, D: Deserializer<'de>>(d: D) -> Result<ClippingPayload, D::Error> {
        Ok(match Value::deserialize(d)? {
            value @ Value::Object(_) => ClippingPayload::deserialize(value).unwrap_or_default(),
            _ => ClippingPayload::default(),
        })
    }

    pub fn string<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
        Ok(match Value::deserialize(d)? {
            Value::String(s) => Some(s),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
    }

    pub fn tags<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Vec<String>>, D::Error> {
        Ok(match Value::deserialize(d)? {
            Value::Array(items) => Some(
                items
                    .into_iter()
                    .filter_map(|v| match v {
                        Value::String(s) => Some(s),
                        _ => None,
                    })
                    .collect(),
            ),
            _ => None,
        })
    }

    pub fn timestamp<'de, D: Deserializer<'de>>(
        d: D,
    ) -> Result<Option<DateTime<Utc>>, D::Error> {
        Ok(match Value::deserialize(d)? {
            Value::String(s) => DateTime::parse_from_rfc3339(&s)
                .ok()
                .map(|dt| dt.with_timezone(&Utc)),
            _ => None,
        })
    }
}
