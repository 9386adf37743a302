//! Remote document shapes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Typename Hygraph uses for assets.
pub const ASSET_TYPENAME: &str = "Asset";

/// Content stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Stage {
    /// Draft stage.
    Draft,
    /// Published stage.
    Published,
    /// Any custom stage.
    #[serde(other)]
    Other,
}

/// A document's presence in one stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageRecord {
    /// Stage.
    pub stage: Stage,
    /// Last update in that stage.
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

/// A document (or asset) as read from the content API, aliases stripped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteDocument {
    /// Document id.
    pub id: String,
    /// Runtime type.
    #[serde(rename = "__typename")]
    pub typename: String,
    /// Last update of the draft.
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    /// Stage records, when selected.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_in_stages: Option<Vec<StageRecord>>,
    /// Remaining fields.
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl RemoteDocument {
    /// `true` for assets.
    pub fn is_asset(&self) -> bool {
        self.typename == ASSET_TYPENAME
    }

    /// The `PUBLISHED` stage record, if any.
    pub fn published_record(&self) -> Option<&StageRecord> {
        self.document_in_stages
            .as_deref()?
            .iter()
            .find(|record| record.stage == Stage::Published)
    }

    /// Reference to this document.
    pub fn reference(&self) -> DocumentRef {
        DocumentRef::new(self.typename.clone(), self.id.clone())
    }
}

/// Typename and id of a document.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DocumentRef {
    /// Runtime type.
    pub typename: String,
    /// Document id.
    pub id: String,
}

impl DocumentRef {
    /// Create a reference.
    pub fn new(typename: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            typename: typename.into(),
            id: id.into(),
        }
    }
}
