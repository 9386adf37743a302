//! Change notifications delivered by webhook.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::document::{ASSET_TYPENAME, DocumentRef, StageRecord};
use crate::error::{HygraphError, HygraphResult};

/// Kind of change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationOperation {
    /// Document created.
    Create,
    /// Draft updated.
    Update,
    /// Published.
    Publish,
    /// Unpublished.
    Unpublish,
    /// Deleted.
    Delete,
}

impl NotificationOperation {
    /// Wire name.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Publish => "publish",
            Self::Unpublish => "unpublish",
            Self::Delete => "delete",
        }
    }
}

impl std::fmt::Display for NotificationOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Item the notification is about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationData {
    /// Runtime type.
    #[serde(rename = "__typename")]
    pub typename: String,
    /// Document id.
    pub id: String,
    /// Update time at the moment the event fired.
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    /// Stage records at the moment the event fired.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_in_stages: Option<Vec<StageRecord>>,
}

/// Webhook body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeNotification {
    /// What happened.
    pub operation: NotificationOperation,
    /// Which item.
    pub data: NotificationData,
}

impl ChangeNotification {
    /// Decode a webhook payload.
    pub fn from_value(value: serde_json::Value) -> HygraphResult<Self> {
        serde_json::from_value(value).map_err(|e| HygraphError::Notification(e.to_string()))
    }

    /// `true` when the item is an asset.
    pub fn is_asset(&self) -> bool {
        self.data.typename == ASSET_TYPENAME
    }

    /// Reference to the item.
    pub fn reference(&self) -> DocumentRef {
        DocumentRef::new(self.data.typename.clone(), self.data.id.clone())
    }
}
