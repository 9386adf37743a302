//! CMS Hygraph Connector
//!
//! Keeps a local content cache in sync with a Hygraph project.
//!
//! The connector covers:
//! - Loading the content model from the management API
//! - Compiling schema-driven selections (polymorphic fields aliased, cyclic
//!   references bounded by a per-path depth ledger)
//! - Fetching every model and asset in shared paginated round trips
//! - Verifying change webhooks and reconciling them against the read path
//!   until the notified change is visible
//! - Content mutations, including bulk publish and unpublish

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::doc_markdown)]

mod api;
mod cache;
mod compiler;
mod config;
mod document;
mod error;
mod notification;
mod reconcile;
mod schema;
mod source;

pub use api::{HygraphApi, WebhookSetup};
pub use cache::{ContentCache, ContentUpdate, MemoryCache};
pub use compiler::{
    DepthLedger, MAX_TYPE_DEPTH, alias_for, asset_selection, compile_field_selection,
    compile_root_selection, strip_aliases,
};
pub use config::{HygraphConfig, ReconcileConfig, WebhookIntakeConfig};
pub use document::{ASSET_TYPENAME, DocumentRef, RemoteDocument, Stage, StageRecord};
pub use error::{HygraphError, HygraphResult};
pub use notification::{ChangeNotification, NotificationData, NotificationOperation};
pub use reconcile::{Delay, ItemFetcher, ReconcileOutcome, Reconciler, TokioDelay, is_fresh};
pub use schema::{
    ContentModel, FieldDescriptor, FieldKind, RelationMeta, SchemaModel, TypeDescriptor, TypeKind,
};
pub use source::HygraphContentSource;
