//! CMS GraphQL - GraphQL infrastructure for content platform connectors.
//!
//! This crate provides:
//! - An HTTP GraphQL client with retry, backoff, and error mapping.
//! - A typed query AST (objects, type-conditional groups, leaves).
//! - A deterministic serializer from the AST to GraphQL document text.
//! - A paginator that drives several connection streams in one round-trip.

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::return_self_not_must_use)]
#![allow(clippy::doc_markdown)]

mod ast;
mod client;
mod error;
mod operation;
mod pagination;
mod printer;
mod retry;

pub use ast::{
    ArgValue, Arguments, ConditionalGroup, Document, LeafNode, ObjectNode, OperationKind,
    QueryNode, SelectionSet,
};
pub use client::{GraphqlClient, GraphqlClientBuilder, GraphqlClientConfig, RequestStats};
pub use error::{
    GraphqlClientError, GraphqlError, GraphqlErrorLocation, GraphqlPathSegment, TransportError,
    TransportKind,
};
pub use operation::{GraphqlOperation, GraphqlQuery, GraphqlRequest, GraphqlResponse};
pub use pagination::{PageStream, PagedItem, paginate_streams};
pub use printer::{serialize, write_value};
pub use retry::{Backoff, RetryDecision, RetryPolicy, RetryStrategy};

pub use reqwest::StatusCode;
