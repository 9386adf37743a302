//! Wire envelopes: the POST body sent to a GraphQL endpoint and the reply.

use std::borrow::Cow;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::ast::Document;
use crate::error::GraphqlError;
use crate::printer::serialize;

/// Query text, borrowed for fixed operations and owned for rendered documents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GraphqlQuery(Cow<'static, str>);

impl GraphqlQuery {
    #[must_use]
    pub fn new(query: impl Into<String>) -> Self {
        Self(Cow::Owned(query.into()))
    }

    #[must_use]
    pub const fn from_static(query: &'static str) -> Self {
        Self(Cow::Borrowed(query))
    }

    /// Print `document` in its compact form.
    #[must_use]
    pub fn from_document(document: &Document) -> Self {
        Self::new(serialize(document))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for GraphqlQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Operation whose text is fixed at compile time.
///
/// Management API calls use this; content queries are built as [`Document`]s
/// because their shape follows the project schema.
pub trait GraphqlOperation {
    type Variables: Serialize + Send + Sync;
    type ResponseData: for<'de> Deserialize<'de> + Send;

    const QUERY: &'static str;
    const OPERATION_NAME: &'static str;

    /// Mutations with side effects override this so transport failures are
    /// not replayed.
    fn is_idempotent() -> bool {
        true
    }
}

/// POST body: `{"query", "variables", "operationName"?}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphqlRequest<V> {
    pub query: GraphqlQuery,
    pub variables: V,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation_name: Option<String>,
}

impl<V> GraphqlRequest<V> {
    #[must_use]
    pub const fn new(query: GraphqlQuery, variables: V) -> Self {
        Self {
            query,
            variables,
            operation_name: None,
        }
    }

    #[must_use]
    pub fn with_operation_name(self, name: impl Into<String>) -> Self {
        Self {
            operation_name: Some(name.into()),
            ..self
        }
    }

    /// Same query with different variables.
    #[must_use]
    pub fn with_variables<W>(self, variables: W) -> GraphqlRequest<W> {
        GraphqlRequest {
            query: self.query,
            variables,
            operation_name: self.operation_name,
        }
    }
}

impl GraphqlRequest<Value> {
    /// Rendered document with an empty variables object; a named document
    /// also sets `operationName`.
    #[must_use]
    pub fn from_document(document: &Document) -> Self {
        Self {
            query: GraphqlQuery::from_document(document),
            variables: Value::Object(Map::new()),
            operation_name: document.name.clone(),
        }
    }
}

/// Reply body. `data` and `errors` may both be present on partial failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
pub struct GraphqlResponse<T> {
    #[serde(default)]
    pub data: Option<T>,
    #[serde(default)]
    pub errors: Vec<GraphqlError>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extensions: Option<Value>,
}

impl<T> GraphqlResponse<T> {
    /// No entries in `errors`.
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}
