//! Multi-stream offset pagination.
//!
//! Every round sends one query holding a connection field per stream that
//! still has pages left, so the number of round trips is the largest page
//! count across streams rather than their sum.

use serde_json::Value;
use tracing::debug;

use crate::ast::{Arguments, Document, ObjectNode, OperationKind, SelectionSet};
use crate::client::GraphqlClient;
use crate::error::GraphqlClientError;

/// One paginated root field in a combined query.
#[derive(Debug, Clone, PartialEq)]
pub struct PageStream {
    /// Response key (alias) for this stream.
    pub name: String,
    /// Connection root field, e.g. `postsConnection`.
    pub root_field: String,
    /// Extra arguments rendered after `first`/`skip`.
    pub arguments: Arguments,
    /// Selection applied to each `node`.
    pub node_selection: SelectionSet,
}

impl PageStream {
    /// Stream without extra arguments.
    pub fn new(
        name: impl Into<String>,
        root_field: impl Into<String>,
        node_selection: SelectionSet,
    ) -> Self {
        Self {
            name: name.into(),
            root_field: root_field.into(),
            arguments: Arguments::new(),
            node_selection,
        }
    }

    /// Add an argument.
    #[must_use]
    pub fn with_argument(
        mut self,
        name: impl Into<String>,
        value: impl Into<crate::ast::ArgValue>,
    ) -> Self {
        self.arguments.insert(name.into(), value.into());
        self
    }
}

/// Item returned by a stream.
#[derive(Debug, Clone, PartialEq)]
pub struct PagedItem {
    /// Name of the stream that produced the item.
    pub stream: String,
    /// Raw `node` object.
    pub node: Value,
}

#[derive(Debug, Clone, Copy)]
struct StreamCursor {
    offset: u64,
    active: bool,
}

/// Build the query for one round over the active streams.
fn page_document(streams: &[PageStream], cursors: &[StreamCursor], page_size: u32) -> Document {
    let mut root = SelectionSet::new();
    for (stream, cursor) in streams.iter().zip(cursors) {
        if !cursor.active {
            continue;
        }
        let mut node = ObjectNode::new(stream.root_field.clone(), connection_selection(stream))
            .with_alias(stream.name.clone())
            .with_argument("first", page_size)
            .with_argument("skip", i64::try_from(cursor.offset).unwrap_or(i64::MAX));
        for (name, value) in &stream.arguments {
            node.arguments.insert(name.clone(), value.clone());
        }
        root.object(node);
    }
    Document::new(OperationKind::Query, root)
}

fn connection_selection(stream: &PageStream) -> SelectionSet {
    let mut edges = SelectionSet::new();
    edges.object(ObjectNode::new("node", stream.node_selection.clone()));

    let mut page_info = SelectionSet::new();
    page_info.leaf("hasNextPage").leaf("pageSize");

    let mut connection = SelectionSet::new();
    connection
        .object(ObjectNode::new("edges", edges))
        .object(ObjectNode::new("pageInfo", page_info));
    connection
}

/// Fetch every page of every stream.
///
/// Rounds are sequential. Any transport or protocol failure aborts the whole
/// run.
pub async fn paginate_streams(
    client: &GraphqlClient,
    streams: &[PageStream],
    page_size: u32,
) -> Result<Vec<PagedItem>, GraphqlClientError> {
    let mut cursors = vec![
        StreamCursor {
            offset: 0,
            active: true,
        };
        streams.len()
    ];
    let mut items = Vec::new();
    let mut round = 0_u32;

    while cursors.iter().any(|cursor| cursor.active) {
        round += 1;
        let document = page_document(streams, &cursors, page_size);
        let data = client.execute_document_strict(&document, true).await?;

        for (stream, cursor) in streams.iter().zip(cursors.iter_mut()) {
            if !cursor.active {
                continue;
            }
            let connection = data.get(&stream.name).ok_or_else(|| {
                GraphqlClientError::protocol(format!("missing connection '{}'", stream.name))
            })?;
            let page = read_page(connection, &stream.name)?;
            let received = page.nodes.len();
            items.extend(page.nodes.into_iter().map(|node| PagedItem {
                stream: stream.name.clone(),
                node,
            }));

            if page.has_next_page && received > 0 {
                cursor.offset += page.page_size.unwrap_or_else(|| u64::from(page_size));
            } else {
                cursor.active = false;
            }
        }
        debug!(
            round,
            active = cursors.iter().filter(|cursor| cursor.active).count(),
            items = items.len(),
            "pagination round complete"
        );
    }

    Ok(items)
}

struct Page {
    nodes: Vec<Value>,
    has_next_page: bool,
    page_size: Option<u64>,
}

fn read_page(connection: &Value, stream: &str) -> Result<Page, GraphqlClientError> {
    let edges = connection
        .get("edges")
        .and_then(Value::as_array)
        .ok_or_else(|| GraphqlClientError::protocol(format!("stream '{stream}' has no edges")))?;
    let nodes = edges
        .iter()
        .filter_map(|edge| edge.get("node"))
        .filter(|node| !node.is_null())
        .cloned()
        .collect();

    let page_info = connection.get("pageInfo");
    let has_next_page = page_info
        .and_then(|info| info.get("hasNextPage"))
        .and_then(Value::as_bool)
        .unwrap_or(false);
    let page_size = page_info
        .and_then(|info| info.get("pageSize"))
        .and_then(Value::as_u64)
        .filter(|size| *size > 0);

    Ok(Page {
        nodes,
        has_next_page,
        page_size,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::ArgValue;
    use crate::printer::serialize;

    fn stream(name: &str) -> PageStream {
        let mut node = SelectionSet::new();
        node.leaf("id");
        PageStream::new(name, format!("{name}Connection"), node)
    }

    #[test]
    fn round_document_lists_only_active_streams() {
        let streams = vec![
            stream("posts").with_argument("stage", ArgValue::enumeration("DRAFT")),
            stream("authors"),
        ];
        let cursors = [
            StreamCursor {
                offset: 100,
                active: true,
            },
            StreamCursor {
                offset: 0,
                active: false,
            },
        ];

        let text = serialize(&page_document(&streams, &cursors, 100));
        let expected = "query {
  posts: postsConnection(first: 100, skip: 100, stage: DRAFT) {
    edges {
      node {
        id
      }
    }
    pageInfo {
      hasNextPage
      pageSize
    }
  }
}";
        assert_eq!(text, expected);
    }

    #[test]
    fn page_reader_skips_null_nodes_and_defaults_page_info() {
        let connection = serde_json::json!({
            "edges": [{ "node": { "id": "a" } }, { "node": null }],
        });
        let page = read_page(&connection, "posts").unwrap();
        assert_eq!(page.nodes.len(), 1);
        assert!(!page.has_next_page);
        assert_eq!(page.page_size, None);
    }

    #[test]
    fn page_reader_requires_edges() {
        let err = read_page(&serde_json::json!({ "pageInfo": {} }), "posts").err();
        assert!(matches!(err, Some(GraphqlClientError::Protocol { .. })));
    }
}
