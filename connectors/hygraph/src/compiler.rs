//! Schema-driven selection compiler.
//!
//! Walks a [`SchemaModel`] from a root type and produces the selection set the
//! content API needs to return a whole document. Two rules keep the output
//! valid and finite:
//!
//! - Fields inside a polymorphic branch are aliased as
//!   `__<Type>_alias__<field>`, because the response flattens all branches
//!   into one object and same-named fields may have different shapes.
//! - A [`DepthLedger`] counts how often each type occurs on the current path.
//!   A relation whose target would exceed [`MAX_TYPE_DEPTH`] is left out.
//!   The ledger is passed by value, so sibling branches expand independently.
//!
//! References that do not resolve against the schema are dropped; the
//! compiler never fails.

use std::collections::HashMap;

use cms_graphql::{ArgValue, ConditionalGroup, LeafNode, ObjectNode, QueryNode, SelectionSet};
use serde_json::{Map, Value};

use crate::schema::{FieldDescriptor, FieldKind, SchemaModel};

/// Maximum occurrences of one type along a selection path (root included).
pub const MAX_TYPE_DEPTH: u32 = 5;

/// Per-path count of type visits.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DepthLedger {
    visits: HashMap<String, u32>,
}

impl DepthLedger {
    /// Ledger for a compile rooted at `type_name`.
    pub fn root(type_name: &str) -> Self {
        let mut visits = HashMap::new();
        visits.insert(type_name.to_string(), 1);
        Self { visits }
    }

    /// Visits of `type_name` on this path.
    pub fn count(&self, type_name: &str) -> u32 {
        self.visits.get(type_name).copied().unwrap_or(0)
    }

    /// Ledger for descending into `type_name`, or `None` past the bound.
    #[must_use]
    pub fn visit(&self, type_name: &str) -> Option<Self> {
        let next = self.count(type_name) + 1;
        if next > MAX_TYPE_DEPTH {
            return None;
        }
        let mut ledger = self.clone();
        ledger.visits.insert(type_name.to_string(), next);
        Some(ledger)
    }
}

/// Alias for `field` inside the branch for `type_name`.
pub fn alias_for(type_name: &str, field: &str) -> String {
    format!("__{type_name}_alias__{field}")
}

/// Selection for one type: `__typename` followed by every resolvable field.
pub fn compile_field_selection(
    schema: &SchemaModel,
    type_name: &str,
    ledger: &DepthLedger,
) -> SelectionSet {
    let mut selection = SelectionSet::new();
    selection.leaf("__typename");

    let Some(descriptor) = schema.get(type_name) else {
        return selection;
    };

    for field in &descriptor.fields {
        if let Some(node) = compile_field(schema, field, ledger) {
            selection.insert(node);
        }
    }
    selection
}

fn compile_field(
    schema: &SchemaModel,
    field: &FieldDescriptor,
    ledger: &DepthLedger,
) -> Option<QueryNode> {
    let node = match &field.kind {
        FieldKind::Scalar => return Some(QueryNode::Leaf(LeafNode::new(field.name.clone()))),
        FieldKind::RichText => ObjectNode::new(field.name.clone(), rich_text_selection()),
        FieldKind::Color => ObjectNode::new(field.name.clone(), color_selection()),
        FieldKind::Location => ObjectNode::new(field.name.clone(), location_selection()),
        FieldKind::Image => ObjectNode::new(field.name.clone(), image_selection()),
        FieldKind::Relation(target) => {
            schema.get(target)?;
            let next = ledger.visit(target)?;
            ObjectNode::new(
                field.name.clone(),
                compile_field_selection(schema, target, &next),
            )
        }
        FieldKind::Polymorphic(targets) => {
            let mut group = ConditionalGroup::new();
            for target in targets {
                if schema.get(target).is_none() {
                    continue;
                }
                let Some(next) = ledger.visit(target) else {
                    continue;
                };
                let branch = compile_field_selection(schema, target, &next);
                group.branch(target.clone(), alias_branch(target, branch));
            }
            if group.is_empty() {
                return None;
            }
            let mut children = SelectionSet::new();
            children.leaf("__typename").conditional(group);
            ObjectNode::new(field.name.clone(), children)
        }
    };
    Some(QueryNode::Object(node))
}

/// Alias every field of a branch. The enclosing object already selects
/// `__typename`, so the branch's own copy is dropped.
fn alias_branch(type_name: &str, branch: SelectionSet) -> SelectionSet {
    let mut aliased = SelectionSet::new();
    for node in branch {
        match node {
            QueryNode::Leaf(leaf) if leaf.name == "__typename" => {}
            QueryNode::Leaf(leaf) => {
                let alias = alias_for(type_name, &leaf.name);
                aliased.insert_leaf(leaf.with_alias(alias));
            }
            QueryNode::Object(object) => {
                let alias = alias_for(type_name, &object.name);
                aliased.object(object.with_alias(alias));
            }
            QueryNode::Conditional(group) => {
                aliased.conditional(group);
            }
        }
    }
    aliased
}

/// Selection for a whole document of `type_name`, including the stage
/// bookkeeping the reconciler relies on.
pub fn compile_root_selection(schema: &SchemaModel, type_name: &str) -> SelectionSet {
    let mut selection =
        compile_field_selection(schema, type_name, &DepthLedger::root(type_name));
    selection.leaf("id");
    if schema.get(type_name).is_some_and(|d| d.is_model()) {
        selection.leaf("updatedAt");
        selection.object(stage_selection());
    }
    selection
}

/// Selection for an asset document.
pub fn asset_selection() -> SelectionSet {
    let mut selection = SelectionSet::new();
    selection
        .leaf("__typename")
        .leaf("id")
        .leaf("updatedAt")
        .leaf("url")
        .leaf("fileName")
        .leaf("mimeType")
        .leaf("size")
        .leaf("width")
        .leaf("height")
        .object(stage_selection());
    selection
}

fn stage_selection() -> ObjectNode {
    let mut children = SelectionSet::new();
    children.leaf("stage").leaf("updatedAt");
    ObjectNode::new("documentInStages", children).with_argument(
        "stages",
        ArgValue::List(vec![ArgValue::enumeration("PUBLISHED")]),
    )
}

fn rich_text_selection() -> SelectionSet {
    let mut selection = SelectionSet::new();
    selection.leaf("raw").leaf("html").leaf("markdown").leaf("text");
    selection
}

fn color_selection() -> SelectionSet {
    let mut rgba = SelectionSet::new();
    rgba.leaf("r").leaf("g").leaf("b").leaf("a");
    let mut selection = SelectionSet::new();
    selection
        .leaf("hex")
        .leaf("css")
        .object(ObjectNode::new("rgba", rgba));
    selection
}

fn location_selection() -> SelectionSet {
    let mut selection = SelectionSet::new();
    selection.leaf("latitude").leaf("longitude");
    selection
}

fn image_selection() -> SelectionSet {
    let mut selection = SelectionSet::new();
    selection
        .leaf("id")
        .leaf("url")
        .leaf("fileName")
        .leaf("mimeType")
        .leaf("width")
        .leaf("height");
    selection
}

/// Undo branch aliasing on a fetched value. Every object carrying a
/// `__typename` has keys with that type's alias prefix renamed back.
pub fn strip_aliases(value: Value) -> Value {
    match value {
        Value::Array(items) => Value::Array(items.into_iter().map(strip_aliases).collect()),
        Value::Object(map) => {
            let prefix = map
                .get("__typename")
                .and_then(Value::as_str)
                .map(|typename| alias_for(typename, ""));
            let mut out = Map::with_capacity(map.len());
            for (key, value) in map {
                let stripped = prefix
                    .as_deref()
                    .and_then(|prefix| key.strip_prefix(prefix))
                    .map(str::to_string);
                out.insert(stripped.unwrap_or(key), strip_aliases(value));
            }
            Value::Object(out)
        }
        other => other,
    }
}
