//! Query AST.
//!
//! A query is built as a tree of [`QueryNode`]s before it is rendered to
//! text. Selection sets are insertion ordered and keyed by response key
//! (alias when present, field name otherwise), so two selections that would
//! land on the same key in the response cannot coexist silently.

use indexmap::IndexMap;

/// Ordered argument map.
pub type Arguments = IndexMap<String, ArgValue>;

/// Argument literal.
#[derive(Debug, Clone, PartialEq)]
pub enum ArgValue {
    /// `null`.
    Null,
    /// `true` / `false`.
    Bool(bool),
    /// Integer literal.
    Int(i64),
    /// Float literal.
    Float(f64),
    /// Quoted string literal.
    String(String),
    /// Enum value, rendered unquoted (e.g. `PUBLISHED`).
    Enum(String),
    /// `[a, b]`.
    List(Vec<ArgValue>),
    /// `{ k: v }`.
    Object(IndexMap<String, ArgValue>),
    /// Reference to an operation variable, rendered `$name`.
    Variable(String),
}

impl ArgValue {
    /// Enum literal.
    pub fn enumeration(value: impl Into<String>) -> Self {
        Self::Enum(value.into())
    }

    /// `$name` reference. The document must declare `name`.
    pub fn variable(name: impl Into<String>) -> Self {
        Self::Variable(name.into())
    }

    /// Object literal from key/value pairs.
    pub fn object<K, I>(entries: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Self)>,
    {
        Self::Object(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}

impl From<&str> for ArgValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for ArgValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<i64> for ArgValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<u32> for ArgValue {
    fn from(value: u32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<bool> for ArgValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<serde_json::Value> for ArgValue {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(b) => Self::Bool(b),
            serde_json::Value::Number(n) => n
                .as_i64()
                .map_or_else(|| Self::Float(n.as_f64().unwrap_or_default()), Self::Int),
            serde_json::Value::String(s) => Self::String(s),
            serde_json::Value::Array(items) => {
                Self::List(items.into_iter().map(Self::from).collect())
            }
            serde_json::Value::Object(map) => {
                Self::Object(map.into_iter().map(|(k, v)| (k, Self::from(v))).collect())
            }
        }
    }
}

/// Scalar selection.
#[derive(Debug, Clone, PartialEq)]
pub struct LeafNode {
    /// Field name.
    pub name: String,
    /// Response alias.
    pub alias: Option<String>,
}

impl LeafNode {
    /// Unaliased leaf.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            alias: None,
        }
    }

    /// Set the alias.
    #[must_use]
    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    /// Key this leaf occupies in the response.
    pub fn response_key(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }
}

/// Field with arguments and/or a nested selection.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectNode {
    /// Field name.
    pub name: String,
    /// Response alias.
    pub alias: Option<String>,
    /// Field arguments.
    pub arguments: Arguments,
    /// Nested selection.
    pub children: SelectionSet,
}

impl ObjectNode {
    /// Object node without arguments.
    pub fn new(name: impl Into<String>, children: SelectionSet) -> Self {
        Self {
            name: name.into(),
            alias: None,
            arguments: Arguments::new(),
            children,
        }
    }

    /// Set the alias.
    #[must_use]
    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    /// Add an argument.
    #[must_use]
    pub fn with_argument(mut self, name: impl Into<String>, value: impl Into<ArgValue>) -> Self {
        self.arguments.insert(name.into(), value.into());
        self
    }

    /// Key this object occupies in the response.
    pub fn response_key(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }
}

/// Selections that apply only when the runtime type matches.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ConditionalGroup {
    /// Type name to the selection applied for that type.
    pub branches: IndexMap<String, SelectionSet>,
}

impl ConditionalGroup {
    /// Empty group.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a branch. A second branch for the same type replaces the first.
    pub fn branch(&mut self, type_name: impl Into<String>, selection: SelectionSet) -> &mut Self {
        self.branches.insert(type_name.into(), selection);
        self
    }

    /// `true` when no branch survived.
    pub fn is_empty(&self) -> bool {
        self.branches.is_empty()
    }
}

/// A node in a selection set.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryNode {
    /// Field with arguments or children.
    Object(ObjectNode),
    /// Type-conditional branches.
    Conditional(ConditionalGroup),
    /// Scalar field.
    Leaf(LeafNode),
}

/// Key under which the (single) conditional group of a selection set lives.
const CONDITIONAL_KEY: &str = "...";

/// Insertion-ordered selection set keyed by response key.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SelectionSet {
    nodes: IndexMap<String, QueryNode>,
}

impl SelectionSet {
    /// Empty selection set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Select a scalar field.
    pub fn leaf(&mut self, name: impl Into<String>) -> &mut Self {
        self.insert_leaf(LeafNode::new(name))
    }

    /// Select a possibly aliased scalar field.
    pub fn insert_leaf(&mut self, leaf: LeafNode) -> &mut Self {
        self.nodes
            .insert(leaf.response_key().to_string(), QueryNode::Leaf(leaf));
        self
    }

    /// Select an object field.
    pub fn object(&mut self, node: ObjectNode) -> &mut Self {
        self.nodes
            .insert(node.response_key().to_string(), QueryNode::Object(node));
        self
    }

    /// Add type-conditional branches. Groups added to the same set merge.
    pub fn conditional(&mut self, group: ConditionalGroup) -> &mut Self {
        match self.nodes.get_mut(CONDITIONAL_KEY) {
            Some(QueryNode::Conditional(existing)) => {
                existing.branches.extend(group.branches);
            }
            _ => {
                self.nodes
                    .insert(CONDITIONAL_KEY.to_string(), QueryNode::Conditional(group));
            }
        }
        self
    }

    /// Insert a node under its natural key.
    pub fn insert(&mut self, node: QueryNode) -> &mut Self {
        match node {
            QueryNode::Leaf(leaf) => self.insert_leaf(leaf),
            QueryNode::Object(object) => self.object(object),
            QueryNode::Conditional(group) => self.conditional(group),
        }
    }

    /// Look up a node by response key.
    pub fn get(&self, key: &str) -> Option<&QueryNode> {
        self.nodes.get(key)
    }

    /// Conditional group of this set, if any.
    pub fn conditional_group(&self) -> Option<&ConditionalGroup> {
        match self.nodes.get(CONDITIONAL_KEY) {
            Some(QueryNode::Conditional(group)) => Some(group),
            _ => None,
        }
    }

    /// Iterate nodes in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &QueryNode> {
        self.nodes.values()
    }

    /// Iterate response keys in insertion order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.nodes.keys().map(String::as_str)
    }

    /// Number of selections.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// `true` when nothing is selected.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

impl IntoIterator for SelectionSet {
    type Item = QueryNode;
    type IntoIter = indexmap::map::IntoValues<String, QueryNode>;

    fn into_iter(self) -> Self::IntoIter {
        self.nodes.into_values()
    }
}

/// Root operation type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    /// `query { ... }`.
    Query,
    /// `mutation { ... }`.
    Mutation,
}

impl OperationKind {
    /// Keyword in document text.
    pub const fn keyword(self) -> &'static str {
        match self {
            Self::Query => "query",
            Self::Mutation => "mutation",
        }
    }
}

/// A complete query or mutation document.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    /// Operation type.
    pub operation: OperationKind,
    /// Operation name.
    pub name: Option<String>,
    /// Declared variables: name (without `$`) to GraphQL type, e.g. `PostCreateInput!`.
    pub variables: IndexMap<String, String>,
    /// Root selection.
    pub selection: SelectionSet,
}

impl Document {
    /// Anonymous document.
    pub fn new(operation: OperationKind, selection: SelectionSet) -> Self {
        Self {
            operation,
            name: None,
            variables: IndexMap::new(),
            selection,
        }
    }

    /// Name the operation.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Declare `$name: type_ref`.
    #[must_use]
    pub fn with_variable(mut self, name: impl Into<String>, type_ref: impl Into<String>) -> Self {
        self.variables.insert(name.into(), type_ref.into());
        self
    }
}
